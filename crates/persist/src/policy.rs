//! # Record Kinds and Conflict Policies
//!
//! The four record kinds the storage layer publishes, with the per-kind
//! store/edit callbacks it registers on the overlay node. The callbacks run
//! on overlay threads, on every replica holding a key, so they are pure
//! functions of the key and payloads; the only side effect they have is
//! ticking the shared statistics counters.
//!
//! The edit decisions encode the graph semantics:
//!
//! - **Atom** records are immutable in content, so a replacement is always
//!   admissible (old and new payloads coincide by construction).
//! - **Space** records supersede each other only when they describe the
//!   same serialized atom. Two distinct atoms whose 64-bit content hashes
//!   collide therefore keep separate membership records instead of one
//!   delete clobbering the other.
//! - **Values** records are last-writer-wins.
//! - **Incoming** records flip between a holder's GUID and the zero-hash
//!   tombstone; both transitions are admissible.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use overlay::{Record, Runner, ValueType};

use crate::codec;

//================================================================================================
// Types
//================================================================================================

/// Wire id for immutable atom records.
pub const ATOM_ID: u16 = 4097;
/// Wire id for space membership records.
pub const SPACE_ID: u16 = 4098;
/// Wire id for value-map records.
pub const VALUES_ID: u16 = 4099;
/// Wire id for incoming-set records.
pub const INCOMING_ID: u16 = 4100;

/// The closed set of record kinds, with ids matching the wire constants.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecordKind {
    /// Immutable atom serialization at the GUID key.
    Atom,
    /// Tagged membership payload at the space key.
    Space,
    /// Value-map payload at the membership key.
    Values,
    /// Holder GUID (or tombstone) at the membership key.
    Incoming,
}

/// Per-kind store/edit counters, shared with the overlay callbacks.
///
/// The callbacks run on overlay threads with no access to the storage
/// façade, so the counters travel with them behind an `Arc`.
#[derive(Default, Debug)]
pub struct PolicyStats {
    stores: [AtomicU64; 4],
    edits: [AtomicU64; 4],
}

//================================================================================================
// Impls
//================================================================================================

impl RecordKind {
    /// All four kinds, in wire-id order.
    pub const ALL: [RecordKind; 4] = [
        RecordKind::Atom,
        RecordKind::Space,
        RecordKind::Values,
        RecordKind::Incoming,
    ];

    /// The wire id for this kind.
    pub fn id(self) -> u16 {
        match self {
            RecordKind::Atom => ATOM_ID,
            RecordKind::Space => SPACE_ID,
            RecordKind::Values => VALUES_ID,
            RecordKind::Incoming => INCOMING_ID,
        }
    }

    /// Maps a wire id back to its kind.
    pub fn from_id(id: u16) -> Option<Self> {
        RecordKind::ALL.into_iter().find(|k| k.id() == id)
    }

    /// The policy name registered with the overlay.
    pub fn policy_name(self) -> &'static str {
        match self {
            RecordKind::Atom => "atom policy",
            RecordKind::Space => "space policy",
            RecordKind::Values => "values policy",
            RecordKind::Incoming => "incoming policy",
        }
    }

    fn index(self) -> usize {
        match self {
            RecordKind::Atom => 0,
            RecordKind::Space => 1,
            RecordKind::Values => 2,
            RecordKind::Incoming => 3,
        }
    }
}

impl PolicyStats {
    /// Stores seen by the callbacks for `kind`.
    pub fn stores(&self, kind: RecordKind) -> u64 {
        self.stores[kind.index()].load(Ordering::Relaxed)
    }

    /// Edits seen by the callbacks for `kind`.
    pub fn edits(&self, kind: RecordKind) -> u64 {
        self.edits[kind.index()].load(Ordering::Relaxed)
    }

    /// Zeroes every counter.
    pub fn clear(&self) {
        for c in self.stores.iter().chain(self.edits.iter()) {
            c.store(0, Ordering::Relaxed);
        }
    }

    fn tick_store(&self, kind: RecordKind) {
        self.stores[kind.index()].fetch_add(1, Ordering::Relaxed);
    }

    fn tick_edit(&self, kind: RecordKind) {
        self.edits[kind.index()].fetch_add(1, Ordering::Relaxed);
    }
}

//================================================================================================
// Functions
//================================================================================================

/// Registers all four record kinds on `runner` with the given lifetime.
pub fn register_policies(runner: &Runner, stats: &Arc<PolicyStats>, lifetime: Duration) {
    let s = stats.clone();
    runner.register_type(ValueType::new(
        ATOM_ID,
        RecordKind::Atom.policy_name(),
        lifetime,
        {
            let s = s.clone();
            Arc::new(move |_, _| {
                s.tick_store(RecordKind::Atom);
                true
            })
        },
        {
            let s = s.clone();
            // Old and new payloads coincide for immutable atom records.
            Arc::new(move |_, _, _| {
                s.tick_edit(RecordKind::Atom);
                true
            })
        },
    ));

    let s = stats.clone();
    runner.register_type(ValueType::new(
        SPACE_ID,
        RecordKind::Space.policy_name(),
        lifetime,
        {
            let s = s.clone();
            Arc::new(move |_, _| {
                s.tick_store(RecordKind::Space);
                true
            })
        },
        {
            let s = s.clone();
            Arc::new(move |_, old: &Record, new: &Record| {
                s.tick_edit(RecordKind::Space);
                space_records_match(old, new)
            })
        },
    ));

    let s = stats.clone();
    runner.register_type(ValueType::new(
        VALUES_ID,
        RecordKind::Values.policy_name(),
        lifetime,
        {
            let s = s.clone();
            Arc::new(move |_, _| {
                s.tick_store(RecordKind::Values);
                true
            })
        },
        {
            let s = s.clone();
            // Last writer wins.
            Arc::new(move |_, _, _| {
                s.tick_edit(RecordKind::Values);
                true
            })
        },
    ));

    let s = stats.clone();
    runner.register_type(ValueType::new(
        INCOMING_ID,
        RecordKind::Incoming.policy_name(),
        lifetime,
        {
            let s = s.clone();
            Arc::new(move |_, _| {
                s.tick_store(RecordKind::Incoming);
                true
            })
        },
        {
            let s = s.clone();
            // A holder GUID and the zero tombstone may replace each other.
            Arc::new(move |_, _, _| {
                s.tick_edit(RecordKind::Incoming);
                true
            })
        },
    ));
}

/// Whether two space payloads describe the same serialized atom.
///
/// An untagged payload never matches, so a record that collided on the
/// 64-bit id with a foreign atom is kept beside it rather than replaced.
fn space_records_match(old: &Record, new: &Record) -> bool {
    let old = old.payload_str();
    let new = new.payload_str();
    let Some((_, new_sexpr)) = codec::parse_space_payload(&new) else {
        return false;
    };
    let Some((_, old_sexpr)) = codec::parse_space_payload(&old) else {
        return false;
    };
    old_sexpr == new_sexpr
}

//================================================================================================
// Tests
//================================================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn space_record(payload: String) -> Record {
        Record::new(SPACE_ID, 1, payload)
    }

    #[test]
    fn kind_ids_round_trip() {
        for kind in RecordKind::ALL {
            assert_eq!(RecordKind::from_id(kind.id()), Some(kind));
        }
        assert_eq!(RecordKind::from_id(9), None);
    }

    #[test]
    fn drop_supersedes_add_of_same_atom() {
        let add = space_record(codec::space_add("(Concept \"foo\")"));
        let drop = space_record(codec::space_drop("(Concept \"foo\")"));
        assert!(space_records_match(&add, &drop));
    }

    #[test]
    fn colliding_atoms_do_not_supersede() {
        let add_a = space_record(codec::space_add("(Concept \"foo\")"));
        let drop_b = space_record(codec::space_drop("(Concept \"bar\")"));
        assert!(!space_records_match(&add_a, &drop_b));
    }

    #[test]
    fn untagged_payloads_never_supersede() {
        let add = space_record(codec::space_add("(Concept \"foo\")"));
        let raw = space_record("(Concept \"foo\")".to_string());
        assert!(!space_records_match(&add, &raw));
        assert!(!space_records_match(&raw, &add));
    }

    #[test]
    fn stats_tick_per_kind() {
        let stats = PolicyStats::default();
        stats.tick_store(RecordKind::Space);
        stats.tick_store(RecordKind::Space);
        stats.tick_edit(RecordKind::Values);
        assert_eq!(stats.stores(RecordKind::Space), 2);
        assert_eq!(stats.edits(RecordKind::Values), 1);
        assert_eq!(stats.stores(RecordKind::Atom), 0);
        stats.clear();
        assert_eq!(stats.stores(RecordKind::Space), 0);
    }
}
