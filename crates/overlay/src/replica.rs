//! The local record replica: storage, conflict resolution, and expiry.

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::key::InfoHash;
use crate::policy::{TypeFilter, ValueType};
use crate::record::Record;

//================================================================================================
// Types
//================================================================================================

/// The records this node holds, keyed by overlay key.
///
/// Every application of an incoming record runs the registered policy for
/// its kind: brand-new `(kind, id)` pairs go through the store callback,
/// collisions through the edit callback. An accepting edit supersedes the
/// stored record; a declining edit leaves the old record in place and the
/// incoming record coexists beside it. Records of unregistered kinds are
/// dropped, as is a replicated copy whose timestamp would regress a record
/// it supersedes.
pub(crate) struct Replica {
    types: HashMap<u16, ValueType>,
    store: HashMap<InfoHash, Vec<Record>>,
    clock: u64,
}

//================================================================================================
// Impls
//================================================================================================

impl Replica {
    pub(crate) fn new() -> Self {
        Replica {
            types: HashMap::new(),
            store: HashMap::new(),
            clock: 0,
        }
    }

    pub(crate) fn register(&mut self, vt: ValueType) {
        self.types.insert(vt.id(), vt);
    }

    /// Assigns a strictly monotonic microsecond timestamp.
    pub(crate) fn stamp(&mut self) -> u64 {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_micros() as u64)
            .unwrap_or(0);
        self.clock = now.max(self.clock + 1);
        self.clock
    }

    /// Applies one record, stamping it first when it has no timestamp yet.
    /// Returns the stored form on acceptance.
    pub(crate) fn apply(&mut self, key: &InfoHash, mut incoming: Record) -> Option<Record> {
        let Some(vt) = self.types.get(&incoming.kind).cloned() else {
            tracing::debug!(key = %key, kind = incoming.kind, "record of unregistered kind dropped");
            return None;
        };
        if incoming.timestamp == 0 {
            incoming.timestamp = self.stamp();
        } else {
            self.clock = self.clock.max(incoming.timestamp);
        }

        self.expire_key(key);
        let records = self.store.entry(*key).or_default();
        let colliding: Vec<usize> = records
            .iter()
            .enumerate()
            .filter(|(_, r)| r.kind == incoming.kind && r.id == incoming.id)
            .map(|(i, _)| i)
            .collect();
        if colliding.is_empty() {
            return if vt.accept_store(key, &incoming) {
                records.push(incoming.clone());
                Some(incoming)
            } else {
                None
            };
        }
        for i in colliding {
            if vt.accept_edit(key, &records[i], &incoming) {
                if incoming.timestamp < records[i].timestamp {
                    return None;
                }
                records[i] = incoming.clone();
                return Some(incoming);
            }
        }
        // No supersede target: the record-id collided, keep both.
        records.push(incoming.clone());
        Some(incoming)
    }

    /// A snapshot of the live records at `key` matching `filter`.
    pub(crate) fn get(&mut self, key: &InfoHash, filter: TypeFilter) -> Vec<Record> {
        self.expire_key(key);
        self.store
            .get(key)
            .map(|records| {
                records
                    .iter()
                    .filter(|r| filter.matches(r))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    pub(crate) fn key_count(&self) -> usize {
        self.store.len()
    }

    /// One line per key for the storage log.
    pub(crate) fn dump(&self) -> String {
        let mut lines: Vec<String> = self
            .store
            .iter()
            .filter(|(_, records)| !records.is_empty())
            .map(|(key, records)| format!("{} : {} records", key, records.len()))
            .collect();
        lines.sort();
        lines.join("\n")
    }

    fn expire_key(&mut self, key: &InfoHash) {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_micros() as u64)
            .unwrap_or(0);
        if let Some(records) = self.store.get_mut(key) {
            let types = &self.types;
            records.retain(|r| {
                let Some(vt) = types.get(&r.kind) else {
                    return false;
                };
                let age = now.saturating_sub(r.timestamp);
                age <= vt.lifetime().as_micros() as u64
            });
        }
    }
}

//================================================================================================
// Tests
//================================================================================================

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;

    const KIND: u16 = 77;

    fn replica_accepting_edits(accept: bool) -> Replica {
        let mut r = Replica::new();
        r.register(ValueType::new(
            KIND,
            "test",
            Duration::from_secs(3600),
            Arc::new(|_, _| true),
            Arc::new(move |_, _, _| accept),
        ));
        r
    }

    #[test]
    fn distinct_ids_coexist() {
        let mut r = replica_accepting_edits(true);
        let key = InfoHash::get("k");
        assert!(r.apply(&key, Record::new(KIND, 1, "a")).is_some());
        assert!(r.apply(&key, Record::new(KIND, 2, "b")).is_some());
        assert_eq!(r.get(&key, TypeFilter::Any).len(), 2);
    }

    #[test]
    fn same_id_supersedes_when_edit_accepts() {
        let mut r = replica_accepting_edits(true);
        let key = InfoHash::get("k");
        r.apply(&key, Record::new(KIND, 1, "old"));
        r.apply(&key, Record::new(KIND, 1, "new"));
        let got = r.get(&key, TypeFilter::Any);
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].payload, b"new");
    }

    #[test]
    fn declined_edit_keeps_both_records() {
        let mut r = replica_accepting_edits(false);
        let key = InfoHash::get("k");
        r.apply(&key, Record::new(KIND, 1, "old"));
        assert!(r.apply(&key, Record::new(KIND, 1, "new")).is_some());
        let got = r.get(&key, TypeFilter::Any);
        assert_eq!(got.len(), 2);
        assert_eq!(got[0].payload, b"old");
        assert_eq!(got[1].payload, b"new");
    }

    #[test]
    fn unregistered_kind_dropped() {
        let mut r = replica_accepting_edits(true);
        let key = InfoHash::get("k");
        assert!(r.apply(&key, Record::new(999, 1, "x")).is_none());
    }

    #[test]
    fn timestamps_are_monotonic() {
        let mut r = replica_accepting_edits(true);
        let key = InfoHash::get("k");
        let a = r.apply(&key, Record::new(KIND, 1, "a")).unwrap();
        let b = r.apply(&key, Record::new(KIND, 2, "b")).unwrap();
        assert!(b.timestamp > a.timestamp);
    }

    #[test]
    fn stale_replicated_copy_never_regresses() {
        let mut r = replica_accepting_edits(true);
        let key = InfoHash::get("k");
        let newer = r.apply(&key, Record::new(KIND, 1, "newer")).unwrap();
        let mut stale = Record::new(KIND, 1, "stale");
        stale.timestamp = newer.timestamp - 1;
        assert!(r.apply(&key, stale).is_none());
        assert_eq!(r.get(&key, TypeFilter::Any)[0].payload, b"newer");
    }

    #[test]
    fn expired_records_vanish() {
        let mut r = Replica::new();
        r.register(ValueType::new(
            KIND,
            "ephemeral",
            Duration::ZERO,
            Arc::new(|_, _| true),
            Arc::new(|_, _, _| true),
        ));
        let key = InfoHash::get("k");
        let mut rec = Record::new(KIND, 1, "x");
        // Backdate so the zero lifetime has visibly elapsed.
        rec.timestamp = 1;
        r.apply(&key, rec);
        assert!(r.get(&key, TypeFilter::Any).is_empty());
    }
}
