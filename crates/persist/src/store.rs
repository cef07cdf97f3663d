//! The publish engine: saving atoms, value maps, and incoming edges.
//!
//! Publication order matters even though delivery is eventual: children
//! are published before the links that hold them, value keys before the
//! value map that references them, and the atom record before its
//! incoming-set edges, so a reader that observes a later record can always
//! resolve the earlier ones.

use atomspace::atom::Handle;
use atomspace::sexpr;
use overlay::Record;

use crate::codec;
use crate::error::StorageError;
use crate::policy::{ATOM_ID, INCOMING_ID, SPACE_ID, VALUES_ID};
use crate::stats::OpCounts;
use crate::storage::DhtStorage;

impl DhtStorage {
    /// Saves one atom: its value map, then (recursively, leaves first) the
    /// atom itself and its outgoing tree, then the incoming-set edges.
    ///
    /// # Errors
    ///
    /// [`StorageError::ObservingOnly`] on an observing instance; overlay
    /// errors from the underlying puts.
    pub fn store_atom(&self, atom: &Handle) -> Result<(), StorageError> {
        self.check_writable()?;
        self.store_atom_values(atom)?;
        self.store_recursive(atom)?;
        OpCounts::bump(&self.counts.store_count);
        Ok(())
    }

    /// Recursively publishes an atom and its outgoing tree, leaves first,
    /// then records each child's incoming edge. Does not touch values.
    pub(crate) fn store_recursive(&self, atom: &Handle) -> Result<(), StorageError> {
        if atom.is_node() {
            return self.publish(atom);
        }
        for child in atom.outgoing() {
            self.store_recursive(child)?;
        }
        self.publish(atom)?;
        for child in atom.outgoing() {
            self.store_incoming_of(child, atom)?;
        }
        Ok(())
    }

    /// Publishes the immutable atom record and the space membership
    /// record, exactly once per process until the atom is removed.
    fn publish(&self, atom: &Handle) -> Result<(), StorageError> {
        if self.published.lock().contains(atom) {
            return Ok(());
        }

        let guid = self.guid(atom);
        let sexpr = sexpr::encode_atom(atom);
        // Record-id 1: the overlay retains exactly one immutable copy.
        self.put_record(&guid, Record::new(ATOM_ID, 1, sexpr.clone()))?;
        // Record-id hash64: many atoms share the space key, while
        // republications of the same atom collapse.
        self.put_record(
            &self.space_hash,
            Record::new(SPACE_ID, atom.content_hash_64(), codec::space_add(&sexpr)),
        )?;

        self.published.lock().insert(atom.clone());
        if atom.is_node() {
            OpCounts::bump(&self.counts.num_node_inserts);
        } else {
            OpCounts::bump(&self.counts.num_link_inserts);
        }
        tracing::trace!(atom = %atom, key = %guid, "published");
        Ok(())
    }

    /// Publishes the atom's whole value map, last writer wins.
    ///
    /// Value keys are stored into the space first so the map never
    /// references an unknown atom. An atom with no keys publishes a
    /// tombstone only when the overlay still holds a live map for it.
    pub(crate) fn store_atom_values(&self, atom: &Handle) -> Result<(), StorageError> {
        let keys = atom.keys();
        for key in &keys {
            self.store_recursive(key)?;
        }

        let member = self.membership(atom);
        if keys.is_empty() {
            let existing = self.get_records(&member, overlay::TypeFilter::Kind(VALUES_ID))?;
            let latest = existing.iter().max_by_key(|r| r.timestamp);
            if latest.is_some_and(|r| !r.payload.is_empty()) {
                self.put_record(&member, Record::new(VALUES_ID, 1, ""))?;
                OpCounts::bump(&self.counts.value_deletes);
            }
            return Ok(());
        }

        let payload = sexpr::encode_atom_values(atom);
        self.put_record(&member, Record::new(VALUES_ID, 1, payload))?;
        OpCounts::bump(&self.counts.value_updates);
        Ok(())
    }

    /// Records `holder` in the incoming set of `child`: one live edge per
    /// holder, keyed by the holder's 64-bit content hash.
    pub(crate) fn store_incoming_of(
        &self,
        child: &Handle,
        holder: &Handle,
    ) -> Result<(), StorageError> {
        let member = self.membership(child);
        let guid = self.guid(holder);
        self.put_record(
            &member,
            Record::new(
                INCOMING_ID,
                holder.content_hash_64(),
                guid.as_bytes().to_vec(),
            ),
        )
    }
}
