//! The removal engine: tombstoning atoms out of a space.
//!
//! Nothing is ever erased from the overlay by force; removal publishes
//! records that supersede the live ones. A `drop` membership record
//! replaces the `add` of the same atom, an empty value map replaces the
//! live one, and a zero-hash incoming record retracts each forward edge.
//!
//! The incoming-set check below is racy by design: the set may grow while
//! the removal is in flight, and the overlay offers no linearization point
//! to close the window. Callers get eventual-consistency semantics, not a
//! transactional delete.

use atomspace::atom::Handle;
use atomspace::sexpr;
use overlay::{InfoHash, Record};

use crate::codec;
use crate::error::StorageError;
use crate::policy::{INCOMING_ID, SPACE_ID, VALUES_ID};
use crate::stats::OpCounts;
use crate::storage::DhtStorage;

impl DhtStorage {
    /// Removes an atom from the space, and with `recursive` set, every
    /// link that holds it.
    ///
    /// A non-recursive remove of an atom with a non-empty incoming set
    /// returns without publishing anything.
    ///
    /// # Errors
    ///
    /// [`StorageError::ObservingOnly`] on an observing instance; overlay
    /// errors from the reads and writes involved.
    pub fn remove_atom(&self, atom: &Handle, recursive: bool) -> Result<(), StorageError> {
        self.check_writable()?;
        // The atom may still be sitting in the outbound queues.
        self.barrier();

        let holders = self.incoming_guids(atom)?;
        if !holders.is_empty() {
            if !recursive {
                return Ok(());
            }
            for guid in holders {
                let holder = match self.fetch_atom_by_guid(&guid) {
                    Ok(h) => h,
                    // A holder another thread already tore down is fine.
                    Err(StorageError::NotFound { .. }) => continue,
                    Err(e) => return Err(e),
                };
                self.remove_atom(&holder, true)?;
            }
        }

        // Retract the forward edges this link contributed.
        if atom.is_link() {
            for child in atom.outgoing() {
                let member = self.membership(child);
                self.put_record(
                    &member,
                    Record::new(
                        INCOMING_ID,
                        atom.content_hash_64(),
                        InfoHash::zero().as_bytes().to_vec(),
                    ),
                )?;
            }
        }

        // The drop record supersedes this atom's add record; on a 64-bit
        // collision with a different atom the edit callback keeps both.
        let sexpr = sexpr::encode_atom(atom);
        self.put_record(
            &self.space_hash,
            Record::new(SPACE_ID, atom.content_hash_64(), codec::space_drop(&sexpr)),
        )?;

        self.delete_atom_values(atom)?;

        // Forget the atom locally so a later store republishes it; the
        // guid and decode caches stay, the content itself is immutable.
        self.published.lock().remove(atom);
        self.member_cache.lock().remove(atom);
        OpCounts::bump(&self.counts.num_atom_deletes);
        tracing::debug!(atom = %atom, "removed");
        Ok(())
    }

    /// Publishes the empty value map for an atom.
    pub(crate) fn delete_atom_values(&self, atom: &Handle) -> Result<(), StorageError> {
        let member = self.membership(atom);
        self.put_record(&member, Record::new(VALUES_ID, 1, ""))?;
        OpCounts::bump(&self.counts.value_deletes);
        Ok(())
    }
}
