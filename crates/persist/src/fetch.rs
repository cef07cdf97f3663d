//! The fetch engine: restoring atoms, value maps, and incoming sets.

use atomspace::atom::{Atom, Handle};
use atomspace::sexpr;
use overlay::{InfoHash, TypeFilter};

use crate::error::StorageError;
use crate::policy::{ATOM_ID, INCOMING_ID, VALUES_ID};
use crate::stats::OpCounts;
use crate::storage::DhtStorage;

impl DhtStorage {
    /// Resolves a GUID key into its atom. This does not fetch the atom's
    /// values.
    ///
    /// Decoded atoms are cached for the life of the instance; the content
    /// at a GUID is immutable, so the cache never goes stale.
    ///
    /// # Errors
    ///
    /// [`StorageError::NotFound`] when the overlay holds no atom record at
    /// the key, [`StorageError::Decode`] when the payload is garbled.
    pub fn fetch_atom_by_guid(&self, guid: &InfoHash) -> Result<Handle, StorageError> {
        if let Some(atom) = self.decode_cache.lock().get(guid) {
            return Ok(atom.clone());
        }

        let records = self.get_records(guid, TypeFilter::Kind(ATOM_ID))?;
        // All copies carry byte-identical payloads; any one will do.
        let Some(first) = records.first() else {
            return Err(StorageError::NotFound {
                key: guid.to_string(),
            });
        };
        let atom = sexpr::decode_atom_exact(&first.payload_str())?;

        self.decode_cache.lock().insert(*guid, atom.clone());
        OpCounts::bump(&self.counts.num_get_atoms);
        if atom.is_node() {
            OpCounts::bump(&self.counts.num_got_nodes);
        } else {
            OpCounts::bump(&self.counts.num_got_links);
        }
        Ok(atom)
    }

    /// Installs the newest stored value map onto `atom` and returns it.
    pub(crate) fn fetch_values(&self, atom: &Handle) -> Result<Handle, StorageError> {
        self.fetch_values_in(&self.space_name, atom)
    }

    /// As [`fetch_values`](Self::fetch_values), against an arbitrary space
    /// name (trailing slash included).
    pub(crate) fn fetch_values_in(
        &self,
        space_name: &str,
        atom: &Handle,
    ) -> Result<Handle, StorageError> {
        let member = if space_name == self.space_name {
            self.membership(atom)
        } else {
            self.membership_in(space_name, atom)
        };
        let records = self.get_records(&member, TypeFilter::Kind(VALUES_ID))?;
        OpCounts::bump(&self.counts.value_fetches);

        // Several writers may have raced; the newest map wins, and an
        // empty payload is the tombstone.
        if let Some(latest) = records.iter().max_by_key(|r| r.timestamp) {
            if !latest.payload.is_empty() {
                sexpr::decode_alist(atom, &latest.payload_str())?;
            }
        }
        Ok(atom.clone())
    }

    /// Restores the value map of a structurally equal atom.
    ///
    /// # Errors
    ///
    /// Overlay and decode errors as for the underlying lookups.
    pub fn fetch_atom(&self, atom: &Handle) -> Result<Handle, StorageError> {
        self.ensure_connected()?;
        self.fetch_values(atom)
    }

    /// Restores the node with the given type and name, values included.
    ///
    /// # Errors
    ///
    /// Overlay and decode errors as for the underlying lookups.
    pub fn fetch_node(&self, ty: &str, name: &str) -> Result<Handle, StorageError> {
        self.fetch_atom(&Atom::node(ty, name))
    }

    /// Restores the link with the given type and outgoing tuple, values
    /// included.
    ///
    /// # Errors
    ///
    /// Overlay and decode errors as for the underlying lookups.
    pub fn fetch_link(&self, ty: &str, outgoing: &[Handle]) -> Result<Handle, StorageError> {
        self.fetch_atom(&Atom::link(ty, outgoing.to_vec()))
    }

    /// The GUIDs currently in the incoming set of `atom`, tombstones
    /// excluded.
    pub(crate) fn incoming_guids(&self, atom: &Handle) -> Result<Vec<InfoHash>, StorageError> {
        let member = self.membership(atom);
        let records = self.get_records(&member, TypeFilter::Kind(INCOMING_ID))?;
        Ok(records
            .iter()
            .filter_map(|r| InfoHash::from_bytes(&r.payload))
            .filter(|guid| !guid.is_zero())
            .collect())
    }

    /// Every link holding `atom`, with values fetched.
    ///
    /// # Errors
    ///
    /// Overlay and decode errors as for the underlying lookups.
    pub fn get_incoming_set(&self, atom: &Handle) -> Result<Vec<Handle>, StorageError> {
        let guids = self.incoming_guids(atom)?;
        let mut holders = Vec::with_capacity(guids.len());
        for guid in guids {
            let holder = self.fetch_atom_by_guid(&guid)?;
            self.fetch_values(&holder)?;
            holders.push(holder);
            OpCounts::bump(&self.counts.num_get_inlinks);
        }
        OpCounts::bump(&self.counts.num_get_insets);
        Ok(holders)
    }

    /// The incoming set of `atom`, keeping only holders of type `ty`.
    ///
    /// # Errors
    ///
    /// Overlay and decode errors as for the underlying lookups.
    pub fn get_incoming_by_type(&self, atom: &Handle, ty: &str) -> Result<Vec<Handle>, StorageError> {
        let guids = self.incoming_guids(atom)?;
        let mut holders = Vec::new();
        for guid in guids {
            let holder = self.fetch_atom_by_guid(&guid)?;
            if holder.type_name() != ty {
                continue;
            }
            self.fetch_values(&holder)?;
            holders.push(holder);
            OpCounts::bump(&self.counts.num_get_inlinks);
        }
        OpCounts::bump(&self.counts.num_get_insets);
        Ok(holders)
    }
}
