//! # Backing Store Contract
//!
//! This module defines the trait a persistence layer implements to save and
//! restore atoms on behalf of an [`AtomSpace`]. The contract is deliberately
//! synchronous: implementations may be backed by asynchronous machinery, but
//! callers expect every operation to have completed (or failed) by the time
//! it returns, with eventual visibility governed by the backend itself.
//!
//! ## Key Concepts
//!
//! **Single-atom traffic**: [`store_atom`](BackingStore::store_atom) and the
//! `fetch_*` operations move one atom (plus its value map) at a time.
//! Fetching a link resolves its entire outgoing tree.
//!
//! **Incoming sets**: the backend maintains a reverse index from each atom
//! to the links that contain it, queryable in whole or filtered by type.
//!
//! **Bulk traffic**: whole-space save and restore, plus a type-filtered
//! restore for callers that only need a slice of a space.
//!
//! **Removal**: deletion honors the incoming set: a non-recursive remove of
//! an atom that still has holders is a no-op; a recursive remove takes the
//! holders down with it.

use crate::atom::Handle;
use crate::space::AtomSpace;

/// The operations a persistence backend provides to an atom space.
///
/// All methods take `&self`; implementations are expected to be internally
/// synchronized and callable from many threads at once.
pub trait BackingStore {
    /// The error type surfaced by every fallible operation.
    type Error;

    /// Saves one atom, its value map, and (for links) its outgoing tree.
    fn store_atom(&self, atom: &Handle) -> Result<(), Self::Error>;

    /// Restores the current value map onto a structurally equal atom.
    fn fetch_atom(&self, atom: &Handle) -> Result<Handle, Self::Error>;

    /// Restores the node with the given type and name.
    fn fetch_node(&self, ty: &str, name: &str) -> Result<Handle, Self::Error>;

    /// Restores the link with the given type and outgoing tuple.
    fn fetch_link(&self, ty: &str, outgoing: &[Handle]) -> Result<Handle, Self::Error>;

    /// Every link known to hold `atom` in its outgoing tuple.
    fn get_incoming_set(&self, atom: &Handle) -> Result<Vec<Handle>, Self::Error>;

    /// The incoming set of `atom`, keeping only links of type `ty`.
    fn get_incoming_by_type(&self, atom: &Handle, ty: &str) -> Result<Vec<Handle>, Self::Error>;

    /// Deletes `atom` from the backend. With `recursive` unset, an atom
    /// with a non-empty incoming set is left untouched.
    fn remove_atom(&self, atom: &Handle, recursive: bool) -> Result<(), Self::Error>;

    /// Restores every atom of the named space into `space`, returning how
    /// many atoms were loaded.
    fn load_atomspace(&self, space: &AtomSpace, name: &str) -> Result<usize, Self::Error>;

    /// Saves every atom resident in `space`, returning how many atoms were
    /// stored.
    fn store_atomspace(&self, space: &AtomSpace) -> Result<usize, Self::Error>;

    /// Restores only the atoms of type `ty` into `space`, returning how
    /// many atoms were loaded.
    fn load_type(&self, space: &AtomSpace, ty: &str) -> Result<usize, Self::Error>;

    /// Best-effort fence: coax pending writes toward the backend before
    /// returning.
    fn barrier(&self) -> Result<(), Self::Error>;

    /// Whether the backend is reachable.
    fn connected(&self) -> bool;
}
