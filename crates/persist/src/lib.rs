//! # Persist Crate
//!
//! Overlay-backed persistent storage for atom spaces. Atoms, their value
//! maps, and their incoming sets are saved into a private Kademlia-style
//! overlay and restored from it, in whole or piecemeal, by any process that
//! knows the space's name.
//!
//! ## How the Graph Maps onto the Overlay
//!
//! The overlay is a flat multimap from 160-bit keys to typed records, so
//! every piece of graph state is encoded into one of four record kinds:
//!
//! - **Atom records** live at the atom's *GUID* key, derived from the
//!   canonical serialization alone. They are immutable: every publication
//!   of the same atom carries a byte-identical payload.
//! - **Space records** live at the key of the space name and announce
//!   membership: a tagged `add`/`drop` payload per atom, disambiguated by
//!   the atom's 64-bit content hash.
//! - **Value records** live at the atom's per-space *membership* key and
//!   hold the whole value map, last writer wins.
//! - **Incoming records** share the membership key and index the links
//!   that hold the atom, one record per holder, with a zero-hash tombstone
//!   retracting an edge.
//!
//! ## Architecture
//!
//! - [`uri`] - the `dht://` connection-string grammar
//! - [`policy`] - record kinds, conflict callbacks, and their statistics
//! - [`codec`] - tagged payload encoding (timestamps, add/drop, alists)
//! - [`storage`] - the [`DhtStorage`] façade: lifecycle, keys, caches
//! - `store` / `fetch` / `delete` / `bulk` - the engines behind each
//!   [`BackingStore`](atomspace::BackingStore) operation
//!
//! Everything is eventually consistent: the overlay may reorder, coalesce,
//! or drop traffic, and every correctness claim here is modulo eventual
//! visibility.
#![deny(missing_docs)]

mod bulk;
mod codec;
mod delete;
mod error;
mod fetch;
mod log;
pub mod policy;
mod stats;
mod storage;
mod store;
pub mod uri;

#[cfg(test)]
mod tests;

pub use error::StorageError;
pub use storage::DhtStorage;
