//! # Overlay Crate
//!
//! A small Kademlia-style overlay node for private record storage. The
//! overlay is a flat multimap from 160-bit keys to typed records; every
//! record carries a kind id, a 64-bit record id, and an opaque payload.
//! Consumers register a [`ValueType`] per kind, whose *store* and *edit*
//! callbacks run on each replica to decide whether an incoming record is
//! admitted, supersedes an existing one, or is rejected.
//!
//! ## Key Concepts
//!
//! **Keys** are [`InfoHash`]es: 20-byte BLAKE3-derived identifiers, usually
//! computed from some canonical serialization via [`InfoHash::get`].
//!
//! **Records** ([`Record`]) are typed values. At one key, records of the
//! same kind with *different* record ids coexist; records with the *same*
//! (kind, record id) pair are funneled through the kind's edit callback,
//! which decides whether the newcomer supersedes the stored record or
//! coexists beside it.
//!
//! **The runner** ([`Runner`]) owns a private tokio runtime. `put` is
//! fire-and-forget; `get` returns a [`GetFuture`] the caller bounds with
//! [`GetFuture::wait_for`]. Peers exchange JSON datagrams over UDP on a
//! private network id; packets from other networks are ignored.
//!
//! ## Delivery Model
//!
//! Everything is eventually consistent. Writes may be reordered, coalesced
//! by edit callbacks, or dropped under rate-limit pressure; reads merge the
//! local replica with whatever reachable peers answer inside the collection
//! window. None of the public operations block indefinitely.
#![deny(missing_docs)]

mod key;
mod policy;
mod proto;
mod record;
mod replica;
mod runner;

pub use key::{InfoHash, KeyError};
pub use policy::{EditCallback, StoreCallback, TypeFilter, ValueType};
pub use record::Record;
pub use runner::{GetFuture, Runner, RunnerConfig};

use thiserror::Error;

/// Errors surfaced by the overlay node.
#[derive(Error, Debug)]
pub enum OverlayError {
    /// Every probed port was already bound by someone else.
    #[error("all overlay ports in use starting at {start}")]
    PortsInUse {
        /// The first port probed.
        start: u16,
    },
    /// An operation was attempted before `run` or after shutdown.
    #[error("overlay node is not running")]
    NotRunning,
    /// A `get` did not complete inside the caller's wait window.
    #[error("timed out waiting for the overlay")]
    Timeout,
    /// A bootstrap peer could not be resolved.
    #[error("cannot resolve bootstrap peer {peer}")]
    BadPeer {
        /// The peer address as given by the caller.
        peer: String,
    },
    /// An I/O error from the socket layer.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
