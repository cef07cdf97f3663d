//! # AtomSpace Crate
//!
//! The `atomspace` crate provides the typed hypergraph data model that the
//! rest of the workspace persists and queries: atoms (nodes and links), the
//! values attached to them, and named collections of atoms.
//!
//! ## Key Concepts
//!
//! **Atoms** are immutable, content-addressed records. A [`Atom`] is either a
//! *node* (a type name paired with a string name) or a *link* (a type name
//! paired with an ordered tuple of other atoms). Two atoms with the same
//! canonical serialization are the same atom; equality, hashing, and ordering
//! all follow content alone.
//!
//! **Values** are mutable metadata attached to an atom under atom-valued
//! keys. The value map does not contribute to the atom's identity.
//!
//! **AtomSpaces** are named collections of atoms, deduplicated by content, so
//! that inserting a structurally equal atom twice yields the same resident
//! handle both times.
//!
//! ## Architecture
//!
//! The crate is organized into several key modules:
//! - [`atom`] - Atom construction, content identity, and value maps
//! - [`value`] - The value sum type
//! - [`space`] - Named, deduplicating atom collections
//! - [`sexpr`] - The canonical s-expression codec for atoms and values
//! - [`store`] - The backing-store contract a persistence layer implements
//!
//! ## Basic Usage
//!
//! ```rust
//! use atomspace::{AtomSpace, Value};
//!
//! let space = AtomSpace::new("example");
//! let foo = space.create_node("Concept", "foo");
//! let bar = space.create_node("Concept", "bar");
//! let pair = space.create_link("List", vec![foo, bar]);
//! assert!(pair.is_link());
//!
//! let key = space.create_node("Predicate", "count");
//! pair.set_value(&key, Value::Floats(vec![2.0]));
//! ```
#![deny(missing_docs)]

pub mod atom;
pub mod sexpr;
pub mod space;
pub mod store;
pub mod value;

pub use atom::{Atom, Handle};
pub use space::AtomSpace;
pub use store::BackingStore;
pub use value::Value;
