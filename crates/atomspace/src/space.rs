//! # Named Atom Collections
//!
//! An [`AtomSpace`] is a named, deduplicating collection of atoms. Because
//! atom identity is content, the space interns by canonical serialization:
//! adding a structurally equal atom twice returns the same resident handle,
//! and the second add merges its value map onto the first.
//!
//! The table is concurrent; readers and writers on different atoms never
//! contend.

use dashmap::DashMap;

use crate::atom::{Atom, Handle};

//================================================================================================
// Types
//================================================================================================

/// A named collection of atoms, deduplicated by content.
pub struct AtomSpace {
    name: String,
    table: DashMap<String, Handle>,
}

//================================================================================================
// Impls
//================================================================================================

impl AtomSpace {
    /// Creates an empty space with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        AtomSpace {
            name: name.into(),
            table: DashMap::new(),
        }
    }

    /// The user-chosen name of this space.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Inserts `atom` (and, for links, its entire outgoing tree) into the
    /// space, returning the resident handle.
    ///
    /// When a structurally equal atom is already resident, its handle is
    /// returned and the incoming atom's value map is merged onto it.
    pub fn add_atom(&self, atom: &Handle) -> Handle {
        let interned = if atom.is_link() {
            let outgoing = atom.outgoing().iter().map(|c| self.add_atom(c)).collect();
            Atom::link(atom.type_name(), outgoing)
        } else {
            atom.clone()
        };

        let key = crate::sexpr::encode_atom(&interned);
        let resident = self
            .table
            .entry(key)
            .or_insert_with(|| {
                tracing::trace!(space = %self.name, atom = %interned, "new atom");
                interned.clone()
            })
            .clone();
        if !std::ptr::eq(resident.as_ref(), atom.as_ref()) {
            resident.absorb_values(atom);
        }
        resident
    }

    /// Creates (or fetches the resident copy of) a node.
    pub fn create_node(&self, ty: impl Into<String>, name: impl Into<String>) -> Handle {
        self.add_atom(&Atom::node(ty, name))
    }

    /// Creates (or fetches the resident copy of) a link.
    pub fn create_link(&self, ty: impl Into<String>, outgoing: Vec<Handle>) -> Handle {
        self.add_atom(&Atom::link(ty, outgoing))
    }

    /// Looks up the resident handle of a structurally equal atom.
    pub fn get(&self, atom: &Handle) -> Option<Handle> {
        self.table
            .get(&crate::sexpr::encode_atom(atom))
            .map(|r| r.clone())
    }

    /// The number of resident atoms.
    pub fn len(&self) -> usize {
        self.table.len()
    }

    /// Whether the space holds no atoms.
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// A snapshot of every resident node.
    pub fn nodes(&self) -> Vec<Handle> {
        self.collect(|a| a.is_node())
    }

    /// A snapshot of every resident link.
    pub fn links(&self) -> Vec<Handle> {
        self.collect(|a| a.is_link())
    }

    /// A snapshot of every resident atom with the given type name.
    pub fn atoms_of_type(&self, ty: &str) -> Vec<Handle> {
        self.collect(|a| a.type_name() == ty)
    }

    /// A snapshot of every resident atom.
    pub fn atoms(&self) -> Vec<Handle> {
        self.collect(|_| true)
    }

    fn collect(&self, pred: impl Fn(&Atom) -> bool) -> Vec<Handle> {
        let mut out: Vec<Handle> = self
            .table
            .iter()
            .filter(|e| pred(e.value()))
            .map(|e| e.value().clone())
            .collect();
        // Deterministic order for callers that iterate and publish.
        out.sort();
        out
    }
}

//================================================================================================
// Tests
//================================================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    #[test]
    fn add_is_idempotent() {
        let space = AtomSpace::new("test");
        let a = space.create_node("Concept", "foo");
        let b = space.create_node("Concept", "foo");
        assert!(std::ptr::eq(a.as_ref(), b.as_ref()));
        assert_eq!(space.len(), 1);
    }

    #[test]
    fn add_interns_outgoing() {
        let space = AtomSpace::new("test");
        let foo = space.create_node("Concept", "foo");
        let link = space.add_atom(&Atom::link("List", vec![Atom::node("Concept", "foo")]));
        assert!(std::ptr::eq(foo.as_ref(), link.outgoing()[0].as_ref()));
        assert_eq!(space.len(), 2);
    }

    #[test]
    fn second_add_merges_values() {
        let space = AtomSpace::new("test");
        let key = Atom::node("Predicate", "weight");

        let fresh = Atom::node("Concept", "foo");
        fresh.set_value(&key, Value::float(1.0));
        let resident = space.add_atom(&fresh);

        let again = Atom::node("Concept", "foo");
        again.set_value(&key, Value::float(2.0));
        let merged = space.add_atom(&again);

        assert!(std::ptr::eq(resident.as_ref(), merged.as_ref()));
        assert_eq!(resident.get_value(&key), Some(Value::float(2.0)));
    }

    #[test]
    fn type_filtered_snapshots() {
        let space = AtomSpace::new("test");
        let foo = space.create_node("Concept", "foo");
        let bar = space.create_node("Predicate", "bar");
        space.create_link("List", vec![foo, bar]);

        assert_eq!(space.nodes().len(), 2);
        assert_eq!(space.links().len(), 1);
        assert_eq!(space.atoms_of_type("Concept").len(), 1);
        assert_eq!(space.atoms_of_type("List").len(), 1);
    }
}
