//! # Atom Construction and Identity
//!
//! An [`Atom`] is an immutable node-or-link record whose identity is its
//! content: the type name plus either the node name or the ordered outgoing
//! tuple. The attached value map is deliberately excluded from equality,
//! hashing, and ordering, so an atom's identity never changes after
//! construction while its metadata remains freely editable.
//!
//! Atoms are always handled through [`Handle`], a shared pointer, because
//! links hold their children by handle and the same atom may be referenced
//! from many places at once.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::value::Value;

/// A shared, immutable reference to an [`Atom`].
pub type Handle = Arc<Atom>;

//================================================================================================
// Types
//================================================================================================

/// An immutable node-or-link record with a mutable value map attached.
pub struct Atom {
    body: Body,
    values: Mutex<BTreeMap<Handle, Value>>,
}

/// The content of an atom; this is the part identity is computed from.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
enum Body {
    Node { ty: String, name: String },
    Link { ty: String, outgoing: Vec<Handle> },
}

//================================================================================================
// Impls
//================================================================================================

impl Atom {
    /// Creates a node: a type name paired with a string name.
    pub fn node(ty: impl Into<String>, name: impl Into<String>) -> Handle {
        Arc::new(Atom {
            body: Body::Node {
                ty: ty.into(),
                name: name.into(),
            },
            values: Mutex::new(BTreeMap::new()),
        })
    }

    /// Creates a link: a type name paired with an ordered outgoing tuple.
    pub fn link(ty: impl Into<String>, outgoing: Vec<Handle>) -> Handle {
        Arc::new(Atom {
            body: Body::Link {
                ty: ty.into(),
                outgoing,
            },
            values: Mutex::new(BTreeMap::new()),
        })
    }

    /// Whether this atom is a node.
    pub fn is_node(&self) -> bool {
        matches!(self.body, Body::Node { .. })
    }

    /// Whether this atom is a link.
    pub fn is_link(&self) -> bool {
        matches!(self.body, Body::Link { .. })
    }

    /// The atom's type name, e.g. `"Concept"` or `"Evaluation"`.
    pub fn type_name(&self) -> &str {
        match &self.body {
            Body::Node { ty, .. } | Body::Link { ty, .. } => ty,
        }
    }

    /// The node name, or `None` for links.
    pub fn name(&self) -> Option<&str> {
        match &self.body {
            Body::Node { name, .. } => Some(name),
            Body::Link { .. } => None,
        }
    }

    /// The outgoing tuple; empty for nodes.
    pub fn outgoing(&self) -> &[Handle] {
        match &self.body {
            Body::Node { .. } => &[],
            Body::Link { outgoing, .. } => outgoing,
        }
    }

    /// The number of children in the outgoing tuple.
    pub fn arity(&self) -> usize {
        self.outgoing().len()
    }

    /// The 64-bit content hash: the leading eight bytes of the BLAKE3
    /// digest of the canonical serialization, big-endian.
    ///
    /// This is the disambiguator carried on overlay records; it is
    /// deliberately narrower than the 160-bit overlay key.
    pub fn content_hash_64(&self) -> u64 {
        let digest = blake3::hash(crate::sexpr::encode_atom(self).as_bytes());
        let mut eight = [0u8; 8];
        eight.copy_from_slice(&digest.as_bytes()[..8]);
        u64::from_be_bytes(eight)
    }

    /// All keys currently present in the value map.
    pub fn keys(&self) -> Vec<Handle> {
        self.values.lock().keys().cloned().collect()
    }

    /// Looks up the value stored under `key`.
    pub fn get_value(&self, key: &Handle) -> Option<Value> {
        self.values.lock().get(key).cloned()
    }

    /// Stores `value` under `key`, replacing any previous value.
    pub fn set_value(&self, key: &Handle, value: Value) {
        self.values.lock().insert(key.clone(), value);
    }

    /// A snapshot of the whole value map, ordered by key serialization.
    pub fn value_map(&self) -> Vec<(Handle, Value)> {
        self.values
            .lock()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Copies every key/value pair of `other` onto this atom.
    pub fn absorb_values(&self, other: &Atom) {
        for (k, v) in other.value_map() {
            self.set_value(&k, v);
        }
    }

}

impl PartialEq for Atom {
    fn eq(&self, other: &Self) -> bool {
        self.body == other.body
    }
}

impl Eq for Atom {}

impl PartialOrd for Atom {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Atom {
    fn cmp(&self, other: &Self) -> Ordering {
        self.body.cmp(&other.body)
    }
}

impl Hash for Atom {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.body.hash(state);
    }
}

impl fmt::Display for Atom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&crate::sexpr::encode_atom(self))
    }
}

impl fmt::Debug for Atom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Atom({})", self)
    }
}

//================================================================================================
// Tests
//================================================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_is_structural() {
        let a = Atom::node("Concept", "foo");
        let b = Atom::node("Concept", "foo");
        assert_eq!(a, b);
        assert_eq!(a.content_hash_64(), b.content_hash_64());

        let c = Atom::node("Concept", "bar");
        assert_ne!(a, c);
    }

    #[test]
    fn values_do_not_affect_identity() {
        let a = Atom::node("Concept", "foo");
        let b = Atom::node("Concept", "foo");
        let key = Atom::node("Predicate", "weight");
        a.set_value(&key, Value::Floats(vec![1.0]));
        assert_eq!(a, b);
        assert_eq!(a.content_hash_64(), b.content_hash_64());
    }

    #[test]
    fn link_outgoing_order_matters() {
        let foo = Atom::node("Concept", "foo");
        let bar = Atom::node("Concept", "bar");
        let ab = Atom::link("List", vec![foo.clone(), bar.clone()]);
        let ba = Atom::link("List", vec![bar, foo]);
        assert_ne!(ab, ba);
    }

    #[test]
    fn value_map_round_trip() {
        let a = Atom::node("Concept", "foo");
        let key = Atom::node("Predicate", "weight");
        a.set_value(&key, Value::Floats(vec![0.5, 0.25]));
        assert_eq!(a.get_value(&key), Some(Value::Floats(vec![0.5, 0.25])));
        assert_eq!(a.keys().len(), 1);
    }
}
