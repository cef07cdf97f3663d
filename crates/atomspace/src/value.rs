//! The value sum type: typed metadata attachable to an atom under a key.

//================================================================================================
// Types
//================================================================================================

/// A typed payload attached to an atom under an atom-valued key.
///
/// Values never contribute to atom identity; they are free-floating
/// metadata with last-writer-wins semantics in the persistence layer.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    /// A vector of double-precision floats.
    Floats(Vec<f64>),
    /// A vector of strings.
    Strings(Vec<String>),
    /// A vector of other values.
    Link(Vec<Value>),
    /// A simple truth value: strength and confidence.
    Truth(f64, f64),
}

//================================================================================================
// Impls
//================================================================================================

impl Value {
    /// Convenience constructor for a single-element float vector.
    pub fn float(f: f64) -> Self {
        Value::Floats(vec![f])
    }

    /// Convenience constructor for a single-element string vector.
    pub fn string(s: impl Into<String>) -> Self {
        Value::Strings(vec![s.into()])
    }

    /// The wire type name used in the canonical serialization.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Floats(_) => "FloatValue",
            Value::Strings(_) => "StringValue",
            Value::Link(_) => "LinkValue",
            Value::Truth(..) => "SimpleTruthValue",
        }
    }
}
