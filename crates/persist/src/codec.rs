//! Tagged payload encoding for membership records.
//!
//! Space records wrap an atom's canonical serialization with an operation
//! tag and a wall-clock stamp:
//!
//! ```text
//! add 1568145805.537182 (Concept "foobar")
//! drop 1568145912.004719 (Concept "foobar")
//! ```
//!
//! The stamp is decimal seconds since the epoch with six fractional
//! digits. It is informational; record supersession is governed by the
//! overlay-assigned timestamps, not by this field.

use std::time::{SystemTime, UNIX_EPOCH};

//================================================================================================
// Types
//================================================================================================

/// The operation tag on a space record.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SpaceTag {
    /// The atom is a member of the space.
    Add,
    /// The atom has been dropped from the space.
    Drop,
}

//================================================================================================
// Functions
//================================================================================================

/// The wall-clock time right now, as double-precision seconds.
pub fn now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

/// Wraps a serialization in an `add` membership payload.
pub fn space_add(sexpr: &str) -> String {
    format!("add {:.6} {}", now(), sexpr)
}

/// Wraps a serialization in a `drop` membership payload.
pub fn space_drop(sexpr: &str) -> String {
    format!("drop {:.6} {}", now(), sexpr)
}

/// Splits a space payload into its tag and the serialization portion.
///
/// Returns `None` for payloads that carry no recognized tag or no
/// timestamp; the edit callback treats those as non-matching.
pub fn parse_space_payload(payload: &str) -> Option<(SpaceTag, &str)> {
    let (tag, rest) = if let Some(rest) = payload.strip_prefix("add ") {
        (SpaceTag::Add, rest)
    } else if let Some(rest) = payload.strip_prefix("drop ") {
        (SpaceTag::Drop, rest)
    } else {
        return None;
    };
    let (stamp, sexpr) = rest.split_once(' ')?;
    stamp.parse::<f64>().ok()?;
    Some((tag, sexpr))
}

//================================================================================================
// Tests
//================================================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_round_trip() {
        let payload = space_add("(Concept \"foo\")");
        let (tag, sexpr) = parse_space_payload(&payload).unwrap();
        assert_eq!(tag, SpaceTag::Add);
        assert_eq!(sexpr, "(Concept \"foo\")");
    }

    #[test]
    fn drop_round_trip() {
        let payload = space_drop("(Concept \"foo\")");
        let (tag, sexpr) = parse_space_payload(&payload).unwrap();
        assert_eq!(tag, SpaceTag::Drop);
        assert_eq!(sexpr, "(Concept \"foo\")");
    }

    #[test]
    fn stamp_has_six_fractional_digits() {
        let payload = space_add("(Concept \"foo\")");
        let stamp = payload.split(' ').nth(1).unwrap();
        let (_, frac) = stamp.split_once('.').unwrap();
        assert_eq!(frac.len(), 6);
    }

    #[test]
    fn untagged_payloads_do_not_parse() {
        assert_eq!(parse_space_payload("(Concept \"foo\")"), None);
        assert_eq!(parse_space_payload("added 1.0 (Concept \"x\")"), None);
        assert_eq!(parse_space_payload("add nonsense (Concept \"x\")"), None);
        assert_eq!(parse_space_payload("add 1.0"), None);
    }
}
