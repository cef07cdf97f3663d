//! # Canonical S-Expression Codec
//!
//! This module provides the canonical serialization for atoms and values.
//! The encoded form is the *identity* of an atom — overlay keys and content
//! hashes are computed from these strings — so the format is normative and
//! deliberately rigid:
//!
//! - A node is `(<TypeName> "<name>")`; a link is `(<TypeName> <child> …)`.
//! - Exactly one space separates tokens; there is no other whitespace.
//! - Quotes inside node names are escaped with a backslash, as is the
//!   backslash itself.
//!
//! Value payloads use the same shape with the value type as the head token:
//!
//! ```text
//! (FloatValue 0.5 0.25)
//! (StringValue "a" "b")
//! (LinkValue (FloatValue 1) (StringValue "x"))
//! (SimpleTruthValue 0.7 0.9)
//! ```
//!
//! A whole value map is an association list of dotted pairs:
//!
//! ```text
//! (((Predicate "key") . (FloatValue 1)) ((Predicate "other") . (StringValue "v")))
//! ```
//!
//! Decoding is offset-based so that callers can pull one atom out of the
//! middle of a larger payload (membership records prefix serializations with
//! an operation tag and a timestamp) and continue from the returned offset.

use nom::IResult;
use nom::bytes::complete::{tag, take_while1};
use nom::character::complete::char;
use nom::combinator::all_consuming;
use nom::error::{Error, ErrorKind};
use nom::multi::{many0, separated_list0};
use nom::number::complete::double;
use nom::sequence::{delimited, preceded, separated_pair};
use thiserror::Error as ThisError;

use crate::atom::{Atom, Handle};
use crate::value::Value;

//================================================================================================
// Types
//================================================================================================

/// An error encountered while decoding a canonical serialization.
#[derive(ThisError, Debug, PartialEq, Eq)]
pub enum SexprError {
    /// The input is not a well-formed s-expression.
    #[error("malformed s-expression at byte {offset} of {input:?}")]
    Malformed {
        /// The full input that failed to parse.
        input: String,
        /// Byte offset of the first unparsable token.
        offset: usize,
    },
}

//================================================================================================
// Functions
//================================================================================================

/// Encodes an atom into its canonical serialization.
pub fn encode_atom(atom: &Atom) -> String {
    match atom.name() {
        Some(name) => format!("({} \"{}\")", atom.type_name(), escape(name)),
        None => {
            let mut out = String::from("(");
            out.push_str(atom.type_name());
            for child in atom.outgoing() {
                out.push(' ');
                out.push_str(&encode_atom(child));
            }
            out.push(')');
            out
        }
    }
}

/// Decodes one atom from `input` starting at byte `offset`.
///
/// Returns the atom and the offset of the first byte past its closing
/// paren, so that callers can continue scanning a larger payload.
///
/// # Errors
///
/// Returns [`SexprError::Malformed`] when no well-formed atom starts at
/// `offset`.
pub fn decode_atom(input: &str, offset: usize) -> Result<(Handle, usize), SexprError> {
    let slice = input.get(offset..).ok_or_else(|| malformed(input, offset))?;
    match atom(slice) {
        Ok((rest, h)) => Ok((h, input.len() - rest.len())),
        Err(e) => Err(from_nom(input, e)),
    }
}

/// Decodes a serialization that must contain exactly one atom.
///
/// # Errors
///
/// Returns [`SexprError::Malformed`] on any leftover or missing input.
pub fn decode_atom_exact(input: &str) -> Result<Handle, SexprError> {
    match all_consuming(atom)(input) {
        Ok((_, h)) => Ok(h),
        Err(e) => Err(from_nom(input, e)),
    }
}

/// Encodes a value into its canonical serialization.
pub fn encode_value(value: &Value) -> String {
    let mut out = String::from("(");
    out.push_str(value.type_name());
    match value {
        Value::Floats(fs) => {
            for f in fs {
                out.push(' ');
                out.push_str(&format_float(*f));
            }
        }
        Value::Strings(ss) => {
            for s in ss {
                out.push(' ');
                out.push('"');
                out.push_str(&escape(s));
                out.push('"');
            }
        }
        Value::Link(vs) => {
            for v in vs {
                out.push(' ');
                out.push_str(&encode_value(v));
            }
        }
        Value::Truth(strength, confidence) => {
            out.push(' ');
            out.push_str(&format_float(*strength));
            out.push(' ');
            out.push_str(&format_float(*confidence));
        }
    }
    out.push(')');
    out
}

/// Decodes a serialization that must contain exactly one value.
///
/// # Errors
///
/// Returns [`SexprError::Malformed`] on any leftover or missing input.
pub fn decode_value_exact(input: &str) -> Result<Value, SexprError> {
    match all_consuming(value)(input) {
        Ok((_, v)) => Ok(v),
        Err(e) => Err(from_nom(input, e)),
    }
}

/// Encodes an atom's whole value map as an association list of dotted
/// pairs, ordered by key serialization.
pub fn encode_atom_values(atom: &Atom) -> String {
    let mut out = String::from("(");
    let mut first = true;
    for (key, val) in atom.value_map() {
        if !first {
            out.push(' ');
        }
        first = false;
        out.push('(');
        out.push_str(&encode_atom(&key));
        out.push_str(" . ");
        out.push_str(&encode_value(&val));
        out.push(')');
    }
    out.push(')');
    out
}

/// Decodes an association-list payload and installs every key/value pair
/// on `atom`.
///
/// # Errors
///
/// Returns [`SexprError::Malformed`] when the payload is not a well-formed
/// association list; no pairs are installed in that case.
pub fn decode_alist(atom: &Handle, input: &str) -> Result<(), SexprError> {
    let pairs = match all_consuming(alist)(input) {
        Ok((_, pairs)) => pairs,
        Err(e) => return Err(from_nom(input, e)),
    };
    for (key, val) in pairs {
        atom.set_value(&key, val);
    }
    Ok(())
}

fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if c == '"' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Floats print in shortest round-trip form; integral floats drop the
/// fraction entirely, matching the canonical wire text.
fn format_float(f: f64) -> String {
    format!("{f}")
}

fn malformed(input: &str, offset: usize) -> SexprError {
    SexprError::Malformed {
        input: input.to_string(),
        offset,
    }
}

fn from_nom(input: &str, err: nom::Err<Error<&str>>) -> SexprError {
    let offset = match err {
        nom::Err::Error(e) | nom::Err::Failure(e) => input.len() - e.input.len(),
        nom::Err::Incomplete(_) => input.len(),
    };
    malformed(input, offset)
}

//================================================================================================
// Parsers
//================================================================================================

fn type_name(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| c.is_alphanumeric())(input)
}

/// A double-quoted string with backslash escapes. Returns the unescaped
/// contents.
fn quoted(input: &str) -> IResult<&str, String> {
    let (rest, _) = char('"')(input)?;
    let mut out = String::new();
    let mut iter = rest.char_indices();
    while let Some((i, c)) = iter.next() {
        match c {
            '\\' => match iter.next() {
                Some((_, esc)) => out.push(esc),
                None => return Err(nom::Err::Error(Error::new(rest, ErrorKind::Escaped))),
            },
            '"' => return Ok((&rest[i + 1..], out)),
            _ => out.push(c),
        }
    }
    Err(nom::Err::Error(Error::new(rest, ErrorKind::Char)))
}

fn atom(input: &str) -> IResult<&str, Handle> {
    let (rest, _) = char('(')(input)?;
    let (rest, ty) = type_name(rest)?;
    // A quoted token after the type name makes this a node; otherwise the
    // remaining tokens are the outgoing tuple of a link.
    if let Ok((rest, name)) = preceded(char(' '), quoted)(rest) {
        let (rest, _) = char(')')(rest)?;
        return Ok((rest, Atom::node(ty, name)));
    }
    let (rest, children) = many0(preceded(char(' '), atom))(rest)?;
    let (rest, _) = char(')')(rest)?;
    Ok((rest, Atom::link(ty, children)))
}

fn value(input: &str) -> IResult<&str, Value> {
    let (rest, _) = char('(')(input)?;
    let (rest, ty) = type_name(rest)?;
    let (rest, v) = match ty {
        "FloatValue" => {
            let (r, fs) = many0(preceded(char(' '), double))(rest)?;
            (r, Value::Floats(fs))
        }
        "StringValue" => {
            let (r, ss) = many0(preceded(char(' '), quoted))(rest)?;
            (r, Value::Strings(ss))
        }
        "LinkValue" => {
            let (r, vs) = many0(preceded(char(' '), value))(rest)?;
            (r, Value::Link(vs))
        }
        "SimpleTruthValue" => {
            let (r, strength) = preceded(char(' '), double)(rest)?;
            let (r, confidence) = preceded(char(' '), double)(r)?;
            (r, Value::Truth(strength, confidence))
        }
        _ => return Err(nom::Err::Error(Error::new(input, ErrorKind::Tag))),
    };
    let (rest, _) = char(')')(rest)?;
    Ok((rest, v))
}

fn pair(input: &str) -> IResult<&str, (Handle, Value)> {
    delimited(
        char('('),
        separated_pair(atom, tag(" . "), value),
        char(')'),
    )(input)
}

fn alist(input: &str) -> IResult<&str, Vec<(Handle, Value)>> {
    delimited(char('('), separated_list0(char(' '), pair), char(')'))(input)
}

//================================================================================================
// Tests
//================================================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_round_trip() {
        let n = Atom::node("Concept", "foobar");
        let s = encode_atom(&n);
        assert_eq!(s, "(Concept \"foobar\")");
        let (back, end) = decode_atom(&s, 0).unwrap();
        assert_eq!(back, n);
        assert_eq!(end, s.len());
    }

    #[test]
    fn nested_link_round_trip() {
        let link = Atom::link(
            "Evaluation",
            vec![
                Atom::node("Predicate", "blort"),
                Atom::link(
                    "List",
                    vec![Atom::node("Concept", "foo"), Atom::node("Concept", "bar")],
                ),
            ],
        );
        let s = encode_atom(&link);
        assert_eq!(
            s,
            "(Evaluation (Predicate \"blort\") (List (Concept \"foo\") (Concept \"bar\")))"
        );
        assert_eq!(decode_atom_exact(&s).unwrap(), link);
    }

    #[test]
    fn empty_outgoing_link() {
        let l = Atom::link("List", vec![]);
        let s = encode_atom(&l);
        assert_eq!(s, "(List)");
        assert_eq!(decode_atom_exact(&s).unwrap(), l);
    }

    #[test]
    fn name_escaping() {
        let n = Atom::node("Concept", "say \"hi\" \\ there");
        let s = encode_atom(&n);
        assert_eq!(s, "(Concept \"say \\\"hi\\\" \\\\ there\")");
        assert_eq!(decode_atom_exact(&s).unwrap(), n);
    }

    #[test]
    fn decode_from_offset() {
        let payload = "add 1568145805.537182 (Concept \"foobar\")";
        let start = payload.find('(').unwrap();
        let (atom, end) = decode_atom(payload, start).unwrap();
        assert_eq!(atom, Atom::node("Concept", "foobar"));
        assert_eq!(end, payload.len());
    }

    #[test]
    fn truncated_input_is_malformed() {
        let err = decode_atom_exact("(Concept \"foo").unwrap_err();
        assert!(matches!(err, SexprError::Malformed { .. }));
    }

    #[test]
    fn trailing_garbage_is_malformed() {
        let err = decode_atom_exact("(Concept \"foo\") junk").unwrap_err();
        let SexprError::Malformed { offset, .. } = err;
        assert_eq!(offset, "(Concept \"foo\")".len());
    }

    #[test]
    fn value_round_trips() {
        let cases = vec![
            Value::Floats(vec![1.0, 2.5, -3.0]),
            Value::Strings(vec!["a".into(), "with \"quote\"".into()]),
            Value::Link(vec![Value::float(1.0), Value::string("x")]),
            Value::Truth(0.7, 0.9),
        ];
        for v in cases {
            let s = encode_value(&v);
            assert_eq!(decode_value_exact(&s).unwrap(), v, "payload {s}");
        }
    }

    #[test]
    fn truth_value_wire_form() {
        assert_eq!(
            encode_value(&Value::Truth(0.7, 0.9)),
            "(SimpleTruthValue 0.7 0.9)"
        );
    }

    #[test]
    fn unknown_value_type_rejected() {
        assert!(decode_value_exact("(Mystery 1 2)").is_err());
    }

    #[test]
    fn alist_round_trip() {
        let a = Atom::node("Concept", "foo");
        let tv_key = Atom::node("Predicate", "*-TruthValueKey-*");
        let count = Atom::node("Predicate", "count");
        a.set_value(&tv_key, Value::Truth(0.7, 0.9));
        a.set_value(&count, Value::Floats(vec![42.0]));

        let payload = encode_atom_values(&a);
        let b = Atom::node("Concept", "foo");
        decode_alist(&b, &payload).unwrap();
        assert_eq!(b.get_value(&tv_key), Some(Value::Truth(0.7, 0.9)));
        assert_eq!(b.get_value(&count), Some(Value::Floats(vec![42.0])));
        assert_eq!(b.keys().len(), 2);
    }

    #[test]
    fn empty_alist() {
        let a = Atom::node("Concept", "foo");
        assert_eq!(encode_atom_values(&a), "()");
        decode_alist(&a, "()").unwrap();
        assert!(a.keys().is_empty());
    }
}
