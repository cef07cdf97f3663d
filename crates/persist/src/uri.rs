//! # Connection-String Grammar
//!
//! Storage instances and bootstrap peers are both named by `dht://` URIs:
//!
//! ```text
//! dht://[host][:port]/<space-name>
//! ```
//!
//! - `dht:///alpha` - open the space `alpha` on a local node, default port
//! - `dht://:4444/alpha` - open `alpha` on a local node bound to port 4444
//! - `dht://bootstrap.example:4343/` - a peer to bootstrap against
//!
//! The host is optional (empty means local only) and the port defaults to
//! the configured one. A space name of length zero or one signals
//! *observing mode*: the node participates in the overlay but no space is
//! subscribed and every write is refused. Anything after a second slash in
//! the name is ignored.

use std::fmt::Display;
use std::str::FromStr;

use nom::IResult;
use nom::bytes::complete::{tag, take_until};
use nom::character::complete::digit1;
use nom::combinator::{all_consuming, map, opt};
use nom::sequence::{separated_pair, tuple};

use crate::error::StorageError;

//================================================================================================
// Types
//================================================================================================

/// The parsed components of a `dht://` connection string.
///
/// It is typically created through the `FromStr` implementation, not
/// constructed directly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DhtUri {
    /// The remote host, if any. Empty for local-node URIs.
    host: Option<String>,
    /// The port, if one was spelled out.
    port: Option<u16>,
    /// The space name; possibly empty (observing mode).
    space: String,
}

//================================================================================================
// Impls
//================================================================================================

impl DhtUri {
    /// The remote host named by the URI, if any.
    pub fn host(&self) -> Option<&str> {
        self.host.as_deref()
    }

    /// The port spelled out in the URI, if any.
    pub fn port(&self) -> Option<u16> {
        self.port
    }

    /// The space name; possibly empty.
    pub fn space(&self) -> &str {
        &self.space
    }

    /// Whether this URI selects observing mode (space name of length one
    /// or less).
    pub fn observing(&self) -> bool {
        self.space.len() <= 1
    }
}

impl Display for DhtUri {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "dht://")?;
        if let Some(host) = &self.host {
            write!(f, "{host}")?;
        }
        if let Some(port) = self.port {
            write!(f, ":{port}")?;
        }
        write!(f, "/{}", self.space)
    }
}

impl FromStr for DhtUri {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bad = |reason: &str| StorageError::BadUri {
            uri: s.to_string(),
            reason: reason.to_string(),
        };

        let rest = s.strip_prefix("dht://").ok_or_else(|| bad("unknown URI scheme"))?;
        if rest.is_empty() {
            return Err(bad("missing space name"));
        }

        let (path, authority) = match split_authority(rest) {
            Ok((path, Some(authority))) => (path, authority),
            _ => (rest, ""),
        };

        let (host, port) = match parse_port(authority) {
            Ok((_, Some((host, digits)))) => {
                let port: u16 = digits.parse().map_err(|_| bad("invalid port"))?;
                (not_empty(host), Some(port))
            }
            _ if authority.contains(':') => return Err(bad("invalid port")),
            _ => (not_empty(authority), None),
        };

        // Only the first path segment names the space.
        let space = path.split('/').next().unwrap_or_default().to_string();

        tracing::trace!(?host, ?port, %space, "{}", s);

        Ok(DhtUri {
            host: host.map(str::to_string),
            port,
            space,
        })
    }
}

//================================================================================================
// Functions
//================================================================================================

fn not_empty(input: &str) -> Option<&str> {
    if input.is_empty() { None } else { Some(input) }
}

fn split_authority(input: &str) -> IResult<&str, Option<&str>> {
    opt(map(tuple((take_until("/"), tag("/"))), |(authority, _)| {
        authority
    }))(input)
}

fn parse_port(input: &str) -> IResult<&str, Option<(&str, &str)>> {
    opt(all_consuming(separated_pair(
        take_until(":"),
        tag(":"),
        digit1,
    )))(input)
}

//================================================================================================
// Tests
//================================================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(s: &str) -> DhtUri {
        s.parse().unwrap()
    }

    #[test]
    fn local_space() {
        let uri = parse("dht:///testspace");
        assert_eq!(uri.host(), None);
        assert_eq!(uri.port(), None);
        assert_eq!(uri.space(), "testspace");
        assert!(!uri.observing());
    }

    #[test]
    fn local_space_with_port() {
        let uri = parse("dht://:4444/testspace");
        assert_eq!(uri.host(), None);
        assert_eq!(uri.port(), Some(4444));
        assert_eq!(uri.space(), "testspace");
    }

    #[test]
    fn observing_forms() {
        assert!(parse("dht:///").observing());
        assert!(parse("dht:///x").observing());
        assert!(!parse("dht:///xy").observing());
    }

    #[test]
    fn bootstrap_peer_forms() {
        let uri = parse("dht://bootstrap.example:4343/");
        assert_eq!(uri.host(), Some("bootstrap.example"));
        assert_eq!(uri.port(), Some(4343));
        assert!(uri.observing());

        let uri = parse("dht://bootstrap.example/");
        assert_eq!(uri.host(), Some("bootstrap.example"));
        assert_eq!(uri.port(), None);
    }

    #[test]
    fn trailing_segments_ignored() {
        assert_eq!(parse("dht:///alpha/beta/gamma").space(), "alpha");
    }

    #[test]
    fn display_round_trip() {
        for s in ["dht:///testspace", "dht://:4444/testspace", "dht://peer:17/"] {
            assert_eq!(parse(s).to_string(), s);
        }
    }

    #[test]
    fn rejects() {
        for s in ["", "dht://", "http://x/space", "dht", "dht://:noport/x"] {
            assert!(
                s.parse::<DhtUri>().is_err(),
                "expected {s:?} to be rejected"
            );
        }
    }
}
