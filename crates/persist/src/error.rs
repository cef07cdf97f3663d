//! The error surface of the persistence layer.

use std::time::Duration;

use thiserror::Error;

use atomspace::sexpr::SexprError;
use overlay::OverlayError;

/// An error surfaced by [`DhtStorage`](crate::DhtStorage) operations.
#[derive(Error, Debug)]
pub enum StorageError {
    /// The connection string is malformed.
    #[error("bad URI {uri:?}: {reason}")]
    BadUri {
        /// The offending connection string.
        uri: String,
        /// What was wrong with it.
        reason: String,
    },
    /// An operation was attempted before `open` or after `close`.
    #[error("no atomspace is open")]
    NotConnected,
    /// A write was attempted on an observing-only connection.
    #[error("write attempted on observing-only connection {uri}")]
    ObservingOnly {
        /// The connection string of the observing instance.
        uri: String,
    },
    /// The overlay did not answer a `get` inside the wait window.
    #[error("overlay did not answer within {}ms for key {key}", .wait.as_millis())]
    OverlayUnavailable {
        /// Hex of the key that was being fetched.
        key: String,
        /// The wait window that expired.
        wait: Duration,
    },
    /// A GUID lookup returned no records.
    #[error("no atom record found at key {key}")]
    NotFound {
        /// Hex of the key that came up empty.
        key: String,
    },
    /// A payload failed to parse.
    #[error(transparent)]
    Decode(#[from] SexprError),
    /// Ten successive ports failed to bind on startup.
    #[error("all overlay ports in use starting at {start}")]
    PortInUse {
        /// The first port probed.
        start: u16,
    },
    /// An I/O error from the overlay socket layer.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl StorageError {
    pub(crate) fn from_overlay(err: OverlayError, key: Option<&overlay::InfoHash>) -> Self {
        match err {
            OverlayError::PortsInUse { start } => StorageError::PortInUse { start },
            OverlayError::NotRunning => StorageError::NotConnected,
            OverlayError::Timeout => StorageError::OverlayUnavailable {
                key: key.map(ToString::to_string).unwrap_or_default(),
                wait: Duration::ZERO,
            },
            OverlayError::BadPeer { peer } => StorageError::BadUri {
                uri: peer,
                reason: "bootstrap peer does not resolve".into(),
            },
            OverlayError::Io(e) => StorageError::Io(e),
        }
    }
}
