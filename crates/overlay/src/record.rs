//! Typed overlay records.

use serde::{Deserialize, Serialize};

//================================================================================================
// Types
//================================================================================================

/// One typed value stored at an overlay key.
///
/// The `(kind, id)` pair governs coexistence: at a given key, records with
/// distinct pairs accumulate, while a record arriving with an already-stored
/// pair is resolved through the kind's edit callback.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// The registered kind id.
    pub kind: u16,
    /// The 64-bit record id disambiguator.
    pub id: u64,
    /// The opaque payload.
    #[serde(with = "hex::serde")]
    pub payload: Vec<u8>,
    /// Microseconds since the epoch, assigned by the first replica to
    /// store the record. Zero until then.
    pub timestamp: u64,
}

//================================================================================================
// Impls
//================================================================================================

impl Record {
    /// A fresh, unstamped record.
    pub fn new(kind: u16, id: u64, payload: impl Into<Vec<u8>>) -> Self {
        Record {
            kind,
            id,
            payload: payload.into(),
            timestamp: 0,
        }
    }

    /// The payload reinterpreted as UTF-8, lossily.
    pub fn payload_str(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.payload)
    }
}
