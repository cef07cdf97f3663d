//! The peer wire protocol: one JSON message per UDP datagram.
//!
//! Every message carries the sender's network id; receivers drop datagrams
//! from foreign networks, which is what keeps a private overlay private.
//! Payloads large enough to overflow a datagram are dropped by the socket
//! layer, consistent with the at-most-once delivery the overlay promises.

use serde::{Deserialize, Serialize};

use crate::key::InfoHash;
use crate::record::Record;

/// A peer-to-peer message.
#[derive(Serialize, Deserialize, Debug)]
pub(crate) enum Message {
    /// First contact from a bootstrapping node.
    Hello {
        /// The sender's private network id.
        network: u32,
    },
    /// Reply to a `Hello`; both sides now track each other as peers.
    HelloAck {
        /// The sender's private network id.
        network: u32,
    },
    /// Replication of one stored record.
    Put {
        /// The sender's private network id.
        network: u32,
        /// The key the record lives at.
        key: InfoHash,
        /// The stamped record.
        record: Record,
    },
    /// Request for every record a peer holds at a key.
    GetReq {
        /// The sender's private network id.
        network: u32,
        /// Correlates the response with the pending search.
        token: u64,
        /// The key being searched.
        key: InfoHash,
    },
    /// One chunk of the response to a `GetReq`. Large result sets span
    /// several datagrams; the final chunk carries `done`.
    GetResp {
        /// The token from the request.
        token: u64,
        /// The key that was searched.
        key: InfoHash,
        /// A slice of the records the peer held at the key.
        records: Vec<Record>,
        /// Whether this is the final chunk for the token.
        done: bool,
    },
}

impl Message {
    /// The network id stamped on the message, if it carries one.
    pub(crate) fn network(&self) -> Option<u32> {
        match self {
            Message::Hello { network }
            | Message::HelloAck { network }
            | Message::Put { network, .. }
            | Message::GetReq { network, .. } => Some(*network),
            Message::GetResp { .. } => None,
        }
    }
}
