use std::fmt;

use searchlink_core::NodeAddress;
use serde::{Deserialize, Serialize};

/// Identifier of a logical sub-channel on a shared (multiplexed) channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MuxId(pub u16);

impl From<u16> for MuxId {
    fn from(id: u16) -> Self {
        Self(id)
    }
}

impl fmt::Display for MuxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Role of a message in the request/reply exchange
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageKind {
    /// Fire-and-forget; no reply is expected
    Oneway,
    /// Expects a `Reply` carrying the same id
    Request { id: u64 },
    /// Answer to a `Request`; `error` is set when the remote handler failed
    Reply { id: u64, error: Option<String> },
}

/// Unit of exchange on a group channel
///
/// The payload is opaque to the fabric. A message without `dest` is
/// delivered to every member of the view, the sender included.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub src: Option<NodeAddress>,
    pub dest: Option<NodeAddress>,
    pub mux_id: Option<MuxId>,
    pub kind: MessageKind,
    pub payload: Vec<u8>,
}

impl Message {
    pub fn new(dest: Option<NodeAddress>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            src: None,
            dest,
            mux_id: None,
            kind: MessageKind::Oneway,
            payload: payload.into(),
        }
    }

    pub fn broadcast(payload: impl Into<Vec<u8>>) -> Self {
        Self::new(None, payload)
    }

    pub fn unicast(dest: NodeAddress, payload: impl Into<Vec<u8>>) -> Self {
        Self::new(Some(dest), payload)
    }

    pub fn with_mux_id(mut self, id: MuxId) -> Self {
        self.mux_id = Some(id);
        self
    }

    pub fn is_broadcast(&self) -> bool {
        self.dest.is_none()
    }
}
