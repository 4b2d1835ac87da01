//! Error types for configuration loading and per-message processing.

use crate::routing::RouterId;

/// Fatal configuration problems. Startup is aborted on any of these.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("missing directive: {0}")]
    Missing(&'static str),

    #[error("router id {0} outside 1..=64000")]
    RouterIdOutOfRange(u32),

    #[error("port {0} outside 1024..=64000")]
    PortOutOfRange(u32),

    #[error("duplicate port {0}")]
    DuplicatePort(u16),

    #[error("neighbor {id}: link cost {cost} outside 1..=15")]
    CostOutOfRange { id: RouterId, cost: u32 },

    #[error("neighbor id {0} outside 1..=64000")]
    NeighborIdOutOfRange(u32),

    #[error("duplicate neighbor {0}")]
    DuplicateNeighbor(RouterId),

    #[error("neighbor {0} has the router's own id")]
    NeighborIsSelf(RouterId),

    #[error("no input ports configured")]
    NoInputPorts,

    #[error("no neighbors configured")]
    NoNeighbors,
}

/// Reasons a received datagram could not be turned into an advertisement.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("datagram too short: need {min} bytes, got {actual}")]
    TooShort { min: usize, actual: usize },

    #[error("body length {0} is not a multiple of the entry size")]
    Misaligned(usize),

    #[error("too many entries: {0}")]
    TooManyEntries(usize),

    #[error("unsupported command {0}")]
    Command(u8),

    #[error("unsupported version {0}")]
    Version(u8),

    #[error("unsupported address family {0}")]
    AddressFamily(u16),

    #[error("metric {metric} for destination {destination} outside 0..=16")]
    Metric { destination: u32, metric: u32 },

    #[error("router id {0} outside 1..=64000")]
    RouterId(u32),
}

impl DecodeError {
    /// True for well-framed messages carrying an invalid field value.
    pub fn is_protocol_violation(&self) -> bool {
        !matches!(
            self,
            DecodeError::TooShort { .. } | DecodeError::Misaligned(_) | DecodeError::TooManyEntries(_)
        )
    }
}

/// Why a single inbound message was dropped without touching the table.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RejectReason {
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("sender {0} is not a configured neighbor")]
    UnknownSender(RouterId),

    #[error("message carries our own router id")]
    OwnMessage,
}
