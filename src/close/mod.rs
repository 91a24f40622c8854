//! Close status codes and the two-sided close handshake.
//!
//! [`CloseStatus`] classifies RFC 6455 status codes, [`CloseFrame`] parses and
//! builds close payloads, and [`CloseHandshake`] tracks which side has sent
//! its close frame so the connection can tell a completed exchange from an
//! abandoned one.

mod handshake;
mod status;

pub use handshake::{CloseFrame, CloseHandshake, CloseReaction, MAX_REASON_LEN};
pub use status::{CloseStatus, CloseStatusClass};
use thiserror::Error;

/// Errors produced while building or interpreting close frames.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum CloseError {
    /// The application tried to send a status that may not appear on the
    /// wire.
    #[error("status {status} may not be sent to a peer")]
    UnsendableStatus {
        /// Rejected status.
        status: CloseStatus,
    },

    /// The reason does not fit in a control frame.
    #[error("close reason too long: {len} > {MAX_REASON_LEN} bytes")]
    ReasonTooLong {
        /// Reason length in bytes.
        len: usize,
    },

    /// This side has already sent its close frame.
    #[error("close frame already sent")]
    AlreadySent,

    /// The peer sent a one-byte close payload.
    #[error("malformed close payload of {len} bytes")]
    MalformedPayload {
        /// Payload length.
        len: usize,
    },

    /// The peer sent a not-used or local-only status.
    #[error("peer sent invalid close status {status}")]
    InvalidPeerStatus {
        /// Status received from the peer.
        status: CloseStatus,
    },

    /// The peer's close reason is not valid UTF-8.
    #[error("close reason is not valid UTF-8")]
    InvalidReasonEncoding,
}

impl CloseError {
    /// Status used to fail the connection when the error came from the peer.
    #[must_use]
    pub const fn close_status(&self) -> CloseStatus {
        match self {
            Self::InvalidReasonEncoding => CloseStatus::INCONSISTENT_DATA,
            _ => CloseStatus::PROTOCOL_ERROR,
        }
    }

    /// Whether the error describes peer misbehaviour rather than a local
    /// misuse of the API.
    #[must_use]
    pub const fn is_peer_violation(&self) -> bool {
        matches!(
            self,
            Self::MalformedPayload { .. }
                | Self::InvalidPeerStatus { .. }
                | Self::InvalidReasonEncoding
        )
    }
}

#[cfg(test)]
mod tests;
