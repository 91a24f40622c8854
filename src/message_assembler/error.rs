//! Error types for message reassembly.

use thiserror::Error;

use super::MessageKind;
use crate::{close::CloseStatus, frame::OpCode};

/// Errors produced while coalescing data frames into messages.
///
/// Every variant is fatal to the connection; [`close_status`] names the
/// status it is failed with.
///
/// [`close_status`]: MessageAssemblyError::close_status
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum MessageAssemblyError {
    /// A continuation frame arrived with no message in progress.
    #[error("continuation frame received without a message in progress")]
    UnexpectedContinuation,

    /// A text or binary frame arrived while another message was still open.
    #[error("{opcode} frame started while a {active} message is in progress")]
    InterleavedStart {
        /// Kind of the message being assembled.
        active: MessageKind,
        /// Opcode of the offending frame.
        opcode: OpCode,
    },

    /// The accumulated message would exceed the configured ceiling.
    #[error("message exceeds size limit: {attempted} bytes > {limit} bytes")]
    MessageTooLarge {
        /// Size the message would reach.
        attempted: u64,
        /// Configured ceiling.
        limit: u64,
    },

    /// A text message is not valid UTF-8.
    #[error("text message is not valid UTF-8")]
    InvalidUtf8,
}

impl MessageAssemblyError {
    /// Status the connection is failed with.
    #[must_use]
    pub const fn close_status(&self) -> CloseStatus {
        match self {
            Self::MessageTooLarge { .. } => CloseStatus::MESSAGE_TOO_BIG,
            Self::InvalidUtf8 => CloseStatus::INCONSISTENT_DATA,
            Self::UnexpectedContinuation | Self::InterleavedStart { .. } => {
                CloseStatus::PROTOCOL_ERROR
            }
        }
    }

    /// Short label used for metrics and logs.
    #[must_use]
    pub const fn error_type(&self) -> &'static str {
        match self {
            Self::UnexpectedContinuation | Self::InterleavedStart { .. } => "sequence",
            Self::MessageTooLarge { .. } => "too_large",
            Self::InvalidUtf8 => "utf8",
        }
    }
}
