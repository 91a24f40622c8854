//! Error types for the frame codec.
//!
//! - [`FramingError`]: the peer put something on the wire that RFC 6455 forbids (reserved bits or
//!   opcodes, oversized or fragmented control frames, bad length fields).
//! - [`EofError`]: the stream ended part-way through a frame.
//! - [`CodecError`]: top-level enum wrapping both plus mask-source failures.
//!
//! Every codec error is fatal to the connection. [`CodecError::close_status`]
//! names the status the connection is failed with.

use std::io;

use thiserror::Error;

use crate::{close::CloseStatus, frame::OpCode};

/// Wire-level violations detected while decoding or encoding a frame.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum FramingError {
    /// One or more RSV bits set without a negotiated extension.
    #[error("reserved bits set without a negotiated extension: {rsv:#05b}")]
    ReservedBits {
        /// RSV1..RSV3 packed as the low three bits.
        rsv: u8,
    },

    /// A reserved opcode was used.
    #[error("reserved opcode {opcode}")]
    ReservedOpcode {
        /// Opcode as it appeared on the wire.
        opcode: OpCode,
    },

    /// A control frame declared more than 125 payload bytes.
    #[error("control frame {opcode} too large: {len} > 125 bytes")]
    ControlFrameTooLarge {
        /// Control opcode.
        opcode: OpCode,
        /// Declared payload length.
        len: u64,
    },

    /// A control frame had FIN cleared.
    #[error("control frame {opcode} must not be fragmented")]
    FragmentedControlFrame {
        /// Control opcode.
        opcode: OpCode,
    },

    /// Payload length exceeds the configured ceiling.
    #[error("payload too large: {len} > {max} bytes")]
    OversizedPayload {
        /// Declared payload length.
        len: u64,
        /// Configured maximum.
        max: u64,
    },

    /// The 64-bit length field had its most significant bit set.
    #[error("invalid payload length encoding")]
    InvalidLengthEncoding,

    /// An extended length field carried a value that fits a shorter form.
    #[error("non-minimal payload length encoding: {len} in {width}-byte field")]
    NonMinimalLength {
        /// Decoded length.
        len: u64,
        /// Width of the extended length field in bytes.
        width: usize,
    },
}

impl FramingError {
    /// Status the connection is failed with for this violation.
    #[must_use]
    pub const fn close_status(&self) -> CloseStatus {
        match self {
            Self::OversizedPayload { .. } => CloseStatus::MESSAGE_TOO_BIG,
            _ => CloseStatus::PROTOCOL_ERROR,
        }
    }
}

/// The byte stream ended before a frame was complete.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum EofError {
    /// EOF while reading the header.
    #[error("premature EOF during header: {bytes_received} bytes received")]
    MidHeader {
        /// Header bytes buffered when the stream ended.
        bytes_received: usize,
    },

    /// EOF while reading the payload.
    #[error("premature EOF: {remaining} payload bytes outstanding")]
    MidFrame {
        /// Payload bytes still expected.
        remaining: u64,
    },
}

/// Top-level codec error.
///
/// # Examples
///
/// ```
/// use wsframe::{
///     close::CloseStatus,
///     codec::{CodecError, FramingError},
/// };
///
/// let err = CodecError::Framing(FramingError::OversizedPayload { len: 10, max: 4 });
/// assert_eq!(err.close_status(), CloseStatus::MESSAGE_TOO_BIG);
/// assert_eq!(err.error_type(), "framing");
/// ```
#[derive(Debug, Error)]
pub enum CodecError {
    /// Wire-level violation.
    #[error("framing error: {0}")]
    Framing(#[from] FramingError),

    /// Truncated stream.
    #[error("EOF: {0}")]
    Eof(#[from] EofError),

    /// The mask-key source failed.
    #[error("mask key source failed: {0}")]
    MaskSource(#[source] io::Error),
}

impl CodecError {
    /// Status the connection is failed with.
    #[must_use]
    pub fn close_status(&self) -> CloseStatus {
        match self {
            Self::Framing(err) => err.close_status(),
            Self::Eof(_) => CloseStatus::ABNORMAL,
            Self::MaskSource(_) => CloseStatus::UNEXPECTED_CONDITION,
        }
    }

    /// Error category for logging and metrics.
    #[must_use]
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::Framing(_) => "framing",
            Self::Eof(_) => "eof",
            Self::MaskSource(_) => "mask",
        }
    }
}

impl From<CodecError> for io::Error {
    fn from(err: CodecError) -> Self {
        match err {
            CodecError::MaskSource(e) => e,
            CodecError::Framing(e) => io::Error::new(io::ErrorKind::InvalidData, e),
            CodecError::Eof(e) => io::Error::new(io::ErrorKind::UnexpectedEof, e),
        }
    }
}
