//! Canonical error and result types for the crate.
//!
//! Each layer has its own error enum; [`Error`] gathers them so the
//! connection engine can report any failure through one type.

use std::io;

use thiserror::Error;

use crate::{
    close::{CloseError, CloseStatus},
    codec::{CodecError, FramingError},
    connection::StateError,
    message_assembler::MessageAssemblyError,
};

/// Top-level error type exposed by `wsframe`.
#[derive(Debug, Error)]
pub enum Error {
    /// Frame decoding or encoding failed.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// Data frames did not form a valid message.
    #[error(transparent)]
    Assembly(#[from] MessageAssemblyError),

    /// A close frame was invalid or could not be built.
    #[error(transparent)]
    Close(#[from] CloseError),

    /// The operation is not allowed in the current connection state.
    #[error(transparent)]
    State(#[from] StateError),

    /// The transport reported a failure.
    #[error("transport error: {0}")]
    Transport(#[source] io::Error),
}

impl From<FramingError> for Error {
    fn from(error: FramingError) -> Self { Self::Codec(CodecError::from(error)) }
}

impl Error {
    /// Status the connection is failed with for this error.
    #[must_use]
    pub fn close_status(&self) -> CloseStatus {
        match self {
            Self::Codec(e) => e.close_status(),
            Self::Assembly(e) => e.close_status(),
            Self::Close(e) => e.close_status(),
            Self::State(_) => CloseStatus::UNEXPECTED_CONDITION,
            Self::Transport(_) => CloseStatus::ABNORMAL,
        }
    }

    /// Numeric code passed to the error callback.
    #[must_use]
    pub fn code(&self) -> u16 { self.close_status().code() }

    /// Short label used for metrics and logs.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Codec(e) => e.error_type(),
            Self::Assembly(e) => e.error_type(),
            Self::Close(_) => "close",
            Self::State(_) => "state",
            Self::Transport(_) => "transport",
        }
    }
}

/// Result type alias using the crate's [`Error`].
pub type Result<T, E = Error> = std::result::Result<T, E>;
