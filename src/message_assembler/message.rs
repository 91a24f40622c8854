//! Assembled messages and their kinds.

use std::fmt;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::frame::OpCode;

/// What a delivered message carries.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MessageKind {
    /// UTF-8 text.
    Text,
    /// Arbitrary bytes.
    Binary,
    /// Ping control frame.
    Ping,
    /// Pong control frame.
    Pong,
}

impl MessageKind {
    /// Kind for a message-starting or ping/pong opcode.
    #[must_use]
    pub const fn from_opcode(opcode: OpCode) -> Option<Self> {
        match opcode {
            OpCode::Text => Some(Self::Text),
            OpCode::Binary => Some(Self::Binary),
            OpCode::Ping => Some(Self::Ping),
            OpCode::Pong => Some(Self::Pong),
            _ => None,
        }
    }

    /// Opcode used to send a message of this kind.
    #[must_use]
    pub const fn opcode(self) -> OpCode {
        match self {
            Self::Text => OpCode::Text,
            Self::Binary => OpCode::Binary,
            Self::Ping => OpCode::Ping,
            Self::Pong => OpCode::Pong,
        }
    }

    /// `true` for ping and pong.
    #[must_use]
    pub const fn is_control(self) -> bool { matches!(self, Self::Ping | Self::Pong) }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Text => "text",
            Self::Binary => "binary",
            Self::Ping => "ping",
            Self::Pong => "pong",
        };
        f.write_str(name)
    }
}

/// How data messages are handed to the application.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchMode {
    /// Accumulate every fragment and deliver one complete message.
    #[default]
    Buffered,
    /// Deliver begin, one callback per payload chunk, then end.
    Streaming,
}

/// A complete message: the concatenated payload of its frames.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Message {
    kind: MessageKind,
    payload: Bytes,
}

impl Message {
    /// Construct a message.
    #[must_use]
    pub fn new(kind: MessageKind, payload: impl Into<Bytes>) -> Self {
        Self {
            kind,
            payload: payload.into(),
        }
    }

    /// Message kind.
    #[must_use]
    pub const fn kind(&self) -> MessageKind { self.kind }

    /// `true` for binary messages.
    #[must_use]
    pub fn is_binary(&self) -> bool { self.kind == MessageKind::Binary }

    /// Payload bytes.
    #[must_use]
    pub const fn payload(&self) -> &Bytes { &self.payload }

    /// Consume the message, returning its payload.
    #[must_use]
    pub fn into_payload(self) -> Bytes { self.payload }

    /// Payload as text, for text messages holding valid UTF-8.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        if self.kind != MessageKind::Text {
            return None;
        }
        std::str::from_utf8(&self.payload).ok()
    }

    /// Payload length in bytes.
    #[must_use]
    pub fn len(&self) -> usize { self.payload.len() }

    /// Whether the payload is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool { self.payload.is_empty() }
}
