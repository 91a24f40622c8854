//! Frame opcodes as carried in the low nibble of the first header byte.

use std::fmt;

use serde::{Deserialize, Serialize};

/// WebSocket frame opcode.
///
/// The reserved variants exist so the decoder can name what it saw before
/// rejecting it; a conforming peer never sends them without a negotiated
/// extension.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OpCode {
    /// Continuation of a fragmented data message (`0x0`).
    Continuation,
    /// UTF-8 text data (`0x1`).
    Text,
    /// Binary data (`0x2`).
    Binary,
    /// Reserved non-control opcode (`0x3`..=`0x7`).
    ReservedData(u8),
    /// Connection close (`0x8`).
    Close,
    /// Ping (`0x9`).
    Ping,
    /// Pong (`0xA`).
    Pong,
    /// Reserved control opcode (`0xB`..=`0xF`).
    ReservedControl(u8),
}

impl OpCode {
    /// Interpret the low four bits of `nibble` as an opcode.
    ///
    /// # Examples
    ///
    /// ```
    /// use wsframe::frame::OpCode;
    ///
    /// assert_eq!(OpCode::from_nibble(0x1), OpCode::Text);
    /// assert_eq!(OpCode::from_nibble(0xB), OpCode::ReservedControl(0xB));
    /// ```
    #[must_use]
    pub const fn from_nibble(nibble: u8) -> Self {
        match nibble & 0x0F {
            0x0 => Self::Continuation,
            0x1 => Self::Text,
            0x2 => Self::Binary,
            0x8 => Self::Close,
            0x9 => Self::Ping,
            0xA => Self::Pong,
            n @ 0x3..=0x7 => Self::ReservedData(n),
            n => Self::ReservedControl(n),
        }
    }

    /// Wire value of this opcode.
    #[must_use]
    pub const fn as_nibble(self) -> u8 {
        match self {
            Self::Continuation => 0x0,
            Self::Text => 0x1,
            Self::Binary => 0x2,
            Self::Close => 0x8,
            Self::Ping => 0x9,
            Self::Pong => 0xA,
            Self::ReservedData(n) | Self::ReservedControl(n) => n & 0x0F,
        }
    }

    /// Control opcodes occupy `0x8`..=`0xF`.
    #[must_use]
    pub const fn is_control(self) -> bool { self.as_nibble() >= 0x8 }

    /// Data opcodes that open a new message (text or binary).
    #[must_use]
    pub const fn starts_message(self) -> bool { matches!(self, Self::Text | Self::Binary) }

    /// Reserved opcodes, control or not.
    #[must_use]
    pub const fn is_reserved(self) -> bool {
        matches!(self, Self::ReservedData(_) | Self::ReservedControl(_))
    }
}

impl fmt::Display for OpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Continuation => f.write_str("continuation"),
            Self::Text => f.write_str("text"),
            Self::Binary => f.write_str("binary"),
            Self::Close => f.write_str("close"),
            Self::Ping => f.write_str("ping"),
            Self::Pong => f.write_str("pong"),
            Self::ReservedData(n) | Self::ReservedControl(n) => write!(f, "reserved({n:#x})"),
        }
    }
}
