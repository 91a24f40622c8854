//! Close status codes and their classification.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Disjoint classes of 16-bit close status codes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CloseStatusClass {
    /// 1000–2999, excluding the local-only codes.
    ProtocolReserved,
    /// 3000–3999, registered with IANA.
    IanaReserved,
    /// 4000–4999, by private agreement.
    PrivateUse,
    /// 1004, 1005, 1006 and 1015: internal signals, never on the wire.
    LocalOnly,
    /// Anything outside 1000–4999.
    NotUsed,
}

/// Close status code.
///
/// # Examples
///
/// ```
/// use wsframe::close::{CloseStatus, CloseStatusClass};
///
/// assert_eq!(CloseStatus::NO_STATUS.class(), CloseStatusClass::LocalOnly);
/// assert!(!CloseStatus::NO_STATUS.is_valid_from_peer());
/// assert!(CloseStatus::new(4001).is_valid_from_peer());
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CloseStatus(u16);

impl CloseStatus {
    /// 1000: the purpose of the connection has been fulfilled.
    pub const NORMAL: Self = Self(1000);
    /// 1001: the endpoint is going away.
    pub const GOING_AWAY: Self = Self(1001);
    /// 1002: protocol error.
    pub const PROTOCOL_ERROR: Self = Self(1002);
    /// 1003: received a type of data it cannot accept.
    pub const UNSUPPORTED_DATA: Self = Self(1003);
    /// 1004: reserved.
    pub const RESERVED: Self = Self(1004);
    /// 1005: no status code was present.
    pub const NO_STATUS: Self = Self(1005);
    /// 1006: closed without a close frame.
    pub const ABNORMAL: Self = Self(1006);
    /// 1007: message data inconsistent with its type.
    pub const INCONSISTENT_DATA: Self = Self(1007);
    /// 1008: policy violation.
    pub const POLICY_VIOLATION: Self = Self(1008);
    /// 1009: message too big to process.
    pub const MESSAGE_TOO_BIG: Self = Self(1009);
    /// 1010: the client expected an extension the server did not negotiate.
    pub const EXTENSION_NOT_NEGOTIATED: Self = Self(1010);
    /// 1011: the server hit an unexpected condition.
    pub const UNEXPECTED_CONDITION: Self = Self(1011);
    /// 1015: TLS handshake failure.
    pub const TLS_HANDSHAKE_FAILED: Self = Self(1015);

    /// Wrap a raw status code.
    #[must_use]
    pub const fn new(code: u16) -> Self { Self(code) }

    /// Raw status code.
    #[must_use]
    pub const fn code(self) -> u16 { self.0 }

    /// Classify this code. Local-only codes take precedence over the
    /// protocol-reserved range they sit in.
    #[must_use]
    pub const fn class(self) -> CloseStatusClass {
        match self.0 {
            1004 | 1005 | 1006 | 1015 => CloseStatusClass::LocalOnly,
            1000..=2999 => CloseStatusClass::ProtocolReserved,
            3000..=3999 => CloseStatusClass::IanaReserved,
            4000..=4999 => CloseStatusClass::PrivateUse,
            _ => CloseStatusClass::NotUsed,
        }
    }

    /// Whether the code is one of the enumerated protocol codes that may be
    /// placed on the wire.
    #[must_use]
    pub const fn is_defined(self) -> bool {
        matches!(self.0, 1000..=1003 | 1007..=1011)
    }

    /// Whether this code may only be used as a local signal.
    #[must_use]
    pub const fn is_local_only(self) -> bool {
        matches!(self.class(), CloseStatusClass::LocalOnly)
    }

    /// Whether a peer may legitimately send this code.
    #[must_use]
    pub const fn is_valid_from_peer(self) -> bool {
        match self.class() {
            CloseStatusClass::ProtocolReserved => self.is_defined(),
            CloseStatusClass::IanaReserved | CloseStatusClass::PrivateUse => true,
            CloseStatusClass::LocalOnly | CloseStatusClass::NotUsed => false,
        }
    }

    /// Whether this endpoint may send the code in a close frame.
    #[must_use]
    pub const fn is_sendable(self) -> bool { self.is_valid_from_peer() }

    /// Short human-readable name.
    #[must_use]
    pub const fn description(self) -> &'static str {
        match self.0 {
            1000 => "normal closure",
            1001 => "going away",
            1002 => "protocol error",
            1003 => "unsupported data",
            1004 => "reserved",
            1005 => "no status received",
            1006 => "abnormal closure",
            1007 => "inconsistent data",
            1008 => "policy violation",
            1009 => "message too big",
            1010 => "extension not negotiated",
            1011 => "unexpected condition",
            1015 => "TLS handshake failed",
            3000..=3999 => "registered status",
            4000..=4999 => "private status",
            _ => "unknown status",
        }
    }
}

impl From<u16> for CloseStatus {
    fn from(code: u16) -> Self { Self(code) }
}

impl From<CloseStatus> for u16 {
    fn from(status: CloseStatus) -> Self { status.0 }
}

impl fmt::Display for CloseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.0, self.description())
    }
}
