//! Close frame payloads and handshake bookkeeping.

use bytes::{BufMut, Bytes, BytesMut};

use super::{CloseError, CloseStatus};
use crate::frame::{CONTROL_MAX_PAYLOAD_LEN, Frame, OpCode};

/// Longest reason that fits beside the two status bytes in a control frame.
pub const MAX_REASON_LEN: usize = CONTROL_MAX_PAYLOAD_LEN - 2;

/// Parsed or outbound close frame payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CloseFrame {
    status: Option<CloseStatus>,
    reason: String,
}

impl CloseFrame {
    /// Close payload carrying `status` and `reason`.
    ///
    /// # Errors
    ///
    /// Returns [`CloseError::UnsendableStatus`] for local-only or not-used
    /// codes and [`CloseError::ReasonTooLong`] when `reason` exceeds
    /// [`MAX_REASON_LEN`] bytes.
    pub fn new(status: CloseStatus, reason: impl Into<String>) -> Result<Self, CloseError> {
        let reason = reason.into();
        if !status.is_sendable() {
            return Err(CloseError::UnsendableStatus { status });
        }
        if reason.len() > MAX_REASON_LEN {
            return Err(CloseError::ReasonTooLong { len: reason.len() });
        }
        Ok(Self {
            status: Some(status),
            reason,
        })
    }

    /// Empty close payload (no status, no reason).
    #[must_use]
    pub fn empty() -> Self {
        Self {
            status: None,
            reason: String::new(),
        }
    }

    /// Parse and validate a close payload received from the peer.
    ///
    /// # Errors
    ///
    /// Returns [`CloseError::MalformedPayload`] for one-byte payloads,
    /// [`CloseError::InvalidPeerStatus`] for local-only or not-used codes and
    /// [`CloseError::InvalidReasonEncoding`] when the reason is not UTF-8.
    ///
    /// # Examples
    ///
    /// ```
    /// use wsframe::close::{CloseError, CloseFrame, CloseStatus};
    ///
    /// let frame = CloseFrame::parse(&[0x03, 0xE8, b'o', b'k']).expect("valid payload");
    /// assert_eq!(frame.status(), Some(CloseStatus::NORMAL));
    /// assert_eq!(frame.reason(), "ok");
    ///
    /// let err = CloseFrame::parse(&[0x03, 0xED]).expect_err("1005 is local-only");
    /// assert_eq!(err.close_status(), CloseStatus::PROTOCOL_ERROR);
    /// ```
    pub fn parse(payload: &[u8]) -> Result<Self, CloseError> {
        match payload {
            [] => Ok(Self::empty()),
            [_] => Err(CloseError::MalformedPayload { len: 1 }),
            [hi, lo, reason @ ..] => {
                let status = CloseStatus::new(u16::from_be_bytes([*hi, *lo]));
                if !status.is_valid_from_peer() {
                    return Err(CloseError::InvalidPeerStatus { status });
                }
                let reason = std::str::from_utf8(reason)
                    .map_err(|_| CloseError::InvalidReasonEncoding)?
                    .to_owned();
                Ok(Self {
                    status: Some(status),
                    reason,
                })
            }
        }
    }

    /// Status carried by the frame, if any.
    #[must_use]
    pub const fn status(&self) -> Option<CloseStatus> { self.status }

    /// Status to report locally: an absent status reads as
    /// [`CloseStatus::NO_STATUS`].
    #[must_use]
    pub fn reported_status(&self) -> CloseStatus { self.status.unwrap_or(CloseStatus::NO_STATUS) }

    /// Reason text.
    #[must_use]
    pub fn reason(&self) -> &str { &self.reason }

    /// Encode as a close frame payload.
    #[must_use]
    pub fn to_payload(&self) -> Bytes {
        let Some(status) = self.status else {
            return Bytes::new();
        };
        let mut buf = BytesMut::with_capacity(2 + self.reason.len());
        buf.put_u16(status.code());
        buf.put_slice(self.reason.as_bytes());
        buf.freeze()
    }

    /// Build the control frame carrying this payload.
    #[must_use]
    pub fn to_frame(&self) -> Frame { Frame::new(OpCode::Close, true, self.to_payload()) }
}

/// What the connection must do after a peer close frame was accepted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CloseReaction {
    /// The peer initiated; send `reply` to complete the exchange.
    Echo {
        /// Frame received from the peer.
        received: CloseFrame,
        /// Close frame to send back.
        reply: Frame,
    },
    /// The peer acknowledged our close frame; the exchange is complete.
    Completed {
        /// Frame received from the peer.
        received: CloseFrame,
    },
}

/// Tracks both halves of the close exchange.
#[derive(Clone, Debug, Default)]
pub struct CloseHandshake {
    sent: Option<CloseFrame>,
    received: Option<CloseFrame>,
}

impl CloseHandshake {
    /// Create an idle handshake.
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Build the close frame that starts a locally initiated close.
    ///
    /// # Errors
    ///
    /// Returns [`CloseError::AlreadySent`] if a close frame was already sent,
    /// or the validation errors of [`CloseFrame::new`].
    pub fn initiate(&mut self, status: CloseStatus, reason: &str) -> Result<Frame, CloseError> {
        if self.sent.is_some() {
            return Err(CloseError::AlreadySent);
        }
        let close = CloseFrame::new(status, reason)?;
        let frame = close.to_frame();
        self.sent = Some(close);
        Ok(frame)
    }

    /// Record a close frame sent without validation, used when failing the
    /// connection with an internally chosen status.
    pub(crate) fn record_forced(&mut self, status: CloseStatus, reason: &str) -> Option<Frame> {
        if self.sent.is_some() {
            return None;
        }
        let mut reason = reason.to_owned();
        truncate_utf8(&mut reason, MAX_REASON_LEN);
        let close = CloseFrame {
            status: Some(status),
            reason,
        };
        let frame = close.to_frame();
        self.sent = Some(close);
        Some(frame)
    }

    /// Accept a close payload from the peer.
    ///
    /// # Errors
    ///
    /// Returns the validation errors of [`CloseFrame::parse`]; the caller
    /// fails the connection with [`CloseError::close_status`].
    pub fn receive(&mut self, payload: &[u8]) -> Result<CloseReaction, CloseError> {
        let received = CloseFrame::parse(payload)?;
        self.received = Some(received.clone());
        if self.sent.is_some() {
            return Ok(CloseReaction::Completed { received });
        }
        let echo = received.clone();
        let reply = echo.to_frame();
        self.sent = Some(echo);
        Ok(CloseReaction::Echo { received, reply })
    }

    /// Close frame this side sent, if any.
    #[must_use]
    pub fn sent(&self) -> Option<&CloseFrame> { self.sent.as_ref() }

    /// Close frame received from the peer, if any.
    #[must_use]
    pub fn received(&self) -> Option<&CloseFrame> { self.received.as_ref() }

    /// Both sides have exchanged close frames.
    #[must_use]
    pub fn is_complete(&self) -> bool { self.sent.is_some() && self.received.is_some() }
}

/// Shorten `text` to at most `max` bytes without splitting a character.
fn truncate_utf8(text: &mut String, max: usize) {
    if text.len() <= max {
        return;
    }
    let mut cut = max;
    while !text.is_char_boundary(cut) {
        cut -= 1;
    }
    text.truncate(cut);
}
