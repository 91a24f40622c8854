//! Outbound message API.

use bytes::Bytes;

use super::{Connection, ConnectionState, StateError, engine::OutboundMessage};
use crate::{
    close::{CloseError, CloseStatus},
    error::Result,
    frame::{Frame, OpCode},
    hooks::Handler,
    message_assembler::MessageKind,
};

impl<H: Handler> Connection<H> {
    /// Queue a text message.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::NotOpen`] unless connected,
    /// [`StateError::MessageInProgress`] while a fragmented message is open,
    /// or the mask source's error.
    pub fn send_text(&mut self, text: &str) -> Result<()> {
        self.send_data(Frame::text(Bytes::copy_from_slice(text.as_bytes())))
    }

    /// Queue a binary message.
    ///
    /// # Errors
    ///
    /// As for [`send_text`](Self::send_text).
    pub fn send_binary(&mut self, payload: impl Into<Bytes>) -> Result<()> {
        self.send_data(Frame::binary(payload))
    }

    /// Queue a ping. Allowed between the fragments of an open message.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::NotOpen`] unless connected and
    /// [`FramingError::ControlFrameTooLarge`](crate::codec::FramingError::ControlFrameTooLarge)
    /// for payloads over 125 bytes.
    pub fn send_ping(&mut self, payload: impl Into<Bytes>) -> Result<()> {
        self.ensure_open()?;
        self.engine.queue(&Frame::ping(payload))
    }

    /// Queue an unsolicited pong.
    ///
    /// # Errors
    ///
    /// As for [`send_ping`](Self::send_ping).
    pub fn send_pong(&mut self, payload: impl Into<Bytes>) -> Result<()> {
        self.ensure_open()?;
        self.engine.queue(&Frame::pong(payload))
    }

    /// Open a fragmented outbound message of `kind`.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::NotDataKind`] for ping and pong,
    /// [`StateError::MessageInProgress`] if a message is already open, or
    /// [`StateError::NotOpen`] unless connected.
    pub fn begin_message(&mut self, kind: MessageKind) -> Result<()> {
        self.ensure_open()?;
        if kind.is_control() {
            return Err(StateError::NotDataKind { kind }.into());
        }
        if let Some(open) = self.engine.sending {
            return Err(StateError::MessageInProgress { kind: open.kind }.into());
        }
        self.engine.sending = Some(OutboundMessage {
            kind,
            started: false,
        });
        Ok(())
    }

    /// Queue a non-final fragment of the open message.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::NoMessageInProgress`] without
    /// [`begin_message`](Self::begin_message), or [`StateError::NotOpen`]
    /// unless connected.
    pub fn send_fragment(&mut self, payload: impl Into<Bytes>) -> Result<()> {
        self.send_part(payload.into(), false)
    }

    /// Queue the final fragment and close the open message.
    ///
    /// # Errors
    ///
    /// As for [`send_fragment`](Self::send_fragment).
    pub fn end_message(&mut self, payload: impl Into<Bytes>) -> Result<()> {
        self.send_part(payload.into(), true)
    }

    /// Start the close handshake.
    ///
    /// # Errors
    ///
    /// Returns [`CloseError::AlreadySent`] while closing,
    /// [`StateError::NotOpen`] in any other state but connected, and
    /// [`CloseError::UnsendableStatus`] or [`CloseError::ReasonTooLong`] for
    /// an invalid close frame.
    pub fn close(&mut self, status: CloseStatus, reason: &str) -> Result<()> {
        if self.state() == ConnectionState::Closing {
            return Err(CloseError::AlreadySent.into());
        }
        self.engine.sending = None;
        self.engine.start_close(status, reason)
    }

    fn send_data(&mut self, frame: Frame) -> Result<()> {
        self.ensure_open()?;
        if let Some(open) = self.engine.sending {
            return Err(StateError::MessageInProgress { kind: open.kind }.into());
        }
        self.engine.queue(&frame)
    }

    fn send_part(&mut self, payload: Bytes, fin: bool) -> Result<()> {
        self.ensure_open()?;
        let Some(open) = self.engine.sending else {
            return Err(StateError::NoMessageInProgress.into());
        };
        let opcode = if open.started {
            OpCode::Continuation
        } else {
            open.kind.opcode()
        };
        self.engine.queue(&Frame::new(opcode, fin, payload))?;
        self.engine.sending = (!fin).then_some(OutboundMessage {
            started: true,
            ..open
        });
        Ok(())
    }

    fn ensure_open(&self) -> Result<()> {
        let state = self.state();
        if state.is_open() {
            return Ok(());
        }
        Err(StateError::NotOpen { state }.into())
    }
}
