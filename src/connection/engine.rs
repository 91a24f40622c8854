//! Inbound frame handling shared by every connection entry point.
//!
//! [`Engine`] owns everything a decoded frame can touch: lifecycle state,
//! callbacks, the reassembler, the close handshake and the outbound buffer.
//! It is the [`FrameSink`] the connection's decoder streams into.

use bytes::{Bytes, BytesMut};
use tracing::{debug, trace, warn};

use super::{ConnectionState, LifecycleEvent, StateError, StateMachine};
use crate::{
    close::{CloseHandshake, CloseReaction, CloseStatus},
    codec::{CodecError, FrameSink, encode_frame},
    config::WebSocketConfig,
    error::{Error, Result},
    frame::{Frame, FrameHeader, OpCode},
    hooks::{Dispatcher, Flow, Handler},
    mask::MaskKeySource,
    message_assembler::{Assembled, DispatchMode, FrameRole, Message, MessageKind, MessageReassembler},
    metrics::{self, Direction},
};

/// Outbound fragmented message opened with `begin_message`.
#[derive(Clone, Copy, Debug)]
pub(super) struct OutboundMessage {
    pub(super) kind: MessageKind,
    pub(super) started: bool,
}

pub(super) struct Engine<H> {
    pub(super) config: WebSocketConfig,
    pub(super) state: StateMachine,
    pub(super) dispatcher: Dispatcher<H>,
    pub(super) reassembler: MessageReassembler,
    pub(super) handshake: CloseHandshake,
    pub(super) mask_source: Box<dyn MaskKeySource>,
    pub(super) outbound: BytesMut,
    pub(super) sending: Option<OutboundMessage>,
    /// Set when a callback asked to stop; consumed once the decoder reports
    /// the abort.
    user_abort: bool,
}

impl<H: Handler> Engine<H> {
    pub(super) fn new(
        config: WebSocketConfig,
        handler: H,
        mask_source: Box<dyn MaskKeySource>,
    ) -> Self {
        let reassembler = MessageReassembler::new(config.dispatch_mode, config.max_payload_len)
            .validate_utf8(config.validate_utf8);
        Self {
            config,
            state: StateMachine::new(),
            dispatcher: Dispatcher::new(handler),
            reassembler,
            handshake: CloseHandshake::new(),
            mask_source,
            outbound: BytesMut::new(),
            sending: None,
            user_abort: false,
        }
    }

    pub(super) fn current(&self) -> ConnectionState { self.state.state() }

    /// Encode `frame` with a fresh mask key onto the outbound buffer.
    pub(super) fn queue(&mut self, frame: &Frame) -> Result<()> {
        let key = self
            .mask_source
            .next_key()
            .map_err(CodecError::MaskSource)?;
        encode_frame(frame, Some(key), &mut self.outbound)?;
        metrics::inc_frames(Direction::Outbound);
        trace!(
            opcode = %frame.opcode(),
            fin = frame.is_fin(),
            len = frame.payload().len(),
            "frame queued"
        );
        Ok(())
    }

    /// Send a close frame and move to closing.
    pub(super) fn start_close(&mut self, status: CloseStatus, reason: &str) -> Result<()> {
        if !self.state.can_apply(LifecycleEvent::CloseStarted) {
            return Err(StateError::NotOpen {
                state: self.current(),
            }
            .into());
        }
        let frame = self.handshake.initiate(status, reason)?;
        self.queue(&frame)?;
        self.state.apply(LifecycleEvent::CloseStarted)?;
        debug!(%status, reason, "close initiated");
        Ok(())
    }

    /// Fail the connection after a protocol violation or processing error.
    ///
    /// The error callback fires first, a close frame carrying the error's
    /// status is queued when none was sent yet, and the connection ends
    /// uncleanly.
    pub(super) fn fail(&mut self, error: &Error) {
        let status = error.close_status();
        let text = error.to_string();
        warn!(%status, kind = error.kind(), error = %text, "failing connection");
        self.report(error);
        self.reassembler.abandon();
        self.sending = None;

        if self.current() == ConnectionState::Connected {
            if let Some(frame) = self.handshake.record_forced(status, &text) {
                if let Err(e) = self.queue(&frame) {
                    warn!(error = %e, "failed to queue close frame");
                }
            }
            self.transition(LifecycleEvent::CloseStarted);
        }
        self.abandon(status, &text);
    }

    /// Count `error` and pass it to the error callback.
    pub(super) fn report(&mut self, error: &Error) {
        metrics::inc_errors(error.kind());
        self.dispatcher.error(error.code(), &error.to_string());
    }

    /// Walk closing → closing-unclean → closed-uncleanly and announce it.
    pub(super) fn abandon(&mut self, status: CloseStatus, reason: &str) {
        if self.current() == ConnectionState::Closing {
            self.transition(LifecycleEvent::CloseAbandoned);
        }
        self.transition(LifecycleEvent::TransportLost);
        self.finish(status, reason);
    }

    /// Announce the terminal state.
    pub(super) fn finish(&mut self, status: CloseStatus, reason: &str) {
        let clean = self.current() == ConnectionState::ClosedCleanly;
        metrics::inc_closes(clean);
        debug!(%status, reason, clean, "connection closed");
        self.reassembler.abandon();
        self.dispatcher.close(status, reason);
    }

    /// Apply a transition the caller has already established as legal.
    pub(super) fn transition(&mut self, event: LifecycleEvent) {
        if let Err(e) = self.state.apply(event) {
            warn!(error = %e, "unexpected lifecycle event");
        }
    }

    /// Handle a decoder abort. Returns an error only when the resulting
    /// close frame could not be queued.
    pub(super) fn take_abort(&mut self) -> Result<()> {
        if !std::mem::take(&mut self.user_abort) {
            return Ok(());
        }
        self.reassembler.abandon();
        self.dispatcher.finish_message();
        if self.current() == ConnectionState::Connected {
            debug!("callback aborted message, closing");
            self.start_close(CloseStatus::NORMAL, "")?;
        }
        Ok(())
    }

    fn abort(&mut self) -> Flow {
        self.user_abort = true;
        self.dispatcher.suppress_message();
        Flow::Abort
    }

    /// A peer close frame is never skipped: the handshake it carries already
    /// answers the local close an abort would start.
    fn abort_frame(&mut self, header: &FrameHeader) -> Flow {
        if header.opcode == OpCode::Close {
            debug!("abort requested on peer close, completing handshake");
            return Flow::Continue;
        }
        self.abort()
    }

    fn handle_control(&mut self, frame: &Frame) -> Result<Flow> {
        match frame.opcode() {
            OpCode::Close => self.handle_close(frame.payload()),
            OpCode::Ping => {
                let message = Message::new(MessageKind::Ping, frame.payload().clone());
                let flow = self.dispatcher.message(&message);
                if self.config.auto_pong && self.current() == ConnectionState::Connected {
                    self.queue(&Frame::pong(frame.payload().clone()))?;
                }
                Ok(flow)
            }
            OpCode::Pong => {
                let message = Message::new(MessageKind::Pong, frame.payload().clone());
                Ok(self.dispatcher.message(&message))
            }
            _ => Ok(Flow::Continue),
        }
    }

    fn handle_close(&mut self, payload: &Bytes) -> Result<Flow> {
        let received = match self.handshake.receive(payload)? {
            CloseReaction::Echo { received, reply } => {
                debug!(status = %received.reported_status(), "peer initiated close");
                self.queue(&reply)?;
                self.state.apply(LifecycleEvent::CloseStarted)?;
                received
            }
            CloseReaction::Completed { received } => received,
        };
        self.state.apply(LifecycleEvent::CloseCompleted)?;
        self.finish(received.reported_status(), received.reason());
        Ok(Flow::Continue)
    }
}

impl<H: Handler> FrameSink for Engine<H> {
    type Error = Error;

    fn frame_begin(&mut self, header: &FrameHeader) -> Result<Flow> {
        if self.current() == ConnectionState::Closing && header.opcode != OpCode::Close {
            trace!(opcode = %header.opcode, "discarding frame while closing");
            return Ok(Flow::Abort);
        }
        let role = self.reassembler.begin_frame(header)?;
        if self.dispatcher.frame_begin(header).is_abort() {
            return Ok(self.abort_frame(header));
        }
        if let FrameRole::Start(kind) = role {
            if self.reassembler.mode() == DispatchMode::Streaming
                && self.dispatcher.message_begin(kind).is_abort()
            {
                return Ok(self.abort());
            }
        }
        Ok(Flow::Continue)
    }

    fn frame_data(&mut self, header: &FrameHeader, chunk: Bytes) -> Result<Flow> {
        let data = self.reassembler.push(header, chunk.clone())?;
        if self.dispatcher.frame_data(&chunk).is_abort() {
            return Ok(self.abort_frame(header));
        }
        if let Some(data) = data {
            if self.dispatcher.message_frame(&data).is_abort() {
                return Ok(self.abort());
            }
        }
        Ok(Flow::Continue)
    }

    fn frame_end(&mut self, header: &FrameHeader) -> Result<Flow> {
        if self.dispatcher.frame_end().is_abort() && header.opcode != OpCode::Close {
            return Ok(self.abort());
        }
        let flow = match self.reassembler.end_frame(header)? {
            None => Flow::Continue,
            Some(Assembled::Message(message)) => {
                let flow = self.dispatcher.message(&message);
                self.dispatcher.finish_message();
                flow
            }
            Some(Assembled::End) => self.dispatcher.message_end(),
            Some(Assembled::Control(frame)) => self.handle_control(&frame)?,
        };
        if flow.is_abort() {
            return Ok(self.abort());
        }
        Ok(Flow::Continue)
    }
}
