//! Sans-I/O WebSocket client connection.
//!
//! A [`Connection`] never touches a socket or a timer. The caller drives it
//! through three kinds of entry point:
//!
//! - **bytes in**: [`Connection::feed`] with whatever the transport read;
//! - **bytes out**: [`Connection::poll_outbound`] yields encoded, masked frames to write;
//! - **events**: resolution, connection, timeouts and transport failures are reported through
//!   methods such as [`Connection::connected`] and [`Connection::close_timed_out`].
//!
//! Every transition is validated by the [`StateMachine`]; the [`Handler`] is
//! only ever invoked through the [`Dispatcher`](crate::hooks::Dispatcher).

mod engine;
mod outbound;
mod state;

use std::io;

use bytes::{Bytes, BytesMut};
use engine::Engine;
pub use state::{ConnectionState, LifecycleEvent, StateError, StateMachine};
use tracing::{debug, trace};

use crate::{
    close::CloseStatus,
    codec::{CodecError, DecodeStatus, FrameDecoder},
    config::WebSocketConfig,
    error::{Error, Result},
    hooks::{BufferAllocator, ConnectOutcome, Flow, Handler, NoCopyCleanup},
    mask::MaskKeySource,
    message_assembler::MessageReassembler,
    metrics::{self, Direction},
};

/// A client-side WebSocket connection driven by its caller.
///
/// # Examples
///
/// ```
/// use wsframe::{
///     config::WebSocketConfig,
///     connection::{Connection, ConnectionState},
///     hooks::{Callbacks, Flow},
///     mask::FixedMaskSource,
/// };
///
/// let handler = Callbacks::default().on_message(|message| {
///     assert_eq!(message.as_text(), Some("hi"));
///     Flow::Continue
/// });
/// let mut conn = Connection::new(handler, WebSocketConfig::default())
///     .expect("open mask source")
///     .with_mask_source(Box::new(FixedMaskSource([0x37, 0xfa, 0x21, 0x3d])));
/// conn.resolved().expect("resolving");
/// conn.connected().expect("connecting");
/// assert_eq!(conn.state(), ConnectionState::Connected);
///
/// // An unmasked text frame from the server.
/// conn.feed(&[0x81, 0x02, b'h', b'i']).expect("valid frame");
///
/// conn.send_text("hello").expect("open");
/// let wire = conn.poll_outbound().expect("masked frame queued");
/// assert_eq!(&wire[..2], &[0x81, 0x85]);
/// ```
pub struct Connection<H> {
    decoder: FrameDecoder,
    inbound: BytesMut,
    engine: Engine<H>,
}

impl<H> std::fmt::Debug for Connection<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("state", &self.engine.state.state())
            .field("buffered_inbound", &self.inbound.len())
            .field("buffered_outbound", &self.engine.outbound.len())
            .finish_non_exhaustive()
    }
}

impl<H: Handler> Connection<H> {
    /// Create a connection in [`ConnectionState::Resolving`].
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::MaskSource`] when the configured random source
    /// cannot be opened.
    pub fn new(handler: H, config: WebSocketConfig) -> Result<Self> {
        let mask_source = config
            .random_source
            .open()
            .map_err(CodecError::MaskSource)?;
        Ok(Self {
            decoder: FrameDecoder::new(config.max_payload_len),
            inbound: BytesMut::new(),
            engine: Engine::new(config, handler, mask_source),
        })
    }

    /// Replace the mask key source, e.g. with a deterministic one in tests.
    #[must_use]
    pub fn with_mask_source(mut self, source: Box<dyn MaskKeySource>) -> Self {
        self.engine.mask_source = source;
        self
    }

    /// Draw message accumulation buffers from `allocator`.
    #[must_use]
    pub fn with_allocator(mut self, allocator: Box<dyn BufferAllocator>) -> Self {
        let config = &self.engine.config;
        self.engine.reassembler =
            MessageReassembler::with_allocator(config.dispatch_mode, config.max_payload_len, allocator)
                .validate_utf8(config.validate_utf8);
        self
    }

    /// Install a hook invoked once for every dispatched buffer after the
    /// callback that received it has returned.
    #[must_use]
    pub fn with_no_copy_cleanup(mut self, cleanup: NoCopyCleanup) -> Self {
        self.engine.dispatcher.set_cleanup(cleanup);
        self
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ConnectionState { self.engine.current() }

    /// Active configuration.
    #[must_use]
    pub fn config(&self) -> &WebSocketConfig { &self.engine.config }

    /// Borrow the handler.
    #[must_use]
    pub fn handler(&self) -> &H { self.engine.dispatcher.handler() }

    /// Mutably borrow the handler.
    pub fn handler_mut(&mut self) -> &mut H { self.engine.dispatcher.handler_mut() }

    /// Consume the connection, returning the handler.
    pub fn into_handler(self) -> H { self.engine.dispatcher.into_handler() }

    /// Take every encoded byte waiting to be written to the transport.
    pub fn poll_outbound(&mut self) -> Option<Bytes> {
        if self.engine.outbound.is_empty() {
            return None;
        }
        Some(self.engine.outbound.split().freeze())
    }

    /// Whether encoded bytes are waiting to be written.
    #[must_use]
    pub fn has_outbound(&self) -> bool { !self.engine.outbound.is_empty() }

    /// Process bytes read from the transport.
    ///
    /// Frames are decoded and dispatched as far as the bytes allow; a
    /// partial frame is kept until the next call. Bytes arriving after the
    /// connection reached a terminal state are discarded.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::NotOpen`] before the connection is established.
    /// Protocol violations fail the connection: the error and close
    /// callbacks fire, a close frame is queued, and the error is returned.
    pub fn feed(&mut self, bytes: &[u8]) -> Result<()> {
        let state = self.state();
        if !state.is_readable() {
            if state.is_terminal() {
                trace!(len = bytes.len(), "discarding bytes after close");
                return Ok(());
            }
            return Err(StateError::NotOpen { state }.into());
        }
        self.inbound.extend_from_slice(bytes);
        let result = self.pump();
        if let Err(error) = &result {
            self.engine.fail(error);
            self.decoder.reset();
        }
        if self.state().is_terminal() {
            self.inbound.clear();
        }
        result
    }

    fn pump(&mut self) -> Result<()> {
        while self.state().is_readable() {
            match self.decoder.decode(&mut self.inbound, &mut self.engine)? {
                DecodeStatus::Complete(header) => {
                    metrics::inc_frames(Direction::Inbound);
                    trace!(
                        opcode = %header.opcode,
                        fin = header.fin,
                        len = header.payload_len,
                        "frame received"
                    );
                }
                DecodeStatus::NeedMore => break,
                DecodeStatus::UserAbort => self.engine.take_abort()?,
            }
        }
        Ok(())
    }

    /// Name resolution succeeded.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::IllegalTransition`] outside
    /// [`ConnectionState::Resolving`].
    pub fn resolved(&mut self) -> Result<()> {
        self.engine.state.apply(LifecycleEvent::Resolved)?;
        Ok(())
    }

    /// Name resolution failed.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::IllegalTransition`] outside
    /// [`ConnectionState::Resolving`].
    pub fn resolve_failed(&mut self) -> Result<()> {
        self.engine.state.apply(LifecycleEvent::ResolveFailed)?;
        let error = Error::Transport(io::Error::new(
            io::ErrorKind::NotFound,
            "name resolution failed",
        ));
        self.engine.dispatcher.connect(ConnectOutcome::Failed);
        self.engine.report(&error);
        self.engine.finish(CloseStatus::ABNORMAL, &error.to_string());
        Ok(())
    }

    /// The transport connected and the upgrade handshake completed.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::IllegalTransition`] outside
    /// [`ConnectionState::Connecting`], including after a connect timeout.
    pub fn connected(&mut self) -> Result<()> {
        self.engine.state.apply(LifecycleEvent::Connected)?;
        self.engine.dispatcher.connect(ConnectOutcome::Established);
        Ok(())
    }

    /// The transport failed to connect.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::IllegalTransition`] outside
    /// [`ConnectionState::Connecting`].
    pub fn connect_failed(&mut self) -> Result<()> {
        self.ensure(LifecycleEvent::ConnectFailed)?;
        self.lose_transport(Error::Transport(io::Error::new(
            io::ErrorKind::ConnectionRefused,
            "connect failed",
        )))
    }

    /// The caller's connect timer expired before [`connected`](Self::connected).
    ///
    /// # Errors
    ///
    /// Returns [`StateError::IllegalTransition`] outside
    /// [`ConnectionState::Connecting`].
    pub fn connect_timed_out(&mut self) -> Result<()> {
        self.ensure(LifecycleEvent::ConnectFailed)?;
        let timeout = self.engine.config.connect_timeout;
        debug!(?timeout, "connect timed out");
        self.engine.dispatcher.timeout(timeout);
        self.fail_connect(ConnectOutcome::Failed, "connect timed out")
    }

    /// Pass an HTTP upgrade response header to the handler.
    ///
    /// When the handler answers [`Flow::Abort`] the connection attempt ends
    /// with [`ConnectOutcome::Aborted`].
    ///
    /// # Errors
    ///
    /// Returns [`StateError::IllegalTransition`] outside
    /// [`ConnectionState::Connecting`].
    pub fn upgrade_header(&mut self, name: &str, value: &str) -> Result<Flow> {
        self.ensure(LifecycleEvent::ConnectFailed)?;
        let flow = self.engine.dispatcher.upgrade_header(name, value);
        if flow.is_abort() {
            debug!(name, "upgrade rejected by handler");
            self.fail_connect(ConnectOutcome::Aborted, "upgrade rejected")?;
        }
        Ok(flow)
    }

    /// The caller's close timer expired while waiting for the peer's close
    /// frame.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::IllegalTransition`] outside
    /// [`ConnectionState::Closing`].
    pub fn close_timed_out(&mut self) -> Result<()> {
        self.ensure(LifecycleEvent::CloseAbandoned)?;
        let timeout = self.engine.config.close_timeout;
        debug!(?timeout, "close handshake timed out");
        self.engine.dispatcher.timeout(timeout);
        self.engine
            .abandon(CloseStatus::ABNORMAL, "close handshake timed out");
        Ok(())
    }

    /// The transport reached end of stream.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::IllegalTransition`] while resolving.
    pub fn transport_closed(&mut self) -> Result<()> {
        self.lose_transport(Error::Transport(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "connection closed without close frame",
        )))
    }

    /// The transport failed.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::IllegalTransition`] while resolving.
    pub fn transport_error(&mut self, error: io::Error) -> Result<()> {
        self.lose_transport(Error::Transport(error))
    }

    /// Handle an [`Error::Transport`] in whatever state the connection is in.
    ///
    /// Before the handshake has begun the error callback fires between the
    /// connect and close callbacks. While closing, only the close callback
    /// fires.
    fn lose_transport(&mut self, error: Error) -> Result<()> {
        let reason = error.to_string();
        match self.state() {
            ConnectionState::Resolving => Err(StateError::IllegalTransition {
                from: ConnectionState::Resolving,
                event: LifecycleEvent::TransportLost,
            }
            .into()),
            ConnectionState::Connecting => {
                self.engine.state.apply(LifecycleEvent::ConnectFailed)?;
                self.engine.dispatcher.connect(ConnectOutcome::Failed);
                self.engine.report(&error);
                self.engine.finish(CloseStatus::ABNORMAL, &reason);
                Ok(())
            }
            ConnectionState::Connected => {
                self.engine.report(&error);
                self.engine.abandon(CloseStatus::ABNORMAL, &reason);
                Ok(())
            }
            ConnectionState::Closing | ConnectionState::ClosingUnclean => {
                self.engine.abandon(CloseStatus::ABNORMAL, &reason);
                Ok(())
            }
            ConnectionState::ClosedCleanly | ConnectionState::ClosedUncleanly => Ok(()),
        }
    }

    fn fail_connect(&mut self, outcome: ConnectOutcome, reason: &str) -> Result<()> {
        self.engine.state.apply(LifecycleEvent::ConnectFailed)?;
        self.engine.dispatcher.connect(outcome);
        self.engine.finish(CloseStatus::ABNORMAL, reason);
        Ok(())
    }

    fn ensure(&self, event: LifecycleEvent) -> Result<()> {
        if self.engine.state.can_apply(event) {
            return Ok(());
        }
        Err(StateError::IllegalTransition {
            from: self.state(),
            event,
        }
        .into())
    }
}

#[cfg(test)]
mod tests;
