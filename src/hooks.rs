//! Application callbacks and the dispatcher that invokes them.
//!
//! [`Handler`] is the interface applications implement: one defaulted method
//! per event. [`Callbacks`] offers the same surface as a table of boxed
//! closures for callers that prefer registering functions. [`Dispatcher`]
//! sits between the engine and the handler and enforces the dispatch rules:
//! message events arrive begin → frame → end, an abort silences the rest of
//! the message, and nothing is delivered after the close callback.

use std::{fmt, time::Duration};

use bytes::{Bytes, BytesMut};

use crate::{
    close::CloseStatus,
    frame::FrameHeader,
    message_assembler::{Message, MessageKind},
};

/// Whether processing should continue after a callback returns.
#[must_use]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Flow {
    /// Keep going.
    #[default]
    Continue,
    /// Stop processing the current frame or message and start closing.
    Abort,
}

impl Flow {
    /// `true` for [`Flow::Abort`].
    #[must_use]
    pub const fn is_abort(self) -> bool { matches!(self, Self::Abort) }
}

/// Result reported through [`Handler::on_connect`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectOutcome {
    /// The transport connected and the connection is open.
    Established,
    /// Resolution or connection failed, or the connect timeout elapsed.
    Failed,
    /// The upgrade-header callback rejected the handshake.
    Aborted,
}

/// Callbacks invoked by a [`Connection`](crate::connection::Connection).
///
/// Every method has a no-op default. Data callbacks return [`Flow`];
/// returning [`Flow::Abort`] stops delivery of the current message and is
/// treated as a request to close the connection normally.
///
/// # Examples
///
/// ```
/// use wsframe::{
///     close::CloseStatus,
///     hooks::{Flow, Handler},
///     message_assembler::Message,
/// };
///
/// #[derive(Default)]
/// struct Printer {
///     seen: Vec<String>,
/// }
///
/// impl Handler for Printer {
///     fn on_message(&mut self, message: &Message) -> Flow {
///         if let Some(text) = message.as_text() {
///             self.seen.push(text.to_owned());
///         }
///         Flow::Continue
///     }
///
///     fn on_close(&mut self, status: CloseStatus, reason: &str) {
///         tracing::info!(%status, reason, "closed");
///     }
/// }
/// ```
pub trait Handler {
    /// A complete message (buffered mode) or control frame (both modes).
    fn on_message(&mut self, _message: &Message) -> Flow { Flow::Continue }

    /// A data message started (streaming mode).
    fn on_message_begin(&mut self, _kind: MessageKind) -> Flow { Flow::Continue }

    /// A chunk of the current message's payload (streaming mode).
    ///
    /// The view is only guaranteed for the duration of the call; clone the
    /// [`Bytes`] handle to retain it without copying.
    fn on_message_frame(&mut self, _payload: &Bytes) -> Flow { Flow::Continue }

    /// The current message ended (streaming mode).
    fn on_message_end(&mut self) -> Flow { Flow::Continue }

    /// A physical frame header was decoded. Fires for every frame, control
    /// frames included.
    fn on_frame_begin(&mut self, _header: &FrameHeader) -> Flow { Flow::Continue }

    /// A chunk of the current physical frame's unmasked payload.
    fn on_frame_data(&mut self, _payload: &Bytes) -> Flow { Flow::Continue }

    /// The current physical frame ended.
    fn on_frame_end(&mut self) -> Flow { Flow::Continue }

    /// Advisory error report. State changes are signalled separately.
    fn on_error(&mut self, _code: u16, _text: &str) {}

    /// The connection reached a terminal state.
    fn on_close(&mut self, _status: CloseStatus, _reason: &str) {}

    /// Connection attempt finished.
    fn on_connect(&mut self, _outcome: ConnectOutcome) {}

    /// A caller-owned timer expired.
    fn on_timeout(&mut self, _timeout: Duration) {}

    /// An HTTP upgrade response header, passed through from the external
    /// handshake. Returning [`Flow::Abort`] rejects the handshake.
    fn on_upgrade_header(&mut self, _name: &str, _value: &str) -> Flow { Flow::Continue }
}

impl<H: Handler + ?Sized> Handler for Box<H> {
    fn on_message(&mut self, message: &Message) -> Flow { (**self).on_message(message) }

    fn on_message_begin(&mut self, kind: MessageKind) -> Flow { (**self).on_message_begin(kind) }

    fn on_message_frame(&mut self, payload: &Bytes) -> Flow { (**self).on_message_frame(payload) }

    fn on_message_end(&mut self) -> Flow { (**self).on_message_end() }

    fn on_frame_begin(&mut self, header: &FrameHeader) -> Flow { (**self).on_frame_begin(header) }

    fn on_frame_data(&mut self, payload: &Bytes) -> Flow { (**self).on_frame_data(payload) }

    fn on_frame_end(&mut self) -> Flow { (**self).on_frame_end() }

    fn on_error(&mut self, code: u16, text: &str) { (**self).on_error(code, text); }

    fn on_close(&mut self, status: CloseStatus, reason: &str) { (**self).on_close(status, reason); }

    fn on_connect(&mut self, outcome: ConnectOutcome) { (**self).on_connect(outcome); }

    fn on_timeout(&mut self, timeout: Duration) { (**self).on_timeout(timeout); }

    fn on_upgrade_header(&mut self, name: &str, value: &str) -> Flow {
        (**self).on_upgrade_header(name, value)
    }
}

type MessageHook = Box<dyn FnMut(&Message) -> Flow + Send + 'static>;
type MessageBeginHook = Box<dyn FnMut(MessageKind) -> Flow + Send + 'static>;
type PayloadHook = Box<dyn FnMut(&Bytes) -> Flow + Send + 'static>;
type MarkerHook = Box<dyn FnMut() -> Flow + Send + 'static>;
type FrameBeginHook = Box<dyn FnMut(&FrameHeader) -> Flow + Send + 'static>;
type ErrorHook = Box<dyn FnMut(u16, &str) + Send + 'static>;
type CloseHook = Box<dyn FnMut(CloseStatus, &str) + Send + 'static>;
type ConnectHook = Box<dyn FnMut(ConnectOutcome) + Send + 'static>;
type TimeoutHook = Box<dyn FnMut(Duration) + Send + 'static>;
type HeaderHook = Box<dyn FnMut(&str, &str) -> Flow + Send + 'static>;

/// Hook invoked once the engine has finished with a dispatched buffer.
pub type NoCopyCleanup = Box<dyn FnMut(&Bytes) + Send + 'static>;

/// Handler built from individually registered closures.
///
/// The registration methods share their names with the [`Handler`] methods,
/// so calling a callback directly on a concrete `Callbacks` needs the trait
/// path, e.g. `Handler::on_message(&mut callbacks, &message)`.
///
/// ```
/// use wsframe::hooks::{Callbacks, Flow};
///
/// let callbacks = Callbacks::default()
///     .on_message(|message| {
///         println!("{} bytes", message.len());
///         Flow::Continue
///     })
///     .on_error(|code, text| eprintln!("error {code}: {text}"));
/// # drop(callbacks);
/// ```
#[derive(Default)]
pub struct Callbacks {
    message: Option<MessageHook>,
    message_begin: Option<MessageBeginHook>,
    message_frame: Option<PayloadHook>,
    message_end: Option<MarkerHook>,
    frame_begin: Option<FrameBeginHook>,
    frame_data: Option<PayloadHook>,
    frame_end: Option<MarkerHook>,
    error: Option<ErrorHook>,
    close: Option<CloseHook>,
    connect: Option<ConnectHook>,
    timeout: Option<TimeoutHook>,
    upgrade_header: Option<HeaderHook>,
}

impl fmt::Debug for Callbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callbacks")
            .field("message", &self.message.is_some())
            .field("streaming", &self.message_begin.is_some())
            .field("frames", &self.frame_begin.is_some())
            .field("close", &self.close.is_some())
            .finish_non_exhaustive()
    }
}

impl Callbacks {
    /// Register the complete-message callback.
    #[must_use]
    pub fn on_message(mut self, f: impl FnMut(&Message) -> Flow + Send + 'static) -> Self {
        self.message = Some(Box::new(f));
        self
    }

    /// Register the streaming begin callback.
    #[must_use]
    pub fn on_message_begin(mut self, f: impl FnMut(MessageKind) -> Flow + Send + 'static) -> Self {
        self.message_begin = Some(Box::new(f));
        self
    }

    /// Register the streaming payload callback.
    #[must_use]
    pub fn on_message_frame(mut self, f: impl FnMut(&Bytes) -> Flow + Send + 'static) -> Self {
        self.message_frame = Some(Box::new(f));
        self
    }

    /// Register the streaming end callback.
    #[must_use]
    pub fn on_message_end(mut self, f: impl FnMut() -> Flow + Send + 'static) -> Self {
        self.message_end = Some(Box::new(f));
        self
    }

    /// Register the physical frame header callback.
    #[must_use]
    pub fn on_frame_begin(mut self, f: impl FnMut(&FrameHeader) -> Flow + Send + 'static) -> Self {
        self.frame_begin = Some(Box::new(f));
        self
    }

    /// Register the physical frame payload callback.
    #[must_use]
    pub fn on_frame_data(mut self, f: impl FnMut(&Bytes) -> Flow + Send + 'static) -> Self {
        self.frame_data = Some(Box::new(f));
        self
    }

    /// Register the physical frame end callback.
    #[must_use]
    pub fn on_frame_end(mut self, f: impl FnMut() -> Flow + Send + 'static) -> Self {
        self.frame_end = Some(Box::new(f));
        self
    }

    /// Register the error callback.
    #[must_use]
    pub fn on_error(mut self, f: impl FnMut(u16, &str) + Send + 'static) -> Self {
        self.error = Some(Box::new(f));
        self
    }

    /// Register the close callback.
    #[must_use]
    pub fn on_close(mut self, f: impl FnMut(CloseStatus, &str) + Send + 'static) -> Self {
        self.close = Some(Box::new(f));
        self
    }

    /// Register the connect callback.
    #[must_use]
    pub fn on_connect(mut self, f: impl FnMut(ConnectOutcome) + Send + 'static) -> Self {
        self.connect = Some(Box::new(f));
        self
    }

    /// Register the timeout callback.
    #[must_use]
    pub fn on_timeout(mut self, f: impl FnMut(Duration) + Send + 'static) -> Self {
        self.timeout = Some(Box::new(f));
        self
    }

    /// Register the upgrade-header callback.
    #[must_use]
    pub fn on_upgrade_header(mut self, f: impl FnMut(&str, &str) -> Flow + Send + 'static) -> Self {
        self.upgrade_header = Some(Box::new(f));
        self
    }
}

impl Handler for Callbacks {
    fn on_message(&mut self, message: &Message) -> Flow {
        self.message.as_mut().map_or(Flow::Continue, |f| f(message))
    }

    fn on_message_begin(&mut self, kind: MessageKind) -> Flow {
        self.message_begin.as_mut().map_or(Flow::Continue, |f| f(kind))
    }

    fn on_message_frame(&mut self, payload: &Bytes) -> Flow {
        self.message_frame
            .as_mut()
            .map_or(Flow::Continue, |f| f(payload))
    }

    fn on_message_end(&mut self) -> Flow { self.message_end.as_mut().map_or(Flow::Continue, |f| f()) }

    fn on_frame_begin(&mut self, header: &FrameHeader) -> Flow {
        self.frame_begin.as_mut().map_or(Flow::Continue, |f| f(header))
    }

    fn on_frame_data(&mut self, payload: &Bytes) -> Flow {
        self.frame_data.as_mut().map_or(Flow::Continue, |f| f(payload))
    }

    fn on_frame_end(&mut self) -> Flow { self.frame_end.as_mut().map_or(Flow::Continue, |f| f()) }

    fn on_error(&mut self, code: u16, text: &str) {
        if let Some(f) = &mut self.error {
            f(code, text);
        }
    }

    fn on_close(&mut self, status: CloseStatus, reason: &str) {
        if let Some(f) = &mut self.close {
            f(status, reason);
        }
    }

    fn on_connect(&mut self, outcome: ConnectOutcome) {
        if let Some(f) = &mut self.connect {
            f(outcome);
        }
    }

    fn on_timeout(&mut self, timeout: Duration) {
        if let Some(f) = &mut self.timeout {
            f(timeout);
        }
    }

    fn on_upgrade_header(&mut self, name: &str, value: &str) -> Flow {
        self.upgrade_header
            .as_mut()
            .map_or(Flow::Continue, |f| f(name, value))
    }
}

/// Replaceable allocation strategy for message accumulation buffers.
///
/// The defaults defer to [`BytesMut`]'s own allocation.
pub trait BufferAllocator: Send {
    /// Allocate an empty buffer with room for `capacity` bytes.
    fn allocate(&self, capacity: usize) -> BytesMut { BytesMut::with_capacity(capacity) }

    /// Grow `buf` so it can take `additional` more bytes.
    fn reallocate(&self, buf: &mut BytesMut, additional: usize) { buf.reserve(additional); }

    /// Release a buffer the engine no longer needs.
    fn free(&self, buf: BytesMut) { drop(buf); }
}

/// Allocator using the global heap.
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultAllocator;

impl BufferAllocator for DefaultAllocator {}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum MessageDispatch {
    Idle,
    Open,
    Suppressed,
}

/// Invokes [`Handler`] callbacks while enforcing ordering and abort rules.
pub struct Dispatcher<H> {
    handler: H,
    message: MessageDispatch,
    closed: bool,
    cleanup: Option<NoCopyCleanup>,
}

impl<H: Handler> Dispatcher<H> {
    /// Wrap `handler`.
    pub fn new(handler: H) -> Self {
        Self {
            handler,
            message: MessageDispatch::Idle,
            closed: false,
            cleanup: None,
        }
    }

    /// Install the no-copy cleanup hook.
    pub fn set_cleanup(&mut self, cleanup: NoCopyCleanup) { self.cleanup = Some(cleanup); }

    /// Borrow the handler.
    pub fn handler(&self) -> &H { &self.handler }

    /// Mutably borrow the handler.
    pub fn handler_mut(&mut self) -> &mut H { &mut self.handler }

    /// Consume the dispatcher, returning the handler.
    pub fn into_handler(self) -> H { self.handler }

    /// Whether the close callback has fired.
    pub fn is_closed(&self) -> bool { self.closed }

    /// Whether delivery of the current message has been cut off by an abort.
    pub fn is_suppressed(&self) -> bool { self.message == MessageDispatch::Suppressed }

    /// Silence every further callback for the current message.
    pub fn suppress_message(&mut self) {
        if self.message == MessageDispatch::Open {
            self.message = MessageDispatch::Suppressed;
        }
    }

    /// Forget the current message, e.g. once its final frame has passed.
    pub fn finish_message(&mut self) { self.message = MessageDispatch::Idle; }

    fn guard(&mut self, flow: Flow) -> Flow {
        if flow.is_abort() {
            self.suppress_message();
        }
        flow
    }

    fn release(&mut self, payload: &Bytes) {
        if let Some(cleanup) = &mut self.cleanup {
            cleanup(payload);
        }
    }

    /// Deliver a complete message.
    pub fn message(&mut self, message: &Message) -> Flow {
        if self.closed || self.is_suppressed() {
            return Flow::Abort;
        }
        let flow = self.handler.on_message(message);
        self.release(message.payload());
        flow
    }

    /// Open a streamed data message.
    pub fn message_begin(&mut self, kind: MessageKind) -> Flow {
        if self.closed {
            return Flow::Abort;
        }
        self.message = MessageDispatch::Open;
        let flow = self.handler.on_message_begin(kind);
        self.guard(flow)
    }

    /// Deliver a chunk of the open streamed message.
    pub fn message_frame(&mut self, payload: &Bytes) -> Flow {
        if self.closed || self.message != MessageDispatch::Open {
            return Flow::Abort;
        }
        let flow = self.handler.on_message_frame(payload);
        self.release(payload);
        self.guard(flow)
    }

    /// Close the open streamed message.
    pub fn message_end(&mut self) -> Flow {
        if self.closed || self.message != MessageDispatch::Open {
            return Flow::Abort;
        }
        let flow = self.handler.on_message_end();
        self.message = MessageDispatch::Idle;
        flow
    }

    /// Report a physical frame header.
    pub fn frame_begin(&mut self, header: &FrameHeader) -> Flow {
        if self.closed || self.is_suppressed() {
            return Flow::Abort;
        }
        let flow = self.handler.on_frame_begin(header);
        self.guard(flow)
    }

    /// Report a chunk of physical frame payload.
    pub fn frame_data(&mut self, payload: &Bytes) -> Flow {
        if self.closed || self.is_suppressed() {
            return Flow::Abort;
        }
        let flow = self.handler.on_frame_data(payload);
        self.guard(flow)
    }

    /// Report the end of a physical frame.
    pub fn frame_end(&mut self) -> Flow {
        if self.closed || self.is_suppressed() {
            return Flow::Abort;
        }
        let flow = self.handler.on_frame_end();
        self.guard(flow)
    }

    /// Report an error.
    pub fn error(&mut self, code: u16, text: &str) {
        if !self.closed {
            self.handler.on_error(code, text);
        }
    }

    /// Report the terminal close. Fires at most once.
    pub fn close(&mut self, status: CloseStatus, reason: &str) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.message = MessageDispatch::Idle;
        self.handler.on_close(status, reason);
    }

    /// Report the connection attempt's outcome.
    pub fn connect(&mut self, outcome: ConnectOutcome) {
        if !self.closed {
            self.handler.on_connect(outcome);
        }
    }

    /// Report an expired timer.
    pub fn timeout(&mut self, timeout: Duration) {
        if !self.closed {
            self.handler.on_timeout(timeout);
        }
    }

    /// Pass an upgrade header through.
    pub fn upgrade_header(&mut self, name: &str, value: &str) -> Flow {
        if self.closed {
            return Flow::Abort;
        }
        self.handler.on_upgrade_header(name, value)
    }
}
