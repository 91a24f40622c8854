//! Single-accumulation message reassembler.
//!
//! `MessageReassembler` consumes the pieces of each physical frame as the
//! decoder produces them. Data frames are coalesced into one active message;
//! control frames are collected on the side so they can arrive between the
//! fragments of a data message without disturbing it.

use bytes::{Bytes, BytesMut};

use super::{
    DispatchMode,
    Message,
    MessageAssemblyError,
    MessageKind,
    utf8::Utf8Validator,
};
use crate::{
    frame::{CONTROL_MAX_PAYLOAD_LEN, Frame, FrameHeader, MAX_PAYLOAD_LEN, OpCode},
    hooks::{BufferAllocator, DefaultAllocator},
};

/// Largest buffer reserved up front from a declared frame length.
const INITIAL_RESERVE: u64 = 64 * 1024;

/// How a physical frame relates to the message stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameRole {
    /// A control frame, complete on its own.
    Control,
    /// The first frame of a new data message.
    Start(MessageKind),
    /// A continuation of the active data message.
    Continuation,
}

/// Produced when a physical frame ends.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Assembled {
    /// A data message completed in buffered mode.
    Message(Message),
    /// A data message completed in streaming mode.
    End,
    /// A control frame completed.
    Control(Frame),
}

#[derive(Debug)]
struct Partial {
    kind: MessageKind,
    buffer: BytesMut,
    len: u64,
    utf8: Option<Utf8Validator>,
}

/// Coalesces fragmented data frames into messages.
///
/// # Examples
///
/// ```
/// use bytes::Bytes;
/// use wsframe::{
///     frame::{FrameHeader, OpCode},
///     message_assembler::{Assembled, DispatchMode, FrameRole, MessageKind, MessageReassembler},
/// };
///
/// let mut reassembler = MessageReassembler::new(DispatchMode::Buffered, 1024);
///
/// let first = FrameHeader::new(OpCode::Text, false, 3);
/// assert_eq!(
///     reassembler.begin_frame(&first).expect("start"),
///     FrameRole::Start(MessageKind::Text)
/// );
/// reassembler.push(&first, Bytes::from_static(b"Hel")).expect("data");
/// assert!(reassembler.end_frame(&first).expect("end").is_none());
///
/// let last = FrameHeader::new(OpCode::Continuation, true, 2);
/// reassembler.begin_frame(&last).expect("continuation");
/// reassembler.push(&last, Bytes::from_static(b"lo")).expect("data");
/// let Some(Assembled::Message(message)) = reassembler.end_frame(&last).expect("end") else {
///     panic!("message should complete");
/// };
/// assert_eq!(message.as_text(), Some("Hello"));
/// ```
pub struct MessageReassembler {
    mode: DispatchMode,
    max_message_len: u64,
    validate_utf8: bool,
    allocator: Box<dyn BufferAllocator>,
    active: Option<Partial>,
    control: BytesMut,
}

impl std::fmt::Debug for MessageReassembler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageReassembler")
            .field("mode", &self.mode)
            .field("max_message_len", &self.max_message_len)
            .field("validate_utf8", &self.validate_utf8)
            .field("active", &self.active)
            .finish_non_exhaustive()
    }
}

impl MessageReassembler {
    /// Create a reassembler using the global heap for message buffers.
    ///
    /// `max_message_len` is clamped to [`MAX_PAYLOAD_LEN`].
    #[must_use]
    pub fn new(mode: DispatchMode, max_message_len: u64) -> Self {
        Self::with_allocator(mode, max_message_len, Box::new(DefaultAllocator))
    }

    /// Create a reassembler drawing message buffers from `allocator`.
    #[must_use]
    pub fn with_allocator(
        mode: DispatchMode,
        max_message_len: u64,
        allocator: Box<dyn BufferAllocator>,
    ) -> Self {
        Self {
            mode,
            max_message_len: max_message_len.min(MAX_PAYLOAD_LEN),
            validate_utf8: true,
            allocator,
            active: None,
            control: BytesMut::with_capacity(CONTROL_MAX_PAYLOAD_LEN),
        }
    }

    /// Enable or disable UTF-8 validation of text messages.
    #[must_use]
    pub fn validate_utf8(mut self, enabled: bool) -> Self {
        self.validate_utf8 = enabled;
        self
    }

    /// Configured dispatch mode.
    #[must_use]
    pub const fn mode(&self) -> DispatchMode { self.mode }

    /// Kind of the message currently being assembled.
    #[must_use]
    pub fn in_progress(&self) -> Option<MessageKind> { self.active.as_ref().map(|p| p.kind) }

    /// Classify a newly decoded frame and open a message if it starts one.
    ///
    /// # Errors
    ///
    /// Returns [`MessageAssemblyError::UnexpectedContinuation`],
    /// [`MessageAssemblyError::InterleavedStart`] for sequencing violations,
    /// or [`MessageAssemblyError::MessageTooLarge`] when the declared frame
    /// length would push the message past the ceiling.
    pub fn begin_frame(&mut self, header: &FrameHeader) -> Result<FrameRole, MessageAssemblyError> {
        let opcode = header.opcode;
        if opcode.is_control() {
            self.control.clear();
            return Ok(FrameRole::Control);
        }
        match (opcode, self.active.as_ref()) {
            (OpCode::Continuation, None) => Err(MessageAssemblyError::UnexpectedContinuation),
            (OpCode::Continuation, Some(partial)) => {
                self.check_limit(partial.len, header.payload_len)?;
                Ok(FrameRole::Continuation)
            }
            (_, Some(partial)) => Err(MessageAssemblyError::InterleavedStart {
                active: partial.kind,
                opcode,
            }),
            (_, None) => {
                let kind = MessageKind::from_opcode(opcode)
                    .ok_or(MessageAssemblyError::UnexpectedContinuation)?;
                self.check_limit(0, header.payload_len)?;
                let buffer = match self.mode {
                    DispatchMode::Buffered => {
                        let hint = header.payload_len.min(INITIAL_RESERVE);
                        self.allocator
                            .allocate(usize::try_from(hint).unwrap_or(usize::MAX))
                    }
                    DispatchMode::Streaming => BytesMut::new(),
                };
                let utf8 = (self.validate_utf8 && kind == MessageKind::Text)
                    .then(Utf8Validator::default);
                self.active = Some(Partial {
                    kind,
                    buffer,
                    len: 0,
                    utf8,
                });
                Ok(FrameRole::Start(kind))
            }
        }
    }

    /// Take a chunk of unmasked payload for the current frame.
    ///
    /// In streaming mode data chunks are returned for immediate delivery; in
    /// buffered mode they are accumulated and `None` is returned. Control
    /// payloads are always held until [`end_frame`](Self::end_frame).
    ///
    /// # Errors
    ///
    /// Returns [`MessageAssemblyError::MessageTooLarge`] or
    /// [`MessageAssemblyError::InvalidUtf8`].
    pub fn push(
        &mut self,
        header: &FrameHeader,
        chunk: Bytes,
    ) -> Result<Option<Bytes>, MessageAssemblyError> {
        if header.opcode.is_control() {
            self.control.extend_from_slice(&chunk);
            return Ok(None);
        }
        let max = self.max_message_len;
        let Some(partial) = self.active.as_mut() else {
            return Err(MessageAssemblyError::UnexpectedContinuation);
        };
        let attempted = partial.len.saturating_add(chunk.len() as u64);
        if attempted > max {
            return Err(MessageAssemblyError::MessageTooLarge {
                attempted,
                limit: max,
            });
        }
        partial.len = attempted;
        if let Some(utf8) = partial.utf8.as_mut() {
            if !utf8.feed(&chunk) {
                return Err(MessageAssemblyError::InvalidUtf8);
            }
        }
        match self.mode {
            DispatchMode::Streaming => Ok(Some(chunk)),
            DispatchMode::Buffered => {
                let spare = partial.buffer.capacity() - partial.buffer.len();
                if spare < chunk.len() {
                    self.allocator.reallocate(&mut partial.buffer, chunk.len());
                }
                partial.buffer.extend_from_slice(&chunk);
                Ok(None)
            }
        }
    }

    /// Finish the current physical frame.
    ///
    /// Returns the completed control frame, or the completed message when
    /// `header.fin` closes a data message.
    ///
    /// # Errors
    ///
    /// Returns [`MessageAssemblyError::InvalidUtf8`] when a text message ends
    /// inside a code point.
    pub fn end_frame(
        &mut self,
        header: &FrameHeader,
    ) -> Result<Option<Assembled>, MessageAssemblyError> {
        if header.opcode.is_control() {
            let payload = self.control.split().freeze();
            let header = FrameHeader {
                mask: None,
                ..*header
            };
            return Ok(Some(Assembled::Control(Frame::from_parts(header, payload))));
        }
        if !header.fin {
            return Ok(None);
        }
        let Some(partial) = self.active.take() else {
            return Err(MessageAssemblyError::UnexpectedContinuation);
        };
        if partial.utf8.as_ref().is_some_and(|utf8| !utf8.is_complete()) {
            self.allocator.free(partial.buffer);
            return Err(MessageAssemblyError::InvalidUtf8);
        }
        Ok(Some(match self.mode {
            DispatchMode::Streaming => Assembled::End,
            DispatchMode::Buffered => {
                Assembled::Message(Message::new(partial.kind, partial.buffer.freeze()))
            }
        }))
    }

    /// Drop any partially assembled message, returning its buffer to the
    /// allocator.
    pub fn abandon(&mut self) {
        self.control.clear();
        if let Some(partial) = self.active.take() {
            self.allocator.free(partial.buffer);
        }
    }

    fn check_limit(&self, current: u64, incoming: u64) -> Result<(), MessageAssemblyError> {
        let attempted = current.saturating_add(incoming);
        if attempted > self.max_message_len {
            return Err(MessageAssemblyError::MessageTooLarge {
                attempted,
                limit: self.max_message_len,
            });
        }
        Ok(())
    }
}
