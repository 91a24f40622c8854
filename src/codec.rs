//! Frame codec for the RFC 6455 wire format.
//!
//! Decoding is incremental: [`FrameDecoder`] keeps its stage between calls and
//! streams payload bytes into a [`FrameSink`] as they arrive, returning
//! [`DecodeStatus::NeedMore`] whenever the buffer runs dry. Encoding is
//! handled by [`encode_frame`], which always emits the shortest length form
//! and masks the payload when given a key.
//!
//! [`WebSocketCodec`] adapts both halves to `tokio_util`'s [`Decoder`] and
//! [`Encoder`] traits for callers that drive the transport with `Framed`.
//!
//! # Error Handling
//!
//! All decode failures are fatal. [`CodecError::close_status`] gives the
//! status the connection is failed with: `1009` for oversized payloads and
//! `1002` for every other framing violation.

use std::io;

use bytes::{Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

pub mod decoder;
pub mod error;

pub use decoder::{DecodeStatus, FrameDecoder, FrameSink};
pub use error::{CodecError, EofError, FramingError};

use crate::{
    frame::{CONTROL_MAX_PAYLOAD_LEN, Frame, FrameHeader, MAX_PAYLOAD_LEN},
    hooks::Flow,
    mask::{MaskKeySource, OsMaskSource, apply_mask},
};

/// Append the wire encoding of `frame` to `dst`.
///
/// When `mask` is `Some`, the MASK bit is set, the key follows the length
/// field, and the payload is XORed with the key. RSV bits and reserved
/// opcodes in the frame header are written as given.
///
/// # Errors
///
/// Returns [`FramingError::ControlFrameTooLarge`] or
/// [`FramingError::FragmentedControlFrame`] for invalid control frames and
/// [`FramingError::OversizedPayload`] when the payload exceeds
/// [`MAX_PAYLOAD_LEN`].
///
/// # Examples
///
/// ```
/// use bytes::BytesMut;
/// use wsframe::{codec::encode_frame, frame::Frame};
///
/// let mut buf = BytesMut::new();
/// encode_frame(&Frame::text("hi"), None, &mut buf).expect("encode");
/// assert_eq!(&buf[..], &[0x81, 0x02, b'h', b'i']);
/// ```
pub fn encode_frame(
    frame: &Frame,
    mask: Option<[u8; 4]>,
    dst: &mut BytesMut,
) -> Result<(), FramingError> {
    let payload = frame.payload();
    let len = payload.len() as u64;
    let opcode = frame.opcode();
    if opcode.is_control() {
        if payload.len() > CONTROL_MAX_PAYLOAD_LEN {
            return Err(FramingError::ControlFrameTooLarge { opcode, len });
        }
        if !frame.is_fin() {
            return Err(FramingError::FragmentedControlFrame { opcode });
        }
    }
    if len > MAX_PAYLOAD_LEN {
        return Err(FramingError::OversizedPayload {
            len,
            max: MAX_PAYLOAD_LEN,
        });
    }

    let header = FrameHeader {
        mask,
        payload_len: len,
        ..*frame.header()
    };
    dst.reserve(header.encoded_len() + payload.len());
    header.write_to(dst);
    let start = dst.len();
    dst.extend_from_slice(payload);
    if let Some(key) = mask {
        apply_mask(&mut dst[start..], key, 0);
    }
    Ok(())
}

/// Sink that buffers each frame's payload until the frame is complete.
#[derive(Debug, Default)]
pub struct FrameCollector {
    payload: BytesMut,
    frame: Option<Frame>,
}

impl FrameCollector {
    /// Take the most recently completed frame.
    pub fn take_frame(&mut self) -> Option<Frame> { self.frame.take() }
}

impl FrameSink for FrameCollector {
    type Error = CodecError;

    fn frame_begin(&mut self, header: &FrameHeader) -> Result<Flow, CodecError> {
        self.payload.clear();
        let hint = usize::try_from(header.payload_len).unwrap_or(usize::MAX);
        self.payload.reserve(hint.min(64 * 1024));
        Ok(Flow::Continue)
    }

    fn frame_data(&mut self, _header: &FrameHeader, chunk: Bytes) -> Result<Flow, CodecError> {
        self.payload.extend_from_slice(&chunk);
        Ok(Flow::Continue)
    }

    fn frame_end(&mut self, header: &FrameHeader) -> Result<Flow, CodecError> {
        let payload = self.payload.split().freeze();
        self.frame = Some(Frame::from_parts(*header, payload));
        Ok(Flow::Continue)
    }
}

/// `tokio_util` codec yielding whole frames.
///
/// Outbound frames are masked with keys from the configured
/// [`MaskKeySource`]; [`WebSocketCodec::unmasked`] disables masking, which is
/// what a peer acting as a server would use.
#[derive(Debug)]
pub struct WebSocketCodec {
    decoder: FrameDecoder,
    collector: FrameCollector,
    mask_source: Option<Box<dyn MaskKeySource>>,
}

impl Default for WebSocketCodec {
    fn default() -> Self { Self::client(MAX_PAYLOAD_LEN) }
}

impl WebSocketCodec {
    /// Client codec masking with the operating system's CSPRNG.
    #[must_use]
    pub fn client(max_payload_len: u64) -> Self {
        Self::with_mask_source(max_payload_len, Box::new(OsMaskSource))
    }

    /// Client codec masking with keys from `source`.
    #[must_use]
    pub fn with_mask_source(max_payload_len: u64, source: Box<dyn MaskKeySource>) -> Self {
        Self {
            decoder: FrameDecoder::new(max_payload_len),
            collector: FrameCollector::default(),
            mask_source: Some(source),
        }
    }

    /// Codec that never masks outbound frames.
    #[must_use]
    pub fn unmasked(max_payload_len: u64) -> Self {
        Self {
            decoder: FrameDecoder::new(max_payload_len),
            collector: FrameCollector::default(),
            mask_source: None,
        }
    }
}

impl Decoder for WebSocketCodec {
    type Item = Frame;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, io::Error> {
        match self.decoder.decode(src, &mut self.collector)? {
            DecodeStatus::Complete(_) => Ok(self.collector.take_frame()),
            DecodeStatus::NeedMore | DecodeStatus::UserAbort => Ok(None),
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, io::Error> {
        if let Some(frame) = self.decode(src)? {
            return Ok(Some(frame));
        }
        if let Some(remaining) = self.decoder.remaining_payload() {
            return Err(CodecError::Eof(EofError::MidFrame { remaining }).into());
        }
        if !src.is_empty() || !self.decoder.is_idle() {
            return Err(CodecError::Eof(EofError::MidHeader {
                bytes_received: src.len(),
            })
            .into());
        }
        Ok(None)
    }
}

impl Encoder<Frame> for WebSocketCodec {
    type Error = io::Error;

    fn encode(&mut self, item: Frame, dst: &mut BytesMut) -> Result<(), io::Error> {
        let mask = match self.mask_source.as_mut() {
            Some(source) => Some(source.next_key().map_err(CodecError::MaskSource)?),
            None => None,
        };
        encode_frame(&item, mask, dst).map_err(CodecError::from)?;
        Ok(())
    }
}
