//! Resumable streaming frame decoder.
//!
//! [`FrameDecoder`] keeps its position within the current frame between calls,
//! so a frame split at any byte boundary decodes exactly as if it had arrived
//! in one piece. Header bytes are left in the caller's buffer until a stage is
//! complete; payload bytes are unmasked and handed to the [`FrameSink`] as soon
//! as they arrive.

use bytes::{Buf, Bytes, BytesMut};

use super::error::{CodecError, FramingError};
use crate::{
    frame::{CONTROL_MAX_PAYLOAD_LEN, FrameHeader, HEADER_BASE_SIZE, MAX_PAYLOAD_LEN},
    hooks::Flow,
    mask::apply_mask,
};

const LEN7_MASK: u8 = 0x7F;
const MASK_BIT: u8 = 0x80;

/// Receives the pieces of each frame as the decoder produces them.
pub trait FrameSink {
    /// Error raised by the sink itself, e.g. a reassembly violation.
    type Error: From<CodecError>;

    /// A header has been fully decoded and validated.
    ///
    /// # Errors
    ///
    /// Returning an error aborts decoding with that error.
    fn frame_begin(&mut self, header: &FrameHeader) -> Result<Flow, Self::Error>;

    /// A chunk of unmasked payload. Called zero or more times per frame.
    ///
    /// # Errors
    ///
    /// Returning an error aborts decoding with that error.
    fn frame_data(&mut self, header: &FrameHeader, chunk: Bytes) -> Result<Flow, Self::Error>;

    /// The last payload byte of the frame has been delivered.
    ///
    /// # Errors
    ///
    /// Returning an error aborts decoding with that error.
    fn frame_end(&mut self, header: &FrameHeader) -> Result<Flow, Self::Error>;
}

/// Outcome of a single [`FrameDecoder::decode`] call.
///
/// Decode failures are reported through the `Err` side of the returned
/// `Result`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DecodeStatus {
    /// A whole frame has been delivered to the sink.
    Complete(FrameHeader),
    /// The buffer ran dry; call again once more bytes arrive.
    NeedMore,
    /// The sink asked to stop. The rest of the current frame is discarded.
    UserAbort,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Stage {
    /// Waiting for the two base header bytes.
    Header,
    /// Waiting for a 2- or 8-byte extended length.
    ExtendedLength { header: FrameHeader, width: usize },
    /// Waiting for the four mask-key bytes.
    MaskKey { header: FrameHeader },
    /// Streaming payload bytes. `begun` records that the sink has seen the
    /// header.
    Payload {
        header: FrameHeader,
        offset: u64,
        begun: bool,
    },
    /// Discarding the remainder of an aborted frame.
    Skip { remaining: u64 },
}

/// Incremental RFC 6455 frame decoder.
#[derive(Clone, Debug)]
pub struct FrameDecoder {
    stage: Stage,
    max_payload_len: u64,
}

impl Default for FrameDecoder {
    fn default() -> Self { Self::new(MAX_PAYLOAD_LEN) }
}

impl FrameDecoder {
    /// Create a decoder rejecting payloads longer than `max_payload_len`.
    ///
    /// The ceiling is clamped to [`MAX_PAYLOAD_LEN`].
    #[must_use]
    pub fn new(max_payload_len: u64) -> Self {
        Self {
            stage: Stage::Header,
            max_payload_len: max_payload_len.min(MAX_PAYLOAD_LEN),
        }
    }

    /// Configured payload ceiling.
    #[must_use]
    pub const fn max_payload_len(&self) -> u64 { self.max_payload_len }

    /// Whether the decoder sits at a frame boundary.
    #[must_use]
    pub fn is_idle(&self) -> bool { self.stage == Stage::Header }

    /// Payload bytes still expected for the current frame, if one is open.
    #[must_use]
    pub fn remaining_payload(&self) -> Option<u64> {
        match self.stage {
            Stage::Payload { header, offset, .. } => Some(header.payload_len - offset),
            Stage::Skip { remaining } => Some(remaining),
            _ => None,
        }
    }

    /// Forget any partially decoded frame.
    pub fn reset(&mut self) { self.stage = Stage::Header; }

    /// Decode at most one frame from `src`, streaming it into `sink`.
    ///
    /// Consumed bytes are removed from the front of `src`. On error the
    /// decoder returns to the header stage; the stream is unusable afterwards.
    ///
    /// # Errors
    ///
    /// Returns a [`FramingError`] (wrapped in the sink's error type) for
    /// protocol violations, or any error raised by the sink.
    pub fn decode<S: FrameSink>(
        &mut self,
        src: &mut BytesMut,
        sink: &mut S,
    ) -> Result<DecodeStatus, S::Error> {
        let status = self.step(src, sink);
        if status.is_err() {
            self.stage = Stage::Header;
        }
        status
    }

    fn step<S: FrameSink>(
        &mut self,
        src: &mut BytesMut,
        sink: &mut S,
    ) -> Result<DecodeStatus, S::Error> {
        loop {
            match self.stage {
                Stage::Skip { remaining } => {
                    let n = available(src, remaining);
                    src.advance(n);
                    let remaining = remaining - n as u64;
                    if remaining > 0 {
                        self.stage = Stage::Skip { remaining };
                        return Ok(DecodeStatus::NeedMore);
                    }
                    self.stage = Stage::Header;
                }
                Stage::Header => {
                    if src.len() < HEADER_BASE_SIZE {
                        return Ok(DecodeStatus::NeedMore);
                    }
                    let (b0, b1) = (src[0], src[1]);
                    src.advance(HEADER_BASE_SIZE);
                    let mut header = FrameHeader::from_first_byte(b0);
                    if b1 & MASK_BIT != 0 {
                        header.mask = Some([0; 4]);
                    }
                    let len7 = b1 & LEN7_MASK;
                    validate_base(&header, len7).map_err(CodecError::from)?;
                    match len7 {
                        126 => self.stage = Stage::ExtendedLength { header, width: 2 },
                        127 => self.stage = Stage::ExtendedLength { header, width: 8 },
                        len => {
                            header.payload_len = self.check_ceiling(u64::from(len))?;
                            self.after_length(header);
                        }
                    }
                }
                Stage::ExtendedLength { mut header, width } => {
                    if src.len() < width {
                        return Ok(DecodeStatus::NeedMore);
                    }
                    let len = if width == 2 {
                        u64::from(src.get_u16())
                    } else {
                        src.get_u64()
                    };
                    header.payload_len = self.validate_length(len, width)?;
                    self.after_length(header);
                }
                Stage::MaskKey { mut header } => {
                    if src.len() < 4 {
                        return Ok(DecodeStatus::NeedMore);
                    }
                    let mut key = [0_u8; 4];
                    src.copy_to_slice(&mut key);
                    header.mask = Some(key);
                    self.stage = Stage::Payload {
                        header,
                        offset: 0,
                        begun: false,
                    };
                }
                Stage::Payload {
                    header,
                    offset,
                    begun,
                } => {
                    if !begun && sink.frame_begin(&header)? == Flow::Abort {
                        return Ok(self.abort(header.payload_len));
                    }
                    return self.stream_payload(src, sink, header, offset);
                }
            }
        }
    }

    fn after_length(&mut self, header: FrameHeader) {
        self.stage = if header.mask.is_some() {
            Stage::MaskKey { header }
        } else {
            Stage::Payload {
                header,
                offset: 0,
                begun: false,
            }
        };
    }

    fn validate_length(&self, len: u64, width: usize) -> Result<u64, CodecError> {
        if len > MAX_PAYLOAD_LEN {
            return Err(FramingError::InvalidLengthEncoding.into());
        }
        let minimal = if width == 2 { 126 } else { 0x1_0000 };
        if len < minimal {
            return Err(FramingError::NonMinimalLength { len, width }.into());
        }
        self.check_ceiling(len)
    }

    fn check_ceiling(&self, len: u64) -> Result<u64, CodecError> {
        if len > self.max_payload_len {
            return Err(FramingError::OversizedPayload {
                len,
                max: self.max_payload_len,
            }
            .into());
        }
        Ok(len)
    }

    fn stream_payload<S: FrameSink>(
        &mut self,
        src: &mut BytesMut,
        sink: &mut S,
        header: FrameHeader,
        mut offset: u64,
    ) -> Result<DecodeStatus, S::Error> {
        while offset < header.payload_len {
            let n = available(src, header.payload_len - offset);
            if n == 0 {
                self.stage = Stage::Payload {
                    header,
                    offset,
                    begun: true,
                };
                return Ok(DecodeStatus::NeedMore);
            }
            let mut chunk = src.split_to(n);
            if let Some(key) = header.mask {
                apply_mask(&mut chunk, key, offset);
            }
            offset += n as u64;
            if sink.frame_data(&header, chunk.freeze())? == Flow::Abort {
                return Ok(self.abort(header.payload_len - offset));
            }
        }
        self.stage = Stage::Header;
        if sink.frame_end(&header)? == Flow::Abort {
            return Ok(DecodeStatus::UserAbort);
        }
        Ok(DecodeStatus::Complete(header))
    }

    fn abort(&mut self, remaining: u64) -> DecodeStatus {
        self.stage = if remaining == 0 {
            Stage::Header
        } else {
            Stage::Skip { remaining }
        };
        DecodeStatus::UserAbort
    }
}

fn validate_base(header: &FrameHeader, len7: u8) -> Result<(), FramingError> {
    if header.has_rsv_bits() {
        let rsv = (u8::from(header.rsv1) << 2) | (u8::from(header.rsv2) << 1) | u8::from(header.rsv3);
        return Err(FramingError::ReservedBits { rsv });
    }
    let opcode = header.opcode;
    if opcode.is_reserved() {
        return Err(FramingError::ReservedOpcode { opcode });
    }
    if opcode.is_control() {
        if usize::from(len7) > CONTROL_MAX_PAYLOAD_LEN {
            return Err(FramingError::ControlFrameTooLarge {
                opcode,
                len: u64::from(len7),
            });
        }
        if !header.fin {
            return Err(FramingError::FragmentedControlFrame { opcode });
        }
    }
    Ok(())
}

/// Bytes of `src` usable toward `wanted`, saturating at the buffer length.
fn available(src: &BytesMut, wanted: u64) -> usize {
    usize::try_from(wanted).map_or(src.len(), |wanted| wanted.min(src.len()))
}
