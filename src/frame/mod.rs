//! Logical WebSocket frames and their header layout.
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-------+-+-------------+-------------------------------+
//! |F|R|R|R| opcode|M| Payload len |    Extended payload length    |
//! |I|S|S|S|  (4)  |A|     (7)     |             (16/64)           |
//! |N|V|V|V|       |S|             |   (if payload len==126/127)   |
//! | |1|2|3|       |K|             |                               |
//! +-+-+-+-+-------+-+-------------+ - - - - - - - - - - - - - - - +
//! |     Extended payload length continued, if payload len == 127  |
//! + - - - - - - - - - - - - - - - +-------------------------------+
//! |                               |Masking-key, if MASK set to 1  |
//! +-------------------------------+-------------------------------+
//! | Masking-key (continued)       |          Payload Data         |
//! +-------------------------------- - - - - - - - - - - - - - - - +
//! ```

mod opcode;

use bytes::{BufMut, Bytes, BytesMut};
pub use opcode::OpCode;

/// Largest payload length representable on the wire (top bit of the 64-bit
/// length field must be clear).
pub const MAX_PAYLOAD_LEN: u64 = 0x7FFF_FFFF_FFFF_FFFF;

/// Control frames carry at most this many payload bytes.
pub const CONTROL_MAX_PAYLOAD_LEN: usize = 125;

/// Size of the fixed base header.
pub const HEADER_BASE_SIZE: usize = 2;

/// Size of the widest extended length field.
pub const HEADER_PAYLOAD_LEN_SIZE: usize = 8;

/// Size of the masking key.
pub const HEADER_MASK_SIZE: usize = 4;

/// Upper bound on an encoded header.
pub const HEADER_MAX_SIZE: usize = HEADER_BASE_SIZE + HEADER_PAYLOAD_LEN_SIZE + HEADER_MASK_SIZE;

const FIN_BIT: u8 = 0x80;
const RSV1_BIT: u8 = 0x40;
const RSV2_BIT: u8 = 0x20;
const RSV3_BIT: u8 = 0x10;
const MASK_BIT: u8 = 0x80;
const LEN7_U16: u8 = 126;
const LEN7_U64: u8 = 127;

/// Decoded or to-be-encoded frame header.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameHeader {
    /// Final fragment of a message.
    pub fin: bool,
    /// Extension bit 1.
    pub rsv1: bool,
    /// Extension bit 2.
    pub rsv2: bool,
    /// Extension bit 3.
    pub rsv3: bool,
    /// Frame opcode.
    pub opcode: OpCode,
    /// Masking key, present iff the MASK bit is set.
    pub mask: Option<[u8; 4]>,
    /// Declared payload length.
    pub payload_len: u64,
}

impl FrameHeader {
    /// Header for an unfragmented, unmasked frame.
    #[must_use]
    pub const fn new(opcode: OpCode, fin: bool, payload_len: u64) -> Self {
        Self {
            fin,
            rsv1: false,
            rsv2: false,
            rsv3: false,
            opcode,
            mask: None,
            payload_len,
        }
    }

    /// Whether any extension bit is set.
    #[must_use]
    pub const fn has_rsv_bits(&self) -> bool { self.rsv1 || self.rsv2 || self.rsv3 }

    /// First header byte: `FIN RSV1 RSV2 RSV3 OPCODE`.
    #[must_use]
    pub const fn first_byte(&self) -> u8 {
        let mut byte = self.opcode.as_nibble();
        if self.fin {
            byte |= FIN_BIT;
        }
        if self.rsv1 {
            byte |= RSV1_BIT;
        }
        if self.rsv2 {
            byte |= RSV2_BIT;
        }
        if self.rsv3 {
            byte |= RSV3_BIT;
        }
        byte
    }

    /// Populate `fin`, the RSV bits and the opcode from the first header byte.
    #[must_use]
    pub const fn from_first_byte(byte: u8) -> Self {
        Self {
            fin: byte & FIN_BIT != 0,
            rsv1: byte & RSV1_BIT != 0,
            rsv2: byte & RSV2_BIT != 0,
            rsv3: byte & RSV3_BIT != 0,
            opcode: OpCode::from_nibble(byte),
            mask: None,
            payload_len: 0,
        }
    }

    /// Number of bytes this header occupies once encoded.
    #[must_use]
    pub const fn encoded_len(&self) -> usize {
        let ext = match self.payload_len {
            0..=125 => 0,
            126..=0xFFFF => 2,
            _ => HEADER_PAYLOAD_LEN_SIZE,
        };
        let mask = if self.mask.is_some() {
            HEADER_MASK_SIZE
        } else {
            0
        };
        HEADER_BASE_SIZE + ext + mask
    }

    /// Append the encoded header to `dst`, using the shortest length form.
    ///
    /// `payload_len` must not exceed [`MAX_PAYLOAD_LEN`]; the encoder checks
    /// this before calling.
    pub fn write_to(&self, dst: &mut BytesMut) {
        dst.reserve(self.encoded_len());
        dst.put_u8(self.first_byte());
        let mask_bit = if self.mask.is_some() { MASK_BIT } else { 0 };
        match self.payload_len {
            #[expect(
                clippy::cast_possible_truncation,
                reason = "range pattern bounds the value to 125"
            )]
            len @ 0..=125 => dst.put_u8(mask_bit | len as u8),
            #[expect(
                clippy::cast_possible_truncation,
                reason = "range pattern bounds the value to u16::MAX"
            )]
            len @ 126..=0xFFFF => {
                dst.put_u8(mask_bit | LEN7_U16);
                dst.put_u16(len as u16);
            }
            len => {
                dst.put_u8(mask_bit | LEN7_U64);
                dst.put_u64(len);
            }
        }
        if let Some(key) = self.mask {
            dst.put_slice(&key);
        }
    }
}

/// A complete frame with its (unmasked) payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    header: FrameHeader,
    payload: Bytes,
}

impl Frame {
    /// Construct a frame. The header's length is taken from `payload`.
    #[must_use]
    pub fn new(opcode: OpCode, fin: bool, payload: impl Into<Bytes>) -> Self {
        let payload = payload.into();
        Self {
            header: FrameHeader::new(opcode, fin, payload.len() as u64),
            payload,
        }
    }

    /// Construct from a decoded header and its reassembled payload.
    #[must_use]
    pub fn from_parts(header: FrameHeader, payload: Bytes) -> Self { Self { header, payload } }

    /// Final text frame.
    #[must_use]
    pub fn text(payload: impl Into<Bytes>) -> Self { Self::new(OpCode::Text, true, payload) }

    /// Final binary frame.
    #[must_use]
    pub fn binary(payload: impl Into<Bytes>) -> Self { Self::new(OpCode::Binary, true, payload) }

    /// Ping frame.
    #[must_use]
    pub fn ping(payload: impl Into<Bytes>) -> Self { Self::new(OpCode::Ping, true, payload) }

    /// Pong frame.
    #[must_use]
    pub fn pong(payload: impl Into<Bytes>) -> Self { Self::new(OpCode::Pong, true, payload) }

    /// Borrow the header.
    #[must_use]
    pub const fn header(&self) -> &FrameHeader { &self.header }

    /// Mutable access to the header, e.g. to set RSV bits for a negotiated
    /// extension.
    pub fn header_mut(&mut self) -> &mut FrameHeader { &mut self.header }

    /// Frame opcode.
    #[must_use]
    pub const fn opcode(&self) -> OpCode { self.header.opcode }

    /// Final-fragment flag.
    #[must_use]
    pub const fn is_fin(&self) -> bool { self.header.fin }

    /// Borrow the payload.
    #[must_use]
    pub fn payload(&self) -> &Bytes { &self.payload }

    /// Consume the frame, returning its payload.
    #[must_use]
    pub fn into_payload(self) -> Bytes { self.payload }
}
