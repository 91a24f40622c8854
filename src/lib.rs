#![doc(html_root_url = "https://docs.rs/wsframe/latest")]
//! Public API for the `wsframe` library.
//!
//! This crate provides a sans-I/O client-side WebSocket engine (RFC 6455):
//! a resumable frame codec, message reassembly, the connection lifecycle and
//! close handshake, and a callback dispatcher. The caller owns the transport
//! and timers; the engine turns bytes in into callbacks and queued bytes out.

pub mod close;
pub mod codec;
pub mod config;
pub mod connection;
pub mod error;
pub mod frame;
pub mod hooks;
pub mod mask;
pub mod message_assembler;
pub mod metrics;

pub use close::{CloseStatus, CloseStatusClass};
pub use codec::{CodecError, DecodeStatus, FrameDecoder, FrameSink, WebSocketCodec, encode_frame};
pub use config::{RandomSource, WebSocketConfig};
pub use connection::{Connection, ConnectionState};
pub use error::{Error, Result};
pub use frame::{Frame, FrameHeader, OpCode};
pub use hooks::{BufferAllocator, Callbacks, ConnectOutcome, Flow, Handler};
pub use message_assembler::{DispatchMode, Message, MessageKind};
pub use metrics::{CLOSES_TOTAL, Direction, ERRORS_TOTAL, FRAMES_PROCESSED};
