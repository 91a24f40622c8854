//! Message reassembly above the frame codec.
//!
//! RFC 6455 lets a data message span several frames: a text or binary frame
//! with FIN clear opens the message and continuation frames extend it until
//! one arrives with FIN set. Control frames may appear between those
//! fragments and are delivered on their own.
//!
//! [`MessageReassembler`] keeps at most one message open. It either buffers
//! the whole message ([`DispatchMode::Buffered`]) or hands each payload chunk
//! straight back for delivery ([`DispatchMode::Streaming`]).

pub mod error;
mod message;
mod reassembler;
mod utf8;

pub use error::MessageAssemblyError;
pub use message::{DispatchMode, Message, MessageKind};
pub use reassembler::{Assembled, FrameRole, MessageReassembler};

#[cfg(test)]
mod tests;
