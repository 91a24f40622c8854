//! Unit tests for message reassembly.

use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use bytes::{Bytes, BytesMut};
use rstest::{fixture, rstest};

use super::*;
use crate::{
    frame::{FrameHeader, OpCode},
    hooks::BufferAllocator,
};

fn header(opcode: OpCode, fin: bool, payload: &[u8]) -> FrameHeader {
    FrameHeader::new(opcode, fin, payload.len() as u64)
}

/// Run one whole frame through the reassembler, collecting streamed chunks.
fn feed(
    reassembler: &mut MessageReassembler,
    opcode: OpCode,
    fin: bool,
    payload: &'static [u8],
) -> Result<(FrameRole, Vec<Bytes>, Option<Assembled>), MessageAssemblyError> {
    let header = header(opcode, fin, payload);
    let role = reassembler.begin_frame(&header)?;
    let mut streamed = Vec::new();
    if !payload.is_empty() {
        if let Some(chunk) = reassembler.push(&header, Bytes::from_static(payload))? {
            streamed.push(chunk);
        }
    }
    let done = reassembler.end_frame(&header)?;
    Ok((role, streamed, done))
}

#[fixture]
fn buffered() -> MessageReassembler { MessageReassembler::new(DispatchMode::Buffered, 1024) }

#[rstest]
fn two_fragments_concatenate(mut buffered: MessageReassembler) {
    let (role, _, done) = feed(&mut buffered, OpCode::Text, false, b"Hel").expect("first");
    assert_eq!(role, FrameRole::Start(MessageKind::Text));
    assert!(done.is_none());
    assert_eq!(buffered.in_progress(), Some(MessageKind::Text));

    let (role, _, done) = feed(&mut buffered, OpCode::Continuation, true, b"lo").expect("last");
    assert_eq!(role, FrameRole::Continuation);
    assert_eq!(
        done,
        Some(Assembled::Message(Message::new(MessageKind::Text, "Hello")))
    );
    assert_eq!(buffered.in_progress(), None);
}

#[rstest]
fn ping_between_fragments_leaves_message_intact(mut buffered: MessageReassembler) {
    feed(&mut buffered, OpCode::Binary, false, b"ab").expect("first");

    let (role, _, done) = feed(&mut buffered, OpCode::Ping, true, b"p").expect("ping");
    assert_eq!(role, FrameRole::Control);
    let Some(Assembled::Control(frame)) = done else {
        panic!("ping should complete on its own");
    };
    assert_eq!(frame.opcode(), OpCode::Ping);
    assert_eq!(frame.payload().as_ref(), b"p");

    let (_, _, done) = feed(&mut buffered, OpCode::Continuation, true, b"cd").expect("last");
    assert_eq!(
        done,
        Some(Assembled::Message(Message::new(MessageKind::Binary, "abcd")))
    );
}

#[rstest]
fn continuation_without_start_is_rejected(mut buffered: MessageReassembler) {
    let err = feed(&mut buffered, OpCode::Continuation, true, b"x").expect_err("no message");
    assert_eq!(err, MessageAssemblyError::UnexpectedContinuation);
    assert_eq!(err.close_status().code(), 1002);
}

#[rstest]
fn new_start_while_active_is_rejected(mut buffered: MessageReassembler) {
    feed(&mut buffered, OpCode::Text, false, b"a").expect("first");
    let err = feed(&mut buffered, OpCode::Binary, true, b"b").expect_err("interleaved");
    assert_eq!(
        err,
        MessageAssemblyError::InterleavedStart {
            active: MessageKind::Text,
            opcode: OpCode::Binary,
        }
    );
}

#[rstest]
#[case::continuation(8)]
#[case::first_frame(4)]
fn ceiling_applies_to_whole_message(#[case] limit: u64) {
    let mut reassembler = MessageReassembler::new(DispatchMode::Buffered, limit);
    let mut result = feed(&mut reassembler, OpCode::Binary, false, b"12345").map(|_| ());
    if result.is_ok() {
        result = feed(&mut reassembler, OpCode::Continuation, true, b"6789").map(|_| ());
    }
    let err = result.expect_err("over the ceiling");
    assert!(matches!(err, MessageAssemblyError::MessageTooLarge { limit: l, .. } if l == limit));
    assert_eq!(err.close_status().code(), 1009);
}

#[rstest]
fn invalid_text_is_rejected(mut buffered: MessageReassembler) {
    let err = feed(&mut buffered, OpCode::Text, true, &[0xC3, 0x28]).expect_err("bad utf-8");
    assert_eq!(err, MessageAssemblyError::InvalidUtf8);
    assert_eq!(err.close_status().code(), 1007);
}

#[test]
fn utf8_validation_can_be_disabled() {
    let mut reassembler =
        MessageReassembler::new(DispatchMode::Buffered, 16).validate_utf8(false);
    let (_, _, done) = feed(&mut reassembler, OpCode::Text, true, &[0xFF]).expect("accepted");
    let Some(Assembled::Message(message)) = done else {
        panic!("message expected");
    };
    assert_eq!(message.as_text(), None);
}

#[test]
fn text_split_inside_code_point_is_accepted() {
    let mut reassembler = MessageReassembler::new(DispatchMode::Buffered, 16);
    feed(&mut reassembler, OpCode::Text, false, &[0xC3]).expect("first half");
    let (_, _, done) =
        feed(&mut reassembler, OpCode::Continuation, true, &[0xA9]).expect("second half");
    let Some(Assembled::Message(message)) = done else {
        panic!("message expected");
    };
    assert_eq!(message.as_text(), Some("é"));
}

#[test]
fn streaming_mode_hands_back_every_chunk() {
    let mut reassembler = MessageReassembler::new(DispatchMode::Streaming, 1024);
    let (role, chunks, done) = feed(&mut reassembler, OpCode::Binary, false, b"one").expect("one");
    assert_eq!(role, FrameRole::Start(MessageKind::Binary));
    assert_eq!(chunks, [Bytes::from_static(b"one")]);
    assert!(done.is_none());

    let (_, chunks, done) =
        feed(&mut reassembler, OpCode::Continuation, true, b"two").expect("two");
    assert_eq!(chunks, [Bytes::from_static(b"two")]);
    assert_eq!(done, Some(Assembled::End));
}

#[derive(Clone, Default)]
struct CountingAllocator {
    allocated: Arc<AtomicUsize>,
    freed: Arc<AtomicUsize>,
}

impl BufferAllocator for CountingAllocator {
    fn allocate(&self, capacity: usize) -> BytesMut {
        self.allocated.fetch_add(1, Ordering::SeqCst);
        BytesMut::with_capacity(capacity)
    }

    fn free(&self, buf: BytesMut) {
        self.freed.fetch_add(1, Ordering::SeqCst);
        drop(buf);
    }
}

#[test]
fn abandoned_buffers_return_to_allocator() {
    let allocator = CountingAllocator::default();
    let mut reassembler =
        MessageReassembler::with_allocator(DispatchMode::Buffered, 64, Box::new(allocator.clone()));
    feed(&mut reassembler, OpCode::Binary, false, b"partial").expect("first");
    reassembler.abandon();

    assert_eq!(allocator.allocated.load(Ordering::SeqCst), 1);
    assert_eq!(allocator.freed.load(Ordering::SeqCst), 1);
    assert_eq!(reassembler.in_progress(), None);
}
