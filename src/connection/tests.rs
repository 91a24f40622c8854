//! Unit tests for the lifecycle table and connection engine.

use std::time::Duration;

use bytes::{BufMut, Bytes, BytesMut};
use rstest::{fixture, rstest};
use tracing_test::traced_test;

use super::*;
use crate::{
    close::{CloseError, CloseStatus},
    codec::encode_frame,
    error::Error,
    frame::{Frame, FrameHeader, OpCode},
    hooks::Handler,
    mask::FixedMaskSource,
    message_assembler::{DispatchMode, Message, MessageKind},
};

use ConnectionState as S;
use LifecycleEvent as E;

#[rstest]
#[case(S::Resolving, E::Resolved, Some(S::Connecting))]
#[case(S::Resolving, E::ResolveFailed, Some(S::ClosedUncleanly))]
#[case(S::Connecting, E::Connected, Some(S::Connected))]
#[case(S::Connecting, E::ConnectFailed, Some(S::ClosedUncleanly))]
#[case(S::Connected, E::CloseStarted, Some(S::Closing))]
#[case(S::Connected, E::TransportLost, Some(S::ClosedUncleanly))]
#[case(S::Closing, E::CloseCompleted, Some(S::ClosedCleanly))]
#[case(S::Closing, E::CloseAbandoned, Some(S::ClosingUnclean))]
#[case(S::ClosingUnclean, E::TransportLost, Some(S::ClosedUncleanly))]
#[case(S::Resolving, E::Connected, None)]
#[case(S::Connected, E::Resolved, None)]
#[case(S::Closing, E::TransportLost, None)]
#[case(S::ClosedCleanly, E::CloseStarted, None)]
#[case(S::ClosedUncleanly, E::Connected, None)]
fn transition_table(
    #[case] from: ConnectionState,
    #[case] event: LifecycleEvent,
    #[case] to: Option<ConnectionState>,
) {
    assert_eq!(StateMachine::next(from, event), to);
}

#[test]
fn illegal_transition_leaves_state_unchanged() {
    let mut machine = StateMachine::new();
    let err = machine
        .apply(E::CloseStarted)
        .expect_err("closing is not reachable from resolving");
    assert_eq!(
        err,
        StateError::IllegalTransition {
            from: S::Resolving,
            event: E::CloseStarted,
        }
    );
    assert_eq!(machine.state(), S::Resolving);
}

#[derive(Debug, PartialEq, Eq)]
enum Event {
    Message(MessageKind, Bytes),
    Begin(MessageKind),
    Chunk(Bytes),
    End,
    Error(u16),
    Close(u16, String),
    Connect(ConnectOutcome),
    Timeout(Duration),
}

#[derive(Default)]
struct Recorder {
    events: Vec<Event>,
    frame_data: Vec<Bytes>,
    abort_on_chunk: bool,
    abort_on_close_frame: bool,
}

impl Handler for Recorder {
    fn on_message(&mut self, message: &Message) -> Flow {
        self.events
            .push(Event::Message(message.kind(), message.payload().clone()));
        Flow::Continue
    }

    fn on_message_begin(&mut self, kind: MessageKind) -> Flow {
        self.events.push(Event::Begin(kind));
        Flow::Continue
    }

    fn on_message_frame(&mut self, payload: &Bytes) -> Flow {
        self.events.push(Event::Chunk(payload.clone()));
        if self.abort_on_chunk {
            Flow::Abort
        } else {
            Flow::Continue
        }
    }

    fn on_message_end(&mut self) -> Flow {
        self.events.push(Event::End);
        Flow::Continue
    }

    fn on_frame_begin(&mut self, header: &FrameHeader) -> Flow {
        if self.abort_on_close_frame && header.opcode == OpCode::Close {
            Flow::Abort
        } else {
            Flow::Continue
        }
    }

    fn on_frame_data(&mut self, payload: &Bytes) -> Flow {
        self.frame_data.push(payload.clone());
        Flow::Continue
    }

    fn on_error(&mut self, code: u16, _text: &str) { self.events.push(Event::Error(code)); }

    fn on_close(&mut self, status: CloseStatus, reason: &str) {
        self.events.push(Event::Close(status.code(), reason.to_owned()));
    }

    fn on_connect(&mut self, outcome: ConnectOutcome) { self.events.push(Event::Connect(outcome)); }

    fn on_timeout(&mut self, timeout: Duration) { self.events.push(Event::Timeout(timeout)); }
}

fn server_frame(opcode: OpCode, fin: bool, payload: &[u8]) -> BytesMut {
    let mut buf = BytesMut::new();
    encode_frame(
        &Frame::new(opcode, fin, Bytes::copy_from_slice(payload)),
        None,
        &mut buf,
    )
    .expect("encodable frame");
    buf
}

fn connection_with(config: WebSocketConfig) -> Connection<Recorder> {
    let mut conn = Connection::new(Recorder::default(), config)
        .expect("os mask source")
        .with_mask_source(Box::new(FixedMaskSource([0; 4])));
    conn.resolved().expect("resolved");
    conn.connected().expect("connected");
    conn.handler_mut().events.clear();
    conn
}

#[fixture]
fn conn() -> Connection<Recorder> { connection_with(WebSocketConfig::default()) }

/// Decode everything the connection queued, unmasking with the zero key.
fn sent_frames(conn: &mut Connection<Recorder>) -> Vec<Frame> {
    let mut codec = crate::codec::WebSocketCodec::unmasked(u64::MAX);
    let mut buf = BytesMut::from(&conn.poll_outbound().unwrap_or_default()[..]);
    let mut frames = Vec::new();
    while let Some(frame) =
        tokio_util::codec::Decoder::decode(&mut codec, &mut buf).expect("valid outbound frame")
    {
        frames.push(frame);
    }
    frames
}

#[rstest]
fn fragmented_message_with_interleaved_ping(mut conn: Connection<Recorder>) {
    let mut wire = server_frame(OpCode::Text, false, b"Hel");
    wire.unsplit(server_frame(OpCode::Ping, true, b"?"));
    wire.unsplit(server_frame(OpCode::Continuation, true, b"lo"));
    conn.feed(&wire).expect("valid stream");

    assert_eq!(
        conn.handler().events,
        [
            Event::Message(MessageKind::Ping, Bytes::from_static(b"?")),
            Event::Message(MessageKind::Text, Bytes::from_static(b"Hello")),
        ]
    );
    let pong = sent_frames(&mut conn);
    assert_eq!(pong.len(), 1);
    assert_eq!(pong[0].opcode(), OpCode::Pong);
    assert_eq!(pong[0].payload().as_ref(), b"?");
}

#[test]
fn auto_pong_can_be_disabled() {
    let mut conn = connection_with(WebSocketConfig::default().auto_pong(false));
    conn.feed(&server_frame(OpCode::Ping, true, b"")).expect("ping");
    assert!(!conn.has_outbound());
}

#[test]
fn streaming_mode_orders_begin_chunks_end() {
    let mut conn =
        connection_with(WebSocketConfig::default().dispatch_mode(DispatchMode::Streaming));
    let mut wire = server_frame(OpCode::Binary, false, b"ab");
    wire.unsplit(server_frame(OpCode::Continuation, true, b"cd"));
    for byte in wire.iter() {
        conn.feed(&[*byte]).expect("byte at a time");
    }
    assert_eq!(
        conn.handler().events,
        [
            Event::Begin(MessageKind::Binary),
            Event::Chunk(Bytes::from_static(b"a")),
            Event::Chunk(Bytes::from_static(b"b")),
            Event::Chunk(Bytes::from_static(b"c")),
            Event::Chunk(Bytes::from_static(b"d")),
            Event::End,
        ]
    );
}

#[test]
fn abort_suppresses_rest_of_message_and_closes_normally() {
    let mut conn =
        connection_with(WebSocketConfig::default().dispatch_mode(DispatchMode::Streaming));
    conn.handler_mut().abort_on_chunk = true;
    let mut wire = server_frame(OpCode::Binary, false, b"ab");
    wire.unsplit(server_frame(OpCode::Continuation, true, b"cd"));
    conn.feed(&wire).expect("abort is not an error");

    assert_eq!(
        conn.handler().events,
        [
            Event::Begin(MessageKind::Binary),
            Event::Chunk(Bytes::from_static(b"ab")),
        ]
    );
    assert_eq!(conn.state(), S::Closing);
    let sent = sent_frames(&mut conn);
    assert_eq!(sent[0].opcode(), OpCode::Close);
    assert_eq!(sent[0].payload().as_ref(), &[0x03, 0xE8]);

    conn.feed(&server_frame(OpCode::Close, true, &[0x03, 0xE8]))
        .expect("echo");
    assert_eq!(conn.state(), S::ClosedCleanly);
}

#[rstest]
#[traced_test]
fn peer_close_is_echoed_and_closes_cleanly(mut conn: Connection<Recorder>) {
    conn.feed(&server_frame(OpCode::Close, true, &[0x03, 0xE9, b'b', b'y', b'e']))
        .expect("close");

    assert_eq!(conn.state(), S::ClosedCleanly);
    assert_eq!(conn.handler().events, [Event::Close(1001, "bye".into())]);
    let echo = sent_frames(&mut conn);
    assert_eq!(echo[0].payload().as_ref(), &[0x03, 0xE9, b'b', b'y', b'e']);
    assert!(logs_contain("peer initiated close"));
    assert!(logs_contain("connection state changed"));
}

#[rstest]
fn local_close_completes_on_echo(mut conn: Connection<Recorder>) {
    conn.close(CloseStatus::NORMAL, "done").expect("close");
    assert_eq!(conn.state(), S::Closing);
    assert!(matches!(
        conn.close(CloseStatus::NORMAL, ""),
        Err(Error::Close(CloseError::AlreadySent))
    ));
    assert!(matches!(
        conn.send_text("late"),
        Err(Error::State(StateError::NotOpen { state: S::Closing }))
    ));

    // Data arriving before the echo is dropped.
    conn.feed(&server_frame(OpCode::Text, true, b"ignored"))
        .expect("discarded");
    conn.feed(&server_frame(OpCode::Close, true, &[0x03, 0xE8]))
        .expect("echo");
    assert_eq!(conn.state(), S::ClosedCleanly);
    assert_eq!(conn.handler().events, [Event::Close(1000, String::new())]);
}

#[rstest]
fn peer_no_status_code_forces_protocol_error(mut conn: Connection<Recorder>) {
    let err = conn
        .feed(&server_frame(OpCode::Close, true, &[0x03, 0xED]))
        .expect_err("1005 may not be sent");
    assert_eq!(err.code(), 1002);
    assert_eq!(conn.state(), S::ClosedUncleanly);

    let events = &conn.handler().events;
    assert_eq!(events[0], Event::Error(1002));
    assert!(matches!(events[1], Event::Close(1002, _)));
    assert_eq!(events.len(), 2);

    let sent = sent_frames(&mut conn);
    assert_eq!(sent[0].opcode(), OpCode::Close);
    assert_eq!(&sent[0].payload()[..2], &[0x03, 0xEA]);
}

#[rstest]
#[case::reserved_opcode(&[0x83, 0x00], 1002)]
#[case::rsv_bits(&[0xC1, 0x00], 1002)]
#[case::long_ping(&[0x89, 0x7E, 0x00, 0x7E], 1002)]
#[case::continuation_first(&[0x80, 0x00], 1002)]
#[case::bad_utf8(&[0x81, 0x01, 0xFF], 1007)]
fn protocol_violations_fail_uncleanly(
    mut conn: Connection<Recorder>,
    #[case] wire: &[u8],
    #[case] code: u16,
) {
    let err = conn.feed(wire).expect_err("violation");
    assert_eq!(err.code(), code);
    assert_eq!(conn.state(), S::ClosedUncleanly);
    assert_eq!(conn.handler().events[0], Event::Error(code));
    // Nothing fires once the connection is closed.
    conn.feed(&server_frame(OpCode::Text, true, b"late")).expect("ignored");
    assert_eq!(conn.handler().events.len(), 2);
}

#[test]
fn oversized_message_fails_with_1009() {
    let mut conn = connection_with(WebSocketConfig::default().max_payload_len(4));
    let err = conn
        .feed(&server_frame(OpCode::Binary, true, b"12345"))
        .expect_err("too big");
    assert_eq!(err.code(), 1009);
    assert!(matches!(conn.handler().events[1], Event::Close(1009, _)));
}

#[test]
fn connect_timeout_fails_and_blocks_later_success() {
    let timeout = Duration::from_millis(0);
    let mut conn = Connection::new(
        Recorder::default(),
        WebSocketConfig::default().connect_timeout(timeout),
    )
    .expect("connection");
    conn.resolved().expect("resolved");
    conn.connect_timed_out().expect("timeout while connecting");
    assert_eq!(conn.state(), S::ClosedUncleanly);

    assert!(conn.connected().is_err());
    assert_eq!(conn.state(), S::ClosedUncleanly);
    assert_eq!(
        conn.handler().events,
        [
            Event::Timeout(timeout),
            Event::Connect(ConnectOutcome::Failed),
            Event::Close(1006, "connect timed out".into()),
        ]
    );
}

#[test]
fn rejected_upgrade_header_aborts_connect() {
    let mut conn = Connection::new(
        crate::hooks::Callbacks::default().on_upgrade_header(|name, _| {
            if name == "Sec-WebSocket-Protocol" {
                Flow::Abort
            } else {
                Flow::Continue
            }
        }),
        WebSocketConfig::default(),
    )
    .expect("connection");
    conn.resolved().expect("resolved");
    assert_eq!(
        conn.upgrade_header("Upgrade", "websocket").expect("connecting"),
        Flow::Continue
    );
    assert_eq!(
        conn.upgrade_header("Sec-WebSocket-Protocol", "chat")
            .expect("connecting"),
        Flow::Abort
    );
    assert_eq!(conn.state(), S::ClosedUncleanly);
}

#[rstest]
fn transport_drop_while_closing_is_unclean(mut conn: Connection<Recorder>) {
    conn.close(CloseStatus::GOING_AWAY, "").expect("close");
    conn.transport_closed().expect("drop");
    assert_eq!(conn.state(), S::ClosedUncleanly);
    assert_eq!(
        conn.handler().events,
        [Event::Close(
            1006,
            "transport error: connection closed without close frame".into()
        )]
    );
}

#[rstest]
fn close_timeout_reports_timeout_then_close(mut conn: Connection<Recorder>) {
    conn.close(CloseStatus::NORMAL, "").expect("close");
    conn.close_timed_out().expect("closing");
    assert_eq!(conn.state(), S::ClosedUncleanly);
    assert_eq!(
        conn.handler().events,
        [
            Event::Timeout(Duration::from_secs(60)),
            Event::Close(1006, "close handshake timed out".into()),
        ]
    );
}

#[rstest]
fn transport_error_while_connected_reports_error_then_close(mut conn: Connection<Recorder>) {
    let error = std::io::Error::from(std::io::ErrorKind::ConnectionReset);
    conn.transport_error(error).expect("connected");
    let events = &conn.handler().events;
    assert_eq!(events[0], Event::Error(1006));
    assert!(matches!(events[1], Event::Close(1006, _)));
}

#[rstest]
fn fragmented_send_uses_continuation_frames(mut conn: Connection<Recorder>) {
    conn.begin_message(MessageKind::Text).expect("begin");
    assert!(matches!(
        conn.send_binary(Bytes::from_static(b"x")),
        Err(Error::State(StateError::MessageInProgress { kind: MessageKind::Text }))
    ));
    conn.send_fragment("Hel").expect("first");
    conn.send_ping(Bytes::new()).expect("ping between fragments");
    conn.end_message("lo").expect("last");
    assert!(matches!(
        conn.send_fragment("x"),
        Err(Error::State(StateError::NoMessageInProgress))
    ));

    let frames = sent_frames(&mut conn);
    let shape: Vec<_> = frames.iter().map(|f| (f.opcode(), f.is_fin())).collect();
    assert_eq!(
        shape,
        [
            (OpCode::Text, false),
            (OpCode::Ping, true),
            (OpCode::Continuation, true),
        ]
    );
}

#[rstest]
fn outbound_frames_are_masked(conn: Connection<Recorder>) {
    let mut conn = conn.with_mask_source(Box::new(FixedMaskSource([1, 2, 3, 4])));
    conn.send_binary(Bytes::from_static(&[0, 0, 0, 0])).expect("send");
    let wire = conn.poll_outbound().expect("queued");
    assert_eq!(wire.as_ref(), &[0x82, 0x84, 1, 2, 3, 4, 1, 2, 3, 4]);
    assert!(conn.poll_outbound().is_none());
}

#[test]
fn feeding_before_connect_is_rejected() {
    let mut conn = Connection::new(Recorder::default(), WebSocketConfig::default())
        .expect("connection");
    let mut wire = BytesMut::new();
    wire.put_u8(0x81);
    assert!(matches!(
        conn.feed(&wire),
        Err(Error::State(StateError::NotOpen { state: S::Resolving }))
    ));
}

#[test]
fn cleanup_hook_runs_after_each_streamed_chunk() {
    let released = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
    let sink = std::sync::Arc::clone(&released);
    let mut conn =
        connection_with(WebSocketConfig::default().dispatch_mode(DispatchMode::Streaming))
            .with_no_copy_cleanup(Box::new(move |buf: &Bytes| {
                sink.lock().expect("lock").push(buf.clone());
            }));
    let mut wire = server_frame(OpCode::Binary, false, b"ab");
    wire.unsplit(server_frame(OpCode::Continuation, true, b"cd"));
    conn.feed(&wire).expect("valid stream");

    let released = released.lock().expect("lock");
    assert_eq!(
        *released,
        [Bytes::from_static(b"ab"), Bytes::from_static(b"cd")]
    );
    assert_eq!(conn.handler().events.last(), Some(&Event::End));
}

#[test]
fn resolve_failure_reports_error_before_close() {
    let mut conn = Connection::new(Recorder::default(), WebSocketConfig::default())
        .expect("connection");
    conn.resolve_failed().expect("resolving");
    assert_eq!(conn.state(), S::ClosedUncleanly);
    assert_eq!(
        conn.handler().events,
        [
            Event::Connect(ConnectOutcome::Failed),
            Event::Error(1006),
            Event::Close(1006, "transport error: name resolution failed".into()),
        ]
    );
}

#[test]
fn connect_failure_reports_error_before_close() {
    let mut conn = Connection::new(Recorder::default(), WebSocketConfig::default())
        .expect("connection");
    conn.resolved().expect("resolved");
    conn.connect_failed().expect("connecting");
    assert_eq!(conn.state(), S::ClosedUncleanly);
    assert_eq!(
        conn.handler().events,
        [
            Event::Connect(ConnectOutcome::Failed),
            Event::Error(1006),
            Event::Close(1006, "transport error: connect failed".into()),
        ]
    );
    assert!(conn.connect_failed().is_err());
}

#[test]
fn transport_drop_while_connecting_reports_error() {
    let mut conn = Connection::new(Recorder::default(), WebSocketConfig::default())
        .expect("connection");
    conn.resolved().expect("resolved");
    conn.transport_closed().expect("connecting");
    let events = &conn.handler().events;
    assert_eq!(events[0], Event::Connect(ConnectOutcome::Failed));
    assert_eq!(events[1], Event::Error(1006));
    assert!(matches!(events[2], Event::Close(1006, _)));
}

#[rstest]
fn aborting_on_peer_close_still_completes_handshake(mut conn: Connection<Recorder>) {
    conn.handler_mut().abort_on_close_frame = true;
    conn.feed(&[0x88, 0x02, 0x03, 0xE8]).expect("close");

    assert_eq!(conn.state(), S::ClosedCleanly);
    assert_eq!(conn.handler().events, [Event::Close(1000, String::new())]);
    let sent = sent_frames(&mut conn);
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].opcode(), OpCode::Close);
    assert_eq!(sent[0].payload().as_ref(), &[0x03, 0xE8]);
}

#[rstest]
#[case::invalid_utf8(WebSocketConfig::default(), server_frame(OpCode::Text, true, &[0xFF, 0xFE]), 1007)]
#[case::over_ceiling(
    WebSocketConfig::default().max_payload_len(4),
    {
        let mut wire = server_frame(OpCode::Binary, false, b"abc");
        wire.unsplit(server_frame(OpCode::Continuation, true, b"de"));
        wire
    },
    1009
)]
fn rejected_payload_never_reaches_frame_data(
    #[case] config: WebSocketConfig,
    #[case] wire: BytesMut,
    #[case] code: u16,
) {
    let mut conn = connection_with(config);
    conn.feed(&wire).expect_err("rejected payload");
    assert_eq!(conn.handler().events[0], Event::Error(code));
    let seen: Vec<&[u8]> = conn.handler().frame_data.iter().map(AsRef::as_ref).collect();
    let accepted: &[&[u8]] = if code == 1009 { &[&b"abc"[..]] } else { &[] };
    assert_eq!(seen, accepted);
}
