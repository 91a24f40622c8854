//! Unit tests for status classification and the close exchange.

use rstest::rstest;

use super::*;
use crate::frame::OpCode;

#[rstest]
#[case(999, CloseStatusClass::NotUsed)]
#[case(1000, CloseStatusClass::ProtocolReserved)]
#[case(1004, CloseStatusClass::LocalOnly)]
#[case(1005, CloseStatusClass::LocalOnly)]
#[case(1006, CloseStatusClass::LocalOnly)]
#[case(1015, CloseStatusClass::LocalOnly)]
#[case(2999, CloseStatusClass::ProtocolReserved)]
#[case(3000, CloseStatusClass::IanaReserved)]
#[case(3999, CloseStatusClass::IanaReserved)]
#[case(4000, CloseStatusClass::PrivateUse)]
#[case(4999, CloseStatusClass::PrivateUse)]
#[case(5000, CloseStatusClass::NotUsed)]
fn status_classes(#[case] code: u16, #[case] class: CloseStatusClass) {
    assert_eq!(CloseStatus::new(code).class(), class);
}

#[rstest]
#[case(1000, true)]
#[case(1003, true)]
#[case(1004, false)]
#[case(1005, false)]
#[case(1006, false)]
#[case(1007, true)]
#[case(1011, true)]
#[case(1012, false)]
#[case(1015, false)]
#[case(2000, false)]
#[case(3500, true)]
#[case(4500, true)]
#[case(0, false)]
#[case(65_535, false)]
fn peer_validity(#[case] code: u16, #[case] valid: bool) {
    assert_eq!(CloseStatus::new(code).is_valid_from_peer(), valid);
}

#[test]
fn status_serialises_as_bare_number() {
    let json = serde_json::to_string(&CloseStatus::GOING_AWAY).expect("serialise");
    assert_eq!(json, "1001");
    let back: CloseStatus = serde_json::from_str("4000").expect("deserialise");
    assert_eq!(back, CloseStatus::new(4000));
}

#[test]
fn close_payload_carries_status_then_reason() {
    let frame = CloseFrame::new(CloseStatus::GOING_AWAY, "bye")
        .expect("valid close")
        .to_frame();
    assert_eq!(frame.opcode(), OpCode::Close);
    assert_eq!(frame.payload().as_ref(), &[0x03, 0xE9, b'b', b'y', b'e']);
}

#[test]
fn reason_is_limited_to_123_bytes() {
    assert!(CloseFrame::new(CloseStatus::NORMAL, "x".repeat(MAX_REASON_LEN)).is_ok());
    let err = CloseFrame::new(CloseStatus::NORMAL, "x".repeat(MAX_REASON_LEN + 1))
        .expect_err("reason too long");
    assert_eq!(err, CloseError::ReasonTooLong { len: 124 });
}

#[rstest]
#[case(CloseStatus::NO_STATUS)]
#[case(CloseStatus::ABNORMAL)]
#[case(CloseStatus::new(999))]
fn local_only_and_unused_statuses_cannot_be_sent(#[case] status: CloseStatus) {
    let err = CloseFrame::new(status, "").expect_err("unsendable");
    assert_eq!(err, CloseError::UnsendableStatus { status });
    assert!(!err.is_peer_violation());
}

#[rstest]
#[case::one_byte(&[0x03], CloseError::MalformedPayload { len: 1 })]
#[case::no_status(&[0x03, 0xED], CloseError::InvalidPeerStatus { status: CloseStatus::NO_STATUS })]
#[case::unused(&[0x00, 0x01], CloseError::InvalidPeerStatus { status: CloseStatus::new(1) })]
#[case::bad_utf8(&[0x03, 0xE8, 0xFF], CloseError::InvalidReasonEncoding)]
fn invalid_peer_payloads(#[case] payload: &[u8], #[case] expected: CloseError) {
    let err = CloseFrame::parse(payload).expect_err("invalid payload");
    assert!(err.is_peer_violation());
    assert_eq!(err, expected);
}

#[test]
fn empty_peer_payload_reports_no_status() {
    let frame = CloseFrame::parse(&[]).expect("empty close is legal");
    assert_eq!(frame.status(), None);
    assert_eq!(frame.reported_status(), CloseStatus::NO_STATUS);
    assert!(frame.to_payload().is_empty());
}

#[test]
fn peer_initiated_close_is_echoed() {
    let mut handshake = CloseHandshake::new();
    let reaction = handshake
        .receive(&[0x0F, 0xA0, b'h', b'i'])
        .expect("valid close");
    let CloseReaction::Echo { received, reply } = reaction else {
        panic!("expected echo, got {reaction:?}");
    };
    assert_eq!(received.status(), Some(CloseStatus::new(4000)));
    assert_eq!(reply.payload().as_ref(), &[0x0F, 0xA0, b'h', b'i']);
    assert!(handshake.is_complete());
}

#[test]
fn locally_initiated_close_completes_on_peer_echo() {
    let mut handshake = CloseHandshake::new();
    handshake
        .initiate(CloseStatus::NORMAL, "done")
        .expect("initiate");
    assert!(!handshake.is_complete());
    assert_eq!(
        handshake.initiate(CloseStatus::NORMAL, ""),
        Err(CloseError::AlreadySent)
    );

    let reaction = handshake.receive(&[0x03, 0xE8]).expect("echo");
    assert!(matches!(reaction, CloseReaction::Completed { .. }));
    assert!(handshake.is_complete());
}

#[test]
fn forced_close_truncates_reason_on_char_boundary() {
    let mut handshake = CloseHandshake::new();
    let reason = "é".repeat(100);
    let frame = handshake
        .record_forced(CloseStatus::PROTOCOL_ERROR, &reason)
        .expect("first close");
    assert!(frame.payload().len() <= 125);
    assert!(std::str::from_utf8(&frame.payload()[2..]).is_ok());
    assert!(handshake.record_forced(CloseStatus::PROTOCOL_ERROR, "").is_none());
}
