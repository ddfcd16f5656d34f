use bytes::Bytes;
use jasper::core::protocol::{HEADER_SIZE, Message, MessageFlags, MessageOp};
use jasper::core::semantics::{Safety, Semantics, Template};

#[tokio::test]
async fn frame_layout_is_little_endian_with_trailing_bulk() {
    let mut message = Message::new(MessageOp::ObjectWrite);
    message.force_safety(Safety::Storage);
    message.append_str("ns");
    message.append_str("obj");
    message.add_operation();
    message.append_u64(3);
    message.append_u64(7);
    message.append_bulk(Bytes::from_static(b"abc"));

    let mut wire = Vec::new();
    message.send(&mut wire).await.unwrap();

    // ns\0 obj\0 length:8 offset:8
    let payload_length = 3 + 4 + 8 + 8;
    assert_eq!(wire.len(), HEADER_SIZE + payload_length + 3);

    // op
    assert_eq!(&wire[0..4], &4u32.to_le_bytes());
    // flags: network | storage
    assert_eq!(&wire[4..8], &3u32.to_le_bytes());
    // count
    assert_eq!(&wire[8..12], &1u32.to_le_bytes());
    // total-length covers only the packed payload
    assert_eq!(&wire[12..16], &(payload_length as u32).to_le_bytes());
    // strings are NUL-terminated
    assert_eq!(&wire[16..19], b"ns\0");
    assert_eq!(&wire[19..23], b"obj\0");
    // integers little-endian
    assert_eq!(&wire[23..31], &3u64.to_le_bytes());
    assert_eq!(&wire[31..39], &7u64.to_le_bytes());
    // bulk is appended after the payload
    assert_eq!(&wire[39..], b"abc");
}

#[tokio::test]
async fn storage_safety_request_carries_the_network_flag() {
    let mut semantics = Semantics::new(Template::Default);
    semantics.set_safety(Safety::Storage);

    let mut message = Message::new(MessageOp::KvPut);
    message.set_safety(&semantics);

    assert!(message.flags().contains(MessageFlags::SAFETY_NETWORK));
    assert!(message.flags().contains(MessageFlags::SAFETY_STORAGE));
    assert!(message.wants_reply());
    assert_eq!(message.safety(), Safety::Storage);
}

#[tokio::test]
async fn fire_and_forget_frames_carry_no_flags() {
    let mut message = Message::new(MessageOp::ObjectWrite);
    message.set_safety(&Semantics::new(Template::Temporary));
    assert!(message.flags().is_empty());
    assert!(!message.wants_reply());
}

#[tokio::test]
async fn several_messages_share_one_stream() {
    let mut first = Message::new(MessageOp::KvDelete);
    first.append_str("ns");
    first.add_operation();
    first.append_str("k1");

    let mut second = Message::new(MessageOp::KvGet);
    second.append_str("ns");
    second.add_operation();
    second.append_str("k2");

    let mut wire = Vec::new();
    first.send(&mut wire).await.unwrap();
    second.send(&mut wire).await.unwrap();

    // One message value is reusable across receive cycles.
    let mut decoded = Message::new(MessageOp::None);
    let mut stream = wire.as_slice();

    decoded.receive(&mut stream).await.unwrap();
    assert_eq!(decoded.op(), MessageOp::KvDelete);
    assert_eq!(decoded.get_str().unwrap(), "ns");
    assert_eq!(decoded.get_str().unwrap(), "k1");

    decoded.receive(&mut stream).await.unwrap();
    assert_eq!(decoded.op(), MessageOp::KvGet);
    assert_eq!(decoded.get_str().unwrap(), "ns");
    assert_eq!(decoded.get_str().unwrap(), "k2");
}

#[tokio::test]
async fn truncated_header_is_incomplete() {
    let wire = vec![1u8, 0, 0];
    let mut decoded = Message::new(MessageOp::None);
    assert!(decoded.receive(&mut wire.as_slice()).await.is_err());
}

#[tokio::test]
async fn reading_past_the_payload_is_an_error() {
    let mut message = Message::new(MessageOp::KvGet);
    message.append_str("ns");

    let mut wire = Vec::new();
    message.send(&mut wire).await.unwrap();

    let mut decoded = Message::new(MessageOp::None);
    decoded.receive(&mut wire.as_slice()).await.unwrap();
    assert_eq!(decoded.get_str().unwrap(), "ns");
    assert!(decoded.get_u64().is_err());
}
