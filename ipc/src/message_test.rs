use super::*;
use serde_json::json;

fn map(value: serde_json::Value) -> Parameters {
    value.as_object().cloned().expect("object")
}

#[test]
fn opcode_values_are_stable() {
    assert_eq!(Opcode::Start as u32, 1);
    assert_eq!(Opcode::Cancel as u32, 2);
    assert_eq!(Opcode::SetResult as u32, 3);
    assert_eq!(Opcode::SetCanceled as u32, 4);
    assert!(matches!(Opcode::try_from(0), Err(CodecError::UnknownOpcode(0))));
    assert!(matches!(Opcode::try_from(5), Err(CodecError::UnknownOpcode(5))));
}

#[test]
fn cancel_frame_layout() {
    assert_eq!(encode_frame(&Message::Cancel), vec![4, 0, 0, 0, 2, 0, 0, 0]);
    assert_eq!(encode_frame(&Message::SetCanceled), vec![4, 0, 0, 0, 4, 0, 0, 0]);
}

#[test]
fn length_prefix_counts_payload_bytes() {
    let msg = Message::Start(map(json!({"OpenUrl": "https://example.com"})));
    let frame = encode_frame(&msg);
    let declared = u32::from_le_bytes(frame[..4].try_into().expect("prefix")) as usize;
    assert_eq!(declared, frame.len() - 4);
    assert_eq!(&frame[4..8], &1u32.to_le_bytes());
}

#[test]
fn start_payload_round_trips() {
    let msg = Message::Start(map(json!({
        "OpenUrl": "https://example.com",
        "ClientData": {"WindowId": 7, "Embedded": true}
    })));
    let decoded = Message::decode_payload(&msg.encode_payload()).expect("decode");
    assert_eq!(decoded, msg);
}

#[test]
fn set_result_payload_round_trips() {
    let msg = Message::SetResult(map(json!({"UrlResponse": "https://example.com/done?code=1"})));
    let decoded = Message::decode_payload(&msg.encode_payload()).expect("decode");
    assert_eq!(decoded, msg);
}

#[test]
fn map_body_is_a_protobuf_struct() {
    let parameters = map(json!({"Caption": "Example", "ClientData": {"WindowId": 7}}));
    let payload = Message::SetResult(parameters.clone()).encode_payload();
    assert_eq!(&payload[4..], frames::encode_struct(&parameters).as_slice());
}

#[test]
fn start_without_body_carries_empty_map() {
    let decoded = Message::decode_payload(&1u32.to_le_bytes()).expect("decode");
    assert_eq!(decoded, Message::Start(Parameters::new()));
}

#[test]
fn undecodable_body_is_rejected() {
    let mut payload = 3u32.to_le_bytes().to_vec();
    payload.push(0xff);
    assert!(matches!(Message::decode_payload(&payload), Err(CodecError::Body(_))));
}

#[test]
fn payload_without_opcode_is_too_short() {
    assert!(matches!(Message::decode_payload(&[1, 0]), Err(CodecError::FrameTooShort(2))));
}

#[test]
fn unknown_opcode_payload_is_rejected() {
    assert!(matches!(
        Message::decode_payload(&9u32.to_le_bytes()),
        Err(CodecError::UnknownOpcode(9))
    ));
}

#[test]
fn roles_accept_opposite_directions() {
    assert!(Role::Client.accepts(Opcode::SetResult));
    assert!(Role::Client.accepts(Opcode::SetCanceled));
    assert!(!Role::Client.accepts(Opcode::Start));
    assert!(!Role::Client.accepts(Opcode::Cancel));
    assert!(Role::Server.accepts(Opcode::Start));
    assert!(Role::Server.accepts(Opcode::Cancel));
    assert!(!Role::Server.accepts(Opcode::SetResult));
}
