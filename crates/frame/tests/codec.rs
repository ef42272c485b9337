use bytes::Bytes;
use rand::RngCore;
use relay_frame::{Frame, MAX_PAYLOAD};

#[test]
fn round_trip_law_holds_for_random_payloads() {
    let mut rng = rand::thread_rng();

    for len in [0, 1, 17, 4096, MAX_PAYLOAD] {
        let mut payload = vec![0u8; len];
        rng.fill_bytes(&mut payload);

        let frame = Frame::data("stream-xyz", Bytes::from(payload.clone()));
        let line = frame.encode_line().expect("encode");
        let decoded = Frame::decode_line(&line).expect("decode").expect("not a heartbeat");

        assert_eq!(decoded.id, "stream-xyz");
        if len == 0 {
            assert!(decoded.is_control());
        } else {
            assert_eq!(decoded.data.as_deref(), Some(payload.as_slice()));
        }
    }
}

#[test]
fn a_sequence_of_lines_mixes_control_data_and_heartbeats() {
    let lines = vec![
        Frame::control("a").encode_line().unwrap(),
        Frame::data("a", Bytes::from_static(b"payload")).encode_line().unwrap(),
        String::new(),
        Frame::control("a").encode_line().unwrap(),
    ];

    let mut decoded = Vec::new();
    for line in &lines {
        if let Some(frame) = Frame::decode_line(line).unwrap() {
            decoded.push(frame);
        }
    }

    assert_eq!(decoded.len(), 3);
    assert!(decoded[0].is_control());
    assert_eq!(decoded[1].data.as_deref(), Some(&b"payload"[..]));
    assert!(decoded[2].is_control());
}
