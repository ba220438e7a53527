//! End-to-end sanity checks across the three wire codecs: a line reader
//! assembling whole commands out of fragmented socket reads, and the
//! client/S2S command parsers handling a realistic session.

use bytes::Bytes;
use pushd_proto::prelude::*;

#[test]
fn client_session_shape_parses_in_order() {
    let lines = ["AUTH tok-1 user-7", "SUB room1", "PUB room1 1 hello", "UNSUB room1", "PING"];

    let commands: Vec<ClientCommand> = lines.iter().map(|l| parse_client_command(l).unwrap()).collect();

    assert_eq!(commands[0], ClientCommand::Auth { token: "tok-1".into(), uuid: "user-7".into() });
    assert_eq!(commands[1], ClientCommand::Sub { channel: "room1".into() });
    assert_eq!(
        commands[2],
        ClientCommand::Pub { channel: "room1".into(), msg_id: 1, body: "hello".into() }
    );
    assert_eq!(commands[3], ClientCommand::Unsub { channel: "room1".into() });
    assert_eq!(commands[4], ClientCommand::Ping);
}

#[test]
fn forward_frame_survives_a_round_trip_through_the_wire_bytes() {
    let frame = encode_forward_frame("user-1", "room1", b"signalling payload");
    let (uuid, channel, msg) = decode_forward_frame(&frame).unwrap();
    assert_eq!(uuid, "user-1");
    assert_eq!(channel, "room1");
    assert_eq!(msg, Bytes::from_static(b"signalling payload"));
}

#[test]
fn s2s_auth_then_interest_then_publish_round_trips() {
    let auth = S2sCommand::Auth { app_id: "node-b".into(), secret_key: "s3cr3t".into() };
    let sub = S2sCommand::Sub { channel: "room1".into() };
    let publish = S2sCommand::Pub {
        channel: "room1".into(),
        uuid: "user-1".into(),
        ts_ns: 1_700_000_000_000,
        msg_id: 42,
        body: "hello peer".into(),
    };

    for cmd in [auth, sub, publish] {
        let wire = format_s2s_command(&cmd);
        assert_eq!(parse_s2s_command(&wire).unwrap(), cmd);
    }
}
