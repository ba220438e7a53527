//! Client-facing text protocol (§6).
//!
//! One command per line, space-separated, LF-terminated (see
//! [`crate::line_codec`] for the framing). `PUB`/`PUB2` take the remainder
//! of the line verbatim as the message body so the body itself may
//! contain spaces; only the fixed leading fields are split out.
//!
//! Grounded on `engine/client.go`'s command switch: the source dispatches
//! on the first token of each line and hands the rest to the matching
//! handler. `AUTH` here additionally carries the session's desired `uuid`
//! (the source assigns it out-of-band over the same connection handshake;
//! carrying it explicitly is the Open Question resolution recorded in
//! SPEC_FULL.md §9 — a client must be able to reconnect under the same
//! uuid for the compare-and-remove supersession scenario to apply).

use pushd_core::error::PushdError;

pub const AUTH_OK: &str = "AUTH_OK";
pub const AUTH_FAILED: &str = "AUTH_FAILED";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientCommand {
    Auth { token: String, uuid: String },
    Sub { channel: String },
    Unsub { channel: String },
    Pub { channel: String, msg_id: i64, body: String },
    Pub2 { channel: String, skip_user_id: String, force_other_node: bool, body: String },
    /// Header only; the binary payload is read separately via
    /// [`crate::line_codec::LineReader::read_exact_n`] once this is parsed.
    Forward { channel: String, len: usize },
    Ping,
}

/// Parses one already-unframed line (no trailing `\n`/`\r`) into a
/// [`ClientCommand`]. Unknown verbs and malformed arities are reported as
/// `PushdError::ProtocolMalformed` so the caller can close the session per
/// §7's malformed-input policy.
pub fn parse_client_command(line: &str) -> Result<ClientCommand, PushdError> {
    let mut parts = line.splitn(2, ' ');
    let verb = parts.next().unwrap_or("").to_ascii_uppercase();
    let rest = parts.next().unwrap_or("");

    match verb.as_str() {
        "AUTH" => {
            let mut it = rest.split(' ');
            let token = it.next().filter(|s| !s.is_empty()).ok_or_else(|| PushdError::protocol("AUTH missing token"))?;
            let uuid = it.next().filter(|s| !s.is_empty()).ok_or_else(|| PushdError::protocol("AUTH missing uuid"))?;
            Ok(ClientCommand::Auth { token: token.to_string(), uuid: uuid.to_string() })
        }
        "SUB" => {
            let channel = rest.trim();
            if channel.is_empty() {
                return Err(PushdError::protocol("SUB missing channel"));
            }
            Ok(ClientCommand::Sub { channel: channel.to_string() })
        }
        "UNSUB" => {
            let channel = rest.trim();
            if channel.is_empty() {
                return Err(PushdError::protocol("UNSUB missing channel"));
            }
            Ok(ClientCommand::Unsub { channel: channel.to_string() })
        }
        "PUB" => {
            let mut it = rest.splitn(3, ' ');
            let channel = it.next().filter(|s| !s.is_empty()).ok_or_else(|| PushdError::protocol("PUB missing channel"))?;
            let msg_id_str = it.next().ok_or_else(|| PushdError::protocol("PUB missing msg_id"))?;
            let msg_id: i64 = msg_id_str.parse().map_err(|_| PushdError::protocol("PUB msg_id not an integer"))?;
            let body = it.next().unwrap_or("").to_string();
            Ok(ClientCommand::Pub { channel: channel.to_string(), msg_id, body })
        }
        "PUB2" => {
            let mut it = rest.splitn(4, ' ');
            let channel = it.next().filter(|s| !s.is_empty()).ok_or_else(|| PushdError::protocol("PUB2 missing channel"))?;
            let skip_user_id = it.next().unwrap_or("").to_string();
            let force_flag = it.next().ok_or_else(|| PushdError::protocol("PUB2 missing force flag"))?;
            let force_other_node = force_flag == "1" || force_flag.eq_ignore_ascii_case("true");
            let body = it.next().unwrap_or("").to_string();
            Ok(ClientCommand::Pub2 {
                channel: channel.to_string(),
                skip_user_id,
                force_other_node,
                body,
            })
        }
        "FORWARD" => {
            let mut it = rest.split(' ');
            let channel = it.next().filter(|s| !s.is_empty()).ok_or_else(|| PushdError::protocol("FORWARD missing channel"))?;
            let len_str = it.next().ok_or_else(|| PushdError::protocol("FORWARD missing length"))?;
            let len: usize = len_str.parse().map_err(|_| PushdError::protocol("FORWARD length not an integer"))?;
            Ok(ClientCommand::Forward { channel: channel.to_string(), len })
        }
        "PING" => Ok(ClientCommand::Ping),
        other => Err(PushdError::protocol(format!("unknown command {other}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_auth() {
        let cmd = parse_client_command("AUTH tok-123 user-7").unwrap();
        assert_eq!(cmd, ClientCommand::Auth { token: "tok-123".into(), uuid: "user-7".into() });
    }

    #[test]
    fn parses_sub_and_unsub() {
        assert_eq!(parse_client_command("SUB room1").unwrap(), ClientCommand::Sub { channel: "room1".into() });
        assert_eq!(parse_client_command("UNSUB room1").unwrap(), ClientCommand::Unsub { channel: "room1".into() });
    }

    #[test]
    fn parses_pub_with_spaces_in_body() {
        let cmd = parse_client_command("PUB room1 42 hello there world").unwrap();
        assert_eq!(
            cmd,
            ClientCommand::Pub { channel: "room1".into(), msg_id: 42, body: "hello there world".into() }
        );
    }

    #[test]
    fn parses_pub2_force_flag() {
        let cmd = parse_client_command("PUB2 room1 user-9 1 hi").unwrap();
        assert_eq!(
            cmd,
            ClientCommand::Pub2 {
                channel: "room1".into(),
                skip_user_id: "user-9".into(),
                force_other_node: true,
                body: "hi".into(),
            }
        );
    }

    #[test]
    fn parses_forward_header() {
        let cmd = parse_client_command("FORWARD room1 11").unwrap();
        assert_eq!(cmd, ClientCommand::Forward { channel: "room1".into(), len: 11 });
    }

    #[test]
    fn parses_ping() {
        assert_eq!(parse_client_command("PING").unwrap(), ClientCommand::Ping);
        assert_eq!(parse_client_command("ping").unwrap(), ClientCommand::Ping);
    }

    #[test]
    fn rejects_unknown_verb() {
        assert!(parse_client_command("FOO bar").is_err());
    }

    #[test]
    fn rejects_malformed_pub() {
        assert!(parse_client_command("PUB room1 not-a-number body").is_err());
        assert!(parse_client_command("PUB").is_err());
    }
}
