//! Server-to-server overlay protocol (§6, §4.4).
//!
//! Peers speak the same line-framed shape as the client protocol but with
//! a different command set: mutual `AUTH` by appId/secret instead of a
//! one-time token, `SUB`/`UNSUB` to propagate interest so a peer only
//! receives channels it actually has local subscribers for (§4.4.2), and
//! two publish shapes — `PUB` carrying full provenance for a publish that
//! still needs persistence/user-store bookkeeping on the receiving side,
//! and `PUB PUSH` for the lighter push-only relay used by `Publish2`
//! (§6 gives its wire shape as the two leading tokens `PUB PUSH`, not a
//! fused verb), which the receiving peer fans out locally without
//! re-recording it (§4.3.5, §4.3.6 — `Forward` itself is never relayed
//! over S2S, it is local-fanout only, see SPEC_FULL.md §9).
//!
//! Grounded on `engine/pubsub.go`'s peer-to-peer frame handling: the
//! source multiplexes the same two publish shapes over one connection
//! keyed on the leading verb.

use pushd_core::error::PushdError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum S2sCommand {
    Auth { app_id: String, secret_key: String },
    Sub { channel: String },
    Unsub { channel: String },
    Pub { channel: String, uuid: String, ts_ns: i64, msg_id: i64, body: String },
    PubPush { channel: String, body: String },
}

pub fn parse_s2s_command(line: &str) -> Result<S2sCommand, PushdError> {
    let mut parts = line.splitn(2, ' ');
    let verb = parts.next().unwrap_or("").to_ascii_uppercase();
    let rest = parts.next().unwrap_or("");

    match verb.as_str() {
        "AUTH" => {
            let mut it = rest.splitn(2, ' ');
            let app_id = it.next().filter(|s| !s.is_empty()).ok_or_else(|| PushdError::protocol("AUTH missing app_id"))?;
            let secret_key = it.next().filter(|s| !s.is_empty()).ok_or_else(|| PushdError::protocol("AUTH missing secret_key"))?;
            Ok(S2sCommand::Auth { app_id: app_id.to_string(), secret_key: secret_key.to_string() })
        }
        "SUB" => {
            let channel = rest.trim();
            if channel.is_empty() {
                return Err(PushdError::protocol("SUB missing channel"));
            }
            Ok(S2sCommand::Sub { channel: channel.to_string() })
        }
        "UNSUB" => {
            let channel = rest.trim();
            if channel.is_empty() {
                return Err(PushdError::protocol("UNSUB missing channel"));
            }
            Ok(S2sCommand::Unsub { channel: channel.to_string() })
        }
        "PUB" => {
            // §6: `PUB PUSH <channel> <body>` is the lighter push-only
            // shape; any other second token starts the full provenance
            // form `PUB <channel> <uuid> <ts_ns> <msgId> <body>`.
            if let Some(push_rest) = rest.strip_prefix("PUSH ").or_else(|| if rest == "PUSH" { Some("") } else { None }) {
                let mut it = push_rest.splitn(2, ' ');
                let channel = it.next().filter(|s| !s.is_empty()).ok_or_else(|| PushdError::protocol("PUB PUSH missing channel"))?;
                let body = it.next().unwrap_or("").to_string();
                return Ok(S2sCommand::PubPush { channel: channel.to_string(), body });
            }

            let mut it = rest.splitn(5, ' ');
            let channel = it.next().filter(|s| !s.is_empty()).ok_or_else(|| PushdError::protocol("PUB missing channel"))?;
            let uuid = it.next().filter(|s| !s.is_empty()).ok_or_else(|| PushdError::protocol("PUB missing uuid"))?;
            let ts_ns: i64 = it
                .next()
                .ok_or_else(|| PushdError::protocol("PUB missing ts_ns"))?
                .parse()
                .map_err(|_| PushdError::protocol("PUB ts_ns not an integer"))?;
            let msg_id: i64 = it
                .next()
                .ok_or_else(|| PushdError::protocol("PUB missing msg_id"))?
                .parse()
                .map_err(|_| PushdError::protocol("PUB msg_id not an integer"))?;
            let body = it.next().unwrap_or("").to_string();
            Ok(S2sCommand::Pub { channel: channel.to_string(), uuid: uuid.to_string(), ts_ns, msg_id, body })
        }
        other => Err(PushdError::protocol(format!("unknown s2s command {other}"))),
    }
}

/// Renders an [`S2sCommand`] back to its wire line (without the trailing
/// `\n`, which the caller's writer appends). Used by the outbound S2S
/// sender to format what it reads off the broker's peer queues.
#[must_use]
pub fn format_s2s_command(cmd: &S2sCommand) -> String {
    match cmd {
        S2sCommand::Auth { app_id, secret_key } => format!("AUTH {app_id} {secret_key}"),
        S2sCommand::Sub { channel } => format!("SUB {channel}"),
        S2sCommand::Unsub { channel } => format!("UNSUB {channel}"),
        S2sCommand::Pub { channel, uuid, ts_ns, msg_id, body } => {
            format!("PUB {channel} {uuid} {ts_ns} {msg_id} {body}")
        }
        S2sCommand::PubPush { channel, body } => format!("PUB PUSH {channel} {body}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_auth() {
        let cmd = S2sCommand::Auth { app_id: "node-a".into(), secret_key: "shh".into() };
        assert_eq!(parse_s2s_command(&format_s2s_command(&cmd)).unwrap(), cmd);
    }

    #[test]
    fn round_trips_sub_unsub() {
        let sub = S2sCommand::Sub { channel: "room1".into() };
        let unsub = S2sCommand::Unsub { channel: "room1".into() };
        assert_eq!(parse_s2s_command(&format_s2s_command(&sub)).unwrap(), sub);
        assert_eq!(parse_s2s_command(&format_s2s_command(&unsub)).unwrap(), unsub);
    }

    #[test]
    fn round_trips_pub_with_spaces_in_body() {
        let cmd = S2sCommand::Pub {
            channel: "room1".into(),
            uuid: "user-1".into(),
            ts_ns: 1_700_000_000,
            msg_id: 7,
            body: "hello there world".into(),
        };
        assert_eq!(parse_s2s_command(&format_s2s_command(&cmd)).unwrap(), cmd);
    }

    #[test]
    fn round_trips_pubpush() {
        let cmd = S2sCommand::PubPush { channel: "room1".into(), body: "hi there".into() };
        assert_eq!(parse_s2s_command(&format_s2s_command(&cmd)).unwrap(), cmd);
    }

    #[test]
    fn rejects_unknown_and_malformed() {
        assert!(parse_s2s_command("NOPE").is_err());
        assert!(parse_s2s_command("PUB room1 user-1 not-a-number 7 hi").is_err());
        assert!(parse_s2s_command("AUTH only-one-field").is_err());
    }
}
