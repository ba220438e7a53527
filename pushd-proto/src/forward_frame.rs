//! Binary forward frame for the `FORWARD` command (§6).
//!
//! Unlike the rest of the client protocol this payload is bit-exact
//! binary, not text: a big-endian `int32`-length-prefixed envelope
//! carrying an operation name followed by a second length-prefixed body.
//! Grounded on `engine/client.go`'s `handleForward`/`buildForwardFrame`,
//! which builds this same envelope to relay video-chat signalling
//! payloads to subscribers byte-for-byte.
//!
//! Frame layout:
//! ```text
//! i32be op_len | op_bytes | i32be body_len | body_bytes
//! ```
//! where `body_bytes` is `"<uuid> <channel> <msg>"` (single-space
//! separated, `msg` taking the remainder).

use bytes::{Buf, BufMut, Bytes, BytesMut};
use pushd_core::error::PushdError;

/// The only operation name the source ever framed; kept as a named
/// constant rather than inlined so call sites read as intent.
pub const CMD_VIDO_CHAT: &str = "vido_chat";

/// Builds the wire frame for relaying `msg` published by `uuid` on
/// `channel` to a `FORWARD` subscriber.
#[must_use]
pub fn encode_forward_frame(uuid: &str, channel: &str, msg: &[u8]) -> Bytes {
    let mut body = BytesMut::with_capacity(uuid.len() + channel.len() + msg.len() + 2);
    body.put_slice(uuid.as_bytes());
    body.put_u8(b' ');
    body.put_slice(channel.as_bytes());
    body.put_u8(b' ');
    body.put_slice(msg);

    let op = CMD_VIDO_CHAT.as_bytes();
    let mut frame = BytesMut::with_capacity(4 + op.len() + 4 + body.len());
    frame.put_i32(op.len() as i32);
    frame.put_slice(op);
    frame.put_i32(body.len() as i32);
    frame.put_slice(&body);
    frame.freeze()
}

/// Decodes a forward frame back into its `(uuid, channel, msg)` parts.
/// Used by tests and by any peer that needs to inspect rather than
/// blindly relay a forwarded frame.
pub fn decode_forward_frame(mut data: &[u8]) -> Result<(String, String, Bytes), PushdError> {
    if data.len() < 4 {
        return Err(PushdError::protocol("forward frame truncated before op_len"));
    }
    let op_len = data.get_i32() as usize;
    if data.len() < op_len + 4 {
        return Err(PushdError::protocol("forward frame truncated before op"));
    }
    let op = &data[..op_len];
    if op != CMD_VIDO_CHAT.as_bytes() {
        return Err(PushdError::protocol("forward frame has unexpected op"));
    }
    data.advance(op_len);

    let body_len = data.get_i32() as usize;
    if data.len() < body_len {
        return Err(PushdError::protocol("forward frame truncated before body"));
    }
    let body = &data[..body_len];

    let mut parts = body.splitn(3, |&b| b == b' ');
    let uuid = parts.next().ok_or_else(|| PushdError::protocol("forward frame missing uuid"))?;
    let channel = parts.next().ok_or_else(|| PushdError::protocol("forward frame missing channel"))?;
    let msg = parts.next().unwrap_or(&[]);

    let uuid = String::from_utf8_lossy(uuid).into_owned();
    let channel = String::from_utf8_lossy(channel).into_owned();
    Ok((uuid, channel, Bytes::copy_from_slice(msg)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_frame() {
        let frame = encode_forward_frame("user-1", "room1", b"hello world");
        let (uuid, channel, msg) = decode_forward_frame(&frame).unwrap();
        assert_eq!(uuid, "user-1");
        assert_eq!(channel, "room1");
        assert_eq!(msg, Bytes::from_static(b"hello world"));
    }

    #[test]
    fn frame_layout_is_big_endian_length_prefixed() {
        let frame = encode_forward_frame("u", "c", b"m");
        let op_len = i32::from_be_bytes(frame[0..4].try_into().unwrap());
        assert_eq!(op_len as usize, CMD_VIDO_CHAT.len());
        let op = &frame[4..4 + op_len as usize];
        assert_eq!(op, CMD_VIDO_CHAT.as_bytes());
        let body_len_offset = 4 + op_len as usize;
        let body_len = i32::from_be_bytes(frame[body_len_offset..body_len_offset + 4].try_into().unwrap());
        assert_eq!(body_len as usize, "u c m".len());
    }

    #[test]
    fn rejects_truncated_frame() {
        assert!(decode_forward_frame(&[0, 0, 0]).is_err());
        assert!(decode_forward_frame(&[0, 0, 0, 9, 1, 2, 3]).is_err());
    }
}
