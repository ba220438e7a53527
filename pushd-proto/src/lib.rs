//! # pushd-proto
//!
//! Wire protocol codecs for `pushd`: the client text protocol, the binary
//! forward frame used by `Forward` (video-chat style traffic), and the S2S
//! overlay protocol peers speak to each other.
//!
//! Every codec here is sans-IO: parsing and formatting operate on `&str`/
//! `Bytes` and know nothing about sockets. The `pushd` binary crate owns
//! the actual `compio` reads/writes and calls into this crate to turn
//! bytes into typed commands and typed commands back into bytes.
//!
//! - `line_codec`: incremental LF-delimited line reader over an
//!   `AsyncRead` stream, plus a raw fixed-length byte reader for the
//!   `FORWARD` command's binary payload.
//! - `client_proto`: the client-facing text protocol (§6).
//! - `forward_frame`: the bit-exact binary forward frame (§6).
//! - `s2s_proto`: the S2S overlay text protocol (§6).

#![deny(unsafe_code)]
#![allow(clippy::module_name_repetitions)]

pub mod client_proto;
pub mod forward_frame;
pub mod line_codec;
pub mod s2s_proto;

pub mod prelude {
    pub use crate::client_proto::{parse_client_command, ClientCommand, AUTH_FAILED, AUTH_OK};
    pub use crate::forward_frame::{decode_forward_frame, encode_forward_frame, CMD_VIDO_CHAT};
    pub use crate::line_codec::LineReader;
    pub use crate::s2s_proto::{format_s2s_command, parse_s2s_command, S2sCommand};
}
