//! Framed IPC between the daemon and its out-of-process browser helper.
//!
//! ARCHITECTURE
//! ============
//! Two byte streams (the helper's stdin and stdout) carry frames in each
//! direction. A frame is a 4-byte little-endian length followed by exactly
//! that many payload bytes. The payload starts with a 4-byte little-endian
//! opcode; `Start` and `SetResult` follow it with the parameter map as
//! `google.protobuf.Struct` bytes (see [`frames::encode_struct`]).
//!
//! ```text
//!  daemon (Role::Client)                 helper (Role::Server)
//!  ─────────────────────                 ─────────────────────
//!  "SsoUi" ─────────────────────────────▶ scan for token
//!  [len][Start][map] ───────────────────▶
//!  [len][Cancel] ───────────────────────▶
//!                  ◀───────────────────── "SsoUi"
//!                  ◀───────────────────── [len][SetResult][map]
//!                  ◀───────────────────── [len][SetCanceled]
//! ```
//!
//! HANDSHAKE
//! =========
//! When enabled, each writer emits the token `SsoUi` once at channel setup
//! and each reader discards every byte up to and including the first token.
//! This lets a helper print arbitrary noise (library banners) to stdout
//! before the protocol starts.
//!
//! ERROR HANDLING
//! ==============
//! Oversized or truncated frames and undecodable map bodies are
//! [`CodecError`]s that abort the channel. An opcode that is unknown, or not
//! valid for the reading role, is logged and skipped; the channel keeps
//! serving.

pub mod decoder;
pub mod message;
pub mod stream;

pub use decoder::FrameDecoder;
pub use message::{Message, Opcode, Role, encode_frame};
pub use stream::{FrameReader, FrameWriter};

/// Request parameters and results exchanged with the helper.
pub type Parameters = serde_json::Map<String, serde_json::Value>;

/// Token written once per direction when the handshake is enabled.
pub const HANDSHAKE: &[u8] = b"SsoUi";

/// Largest accepted payload. Anything bigger is treated as a corrupt stream.
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// Bytes in the length prefix and in the opcode field.
pub const HEADER_LEN: usize = 4;

/// Errors produced while encoding or decoding the helper protocol.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("map body: {0}")]
    Body(#[from] frames::CodecError),
    #[error("unknown opcode: {0}")]
    UnknownOpcode(u32),
    #[error("frame length {0} exceeds maximum")]
    FrameTooLarge(usize),
    #[error("frame length {0} is shorter than an opcode")]
    FrameTooShort(usize),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
