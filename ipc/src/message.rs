//! Protocol messages, opcodes, and frame encoding.

use crate::{CodecError, HEADER_LEN, Parameters};

/// Operation carried by a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum Opcode {
    /// Daemon → helper: begin with these parameters.
    Start = 1,
    /// Daemon → helper: abort the running request.
    Cancel = 2,
    /// Helper → daemon: finished with this result map.
    SetResult = 3,
    /// Helper → daemon: the user dismissed the request.
    SetCanceled = 4,
}

impl TryFrom<u32> for Opcode {
    type Error = CodecError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::Start),
            2 => Ok(Self::Cancel),
            3 => Ok(Self::SetResult),
            4 => Ok(Self::SetCanceled),
            other => Err(CodecError::UnknownOpcode(other)),
        }
    }
}

/// A decoded protocol message.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Start(Parameters),
    Cancel,
    SetResult(Parameters),
    SetCanceled,
}

impl Message {
    #[must_use]
    pub fn opcode(&self) -> Opcode {
        match self {
            Self::Start(_) => Opcode::Start,
            Self::Cancel => Opcode::Cancel,
            Self::SetResult(_) => Opcode::SetResult,
            Self::SetCanceled => Opcode::SetCanceled,
        }
    }

    /// Encode the payload: opcode followed by the `Struct` body, if any.
    #[must_use]
    pub fn encode_payload(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(64);
        out.extend_from_slice(&(self.opcode() as u32).to_le_bytes());
        match self {
            Self::Start(map) | Self::SetResult(map) => out.extend(frames::encode_struct(map)),
            Self::Cancel | Self::SetCanceled => {}
        }
        out
    }

    /// Decode one payload as produced by [`Message::encode_payload`].
    ///
    /// # Errors
    ///
    /// [`CodecError::FrameTooShort`] when the opcode is missing,
    /// [`CodecError::UnknownOpcode`] for opcodes outside 1..=4, and
    /// [`CodecError::Body`] for an undecodable map. Bodies after
    /// `Cancel`/`SetCanceled` are ignored.
    pub fn decode_payload(payload: &[u8]) -> Result<Self, CodecError> {
        let Some((head, body)) = payload.split_first_chunk::<HEADER_LEN>() else {
            return Err(CodecError::FrameTooShort(payload.len()));
        };
        match Opcode::try_from(u32::from_le_bytes(*head))? {
            Opcode::Start => Ok(Self::Start(frames::decode_struct(body)?)),
            Opcode::Cancel => Ok(Self::Cancel),
            Opcode::SetResult => Ok(Self::SetResult(frames::decode_struct(body)?)),
            Opcode::SetCanceled => Ok(Self::SetCanceled),
        }
    }
}

/// Encode a complete frame: length prefix plus payload.
#[must_use]
pub fn encode_frame(message: &Message) -> Vec<u8> {
    let payload = message.encode_payload();
    let len = u32::try_from(payload.len()).unwrap_or(u32::MAX);
    let mut out = Vec::with_capacity(HEADER_LEN + payload.len());
    out.extend_from_slice(&len.to_le_bytes());
    out.extend_from_slice(&payload);
    out
}

/// Which end of the channel is reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// The daemon: sends `Start`/`Cancel`, receives results.
    Client,
    /// The helper: receives `Start`/`Cancel`, sends results.
    Server,
}

impl Role {
    /// Whether this role expects to receive `opcode`.
    #[must_use]
    pub fn accepts(self, opcode: Opcode) -> bool {
        match self {
            Self::Client => matches!(opcode, Opcode::SetResult | Opcode::SetCanceled),
            Self::Server => matches!(opcode, Opcode::Start | Opcode::Cancel),
        }
    }
}

#[cfg(test)]
#[path = "message_test.rs"]
mod tests;
