//! Incremental frame decoder.
//!
//! DESIGN
//! ======
//! Bytes arrive in arbitrary fragments. [`FrameDecoder::feed`] appends them
//! to an internal buffer; [`FrameDecoder::next_payload`] advances a small
//! state machine and yields whole payloads only:
//!
//! ```text
//! AwaitingHandshake ──token──▶ AwaitingLength ──4 bytes──▶ AwaitingPayload(n)
//!                                    ▲                            │
//!                                    └──────── n bytes, emit ─────┘
//! ```
//!
//! Without a handshake the decoder starts in `AwaitingLength`.

use crate::message::Message;
use crate::{CodecError, HANDSHAKE, HEADER_LEN, MAX_FRAME_LEN};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    AwaitingHandshake,
    AwaitingLength,
    AwaitingPayload(usize),
}

/// Buffers partial input and emits complete frame payloads.
#[derive(Debug)]
pub struct FrameDecoder {
    state: State,
    buf: Vec<u8>,
}

impl FrameDecoder {
    #[must_use]
    pub fn new(handshake: bool) -> Self {
        let state = if handshake { State::AwaitingHandshake } else { State::AwaitingLength };
        Self { state, buf: Vec::new() }
    }

    /// Append raw bytes read from the stream.
    pub fn feed(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// True once the handshake token has been seen (or was not required).
    #[must_use]
    pub fn handshake_done(&self) -> bool {
        self.state != State::AwaitingHandshake
    }

    /// Bytes held that do not yet form a complete frame.
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Pop the next complete payload, if one is buffered.
    ///
    /// # Errors
    ///
    /// [`CodecError::FrameTooLarge`] or [`CodecError::FrameTooShort`] when a
    /// length prefix is out of range. The stream cannot be resynchronized
    /// afterwards.
    pub fn next_payload(&mut self) -> Result<Option<Vec<u8>>, CodecError> {
        loop {
            match self.state {
                State::AwaitingHandshake => {
                    if !self.scan_handshake() {
                        return Ok(None);
                    }
                    self.state = State::AwaitingLength;
                }
                State::AwaitingLength => {
                    let Some(head) = self.buf.first_chunk::<HEADER_LEN>() else {
                        return Ok(None);
                    };
                    let len = u32::from_le_bytes(*head) as usize;
                    if len > MAX_FRAME_LEN {
                        return Err(CodecError::FrameTooLarge(len));
                    }
                    if len < HEADER_LEN {
                        return Err(CodecError::FrameTooShort(len));
                    }
                    self.buf.drain(..HEADER_LEN);
                    self.state = State::AwaitingPayload(len);
                }
                State::AwaitingPayload(len) => {
                    if self.buf.len() < len {
                        return Ok(None);
                    }
                    let payload: Vec<u8> = self.buf.drain(..len).collect();
                    self.state = State::AwaitingLength;
                    return Ok(Some(payload));
                }
            }
        }
    }

    /// Pop and decode the next complete message.
    ///
    /// # Errors
    ///
    /// Any framing error from [`FrameDecoder::next_payload`] or payload error
    /// from [`Message::decode_payload`]. After an `UnknownOpcode` error the
    /// decoder stays aligned and can keep going.
    pub fn next_message(&mut self) -> Result<Option<Message>, CodecError> {
        match self.next_payload()? {
            Some(payload) => Message::decode_payload(&payload).map(Some),
            None => Ok(None),
        }
    }

    /// Drop everything up to and including the first token. Returns whether
    /// the token was found; otherwise keeps only a possible token prefix.
    fn scan_handshake(&mut self) -> bool {
        if let Some(pos) = self.buf.windows(HANDSHAKE.len()).position(|w| w == HANDSHAKE) {
            self.buf.drain(..pos + HANDSHAKE.len());
            return true;
        }
        let keep = HANDSHAKE.len() - 1;
        if self.buf.len() > keep {
            let cut = self.buf.len() - keep;
            self.buf.drain(..cut);
        }
        false
    }
}

#[cfg(test)]
#[path = "decoder_test.rs"]
mod tests;
