//! Async reader and writer halves over tokio byte streams.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, trace, warn};

use crate::decoder::FrameDecoder;
use crate::message::{Message, Role, encode_frame};
use crate::{CodecError, HANDSHAKE};

const READ_CHUNK: usize = 4096;

/// Reads whole messages for one role from an `AsyncRead`.
pub struct FrameReader<R> {
    inner: R,
    role: Role,
    decoder: FrameDecoder,
    chunk: Box<[u8]>,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(inner: R, role: Role, handshake: bool) -> Self {
        Self { inner, role, decoder: FrameDecoder::new(handshake), chunk: vec![0; READ_CHUNK].into_boxed_slice() }
    }

    /// Next message valid for this reader's role. `None` on end of stream.
    ///
    /// Unknown opcodes and opcodes meant for the other role are logged and
    /// skipped.
    ///
    /// # Errors
    ///
    /// I/O failures, framing violations, and malformed payloads.
    pub async fn next(&mut self) -> Result<Option<Message>, CodecError> {
        loop {
            match self.decoder.next_message() {
                Ok(Some(msg)) => {
                    if self.role.accepts(msg.opcode()) {
                        return Ok(Some(msg));
                    }
                    warn!(role = ?self.role, opcode = ?msg.opcode(), "ipc: unsupported opcode for role");
                    continue;
                }
                Ok(None) => {}
                Err(CodecError::UnknownOpcode(op)) => {
                    warn!(role = ?self.role, opcode = op, "ipc: unsupported opcode");
                    continue;
                }
                Err(e) => return Err(e),
            }

            let n = self.inner.read(&mut self.chunk).await?;
            if n == 0 {
                if !self.decoder.handshake_done() {
                    debug!(role = ?self.role, "ipc: stream closed before handshake");
                } else if self.decoder.buffered() > 0 {
                    trace!(pending = self.decoder.buffered(), "ipc: stream closed mid-frame");
                }
                return Ok(None);
            }
            self.decoder.feed(&self.chunk[..n]);
        }
    }
}

/// Writes whole frames to an `AsyncWrite`.
pub struct FrameWriter<W> {
    inner: W,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    /// Wrap `inner`, writing the handshake token first when enabled.
    ///
    /// # Errors
    ///
    /// Propagates the write failure of the handshake token.
    pub async fn new(mut inner: W, handshake: bool) -> std::io::Result<Self> {
        if handshake {
            inner.write_all(HANDSHAKE).await?;
            inner.flush().await?;
        }
        Ok(Self { inner })
    }

    /// Encode and flush one frame.
    ///
    /// # Errors
    ///
    /// Propagates I/O errors, including broken pipes from an exited peer.
    pub async fn send(&mut self, message: &Message) -> std::io::Result<()> {
        self.inner.write_all(&encode_frame(message)).await?;
        self.inner.flush().await
    }

    /// Shut down the write half so the peer sees end of stream.
    ///
    /// # Errors
    ///
    /// Propagates the shutdown failure.
    pub async fn shutdown(&mut self) -> std::io::Result<()> {
        self.inner.shutdown().await
    }
}

#[cfg(test)]
#[path = "stream_test.rs"]
mod tests;
