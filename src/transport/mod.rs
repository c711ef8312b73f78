//! Transport boundary between the relay core and the hosting
//! WebSocket/HTTP layer.
//!
//! The relay never touches sockets; it is driven through [`FrameTransport`],
//! which delivers inbound frames as length-bounded chunks and accepts
//! outbound writes described by span lists. [`ws`] implements the contract
//! over a real WebSocket stream.

pub mod ws;

use std::io;

use bytes::Bytes;

use crate::relay::{FrameChunk, WriteSpans};

/// One inbound chunk with owned payload bytes.
///
/// The owned form decouples the chunk's lifetime from the transport's
/// internal buffers; the relay consumes it as a borrowed [`FrameChunk`].
#[derive(Debug, Clone)]
pub struct InboundChunk {
    pub frame_length: usize,
    pub data: Bytes,
    pub last_chunk: bool,
    pub last_frame: bool,
    pub is_binary: bool,
}

impl InboundChunk {
    /// Borrowed view of this chunk for the relay.
    pub fn frame_chunk(&self) -> FrameChunk<'_> {
        FrameChunk {
            frame_length: self.frame_length,
            data: &self.data,
            last_chunk: self.last_chunk,
            last_frame: self.last_frame,
            is_binary: self.is_binary,
        }
    }
}

/// Asynchronous frame transport contract.
///
/// Writes are strictly serialized by the caller: a new read is requested
/// only after the previous write's future has resolved, so implementations
/// never see more than one outbound operation at a time.
pub trait FrameTransport {
    /// Receive the next chunk. `Ok(None)` signals clean end-of-stream.
    async fn read_chunk(&mut self) -> io::Result<Option<InboundChunk>>;

    /// Open an outbound message of `total_len` bytes and write the given
    /// spans as its first part.
    async fn write_message_first(
        &mut self,
        total_len: usize,
        spans: WriteSpans<'_>,
        last_frame: bool,
        is_binary: bool,
    ) -> io::Result<()>;

    /// Continue the currently open outbound message.
    async fn write_message_continuation(&mut self, spans: WriteSpans<'_>) -> io::Result<()>;

    /// Close the transport gracefully.
    async fn close(&mut self) -> io::Result<()>;
}
