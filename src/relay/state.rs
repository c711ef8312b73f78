//! Per-connection echo relay state machine.
//!
//! The relay consumes chunk-delivery events and decides, per frame, between
//! two echo regimes:
//!
//! - **Buffered**: the whole frame fits the fixed-capacity echo buffer.
//!   Chunks are accumulated and one outbound write is emitted after the
//!   final chunk.
//! - **Streaming**: the frame is larger than the buffer. Every chunk is
//!   forwarded as its own outbound write without copying, the first one
//!   opening the outbound message and the rest continuing it.
//!
//! The relay performs no I/O itself. Each event returns a [`RelayAction`]
//! describing the single read or write the hosting adapter must perform
//! next, which keeps at most one outbound write in flight per connection.

use crate::relay::chunk::FrameChunk;
use crate::relay::spans::WriteSpans;

/// Lifecycle phase of a relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// No frame in progress; the next chunk starts a new frame.
    AwaitingMessage,
    /// Accumulating chunks of a frame that fits the echo buffer.
    AccumulatingBuffered,
    /// Forwarding chunks of a frame larger than the echo buffer.
    StreamingFrame,
    /// An outbound write is in flight; no chunk may be delivered.
    AwaitingWriteComplete,
    /// Terminal. No further reads or writes are requested.
    Closed,
}

/// How an outbound write relates to its message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteKind {
    /// Opens a new outbound message (or frame) of `total_len` bytes.
    First {
        total_len: usize,
        last_frame: bool,
        is_binary: bool,
    },
    /// Continues the currently open outbound message.
    Continuation,
}

/// Description of one outbound write the adapter must submit.
#[derive(Debug)]
pub struct WriteRequest<'a> {
    pub spans: WriteSpans<'a>,
    pub kind: WriteKind,
}

/// The single I/O operation the adapter must perform after an event.
#[derive(Debug)]
pub enum RelayAction<'a> {
    /// Issue the next read; nothing to write.
    Read,
    /// Submit this write, then report its completion.
    Write(WriteRequest<'a>),
    /// Tear the connection down; no further I/O.
    Close,
}

/// Errors surfaced when the hosting layer violates the chunk contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayError {
    /// A buffered-regime chunk would overrun the echo buffer.
    ChunkOverflow {
        cursor: usize,
        length: usize,
        capacity: usize,
    },
    /// A chunk was delivered while a write was in flight or after close.
    UnexpectedChunk,
}

impl std::fmt::Display for RelayError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RelayError::ChunkOverflow {
                cursor,
                length,
                capacity,
            } => write!(
                f,
                "chunk of {length} bytes at cursor {cursor} overruns echo buffer of {capacity} bytes"
            ),
            RelayError::UnexpectedChunk => {
                write!(f, "chunk delivered while no read was outstanding")
            }
        }
    }
}

impl std::error::Error for RelayError {}

/// Per-connection echo relay.
///
/// Owned exclusively by one connection's lifecycle adapter; created when
/// the connection is accepted and dropped at teardown.
pub struct EchoRelay {
    /// Fixed-capacity accumulation buffer, used only in the buffered regime.
    echo_buffer: Vec<u8>,
    /// Bytes of the current frame accumulated so far.
    write_cursor: usize,
    /// True exactly when the next streamed chunk begins a new frame.
    next_chunk_starts_message: bool,
    phase: Phase,
}

impl EchoRelay {
    /// Create a relay with an echo buffer of `capacity` bytes.
    ///
    /// Frames up to and including `capacity` bytes take the buffered path;
    /// anything larger is streamed.
    pub fn new(capacity: usize) -> Self {
        Self {
            echo_buffer: vec![0u8; capacity],
            write_cursor: 0,
            next_chunk_starts_message: true,
            phase: Phase::AwaitingMessage,
        }
    }

    fn capacity(&self) -> usize {
        self.echo_buffer.len()
    }

    /// True while a frame is partially relayed, i.e. more chunks of the
    /// current frame are expected before the connection goes idle again.
    pub fn is_mid_frame(&self) -> bool {
        matches!(
            self.phase,
            Phase::AccumulatingBuffered | Phase::StreamingFrame
        )
    }

    /// Arm the relay for a freshly accepted connection and request the
    /// first read.
    pub fn on_connect(&mut self) -> RelayAction<'static> {
        self.write_cursor = 0;
        self.next_chunk_starts_message = true;
        self.phase = Phase::AwaitingMessage;
        RelayAction::Read
    }

    /// Consume one inbound chunk and decide the next I/O operation.
    ///
    /// The regime is chosen at a frame's first chunk by comparing the
    /// declared `frame_length` against the buffer capacity (the boundary is
    /// inclusive: a frame of exactly capacity bytes is buffered) and stays
    /// fixed until the frame completes.
    pub fn on_chunk<'a>(
        &'a mut self,
        chunk: FrameChunk<'a>,
    ) -> Result<RelayAction<'a>, RelayError> {
        match self.phase {
            Phase::AwaitingMessage => {
                if chunk.frame_length <= self.capacity() {
                    self.buffered_chunk(chunk)
                } else {
                    self.streamed_chunk(chunk)
                }
            }
            Phase::AccumulatingBuffered => self.buffered_chunk(chunk),
            Phase::StreamingFrame => self.streamed_chunk(chunk),
            Phase::AwaitingWriteComplete | Phase::Closed => Err(RelayError::UnexpectedChunk),
        }
    }

    /// Buffered regime: accumulate, and flush once the frame is complete.
    fn buffered_chunk<'a>(
        &'a mut self,
        chunk: FrameChunk<'a>,
    ) -> Result<RelayAction<'a>, RelayError> {
        let end = self.write_cursor + chunk.data.len();
        if end > self.capacity() {
            self.phase = Phase::Closed;
            return Err(RelayError::ChunkOverflow {
                cursor: self.write_cursor,
                length: chunk.data.len(),
                capacity: self.capacity(),
            });
        }

        self.echo_buffer[self.write_cursor..end].copy_from_slice(chunk.data);
        self.write_cursor = end;

        if !chunk.last_chunk {
            self.phase = Phase::AccumulatingBuffered;
            return Ok(RelayAction::Read);
        }

        // Frame complete: emit it as one write and recycle the buffer.
        debug_assert_eq!(self.write_cursor, chunk.frame_length);
        self.write_cursor = 0;
        self.phase = Phase::AwaitingWriteComplete;
        Ok(RelayAction::Write(WriteRequest {
            spans: WriteSpans::single(&self.echo_buffer[..chunk.frame_length]),
            kind: WriteKind::First {
                total_len: chunk.frame_length,
                last_frame: chunk.last_frame,
                is_binary: chunk.is_binary,
            },
        }))
    }

    /// Streaming regime: forward the chunk as its own write, zero-copy.
    fn streamed_chunk<'a>(
        &'a mut self,
        chunk: FrameChunk<'a>,
    ) -> Result<RelayAction<'a>, RelayError> {
        let mut spans = WriteSpans::new();
        spans.push(chunk.data);

        let kind = if self.next_chunk_starts_message {
            WriteKind::First {
                total_len: chunk.frame_length,
                last_frame: chunk.last_frame,
                is_binary: chunk.is_binary,
            }
        } else {
            WriteKind::Continuation
        };

        // Primed true again exactly when this frame's final chunk goes out.
        self.next_chunk_starts_message = chunk.last_chunk;
        self.phase = Phase::AwaitingWriteComplete;
        Ok(RelayAction::Write(WriteRequest { spans, kind }))
    }

    /// Observe the completion of the in-flight write.
    ///
    /// On success the next read is requested; mid-frame the streaming
    /// regime resumes, otherwise the relay is idle awaiting a new frame.
    /// On failure the relay closes and requests no further I/O.
    pub fn on_write_complete(&mut self, success: bool) -> RelayAction<'static> {
        if self.phase == Phase::Closed {
            return RelayAction::Close;
        }
        if !success {
            self.phase = Phase::Closed;
            return RelayAction::Close;
        }

        self.phase = if self.next_chunk_starts_message {
            Phase::AwaitingMessage
        } else {
            Phase::StreamingFrame
        };
        RelayAction::Read
    }

    /// Clean end-of-stream: expected steady-state termination, no failure.
    pub fn on_eof(&mut self) {
        self.phase = Phase::Closed;
    }

    /// Read failure other than end-of-stream. The adapter reports the
    /// error; the relay only stops requesting I/O.
    pub fn on_read_error(&mut self) {
        self.phase = Phase::Closed;
    }
}
