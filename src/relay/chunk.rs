//! Inbound chunk-delivery events.

/// One chunk of an inbound WebSocket frame, as delivered by the hosting
/// transport layer.
///
/// A frame may arrive as one or many chunks depending on I/O buffering;
/// `frame_length` is the declared total length of the frame the chunk
/// belongs to and is fixed for the frame's lifetime.
#[derive(Debug, Clone, Copy)]
pub struct FrameChunk<'a> {
    /// Declared total length of the frame this chunk belongs to.
    pub frame_length: usize,
    /// Payload bytes of this chunk. May be empty.
    pub data: &'a [u8],
    /// True if this is the final chunk of the frame.
    pub last_chunk: bool,
    /// True if the frame is the final frame of its message.
    pub last_frame: bool,
    /// True for binary messages, false for text.
    pub is_binary: bool,
}
