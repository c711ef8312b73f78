//! WebSocket implementation of the frame transport contract.
//!
//! Built on tokio-tungstenite, which owns frame parsing, masking, and the
//! ping/close mechanics. This layer adapts the library's message-at-a-time
//! surface to the chunked contract the relay expects:
//!
//! - Inbound: each data message is delivered as final-frame chunks of at
//!   most `chunk_size` bytes, so a message larger than the relay's echo
//!   buffer arrives as multiple chunks and takes the streaming path.
//! - Outbound: span payloads are accumulated until the declared total
//!   length is reached, then sent as one WebSocket message.

use std::io;

use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::WebSocketStream;

use crate::relay::WriteSpans;
use crate::transport::{FrameTransport, InboundChunk};

/// An inbound data message being served out as chunks.
#[derive(Debug)]
struct InboundMessage {
    data: Bytes,
    offset: usize,
    is_binary: bool,
}

impl InboundMessage {
    fn text(s: String) -> Self {
        Self {
            data: Bytes::from(s.into_bytes()),
            offset: 0,
            is_binary: false,
        }
    }

    fn binary(b: Vec<u8>) -> Self {
        Self {
            data: Bytes::from(b),
            offset: 0,
            is_binary: true,
        }
    }

    /// Carve off the next chunk of at most `chunk_size` bytes.
    fn next_chunk(&mut self, chunk_size: usize) -> InboundChunk {
        let remaining = self.data.len() - self.offset;
        let take = remaining.min(chunk_size);
        let data = self.data.slice(self.offset..self.offset + take);
        self.offset += take;

        InboundChunk {
            frame_length: self.data.len(),
            data,
            last_chunk: self.offset == self.data.len(),
            last_frame: true,
            is_binary: self.is_binary,
        }
    }

    fn is_exhausted(&self) -> bool {
        self.offset >= self.data.len()
    }
}

/// An outbound message being assembled from write spans.
#[derive(Debug)]
struct OutboundMessage {
    buf: Vec<u8>,
    total_len: usize,
    is_binary: bool,
}

impl OutboundMessage {
    fn new(total_len: usize, is_binary: bool) -> Self {
        Self {
            buf: Vec::with_capacity(total_len),
            total_len,
            is_binary,
        }
    }

    fn append(&mut self, spans: &WriteSpans<'_>) -> io::Result<()> {
        if self.buf.len() + spans.total_len() > self.total_len {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "outbound write exceeds declared message length",
            ));
        }
        for span in spans.iter() {
            self.buf.extend_from_slice(span);
        }
        Ok(())
    }

    fn is_complete(&self) -> bool {
        self.buf.len() == self.total_len
    }

    fn into_message(self) -> io::Result<Message> {
        if self.is_binary {
            Ok(Message::Binary(self.buf))
        } else {
            let text = String::from_utf8(self.buf).map_err(|e| {
                io::Error::new(io::ErrorKind::InvalidData, format!("invalid UTF-8: {e}"))
            })?;
            Ok(Message::Text(text))
        }
    }
}

/// Frame transport over an accepted WebSocket stream.
pub struct WsTransport<S> {
    ws: WebSocketStream<S>,
    chunk_size: usize,
    inbound: Option<InboundMessage>,
    outbound: Option<OutboundMessage>,
}

impl<S> WsTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wrap an accepted stream, delivering chunks of at most `chunk_size`
    /// bytes (normally the relay's echo buffer capacity).
    pub fn new(ws: WebSocketStream<S>, chunk_size: usize) -> Self {
        Self {
            ws,
            chunk_size,
            inbound: None,
            outbound: None,
        }
    }

    /// Send the assembled outbound message once all its bytes are in.
    async fn flush_outbound(&mut self) -> io::Result<()> {
        let complete = self.outbound.as_ref().is_some_and(OutboundMessage::is_complete);
        if complete {
            if let Some(message) = self.outbound.take() {
                let message = message.into_message()?;
                self.ws.send(message).await.map_err(ws_error_to_io)?;
            }
        }
        Ok(())
    }
}

impl<S> FrameTransport for WsTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    async fn read_chunk(&mut self) -> io::Result<Option<InboundChunk>> {
        loop {
            if let Some(message) = self.inbound.as_mut() {
                let chunk = message.next_chunk(self.chunk_size);
                if message.is_exhausted() {
                    self.inbound = None;
                }
                return Ok(Some(chunk));
            }

            match self.ws.next().await {
                None => return Ok(None),
                Some(Ok(Message::Text(s))) => {
                    self.inbound = Some(InboundMessage::text(s));
                }
                Some(Ok(Message::Binary(b))) => {
                    self.inbound = Some(InboundMessage::binary(b));
                }
                Some(Ok(Message::Ping(_))) => {
                    // The library queues the pong; push it out promptly.
                    self.ws.flush().await.map_err(ws_error_to_io)?;
                }
                Some(Ok(Message::Pong(_) | Message::Frame(_))) => {}
                Some(Ok(Message::Close(_))) => return Ok(None),
                Some(Err(WsError::ConnectionClosed | WsError::AlreadyClosed)) => {
                    return Ok(None);
                }
                Some(Err(e)) => return Err(ws_error_to_io(e)),
            }
        }
    }

    async fn write_message_first(
        &mut self,
        total_len: usize,
        spans: WriteSpans<'_>,
        last_frame: bool,
        is_binary: bool,
    ) -> io::Result<()> {
        if self.outbound.is_some() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "previous outbound message still incomplete",
            ));
        }
        // The message-oriented read side only ever hands the relay final
        // frames, so nothing upstream can ask for a non-final one here.
        debug_assert!(last_frame, "message transport carries final frames only");

        let mut message = OutboundMessage::new(total_len, is_binary);
        message.append(&spans)?;
        self.outbound = Some(message);
        self.flush_outbound().await
    }

    async fn write_message_continuation(&mut self, spans: WriteSpans<'_>) -> io::Result<()> {
        match self.outbound.as_mut() {
            Some(message) => message.append(&spans)?,
            None => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    "continuation write without an open outbound message",
                ));
            }
        }
        self.flush_outbound().await
    }

    async fn close(&mut self) -> io::Result<()> {
        match self.ws.close(None).await {
            Ok(()) | Err(WsError::ConnectionClosed | WsError::AlreadyClosed) => {}
            Err(e) => return Err(ws_error_to_io(e)),
        }

        // Drain until the peer's close frame (or the stream end) so the
        // handshake completes before the socket is dropped.
        while let Some(result) = self.ws.next().await {
            match result {
                Ok(_) => {}
                Err(WsError::ConnectionClosed | WsError::AlreadyClosed) => break,
                Err(e) => return Err(ws_error_to_io(e)),
            }
        }
        Ok(())
    }
}

fn ws_error_to_io(e: WsError) -> io::Error {
    match e {
        WsError::Io(e) => e,
        other => io::Error::other(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inbound_message_chunking() {
        let mut message = InboundMessage::binary(vec![9u8; 10]);

        let c1 = message.next_chunk(4);
        assert_eq!(c1.frame_length, 10);
        assert_eq!(c1.data.len(), 4);
        assert!(!c1.last_chunk);
        assert!(c1.last_frame);
        assert!(c1.is_binary);

        let c2 = message.next_chunk(4);
        assert_eq!(c2.data.len(), 4);
        assert!(!c2.last_chunk);

        let c3 = message.next_chunk(4);
        assert_eq!(c3.data.len(), 2);
        assert!(c3.last_chunk);
        assert!(message.is_exhausted());
    }

    #[test]
    fn test_inbound_small_message_is_one_chunk() {
        let mut message = InboundMessage::text("abc".to_string());

        let c = message.next_chunk(8);
        assert_eq!(c.frame_length, 3);
        assert_eq!(&c.data[..], b"abc");
        assert!(c.last_chunk);
        assert!(!c.is_binary);
        assert!(message.is_exhausted());
    }

    #[test]
    fn test_inbound_empty_message_emits_one_empty_chunk() {
        let mut message = InboundMessage::binary(Vec::new());

        let c = message.next_chunk(8);
        assert_eq!(c.frame_length, 0);
        assert!(c.data.is_empty());
        assert!(c.last_chunk);
        assert!(message.is_exhausted());
    }

    #[test]
    fn test_outbound_assembly() {
        let mut message = OutboundMessage::new(6, true);
        message.append(&WriteSpans::single(b"foo")).unwrap();
        assert!(!message.is_complete());

        message.append(&WriteSpans::single(b"bar")).unwrap();
        assert!(message.is_complete());

        match message.into_message().unwrap() {
            Message::Binary(b) => assert_eq!(b, b"foobar"),
            other => panic!("expected binary message, got {other:?}"),
        }
    }

    #[test]
    fn test_outbound_overflow_rejected() {
        let mut message = OutboundMessage::new(2, true);
        let err = message.append(&WriteSpans::single(b"toolong")).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn test_outbound_text_requires_utf8() {
        let mut message = OutboundMessage::new(2, false);
        message.append(&WriteSpans::single(&[0xff, 0xfe])).unwrap();
        assert!(message.into_message().is_err());
    }
}
