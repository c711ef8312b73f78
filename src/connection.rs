//! Connection lifecycle adapter.
//!
//! Owns one relay per connection and bridges it to a [`FrameTransport`]:
//! read a chunk, hand it to the relay, perform whatever single I/O
//! operation the relay requests, report the completion, repeat. The loop
//! structure itself guarantees that at most one outbound write is in
//! flight and that the next read is only issued after the previous write
//! completed.

use std::io;
use std::time::Duration;

use tokio::time::timeout;
use tracing::trace;

use crate::config::Timeouts;
use crate::relay::{EchoRelay, RelayAction, RelayError, WriteKind, WriteRequest};
use crate::transport::FrameTransport;

/// Per-connection failure, local to that connection.
#[derive(Debug)]
pub enum ConnectionError {
    /// Inbound transport failure other than clean end-of-stream.
    Read(io::Error),
    /// Outbound write could not be submitted or did not complete.
    Write(io::Error),
    /// The hosting layer violated the relay's chunk contract.
    Relay(RelayError),
}

impl std::fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionError::Read(e) => write!(f, "read failed: {e}"),
            ConnectionError::Write(e) => write!(f, "write failed: {e}"),
            ConnectionError::Relay(e) => write!(f, "relay contract violation: {e}"),
        }
    }
}

impl std::error::Error for ConnectionError {}

impl From<RelayError> for ConnectionError {
    fn from(e: RelayError) -> Self {
        ConnectionError::Relay(e)
    }
}

/// Drive one connection's echo relay until the peer closes or an error
/// tears the connection down.
///
/// The body-read timeout bounds the wait for further chunks of a frame
/// that is already partially relayed; an idle connection waits for its
/// next message indefinitely. The response timeout bounds each outbound
/// write.
pub async fn run<T: FrameTransport>(
    transport: &mut T,
    capacity: usize,
    timeouts: &Timeouts,
) -> Result<(), ConnectionError> {
    let mut relay = EchoRelay::new(capacity);
    // Arms the state machine; the first read request is performed below.
    relay.on_connect();

    loop {
        let read = if relay.is_mid_frame() {
            match timeout(timeouts.body_read, transport.read_chunk()).await {
                Ok(result) => result,
                Err(_) => Err(io::Error::new(
                    io::ErrorKind::TimedOut,
                    "timed out waiting for the next frame chunk",
                )),
            }
        } else {
            transport.read_chunk().await
        };

        let chunk = match read {
            Ok(Some(chunk)) => chunk,
            Ok(None) => {
                relay.on_eof();
                trace!("peer ended the stream");
                return Ok(());
            }
            Err(e) => {
                relay.on_read_error();
                return Err(ConnectionError::Read(e));
            }
        };

        match relay.on_chunk(chunk.frame_chunk())? {
            RelayAction::Read => {}
            RelayAction::Write(request) => {
                let outcome = submit_write(transport, request, timeouts.response).await;
                match relay.on_write_complete(outcome.is_ok()) {
                    RelayAction::Read => {}
                    _ => {
                        let e = outcome
                            .err()
                            .unwrap_or_else(|| io::Error::other("write failed"));
                        return Err(ConnectionError::Write(e));
                    }
                }
            }
            RelayAction::Close => return Ok(()),
        }
    }
}

/// Submit one outbound write, bounded by the response timeout.
async fn submit_write<T: FrameTransport>(
    transport: &mut T,
    request: WriteRequest<'_>,
    response_timeout: Duration,
) -> io::Result<()> {
    let WriteRequest { spans, kind } = request;
    let write = async {
        match kind {
            WriteKind::First {
                total_len,
                last_frame,
                is_binary,
            } => {
                transport
                    .write_message_first(total_len, spans, last_frame, is_binary)
                    .await
            }
            WriteKind::Continuation => transport.write_message_continuation(spans).await,
        }
    };

    match timeout(response_timeout, write).await {
        Ok(result) => result,
        Err(_) => Err(io::Error::new(
            io::ErrorKind::TimedOut,
            "outbound write timed out",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::InboundChunk;
    use bytes::Bytes;
    use std::collections::VecDeque;

    #[derive(Debug, PartialEq, Eq)]
    enum RecordedWrite {
        First {
            total_len: usize,
            last_frame: bool,
            is_binary: bool,
            payload: Vec<u8>,
        },
        Continuation {
            payload: Vec<u8>,
        },
    }

    /// Transport that serves scripted chunks and records every write.
    struct ScriptedTransport {
        incoming: VecDeque<io::Result<Option<InboundChunk>>>,
        writes: Vec<RecordedWrite>,
        fail_writes: bool,
    }

    impl ScriptedTransport {
        fn new(incoming: Vec<io::Result<Option<InboundChunk>>>) -> Self {
            Self {
                incoming: incoming.into(),
                writes: Vec::new(),
                fail_writes: false,
            }
        }
    }

    impl FrameTransport for ScriptedTransport {
        async fn read_chunk(&mut self) -> io::Result<Option<InboundChunk>> {
            self.incoming.pop_front().unwrap_or(Ok(None))
        }

        async fn write_message_first(
            &mut self,
            total_len: usize,
            spans: crate::relay::WriteSpans<'_>,
            last_frame: bool,
            is_binary: bool,
        ) -> io::Result<()> {
            if self.fail_writes {
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, "peer gone"));
            }
            let mut payload = Vec::new();
            for span in spans.iter() {
                payload.extend_from_slice(span);
            }
            self.writes.push(RecordedWrite::First {
                total_len,
                last_frame,
                is_binary,
                payload,
            });
            Ok(())
        }

        async fn write_message_continuation(
            &mut self,
            spans: crate::relay::WriteSpans<'_>,
        ) -> io::Result<()> {
            if self.fail_writes {
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, "peer gone"));
            }
            let mut payload = Vec::new();
            for span in spans.iter() {
                payload.extend_from_slice(span);
            }
            self.writes.push(RecordedWrite::Continuation { payload });
            Ok(())
        }

        async fn close(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn chunk_in(
        frame_length: usize,
        data: &[u8],
        last_chunk: bool,
        is_binary: bool,
    ) -> io::Result<Option<InboundChunk>> {
        Ok(Some(InboundChunk {
            frame_length,
            data: Bytes::copy_from_slice(data),
            last_chunk,
            last_frame: true,
            is_binary,
        }))
    }

    const CAP: usize = 8;

    #[tokio::test]
    async fn test_small_text_message_round_trip() {
        let mut transport =
            ScriptedTransport::new(vec![chunk_in(3, b"abc", true, false), Ok(None)]);

        run(&mut transport, CAP, &Timeouts::default()).await.unwrap();

        assert_eq!(
            transport.writes,
            vec![RecordedWrite::First {
                total_len: 3,
                last_frame: true,
                is_binary: false,
                payload: b"abc".to_vec(),
            }]
        );
    }

    #[tokio::test]
    async fn test_multi_chunk_buffered_message_is_one_write() {
        let mut transport = ScriptedTransport::new(vec![
            chunk_in(6, b"foo", false, true),
            chunk_in(6, b"bar", true, true),
            Ok(None),
        ]);

        run(&mut transport, CAP, &Timeouts::default()).await.unwrap();

        assert_eq!(
            transport.writes,
            vec![RecordedWrite::First {
                total_len: 6,
                last_frame: true,
                is_binary: true,
                payload: b"foobar".to_vec(),
            }]
        );
    }

    #[tokio::test]
    async fn test_large_message_streams_per_chunk() {
        let head = vec![5u8; CAP];
        let mut transport = ScriptedTransport::new(vec![
            chunk_in(CAP + 2, &head, false, true),
            chunk_in(CAP + 2, b"xy", true, true),
            Ok(None),
        ]);

        run(&mut transport, CAP, &Timeouts::default()).await.unwrap();

        assert_eq!(
            transport.writes,
            vec![
                RecordedWrite::First {
                    total_len: CAP + 2,
                    last_frame: true,
                    is_binary: true,
                    payload: head,
                },
                RecordedWrite::Continuation {
                    payload: b"xy".to_vec(),
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_consecutive_messages_echo_in_order() {
        let big = vec![1u8; CAP + 1];
        let mut transport = ScriptedTransport::new(vec![
            chunk_in(2, b"hi", true, false),
            chunk_in(CAP + 1, &big, true, true),
            chunk_in(2, b"ok", true, false),
            Ok(None),
        ]);

        run(&mut transport, CAP, &Timeouts::default()).await.unwrap();

        assert_eq!(transport.writes.len(), 3);
        assert!(matches!(
            &transport.writes[0],
            RecordedWrite::First { payload, .. } if payload == b"hi"
        ));
        assert!(matches!(
            &transport.writes[1],
            RecordedWrite::First { total_len, .. } if *total_len == CAP + 1
        ));
        assert!(matches!(
            &transport.writes[2],
            RecordedWrite::First { payload, .. } if payload == b"ok"
        ));
    }

    #[tokio::test]
    async fn test_clean_eof_is_not_an_error() {
        let mut transport = ScriptedTransport::new(vec![Ok(None)]);

        run(&mut transport, CAP, &Timeouts::default()).await.unwrap();

        assert!(transport.writes.is_empty());
    }

    #[tokio::test]
    async fn test_read_error_tears_down() {
        let mut transport = ScriptedTransport::new(vec![Err(io::Error::new(
            io::ErrorKind::ConnectionReset,
            "reset",
        ))]);

        let err = run(&mut transport, CAP, &Timeouts::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ConnectionError::Read(_)));
        assert!(transport.writes.is_empty());
    }

    #[tokio::test]
    async fn test_write_failure_stops_further_reads() {
        let mut transport = ScriptedTransport::new(vec![
            chunk_in(2, b"hi", true, true),
            chunk_in(2, b"no", true, true),
        ]);
        transport.fail_writes = true;

        let err = run(&mut transport, CAP, &Timeouts::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ConnectionError::Write(_)));

        // The second scripted chunk was never read.
        assert_eq!(transport.incoming.len(), 1);
    }

    #[tokio::test]
    async fn test_contract_violation_surfaces_relay_error() {
        // Chunks exceeding the declared frame length overrun the buffer.
        let mut transport = ScriptedTransport::new(vec![
            chunk_in(4, b"abc", false, true),
            chunk_in(4, b"def", true, true),
        ]);

        let err = run(&mut transport, 4, &Timeouts::default())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ConnectionError::Relay(RelayError::ChunkOverflow { .. })
        ));
    }
}
