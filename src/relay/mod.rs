//! Echo relay core.
//!
//! Pure per-connection logic with no I/O of its own: the state machine in
//! [`state`] consumes chunk events and returns the read or write the
//! hosting adapter must perform next.

pub mod chunk;
pub mod spans;
pub mod state;

pub use chunk::FrameChunk;
pub use spans::WriteSpans;
pub use state::{EchoRelay, RelayAction, RelayError, WriteKind, WriteRequest};
