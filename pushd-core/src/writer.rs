//! Bounded per-session writer queue.
//!
//! The source spawns an unbounded goroutine per outbound message
//! (`go cli.PushMsg(...)`). That is an unbounded source of tasks under a
//! slow subscriber. Here a session owns one bounded `flume` channel; the
//! actor that drains it into the socket is the only writer, so sends to a
//! single subscriber stay FIFO. When the queue is full we apply a
//! documented close-session policy rather than blocking the publisher
//! (§9 design notes, scenario 9).

use bytes::Bytes;
use flume::{Receiver, Sender, TrySendError};

/// Default bound on a session's outbound queue.
pub const DEFAULT_WRITER_CAPACITY: usize = 256;

/// Handle held by the pub/sub core to push framed output at a session.
/// Cloning is cheap (it's just the sender half).
#[derive(Clone)]
pub struct SessionWriter {
    tx: Sender<Bytes>,
}

impl SessionWriter {
    /// Returns the handle plus the receiver the session's write-pump task
    /// drains into the socket.
    #[must_use]
    pub fn new(capacity: usize) -> (Self, Receiver<Bytes>) {
        let (tx, rx) = flume::bounded(capacity);
        (Self { tx }, rx)
    }

    /// Enqueue a frame. Returns `false` (backpressure drop) if the
    /// session's queue is full; the caller closes the session per policy
    /// rather than retrying or blocking.
    pub fn try_send(&self, frame: Bytes) -> bool {
        match self.tx.try_send(frame) {
            Ok(()) => true,
            Err(TrySendError::Full(_) | TrySendError::Disconnected(_)) => false,
        }
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.tx.is_disconnected()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overflow_reports_drop_without_blocking() {
        let (writer, _rx) = SessionWriter::new(1);
        assert!(writer.try_send(Bytes::from_static(b"a")));
        assert!(!writer.try_send(Bytes::from_static(b"b")));
    }
}
