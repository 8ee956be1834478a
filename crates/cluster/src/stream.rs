//! The log stream collaborator.
//!
//! The durable log is produced and transported outside this crate; replay
//! only needs a bounded, in-order read cursor over it. [`LogStream`] is that
//! seam. Production backs it with the replicated transport; tests use
//! [`testing::InMemoryLogStream`](crate::testing::InMemoryLogStream).

/// Per-fragment verdict returned by a controlled poll handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlledPollAction {
    /// Frame consumed; keep delivering.
    Continue,
    /// Frame consumed; stop this poll after it.
    Break,
    /// Frame NOT consumed; stop and leave the cursor where it was.
    Abort,
}

/// Bounded, in-order read cursor over the durable log.
pub trait LogStream {
    /// Current read position in the log.
    fn position(&self) -> i64;

    /// Whether the stream has been closed by its producer (end of log or
    /// leader transition).
    fn is_closed(&self) -> bool;

    /// Deliver whole frames in order to `on_fragment`, stopping at
    /// `bound_position`, after `fragment_limit` frames, or when the handler
    /// says so. The position passed to the handler is the log position at
    /// the end of that frame. Returns the number of frames consumed.
    fn bounded_controlled_poll(
        &mut self,
        on_fragment: &mut dyn FnMut(&[u8], i64) -> ControlledPollAction,
        bound_position: i64,
        fragment_limit: usize,
    ) -> usize;

    /// Detach a transport destination, if the transport supports it.
    fn remove_destination(&mut self, destination: &str);

    /// Release the underlying subscription. Safe during teardown even if
    /// the log was never fully consumed.
    fn close(&mut self);
}
