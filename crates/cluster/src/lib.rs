//! Log replay and timer service for the Lodestone consensus module.
//!
//! Cluster correctness rests on every replica applying the exact same
//! sequence of typed events, with the exact same timer behavior, even under
//! backpressure and after restart from a snapshot. This crate owns the two
//! pieces that make that deterministic:
//!
//! - [`LogAdapter`]: a bounded read cursor over the durable log. Each poll
//!   decodes at most [`FRAGMENT_LIMIT`] frames up to a position ceiling and
//!   dispatches them, strictly in order, to a [`ClusterEventHandler`].
//!   Replay halts immediately after a cluster action frame is dispatched.
//!
//! - [`TimerService`]: deadline-ordered logical timers addressed by
//!   correlation id. A fired timer is only consumed once the handler
//!   durably records it; under backpressure it stays pending and is
//!   re-offered on the next poll. Pending timers survive restart via
//!   [`TimerService::snapshot`].
//!
//! # Architecture
//!
//! Both components are synchronous and single-threaded, driven by the
//! consensus agent's duty-cycle loop:
//!
//! ```text
//! log stream ──frames──▶ LogAdapter ──typed calls──▶ ClusterEventHandler
//!                                                         │
//! TimerService ◀──schedule / cancel──────────────────────┘
//!      │
//!      └──poll(now) ──timer fired──▶ ClusterEventHandler (bool: consumed?)
//! ```
//!
//! All poll calls are bounded and return promptly even when more work
//! remains, so log replay, timer expiry, and housekeeping can be
//! interleaved without starving each other.

mod adapter;
mod handler;
mod index;
mod stream;
pub mod testing;
mod timer_service;
mod wheel;

pub use adapter::{on_fragment, LogAdapter, FRAGMENT_LIMIT};
pub use handler::{ClusterEventHandler, SnapshotWriter};
pub use stream::{ControlledPollAction, LogStream};
pub use timer_service::{TimerService, TIMER_POLL_LIMIT};
pub use wheel::{DeadlineTimerWheel, TimerId};

// Wire types that appear in the handler trait's signatures.
pub use lodestone_codec::{ChangeType, ClusterAction, CloseReason, CodecError, LogEvent};

/// Errors that abort log replay.
///
/// There is deliberately nothing recoverable here. A replica that cannot
/// decode its own durable log is desynchronized from the cluster and needs
/// operator intervention; skipping bytes would only corrupt state further.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClusterError {
    /// A log frame could not be trusted (schema mismatch or corrupt frame).
    #[error("cannot replay log frame: {0}")]
    Protocol(#[from] CodecError),
}
