//! Single-flight retry scheduling for the delivery queue.
//!
//! # States
//!
//! ```text
//!            enqueue / arm                timer fires
//!   ┌──────┐ ─────────────► ┌───────┐ ─────────────► ┌──────────┐
//!   │ Idle │                │ Armed │                │ Draining │
//!   └──────┘ ◄───────────── └───────┘ ◄───────────── └──────────┘
//!              queue empty               queue still non-empty
//! ```
//!
//! At most one drain is in flight and at most one timer is pending. The
//! delay before the next drain is `min(1s * 2^failures, 30s)`; a successful
//! delivery resets the failure count.
//!
//! [`QueueState`] holds only bookkeeping. Spawning timers and calling the
//! transport is the client's job, which keeps every transition here testable
//! without a network.

use std::time::Duration;
use tokio::task::AbortHandle;
use tracing::debug;

use crate::queue::{DeliveryQueue, LogEntry};

/// Delay after the first failure.
pub const BASE_RETRY_DELAY: Duration = Duration::from_millis(1_000);

/// Ceiling for the retry delay.
pub const MAX_RETRY_DELAY: Duration = Duration::from_millis(30_000);

/// `min(BASE_RETRY_DELAY * 2^consecutive_failures, MAX_RETRY_DELAY)`.
#[must_use]
pub fn backoff_delay(consecutive_failures: u32) -> Duration {
    let base = BASE_RETRY_DELAY.as_millis() as u64;
    let ceiling = MAX_RETRY_DELAY.as_millis() as u64;
    let millis = 2u64
        .checked_pow(consecutive_failures)
        .map_or(ceiling, |factor| base.saturating_mul(factor))
        .min(ceiling);
    Duration::from_millis(millis)
}

/// Whether a new drain timer may be scheduled.
#[must_use]
pub fn should_arm(queue_non_empty: bool, timer_pending: bool, is_processing: bool) -> bool {
    queue_non_empty && !timer_pending && !is_processing
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueuePhase {
    Idle,
    Armed,
    Draining,
}

#[derive(Debug)]
struct PendingTimer {
    id: u64,
    handle: AbortHandle,
}

/// Result of one drain attempt, as reported to the error channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrainReport {
    pub queue_length: usize,
    pub consecutive_failures: u32,
}

#[derive(Debug)]
pub struct QueueState {
    queue: DeliveryQueue,
    is_processing: bool,
    consecutive_failures: u32,
    pending_timer: Option<PendingTimer>,
    next_timer_id: u64,
}

impl QueueState {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            queue: DeliveryQueue::new(capacity),
            is_processing: false,
            consecutive_failures: 0,
            pending_timer: None,
            next_timer_id: 0,
        }
    }

    /// Admits `entry`, returning the evicted head if the queue was full.
    pub fn enqueue(&mut self, entry: LogEntry) -> Option<LogEntry> {
        self.queue.push(entry)
    }

    #[must_use]
    pub fn phase(&self) -> QueuePhase {
        if self.is_processing {
            QueuePhase::Draining
        } else if self.pending_timer.is_some() {
            QueuePhase::Armed
        } else {
            QueuePhase::Idle
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    #[must_use]
    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    #[must_use]
    pub fn queue(&self) -> &DeliveryQueue {
        &self.queue
    }

    /// Delay for the next drain, or `None` when arming is not allowed.
    #[must_use]
    pub fn arm_delay(&self) -> Option<Duration> {
        should_arm(
            !self.queue.is_empty(),
            self.pending_timer.is_some(),
            self.is_processing,
        )
        .then(|| backoff_delay(self.consecutive_failures))
    }

    /// Arms a timer through `spawn` if allowed. `spawn` receives the delay
    /// and the timer id, which the timer must present in [`Self::fire_timer`].
    pub fn arm<F>(&mut self, spawn: F) -> Option<Duration>
    where
        F: FnOnce(Duration, u64) -> AbortHandle,
    {
        let delay = self.arm_delay()?;
        let id = self.next_timer_id;
        self.next_timer_id += 1;
        let handle = spawn(delay, id);
        self.pending_timer = Some(PendingTimer { id, handle });
        debug!(
            "Retrying {} queued logs in {} ms",
            self.queue.len(),
            delay.as_millis()
        );
        Some(delay)
    }

    /// Called by a timer that woke up. Clears the slot if `id` is still the
    /// pending timer; a stale timer gets false and must do nothing.
    pub fn fire_timer(&mut self, id: u64) -> bool {
        match self.pending_timer {
            Some(ref timer) if timer.id == id => {
                self.pending_timer = None;
                true
            }
            _ => false,
        }
    }

    /// Aborts and clears any pending timer.
    pub fn cancel_timer(&mut self) {
        if let Some(timer) = self.pending_timer.take() {
            timer.handle.abort();
        }
    }

    /// Enters `Draining` and returns a copy of the head entry.
    ///
    /// The head stays queued for the duration of the attempt. Returns `None`
    /// when a drain is already running or there is nothing to send.
    pub fn begin_drain(&mut self) -> Option<LogEntry> {
        if self.is_processing {
            return None;
        }
        let head = self.queue.front()?.clone();
        self.is_processing = true;
        Some(head)
    }

    /// Leaves `Draining` after the attempt on `entry`.
    ///
    /// Success removes the entry and resets the failure count. Failure moves
    /// the entry to the tail (retry-rotate), so one bad entry cannot hold up
    /// the others, and counts the failure. An entry evicted by admission
    /// control while in flight stays gone.
    pub fn complete_drain(&mut self, entry: &LogEntry, delivered: bool) -> DrainReport {
        self.is_processing = false;
        if delivered {
            self.queue.remove(entry.seq);
            self.consecutive_failures = 0;
        } else {
            self.queue.rotate_to_back(entry.seq);
            self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        }
        DrainReport {
            queue_length: self.queue.len(),
            consecutive_failures: self.consecutive_failures,
        }
    }
}
