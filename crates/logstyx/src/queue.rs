//! Bounded FIFO of entries waiting for (re)delivery.
//!
//! # Admission
//!
//! The queue never grows past its capacity. Pushing into a full queue evicts
//! the oldest entry first and hands it back to the caller, which reports it
//! through the error-notification channel. Old logs are lost under a long
//! outage; memory stays bounded.

use serde::Serialize;
use std::collections::VecDeque;
use tracing::warn;

use crate::level::Level;
use crate::Record;

/// Queue capacity used when none is configured.
pub const DEFAULT_MAX_LOG_IN_QUEUE: usize = 12;

/// One normalized log record awaiting delivery.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogEntry {
    #[serde(skip)]
    pub(crate) seq: u64,
    pub level: Level,
    pub data: Record,
}

impl LogEntry {
    #[must_use]
    pub fn new(level: Level, data: Record) -> Self {
        Self {
            seq: 0,
            level,
            data,
        }
    }
}

#[derive(Debug)]
pub struct DeliveryQueue {
    entries: VecDeque<LogEntry>,
    capacity: usize,
    next_seq: u64,
}

impl DeliveryQueue {
    /// A zero capacity is raised to 1; config validation rejects it earlier.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
            next_seq: 0,
        }
    }

    /// Appends `entry` at the tail, evicting and returning the head when full.
    pub fn push(&mut self, mut entry: LogEntry) -> Option<LogEntry> {
        let dropped = if self.entries.len() >= self.capacity {
            let dropped = self.entries.pop_front();
            if let Some(ref d) = dropped {
                warn!(
                    "Delivery queue full ({} entries), dropping oldest {} log",
                    self.capacity, d.level
                );
            }
            dropped
        } else {
            None
        };

        entry.seq = self.next_seq;
        self.next_seq += 1;
        self.entries.push_back(entry);
        dropped
    }

    #[must_use]
    pub fn front(&self) -> Option<&LogEntry> {
        self.entries.front()
    }

    /// Removes the entry with sequence number `seq`, wherever it is.
    pub(crate) fn remove(&mut self, seq: u64) -> Option<LogEntry> {
        let index = self.entries.iter().position(|e| e.seq == seq)?;
        self.entries.remove(index)
    }

    /// Moves the entry with sequence number `seq` to the tail.
    ///
    /// Returns false when the entry is no longer queued.
    pub(crate) fn rotate_to_back(&mut self, seq: u64) -> bool {
        match self.remove(seq) {
            Some(entry) => {
                self.entries.push_back(entry);
                true
            }
            None => false,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn iter(&self) -> impl Iterator<Item = &LogEntry> {
        self.entries.iter()
    }
}

impl Default for DeliveryQueue {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_LOG_IN_QUEUE)
    }
}
