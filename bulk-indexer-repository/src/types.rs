//! Session options and statistics for bulk write sinks.

use std::ops::AddAssign;

/// How a session delivers writes to the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Every `write_one` is a synchronous round-trip; its error is the write's error.
    Immediate,
    /// Writes are queued and flushed in bulk by the session's own workers.
    Buffered,
}

/// Options for opening a sink session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionOptions {
    /// Delivery mode.
    pub mode: WriteMode,
    /// Number of internal flush workers. `None` uses the sink's configured default.
    pub num_workers: Option<usize>,
}

impl SessionOptions {
    /// Options for a session that writes each document in its own round-trip.
    pub fn immediate() -> Self {
        Self {
            mode: WriteMode::Immediate,
            num_workers: None,
        }
    }

    /// Options for a buffered session using the sink's default worker count.
    pub fn buffered() -> Self {
        Self {
            mode: WriteMode::Buffered,
            num_workers: None,
        }
    }

    /// Set the number of internal flush workers.
    pub fn with_workers(mut self, num_workers: usize) -> Self {
        self.num_workers = Some(num_workers);
        self
    }
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self::buffered()
    }
}

/// Counters reported by a session when it is closed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    /// Documents accepted by `write_one`.
    pub num_added: u64,
    /// Documents the backend confirmed as written.
    pub num_flushed: u64,
    /// Documents the backend rejected or that could not be flushed.
    pub num_failed: u64,
    /// Requests issued to the backend.
    pub num_requests: u64,
}

impl AddAssign for SessionStats {
    fn add_assign(&mut self, other: Self) {
        self.num_added += other.num_added;
        self.num_flushed += other.num_flushed;
        self.num_failed += other.num_failed;
        self.num_requests += other.num_requests;
    }
}
