//! Lock-free connection counters.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters updated by the reader and writer tasks.
#[derive(Debug, Default)]
pub(crate) struct Stats {
    pub frames_read: AtomicU64,
    pub bytes_read: AtomicU64,
    pub frames_written: AtomicU64,
    pub bytes_written: AtomicU64,
    pub heartbeats_received: AtomicU64,
    pub heartbeats_sent: AtomicU64,
    pub missed_heartbeats: AtomicU64,
}

/// Point-in-time copy of a connection's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConnectionStats {
    pub frames_read: u64,
    pub bytes_read: u64,
    pub frames_written: u64,
    pub bytes_written: u64,
    pub heartbeats_received: u64,
    pub heartbeats_sent: u64,
    pub missed_heartbeats: u64,
}

impl Stats {
    #[inline]
    pub fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> ConnectionStats {
        ConnectionStats {
            frames_read: self.frames_read.load(Ordering::Relaxed),
            bytes_read: self.bytes_read.load(Ordering::Relaxed),
            frames_written: self.frames_written.load(Ordering::Relaxed),
            bytes_written: self.bytes_written.load(Ordering::Relaxed),
            heartbeats_received: self.heartbeats_received.load(Ordering::Relaxed),
            heartbeats_sent: self.heartbeats_sent.load(Ordering::Relaxed),
            missed_heartbeats: self.missed_heartbeats.load(Ordering::Relaxed),
        }
    }
}
