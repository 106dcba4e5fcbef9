//! Cache Statistics
//!
//! Counters are process-wide and only ever reset explicitly, at the start of every
//! worker invocation, so that a reused process reports per-invocation deltas.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheHit {
    Memory,
    Buffer,
    LocalFile,
    Durable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheWrite {
    Buffer,
    LocalFile,
    Durable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheTimer {
    AcquireRead,
    AcquireModify,
    Release,
    Export,
}

#[derive(Debug, Default)]
pub struct CacheStatistics {
    mem_hits: AtomicU64,
    buffer_hits: AtomicU64,
    local_file_hits: AtomicU64,
    durable_hits: AtomicU64,
    buffer_writes: AtomicU64,
    local_file_writes: AtomicU64,
    durable_writes: AtomicU64,
    acquire_read_us: AtomicU64,
    acquire_modify_us: AtomicU64,
    release_us: AtomicU64,
    export_us: AtomicU64,
}

/// Point-in-time copy of the cache counters; times are in microseconds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStatisticsSnapshot {
    pub mem_hits: u64,
    pub buffer_hits: u64,
    pub local_file_hits: u64,
    pub durable_hits: u64,
    pub buffer_writes: u64,
    pub local_file_writes: u64,
    pub durable_writes: u64,
    pub acquire_read_us: u64,
    pub acquire_modify_us: u64,
    pub release_us: u64,
    pub export_us: u64,
}

impl CacheStatistics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_hit(&self, hit: CacheHit) {
        let counter = match hit {
            CacheHit::Memory => &self.mem_hits,
            CacheHit::Buffer => &self.buffer_hits,
            CacheHit::LocalFile => &self.local_file_hits,
            CacheHit::Durable => &self.durable_hits,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_write(&self, write: CacheWrite) {
        let counter = match write {
            CacheWrite::Buffer => &self.buffer_writes,
            CacheWrite::LocalFile => &self.local_file_writes,
            CacheWrite::Durable => &self.durable_writes,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_time(&self, timer: CacheTimer, elapsed: Duration) {
        let counter = match timer {
            CacheTimer::AcquireRead => &self.acquire_read_us,
            CacheTimer::AcquireModify => &self.acquire_modify_us,
            CacheTimer::Release => &self.release_us,
            CacheTimer::Export => &self.export_us,
        };
        counter.fetch_add(elapsed.as_micros() as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CacheStatisticsSnapshot {
        CacheStatisticsSnapshot {
            mem_hits: self.mem_hits.load(Ordering::Relaxed),
            buffer_hits: self.buffer_hits.load(Ordering::Relaxed),
            local_file_hits: self.local_file_hits.load(Ordering::Relaxed),
            durable_hits: self.durable_hits.load(Ordering::Relaxed),
            buffer_writes: self.buffer_writes.load(Ordering::Relaxed),
            local_file_writes: self.local_file_writes.load(Ordering::Relaxed),
            durable_writes: self.durable_writes.load(Ordering::Relaxed),
            acquire_read_us: self.acquire_read_us.load(Ordering::Relaxed),
            acquire_modify_us: self.acquire_modify_us.load(Ordering::Relaxed),
            release_us: self.release_us.load(Ordering::Relaxed),
            export_us: self.export_us.load(Ordering::Relaxed),
        }
    }

    pub fn reset(&self) {
        for counter in [
            &self.mem_hits,
            &self.buffer_hits,
            &self.local_file_hits,
            &self.durable_hits,
            &self.buffer_writes,
            &self.local_file_writes,
            &self.durable_writes,
            &self.acquire_read_us,
            &self.acquire_modify_us,
            &self.release_us,
            &self.export_us,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}
