//! Reactor observability: shared counters and a periodic reporter thread.
//!
//! Counters hang off a cloneable per-reactor handle instead of process-wide
//! statics, so several reactors in one process (the integration tests run
//! them concurrently) never see each other's traffic.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::config::REPORT_INTERVAL_SECS;

#[derive(Default)]
struct Counters {
    connections_accepted: AtomicU64,
    connections_closed: AtomicU64,
    bytes_read: AtomicU64,
    accept_errors: AtomicU64,
    read_errors: AtomicU64,
    wakeups: AtomicU64,
}

/// Counter handle for one reactor. Cheap to clone; all clones share the same
/// counters. Updates are relaxed: one add per drained syscall batch, read
/// only by the reporter and by tests.
#[derive(Clone, Default)]
pub struct Stats {
    inner: Arc<Counters>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub connections_accepted: u64,
    pub connections_closed: u64,
    pub bytes_read: u64,
    pub accept_errors: u64,
    pub read_errors: u64,
    pub wakeups: u64,
}

impl Stats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc_accepted(&self) {
        self.inner.connections_accepted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_closed(&self) {
        self.inner.connections_closed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_bytes_read(&self, n: u64) {
        self.inner.bytes_read.fetch_add(n, Ordering::Relaxed);
    }

    pub fn inc_accept_errors(&self) {
        self.inner.accept_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_read_errors(&self) {
        self.inner.read_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_wakeups(&self) {
        self.inner.wakeups.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            connections_accepted: self.inner.connections_accepted.load(Ordering::Relaxed),
            connections_closed: self.inner.connections_closed.load(Ordering::Relaxed),
            bytes_read: self.inner.bytes_read.load(Ordering::Relaxed),
            accept_errors: self.inner.accept_errors.load(Ordering::Relaxed),
            read_errors: self.inner.read_errors.load(Ordering::Relaxed),
            wakeups: self.inner.wakeups.load(Ordering::Relaxed),
        }
    }
}

/// Spawn a detached thread printing a delta line every reporting interval,
/// for as long as the process lives.
pub fn spawn_reporter(stats: Stats) {
    std::thread::spawn(move || {
        let mut last = stats.snapshot();
        loop {
            std::thread::sleep(Duration::from_secs(REPORT_INTERVAL_SECS));
            let snap = stats.snapshot();
            println!(
                "stats delta {}s: accepted={} closed={} bytes_read={} | errors: accept={} read={} | wakeups={}",
                REPORT_INTERVAL_SECS,
                snap.connections_accepted - last.connections_accepted,
                snap.connections_closed - last.connections_closed,
                snap.bytes_read - last.bytes_read,
                snap.accept_errors - last.accept_errors,
                snap.read_errors - last.read_errors,
                snap.wakeups - last.wakeups,
            );
            last = snap;
        }
    });
}
