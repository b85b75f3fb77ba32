//! Server sizing and operational configuration.
//!
//! Hardcoded values only; nothing here is a wire or protocol constant.

/// Per-invocation read scratch buffer size (bytes). Stack-allocated inside the
/// read-drain loop, so keep it modest.
pub const READ_BUF_SIZE: usize = 1024;

/// Max ready events consumed per epoll_wait call. A larger batch only changes
/// how many wakeups a burst is spread over, not what gets delivered.
pub const MAX_EVENTS: usize = 64;

/// Max concurrent connections per reactor. Slab keys must fit in the low
/// 32 bits of the epoll token.
pub const MAX_CONNECTIONS: usize = 4096;

/// Seconds between metrics reporter lines.
pub const REPORT_INTERVAL_SECS: u64 = 10;

// Compile-time sanity checks
const _: () = assert!(
    MAX_CONNECTIONS <= u32::MAX as usize,
    "MAX_CONNECTIONS must fit in u32 (low half of the epoll token)"
);
const _: () = assert!(MAX_EVENTS > 0, "epoll batch must hold at least one event");
const _: () = assert!(READ_BUF_SIZE > 0, "read scratch buffer cannot be empty");
