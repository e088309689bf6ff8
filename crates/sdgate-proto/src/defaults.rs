//! Tunable operational defaults for the gateway.
//!
//! Protocol-level constants (wire format, object sizes, magic numbers)
//! remain in [`crate::constants`]. This module centralizes the
//! configurable defaults that can be overridden via CLI flags.

// ─── Network ────────────────────────────────────────────────────────────────

/// Default bind address for the client listener.
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0";

/// Seconds allowed to finish reading a request payload or writing a response.
pub const DEFAULT_IO_TIMEOUT_SECS: u64 = 30;

/// Seconds a connection may sit idle between requests before it is closed.
pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 600;

/// Seconds in-flight connections get to finish after shutdown is requested.
pub const DEFAULT_DRAIN_TIMEOUT_SECS: u64 = 10;

/// Largest payload accepted on a single request (bytes). 64 MB.
/// Protects against corrupt `data_length` fields on the wire.
pub const DEFAULT_MAX_PAYLOAD: u32 = 64 * 1024 * 1024;

// ─── Storage ────────────────────────────────────────────────────────────────

/// Replica writes allowed to fail before a write is reported as failed.
pub const DEFAULT_ALLOWED_WRITE_FAILURES: usize = 0;

/// Capacity unit used to derive a location weight from its size (16 MB).
pub const DEFAULT_WEIGHT_UNIT: u64 = 16 * 1024 * 1024;

// ─── Cache ──────────────────────────────────────────────────────────────────

/// Default number of entries held by the LRU cache.
pub const DEFAULT_CACHE_ENTRIES: usize = 1024;

// ─── Cluster ────────────────────────────────────────────────────────────────

/// Starting cluster epoch.
pub const DEFAULT_EPOCH: u32 = 1;

/// Name of the lock file held by the local cluster driver.
pub const DEFAULT_LOCK_FILE: &str = "sdgate.lock";
