//! Source counters

use std::sync::atomic::{AtomicU64, Ordering};

/// Statistics for a source
#[derive(Debug, Default)]
pub struct SourceStats {
    /// Connections accepted and handed to detection
    pub connections_accepted: AtomicU64,
    /// Connections closed immediately because of the connection limit
    pub connections_rejected: AtomicU64,
    /// Connections that ended with an error
    pub connections_failed: AtomicU64,
    /// Connections closed, for any reason
    pub connections_closed: AtomicU64,
    /// PROXY headers parsed
    pub proxy_headers: AtomicU64,
    /// TLS sessions established
    pub tls_sessions: AtomicU64,
    /// Messages handed to the output
    pub records: AtomicU64,
}

/// Point-in-time copy of [`SourceStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub connections_accepted: u64,
    pub connections_rejected: u64,
    pub connections_failed: u64,
    pub connections_closed: u64,
    pub proxy_headers: u64,
    pub tls_sessions: u64,
    pub records: u64,
}

impl SourceStats {
    pub fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            connections_accepted: self.connections_accepted.load(Ordering::Relaxed),
            connections_rejected: self.connections_rejected.load(Ordering::Relaxed),
            connections_failed: self.connections_failed.load(Ordering::Relaxed),
            connections_closed: self.connections_closed.load(Ordering::Relaxed),
            proxy_headers: self.proxy_headers.load(Ordering::Relaxed),
            tls_sessions: self.tls_sessions.load(Ordering::Relaxed),
            records: self.records.load(Ordering::Relaxed),
        }
    }
}
