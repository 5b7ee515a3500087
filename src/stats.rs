//! Per-provider usage accounting
//!
//! Counters are owned by the router, one set per registered provider, and
//! updated lock-free on the call path. `request_count` counts successful
//! calls; failures land in `error_count`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Snapshot of a provider's usage counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UsageStats {
    /// Successful calls served
    pub request_count: u64,
    /// Failed calls (after retries were exhausted)
    pub error_count: u64,
    /// Units consumed across all successful calls
    pub total_units_consumed: u64,
    /// Running average latency of successful calls
    pub average_latency: Duration,
}

/// Lock-free counter set backing [`UsageStats`]
#[derive(Debug, Default)]
pub struct ProviderStats {
    request_count: AtomicU64,
    error_count: AtomicU64,
    total_units: AtomicU64,
    total_latency_micros: AtomicU64,
}

impl ProviderStats {
    /// Record a successful call
    pub fn record_success(&self, units: u64, latency: Duration) {
        self.request_count.fetch_add(1, Ordering::Relaxed);
        self.total_units.fetch_add(units, Ordering::Relaxed);
        self.total_latency_micros
            .fetch_add(latency.as_micros() as u64, Ordering::Relaxed);
    }

    /// Record a failed call
    pub fn record_error(&self) {
        self.error_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Current counter values
    pub fn snapshot(&self) -> UsageStats {
        let request_count = self.request_count.load(Ordering::Relaxed);
        let total_latency = self.total_latency_micros.load(Ordering::Relaxed);
        let average_latency = if request_count == 0 {
            Duration::ZERO
        } else {
            Duration::from_micros(total_latency / request_count)
        };
        UsageStats {
            request_count,
            error_count: self.error_count.load(Ordering::Relaxed),
            total_units_consumed: self.total_units.load(Ordering::Relaxed),
            average_latency,
        }
    }

    /// Zero every counter
    pub fn reset(&self) {
        self.request_count.store(0, Ordering::Relaxed);
        self.error_count.store(0, Ordering::Relaxed);
        self.total_units.store(0, Ordering::Relaxed);
        self.total_latency_micros.store(0, Ordering::Relaxed);
    }
}
