//! # Connection Health Tracking
//!
//! Side channel recording whether the cache backend is reachable. Health
//! state never blocks operations (every call still attempts the backend and
//! fails open); it exists to throttle alerting so a dead backend produces
//! one alert per quiet interval instead of one per request.

use crate::error::CacheError;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, error};

/// Default quiet interval between repeated unhealthy-backend alerts.
pub const DEFAULT_QUIET_INTERVAL: Duration = Duration::from_secs(300);

/// Mutable health record for one cache backend.
#[derive(Debug)]
pub struct ConnectionHealth {
    connected: AtomicBool,
    consecutive_failures: AtomicU64,
    last_failure_at: Mutex<Option<Instant>>,
    last_alert_at: Mutex<Option<Instant>>,
    quiet_interval: Duration,
}

/// Point-in-time view of connection health, for status documents.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionHealthSnapshot {
    pub connected: bool,
    pub consecutive_failures: u64,
    pub last_failure_at: Option<DateTime<Utc>>,
}

impl ConnectionHealth {
    pub fn new(quiet_interval: Duration) -> Self {
        Self {
            connected: AtomicBool::new(true),
            consecutive_failures: AtomicU64::new(0),
            last_failure_at: Mutex::new(None),
            last_alert_at: Mutex::new(None),
            quiet_interval,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Record a successful backend round-trip.
    pub fn record_success(&self) {
        let was_connected = self.connected.swap(true, Ordering::AcqRel);
        self.consecutive_failures.store(0, Ordering::Release);

        if !was_connected {
            *self.last_alert_at.lock() = None;
            tracing::info!("🟢 Cache backend connection recovered");
        }
    }

    /// Record a failed backend round-trip.
    ///
    /// Cluster "moved" redirects are expected to self-heal and are logged at
    /// debug without flipping the connected flag. True connectivity failures
    /// alert once on the healthy-to-unhealthy transition, then at most once
    /// per quiet interval.
    pub fn record_failure(&self, operation: &str, err: &CacheError) {
        if err.is_moved() {
            debug!(operation = operation, error = %err, "Cache cluster redirect (self-healing)");
            return;
        }

        let failures = self.consecutive_failures.fetch_add(1, Ordering::AcqRel) + 1;
        let was_connected = self.connected.swap(false, Ordering::AcqRel);
        *self.last_failure_at.lock() = Some(Instant::now());

        if self.should_alert(was_connected) {
            error!(
                operation = operation,
                consecutive_failures = failures,
                error = %err,
                "🔴 Cache backend unreachable"
            );
        } else {
            debug!(
                operation = operation,
                consecutive_failures = failures,
                error = %err,
                "Cache backend still unreachable (alert throttled)"
            );
        }
    }

    fn should_alert(&self, was_connected: bool) -> bool {
        let mut last_alert = self.last_alert_at.lock();
        let due = was_connected
            || last_alert.map_or(true, |at| at.elapsed() >= self.quiet_interval);
        if due {
            *last_alert = Some(Instant::now());
        }
        due
    }

    pub fn snapshot(&self) -> ConnectionHealthSnapshot {
        let last_failure_at = self.last_failure_at.lock().map(|at| {
            // Instants carry no calendar meaning; re-anchor against now.
            Utc::now()
                - chrono::Duration::from_std(at.elapsed()).unwrap_or_else(|_| chrono::Duration::zero())
        });

        ConnectionHealthSnapshot {
            connected: self.is_connected(),
            consecutive_failures: self.consecutive_failures.load(Ordering::Acquire),
            last_failure_at,
        }
    }
}

impl Default for ConnectionHealth {
    fn default() -> Self {
        Self::new(DEFAULT_QUIET_INTERVAL)
    }
}
