//! # Application State Management
//!
//! Shared state accessed by every HTTP handler and every call session.
//!
//! ## Thread Safety Pattern:
//! Everything mutable lives behind Arc<RwLock<T>>: many handlers can read
//! the configuration or metrics simultaneously, one writer at a time updates
//! them. Values are cloned out of the lock so no lock is held while a
//! response is being built.

use crate::config::AppConfig;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Instant;

/// The main application state shared across all HTTP request handlers.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Application configuration (readable at runtime via the API)
    pub config: Arc<RwLock<AppConfig>>,

    /// Service counters, updated by middleware and by call sessions
    pub metrics: Arc<RwLock<BridgeMetrics>>,

    /// When the server started (never changes, safe to share directly)
    pub start_time: Instant,
}

/// Counters collected across HTTP requests and call sessions.
#[derive(Debug, Default)]
pub struct BridgeMetrics {
    /// Total number of HTTP requests processed since server start
    pub request_count: u64,

    /// Total number of request errors since server start
    pub error_count: u64,

    /// Calls currently bridged or negotiating
    pub active_sessions: u32,

    /// Calls that ran to a clean stop
    pub sessions_completed: u64,

    /// Calls torn down by a failure (transport, negotiation, timeout)
    pub sessions_failed: u64,

    /// Per-endpoint request statistics, keyed by "METHOD /path"
    pub endpoint_metrics: HashMap<String, EndpointMetric>,
}

/// Request statistics for a single API endpoint.
#[derive(Debug, Default, Clone)]
pub struct EndpointMetric {
    /// Number of requests to this specific endpoint
    pub request_count: u64,

    /// Total time spent processing requests to this endpoint (milliseconds)
    pub total_duration_ms: u64,

    /// Number of errors that occurred for this endpoint
    pub error_count: u64,
}

impl AppState {
    /// Create a new AppState with the given configuration.
    pub fn new(config: AppConfig) -> Self {
        Self {
            config: Arc::new(RwLock::new(config)),
            metrics: Arc::new(RwLock::new(BridgeMetrics::default())),
            start_time: Instant::now(),
        }
    }

    /// Get a copy of the current configuration.
    ///
    /// Cloning releases the lock immediately; AppConfig is cheap to clone.
    pub fn get_config(&self) -> AppConfig {
        self.config.read().unwrap().clone()
    }

    /// Increment the total request counter (called by middleware for every request).
    pub fn increment_request_count(&self) {
        let mut metrics = self.metrics.write().unwrap();
        metrics.request_count += 1;
    }

    /// Increment the total error counter (called when any request fails).
    pub fn increment_error_count(&self) {
        let mut metrics = self.metrics.write().unwrap();
        metrics.error_count += 1;
    }

    /// Record detailed metrics for a specific endpoint.
    pub fn record_endpoint_request(&self, endpoint: &str, duration_ms: u64, is_error: bool) {
        let mut metrics = self.metrics.write().unwrap();

        let endpoint_metric = metrics.endpoint_metrics.entry(endpoint.to_string()).or_default();

        endpoint_metric.request_count += 1;
        endpoint_metric.total_duration_ms += duration_ms;

        if is_error {
            endpoint_metric.error_count += 1;
        }
    }

    /// Register a new call session (telephony connection accepted).
    pub fn session_started(&self) {
        let mut metrics = self.metrics.write().unwrap();
        metrics.active_sessions += 1;
    }

    /// Register the end of a call session and its outcome.
    ///
    /// ## Safety check:
    /// The active counter is guarded against underflow; a decrement bug
    /// should skew a gauge, not panic the server.
    pub fn session_finished(&self, failed: bool) {
        let mut metrics = self.metrics.write().unwrap();
        if metrics.active_sessions > 0 {
            metrics.active_sessions -= 1;
        }
        if failed {
            metrics.sessions_failed += 1;
        } else {
            metrics.sessions_completed += 1;
        }
    }

    /// Get a snapshot of current metrics (used for the /metrics endpoint).
    ///
    /// ## Why a snapshot:
    /// Cloning under the read lock yields consistent numbers without holding
    /// the lock during HTTP response generation.
    pub fn get_metrics_snapshot(&self) -> BridgeMetrics {
        let metrics = self.metrics.read().unwrap();
        BridgeMetrics {
            request_count: metrics.request_count,
            error_count: metrics.error_count,
            active_sessions: metrics.active_sessions,
            sessions_completed: metrics.sessions_completed,
            sessions_failed: metrics.sessions_failed,
            endpoint_metrics: metrics.endpoint_metrics.clone(),
        }
    }

    /// Get server uptime in seconds.
    pub fn get_uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

impl EndpointMetric {
    /// Average response time for this endpoint in milliseconds.
    pub fn average_duration_ms(&self) -> f64 {
        if self.request_count > 0 {
            self.total_duration_ms as f64 / self.request_count as f64
        } else {
            0.0
        }
    }

    /// Error rate for this endpoint (0.0 to 1.0).
    pub fn error_rate(&self) -> f64 {
        if self.request_count > 0 {
            self.error_count as f64 / self.request_count as f64
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_lifecycle_counters() {
        let state = AppState::new(AppConfig::default());

        state.session_started();
        state.session_started();
        assert_eq!(state.get_metrics_snapshot().active_sessions, 2);

        state.session_finished(false);
        state.session_finished(true);
        let snapshot = state.get_metrics_snapshot();
        assert_eq!(snapshot.active_sessions, 0);
        assert_eq!(snapshot.sessions_completed, 1);
        assert_eq!(snapshot.sessions_failed, 1);

        // Extra finish must not underflow the gauge
        state.session_finished(false);
        assert_eq!(state.get_metrics_snapshot().active_sessions, 0);
    }

    #[test]
    fn test_endpoint_metrics_aggregation() {
        let state = AppState::new(AppConfig::default());

        state.record_endpoint_request("GET /health", 10, false);
        state.record_endpoint_request("GET /health", 30, true);

        let snapshot = state.get_metrics_snapshot();
        let metric = &snapshot.endpoint_metrics["GET /health"];
        assert_eq!(metric.request_count, 2);
        assert_eq!(metric.average_duration_ms(), 20.0);
        assert_eq!(metric.error_rate(), 0.5);
    }
}
