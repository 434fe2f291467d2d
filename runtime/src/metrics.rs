//! Prometheus metrics for observability and monitoring.
//!
//! This module provides metric collection for the service components:
//! - Entity store reads, commits and conflicts
//! - Transaction retries
//! - Registration outcomes and seat movement
//! - Post-commit effect execution
//! - Announcement refreshes
//!
//! # Example
//!
//! ```rust,no_run
//! use conference_runtime::metrics::MetricsServer;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut server = MetricsServer::new("0.0.0.0:9090".parse()?);
//! server.start()?;
//!
//! if let Some(text) = server.render() {
//!     println!("{text}");
//! }
//! # Ok(())
//! # }
//! ```

use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

// Re-export metrics macros for use in other modules
pub use metrics::{counter, gauge, histogram};

/// Errors from metrics operations.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to build metrics exporter
    #[error("Failed to build metrics exporter: {0}")]
    Build(String),
    /// Failed to install metrics exporter
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
}

/// Prometheus metrics recorder.
///
/// Installs the global recorder and renders the scrape text on demand. The
/// address is where the embedding server is expected to expose `/metrics`.
pub struct MetricsServer {
    addr: SocketAddr,
    handle: Option<PrometheusHandle>,
}

impl MetricsServer {
    /// Create a new metrics server.
    ///
    /// # Arguments
    ///
    /// * `addr` - Socket address metrics are published on (e.g., `0.0.0.0:9090`)
    #[must_use]
    pub const fn new(addr: SocketAddr) -> Self {
        Self { addr, handle: None }
    }

    /// Register metric descriptions and install the Prometheus recorder.
    ///
    /// # Errors
    ///
    /// Returns error if the exporter cannot be built or installed.
    ///
    /// # Note
    ///
    /// If a recorder is already installed (e.g., by another test), this logs a
    /// warning and succeeds without a handle.
    pub fn start(&mut self) -> Result<(), MetricsError> {
        register_metrics();

        let builder = PrometheusBuilder::new()
            .set_buckets_for_metric(
                Matcher::Suffix("duration_seconds".to_string()),
                &[
                    0.0005, 0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5,
                ],
            )
            .map_err(|e| MetricsError::Build(e.to_string()))?;

        match builder.install_recorder() {
            Ok(handle) => {
                self.handle = Some(handle);
                tracing::info!(addr = %self.addr, "Metrics recorder installed");
                Ok(())
            },
            Err(e) => {
                let err_msg = e.to_string();
                if err_msg.contains("already initialized") {
                    tracing::warn!("Metrics recorder already initialized, skipping re-initialization");
                    Ok(())
                } else {
                    Err(MetricsError::Install(err_msg))
                }
            },
        }
    }

    /// Render current metrics in Prometheus format.
    ///
    /// Returns `None` if this instance did not install the recorder.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(PrometheusHandle::render)
    }
}

/// Register all metric descriptions.
fn register_metrics() {
    // Entity Store Metrics
    describe_counter!(
        "store_commits_total",
        "Total number of transaction commits applied"
    );
    describe_counter!(
        "store_conflicts_total",
        "Total number of commits rejected by a version conflict"
    );
    describe_counter!("store_reads_total", "Total number of entity reads");
    describe_histogram!(
        "store_commit_duration_seconds",
        "Time taken to validate and apply a change set"
    );

    // Retry Metrics
    describe_counter!("retry_attempts_total", "Total number of retry attempts");
    describe_counter!(
        "retry_successes_total",
        "Total number of operations that succeeded after retrying"
    );
    describe_counter!(
        "retry_exhausted_total",
        "Total number of operations that exhausted max retries"
    );

    // Registration Metrics
    describe_counter!(
        "registrations_total",
        "Registration attempts by outcome"
    );
    describe_counter!(
        "unregistrations_total",
        "Unregistration attempts by outcome"
    );
    describe_histogram!(
        "registration_duration_seconds",
        "Time taken by a registration including retries"
    );

    // Effect Metrics
    describe_counter!("effects_executed_total", "Total number of effects executed");
    describe_counter!("effects_failed_total", "Total number of effects that failed");

    // Announcement Metrics
    describe_counter!(
        "announcement_refreshes_total",
        "Total number of announcement recomputations"
    );
    describe_gauge!(
        "announcement_nearly_full_conferences",
        "Conferences listed in the current announcement"
    );
}

/// Entity store metrics recorder.
pub struct StoreMetrics;

impl StoreMetrics {
    /// Record an entity read.
    pub fn record_read() {
        counter!("store_reads_total").increment(1);
    }

    /// Record a committed change set.
    pub fn record_commit(writes: usize, duration: Duration) {
        counter!("store_commits_total").increment(1);
        counter!("store_writes_total").increment(writes as u64);
        histogram!("store_commit_duration_seconds").record(duration.as_secs_f64());
    }

    /// Record a commit rejected by a version conflict.
    pub fn record_conflict() {
        counter!("store_conflicts_total").increment(1);
    }
}

/// Retry metrics recorder.
pub struct RetryMetrics;

impl RetryMetrics {
    /// Record a retry attempt.
    pub fn record_attempt() {
        counter!("retry_attempts_total").increment(1);
    }

    /// Record a successful retry.
    pub fn record_success() {
        counter!("retry_successes_total").increment(1);
    }

    /// Record exhausted retries.
    pub fn record_exhausted() {
        counter!("retry_exhausted_total").increment(1);
    }
}

/// Registration metrics recorder.
pub struct RegistrationMetrics;

impl RegistrationMetrics {
    /// Record a registration attempt with its outcome label
    /// (`ok`, `already_registered`, `no_seats`, `error`).
    pub fn record_register(outcome: &'static str, duration: Duration) {
        counter!("registrations_total", "outcome" => outcome).increment(1);
        histogram!("registration_duration_seconds").record(duration.as_secs_f64());
    }

    /// Record an unregistration attempt with its outcome label
    /// (`ok`, `not_registered`, `error`).
    pub fn record_unregister(outcome: &'static str) {
        counter!("unregistrations_total", "outcome" => outcome).increment(1);
    }
}

/// Effect metrics recorder.
pub struct EffectMetrics;

impl EffectMetrics {
    /// Record an effect execution by type.
    pub fn record_execution(kind: &'static str) {
        counter!("effects_executed_total", "type" => kind).increment(1);
    }

    /// Record an effect failure.
    pub fn record_failure() {
        counter!("effects_failed_total").increment(1);
    }
}

/// Announcement metrics recorder.
pub struct AnnouncementMetrics;

impl AnnouncementMetrics {
    /// Record a recomputation and how many conferences it listed.
    #[allow(clippy::cast_precision_loss)]
    pub fn record_refresh(listed: usize) {
        counter!("announcement_refreshes_total").increment(1);
        gauge!("announcement_nearly_full_conferences").set(listed as f64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_starts_without_handle() {
        let addr = "127.0.0.1:0".parse().unwrap();
        let server = MetricsServer::new(addr);
        assert!(server.render().is_none());
    }

    #[test]
    fn recorded_metrics_are_rendered() {
        let addr = "127.0.0.1:0".parse().unwrap();
        let mut server = MetricsServer::new(addr);
        server.start().unwrap();

        StoreMetrics::record_commit(2, Duration::from_millis(3));
        StoreMetrics::record_conflict();
        RegistrationMetrics::record_register("ok", Duration::from_millis(5));
        RetryMetrics::record_attempt();

        // Another test may have installed the recorder first; then this
        // instance has no handle but metrics are still recorded.
        if let Some(rendered) = server.render() {
            assert!(rendered.contains("store_commits_total"));
            assert!(rendered.contains("store_conflicts_total"));
            assert!(rendered.contains("registrations_total"));
            assert!(rendered.contains("retry_attempts_total"));
        }
    }
}
