//! Metrics definitions.
//!
//! Prometheus naming conventions: `signet_` prefix, `_total` suffix for
//! counters, `_seconds` suffix for duration histograms. Label sets are
//! bounded to prevent cardinality explosion:
//! - `status`: 2 values (success, error)
//! - `trigger`: 2 values (scheduled, forced)

use metrics::{counter, gauge, histogram};
use std::time::Duration;

/// Record token issuance duration and outcome.
///
/// Metric: `signet_token_issuance_duration_seconds`, `signet_token_issuance_total`
/// Labels: `status`
pub fn record_token_issuance(status: &str, duration: Duration) {
    histogram!("signet_token_issuance_duration_seconds", "status" => status.to_string())
        .record(duration.as_secs_f64());

    counter!("signet_token_issuance_total", "status" => status.to_string()).increment(1);
}

/// Record a key rotation event.
///
/// Metric: `signet_key_rotation_total`
/// Labels: `trigger` (scheduled, forced)
pub fn record_key_rotation(trigger: &str) {
    counter!("signet_key_rotation_total", "trigger" => trigger.to_string()).increment(1);
}

/// Record a prune pass that advanced the retention boundary.
///
/// Metric: `signet_key_prune_total`
pub fn record_key_prune() {
    counter!("signet_key_prune_total").increment(1);
}

/// Record a failed periodic maintenance pass.
///
/// Metric: `signet_key_maintenance_failures_total`
pub fn record_maintenance_failure() {
    counter!("signet_key_maintenance_failures_total").increment(1);
}

/// Update the latest signing key version gauge.
///
/// Metric: `signet_latest_key_version`
pub fn set_latest_key_version(version: u32) {
    gauge!("signet_latest_key_version").set(f64::from(version));
}
