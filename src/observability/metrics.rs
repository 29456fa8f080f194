//! Metrics collection using metrics-rs.
//!
//! Counters go to whatever recorder the application installs; without one
//! they are no-ops.

use metrics::{Unit, counter};
use std::sync::atomic::{AtomicBool, Ordering};

static METRICS_INITIALIZED: AtomicBool = AtomicBool::new(false);

const QUERIES_ACCEPTED: &str = "streamknob_queries_accepted";
const QUERIES_REJECTED: &str = "streamknob_queries_rejected";
const CALLBACKS_INVOKED: &str = "streamknob_callbacks_invoked";
const SIGNATURE_MISMATCH: &str = "streamknob_callback_signature_mismatch";
const HOOK_FAILURES: &str = "streamknob_hook_failures";

/// Initialize metrics descriptions.
///
/// Safe to call multiple times; only the first call does anything.
pub fn init_metrics() {
    if METRICS_INITIALIZED.swap(true, Ordering::SeqCst) {
        return;
    }

    metrics::describe_counter!(
        QUERIES_ACCEPTED,
        Unit::Count,
        "Parameter queries accepted by a controller handle"
    );
    metrics::describe_counter!(
        QUERIES_REJECTED,
        Unit::Count,
        "Parameter queries naming an unknown stream, filter or parameter"
    );
    metrics::describe_counter!(
        CALLBACKS_INVOKED,
        Unit::Count,
        "Parameter callbacks that ran"
    );
    metrics::describe_counter!(
        SIGNATURE_MISMATCH,
        Unit::Count,
        "Parameter callbacks skipped because they do not take five inputs"
    );
    metrics::describe_counter!(
        HOOK_FAILURES,
        Unit::Count,
        "Controller hooks that returned a failure"
    );
}

/// Record an accepted parameter query.
#[inline]
pub fn record_query_accepted(filter: &str, parameter: &str) {
    counter!(QUERIES_ACCEPTED, "filter" => filter.to_string(), "parameter" => parameter.to_string())
        .increment(1);
}

/// Record a rejected parameter query.
#[inline]
pub fn record_query_rejected(filter: &str, parameter: &str) {
    counter!(QUERIES_REJECTED, "filter" => filter.to_string(), "parameter" => parameter.to_string())
        .increment(1);
}

/// Record a callback invocation.
#[inline]
pub fn record_callback_invoked(filter: &str, parameter: &str) {
    counter!(CALLBACKS_INVOKED, "filter" => filter.to_string(), "parameter" => parameter.to_string())
        .increment(1);
}

/// Record a callback skipped for its shape.
#[inline]
pub fn record_signature_mismatch(filter: &str, parameter: &str) {
    counter!(SIGNATURE_MISMATCH, "filter" => filter.to_string(), "parameter" => parameter.to_string())
        .increment(1);
}

/// Record a failed controller hook.
#[inline]
pub fn record_hook_failure(controller: &str, hook: &str) {
    counter!(HOOK_FAILURES, "controller" => controller.to_string(), "hook" => hook.to_string())
        .increment(1);
}
