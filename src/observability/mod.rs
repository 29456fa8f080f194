//! Observability features: metrics and tracing.
//!
//! | Metric | Type | Description |
//! |--------|------|-------------|
//! | `streamknob_queries_accepted` | Counter | Parameter queries accepted |
//! | `streamknob_queries_rejected` | Counter | Queries naming an unknown target |
//! | `streamknob_callbacks_invoked` | Counter | Parameter callbacks that ran |
//! | `streamknob_callback_signature_mismatch` | Counter | Callbacks skipped for their shape |
//! | `streamknob_hook_failures` | Counter | Controller hooks that returned a failure |
//!
//! Spans are emitted for stream start/stop and, when enabled in
//! [`TracingConfig`], for each controller hook.

mod metrics;
mod tracing_support;

pub use metrics::{
    init_metrics, record_callback_invoked, record_hook_failure, record_query_accepted,
    record_query_rejected, record_signature_mismatch,
};
pub use tracing_support::{TracingConfig, span_controller, span_stream};
