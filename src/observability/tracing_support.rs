//! Tracing integration for structured logging and spans.

use crate::stream::StreamId;
use tracing::{Level, Span, span};

// `span!` needs a constant level.
macro_rules! span_at {
    ($level:expr, $($rest:tt)+) => {
        match $level {
            Level::ERROR => span!(Level::ERROR, $($rest)+),
            Level::WARN => span!(Level::WARN, $($rest)+),
            Level::INFO => span!(Level::INFO, $($rest)+),
            Level::DEBUG => span!(Level::DEBUG, $($rest)+),
            _ => span!(Level::TRACE, $($rest)+),
        }
    };
}

/// Configuration for tracing behavior.
#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// Whether to create spans around stream start and stop.
    pub stream_spans: bool,
    /// Whether to create spans around each controller hook.
    pub hook_spans: bool,
    /// Level of the spans created through this config.
    pub level: Level,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            stream_spans: true,
            hook_spans: false,
            level: Level::INFO,
        }
    }
}

impl TracingConfig {
    /// All spans enabled.
    pub fn all() -> Self {
        Self {
            stream_spans: true,
            hook_spans: true,
            level: Level::DEBUG,
        }
    }

    /// Disable all spans.
    pub fn none() -> Self {
        Self {
            stream_spans: false,
            hook_spans: false,
            level: Level::INFO,
        }
    }

    /// Span for a stream operation at `level`, or a disabled span.
    pub fn stream_span(&self, stream: StreamId, op: &'static str) -> Span {
        if self.stream_spans {
            span_at!(self.level, "stream", stream = %stream, op)
        } else {
            Span::none()
        }
    }

    /// Span for a controller hook at `level`, or a disabled span.
    pub fn hook_span(&self, controller: &str, hook: &str) -> Span {
        if self.hook_spans {
            span_at!(self.level, "controller", name = %controller, hook = %hook)
        } else {
            Span::none()
        }
    }
}

/// Create a span for a stream start or stop.
///
/// ```rust,ignore
/// let _guard = span_stream(stream, "start").entered();
/// ```
#[inline]
pub fn span_stream(stream: StreamId, op: &'static str) -> Span {
    span!(Level::INFO, "stream", stream = %stream, op)
}

/// Create a span for one controller hook call.
#[inline]
pub fn span_controller(controller: &str, hook: &str) -> Span {
    span!(Level::DEBUG, "controller", name = %controller, hook = %hook)
}
