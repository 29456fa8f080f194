//! Host configuration.

use crate::observability::TracingConfig;

/// Longest controller name accepted by default, in bytes.
pub const DEFAULT_MAX_NAME_LEN: usize = 128;

/// Configuration for a [`ControlHost`](super::ControlHost).
#[derive(Debug, Clone)]
pub struct HostConfig {
    /// Capacity of the event broadcast channel.
    pub event_capacity: usize,

    /// Longest accepted controller name, in bytes.
    pub max_name_len: usize,

    /// Span settings.
    pub tracing: TracingConfig,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            event_capacity: 256,
            max_name_len: DEFAULT_MAX_NAME_LEN,
            tracing: TracingConfig::default(),
        }
    }
}

impl HostConfig {
    /// Config with every span enabled, for debugging controllers.
    pub fn verbose() -> Self {
        Self {
            tracing: TracingConfig::all(),
            ..Default::default()
        }
    }

    /// Config with spans disabled and a small event buffer.
    pub fn quiet() -> Self {
        Self {
            event_capacity: 16,
            tracing: TracingConfig::none(),
            ..Default::default()
        }
    }

    /// Set the event channel capacity.
    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    /// Set the controller name limit.
    pub fn with_max_name_len(mut self, max: usize) -> Self {
        self.max_name_len = max;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets() {
        let config = HostConfig::default();
        assert_eq!(config.event_capacity, 256);
        assert_eq!(config.max_name_len, DEFAULT_MAX_NAME_LEN);

        assert!(HostConfig::verbose().tracing.hook_spans);
        assert!(!HostConfig::quiet().tracing.stream_spans);
    }

    #[test]
    fn test_builders() {
        let config = HostConfig::default()
            .with_event_capacity(8)
            .with_max_name_len(12);
        assert_eq!(config.event_capacity, 8);
        assert_eq!(config.max_name_len, 12);
    }
}
