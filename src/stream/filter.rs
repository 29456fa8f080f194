//! Filters and their runtime context.
//!
//! The context gives a filter access to its own parameters while it runs.
//! It is scoped to one (stream, filter) pair, so a filter can only create
//! and publish parameters it owns.

use super::StreamId;
use crate::error::Result;
use crate::parameter::{ParameterStore, ParameterType, ParameterValue, Setter};
use std::sync::Arc;

/// Run state of a filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FilterState {
    /// Never started, or vetoed at the last start.
    #[default]
    Idle,
    /// Started and flowing.
    Started,
    /// Stopped after running.
    Stopped,
    /// `start` returned an error.
    Failed,
}

/// A node in a stream.
///
/// All methods default to doing nothing.
pub trait Filter: Send {
    /// Called once when the stream is added to a host. Parameters are
    /// usually created here.
    fn construct(&mut self, ctx: &FilterContext) -> Result<()> {
        let _ = ctx;
        Ok(())
    }

    /// Called when the stream starts, unless a controller vetoed it.
    fn start(&mut self, ctx: &FilterContext) -> Result<()> {
        let _ = ctx;
        Ok(())
    }

    /// Called when the stream stops, for filters that started.
    fn stop(&mut self, ctx: &FilterContext) -> Result<()> {
        let _ = ctx;
        Ok(())
    }
}

/// Runtime context for a filter.
#[derive(Clone)]
pub struct FilterContext {
    stream: StreamId,
    name: Arc<str>,
    store: Arc<ParameterStore>,
}

impl FilterContext {
    pub(crate) fn new(stream: StreamId, name: &str, store: Arc<ParameterStore>) -> Self {
        Self {
            stream,
            name: Arc::from(name),
            store,
        }
    }

    /// The stream this filter belongs to.
    pub fn stream(&self) -> StreamId {
        self.stream
    }

    /// The filter's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Create a read-only parameter.
    pub fn create_parameter(
        &self,
        name: &str,
        ty: ParameterType,
        initial: ParameterValue,
    ) -> Result<()> {
        self.store
            .create(self.stream, &self.name, name, ty, initial, None)
    }

    /// Create a parameter that accepts set requests through `setter`.
    pub fn create_parameter_with_setter<F>(
        &self,
        name: &str,
        ty: ParameterType,
        initial: ParameterValue,
        setter: F,
    ) -> Result<()>
    where
        F: FnMut(&ParameterValue, &ParameterValue) -> Option<ParameterValue> + Send + 'static,
    {
        let setter: Setter = Box::new(setter);
        self.store
            .create(self.stream, &self.name, name, ty, initial, Some(setter))
    }

    /// Publish a new value of one of this filter's parameters.
    pub fn push(&self, name: &str, value: impl Into<ParameterValue>) -> Result<usize> {
        self.store.push(self.stream, &self.name, name, value.into())
    }

    /// Current value of one of this filter's parameters.
    pub fn value(&self, name: &str) -> Result<ParameterValue> {
        self.store.value(self.stream, &self.name, name)
    }
}

impl std::fmt::Debug for FilterContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilterContext")
            .field("stream", &self.stream)
            .field("name", &self.name)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::Dispatcher;
    use crate::error::Error;
    use crate::host::ControlEventSender;

    fn context() -> FilterContext {
        let store = Arc::new(ParameterStore::new(Dispatcher::new(ControlEventSender::new(8))));
        let stream = StreamId::new(3);
        store.register_stream(stream);
        store.register_filter(stream, "tone").unwrap();
        FilterContext::new(stream, "tone", store)
    }

    #[test]
    fn test_context_accessors() {
        let ctx = context();
        assert_eq!(ctx.stream(), StreamId::new(3));
        assert_eq!(ctx.name(), "tone");
    }

    #[test]
    fn test_create_and_push() {
        let ctx = context();
        ctx.create_parameter("freq", ParameterType::Double, 440.0.into())
            .unwrap();
        assert_eq!(ctx.push("freq", 880.0).unwrap(), 0);
        assert_eq!(ctx.value("freq").unwrap(), ParameterValue::Double(880.0));
    }

    #[test]
    fn test_setter_parameter() {
        let ctx = context();
        ctx.create_parameter_with_setter("amp", ParameterType::Double, 0.5.into(), |req, _| {
            Some(req.clone())
        })
        .unwrap();
        let store = ctx.store.clone();
        assert!(store
            .set(ctx.stream(), "tone", "amp", ParameterType::Any, 0.25.into())
            .unwrap());
        assert_eq!(ctx.value("amp").unwrap(), ParameterValue::Double(0.25));
    }

    #[test]
    fn test_push_wrong_type() {
        let ctx = context();
        ctx.create_parameter("freq", ParameterType::Double, 440.0.into())
            .unwrap();
        assert!(matches!(
            ctx.push("freq", "loud"),
            Err(Error::TypeMismatch { .. })
        ));
    }
}
