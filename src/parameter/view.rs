//! Read-only access to the parameter store.

use super::store::{ParameterInfo, ParameterStore, SubscribeFlags};
use super::value::{ParameterType, ParameterValue};
use crate::controller::{Callback, UserContext};
use crate::error::Result;
use crate::stream::StreamId;
use std::ops::ControlFlow;
use std::sync::Arc;

/// What a controller sees of the parameter store.
///
/// Values can be read, iterated and subscribed to. Changing one goes
/// through [`set`](Self::set), which only asks the owning filter. Creating,
/// pushing and the start bookkeeping stay with the filters and the host.
///
/// ```compile_fail
/// use streamknob::prelude::*;
///
/// let host = ControlHost::default();
/// let view = host.parameters();
/// view.set_filter_started(StreamId::new(1), "F1", true);
/// ```
#[derive(Clone)]
pub struct ParameterView {
    store: Arc<ParameterStore>,
}

impl ParameterView {
    pub(crate) fn new(store: Arc<ParameterStore>) -> Self {
        Self { store }
    }

    /// Current value of a parameter.
    pub fn value(&self, stream: StreamId, filter: &str, name: &str) -> Result<ParameterValue> {
        self.store.value(stream, filter, name)
    }

    /// Declared type of a parameter.
    pub fn parameter_type(&self, stream: StreamId, filter: &str, name: &str) -> Result<ParameterType> {
        self.store.parameter_type(stream, filter, name)
    }

    /// Whether the host has started a filter.
    pub fn is_filter_started(&self, stream: StreamId, filter: &str) -> Result<bool> {
        self.store.is_filter_started(stream, filter)
    }

    /// Ask the owning filter to change a parameter.
    ///
    /// See [`ParameterStore::set`].
    pub fn set(
        &self,
        stream: StreamId,
        filter: &str,
        name: &str,
        ty: ParameterType,
        value: ParameterValue,
    ) -> Result<bool> {
        self.store.set(stream, filter, name, ty, value)
    }

    /// Fire `callback` on every push of the matching parameters.
    ///
    /// See [`ParameterStore::subscribe`].
    #[allow(clippy::too_many_arguments)]
    pub fn subscribe(
        &self,
        stream: StreamId,
        filter: &str,
        name: Option<&str>,
        ty: ParameterType,
        callback: Callback,
        context: UserContext,
        flags: SubscribeFlags,
    ) -> Result<usize> {
        self.store
            .subscribe(stream, filter, name, ty, callback, context, flags)
    }

    /// Number of live subscriptions on a parameter.
    pub fn subscription_count(&self, stream: StreamId, filter: &str, name: &str) -> Result<usize> {
        self.store.subscription_count(stream, filter, name)
    }

    /// Visit every matching parameter. See [`ParameterStore::for_each`].
    pub fn for_each<F>(
        &self,
        stream: Option<StreamId>,
        filter: Option<&str>,
        name: Option<&str>,
        ty: ParameterType,
        f: F,
    ) -> usize
    where
        F: FnMut(&ParameterInfo) -> ControlFlow<()>,
    {
        self.store.for_each(stream, filter, name, ty, f)
    }
}

impl std::fmt::Debug for ParameterView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("ParameterView").field(&self.store).finish()
    }
}
