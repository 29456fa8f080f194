//! Shared parameter store.
//!
//! Parameters are keyed stream → filter → name. The owning filter creates
//! and pushes values; controllers only read them, either one-shot through
//! [`Controller::get_parameter`](crate::controller::Controller::get_parameter)
//! or persistently through [`ParameterView::subscribe`](super::ParameterView::subscribe).
//! Every mutating operation is crate-private: filters reach them through
//! their [`FilterContext`](crate::stream::FilterContext), the host does the
//! rest.
//!
//! Callbacks are never invoked while the store lock is held, so a callback
//! may call back into the store.

use super::value::{ParameterType, ParameterValue};
use crate::controller::{Callback, Delivery, DispatchOutcome, Dispatcher, QueryError, UserContext};
use crate::error::{Error, Result};
use crate::stream::StreamId;
use std::collections::{BTreeMap, HashMap};
use std::ops::{BitOr, ControlFlow};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Owner hook deciding what a set request does.
///
/// Called with the requested value and the current value. Returning
/// `Some(v)` publishes `v` to subscribers; `None` ignores the request.
pub type Setter = Box<dyn FnMut(&ParameterValue, &ParameterValue) -> Option<ParameterValue> + Send>;

/// Options for [`ParameterStore::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SubscribeFlags(u8);

impl SubscribeFlags {
    /// No options.
    pub const NONE: SubscribeFlags = SubscribeFlags(0);
    /// Keep the subscription when the stream stops.
    pub const KEEP_AT_RESTART: SubscribeFlags = SubscribeFlags(0b01);
    /// Do not add the same callback twice to one parameter.
    pub const KEEP_ONE: SubscribeFlags = SubscribeFlags(0b10);

    /// Whether all bits of `other` are set.
    pub fn contains(self, other: SubscribeFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for SubscribeFlags {
    type Output = SubscribeFlags;

    fn bitor(self, rhs: SubscribeFlags) -> SubscribeFlags {
        SubscribeFlags(self.0 | rhs.0)
    }
}

/// Description of a parameter, as seen by [`ParameterStore::for_each`].
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterInfo {
    /// Stream the owner filter belongs to.
    pub stream: StreamId,
    /// Owner filter name.
    pub filter: String,
    /// Parameter name.
    pub name: String,
    /// Declared type.
    pub ty: ParameterType,
    /// Value at the time of the snapshot.
    pub value: ParameterValue,
}

/// A resolved query target.
#[derive(Debug, Clone)]
pub(crate) struct Resolved {
    pub(crate) started: bool,
    pub(crate) value: ParameterValue,
}

struct Subscription {
    id: u64,
    callback: Callback,
    context: UserContext,
    keep_at_restart: bool,
}

struct Parameter {
    ty: ParameterType,
    value: ParameterValue,
    setter: Option<Arc<Mutex<Setter>>>,
    subscriptions: Vec<Subscription>,
}

#[derive(Default)]
struct FilterEntry {
    started: bool,
    parameters: BTreeMap<String, Parameter>,
}

type StreamMap = HashMap<StreamId, BTreeMap<String, FilterEntry>>;

/// Registry of every filter parameter known to a host session.
pub struct ParameterStore {
    streams: RwLock<StreamMap>,
    dispatcher: Dispatcher,
    next_subscription: AtomicU64,
}

impl ParameterStore {
    /// Create an empty store delivering through `dispatcher`.
    pub(crate) fn new(dispatcher: Dispatcher) -> Self {
        Self {
            streams: RwLock::new(HashMap::new()),
            dispatcher,
            next_subscription: AtomicU64::new(0),
        }
    }

    /// The dispatcher used for every callback.
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    fn read(&self) -> RwLockReadGuard<'_, StreamMap> {
        self.streams.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, StreamMap> {
        self.streams.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make a stream known to the store.
    pub(crate) fn register_stream(&self, stream: StreamId) {
        self.write().entry(stream).or_default();
    }

    /// Forget a stream and every parameter in it.
    pub(crate) fn remove_stream(&self, stream: StreamId) -> bool {
        self.write().remove(&stream).is_some()
    }

    /// Make a filter known to the store.
    pub(crate) fn register_filter(&self, stream: StreamId, filter: &str) -> Result<()> {
        let mut streams = self.write();
        let filters = streams
            .get_mut(&stream)
            .ok_or(Error::UnknownStream(stream))?;
        if filters.contains_key(filter) {
            return Err(Error::DuplicateFilter(filter.to_string()));
        }
        filters.insert(filter.to_string(), FilterEntry::default());
        Ok(())
    }

    /// Forget a filter and its parameters.
    pub(crate) fn remove_filter(&self, stream: StreamId, filter: &str) -> Result<()> {
        let mut streams = self.write();
        let filters = streams
            .get_mut(&stream)
            .ok_or(Error::UnknownStream(stream))?;
        filters
            .remove(filter)
            .map(|_| ())
            .ok_or_else(|| Error::UnknownFilter(filter.to_string()))
    }

    /// Record whether a filter has started.
    pub(crate) fn set_filter_started(&self, stream: StreamId, filter: &str, started: bool) -> Result<()> {
        let mut streams = self.write();
        let entry = filter_entry_mut(&mut streams, stream, filter)?;
        entry.started = started;
        Ok(())
    }

    /// Whether a filter has started.
    pub fn is_filter_started(&self, stream: StreamId, filter: &str) -> Result<bool> {
        let streams = self.read();
        Ok(filter_entry(&streams, stream, filter)?.started)
    }

    /// Create a parameter owned by `filter`.
    ///
    /// Parameters cannot be added while the filter is started.
    pub(crate) fn create(
        &self,
        stream: StreamId,
        filter: &str,
        name: &str,
        ty: ParameterType,
        initial: ParameterValue,
        setter: Option<Setter>,
    ) -> Result<()> {
        let mut streams = self.write();
        let entry = filter_entry_mut(&mut streams, stream, filter)?;
        if entry.started {
            return Err(Error::StreamRunning(stream));
        }
        if entry.parameters.contains_key(name) {
            return Err(Error::ParameterExists {
                filter: filter.to_string(),
                name: name.to_string(),
            });
        }
        check_type(filter, name, ty, &initial)?;

        entry.parameters.insert(
            name.to_string(),
            Parameter {
                ty,
                value: initial,
                setter: setter.map(|s| Arc::new(Mutex::new(s))),
                subscriptions: Vec::new(),
            },
        );
        tracing::debug!(%stream, filter, parameter = name, %ty, "parameter created");
        Ok(())
    }

    /// Current value of a parameter.
    pub fn value(&self, stream: StreamId, filter: &str, name: &str) -> Result<ParameterValue> {
        let streams = self.read();
        Ok(parameter(&streams, stream, filter, name)?.value.clone())
    }

    /// Declared type of a parameter.
    pub fn parameter_type(&self, stream: StreamId, filter: &str, name: &str) -> Result<ParameterType> {
        let streams = self.read();
        Ok(parameter(&streams, stream, filter, name)?.ty)
    }

    pub(crate) fn resolve(
        &self,
        stream: StreamId,
        filter: &str,
        name: &str,
    ) -> std::result::Result<Resolved, QueryError> {
        let streams = self.read();
        let filters = streams
            .get(&stream)
            .ok_or(QueryError::UnknownStream(stream))?;
        let entry = filters
            .get(filter)
            .ok_or_else(|| QueryError::UnknownFilter(filter.to_string()))?;
        let p = entry
            .parameters
            .get(name)
            .ok_or_else(|| QueryError::UnknownParameter {
                filter: filter.to_string(),
                name: name.to_string(),
            })?;
        Ok(Resolved {
            started: entry.started,
            value: p.value.clone(),
        })
    }

    /// Ask the owner to change a parameter.
    ///
    /// This is only a request: the owner's setter decides the new value and
    /// may ignore it. Returns whether a new value was published.
    pub fn set(
        &self,
        stream: StreamId,
        filter: &str,
        name: &str,
        ty: ParameterType,
        value: ParameterValue,
    ) -> Result<bool> {
        let (setter, current) = {
            let streams = self.read();
            let p = parameter(&streams, stream, filter, name)?;
            if !p.ty.accepts(ty) {
                return Err(Error::TypeMismatch {
                    filter: filter.to_string(),
                    name: name.to_string(),
                    actual: p.ty,
                    requested: ty,
                });
            }
            (p.setter.clone(), p.value.clone())
        };

        let Some(setter) = setter else {
            tracing::debug!(%stream, filter, parameter = name, "parameter has no setter; request ignored");
            return Ok(false);
        };

        let accepted = {
            let mut setter = setter.lock().unwrap_or_else(PoisonError::into_inner);
            (*setter)(&value, &current)
        };

        match accepted {
            Some(new_value) => {
                self.push(stream, filter, name, new_value)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Publish a new value to every subscriber.
    ///
    /// Called by the owning filter. Subscriptions whose callback returns
    /// nonzero are removed. Returns the number of callbacks that ran.
    pub(crate) fn push(
        &self,
        stream: StreamId,
        filter: &str,
        name: &str,
        value: ParameterValue,
    ) -> Result<usize> {
        let subscribers: Vec<(u64, Callback, UserContext)> = {
            let mut streams = self.write();
            let p = parameter_mut(&mut streams, stream, filter, name)?;
            check_type(filter, name, p.ty, &value)?;
            p.value = value.clone();
            p.subscriptions
                .iter()
                .map(|s| (s.id, s.callback.clone(), s.context.clone()))
                .collect()
        };

        let mut invoked = 0;
        let mut finished = Vec::new();
        for (id, callback, context) in &subscribers {
            let delivery = Delivery {
                value: &value,
                stream,
                filter,
                parameter: name,
                context,
            };
            match self.dispatcher.dispatch(callback, &delivery) {
                DispatchOutcome::Invoked(code) => {
                    invoked += 1;
                    if code != 0 {
                        finished.push(*id);
                    }
                }
                DispatchOutcome::Panicked => finished.push(*id),
                DispatchOutcome::SignatureMismatch { .. } => {}
            }
        }

        if !finished.is_empty() {
            let mut streams = self.write();
            if let Ok(p) = parameter_mut(&mut streams, stream, filter, name) {
                p.subscriptions.retain(|s| !finished.contains(&s.id));
            }
        }

        Ok(invoked)
    }

    /// Register a callback fired on every push of the matching parameters.
    ///
    /// With `name == None` every parameter of the filter whose type is
    /// accepted by `ty` is subscribed. Returns the number of parameters the
    /// callback was added to.
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
        let mut streams = self.write();
        let entry = filter_entry_mut(&mut streams, stream, filter)?;

        let names: Vec<String> = match name {
            Some(name) => {
                let p = entry
                    .parameters
                    .get(name)
                    .ok_or_else(|| Error::UnknownParameter {
                        filter: filter.to_string(),
                        name: name.to_string(),
                    })?;
                if !p.ty.accepts(ty) {
                    return Err(Error::TypeMismatch {
                        filter: filter.to_string(),
                        name: name.to_string(),
                        actual: p.ty,
                        requested: ty,
                    });
                }
                vec![name.to_string()]
            }
            None => entry
                .parameters
                .iter()
                .filter(|(_, p)| p.ty.accepts(ty))
                .map(|(n, _)| n.clone())
                .collect(),
        };

        let mut added = 0;
        for n in names {
            let Some(p) = entry.parameters.get_mut(&n) else {
                continue;
            };
            if flags.contains(SubscribeFlags::KEEP_ONE)
                && p.subscriptions.iter().any(|s| s.callback.ptr_eq(&callback))
            {
                continue;
            }
            p.subscriptions.push(Subscription {
                id: self.next_subscription.fetch_add(1, Ordering::Relaxed),
                callback: callback.clone(),
                context: context.clone(),
                keep_at_restart: flags.contains(SubscribeFlags::KEEP_AT_RESTART),
            });
            added += 1;
        }
        Ok(added)
    }

    /// Number of live subscriptions on a parameter.
    pub fn subscription_count(&self, stream: StreamId, filter: &str, name: &str) -> Result<usize> {
        let streams = self.read();
        Ok(parameter(&streams, stream, filter, name)?.subscriptions.len())
    }

    /// Drop every subscription in `stream` not marked `KEEP_AT_RESTART`.
    ///
    /// Returns the number removed.
    pub(crate) fn remove_callbacks_for_restart(&self, stream: StreamId) -> usize {
        let mut streams = self.write();
        let Some(filters) = streams.get_mut(&stream) else {
            return 0;
        };
        let mut removed = 0;
        for entry in filters.values_mut() {
            for p in entry.parameters.values_mut() {
                let before = p.subscriptions.len();
                p.subscriptions.retain(|s| s.keep_at_restart);
                removed += before - p.subscriptions.len();
            }
        }
        removed
    }

    /// Visit every parameter matching the given filters.
    ///
    /// `None` for `stream`, `filter` or `name` matches everything; `ty`
    /// matches as in [`ParameterType::accepts`]. Parameters are visited in
    /// stream, filter and name order. Returning `ControlFlow::Break` stops
    /// the walk. Returns the number of times `f` was called.
    pub fn for_each<F>(
        &self,
        stream: Option<StreamId>,
        filter: Option<&str>,
        name: Option<&str>,
        ty: ParameterType,
        mut f: F,
    ) -> usize
    where
        F: FnMut(&ParameterInfo) -> ControlFlow<()>,
    {
        let snapshot: Vec<ParameterInfo> = {
            let streams = self.read();
            let mut ids: Vec<StreamId> = streams.keys().copied().collect();
            ids.sort();

            let mut infos = Vec::new();
            for id in ids.into_iter().filter(|id| stream.is_none_or(|s| s == *id)) {
                let Some(filters) = streams.get(&id) else {
                    continue;
                };
                for (filter_name, entry) in filters {
                    if filter.is_some_and(|f| f != filter_name) {
                        continue;
                    }
                    for (param_name, p) in &entry.parameters {
                        if name.is_some_and(|n| n != param_name) || !p.ty.accepts(ty) {
                            continue;
                        }
                        infos.push(ParameterInfo {
                            stream: id,
                            filter: filter_name.clone(),
                            name: param_name.clone(),
                            ty: p.ty,
                            value: p.value.clone(),
                        });
                    }
                }
            }
            infos
        };

        let mut visited = 0;
        for info in &snapshot {
            visited += 1;
            if f(info).is_break() {
                break;
            }
        }
        visited
    }
}

impl std::fmt::Debug for ParameterStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let streams = self.read();
        let parameters: usize = streams
            .values()
            .flat_map(|filters| filters.values())
            .map(|entry| entry.parameters.len())
            .sum();
        f.debug_struct("ParameterStore")
            .field("streams", &streams.len())
            .field("parameters", &parameters)
            .finish()
    }
}

fn check_type(filter: &str, name: &str, ty: ParameterType, value: &ParameterValue) -> Result<()> {
    if matches!(value, ParameterValue::None) || ty.accepts(value.parameter_type()) {
        Ok(())
    } else {
        Err(Error::TypeMismatch {
            filter: filter.to_string(),
            name: name.to_string(),
            actual: ty,
            requested: value.parameter_type(),
        })
    }
}

fn filter_entry<'a>(streams: &'a StreamMap, stream: StreamId, filter: &str) -> Result<&'a FilterEntry> {
    streams
        .get(&stream)
        .ok_or(Error::UnknownStream(stream))?
        .get(filter)
        .ok_or_else(|| Error::UnknownFilter(filter.to_string()))
}

fn filter_entry_mut<'a>(
    streams: &'a mut StreamMap,
    stream: StreamId,
    filter: &str,
) -> Result<&'a mut FilterEntry> {
    streams
        .get_mut(&stream)
        .ok_or(Error::UnknownStream(stream))?
        .get_mut(filter)
        .ok_or_else(|| Error::UnknownFilter(filter.to_string()))
}

fn parameter<'a>(
    streams: &'a StreamMap,
    stream: StreamId,
    filter: &str,
    name: &str,
) -> Result<&'a Parameter> {
    filter_entry(streams, stream, filter)?
        .parameters
        .get(name)
        .ok_or_else(|| Error::UnknownParameter {
            filter: filter.to_string(),
            name: name.to_string(),
        })
}

fn parameter_mut<'a>(
    streams: &'a mut StreamMap,
    stream: StreamId,
    filter: &str,
    name: &str,
) -> Result<&'a mut Parameter> {
    filter_entry_mut(streams, stream, filter)?
        .parameters
        .get_mut(name)
        .ok_or_else(|| Error::UnknownParameter {
            filter: filter.to_string(),
            name: name.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::ControlEventSender;
    use std::sync::atomic::AtomicUsize;

    fn store_with_filter() -> (ParameterStore, StreamId) {
        let store = ParameterStore::new(Dispatcher::new(ControlEventSender::new(16)));
        let stream = StreamId::new(0);
        store.register_stream(stream);
        store.register_filter(stream, "tx").unwrap();
        (store, stream)
    }

    fn counting_callback(count: Arc<AtomicUsize>, ret: i32) -> Callback {
        Callback::new(move |_, _, _, _, _| {
            count.fetch_add(1, Ordering::SeqCst);
            ret
        })
    }

    #[test]
    fn test_create_and_read() {
        let (store, stream) = store_with_filter();
        store
            .create(stream, "tx", "freq", ParameterType::Double, 1.5.into(), None)
            .unwrap();
        assert_eq!(store.value(stream, "tx", "freq").unwrap(), ParameterValue::Double(1.5));
        assert_eq!(
            store.parameter_type(stream, "tx", "freq").unwrap(),
            ParameterType::Double
        );
    }

    #[test]
    fn test_duplicate_parameter_rejected() {
        let (store, stream) = store_with_filter();
        store
            .create(stream, "tx", "freq", ParameterType::Double, 1.0.into(), None)
            .unwrap();
        let err = store
            .create(stream, "tx", "freq", ParameterType::Double, 2.0.into(), None)
            .unwrap_err();
        assert!(matches!(err, Error::ParameterExists { .. }));
    }

    #[test]
    fn test_create_while_started_rejected() {
        let (store, stream) = store_with_filter();
        store.set_filter_started(stream, "tx", true).unwrap();
        let err = store
            .create(stream, "tx", "late", ParameterType::Any, ParameterValue::None, None)
            .unwrap_err();
        assert_eq!(err, Error::StreamRunning(stream));
    }

    #[test]
    fn test_initial_value_type_checked() {
        let (store, stream) = store_with_filter();
        let err = store
            .create(stream, "tx", "freq", ParameterType::Double, "fast".into(), None)
            .unwrap_err();
        assert!(matches!(err, Error::TypeMismatch { .. }));
    }

    #[test]
    fn test_unknown_lookups() {
        let (store, stream) = store_with_filter();
        assert!(matches!(
            store.value(stream, "rx", "freq"),
            Err(Error::UnknownFilter(_))
        ));
        assert!(matches!(
            store.value(stream, "tx", "freq"),
            Err(Error::UnknownParameter { .. })
        ));
        assert!(matches!(
            store.value(StreamId::new(9), "tx", "freq"),
            Err(Error::UnknownStream(_))
        ));
    }

    #[test]
    fn test_set_goes_through_owner_setter() {
        let (store, stream) = store_with_filter();
        // Owner clamps the requested value to 10.
        let setter: Setter = Box::new(|requested, _current| {
            requested.as_f64().map(|v| ParameterValue::Double(v.min(10.0)))
        });
        store
            .create(stream, "tx", "gain", ParameterType::Double, 1.0.into(), Some(setter))
            .unwrap();

        let count = Arc::new(AtomicUsize::new(0));
        store
            .subscribe(
                stream,
                "tx",
                Some("gain"),
                ParameterType::Double,
                counting_callback(count.clone(), 0),
                UserContext::none(),
                SubscribeFlags::NONE,
            )
            .unwrap();

        assert!(store
            .set(stream, "tx", "gain", ParameterType::Double, 42.0.into())
            .unwrap());
        assert_eq!(store.value(stream, "tx", "gain").unwrap(), ParameterValue::Double(10.0));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_set_without_setter_is_ignored() {
        let (store, stream) = store_with_filter();
        store
            .create(stream, "tx", "rate", ParameterType::Uint64, 5u64.into(), None)
            .unwrap();
        assert!(!store
            .set(stream, "tx", "rate", ParameterType::Uint64, 9u64.into())
            .unwrap());
        assert_eq!(store.value(stream, "tx", "rate").unwrap(), ParameterValue::Uint64(5));
    }

    #[test]
    fn test_set_type_mismatch() {
        let (store, stream) = store_with_filter();
        store
            .create(stream, "tx", "rate", ParameterType::Uint64, 5u64.into(), None)
            .unwrap();
        let err = store
            .set(stream, "tx", "rate", ParameterType::Double, 1.0.into())
            .unwrap_err();
        assert!(matches!(err, Error::TypeMismatch { .. }));
    }

    #[test]
    fn test_nonzero_subscriber_is_removed() {
        let (store, stream) = store_with_filter();
        store
            .create(stream, "tx", "level", ParameterType::Int64, 0i64.into(), None)
            .unwrap();
        let stays = Arc::new(AtomicUsize::new(0));
        let leaves = Arc::new(AtomicUsize::new(0));
        for (count, ret) in [(stays.clone(), 0), (leaves.clone(), 1)] {
            store
                .subscribe(
                    stream,
                    "tx",
                    Some("level"),
                    ParameterType::Any,
                    counting_callback(count, ret),
                    UserContext::none(),
                    SubscribeFlags::NONE,
                )
                .unwrap();
        }

        assert_eq!(store.push(stream, "tx", "level", 1i64.into()).unwrap(), 2);
        assert_eq!(store.push(stream, "tx", "level", 2i64.into()).unwrap(), 1);
        assert_eq!(stays.load(Ordering::SeqCst), 2);
        assert_eq!(leaves.load(Ordering::SeqCst), 1);
        assert_eq!(store.subscription_count(stream, "tx", "level").unwrap(), 1);
    }

    #[test]
    fn test_keep_one_and_wildcard_subscribe() {
        let (store, stream) = store_with_filter();
        for name in ["a", "b"] {
            store
                .create(stream, "tx", name, ParameterType::Double, 0.0.into(), None)
                .unwrap();
        }
        store
            .create(stream, "tx", "label", ParameterType::String, "x".into(), None)
            .unwrap();

        let callback = Callback::new(|_, _, _, _, _| 0);
        let added = store
            .subscribe(
                stream,
                "tx",
                None,
                ParameterType::Double,
                callback.clone(),
                UserContext::none(),
                SubscribeFlags::KEEP_ONE,
            )
            .unwrap();
        assert_eq!(added, 2);

        let added = store
            .subscribe(
                stream,
                "tx",
                None,
                ParameterType::Double,
                callback,
                UserContext::none(),
                SubscribeFlags::KEEP_ONE,
            )
            .unwrap();
        assert_eq!(added, 0);
        assert_eq!(store.subscription_count(stream, "tx", "label").unwrap(), 0);
    }

    #[test]
    fn test_restart_removes_unkept_subscriptions() {
        let (store, stream) = store_with_filter();
        store
            .create(stream, "tx", "a", ParameterType::Any, ParameterValue::None, None)
            .unwrap();
        for flags in [
            SubscribeFlags::NONE,
            SubscribeFlags::KEEP_AT_RESTART | SubscribeFlags::KEEP_ONE,
        ] {
            store
                .subscribe(
                    stream,
                    "tx",
                    Some("a"),
                    ParameterType::Any,
                    Callback::new(|_, _, _, _, _| 0),
                    UserContext::none(),
                    flags,
                )
                .unwrap();
        }
        assert_eq!(store.remove_callbacks_for_restart(stream), 1);
        assert_eq!(store.subscription_count(stream, "tx", "a").unwrap(), 1);
    }

    #[test]
    fn test_for_each_filters_and_breaks() {
        let (store, stream) = store_with_filter();
        store.register_filter(stream, "rx").unwrap();
        for (filter, name) in [("tx", "p0"), ("tx", "p1"), ("rx", "p0")] {
            store
                .create(stream, filter, name, ParameterType::Double, 0.5.into(), None)
                .unwrap();
        }

        let mut seen = Vec::new();
        let visited = store.for_each(None, None, Some("p0"), ParameterType::Any, |info| {
            seen.push(info.filter.clone());
            ControlFlow::Continue(())
        });
        assert_eq!(visited, 2);
        assert_eq!(seen, vec!["rx".to_string(), "tx".to_string()]);

        let visited = store.for_each(Some(stream), None, None, ParameterType::Any, |_| {
            ControlFlow::Break(())
        });
        assert_eq!(visited, 1);

        let visited = store.for_each(None, None, None, ParameterType::String, |_| {
            ControlFlow::Continue(())
        });
        assert_eq!(visited, 0);
    }

    #[test]
    fn test_callback_may_reenter_store() {
        let (store, stream) = store_with_filter();
        store
            .create(stream, "tx", "a", ParameterType::Int64, 1i64.into(), None)
            .unwrap();
        let store = Arc::new(store);
        let inner = Arc::downgrade(&store);
        let read_back = Arc::new(Mutex::new(None));
        let slot = read_back.clone();
        store
            .subscribe(
                stream,
                "tx",
                Some("a"),
                ParameterType::Any,
                Callback::new(move |_, stream, filter, name, _| {
                    if let Some(store) = inner.upgrade() {
                        *slot.lock().unwrap() = store.value(stream, filter, name).ok();
                    }
                    0
                }),
                UserContext::none(),
                SubscribeFlags::NONE,
            )
            .unwrap();

        store.push(stream, "tx", "a", 5i64.into()).unwrap();
        assert_eq!(*read_back.lock().unwrap(), Some(ParameterValue::Int64(5)));
    }
}
