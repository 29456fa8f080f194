//! The handle controllers use to query filter parameters.

use super::callback::{Callback, Delivery, DispatchOutcome, UserContext};
use crate::error::Error;
use crate::observability;
use crate::parameter::{ParameterStore, ParameterValue, ParameterView};
use crate::stream::StreamId;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;

/// Why a query was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    /// No such stream in this session.
    #[error("unknown stream {0}")]
    UnknownStream(StreamId),
    /// No such filter in the stream.
    #[error("filter '{0}' not found in parameter tree")]
    UnknownFilter(String),
    /// The filter has no such parameter.
    #[error("parameter '{filter}:{name}' not found")]
    UnknownParameter {
        /// Owning filter.
        filter: String,
        /// Requested name.
        name: String,
    },
}

impl QueryError {
    /// Nonzero status code for this error.
    pub fn code(&self) -> i32 {
        match self {
            QueryError::UnknownStream(_) => -1,
            QueryError::UnknownFilter(_) => -2,
            QueryError::UnknownParameter { .. } => -3,
        }
    }
}

impl From<QueryError> for Error {
    fn from(err: QueryError) -> Self {
        match err {
            QueryError::UnknownStream(id) => Error::UnknownStream(id),
            QueryError::UnknownFilter(name) => Error::UnknownFilter(name),
            QueryError::UnknownParameter { filter, name } => Error::UnknownParameter { filter, name },
        }
    }
}

/// Immediate result of [`Controller::get_parameter`].
#[must_use]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryStatus {
    /// The query was accepted; the callback fires now or once the filter
    /// starts, provided its shape is correct.
    Accepted,
    /// The query target does not exist; the callback will never fire.
    Invalid(QueryError),
}

impl QueryStatus {
    /// Status code: 0 when accepted, nonzero otherwise.
    pub fn code(&self) -> i32 {
        match self {
            QueryStatus::Accepted => 0,
            QueryStatus::Invalid(err) => err.code(),
        }
    }

    /// Whether the query was accepted.
    pub fn is_accepted(&self) -> bool {
        matches!(self, QueryStatus::Accepted)
    }
}

/// A query waiting for its filter to start.
///
/// Whoever claims it first delivers it: the host draining the queue, or
/// the sender re-checking after the enqueue.
#[derive(Debug)]
pub(crate) struct ParameterQuery {
    stream: StreamId,
    filter: String,
    parameter: String,
    callback: Callback,
    context: UserContext,
    claimed: AtomicBool,
}

impl ParameterQuery {
    pub(crate) fn new(
        stream: StreamId,
        filter: &str,
        parameter: &str,
        callback: Callback,
        context: UserContext,
    ) -> Arc<Self> {
        Arc::new(Self {
            stream,
            filter: filter.to_string(),
            parameter: parameter.to_string(),
            callback,
            context,
            claimed: AtomicBool::new(false),
        })
    }

    /// Take the right to deliver. Succeeds once.
    pub(crate) fn claim(&self) -> bool {
        !self.claimed.swap(true, Ordering::AcqRel)
    }

    fn is_claimed(&self) -> bool {
        self.claimed.load(Ordering::Acquire)
    }

    fn deliver(&self, store: &ParameterStore, value: &ParameterValue) -> DispatchOutcome {
        let delivery = Delivery {
            value,
            stream: self.stream,
            filter: &self.filter,
            parameter: &self.parameter,
            context: &self.context,
        };
        store.dispatcher().dispatch(&self.callback, &delivery)
    }
}

pub(crate) type DeferredSender = kanal::Sender<Arc<ParameterQuery>>;
pub(crate) type DeferredReceiver = kanal::Receiver<Arc<ParameterQuery>>;

/// Handle bound to a host session.
///
/// Cheap to clone and safe to move to other threads.
#[derive(Clone)]
pub struct Controller {
    store: Arc<ParameterStore>,
    deferred: DeferredSender,
}

impl Controller {
    pub(crate) fn new(store: Arc<ParameterStore>, deferred: DeferredSender) -> Self {
        Self { store, deferred }
    }

    /// Query the current value of a filter parameter.
    ///
    /// Never blocks. If the filter has started, `callback` is dispatched
    /// before this returns; otherwise the query is deferred and the host
    /// dispatches it right after the filter starts. The callback fires at
    /// most once, and never if its arity is not five (the query is still
    /// accepted; the skip shows up in the session's diagnostics).
    pub fn get_parameter(
        &self,
        stream: StreamId,
        filter: &str,
        parameter: &str,
        callback: Callback,
        context: UserContext,
    ) -> QueryStatus {
        let resolved = match self.store.resolve(stream, filter, parameter) {
            Ok(resolved) => resolved,
            Err(err) => {
                observability::record_query_rejected(filter, parameter);
                tracing::debug!(%stream, filter, parameter, error = %err, "parameter query rejected");
                self.store
                    .dispatcher()
                    .events()
                    .send(crate::host::ControlEvent::QueryRejected {
                        stream,
                        filter: filter.to_string(),
                        parameter: parameter.to_string(),
                        reason: err.to_string(),
                    });
                return QueryStatus::Invalid(err);
            }
        };
        observability::record_query_accepted(filter, parameter);

        if resolved.started {
            let delivery = Delivery {
                value: &resolved.value,
                stream,
                filter,
                parameter,
                context: &context,
            };
            let outcome = self.store.dispatcher().dispatch(&callback, &delivery);
            tracing::trace!(%stream, filter, parameter, ?outcome, "parameter query resolved");
            return QueryStatus::Accepted;
        }

        self.defer(ParameterQuery::new(stream, filter, parameter, callback, context));
        QueryStatus::Accepted
    }

    /// Queue a query for a filter seen idle.
    ///
    /// The host may have started the filter and drained the queue since
    /// that check, so `started` is read again after the enqueue.
    pub(crate) fn defer(&self, query: Arc<ParameterQuery>) {
        if self.deferred.send(query.clone()).is_err() {
            // The host is gone; nothing can ever start this filter.
            tracing::debug!(stream = %query.stream, filter = %query.filter, "host closed; deferred query dropped");
            return;
        }
        tracing::debug!(stream = %query.stream, filter = %query.filter, parameter = %query.parameter, "filter not started; query deferred");

        let Ok(resolved) = self.store.resolve(query.stream, &query.filter, &query.parameter) else {
            return;
        };
        if resolved.started && query.claim() {
            let outcome = query.deliver(&self.store, &resolved.value);
            tracing::trace!(stream = %query.stream, filter = %query.filter, ?outcome, "filter started during enqueue; query resolved");
        }
    }

    /// Version of the host library.
    pub fn version(&self) -> &'static str {
        crate::version()
    }

    /// Read-only view of the parameters this handle queries.
    pub fn parameters(&self) -> ParameterView {
        ParameterView::new(self.store.clone())
    }
}

impl std::fmt::Debug for Controller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Controller")
            .field("version", &crate::version())
            .field("store", &self.store)
            .finish()
    }
}

/// Dispatch every deferred query whose filter has started.
///
/// Queries for filters that have not started yet are queued again; queries
/// whose target no longer exists, or that were already delivered, are
/// dropped. Returns the number of queries dispatched.
pub(crate) fn dispatch_deferred(store: &ParameterStore, rx: &DeferredReceiver, tx: &DeferredSender) -> usize {
    let mut waiting = Vec::new();
    let mut dispatched = 0;

    while let Ok(Some(query)) = rx.try_recv() {
        if query.is_claimed() {
            continue;
        }
        match store.resolve(query.stream, &query.filter, &query.parameter) {
            Ok(resolved) if resolved.started => {
                if !query.claim() {
                    continue;
                }
                if let DispatchOutcome::Invoked(code) = query.deliver(store, &resolved.value) {
                    tracing::trace!(stream = %query.stream, filter = %query.filter, code, "deferred query resolved");
                }
                dispatched += 1;
            }
            Ok(_) => waiting.push(query),
            Err(err) => {
                tracing::debug!(
                    stream = %query.stream,
                    filter = %query.filter,
                    parameter = %query.parameter,
                    error = %err,
                    "deferred query target vanished; dropped"
                );
            }
        }
    }

    for query in waiting {
        // Receiver is borrowed by the caller, so the channel is open.
        let _ = tx.send(query);
    }
    dispatched
}

/// Drop every deferred query still queued.
pub(crate) fn discard_deferred(rx: &DeferredReceiver) -> usize {
    let mut dropped = 0;
    while let Ok(Some(query)) = rx.try_recv() {
        if !query.is_claimed() {
            dropped += 1;
        }
    }
    dropped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::Dispatcher;
    use crate::host::ControlEventSender;
    use crate::parameter::ParameterType;
    use std::sync::atomic::AtomicUsize;

    type Fixture = (Controller, Arc<ParameterStore>, DeferredReceiver, DeferredSender, StreamId);

    fn setup() -> Fixture {
        let store = Arc::new(ParameterStore::new(Dispatcher::new(ControlEventSender::new(16))));
        let stream = StreamId::new(1);
        store.register_stream(stream);
        store.register_filter(stream, "F1").unwrap();
        store
            .create(stream, "F1", "gain", ParameterType::Int64, 7i64.into(), None)
            .unwrap();
        let (tx, rx) = kanal::unbounded();
        (Controller::new(store.clone(), tx.clone()), store, rx, tx, stream)
    }

    fn counter() -> (Arc<AtomicUsize>, Callback) {
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        let cb = Callback::new(move |_, _, _, _, _| {
            c.fetch_add(1, Ordering::SeqCst);
            0
        });
        (count, cb)
    }

    #[test]
    fn test_started_filter_resolves_immediately() {
        let (controller, store, _rx, _tx, stream) = setup();
        store.set_filter_started(stream, "F1", true).unwrap();
        let (count, cb) = counter();
        let status = controller.get_parameter(stream, "F1", "gain", cb, UserContext::none());
        assert_eq!(status, QueryStatus::Accepted);
        assert_eq!(status.code(), 0);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_idle_filter_defers_until_started() {
        let (controller, store, rx, tx, stream) = setup();
        let (count, cb) = counter();
        assert!(controller
            .get_parameter(stream, "F1", "gain", cb, UserContext::none())
            .is_accepted());
        assert_eq!(count.load(Ordering::SeqCst), 0);

        // Still idle: stays queued.
        assert_eq!(dispatch_deferred(&store, &rx, &tx), 0);
        assert_eq!(count.load(Ordering::SeqCst), 0);

        store.set_filter_started(stream, "F1", true).unwrap();
        assert_eq!(dispatch_deferred(&store, &rx, &tx), 1);
        assert_eq!(count.load(Ordering::SeqCst), 1);

        // Resolved at most once.
        assert_eq!(dispatch_deferred(&store, &rx, &tx), 0);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_deferred_query_sees_value_at_start() {
        let (controller, store, rx, tx, stream) = setup();
        let seen = Arc::new(std::sync::Mutex::new(None));
        let slot = seen.clone();
        let _ = controller.get_parameter(
            stream,
            "F1",
            "gain",
            Callback::new(move |value, _, _, _, _| {
                *slot.lock().unwrap() = Some(value.clone());
                0
            }),
            UserContext::none(),
        );
        store.push(stream, "F1", "gain", 9i64.into()).unwrap();
        store.set_filter_started(stream, "F1", true).unwrap();
        dispatch_deferred(&store, &rx, &tx);
        assert_eq!(*seen.lock().unwrap(), Some(ParameterValue::Int64(9)));
    }

    #[test]
    fn test_unknown_targets_rejected() {
        let (controller, _store, _rx, _tx, stream) = setup();
        let (count, cb) = counter();

        let status = controller.get_parameter(stream, "F2", "volume", cb.clone(), UserContext::none());
        assert!(matches!(status, QueryStatus::Invalid(QueryError::UnknownFilter(_))));
        assert_ne!(status.code(), 0);

        let status = controller.get_parameter(stream, "F1", "volume", cb.clone(), UserContext::none());
        assert!(matches!(status, QueryStatus::Invalid(QueryError::UnknownParameter { .. })));

        let status = controller.get_parameter(StreamId::new(77), "F1", "gain", cb, UserContext::none());
        assert_eq!(status, QueryStatus::Invalid(QueryError::UnknownStream(StreamId::new(77))));

        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_vanished_target_dropped() {
        let (controller, store, rx, tx, stream) = setup();
        let (count, cb) = counter();
        let _ = controller.get_parameter(stream, "F1", "gain", cb, UserContext::none());
        store.remove_filter(stream, "F1").unwrap();
        assert_eq!(dispatch_deferred(&store, &rx, &tx), 0);
        assert_eq!(discard_deferred(&rx), 0);
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_filter_started_between_check_and_enqueue() {
        let (controller, store, rx, tx, stream) = setup();
        let (count, cb) = counter();

        // The caller saw the filter idle...
        assert!(!store.resolve(stream, "F1", "gain").unwrap().started);
        let query = ParameterQuery::new(stream, "F1", "gain", cb, UserContext::none());

        // ...then the host started it and drained an empty queue.
        store.set_filter_started(stream, "F1", true).unwrap();
        assert_eq!(dispatch_deferred(&store, &rx, &tx), 0);

        controller.defer(query);
        assert_eq!(count.load(Ordering::SeqCst), 1);

        // The copy left in the queue is not delivered again.
        assert_eq!(dispatch_deferred(&store, &rx, &tx), 0);
        assert_eq!(rx.len(), 0);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_claimed_query_not_redelivered() {
        let (_controller, store, rx, tx, stream) = setup();
        let (count, cb) = counter();
        let query = ParameterQuery::new(stream, "F1", "gain", cb, UserContext::none());
        assert!(query.claim());
        assert!(!query.claim());

        tx.send(query).unwrap();
        store.set_filter_started(stream, "F1", true).unwrap();
        assert_eq!(dispatch_deferred(&store, &rx, &tx), 0);
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_worker_queries_race_start() {
        let (controller, store, rx, tx, stream) = setup();
        let count = Arc::new(AtomicUsize::new(0));

        let workers: Vec<_> = (0..4)
            .map(|_| {
                let controller = controller.clone();
                let c = count.clone();
                std::thread::spawn(move || {
                    for _ in 0..50 {
                        let c = c.clone();
                        let _ = controller.get_parameter(
                            stream,
                            "F1",
                            "gain",
                            Callback::new(move |_, _, _, _, _| {
                                c.fetch_add(1, Ordering::SeqCst);
                                0
                            }),
                            UserContext::none(),
                        );
                    }
                })
            })
            .collect();

        store.set_filter_started(stream, "F1", true).unwrap();
        dispatch_deferred(&store, &rx, &tx);
        for worker in workers {
            worker.join().unwrap();
        }

        // Every query fired exactly once, without a further drain.
        assert_eq!(count.load(Ordering::SeqCst), 200);
        assert_eq!(dispatch_deferred(&store, &rx, &tx), 0);
        assert_eq!(count.load(Ordering::SeqCst), 200);
    }

    #[test]
    fn test_version() {
        let (controller, ..) = setup();
        assert_eq!(controller.version(), env!("CARGO_PKG_VERSION"));
    }
}
