//! Parameter callbacks and the dispatcher that delivers values to them.
//!
//! A callback receives exactly five inputs: the value, the stream, the
//! filter name, the parameter name and the caller's [`UserContext`].
//! Callbacks built with [`Callback::new`] have that shape by construction.
//! Callbacks built with [`Callback::dynamic`] only declare their arity
//! (script bindings and other runtime-typed callers); the [`Dispatcher`]
//! checks it before every invocation and silently skips callbacks whose
//! arity is not five. A skip never reaches the caller as an error, but it
//! is counted in [`DispatchStats`], logged, and emitted as a
//! [`ControlEvent::SignatureMismatch`].

use crate::host::{ControlEvent, ControlEventSender};
use crate::observability;
use crate::parameter::ParameterValue;
use crate::stream::StreamId;
use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Number of inputs a parameter callback must accept.
pub const CALLBACK_ARITY: usize = 5;

/// Opaque data supplied with a query and handed back unchanged.
///
/// Cloning shares the same allocation, so the callback receives the very
/// object the caller passed in. The crate never looks inside.
#[derive(Clone, Default)]
pub struct UserContext(Option<Arc<dyn Any + Send + Sync>>);

impl UserContext {
    /// Wrap a value.
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self(Some(Arc::new(value)))
    }

    /// Wrap an already shared value without re-allocating.
    pub fn from_arc(value: Arc<dyn Any + Send + Sync>) -> Self {
        Self(Some(value))
    }

    /// A context carrying nothing.
    pub fn none() -> Self {
        Self(None)
    }

    /// Whether the context carries nothing.
    pub fn is_none(&self) -> bool {
        self.0.is_none()
    }

    /// Borrow the wrapped value as `T`.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.as_deref().and_then(|v| v.downcast_ref::<T>())
    }

    /// Whether both contexts refer to the same object.
    pub fn ptr_eq(&self, other: &UserContext) -> bool {
        match (&self.0, &other.0) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            (None, None) => true,
            _ => false,
        }
    }
}

impl fmt::Debug for UserContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            Some(_) => write!(f, "UserContext(..)"),
            None => write!(f, "UserContext(none)"),
        }
    }
}

/// One positional input handed to a dynamic callback.
#[derive(Debug, Clone, Copy)]
pub enum CallbackArg<'a> {
    /// The resolved parameter value.
    Value(&'a ParameterValue),
    /// The stream the filter belongs to.
    Stream(StreamId),
    /// The filter name.
    Filter(&'a str),
    /// The parameter name.
    Parameter(&'a str),
    /// The caller's context.
    Context(&'a UserContext),
}

type TypedFn = dyn Fn(&ParameterValue, StreamId, &str, &str, &UserContext) -> i32 + Send + Sync;
type DynamicFn = dyn Fn(&[CallbackArg<'_>]) -> i32 + Send + Sync;

enum CallbackKind {
    Typed(Box<TypedFn>),
    Dynamic { arity: usize, f: Box<DynamicFn> },
}

/// A parameter callback.
///
/// The `i32` return is a status: it is logged, and for subscriptions a
/// nonzero value unsubscribes. It has no effect on one-shot queries.
#[derive(Clone)]
pub struct Callback {
    kind: Arc<CallbackKind>,
    label: Option<Arc<str>>,
}

impl Callback {
    /// Create a callback with the expected five-input shape.
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&ParameterValue, StreamId, &str, &str, &UserContext) -> i32 + Send + Sync + 'static,
    {
        Self {
            kind: Arc::new(CallbackKind::Typed(Box::new(f))),
            label: None,
        }
    }

    /// Create a callback whose shape is only known at runtime.
    ///
    /// `arity` is the number of positional inputs the callee accepts. It
    /// is invoked with the five [`CallbackArg`]s in order only when
    /// `arity == CALLBACK_ARITY`; otherwise every dispatch is skipped.
    pub fn dynamic<F>(arity: usize, f: F) -> Self
    where
        F: Fn(&[CallbackArg<'_>]) -> i32 + Send + Sync + 'static,
    {
        Self {
            kind: Arc::new(CallbackKind::Dynamic {
                arity,
                f: Box::new(f),
            }),
            label: None,
        }
    }

    /// Attach a label used in diagnostics.
    pub fn labeled(mut self, label: impl Into<String>) -> Self {
        self.label = Some(Arc::from(label.into()));
        self
    }

    /// The diagnostic label, if any.
    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    /// Number of inputs the callback accepts.
    pub fn arity(&self) -> usize {
        match self.kind.as_ref() {
            CallbackKind::Typed(_) => CALLBACK_ARITY,
            CallbackKind::Dynamic { arity, .. } => *arity,
        }
    }

    /// Whether the callback matches the expected shape.
    pub fn is_well_formed(&self) -> bool {
        self.arity() == CALLBACK_ARITY
    }

    /// Whether both handles refer to the same callback.
    pub fn ptr_eq(&self, other: &Callback) -> bool {
        Arc::ptr_eq(&self.kind, &other.kind)
    }

    fn invoke(&self, delivery: &Delivery<'_>) -> i32 {
        match self.kind.as_ref() {
            CallbackKind::Typed(f) => f(
                delivery.value,
                delivery.stream,
                delivery.filter,
                delivery.parameter,
                delivery.context,
            ),
            CallbackKind::Dynamic { f, .. } => f(&[
                CallbackArg::Value(delivery.value),
                CallbackArg::Stream(delivery.stream),
                CallbackArg::Filter(delivery.filter),
                CallbackArg::Parameter(delivery.parameter),
                CallbackArg::Context(delivery.context),
            ]),
        }
    }
}

impl fmt::Debug for Callback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callback")
            .field("arity", &self.arity())
            .field("label", &self.label)
            .finish()
    }
}

/// Everything a callback is invoked with.
#[derive(Debug, Clone, Copy)]
pub struct Delivery<'a> {
    /// Resolved value.
    pub value: &'a ParameterValue,
    /// Stream of the filter.
    pub stream: StreamId,
    /// Filter name.
    pub filter: &'a str,
    /// Parameter name.
    pub parameter: &'a str,
    /// Caller context.
    pub context: &'a UserContext,
}

/// What happened to a single dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The callback ran and returned this status.
    Invoked(i32),
    /// The callback's arity did not match; it was not invoked.
    SignatureMismatch {
        /// Arity the dispatcher requires.
        expected: usize,
        /// Arity the callback declared.
        found: usize,
    },
    /// The callback panicked; the panic was contained.
    Panicked,
}

impl DispatchOutcome {
    /// Whether the callback actually ran to completion.
    pub fn was_invoked(&self) -> bool {
        matches!(self, DispatchOutcome::Invoked(_))
    }
}

/// Snapshot of a dispatcher's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    /// Callbacks that ran.
    pub invoked: u64,
    /// Callbacks that ran and returned nonzero.
    pub failed: u64,
    /// Dispatches skipped because of a signature mismatch.
    pub mismatched: u64,
    /// Callbacks that panicked.
    pub panicked: u64,
}

#[derive(Default)]
struct DispatchCounters {
    invoked: AtomicU64,
    failed: AtomicU64,
    mismatched: AtomicU64,
    panicked: AtomicU64,
}

/// Delivers resolved values to callbacks.
///
/// Cheap to clone; clones share counters and the event channel.
#[derive(Clone)]
pub struct Dispatcher {
    counters: Arc<DispatchCounters>,
    events: ControlEventSender,
}

impl Dispatcher {
    /// Create a dispatcher reporting to `events`.
    pub fn new(events: ControlEventSender) -> Self {
        Self {
            counters: Arc::new(DispatchCounters::default()),
            events,
        }
    }

    /// Deliver `delivery` to `callback`, at most once.
    pub fn dispatch(&self, callback: &Callback, delivery: &Delivery<'_>) -> DispatchOutcome {
        let found = callback.arity();
        if found != CALLBACK_ARITY {
            self.counters.mismatched.fetch_add(1, Ordering::Relaxed);
            observability::record_signature_mismatch(delivery.filter, delivery.parameter);
            tracing::warn!(
                stream = %delivery.stream,
                filter = delivery.filter,
                parameter = delivery.parameter,
                expected = CALLBACK_ARITY,
                found,
                callback = callback.label().unwrap_or("<anonymous>"),
                "parameter callback has the wrong number of inputs; not calling it"
            );
            self.events.send(ControlEvent::SignatureMismatch {
                stream: delivery.stream,
                filter: delivery.filter.to_string(),
                parameter: delivery.parameter.to_string(),
                expected: CALLBACK_ARITY,
                found,
            });
            return DispatchOutcome::SignatureMismatch {
                expected: CALLBACK_ARITY,
                found,
            };
        }

        match panic::catch_unwind(AssertUnwindSafe(|| callback.invoke(delivery))) {
            Ok(code) => {
                self.counters.invoked.fetch_add(1, Ordering::Relaxed);
                observability::record_callback_invoked(delivery.filter, delivery.parameter);
                if code != 0 {
                    self.counters.failed.fetch_add(1, Ordering::Relaxed);
                    tracing::debug!(
                        stream = %delivery.stream,
                        filter = delivery.filter,
                        parameter = delivery.parameter,
                        code,
                        "parameter callback returned nonzero"
                    );
                    self.events.send(ControlEvent::CallbackFailed {
                        stream: delivery.stream,
                        filter: delivery.filter.to_string(),
                        parameter: delivery.parameter.to_string(),
                        code,
                    });
                }
                DispatchOutcome::Invoked(code)
            }
            Err(_) => {
                self.counters.panicked.fetch_add(1, Ordering::Relaxed);
                tracing::error!(
                    stream = %delivery.stream,
                    filter = delivery.filter,
                    parameter = delivery.parameter,
                    "parameter callback panicked"
                );
                self.events.send(ControlEvent::CallbackPanicked {
                    stream: delivery.stream,
                    filter: delivery.filter.to_string(),
                    parameter: delivery.parameter.to_string(),
                });
                DispatchOutcome::Panicked
            }
        }
    }

    /// Current counter values.
    pub fn stats(&self) -> DispatchStats {
        DispatchStats {
            invoked: self.counters.invoked.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
            mismatched: self.counters.mismatched.load(Ordering::Relaxed),
            panicked: self.counters.panicked.load(Ordering::Relaxed),
        }
    }

    /// The event channel diagnostics are sent on.
    pub fn events(&self) -> &ControlEventSender {
        &self.events
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("stats", &self.stats())
            .finish()
    }
}
