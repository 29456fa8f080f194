//! Controller plugins and the facilities they use.
//!
//! A controller is a [`ControllerModule`]: a set of optional lifecycle hooks
//! driven by the [`ControlHost`](crate::host::ControlHost). While loaded, a
//! controller queries filter parameters through its [`Controller`] handle;
//! values arrive through a five-input [`Callback`] delivered by the
//! [`Dispatcher`].

mod callback;
mod handle;
mod lifecycle;
mod plugin;

pub use callback::{
    CALLBACK_ARITY, Callback, CallbackArg, Delivery, DispatchOutcome, DispatchStats, Dispatcher,
    UserContext,
};
pub use handle::{Controller, QueryError, QueryStatus};
pub use lifecycle::LifecycleState;
pub use plugin::{ControllerModule, Hook, HookArgs, HookStatus, StartDecision};

pub(crate) use handle::{DeferredReceiver, DeferredSender, discard_deferred, dispatch_deferred};
