//! Controller modules: a set of optional lifecycle hooks.
//!
//! Every hook is optional. The host checks for presence before calling and
//! treats an absent hook as a successful no-op. Plugin state lives in
//! whatever the closures capture.
//!
//! # Example
//!
//! ```rust
//! use streamknob::controller::{Callback, ControllerModule, HookStatus, StartDecision, UserContext};
//!
//! let module = ControllerModule::new()
//!     .on_construct(|_controller, args| {
//!         if args.is_empty() { HookStatus::Failed(1) } else { HookStatus::Ok }
//!     })
//!     .on_pre_start(|_args| StartDecision::Proceed)
//!     .on_post_start(|args| {
//!         let status = args.controller.get_parameter(
//!             args.stream,
//!             args.filter,
//!             "gain",
//!             Callback::new(|value, _, _, _, _| {
//!                 println!("gain = {value}");
//!                 0
//!             }),
//!             UserContext::none(),
//!         );
//!         HookStatus::from_code(status.code())
//!     });
//! assert!(module.has_hook(streamknob::controller::Hook::PostStart));
//! ```

use super::handle::Controller;
use crate::stream::StreamId;
use std::fmt;

/// Names of the lifecycle hooks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Hook {
    /// `construct(args)`.
    Construct,
    /// `help()`.
    Help,
    /// `pre_start(stream, filter, num_in, num_out)`.
    PreStart,
    /// `post_start(stream, filter, num_in, num_out)`.
    PostStart,
    /// `pre_stop(stream, filter, num_in, num_out)`.
    PreStop,
    /// `post_stop(stream, filter, num_in, num_out)`.
    PostStop,
    /// `destroy()`.
    Destroy,
}

impl fmt::Display for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Hook::Construct => "construct",
            Hook::Help => "help",
            Hook::PreStart => "preStart",
            Hook::PostStart => "postStart",
            Hook::PreStop => "preStop",
            Hook::PostStop => "postStop",
            Hook::Destroy => "destroy",
        };
        f.write_str(name)
    }
}

/// Result of every hook except `pre_start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HookStatus {
    /// Success.
    #[default]
    Ok,
    /// Failure with a nonzero code.
    Failed(i32),
}

impl HookStatus {
    /// Map a C-style status code: 0 is success.
    pub fn from_code(code: i32) -> Self {
        if code == 0 {
            HookStatus::Ok
        } else {
            HookStatus::Failed(code)
        }
    }

    /// The status as a code.
    pub fn code(self) -> i32 {
        match self {
            HookStatus::Ok => 0,
            HookStatus::Failed(code) => code,
        }
    }

    /// Whether the hook succeeded.
    pub fn is_ok(self) -> bool {
        self == HookStatus::Ok
    }
}

/// Result of `pre_start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StartDecision {
    /// Let the filter start.
    #[default]
    Proceed,
    /// Abort the start of this filter.
    Veto,
}

impl StartDecision {
    /// Map a truthy code: nonzero proceeds, zero vetoes.
    pub fn from_code(code: i32) -> Self {
        if code != 0 {
            StartDecision::Proceed
        } else {
            StartDecision::Veto
        }
    }
}

impl From<bool> for StartDecision {
    fn from(proceed: bool) -> Self {
        if proceed {
            StartDecision::Proceed
        } else {
            StartDecision::Veto
        }
    }
}

/// Inputs of the per-filter hooks.
#[derive(Debug, Clone, Copy)]
pub struct HookArgs<'a> {
    /// Handle for parameter queries.
    pub controller: &'a Controller,
    /// Stream being started or stopped.
    pub stream: StreamId,
    /// Filter the hook is called for.
    pub filter: &'a str,
    /// Number of input ports of the filter.
    pub num_inputs: u32,
    /// Number of output ports of the filter.
    pub num_outputs: u32,
}

type ConstructHook = Box<dyn FnMut(&Controller, &[String]) -> HookStatus + Send>;
type HelpHook = Box<dyn Fn() -> String + Send>;
type StartHook = Box<dyn FnMut(&HookArgs<'_>) -> StartDecision + Send>;
type FilterHook = Box<dyn FnMut(&HookArgs<'_>) -> HookStatus + Send>;
type DestroyHook = Box<dyn FnMut() -> HookStatus + Send>;

/// A controller module: optional hook slots filled through the builder.
#[derive(Default)]
pub struct ControllerModule {
    construct: Option<ConstructHook>,
    help: Option<HelpHook>,
    pre_start: Option<StartHook>,
    post_start: Option<FilterHook>,
    pre_stop: Option<FilterHook>,
    post_stop: Option<FilterHook>,
    destroy: Option<DestroyHook>,
}

impl ControllerModule {
    /// A module with no hooks.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the `construct` hook. A failure aborts loading.
    pub fn on_construct<F>(mut self, f: F) -> Self
    where
        F: FnMut(&Controller, &[String]) -> HookStatus + Send + 'static,
    {
        self.construct = Some(Box::new(f));
        self
    }

    /// Set the `help` hook.
    pub fn on_help<F>(mut self, f: F) -> Self
    where
        F: Fn() -> String + Send + 'static,
    {
        self.help = Some(Box::new(f));
        self
    }

    /// Set the `pre_start` hook, called once per filter before it starts.
    pub fn on_pre_start<F>(mut self, f: F) -> Self
    where
        F: FnMut(&HookArgs<'_>) -> StartDecision + Send + 'static,
    {
        self.pre_start = Some(Box::new(f));
        self
    }

    /// Set the `post_start` hook, called once per started filter.
    pub fn on_post_start<F>(mut self, f: F) -> Self
    where
        F: FnMut(&HookArgs<'_>) -> HookStatus + Send + 'static,
    {
        self.post_start = Some(Box::new(f));
        self
    }

    /// Set the `pre_stop` hook.
    pub fn on_pre_stop<F>(mut self, f: F) -> Self
    where
        F: FnMut(&HookArgs<'_>) -> HookStatus + Send + 'static,
    {
        self.pre_stop = Some(Box::new(f));
        self
    }

    /// Set the `post_stop` hook.
    pub fn on_post_stop<F>(mut self, f: F) -> Self
    where
        F: FnMut(&HookArgs<'_>) -> HookStatus + Send + 'static,
    {
        self.post_stop = Some(Box::new(f));
        self
    }

    /// Set the `destroy` hook.
    pub fn on_destroy<F>(mut self, f: F) -> Self
    where
        F: FnMut() -> HookStatus + Send + 'static,
    {
        self.destroy = Some(Box::new(f));
        self
    }

    /// Whether a hook slot is filled.
    pub fn has_hook(&self, hook: Hook) -> bool {
        match hook {
            Hook::Construct => self.construct.is_some(),
            Hook::Help => self.help.is_some(),
            Hook::PreStart => self.pre_start.is_some(),
            Hook::PostStart => self.post_start.is_some(),
            Hook::PreStop => self.pre_stop.is_some(),
            Hook::PostStop => self.post_stop.is_some(),
            Hook::Destroy => self.destroy.is_some(),
        }
    }

    pub(crate) fn construct(&mut self, controller: &Controller, args: &[String]) -> HookStatus {
        self.construct
            .as_mut()
            .map_or(HookStatus::Ok, |f| f(controller, args))
    }

    pub(crate) fn help(&self) -> Option<String> {
        self.help.as_ref().map(|f| f())
    }

    pub(crate) fn pre_start(&mut self, args: &HookArgs<'_>) -> StartDecision {
        self.pre_start
            .as_mut()
            .map_or(StartDecision::Proceed, |f| f(args))
    }

    pub(crate) fn filter_hook(&mut self, hook: Hook, args: &HookArgs<'_>) -> HookStatus {
        let slot = match hook {
            Hook::PostStart => &mut self.post_start,
            Hook::PreStop => &mut self.pre_stop,
            Hook::PostStop => &mut self.post_stop,
            _ => return HookStatus::Ok,
        };
        slot.as_mut().map_or(HookStatus::Ok, |f| f(args))
    }

    pub(crate) fn destroy(&mut self) -> HookStatus {
        self.destroy.as_mut().map_or(HookStatus::Ok, |f| f())
    }
}

impl fmt::Debug for ControllerModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hooks: Vec<String> = [
            Hook::Construct,
            Hook::Help,
            Hook::PreStart,
            Hook::PostStart,
            Hook::PreStop,
            Hook::PostStop,
            Hook::Destroy,
        ]
        .into_iter()
        .filter(|h| self.has_hook(*h))
        .map(|h| h.to_string())
        .collect();
        f.debug_struct("ControllerModule").field("hooks", &hooks).finish()
    }
}
