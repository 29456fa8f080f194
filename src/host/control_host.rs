//! The control host: loads controllers and drives streams through their
//! lifecycle.
//!
//! Start sequence for a stream:
//!
//! 1. every controller's `pre_start`, in load order, once per filter
//! 2. each filter no controller vetoed is started
//! 3. deferred parameter queries for the started filters are dispatched
//! 4. every controller's `post_start`, in load order, once per started filter
//!
//! Stop runs the mirror image in reverse load order, then drops
//! subscriptions not marked `KEEP_AT_RESTART`.

use super::config::HostConfig;
use super::events::{ControlEvent, ControlEventReceiver, ControlEventSender, ControlEventStream};
use super::naming;
use super::registry::{ControllerInstance, ControllerRegistry, SharedInstance, lock};
use crate::controller::{
    Controller, ControllerModule, DeferredReceiver, DeferredSender, DispatchStats, Dispatcher, Hook,
    HookArgs, HookStatus, LifecycleState, StartDecision, discard_deferred, dispatch_deferred,
};
use crate::error::{Error, Result};
use crate::observability::{self, TracingConfig};
use crate::parameter::{ParameterStore, ParameterView};
use crate::stream::{FilterContext, FilterId, FilterState, Stream, StreamId, StreamState};
use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

/// Code a hook is reported with when it panics.
pub const HOOK_PANIC_CODE: i32 = -1;

/// Outcome of [`ControlHost::start`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StartReport {
    /// Filters that started, in stream order.
    pub started: Vec<String>,
    /// Filters a controller vetoed.
    pub vetoed: Vec<String>,
    /// Filters whose `start` failed.
    pub failed: Vec<Error>,
    /// Deferred queries dispatched once the filters started.
    pub deferred_dispatched: usize,
    /// Advisory hooks that reported a failure.
    pub hook_failures: usize,
}

/// Outcome of [`ControlHost::stop`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StopReport {
    /// Filters that were stopped, in stream order.
    pub stopped: Vec<String>,
    /// Filters whose `stop` returned an error.
    pub failed: Vec<(String, Error)>,
    /// Subscriptions removed because they were not kept for restart.
    pub subscriptions_removed: usize,
    /// Advisory hooks that reported a failure.
    pub hook_failures: usize,
}

struct FilterSlot {
    id: FilterId,
    name: String,
    num_inputs: u32,
    num_outputs: u32,
}

/// Hosts controllers and the streams they watch.
///
/// Dropping the host shuts it down.
pub struct ControlHost {
    config: HostConfig,
    events: ControlEventSender,
    store: Arc<ParameterStore>,
    controller: Controller,
    deferred_tx: DeferredSender,
    deferred_rx: DeferredReceiver,
    registry: ControllerRegistry,
    streams: BTreeMap<StreamId, Stream>,
    next_stream: u32,
    shut_down: bool,
}

impl ControlHost {
    /// Create a host with no streams and no controllers.
    pub fn new(config: HostConfig) -> Self {
        observability::init_metrics();
        let events = ControlEventSender::new(config.event_capacity);
        let store = Arc::new(ParameterStore::new(Dispatcher::new(events.clone())));
        let (deferred_tx, deferred_rx) = kanal::unbounded();
        let controller = Controller::new(store.clone(), deferred_tx.clone());
        Self {
            config,
            events,
            store,
            controller,
            deferred_tx,
            deferred_rx,
            registry: ControllerRegistry::new(),
            streams: BTreeMap::new(),
            next_stream: 1,
            shut_down: false,
        }
    }

    /// The host configuration.
    pub fn config(&self) -> &HostConfig {
        &self.config
    }

    /// A controller handle bound to this host.
    pub fn controller(&self) -> Controller {
        self.controller.clone()
    }

    /// Read-only view of every filter parameter.
    pub fn parameters(&self) -> ParameterView {
        ParameterView::new(self.store.clone())
    }

    /// Subscribe to host events.
    pub fn subscribe_events(&self) -> ControlEventReceiver {
        self.events.subscribe()
    }

    /// Host events as a `futures::Stream`.
    pub fn event_stream(&self) -> ControlEventStream {
        self.events.stream()
    }

    /// Callback dispatch counters for this host.
    pub fn dispatch_stats(&self) -> DispatchStats {
        self.store.dispatcher().stats()
    }

    /// Queries waiting for their filter to start.
    pub fn pending_queries(&self) -> usize {
        self.deferred_rx.len()
    }

    /// Attach a stream and construct its filters.
    ///
    /// Filters usually create their parameters in `construct`. If one fails
    /// the stream is not attached.
    pub fn add_stream(&mut self, mut stream: Stream) -> Result<StreamId> {
        let id = StreamId::new(self.next_stream);
        self.next_stream += 1;
        self.store.register_stream(id);

        let built = construct_filters(&self.store, id, &mut stream);
        if let Err(err) = built {
            self.store.remove_stream(id);
            tracing::error!(stream = %id, error = %err, "stream construction failed");
            return Err(err);
        }

        tracing::info!(stream = %id, filters = stream.filter_count(), "stream added");
        self.streams.insert(id, stream);
        Ok(id)
    }

    /// Detach an idle stream. Queries still waiting on it are dropped.
    pub fn remove_stream(&mut self, id: StreamId) -> Result<Stream> {
        match self.streams.get(&id) {
            None => return Err(Error::UnknownStream(id)),
            Some(s) if s.state() == StreamState::Running => return Err(Error::StreamRunning(id)),
            Some(_) => {}
        }
        let stream = self.streams.remove(&id).ok_or(Error::UnknownStream(id))?;
        self.store.remove_stream(id);
        dispatch_deferred(&self.store, &self.deferred_rx, &self.deferred_tx);
        tracing::info!(stream = %id, "stream removed");
        Ok(stream)
    }

    /// A stream attached to this host.
    pub fn stream(&self, id: StreamId) -> Option<&Stream> {
        self.streams.get(&id)
    }

    /// Ids of every attached stream.
    pub fn stream_ids(&self) -> Vec<StreamId> {
        self.streams.keys().copied().collect()
    }

    /// Load a controller and run its `construct` hook.
    ///
    /// Without `load_name` the name is derived from `path`. Returns the
    /// name the controller is registered under. If `construct` fails the
    /// controller is dropped, nothing is registered and no other hook runs.
    pub fn load_controller(
        &mut self,
        path: &str,
        load_name: Option<&str>,
        module: ControllerModule,
        args: &[&str],
    ) -> Result<String> {
        let name = naming::resolve_name(path, load_name, self.config.max_name_len, |n| {
            self.registry.contains(n)
        })?;
        let args: Vec<String> = args.iter().map(|a| a.to_string()).collect();
        let mut instance = ControllerInstance::new(name.clone(), path, args, module);

        tracing::debug!(controller = %name, path, "calling construct()");
        let status = {
            let _span = self.config.tracing.hook_span(&name, "construct").entered();
            let controller = &self.controller;
            let args = instance.args().to_vec();
            let module = instance.module_mut();
            guarded(&name, Hook::Construct, HookStatus::Failed(HOOK_PANIC_CODE), || {
                module.construct(controller, &args)
            })
        };

        if let HookStatus::Failed(code) = status {
            observability::record_hook_failure(&name, "construct");
            tracing::error!(controller = %name, path, code, "construct() failed; controller not loaded");
            self.events.send(ControlEvent::ConstructFailed {
                name: name.clone(),
                code,
            });
            return Err(Error::ConstructFailed { name, code });
        }

        let from = instance.advance(None, LifecycleState::Constructed)?;
        emit_transition(&self.events, &name, None, from, LifecycleState::Constructed);
        self.registry.insert(instance);

        tracing::info!(controller = %name, path, "controller loaded");
        self.events.send(ControlEvent::ControllerLoaded { name: name.clone() });
        Ok(name)
    }

    /// Run a controller's `destroy` hook and remove it.
    ///
    /// Fails with [`Error::StreamRunning`] while the controller is active
    /// on a running stream.
    pub fn unload_controller(&mut self, name: &str) -> Result<()> {
        let instance = self
            .registry
            .get(name)
            .ok_or_else(|| Error::UnknownController(name.to_string()))?;
        {
            let mut inst = lock(&instance);
            if let Some(stream) = inst.active_streams().first() {
                return Err(Error::StreamRunning(*stream));
            }

            tracing::debug!(controller = %name, "calling destroy()");
            let status = {
                let _span = self.config.tracing.hook_span(name, "destroy").entered();
                let module = inst.module_mut();
                guarded(name, Hook::Destroy, HookStatus::Failed(HOOK_PANIC_CODE), || {
                    module.destroy()
                })
            };
            if let HookStatus::Failed(code) = status {
                hook_failed(&self.events, name, Hook::Destroy, None, None, code);
            }

            let from = inst.advance(None, LifecycleState::Destroyed)?;
            emit_transition(&self.events, name, None, from, LifecycleState::Destroyed);
        }

        self.registry.remove(name);
        tracing::info!(controller = %name, "controller unloaded");
        self.events.send(ControlEvent::ControllerUnloaded {
            name: name.to_string(),
        });
        Ok(())
    }

    /// Names of loaded controllers, in load order.
    pub fn controller_names(&self) -> Vec<String> {
        self.registry.names()
    }

    /// State after a controller's most recent transition.
    pub fn controller_state(&self, name: &str) -> Option<LifecycleState> {
        self.registry.get(name).map(|i| lock(&i).state())
    }

    /// A controller's phase on one stream, if it has seen that stream start.
    pub fn controller_stream_state(&self, name: &str, stream: StreamId) -> Option<LifecycleState> {
        self.registry
            .get(name)
            .and_then(|i| lock(&i).stream_state(stream))
    }

    /// Path a controller was loaded from.
    pub fn controller_path(&self, name: &str) -> Option<String> {
        self.registry.get(name).map(|i| lock(&i).path().to_string())
    }

    /// A controller's help text, if it is loaded and has a `help` hook.
    pub fn help(&self, name: &str) -> Option<String> {
        let instance = self.registry.get(name)?;
        let inst = lock(&instance);
        let module = inst.module();
        guarded(name, Hook::Help, None, || module.help())
    }

    /// Start a stream.
    pub fn start(&mut self, id: StreamId) -> Result<StartReport> {
        let stream = self.streams.get(&id).ok_or(Error::UnknownStream(id))?;
        if stream.state() == StreamState::Running {
            return Err(Error::StreamRunning(id));
        }
        let _span = self.config.tracing.stream_span(id, "start").entered();
        let slots = filter_slots(stream);
        let controllers = self.registry.load_order();
        let mut report = StartReport::default();

        // pre_start
        let mut vetoed = vec![false; slots.len()];
        for instance in &controllers {
            let mut inst = lock(instance);
            let name = inst.name().to_string();
            let from = inst.advance(Some(id), LifecycleState::PreStarted)?;
            emit_transition(&self.events, &name, Some(id), from, LifecycleState::PreStarted);

            for (slot, veto) in slots.iter().zip(vetoed.iter_mut()) {
                let args = hook_args(&self.controller, id, slot);
                tracing::debug!(controller = %name, filter = %slot.name, "calling preStart()");
                let decision = {
                    let _span = self.config.tracing.hook_span(&name, "preStart").entered();
                    let module = inst.module_mut();
                    let mut panicked = false;
                    let decision = guarded(&name, Hook::PreStart, None, || Some(module.pre_start(&args)))
                        .unwrap_or_else(|| {
                            panicked = true;
                            StartDecision::Veto
                        });
                    if panicked {
                        hook_failed(
                            &self.events,
                            &name,
                            Hook::PreStart,
                            Some(id),
                            Some(&slot.name),
                            HOOK_PANIC_CODE,
                        );
                        report.hook_failures += 1;
                    }
                    decision
                };
                if decision == StartDecision::Veto && !*veto {
                    *veto = true;
                    tracing::info!(controller = %name, stream = %id, filter = %slot.name, "filter start vetoed");
                    self.events.send(ControlEvent::StartVetoed {
                        controller: name.clone(),
                        stream: id,
                        filter: slot.name.clone(),
                    });
                }
            }
        }

        // filter start
        let mut started = Vec::new();
        let stream = self.streams.get_mut(&id).ok_or(Error::UnknownStream(id))?;
        for (slot, veto) in slots.iter().zip(&vetoed) {
            let Some(node) = stream.node_mut(slot.id) else {
                continue;
            };
            if *veto {
                node.state = FilterState::Idle;
                report.vetoed.push(slot.name.clone());
                continue;
            }
            let ctx = FilterContext::new(id, &slot.name, self.store.clone());
            match node.filter.start(&ctx) {
                Ok(()) => {
                    node.state = FilterState::Started;
                    self.store.set_filter_started(id, &slot.name, true)?;
                    tracing::debug!(stream = %id, filter = %slot.name, "filter started");
                    self.events.send(ControlEvent::FilterStarted {
                        stream: id,
                        filter: slot.name.clone(),
                    });
                    report.started.push(slot.name.clone());
                    started.push(slot);
                }
                Err(err) => {
                    node.state = FilterState::Failed;
                    tracing::warn!(stream = %id, filter = %slot.name, error = %err, "filter start() failed");
                    self.events.send(ControlEvent::FilterFailed {
                        stream: id,
                        filter: slot.name.clone(),
                        message: err.to_string(),
                    });
                    report.failed.push(Error::FilterStartFailed {
                        filter: slot.name.clone(),
                        message: err.to_string(),
                    });
                }
            }
        }
        stream.set_state(StreamState::Running);

        report.deferred_dispatched = dispatch_deferred(&self.store, &self.deferred_rx, &self.deferred_tx);

        // post_start
        for instance in &controllers {
            let mut inst = lock(instance);
            report.hook_failures += run_filter_hooks(
                &self.events,
                &self.config.tracing,
                &self.controller,
                &mut inst,
                Hook::PostStart,
                id,
                &started,
            );
            let name = inst.name().to_string();
            let from = inst.advance(Some(id), LifecycleState::Started)?;
            emit_transition(&self.events, &name, Some(id), from, LifecycleState::Started);
        }

        tracing::info!(
            stream = %id,
            started = report.started.len(),
            vetoed = report.vetoed.len(),
            failed = report.failed.len(),
            "stream started"
        );
        self.events.send(ControlEvent::StreamStarted { stream: id });
        Ok(report)
    }

    /// Stop a running stream.
    pub fn stop(&mut self, id: StreamId) -> Result<StopReport> {
        let stream = self.streams.get(&id).ok_or(Error::UnknownStream(id))?;
        if stream.state() != StreamState::Running {
            return Err(Error::StreamNotRunning(id));
        }
        let _span = self.config.tracing.stream_span(id, "stop").entered();
        let started: Vec<FilterSlot> = filter_slots(stream)
            .into_iter()
            .filter(|slot| stream.filter_state(slot.id) == Some(FilterState::Started))
            .collect();
        let started: Vec<&FilterSlot> = started.iter().collect();

        // Controllers loaded after the start never saw it.
        let controllers: Vec<SharedInstance> = self
            .registry
            .reverse_order()
            .into_iter()
            .filter(|i| lock(i).stream_state(id) == Some(LifecycleState::Started))
            .collect();
        let mut report = StopReport::default();

        // pre_stop
        for instance in &controllers {
            let mut inst = lock(instance);
            report.hook_failures += run_filter_hooks(
                &self.events,
                &self.config.tracing,
                &self.controller,
                &mut inst,
                Hook::PreStop,
                id,
                &started,
            );
            let name = inst.name().to_string();
            let from = inst.advance(Some(id), LifecycleState::PreStopped)?;
            emit_transition(&self.events, &name, Some(id), from, LifecycleState::PreStopped);
        }

        // filter stop
        let stream = self.streams.get_mut(&id).ok_or(Error::UnknownStream(id))?;
        for slot in &started {
            let Some(node) = stream.node_mut(slot.id) else {
                continue;
            };
            let ctx = FilterContext::new(id, &slot.name, self.store.clone());
            if let Err(err) = node.filter.stop(&ctx) {
                tracing::warn!(stream = %id, filter = %slot.name, error = %err, "filter stop() failed");
                report.failed.push((slot.name.clone(), err));
            }
            node.state = FilterState::Stopped;
            self.store.set_filter_started(id, &slot.name, false)?;
            self.events.send(ControlEvent::FilterStopped {
                stream: id,
                filter: slot.name.clone(),
            });
            report.stopped.push(slot.name.clone());
        }
        stream.set_state(StreamState::Idle);

        // post_stop
        for instance in &controllers {
            let mut inst = lock(instance);
            report.hook_failures += run_filter_hooks(
                &self.events,
                &self.config.tracing,
                &self.controller,
                &mut inst,
                Hook::PostStop,
                id,
                &started,
            );
            let name = inst.name().to_string();
            let from = inst.advance(Some(id), LifecycleState::Stopped)?;
            emit_transition(&self.events, &name, Some(id), from, LifecycleState::Stopped);
        }

        report.subscriptions_removed = self.store.remove_callbacks_for_restart(id);
        dispatch_deferred(&self.store, &self.deferred_rx, &self.deferred_tx);

        tracing::info!(
            stream = %id,
            stopped = report.stopped.len(),
            subscriptions_removed = report.subscriptions_removed,
            "stream stopped"
        );
        self.events.send(ControlEvent::StreamStopped { stream: id });
        Ok(report)
    }

    /// Stop every running stream and unload every controller in reverse
    /// load order. Queries still waiting are dropped.
    ///
    /// Called on drop; calling it twice does nothing.
    pub fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        self.shut_down = true;

        let running: Vec<StreamId> = self
            .streams
            .iter()
            .filter(|(_, s)| s.state() == StreamState::Running)
            .map(|(id, _)| *id)
            .collect();
        for id in running {
            if let Err(err) = self.stop(id) {
                tracing::warn!(stream = %id, error = %err, "stop during shutdown failed");
            }
        }

        let names: Vec<String> = self.registry.names().into_iter().rev().collect();
        for name in names {
            if let Err(err) = self.unload_controller(&name) {
                tracing::warn!(controller = %name, error = %err, "unload during shutdown failed");
            }
        }

        let dropped = discard_deferred(&self.deferred_rx);
        if dropped > 0 {
            tracing::debug!(dropped, "pending parameter queries dropped at shutdown");
        }
        tracing::debug!("control host shut down");
    }
}

impl Default for ControlHost {
    fn default() -> Self {
        Self::new(HostConfig::default())
    }
}

impl Drop for ControlHost {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for ControlHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControlHost")
            .field("controllers", &self.registry)
            .field("streams", &self.streams.len())
            .field("pending_queries", &self.pending_queries())
            .field("store", &self.store)
            .finish()
    }
}

fn construct_filters(store: &Arc<ParameterStore>, id: StreamId, stream: &mut Stream) -> Result<()> {
    for filter_id in stream.filter_ids() {
        let Some(node) = stream.node_mut(filter_id) else {
            continue;
        };
        store.register_filter(id, &node.name)?;
        let ctx = FilterContext::new(id, &node.name, store.clone());
        node.filter.construct(&ctx)?;
    }
    Ok(())
}

fn filter_slots(stream: &Stream) -> Vec<FilterSlot> {
    stream
        .filter_ids()
        .into_iter()
        .filter_map(|id| {
            Some(FilterSlot {
                id,
                name: stream.filter_name(id)?.to_string(),
                num_inputs: stream.num_inputs(id),
                num_outputs: stream.num_outputs(id),
            })
        })
        .collect()
}

fn hook_args<'a>(controller: &'a Controller, stream: StreamId, slot: &'a FilterSlot) -> HookArgs<'a> {
    HookArgs {
        controller,
        stream,
        filter: &slot.name,
        num_inputs: slot.num_inputs,
        num_outputs: slot.num_outputs,
    }
}

/// Run a per-filter advisory hook for every slot. Returns the failure count.
fn run_filter_hooks(
    events: &ControlEventSender,
    tracing_config: &TracingConfig,
    controller: &Controller,
    inst: &mut ControllerInstance,
    hook: Hook,
    stream: StreamId,
    slots: &[&FilterSlot],
) -> usize {
    if !inst.module().has_hook(hook) {
        return 0;
    }
    let name = inst.name().to_string();
    let hook_name = hook.to_string();
    let mut failures = 0;
    for slot in slots {
        let args = hook_args(controller, stream, slot);
        tracing::debug!(controller = %name, filter = %slot.name, hook = %hook_name, "calling hook");
        let _span = tracing_config.hook_span(&name, &hook_name).entered();
        let module = inst.module_mut();
        let status = guarded(&name, hook, HookStatus::Failed(HOOK_PANIC_CODE), || {
            module.filter_hook(hook, &args)
        });
        if let HookStatus::Failed(code) = status {
            hook_failed(events, &name, hook, Some(stream), Some(&slot.name), code);
            failures += 1;
        }
    }
    failures
}

/// Call a hook, turning a panic into `on_panic`.
fn guarded<T, F>(controller: &str, hook: Hook, on_panic: T, f: F) -> T
where
    F: FnOnce() -> T,
{
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(value) => value,
        Err(_) => {
            tracing::error!(controller, %hook, "controller hook panicked");
            on_panic
        }
    }
}

fn hook_failed(
    events: &ControlEventSender,
    controller: &str,
    hook: Hook,
    stream: Option<StreamId>,
    filter: Option<&str>,
    code: i32,
) {
    observability::record_hook_failure(controller, &hook.to_string());
    tracing::warn!(controller, %hook, filter, code, "controller hook reported failure");
    events.send(ControlEvent::HookFailed {
        controller: controller.to_string(),
        hook,
        stream,
        filter: filter.map(str::to_string),
        code,
    });
}

fn emit_transition(
    events: &ControlEventSender,
    controller: &str,
    stream: Option<StreamId>,
    from: LifecycleState,
    to: LifecycleState,
) {
    tracing::trace!(controller, ?stream, ?from, ?to, "lifecycle transition");
    events.send(ControlEvent::LifecycleChanged {
        controller: controller.to_string(),
        stream,
        from,
        to,
    });
}
