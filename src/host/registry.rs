//! Registry of loaded controller instances.
//!
//! Instances are kept in load order; start hooks walk it forwards, stop
//! hooks backwards.

use crate::controller::{ControllerModule, LifecycleState};
use crate::error::Result;
use crate::stream::StreamId;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// A loaded controller.
pub(crate) struct ControllerInstance {
    name: String,
    path: String,
    args: Vec<String>,
    /// State after the most recent transition on any stream.
    state: LifecycleState,
    /// Phase per stream the controller has seen start.
    streams: HashMap<StreamId, LifecycleState>,
    module: ControllerModule,
}

impl ControllerInstance {
    pub(crate) fn new(name: String, path: &str, args: Vec<String>, module: ControllerModule) -> Self {
        Self {
            name,
            path: path.to_string(),
            args,
            state: LifecycleState::Unconstructed,
            streams: HashMap::new(),
            module,
        }
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn path(&self) -> &str {
        &self.path
    }

    pub(crate) fn args(&self) -> &[String] {
        &self.args
    }

    pub(crate) fn state(&self) -> LifecycleState {
        self.state
    }

    pub(crate) fn stream_state(&self, stream: StreamId) -> Option<LifecycleState> {
        self.streams.get(&stream).copied()
    }

    pub(crate) fn module(&self) -> &ControllerModule {
        &self.module
    }

    pub(crate) fn module_mut(&mut self) -> &mut ControllerModule {
        &mut self.module
    }

    /// Move to `to`, on one stream or on the instance as a whole.
    ///
    /// A stream the instance has not seen yet starts out `Constructed`.
    /// Returns the state left behind.
    pub(crate) fn advance(&mut self, stream: Option<StreamId>, to: LifecycleState) -> Result<LifecycleState> {
        let from = match stream {
            Some(stream) => {
                let phase = self
                    .streams
                    .entry(stream)
                    .or_insert(LifecycleState::Constructed);
                let from = *phase;
                phase.transition(to)?;
                from
            }
            None => {
                let from = self.state;
                let mut next = from;
                next.transition(to)?;
                from
            }
        };
        self.state = to;
        Ok(from)
    }

    /// Whether any stream is between `pre_start` and `post_stop`.
    pub(crate) fn is_active(&self) -> bool {
        self.streams.values().any(|phase| phase.is_active())
    }

    /// Streams on which the instance is active.
    pub(crate) fn active_streams(&self) -> Vec<StreamId> {
        let mut streams: Vec<StreamId> = self
            .streams
            .iter()
            .filter(|(_, phase)| phase.is_active())
            .map(|(id, _)| *id)
            .collect();
        streams.sort();
        streams
    }
}

impl std::fmt::Debug for ControllerInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControllerInstance")
            .field("name", &self.name)
            .field("path", &self.path)
            .field("state", &self.state)
            .field("module", &self.module)
            .finish()
    }
}

pub(crate) type SharedInstance = Arc<Mutex<ControllerInstance>>;

/// Lock an instance, recovering from a panic in an earlier holder.
pub(crate) fn lock(instance: &SharedInstance) -> MutexGuard<'_, ControllerInstance> {
    instance.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Loaded controllers by name, in load order.
#[derive(Default)]
pub(crate) struct ControllerRegistry {
    order: Vec<SharedInstance>,
    by_name: HashMap<String, SharedInstance>,
}

impl ControllerRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    pub(crate) fn insert(&mut self, instance: ControllerInstance) -> SharedInstance {
        let name = instance.name().to_string();
        let shared = Arc::new(Mutex::new(instance));
        self.order.push(shared.clone());
        self.by_name.insert(name, shared.clone());
        shared
    }

    pub(crate) fn get(&self, name: &str) -> Option<SharedInstance> {
        self.by_name.get(name).cloned()
    }

    pub(crate) fn remove(&mut self, name: &str) -> Option<SharedInstance> {
        let removed = self.by_name.remove(name)?;
        self.order.retain(|i| !Arc::ptr_eq(i, &removed));
        Some(removed)
    }

    pub(crate) fn load_order(&self) -> Vec<SharedInstance> {
        self.order.clone()
    }

    pub(crate) fn reverse_order(&self) -> Vec<SharedInstance> {
        self.order.iter().rev().cloned().collect()
    }

    pub(crate) fn names(&self) -> Vec<String> {
        self.order.iter().map(|i| lock(i).name().to_string()).collect()
    }
}

impl std::fmt::Debug for ControllerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControllerRegistry")
            .field("controllers", &self.names())
            .finish()
    }
}
