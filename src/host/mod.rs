//! The control host and its configuration, events and naming rules.

mod config;
mod control_host;
mod events;
mod naming;
mod registry;

pub use config::{DEFAULT_MAX_NAME_LEN, HostConfig};
pub use control_host::{ControlHost, HOOK_PANIC_CODE, StartReport, StopReport};
pub use events::{ControlEvent, ControlEventReceiver, ControlEventSender, ControlEventStream};
pub use naming::{MAX_NAME_SUFFIX, derive_name, resolve_name};
