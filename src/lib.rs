//! # Streamknob
//!
//! A host for controller plugins that watch and steer a streaming graph.
//!
//! A controller is a set of optional lifecycle hooks. The host constructs
//! it, calls it around every stream start and stop, and destroys it on
//! unload. In between, the controller reads filter parameters through a
//! non-blocking query: the value arrives through a five-input callback,
//! immediately if the filter is running, otherwise as soon as it starts.
//!
//! ## Quick Start
//!
//! ```rust
//! use streamknob::prelude::*;
//!
//! struct Amp;
//!
//! impl Filter for Amp {
//!     fn construct(&mut self, ctx: &FilterContext) -> Result<()> {
//!         ctx.create_parameter("gain", ParameterType::Int64, ParameterValue::Int64(7))
//!     }
//! }
//!
//! let mut host = ControlHost::new(HostConfig::default());
//! let mut stream = Stream::new();
//! stream.add_filter("F1", Amp)?;
//! let s1 = host.add_stream(stream)?;
//!
//! let module = ControllerModule::new().on_post_start(|args| {
//!     let status = args.controller.get_parameter(
//!         args.stream,
//!         args.filter,
//!         "gain",
//!         Callback::new(|value, _stream, filter, name, _ctx| {
//!             println!("{filter}:{name} = {value}");
//!             0
//!         }),
//!         UserContext::none(),
//!     );
//!     HookStatus::from_code(status.code())
//! });
//! host.load_controller("controllers/gainWatch.so", None, module, &[])?;
//!
//! host.start(s1)?;
//! host.stop(s1)?;
//! # Ok::<(), streamknob::Error>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod controller;
pub mod error;
pub mod host;
pub mod observability;
pub mod parameter;
pub mod stream;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::controller::{
        Callback, CallbackArg, Controller, ControllerModule, HookArgs, HookStatus, QueryStatus,
        StartDecision, UserContext,
    };
    pub use crate::error::{Error, Result};
    pub use crate::host::{ControlEvent, ControlHost, HostConfig};
    pub use crate::parameter::{ParameterType, ParameterValue, ParameterView, SubscribeFlags};
    pub use crate::stream::{Filter, FilterContext, Stream, StreamId};
}

pub use error::{Error, Result};

/// Version of this library.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
