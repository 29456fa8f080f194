//! Error types for streamknob.

use crate::controller::LifecycleState;
use crate::parameter::ParameterType;
use crate::stream::StreamId;
use thiserror::Error;

/// Result type alias using streamknob's Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for host, stream and parameter operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// No stream with this id is attached to the host.
    #[error("unknown stream: {0}")]
    UnknownStream(StreamId),

    /// The stream has no filter with this name.
    #[error("unknown filter '{0}'")]
    UnknownFilter(String),

    /// The filter owns no parameter with this name.
    #[error("unknown parameter '{filter}:{name}'")]
    UnknownParameter {
        /// Owning filter.
        filter: String,
        /// Requested parameter name.
        name: String,
    },

    /// A filter with this name already exists in the stream.
    #[error("filter '{0}' already exists in stream")]
    DuplicateFilter(String),

    /// The parameter already exists for this filter.
    #[error("parameter '{filter}:{name}' already exists")]
    ParameterExists {
        /// Owning filter.
        filter: String,
        /// Parameter name.
        name: String,
    },

    /// Requested type does not match the parameter's declared type.
    #[error("parameter '{filter}:{name}' has type {actual}, not requested type {requested}")]
    TypeMismatch {
        /// Owning filter.
        filter: String,
        /// Parameter name.
        name: String,
        /// Declared type.
        actual: ParameterType,
        /// Type the caller asked for.
        requested: ParameterType,
    },

    /// Operation is not allowed while the stream is flowing.
    #[error("stream {0} is running")]
    StreamRunning(StreamId),

    /// Operation requires a running stream.
    #[error("stream {0} is not running")]
    StreamNotRunning(StreamId),

    /// Linking would create a cycle or references a missing node.
    #[error("invalid link: {0}")]
    InvalidLink(String),

    /// A controller with this name is already loaded.
    #[error("controller name '{0}' is in use already")]
    ControllerExists(String),

    /// No controller with this name is loaded.
    #[error("controller '{0}' not found")]
    UnknownController(String),

    /// The controller name exceeds the configured limit.
    #[error("controller name '{name}' is longer than {max} bytes")]
    NameTooLong {
        /// The offending name.
        name: String,
        /// Configured limit.
        max: usize,
    },

    /// A unique controller name could not be generated.
    #[error("could not generate a unique name for controller '{0}'")]
    NameExhausted(String),

    /// The controller's construct hook returned a failure code.
    #[error("controller '{name}' construct() failed with code {code}")]
    ConstructFailed {
        /// Controller name.
        name: String,
        /// Code returned by the hook.
        code: i32,
    },

    /// A lifecycle transition that the state machine does not allow.
    #[error("invalid lifecycle transition {from:?} -> {to:?}")]
    InvalidTransition {
        /// Current state.
        from: LifecycleState,
        /// Requested state.
        to: LifecycleState,
    },

    /// A filter failed to start.
    #[error("filter '{filter}' failed to start: {message}")]
    FilterStartFailed {
        /// Filter name.
        filter: String,
        /// Failure description.
        message: String,
    },
}
