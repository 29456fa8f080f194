//! Streams: graphs of filters that own parameters.

mod filter;
mod graph;

pub use filter::{Filter, FilterContext, FilterState};
pub use graph::{FilterId, Stream, StreamState};

use std::fmt;

/// Identifier of a stream attached to a host.
///
/// Opaque to controllers; they only pass it back in queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StreamId(u32);

impl StreamId {
    /// Wrap a raw id.
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// The raw id.
    pub fn as_u32(self) -> u32 {
        self.0
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "S{}", self.0)
    }
}
