//! Stream graph structure using daggy.

use super::filter::{Filter, FilterState};
use crate::error::{Error, Result};
use daggy::petgraph::Direction;
use daggy::{Dag, NodeIndex};
use std::collections::HashMap;

/// Identifier of a filter within its stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FilterId(pub(crate) NodeIndex);

impl FilterId {
    /// Get the underlying index.
    pub fn index(&self) -> usize {
        self.0.index()
    }
}

/// Whether a stream is flowing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum StreamState {
    /// Not started, or stopped.
    #[default]
    Idle,
    /// Started and not yet stopped.
    Running,
}

/// A filter node in the stream graph.
pub(crate) struct FilterNode {
    pub(crate) name: String,
    pub(crate) filter: Box<dyn Filter>,
    pub(crate) state: FilterState,
}

/// A set of filters connected into a directed acyclic graph.
pub struct Stream {
    graph: Dag<FilterNode, ()>,
    filters_by_name: HashMap<String, FilterId>,
    state: StreamState,
    name_counter: u64,
}

impl Stream {
    /// Create a new empty stream.
    pub fn new() -> Self {
        Self {
            graph: Dag::new(),
            filters_by_name: HashMap::new(),
            state: StreamState::Idle,
            name_counter: 0,
        }
    }

    /// Current state.
    pub fn state(&self) -> StreamState {
        self.state
    }

    pub(crate) fn set_state(&mut self, state: StreamState) {
        self.state = state;
    }

    /// Add a filter. Names are unique within a stream.
    pub fn add_filter(&mut self, name: impl Into<String>, filter: impl Filter + 'static) -> Result<FilterId> {
        let name = name.into();
        if self.filters_by_name.contains_key(&name) {
            return Err(Error::DuplicateFilter(name));
        }
        Ok(self.insert(name, Box::new(filter)))
    }

    /// Add a filter with an auto-generated name.
    pub fn add_filter_auto(&mut self, filter: impl Filter + 'static) -> FilterId {
        let mut name = format!("filter_{}", self.name_counter);
        while self.filters_by_name.contains_key(&name) {
            self.name_counter += 1;
            name = format!("filter_{}", self.name_counter);
        }
        self.name_counter += 1;
        self.insert(name, Box::new(filter))
    }

    fn insert(&mut self, name: String, filter: Box<dyn Filter>) -> FilterId {
        let id = FilterId(self.graph.add_node(FilterNode {
            name: name.clone(),
            filter,
            state: FilterState::Idle,
        }));
        self.filters_by_name.insert(name, id);
        id
    }

    /// Connect the output of `src` to the input of `sink`.
    pub fn link(&mut self, src: FilterId, sink: FilterId) -> Result<()> {
        if self.graph.node_weight(src.0).is_none() {
            return Err(Error::InvalidLink("source filter not found".into()));
        }
        if self.graph.node_weight(sink.0).is_none() {
            return Err(Error::InvalidLink("sink filter not found".into()));
        }
        // daggy rejects edges that would close a cycle
        self.graph
            .add_edge(src.0, sink.0, ())
            .map_err(|_| Error::InvalidLink("linking would create a cycle".into()))?;
        Ok(())
    }

    /// Look a filter up by name.
    pub fn filter_id(&self, name: &str) -> Option<FilterId> {
        self.filters_by_name.get(name).copied()
    }

    /// Name of a filter.
    pub fn filter_name(&self, id: FilterId) -> Option<&str> {
        self.graph.node_weight(id.0).map(|n| n.name.as_str())
    }

    /// Run state of a filter.
    pub fn filter_state(&self, id: FilterId) -> Option<FilterState> {
        self.graph.node_weight(id.0).map(|n| n.state)
    }

    pub(crate) fn node_mut(&mut self, id: FilterId) -> Option<&mut FilterNode> {
        self.graph.node_weight_mut(id.0)
    }

    /// Number of links into a filter.
    pub fn num_inputs(&self, id: FilterId) -> u32 {
        self.degree(id, Direction::Incoming)
    }

    /// Number of links out of a filter.
    pub fn num_outputs(&self, id: FilterId) -> u32 {
        self.degree(id, Direction::Outgoing)
    }

    fn degree(&self, id: FilterId, dir: Direction) -> u32 {
        let count = self.graph.graph().edges_directed(id.0, dir).count();
        u32::try_from(count).unwrap_or(u32::MAX)
    }

    /// Every filter, in the order they were added.
    pub fn filter_ids(&self) -> Vec<FilterId> {
        self.graph.graph().node_indices().map(FilterId).collect()
    }

    /// Filters with no inputs.
    pub fn sources(&self) -> Vec<FilterId> {
        self.filter_ids()
            .into_iter()
            .filter(|id| self.num_inputs(*id) == 0)
            .collect()
    }

    /// Filters with no outputs.
    pub fn sinks(&self) -> Vec<FilterId> {
        self.filter_ids()
            .into_iter()
            .filter(|id| self.num_outputs(*id) == 0)
            .collect()
    }

    /// Number of filters.
    pub fn filter_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Number of links.
    pub fn link_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Whether the stream has no filters.
    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }
}

impl Default for Stream {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Stream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stream")
            .field("filters", &self.filter_count())
            .field("links", &self.link_count())
            .field("state", &self.state)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Nop;
    impl Filter for Nop {}

    #[test]
    fn test_add_and_lookup() {
        let mut stream = Stream::new();
        let a = stream.add_filter("src", Nop).unwrap();
        assert_eq!(stream.filter_id("src"), Some(a));
        assert_eq!(stream.filter_name(a), Some("src"));
        assert_eq!(stream.filter_state(a), Some(FilterState::Idle));
        assert_eq!(stream.filter_count(), 1);
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let mut stream = Stream::new();
        stream.add_filter("f", Nop).unwrap();
        assert_eq!(
            stream.add_filter("f", Nop).unwrap_err(),
            Error::DuplicateFilter("f".into())
        );
    }

    #[test]
    fn test_auto_names_skip_taken() {
        let mut stream = Stream::new();
        stream.add_filter("filter_0", Nop).unwrap();
        let id = stream.add_filter_auto(Nop);
        assert_eq!(stream.filter_name(id), Some("filter_1"));
    }

    #[test]
    fn test_port_counts() {
        let mut stream = Stream::new();
        let a = stream.add_filter("a", Nop).unwrap();
        let b = stream.add_filter("b", Nop).unwrap();
        let c = stream.add_filter("c", Nop).unwrap();
        stream.link(a, b).unwrap();
        stream.link(a, c).unwrap();
        stream.link(b, c).unwrap();

        assert_eq!(stream.num_outputs(a), 2);
        assert_eq!(stream.num_inputs(c), 2);
        assert_eq!(stream.sources(), vec![a]);
        assert_eq!(stream.sinks(), vec![c]);
        assert_eq!(stream.filter_ids(), vec![a, b, c]);
    }

    #[test]
    fn test_cycle_rejected() {
        let mut stream = Stream::new();
        let a = stream.add_filter("a", Nop).unwrap();
        let b = stream.add_filter("b", Nop).unwrap();
        stream.link(a, b).unwrap();
        assert!(matches!(stream.link(b, a), Err(Error::InvalidLink(_))));
        assert_eq!(stream.link_count(), 1);
    }
}
