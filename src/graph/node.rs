//! Defines the `Node` and its associated types, representing a single
//! stage of the data pipeline.

use crate::error::NodeError;
use crate::table::TableValue;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;

/// A unique, stable identifier for a node within a graph.
///
/// Ids are handed out monotonically, so ordering by id is ordering by creation
/// (until a loaded document exhausts the id space; see `PipelineGraph::add_node`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub u32);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Property holding the path of the tabular file an `Input` node reads.
pub const PROP_FILE_PATH: &str = "file_path";
/// Property holding the row predicate of a `Filter` node.
pub const PROP_FILTER_CONDITION: &str = "filter_condition";
/// Property holding the per-row expression of a `Calculation` node.
pub const PROP_FORMULA: &str = "formula";

/// The closed set of node kinds the engine knows how to evaluate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    /// Reads a CSV file. Has no data inputs, so it is where propagation starts.
    Input,
    /// Keeps the rows matching a boolean condition.
    Filter,
    /// Appends one derived column computed by a formula.
    Calculation,
    /// Stacks two tables, `First` then `Second`, over the union of their columns.
    Concat,
}

impl NodeKind {
    pub const ALL: [NodeKind; 4] = [NodeKind::Input, NodeKind::Filter, NodeKind::Calculation, NodeKind::Concat];

    pub fn as_str(self) -> &'static str {
        match self {
            NodeKind::Input => "Input",
            NodeKind::Filter => "Filter",
            NodeKind::Calculation => "Calculation",
            NodeKind::Concat => "Concat",
        }
    }

    /// The default label a freshly created node carries.
    pub fn display_name(self) -> &'static str {
        match self {
            NodeKind::Input => "Input Node",
            NodeKind::Filter => "Filter Node",
            NodeKind::Calculation => "Calculation Node",
            NodeKind::Concat => "Concat Node",
        }
    }

    /// Declared data inputs. Every one of them must be fed before the node runs.
    pub fn input_ports(self) -> &'static [&'static str] {
        match self {
            NodeKind::Input => &[],
            NodeKind::Filter | NodeKind::Calculation => &["DataFrame"],
            NodeKind::Concat => &["First", "Second"],
        }
    }

    pub fn output_ports(self) -> &'static [&'static str] {
        match self {
            NodeKind::Input => &["DataFrame"],
            NodeKind::Filter => &["Filtered DataFrame"],
            NodeKind::Calculation => &["Calculated DataFrame"],
            NodeKind::Concat => &["Combined DataFrame"],
        }
    }

    /// The configuration property that drives this kind, if any.
    pub fn primary_property(self) -> Option<&'static str> {
        match self {
            NodeKind::Input => Some(PROP_FILE_PATH),
            NodeKind::Filter => Some(PROP_FILTER_CONDITION),
            NodeKind::Calculation => Some(PROP_FORMULA),
            NodeKind::Concat => None,
        }
    }

    /// Source nodes have no data inputs.
    pub fn is_source(self) -> bool { self.input_ports().is_empty() }

    pub(crate) fn input_port(self, name: &str) -> Option<(usize, &'static str)> {
        self.input_ports().iter().enumerate().find(|(_, p)| **p == name).map(|(i, p)| (i, *p))
    }

    pub(crate) fn output_port(self, name: &str) -> Option<&'static str> {
        self.output_ports().iter().find(|p| **p == name).copied()
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown node kind '{0}'")]
pub struct ParseKindError(pub String);

impl FromStr for NodeKind {
    type Err = ParseKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NodeKind::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| ParseKindError(s.to_string()))
    }
}

/// Canvas placement of a node or group. Purely cosmetic, but persisted.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    #[serde(default = "default_width")]
    pub width: f64,
    #[serde(default = "default_height")]
    pub height: f64,
}

fn default_width() -> f64 { 100.0 }
fn default_height() -> f64 { 40.0 }

impl Position {
    pub fn at(x: f64, y: f64) -> Self {
        Self { x, y, ..Self::default() }
    }
}

impl Default for Position {
    fn default() -> Self {
        Self { x: 0.0, y: 0.0, width: default_width(), height: default_height() }
    }
}

/// The result of the most recent run for one node.
#[derive(Debug, Clone, Default)]
pub enum NodeState {
    /// Not evaluated by the last run, or invalidated by an edit since.
    #[default]
    Pending,
    Ready(Arc<TableValue>),
    Failed(NodeError),
}

impl NodeState {
    pub fn output(&self) -> Option<&Arc<TableValue>> {
        match self {
            NodeState::Ready(table) => Some(table),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&NodeError> {
        match self {
            NodeState::Failed(err) => Some(err),
            _ => None,
        }
    }

    pub fn is_pending(&self) -> bool { matches!(self, NodeState::Pending) }
}

/// A pipeline stage: kind, configuration and the transient state of the last run.
///
/// Nodes are owned by a [`PipelineGraph`](super::PipelineGraph); all mutation
/// goes through the graph so edits can invalidate downstream results.
#[derive(Debug, Clone)]
pub struct Node {
    pub(crate) id: NodeId,
    pub(crate) kind: NodeKind,
    pub(crate) name: String,
    pub(crate) properties: BTreeMap<String, String>,
    pub(crate) position: Position,
    pub(crate) state: NodeState,
}

impl Node {
    pub(crate) fn new(id: NodeId, kind: NodeKind, name: String, position: Position) -> Self {
        Self {
            id,
            kind,
            name,
            properties: BTreeMap::new(),
            position,
            state: NodeState::Pending,
        }
    }

    pub fn id(&self) -> NodeId { self.id }
    pub fn kind(&self) -> NodeKind { self.kind }
    pub fn name(&self) -> &str { &self.name }
    pub fn position(&self) -> Position { self.position }
    pub fn properties(&self) -> &BTreeMap<String, String> { &self.properties }
    pub fn state(&self) -> &NodeState { &self.state }

    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("Input", NodeKind::Input)]
    #[case("Filter", NodeKind::Filter)]
    #[case("Calculation", NodeKind::Calculation)]
    #[case("Concat", NodeKind::Concat)]
    fn test_kind_parses_its_own_name(#[case] text: &str, #[case] kind: NodeKind) {
        assert_eq!(text.parse::<NodeKind>(), Ok(kind));
        assert_eq!(kind.to_string(), text);
    }

    #[test]
    fn test_unknown_kind_is_rejected() {
        let err = "Sort".parse::<NodeKind>().unwrap_err();
        assert_eq!(err, ParseKindError("Sort".into()));
    }

    #[test]
    fn test_only_input_is_a_source() {
        let sources: Vec<_> = NodeKind::ALL.into_iter().filter(|k| k.is_source()).collect();
        assert_eq!(sources, vec![NodeKind::Input]);
    }

    #[test]
    fn test_port_lookup() {
        assert_eq!(NodeKind::Concat.input_port("Second"), Some((1, "Second")));
        assert_eq!(NodeKind::Filter.input_port("Second"), None);
        assert_eq!(NodeKind::Filter.output_port("Filtered DataFrame"), Some("Filtered DataFrame"));
    }
}
