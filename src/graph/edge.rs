//! Defines the `Edge` type, representing data flowing from an output port of
//! one node into an input port of another.

use super::node::NodeId;
use std::fmt;

/// One end of an edge: a node and one of its declared port names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PortRef {
    pub node: NodeId,
    pub port: &'static str,
}

impl fmt::Display for PortRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.node, self.port)
    }
}

/// A directed dependency `source` (output port) -> `target` (input port).
///
/// An input port accepts at most one edge; an output port may fan out freely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Edge {
    pub source: PortRef,
    pub target: PortRef,
}

impl Edge {
    pub fn touches(&self, node: NodeId) -> bool {
        self.source.node == node || self.target.node == node
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PortDirection {
    Input,
    Output,
}

impl fmt::Display for PortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PortDirection::Input => f.write_str("input"),
            PortDirection::Output => f.write_str("output"),
        }
    }
}
