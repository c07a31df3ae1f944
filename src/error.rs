//! Error types shared across the engine.
//!
//! Node-level failures are values (`NodeError`) stored in the run ledger so a
//! failing branch never aborts its siblings. Only `RunError` stops a whole run.

use crate::expr::ExprError;
use crate::graph::{GroupId, Node, NodeId, NodeKind, PortDirection};
use crate::table::SourceError;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// The category of a node failure.
///
// Lets the UI branch on the failure without string matching the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeErrorType {
    /// The source file is missing, unreadable or not tabular.
    SourceRead,
    /// The condition or formula is malformed, references an unknown column,
    /// mixes types or divides by zero.
    Expression,
    /// The node sits on a cycle reachable from a source.
    CycleDetected,
    /// The node was handed the wrong number of input tables.
    MissingInput,
}

impl fmt::Display for NodeErrorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            NodeErrorType::SourceRead => "SourceReadError",
            NodeErrorType::Expression => "ExpressionError",
            NodeErrorType::CycleDetected => "CycleDetectedError",
            NodeErrorType::MissingInput => "MissingInputError",
        })
    }
}

/// A structured failure report for a single node, shown against that node.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{error_type} in {node_kind} node '{node_name}' ({node_id}): {message}")]
pub struct NodeError {
    pub node_id: NodeId,
    pub node_kind: NodeKind,
    pub node_name: String,
    pub error_type: NodeErrorType,
    pub message: String,
}

impl NodeError {
    pub fn at_node(node: &Node, error_type: NodeErrorType, message: impl Into<String>) -> Self {
        Self {
            node_id: node.id(),
            node_kind: node.kind(),
            node_name: node.name().to_string(),
            error_type,
            message: message.into(),
        }
    }

    pub fn source_read(node: &Node, err: &SourceError) -> Self {
        Self::at_node(node, NodeErrorType::SourceRead, err.to_string())
    }

    pub fn expression(node: &Node, err: &ExprError) -> Self {
        Self::at_node(node, NodeErrorType::Expression, err.to_string())
    }

    pub fn cycle(node: &Node, members: &[NodeId]) -> Self {
        let path = members.iter().map(ToString::to_string).collect::<Vec<_>>().join(" -> ");
        Self::at_node(node, NodeErrorType::CycleDetected, format!("cycle through {path}"))
    }
}

/// Failures that stop a run before any node executes.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RunError {
    #[error("NoSourceError: the graph has no Input nodes to start from")]
    NoSource,
}

/// Rejected graph edits.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("node {0} does not exist")]
    UnknownNode(NodeId),
    #[error("node {0} already exists")]
    DuplicateNode(NodeId),
    #[error("{kind} nodes have no {direction} port named '{port}'")]
    UnknownPort { kind: NodeKind, direction: PortDirection, port: String },
    #[error("input '{port}' of node {node} is already connected")]
    InputOccupied { node: NodeId, port: String },
    #[error("no edge feeds input '{port}' of node {node}")]
    EdgeNotFound { node: NodeId, port: String },
    #[error("{0} does not exist")]
    UnknownGroup(GroupId),
}

/// Persistence failures. A failed load never yields a partial graph.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("MalformedDocumentError: {0}")]
    MalformedDocument(String),
    #[error("failed to serialize graph document: {0}")]
    Serialize(#[source] serde_json::Error),
    #[error("failed to access graph document {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
