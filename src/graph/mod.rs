//! Defines the core data structures for the pipeline graph.
pub mod dag;
pub mod edge;
pub mod group;
pub mod node;

// Re-export key types for convenient access
pub use dag::PipelineGraph;
pub use edge::{Edge, PortDirection, PortRef};
pub use group::{Group, GroupId};
pub use node::{Node, NodeId, NodeKind, NodeState, Position, PROP_FILE_PATH, PROP_FILTER_CONDITION, PROP_FORMULA};
