//! Execution core of a visual data-pipeline editor.
//!
//! A [`PipelineGraph`] holds nodes (CSV inputs, row filters, derived-column
//! calculations, concatenations) wired output-to-input. The [`Evaluator`]
//! pushes a table from every source node through the graph, depth-first,
//! recording a table or a [`NodeError`] on each node it reaches.
//! [`GraphStore`] persists the graph as JSON, [`display`] renders results and
//! audit traces, and [`codegen`] runs code-generation requests off the
//! evaluation path.
//!
//! Canvas rendering and every other widget concern live in the UI layer,
//! which calls into this crate.

pub mod analysis;
pub mod codegen;
pub mod compute;
pub mod config;
pub mod display;
pub mod error;
pub mod expr;
pub mod graph;
pub mod store;
pub mod table;

pub use compute::{Evaluator, Ledger, NodeOutcome, RunReport};
pub use config::EngineConfig;
pub use error::{GraphError, NodeError, NodeErrorType, RunError, StoreError};
pub use graph::{Edge, Node, NodeId, NodeKind, NodeState, PipelineGraph, PortRef, Position};
pub use store::{GraphDocument, GraphStore};
pub use table::{Cell, TableValue};
