//! Structural queries over the pipeline graph.
pub mod topology;
