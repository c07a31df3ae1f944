//! Runs the pipeline: per-node transforms, depth-first propagation and the
//! per-run ledger of outcomes.
pub mod engine;
pub mod ledger;
mod transform;

pub use engine::Evaluator;
pub use ledger::{Ledger, NodeOutcome, RunReport};
