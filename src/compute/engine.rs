//! engine.rs
//! Pushes tables from the source nodes through the pipeline, depth-first.
//!
//! Propagation keeps the shape of a recursive walk (a produced table follows
//! each outgoing edge to the end before the next sibling edge is tried) but
//! runs on an explicit stack so deep pipelines cannot overflow the call stack.

use super::ledger::{Ledger, RunReport};
use super::transform;
use crate::analysis::topology;
use crate::config::EngineConfig;
use crate::error::{NodeError, RunError};
use crate::graph::{Edge, Node, NodeId, PipelineGraph};
use crate::table::TableValue;
use smallvec::{smallvec, SmallVec};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Tables attached to a node's input ports during the current run.
type InputSlots = SmallVec<[Option<Arc<TableValue>>; 2]>;

/// One node whose output is being handed to its consumers.
struct Frame {
    node: NodeId,
    value: Arc<TableValue>,
    edges: Vec<Edge>,
    next: usize,
}

#[derive(Debug, Clone, Default)]
pub struct Evaluator {
    config: EngineConfig,
}

impl Evaluator {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EngineConfig { &self.config }

    /// Evaluates a single node against input tables given in declared
    /// input-port order. Does not touch the graph.
    pub fn evaluate_node(&self, node: &Node, inputs: &[Arc<TableValue>]) -> Result<Arc<TableValue>, NodeError> {
        transform::evaluate(node, inputs, &self.config).map(Arc::new)
    }

    /// Runs the whole pipeline once and stores every outcome on the nodes.
    ///
    /// State from a previous run is discarded first. Only the absence of any
    /// source node fails the run; node failures halt their own branch.
    #[tracing::instrument(skip_all, fields(nodes = graph.node_count(), edges = graph.edge_count()))]
    pub fn run(&self, graph: &mut PipelineGraph) -> Result<RunReport, RunError> {
        tracing::debug!("run started");
        graph.reset_states();

        let sources = graph.source_nodes();
        if sources.is_empty() {
            tracing::warn!("run requested on a graph without Input nodes");
            return Err(RunError::NoSource);
        }

        let ledger = self.propagate(graph, &sources);
        graph.apply_ledger(&ledger);

        let report = RunReport::new(ledger);
        tracing::info!(
            evaluated = report.evaluated_count(),
            failed = report.failed_count(),
            "run finished"
        );
        Ok(report)
    }

    fn propagate(&self, graph: &PipelineGraph, sources: &[NodeId]) -> Ledger {
        // 1. Cycles reachable from a source never become ready, so find them up front.
        let mut cyclic: HashMap<NodeId, Arc<[NodeId]>> = HashMap::new();
        for members in topology::cyclic_components(graph, sources) {
            let members: Arc<[NodeId]> = members.into();
            for id in members.iter() {
                cyclic.insert(*id, members.clone());
            }
        }

        let mut ledger = Ledger::new();
        let mut slots: HashMap<NodeId, InputSlots> = HashMap::new();
        let mut on_path: HashSet<NodeId> = HashSet::new();
        let mut stack: Vec<Frame> = Vec::new();

        // 2. Walk each source in creation order.
        for &source in sources {
            let Some(node) = graph.node(source) else { continue };
            let Some(value) = self.record(node, &[], &mut ledger) else { continue };
            on_path.insert(source);
            stack.push(Frame::new(graph, source, value));

            // 3. Depth-first delivery along outgoing edges.
            while let Some(frame) = stack.last_mut() {
                if frame.next == frame.edges.len() {
                    on_path.remove(&frame.node);
                    stack.pop();
                    continue;
                }
                let edge = frame.edges[frame.next];
                frame.next += 1;
                let value = frame.value.clone();

                let target = edge.target.node;
                let Some(node) = graph.node(target) else { continue };

                if on_path.contains(&target) || cyclic.contains_key(&target) {
                    let members: Vec<NodeId> = match cyclic.get(&target) {
                        Some(members) => members.to_vec(),
                        None => active_cycle(&stack, target),
                    };
                    if !matches!(ledger.get(target), Some(Err(_))) {
                        tracing::warn!(node = %target, "cycle detected, branch halted");
                        ledger.insert(target, Err(NodeError::cycle(node, &members)));
                    }
                    continue;
                }

                let ports = node.kind().input_ports();
                let Some((idx, _)) = node.kind().input_port(edge.target.port) else { continue };
                let attached = slots.entry(target).or_insert_with(|| smallvec![None; ports.len()]);
                attached[idx] = Some(value);

                // 4. A node runs once, after every declared input has a table.
                if ledger.contains(target) || attached.iter().any(Option::is_none) {
                    continue;
                }
                let inputs: SmallVec<[Arc<TableValue>; 2]> = attached.iter().flatten().cloned().collect();
                if let Some(value) = self.record(node, &inputs, &mut ledger) {
                    on_path.insert(target);
                    stack.push(Frame::new(graph, target, value));
                }
            }
        }

        for (id, attached) in &slots {
            if !ledger.contains(*id) {
                let missing = attached.iter().filter(|s| s.is_none()).count();
                tracing::debug!(node = %id, missing, "node not evaluated, inputs incomplete");
            }
        }
        ledger
    }

    /// Evaluates `node`, records the outcome and returns the table to propagate.
    fn record(&self, node: &Node, inputs: &[Arc<TableValue>], ledger: &mut Ledger) -> Option<Arc<TableValue>> {
        let outcome = self.evaluate_node(node, inputs);
        match &outcome {
            Ok(table) => {
                tracing::debug!(node = %node.id(), rows = table.row_count(), cols = table.column_count(), "node evaluated")
            }
            Err(err) => tracing::warn!(node = %node.id(), error = %err, "node failed, branch halted"),
        }
        let value = outcome.as_ref().ok().cloned();
        ledger.insert(node.id(), outcome);
        value
    }
}

impl Frame {
    fn new(graph: &PipelineGraph, node: NodeId, value: Arc<TableValue>) -> Self {
        Self { node, value, edges: graph.outgoing(node).copied().collect(), next: 0 }
    }
}

/// The active path from `target` down to the node currently delivering.
fn active_cycle(stack: &[Frame], target: NodeId) -> Vec<NodeId> {
    let start = stack.iter().position(|f| f.node == target).unwrap_or(0);
    stack[start..].iter().map(|f| f.node).collect()
}
