//! topology.rs
//! Reachability and cycle structure of the pipeline graph.

use crate::graph::{NodeId, PipelineGraph};
use petgraph::algo::tarjan_scc;
use petgraph::graphmap::DiGraphMap;
use std::collections::{HashSet, VecDeque};

/// Identifies all nodes downstream from the given start nodes, the start
/// nodes included. Used for incremental invalidation.
pub fn downstream_from(graph: &PipelineGraph, start_nodes: &[NodeId]) -> HashSet<NodeId> {
    let mut visited = HashSet::new();
    let mut queue = VecDeque::from(start_nodes.to_vec());

    while let Some(node) = queue.pop_front() {
        if visited.insert(node) {
            queue.extend(graph.outgoing(node).map(|e| e.target.node));
        }
    }
    visited
}

/// Node-level view of the graph: one edge per connected port pair, parallel
/// port edges collapsed.
pub fn to_petgraph(graph: &PipelineGraph) -> DiGraphMap<NodeId, ()> {
    let mut out = DiGraphMap::with_capacity(graph.node_count(), graph.edge_count());
    for id in graph.node_ids() {
        out.add_node(id);
    }
    for edge in graph.edges() {
        out.add_edge(edge.source.node, edge.target.node, ());
    }
    out
}

/// Strongly connected components that form a cycle (more than one node, or a
/// node feeding itself) and can be reached from `roots`.
///
/// Members of each component are sorted by id; components are ordered by
/// their smallest member.
pub fn cyclic_components(graph: &PipelineGraph, roots: &[NodeId]) -> Vec<Vec<NodeId>> {
    let map = to_petgraph(graph);
    let reachable = downstream_from(graph, roots);

    let mut cycles: Vec<Vec<NodeId>> = tarjan_scc(&map)
        .into_iter()
        .filter(|scc| match scc.as_slice() {
            [single] => map.contains_edge(*single, *single),
            _ => true,
        })
        .filter(|scc| scc.iter().any(|id| reachable.contains(id)))
        .map(|mut scc| {
            scc.sort_unstable();
            scc
        })
        .collect();
    cycles.sort_by_key(|scc| scc[0]);
    cycles
}
