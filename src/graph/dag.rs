//! dag.rs
//! The editable pipeline graph: nodes keyed by id, edges in creation order,
//! plus canvas groups. The graph is not guaranteed acyclic; the evaluator
//! defends against cycles.

use super::edge::{Edge, PortDirection, PortRef};
use super::group::{Group, GroupId};
use super::node::{Node, NodeId, NodeKind, NodeState, Position};
use crate::analysis::topology;
use crate::compute::Ledger;
use crate::error::GraphError;
use smallvec::SmallVec;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default)]
pub struct PipelineGraph {
    nodes: BTreeMap<NodeId, Node>,
    edges: Vec<Edge>,
    groups: BTreeMap<GroupId, Group>,
    next_node: u32,
    next_group: u32,
    needs_run: bool,
}

impl PipelineGraph {
    pub fn new() -> Self { Self::default() }

    // --- Nodes ---

    pub fn add_node(&mut self, kind: NodeKind) -> NodeId {
        self.add_node_with(kind, kind.display_name(), Position::default())
    }

    pub fn add_node_with(&mut self, kind: NodeKind, name: impl Into<String>, position: Position) -> NodeId {
        let id = NodeId(allocate(&mut self.next_node, self.nodes.keys().map(|id| id.0)));
        self.nodes.insert(id, Node::new(id, kind, name.into(), position));
        self.needs_run = true;
        id
    }

    /// Inserts a node under a caller-chosen id (used when loading a document).
    pub(crate) fn restore_node(&mut self, node: Node) -> Result<(), GraphError> {
        let id = node.id;
        if self.nodes.contains_key(&id) {
            return Err(GraphError::DuplicateNode(id));
        }
        self.next_node = self.next_node.max(id.0.saturating_add(1));
        self.nodes.insert(id, node);
        self.needs_run = true;
        Ok(())
    }

    /// Removes a node together with every edge touching it and its group memberships.
    pub fn remove_node(&mut self, id: NodeId) -> Result<Node, GraphError> {
        if !self.nodes.contains_key(&id) {
            return Err(GraphError::UnknownNode(id));
        }
        // Downstream nodes lose an input, so their last results no longer hold.
        self.invalidate(id);
        self.edges.retain(|e| !e.touches(id));
        for group in self.groups.values_mut() {
            group.members.retain(|m| *m != id);
        }
        self.nodes.remove(&id).ok_or(GraphError::UnknownNode(id))
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> { self.nodes.get(&id) }
    pub fn contains(&self, id: NodeId) -> bool { self.nodes.contains_key(&id) }
    pub fn node_count(&self) -> usize { self.nodes.len() }
    pub fn edge_count(&self) -> usize { self.edges.len() }

    /// Nodes in creation order.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> + '_ { self.nodes.values() }

    pub fn node_ids(&self) -> Vec<NodeId> { self.nodes.keys().copied().collect() }

    /// Nodes without data inputs, in creation order.
    pub fn source_nodes(&self) -> Vec<NodeId> {
        self.nodes.values().filter(|n| n.kind.is_source()).map(|n| n.id).collect()
    }

    /// Sets a configuration property. The node and everything downstream of it
    /// become pending; nothing is evaluated here.
    pub fn set_property(&mut self, id: NodeId, key: impl Into<String>, value: impl Into<String>) -> Result<(), GraphError> {
        let node = self.nodes.get_mut(&id).ok_or(GraphError::UnknownNode(id))?;
        node.properties.insert(key.into(), value.into());
        self.invalidate(id);
        Ok(())
    }

    pub fn remove_property(&mut self, id: NodeId, key: &str) -> Result<Option<String>, GraphError> {
        let node = self.nodes.get_mut(&id).ok_or(GraphError::UnknownNode(id))?;
        let old = node.properties.remove(key);
        if old.is_some() {
            self.invalidate(id);
        }
        Ok(old)
    }

    pub fn rename_node(&mut self, id: NodeId, name: impl Into<String>) -> Result<(), GraphError> {
        let node = self.nodes.get_mut(&id).ok_or(GraphError::UnknownNode(id))?;
        node.name = name.into();
        Ok(())
    }

    pub fn move_node(&mut self, id: NodeId, position: Position) -> Result<(), GraphError> {
        let node = self.nodes.get_mut(&id).ok_or(GraphError::UnknownNode(id))?;
        node.position = position;
        Ok(())
    }

    // --- Edges ---

    /// Connects `source.source_port` to `target.target_port`.
    ///
    /// Both ports must be declared by the nodes' kinds, and the target input
    /// must not already be fed.
    pub fn connect(&mut self, source: NodeId, source_port: &str, target: NodeId, target_port: &str) -> Result<Edge, GraphError> {
        let src_kind = self.nodes.get(&source).ok_or(GraphError::UnknownNode(source))?.kind;
        let dst_kind = self.nodes.get(&target).ok_or(GraphError::UnknownNode(target))?.kind;

        let source_port = src_kind.output_port(source_port).ok_or_else(|| GraphError::UnknownPort {
            kind: src_kind,
            direction: PortDirection::Output,
            port: source_port.to_string(),
        })?;
        let (_, target_port) = dst_kind.input_port(target_port).ok_or_else(|| GraphError::UnknownPort {
            kind: dst_kind,
            direction: PortDirection::Input,
            port: target_port.to_string(),
        })?;

        if self.feeding(target, target_port).is_some() {
            return Err(GraphError::InputOccupied { node: target, port: target_port.to_string() });
        }

        let edge = Edge {
            source: PortRef { node: source, port: source_port },
            target: PortRef { node: target, port: target_port },
        };
        self.edges.push(edge);
        self.invalidate(target);
        Ok(edge)
    }

    /// Removes the edge feeding `target.target_port`.
    pub fn disconnect(&mut self, target: NodeId, target_port: &str) -> Result<Edge, GraphError> {
        if !self.nodes.contains_key(&target) {
            return Err(GraphError::UnknownNode(target));
        }
        let pos = self
            .edges
            .iter()
            .position(|e| e.target.node == target && e.target.port == target_port)
            .ok_or_else(|| GraphError::EdgeNotFound { node: target, port: target_port.to_string() })?;
        self.invalidate(target);
        Ok(self.edges.remove(pos))
    }

    pub fn edges(&self) -> &[Edge] { &self.edges }

    /// Edges leaving `id`, in the order they were created.
    pub fn outgoing(&self, id: NodeId) -> impl Iterator<Item = &Edge> + '_ {
        self.edges.iter().filter(move |e| e.source.node == id)
    }

    pub fn incoming(&self, id: NodeId) -> SmallVec<[&Edge; 2]> {
        self.edges.iter().filter(|e| e.target.node == id).collect()
    }

    fn feeding(&self, target: NodeId, port: &str) -> Option<&Edge> {
        self.edges.iter().find(|e| e.target.node == target && e.target.port == port)
    }

    /// Each declared input port of `id` with the output port feeding it, if any.
    pub fn input_bindings(&self, id: NodeId) -> Option<Vec<(&'static str, Option<PortRef>)>> {
        let node = self.nodes.get(&id)?;
        let bindings = node
            .kind
            .input_ports()
            .iter()
            .map(|&port| (port, self.feeding(id, port).map(|e| e.source)))
            .collect();
        Some(bindings)
    }

    // --- Groups ---

    pub fn add_group(&mut self, name: impl Into<String>, position: Position) -> GroupId {
        let id = GroupId(allocate(&mut self.next_group, self.groups.keys().map(|id| id.0)));
        self.groups.insert(id, Group { id, name: name.into(), position, members: Vec::new() });
        id
    }

    pub(crate) fn restore_group(&mut self, group: Group) -> Result<(), GraphError> {
        if let Some(missing) = group.members.iter().find(|m| !self.nodes.contains_key(m)) {
            return Err(GraphError::UnknownNode(*missing));
        }
        self.next_group = self.next_group.max(group.id.0.saturating_add(1));
        self.groups.insert(group.id, group);
        Ok(())
    }

    pub fn add_to_group(&mut self, group: GroupId, node: NodeId) -> Result<(), GraphError> {
        if !self.nodes.contains_key(&node) {
            return Err(GraphError::UnknownNode(node));
        }
        let group = self.groups.get_mut(&group).ok_or(GraphError::UnknownGroup(group))?;
        if !group.members.contains(&node) {
            group.members.push(node);
        }
        Ok(())
    }

    pub fn remove_from_group(&mut self, group: GroupId, node: NodeId) -> Result<bool, GraphError> {
        let group = self.groups.get_mut(&group).ok_or(GraphError::UnknownGroup(group))?;
        let before = group.members.len();
        group.members.retain(|m| *m != node);
        Ok(group.members.len() != before)
    }

    pub fn rename_group(&mut self, group: GroupId, name: impl Into<String>) -> Result<(), GraphError> {
        let group = self.groups.get_mut(&group).ok_or(GraphError::UnknownGroup(group))?;
        group.name = name.into();
        Ok(())
    }

    /// Drops the group box; its member nodes stay in the graph.
    pub fn remove_group(&mut self, group: GroupId) -> Result<Group, GraphError> {
        self.groups.remove(&group).ok_or(GraphError::UnknownGroup(group))
    }

    pub fn group(&self, id: GroupId) -> Option<&Group> { self.groups.get(&id) }
    pub fn groups(&self) -> impl Iterator<Item = &Group> + '_ { self.groups.values() }

    // --- Run state ---

    /// True once an edit happened after the last run.
    pub fn needs_run(&self) -> bool { self.needs_run }

    /// Marks `id` and everything reachable from it as pending.
    fn invalidate(&mut self, id: NodeId) {
        for node_id in topology::downstream_from(self, &[id]) {
            if let Some(node) = self.nodes.get_mut(&node_id) {
                node.state = NodeState::Pending;
            }
        }
        self.needs_run = true;
    }

    pub(crate) fn reset_states(&mut self) {
        for node in self.nodes.values_mut() {
            node.state = NodeState::Pending;
        }
        self.needs_run = false;
    }

    /// Overwrites every node's state with the outcome recorded for this run.
    pub(crate) fn apply_ledger(&mut self, ledger: &Ledger) {
        for (id, node) in self.nodes.iter_mut() {
            node.state = match ledger.get(*id) {
                Some(Ok(table)) => NodeState::Ready(table.clone()),
                Some(Err(err)) => NodeState::Failed(err.clone()),
                None => NodeState::Pending,
            };
        }
        self.needs_run = false;
    }
}

/// Takes the next id from `counter`. Once a loaded document has pushed the
/// counter to the top of the id space, the lowest id missing from `taken`
/// (ascending) is reused instead.
fn allocate(counter: &mut u32, taken: impl Iterator<Item = u32>) -> u32 {
    if let Some(after) = counter.checked_add(1) {
        let id = *counter;
        *counter = after;
        return id;
    }
    let mut free = 0u32;
    for id in taken {
        if id != free {
            break;
        }
        free = free.saturating_add(1);
    }
    free
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::node::{PROP_FILTER_CONDITION, PROP_FORMULA};
    use crate::table::TableValue;
    use std::sync::Arc;

    fn pipeline() -> (PipelineGraph, NodeId, NodeId, NodeId) {
        let mut g = PipelineGraph::new();
        let input = g.add_node(NodeKind::Input);
        let filter = g.add_node(NodeKind::Filter);
        let calc = g.add_node(NodeKind::Calculation);
        g.connect(input, "DataFrame", filter, "DataFrame").unwrap();
        g.connect(filter, "Filtered DataFrame", calc, "DataFrame").unwrap();
        (g, input, filter, calc)
    }

    #[test]
    fn test_ids_follow_creation_order() {
        let (g, input, filter, calc) = pipeline();
        assert_eq!(g.node_ids(), vec![input, filter, calc]);
        assert_eq!(g.source_nodes(), vec![input]);
        assert_eq!(g.node(filter).unwrap().name(), "Filter Node");
    }

    #[test]
    fn test_exhausted_id_space_reuses_free_ids() {
        let mut g = PipelineGraph::new();
        g.restore_node(Node::new(NodeId(u32::MAX), NodeKind::Input, "Input".into(), Position::default())).unwrap();
        g.restore_node(Node::new(NodeId(0), NodeKind::Input, "Input".into(), Position::default())).unwrap();

        assert_eq!(g.add_node(NodeKind::Filter), NodeId(1));
        assert_eq!(g.add_node(NodeKind::Filter), NodeId(2));
        assert_eq!(g.node_count(), 4);
        assert_eq!(g.node(NodeId(u32::MAX)).unwrap().kind(), NodeKind::Input);
    }

    #[test]
    fn test_allocation_runs_up_to_the_last_id() {
        let mut counter = u32::MAX - 1;
        assert_eq!(allocate(&mut counter, [u32::MAX - 2].into_iter()), u32::MAX - 1);
        assert_eq!(counter, u32::MAX);
        assert_eq!(allocate(&mut counter, [0, 1, 3, u32::MAX - 1].into_iter()), 2);
    }

    #[test]
    fn test_connect_rejects_unknown_ports() {
        let (mut g, input, filter, _) = pipeline();
        let err = g.connect(input, "Nope", filter, "DataFrame").unwrap_err();
        assert!(matches!(err, GraphError::UnknownPort { direction: PortDirection::Output, .. }));

        let err = g.connect(filter, "Filtered DataFrame", input, "DataFrame").unwrap_err();
        assert!(matches!(err, GraphError::UnknownPort { kind: NodeKind::Input, direction: PortDirection::Input, .. }));
    }

    #[test]
    fn test_input_accepts_a_single_producer() {
        let (mut g, _, filter, _) = pipeline();
        let other = g.add_node(NodeKind::Input);
        let err = g.connect(other, "DataFrame", filter, "DataFrame").unwrap_err();
        assert_eq!(err, GraphError::InputOccupied { node: filter, port: "DataFrame".into() });
    }

    #[test]
    fn test_output_fans_out() {
        let (mut g, input, _, _) = pipeline();
        let second = g.add_node(NodeKind::Calculation);
        g.connect(input, "DataFrame", second, "DataFrame").unwrap();
        assert_eq!(g.outgoing(input).count(), 2);
    }

    #[test]
    fn test_remove_node_drops_touching_edges_and_memberships() {
        let (mut g, input, filter, calc) = pipeline();
        let group = g.add_group("Group 1", Position::at(50.0, 50.0));
        g.add_to_group(group, filter).unwrap();
        g.add_to_group(group, calc).unwrap();

        g.remove_node(filter).unwrap();

        assert!(!g.contains(filter));
        assert_eq!(g.edge_count(), 0);
        assert!(g.edges().iter().all(|e| !e.touches(filter)));
        assert_eq!(g.group(group).unwrap().members(), &[calc]);
        assert!(g.contains(input));
        assert_eq!(g.remove_node(filter).unwrap_err(), GraphError::UnknownNode(filter));
    }

    #[test]
    fn test_disconnect_frees_the_input() {
        let (mut g, input, filter, _) = pipeline();
        let edge = g.disconnect(filter, "DataFrame").unwrap();
        assert_eq!(edge.source.node, input);
        assert!(g.connect(input, "DataFrame", filter, "DataFrame").is_ok());
        assert!(matches!(g.disconnect(input, "DataFrame"), Err(GraphError::EdgeNotFound { .. })));
    }

    #[test]
    fn test_input_bindings_report_dangling_ports() {
        let mut g = PipelineGraph::new();
        let input = g.add_node(NodeKind::Input);
        let concat = g.add_node(NodeKind::Concat);
        g.connect(input, "DataFrame", concat, "Second").unwrap();

        let bindings = g.input_bindings(concat).unwrap();
        assert_eq!(bindings[0], ("First", None));
        assert_eq!(bindings[1], ("Second", Some(PortRef { node: input, port: "DataFrame" })));
    }

    #[test]
    fn test_property_edit_invalidates_downstream_only() {
        let (mut g, input, filter, calc) = pipeline();
        let table = Arc::new(TableValue::empty(vec!["a".into()]));
        for id in [input, filter, calc] {
            g.nodes.get_mut(&id).unwrap().state = NodeState::Ready(table.clone());
        }
        g.needs_run = false;

        g.set_property(filter, PROP_FILTER_CONDITION, "a > 1").unwrap();

        assert!(g.needs_run());
        assert!(g.node(input).unwrap().state().output().is_some());
        assert!(g.node(filter).unwrap().state().is_pending());
        assert!(g.node(calc).unwrap().state().is_pending());
        assert_eq!(g.node(filter).unwrap().property(PROP_FILTER_CONDITION), Some("a > 1"));
    }

    #[test]
    fn test_cosmetic_edits_do_not_require_a_run() {
        let (mut g, _, _, calc) = pipeline();
        g.needs_run = false;
        g.rename_node(calc, "Totals").unwrap();
        g.move_node(calc, Position::at(10.0, 20.0)).unwrap();
        assert!(!g.needs_run());
        assert_eq!(g.node(calc).unwrap().name(), "Totals");

        g.set_property(calc, PROP_FORMULA, "df['a'] * 2").unwrap();
        assert!(g.needs_run());
    }

    #[test]
    fn test_group_editing() {
        let (mut g, input, _, _) = pipeline();
        let group = g.add_group("New Group", Position::default());
        g.add_to_group(group, input).unwrap();
        g.add_to_group(group, input).unwrap();
        g.rename_group(group, "Sources").unwrap();

        let stored = g.group(group).unwrap();
        assert_eq!(stored.name(), "Sources");
        assert_eq!(stored.members(), &[input]);

        assert!(g.remove_from_group(group, input).unwrap());
        g.remove_group(group).unwrap();
        assert_eq!(g.add_to_group(group, input).unwrap_err(), GraphError::UnknownGroup(group));
    }
}
