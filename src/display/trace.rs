use crate::graph::{Node, NodeId, NodeState, PipelineGraph};
use std::collections::HashMap;
use std::fmt::Write;

/// Audit trace for `target`: the node, then everything feeding it, upstream,
/// as an indented tree. A node reached twice is printed once and referenced
/// by level afterwards, which also keeps cycles finite.
pub fn format_trace(graph: &PipelineGraph, target: NodeId) -> String {
    let mut tracer = Tracer { graph, visited_at_level: HashMap::new(), output: String::new() };

    if let Some(node) = graph.node(target) {
        let _ = writeln!(tracer.output, "AUDIT TRACE for node '{}':", node.name());
        let _ = writeln!(tracer.output, "--------------------------------------------------");
        tracer.trace_node(target, 1, "");
    } else {
        let _ = writeln!(tracer.output, "Error: Invalid Node ID {}", target);
    }
    tracer.output
}

struct Tracer<'a> {
    graph: &'a PipelineGraph,
    visited_at_level: HashMap<NodeId, usize>,
    output: String,
}

impl<'a> Tracer<'a> {
    fn trace_node(&mut self, node_id: NodeId, level: usize, prefix: &str) {
        if let Some(&first_seen) = self.visited_at_level.get(&node_id) {
            let _ = writeln!(self.output, "{}-> (Ref to L{})", prefix, first_seen);
            return;
        }
        self.visited_at_level.insert(node_id, level);

        let Some(node) = self.graph.node(node_id) else {
            let _ = writeln!(self.output, "{}[L{}] <missing node {}>", prefix, level, node_id);
            return;
        };
        let _ = writeln!(
            self.output,
            "{}[L{}] {} ({}){} {}",
            prefix,
            level,
            node.name(),
            node.kind(),
            format_property(node),
            format_state(node.state())
        );

        let bindings = self.graph.input_bindings(node_id).unwrap_or_default();
        let stem = build_child_stem(prefix);
        for (i, (port, source)) in bindings.iter().enumerate() {
            let connector = if i == bindings.len() - 1 { "`--" } else { "|--" };
            match source {
                Some(source) => {
                    let full_prefix = format!("{}{} {}: ", stem, connector, port);
                    self.trace_node(source.node, level + 1, &full_prefix);
                }
                None => {
                    let _ = writeln!(self.output, "{}{} {}: <not connected>", stem, connector, port);
                }
            }
        }
    }
}

fn format_property(node: &Node) -> String {
    match node.kind().primary_property().and_then(|key| node.property(key)) {
        Some(value) if !value.is_empty() => format!(" {:?}", value),
        _ => String::new(),
    }
}

fn format_state(state: &NodeState) -> String {
    match state {
        NodeState::Ready(table) => format!("=> [{} rows x {} cols]", table.row_count(), table.column_count()),
        NodeState::Failed(err) => format!("=> [Err: {}: {}]", err.error_type, err.message),
        NodeState::Pending => "=> [?]".to_string(),
    }
}

fn build_child_stem(current_prefix: &str) -> String {
    // Drop the port label so children line up under the connector.
    let base = match current_prefix.rfind("--") {
        Some(idx) => &current_prefix[..idx + 2],
        None => current_prefix,
    };
    format!("{}   ", base.replace("`--", "   ").replace("|--", "|  "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{NodeKind, PROP_FILTER_CONDITION};

    #[test]
    fn test_trace_walks_upstream_and_references_repeats() {
        let mut g = PipelineGraph::new();
        let input = g.add_node(NodeKind::Input);
        let filter = g.add_node(NodeKind::Filter);
        g.set_property(filter, PROP_FILTER_CONDITION, "a > 3").unwrap();
        let concat = g.add_node(NodeKind::Concat);
        g.connect(input, "DataFrame", filter, "DataFrame").unwrap();
        g.connect(filter, "Filtered DataFrame", concat, "First").unwrap();
        g.connect(input, "DataFrame", concat, "Second").unwrap();

        let trace = format_trace(&g, concat);
        assert!(trace.starts_with("AUDIT TRACE for node 'Concat Node':"));
        assert!(trace.contains("[L1] Concat Node (Concat) => [?]"));
        assert!(trace.contains("|-- First: [L2] Filter Node (Filter) \"a > 3\" => [?]"));
        assert!(trace.contains("[L3] Input Node (Input) => [?]"));
        assert!(trace.contains("`-- Second: -> (Ref to L3)"));
    }

    #[test]
    fn test_trace_shows_dangling_inputs_and_unknown_ids() {
        let mut g = PipelineGraph::new();
        let filter = g.add_node(NodeKind::Filter);
        assert!(format_trace(&g, filter).contains("`-- DataFrame: <not connected>"));
        assert!(format_trace(&g, NodeId(42)).contains("Invalid Node ID #42"));
    }

    #[test]
    fn test_trace_terminates_on_cycles() {
        let mut g = PipelineGraph::new();
        let a = g.add_node(NodeKind::Filter);
        let b = g.add_node(NodeKind::Filter);
        g.connect(a, "Filtered DataFrame", b, "DataFrame").unwrap();
        g.connect(b, "Filtered DataFrame", a, "DataFrame").unwrap();
        assert!(format_trace(&g, a).contains("-> (Ref to L1)"));
    }
}
