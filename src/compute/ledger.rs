//! ledger.rs
//! Per-run record of node outcomes, in evaluation order.

use crate::error::NodeError;
use crate::graph::NodeId;
use crate::table::TableValue;
use std::collections::HashMap;
use std::sync::Arc;

/// What one node produced during a run.
pub type NodeOutcome = Result<Arc<TableValue>, NodeError>;

#[derive(Debug, Clone, Default)]
pub struct Ledger {
    values: HashMap<NodeId, NodeOutcome>,
    order: Vec<NodeId>,
}

impl Ledger {
    pub fn new() -> Self { Self::default() }

    #[inline(always)]
    pub fn get(&self, node_id: NodeId) -> Option<&NodeOutcome> {
        self.values.get(&node_id)
    }

    pub fn contains(&self, node_id: NodeId) -> bool { self.values.contains_key(&node_id) }

    /// Records an outcome. A node keeps its first position in the order even
    /// if it is overwritten.
    pub fn insert(&mut self, node_id: NodeId, outcome: NodeOutcome) {
        if self.values.insert(node_id, outcome).is_none() {
            self.order.push(node_id);
        }
    }

    pub fn order(&self) -> &[NodeId] { &self.order }
    pub fn len(&self) -> usize { self.order.len() }
    pub fn is_empty(&self) -> bool { self.order.is_empty() }

    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &NodeOutcome)> + '_ {
        self.order.iter().filter_map(|id| self.values.get(id).map(|o| (*id, o)))
    }
}

/// The result of one run, handed back to the caller for display.
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    ledger: Ledger,
}

impl RunReport {
    pub(crate) fn new(ledger: Ledger) -> Self {
        Self { ledger }
    }

    pub fn outcome(&self, id: NodeId) -> Option<&NodeOutcome> { self.ledger.get(id) }

    pub fn output(&self, id: NodeId) -> Option<&Arc<TableValue>> {
        self.ledger.get(id)?.as_ref().ok()
    }

    pub fn error(&self, id: NodeId) -> Option<&NodeError> {
        self.ledger.get(id)?.as_ref().err()
    }

    /// Failures in the order they happened.
    pub fn errors(&self) -> impl Iterator<Item = &NodeError> + '_ {
        self.ledger.iter().filter_map(|(_, o)| o.as_ref().err())
    }

    /// Every node that was evaluated or failed, in evaluation order.
    pub fn evaluation_order(&self) -> &[NodeId] { self.ledger.order() }

    pub fn evaluated_count(&self) -> usize { self.ledger.len() }
    pub fn failed_count(&self) -> usize { self.errors().count() }
    pub fn is_clean(&self) -> bool { self.failed_count() == 0 }

    pub fn ledger(&self) -> &Ledger { &self.ledger }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_keeps_first_position() {
        let mut ledger = Ledger::new();
        let table = Arc::new(TableValue::default());
        ledger.insert(NodeId(2), Ok(table.clone()));
        ledger.insert(NodeId(0), Ok(table.clone()));
        ledger.insert(NodeId(2), Ok(table));

        assert_eq!(ledger.order(), &[NodeId(2), NodeId(0)]);
        assert_eq!(ledger.len(), 2);
        assert!(ledger.contains(NodeId(0)));
        assert!(ledger.get(NodeId(1)).is_none());
    }
}
