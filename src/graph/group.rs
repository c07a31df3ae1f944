//! Named boxes that collect nodes on the canvas. Data only: a group never
//! affects evaluation.

use super::node::{NodeId, Position};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupId(pub u32);

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "group#{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Group {
    pub(crate) id: GroupId,
    pub(crate) name: String,
    pub(crate) position: Position,
    pub(crate) members: Vec<NodeId>,
}

impl Group {
    pub fn id(&self) -> GroupId { self.id }
    pub fn name(&self) -> &str { &self.name }
    pub fn position(&self) -> Position { self.position }
    pub fn members(&self) -> &[NodeId] { &self.members }

    pub fn contains(&self, node: NodeId) -> bool { self.members.contains(&node) }
}
