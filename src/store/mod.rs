//! Saves and restores pipeline graphs as JSON documents.
//!
//! Loading is all-or-nothing: the graph is assembled privately and handed
//! back only once every node, edge and group checked out.

pub mod document;

pub use document::{EdgeRecord, GraphDocument, GroupRecord, NodeRecord, DOCUMENT_VERSION};

use crate::error::{GraphError, StoreError};
use crate::graph::{Group, Node, NodeKind, PipelineGraph};
use std::fs;
use std::path::Path;

pub struct GraphStore;

impl GraphStore {
    /// Snapshot of the graph's topology and configuration.
    pub fn save(graph: &PipelineGraph) -> GraphDocument {
        let nodes = graph
            .nodes()
            .map(|node| NodeRecord {
                id: node.id(),
                kind: node.kind().to_string(),
                name: Some(node.name().to_string()),
                properties: node.properties().clone(),
                position: node.position(),
            })
            .collect();

        let edges = graph
            .edges()
            .iter()
            .map(|edge| EdgeRecord {
                source_node_id: edge.source.node,
                source_port: edge.source.port.to_string(),
                target_node_id: edge.target.node,
                target_port: edge.target.port.to_string(),
            })
            .collect();

        let groups = graph
            .groups()
            .map(|group| GroupRecord {
                id: group.id(),
                name: group.name().to_string(),
                position: group.position(),
                members: group.members().to_vec(),
            })
            .collect();

        GraphDocument { version: DOCUMENT_VERSION, nodes, edges, groups }
    }

    /// Rebuilds a graph from `doc`. Node and group ids are kept as written.
    pub fn load(doc: &GraphDocument) -> Result<PipelineGraph, StoreError> {
        if doc.version > DOCUMENT_VERSION {
            return Err(malformed(format!(
                "document version {} is newer than supported version {}",
                doc.version, DOCUMENT_VERSION
            )));
        }

        let mut graph = PipelineGraph::new();

        // 1. Nodes
        for record in &doc.nodes {
            let kind: NodeKind = record
                .kind
                .parse()
                .map_err(|e| malformed(format!("node {}: {}", record.id, e)))?;
            let name = record.name.clone().unwrap_or_else(|| kind.display_name().to_string());
            let mut node = Node::new(record.id, kind, name, record.position);
            node.properties = record.properties.clone();
            graph.restore_node(node).map_err(graph_error)?;
        }

        // 2. Edges
        for (idx, record) in doc.edges.iter().enumerate() {
            for endpoint in [record.source_node_id, record.target_node_id] {
                if !graph.contains(endpoint) {
                    return Err(malformed(format!("edge {} references unknown node {}", idx, endpoint)));
                }
            }
            graph
                .connect(record.source_node_id, &record.source_port, record.target_node_id, &record.target_port)
                .map_err(|e| malformed(format!("edge {}: {}", idx, e)))?;
        }

        // 3. Groups
        for record in &doc.groups {
            if graph.group(record.id).is_some() {
                return Err(malformed(format!("duplicate {}", record.id)));
            }
            let group = Group {
                id: record.id,
                name: record.name.clone(),
                position: record.position,
                members: record.members.clone(),
            };
            graph
                .restore_group(group)
                .map_err(|e| malformed(format!("{}: {}", record.id, e)))?;
        }

        tracing::debug!(nodes = graph.node_count(), edges = graph.edge_count(), "graph document loaded");
        Ok(graph)
    }

    pub fn to_json(graph: &PipelineGraph) -> Result<String, StoreError> {
        serde_json::to_string_pretty(&Self::save(graph)).map_err(StoreError::Serialize)
    }

    /// Parses and loads a document. Missing required fields and wrong value
    /// types are reported as a malformed document.
    pub fn from_json(text: &str) -> Result<PipelineGraph, StoreError> {
        let doc: GraphDocument = serde_json::from_str(text).map_err(|e| malformed(e.to_string()))?;
        Self::load(&doc)
    }

    pub fn save_to_path(graph: &PipelineGraph, path: impl AsRef<Path>) -> Result<(), StoreError> {
        let path = path.as_ref();
        let json = Self::to_json(graph)?;
        fs::write(path, json).map_err(|source| StoreError::Io { path: path.to_path_buf(), source })?;
        tracing::info!(path = %path.display(), "graph saved");
        Ok(())
    }

    pub fn load_from_path(path: impl AsRef<Path>) -> Result<PipelineGraph, StoreError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| StoreError::Io { path: path.to_path_buf(), source })?;
        let graph = Self::from_json(&text)?;
        tracing::info!(path = %path.display(), nodes = graph.node_count(), "graph loaded");
        Ok(graph)
    }
}

fn malformed(message: impl Into<String>) -> StoreError {
    StoreError::MalformedDocument(message.into())
}

fn graph_error(err: GraphError) -> StoreError {
    malformed(err.to_string())
}
