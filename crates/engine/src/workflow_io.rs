//! Workflow export/import.
//!
//! The document shape is a stable contract independent of the in-memory
//! `Graph` layout: node identity/capability fields are grouped under
//! `properties`, links are grouped `source-name -> source-port -> targets`
//! rather than as a flat list, and per-run mutable state never appears.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::EngineError;
use crate::graph::Graph;
use crate::node::{LinkType, Node, NodeCapabilities, Port};

pub const CURRENT_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeProperties {
    pub name: String,
    pub id: Uuid,
    pub node_type: String,
    pub version: u32,
    pub capabilities: NodeCapabilities,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeDocument {
    pub properties: NodeProperties,
    pub config: Value,
    #[serde(default)]
    pub config_schema: Option<Value>,
    #[serde(default)]
    pub inputs: Vec<Port>,
    #[serde(default)]
    pub outputs: Vec<Port>,
    #[serde(default)]
    pub annotation: Option<String>,
}

impl NodeDocument {
    fn from_node(node: &Node) -> Self {
        Self {
            properties: NodeProperties {
                name: node.name.clone(),
                id: node.id,
                node_type: node.node_type.clone(),
                version: node.version,
                capabilities: node.capabilities.clone(),
            },
            config: node.config.clone(),
            config_schema: node.config_schema.clone(),
            inputs: node.inputs.clone(),
            outputs: node.outputs.clone(),
            annotation: node.annotation.clone(),
        }
    }

    fn into_node(self) -> Node {
        Node {
            name: self.properties.name,
            id: self.properties.id,
            node_type: self.properties.node_type,
            version: self.properties.version,
            inputs: self.inputs,
            outputs: self.outputs,
            capabilities: self.properties.capabilities,
            config: self.config,
            config_schema: self.config_schema,
            annotation: self.annotation,
            state: Default::default(),
            last_error: None,
            result_data: None,
        }
    }
}

/// One fan-out target of a link, keyed by its source elsewhere in the
/// document. The target-side port field is named to match the produced
/// document shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkTarget {
    pub target_node: String,
    #[serde(rename = "outputPortName")]
    pub target_port: String,
    pub link_type: LinkType,
}

pub type LinksBySource = HashMap<String, HashMap<String, Vec<LinkTarget>>>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowDocument {
    pub version: u32,
    pub id: String,
    pub name: String,
    pub nodes: Vec<NodeDocument>,
    pub links_by_source: LinksBySource,
    #[serde(default)]
    pub settings: Value,
    #[serde(default)]
    pub static_data: Value,
    #[serde(default)]
    pub mock_data: Option<Value>,
}

/// Serializes `graph` plus the supplied workflow-level metadata into the
/// produced document shape. Per-run mutable state is intentionally not
/// read from `graph`'s nodes.
pub fn export(
    graph: &Graph,
    id: impl Into<String>,
    name: impl Into<String>,
    settings: Value,
    static_data: Value,
    mock_data: Option<Value>,
) -> WorkflowDocument {
    let nodes = graph.nodes().map(NodeDocument::from_node).collect();

    let mut links_by_source: LinksBySource = HashMap::new();
    for node in graph.nodes() {
        for link in graph.outgoing(&node.name) {
            links_by_source
                .entry(link.source_node.clone())
                .or_default()
                .entry(link.source_port.clone())
                .or_default()
                .push(LinkTarget {
                    target_node: link.target_node.clone(),
                    target_port: link.target_port.clone(),
                    link_type: link.link_type,
                });
        }
    }

    WorkflowDocument {
        version: CURRENT_VERSION,
        id: id.into(),
        name: name.into(),
        nodes,
        links_by_source,
        settings,
        static_data,
        mock_data,
    }
}

/// Parses a JSON document into a `WorkflowDocument`, surfacing any missing
/// required field as `DocumentInvalid`.
pub fn parse(json: &str) -> Result<WorkflowDocument, EngineError> {
    serde_json::from_str(json).map_err(|e| EngineError::DocumentInvalid(e.to_string()))
}

/// Reconstructs a `Graph` from a document. Rejects an unrecognized
/// `version` and any link whose endpoints do not resolve to nodes present
/// in the document (surfaced through `Graph::link_nodes`'s own
/// `LinkInvalid`).
pub fn import(doc: &WorkflowDocument) -> Result<Graph, EngineError> {
    if doc.version != CURRENT_VERSION {
        return Err(EngineError::DocumentInvalid(format!(
            "unsupported workflow document version {}",
            doc.version
        )));
    }

    let mut graph = Graph::new();
    for node_doc in &doc.nodes {
        graph.add_node(node_doc.clone().into_node())?;
    }

    for (source_node, ports) in &doc.links_by_source {
        for (source_port, targets) in ports {
            for target in targets {
                graph.link_nodes(source_node, source_port, &target.target_node, &target.target_port)?;
            }
        }
    }

    Ok(graph)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::Port;

    fn sample_graph() -> Graph {
        let mut graph = Graph::new();
        graph
            .add_node(Node::new("start", "manualTrigger").with_outputs(vec![Port::new("main", "any")]).as_trigger())
            .unwrap();
        graph
            .add_node(
                Node::new("a", "setValue")
                    .with_inputs(vec![Port::new("main", "any")])
                    .with_outputs(vec![Port::new("main", "any")]),
            )
            .unwrap();
        graph.link_nodes("start", "main", "a", "main").unwrap();
        graph
    }

    #[test]
    fn export_then_import_round_trips_structure() {
        let graph = sample_graph();
        let doc = export(&graph, "wf-1", "demo", serde_json::json!({}), serde_json::json!({}), None);
        let json = serde_json::to_string(&doc).unwrap();
        let parsed = parse(&json).unwrap();
        let rebuilt = import(&parsed).unwrap();

        assert_eq!(rebuilt.node_count(), graph.node_count());
        assert_eq!(rebuilt.outgoing("start").len(), 1);
        assert_eq!(rebuilt.outgoing("start")[0].target_node, "a");
    }

    #[test]
    fn unknown_version_is_rejected() {
        let graph = sample_graph();
        let mut doc = export(&graph, "wf-1", "demo", serde_json::json!({}), serde_json::json!({}), None);
        doc.version = 99;
        let err = import(&doc).unwrap_err();
        assert!(matches!(err, EngineError::DocumentInvalid(_)));
    }

    #[test]
    fn dangling_link_target_is_rejected() {
        let mut doc = export(&sample_graph(), "wf-1", "demo", serde_json::json!({}), serde_json::json!({}), None);
        doc.links_by_source
            .get_mut("start")
            .unwrap()
            .get_mut("main")
            .unwrap()
            .push(LinkTarget {
                target_node: "does-not-exist".to_string(),
                target_port: "main".to_string(),
                link_type: LinkType::Standard,
            });
        let err = import(&doc).unwrap_err();
        assert!(matches!(err, EngineError::LinkInvalid { .. }));
    }

    #[test]
    fn missing_required_field_fails_to_parse() {
        let err = parse(r#"{"version": 1, "id": "x"}"#).unwrap_err();
        assert!(matches!(err, EngineError::DocumentInvalid(_)));
    }
}
