//! Graph — owns nodes and links; validates link compatibility; exposes
//! adjacency queries.

use std::collections::HashMap;

use crate::error::EngineError;
use crate::link::Link;
use crate::node::Node;
use crate::registry::NodeTypeRegistry;

/// The triple (nodes-by-name, links-by-source, links-by-target).
///
/// Two symmetric adjacency indexes are maintained so both forward and
/// reverse queries are constant-time per node.
#[derive(Debug, Default, Clone)]
pub struct Graph {
    nodes: HashMap<String, Node>,
    /// insertion-ordered, per source node name.
    by_source: HashMap<String, Vec<Link>>,
    /// insertion-ordered, per target node name — this is the order
    /// `NodeRunner` concatenates fan-in contributions in.
    by_target: HashMap<String, Vec<Link>>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails if a node of the same `name` already exists.
    pub fn add_node(&mut self, node: Node) -> Result<(), EngineError> {
        if self.nodes.contains_key(&node.name) {
            return Err(EngineError::DuplicateNodeId(node.name.clone()));
        }
        self.by_source.entry(node.name.clone()).or_default();
        self.by_target.entry(node.name.clone()).or_default();
        self.nodes.insert(node.name.clone(), node);
        Ok(())
    }

    /// Removes the node and purges every link touching it from both
    /// indexes.
    pub fn remove_node(&mut self, name: &str) -> Option<Node> {
        let removed = self.nodes.remove(name)?;
        self.by_source.remove(name);
        self.by_target.remove(name);
        for links in self.by_source.values_mut() {
            links.retain(|l| l.target_node != name);
        }
        for links in self.by_target.values_mut() {
            links.retain(|l| l.source_node != name);
        }
        Some(removed)
    }

    pub fn node(&self, name: &str) -> Option<&Node> {
        self.nodes.get(name)
    }

    pub fn node_mut(&mut self, name: &str) -> Option<&mut Node> {
        self.nodes.get_mut(name)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    pub fn nodes_mut(&mut self) -> impl Iterator<Item = &mut Node> {
        self.nodes.values_mut()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Links leaving `name`, in insertion order.
    pub fn outgoing(&self, name: &str) -> &[Link] {
        self.by_source.get(name).map(|v| v.as_slice()).unwrap_or(&[])
    }

    /// Links entering `name`, in insertion order — the order fan-in
    /// contributions are concatenated in.
    pub fn incoming(&self, name: &str) -> &[Link] {
        self.by_target.get(name).map(|v| v.as_slice()).unwrap_or(&[])
    }

    /// Fails with `LinkInvalid` if any endpoint is missing, ports are
    /// absent, or port `dataType` tags differ. Duplicate identical links
    /// are permitted — fan-in aggregation treats them as multiple
    /// contributing values.
    pub fn link_nodes(
        &mut self,
        source_node: &str,
        source_port: &str,
        target_node: &str,
        target_port: &str,
    ) -> Result<(), EngineError> {
        let invalid = |reason: &str| EngineError::LinkInvalid {
            source_node: source_node.to_string(),
            source_port: source_port.to_string(),
            target_node: target_node.to_string(),
            target_port: target_port.to_string(),
            reason: reason.to_string(),
        };

        let src = self.nodes.get(source_node).ok_or_else(|| invalid("source node missing"))?;
        let dst = self.nodes.get(target_node).ok_or_else(|| invalid("target node missing"))?;

        let src_port = src
            .output_port(source_port)
            .ok_or_else(|| invalid("source port missing"))?;
        let dst_port = dst
            .input_port(target_port)
            .ok_or_else(|| invalid("target port missing"))?;

        if src_port.data_type != dst_port.data_type {
            return Err(invalid("port dataType mismatch"));
        }

        let link = Link {
            source_node: source_node.to_string(),
            source_port: source_port.to_string(),
            target_node: target_node.to_string(),
            target_port: target_port.to_string(),
            link_type: src_port.link_type,
        };

        self.by_source.entry(source_node.to_string()).or_default().push(link.clone());
        self.by_target.entry(target_node.to_string()).or_default().push(link);
        Ok(())
    }

    /// Build the `node-name -> set of dependency node-names` adjacency map
    /// the `DAGPlanner` expects, restricted to `Standard` and `Auxiliary`
    /// links alike (both gate execution order).
    pub fn dependency_map(&self) -> HashMap<String, Vec<String>> {
        let mut deps: HashMap<String, Vec<String>> =
            self.nodes.keys().map(|name| (name.clone(), Vec::new())).collect();
        for links in self.by_target.values() {
            for link in links {
                deps.entry(link.target_node.clone())
                    .or_default()
                    .push(link.source_node.clone());
            }
        }
        deps
    }

    /// {valid, missingTypes[]} — used before execution to surface nodes
    /// whose type is not registered.
    pub fn validate_node_type_availability(
        &self,
        registry: &dyn NodeTypeRegistry,
    ) -> (bool, Vec<String>) {
        let missing: Vec<String> = self
            .nodes
            .values()
            .filter(|n| registry.get(&n.node_type, None).is_none())
            .map(|n| n.name.clone())
            .collect();
        (missing.is_empty(), missing)
    }

    /// Cascade-removes nodes whose type is unavailable, and their
    /// incident links. Returns the names removed.
    pub fn remove_nodes_with_unavailable_types(
        &mut self,
        registry: &dyn NodeTypeRegistry,
    ) -> Vec<String> {
        let (_, missing) = self.validate_node_type_availability(registry);
        for name in &missing {
            self.remove_node(name);
        }
        missing
    }

    /// All nodes reachable from `start` by following outgoing links,
    /// including `start` itself. Used by the scheduler to restrict
    /// planning to the subgraph initiated by one trigger.
    pub fn reachable_from(&self, start: &str) -> Vec<String> {
        let mut seen = std::collections::HashSet::new();
        let mut stack = vec![start.to_string()];
        while let Some(name) = stack.pop() {
            if !seen.insert(name.clone()) {
                continue;
            }
            for link in self.outgoing(&name) {
                stack.push(link.target_node.clone());
            }
        }
        seen.into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::Port;

    fn node(name: &str) -> Node {
        Node::new(name, "setValue")
            .with_inputs(vec![Port::new("main", "any")])
            .with_outputs(vec![Port::new("main", "any")])
    }

    #[test]
    fn add_node_rejects_duplicate_name() {
        let mut graph = Graph::new();
        graph.add_node(node("a")).unwrap();
        let err = graph.add_node(node("a")).unwrap_err();
        assert!(matches!(err, EngineError::DuplicateNodeId(name) if name == "a"));
    }

    #[test]
    fn link_nodes_rejects_missing_source_node() {
        let mut graph = Graph::new();
        graph.add_node(node("b")).unwrap();
        let err = graph.link_nodes("a", "main", "b", "main").unwrap_err();
        assert!(matches!(err, EngineError::LinkInvalid { reason, .. } if reason == "source node missing"));
    }

    #[test]
    fn link_nodes_rejects_missing_target_node() {
        let mut graph = Graph::new();
        graph.add_node(node("a")).unwrap();
        let err = graph.link_nodes("a", "main", "b", "main").unwrap_err();
        assert!(matches!(err, EngineError::LinkInvalid { reason, .. } if reason == "target node missing"));
    }

    #[test]
    fn link_nodes_rejects_missing_source_port() {
        let mut graph = Graph::new();
        graph.add_node(node("a")).unwrap();
        graph.add_node(node("b")).unwrap();
        let err = graph.link_nodes("a", "nope", "b", "main").unwrap_err();
        assert!(matches!(err, EngineError::LinkInvalid { reason, .. } if reason == "source port missing"));
    }

    #[test]
    fn link_nodes_rejects_missing_target_port() {
        let mut graph = Graph::new();
        graph.add_node(node("a")).unwrap();
        graph.add_node(node("b")).unwrap();
        let err = graph.link_nodes("a", "main", "b", "nope").unwrap_err();
        assert!(matches!(err, EngineError::LinkInvalid { reason, .. } if reason == "target port missing"));
    }

    #[test]
    fn link_nodes_rejects_data_type_mismatch() {
        let mut graph = Graph::new();
        graph.add_node(Node::new("a", "setValue").with_outputs(vec![Port::new("main", "string")])).unwrap();
        graph.add_node(Node::new("b", "setValue").with_inputs(vec![Port::new("main", "number")])).unwrap();
        let err = graph.link_nodes("a", "main", "b", "main").unwrap_err();
        assert!(matches!(err, EngineError::LinkInvalid { reason, .. } if reason == "port dataType mismatch"));
    }

    #[test]
    fn remove_node_purges_incident_links_from_both_indexes() {
        let mut graph = Graph::new();
        graph.add_node(node("a")).unwrap();
        graph.add_node(node("b")).unwrap();
        graph.add_node(node("c")).unwrap();
        graph.link_nodes("a", "main", "b", "main").unwrap();
        graph.link_nodes("b", "main", "c", "main").unwrap();

        graph.remove_node("b");

        assert!(graph.node("b").is_none());
        assert!(graph.outgoing("a").is_empty());
        assert!(graph.incoming("c").is_empty());
        assert_eq!(graph.node_count(), 2);
    }
}
