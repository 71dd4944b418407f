//! The `NodeType` registry interface consumed by `Graph` validation.
//!
//! Discovery, hot-reload, and plugin loading are out of scope for the core
//! — this trait is the seam the core needs, not the surface that drives it.

/// A minimal description of a registered node type, enough for `Graph` to
/// check availability before a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeTypeDescriptor {
    pub name: String,
    pub version: u32,
}

/// Consumed interface: resolves `node_type` strings to registered types.
pub trait NodeTypeRegistry: Send + Sync {
    /// Look up a node type by name and optional version; `None` means
    /// "latest registered version".
    fn get(&self, name: &str, version: Option<u32>) -> Option<NodeTypeDescriptor>;

    fn register(&mut self, descriptor: NodeTypeDescriptor);

    /// No-op by default — plugin discovery lives outside the core.
    fn register_from_plugin(&mut self, descriptor: NodeTypeDescriptor) {
        self.register(descriptor);
    }

    /// No-op by default — plugin discovery lives outside the core.
    fn unregister_from_plugin(&mut self, _plugin_key: &str) {}
}

/// In-memory registry sufficient for tests and the CLI.
#[derive(Debug, Default)]
pub struct InMemoryNodeTypeRegistry {
    types: std::collections::HashMap<String, NodeTypeDescriptor>,
}

impl InMemoryNodeTypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

impl NodeTypeRegistry for InMemoryNodeTypeRegistry {
    fn get(&self, name: &str, version: Option<u32>) -> Option<NodeTypeDescriptor> {
        let descriptor = self.types.get(name)?;
        match version {
            Some(v) if v != descriptor.version => None,
            _ => Some(descriptor.clone()),
        }
    }

    fn register(&mut self, descriptor: NodeTypeDescriptor) {
        self.types.insert(descriptor.name.clone(), descriptor);
    }
}
