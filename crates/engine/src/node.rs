//! Node identity, ports, capability flags, and per-run mutable state.
//!
//! A `Node` carries its own dependency-free data; the behaviour behind
//! `process(context)` lives behind the `nodes::NodeBehavior` trait object so
//! the engine never has to know what a "HTTP request" or "code runner" node
//! actually does.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Tag on a port or link distinguishing the ordinary data path from an
/// auxiliary one (e.g. an error-output or side-channel port).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkType {
    Standard,
    Auxiliary,
}

/// A single named input or output on a node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Port {
    pub name: String,
    pub data_type: String,
    pub link_type: LinkType,
}

impl Port {
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            link_type: LinkType::Standard,
        }
    }

    pub fn auxiliary(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            link_type: LinkType::Auxiliary,
        }
    }
}

/// How long to wait before a retry attempt.
///
/// Selected by the *shape* of the node's configured delay: a bare
/// millisecond count picks `Fixed`, a `{base, max}` record picks
/// `Exponential`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RetryDelay {
    Fixed(u64),
    Exponential { base: u64, max: u64 },
}

impl Default for RetryDelay {
    fn default() -> Self {
        RetryDelay::Fixed(0)
    }
}

/// A node's lifecycle tag, reset to `Idle` at the start of every run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeState {
    Idle,
    Running,
    Completed,
    Failed,
}

impl Default for NodeState {
    fn default() -> Self {
        NodeState::Idle
    }
}

/// A recorded port value: either one record or a list of records.
///
/// Storage is always a list; a bare record collapses into a one-element
/// list at the read boundary (see [`crate::execution_state`]).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PortValues(pub HashMap<String, Vec<Value>>);

impl PortValues {
    pub fn new() -> Self {
        Self(HashMap::new())
    }

    /// Record a contribution to `port`, normalizing a bare record to a
    /// one-element list and splicing a list contribution in place.
    pub fn insert(&mut self, port: impl Into<String>, value: Value) {
        let entry = self.0.entry(port.into()).or_default();
        match value {
            Value::Array(items) => entry.extend(items),
            other => entry.push(other),
        }
    }

    pub fn set_list(&mut self, port: impl Into<String>, values: Vec<Value>) {
        self.0.insert(port.into(), values);
    }

    pub fn get(&self, port: &str) -> Option<&[Value]> {
        self.0.get(port).map(|v| v.as_slice())
    }
}

/// Capability flags controlling how the scheduler and `NodeRunner` treat a
/// node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeCapabilities {
    pub is_trigger: bool,
    pub disabled: bool,
    pub continue_on_fail: bool,
    pub retry_on_fail: bool,
    pub max_retries: u32,
    pub retry_delay: RetryDelay,
}

impl Default for NodeCapabilities {
    fn default() -> Self {
        Self {
            is_trigger: false,
            disabled: false,
            continue_on_fail: false,
            retry_on_fail: false,
            max_retries: 0,
            retry_delay: RetryDelay::Fixed(0),
        }
    }
}

/// A stateful unit of a workflow graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub name: String,
    pub id: uuid::Uuid,
    pub node_type: String,
    pub version: u32,

    pub inputs: Vec<Port>,
    pub outputs: Vec<Port>,

    pub capabilities: NodeCapabilities,

    pub config: Value,
    pub config_schema: Option<Value>,
    #[serde(default)]
    pub annotation: Option<String>,

    #[serde(skip)]
    pub state: NodeState,
    #[serde(skip)]
    pub last_error: Option<String>,
    #[serde(skip)]
    pub result_data: Option<PortValues>,
}

impl Node {
    pub fn new(name: impl Into<String>, node_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id: uuid::Uuid::new_v4(),
            node_type: node_type.into(),
            version: 1,
            inputs: Vec::new(),
            outputs: Vec::new(),
            capabilities: NodeCapabilities::default(),
            config: Value::Null,
            config_schema: None,
            annotation: None,
            state: NodeState::Idle,
            last_error: None,
            result_data: None,
        }
    }

    pub fn with_inputs(mut self, ports: Vec<Port>) -> Self {
        self.inputs = ports;
        self
    }

    pub fn with_outputs(mut self, ports: Vec<Port>) -> Self {
        self.outputs = ports;
        self
    }

    pub fn with_capabilities(mut self, capabilities: NodeCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn as_trigger(mut self) -> Self {
        self.capabilities.is_trigger = true;
        self
    }

    /// Reset all per-run mutable state to the values it has before any run.
    pub fn reset(&mut self) {
        self.state = NodeState::Idle;
        self.last_error = None;
        self.result_data = None;
    }

    pub fn input_port(&self, name: &str) -> Option<&Port> {
        self.inputs.iter().find(|p| p.name == name)
    }

    pub fn output_port(&self, name: &str) -> Option<&Port> {
        self.outputs.iter().find(|p| p.name == name)
    }
}
