//! The `NodeBehavior` trait — the contract every node type must fulfil
//! (input-by-port in, output-by-port out).
//!
//! Defined here (in the `nodes` crate) so both the engine and individual
//! node implementations can depend on it without a circular dependency:
//! `nodes` depends on nothing in `engine`, `engine` depends on `nodes`.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;

use crate::NodeError;

/// Per-input-port assembled values: for each input port, the
/// concatenation, in link-insertion order, of every incoming link's
/// contribution. A port with no contributing links is an empty list.
pub type PortInputs = HashMap<String, Vec<Value>>;

/// What a node's `process` hands back per output port: either a single
/// record or a list of records. The engine normalizes this to list
/// storage when it writes `ExecutionState`.
pub type NodeOutput = HashMap<String, Value>;

/// A read-only view of `ExecutionState`, exposed to `process` as
/// `context.state` so a node may look up *any* node's output, not only its
/// own direct inputs. Implemented by `engine::ExecutionState`
/// without creating a dependency from `nodes` back onto `engine`.
pub trait StateView: Send + Sync {
    /// All recorded output ports for `node`, or `None` if it hasn't run
    /// (or doesn't exist) in this run.
    fn node_output(&self, node: &str) -> Option<PortInputs>;

    /// One port's recorded values for `node`.
    fn node_output_port(&self, node: &str, port: &str) -> Option<Vec<Value>>;
}

/// Shared context passed to every node during its `process` invocation.
pub struct ExecutionContext<'a> {
    /// ID of the parent workflow.
    pub workflow_id: uuid::Uuid,
    /// ID of the current execution run.
    pub execution_id: uuid::Uuid,
    /// This node's assembled per-port inputs.
    pub input: PortInputs,
    /// Read-only view over every node's recorded output so far this run.
    pub state: &'a dyn StateView,
    /// Decrypted secrets scoped to this workflow (resolved by the engine
    /// via `SecretResolver` before the node is invoked).
    pub secrets: HashMap<String, String>,
}

/// The core node trait — every built-in node and plugin implements this.
/// `process` is asynchronous and may suspend (typically on I/O).
#[async_trait]
pub trait NodeBehavior: Send + Sync {
    async fn process(&self, ctx: &ExecutionContext<'_>) -> Result<NodeOutput, NodeError>;
}
