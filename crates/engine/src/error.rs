//! Engine-level error types.

use thiserror::Error;

use crate::node::NodeState;

/// Errors produced by the workflow engine — graph validation, planning,
/// scheduling, and node execution all funnel into this one type so a
/// caller can match on `workflow.state` / `EngineError` without chasing
/// error types across crate boundaries.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A link's endpoints don't exist, or the port `dataType` tags differ.
    #[error("invalid link {source_node}.{source_port} -> {target_node}.{target_port}: {reason}")]
    LinkInvalid {
        source_node: String,
        source_port: String,
        target_node: String,
        target_port: String,
        reason: String,
    },

    /// A node referenced by `name` already exists in the graph.
    #[error("node '{0}' already exists")]
    DuplicateNodeId(String),

    /// DAGPlanner could not produce a full topological order.
    #[error("workflow graph contains a cycle touching node '{0}'")]
    CycleDetected(String),

    /// `setup(config)` failed the configuration schema check.
    #[error("configuration invalid for node '{node_id}': {reason}")]
    ConfigurationInvalid { node_id: String, reason: String },

    /// A schedule-recurrence descriptor was out of range or names a date
    /// that can never occur.
    #[error("schedule descriptor invalid: {0}")]
    ScheduleInvalid(String),

    /// `execute` was called while a run was already in progress.
    #[error("engine is already executing")]
    AlreadyExecuting,

    /// A node's `process` failed and retries (if any) were exhausted.
    #[error("node '{node_id}' failed: {message}")]
    NodeProcessFailed { node_id: String, message: String },

    /// A node's lifecycle tag was commanded into an illegal transition.
    #[error("invalid state transition for node '{node_id}': {from:?} -> {to:?}")]
    InvalidStateTransition {
        node_id: String,
        from: NodeState,
        to: NodeState,
    },

    /// The node type named by a node is not present in the registry.
    #[error("node type '{0}' is not registered")]
    UnknownNodeType(String),

    /// Workflow export/import document failed validation.
    #[error("workflow document invalid: {0}")]
    DocumentInvalid(String),
}
