//! Node-level error type.

use thiserror::Error;

/// The error a node's `process` raises.
///
/// Unlike a job-queue worker, whether this is retried is *not* encoded in
/// the error itself — it is governed entirely by the failing node's own
/// `retry_on_fail` / `max_retries` / `retry_delay` capabilities,
/// which the engine's `NodeRunner` already has from the `Node` it is
/// driving. A node's `process` only ever needs to say what went wrong.
#[derive(Debug, Error, Clone)]
#[error("{0}")]
pub struct NodeError(pub String);

impl NodeError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

impl From<String> for NodeError {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for NodeError {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}
