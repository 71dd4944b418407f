//! `MockNode` — a test double for `NodeBehavior`.
//!
//! Useful in unit and integration tests where a real node implementation is
//! either unavailable or irrelevant.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;

use crate::traits::{ExecutionContext, NodeOutput, PortInputs};
use crate::{NodeBehavior, NodeError};

/// Behaviour injected into `MockNode` at construction time.
pub enum MockBehaviour {
    /// Always succeed, returning this port -> value map.
    Succeed(NodeOutput),
    /// Always fail with this message.
    FailAlways(String),
    /// Fail on every attempt strictly before `succeed_on_attempt` (1-based),
    /// then succeed with `then`. Models a transient failure.
    FailUntilAttempt { succeed_on_attempt: u32, then: NodeOutput },
}

/// A mock node that records every call it receives and returns a
/// programmer-specified result.
pub struct MockNode {
    /// Label used in test assertions.
    pub name: String,
    behaviour: MockBehaviour,
    attempts: AtomicU32,
    /// All per-run inputs seen by this node, in call order.
    pub calls: Arc<Mutex<Vec<PortInputs>>>,
}

impl MockNode {
    pub fn succeeding(name: impl Into<String>, output: NodeOutput) -> Self {
        Self {
            name: name.into(),
            behaviour: MockBehaviour::Succeed(output),
            attempts: AtomicU32::new(0),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn failing_always(name: impl Into<String>, msg: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            behaviour: MockBehaviour::FailAlways(msg.into()),
            attempts: AtomicU32::new(0),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn failing_until(name: impl Into<String>, succeed_on_attempt: u32, then: NodeOutput) -> Self {
        Self {
            name: name.into(),
            behaviour: MockBehaviour::FailUntilAttempt { succeed_on_attempt, then },
            attempts: AtomicU32::new(0),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Number of times this node has been invoked.
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl NodeBehavior for MockNode {
    async fn process(&self, ctx: &ExecutionContext<'_>) -> Result<NodeOutput, NodeError> {
        self.calls.lock().unwrap().push(ctx.input.clone());
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;

        match &self.behaviour {
            MockBehaviour::Succeed(out) => Ok(out.clone()),
            MockBehaviour::FailAlways(msg) => Err(NodeError::new(msg.clone())),
            MockBehaviour::FailUntilAttempt { succeed_on_attempt, then } => {
                if attempt >= *succeed_on_attempt {
                    Ok(then.clone())
                } else {
                    Err(NodeError::new(format!(
                        "{} failed on attempt {attempt}",
                        self.name
                    )))
                }
            }
        }
    }
}

/// Convenience: build a one-port `NodeOutput` keyed `"value"`.
pub fn value_output(value: impl Into<Value>) -> NodeOutput {
    let mut out = NodeOutput::new();
    out.insert("value".to_string(), value.into());
    out
}
