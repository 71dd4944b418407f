//! NodeRunner — drives one node through one wave: input assembly, the
//! retry loop, timing, and error capture.
//!
//! A `NodeRunner` never mutates the shared `ExecutionState` or `Graph`
//! directly — it reads them (safe to share across concurrently-running
//! tasks via `Arc`, since nothing writes during a wave) and returns an
//! [`Outcome`] the `Scheduler` applies once the batch/wave barrier is
//! reached: every runner writes exactly one entry, and that write happens
//! only at a suspension point of the engine's own control loop, never
//! concurrently with another runner's write.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use nodes::traits::{ExecutionContext, NodeOutput};
use nodes::{NodeBehavior, StateView};
use serde_json::Value;
use tracing::{instrument, warn};
use uuid::Uuid;

use crate::graph::Graph;
use crate::execution_state::ExecutionState;
use crate::node::{Node, NodeState, PortValues};
use crate::retry::RetryPolicy;

/// The result of driving one node through zero-or-more retries.
#[derive(Debug)]
pub struct Outcome {
    pub node_name: String,
    pub state: NodeState,
    pub error: Option<String>,
    pub output: Option<PortValues>,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub attempts: u32,
    /// Set when `state == Failed` because the node's `config` failed
    /// schema validation rather than because `process` returned an error.
    /// The scheduler raises a distinct error variant for this case.
    pub config_invalid: bool,
}

/// Build `context.input` by consulting the graph's reverse adjacency: for
/// each input port, collect the value(s) produced by every incoming link's
/// (sourceNode, sourcePort), in link-insertion order.
///
/// A disabled or not-yet-run source contributes nothing, and that is not
/// treated as a failure, so an input port fed only by such sources becomes
/// an empty list.
pub fn assemble_inputs(graph: &Graph, state: &ExecutionState, node: &Node) -> HashMap<String, Vec<Value>> {
    let mut inputs: HashMap<String, Vec<Value>> =
        node.inputs.iter().map(|p| (p.name.clone(), Vec::new())).collect();

    for link in graph.incoming(&node.name) {
        if let Some(values) = state.get_node_output_port(&link.source_node, &link.source_port) {
            inputs.entry(link.target_port.clone()).or_default().extend(values.iter().cloned());
        }
    }

    inputs
}

/// Normalize a node's raw `process` output into list-storage `PortValues`.
fn normalize_output(raw: NodeOutput) -> PortValues {
    let mut values = PortValues::new();
    for (port, value) in raw {
        values.insert(port, value);
    }
    values
}

/// Drive `node` through its retry loop and return the terminal outcome.
///
/// Disabled nodes and already-completed triggers are handled by the
/// `Scheduler` before this is ever called.
#[instrument(skip(behavior, state_view, secrets), fields(node = %node.name))]
pub async fn run(
    node: &Node,
    behavior: &dyn NodeBehavior,
    inputs: HashMap<String, Vec<Value>>,
    state_view: &dyn StateView,
    workflow_id: Uuid,
    execution_id: Uuid,
    secrets: HashMap<String, String>,
) -> Outcome {
    let started_at = Utc::now();
    let policy = RetryPolicy::from_delay(node.capabilities.retry_delay);

    let mut attempt = 1u32;
    loop {
        let ctx = ExecutionContext {
            workflow_id,
            execution_id,
            input: inputs.clone(),
            state: state_view,
            secrets: secrets.clone(),
        };

        match behavior.process(&ctx).await {
            Ok(raw_output) => {
                return Outcome {
                    node_name: node.name.clone(),
                    state: NodeState::Completed,
                    error: None,
                    output: Some(normalize_output(raw_output)),
                    started_at,
                    ended_at: Utc::now(),
                    attempts: attempt,
                    config_invalid: false,
                };
            }
            Err(err) => {
                let can_retry = node.capabilities.retry_on_fail
                    && RetryPolicy::should_retry(attempt, node.capabilities.max_retries);

                if !can_retry {
                    return Outcome {
                        node_name: node.name.clone(),
                        state: NodeState::Failed,
                        error: Some(err.0.clone()),
                        output: None,
                        started_at,
                        ended_at: Utc::now(),
                        attempts: attempt,
                        config_invalid: false,
                    };
                }

                let delay = policy.delay(attempt);
                warn!(
                    node = %node.name,
                    attempt,
                    max_retries = node.capabilities.max_retries,
                    ?delay,
                    "node failed, retrying: {err}"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

/// Attempt-cap sanity helper used by tests: the number of `process`
/// invocations is at most `max_retries + 1`.
pub fn max_attempts(max_retries: u32) -> u32 {
    max_retries.saturating_add(1)
}
