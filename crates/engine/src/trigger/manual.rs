//! ManualTrigger — an on-demand entry point into a run.

use std::sync::Arc;

use serde_json::Value;
use tracing::instrument;

use crate::error::EngineError;
use crate::scheduler::Engine;

/// Fires a named trigger node's workflow on demand.
///
/// `trigger` does not block on workflow completion by default — it hands
/// the run to `Engine::execute` and returns as soon as that call returns,
/// which in practice means callers who want to observe completion simply
/// `await` the returned future themselves; there is no separate queue.
pub struct ManualTrigger {
    node_name: String,
    initial_data: Option<Value>,
}

impl ManualTrigger {
    pub fn new(node_name: impl Into<String>) -> Self {
        Self { node_name: node_name.into(), initial_data: None }
    }

    /// Configures the data used when `trigger` is called without an
    /// explicit payload.
    pub fn with_initial_data(mut self, data: Value) -> Self {
        self.initial_data = Some(data);
        self
    }

    /// Trigger a run, using `data` if given or the configured
    /// `initialData` otherwise. `AlreadyExecuting` is a normal outcome,
    /// not a bug — a concurrent run is already in flight.
    #[instrument(skip(self, engine, data), fields(node = %self.node_name))]
    pub async fn trigger(&self, engine: &Engine, data: Option<Value>) -> Result<(), EngineError> {
        let payload = data.or_else(|| self.initial_data.clone());
        engine.execute(&self.node_name, payload).await
    }

    /// Fire-and-forget variant: spawns the run on the current runtime and
    /// returns immediately without waiting for it to finish.
    pub fn trigger_detached(self: Arc<Self>, engine: Arc<Engine>, data: Option<Value>) {
        tokio::spawn(async move {
            if let Err(err) = self.trigger(&engine, data).await {
                if !matches!(err, EngineError::AlreadyExecuting) {
                    tracing::warn!(node = %self.node_name, %err, "manual trigger run failed");
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution_state::ExecutionState;
    use crate::graph::Graph;
    use crate::node::Node;
    use crate::scheduler::{EngineConfig, NodeRegistry};

    fn trigger_only_graph() -> Graph {
        let mut graph = Graph::new();
        graph.add_node(Node::new("start", "manualTrigger").as_trigger()).unwrap();
        graph
    }

    #[tokio::test]
    async fn trigger_runs_the_named_node() {
        let engine = Engine::new("wf-1", trigger_only_graph(), NodeRegistry::new(), EngineConfig::default());
        let manual = ManualTrigger::new("start");
        manual.trigger(&engine, Some(serde_json::json!({"x": 1}))).await.unwrap();
        let out = engine.with_state(|s: &ExecutionState| s.get_node_output("start").cloned()).await;
        assert!(out.is_some());
    }

    #[tokio::test]
    async fn sequential_triggers_both_succeed() {
        let engine = Engine::new("wf-2", trigger_only_graph(), NodeRegistry::new(), EngineConfig::default());
        let manual = ManualTrigger::new("start");
        manual.trigger(&engine, None).await.unwrap();
        manual.trigger(&engine, None).await.unwrap();
    }
}
