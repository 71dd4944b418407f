//! PersistenceHook — the snapshot/restore boundary for `ExecutionState`.
//! A pluggable hook, not a crash-consistent journal: durable execution
//! across process restarts is out of scope.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;

use crate::execution_state::ExecutionSnapshot;

/// Metadata recorded alongside a snapshot — kept minimal and opaque to the
/// engine, which only round-trips it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunMetadata {
    pub workflow_id: String,
    pub execution_id: String,
    pub finished_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// Consumed/produced interface: called after each successful run with the
/// final snapshot, and consulted (optionally) before the first run.
#[async_trait]
pub trait PersistenceHook: Send + Sync {
    async fn persist(&self, workflow_id: &str, state: &ExecutionSnapshot, metadata: &RunMetadata);

    async fn recover(&self, workflow_id: &str) -> Option<(ExecutionSnapshot, RunMetadata)>;
}

/// In-process default implementation — sufficient for tests and the CLI.
/// Nothing survives the process exiting.
#[derive(Default)]
pub struct InMemoryPersistenceHook {
    store: Mutex<HashMap<String, (ExecutionSnapshot, RunMetadata)>>,
}

impl InMemoryPersistenceHook {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PersistenceHook for InMemoryPersistenceHook {
    async fn persist(&self, workflow_id: &str, state: &ExecutionSnapshot, metadata: &RunMetadata) {
        self.store
            .lock()
            .unwrap()
            .insert(workflow_id.to_string(), (state.clone(), metadata.clone()));
    }

    async fn recover(&self, workflow_id: &str) -> Option<(ExecutionSnapshot, RunMetadata)> {
        self.store.lock().unwrap().get(workflow_id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn persist_then_recover_round_trips_by_value() {
        let hook = InMemoryPersistenceHook::new();
        let mut snapshot = ExecutionSnapshot::default();
        snapshot.outputs.insert(
            "a".to_string(),
            crate::node::PortValues({
                let mut m = HashMap::new();
                m.insert("value".to_string(), vec![serde_json::json!(1)]);
                m
            }),
        );
        let metadata = RunMetadata {
            workflow_id: "wf-1".to_string(),
            execution_id: "exec-1".to_string(),
            finished_at: Some(chrono::Utc::now()),
        };

        hook.persist("wf-1", &snapshot, &metadata).await;
        let (recovered_state, recovered_meta) = hook.recover("wf-1").await.expect("should recover");

        assert_eq!(recovered_state.outputs.len(), snapshot.outputs.len());
        assert_eq!(recovered_meta.execution_id, metadata.execution_id);
    }

    #[tokio::test]
    async fn recover_on_unknown_workflow_is_absent() {
        let hook = InMemoryPersistenceHook::new();
        assert!(hook.recover("never-persisted").await.is_none());
    }
}
