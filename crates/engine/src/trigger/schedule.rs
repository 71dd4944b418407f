//! ScheduleTrigger — a self-rescheduling calendar timer.
//!
//! Re-arms before invoking `Engine::execute` so the cadence never drifts
//! by the duration of the run it just kicked off.

use std::sync::Arc;
use std::sync::Mutex as SyncMutex;

use chrono::{DateTime, Utc};
use serde_json::json;
use tokio::task::JoinHandle;
use tracing::{info, instrument, warn};

use super::calendar::{self, ScheduleDescriptor};
use crate::error::EngineError;
use crate::scheduler::Engine;

/// Owns the timer task for one schedule-trigger node. Cheap to construct;
/// `setup` both validates the descriptor and arms the first firing.
pub struct ScheduleTrigger {
    node_name: String,
    descriptor: SyncMutex<Option<ScheduleDescriptor>>,
    next_execution_time: SyncMutex<Option<DateTime<Utc>>>,
    handle: SyncMutex<Option<JoinHandle<()>>>,
}

impl ScheduleTrigger {
    pub fn new(node_name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            node_name: node_name.into(),
            descriptor: SyncMutex::new(None),
            next_execution_time: SyncMutex::new(None),
            handle: SyncMutex::new(None),
        })
    }

    pub fn next_execution_time(&self) -> Option<DateTime<Utc>> {
        *self.next_execution_time.lock().unwrap()
    }

    /// Validates `descriptor`, computes the first `nextExecutionTime`, and
    /// arms the timer. Replaces any previously-armed timer.
    #[instrument(skip(self, engine, descriptor), fields(node = %self.node_name))]
    pub fn setup(self: &Arc<Self>, descriptor: ScheduleDescriptor, engine: Arc<Engine>) -> Result<(), EngineError> {
        calendar::validate(&descriptor)?;
        self.deactivate();

        let now = Utc::now();
        let next = calendar::next_execution_time(&descriptor, now)?;
        *self.descriptor.lock().unwrap() = Some(descriptor.clone());
        *self.next_execution_time.lock().unwrap() = Some(next);
        info!(?next, "schedule armed");
        self.arm(engine, descriptor, next);
        Ok(())
    }

    fn arm(self: &Arc<Self>, engine: Arc<Engine>, descriptor: ScheduleDescriptor, fire_at: DateTime<Utc>) {
        let wait = (fire_at - Utc::now()).to_std().unwrap_or(std::time::Duration::ZERO);
        let this = Arc::clone(self);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(wait).await;
            this.on_fire(engine, descriptor).await;
        });
        *self.handle.lock().unwrap() = Some(handle);
    }

    async fn on_fire(self: Arc<Self>, engine: Arc<Engine>, descriptor: ScheduleDescriptor) {
        let fired_at = Utc::now();

        // Re-arm first so the next cadence is anchored to the schedule,
        // not to how long this firing's `execute` call takes.
        match calendar::next_execution_time(&descriptor, fired_at) {
            Ok(next) => {
                *self.next_execution_time.lock().unwrap() = Some(next);
                self.arm(Arc::clone(&engine), descriptor.clone(), next);
            }
            Err(err) => {
                warn!(%err, "failed to compute next firing, schedule is now inert");
            }
        }

        let payload = json!({
            "timestamp": fired_at.to_rfc3339(),
            "scheduleType": schedule_type_name(&descriptor),
            "nextExecutionTime": self.next_execution_time().map(|t| t.to_rfc3339()),
        });

        match engine.execute(&self.node_name, Some(payload)).await {
            Ok(()) => {}
            Err(EngineError::AlreadyExecuting) => {
                info!("schedule fired while a run was already in progress, skipping this firing");
            }
            Err(err) => {
                warn!(%err, "scheduled run failed");
            }
        }
    }

    /// Cancels the armed timer, if any. Idempotent.
    pub fn deactivate(&self) {
        if let Some(handle) = self.handle.lock().unwrap().take() {
            handle.abort();
        }
        *self.next_execution_time.lock().unwrap() = None;
    }
}

fn schedule_type_name(descriptor: &ScheduleDescriptor) -> &'static str {
    match descriptor {
        ScheduleDescriptor::EveryMinute { .. } => "everyMinute",
        ScheduleDescriptor::EveryHour { .. } => "everyHour",
        ScheduleDescriptor::EveryDay { .. } => "everyDay",
        ScheduleDescriptor::EveryMonth { .. } => "everyMonth",
        ScheduleDescriptor::EveryYear { .. } => "everyYear",
        ScheduleDescriptor::EveryInterval { .. } => "everyInterval",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Graph;
    use crate::node::Node;
    use crate::scheduler::{EngineConfig, NodeRegistry};

    fn trigger_only_graph() -> Graph {
        let mut graph = Graph::new();
        graph.add_node(Node::new("timer", "scheduleTrigger").as_trigger()).unwrap();
        graph
    }

    #[tokio::test(start_paused = true)]
    async fn fires_and_rearms_without_drift() {
        let engine = Arc::new(Engine::new(
            "wf-schedule",
            trigger_only_graph(),
            NodeRegistry::new(),
            EngineConfig::default(),
        ));
        let trigger = ScheduleTrigger::new("timer");
        trigger
            .setup(ScheduleDescriptor::EveryInterval { millis: 1000 }, Arc::clone(&engine))
            .unwrap();

        let first_next = trigger.next_execution_time().unwrap();

        tokio::time::advance(std::time::Duration::from_millis(1500)).await;
        tokio::task::yield_now().await;

        let second_next = trigger.next_execution_time().unwrap();
        assert!(second_next > first_next);

        let ran = engine.with_state(|s| s.get_node_output("timer").is_some()).await;
        assert!(ran);

        trigger.deactivate();
    }

    #[test]
    fn rejects_invalid_descriptor() {
        let engine = Arc::new(Engine::new(
            "wf-schedule-invalid",
            trigger_only_graph(),
            NodeRegistry::new(),
            EngineConfig::default(),
        ));
        let trigger = ScheduleTrigger::new("timer");
        let err = trigger
            .setup(ScheduleDescriptor::EveryHour { minute: 99, second: 0 }, engine)
            .unwrap_err();
        assert!(matches!(err, EngineError::ScheduleInvalid(_)));
    }
}
