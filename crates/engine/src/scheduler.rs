//! Scheduler (the `Engine`) — wave-by-wave dispatch, concurrency cap,
//! cancellation, completion barrier. This is the core of the crate.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use nodes::NodeBehavior;
use serde_json::Value;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::config::{ConfigValidator, SecretResolver};
use crate::dag;
use crate::error::EngineError;
use crate::execution_state::ExecutionState;
use crate::graph::Graph;
use crate::node::{NodeState, PortValues};
use crate::node_runner::{self, Outcome};
use crate::persistence::{PersistenceHook, RunMetadata};

/// Workflow-level lifecycle tag, distinct from any individual node's
/// `NodeState`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowState {
    Idle,
    Running,
    Completed,
    Failed,
}

/// Tuning knobs for the scheduler.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Global concurrency cap within one wave. 0 means unbounded — one
    /// batch containing the whole wave.
    pub max_parallel_executions: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self { max_parallel_executions: 0 }
    }
}

/// Maps `node_type` strings to the behaviour that implements them.
pub type NodeRegistry = HashMap<String, Arc<dyn NodeBehavior>>;

/// The central orchestrator. One `Engine` owns one `Graph` and drives runs
/// against it; `Graph` mutation (adding/removing nodes or links) must
/// happen outside of `execute` — concurrent `execute` calls are rejected
/// outright rather than queued.
pub struct Engine {
    workflow_id: String,
    graph: AsyncMutex<Graph>,
    state: AsyncMutex<ExecutionState>,
    workflow_state: std::sync::Mutex<WorkflowState>,
    running: AtomicBool,
    registry: NodeRegistry,
    config: EngineConfig,
    persistence: Option<Arc<dyn PersistenceHook>>,
    secret_resolver: Arc<dyn SecretResolver>,
    config_validator: Arc<dyn ConfigValidator>,
}

impl Engine {
    pub fn new(workflow_id: impl Into<String>, graph: Graph, registry: NodeRegistry, config: EngineConfig) -> Self {
        Self {
            workflow_id: workflow_id.into(),
            graph: AsyncMutex::new(graph),
            state: AsyncMutex::new(ExecutionState::new()),
            workflow_state: std::sync::Mutex::new(WorkflowState::Idle),
            running: AtomicBool::new(false),
            registry,
            config,
            persistence: None,
            secret_resolver: Arc::new(crate::config::NoopSecretResolver),
            config_validator: Arc::new(crate::config::NoopConfigValidator),
        }
    }

    pub fn with_persistence(mut self, hook: Arc<dyn PersistenceHook>) -> Self {
        self.persistence = Some(hook);
        self
    }

    pub fn with_secret_resolver(mut self, resolver: Arc<dyn SecretResolver>) -> Self {
        self.secret_resolver = resolver;
        self
    }

    pub fn with_config_validator(mut self, validator: Arc<dyn ConfigValidator>) -> Self {
        self.config_validator = validator;
        self
    }

    pub fn workflow_state(&self) -> WorkflowState {
        *self.workflow_state.lock().unwrap()
    }

    fn set_workflow_state(&self, state: WorkflowState) {
        *self.workflow_state.lock().unwrap() = state;
    }

    /// Read-only access for callers/tests inspecting per-node results after
    /// a run (lifecycle tag, last error, result data, timing).
    pub async fn with_graph<R>(&self, f: impl FnOnce(&Graph) -> R) -> R {
        let guard = self.graph.lock().await;
        f(&guard)
    }

    pub async fn with_state<R>(&self, f: impl FnOnce(&ExecutionState) -> R) -> R {
        let guard = self.state.lock().await;
        f(&guard)
    }

    /// `execute(triggerName, initialData?) -> success | failure`.
    #[instrument(skip(self, initial_data), fields(workflow_id = %self.workflow_id, trigger = %trigger_name))]
    pub async fn execute(&self, trigger_name: &str, initial_data: Option<Value>) -> Result<(), EngineError> {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(EngineError::AlreadyExecuting);
        }

        let result = self.run(trigger_name, initial_data).await;
        self.running.store(false, Ordering::SeqCst);
        result
    }

    async fn run(&self, trigger_name: &str, initial_data: Option<Value>) -> Result<(), EngineError> {
        // ---- Step 1: run reset ----
        {
            let mut graph = self.graph.lock().await;
            for node in graph.nodes_mut() {
                node.reset();
            }
        }
        {
            let mut state = self.state.lock().await;
            state.clear();
        }
        self.set_workflow_state(WorkflowState::Running);

        // Graph is not mutated again until this run ends — take one
        // immutable snapshot for planning and for every runner to read.
        let graph_snapshot: Arc<Graph> = {
            let guard = self.graph.lock().await;
            Arc::new(guard.clone())
        };

        if graph_snapshot.node(trigger_name).is_none() {
            self.set_workflow_state(WorkflowState::Failed);
            return Err(EngineError::UnknownNodeType(trigger_name.to_string()));
        }

        // ---- Step 2: seed the trigger's output and mark it Completed ----
        let trigger_output = seed_output(initial_data);
        {
            let mut state = self.state.lock().await;
            state.set_node_output(trigger_name, trigger_output.clone());
            state.record_node_start(trigger_name);
            state.record_node_end(trigger_name, NodeState::Completed);
        }
        {
            let mut graph = self.graph.lock().await;
            if let Some(node) = graph.node_mut(trigger_name) {
                node.state = NodeState::Completed;
                node.result_data = Some(trigger_output);
            }
        }

        // ---- Step 3: plan ----
        let reachable: HashSet<String> = graph_snapshot.reachable_from(trigger_name).into_iter().collect();
        let adjacency = build_adjacency(&graph_snapshot, trigger_name, &reachable);

        let waves = match dag::compute_waves(&adjacency) {
            Ok(w) => w,
            Err(e) => {
                error!("planning failed: {e}");
                self.set_workflow_state(WorkflowState::Failed);
                return Err(e);
            }
        };

        info!(wave_count = waves.len(), "plan computed, dispatching");

        // ---- Step 4: dispatch ----
        for wave in &waves {
            let batches = partition_into_batches(wave, self.config.max_parallel_executions);

            for batch in batches {
                let state_snapshot: Arc<ExecutionState> = {
                    // Read-only snapshot of everything completed so far.
                    let guard = self.state.lock().await;
                    Arc::new(guard.clone())
                };

                let mut join_set = tokio::task::JoinSet::new();
                let mut immediate_outcomes = Vec::new();
                for node_name in &batch {
                    let node = graph_snapshot
                        .node(node_name)
                        .expect("planned node must exist in graph snapshot")
                        .clone();

                    if node.capabilities.disabled {
                        continue;
                    }

                    // Schema check happens once per node, before its first
                    // dispatch, and is never retried — a bad config can't be
                    // fixed by trying again.
                    let validation = self.config_validator.validate(node.config_schema.as_ref(), &node.config);
                    if !validation.valid {
                        warn!(node = %node.name, errors = ?validation.errors, "node config failed validation");
                        immediate_outcomes.push(config_invalid_outcome(&node, validation.errors));
                        continue;
                    }

                    let inputs = node_runner::assemble_inputs(&graph_snapshot, &state_snapshot, &node);
                    let behavior = self.registry.get(&node.node_type).cloned();
                    let secrets = resolve_secrets(self.secret_resolver.as_ref(), &node.config);
                    let state_for_task = Arc::clone(&state_snapshot);
                    let workflow_id = self.workflow_id.clone();

                    join_set.spawn(async move {
                        match behavior {
                            Some(behavior) => {
                                let run_id = Uuid::new_v4();
                                node_runner::run(
                                    &node,
                                    behavior.as_ref(),
                                    inputs,
                                    state_for_task.as_ref(),
                                    Uuid::parse_str(&workflow_id).unwrap_or(run_id),
                                    run_id,
                                    secrets,
                                )
                                .await
                            }
                            None => missing_node_type_outcome(&node),
                        }
                    });
                }

                let mut outcomes = immediate_outcomes;
                while let Some(joined) = join_set.join_next().await {
                    match joined {
                        Ok(outcome) => outcomes.push(outcome),
                        Err(join_err) => {
                            error!("node task panicked: {join_err}");
                        }
                    }
                }

                let mut fatal: Option<(String, bool)> = None;
                {
                    let mut state = self.state.lock().await;
                    let mut graph = self.graph.lock().await;
                    for outcome in outcomes {
                        let config_invalid = outcome.config_invalid;
                        apply_outcome(&mut state, &mut graph, &outcome);

                        if outcome.state == NodeState::Failed {
                            let continue_on_fail = graph
                                .node(&outcome.node_name)
                                .map(|n| n.capabilities.continue_on_fail)
                                .unwrap_or(false);
                            warn!(node = %outcome.node_name, continue_on_fail, "node failed");
                            if !continue_on_fail && fatal.is_none() {
                                fatal = Some((outcome.node_name.clone(), config_invalid));
                            }
                        }
                    }
                }

                if let Some((node_name, config_invalid)) = fatal {
                    self.set_workflow_state(WorkflowState::Failed);
                    let message = self
                        .with_graph(|g| g.node(&node_name).and_then(|n| n.last_error.clone()))
                        .await
                        .unwrap_or_default();
                    if config_invalid {
                        return Err(EngineError::ConfigurationInvalid { node_id: node_name, reason: message });
                    }
                    return Err(EngineError::NodeProcessFailed { node_id: node_name, message });
                }
            }
        }

        // ---- Step 5: completion ----
        self.set_workflow_state(WorkflowState::Completed);
        info!("workflow execution completed");

        if let Some(hook) = &self.persistence {
            let snapshot = self.state.lock().await.export();
            let metadata = RunMetadata {
                workflow_id: self.workflow_id.clone(),
                execution_id: Uuid::new_v4().to_string(),
                finished_at: Some(chrono::Utc::now()),
            };
            hook.persist(&self.workflow_id, &snapshot, &metadata).await;
        }

        Ok(())
    }
}

fn seed_output(initial_data: Option<Value>) -> PortValues {
    let mut values = PortValues::new();
    if let Some(data) = initial_data {
        values.insert("main", data);
    }
    values
}

fn resolve_secrets(resolver: &dyn SecretResolver, config: &Value) -> HashMap<String, String> {
    let resolved = resolver.resolve(config);
    match resolved {
        Value::Object(map) => map
            .into_iter()
            .filter_map(|(k, v)| v.as_str().map(|s| (k, s.to_string())))
            .collect(),
        _ => HashMap::new(),
    }
}

fn missing_node_type_outcome(node: &crate::node::Node) -> Outcome {
    let now = chrono::Utc::now();
    Outcome {
        node_name: node.name.clone(),
        state: NodeState::Failed,
        error: Some(format!("no implementation registered for node type '{}'", node.node_type)),
        output: None,
        started_at: now,
        ended_at: now,
        attempts: 0,
        config_invalid: false,
    }
}

fn config_invalid_outcome(node: &crate::node::Node, errors: Vec<String>) -> Outcome {
    let now = chrono::Utc::now();
    Outcome {
        node_name: node.name.clone(),
        state: NodeState::Failed,
        error: Some(errors.join("; ")),
        output: None,
        started_at: now,
        ended_at: now,
        attempts: 0,
        config_invalid: true,
    }
}

fn apply_outcome(state: &mut ExecutionState, graph: &mut Graph, outcome: &Outcome) {
    state.record_node_start(&outcome.node_name);
    if let Some(output) = &outcome.output {
        state.set_node_output(&outcome.node_name, output.clone());
    }
    state.record_node_end(&outcome.node_name, outcome.state);

    if let Some(node) = graph.node_mut(&outcome.node_name) {
        node.state = outcome.state;
        node.last_error = outcome.error.clone();
        node.result_data = outcome.output.clone();
    }
}

/// Build the `node-name -> dependency node-names` adjacency restricted to
/// the subgraph reachable from the trigger, excluding the trigger itself
/// (its output is already seeded before planning starts). Dependencies on
/// nodes outside the reachable set are dropped: those sources never run,
/// so their contribution is simply absent, not a hard dependency.
fn build_adjacency(
    graph: &Graph,
    trigger_name: &str,
    reachable: &HashSet<String>,
) -> HashMap<String, Vec<String>> {
    let mut adjacency = HashMap::new();
    for name in reachable {
        if name == trigger_name {
            continue;
        }
        let deps: HashSet<String> = graph
            .incoming(name)
            .iter()
            .map(|l| l.source_node.clone())
            .filter(|src| src != trigger_name && reachable.contains(src))
            .collect();
        adjacency.insert(name.clone(), deps.into_iter().collect());
    }
    adjacency
}

/// Partition a wave into batches of size <= `max_parallel` (0 = unbounded:
/// one batch containing the whole wave).
fn partition_into_batches(wave: &[String], max_parallel: usize) -> Vec<Vec<String>> {
    if max_parallel == 0 || wave.len() <= max_parallel {
        return vec![wave.to_vec()];
    }
    wave.chunks(max_parallel).map(|c| c.to_vec()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{Node, NodeCapabilities, Port, RetryDelay};
    use nodes::mock::{value_output, MockNode};

    #[test]
    fn unbounded_cap_yields_single_batch() {
        let wave = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let batches = partition_into_batches(&wave, 0);
        assert_eq!(batches, vec![wave]);
    }

    #[test]
    fn capped_parallelism_splits_into_chunks() {
        let wave: Vec<String> = (0..5).map(|i| i.to_string()).collect();
        let batches = partition_into_batches(&wave, 2);
        assert_eq!(batches.len(), 3);
        assert_eq!(batches[0].len(), 2);
        assert_eq!(batches[2].len(), 1);
    }

    fn registry_of(entries: Vec<(&str, Arc<MockNode>)>) -> NodeRegistry {
        entries
            .into_iter()
            .map(|(node_type, mock)| (node_type.to_string(), mock as Arc<dyn NodeBehavior>))
            .collect()
    }

    #[tokio::test]
    async fn linear_chain_propagates_each_node_output_to_the_next() {
        let mut graph = Graph::new();
        graph
            .add_node(Node::new("start", "trigger").with_outputs(vec![Port::new("main", "any")]).as_trigger())
            .unwrap();
        graph
            .add_node(
                Node::new("a", "nodeA")
                    .with_inputs(vec![Port::new("main", "any")])
                    .with_outputs(vec![Port::new("out", "any")]),
            )
            .unwrap();
        graph
            .add_node(
                Node::new("b", "nodeB")
                    .with_inputs(vec![Port::new("main", "any")])
                    .with_outputs(vec![Port::new("out", "any")]),
            )
            .unwrap();
        graph.link_nodes("start", "main", "a", "main").unwrap();
        graph.link_nodes("a", "out", "b", "main").unwrap();

        let node_a = Arc::new(MockNode::succeeding("a", value_output("from-a")));
        let node_b = Arc::new(MockNode::succeeding("b", value_output("from-b")));
        let registry = registry_of(vec![("nodeA", Arc::clone(&node_a)), ("nodeB", Arc::clone(&node_b))]);

        let engine = Engine::new("wf-linear", graph, registry, EngineConfig::default());
        engine.execute("start", Some(serde_json::json!("seed"))).await.unwrap();

        assert_eq!(node_b.calls.lock().unwrap()[0].get("main").unwrap(), &vec![serde_json::json!("from-a")]);
        let state = engine.workflow_state();
        assert_eq!(state, WorkflowState::Completed);
    }

    #[tokio::test]
    async fn parallel_fan_in_concatenates_contributions_in_link_insertion_order() {
        let mut graph = Graph::new();
        graph
            .add_node(Node::new("start", "trigger").with_outputs(vec![Port::new("main", "any")]).as_trigger())
            .unwrap();
        graph
            .add_node(
                Node::new("b", "nodeB")
                    .with_inputs(vec![Port::new("main", "any")])
                    .with_outputs(vec![Port::new("out", "any")]),
            )
            .unwrap();
        graph
            .add_node(
                Node::new("c", "nodeC")
                    .with_inputs(vec![Port::new("main", "any")])
                    .with_outputs(vec![Port::new("out", "any")]),
            )
            .unwrap();
        graph
            .add_node(Node::new("d", "nodeD").with_inputs(vec![Port::new("main", "any")]))
            .unwrap();
        graph.link_nodes("start", "main", "b", "main").unwrap();
        graph.link_nodes("start", "main", "c", "main").unwrap();
        // Linked in this order: b before c, so d's fan-in must see b's
        // contribution first regardless of wave dispatch order.
        graph.link_nodes("b", "out", "d", "main").unwrap();
        graph.link_nodes("c", "out", "d", "main").unwrap();

        let node_b = Arc::new(MockNode::succeeding("b", value_output("from-b")));
        let node_c = Arc::new(MockNode::succeeding("c", value_output("from-c")));
        let node_d = Arc::new(MockNode::succeeding("d", value_output("from-d")));
        let registry = registry_of(vec![
            ("nodeB", Arc::clone(&node_b)),
            ("nodeC", Arc::clone(&node_c)),
            ("nodeD", Arc::clone(&node_d)),
        ]);

        let engine = Engine::new("wf-fan-in", graph, registry, EngineConfig::default());
        engine.execute("start", None).await.unwrap();

        let calls = node_d.calls.lock().unwrap();
        assert_eq!(calls[0].get("main").unwrap(), &vec![serde_json::json!("from-b"), serde_json::json!("from-c")]);
    }

    #[tokio::test]
    async fn retry_then_succeed_runs_three_attempts_with_real_backoff() {
        let mut graph = Graph::new();
        graph
            .add_node(Node::new("start", "trigger").with_outputs(vec![Port::new("main", "any")]).as_trigger())
            .unwrap();
        graph
            .add_node(
                Node::new("flaky", "flakyNode")
                    .with_inputs(vec![Port::new("main", "any")])
                    .with_capabilities(NodeCapabilities {
                        retry_on_fail: true,
                        max_retries: 5,
                        retry_delay: RetryDelay::Fixed(10),
                        ..NodeCapabilities::default()
                    }),
            )
            .unwrap();
        graph.link_nodes("start", "main", "flaky", "main").unwrap();

        let flaky = Arc::new(MockNode::failing_until("flaky", 3, value_output("recovered")));
        let registry = registry_of(vec![("flakyNode", Arc::clone(&flaky))]);

        let engine = Engine::new("wf-retry", graph, registry, EngineConfig::default());
        let started = std::time::Instant::now();
        engine.execute("start", None).await.unwrap();

        assert_eq!(flaky.call_count(), 3);
        assert!(started.elapsed() >= std::time::Duration::from_millis(20));
        let state = engine.with_graph(|g| g.node("flaky").unwrap().state).await;
        assert_eq!(state, NodeState::Completed);
    }

    #[tokio::test]
    async fn non_continuable_failure_halts_downstream_dispatch() {
        let mut graph = Graph::new();
        graph
            .add_node(Node::new("start", "trigger").with_outputs(vec![Port::new("main", "any")]).as_trigger())
            .unwrap();
        graph
            .add_node(
                Node::new("failing", "failNode")
                    .with_inputs(vec![Port::new("main", "any")])
                    .with_outputs(vec![Port::new("out", "any")]),
            )
            .unwrap();
        graph
            .add_node(
                Node::new("downstream", "nodeD").with_inputs(vec![Port::new("main", "any")]),
            )
            .unwrap();
        graph.link_nodes("start", "main", "failing", "main").unwrap();
        graph.link_nodes("failing", "out", "downstream", "main").unwrap();

        let failing = Arc::new(MockNode::failing_always("failing", "no retry configured"));
        let downstream = Arc::new(MockNode::succeeding("downstream", value_output("unreached")));
        let registry = registry_of(vec![
            ("failNode", Arc::clone(&failing)),
            ("nodeD", Arc::clone(&downstream)),
        ]);

        let engine = Engine::new("wf-halt", graph, registry, EngineConfig::default());
        let err = engine.execute("start", None).await.unwrap_err();

        assert!(matches!(err, EngineError::NodeProcessFailed { node_id, .. } if node_id == "failing"));
        assert_eq!(downstream.call_count(), 0);
        assert_eq!(engine.workflow_state(), WorkflowState::Failed);
    }

    struct RejectingValidator;

    impl crate::config::ConfigValidator for RejectingValidator {
        fn validate(&self, _schema: Option<&Value>, _config: &Value) -> crate::config::ValidationOutcome {
            crate::config::ValidationOutcome { valid: false, errors: vec!["missing required field 'url'".to_string()] }
        }
    }

    #[tokio::test]
    async fn invalid_config_is_fatal_and_skips_process_entirely() {
        let mut graph = Graph::new();
        graph
            .add_node(Node::new("start", "trigger").with_outputs(vec![Port::new("main", "any")]).as_trigger())
            .unwrap();
        graph
            .add_node(Node::new("misconfigured", "httpNode").with_inputs(vec![Port::new("main", "any")]))
            .unwrap();
        graph.link_nodes("start", "main", "misconfigured", "main").unwrap();

        let node = Arc::new(MockNode::succeeding("misconfigured", value_output("unreached")));
        let registry = registry_of(vec![("httpNode", Arc::clone(&node))]);

        let engine = Engine::new("wf-config", graph, registry, EngineConfig::default())
            .with_config_validator(Arc::new(RejectingValidator));
        let err = engine.execute("start", None).await.unwrap_err();

        assert!(matches!(
            err,
            EngineError::ConfigurationInvalid { node_id, reason }
                if node_id == "misconfigured" && reason.contains("url")
        ));
        assert_eq!(node.call_count(), 0);
        assert_eq!(engine.workflow_state(), WorkflowState::Failed);
    }
}
