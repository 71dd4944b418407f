//! ExecutionState — the per-run node-output map and timing metadata.
//!
//! Single-writer (the engine, between suspension points) and multi-reader
//! (any `NodeRunner`'s `process` may read prior outputs through its
//! context). Readers within a wave only ever see strictly-earlier waves,
//! which have already been published by the time the current wave starts.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::node::{NodeState, PortValues};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeTiming {
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub duration: Option<Duration>,
    pub status: NodeState,
}

impl Default for NodeTiming {
    fn default() -> Self {
        Self {
            start_time: None,
            end_time: None,
            duration: None,
            status: NodeState::Idle,
        }
    }
}

/// Structural snapshot of `ExecutionState`, handed to a `PersistenceHook`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecutionSnapshot {
    pub outputs: HashMap<String, PortValues>,
    pub meta: HashMap<String, NodeTiming>,
}

/// The per-run map: `node-name -> port-name -> value(s)`, plus a parallel
/// `node-name -> timing/status` map.
#[derive(Debug, Default, Clone)]
pub struct ExecutionState {
    outputs: HashMap<String, PortValues>,
    meta: HashMap<String, NodeTiming>,
}

impl ExecutionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_node_start(&mut self, name: &str) {
        let timing = self.meta.entry(name.to_string()).or_default();
        timing.start_time = Some(Utc::now());
        timing.status = NodeState::Running;
    }

    pub fn record_node_end(&mut self, name: &str, status: NodeState) {
        let timing = self.meta.entry(name.to_string()).or_default();
        let end = Utc::now();
        timing.end_time = Some(end);
        if let Some(start) = timing.start_time {
            timing.duration = (end - start).to_std().ok();
        }
        timing.status = status;
    }

    pub fn set_node_output(&mut self, name: &str, output: PortValues) {
        self.outputs.insert(name.to_string(), output);
    }

    pub fn get_node_output(&self, name: &str) -> Option<&PortValues> {
        self.outputs.get(name)
    }

    /// Values contributed on one port of one node, in storage order (a
    /// list, even for a single record).
    pub fn get_node_output_port(&self, name: &str, port: &str) -> Option<&[Value]> {
        self.outputs.get(name).and_then(|p| p.get(port))
    }

    pub fn timing(&self, name: &str) -> Option<&NodeTiming> {
        self.meta.get(name)
    }

    /// Structural snapshot of both maps for the persistence hook.
    pub fn export(&self) -> ExecutionSnapshot {
        ExecutionSnapshot {
            outputs: self.outputs.clone(),
            meta: self.meta.clone(),
        }
    }

    pub fn import(&mut self, snapshot: ExecutionSnapshot) {
        self.outputs = snapshot.outputs;
        self.meta = snapshot.meta;
    }

    pub fn clear(&mut self) {
        self.outputs.clear();
        self.meta.clear();
    }
}

impl nodes::StateView for ExecutionState {
    fn node_output(&self, node: &str) -> Option<nodes::PortInputs> {
        self.outputs.get(node).map(|p| p.0.clone())
    }

    fn node_output_port(&self, node: &str, port: &str) -> Option<Vec<Value>> {
        self.get_node_output_port(node, port).map(|v| v.to_vec())
    }
}
