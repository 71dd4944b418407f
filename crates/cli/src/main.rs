//! `rusty-automation-tool` CLI entry-point.
//!
//! A thin binary used to exercise the engine end-to-end:
//! - `validate` — parse and structurally validate a workflow JSON document.
//! - `run`      — import a workflow document and execute it once from a
//!                named trigger node, echoing every node's inputs back as
//!                its output (concrete node implementations are outside
//!                the engine's scope; this is a demonstration behaviour).
//! - `schedule` — arm a calendar-recurrence schedule against a named
//!                trigger node and wait for its first firing.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::{Parser, Subcommand, ValueEnum};
use engine::{Engine, EngineConfig, NodeRegistry, ScheduleDescriptor, ScheduleTrigger};
use nodes::{ExecutionContext, NodeBehavior, NodeError};
use tracing::info;

#[derive(Parser)]
#[command(
    name = "rusty-automation-tool",
    about = "Workflow execution engine CLI",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Validate a workflow definition JSON file.
    Validate {
        /// Path to the workflow JSON document.
        path: std::path::PathBuf,
    },
    /// Run a workflow document once from a named trigger node.
    Run {
        /// Path to the workflow JSON document.
        path: std::path::PathBuf,
        /// Name of the trigger node to fire.
        #[arg(long)]
        trigger: String,
        /// Optional JSON payload seeded as the trigger's output.
        #[arg(long)]
        data: Option<String>,
    },
    /// Arm a calendar-recurrence schedule and wait for its first firing.
    Schedule {
        path: std::path::PathBuf,
        #[arg(long)]
        trigger: String,
        #[arg(long, value_enum)]
        kind: ScheduleKind,
        #[arg(long, default_value_t = 0)]
        second: u32,
        #[arg(long, default_value_t = 0)]
        minute: u32,
        #[arg(long, default_value_t = 0)]
        hour: u32,
        #[arg(long, default_value_t = 1)]
        day: u32,
        #[arg(long, default_value_t = 1)]
        month: u32,
        #[arg(long, default_value_t = 1000)]
        millis: u64,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ScheduleKind {
    Minute,
    Hour,
    Day,
    Month,
    Year,
    Interval,
}

/// A demonstration node behaviour: forwards its assembled inputs back out
/// under the same port names. Lets the CLI drive a real scheduler run
/// without depending on any concrete node implementation.
struct EchoBehavior;

#[async_trait]
impl NodeBehavior for EchoBehavior {
    async fn process(&self, ctx: &ExecutionContext<'_>) -> Result<HashMap<String, serde_json::Value>, NodeError> {
        let mut out = HashMap::new();
        for (port, values) in &ctx.input {
            out.insert(port.clone(), serde_json::Value::Array(values.clone()));
        }
        Ok(out)
    }
}

fn load_document(path: &std::path::Path) -> Result<engine::workflow_io::WorkflowDocument> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read file {}", path.display()))?;
    engine::workflow_io::parse(&content).context("invalid workflow document")
}

fn echo_registry(doc: &engine::workflow_io::WorkflowDocument) -> NodeRegistry {
    let mut registry = NodeRegistry::new();
    for node in &doc.nodes {
        registry
            .entry(node.properties.node_type.clone())
            .or_insert_with(|| Arc::new(EchoBehavior) as Arc<dyn NodeBehavior>);
    }
    registry
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    match cli.command {
        Command::Validate { path } => {
            let doc = load_document(&path)?;
            let graph = engine::workflow_io::import(&doc).context("workflow failed validation")?;
            println!("workflow is valid: {} node(s)", graph.node_count());
        }
        Command::Run { path, trigger, data } => {
            let doc = load_document(&path)?;
            let registry = echo_registry(&doc);
            let graph = engine::workflow_io::import(&doc).context("invalid workflow document")?;

            let payload = data
                .map(|raw| serde_json::from_str(&raw).context("invalid --data JSON"))
                .transpose()?;

            let eng = Engine::new(doc.id.clone(), graph, registry, EngineConfig::default());
            eng.execute(&trigger, payload).await.context("workflow execution failed")?;
            info!("workflow completed");
            eng.with_graph(|g| {
                for node in g.nodes() {
                    println!("{}: {:?}", node.name, node.state);
                }
            })
            .await;
        }
        Command::Schedule { path, trigger, kind, second, minute, hour, day, month, millis } => {
            let doc = load_document(&path)?;
            let registry = echo_registry(&doc);
            let graph = engine::workflow_io::import(&doc).context("invalid workflow document")?;

            let engine = Arc::new(Engine::new(doc.id.clone(), graph, registry, EngineConfig::default()));
            let descriptor = match kind {
                ScheduleKind::Minute => ScheduleDescriptor::EveryMinute { second },
                ScheduleKind::Hour => ScheduleDescriptor::EveryHour { minute, second },
                ScheduleKind::Day => ScheduleDescriptor::EveryDay { hour, minute, second },
                ScheduleKind::Month => ScheduleDescriptor::EveryMonth { day, hour, minute, second },
                ScheduleKind::Year => ScheduleDescriptor::EveryYear { month, day, hour, minute, second },
                ScheduleKind::Interval => ScheduleDescriptor::EveryInterval { millis },
            };

            let schedule = ScheduleTrigger::new(trigger.clone());
            schedule.setup(descriptor, Arc::clone(&engine)).context("invalid schedule")?;
            let armed_for = schedule.next_execution_time().context("schedule must be armed after setup")?;
            println!("armed, next firing at {armed_for}");

            loop {
                tokio::time::sleep(std::time::Duration::from_millis(200)).await;
                if schedule.next_execution_time() != Some(armed_for) {
                    println!("fired, rearmed for {:?}", schedule.next_execution_time());
                    break;
                }
            }
            schedule.deactivate();
        }
    }

    Ok(())
}
