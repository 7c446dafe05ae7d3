use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tracing::Level;

use foreman_core::{
    init_tracing, standard_registry, AgentEvent, AuditLog, EventKind, EventStream, LinePlanner,
    LogChannel, LoopConfig, NoKnowledge, PlanTracker, PolicyTable, SandboxPool, SecurityManager,
    StreamConfig, TaskDispatcher,
};
use foreman_state::{FsKvStore, KvStore, MemoryKvStore};

/// Run a task through the Foreman agentic controller.
#[derive(Parser, Debug)]
#[command(name = "foremand", version, about)]
struct Args {
    /// The task to run, e.g. "list files in /tmp; say done".
    intent: String,

    /// Identity under which operations are dispatched.
    #[arg(long, default_value = "agent")]
    role: String,

    /// Global sandbox concurrency ceiling.
    #[arg(long, default_value_t = 4)]
    sandbox_ceiling: usize,

    /// Maximum controller iterations per task.
    #[arg(long, default_value_t = 16)]
    step_budget: u32,

    /// Maximum attempts per step.
    #[arg(long, default_value_t = 3)]
    retry_limit: u32,

    /// Directory for durable plan/audit state. In-memory when omitted.
    #[arg(long, env = "FOREMAN_STATE_DIR")]
    state_dir: Option<PathBuf>,

    /// Emit newline-delimited JSON log lines.
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.json_logs, Level::INFO);

    let store: Arc<dyn KvStore> = match &args.state_dir {
        Some(dir) => Arc::new(FsKvStore::new(dir)?),
        None => Arc::new(MemoryKvStore::new()),
    };

    let audit = Arc::new(AuditLog::new(store.clone()));
    let stream = EventStream::new(StreamConfig::default(), audit.clone());

    let retriever = Arc::new(NoKnowledge);
    let registry = Arc::new(standard_registry(retriever.clone()));
    let pool = SandboxPool::new(
        args.sandbox_ceiling,
        Duration::from_secs(30),
        std::env::temp_dir().join("foreman-sandbox"),
    );
    let manager = Arc::new(SecurityManager::new(
        registry,
        Arc::new(PolicyTable::standard_agent()),
        pool,
        audit.clone(),
    ));
    let tracker = Arc::new(PlanTracker::new(store));

    let dispatcher = Arc::new(TaskDispatcher::new(
        Arc::new(LinePlanner),
        retriever,
        manager,
        tracker,
        Arc::new(LogChannel),
        LoopConfig {
            step_budget: args.step_budget,
            retry_limit: args.retry_limit,
            role: args.role.clone(),
            ..LoopConfig::default()
        },
    ));
    stream
        .subscribe(EventKind::UserMessage, dispatcher.clone())
        .await;

    let event = AgentEvent::new(
        EventKind::UserMessage,
        serde_json::json!({ "text": args.intent }),
        "cli",
    );
    stream.submit(event).await?;
    stream.dispatch_cycle().await?;

    for report in dispatcher.reports().await {
        println!("{}", serde_json::to_string_pretty(&report)?);
    }
    Ok(())
}
