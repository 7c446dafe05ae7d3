//! Foreman Core Library
//!
//! An autonomous task-execution controller: events in, gated and
//! sandboxed tool invocations out, with plan bookkeeping, bounded
//! retries, and guaranteed termination.

pub mod collab;
pub mod controller;
pub mod domain;
pub mod events;
pub mod plan;
pub mod security;
pub mod telemetry;
pub mod tools;

pub use collab::{
    merge_facts, KnowledgeRetriever, LinePlanner, LogChannel, NoKnowledge, OutputChannel,
    Planner, RankedFact, SourceClass, StepReport, TaskReport,
};

pub use controller::{AgenticLoop, LoopConfig, LoopState, TaskDispatcher};

pub use domain::{
    result_digest, AgentError, AgentEvent, EventKind, Operation, PlanStep, PriorityTier, Result,
    SecurityDecision, SecurityStage, StepStatus, Task, TaskStatus, ValidationError, Verdict,
};

pub use events::{EventHandler, EventStream, StreamConfig};

pub use plan::PlanTracker;

pub use security::{
    AbortSource, AbortToken, AuditLog, AuditOutcome, AuditRecord, ExecutionReport,
    PermissionLevel, PolicyTable, ResourceLimits, SandboxPool, SandboxSession, SecurityContext,
    SecurityManager,
};

pub use tools::builtin::{standard_registry, FileTool, KnowledgeTool, MessageTool, ShellTool};
pub use tools::{ToolAdapter, ToolKind, ToolRegistry};

pub use telemetry::init_tracing;

/// Foreman version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
