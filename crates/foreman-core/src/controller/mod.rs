//! Agentic loop controller.

pub mod agentic;
pub mod dispatcher;
pub mod state;

pub use agentic::{resolve_tool, AgenticLoop, LoopConfig};
pub use dispatcher::TaskDispatcher;
pub use state::LoopState;
