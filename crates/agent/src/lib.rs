//! Pipeline agent core
//!
//! Reason-act-observe loop over the job search pipeline: the reasoning
//! backend picks one operation per turn, risky operations wait for human
//! approval, and every outcome is folded back into a bounded conversation.

use thiserror::Error;

pub mod cache;
pub mod context;
pub mod decision;
pub mod human;
pub mod loop_agent;
pub mod operations;
pub mod parser;
pub mod state;
pub mod window;

pub use cache::{ScrapeCache, ScrapeMetadata};
pub use context::{ContextBuilder, ScrapeMode};
pub use decision::{Decision, Params, CHECK_IN, FINISH};
pub use human::{ConsoleHuman, HumanInterface, ScriptedHuman};
pub use loop_agent::{AgentLoop, LoopState, RunOutcome};
pub use operations::{
    default_registry, Operation, OperationDescriptor, OperationError, OperationRegistry,
};
pub use parser::parse_decision;
pub use state::PipelineState;
pub use window::ContextWindow;

/// Agent errors
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("unknown operation: {0}")]
    UnknownOperation(String),

    #[error("no operations registered")]
    NoOperations,

    #[error("finish operation is not registered")]
    MissingFinish,
}

pub type Result<T> = std::result::Result<T, AgentError>;

/// Leading `max_chars` characters of `text`
pub(crate) fn clip(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
