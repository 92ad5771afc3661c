//! Core logic including the conversation turn loop, tool execution,
//! conversation storage, configurations, etc.

#![deny(missing_docs)]
#![deny(clippy::missing_safety_doc)]

#[macro_use]
extern crate tracing;

pub mod config;
pub mod conversation;
mod model_client;
mod orchestrator;
pub mod store;
pub mod tool;

pub use config::{CompactionPolicy, OrchestratorConfig, RetryPolicy};
pub use orchestrator::{
    Orchestrator, OrchestratorBuilder, TurnError, TurnErrorKind,
};
pub use tokio_util::sync::CancellationToken;
