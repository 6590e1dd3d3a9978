//! Shellwise - natural language to shell commands through remote LLMs.
//!
//! This library turns a request written in plain language into a shell
//! command, checks the command for destructive patterns and hands it back
//! for confirmation. It supports:
//!
//! - **Several providers** (ECNU, ZhipuAI, Qwen and MiniMax models) behind one request type
//! - **Local rate limiting** over minute, hour and day windows
//! - **Safety verdicts** on every generated command before it can run
//! - **Teach mode** that explains commands or turns requests into explained commands
//! - **Failure diagnosis** for commands that exit with an error
//!
//! # Architecture
//!
//! The library is organized into several modules:
//!
//! - [`orchestrator`] - Top-level flow from user input to a gated decision
//! - [`router`] - Active model selection, credentials and dispatch
//! - [`adapters`] - Wire format of each provider family
//! - [`rate_limiter`] - Sliding-window request ceilings
//! - [`safety`] - Destructive-command rule table
//! - [`decision`] - Acknowledgments required before a command may run
//! - [`executor`] - Runs approved commands through the shell
//! - [`confirm_ui`] - Confirmation prompts
//! - [`config`] - Configuration file and defaults
//! - [`http_client`] - HTTP client abstraction
//! - [`shell`] - Interactive prompt used by the binary
//!
//! # Example
//!
//! ```ignore
//! use shellwise::prelude::*;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load(None)?;
//!     let credentials = Credentials::from_env(None, &config.api_keys);
//!     let router = ModelRouter::new(
//!         ProfileCatalog::builtin(),
//!         credentials,
//!         config.router_settings(),
//!         Arc::new(ReqwestHttpClient::new()),
//!     )?;
//!     let orchestrator =
//!         CommandOrchestrator::new(router, SafetyGate::new(), config.sampling(), config.block_policy);
//!
//!     if let OrchestratorResult::Command(decision) =
//!         orchestrator.process("show disk usage", ProcessMode::Shell).await?
//!     {
//!         println!("{} ({})", decision.command(), decision.level());
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Safety
//!
//! The safety gate is pattern matching over the command text. It catches the
//! common destructive shapes; it is not a sandbox and does not make running
//! generated commands safe.

pub mod adapters;
pub mod chat;
pub mod clock;
pub mod config;
pub mod confirm_ui;
pub mod credentials;
pub mod decision;
pub mod error;
pub mod executor;
pub mod extract;
pub mod http_client;
pub mod input_kind;
pub mod orchestrator;
pub mod profile;
pub mod prompts;
pub mod rate_limiter;
pub mod router;
pub mod safety;
pub mod shell;

/// Types most callers need.
pub mod prelude {
    pub use crate::chat::{ChatMode, ChatRequest, ChatResult, SamplingDefaults};
    pub use crate::config::Config;
    pub use crate::credentials::Credentials;
    pub use crate::decision::{Acknowledgment, ApprovedCommand, BlockPolicy, CommandDecision};
    pub use crate::error::{Error, Result};
    pub use crate::http_client::{HttpClient, ReqwestHttpClient};
    pub use crate::orchestrator::{CommandOrchestrator, OrchestratorResult, ProcessMode};
    pub use crate::profile::{ProfileCatalog, ProviderProfile};
    pub use crate::router::ModelRouter;
    pub use crate::safety::{SafetyGate, SafetyLevel, SafetyVerdict};
}
