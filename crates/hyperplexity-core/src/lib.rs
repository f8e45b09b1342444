//! Hyperplexity Core: transport-agnostic adapter for the Hyperplexity API.
//!
//! This crate contains everything the MCP server and the CLI share:
//! - `client`: authenticated HTTP client with envelope handling
//! - `models`: typed job, conversation, upload and result payloads
//! - `session`: per-agent session context and call-ordering guards
//! - `adapter`: one operation per tool, plus JSON dispatch
//! - `guidance`: the `_guidance` next-step block
//! - `poll`: blocking waits and the job message stream

pub mod adapter;
pub mod catalog;
pub mod client;
pub mod config;
pub mod error;
pub mod guidance;
pub mod models;
pub mod poll;
pub mod session;

pub use adapter::{dispatch, run, ToolCall, ToolOutcome, WorkflowAdapter};
pub use catalog::ToolName;
pub use client::HyperplexityClient;
pub use config::ClientConfig;
pub use error::{ErrorClass, HpxError, HpxResult};
pub use poll::{LogProgress, ProgressSink, WaitOptions};
pub use session::SessionContext;
