//! Hyperplexity MCP: the workflow adapter served as MCP tools over stdio.
//!
//! - `server`: the `rmcp` tool router, one tool per adapter operation
//!
//! All tool semantics (guards, guidance, error classification) live in
//! `hyperplexity-core`; this crate only maps MCP calls onto [`run`] and
//! renders the outcome.
//!
//! [`run`]: hyperplexity_core::run

pub mod server;

pub use server::{serve_stdio, HyperplexityMcpServer};
