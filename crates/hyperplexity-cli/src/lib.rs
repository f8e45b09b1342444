//! Hyperplexity CLI library: the command implementations behind the
//! `mcp-server-hyperplexity` binary, exposed for integration tests.

pub mod commands;
