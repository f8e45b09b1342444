//! CLI command implementations.
//!
//! Each submodule corresponds to a top-level CLI command. All of them go
//! through the same `hyperplexity_core::run` path as the MCP server, so a
//! command prints exactly what the matching tool would return.

pub mod account;
pub mod call;
pub mod job;
pub mod serve;

use hyperplexity_core::{ClientConfig, ToolOutcome, WorkflowAdapter};

/// Build the adapter for a resolved configuration.
pub fn init_adapter(config: &ClientConfig) -> Result<WorkflowAdapter, String> {
    WorkflowAdapter::from_config(config).map_err(|e| e.to_string())
}

/// Pretty-print a JSON value to stdout.
pub fn print_json(value: &serde_json::Value) {
    println!(
        "{}",
        serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
    );
}

/// Print a tool outcome; a failed tool becomes a non-zero exit.
pub fn finish(outcome: ToolOutcome) -> Result<(), String> {
    println!("{}", outcome.to_json());
    if outcome.is_error {
        let message = outcome
            .body
            .get("message")
            .and_then(|m| m.as_str())
            .unwrap_or("tool call failed");
        return Err(message.to_string());
    }
    Ok(())
}
