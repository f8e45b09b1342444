//! `mcp-server-hyperplexity call|tools`: invoke any tool by name.

use hyperplexity_core::{dispatch, LogProgress, SessionContext, ToolName, ToolOutcome, WorkflowAdapter};
use serde_json::{json, Value};
use tokio::sync::Mutex;

use super::{finish, print_json};

/// Parse `params_str` and dispatch it to `tool` in a fresh session.
pub async fn execute(
    adapter: &WorkflowAdapter,
    tool: &str,
    params_str: &str,
) -> Result<ToolOutcome, String> {
    let params: Value =
        serde_json::from_str(params_str).map_err(|e| format!("Invalid JSON params: {}", e))?;
    let ctx = Mutex::new(SessionContext::new());
    Ok(dispatch(adapter, &ctx, tool, params, &LogProgress).await)
}

pub async fn call(adapter: &WorkflowAdapter, tool: &str, params_str: &str) -> Result<(), String> {
    finish(execute(adapter, tool, params_str).await?)
}

pub fn catalog() -> Value {
    let tools: Vec<Value> = ToolName::ALL
        .iter()
        .map(|t| json!({ "name": t.as_str(), "description": t.description() }))
        .collect();
    json!({ "tools": tools })
}

pub fn tools() -> Result<(), String> {
    print_json(&catalog());
    Ok(())
}
