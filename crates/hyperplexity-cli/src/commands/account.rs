//! `mcp-server-hyperplexity balance|usage`: account queries.

use hyperplexity_core::adapter::GetUsageRequest;
use hyperplexity_core::{run, LogProgress, SessionContext, ToolCall, ToolOutcome, WorkflowAdapter};
use tokio::sync::Mutex;

use super::finish;

pub async fn balance(adapter: &WorkflowAdapter) -> Result<(), String> {
    finish(balance_outcome(adapter).await)
}

pub async fn balance_outcome(adapter: &WorkflowAdapter) -> ToolOutcome {
    let ctx = Mutex::new(SessionContext::new());
    run(adapter, &ctx, ToolCall::GetBalance, &LogProgress).await
}

pub async fn usage(adapter: &WorkflowAdapter, req: GetUsageRequest) -> Result<(), String> {
    let ctx = Mutex::new(SessionContext::new());
    finish(run(adapter, &ctx, ToolCall::GetUsage(req), &LogProgress).await)
}
