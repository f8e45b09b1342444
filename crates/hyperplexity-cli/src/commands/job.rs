//! `mcp-server-hyperplexity job`: inspect and follow jobs.

use std::time::Duration;

use hyperplexity_core::adapter::{GetJobMessagesRequest, JobIdRequest, WaitForJobRequest};
use hyperplexity_core::poll::job_messages;
use hyperplexity_core::{
    run, LogProgress, ProgressSink, SessionContext, ToolCall, WorkflowAdapter,
};
use tokio::sync::Mutex;
use tokio_stream::StreamExt;

use super::{finish, print_json};

/// Progress lines on stderr, keeping stdout for the JSON result.
pub struct StderrProgress;

impl ProgressSink for StderrProgress {
    fn report(&self, progress: f64, message: Option<&str>) {
        match message {
            Some(message) => eprintln!("[{:5.1}%] {}", progress, message),
            None => eprintln!("[{:5.1}%]", progress),
        }
    }
}

pub async fn status(adapter: &WorkflowAdapter, job_id: &str) -> Result<(), String> {
    let ctx = Mutex::new(SessionContext::new());
    let call = ToolCall::GetJobStatus(JobIdRequest {
        job_id: job_id.to_string(),
    });
    finish(run(adapter, &ctx, call, &LogProgress).await)
}

pub async fn results(adapter: &WorkflowAdapter, job_id: &str) -> Result<(), String> {
    let ctx = Mutex::new(SessionContext::new());
    let call = ToolCall::GetResults(JobIdRequest {
        job_id: job_id.to_string(),
    });
    finish(run(adapter, &ctx, call, &LogProgress).await)
}

pub async fn wait(
    adapter: &WorkflowAdapter,
    job_id: &str,
    timeout_seconds: Option<u64>,
    poll_interval: Option<u64>,
) -> Result<(), String> {
    let ctx = Mutex::new(SessionContext::new());
    let call = ToolCall::WaitForJob(WaitForJobRequest {
        job_id: job_id.to_string(),
        timeout_seconds,
        poll_interval,
    });
    finish(run(adapter, &ctx, call, &StderrProgress).await)
}

/// Print one page of messages, or with `follow` print every message until
/// the job finishes.
pub async fn messages(
    adapter: &WorkflowAdapter,
    job_id: &str,
    since_seq: Option<i64>,
    follow: bool,
    interval_secs: u64,
) -> Result<(), String> {
    if !follow {
        let ctx = Mutex::new(SessionContext::new());
        let call = ToolCall::GetJobMessages(GetJobMessagesRequest {
            job_id: job_id.to_string(),
            since_seq,
        });
        return finish(run(adapter, &ctx, call, &LogProgress).await);
    }

    let stream = job_messages(adapter, job_id, Duration::from_secs(interval_secs.max(1)));
    tokio::pin!(stream);
    while let Some(message) = stream.next().await {
        let message = message.map_err(|e| e.to_string())?;
        print_json(&message.payload);
    }
    tracing::info!("[Job] {} finished; message stream closed", job_id);
    Ok(())
}
