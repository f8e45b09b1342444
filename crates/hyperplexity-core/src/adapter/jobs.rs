use serde_json::{json, Value};

use super::requests::{CreateJobRequest, GetJobMessagesRequest};
use super::{require, WorkflowAdapter};
use crate::error::{HpxError, HpxResult};
use crate::models::{JobHandle, JobSnapshot, JobStatus, MessagesPage};
use crate::session::SessionContext;

/// Rows processed by every preview run.
pub const PREVIEW_ROWS: u32 = 3;

impl WorkflowAdapter {
    pub async fn create_job(
        &self,
        ctx: &mut SessionContext,
        req: CreateJobRequest,
    ) -> HpxResult<JobHandle> {
        require("session_id", &req.session_id)?;
        ctx.check_create_job(&req.session_id)?;

        let mut payload = json!({ "session_id": req.session_id, "preview_rows": PREVIEW_ROWS });
        let optional = [
            ("upload_id", req.upload_id),
            ("config_id", req.config_id),
            ("s3_key", req.s3_key),
            ("notify_method", req.notify_method),
            ("webhook_url", req.webhook_url),
        ];
        for (key, value) in optional {
            if let Some(value) = value.filter(|v| !v.is_empty()) {
                payload[key] = Value::String(value);
            }
        }
        if let Some(config) = req.config {
            payload["config"] = config;
        }

        let data = self.client.post("/jobs", &payload).await?;
        let handle = job_handle(data, false)?;
        tracing::info!(
            "[Job] Preview {} created for session {}",
            handle.job_id,
            req.session_id
        );
        ctx.record_job_created(&handle, Some(&req.session_id));
        Ok(handle)
    }

    pub async fn get_job_status(
        &self,
        ctx: &mut SessionContext,
        job_id: &str,
    ) -> HpxResult<JobSnapshot> {
        require("job_id", job_id)?;
        let snapshot = self.fetch_job(job_id, ctx.in_full_run(job_id)).await?;
        ctx.record_job_snapshot(&snapshot);
        Ok(snapshot)
    }

    /// One page of progress messages. The cursor is kept in the context;
    /// once the final page after a terminal status has been handed out,
    /// further calls without `since_seq` return an empty page locally.
    pub async fn get_job_messages(
        &self,
        ctx: &mut SessionContext,
        req: GetJobMessagesRequest,
    ) -> HpxResult<MessagesPage> {
        require("job_id", &req.job_id)?;
        let (cursor, drained) = ctx.messages_cursor(&req.job_id);
        if req.since_seq.is_none() && drained {
            return Ok(MessagesPage::empty(&req.job_id, cursor));
        }

        let page = self
            .fetch_messages(&req.job_id, req.since_seq.or(cursor))
            .await?;
        ctx.record_messages(&page);
        Ok(page)
    }

    /// Status read without touching any context.
    pub async fn fetch_job(&self, job_id: &str, full_run: bool) -> HpxResult<JobSnapshot> {
        let data = self.client.get(&format!("/jobs/{}", job_id), &[]).await?;
        JobSnapshot::from_remote(job_id, data, full_run)
    }

    /// Message page read without touching any context.
    pub async fn fetch_messages(
        &self,
        job_id: &str,
        since_seq: Option<i64>,
    ) -> HpxResult<MessagesPage> {
        let query: Vec<(&str, String)> = since_seq
            .map(|seq| vec![("since_seq", seq.to_string())])
            .unwrap_or_default();
        let data = self
            .client
            .get(&format!("/jobs/{}/messages", job_id), &query)
            .await?;
        MessagesPage::from_remote(job_id, data)
    }
}

/// Read the job id and initial status of a job-creating response.
pub(super) fn job_handle(data: Value, full_run: bool) -> HpxResult<JobHandle> {
    let raw = match data {
        Value::Object(map) => map,
        _ => Default::default(),
    };
    let job_id = raw
        .get("job_id")
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .ok_or_else(|| HpxError::Decode("job response has no job_id".into()))?;
    let fallback = if full_run {
        JobStatus::Running
    } else {
        JobStatus::PreviewPending
    };
    let status = raw
        .get("status")
        .and_then(|v| v.as_str())
        .and_then(|s| JobStatus::from_remote(s, None, full_run))
        .unwrap_or(fallback);
    Ok(JobHandle {
        job_id,
        status,
        raw,
    })
}
