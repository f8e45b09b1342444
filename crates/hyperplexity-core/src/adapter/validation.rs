use serde_json::{json, Value};

use super::requests::ApproveValidationRequest;
use super::{body_of, require, set_default, Body, WorkflowAdapter};
use crate::client::METADATA_FETCH_TIMEOUT;
use crate::error::{HpxError, HpxResult};
use crate::models::{JobStatus, ResultsBundle, TableMetadata};
use crate::session::SessionContext;

/// Embedded metadata larger than this gets a size warning.
pub const METADATA_WARN_CHARS: usize = 50_000;

impl WorkflowAdapter {
    /// The only credit-consuming call. Guards run in order: local double
    /// approval, fresh status and quote check, then the remote approval.
    pub async fn approve_validation(
        &self,
        ctx: &mut SessionContext,
        req: ApproveValidationRequest,
    ) -> HpxResult<Body> {
        require("job_id", &req.job_id)?;
        let quoted = req.approved_cost_usd.ok_or_else(|| {
            HpxError::BadRequest(
                "approved_cost_usd is required: read cost_usd from get_job_status at \
                 preview_complete and pass that exact value"
                    .into(),
            )
        })?;
        ctx.check_not_approved(&req.job_id)?;

        let snapshot = self.fetch_job(&req.job_id, false).await?;
        ctx.record_job_snapshot(&snapshot);
        ctx.check_approval(&snapshot, quoted)?;

        let data = self
            .client
            .post(
                &format!("/jobs/{}/validate", req.job_id),
                &json!({ "approved_cost_usd": quoted }),
            )
            .await
            .map_err(|e| match e {
                HpxError::StaleQuote { current, message, .. } => HpxError::StaleQuote {
                    job_id: req.job_id.clone(),
                    quoted,
                    current,
                    message,
                },
                other => other,
            })?;

        let mut body = body_of(data);
        let status = body
            .get("status")
            .and_then(|v| v.as_str())
            .and_then(|s| JobStatus::from_remote(s, None, true))
            .unwrap_or(JobStatus::Running);
        ctx.record_approval(&req.job_id, quoted, status);
        tracing::info!(
            "[Validation] Job {} approved at ${:.2}",
            req.job_id,
            quoted
        );

        set_default(&mut body, "job_id", &req.job_id);
        if let Some(remote) = body.get("status").and_then(|v| v.as_str()) {
            if remote != status.as_str() {
                body.insert("remote_status".into(), Value::String(remote.to_string()));
            }
        }
        body.insert("status".into(), Value::String(status.as_str().into()));
        body.insert("approved_cost_usd".into(), Value::from(quoted));
        Ok(body)
    }

    pub async fn get_results(
        &self,
        ctx: &mut SessionContext,
        job_id: &str,
    ) -> HpxResult<ResultsBundle> {
        self.require_completed(ctx, "get_results", job_id).await?;

        let data = self
            .client
            .get(&format!("/jobs/{}/results", job_id), &[])
            .await
            .map_err(|e| not_found_as_state("get_results", job_id, e))?;
        let mut raw = body_of(data);

        let metadata_url = raw
            .get("results")
            .and_then(|r| r.get("metadata_url"))
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
            .map(str::to_string);

        let mut metadata = None;
        if let Some(url) = metadata_url {
            let results = raw
                .entry("results")
                .or_insert_with(|| Value::Object(Default::default()));
            match self.client.fetch_json(&url, METADATA_FETCH_TIMEOUT).await {
                Ok(meta) => {
                    let size = meta.to_string().len();
                    metadata = serde_json::from_value::<TableMetadata>(meta.clone()).ok();
                    results["metadata"] = meta;
                    if size > METADATA_WARN_CHARS {
                        results["metadata_size_warning"] = Value::String(format!(
                            "metadata is large ({} chars); extract columns[].name and \
                             rows[].cells[].display_value instead of reading it whole",
                            size
                        ));
                    }
                }
                Err(e) => {
                    tracing::warn!("[Validation] Metadata fetch for {} failed: {}", job_id, e);
                    results["metadata_fetch_error"] = Value::String(e.to_string());
                }
            }
        }

        Ok(ResultsBundle {
            job_id: job_id.to_string(),
            metadata,
            raw,
        })
    }

    pub async fn get_reference_results(
        &self,
        ctx: &mut SessionContext,
        job_id: &str,
    ) -> HpxResult<Body> {
        self.require_completed(ctx, "get_reference_results", job_id)
            .await?;
        let data = self
            .client
            .get(&format!("/jobs/{}/reference-results", job_id), &[])
            .await
            .map_err(|e| not_found_as_state("get_reference_results", job_id, e))?;
        let mut body = body_of(data);
        set_default(&mut body, "job_id", job_id);
        Ok(body)
    }

    async fn require_completed(
        &self,
        ctx: &mut SessionContext,
        operation: &str,
        job_id: &str,
    ) -> HpxResult<()> {
        require("job_id", job_id)?;
        let snapshot = self.fetch_job(job_id, ctx.in_full_run(job_id)).await?;
        ctx.record_job_snapshot(&snapshot);
        ctx.check_completed(operation, &snapshot)
    }
}

fn not_found_as_state(operation: &str, job_id: &str, err: HpxError) -> HpxError {
    match err {
        HpxError::Remote { status: 404, message, .. } => HpxError::invalid_state(
            operation,
            format!("no results are available for job {}: {}", job_id, message),
        ),
        other => other,
    }
}
