use serde_json::{json, Map, Value};

use super::jobs::job_handle;
use super::requests::{ReferenceCheckRequest, UpdateTableRequest, UploadFileRequest};
use super::{require, WorkflowAdapter};
use crate::error::{HpxError, HpxResult};
use crate::models::JobHandle;
use crate::session::SessionContext;

impl WorkflowAdapter {
    /// Re-validate a previously processed table without re-uploading it.
    pub async fn update_table(
        &self,
        ctx: &mut SessionContext,
        req: UpdateTableRequest,
    ) -> HpxResult<JobHandle> {
        require("source_job_id", &req.source_job_id)?;
        let mut payload = json!({ "source_job_id": req.source_job_id });
        if let Some(version) = req.source_version.filter(|v| !v.is_empty()) {
            payload["source_version"] = Value::String(version);
        }
        if let Some(s3_key) = req.s3_key.filter(|k| !k.is_empty()) {
            payload["s3_key"] = Value::String(s3_key);
        }

        let data = self.client.post("/jobs/update-table", &payload).await?;
        let handle = job_handle(data, true)?;
        tracing::info!(
            "[Job] Update of {} started as {}",
            req.source_job_id,
            handle.job_id
        );
        ctx.record_direct_job(&handle);
        Ok(handle)
    }

    /// Start a fact-check job from exactly one source.
    pub async fn reference_check(
        &self,
        ctx: &mut SessionContext,
        req: ReferenceCheckRequest,
    ) -> HpxResult<JobHandle> {
        let text = req.text.filter(|t| !t.trim().is_empty());
        let s3_key = req.s3_key.filter(|k| !k.trim().is_empty());
        let file_path = req.file_path.filter(|p| !p.trim().is_empty());

        let sources = [text.is_some(), s3_key.is_some(), file_path.is_some()]
            .iter()
            .filter(|present| **present)
            .count();
        if sources != 1 {
            return Err(HpxError::BadRequest(
                "provide exactly one of text, s3_key or file_path".into(),
            ));
        }

        let mut payload = Map::new();
        if let Some(text) = text {
            payload.insert("text".into(), Value::String(text));
        } else if let Some(s3_key) = s3_key {
            payload.insert("s3_key".into(), Value::String(s3_key));
        } else if let Some(file_path) = file_path {
            let receipt = self
                .upload_file(
                    ctx,
                    UploadFileRequest {
                        file_path,
                        file_type: None,
                        session_id: None,
                    },
                )
                .await?;
            payload.insert("s3_key".into(), Value::String(receipt.s3_key));
        }

        let data = self
            .client
            .post("/jobs/reference-check", &Value::Object(payload))
            .await?;
        let handle = job_handle(data, true)?;
        tracing::info!("[Job] Reference check started: {}", handle.job_id);
        ctx.record_direct_job(&handle);
        Ok(handle)
    }
}
