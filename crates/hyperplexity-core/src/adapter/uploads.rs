use std::path::Path;

use serde_json::{json, Value};

use super::requests::{ConfirmUploadRequest, UploadFileRequest};
use super::{require, WorkflowAdapter};
use crate::error::{HpxError, HpxResult};
use crate::models::{parse_config_matches, ConfirmOutcome, FileType, UploadReceipt};
use crate::session::SessionContext;

impl WorkflowAdapter {
    /// Presign, then PUT the file bytes to object storage.
    pub async fn upload_file(
        &self,
        ctx: &mut SessionContext,
        req: UploadFileRequest,
    ) -> HpxResult<UploadReceipt> {
        require("file_path", &req.file_path)?;
        let path = Path::new(&req.file_path);
        let file_type = match req.file_type {
            Some(file_type) => file_type,
            None => FileType::from_path(path)?,
        };
        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::to_string)
            .ok_or_else(|| HpxError::BadRequest(format!("Not a file path: {}", req.file_path)))?;

        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|e| HpxError::Io(format!("File not found: {} ({})", req.file_path, e)))?;
        if !metadata.is_file() {
            return Err(HpxError::Io(format!("Not a regular file: {}", req.file_path)));
        }
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| HpxError::Io(format!("Failed to read {}: {}", req.file_path, e)))?;

        let mut payload = json!({
            "filename": filename,
            "file_size": bytes.len(),
            "file_type": file_type.as_str(),
            "content_type": file_type.content_type(),
        });
        if let Some(session_id) = req.session_id.as_deref().filter(|s| !s.is_empty()) {
            payload["session_id"] = Value::String(session_id.to_string());
        }

        let presign = self.client.post("/uploads/presigned", &payload).await?;
        let field = |key: &str| {
            presign
                .get(key)
                .and_then(|v| v.as_str())
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };
        let upload_url = field("presigned_url")
            .or_else(|| field("upload_url"))
            .ok_or_else(|| HpxError::Decode("presign response has no upload URL".into()))?;
        let s3_key = field("s3_key")
            .ok_or_else(|| HpxError::Decode("presign response has no s3_key".into()))?;
        let session_id = field("session_id")
            .or(req.session_id)
            .ok_or_else(|| HpxError::Decode("presign response has no session_id".into()))?;
        let upload_id = field("upload_id").unwrap_or_default();

        let size = bytes.len();
        self.client
            .put_raw(&upload_url, bytes, file_type.content_type())
            .await?;
        tracing::info!(
            "[Upload] {} ({} bytes) uploaded to session {}",
            filename,
            size,
            session_id
        );

        let receipt = UploadReceipt {
            session_id,
            upload_id,
            s3_key,
            filename,
            file_type,
            bytes_uploaded: size,
        };
        ctx.record_upload(&receipt);
        Ok(receipt)
    }

    /// Confirm an upload and resolve it to either a reusable config or an
    /// interview conversation, never both.
    pub async fn confirm_upload(
        &self,
        ctx: &mut SessionContext,
        req: ConfirmUploadRequest,
    ) -> HpxResult<ConfirmOutcome> {
        require("session_id", &req.session_id)?;
        require("s3_key", &req.s3_key)?;
        let filename = req
            .filename
            .filter(|f| !f.trim().is_empty())
            .or_else(|| {
                ctx.session(&req.session_id)
                    .filter(|s| s.s3_key.as_deref() == Some(req.s3_key.as_str()))
                    .and_then(|s| s.filename.clone())
            })
            .unwrap_or_else(|| {
                req.s3_key
                    .rsplit('/')
                    .next()
                    .unwrap_or(req.s3_key.as_str())
                    .to_string()
            });

        let data = self
            .client
            .post(
                "/uploads/confirm",
                &json!({
                    "session_id": req.session_id,
                    "s3_key": req.s3_key,
                    "filename": filename,
                }),
            )
            .await?;
        let raw = match data {
            Value::Object(map) => map,
            _ => Default::default(),
        };

        let matched = parse_config_matches(&raw)
            .into_iter()
            .next()
            .filter(|m| m.is_reusable());

        let conversation_id = match &matched {
            Some(m) => {
                tracing::info!(
                    "[Upload] Session {} matches config {} ({:.2})",
                    req.session_id,
                    m.config_id,
                    m.match_score
                );
                None
            }
            None => match raw
                .get("conversation_id")
                .and_then(|v| v.as_str())
                .filter(|s| !s.is_empty())
            {
                Some(id) => Some(id.to_string()),
                None => Some(self.start_upload_interview(ctx, &req.session_id).await?),
            },
        };

        let outcome = ConfirmOutcome {
            session_id: req.session_id,
            matched,
            conversation_id,
            raw,
        };
        ctx.record_confirm(&outcome);
        Ok(outcome)
    }
}
