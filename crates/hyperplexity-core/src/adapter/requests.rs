//! Typed tool arguments.
//!
//! Shared by the MCP layer (as `Parameters<T>`, which derives the input
//! schema) and by [`super::dispatch`], which deserialises raw JSON arguments.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::FileType;

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct EmptyRequest {}

// ─── Conversations ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct StartTableMakerRequest {
    /// Natural-language description of the table to research and build.
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct GetConversationRequest {
    pub conversation_id: String,
    /// Defaults to the session this conversation was started in.
    #[serde(default)]
    pub session_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SendConversationReplyRequest {
    pub conversation_id: String,
    #[serde(default)]
    pub session_id: Option<String>,
    /// Answer to the AI's latest question.
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct RefineConfigRequest {
    /// What to change, e.g. "Add a LinkedIn URL column; make email checks stricter".
    pub instructions: String,
    /// Defaults to the conversation recorded for `session_id`.
    #[serde(default)]
    pub conversation_id: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
    /// Config to refine, when not the one the conversation produced.
    #[serde(default)]
    pub config_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct WaitForConversationRequest {
    pub conversation_id: String,
    #[serde(default)]
    pub session_id: Option<String>,
    /// Typical AI response time for this turn; shapes the progress curve. Default 120.
    #[serde(default)]
    pub expected_seconds: Option<u64>,
    /// Maximum wall time before returning the last state. Default 600.
    #[serde(default)]
    pub timeout_seconds: Option<u64>,
    /// Seconds between polls. Default 15.
    #[serde(default)]
    pub poll_interval: Option<u64>,
}

// ─── Uploads ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct UploadFileRequest {
    /// Local path of the excel, csv or pdf file.
    pub file_path: String,
    /// Inferred from the file extension when omitted.
    #[serde(default)]
    pub file_type: Option<FileType>,
    /// Attach the upload to an existing session.
    #[serde(default)]
    pub session_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ConfirmUploadRequest {
    pub session_id: String,
    pub s3_key: String,
    /// Defaults to the name recorded by `upload_file`.
    #[serde(default)]
    pub filename: Option<String>,
}

// ─── Jobs ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct CreateJobRequest {
    pub session_id: String,
    /// Reuse a known config (from `confirm_upload` or an earlier run).
    #[serde(default)]
    pub config_id: Option<String>,
    /// Inline config object, instead of `config_id`.
    #[serde(default)]
    pub config: Option<Value>,
    #[serde(default)]
    pub upload_id: Option<String>,
    #[serde(default)]
    pub s3_key: Option<String>,
    /// "poll" (default) or "webhook".
    #[serde(default)]
    pub notify_method: Option<String>,
    #[serde(default)]
    pub webhook_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct JobIdRequest {
    pub job_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct GetJobMessagesRequest {
    pub job_id: String,
    /// Only messages after this sequence number. Defaults to the last page read.
    #[serde(default)]
    pub since_seq: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct WaitForJobRequest {
    pub job_id: String,
    /// Maximum wall time before returning the last state. Default 600.
    #[serde(default)]
    pub timeout_seconds: Option<u64>,
    /// Seconds between poll cycles. Default 15.
    #[serde(default)]
    pub poll_interval: Option<u64>,
}

// ─── Validation ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ApproveValidationRequest {
    pub job_id: String,
    /// Must equal `cost_usd` reported at preview_complete.
    #[serde(default, alias = "cost_usd")]
    pub approved_cost_usd: Option<f64>,
}

// ─── Job actions ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct UpdateTableRequest {
    /// Job whose table is re-validated.
    #[serde(alias = "job_id")]
    pub source_job_id: String,
    /// Pin a prior result version; latest when omitted.
    #[serde(default)]
    pub source_version: Option<String>,
    /// A corrected file uploaded with `upload_file`.
    #[serde(default)]
    pub s3_key: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct ReferenceCheckRequest {
    /// Inline text to fact-check.
    #[serde(default)]
    pub text: Option<String>,
    /// An already-uploaded document.
    #[serde(default)]
    pub s3_key: Option<String>,
    /// A local document, uploaded before the check starts.
    #[serde(default)]
    pub file_path: Option<String>,
}

// ─── Account ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct GetUsageRequest {
    /// YYYY-MM-DD
    #[serde(default)]
    pub start_date: Option<String>,
    /// YYYY-MM-DD
    #[serde(default)]
    pub end_date: Option<String>,
    #[serde(default)]
    pub limit: Option<u32>,
    #[serde(default)]
    pub offset: Option<u32>,
}
