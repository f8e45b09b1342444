//! Tool names exposed by the adapter.
//!
//! | Group          | Tool                      | Remote endpoint                              |
//! |----------------|---------------------------|----------------------------------------------|
//! | conversations  | `start_table_maker`       | `POST /conversations/table-maker`            |
//! | conversations  | `get_conversation`        | `GET  /conversations/{id}`                   |
//! | conversations  | `send_conversation_reply` | `POST /conversations/{id}/message`           |
//! | conversations  | `refine_config`           | `POST /conversations/{id}/refine-config`     |
//! | conversations  | `wait_for_conversation`   | polls `get_conversation`                     |
//! | uploads        | `upload_file`             | `POST /uploads/presigned` + presigned `PUT`  |
//! | uploads        | `confirm_upload`          | `POST /uploads/confirm`                      |
//! | jobs           | `create_job`              | `POST /jobs`                                 |
//! | jobs           | `get_job_status`          | `GET  /jobs/{id}`                            |
//! | jobs           | `get_job_messages`        | `GET  /jobs/{id}/messages`                   |
//! | jobs           | `wait_for_job`            | polls messages + status                      |
//! | validation     | `approve_validation`      | `POST /jobs/{id}/validate`                   |
//! | validation     | `get_results`             | `GET  /jobs/{id}/results`                    |
//! | validation     | `get_reference_results`   | `GET  /jobs/{id}/reference-results`          |
//! | job actions    | `update_table`            | `POST /jobs/update-table`                    |
//! | job actions    | `reference_check`         | `POST /jobs/reference-check`                 |
//! | account        | `get_balance`             | `GET  /account/balance`                      |
//! | account        | `get_usage`               | `GET  /account/usage`                        |

use std::str::FromStr;

use crate::error::HpxError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolName {
    StartTableMaker,
    GetConversation,
    SendConversationReply,
    RefineConfig,
    WaitForConversation,
    UploadFile,
    ConfirmUpload,
    CreateJob,
    GetJobStatus,
    GetJobMessages,
    WaitForJob,
    ApproveValidation,
    GetResults,
    GetReferenceResults,
    UpdateTable,
    ReferenceCheck,
    GetBalance,
    GetUsage,
}

impl ToolName {
    pub const ALL: [ToolName; 18] = [
        ToolName::StartTableMaker,
        ToolName::GetConversation,
        ToolName::SendConversationReply,
        ToolName::RefineConfig,
        ToolName::WaitForConversation,
        ToolName::UploadFile,
        ToolName::ConfirmUpload,
        ToolName::CreateJob,
        ToolName::GetJobStatus,
        ToolName::GetJobMessages,
        ToolName::WaitForJob,
        ToolName::ApproveValidation,
        ToolName::GetResults,
        ToolName::GetReferenceResults,
        ToolName::UpdateTable,
        ToolName::ReferenceCheck,
        ToolName::GetBalance,
        ToolName::GetUsage,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ToolName::StartTableMaker => "start_table_maker",
            ToolName::GetConversation => "get_conversation",
            ToolName::SendConversationReply => "send_conversation_reply",
            ToolName::RefineConfig => "refine_config",
            ToolName::WaitForConversation => "wait_for_conversation",
            ToolName::UploadFile => "upload_file",
            ToolName::ConfirmUpload => "confirm_upload",
            ToolName::CreateJob => "create_job",
            ToolName::GetJobStatus => "get_job_status",
            ToolName::GetJobMessages => "get_job_messages",
            ToolName::WaitForJob => "wait_for_job",
            ToolName::ApproveValidation => "approve_validation",
            ToolName::GetResults => "get_results",
            ToolName::GetReferenceResults => "get_reference_results",
            ToolName::UpdateTable => "update_table",
            ToolName::ReferenceCheck => "reference_check",
            ToolName::GetBalance => "get_balance",
            ToolName::GetUsage => "get_usage",
        }
    }

    /// One-line description, shared by the MCP tool list and the CLI.
    pub fn description(&self) -> &'static str {
        match self {
            ToolName::StartTableMaker => "Start a Table Maker conversation that researches and builds a table from a natural-language description.",
            ToolName::GetConversation => "Poll a conversation: awaiting_reply -> send_conversation_reply, building -> poll again, complete -> a preview job was queued.",
            ToolName::SendConversationReply => "Answer the AI's question in an upload interview or table-maker conversation.",
            ToolName::RefineConfig => "Refine the validation config of a session with natural-language instructions.",
            ToolName::WaitForConversation => "Block until a conversation needs a reply or completes, reporting synthetic progress.",
            ToolName::UploadFile => "Upload a local excel/csv/pdf file (presigned PUT) and return session_id + s3_key for confirm_upload.",
            ToolName::ConfirmUpload => "Confirm an upload. Match score >= 0.85 returns a reusable config_id; otherwise an interview conversation_id.",
            ToolName::CreateJob => "Create a preview job with a known config. Not for interview/table-maker sessions, whose preview is queued automatically.",
            ToolName::GetJobStatus => "One-shot job status: preview_pending, preview_complete (with cost_usd), running, completed or failed.",
            ToolName::GetJobMessages => "Fetch progress messages for a job; pass since_seq to receive only new ones.",
            ToolName::WaitForJob => "Block until a job reaches preview_complete, completed or failed, tracking multi-phase progress.",
            ToolName::ApproveValidation => "Approve a preview and start the paid full run. approved_cost_usd must equal the current estimate. Charged once.",
            ToolName::GetResults => "Fetch results of a completed job, embedding per-cell metadata (confidence, explanations, sources).",
            ToolName::GetReferenceResults => "Fetch the fact-check report of a completed reference-check job.",
            ToolName::UpdateTable => "Re-validate a previously processed table without re-uploading it; returns a new job_id.",
            ToolName::ReferenceCheck => "Start a fact-check job for inline text, an uploaded s3_key or a local file.",
            ToolName::GetBalance => "Return the account credit balance in USD.",
            ToolName::GetUsage => "Return API usage history. Dates are YYYY-MM-DD.",
        }
    }
}

impl std::fmt::Display for ToolName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ToolName {
    type Err = HpxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ToolName::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| HpxError::BadRequest(format!("Unknown tool: {}", s)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_known_tool() {
        let tool: ToolName = "approve_validation".parse().unwrap();
        assert_eq!(tool, ToolName::ApproveValidation);
    }

    #[test]
    fn test_unknown_tool() {
        let err = "delete_everything".parse::<ToolName>().unwrap_err();
        assert!(err.to_string().contains("Unknown tool"));
    }
}
