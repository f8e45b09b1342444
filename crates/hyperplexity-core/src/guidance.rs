//! `_guidance` block attached to every tool response.
//!
//! Each block states where the caller is in the workflow and lists the literal
//! next call(s). It is advisory: builders read whatever fields are present and
//! never fail, and nothing in the adapter depends on their output.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::{json, Map, Value};

use crate::catalog::ToolName;
use crate::error::{ErrorClass, HpxError};
use crate::models::CONFIG_REUSE_THRESHOLD;

const POLL_NOTE: &str = "Poll every 15-20 seconds.";

#[derive(Debug, Clone, Serialize)]
pub struct NextStep {
    pub tool: &'static str,
    pub params: Value,
    pub note: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Guidance {
    pub summary: String,
    pub next_steps: Vec<NextStep>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub key_urls: BTreeMap<String, String>,
}

impl Guidance {
    fn new(summary: impl Into<String>) -> Self {
        Self {
            summary: summary.into(),
            ..Default::default()
        }
    }

    fn step(mut self, tool: ToolName, params: Value, note: impl Into<String>) -> Self {
        self.next_steps.push(NextStep {
            tool: tool.as_str(),
            params,
            note: note.into(),
        });
        self
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or_else(|_| json!({ "summary": self.summary }))
    }
}

/// Insert `_guidance` into a rendered body.
pub fn attach(body: &mut Map<String, Value>, guidance: &Guidance) {
    body.insert("_guidance".into(), guidance.to_value());
}

fn s<'a>(body: &'a Map<String, Value>, key: &str) -> &'a str {
    body.get(key).and_then(|v| v.as_str()).unwrap_or("")
}

fn money(value: Option<&Value>) -> String {
    match value.and_then(|v| v.as_f64()) {
        Some(v) => format!("{:.2}", v),
        None => value.map(|v| v.to_string()).unwrap_or_else(|| "?".into()),
    }
}

/// Guidance for a successful response of `tool`.
pub fn build(tool: ToolName, body: &Map<String, Value>) -> Guidance {
    match tool {
        ToolName::UploadFile => upload_file(body),
        ToolName::ConfirmUpload => confirm_upload(body),
        ToolName::CreateJob => created_job(body, "Preview job created"),
        ToolName::GetJobStatus | ToolName::WaitForJob => job_status(body),
        ToolName::GetJobMessages => job_messages(body),
        ToolName::ApproveValidation => approve_validation(body),
        ToolName::GetResults => get_results(body),
        ToolName::GetReferenceResults => {
            Guidance::new("Reference results fetched. Workflow complete.")
        }
        ToolName::UpdateTable => created_job(body, "Update-table job started"),
        ToolName::ReferenceCheck => reference_check(body),
        ToolName::StartTableMaker => start_table_maker(body),
        ToolName::GetConversation | ToolName::WaitForConversation => conversation(body),
        ToolName::SendConversationReply => poll_conversation(
            body,
            "Reply sent. Poll the conversation for the AI's next message.",
        ),
        ToolName::RefineConfig => refine_config(body),
        ToolName::GetBalance => {
            let balance = body.get("balance_usd").or_else(|| body.get("balance"));
            Guidance::new(format!("Account balance: ${}.", money(balance)))
        }
        ToolName::GetUsage => {
            let total = body.get("total_cost_usd").or_else(|| body.get("total"));
            Guidance::new(format!("Usage data fetched. Total cost in range: ${}.", money(total)))
        }
    }
}

/// Guidance for a failed call. `ids` holds the identifiers of the request.
pub fn for_error(tool: ToolName, err: &HpxError, ids: &Map<String, Value>) -> Guidance {
    let job_id = s(ids, "job_id");
    match err.class() {
        ErrorClass::Transient => Guidance::new(format!(
            "{} failed with a transient error. Retry the same call after a short delay.",
            tool
        ))
        .step(tool, Value::Object(ids.clone()), "Retry with the same parameters."),
        ErrorClass::StaleQuote => Guidance::new(
            "Approval rejected: the quoted cost does not match the current estimate. \
             Nothing was charged. Re-read the estimate and approve with that exact value.",
        )
        .step(
            ToolName::GetJobStatus,
            json!({ "job_id": job_id }),
            "Read cost_usd, then call approve_validation with approved_cost_usd set to it.",
        ),
        ErrorClass::InvalidState => invalid_state(tool, ids),
        ErrorClass::Auth => Guidance::new(
            "Authentication failed. Check HYPERPLEXITY_API_KEY (hyperplexity.ai/account); \
             retrying without a credential fix will not help.",
        ),
        ErrorClass::Config => Guidance::new(
            "The server is not configured. Set HYPERPLEXITY_API_KEY and restart the MCP server.",
        ),
        ErrorClass::ClientError => Guidance::new(format!(
            "{} was rejected. Fix the arguments before calling it again.",
            tool
        )),
    }
}

fn invalid_state(tool: ToolName, ids: &Map<String, Value>) -> Guidance {
    let job_id = s(ids, "job_id");
    match tool {
        ToolName::ApproveValidation => Guidance::new(
            "Approval rejected: the job is not awaiting approval (not yet preview_complete, \
             or already approved). Nothing was charged.",
        )
        .step(
            ToolName::GetJobStatus,
            json!({ "job_id": job_id }),
            "Check the current state before approving.",
        ),
        ToolName::GetResults | ToolName::GetReferenceResults => Guidance::new(
            "Results are not available yet: the job has not completed.",
        )
        .step(
            ToolName::WaitForJob,
            json!({ "job_id": job_id }),
            "Wait for completion, then fetch results.",
        ),
        ToolName::CreateJob => {
            let session_id = s(ids, "session_id");
            Guidance::new(
                "Do not call create_job for this session: interview and table-maker sessions \
                 queue their preview automatically.",
            )
            .step(
                ToolName::WaitForJob,
                json!({ "job_id": session_id }),
                "Track the auto-queued preview until preview_complete.",
            )
        }
        ToolName::SendConversationReply => Guidance::new(
            "The conversation is already complete; a preview has been queued.",
        )
        .step(
            ToolName::GetConversation,
            json!({
                "conversation_id": s(ids, "conversation_id"),
                "session_id": s(ids, "session_id"),
            }),
            "Read the final state and the queued job_id.",
        ),
        _ => Guidance::new(format!("{} is not legal in the current workflow state.", tool)),
    }
}

fn upload_file(body: &Map<String, Value>) -> Guidance {
    Guidance::new("File uploaded. Call confirm_upload to register it with the session.").step(
        ToolName::ConfirmUpload,
        json!({
            "session_id": s(body, "session_id"),
            "s3_key": s(body, "s3_key"),
            "filename": s(body, "filename"),
        }),
        "Confirm the upload so the backend indexes the file and detects prior configs.",
    )
}

fn confirm_upload(body: &Map<String, Value>) -> Guidance {
    let session_id = s(body, "session_id");
    let score = body.get("match_score").and_then(|v| v.as_f64()).unwrap_or(0.0);
    let config_id = s(body, "config_id");

    if !config_id.is_empty() && score >= CONFIG_REUSE_THRESHOLD {
        return Guidance::new(format!(
            "Upload confirmed. Prior config {} matches with score {:.2}; reuse it directly.",
            config_id, score
        ))
        .step(
            ToolName::CreateJob,
            json!({ "session_id": session_id, "config_id": config_id }),
            "Creates a preview job with the matched config. Fastest path.",
        );
    }

    let conversation_id = s(body, "conversation_id");
    Guidance::new(
        "Upload confirmed. No strong config match; an AI interview was started to build \
         a validation config.",
    )
    .step(
        ToolName::WaitForConversation,
        json!({ "conversation_id": conversation_id, "session_id": session_id }),
        "Wait for the AI's first question, then answer with send_conversation_reply.",
    )
}

fn created_job(body: &Map<String, Value>, what: &str) -> Guidance {
    let job_id = s(body, "job_id");
    Guidance::new(format!(
        "{} (status={}). Track it until preview_complete or completed.",
        what,
        s(body, "status")
    ))
    .step(
        ToolName::WaitForJob,
        json!({ "job_id": job_id }),
        "Preferred: blocks until the next actionable state.",
    )
    .step(ToolName::GetJobStatus, json!({ "job_id": job_id }), POLL_NOTE)
}

fn job_status(body: &Map<String, Value>) -> Guidance {
    let job_id = s(body, "job_id");
    match s(body, "status") {
        "preview_pending" | "running" | "awaiting_approval" => {
            let status = s(body, "status");
            Guidance::new(format!("Job is {}. Keep polling.", status))
                .step(ToolName::GetJobStatus, json!({ "job_id": job_id }), POLL_NOTE)
                .step(
                    ToolName::GetJobMessages,
                    json!({ "job_id": job_id }),
                    "Optional: live progress messages.",
                )
        }
        "preview_complete" => {
            let cost = body.get("cost_usd").cloned().unwrap_or(Value::Null);
            let config_id = s(body, "config_id");
            let session_id = s(body, "session_id");
            let conversation_id = body
                .get("refine_session_id")
                .or_else(|| body.get("conversation_id"))
                .and_then(|v| v.as_str())
                .unwrap_or("");

            let mut summary = format!("Preview complete. Estimated cost: ${}. ", money(Some(&cost)));
            if !config_id.is_empty() {
                summary.push_str(&format!("config_id for future reruns: {}. ", config_id));
            }
            summary.push_str("Review the preview, then approve to start full processing.");

            let mut guidance = Guidance::new(summary).step(
                ToolName::ApproveValidation,
                json!({ "job_id": job_id, "approved_cost_usd": cost }),
                "Credits are charged only here. The quote must equal cost_usd.",
            );
            if !conversation_id.is_empty() {
                guidance = guidance.step(
                    ToolName::RefineConfig,
                    json!({
                        "conversation_id": conversation_id,
                        "session_id": session_id,
                        "instructions": "<describe the changes you want>",
                    }),
                    "Optional: refine the config before approving.",
                );
            }
            guidance
        }
        "completed" => Guidance::new("Job completed. Fetch your results.")
            .step(
                ToolName::GetResults,
                json!({ "job_id": job_id }),
                "Download the enriched/validated output.",
            )
            .step(
                ToolName::GetReferenceResults,
                json!({ "job_id": job_id }),
                "For reference-check jobs: fetch the fact-check report.",
            ),
        "failed" => {
            let error = body
                .get("error")
                .or_else(|| body.get("message"))
                .and_then(|v| v.as_str())
                .unwrap_or("Unknown error");
            Guidance::new(format!("Job failed: {}. No further actions available.", error))
        }
        other => Guidance::new(format!("Job status is '{}'. Poll again.", other)).step(
            ToolName::GetJobStatus,
            json!({ "job_id": job_id }),
            POLL_NOTE,
        ),
    }
}

fn job_messages(body: &Map<String, Value>) -> Guidance {
    let job_id = s(body, "job_id");
    let count = body
        .get("messages")
        .and_then(|m| m.as_array())
        .map(|m| m.len())
        .unwrap_or(0);
    let mut params = json!({ "job_id": job_id });
    if let Some(seq) = body.get("last_seq") {
        params["since_seq"] = seq.clone();
    }
    Guidance::new(format!("Fetched {} message(s).", count))
        .step(ToolName::GetJobMessages, params, "Pass since_seq to get only new messages.")
        .step(ToolName::GetJobStatus, json!({ "job_id": job_id }), "Check overall job status.")
}

fn approve_validation(body: &Map<String, Value>) -> Guidance {
    let job_id = s(body, "job_id");
    Guidance::new(format!(
        "Validation approved and charged once. Job is now {}. Wait for completion.",
        s(body, "status")
    ))
    .step(
        ToolName::WaitForJob,
        json!({ "job_id": job_id }),
        "Blocks until completed or failed.",
    )
    .step(ToolName::GetJobStatus, json!({ "job_id": job_id }), POLL_NOTE)
}

fn get_results(body: &Map<String, Value>) -> Guidance {
    let results = body.get("results").and_then(|v| v.as_object());
    let field = |key: &str| {
        results
            .and_then(|r| r.get(key))
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string()
    };
    let viewer_url = field("interactive_viewer_url");
    let download_url = field("download_url");
    let metadata_url = field("metadata_url");
    let has_metadata = results.map(|r| r.contains_key("metadata")).unwrap_or(false);

    let summary_info = body.get("summary").and_then(|v| v.as_object());
    let stat = |key: &str| {
        summary_info
            .and_then(|m| m.get(key))
            .map(|v| v.to_string())
            .unwrap_or_else(|| "?".into())
    };

    let mut summary = format!(
        "Validation complete: {} rows, {} columns validated.",
        stat("rows_processed"),
        stat("columns_validated")
    );
    if !viewer_url.is_empty() {
        summary.push_str(&format!(
            " Share the interactive viewer with humans: {}",
            viewer_url
        ));
    }

    let mut guidance = Guidance::new(summary);
    guidance.notes = vec![
        if has_metadata {
            "results.metadata is table_metadata.json embedded inline: the machine-readable source of truth for every validated cell.".to_string()
        } else {
            "results.metadata_url points to table_metadata.json with per-cell validation details.".to_string()
        },
        "metadata.columns[] lists validated columns; metadata.rows[] has one entry per row_key with cells{}.".into(),
        "cells[Column].full_value is the validated value; confidence is HIGH, MEDIUM, LOW or ID.".into(),
        "cells[Column].comment carries validator_explanation, qc_reasoning, key_citation and sources[{title, url, snippet}].".into(),
        "results.download_url is the enriched Excel file with the same detail embedded.".into(),
    ];
    for (name, url) in [
        ("interactive_viewer", viewer_url),
        ("download_excel", download_url),
        ("metadata", metadata_url),
    ] {
        if !url.is_empty() {
            guidance.key_urls.insert(name.to_string(), url);
        }
    }

    let has_reference = body
        .get("job_info")
        .and_then(|j| j.get("has_reference_results"))
        .and_then(|v| v.as_bool())
        .unwrap_or(false);
    if has_reference {
        guidance = guidance.step(
            ToolName::GetReferenceResults,
            json!({ "job_id": s(body, "job_id") }),
            "Fetch the reference-check sub-results.",
        );
    }
    guidance
}

fn reference_check(body: &Map<String, Value>) -> Guidance {
    let job_id = s(body, "job_id");
    Guidance::new("Reference-check job started.")
        .step(
            ToolName::WaitForJob,
            json!({ "job_id": job_id }),
            "Wait until completed, then call get_reference_results.",
        )
        .step(ToolName::GetJobStatus, json!({ "job_id": job_id }), POLL_NOTE)
}

fn start_table_maker(body: &Map<String, Value>) -> Guidance {
    poll_conversation(
        body,
        "Table-maker conversation started. Its preview is queued automatically when the \
         conversation completes; do not call create_job.",
    )
}

fn refine_config(body: &Map<String, Value>) -> Guidance {
    let mut summary = "Config refinement submitted.".to_string();
    if let Some(config_id) = body.get("config_id").and_then(|v| v.as_str()) {
        summary.push_str(&format!(" Updated config_id: {}.", config_id));
    }
    summary.push_str(" Poll the conversation for the result.");
    poll_conversation(body, &summary)
}

fn poll_conversation(body: &Map<String, Value>, summary: &str) -> Guidance {
    if s(body, "status") == "complete" {
        return conversation(body);
    }
    Guidance::new(summary).step(
        ToolName::WaitForConversation,
        json!({
            "conversation_id": s(body, "conversation_id"),
            "session_id": s(body, "session_id"),
        }),
        "Blocks until the AI replies or the conversation completes.",
    )
}

fn conversation(body: &Map<String, Value>) -> Guidance {
    let conversation_id = s(body, "conversation_id");
    let session_id = s(body, "session_id");

    match s(body, "status") {
        "awaiting_reply" => {
            let question = body
                .get("messages")
                .and_then(|m| m.as_array())
                .and_then(|m| m.last())
                .or_else(|| body.get("last_ai_message"))
                .and_then(|m| m.get("content").or(Some(m)))
                .and_then(|c| c.as_str())
                .unwrap_or("");
            Guidance::new(format!("AI is waiting for your reply. Question: {}", question)).step(
                ToolName::SendConversationReply,
                json!({
                    "conversation_id": conversation_id,
                    "session_id": session_id,
                    "message": "<your answer here>",
                }),
                "Answer the AI's question to continue.",
            )
        }
        "complete" => {
            let job_id = match s(body, "job_id") {
                "" => session_id,
                id => id,
            };
            Guidance::new(
                "Conversation complete. A preview job was queued automatically; \
                 do not call create_job.",
            )
            .step(
                ToolName::WaitForJob,
                json!({ "job_id": job_id }),
                "Track the preview until preview_complete.",
            )
        }
        _ => Guidance::new("Conversation is still processing.").step(
            ToolName::GetConversation,
            json!({ "conversation_id": conversation_id, "session_id": session_id }),
            POLL_NOTE,
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_confirm_upload_with_strong_match_suggests_create_job() {
        let g = build(
            ToolName::ConfirmUpload,
            &body(json!({ "session_id": "s1", "config_id": "cfg_1", "match_score": 0.91 })),
        );
        assert_eq!(g.next_steps[0].tool, "create_job");
        assert_eq!(g.next_steps[0].params["config_id"], "cfg_1");
    }

    #[test]
    fn test_confirm_upload_without_match_points_to_interview() {
        let g = build(
            ToolName::ConfirmUpload,
            &body(json!({ "session_id": "s1", "conversation_id": "conv_1" })),
        );
        assert_eq!(g.next_steps[0].tool, "wait_for_conversation");
        assert_eq!(g.next_steps[0].params["conversation_id"], "conv_1");
        assert!(g.next_steps.iter().all(|s| s.tool != "create_job"));
    }

    #[test]
    fn test_preview_complete_quotes_literal_cost() {
        let g = build(
            ToolName::GetJobStatus,
            &body(json!({ "job_id": "job_1", "status": "preview_complete", "cost_usd": 2.5 })),
        );
        assert!(g.summary.contains("$2.50"));
        assert_eq!(g.next_steps[0].tool, "approve_validation");
        assert_eq!(g.next_steps[0].params["approved_cost_usd"], 2.5);
    }

    #[test]
    fn test_failed_job_has_no_next_steps() {
        let g = build(
            ToolName::GetJobStatus,
            &body(json!({ "job_id": "job_1", "status": "failed", "error": "boom" })),
        );
        assert!(g.next_steps.is_empty());
        assert!(g.summary.contains("boom"));
    }

    #[test]
    fn test_complete_conversation_points_to_auto_job() {
        let g = build(
            ToolName::GetConversation,
            &body(json!({ "conversation_id": "c", "session_id": "s9", "status": "complete" })),
        );
        assert_eq!(g.next_steps[0].tool, "wait_for_job");
        assert_eq!(g.next_steps[0].params["job_id"], "s9");
    }

    #[test]
    fn test_results_collect_key_urls() {
        let g = build(
            ToolName::GetResults,
            &body(json!({
                "job_id": "job_1",
                "results": {
                    "download_url": "https://x/dl.xlsx",
                    "interactive_viewer_url": "https://x/view",
                    "metadata": {}
                },
                "summary": { "rows_processed": 3, "columns_validated": 4 }
            })),
        );
        assert_eq!(g.key_urls["download_excel"], "https://x/dl.xlsx");
        assert!(g.summary.contains("3 rows"));
        assert!(g.notes[0].contains("embedded inline"));
    }

    #[test]
    fn test_stale_quote_error_guidance() {
        let err = HpxError::StaleQuote {
            job_id: "job_1".into(),
            quoted: 1.0,
            current: Some(2.5),
            message: "changed".into(),
        };
        let ids = body(json!({ "job_id": "job_1" }));
        let g = for_error(ToolName::ApproveValidation, &err, &ids);
        assert_eq!(g.next_steps[0].tool, "get_job_status");
        assert!(g.summary.contains("Nothing was charged"));
    }

    #[test]
    fn test_transient_error_suggests_retry_of_same_tool() {
        let err = HpxError::Transient {
            status: Some(503),
            message: "down".into(),
        };
        let ids = body(json!({ "job_id": "job_1" }));
        let g = for_error(ToolName::GetJobStatus, &err, &ids);
        assert_eq!(g.next_steps[0].tool, "get_job_status");
        assert_eq!(g.next_steps[0].params["job_id"], "job_1");
    }
}
