//! Tool dispatch: typed calls in, rendered JSON bodies (with `_guidance`) out.
//!
//! Both the MCP server and the CLI go through [`run`], so every surface
//! renders successes and failures identically.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Map, Value};
use tokio::sync::Mutex;

use super::requests::*;
use super::{Body, WorkflowAdapter};
use crate::catalog::ToolName;
use crate::error::{HpxError, HpxResult};
use crate::guidance::{self, Guidance};
use crate::poll::{self, ProgressSink, WaitOptions};
use crate::session::SessionContext;

/// Keys copied from the request into error payloads and their guidance.
const ID_KEYS: [&str; 4] = ["job_id", "session_id", "conversation_id", "source_job_id"];

#[derive(Debug, Clone)]
pub enum ToolCall {
    StartTableMaker(StartTableMakerRequest),
    GetConversation(GetConversationRequest),
    SendConversationReply(SendConversationReplyRequest),
    RefineConfig(RefineConfigRequest),
    WaitForConversation(WaitForConversationRequest),
    UploadFile(UploadFileRequest),
    ConfirmUpload(ConfirmUploadRequest),
    CreateJob(CreateJobRequest),
    GetJobStatus(JobIdRequest),
    GetJobMessages(GetJobMessagesRequest),
    WaitForJob(WaitForJobRequest),
    ApproveValidation(ApproveValidationRequest),
    GetResults(JobIdRequest),
    GetReferenceResults(JobIdRequest),
    UpdateTable(UpdateTableRequest),
    ReferenceCheck(ReferenceCheckRequest),
    GetBalance,
    GetUsage(GetUsageRequest),
}

fn parse_args<T: DeserializeOwned>(tool: ToolName, args: Value) -> HpxResult<T> {
    let args = match args {
        Value::Null => Value::Object(Map::new()),
        other => other,
    };
    serde_json::from_value(args)
        .map_err(|e| HpxError::BadRequest(format!("Invalid arguments for {}: {}", tool, e)))
}

impl ToolCall {
    /// Deserialise raw JSON arguments for `tool`.
    pub fn parse(tool: ToolName, args: Value) -> HpxResult<Self> {
        Ok(match tool {
            ToolName::StartTableMaker => ToolCall::StartTableMaker(parse_args(tool, args)?),
            ToolName::GetConversation => ToolCall::GetConversation(parse_args(tool, args)?),
            ToolName::SendConversationReply => {
                ToolCall::SendConversationReply(parse_args(tool, args)?)
            }
            ToolName::RefineConfig => ToolCall::RefineConfig(parse_args(tool, args)?),
            ToolName::WaitForConversation => {
                ToolCall::WaitForConversation(parse_args(tool, args)?)
            }
            ToolName::UploadFile => ToolCall::UploadFile(parse_args(tool, args)?),
            ToolName::ConfirmUpload => ToolCall::ConfirmUpload(parse_args(tool, args)?),
            ToolName::CreateJob => ToolCall::CreateJob(parse_args(tool, args)?),
            ToolName::GetJobStatus => ToolCall::GetJobStatus(parse_args(tool, args)?),
            ToolName::GetJobMessages => ToolCall::GetJobMessages(parse_args(tool, args)?),
            ToolName::WaitForJob => ToolCall::WaitForJob(parse_args(tool, args)?),
            ToolName::ApproveValidation => ToolCall::ApproveValidation(parse_args(tool, args)?),
            ToolName::GetResults => ToolCall::GetResults(parse_args(tool, args)?),
            ToolName::GetReferenceResults => {
                ToolCall::GetReferenceResults(parse_args(tool, args)?)
            }
            ToolName::UpdateTable => ToolCall::UpdateTable(parse_args(tool, args)?),
            ToolName::ReferenceCheck => ToolCall::ReferenceCheck(parse_args(tool, args)?),
            ToolName::GetBalance => {
                let _: EmptyRequest = parse_args(tool, args)?;
                ToolCall::GetBalance
            }
            ToolName::GetUsage => ToolCall::GetUsage(parse_args(tool, args)?),
        })
    }

    pub fn tool(&self) -> ToolName {
        match self {
            ToolCall::StartTableMaker(_) => ToolName::StartTableMaker,
            ToolCall::GetConversation(_) => ToolName::GetConversation,
            ToolCall::SendConversationReply(_) => ToolName::SendConversationReply,
            ToolCall::RefineConfig(_) => ToolName::RefineConfig,
            ToolCall::WaitForConversation(_) => ToolName::WaitForConversation,
            ToolCall::UploadFile(_) => ToolName::UploadFile,
            ToolCall::ConfirmUpload(_) => ToolName::ConfirmUpload,
            ToolCall::CreateJob(_) => ToolName::CreateJob,
            ToolCall::GetJobStatus(_) => ToolName::GetJobStatus,
            ToolCall::GetJobMessages(_) => ToolName::GetJobMessages,
            ToolCall::WaitForJob(_) => ToolName::WaitForJob,
            ToolCall::ApproveValidation(_) => ToolName::ApproveValidation,
            ToolCall::GetResults(_) => ToolName::GetResults,
            ToolCall::GetReferenceResults(_) => ToolName::GetReferenceResults,
            ToolCall::UpdateTable(_) => ToolName::UpdateTable,
            ToolCall::ReferenceCheck(_) => ToolName::ReferenceCheck,
            ToolCall::GetBalance => ToolName::GetBalance,
            ToolCall::GetUsage(_) => ToolName::GetUsage,
        }
    }

    /// Identifiers named in the request.
    fn ids(&self) -> Map<String, Value> {
        fn pick<T: Serialize>(req: &T) -> Map<String, Value> {
            match serde_json::to_value(req) {
                Ok(Value::Object(map)) => map
                    .into_iter()
                    .filter(|(k, v)| ID_KEYS.contains(&k.as_str()) && v.is_string())
                    .collect(),
                _ => Map::new(),
            }
        }
        match self {
            ToolCall::StartTableMaker(r) => pick(r),
            ToolCall::GetConversation(r) => pick(r),
            ToolCall::SendConversationReply(r) => pick(r),
            ToolCall::RefineConfig(r) => pick(r),
            ToolCall::WaitForConversation(r) => pick(r),
            ToolCall::UploadFile(r) => pick(r),
            ToolCall::ConfirmUpload(r) => pick(r),
            ToolCall::CreateJob(r) => pick(r),
            ToolCall::GetJobStatus(r) | ToolCall::GetResults(r) | ToolCall::GetReferenceResults(r) => {
                pick(r)
            }
            ToolCall::GetJobMessages(r) => pick(r),
            ToolCall::WaitForJob(r) => pick(r),
            ToolCall::ApproveValidation(r) => pick(r),
            ToolCall::UpdateTable(r) => {
                let mut ids = pick(r);
                if let Some(source) = ids.get("source_job_id").cloned() {
                    ids.insert("job_id".into(), source);
                }
                ids
            }
            ToolCall::ReferenceCheck(r) => pick(r),
            ToolCall::GetBalance => Map::new(),
            ToolCall::GetUsage(r) => pick(r),
        }
    }
}

/// A rendered tool response.
#[derive(Debug, Clone)]
pub struct ToolOutcome {
    pub body: Body,
    pub is_error: bool,
}

impl ToolOutcome {
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(&self.body).unwrap_or_else(|_| "{}".to_string())
    }

    fn failure(err: &HpxError, ids: Map<String, Value>, guidance: Guidance) -> Self {
        let mut body = err.to_payload();
        for (key, value) in ids {
            body.entry(key).or_insert(value);
        }
        guidance::attach(&mut body, &guidance);
        Self {
            body,
            is_error: true,
        }
    }
}

/// Dispatch a call by tool name with raw JSON arguments.
pub async fn dispatch(
    adapter: &WorkflowAdapter,
    ctx: &Mutex<SessionContext>,
    name: &str,
    args: Value,
    sink: &dyn ProgressSink,
) -> ToolOutcome {
    let tool: ToolName = match name.parse() {
        Ok(tool) => tool,
        Err(err) => {
            let names: Vec<&str> = ToolName::ALL.iter().map(|t| t.as_str()).collect();
            let guidance = Guidance {
                summary: format!("Unknown tool '{}'. Available tools: {}", name, names.join(", ")),
                ..Default::default()
            };
            return ToolOutcome::failure(&err, Map::new(), guidance);
        }
    };
    match ToolCall::parse(tool, args) {
        Ok(call) => run(adapter, ctx, call, sink).await,
        Err(err) => {
            let guidance = guidance::for_error(tool, &err, &Map::new());
            ToolOutcome::failure(&err, Map::new(), guidance)
        }
    }
}

/// Execute a typed call and render the outcome.
pub async fn run(
    adapter: &WorkflowAdapter,
    ctx: &Mutex<SessionContext>,
    call: ToolCall,
    sink: &dyn ProgressSink,
) -> ToolOutcome {
    let tool = call.tool();
    let call_id = uuid::Uuid::new_v4();
    let ids = call.ids();
    tracing::info!("[Tool] {} ({})", tool, call_id);

    match execute(adapter, ctx, call, sink).await {
        Ok(mut body) => {
            let guidance = guidance::build(tool, &body);
            guidance::attach(&mut body, &guidance);
            ToolOutcome {
                body,
                is_error: false,
            }
        }
        Err(err) => {
            tracing::warn!("[Tool] {} ({}) failed: {}", tool, call_id, err);
            let guidance = guidance::for_error(tool, &err, &ids);
            ToolOutcome::failure(&err, ids, guidance)
        }
    }
}

async fn execute(
    adapter: &WorkflowAdapter,
    ctx: &Mutex<SessionContext>,
    call: ToolCall,
    sink: &dyn ProgressSink,
) -> HpxResult<Body> {
    match call {
        // Waits take the lock per poll, and account reads never touch it.
        ToolCall::WaitForJob(req) => {
            let options = WaitOptions::from_secs(req.timeout_seconds, req.poll_interval, None);
            let waited = poll::wait_for_job(adapter, ctx, &req.job_id, options, sink).await?;
            let mut body = waited.last.map(|s| s.to_body()).unwrap_or_else(|| {
                json!({ "job_id": req.job_id, "status": "unknown" })
                    .as_object()
                    .cloned()
                    .unwrap_or_default()
            });
            if waited.timed_out {
                body.insert(
                    "_wait_timeout".into(),
                    Value::String(format!(
                        "wait_for_job timed out after {}s without reaching an actionable state. \
                         Call wait_for_job again or poll get_job_status.",
                        waited.timeout.as_secs()
                    )),
                );
            }
            Ok(body)
        }
        ToolCall::WaitForConversation(req) => {
            let options = WaitOptions::from_secs(
                req.timeout_seconds,
                req.poll_interval,
                req.expected_seconds,
            );
            let conversation_id = req.conversation_id.clone();
            let get = GetConversationRequest {
                conversation_id: req.conversation_id,
                session_id: req.session_id,
            };
            let waited = poll::wait_for_conversation(adapter, ctx, get, options, sink).await?;
            let mut body = waited.last.map(|s| s.to_body()).unwrap_or_else(|| {
                json!({ "conversation_id": conversation_id, "status": "unknown" })
                    .as_object()
                    .cloned()
                    .unwrap_or_default()
            });
            if waited.timed_out {
                body.insert(
                    "_wait_timeout".into(),
                    Value::String(format!(
                        "wait_for_conversation timed out after {}s; the AI has not responded yet. \
                         Call wait_for_conversation again or poll get_conversation.",
                        waited.timeout.as_secs()
                    )),
                );
            }
            Ok(body)
        }
        ToolCall::GetBalance => adapter.get_balance().await,
        ToolCall::GetUsage(req) => adapter.get_usage(req).await,
        call => {
            let mut guard = ctx.lock().await;
            execute_locked(adapter, &mut guard, call).await
        }
    }
}

async fn execute_locked(
    adapter: &WorkflowAdapter,
    ctx: &mut SessionContext,
    call: ToolCall,
) -> HpxResult<Body> {
    match call {
        ToolCall::StartTableMaker(req) => Ok(adapter.start_table_maker(ctx, req).await?.to_body()),
        ToolCall::GetConversation(req) => Ok(adapter.get_conversation(ctx, req).await?.to_body()),
        ToolCall::SendConversationReply(req) => adapter.send_conversation_reply(ctx, req).await,
        ToolCall::RefineConfig(req) => adapter.refine_config(ctx, req).await,
        ToolCall::UploadFile(req) => Ok(adapter.upload_file(ctx, req).await?.to_body()),
        ToolCall::ConfirmUpload(req) => Ok(adapter.confirm_upload(ctx, req).await?.to_body()),
        ToolCall::CreateJob(req) => Ok(adapter.create_job(ctx, req).await?.to_body()),
        ToolCall::GetJobStatus(req) => {
            Ok(adapter.get_job_status(ctx, &req.job_id).await?.to_body())
        }
        ToolCall::GetJobMessages(req) => Ok(adapter.get_job_messages(ctx, req).await?.to_body()),
        ToolCall::ApproveValidation(req) => adapter.approve_validation(ctx, req).await,
        ToolCall::GetResults(req) => Ok(adapter.get_results(ctx, &req.job_id).await?.to_body()),
        ToolCall::GetReferenceResults(req) => {
            adapter.get_reference_results(ctx, &req.job_id).await
        }
        ToolCall::UpdateTable(req) => Ok(adapter.update_table(ctx, req).await?.to_body()),
        ToolCall::ReferenceCheck(req) => Ok(adapter.reference_check(ctx, req).await?.to_body()),
        other => Err(HpxError::BadRequest(format!(
            "{} does not run under the session lock",
            other.tool()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_rejects_missing_fields() {
        let err = ToolCall::parse(ToolName::ApproveValidation, json!({})).unwrap_err();
        assert!(err.to_string().contains("Invalid arguments for approve_validation"));
    }

    #[test]
    fn test_parse_accepts_aliases() {
        let call =
            ToolCall::parse(ToolName::ApproveValidation, json!({ "job_id": "j", "cost_usd": 2.5 }))
                .unwrap();
        match call {
            ToolCall::ApproveValidation(req) => assert_eq!(req.approved_cost_usd, Some(2.5)),
            other => panic!("unexpected call {other:?}"),
        }

        let call = ToolCall::parse(ToolName::UpdateTable, json!({ "job_id": "j_old" })).unwrap();
        assert_eq!(call.ids()["job_id"], "j_old");
        assert_eq!(call.tool(), ToolName::UpdateTable);
    }

    #[test]
    fn test_balance_takes_no_arguments() {
        assert!(matches!(
            ToolCall::parse(ToolName::GetBalance, Value::Null).unwrap(),
            ToolCall::GetBalance
        ));
    }
}
