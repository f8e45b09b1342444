//! MCP (Model Context Protocol) server using the official Rust SDK (rmcp).
//!
//! Every tool forwards its typed parameters to [`hyperplexity_core::run`],
//! which applies the workflow guards and attaches `_guidance`. Failures are
//! returned as tool error results (`is_error: true`) rather than protocol
//! errors, so the calling agent always sees the classification and the
//! recovery steps.
//!
//! The two wait tools relay their progress as `notifications/progress` when
//! the request carries a progress token, and log it otherwise.

use std::sync::Arc;

use hyperplexity_core::adapter::{
    ApproveValidationRequest, ConfirmUploadRequest, CreateJobRequest, GetConversationRequest,
    GetJobMessagesRequest, GetUsageRequest, JobIdRequest, ReferenceCheckRequest,
    RefineConfigRequest, SendConversationReplyRequest, StartTableMakerRequest, UpdateTableRequest,
    UploadFileRequest, WaitForConversationRequest, WaitForJobRequest,
};
use hyperplexity_core::{
    run, ClientConfig, HpxResult, LogProgress, ProgressSink, SessionContext, ToolCall,
    ToolOutcome, WorkflowAdapter,
};
use rmcp::{
    handler::server::{tool::ToolRouter, wrapper::Parameters},
    model::*,
    service::RequestContext,
    tool, tool_handler, tool_router,
    transport::stdio,
    ErrorData, RoleServer, ServerHandler, ServiceExt,
};
use tokio::sync::{mpsc, Mutex};

/// Relays wait progress (0..=100) to the client as progress notifications.
///
/// `report` runs inside the wait loop and cannot await, so notifications are
/// queued and sent in order by a separate task.
struct NotifyProgress {
    token: ProgressToken,
    tx: mpsc::UnboundedSender<ProgressNotificationParam>,
}

impl ProgressSink for NotifyProgress {
    fn report(&self, progress: f64, message: Option<&str>) {
        LogProgress.report(progress, message);
        let param = ProgressNotificationParam {
            progress_token: self.token.clone(),
            progress,
            total: Some(100.0),
            message: message.map(str::to_string),
        };
        if self.tx.send(param).is_err() {
            tracing::debug!("[MCP] Progress relay closed");
        }
    }
}

/// MCP server handler exposing the Hyperplexity workflow to AI agents.
///
/// One instance serves one agent session; the [`SessionContext`] it owns
/// tracks the identifiers issued during that session.
#[derive(Clone)]
pub struct HyperplexityMcpServer {
    adapter: WorkflowAdapter,
    ctx: Arc<Mutex<SessionContext>>,
    tool_router: ToolRouter<Self>,
}

#[tool_router]
impl HyperplexityMcpServer {
    pub fn new(adapter: WorkflowAdapter) -> Self {
        Self {
            adapter,
            ctx: Arc::new(Mutex::new(SessionContext::new())),
            tool_router: Self::tool_router(),
        }
    }

    pub fn from_config(config: &ClientConfig) -> HpxResult<Self> {
        Ok(Self::new(WorkflowAdapter::from_config(config)?))
    }

    async fn call(&self, call: ToolCall) -> Result<CallToolResult, ErrorData> {
        let outcome = run(&self.adapter, &self.ctx, call, &LogProgress).await;
        Ok(render(&outcome))
    }

    /// Run a long wait, streaming progress to the client when it asked for it.
    async fn call_with_progress(
        &self,
        call: ToolCall,
        context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, ErrorData> {
        let Some(token) = context.meta.get_progress_token() else {
            return self.call(call).await;
        };

        let (tx, mut rx) = mpsc::unbounded_channel::<ProgressNotificationParam>();
        let peer = context.peer.clone();
        let relay = tokio::spawn(async move {
            while let Some(param) = rx.recv().await {
                if let Err(e) = peer.notify_progress(param).await {
                    tracing::warn!("[MCP] Failed to send progress notification: {}", e);
                    break;
                }
            }
        });

        let sink = NotifyProgress { token, tx };
        let outcome = run(&self.adapter, &self.ctx, call, &sink).await;
        // Closing the channel lets the relay flush and exit before the result goes out.
        drop(sink);
        if let Err(e) = relay.await {
            tracing::warn!("[MCP] Progress relay task failed: {}", e);
        }
        Ok(render(&outcome))
    }

    // ── Conversation Tools ───────────────────────────────────────────

    #[tool(
        description = "Start a Table Maker conversation that researches and builds a table from a natural-language description."
    )]
    async fn start_table_maker(
        &self,
        Parameters(req): Parameters<StartTableMakerRequest>,
    ) -> Result<CallToolResult, ErrorData> {
        self.call(ToolCall::StartTableMaker(req)).await
    }

    #[tool(
        description = "Poll a conversation: awaiting_reply -> send_conversation_reply, building -> poll again, complete -> a preview job was queued."
    )]
    async fn get_conversation(
        &self,
        Parameters(req): Parameters<GetConversationRequest>,
    ) -> Result<CallToolResult, ErrorData> {
        self.call(ToolCall::GetConversation(req)).await
    }

    #[tool(
        description = "Answer the AI's question in an upload interview or table-maker conversation."
    )]
    async fn send_conversation_reply(
        &self,
        Parameters(req): Parameters<SendConversationReplyRequest>,
    ) -> Result<CallToolResult, ErrorData> {
        self.call(ToolCall::SendConversationReply(req)).await
    }

    #[tool(
        description = "Refine the validation config of a session with natural-language instructions."
    )]
    async fn refine_config(
        &self,
        Parameters(req): Parameters<RefineConfigRequest>,
    ) -> Result<CallToolResult, ErrorData> {
        self.call(ToolCall::RefineConfig(req)).await
    }

    #[tool(
        description = "Block until a conversation needs a reply or completes, reporting synthetic progress."
    )]
    async fn wait_for_conversation(
        &self,
        Parameters(req): Parameters<WaitForConversationRequest>,
        context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, ErrorData> {
        self.call_with_progress(ToolCall::WaitForConversation(req), context)
            .await
    }

    // ── Upload Tools ─────────────────────────────────────────────────

    #[tool(
        description = "Upload a local excel/csv/pdf file (presigned PUT) and return session_id + s3_key for confirm_upload."
    )]
    async fn upload_file(
        &self,
        Parameters(req): Parameters<UploadFileRequest>,
    ) -> Result<CallToolResult, ErrorData> {
        self.call(ToolCall::UploadFile(req)).await
    }

    #[tool(
        description = "Confirm an upload. Match score >= 0.85 returns a reusable config_id; otherwise an interview conversation_id."
    )]
    async fn confirm_upload(
        &self,
        Parameters(req): Parameters<ConfirmUploadRequest>,
    ) -> Result<CallToolResult, ErrorData> {
        self.call(ToolCall::ConfirmUpload(req)).await
    }

    // ── Job Tools ────────────────────────────────────────────────────

    #[tool(
        description = "Create a preview job with a known config. Not for interview/table-maker sessions, whose preview is queued automatically."
    )]
    async fn create_job(
        &self,
        Parameters(req): Parameters<CreateJobRequest>,
    ) -> Result<CallToolResult, ErrorData> {
        self.call(ToolCall::CreateJob(req)).await
    }

    #[tool(
        description = "One-shot job status: preview_pending, preview_complete (with cost_usd), running, completed or failed."
    )]
    async fn get_job_status(
        &self,
        Parameters(req): Parameters<JobIdRequest>,
    ) -> Result<CallToolResult, ErrorData> {
        self.call(ToolCall::GetJobStatus(req)).await
    }

    #[tool(
        description = "Fetch progress messages for a job; pass since_seq to receive only new ones."
    )]
    async fn get_job_messages(
        &self,
        Parameters(req): Parameters<GetJobMessagesRequest>,
    ) -> Result<CallToolResult, ErrorData> {
        self.call(ToolCall::GetJobMessages(req)).await
    }

    #[tool(
        description = "Block until a job reaches preview_complete, completed or failed, tracking multi-phase progress."
    )]
    async fn wait_for_job(
        &self,
        Parameters(req): Parameters<WaitForJobRequest>,
        context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, ErrorData> {
        self.call_with_progress(ToolCall::WaitForJob(req), context)
            .await
    }

    // ── Validation Tools ─────────────────────────────────────────────

    #[tool(
        description = "Approve a preview and start the paid full run. approved_cost_usd must equal the current estimate. Charged once."
    )]
    async fn approve_validation(
        &self,
        Parameters(req): Parameters<ApproveValidationRequest>,
    ) -> Result<CallToolResult, ErrorData> {
        self.call(ToolCall::ApproveValidation(req)).await
    }

    #[tool(
        description = "Fetch results of a completed job, embedding per-cell metadata (confidence, explanations, sources)."
    )]
    async fn get_results(
        &self,
        Parameters(req): Parameters<JobIdRequest>,
    ) -> Result<CallToolResult, ErrorData> {
        self.call(ToolCall::GetResults(req)).await
    }

    #[tool(description = "Fetch the fact-check report of a completed reference-check job.")]
    async fn get_reference_results(
        &self,
        Parameters(req): Parameters<JobIdRequest>,
    ) -> Result<CallToolResult, ErrorData> {
        self.call(ToolCall::GetReferenceResults(req)).await
    }

    // ── Job Action Tools ─────────────────────────────────────────────

    #[tool(
        description = "Re-validate a previously processed table without re-uploading it; returns a new job_id."
    )]
    async fn update_table(
        &self,
        Parameters(req): Parameters<UpdateTableRequest>,
    ) -> Result<CallToolResult, ErrorData> {
        self.call(ToolCall::UpdateTable(req)).await
    }

    #[tool(
        description = "Start a fact-check job for inline text, an uploaded s3_key or a local file."
    )]
    async fn reference_check(
        &self,
        Parameters(req): Parameters<ReferenceCheckRequest>,
    ) -> Result<CallToolResult, ErrorData> {
        self.call(ToolCall::ReferenceCheck(req)).await
    }

    // ── Account Tools ────────────────────────────────────────────────

    #[tool(description = "Return the account credit balance in USD.")]
    async fn get_balance(&self) -> Result<CallToolResult, ErrorData> {
        self.call(ToolCall::GetBalance).await
    }

    #[tool(description = "Return API usage history. Dates are YYYY-MM-DD.")]
    async fn get_usage(
        &self,
        Parameters(req): Parameters<GetUsageRequest>,
    ) -> Result<CallToolResult, ErrorData> {
        self.call(ToolCall::GetUsage(req)).await
    }
}

#[tool_handler]
impl ServerHandler for HyperplexityMcpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(
                "Hyperplexity AI table validation. Upload a table with upload_file, then \
                 confirm_upload. Follow the _guidance block in every response: it names the \
                 next tool and its parameters. approve_validation is the only call that \
                 spends credits; pass the exact cost_usd reported at preview_complete."
                    .into(),
            ),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}

fn render(outcome: &ToolOutcome) -> CallToolResult {
    let content = vec![Content::text(outcome.to_json())];
    if outcome.is_error {
        CallToolResult::error(content)
    } else {
        CallToolResult::success(content)
    }
}

/// Serve MCP over stdin/stdout until the client disconnects.
pub async fn serve_stdio(config: &ClientConfig) -> Result<(), String> {
    let server = HyperplexityMcpServer::from_config(config).map_err(|e| e.to_string())?;
    tracing::info!("[MCP] Serving Hyperplexity tools on stdio ({})", config.base_url);

    let service = server
        .serve(stdio())
        .await
        .map_err(|e| format!("Failed to start MCP server: {}", e))?;
    let reason = service
        .waiting()
        .await
        .map_err(|e| format!("MCP server task failed: {}", e))?;
    tracing::info!("[MCP] Session ended: {:?}", reason);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use hyperplexity_core::ToolName;
    use serde_json::{json, Value};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn server_for(uri: &str) -> HyperplexityMcpServer {
        HyperplexityMcpServer::from_config(&ClientConfig::new("hpx_live_test", Some(uri))).unwrap()
    }

    fn text_of(result: &CallToolResult) -> Value {
        let text = &result.content[0].as_text().unwrap().text;
        serde_json::from_str(text).unwrap()
    }

    #[test]
    fn test_router_matches_catalog() {
        let tools = HyperplexityMcpServer::tool_router().list_all();
        assert_eq!(tools.len(), ToolName::ALL.len());
        for tool in tools {
            let name: ToolName = tool.name.parse().unwrap();
            assert_eq!(
                tool.description.as_deref(),
                Some(name.description()),
                "description drift for {}",
                name
            );
        }
    }

    #[test]
    fn test_get_info_enables_tools() {
        let info = server_for("http://localhost:9").get_info();
        assert!(info.capabilities.tools.is_some());
        assert!(info.instructions.unwrap().contains("approve_validation"));
    }

    #[tokio::test]
    async fn test_tool_success_renders_guidance() {
        let mock = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/account/balance"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "data": { "balance_usd": 12.5 }
            })))
            .mount(&mock)
            .await;

        let result = server_for(&mock.uri()).get_balance().await.unwrap();
        assert_eq!(result.is_error, Some(false));
        let body = text_of(&result);
        assert_eq!(body["balance_usd"], 12.5);
        assert!(body["_guidance"]["summary"].is_string());
    }

    #[tokio::test]
    async fn test_wait_progress_is_relayed_as_notifications() {
        let mock = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/jobs/job_1/messages"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "data": { "messages": [] }
            })))
            .mount(&mock)
            .await;
        Mock::given(method("GET"))
            .and(path("/jobs/job_1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "data": { "status": "processing" }
            })))
            .up_to_n_times(1)
            .mount(&mock)
            .await;
        Mock::given(method("GET"))
            .and(path("/jobs/job_1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "data": {
                    "status": "preview_complete",
                    "cost_estimate": { "estimated_total_cost_usd": 0.8 }
                }
            })))
            .mount(&mock)
            .await;

        let server = server_for(&mock.uri());
        let token = ProgressToken(NumberOrString::String("wait-1".into()));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sink = NotifyProgress {
            token: token.clone(),
            tx,
        };
        let call = ToolCall::WaitForJob(WaitForJobRequest {
            job_id: "job_1".into(),
            timeout_seconds: Some(30),
            poll_interval: Some(1),
        });
        let outcome = run(&server.adapter, &server.ctx, call, &sink).await;
        drop(sink);
        assert!(!outcome.is_error);
        assert_eq!(outcome.body["status"], "preview_complete");

        let mut sent = Vec::new();
        while let Some(param) = rx.recv().await {
            sent.push(param);
        }
        assert!(!sent.is_empty());
        assert!(sent
            .iter()
            .all(|p| p.progress_token == token && p.total == Some(100.0)));
        assert!(sent.windows(2).all(|w| w[0].progress <= w[1].progress));
        assert_eq!(sent.last().map(|p| p.progress), Some(100.0));
    }

    #[tokio::test]
    async fn test_tool_failure_is_an_error_result() {
        let server = server_for("http://localhost:9");
        let result = server
            .approve_validation(Parameters(ApproveValidationRequest {
                job_id: "job_1".into(),
                approved_cost_usd: None,
            }))
            .await
            .unwrap();
        assert_eq!(result.is_error, Some(true));
        let body = text_of(&result);
        assert_eq!(body["classification"], "client_error");
        assert_eq!(body["job_id"], "job_1");
    }
}
