use serde_json::{json, Value};

use super::requests::{
    GetConversationRequest, RefineConfigRequest, SendConversationReplyRequest,
    StartTableMakerRequest,
};
use super::{body_of, require, set_default, Body, WorkflowAdapter};
use crate::error::{HpxError, HpxResult};
use crate::models::{ConversationSnapshot, ConversationStatus};
use crate::session::{ConversationKind, PreviewOrigin, SessionContext};

impl WorkflowAdapter {
    pub async fn start_table_maker(
        &self,
        ctx: &mut SessionContext,
        req: StartTableMakerRequest,
    ) -> HpxResult<ConversationSnapshot> {
        require("message", &req.message)?;
        let data = self
            .client
            .post("/conversations/table-maker", &json!({ "message": req.message }))
            .await?;
        let snapshot = ConversationSnapshot::from_remote("", "", data)?;
        if snapshot.conversation_id.is_empty() || snapshot.session_id.is_empty() {
            return Err(HpxError::Decode(
                "table-maker response is missing conversation_id or session_id".into(),
            ));
        }

        tracing::info!(
            "[Conversation] Table maker started: {} (session {})",
            snapshot.conversation_id,
            snapshot.session_id
        );
        ctx.record_conversation_started(
            &snapshot.conversation_id,
            &snapshot.session_id,
            ConversationKind::TableMaker,
        );
        Ok(snapshot)
    }

    /// Start the AI interview that builds a config for an uploaded file.
    pub(crate) async fn start_upload_interview(
        &self,
        ctx: &mut SessionContext,
        session_id: &str,
    ) -> HpxResult<String> {
        let data = self
            .client
            .post(
                "/conversations/upload-interview",
                &json!({ "session_id": session_id, "message": "" }),
            )
            .await?;
        let conversation_id = data
            .get("conversation_id")
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .ok_or_else(|| {
                HpxError::Decode("upload-interview response has no conversation_id".into())
            })?;
        tracing::info!(
            "[Conversation] Upload interview started: {} (session {})",
            conversation_id,
            session_id
        );
        ctx.record_conversation_started(
            &conversation_id,
            session_id,
            ConversationKind::UploadInterview,
        );
        Ok(conversation_id)
    }

    pub async fn get_conversation(
        &self,
        ctx: &mut SessionContext,
        req: GetConversationRequest,
    ) -> HpxResult<ConversationSnapshot> {
        require("conversation_id", &req.conversation_id)?;
        let session_id = resolve_session(ctx, &req.conversation_id, req.session_id)?;
        let data = self
            .client
            .get(
                &format!("/conversations/{}", req.conversation_id),
                &[("session_id", session_id.clone())],
            )
            .await?;
        let mut snapshot = ConversationSnapshot::from_remote(&req.conversation_id, &session_id, data)?;

        if let Some(handle) = ctx.record_conversation(&snapshot) {
            tracing::info!(
                "[Conversation] {} complete, preview {} queued",
                snapshot.conversation_id,
                handle.job_id
            );
        }
        if snapshot.status == ConversationStatus::Complete && snapshot.job_id.is_none() {
            if let Some(PreviewOrigin::AutoQueued { job_id }) =
                ctx.session(&snapshot.session_id).map(|s| &s.preview)
            {
                snapshot.job_id = Some(job_id.clone());
            }
        }
        Ok(snapshot)
    }

    pub async fn send_conversation_reply(
        &self,
        ctx: &mut SessionContext,
        req: SendConversationReplyRequest,
    ) -> HpxResult<Body> {
        require("conversation_id", &req.conversation_id)?;
        require("message", &req.message)?;
        let session_id = resolve_session(ctx, &req.conversation_id, req.session_id)?;
        ctx.check_reply(&req.conversation_id)?;

        let data = self
            .client
            .post(
                &format!("/conversations/{}/message", req.conversation_id),
                &json!({ "session_id": session_id, "message": req.message }),
            )
            .await?;
        Ok(record_turn(ctx, &req.conversation_id, &session_id, data))
    }

    pub async fn refine_config(
        &self,
        ctx: &mut SessionContext,
        req: RefineConfigRequest,
    ) -> HpxResult<Body> {
        require("instructions", &req.instructions)?;
        let conversation_id = req
            .conversation_id
            .filter(|c| !c.trim().is_empty())
            .or_else(|| {
                req.session_id
                    .as_deref()
                    .and_then(|s| ctx.conversation_for_session(s))
                    .map(str::to_string)
            })
            .ok_or_else(|| {
                HpxError::BadRequest(
                    "conversation_id is required: no conversation is recorded for this session"
                        .into(),
                )
            })?;
        let session_id = resolve_session(ctx, &conversation_id, req.session_id)?;

        let mut payload = json!({ "session_id": session_id, "instructions": req.instructions });
        if let Some(config_id) = &req.config_id {
            payload["config_id"] = Value::String(config_id.clone());
        }
        let data = self
            .client
            .post(
                &format!("/conversations/{}/refine-config", conversation_id),
                &payload,
            )
            .await?;
        Ok(record_turn(ctx, &conversation_id, &session_id, data))
    }
}

/// Record what a reply or refine response says about the conversation. A
/// response that already completes the interview queues the preview, so the
/// body carries the `job_id` to track.
fn record_turn(
    ctx: &mut SessionContext,
    conversation_id: &str,
    session_id: &str,
    data: Value,
) -> Body {
    let mut body = body_of(data.clone());
    set_default(&mut body, "conversation_id", conversation_id);
    set_default(&mut body, "session_id", session_id);

    let snapshot = match ConversationSnapshot::from_remote(conversation_id, session_id, data) {
        Ok(snapshot) => snapshot,
        Err(_) => {
            ctx.record_reply_sent(conversation_id);
            return body;
        }
    };
    if let Some(handle) = ctx.record_conversation(&snapshot) {
        tracing::info!(
            "[Conversation] {} complete, preview {} queued",
            snapshot.conversation_id,
            handle.job_id
        );
    }
    if snapshot.status == ConversationStatus::Complete {
        body.insert("status".into(), Value::String(snapshot.status.as_str().into()));
        if let Some(PreviewOrigin::AutoQueued { job_id }) =
            ctx.session(&snapshot.session_id).map(|s| &s.preview)
        {
            set_default(&mut body, "job_id", job_id);
        }
    }
    body
}

/// The session a conversation call targets: the explicit argument, else the
/// session the conversation was started in.
fn resolve_session(
    ctx: &SessionContext,
    conversation_id: &str,
    session_id: Option<String>,
) -> HpxResult<String> {
    session_id
        .filter(|s| !s.trim().is_empty())
        .or_else(|| ctx.session_for_conversation(conversation_id).map(str::to_string))
        .ok_or_else(|| {
            HpxError::BadRequest(format!(
                "session_id is required for conversation {} (not started in this session)",
                conversation_id
            ))
        })
}
