//! Session context: the identifiers and last-known states the adapter threads
//! between calls, plus the guards that enforce legal call ordering.
//!
//! The remote service stays the source of truth. The context only remembers
//! what the server last reported so the adapter can reject calls that are
//! known to be illegal (double approval, replying to a finished interview,
//! `create_job` after an auto-queued preview) before anything is charged.
//! It is an explicit value: every adapter operation takes `&mut SessionContext`.

use std::collections::HashMap;

use crate::error::{HpxError, HpxResult};
use crate::models::{
    ConfirmOutcome, ConversationSnapshot, ConversationStatus, JobHandle, JobSnapshot, JobStatus,
    MessagesPage, UploadReceipt,
};

/// Quotes within half a cent of the estimate are accepted.
pub const COST_TOLERANCE_USD: f64 = 0.005;

pub fn quote_matches(quoted: f64, current: f64) -> bool {
    (quoted - current).abs() < COST_TOLERANCE_USD
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversationKind {
    UploadInterview,
    TableMaker,
}

/// How a session's preview job comes into existence.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum PreviewOrigin {
    /// The caller creates it with `create_job`.
    #[default]
    Explicit,
    /// A table-maker session: the server will queue the preview itself.
    AwaitingAutoQueue,
    /// The server already queued the preview.
    AutoQueued { job_id: String },
}

#[derive(Debug, Clone, Default)]
pub struct SessionRecord {
    pub s3_key: Option<String>,
    pub filename: Option<String>,
    pub upload_id: Option<String>,
    pub conversation_id: Option<String>,
    pub config_id: Option<String>,
    pub preview: PreviewOrigin,
    pub job_ids: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ConversationRecord {
    pub session_id: String,
    pub kind: ConversationKind,
    pub status: ConversationStatus,
}

#[derive(Debug, Clone, Default)]
pub struct JobRecord {
    pub session_id: Option<String>,
    pub status: Option<JobStatus>,
    pub cost_usd: Option<f64>,
    pub approved_cost_usd: Option<f64>,
    pub messages_cursor: Option<i64>,
    pub messages_drained: bool,
    /// Started without a preview (update-table, reference check).
    pub direct_run: bool,
    /// Created through `create_job` rather than queued by the server.
    pub explicit: bool,
}

impl JobRecord {
    pub fn is_approved(&self) -> bool {
        self.approved_cost_usd.is_some()
    }
}

#[derive(Debug, Clone, Default)]
pub struct SessionContext {
    sessions: HashMap<String, SessionRecord>,
    conversations: HashMap<String, ConversationRecord>,
    jobs: HashMap<String, JobRecord>,
}

impl SessionContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn session(&self, session_id: &str) -> Option<&SessionRecord> {
        self.sessions.get(session_id)
    }

    pub fn conversation(&self, conversation_id: &str) -> Option<&ConversationRecord> {
        self.conversations.get(conversation_id)
    }

    pub fn job(&self, job_id: &str) -> Option<&JobRecord> {
        self.jobs.get(job_id)
    }

    pub fn is_approved(&self, job_id: &str) -> bool {
        self.jobs.get(job_id).map(JobRecord::is_approved).unwrap_or(false)
    }

    /// Whether generic in-flight statuses of this job belong to a full run
    /// rather than to its preview.
    pub fn in_full_run(&self, job_id: &str) -> bool {
        self.jobs
            .get(job_id)
            .map(|j| j.is_approved() || j.direct_run)
            .unwrap_or(false)
    }

    /// Session a conversation belongs to, if the context has seen it.
    pub fn session_for_conversation(&self, conversation_id: &str) -> Option<&str> {
        self.conversations
            .get(conversation_id)
            .map(|c| c.session_id.as_str())
    }

    pub fn conversation_for_session(&self, session_id: &str) -> Option<&str> {
        self.sessions
            .get(session_id)
            .and_then(|s| s.conversation_id.as_deref())
    }

    // ─── Guards ─────────────────────────────────────────────────────────

    pub fn check_create_job(&self, session_id: &str) -> HpxResult<()> {
        match self.sessions.get(session_id).map(|s| &s.preview) {
            Some(PreviewOrigin::AutoQueued { job_id }) => Err(HpxError::invalid_state(
                "create_job",
                format!(
                    "session {} already has an auto-queued preview job {}; \
                     track it with get_job_status instead of creating another job",
                    session_id, job_id
                ),
            )),
            Some(PreviewOrigin::AwaitingAutoQueue) => Err(HpxError::invalid_state(
                "create_job",
                format!(
                    "session {} is a table-maker session; its preview is queued \
                     automatically once the conversation completes",
                    session_id
                ),
            )),
            _ => Ok(()),
        }
    }

    pub fn check_reply(&self, conversation_id: &str) -> HpxResult<()> {
        match self.conversations.get(conversation_id) {
            Some(record) if record.status == ConversationStatus::Complete => {
                Err(HpxError::invalid_state(
                    "send_conversation_reply",
                    format!("conversation {} is already complete", conversation_id),
                ))
            }
            _ => Ok(()),
        }
    }

    /// Reject a second approval before any request leaves the process.
    pub fn check_not_approved(&self, job_id: &str) -> HpxResult<()> {
        match self.jobs.get(job_id).and_then(|j| j.approved_cost_usd) {
            Some(cost) => Err(HpxError::invalid_state(
                "approve_validation",
                format!(
                    "job {} was already approved at ${:.2}; it is not charged twice",
                    job_id, cost
                ),
            )),
            None => Ok(()),
        }
    }

    /// Validate an approval against a fresh status reading.
    pub fn check_approval(&self, snapshot: &JobSnapshot, quoted: f64) -> HpxResult<()> {
        match snapshot.status {
            Some(JobStatus::PreviewComplete) => {}
            Some(JobStatus::Running) | Some(JobStatus::Completed) => {
                return Err(HpxError::invalid_state(
                    "approve_validation",
                    format!(
                        "job {} is already {}; approval happens at most once",
                        snapshot.job_id,
                        snapshot.status_str()
                    ),
                ));
            }
            _ => {
                return Err(HpxError::invalid_state(
                    "approve_validation",
                    format!(
                        "job {} is {}; approval requires preview_complete",
                        snapshot.job_id,
                        snapshot.status_str()
                    ),
                ));
            }
        }

        match snapshot.cost_usd {
            Some(current) if quote_matches(quoted, current) => Ok(()),
            Some(current) => Err(HpxError::StaleQuote {
                job_id: snapshot.job_id.clone(),
                quoted,
                current: Some(current),
                message: format!(
                    "approved ${:.2} but the current estimate is ${:.2}",
                    quoted, current
                ),
            }),
            None => Err(HpxError::StaleQuote {
                job_id: snapshot.job_id.clone(),
                quoted,
                current: None,
                message: "the server reported no cost estimate for this preview".into(),
            }),
        }
    }

    pub fn check_completed(&self, operation: &str, snapshot: &JobSnapshot) -> HpxResult<()> {
        if snapshot.status == Some(JobStatus::Completed) {
            Ok(())
        } else {
            Err(HpxError::invalid_state(
                operation,
                format!(
                    "job {} is {}; results are only available once it is completed",
                    snapshot.job_id,
                    snapshot.status_str()
                ),
            ))
        }
    }

    // ─── Recording ──────────────────────────────────────────────────────

    pub fn record_upload(&mut self, receipt: &UploadReceipt) {
        let session = self.sessions.entry(receipt.session_id.clone()).or_default();
        session.s3_key = Some(receipt.s3_key.clone());
        session.filename = Some(receipt.filename.clone());
        if !receipt.upload_id.is_empty() {
            session.upload_id = Some(receipt.upload_id.clone());
        }
    }

    pub fn record_confirm(&mut self, outcome: &ConfirmOutcome) {
        let session = self.sessions.entry(outcome.session_id.clone()).or_default();
        if let Some(m) = &outcome.matched {
            session.config_id = Some(m.config_id.clone());
        }
        if let Some(conversation_id) = &outcome.conversation_id {
            session.conversation_id = Some(conversation_id.clone());
            self.conversations.insert(
                conversation_id.clone(),
                ConversationRecord {
                    session_id: outcome.session_id.clone(),
                    kind: ConversationKind::UploadInterview,
                    status: ConversationStatus::Building,
                },
            );
        }
    }

    pub fn record_conversation_started(
        &mut self,
        conversation_id: &str,
        session_id: &str,
        kind: ConversationKind,
    ) {
        let session = self.sessions.entry(session_id.to_string()).or_default();
        session.conversation_id = Some(conversation_id.to_string());
        if kind == ConversationKind::TableMaker && session.preview == PreviewOrigin::Explicit {
            session.preview = PreviewOrigin::AwaitingAutoQueue;
        }
        self.conversations.insert(
            conversation_id.to_string(),
            ConversationRecord {
                session_id: session_id.to_string(),
                kind,
                status: ConversationStatus::Building,
            },
        );
    }

    pub fn record_reply_sent(&mut self, conversation_id: &str) {
        if let Some(record) = self.conversations.get_mut(conversation_id) {
            record.status = ConversationStatus::Building;
        }
    }

    /// Record a conversation poll. Returns the auto-queued preview job the
    /// first time the conversation is seen complete.
    pub fn record_conversation(&mut self, snapshot: &ConversationSnapshot) -> Option<JobHandle> {
        let kind = self
            .conversations
            .get(&snapshot.conversation_id)
            .map(|c| c.kind)
            .unwrap_or(ConversationKind::UploadInterview);
        self.conversations.insert(
            snapshot.conversation_id.clone(),
            ConversationRecord {
                session_id: snapshot.session_id.clone(),
                kind,
                status: snapshot.status,
            },
        );

        let session = self.sessions.entry(snapshot.session_id.clone()).or_default();
        session.conversation_id = Some(snapshot.conversation_id.clone());
        if let Some(config_id) = snapshot.raw.get("config_id").and_then(|v| v.as_str()) {
            session.config_id = Some(config_id.to_string());
        }

        if snapshot.status != ConversationStatus::Complete {
            return None;
        }
        let job_id = snapshot
            .job_id
            .clone()
            .unwrap_or_else(|| snapshot.session_id.clone());
        let session_id = snapshot.session_id.clone();
        if !self.mark_auto_queued(&session_id, &job_id) {
            return None;
        }
        self.jobs
            .entry(job_id.clone())
            .or_default()
            .status
            .get_or_insert(JobStatus::PreviewPending);

        Some(JobHandle {
            job_id,
            status: JobStatus::PreviewPending,
            raw: Default::default(),
        })
    }

    /// Flag a conversation session's preview as queued by the server.
    /// Returns false when the session already had one.
    fn mark_auto_queued(&mut self, session_id: &str, job_id: &str) -> bool {
        let Some(session) = self.sessions.get_mut(session_id) else {
            return false;
        };
        if session.conversation_id.is_none() {
            return false;
        }
        if let PreviewOrigin::AutoQueued { .. } = session.preview {
            return false;
        }
        session.preview = PreviewOrigin::AutoQueued {
            job_id: job_id.to_string(),
        };
        if !session.job_ids.iter().any(|j| j == job_id) {
            session.job_ids.push(job_id.to_string());
        }
        let record = self.jobs.entry(job_id.to_string()).or_default();
        record.session_id.get_or_insert_with(|| session_id.to_string());
        true
    }

    pub fn record_job_created(&mut self, handle: &JobHandle, session_id: Option<&str>) {
        let record = self.jobs.entry(handle.job_id.clone()).or_default();
        record.status = Some(handle.status);
        record.explicit = true;
        if let Some(session_id) = session_id {
            record.session_id = Some(session_id.to_string());
            let session = self.sessions.entry(session_id.to_string()).or_default();
            if !session.job_ids.contains(&handle.job_id) {
                session.job_ids.push(handle.job_id.clone());
            }
        }
    }

    /// Record a job that runs without a preview or approval step.
    pub fn record_direct_job(&mut self, handle: &JobHandle) {
        let record = self.jobs.entry(handle.job_id.clone()).or_default();
        record.status = Some(handle.status);
        record.direct_run = true;
    }

    pub fn record_job_snapshot(&mut self, snapshot: &JobSnapshot) {
        let record = self.jobs.entry(snapshot.job_id.clone()).or_default();
        if snapshot.status.is_some() {
            record.status = snapshot.status;
        }
        if snapshot.cost_usd.is_some() {
            record.cost_usd = snapshot.cost_usd;
        }
        if record.session_id.is_none() {
            record.session_id = snapshot.session_id.clone();
        }

        // A job this process did not create that belongs to a conversation
        // session is the server's auto-queued preview. Interview previews
        // reuse the session id as their job id.
        if record.explicit || record.direct_run {
            return;
        }
        let session_id = record
            .session_id
            .clone()
            .unwrap_or_else(|| snapshot.job_id.clone());
        if self.mark_auto_queued(&session_id, &snapshot.job_id) {
            tracing::info!(
                "[Session] {} has an auto-queued preview {}",
                session_id,
                snapshot.job_id
            );
        }
    }

    pub fn record_approval(&mut self, job_id: &str, cost_usd: f64, status: JobStatus) {
        let record = self.jobs.entry(job_id.to_string()).or_default();
        record.approved_cost_usd = Some(cost_usd);
        record.status = Some(status);
    }

    /// Message cursor for the next fetch, and whether the log is exhausted.
    pub fn messages_cursor(&self, job_id: &str) -> (Option<i64>, bool) {
        self.jobs
            .get(job_id)
            .map(|j| (j.messages_cursor, j.messages_drained))
            .unwrap_or((None, false))
    }

    /// Advance the cursor. Once the job is known terminal, the page just
    /// fetched is the final one and later fetches come back empty.
    pub fn record_messages(&mut self, page: &MessagesPage) {
        let record = self.jobs.entry(page.job_id.clone()).or_default();
        if page.last_seq.is_some() {
            record.messages_cursor = page.last_seq;
        }
        if record.status.map(|s| s.is_terminal()).unwrap_or(false) {
            record.messages_drained = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn snapshot(status: &str, cost: Option<f64>) -> JobSnapshot {
        let mut raw = json!({ "status": status });
        if let Some(cost) = cost {
            raw["cost_estimate"] = json!({ "estimated_total_cost_usd": cost });
        }
        JobSnapshot::from_remote("job_1", raw, false).unwrap()
    }

    #[test]
    fn test_quote_tolerance() {
        assert!(quote_matches(2.50, 2.5));
        assert!(quote_matches(2.504, 2.5));
        assert!(!quote_matches(2.51, 2.5));
    }

    #[test]
    fn test_approval_requires_preview_complete() {
        let ctx = SessionContext::new();
        let err = ctx
            .check_approval(&snapshot("processing", None), 1.0)
            .unwrap_err();
        assert!(matches!(err, HpxError::InvalidState { .. }));
    }

    #[test]
    fn test_approval_rejects_stale_quote() {
        let ctx = SessionContext::new();
        let err = ctx
            .check_approval(&snapshot("preview_complete", Some(2.5)), 2.0)
            .unwrap_err();
        match err {
            HpxError::StaleQuote { quoted, current, .. } => {
                assert_eq!(quoted, 2.0);
                assert_eq!(current, Some(2.5));
            }
            other => panic!("expected stale quote, got {other:?}"),
        }
        assert!(ctx
            .check_approval(&snapshot("preview_complete", Some(2.5)), 2.5)
            .is_ok());
    }

    #[test]
    fn test_second_approval_is_rejected_locally() {
        let mut ctx = SessionContext::new();
        assert!(ctx.check_not_approved("job_1").is_ok());
        ctx.record_approval("job_1", 2.5, JobStatus::Running);
        assert!(ctx.check_not_approved("job_1").is_err());
        assert!(ctx.is_approved("job_1"));
    }

    #[test]
    fn test_results_require_completed() {
        let ctx = SessionContext::new();
        assert!(ctx
            .check_completed("get_results", &snapshot("running", None))
            .is_err());
        assert!(ctx
            .check_completed("get_results", &snapshot("completed", None))
            .is_ok());
    }

    #[test]
    fn test_completed_conversation_auto_queues_preview() {
        let mut ctx = SessionContext::new();
        ctx.record_conversation_started("conv_1", "sess_1", ConversationKind::UploadInterview);
        assert!(ctx.check_create_job("sess_1").is_ok());

        let snap = ConversationSnapshot::from_remote(
            "conv_1",
            "sess_1",
            json!({ "status": "processing", "trigger_execution": true }),
        )
        .unwrap();
        let handle = ctx.record_conversation(&snap).expect("auto-queued job");
        assert_eq!(handle.job_id, "sess_1");
        assert_eq!(handle.status, JobStatus::PreviewPending);

        assert!(ctx.record_conversation(&snap).is_none());
        assert!(ctx.check_create_job("sess_1").is_err());
        assert!(ctx.check_reply("conv_1").is_err());
    }

    #[test]
    fn test_foreign_preview_job_marks_interview_session() {
        let mut ctx = SessionContext::new();
        ctx.record_conversation_started("conv_1", "sess_1", ConversationKind::UploadInterview);
        ctx.record_job_created(
            &JobHandle {
                job_id: "job_mine".into(),
                status: JobStatus::PreviewPending,
                raw: Default::default(),
            },
            Some("sess_1"),
        );
        let mine = JobSnapshot::from_remote("job_mine", json!({ "status": "processing" }), false)
            .unwrap();
        ctx.record_job_snapshot(&mine);
        assert!(ctx.check_create_job("sess_1").is_ok());

        let queued = JobSnapshot::from_remote("sess_1", json!({ "status": "queued" }), false)
            .unwrap();
        ctx.record_job_snapshot(&queued);
        assert_eq!(
            ctx.session("sess_1").map(|s| s.preview.clone()),
            Some(PreviewOrigin::AutoQueued {
                job_id: "sess_1".into()
            })
        );
        assert!(ctx.check_create_job("sess_1").is_err());
    }

    #[test]
    fn test_job_without_conversation_session_is_left_alone() {
        let mut ctx = SessionContext::new();
        ctx.record_job_snapshot(&snapshot("processing", None));
        assert!(ctx.session("job_1").is_none());
        assert!(ctx.check_create_job("job_1").is_ok());
    }

    #[test]
    fn test_table_maker_session_rejects_create_job() {
        let mut ctx = SessionContext::new();
        ctx.record_conversation_started("conv_tm", "sess_tm", ConversationKind::TableMaker);
        let err = ctx.check_create_job("sess_tm").unwrap_err();
        assert!(err.to_string().contains("table-maker"));
    }

    #[test]
    fn test_direct_jobs_count_as_full_runs() {
        let mut ctx = SessionContext::new();
        assert!(!ctx.in_full_run("job_ref"));
        ctx.record_direct_job(&JobHandle {
            job_id: "job_ref".into(),
            status: JobStatus::Running,
            raw: Default::default(),
        });
        assert!(ctx.in_full_run("job_ref"));
        assert!(!ctx.is_approved("job_ref"));
    }

    #[test]
    fn test_messages_drain_after_terminal() {
        let mut ctx = SessionContext::new();
        ctx.record_job_snapshot(&snapshot("completed", None));
        let page = MessagesPage::from_remote("job_1", json!({ "messages": [{ "_seq": 9 }] })).unwrap();
        ctx.record_messages(&page);
        assert_eq!(ctx.messages_cursor("job_1"), (Some(9), true));
    }
}
