use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{into_object, str_field};
use crate::error::HpxResult;

/// Where an AI conversation (interview or table maker) currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationStatus {
    /// The AI asked a question and waits for `send_conversation_reply`.
    AwaitingReply,
    /// The AI is working on its turn.
    Building,
    /// The interview is over; a preview has been queued.
    Complete,
}

impl ConversationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConversationStatus::AwaitingReply => "awaiting_reply",
            ConversationStatus::Building => "building",
            ConversationStatus::Complete => "complete",
        }
    }

    /// `user_reply_needed` wins over the raw status so an agent is never told
    /// to keep polling while the AI is waiting on it.
    pub fn from_remote(raw_status: &str, user_reply_needed: bool, trigger_execution: bool) -> Self {
        if user_reply_needed {
            return ConversationStatus::AwaitingReply;
        }
        if trigger_execution {
            return ConversationStatus::Complete;
        }
        match raw_status.trim().to_ascii_lowercase().as_str() {
            "complete" | "completed" | "done" => ConversationStatus::Complete,
            "awaiting_reply" | "user_reply_needed" => ConversationStatus::AwaitingReply,
            _ => ConversationStatus::Building,
        }
    }
}

impl std::fmt::Display for ConversationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A conversation poll result.
#[derive(Debug, Clone)]
pub struct ConversationSnapshot {
    pub conversation_id: String,
    pub session_id: String,
    pub status: ConversationStatus,
    pub remote_status: String,
    pub user_reply_needed: bool,
    pub trigger_execution: bool,
    /// Content of the latest message, usually the AI's open question.
    pub last_message: Option<String>,
    /// Job the server queued when the conversation completed.
    pub job_id: Option<String>,
    pub raw: Map<String, Value>,
}

impl ConversationSnapshot {
    pub fn from_remote(conversation_id: &str, session_id: &str, value: Value) -> HpxResult<Self> {
        let raw = into_object(value, "conversation")?;
        let remote_status = str_field(&raw, "status").unwrap_or_else(|| "processing".into());
        let user_reply_needed = raw
            .get("user_reply_needed")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);
        let trigger_execution = raw
            .get("trigger_execution")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);
        let last_message = raw
            .get("messages")
            .and_then(|m| m.as_array())
            .and_then(|m| m.last())
            .and_then(|m| m.get("content"))
            .and_then(|c| c.as_str())
            .map(str::to_string)
            .or_else(|| match raw.get("last_ai_message") {
                Some(Value::String(s)) => Some(s.clone()),
                Some(Value::Object(m)) => str_field(m, "content"),
                _ => None,
            });
        let job_id = str_field(&raw, "job_id").or_else(|| str_field(&raw, "preview_job_id"));

        Ok(Self {
            conversation_id: str_field(&raw, "conversation_id")
                .unwrap_or_else(|| conversation_id.to_string()),
            session_id: str_field(&raw, "session_id").unwrap_or_else(|| session_id.to_string()),
            status: ConversationStatus::from_remote(&remote_status, user_reply_needed, trigger_execution),
            remote_status,
            user_reply_needed,
            trigger_execution,
            last_message,
            job_id,
            raw,
        })
    }

    /// True once the conversation needs attention, including remote statuses
    /// outside the known in-progress set.
    pub fn is_settled(&self) -> bool {
        if self.status != ConversationStatus::Building {
            return true;
        }
        !matches!(
            self.remote_status.to_ascii_lowercase().as_str(),
            "processing" | "queued" | "in_progress" | "building" | "pending"
        )
    }

    pub fn to_body(&self) -> Map<String, Value> {
        let mut body = self.raw.clone();
        body.insert(
            "conversation_id".into(),
            Value::String(self.conversation_id.clone()),
        );
        body.insert("session_id".into(), Value::String(self.session_id.clone()));
        body.insert("status".into(), Value::String(self.status.as_str().into()));
        if self.status.as_str() != self.remote_status {
            body.insert(
                "remote_status".into(),
                Value::String(self.remote_status.clone()),
            );
        }
        if let Some(job_id) = &self.job_id {
            body.insert("job_id".into(), Value::String(job_id.clone()));
        }
        body
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_reply_needed_takes_priority() {
        let status = ConversationStatus::from_remote("processing", true, false);
        assert_eq!(status, ConversationStatus::AwaitingReply);
    }

    #[test]
    fn test_trigger_execution_completes() {
        assert_eq!(
            ConversationStatus::from_remote("processing", false, true),
            ConversationStatus::Complete
        );
        assert_eq!(
            ConversationStatus::from_remote("queued", false, false),
            ConversationStatus::Building
        );
    }

    #[test]
    fn test_snapshot_reads_last_message() {
        let snap = ConversationSnapshot::from_remote(
            "conv_1",
            "sess_1",
            json!({
                "status": "processing",
                "user_reply_needed": true,
                "messages": [
                    { "role": "assistant", "content": "Hello" },
                    { "role": "assistant", "content": "Which columns matter most?" }
                ]
            }),
        )
        .unwrap();
        assert_eq!(snap.status, ConversationStatus::AwaitingReply);
        assert_eq!(snap.last_message.as_deref(), Some("Which columns matter most?"));
        assert_eq!(snap.to_body()["status"], "awaiting_reply");
        assert_eq!(snap.to_body()["session_id"], "sess_1");
        assert!(snap.is_settled());
    }

    #[test]
    fn test_unexpected_remote_status_settles() {
        let snap =
            ConversationSnapshot::from_remote("c", "s", json!({ "status": "processing" })).unwrap();
        assert!(!snap.is_settled());
        let snap = ConversationSnapshot::from_remote("c", "s", json!({ "status": "error" })).unwrap();
        assert_eq!(snap.status, ConversationStatus::Building);
        assert!(snap.is_settled());
    }
}
