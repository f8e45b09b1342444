use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{f64_value, i64_value, into_object, str_field};
use crate::error::HpxResult;

/// Workflow status of a validation or fact-check job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    PreviewPending,
    PreviewComplete,
    AwaitingApproval,
    Running,
    Completed,
    Failed,
}

/// `current_step` fragments marking a generator phase that finished while the
/// pipeline moves on (table maker → preview, claim extraction → checking).
pub const INTERMEDIATE_STEPS: [&str; 5] = [
    "config generation",
    "configuration generation",
    "table making",
    "table maker",
    "claim extraction",
];

pub fn is_intermediate_step(step: &str) -> bool {
    let step = step.to_ascii_lowercase();
    INTERMEDIATE_STEPS.iter().any(|s| step.contains(s))
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::PreviewPending => "preview_pending",
            JobStatus::PreviewComplete => "preview_complete",
            JobStatus::AwaitingApproval => "awaiting_approval",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// Normalise a remote status string.
    ///
    /// `approved` disambiguates the generic in-flight states: before approval
    /// they belong to the preview, afterwards to the full run.
    pub fn from_remote(raw: &str, current_step: Option<&str>, approved: bool) -> Option<Self> {
        let in_flight = if approved {
            JobStatus::Running
        } else {
            JobStatus::PreviewPending
        };
        match raw.trim().to_ascii_lowercase().as_str() {
            "queued" | "processing" | "in_progress" | "pending" => Some(in_flight),
            "preview_pending" | "preview_queued" | "preview_processing" => {
                Some(JobStatus::PreviewPending)
            }
            "preview_complete" | "preview_completed" => Some(JobStatus::PreviewComplete),
            "awaiting_approval" => Some(JobStatus::AwaitingApproval),
            "running" | "validating" | "approved" => Some(JobStatus::Running),
            "completed" | "complete" => {
                if current_step.map(is_intermediate_step).unwrap_or(false) {
                    Some(in_flight)
                } else {
                    Some(JobStatus::Completed)
                }
            }
            "failed" | "error" => Some(JobStatus::Failed),
            _ => None,
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Extract the preview cost estimate from a status payload.
pub fn cost_estimate(raw: &Map<String, Value>) -> Option<f64> {
    raw.get("cost_estimate")
        .and_then(|c| c.get("estimated_total_cost_usd"))
        .and_then(f64_value)
        .or_else(|| raw.get("estimated_cost_usd").and_then(f64_value))
        .or_else(|| raw.get("cost_usd").and_then(f64_value))
}

/// A job status reading, normalised but keeping the remote payload.
#[derive(Debug, Clone)]
pub struct JobSnapshot {
    pub job_id: String,
    /// `None` when the server reported a status this adapter does not know.
    pub status: Option<JobStatus>,
    pub remote_status: String,
    pub current_step: Option<String>,
    pub cost_usd: Option<f64>,
    pub session_id: Option<String>,
    pub config_id: Option<String>,
    pub raw: Map<String, Value>,
}

impl JobSnapshot {
    pub fn from_remote(job_id: &str, value: Value, approved: bool) -> HpxResult<Self> {
        let raw = into_object(value, "job status")?;
        let remote_status = str_field(&raw, "status").unwrap_or_else(|| "unknown".into());
        let current_step = str_field(&raw, "current_step").or_else(|| str_field(&raw, "step"));
        let status = JobStatus::from_remote(&remote_status, current_step.as_deref(), approved);
        Ok(Self {
            job_id: str_field(&raw, "job_id").unwrap_or_else(|| job_id.to_string()),
            status,
            remote_status,
            current_step,
            cost_usd: cost_estimate(&raw),
            session_id: str_field(&raw, "session_id"),
            config_id: str_field(&raw, "config_id"),
            raw,
        })
    }

    pub fn status_str(&self) -> &str {
        self.status
            .as_ref()
            .map(JobStatus::as_str)
            .unwrap_or(self.remote_status.as_str())
    }

    pub fn is_terminal(&self) -> bool {
        self.status.map(|s| s.is_terminal()).unwrap_or(false)
    }

    /// The server reports `completed` for a generator phase while the next
    /// pipeline stage has not started yet.
    pub fn intermediate_step(&self) -> Option<&str> {
        let completed = matches!(
            self.remote_status.to_ascii_lowercase().as_str(),
            "completed" | "complete"
        );
        self.current_step
            .as_deref()
            .filter(|step| completed && is_intermediate_step(step))
    }

    pub fn to_body(&self) -> Map<String, Value> {
        let mut body = self.raw.clone();
        body.insert("job_id".into(), Value::String(self.job_id.clone()));
        body.insert("status".into(), Value::String(self.status_str().to_string()));
        if self.status_str() != self.remote_status {
            body.insert(
                "remote_status".into(),
                Value::String(self.remote_status.clone()),
            );
        }
        if let Some(cost) = self.cost_usd {
            body.insert("cost_usd".into(), Value::from(cost));
        }
        body
    }
}

/// Identifier and initial status of a newly created job.
#[derive(Debug, Clone)]
pub struct JobHandle {
    pub job_id: String,
    pub status: JobStatus,
    pub raw: Map<String, Value>,
}

impl JobHandle {
    pub fn to_body(&self) -> Map<String, Value> {
        let mut body = self.raw.clone();
        body.insert("job_id".into(), Value::String(self.job_id.clone()));
        body.insert("status".into(), Value::String(self.status.as_str().into()));
        body
    }
}

/// One progress message emitted by a running job.
#[derive(Debug, Clone, Serialize)]
pub struct JobMessage {
    pub seq: Option<i64>,
    pub message_type: Option<String>,
    pub payload: Value,
}

impl JobMessage {
    pub fn from_value(value: Value) -> Self {
        let seq = value
            .get("_seq")
            .or_else(|| value.get("seq"))
            .and_then(i64_value);
        let message_type = value
            .get("message_type")
            .or_else(|| value.get("type"))
            .and_then(|v| v.as_str())
            .map(str::to_string);
        Self {
            seq,
            message_type,
            payload: value,
        }
    }

    /// Native progress percentage carried by the message, if any.
    ///
    /// An explicit `0` is a valid reading and is returned as such.
    pub fn progress(&self) -> Option<f64> {
        let data = self
            .payload
            .get("message_data")
            .or_else(|| self.payload.get("data"))?;
        let data = data.as_object()?;
        ["progress", "percent", "progress_percent", "value"]
            .iter()
            .find_map(|key| data.get(*key).and_then(f64_value))
    }
}

/// A page of job messages plus the cursor for the next fetch.
#[derive(Debug, Clone)]
pub struct MessagesPage {
    pub job_id: String,
    pub messages: Vec<JobMessage>,
    pub last_seq: Option<i64>,
    pub raw: Map<String, Value>,
}

impl MessagesPage {
    pub fn from_remote(job_id: &str, value: Value) -> HpxResult<Self> {
        let mut raw = into_object(value, "job messages")?;
        let messages: Vec<JobMessage> = match raw.remove("messages") {
            Some(Value::Array(items)) => items.into_iter().map(JobMessage::from_value).collect(),
            _ => Vec::new(),
        };
        let last_seq = raw
            .get("last_seq")
            .and_then(i64_value)
            .or_else(|| messages.last().and_then(|m| m.seq));
        Ok(Self {
            job_id: job_id.to_string(),
            messages,
            last_seq,
            raw,
        })
    }

    pub fn empty(job_id: &str, last_seq: Option<i64>) -> Self {
        Self {
            job_id: job_id.to_string(),
            messages: Vec::new(),
            last_seq,
            raw: Map::new(),
        }
    }

    /// Latest native progress reading in this page.
    pub fn latest_progress(&self) -> Option<f64> {
        self.messages.iter().rev().find_map(JobMessage::progress)
    }

    pub fn to_body(&self) -> Map<String, Value> {
        let mut body = self.raw.clone();
        body.insert("job_id".into(), Value::String(self.job_id.clone()));
        body.insert(
            "messages".into(),
            Value::Array(self.messages.iter().map(|m| m.payload.clone()).collect()),
        );
        if let Some(seq) = self.last_seq {
            body.insert("last_seq".into(), Value::from(seq));
        }
        body
    }
}
