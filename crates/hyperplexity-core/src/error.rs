//! Core error type for the Hyperplexity adapter.
//!
//! `HpxError` is used by the client, the session guards and every adapter
//! operation. Each variant maps to an [`ErrorClass`] so the calling agent can
//! tell a retryable hiccup from a call that will never succeed as issued.

use serde::Serialize;
use serde_json::{Map, Value};

/// Coarse classification surfaced with every failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// Network failure, timeout, 5xx or rate limiting. Retry later.
    Transient,
    /// The operation is not legal in the current workflow state.
    InvalidState,
    /// The approved cost no longer matches the server's estimate.
    StaleQuote,
    /// Credentials are missing, invalid or lack permission.
    Auth,
    /// Any other caller-side mistake (bad arguments, 4xx, unreadable file).
    ClientError,
    /// Local configuration is incomplete.
    Config,
}

impl ErrorClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorClass::Transient => "transient",
            ErrorClass::InvalidState => "invalid_state",
            ErrorClass::StaleQuote => "stale_quote",
            ErrorClass::Auth => "auth",
            ErrorClass::ClientError => "client_error",
            ErrorClass::Config => "config",
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorClass::Transient)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum HpxError {
    #[error("Transient error: {message}")]
    Transient { status: Option<u16>, message: String },

    #[error("Invalid state for {operation}: {message}")]
    InvalidState { operation: String, message: String },

    #[error("Stale quote for job {job_id}: {message}")]
    StaleQuote {
        job_id: String,
        quoted: f64,
        current: Option<f64>,
        message: String,
    },

    #[error("Authentication error ({status}): {message}")]
    Auth { status: u16, message: String },

    #[error("Hyperplexity API error {status}: {message}")]
    Remote {
        status: u16,
        code: Option<String>,
        message: String,
    },

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Decode error: {0}")]
    Decode(String),
}

pub type HpxResult<T> = Result<T, HpxError>;

impl HpxError {
    pub fn invalid_state(operation: &str, message: impl Into<String>) -> Self {
        HpxError::InvalidState {
            operation: operation.to_string(),
            message: message.into(),
        }
    }

    /// Classify an error reported by the remote API.
    ///
    /// `code` is the `error.code` field of the failure envelope, when present.
    pub fn from_remote(status: u16, code: Option<String>, message: String) -> Self {
        let code_lc = code.as_deref().unwrap_or("").to_ascii_lowercase();

        if code_lc.contains("cost_mismatch") || code_lc.contains("stale_quote") {
            return HpxError::StaleQuote {
                job_id: String::new(),
                quoted: 0.0,
                current: None,
                message,
            };
        }
        if code_lc == "missing_config" || code_lc == "invalid_state" || status == 409 {
            return HpxError::InvalidState {
                operation: code.unwrap_or_else(|| "remote".to_string()),
                message,
            };
        }

        match status {
            401 | 403 => HpxError::Auth { status, message },
            408 | 429 => HpxError::Transient {
                status: Some(status),
                message,
            },
            s if s >= 500 => HpxError::Transient {
                status: Some(status),
                message,
            },
            _ => HpxError::Remote {
                status,
                code,
                message,
            },
        }
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            HpxError::Transient { .. } => ErrorClass::Transient,
            HpxError::InvalidState { .. } => ErrorClass::InvalidState,
            HpxError::StaleQuote { .. } => ErrorClass::StaleQuote,
            HpxError::Auth { .. } => ErrorClass::Auth,
            HpxError::Remote { .. }
            | HpxError::BadRequest(_)
            | HpxError::Io(_)
            | HpxError::Decode(_) => ErrorClass::ClientError,
            HpxError::Config(_) => ErrorClass::Config,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.class().is_retryable()
    }

    /// Short machine-readable code used as the `error` field of payloads.
    pub fn code(&self) -> String {
        match self {
            HpxError::Transient { .. } => "transient_error".into(),
            HpxError::InvalidState { .. } => "invalid_state".into(),
            HpxError::StaleQuote { .. } => "stale_quote".into(),
            HpxError::Auth { .. } => "auth_error".into(),
            HpxError::Remote { code, .. } => code.clone().unwrap_or_else(|| "api_error".into()),
            HpxError::BadRequest(_) => "bad_request".into(),
            HpxError::Io(_) => "io_error".into(),
            HpxError::Config(_) => "config_error".into(),
            HpxError::Decode(_) => "decode_error".into(),
        }
    }

    /// Render the failure as a JSON object (without guidance).
    pub fn to_payload(&self) -> Map<String, Value> {
        let mut out = Map::new();
        out.insert("error".into(), Value::String(self.code()));
        out.insert("classification".into(), Value::String(self.class().as_str().into()));
        out.insert("retryable".into(), Value::Bool(self.is_retryable()));
        out.insert("message".into(), Value::String(self.to_string()));

        match self {
            HpxError::Transient {
                status: Some(status),
                ..
            }
            | HpxError::Auth { status, .. }
            | HpxError::Remote { status, .. } => {
                out.insert("status".into(), Value::from(*status));
            }
            HpxError::InvalidState { operation, .. } => {
                out.insert("operation".into(), Value::String(operation.clone()));
            }
            HpxError::StaleQuote {
                job_id,
                quoted,
                current,
                ..
            } => {
                if !job_id.is_empty() {
                    out.insert("job_id".into(), Value::String(job_id.clone()));
                    out.insert("approved_cost_usd".into(), Value::from(*quoted));
                }
                if let Some(current) = current {
                    out.insert("current_cost_usd".into(), Value::from(*current));
                }
            }
            _ => {}
        }
        out
    }
}

impl From<reqwest::Error> for HpxError {
    fn from(err: reqwest::Error) -> Self {
        // A request that could not be built (bad URL or scheme) fails the
        // same way on every retry.
        if err.is_builder() {
            return HpxError::Config(err.to_string());
        }
        if err.is_timeout() || err.is_connect() || err.is_request() {
            return HpxError::Transient {
                status: None,
                message: err.to_string(),
            };
        }
        if err.is_decode() {
            return HpxError::Decode(err.to_string());
        }
        match err.status() {
            Some(status) => HpxError::from_remote(status.as_u16(), None, err.to_string()),
            None => HpxError::Transient {
                status: None,
                message: err.to_string(),
            },
        }
    }
}

impl From<std::io::Error> for HpxError {
    fn from(err: std::io::Error) -> Self {
        HpxError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for HpxError {
    fn from(err: serde_json::Error) -> Self {
        HpxError::Decode(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_errors_are_transient() {
        let err = HpxError::from_remote(503, None, "unavailable".into());
        assert_eq!(err.class(), ErrorClass::Transient);
        assert!(err.is_retryable());

        let err = HpxError::from_remote(429, Some("rate_limited".into()), "slow down".into());
        assert!(err.is_retryable());
    }

    #[test]
    fn test_client_errors_are_fatal() {
        let err = HpxError::from_remote(401, None, "bad key".into());
        assert_eq!(err.class(), ErrorClass::Auth);
        assert!(!err.is_retryable());

        let err = HpxError::from_remote(422, Some("invalid_file".into()), "nope".into());
        assert_eq!(err.class(), ErrorClass::ClientError);
        assert_eq!(err.code(), "invalid_file");
    }

    #[test]
    fn test_conflict_and_missing_config_are_invalid_state() {
        let err = HpxError::from_remote(409, None, "not in preview_complete".into());
        assert_eq!(err.class(), ErrorClass::InvalidState);

        let err = HpxError::from_remote(400, Some("missing_config".into()), "no config".into());
        assert_eq!(err.class(), ErrorClass::InvalidState);
    }

    #[test]
    fn test_cost_mismatch_code_is_stale_quote() {
        let err = HpxError::from_remote(400, Some("COST_MISMATCH".into()), "quote expired".into());
        assert_eq!(err.class(), ErrorClass::StaleQuote);
    }

    #[test]
    fn test_unbuildable_request_is_a_config_error() {
        let err = reqwest::Client::new()
            .get("not a url")
            .build()
            .unwrap_err();
        assert!(err.is_builder());
        let err = HpxError::from(err);
        assert_eq!(err.class(), ErrorClass::Config);
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_payload_carries_classification() {
        let err = HpxError::StaleQuote {
            job_id: "job_1".into(),
            quoted: 2.0,
            current: Some(2.5),
            message: "estimate changed".into(),
        };
        let payload = err.to_payload();
        assert_eq!(payload["error"], "stale_quote");
        assert_eq!(payload["classification"], "stale_quote");
        assert_eq!(payload["retryable"], false);
        assert_eq!(payload["current_cost_usd"], 2.5);
        assert_eq!(payload["job_id"], "job_1");
    }
}
