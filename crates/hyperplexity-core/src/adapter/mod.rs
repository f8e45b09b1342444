//! WorkflowAdapter: one async operation per remote capability.
//!
//! Every operation takes the caller's [`SessionContext`] explicitly, runs the
//! local ordering guards before any request that could charge credits, and
//! records what the server reported. Operations return typed models; the
//! rendering into JSON bodies with `_guidance` happens in [`dispatch`].
//!
//! [`SessionContext`]: crate::session::SessionContext

mod account;
mod conversations;
mod dispatch;
mod job_actions;
mod jobs;
pub mod requests;
mod uploads;
mod validation;

pub use dispatch::{dispatch, run, ToolCall, ToolOutcome};
pub use requests::*;

use serde_json::{Map, Value};

use crate::client::HyperplexityClient;
use crate::config::ClientConfig;
use crate::error::{HpxError, HpxResult};

/// A rendered response body (a JSON object).
pub type Body = Map<String, Value>;

#[derive(Clone)]
pub struct WorkflowAdapter {
    client: HyperplexityClient,
}

impl WorkflowAdapter {
    pub fn new(client: HyperplexityClient) -> Self {
        Self { client }
    }

    pub fn from_config(config: &ClientConfig) -> HpxResult<Self> {
        Ok(Self::new(HyperplexityClient::new(config)?))
    }

    pub fn client(&self) -> &HyperplexityClient {
        &self.client
    }
}

/// Reject blank identifiers before they end up in a request path.
fn require(field: &str, value: &str) -> HpxResult<()> {
    if value.trim().is_empty() {
        return Err(HpxError::BadRequest(format!("{} is required", field)));
    }
    Ok(())
}

/// Object body of a remote response; scalars are wrapped under `data`.
fn body_of(value: Value) -> Body {
    match value {
        Value::Object(map) => map,
        Value::Null => Map::new(),
        other => {
            let mut map = Map::new();
            map.insert("data".into(), other);
            map
        }
    }
}

fn set_default(body: &mut Body, key: &str, value: &str) {
    body.entry(key)
        .or_insert_with(|| Value::String(value.to_string()));
}
