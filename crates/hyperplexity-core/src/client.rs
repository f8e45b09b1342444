//! HyperplexityClient: thin `reqwest` wrapper for the Hyperplexity API.
//!
//! Auth:     `Authorization: Bearer <hpx_live_...>`
//! Success:  `{"success": true, "data": {...}}`, unwrapped to `data`.
//! Failure:  `{"success": false, "error": {"code": "...", "message": "..."}}`
//!
//! Presigned object-storage URLs and metadata downloads go through a second
//! client without the `Authorization` header; presigned PUTs are rejected
//! when it is present.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde_json::Value;

use crate::config::ClientConfig;
use crate::error::{HpxError, HpxResult};

/// Timeout for downloading `table_metadata.json` from a presigned URL.
pub const METADATA_FETCH_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Clone)]
pub struct HyperplexityClient {
    http: reqwest::Client,
    raw: reqwest::Client,
    base_url: String,
}

impl HyperplexityClient {
    pub fn new(config: &ClientConfig) -> HpxResult<Self> {
        let base = reqwest::Url::parse(&config.base_url).map_err(|e| {
            HpxError::Config(format!("API URL {:?} is not valid: {}", config.base_url, e))
        })?;
        if !matches!(base.scheme(), "http" | "https") {
            return Err(HpxError::Config(format!(
                "API URL {:?} must start with http:// or https://",
                config.base_url
            )));
        }

        let mut auth = HeaderValue::from_str(&format!("Bearer {}", config.api_key))
            .map_err(|e| HpxError::Config(format!("API key is not a valid header value: {}", e)))?;
        auth.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, auth);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(config.timeout)
            .build()
            .map_err(|e| HpxError::Config(format!("Failed to build HTTP client: {}", e)))?;
        let raw = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| HpxError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            raw,
            base_url: config.base_url.clone(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub async fn get(&self, path: &str, query: &[(&str, String)]) -> HpxResult<Value> {
        tracing::debug!("[Hyperplexity] GET {} {:?}", path, query);
        let mut request = self.http.get(self.url(path));
        if !query.is_empty() {
            request = request.query(query);
        }
        let resp = request.send().await?;
        check(resp).await
    }

    pub async fn post(&self, path: &str, body: &Value) -> HpxResult<Value> {
        tracing::debug!("[Hyperplexity] POST {}", path);
        let resp = self.http.post(self.url(path)).json(body).send().await?;
        check(resp).await
    }

    /// PUT raw bytes to a presigned upload URL (no auth header).
    pub async fn put_raw(&self, url: &str, bytes: Vec<u8>, content_type: &str) -> HpxResult<()> {
        tracing::debug!("[Hyperplexity] PUT presigned ({} bytes)", bytes.len());
        let resp = self
            .raw
            .put(url)
            .header(CONTENT_TYPE, content_type)
            .body(bytes)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(HpxError::from_remote(
                status.as_u16(),
                None,
                format!("Presigned upload failed with HTTP {}: {}", status, truncate(&text)),
            ));
        }
        Ok(())
    }

    /// GET an absolute URL (e.g. a presigned metadata link) and parse it as JSON.
    pub async fn fetch_json(&self, url: &str, timeout: Duration) -> HpxResult<Value> {
        let resp = self.raw.get(url).timeout(timeout).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(HpxError::from_remote(
                status.as_u16(),
                None,
                format!("Download failed with HTTP {}", status),
            ));
        }
        Ok(resp.json::<Value>().await?)
    }
}

/// Parse the body first so the real error message survives non-2xx responses.
async fn check(resp: reqwest::Response) -> HpxResult<Value> {
    let status = resp.status();
    let text = resp.text().await?;
    let body: Option<Value> = serde_json::from_str(&text).ok();

    if let Some(Value::Object(map)) = &body {
        if map.get("success").and_then(|v| v.as_bool()) == Some(false) {
            let err = map.get("error").or_else(|| map.get("message"));
            return Err(match err {
                Some(Value::Object(err)) => {
                    let code = err.get("code").and_then(|v| v.as_str()).map(str::to_string);
                    let message = err
                        .get("message")
                        .and_then(|v| v.as_str())
                        .unwrap_or("unknown error");
                    HpxError::from_remote(
                        status.as_u16(),
                        code.clone(),
                        format!(
                            "Hyperplexity API error [{}]: {}",
                            code.as_deref().unwrap_or(""),
                            message
                        ),
                    )
                }
                Some(Value::String(msg)) => HpxError::from_remote(
                    status.as_u16(),
                    None,
                    format!("Hyperplexity API error: {}", msg),
                ),
                _ => HpxError::from_remote(
                    status.as_u16(),
                    None,
                    "Hyperplexity API error: API returned success=false".into(),
                ),
            });
        }
    }

    if !status.is_success() {
        return Err(HpxError::from_remote(
            status.as_u16(),
            None,
            format!("Hyperplexity API error {}: {}", status.as_u16(), truncate(&text)),
        ));
    }

    match body {
        Some(Value::Object(mut map)) if map.contains_key("data") => {
            Ok(map.remove("data").unwrap_or(Value::Null))
        }
        Some(other) => Ok(other),
        None => Err(HpxError::Decode(format!(
            "Hyperplexity API returned a non-JSON body: {}",
            truncate(&text)
        ))),
    }
}

fn truncate(text: &str) -> String {
    text.chars().take(500).collect()
}
