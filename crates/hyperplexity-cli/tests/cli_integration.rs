//! Integration tests for the CLI commands.
//!
//! These exercise the same code paths as the binary against a mocked
//! Hyperplexity API.

use std::io::Write;

use hyperplexity_cli::commands::{account, call, init_adapter};
use hyperplexity_core::{ClientConfig, ToolName, WorkflowAdapter};
use serde_json::json;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn adapter_for(server: &MockServer) -> WorkflowAdapter {
    init_adapter(&ClientConfig::new("hpx_live_cli", Some(&server.uri()))).unwrap()
}

#[test]
fn test_catalog_lists_every_tool() {
    let catalog = call::catalog();
    let tools = catalog["tools"].as_array().unwrap();
    assert_eq!(tools.len(), ToolName::ALL.len());
    assert!(tools
        .iter()
        .any(|t| t["name"] == "approve_validation" && t["description"].is_string()));
}

#[test]
fn test_missing_api_key_is_a_config_error() {
    let err = ClientConfig::resolve(Some("   ".into()), None, None).unwrap_err();
    assert!(err.to_string().contains("HYPERPLEXITY_API_KEY"));
}

#[tokio::test]
async fn test_call_rejects_invalid_json() {
    let server = MockServer::start().await;
    let err = call::execute(&adapter_for(&server), "get_balance", "{not json")
        .await
        .unwrap_err();
    assert!(err.contains("Invalid JSON params"));
}

#[tokio::test]
async fn test_call_job_status_sends_bearer_key() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/jobs/job_42"))
        .and(header("authorization", "Bearer hpx_live_cli"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "data": {
                "status": "preview_complete",
                "cost_estimate": { "estimated_total_cost_usd": 3.75 }
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let outcome = call::execute(
        &adapter_for(&server),
        "get_job_status",
        r#"{"job_id": "job_42"}"#,
    )
    .await
    .unwrap();
    assert!(!outcome.is_error);
    assert_eq!(outcome.body["status"], "preview_complete");
    assert_eq!(outcome.body["cost_usd"], 3.75);
    let step = &outcome.body["_guidance"]["next_steps"][0];
    assert_eq!(step["tool"], "approve_validation");
    assert_eq!(step["params"]["approved_cost_usd"], 3.75);
}

#[tokio::test]
async fn test_call_upload_reports_missing_file() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("nope.csv");

    let outcome = call::execute(
        &adapter_for(&server),
        "upload_file",
        &json!({ "file_path": missing.display().to_string() }).to_string(),
    )
    .await
    .unwrap();
    assert!(outcome.is_error);
    assert_eq!(outcome.body["error"], "io_error");
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_call_upload_rejects_unknown_extension() {
    let server = MockServer::start().await;
    let mut file = tempfile::Builder::new().suffix(".txt").tempfile().unwrap();
    writeln!(file, "plain text").unwrap();

    let outcome = call::execute(
        &adapter_for(&server),
        "upload_file",
        &json!({ "file_path": file.path().display().to_string() }).to_string(),
    )
    .await
    .unwrap();
    assert!(outcome.is_error);
    assert_eq!(outcome.body["error"], "bad_request");
}

#[tokio::test]
async fn test_balance_outcome_renders_guidance() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/account/balance"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "data": { "balance_usd": 40.0 }
        })))
        .mount(&server)
        .await;

    let outcome = account::balance_outcome(&adapter_for(&server)).await;
    assert!(!outcome.is_error);
    assert_eq!(outcome.body["balance_usd"], 40.0);
    assert!(outcome.body["_guidance"]["summary"]
        .as_str()
        .unwrap()
        .contains("40"));
}

#[tokio::test]
async fn test_transient_failure_is_retryable() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/account/balance"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let outcome = account::balance_outcome(&adapter_for(&server)).await;
    assert!(outcome.is_error);
    assert_eq!(outcome.body["classification"], "transient");
    assert_eq!(outcome.body["retryable"], true);
    assert_eq!(outcome.body["_guidance"]["next_steps"][0]["tool"], "get_balance");
}
