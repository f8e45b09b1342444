//! Blocking waits, progress reporting and the message stream.

use std::sync::Mutex as StdMutex;
use std::time::Duration;

use hyperplexity_core::adapter::GetConversationRequest;
use hyperplexity_core::adapter::GetJobMessagesRequest;
use hyperplexity_core::models::{ConversationStatus, JobStatus};
use hyperplexity_core::poll::{job_messages, wait_for_conversation, wait_for_job};
use hyperplexity_core::{
    dispatch, ClientConfig, ErrorClass, ProgressSink, SessionContext, WaitOptions,
    WorkflowAdapter,
};
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tokio_stream::StreamExt;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn ok(data: Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({ "success": true, "data": data }))
}

fn adapter_for(server: &MockServer) -> WorkflowAdapter {
    let config = ClientConfig::new("hpx_live_test", Some(&server.uri()));
    WorkflowAdapter::from_config(&config).unwrap()
}

fn fast(timeout_ms: u64) -> WaitOptions {
    WaitOptions {
        timeout: Duration::from_millis(timeout_ms),
        poll_interval: Duration::from_millis(10),
        expected: Duration::from_secs(1),
    }
}

#[derive(Default)]
struct Recorder(StdMutex<Vec<(f64, Option<String>)>>);

impl ProgressSink for Recorder {
    fn report(&self, progress: f64, message: Option<&str>) {
        self.0
            .lock()
            .unwrap()
            .push((progress, message.map(str::to_string)));
    }
}

impl Recorder {
    fn values(&self) -> Vec<f64> {
        self.0.lock().unwrap().iter().map(|(p, _)| *p).collect()
    }

    fn messages(&self) -> Vec<String> {
        self.0
            .lock()
            .unwrap()
            .iter()
            .filter_map(|(_, m)| m.clone())
            .collect()
    }
}

async fn mount_status(server: &MockServer, data: Value, times: Option<u64>) {
    let mock = Mock::given(method("GET"))
        .and(path("/jobs/job_1"))
        .respond_with(ok(data));
    match times {
        Some(n) => mock.up_to_n_times(n).mount(server).await,
        None => mock.mount(server).await,
    }
}

async fn mount_messages(server: &MockServer, since_seq: Option<&str>, messages: Value) {
    let mock = Mock::given(method("GET")).and(path("/jobs/job_1/messages"));
    match since_seq {
        Some(seq) => {
            mock.and(query_param("since_seq", seq))
                .respond_with(ok(json!({ "messages": messages })))
                .with_priority(1)
                .mount(server)
                .await
        }
        None => {
            mock.respond_with(ok(json!({ "messages": messages })))
                .mount(server)
                .await
        }
    }
}

#[tokio::test]
async fn test_wait_for_job_splits_phases_and_finishes_at_100() {
    let server = MockServer::start().await;
    let adapter = adapter_for(&server);
    let ctx = Mutex::new(SessionContext::new());

    // A stale 100% from an earlier phase sits at the head of the log.
    mount_messages(
        &server,
        None,
        json!([{ "_seq": 1, "message_data": { "progress": 100 } }]),
    )
    .await;
    mount_messages(
        &server,
        Some("1"),
        json!([{ "_seq": 2, "message_data": { "progress": 50 } }]),
    )
    .await;
    mount_status(&server, json!({ "status": "processing" }), Some(1)).await;
    mount_status(
        &server,
        json!({ "status": "completed", "current_step": "Table Making" }),
        Some(1),
    )
    .await;
    mount_status(
        &server,
        json!({
            "status": "preview_complete",
            "cost_estimate": { "estimated_total_cost_usd": 1.5 }
        }),
        None,
    )
    .await;

    let sink = Recorder::default();
    let waited = wait_for_job(&adapter, &ctx, "job_1", fast(5_000), &sink)
        .await
        .unwrap();
    assert!(!waited.timed_out);
    let last = waited.last.unwrap();
    assert_eq!(last.status, Some(JobStatus::PreviewComplete));
    assert_eq!(last.cost_usd, Some(1.5));

    let values = sink.values();
    assert!(values[0] < 10.0);
    assert!(values.windows(2).all(|w| w[0] <= w[1]), "{values:?}");
    assert_eq!(values.last().copied(), Some(100.0));
    assert!(sink.messages().iter().any(|m| m == "Table Making"));
    assert_eq!(
        ctx.lock().await.job("job_1").and_then(|j| j.status),
        Some(JobStatus::PreviewComplete)
    );
}

#[tokio::test]
async fn test_wait_for_job_times_out_with_last_status() {
    let server = MockServer::start().await;
    let adapter = adapter_for(&server);
    let ctx = Mutex::new(SessionContext::new());
    mount_messages(&server, None, json!([])).await;
    mount_status(&server, json!({ "status": "processing" }), None).await;

    let sink = Recorder::default();
    let waited = wait_for_job(&adapter, &ctx, "job_1", fast(60), &sink)
        .await
        .unwrap();
    assert!(waited.timed_out);
    assert_eq!(
        waited.last.and_then(|s| s.status),
        Some(JobStatus::PreviewPending)
    );
    assert!(sink.values().iter().all(|p| *p < 100.0));
}

#[tokio::test]
async fn test_wait_for_job_rides_out_transient_errors() {
    let server = MockServer::start().await;
    let adapter = adapter_for(&server);
    let ctx = Mutex::new(SessionContext::new());
    // No messages endpoint mounted: its 404s only produce warnings.
    Mock::given(method("GET"))
        .and(path("/jobs/job_1"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    mount_status(&server, json!({ "status": "failed", "error": "bad sheet" }), None).await;

    let waited = wait_for_job(&adapter, &ctx, "job_1", fast(5_000), &Recorder::default())
        .await
        .unwrap();
    assert_eq!(
        waited.last.and_then(|s| s.status),
        Some(JobStatus::Failed)
    );
}

#[tokio::test]
async fn test_wait_for_job_stops_on_auth_failure() {
    let server = MockServer::start().await;
    let adapter = adapter_for(&server);
    let ctx = Mutex::new(SessionContext::new());
    mount_messages(&server, None, json!([])).await;
    Mock::given(method("GET"))
        .and(path("/jobs/job_1"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;

    let err = wait_for_job(&adapter, &ctx, "job_1", fast(5_000), &Recorder::default())
        .await
        .unwrap_err();
    assert_eq!(err.class(), ErrorClass::Auth);
}

#[tokio::test]
async fn test_wait_for_conversation_returns_on_question() {
    let server = MockServer::start().await;
    let adapter = adapter_for(&server);
    let ctx = Mutex::new(SessionContext::new());
    Mock::given(method("GET"))
        .and(path("/conversations/conv_1"))
        .respond_with(ok(json!({ "status": "processing" })))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/conversations/conv_1"))
        .respond_with(ok(json!({
            "status": "processing",
            "user_reply_needed": true,
            "last_ai_message": { "content": "Should I include subsidiaries?" }
        })))
        .mount(&server)
        .await;

    let sink = Recorder::default();
    let waited = wait_for_conversation(
        &adapter,
        &ctx,
        GetConversationRequest {
            conversation_id: "conv_1".into(),
            session_id: Some("sess_1".into()),
        },
        fast(5_000),
        &sink,
    )
    .await
    .unwrap();
    let snapshot = waited.last.unwrap();
    assert_eq!(snapshot.status, ConversationStatus::AwaitingReply);
    assert_eq!(
        snapshot.last_message.as_deref(),
        Some("Should I include subsidiaries?")
    );
    let values = sink.values();
    assert!(values.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(values.last().copied(), Some(100.0));
}

#[tokio::test]
async fn test_dispatched_wait_reports_timeout() {
    let server = MockServer::start().await;
    let adapter = adapter_for(&server);
    let ctx = Mutex::new(SessionContext::new());
    mount_messages(&server, None, json!([])).await;
    mount_status(&server, json!({ "status": "queued" }), None).await;

    let outcome = dispatch(
        &adapter,
        &ctx,
        "wait_for_job",
        json!({ "job_id": "job_1", "timeout_seconds": 1, "poll_interval": 1 }),
        &Recorder::default(),
    )
    .await;
    assert!(!outcome.is_error);
    assert_eq!(outcome.body["status"], "preview_pending");
    assert!(outcome.body["_wait_timeout"].is_string());
}

#[tokio::test]
async fn test_messages_drain_once_after_terminal_status() {
    let server = MockServer::start().await;
    let adapter = adapter_for(&server);
    let mut ctx = SessionContext::new();
    mount_status(&server, json!({ "status": "completed" }), None).await;
    Mock::given(method("GET"))
        .and(path("/jobs/job_1/messages"))
        .respond_with(ok(json!({
            "messages": [{ "_seq": 7, "message_type": "status", "message_data": { "progress": 100 } }]
        })))
        .expect(2)
        .mount(&server)
        .await;

    adapter.get_job_status(&mut ctx, "job_1").await.unwrap();
    let page = adapter
        .get_job_messages(
            &mut ctx,
            GetJobMessagesRequest {
                job_id: "job_1".into(),
                since_seq: None,
            },
        )
        .await
        .unwrap();
    assert_eq!(page.messages.len(), 1);
    assert_eq!(page.last_seq, Some(7));

    let drained = adapter
        .get_job_messages(
            &mut ctx,
            GetJobMessagesRequest {
                job_id: "job_1".into(),
                since_seq: None,
            },
        )
        .await
        .unwrap();
    assert!(drained.messages.is_empty());
    assert_eq!(drained.last_seq, Some(7));

    let reread = adapter
        .get_job_messages(
            &mut ctx,
            GetJobMessagesRequest {
                job_id: "job_1".into(),
                since_seq: Some(0),
            },
        )
        .await
        .unwrap();
    assert_eq!(reread.messages.len(), 1);
}

#[tokio::test]
async fn test_message_stream_ends_after_terminal_drain() {
    let server = MockServer::start().await;
    let adapter = adapter_for(&server);
    mount_messages(
        &server,
        None,
        json!([{ "_seq": 1, "message_type": "log" }, { "_seq": 2, "message_type": "log" }]),
    )
    .await;
    mount_messages(&server, Some("2"), json!([{ "_seq": 3, "message_type": "log" }])).await;
    mount_messages(&server, Some("3"), json!([])).await;
    mount_status(&server, json!({ "status": "processing" }), Some(1)).await;
    mount_status(&server, json!({ "status": "completed" }), None).await;

    let stream = job_messages(&adapter, "job_1", Duration::from_millis(10));
    tokio::pin!(stream);
    let mut seqs = Vec::new();
    while let Some(message) = stream.next().await {
        seqs.push(message.unwrap().seq);
    }
    assert_eq!(seqs, vec![Some(1), Some(2), Some(3)]);
}
