//! Pay-i meter tests against a scripted transport.
//!
//! Every call the meter makes is recorded so the paths, methods, headers and
//! bodies can be checked without a metering service.

use adverstorial_core::{PayiMeter, RoleType, SessionStart, UsageMeter};
use async_trait::async_trait;
use providers::{Error, HttpReply, Provider, Transport, WireRequest, USE_CASE_NAME};
use reqwest::{Method, Url};
use serde_json::json;
use std::sync::Mutex;

/// Replays canned replies in order; runs dry into network errors.
struct CannedTransport {
    replies: Mutex<Vec<Result<HttpReply, Error>>>,
    seen: Mutex<Vec<WireRequest>>,
}

impl CannedTransport {
    fn new(replies: Vec<Result<HttpReply, Error>>) -> Self {
        Self {
            replies: Mutex::new(replies),
            seen: Mutex::new(Vec::new()),
        }
    }

    fn seen(&self) -> Vec<WireRequest> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for CannedTransport {
    async fn send(&self, request: &WireRequest) -> Result<HttpReply, Error> {
        self.seen.lock().unwrap().push(request.clone());
        let mut replies = self.replies.lock().unwrap();
        if replies.is_empty() {
            return Err(Error::Network("connection refused".to_string()));
        }
        replies.remove(0)
    }
}

fn meter(replies: Vec<Result<HttpReply, Error>>) -> PayiMeter<CannedTransport> {
    let api_url = Url::parse("https://api.proxy.test/").unwrap();
    PayiMeter::with_transport(api_url, "pk-test", CannedTransport::new(replies))
}

fn session() -> SessionStart {
    SessionStart {
        game_id: "0f1e2d3c".to_string(),
        protagonist: "openai.gpt-5".to_string(),
        antagonist: "anthropic.claude-3-opus".to_string(),
        rounds: 3,
        seed_prompt: "A lighthouse keeper finds a bottle".to_string(),
        order: [RoleType::Protagonist, RoleType::Antagonist],
    }
}

const SENTINEL_PATH: &str = "/api/v1/categories/adverstorial/resources/sentinel";

#[tokio::test]
async fn test_start_session_creates_missing_sentinel() {
    let meter = meter(vec![
        Ok(HttpReply::new(404, "not found")),
        Ok(HttpReply::new(200, "{}")),
        Ok(HttpReply::new(200, "{}")),
    ]);
    meter.start_session(&session()).await;

    let seen = meter.transport().seen();
    assert_eq!(seen.len(), 3);

    assert_eq!(seen[0].method, Method::GET);
    assert_eq!(seen[0].url.path(), SENTINEL_PATH);
    assert!(seen[0].body.is_null());

    assert_eq!(seen[1].method, Method::POST);
    assert_eq!(seen[1].url.path(), SENTINEL_PATH);
    assert_eq!(seen[1].body["max_input_units"], json!(0));

    let ingest = &seen[2];
    assert_eq!(ingest.method, Method::POST);
    assert_eq!(ingest.url.path(), "/api/v1/ingest");
    assert_eq!(ingest.header("xProxy-UseCase-Name"), Some(USE_CASE_NAME));
    assert_eq!(ingest.header("xProxy-UseCase-ID"), Some("0f1e2d3c"));
    assert_eq!(ingest.body["category"], json!("adverstorial"));
    assert_eq!(ingest.body["resource"], json!("sentinel"));
    assert_eq!(ingest.body["units"], json!({"text": {"input": 1, "output": 1}}));
    assert_eq!(
        ingest.body["use_case_properties"],
        json!({
            "antagonist": "anthropic.claude-3-opus",
            "protagonist": "openai.gpt-5",
            "rounds": "3",
            "seed_prompt": "A lighthouse keeper finds a bottle",
            "order": "protagonist,antagonist"
        })
    );

    for request in &seen {
        assert_eq!(request.header("xProxy-api-key"), Some("pk-test"));
        assert_eq!(request.header("accept"), Some("application/json"));
    }
}

#[tokio::test]
async fn test_start_session_reuses_existing_sentinel() {
    let meter = meter(vec![
        Ok(HttpReply::new(200, r#"{"category":"adverstorial","resource":"sentinel"}"#)),
        Ok(HttpReply::new(200, "{}")),
    ]);
    meter.start_session(&session()).await;

    let seen = meter.transport().seen();
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[0].method, Method::GET);
    assert_eq!(seen[1].url.path(), "/api/v1/ingest");
}

#[tokio::test]
async fn test_resolve_request_id() {
    let meter = meter(vec![Ok(HttpReply::new(
        200,
        r#"{"xproxy_result":{"request_id":"req-42","limits":{}}}"#,
    ))]);

    let id = meter.resolve_request_id(Provider::Anthropic, "msg_01").await;
    assert_eq!(id.as_deref(), Some("req-42"));

    let seen = meter.transport().seen();
    assert_eq!(seen[0].method, Method::GET);
    assert_eq!(
        seen[0].url.path(),
        "/api/v1/requests/provider/system.anthropic/msg_01/result"
    );
}

#[tokio::test]
async fn test_resolve_request_id_failures_are_none() {
    let meter = meter(vec![
        Ok(HttpReply::new(500, "boom")),
        Ok(HttpReply::new(200, r#"{"xproxy_result":{}}"#)),
        Ok(HttpReply::new(200, "not json")),
    ]);

    for _ in 0..3 {
        assert_eq!(meter.resolve_request_id(Provider::OpenAi, "resp_1").await, None);
    }
    // Transport exhausted: a network error is also swallowed.
    assert_eq!(meter.resolve_request_id(Provider::OpenAi, "resp_1").await, None);
}

#[tokio::test]
async fn test_property_puts() {
    let meter = meter(vec![
        Ok(HttpReply::new(200, "{}")),
        Ok(HttpReply::new(200, "{}")),
    ]);
    meter.set_request_property("req-42", "role", "protagonist").await;
    meter
        .set_session_property("0f1e2d3c", "story.title", "The Bottle")
        .await;

    let seen = meter.transport().seen();
    assert_eq!(seen.len(), 2);

    assert_eq!(seen[0].method, Method::PUT);
    assert_eq!(seen[0].url.path(), "/api/v1/requests/req-42/properties");
    assert_eq!(seen[0].body, json!({"properties": {"role": "protagonist"}}));

    assert_eq!(seen[1].method, Method::PUT);
    assert_eq!(
        seen[1].url.path(),
        "/api/v1/use_cases/instances/0f1e2d3c/properties"
    );
    assert_eq!(seen[1].body, json!({"properties": {"story.title": "The Bottle"}}));
}

#[tokio::test]
async fn test_failures_are_only_logged() {
    // No replies at all: every call fails at the network.
    let meter = meter(Vec::new());

    meter.start_session(&session()).await;
    meter.set_request_property("req-1", "role", "antagonist").await;
    meter.set_session_property("g", "system.failure", "network").await;

    let seen = meter.transport().seen();
    // Sentinel GET, sentinel POST, ingest, then the two PUTs.
    assert_eq!(seen.len(), 5);
    assert_eq!(seen[2].url.path(), "/api/v1/ingest");
}

#[tokio::test]
async fn test_error_status_is_swallowed() {
    let meter = meter(vec![
        Ok(HttpReply::new(404, "")),
        Ok(HttpReply::new(403, "forbidden")),
        Ok(HttpReply::new(503, "unavailable")),
        Ok(HttpReply::new(400, "bad property")),
    ]);

    meter.start_session(&session()).await;
    meter.set_request_property("req-1", "role", "antagonist").await;
    assert_eq!(meter.transport().seen().len(), 4);
}
