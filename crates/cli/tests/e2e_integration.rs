//! End-to-end tests for the webhook pipeline.
//!
//! Each test runs the real gateway router, dispatcher, agent runtime, MCP
//! client and LINE messenger. Only the outside world is faked: a local
//! LINE Messaging API, a local MCP server speaking JSON over HTTP, and a
//! scripted model provider.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::body::Body;
use axum::http::{HeaderMap, Request, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router, extract::State};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;

use shopbot_agent::{AgentRuntime, LocalAgentBackend, LoopSettings};
use shopbot_channels::LineMessenger;
use shopbot_config::{AppConfig, McpOAuthConfig, McpTransportKind};
use shopbot_core::error::ProviderError;
use shopbot_core::message::{Message, MessageToolCall, Role};
use shopbot_core::provider::{Provider, ProviderRequest, ProviderResponse};
use shopbot_gateway::{Dispatcher, GatewayState, build_router};
use shopbot_security::{EnvSource, SecretProvider};
use shopbot_tools::McpConnector;

// ── Fake LINE Messaging API ─────────────────────────────────────────────

#[derive(Debug, Clone)]
struct Sent {
    kind: &'static str,
    body: Value,
}

impl Sent {
    fn text(&self) -> &str {
        self.body["messages"][0]["text"].as_str().unwrap_or_default()
    }
}

type LineLog = Arc<Mutex<Vec<Sent>>>;

async fn line_reply(State(log): State<LineLog>, Json(body): Json<Value>) -> StatusCode {
    log.lock().unwrap().push(Sent { kind: "reply", body });
    StatusCode::OK
}

async fn line_push(State(log): State<LineLog>, Json(body): Json<Value>) -> StatusCode {
    log.lock().unwrap().push(Sent { kind: "push", body });
    StatusCode::OK
}

// ── Fake MCP server ─────────────────────────────────────────────────────

type McpLog = Arc<Mutex<Vec<String>>>;

#[derive(Clone)]
struct FakeMcp {
    log: McpLog,
    /// Answer the first `tools/call` with HTTP 502, as a dying gateway would.
    fail_first_call: bool,
}

const GATEWAY_TOKEN: &str = "gw-token";

async fn token_endpoint() -> Json<Value> {
    Json(json!({"access_token": GATEWAY_TOKEN, "token_type": "Bearer", "expires_in": 3600}))
}

async fn mcp_endpoint(
    State(mcp): State<FakeMcp>,
    headers: HeaderMap,
    Json(message): Json<Value>,
) -> Response {
    let authorized = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == format!("Bearer {GATEWAY_TOKEN}"));
    if !authorized {
        return StatusCode::UNAUTHORIZED.into_response();
    }

    let method = message["method"].as_str().unwrap_or_default().to_string();
    let calls_so_far = {
        let mut log = mcp.log.lock().unwrap();
        log.push(method.clone());
        log.iter().filter(|m| *m == "tools/call").count()
    };

    if method == "tools/call" && mcp.fail_first_call && calls_so_far == 1 {
        return (StatusCode::BAD_GATEWAY, "upstream closed").into_response();
    }

    let Some(id) = message.get("id").cloned() else {
        return StatusCode::ACCEPTED.into_response();
    };

    let result = match method.as_str() {
        "initialize" => json!({
            "protocolVersion": "2024-11-05",
            "capabilities": {"tools": {}},
            "serverInfo": {"name": "fake-maps", "version": "0.0.1"}
        }),
        "tools/list" => json!({
            "tools": [{
                "name": "maps_search_places",
                "description": "Search for places using Google Places API",
                "inputSchema": {
                    "type": "object",
                    "properties": {"query": {"type": "string"}},
                    "required": ["query"]
                }
            }]
        }),
        "tools/call" => json!({
            "content": [{
                "type": "text",
                "text": "カフェ静寂 ★4.5 渋谷区神南1-2-3"
            }],
            "isError": false
        }),
        other => {
            return Json(json!({
                "jsonrpc": "2.0",
                "id": id,
                "error": {"code": -32601, "message": format!("unknown method {other}")}
            }))
            .into_response();
        }
    };

    Json(json!({"jsonrpc": "2.0", "id": id, "result": result})).into_response()
}

// ── Scripted model ──────────────────────────────────────────────────────

/// Replays the same search-then-answer turn for every query.
struct SearchingProvider {
    answer: String,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl SearchingProvider {
    fn new(answer: &str) -> Self {
        Self {
            answer: answer.into(),
            requests: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait::async_trait]
impl Provider for SearchingProvider {
    fn name(&self) -> &str {
        "e2e_mock"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let has_tool_result = request
            .messages
            .last()
            .is_some_and(|m| m.role == Role::Tool);
        self.requests.lock().unwrap().push(request);

        let message = if has_tool_result {
            Message::assistant(self.answer.as_str())
        } else {
            let mut msg = Message::assistant("");
            msg.tool_calls.push(MessageToolCall {
                id: "call_1".into(),
                name: "maps_search_places".into(),
                arguments: r#"{"query":"渋谷 静かなカフェ"}"#.into(),
            });
            msg
        };

        Ok(ProviderResponse {
            message,
            usage: None,
            model: "e2e-model".into(),
            stop_reason: None,
        })
    }
}

// ── Harness ─────────────────────────────────────────────────────────────

async fn spawn(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

struct Harness {
    app: Router,
    config: AppConfig,
    line: LineLog,
    mcp: McpLog,
    provider: Arc<SearchingProvider>,
}

impl Harness {
    async fn start(env: &[(&str, &str)]) -> Self {
        Self::start_with(env, false).await
    }

    async fn start_with(env: &[(&str, &str)], fail_first_call: bool) -> Self {
        let line: LineLog = Arc::default();
        let line_base = spawn(
            Router::new()
                .route("/v2/bot/message/reply", post(line_reply))
                .route("/v2/bot/message/push", post(line_push))
                .with_state(line.clone()),
        )
        .await;

        let mcp: McpLog = Arc::default();
        let mcp_base = spawn(
            Router::new()
                .route("/mcp", post(mcp_endpoint))
                .route("/oauth2/token", post(token_endpoint))
                .with_state(FakeMcp {
                    log: mcp.clone(),
                    fail_first_call,
                }),
        )
        .await;

        let mut config = AppConfig::default();
        config.line.api_base = line_base;
        config.mcp.transport = McpTransportKind::Http;
        config.mcp.url = Some(format!("{mcp_base}/mcp"));
        config.mcp.oauth = Some(McpOAuthConfig {
            token_url: format!("{mcp_base}/oauth2/token"),
            client_id: "shopbot".into(),
            client_secret_secret: "MCP_CLIENT_SECRET".into(),
            scope: Some("lineshopbot-gateway/invoke".into()),
        });

        let env: HashMap<String, String> = env
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let secrets = Arc::new(SecretProvider::from_env(Arc::new(env) as Arc<dyn EnvSource>));

        let provider = Arc::new(SearchingProvider::new(
            "おすすめ: カフェ静寂 (渋谷区神南)\n静かで作業向きです。",
        ));
        let connector = Arc::new(McpConnector::new(config.mcp.clone(), secrets.clone()));
        let runtime = Arc::new(AgentRuntime::new(
            connector,
            provider.clone(),
            LoopSettings::from_config(&config.agent),
        ));
        let backend = Arc::new(LocalAgentBackend::new(runtime));
        let messenger = Arc::new(LineMessenger::from_config(&config.line));

        let dispatcher = Arc::new(Dispatcher::new(&config, secrets, messenger, backend));
        let state = Arc::new(GatewayState {
            dispatcher,
            channel_secret_name: None,
        });

        Self {
            app: build_router(state, config.gateway.max_body_bytes),
            config,
            line,
            mcp,
            provider,
        }
    }

    async fn post(&self, path: &str, body: String) -> (StatusCode, String) {
        let response = self
            .app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(path)
                    .header("content-type", "application/json")
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, String::from_utf8_lossy(&bytes).into_owned())
    }

    fn sent(&self) -> Vec<Sent> {
        self.line.lock().unwrap().clone()
    }

    fn mcp_calls(&self, method: &str) -> usize {
        self.mcp.lock().unwrap().iter().filter(|m| *m == method).count()
    }
}

const FULL_ENV: &[(&str, &str)] = &[
    ("CHANNEL_ACCESS_TOKEN", "line-token"),
    ("MCP_CLIENT_SECRET", "gateway-secret"),
];

fn direct_message(text: &str) -> String {
    json!({
        "events": [{
            "type": "message",
            "replyToken": "rt-direct",
            "source": {"type": "user", "userId": "U1"},
            "message": {"type": "text", "id": "m1", "text": text}
        }]
    })
    .to_string()
}

fn group_message(text: &str) -> String {
    json!({
        "events": [{
            "type": "message",
            "replyToken": "rt-group",
            "source": {"type": "group", "groupId": "G1", "userId": "U2"},
            "message": {"type": "text", "id": "m2", "text": text}
        }]
    })
    .to_string()
}

// ── Tests ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn direct_query_is_acknowledged_then_answered_by_push() {
    let h = Harness::start(FULL_ENV).await;

    let (status, body) = h.post("/webhook", direct_message("渋谷で静かなカフェ")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "OK");

    let sent = h.sent();
    assert_eq!(sent.len(), 2);

    assert_eq!(sent[0].kind, "reply");
    assert_eq!(sent[0].body["replyToken"], "rt-direct");
    assert_eq!(sent[0].text(), h.config.messages.ack);

    assert_eq!(sent[1].kind, "push");
    assert_eq!(sent[1].body["to"], "U1");
    assert!(sent[1].text().contains("カフェ静寂"));

    assert_eq!(h.mcp_calls("initialize"), 1);
    assert_eq!(h.mcp_calls("notifications/initialized"), 1);
    assert_eq!(h.mcp_calls("tools/call"), 1);

    let requests = h.provider.requests.lock().unwrap();
    assert_eq!(requests.len(), 2);
    assert!(requests[0].messages[1].content.contains("渋谷で静かなカフェ"));
    assert_eq!(requests[0].tools[0].name, "maps_search_places");
    let tool_turn = requests[1].messages.last().unwrap();
    assert_eq!(tool_turn.role, Role::Tool);
    assert!(tool_turn.content.contains("神南"));
}

#[tokio::test]
async fn untriggered_group_chatter_is_ignored() {
    let h = Harness::start(FULL_ENV).await;

    let (status, _) = h.post("/webhook", group_message("hello")).await;
    assert_eq!(status, StatusCode::OK);

    assert!(h.sent().is_empty());
    assert!(h.mcp.lock().unwrap().is_empty());
    assert!(h.provider.requests.lock().unwrap().is_empty());
}

#[tokio::test]
async fn bare_group_trigger_gets_usage_hint_only() {
    let h = Harness::start(FULL_ENV).await;

    let (status, _) = h.post("/webhook", group_message("@お店 ")).await;
    assert_eq!(status, StatusCode::OK);

    let sent = h.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].kind, "reply");
    assert_eq!(sent[0].text(), h.config.messages.usage_group);
    assert_eq!(h.mcp_calls("tools/call"), 0);
}

#[tokio::test]
async fn triggered_group_query_pushes_to_group() {
    let h = Harness::start(FULL_ENV).await;

    h.post("/webhook", group_message("＠お店　渋谷で静かなカフェ")).await;

    let sent = h.sent();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[1].kind, "push");
    assert_eq!(sent[1].body["to"], "G1");

    let requests = h.provider.requests.lock().unwrap();
    let prompt = &requests[0].messages[1].content;
    assert!(prompt.contains("渋谷で静かなカフェ"));
    assert!(!prompt.contains("お店　"));
}

#[tokio::test]
async fn unreachable_tools_end_in_apology() {
    // No gateway client secret, so every connect fails before touching the server.
    let h = Harness::start(&[("CHANNEL_ACCESS_TOKEN", "line-token")]).await;

    let (status, _) = h.post("/webhook", direct_message("新宿 ラーメン")).await;
    assert_eq!(status, StatusCode::OK);

    let sent = h.sent();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0].text(), h.config.messages.ack);
    assert_eq!(sent[1].kind, "push");
    assert_eq!(sent[1].text(), h.config.messages.apology);
    assert!(h.mcp.lock().unwrap().is_empty());
}

#[tokio::test]
async fn failed_tool_call_reconnects_and_retries_once() {
    let h = Harness::start_with(FULL_ENV, true).await;

    let (status, _) = h.post("/webhook", direct_message("渋谷で静かなカフェ")).await;
    assert_eq!(status, StatusCode::OK);

    let sent = h.sent();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[1].kind, "push");
    assert!(sent[1].text().contains("カフェ静寂"));
    assert_ne!(sent[1].text(), h.config.messages.apology);

    assert_eq!(h.mcp_calls("initialize"), 2);
    assert_eq!(h.mcp_calls("tools/list"), 2);
    assert_eq!(h.mcp_calls("tools/call"), 2);
}

#[tokio::test]
async fn tool_session_is_reused_across_deliveries() {
    let h = Harness::start(FULL_ENV).await;

    h.post("/webhook", direct_message("渋谷で静かなカフェ")).await;
    h.post("/webhook", direct_message("上野で静かなカフェ")).await;

    assert_eq!(h.sent().iter().filter(|s| s.kind == "push").count(), 2);
    assert_eq!(h.mcp_calls("initialize"), 1);
    assert_eq!(h.mcp_calls("tools/list"), 1);
    assert_eq!(h.mcp_calls("tools/call"), 2);
}

#[tokio::test]
async fn proxy_envelope_with_base64_body() {
    let h = Harness::start(FULL_ENV).await;

    let envelope = json!({
        "body": STANDARD.encode(direct_message("渋谷で静かなカフェ")),
        "isBase64Encoded": true
    });
    let (status, body) = h.post("/lambda", envelope.to_string()).await;
    assert_eq!(status, StatusCode::OK);

    let response: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(response["statusCode"], 200);
    assert_eq!(response["body"], "OK");
    assert_eq!(h.sent().len(), 2);
}

#[tokio::test]
async fn missing_access_token_is_server_error() {
    let h = Harness::start(&[("MCP_CLIENT_SECRET", "gateway-secret")]).await;

    let (status, body) = h.post("/webhook", direct_message("渋谷")).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body.contains("CHANNEL_ACCESS_TOKEN"));
    assert!(h.sent().is_empty());
}

#[tokio::test]
async fn invalid_json_is_bad_request() {
    let h = Harness::start(FULL_ENV).await;

    let (status, body) = h.post("/webhook", "{not json".into()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, "Invalid body");
    assert!(h.sent().is_empty());
}
