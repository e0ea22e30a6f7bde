//! HTTP gateway for the LINE webhook.
//!
//! Routes:
//! - `GET /health`: liveness
//! - `POST /webhook`: raw LINE webhook body
//! - `POST /lambda`: API-Gateway-style proxy envelope
//!   (`{body, isBase64Encoded}` in, `{statusCode, body}` out)
//!
//! Built on Axum. Every route shares one [`Dispatcher`], so deliveries are
//! processed one at a time.

pub mod dispatcher;
pub mod routing;

pub use dispatcher::{DispatchOutcome, Dispatcher};
pub use routing::{Route, TriggerRules};

use axum::body::Bytes;
use axum::extract::DefaultBodyLimit;
use axum::{
    Router,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::Json,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use shopbot_channels::LineMessenger;
use shopbot_channels::line::SIGNATURE_HEADER;
use shopbot_security::SecretProvider;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Shared application state for the gateway.
pub struct GatewayState {
    pub dispatcher: Arc<Dispatcher>,
    /// Secret name of the channel secret; `None` disables signature checks
    pub channel_secret_name: Option<String>,
}

type SharedState = Arc<GatewayState>;

/// Build the Axum router with all gateway routes.
pub fn build_router(state: SharedState, max_body_bytes: usize) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/webhook", post(webhook_handler))
        .route("/lambda", post(lambda_handler))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the gateway HTTP server.
///
/// Secrets, the LINE messenger and the agent backend are built once and
/// shared by every request. The tool server is not started until the
/// first query arrives.
pub async fn start(config: shopbot_config::AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let addr = format!("{}:{}", config.gateway.host, config.gateway.port);

    let secrets = Arc::new(SecretProvider::from_config(&config));
    let messenger = Arc::new(LineMessenger::from_config(&config.line));
    let backend = shopbot_agent::build_backend(&config, secrets.clone()).await?;
    info!(backend = %backend.name(), store_mode = secrets.is_store_mode(), "Agent backend ready");

    let dispatcher = Arc::new(Dispatcher::new(&config, secrets, messenger, backend.clone()));
    let state = Arc::new(GatewayState {
        dispatcher,
        channel_secret_name: config.line.channel_secret_name.clone(),
    });

    let app = build_router(state, config.gateway.max_body_bytes);

    info!(addr = %addr, "Gateway listening");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Gateway stopped, closing the agent backend");
    backend.shutdown().await;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
}

// --- Handlers ---

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

fn status_of(outcome: &DispatchOutcome) -> StatusCode {
    StatusCode::from_u16(outcome.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

/// Check `X-Line-Signature` when a channel secret is configured.
async fn check_signature(
    state: &GatewayState,
    headers: &HeaderMap,
    body: &[u8],
) -> Result<(), (StatusCode, String)> {
    let Some(name) = &state.channel_secret_name else {
        return Ok(());
    };

    let secret = state.dispatcher.secrets().get_secret(name).await.map_err(|e| {
        error!(secret = %name, error = %e, "Channel secret is missing");
        (StatusCode::INTERNAL_SERVER_ERROR, format!("{name} is missing"))
    })?;

    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    if shopbot_channels::verify_signature(&secret, body, signature) {
        Ok(())
    } else {
        warn!("Rejected webhook with a bad or missing signature");
        Err((StatusCode::UNAUTHORIZED, "Invalid signature".into()))
    }
}

async fn webhook_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, String) {
    if let Err(rejection) = check_signature(&state, &headers, &body).await {
        return rejection;
    }

    let Ok(text) = std::str::from_utf8(&body) else {
        warn!("Webhook body is not UTF-8");
        let outcome = state.dispatcher.reject_unreadable().await;
        return (status_of(&outcome), outcome.body);
    };

    let outcome = state.dispatcher.handle(text, false).await;
    (status_of(&outcome), outcome.body)
}

/// API Gateway proxy event, reduced to what the dispatcher reads.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LambdaEvent {
    #[serde(default)]
    body: Option<String>,
    #[serde(default)]
    is_base64_encoded: bool,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
struct LambdaResponse {
    status_code: u16,
    body: String,
}

impl From<DispatchOutcome> for LambdaResponse {
    fn from(outcome: DispatchOutcome) -> Self {
        Self {
            status_code: outcome.status,
            body: outcome.body,
        }
    }
}

async fn lambda_handler(State(state): State<SharedState>, body: Bytes) -> Json<LambdaResponse> {
    let event: LambdaEvent = match serde_json::from_slice(&body) {
        Ok(event) => event,
        Err(e) => {
            warn!(error = %e, "Unreadable proxy envelope");
            return Json(state.dispatcher.reject_unreadable().await.into());
        }
    };

    let inner = event.body.unwrap_or_default();
    let outcome = state.dispatcher.handle(&inner, event.is_base64_encoded).await;
    Json(outcome.into())
}
