//! LINE Messaging API delivery.
//!
//! Two independent sends, neither retried:
//! - **reply**: `POST /v2/bot/message/reply`, consumes the event's
//!   single-use reply token.
//! - **push**: `POST /v2/bot/message/push` to a user, group or room id.
//!
//! Text is truncated to the configured cap before sending.

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde_json::json;
use shopbot_core::channel::Messenger;
use shopbot_core::error::ChannelError;
use std::time::Duration;
use tracing::{info, warn};

use crate::truncate::truncate_text;

pub const CHANNEL_NAME: &str = "line";

/// Header carrying the base64 HMAC-SHA256 of the raw body.
pub const SIGNATURE_HEADER: &str = "x-line-signature";

pub struct LineMessenger {
    client: reqwest::Client,
    api_base: String,
    max_text_len: usize,
}

impl LineMessenger {
    pub fn new(api_base: impl Into<String>, max_text_len: usize, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .expect("Failed to build HTTP client"),
            api_base: api_base.into().trim_end_matches('/').to_string(),
            max_text_len,
        }
    }

    pub fn from_config(config: &shopbot_config::LineConfig) -> Self {
        Self::new(
            config.api_base.clone(),
            config.max_text_len,
            Duration::from_secs(config.timeout_secs),
        )
    }

    async fn post(
        &self,
        kind: &str,
        access_token: &str,
        body: serde_json::Value,
    ) -> Result<(), ChannelError> {
        let url = format!("{}/v2/bot/message/{kind}", self.api_base);
        let failed = |reason: String| ChannelError::DeliveryFailed {
            channel: CHANNEL_NAME.into(),
            reason,
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(access_token)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                warn!(kind, error = %e, "LINE request failed");
                failed(e.to_string())
            })?;

        let status = response.status();
        info!(kind, status = status.as_u16(), "LINE response");

        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            warn!(kind, status = status.as_u16(), body = %text, "LINE rejected message");
            return Err(failed(format!("{kind} returned {status}: {text}")));
        }
        Ok(())
    }

    fn messages(&self, text: &str) -> serde_json::Value {
        json!([{ "type": "text", "text": truncate_text(text, self.max_text_len) }])
    }
}

#[async_trait]
impl Messenger for LineMessenger {
    fn name(&self) -> &str {
        CHANNEL_NAME
    }

    async fn reply(
        &self,
        access_token: &str,
        reply_token: &str,
        text: &str,
    ) -> Result<(), ChannelError> {
        let body = json!({ "replyToken": reply_token, "messages": self.messages(text) });
        self.post("reply", access_token, body).await
    }

    async fn push(&self, access_token: &str, to: &str, text: &str) -> Result<(), ChannelError> {
        let body = json!({ "to": to, "messages": self.messages(text) });
        self.post("push", access_token, body).await
    }
}

/// Check an `X-Line-Signature` header against the channel secret.
///
/// Uses constant-time comparison.
pub fn verify_signature(channel_secret: &str, body: &[u8], signature: &str) -> bool {
    use hmac::{Hmac, Mac};
    use sha2::Sha256;

    let Ok(provided) = STANDARD.decode(signature.trim()) else {
        return false;
    };

    let mut mac = Hmac::<Sha256>::new_from_slice(channel_secret.as_bytes())
        .expect("HMAC accepts any key length");
    mac.update(body);
    mac.verify_slice(&provided).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Json, Router, extract::State, http::HeaderMap, http::StatusCode, routing::post};
    use std::sync::{Arc, Mutex};

    type Seen = Arc<Mutex<Vec<(String, Option<String>, serde_json::Value)>>>;

    fn record(seen: &Seen, path: &str, headers: &HeaderMap, body: serde_json::Value) {
        let auth = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .map(String::from);
        seen.lock().unwrap().push((path.into(), auth, body));
    }

    async fn on_reply(
        State(seen): State<Seen>,
        headers: HeaderMap,
        Json(body): Json<serde_json::Value>,
    ) -> StatusCode {
        record(&seen, "reply", &headers, body);
        StatusCode::OK
    }

    async fn on_push(
        State(seen): State<Seen>,
        headers: HeaderMap,
        Json(body): Json<serde_json::Value>,
    ) -> StatusCode {
        record(&seen, "push", &headers, body);
        StatusCode::OK
    }

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}")
    }

    async fn fake_line() -> (String, Seen) {
        let seen: Seen = Arc::default();
        let router = Router::new()
            .route("/v2/bot/message/reply", post(on_reply))
            .route("/v2/bot/message/push", post(on_push))
            .with_state(seen.clone());
        (serve(router).await, seen)
    }

    #[tokio::test]
    async fn reply_posts_token_and_text() {
        let (base, seen) = fake_line().await;
        let line = LineMessenger::new(base, 4500, Duration::from_secs(5));

        line.reply("tok", "rt-1", "少々お待ちください").await.unwrap();

        let seen = seen.lock().unwrap();
        let (path, auth, body) = &seen[0];
        assert_eq!(path, "reply");
        assert_eq!(auth.as_deref(), Some("Bearer tok"));
        assert_eq!(body["replyToken"], "rt-1");
        assert_eq!(body["messages"][0]["type"], "text");
        assert_eq!(body["messages"][0]["text"], "少々お待ちください");
    }

    #[tokio::test]
    async fn push_truncates_long_text() {
        let (base, seen) = fake_line().await;
        let line = LineMessenger::new(base, 30, Duration::from_secs(5));

        line.push("tok", "G1", &"長".repeat(100)).await.unwrap();

        let seen = seen.lock().unwrap();
        let (path, _, body) = &seen[0];
        assert_eq!(path, "push");
        assert_eq!(body["to"], "G1");
        let text = body["messages"][0]["text"].as_str().unwrap();
        assert!(text.chars().count() <= 30);
        assert!(text.ends_with(crate::truncate::TRUNCATION_SUFFIX));
    }

    #[tokio::test]
    async fn non_success_status_is_delivery_failure() {
        let router = Router::new().route(
            "/v2/bot/message/push",
            post(|| async { (StatusCode::BAD_REQUEST, r#"{"message":"Invalid to"}"#) }),
        );
        let line = LineMessenger::new(serve(router).await, 4500, Duration::from_secs(5));

        let err = line.push("tok", "nobody", "hi").await.unwrap_err();
        match err {
            ChannelError::DeliveryFailed { channel, reason } => {
                assert_eq!(channel, "line");
                assert!(reason.contains("400"));
                assert!(reason.contains("Invalid to"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn unreachable_api_is_delivery_failure() {
        let line = LineMessenger::new("http://127.0.0.1:1", 4500, Duration::from_secs(2));
        let err = line.reply("tok", "rt", "hi").await.unwrap_err();
        assert!(matches!(err, ChannelError::DeliveryFailed { .. }));
    }

    #[test]
    fn signature_round_trip() {
        use hmac::{Hmac, Mac};
        use sha2::Sha256;

        let body = br#"{"events":[]}"#;
        let mut mac = Hmac::<Sha256>::new_from_slice(b"channel-secret").unwrap();
        mac.update(body);
        let signature = STANDARD.encode(mac.finalize().into_bytes());

        assert!(verify_signature("channel-secret", body, &signature));
        assert!(!verify_signature("other-secret", body, &signature));
        assert!(!verify_signature("channel-secret", b"tampered", &signature));
        assert!(!verify_signature("channel-secret", body, "%%%not-base64"));
    }
}
