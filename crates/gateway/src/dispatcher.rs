//! Webhook dispatcher: one LINE delivery in, replies and pushes out.
//!
//! For each text message addressed to the bot:
//!
//! 1. reply immediately with an acknowledgment (the reply token expires
//!    quickly and can only be used once);
//! 2. ask the agent, with one forced reinitialization and retry on failure;
//! 3. push the answer (or an apology) to the originating chat.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde_json::Value;
use shopbot_channels::{InboundEvent, parse_events};
use shopbot_config::{AppConfig, MessagesConfig};
use shopbot_core::agent::{AgentBackend, AgentQuery};
use shopbot_core::channel::Messenger;
use shopbot_security::SecretProvider;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::routing::{Route, TriggerRules};

/// Status code and plain-text body for one delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchOutcome {
    pub status: u16,
    pub body: String,
}

impl DispatchOutcome {
    fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn ok() -> Self {
        Self::new(200, "OK")
    }

    pub fn invalid_body() -> Self {
        Self::new(400, "Invalid body")
    }
}

/// What happened to a single event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventOutcome {
    /// Not a text message, or not addressed to the bot
    Skipped,
    /// Empty query; usage hint sent if possible
    UsageHint,
    /// Answer (or apology) pushed
    Answered,
    /// Answer produced but there was nowhere to push it
    Dropped,
    /// The event could not be read
    Malformed,
}

pub struct Dispatcher {
    secrets: Arc<SecretProvider>,
    messenger: Arc<dyn Messenger>,
    backend: Arc<dyn AgentBackend>,
    rules: TriggerRules,
    messages: MessagesConfig,
    access_token_secret: String,
    /// One delivery at a time per process.
    gate: Mutex<()>,
}

impl Dispatcher {
    pub fn new(
        config: &AppConfig,
        secrets: Arc<SecretProvider>,
        messenger: Arc<dyn Messenger>,
        backend: Arc<dyn AgentBackend>,
    ) -> Self {
        Self {
            secrets,
            messenger,
            backend,
            rules: TriggerRules::from_config(&config.routing),
            messages: config.messages.clone(),
            access_token_secret: config.line.access_token_secret.clone(),
            gate: Mutex::new(()),
        }
    }

    pub fn secrets(&self) -> &Arc<SecretProvider> {
        &self.secrets
    }

    pub fn backend(&self) -> &Arc<dyn AgentBackend> {
        &self.backend
    }

    /// Process one webhook delivery.
    pub async fn handle(&self, body: &str, is_base64_encoded: bool) -> DispatchOutcome {
        let _serial = self.gate.lock().await;

        let access_token = match self.access_token().await {
            Ok(token) => token,
            Err(outcome) => return outcome,
        };

        let decoded;
        let body = if is_base64_encoded {
            decoded = match decode_base64(body) {
                Some(text) => text,
                None => {
                    error!("Error parsing body: invalid base64 or UTF-8");
                    return DispatchOutcome::invalid_body();
                }
            };
            decoded.as_str()
        } else {
            body
        };

        let events = match parse_events(body) {
            Ok(events) => events,
            Err(e) => {
                error!(error = %e, "Error parsing body");
                return DispatchOutcome::invalid_body();
            }
        };

        if events.is_empty() {
            debug!("No events in body");
            return DispatchOutcome::ok();
        }

        info!(events = events.len(), "Webhook delivery received");
        for raw in events {
            let outcome = self.handle_event(&access_token, raw).await;
            debug!(?outcome, "Event handled");
        }

        DispatchOutcome::ok()
    }

    /// Outcome for a request whose body could not even be read. The access
    /// token is still checked first, so a missing token wins over a bad body.
    pub async fn reject_unreadable(&self) -> DispatchOutcome {
        if let Err(outcome) = self.access_token().await {
            return outcome;
        }
        DispatchOutcome::invalid_body()
    }

    async fn access_token(&self) -> Result<String, DispatchOutcome> {
        self.secrets
            .get_secret(&self.access_token_secret)
            .await
            .map_err(|e| {
                error!(secret = %self.access_token_secret, error = %e, "Access token is missing");
                DispatchOutcome::new(500, format!("{} is missing", self.access_token_secret))
            })
    }

    async fn handle_event(&self, access_token: &str, raw: Value) -> EventOutcome {
        let event = match InboundEvent::from_value(raw) {
            Ok(event) => event,
            Err(e) => {
                warn!(error = %e, "Skipping unreadable event");
                return EventOutcome::Malformed;
            }
        };

        let Some(text) = event.text() else {
            return EventOutcome::Skipped;
        };

        let source = event.source_kind();
        let reply_token = event.reply_token();
        debug!(?source, has_reply_token = reply_token.is_some(), "Text message");

        let query = match self.rules.route(source, text) {
            Route::Ignore => {
                debug!("Trigger not matched in group/room, ignoring");
                return EventOutcome::Skipped;
            }
            Route::Usage => {
                if let Some(token) = reply_token {
                    let hint = if source.is_direct() {
                        &self.messages.usage_direct
                    } else {
                        &self.messages.usage_group
                    };
                    self.reply(access_token, token, hint).await;
                }
                return EventOutcome::UsageHint;
            }
            Route::Query(query) => query,
        };

        if let Some(token) = reply_token {
            self.reply(access_token, token, &self.messages.ack).await;
        }

        let answer = self.ask(AgentQuery::new(query, event.session_id())).await;

        match event.push_destination() {
            Some(to) => {
                if let Err(e) = self.messenger.push(access_token, to, &answer).await {
                    warn!(error = %e, "Push failed");
                }
                EventOutcome::Answered
            }
            None => {
                warn!("Push destination not found; cannot push result");
                EventOutcome::Dropped
            }
        }
    }

    /// Invoke the agent; on failure reinitialize once and retry, then
    /// fall back to the apology text.
    async fn ask(&self, query: AgentQuery) -> String {
        let first = match self.backend.invoke(&query).await {
            Ok(answer) => return answer,
            Err(e) => e,
        };
        error!(backend = %self.backend.name(), error = %first, "Agent error");

        info!("Retrying with forced reinitialization");
        let retried = match self.backend.reinitialize().await {
            Ok(()) => self.backend.invoke(&query).await,
            Err(e) => Err(e),
        };

        match retried {
            Ok(answer) => answer,
            Err(e) => {
                error!(backend = %self.backend.name(), error = %e, "Retry failed");
                self.messages.apology.clone()
            }
        }
    }

    async fn reply(&self, access_token: &str, reply_token: &str, text: &str) {
        if let Err(e) = self.messenger.reply(access_token, reply_token, text).await {
            warn!(error = %e, "Reply failed");
        }
    }
}

fn decode_base64(body: &str) -> Option<String> {
    let bytes = STANDARD.decode(body.trim()).ok()?;
    String::from_utf8(bytes).ok()
}
