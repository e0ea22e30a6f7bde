//! Warm tool-client lifecycle.
//!
//! Starting the tool server and enumerating its tools is the slow part of
//! answering a query, so the runtime keeps one initialized bundle (tool
//! client, registry, bound agent loop) across requests and rebuilds it
//! only when it goes stale or a caller forces it after a failure.
//!
//! ```text
//! UNINITIALIZED ──ensure_ready──▶ READY ──(age ≥ refresh_after)──▶ stale
//!                                   ▲                                 │
//!                                   └──────── REINITIALIZING ◀────────┘
//! ```

use shopbot_core::error::Result;
use shopbot_core::provider::Provider;
use shopbot_tools::{ToolClient, ToolConnector, registry_from_client};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::loop_runner::AgentLoop;
use crate::prompt::SYSTEM_PROMPT;

/// Model parameters applied to every agent loop the runtime builds.
#[derive(Debug, Clone)]
pub struct LoopSettings {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub max_iterations: u32,
    pub system_prompt: String,
}

impl LoopSettings {
    pub fn from_config(config: &shopbot_config::AgentConfig) -> Self {
        Self {
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            max_iterations: config.max_iterations,
            system_prompt: SYSTEM_PROMPT.to_string(),
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }
}

/// One fully initialized generation of warm state. Replaced as a whole.
struct RuntimeBundle {
    client: Arc<dyn ToolClient>,
    agent: Arc<AgentLoop>,
    initialized_at: Instant,
}

/// Point-in-time view of the runtime for status reporting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeStatus {
    pub ready: bool,
    pub age: Option<Duration>,
    pub tool_names: Vec<String>,
    pub initializations: u64,
}

pub struct AgentRuntime {
    connector: Arc<dyn ToolConnector>,
    provider: Arc<dyn Provider>,
    settings: LoopSettings,
    refresh_after: Duration,
    state: Mutex<Option<RuntimeBundle>>,
    initializations: AtomicU64,
}

impl AgentRuntime {
    pub fn new(
        connector: Arc<dyn ToolConnector>,
        provider: Arc<dyn Provider>,
        settings: LoopSettings,
    ) -> Self {
        Self {
            connector,
            provider,
            settings,
            refresh_after: Duration::from_secs(900),
            state: Mutex::new(None),
            initializations: AtomicU64::new(0),
        }
    }

    /// Maximum age of a bundle before the next `ensure_ready` rebuilds it.
    pub fn with_refresh_after(mut self, refresh_after: Duration) -> Self {
        self.refresh_after = refresh_after;
        self
    }

    pub fn refresh_after(&self) -> Duration {
        self.refresh_after
    }

    /// Make sure a fresh bundle is in place.
    ///
    /// Without `force` this is a no-op while the current bundle is younger
    /// than `refresh_after`. On failure the error propagates and whatever
    /// bundle was there before stays in place.
    pub async fn ensure_ready(&self, force: bool) -> Result<()> {
        let mut state = self.state.lock().await;
        self.ensure_locked(&mut state, force).await.map(|_| ())
    }

    /// The agent loop of the current bundle, initializing first if needed.
    pub async fn agent(&self) -> Result<Arc<AgentLoop>> {
        let mut state = self.state.lock().await;
        self.ensure_locked(&mut state, false).await
    }

    pub async fn status(&self) -> RuntimeStatus {
        let state = self.state.lock().await;
        let initializations = self.initializations.load(Ordering::Relaxed);
        match state.as_ref() {
            Some(bundle) => RuntimeStatus {
                ready: true,
                age: Some(bundle.initialized_at.elapsed()),
                tool_names: bundle.agent.tools().names().into_iter().map(String::from).collect(),
                initializations,
            },
            None => RuntimeStatus {
                ready: false,
                age: None,
                tool_names: Vec::new(),
                initializations,
            },
        }
    }

    /// Close the tool client and forget the bundle.
    pub async fn shutdown(&self) {
        let mut state = self.state.lock().await;
        if let Some(bundle) = state.take() {
            if let Err(e) = bundle.client.close().await {
                warn!(server = %bundle.client.name(), error = %e, "Tool client close failed");
            }
        }
    }

    async fn ensure_locked(
        &self,
        state: &mut Option<RuntimeBundle>,
        force: bool,
    ) -> Result<Arc<AgentLoop>> {
        if !force {
            if let Some(bundle) = state.as_ref() {
                if bundle.initialized_at.elapsed() < self.refresh_after {
                    return Ok(bundle.agent.clone());
                }
                debug!(age_secs = bundle.initialized_at.elapsed().as_secs(), "Warm runtime is stale");
            }
        }

        if let Some(bundle) = state.as_ref() {
            if let Err(e) = bundle.client.close().await {
                warn!(server = %bundle.client.name(), error = %e, "Ignoring tool client close failure");
            }
        }

        info!(force, "Initializing tool client and agent");
        let fresh = self.build().await?;
        let agent = fresh.agent.clone();
        *state = Some(fresh);
        self.initializations.fetch_add(1, Ordering::Relaxed);
        Ok(agent)
    }

    async fn build(&self) -> Result<RuntimeBundle> {
        let client = self.connector.connect().await?;

        let registry = match registry_from_client(client.clone()).await {
            Ok(registry) => registry,
            Err(e) => {
                if let Err(close_err) = client.close().await {
                    debug!(error = %close_err, "Close after failed tool listing");
                }
                return Err(e.into());
            }
        };
        info!(server = %client.name(), tools = registry.len(), "Tool server ready");

        let agent = AgentLoop::new(
            self.provider.clone(),
            self.settings.model.clone(),
            self.settings.temperature,
            Arc::new(registry),
            self.settings.system_prompt.clone(),
        )
        .with_max_iterations(self.settings.max_iterations)
        .with_max_tokens(self.settings.max_tokens);

        Ok(RuntimeBundle {
            client,
            agent: Arc::new(agent),
            initialized_at: Instant::now(),
        })
    }
}
