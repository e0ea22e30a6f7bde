//! Agent backend abstraction.
//!
//! The webhook layer only needs "query in, answer text out". Whether that
//! answer comes from an in-process agent loop with a warm tool connection
//! or from a remotely hosted agent runtime is the backend's business.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use crate::error::Result;

/// One question for the agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentQuery {
    /// The user's request, already stripped of any trigger phrase
    pub text: String,

    /// Conversation key (user, group or room id; "unknown" if none)
    pub session_id: String,
}

impl AgentQuery {
    pub fn new(text: impl Into<String>, session_id: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            session_id: session_id.into(),
        }
    }
}

#[async_trait]
pub trait AgentBackend: Send + Sync {
    /// Backend name used in logs (e.g., "local", "hosted").
    fn name(&self) -> &str;

    /// Produce answer text for the query.
    async fn invoke(&self, query: &AgentQuery) -> Result<String>;

    /// Drop any warm state and rebuild it. Backends without warm state
    /// keep the default no-op.
    async fn reinitialize(&self) -> Result<()> {
        Ok(())
    }

    /// Release warm state before the process exits.
    async fn shutdown(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Canned;

    #[async_trait]
    impl AgentBackend for Canned {
        fn name(&self) -> &str {
            "canned"
        }

        async fn invoke(&self, query: &AgentQuery) -> Result<String> {
            Ok(format!("{}:{}", query.session_id, query.text))
        }
    }

    #[tokio::test]
    async fn default_reinitialize_is_noop() {
        let backend = Canned;
        backend.reinitialize().await.unwrap();
        backend.shutdown().await;
        let out = backend.invoke(&AgentQuery::new("カフェ", "U1")).await.unwrap();
        assert_eq!(out, "U1:カフェ");
    }
}
