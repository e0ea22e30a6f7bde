//! Error types for the shopbot domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant.

use thiserror::Error;

/// The top-level error type for all shopbot operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Provider errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Channel errors ---
    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    // --- Tool errors ---
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Shorthand for a configuration error (missing secret, bad setting).
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Malformed response: {0}")]
    InvalidResponse(String),
}

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("Message delivery failed to {channel}: {reason}")]
    DeliveryFailed { channel: String, reason: String },

    #[error("Invalid webhook payload: {0}")]
    InvalidPayload(String),
}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Tool provider not configured: {0}")]
    NotConfigured(String),

    #[error("Tool timed out: {tool_name} after {timeout_secs}s")]
    Timeout { tool_name: String, timeout_secs: u64 },

    #[error("Tool transport failure: {0}")]
    Transport(String),

    #[error("Tool protocol error: {0}")]
    Protocol(String),

    /// The server answered with a JSON-RPC error
    #[error("Tool server rejected the request: {0}")]
    Rejected(String),

    #[error("Invalid tool arguments: {0}")]
    InvalidArguments(String),
}

impl ToolError {
    /// The tool server connection itself is unusable (dropped, hung or
    /// speaking garbage), as opposed to one call going wrong.
    pub fn is_connection_failure(&self) -> bool {
        matches!(
            self,
            ToolError::Transport(_) | ToolError::Timeout { .. } | ToolError::Protocol(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_error_displays_correctly() {
        let err = Error::Provider(ProviderError::ApiError {
            status_code: 429,
            message: "Too many requests".into(),
        });
        assert!(err.to_string().contains("429"));
        assert!(err.to_string().contains("Too many requests"));
    }

    #[test]
    fn tool_error_displays_correctly() {
        let err = Error::Tool(ToolError::Timeout {
            tool_name: "maps_search_places".into(),
            timeout_secs: 30,
        });
        assert!(err.to_string().contains("maps_search_places"));
        assert!(err.to_string().contains("30s"));
    }

    #[test]
    fn connection_failures_are_distinguished_from_call_failures() {
        assert!(ToolError::Transport("server closed connection".into()).is_connection_failure());
        assert!(ToolError::Protocol("response id mismatch".into()).is_connection_failure());
        assert!(
            ToolError::Timeout {
                tool_name: "tools/call".into(),
                timeout_secs: 30
            }
            .is_connection_failure()
        );
        assert!(!ToolError::NotFound("maps_unknown".into()).is_connection_failure());
        assert!(!ToolError::InvalidArguments("query".into()).is_connection_failure());
        assert!(!ToolError::NotConfigured("GOOGLE_MAPS_API_KEY".into()).is_connection_failure());
        assert!(!ToolError::Rejected("error -32602: Invalid params".into()).is_connection_failure());
    }

    #[test]
    fn config_shorthand() {
        let err = Error::config("GOOGLE_MAPS_API_KEY is required");
        assert!(matches!(err, Error::Config { .. }));
        assert!(err.to_string().contains("GOOGLE_MAPS_API_KEY"));
    }
}
