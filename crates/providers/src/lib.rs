//! Model provider implementations for shopbot.
//!
//! All providers implement the `shopbot_core::Provider` trait.
//! [`build_from_config`] selects one based on `agent.provider`.

pub mod anthropic;
pub mod router;

pub use anthropic::AnthropicProvider;
pub use router::{build_from_config, build_with_credentials};
