//! # shopbot Core
//!
//! Domain types, traits, and error definitions for the shopbot assistant.
//! This crate has **no framework dependencies**: it defines the seams that
//! the transport, model, tool and messaging crates implement against.
//!
//! ## Design Philosophy
//!
//! Every external collaborator is a trait here:
//! - [`Provider`]: the hosted model the agent talks to
//! - [`Tool`]: one capability advertised by the places-search tool server
//! - [`Messenger`]: the chat platform's reply/push delivery API
//! - [`AgentBackend`]: "turn a user query into answer text"
//!
//! Implementations live in their respective crates, so tests can swap any
//! of them for a scripted double.

pub mod agent;
pub mod channel;
pub mod error;
pub mod message;
pub mod provider;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use agent::{AgentBackend, AgentQuery};
pub use channel::Messenger;
pub use error::{Error, Result};
pub use message::{Conversation, Message, Role};
pub use provider::{Provider, ProviderRequest, ProviderResponse};
pub use tool::{Tool, ToolCall, ToolRegistry, ToolResult};
