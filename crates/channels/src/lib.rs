//! LINE channel for shopbot.
//!
//! - [`event`]: the inbound webhook payload model
//! - [`line`]: reply/push delivery through the Messaging API, plus
//!   webhook signature checks
//! - [`truncate`]: the outbound text cap

pub mod event;
pub mod line;
pub mod truncate;

pub use event::{InboundEvent, SourceKind, parse_events};
pub use line::{LineMessenger, verify_signature};
pub use truncate::{TRUNCATION_SUFFIX, truncate_text};
