//! Messenger trait: outbound delivery to the chat platform.
//!
//! The platform offers two ways to send text: a one-shot reply bound to
//! an inbound event's reply token, and an unsolicited push to a user,
//! group or room id. Both need the channel access token, which is
//! resolved per webhook invocation and therefore passed in per call.

use async_trait::async_trait;
use crate::error::ChannelError;

#[async_trait]
pub trait Messenger: Send + Sync {
    /// Platform name used in logs (e.g., "line").
    fn name(&self) -> &str;

    /// Answer an inbound event using its single-use reply token.
    async fn reply(
        &self,
        access_token: &str,
        reply_token: &str,
        text: &str,
    ) -> std::result::Result<(), ChannelError>;

    /// Send a message to a user, group or room id.
    async fn push(
        &self,
        access_token: &str,
        to: &str,
        text: &str,
    ) -> std::result::Result<(), ChannelError>;
}
