//! LINE webhook payload model.
//!
//! Only the fields the assistant acts on are modeled. Events are parsed one
//! at a time from the raw `events[]` array so that one malformed event
//! cannot fail the whole delivery.

use serde::Deserialize;
use serde_json::Value;
use shopbot_core::error::ChannelError;

/// Session key used when the source carries no identifier.
pub const UNKNOWN_SESSION: &str = "unknown";

/// Parse a webhook body into its raw events.
///
/// An empty body counts as `{}`. A missing, null or non-array `events`
/// yields no events. Anything that is not a JSON object is rejected.
pub fn parse_events(body: &str) -> Result<Vec<Value>, ChannelError> {
    if body.trim().is_empty() {
        return Ok(Vec::new());
    }

    let parsed: Value =
        serde_json::from_str(body).map_err(|e| ChannelError::InvalidPayload(e.to_string()))?;
    let Value::Object(mut root) = parsed else {
        return Err(ChannelError::InvalidPayload("body is not a JSON object".into()));
    };

    match root.remove("events") {
        Some(Value::Array(events)) => Ok(events),
        _ => Ok(Vec::new()),
    }
}

/// One element of `events[]`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundEvent {
    #[serde(rename = "type", default)]
    pub kind: Option<String>,

    #[serde(default)]
    pub message: Option<EventMessage>,

    /// Single-use token for one direct reply
    #[serde(default)]
    pub reply_token: Option<String>,

    #[serde(default)]
    pub source: Option<EventSource>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EventMessage {
    #[serde(rename = "type", default)]
    pub kind: Option<String>,

    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventSource {
    #[serde(rename = "type", default)]
    pub kind: Option<String>,

    #[serde(default)]
    pub user_id: Option<String>,

    #[serde(default)]
    pub group_id: Option<String>,

    #[serde(default)]
    pub room_id: Option<String>,
}

/// Where a message came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    /// One-to-one chat with the bot
    User,
    Group,
    Room,
    Unknown,
}

impl SourceKind {
    pub fn is_direct(self) -> bool {
        self == SourceKind::User
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

impl EventSource {
    pub fn kind(&self) -> SourceKind {
        match self.kind.as_deref() {
            Some("user") => SourceKind::User,
            Some("group") => SourceKind::Group,
            Some("room") => SourceKind::Room,
            _ => SourceKind::Unknown,
        }
    }
}

impl InboundEvent {
    pub fn from_value(value: Value) -> Result<Self, ChannelError> {
        serde_json::from_value(value).map_err(|e| ChannelError::InvalidPayload(e.to_string()))
    }

    /// The text of a `message` event carrying a `text` message.
    /// A null or missing text reads as empty.
    pub fn text(&self) -> Option<&str> {
        if self.kind.as_deref() != Some("message") {
            return None;
        }
        let message = self.message.as_ref()?;
        if message.kind.as_deref() != Some("text") {
            return None;
        }
        Some(message.text.as_deref().unwrap_or(""))
    }

    pub fn reply_token(&self) -> Option<&str> {
        non_empty(&self.reply_token)
    }

    pub fn source_kind(&self) -> SourceKind {
        self.source.as_ref().map_or(SourceKind::Unknown, EventSource::kind)
    }

    /// Conversation key: user id, else group id, else room id, else
    /// [`UNKNOWN_SESSION`].
    pub fn session_id(&self) -> String {
        self.source
            .as_ref()
            .and_then(|s| {
                non_empty(&s.user_id)
                    .or_else(|| non_empty(&s.group_id))
                    .or_else(|| non_empty(&s.room_id))
            })
            .unwrap_or(UNKNOWN_SESSION)
            .to_string()
    }

    /// Push target matching the source kind; `None` for unknown sources.
    pub fn push_destination(&self) -> Option<&str> {
        let source = self.source.as_ref()?;
        match source.kind() {
            SourceKind::User => non_empty(&source.user_id),
            SourceKind::Group => non_empty(&source.group_id),
            SourceKind::Room => non_empty(&source.room_id),
            SourceKind::Unknown => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event(value: Value) -> InboundEvent {
        InboundEvent::from_value(value).unwrap()
    }

    #[test]
    fn parse_events_handles_empty_and_missing() {
        assert!(parse_events("").unwrap().is_empty());
        assert!(parse_events("{}").unwrap().is_empty());
        assert!(parse_events(r#"{"events":null}"#).unwrap().is_empty());
        assert!(parse_events(r#"{"events":[]}"#).unwrap().is_empty());
        assert_eq!(parse_events(r#"{"events":[{},{}]}"#).unwrap().len(), 2);
    }

    #[test]
    fn parse_events_rejects_garbage() {
        assert!(matches!(parse_events("not json"), Err(ChannelError::InvalidPayload(_))));
        assert!(parse_events("[1,2]").is_err());
    }

    #[test]
    fn direct_text_message() {
        let ev = event(json!({
            "type": "message",
            "replyToken": "rt-1",
            "source": {"type": "user", "userId": "U1"},
            "message": {"type": "text", "id": "m1", "text": "新宿 ラーメン"}
        }));
        assert_eq!(ev.text(), Some("新宿 ラーメン"));
        assert_eq!(ev.reply_token(), Some("rt-1"));
        assert!(ev.source_kind().is_direct());
        assert_eq!(ev.session_id(), "U1");
        assert_eq!(ev.push_destination(), Some("U1"));
    }

    #[test]
    fn group_message_pushes_to_group_but_keys_session_on_user() {
        let ev = event(json!({
            "type": "message",
            "source": {"type": "group", "groupId": "G1", "userId": "U9"},
            "message": {"type": "text", "text": "@お店 渋谷"}
        }));
        assert_eq!(ev.source_kind(), SourceKind::Group);
        assert_eq!(ev.push_destination(), Some("G1"));
        assert_eq!(ev.session_id(), "U9");
        assert_eq!(ev.reply_token(), None);
    }

    #[test]
    fn room_and_unknown_sources() {
        let room = event(json!({"type": "message", "source": {"type": "room", "roomId": "R1"}}));
        assert_eq!(room.push_destination(), Some("R1"));
        assert_eq!(room.session_id(), "R1");

        let unknown = event(json!({"type": "message"}));
        assert_eq!(unknown.source_kind(), SourceKind::Unknown);
        assert_eq!(unknown.push_destination(), None);
        assert_eq!(unknown.session_id(), UNKNOWN_SESSION);
    }

    #[test]
    fn non_text_events_have_no_text() {
        let sticker = event(json!({"type": "message", "message": {"type": "sticker"}}));
        assert_eq!(sticker.text(), None);

        let follow = event(json!({"type": "follow", "source": {"type": "user", "userId": "U1"}}));
        assert_eq!(follow.text(), None);

        let null_text = event(json!({"type": "message", "message": {"type": "text", "text": null}}));
        assert_eq!(null_text.text(), Some(""));
    }

    #[test]
    fn malformed_event_is_an_error() {
        assert!(InboundEvent::from_value(json!("just a string")).is_err());
        assert!(InboundEvent::from_value(json!({"source": 5})).is_err());
    }
}
