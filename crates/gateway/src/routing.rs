//! Decides whether a text message is a query for the assistant.

use shopbot_channels::SourceKind;

/// What to do with one text message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// Ask the agent this
    Query(String),
    /// Addressed to the bot but empty; answer with the usage hint
    Usage,
    /// Group/room chatter not addressed to the bot
    Ignore,
}

/// Direct chats are always addressed to the bot. Group and room messages
/// must open with one of the trigger prefixes.
#[derive(Debug, Clone)]
pub struct TriggerRules {
    triggers: Vec<String>,
}

impl TriggerRules {
    pub fn new(triggers: Vec<String>) -> Self {
        Self { triggers }
    }

    pub fn from_config(config: &shopbot_config::RoutingConfig) -> Self {
        Self::new(config.triggers.clone())
    }

    pub fn route(&self, source: SourceKind, text: &str) -> Route {
        let text = text.trim();

        let query = if source.is_direct() {
            text
        } else {
            let Some(rest) = self
                .triggers
                .iter()
                .find_map(|trigger| text.strip_prefix(trigger.as_str()))
            else {
                return Route::Ignore;
            };
            rest.trim()
        };

        if query.is_empty() {
            Route::Usage
        } else {
            Route::Query(query.to_string())
        }
    }
}

impl Default for TriggerRules {
    fn default() -> Self {
        Self::from_config(&shopbot_config::RoutingConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direct_chat_uses_whole_text() {
        let rules = TriggerRules::default();
        assert_eq!(
            rules.route(SourceKind::User, "  新宿で安い焼肉  "),
            Route::Query("新宿で安い焼肉".into())
        );
        assert_eq!(
            rules.route(SourceKind::User, "@お店 渋谷"),
            Route::Query("@お店 渋谷".into())
        );
        assert_eq!(rules.route(SourceKind::User, "   "), Route::Usage);
    }

    #[test]
    fn group_requires_trigger() {
        let rules = TriggerRules::default();
        assert_eq!(rules.route(SourceKind::Group, "今日どこ行く？"), Route::Ignore);
        assert_eq!(rules.route(SourceKind::Room, "お店 渋谷"), Route::Ignore);
        assert_eq!(rules.route(SourceKind::Unknown, "渋谷 居酒屋"), Route::Ignore);
    }

    #[test]
    fn both_trigger_widths_are_stripped() {
        let rules = TriggerRules::default();
        assert_eq!(
            rules.route(SourceKind::Group, "@お店 渋谷でデート向き居酒屋"),
            Route::Query("渋谷でデート向き居酒屋".into())
        );
        assert_eq!(
            rules.route(SourceKind::Room, "＠お店　上野 カフェ"),
            Route::Query("上野 カフェ".into())
        );
    }

    #[test]
    fn bare_trigger_asks_for_usage() {
        let rules = TriggerRules::default();
        assert_eq!(rules.route(SourceKind::Group, "@お店"), Route::Usage);
        assert_eq!(rules.route(SourceKind::Group, "  ＠お店   "), Route::Usage);
    }

    #[test]
    fn trigger_must_lead() {
        let rules = TriggerRules::default();
        assert_eq!(rules.route(SourceKind::Group, "ねえ @お店 渋谷"), Route::Ignore);
    }
}
