//! Prompt text for the shop-search assistant.

use shopbot_security::SecretProvider;
use tracing::{info, warn};

/// Default system prompt bound to every agent loop.
pub const SYSTEM_PROMPT: &str = "あなたはお店検索アシスタントです。
ユーザーの要望（場所・ジャンル・予算・時間帯・人数・雰囲気）を不足があれば質問して確認し、
Google Maps の情報を使って候補を提案してください。
日本語で丁寧に、箇条書きで分かりやすく返答してください。
Markdown記法（#, *, -, >, ``` など）は一切使用しないでください。
回答内は全て改行してください。
";

/// Map link template the model is asked to fill in.
pub const MAP_LINK_TEMPLATE: &str = "https://www.google.com/maps/place/?q=place_id:PLACE_ID";

/// Wrap the user's request with the fixed output format: three candidates
/// with name, distance, price tier, one highlight and a map link, then one
/// or two narrowing questions.
pub fn format_query_prompt(user_text: &str) -> String {
    format!(
        "ユーザーの依頼:
{user_text}

出力フォーマット:
- 店名
- 距離(目安)
- 価格帯(目安)
- おすすめポイント(1つ)
- googlemap上のリンク
を3件
- 最後に「もっと絞り込む質問」を1〜2個
googlemap上のリンクは以下の形式で出力してください。
{MAP_LINK_TEMPLATE}
"
    )
}

/// The system prompt stored at `param`, or [`SYSTEM_PROMPT`] when no
/// parameter is configured or the lookup fails.
pub async fn resolve_system_prompt(secrets: &SecretProvider, param: Option<&str>) -> String {
    let Some(path) = param else {
        return SYSTEM_PROMPT.to_string();
    };
    match secrets.get_parameter(path).await {
        Ok(prompt) if !prompt.trim().is_empty() => {
            info!(param = %path, "Loaded system prompt from parameter store");
            prompt
        }
        Ok(_) => {
            warn!(param = %path, "Stored system prompt is empty, using default");
            SYSTEM_PROMPT.to_string()
        }
        Err(e) => {
            warn!(param = %path, error = %e, "Failed to get system prompt, using default");
            SYSTEM_PROMPT.to_string()
        }
    }
}
