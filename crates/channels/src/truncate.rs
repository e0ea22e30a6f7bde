//! Outbound text length cap.

use std::borrow::Cow;

/// Appended to text that was cut to fit the cap.
pub const TRUNCATION_SUFFIX: &str = "\n...(長いので省略)";

/// Characters reserved at the end of a truncated message.
const RESERVED: usize = 20;

/// Cap `text` at `max` characters (Unicode scalar values).
///
/// Oversized text keeps its first `max - 20` characters followed by
/// [`TRUNCATION_SUFFIX`]. The result never exceeds `max`; caps too small
/// to hold the suffix get a plain cut.
pub fn truncate_text(text: &str, max: usize) -> Cow<'_, str> {
    if text.chars().count() <= max {
        return Cow::Borrowed(text);
    }

    let keep = max.saturating_sub(RESERVED);
    if keep + TRUNCATION_SUFFIX.chars().count() > max {
        return Cow::Owned(text.chars().take(max).collect());
    }

    let mut out: String = text.chars().take(keep).collect();
    out.push_str(TRUNCATION_SUFFIX);
    Cow::Owned(out)
}
