//! Formatting-span adapter — keeps rich-text spans pointing at the same
//! substrings while the surrounding text is templated, truncated, or
//! prefixed.
//!
//! Every component that rewrites broadcast text (templating, reminder
//! prefixes, display truncation) goes through these functions instead of
//! doing its own offset arithmetic. Offsets and lengths are UTF-16 code
//! units, matching the Telegram entity convention the transport speaks; no
//! grapheme-aware adjustment happens here.

use serde::{Deserialize, Serialize};

/// Length of a string in UTF-16 code units.
pub fn utf16_len(text: &str) -> i64 {
    text.encode_utf16().count() as i64
}

/// What a span marks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpanKind {
    Bold,
    Italic,
    Underline,
    Strikethrough,
    Spoiler,
    Code,
    Pre,
    TextLink,
    TextMention,
    CustomEmoji,
}

/// A rich-text annotation over a text range.
///
/// Payload fields mirror the wire shape: which one is populated depends on
/// `kind` (url for text_link, user_id for text_mention, language for pre,
/// emoji_id for custom_emoji). Spans are independent values; overlapping
/// spans are passed through untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormattingSpan {
    pub offset: i64,
    pub length: i64,
    #[serde(rename = "type")]
    pub kind: SpanKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub emoji_id: Option<String>,
}

impl FormattingSpan {
    /// Plain span with no payload.
    pub fn new(kind: SpanKind, offset: i64, length: i64) -> Self {
        Self {
            offset,
            length,
            kind,
            url: None,
            user_id: None,
            language: None,
            emoji_id: None,
        }
    }

    /// Structural copy at a new position, payload preserved.
    pub fn with_range(&self, offset: i64, length: i64) -> Self {
        Self {
            offset,
            length,
            ..self.clone()
        }
    }
}

/// Shift every span by `delta` code units. Spans pushed to a negative
/// offset are dropped. Empty/absent input and a zero delta are identity.
pub fn shift(spans: Option<Vec<FormattingSpan>>, delta: i64) -> Option<Vec<FormattingSpan>> {
    match spans {
        None => None,
        Some(s) if s.is_empty() || delta == 0 => Some(s),
        Some(s) => {
            let shifted: Vec<_> = s
                .into_iter()
                .filter_map(|span| {
                    let offset = span.offset + delta;
                    (offset >= 0).then(|| span.with_range(offset, span.length))
                })
                .collect();
            (!shifted.is_empty()).then_some(shifted)
        }
    }
}

/// Re-fit spans after `original` was cut down to `truncated`.
///
/// Spans starting inside the truncated text keep their offset (plus
/// `extra_offset`, for when the truncated text lands inside a larger
/// message) and get their length clipped to the truncated end. Spans
/// starting past the truncated text are dropped, as are spans that clip to
/// nothing.
pub fn adapt_for_truncation(
    spans: Option<&[FormattingSpan]>,
    original: &str,
    truncated: &str,
    extra_offset: i64,
) -> Option<Vec<FormattingSpan>> {
    let spans = spans?;
    if spans.is_empty() || truncated.is_empty() {
        return None;
    }
    let trunc_len = utf16_len(truncated);
    debug_assert!(trunc_len <= utf16_len(original));

    let adapted: Vec<_> = spans
        .iter()
        .filter_map(|span| {
            if span.offset < 0 || span.offset >= trunc_len {
                return None;
            }
            let length = span.length.min(trunc_len - span.offset);
            (length > 0).then(|| span.with_range(span.offset + extra_offset, length))
        })
        .collect();
    (!adapted.is_empty()).then_some(adapted)
}

/// Keep only spans that lie fully inside `text`.
pub fn validate(spans: Option<Vec<FormattingSpan>>, text: &str) -> Option<Vec<FormattingSpan>> {
    let spans = spans?;
    if text.is_empty() {
        return None;
    }
    let len = utf16_len(text);
    let valid: Vec<_> = spans
        .into_iter()
        .filter(|s| s.offset >= 0 && s.length > 0 && s.offset + s.length <= len)
        .collect();
    (!valid.is_empty()).then_some(valid)
}
