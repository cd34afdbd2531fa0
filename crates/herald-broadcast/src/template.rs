//! Per-recipient templating.
//!
//! Replaces `<first_name>`, `<username>`, and `<alias>` placeholders with
//! the recipient's values and re-offsets formatting spans across each
//! substitution so they keep covering the same semantic text. Spans that a
//! substitution mangles are dropped by the final validation pass rather
//! than sent broken.

use herald_core::spans::{self, utf16_len, FormattingSpan};
use herald_core::types::Recipient;

const PLACEHOLDERS: [&str; 3] = ["<first_name>", "<username>", "<alias>"];

fn placeholder_value(name: &str, recipient: &Recipient) -> String {
    match name {
        "<first_name>" => recipient.first_name.clone(),
        "<username>" => recipient.username.clone().unwrap_or_default(),
        "<alias>" => recipient.alias.clone().unwrap_or_default(),
        _ => String::new(),
    }
}

/// Render `text` for one recipient, adapting `spans` to the result.
pub fn render_for_recipient(
    text: &str,
    spans: Option<&[FormattingSpan]>,
    recipient: &Recipient,
) -> (String, Option<Vec<FormattingSpan>>) {
    // Byte positions of every placeholder occurrence, in order.
    let mut occurrences: Vec<(usize, &str)> = PLACEHOLDERS
        .iter()
        .flat_map(|p| text.match_indices(*p).map(|(i, _)| (i, *p)))
        .collect();
    occurrences.sort_by_key(|(i, _)| *i);

    if occurrences.is_empty() {
        return (text.to_string(), spans.map(|s| s.to_vec()));
    }

    let mut rendered = String::with_capacity(text.len());
    // (utf16 start, old utf16 length, new utf16 length) per substitution
    let mut edits: Vec<(i64, i64, i64)> = Vec::with_capacity(occurrences.len());
    let mut last = 0usize;
    for (at, placeholder) in occurrences {
        let value = placeholder_value(placeholder, recipient);
        rendered.push_str(&text[last..at]);
        edits.push((
            utf16_len(&text[..at]),
            utf16_len(placeholder),
            utf16_len(&value),
        ));
        rendered.push_str(&value);
        last = at + placeholder.len();
    }
    rendered.push_str(&text[last..]);

    let adapted = spans.map(|list| {
        list.iter()
            .map(|span| {
                // Shift by the net growth of every edit fully before this span.
                let delta: i64 = edits
                    .iter()
                    .filter(|(start, old, _)| start + old <= span.offset)
                    .map(|(_, old, new)| new - old)
                    .sum();
                span.with_range(span.offset + delta, span.length)
            })
            .collect::<Vec<_>>()
    });

    let valid = spans::validate(adapted, &rendered);
    (rendered, valid)
}
