//! Parsing of enumerated model answers ("1: ...", "2: ...") into ordered
//! fields.
//!
//! Generation prompts ask the model to number its answers, but real answers
//! are frequently malformed: missing labels, surrounding prose, reordered
//! items. Parsing is total; each item degrades independently to "NA".

use std::sync::LazyLock;

use regex::Regex;

use crate::model::NA;

/// Candidate label: a run of digits immediately followed by ':'. Tokens whose
/// digit run continues a word ("x1:") are rejected in `tokenize_labels`;
/// greedy digit matching already keeps "1:" from matching inside "10:".
static LABEL_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+):").expect("static label pattern compiles"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct LabelToken {
    ordinal: usize,
    label_start: usize,
    value_start: usize,
}

fn tokenize_labels(text: &str) -> Vec<LabelToken> {
    LABEL_PATTERN
        .captures_iter(text)
        .filter_map(|captures| {
            let whole = captures.get(0)?;
            let digits = captures.get(1)?;

            let preceded_by_word = text[..whole.start()]
                .chars()
                .next_back()
                .is_some_and(|ch| ch.is_alphanumeric() || ch == '_');
            if preceded_by_word {
                return None;
            }

            let ordinal = digits.as_str().parse::<usize>().ok()?;
            Some(LabelToken {
                ordinal,
                label_start: whole.start(),
                value_start: whole.end(),
            })
        })
        .collect()
}

/// Splits an enumerated answer into exactly `expected` fields.
///
/// Field `i` spans from after the first "i:" label to the first "i+1:" label
/// that follows it; the last expected field runs to the end of the answer.
/// A missing label or an empty span yields "NA". Always returns `expected`
/// values and never fails: a malformed answer must degrade per item, not
/// abort the document.
pub fn parse_enumerated(text: &str, expected: usize) -> Vec<String> {
    let tokens = tokenize_labels(text);
    let mut values = Vec::with_capacity(expected);

    for ordinal in 1..=expected {
        let Some(token) = tokens.iter().find(|token| token.ordinal == ordinal) else {
            values.push(NA.to_string());
            continue;
        };

        let end = if ordinal == expected {
            text.len()
        } else {
            tokens
                .iter()
                .find(|next| next.ordinal == ordinal + 1 && next.label_start >= token.value_start)
                .map(|next| next.label_start)
                .unwrap_or(text.len())
        };

        let span = text[token.value_start..end].trim();
        values.push(if span.is_empty() {
            NA.to_string()
        } else {
            span.to_string()
        });
    }

    values
}
