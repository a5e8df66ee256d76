//! Outbound message classification: raw bytes + directive labels -> rendering decision.

use serde::Serialize;
use thiserror::Error;

use super::labels::{extract_labels, LabelKind};

/// Coarse length limit on the message body after labels are stripped.
///
/// The platform applies its own limit after entity parsing, so this is an approximation:
/// markdown that renders shorter may still be rejected here.
pub const MAX_MESSAGE_CHARS: usize = 4096;

/// Placeholder sent for a body that is empty after label stripping.
pub const EMPTY_PLACEHOLDER: &str = "_empty_";

const MARKDOWN_SPECIAL: &[char] = &[
    '_', '*', '[', ']', '(', ')', '~', '`', '>', '#', '+', '-', '=', '|', '{', '}', '.', '!', '\\',
];

/// Why a message was dropped. Every error implies the message is not sent.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ClassifyError {
    #[error("invalid message: not a valid UTF-8 string")]
    InvalidEncoding,
    #[error("message too long: {0} characters (max 4096)")]
    MessageTooLong(usize),
}

/// A single inline button: callback id and display text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Button {
    pub id: String,
    pub text: String,
}

/// Rendering decision for one outbound message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Classification {
    /// Nothing is to be sent; `text` is empty.
    pub ignore: bool,
    pub text: String,
    pub is_markdown: bool,
    pub for_update: bool,
    /// Rows of buttons, in directive order. Rows are never empty.
    pub buttons: Vec<Vec<Button>>,
}

impl Classification {
    fn ignored() -> Self {
        Self {
            ignore: true,
            ..Self::default()
        }
    }
}

/// Backslash-escape every markdown special character.
pub fn escape_markdown(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if MARKDOWN_SPECIAL.contains(&c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Split a callback value into (id, display text) at the first whitespace run.
fn callback_button(value: &str) -> Button {
    match value.find(char::is_whitespace) {
        Some(idx) if idx > 0 => Button {
            id: value[..idx].to_string(),
            text: value[idx..].trim().to_string(),
        },
        _ => Button {
            id: value.to_string(),
            text: value.to_string(),
        },
    }
}

fn push_row(grid: &mut Vec<Vec<Button>>, row: &mut Vec<Button>) {
    if !row.is_empty() {
        grid.push(std::mem::take(row));
    }
}

/// Classify a raw outbound payload.
///
/// A lone `.` is a no-op sentinel and yields an ignorable result. An `Err` means the message
/// is dropped without a send attempt.
pub fn classify(data: &[u8]) -> Result<Classification, ClassifyError> {
    let text = std::str::from_utf8(data).map_err(|_| ClassifyError::InvalidEncoding)?;
    if text.trim() == "." {
        return Ok(Classification::ignored());
    }

    let (labels, body) = extract_labels(text);
    let len = body.chars().count();
    if len > MAX_MESSAGE_CHARS {
        return Err(ClassifyError::MessageTooLong(len));
    }
    if body.trim().is_empty() {
        return Ok(Classification {
            text: EMPTY_PLACEHOLDER.to_string(),
            is_markdown: true,
            ..Classification::default()
        });
    }

    let mut out = Classification {
        text: body.to_string(),
        ..Classification::default()
    };
    let mut row = Vec::new();
    for label in labels {
        match label.kind {
            LabelKind::Markdown => out.is_markdown = true,
            LabelKind::Pre => {
                out.is_markdown = true;
                out.text = format!("```\n{}\n```", escape_markdown(body));
            }
            LabelKind::Update => out.for_update = true,
            LabelKind::Callback if label.value.is_empty() => push_row(&mut out.buttons, &mut row),
            LabelKind::Callback => row.push(callback_button(&label.value)),
        }
    }
    push_row(&mut out.buttons, &mut row);
    Ok(out)
}
