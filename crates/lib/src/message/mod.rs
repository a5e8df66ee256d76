//! Outbound message handling: directive labels and classification.

mod classify;
mod labels;

pub use classify::{
    classify, escape_markdown, Button, Classification, ClassifyError, EMPTY_PLACEHOLDER,
    MAX_MESSAGE_CHARS,
};
pub use labels::{extract_labels, Label, LabelKind};
