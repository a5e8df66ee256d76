//! Directive labels: `%!NAME ...` lines at the head of an outbound message.
//!
//! Labels are stripped one line at a time from the start of the text until no
//! known prefix matches. Anything after that point is the message body.

/// Directive kind. The set is closed: only these four prefixes are recognized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelKind {
    Markdown,
    Pre,
    Update,
    Callback,
}

impl LabelKind {
    /// Prefixes in match priority order.
    const ALL: [(LabelKind, &'static str); 4] = [
        (LabelKind::Markdown, "%!MARKDOWN"),
        (LabelKind::Pre, "%!PRE"),
        (LabelKind::Update, "%!UPDATE"),
        (LabelKind::Callback, "%!CALLBACK"),
    ];
}

/// One parsed directive: kind plus the trimmed rest of its line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Label {
    pub kind: LabelKind,
    pub value: String,
}

fn is_eol(c: char) -> bool {
    c == '\r' || c == '\n'
}

/// Match one directive at the start of `text`. Returns the label and the number of bytes consumed
/// (the directive line plus the run of line terminators after it).
fn match_label(text: &str) -> Option<(Label, usize)> {
    let (kind, prefix) = LabelKind::ALL
        .iter()
        .copied()
        .find(|(_, prefix)| text.starts_with(*prefix))?;
    let line_end = text[prefix.len()..]
        .find(is_eol)
        .map(|i| prefix.len() + i)
        .unwrap_or(text.len());
    let consumed = text[line_end..]
        .find(|c: char| !is_eol(c))
        .map(|i| line_end + i)
        .unwrap_or(text.len());
    let label = Label {
        kind,
        value: text[prefix.len()..line_end].trim().to_string(),
    };
    Some((label, consumed))
}

/// Split `text` into its leading directive labels (in order of appearance) and the residual body.
///
/// Never fails: a `%!`-looking line that is not a known directive ends the scan and stays in the body.
pub fn extract_labels(text: &str) -> (Vec<Label>, &str) {
    let mut labels = Vec::new();
    let mut rest = text;
    // Each iteration consumes at least the prefix, so the loop is bounded by the input length.
    while let Some((label, consumed)) = match_label(rest) {
        labels.push(label);
        rest = &rest[consumed..];
    }
    (labels, rest)
}
