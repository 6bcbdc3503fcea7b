//! Context-anchored location of changes inside a document snapshot.
//!
//! Lookup runs in two tiers: an exact substring search, then a line-based comparison that
//! ignores leading and trailing whitespace. Offsets are UTF-8 byte offsets and always fall on
//! character boundaries.

/// Span of document text that matched a context string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextMatch {
    pub offset: usize,
    pub len: usize,
    /// Whether the whitespace-insensitive tier produced the match.
    pub fuzzy: bool,
}

impl ContextMatch {
    /// Offset right after the matched context, where the change begins.
    pub fn end(&self) -> usize {
        self.offset + self.len
    }

    fn exact(offset: usize, len: usize) -> Self {
        Self {
            offset,
            len,
            fuzzy: false,
        }
    }
}

/// Find `context` in `document`, starting at `search_from`.
///
/// An empty context always anchors at the document start.
pub fn locate(document: &str, context: &str, search_from: usize) -> Option<ContextMatch> {
    if context.is_empty() {
        return Some(ContextMatch::exact(0, 0));
    }

    let from = ceil_char_boundary(document, search_from);
    if let Some(pos) = document[from..].find(context) {
        return Some(ContextMatch::exact(from + pos, context.len()));
    }

    let found = locate_fuzzy(document, context, from);
    match found {
        Some(found) => {
            tracing::debug!(offset = found.offset, "context matched ignoring whitespace")
        }
        None => tracing::debug!(context, search_from, "context not found"),
    }
    found
}

fn locate_fuzzy(document: &str, context: &str, from: usize) -> Option<ContextMatch> {
    let trimmed = context.trim();
    if trimmed.is_empty() {
        return None;
    }

    let wanted: Vec<&str> = trimmed.split('\n').map(str::trim).collect();
    let trailing_newlines = context[context.trim_end().len()..].matches('\n').count();

    let mut lines: Vec<(usize, &str)> = Vec::new();
    let mut offset = from;
    for line in document[from..].split('\n') {
        lines.push((offset, line));
        offset += line.len() + 1;
    }

    let window = lines.windows(wanted.len()).find(|window| {
        window
            .iter()
            .zip(&wanted)
            .all(|((_, line), expected)| line.trim() == *expected)
    })?;

    let start = window[0].0;
    let (last_offset, last_line) = window[window.len() - 1];
    let mut end = last_offset + last_line.trim_end().len();

    for _ in 0..trailing_newlines {
        let rest = &document[end..];
        let padding = rest.len() - rest.trim_start_matches([' ', '\t', '\r']).len();
        if rest[padding..].starts_with('\n') {
            end += padding + 1;
        } else {
            break;
        }
    }

    Some(ContextMatch {
        offset: start,
        len: end - start,
        fuzzy: true,
    })
}

/// Smallest character boundary at or after `index`, clamped to the text length.
pub(crate) fn ceil_char_boundary(text: &str, index: usize) -> usize {
    if index >= text.len() {
        return text.len();
    }
    let mut boundary = index;
    while !text.is_char_boundary(boundary) {
        boundary += 1;
    }
    boundary
}

/// Largest character boundary at or before `index`, clamped to the text length.
pub(crate) fn floor_char_boundary(text: &str, index: usize) -> usize {
    if index >= text.len() {
        return text.len();
    }
    let mut boundary = index;
    while !text.is_char_boundary(boundary) {
        boundary -= 1;
    }
    boundary
}
