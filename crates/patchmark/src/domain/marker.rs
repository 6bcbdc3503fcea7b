//! Inline review markers embedded in document text.
//!
//! Three shapes exist:
//!
//! - `[{+}added]` pure addition
//! - `[{-}deleted]` pure deletion
//! - `[{-}deleted{+}added]` combined replacement
//!
//! Payloads escape `\`, `[`, `]`, `{` and `}` with a backslash so arbitrary document text
//! survives the trip through a marker unchanged.

use serde::{Deserialize, Serialize};

use crate::domain::model::Decision;

const OPEN_DELETE: &str = "[{-}";
const OPEN_ADD: &str = "[{+}";
const ADD_SEPARATOR: &str = "{+}";
const CLOSE: char = ']';
const ESCAPE: char = '\\';

/// Decoded marker payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Marker {
    Addition { add: String },
    Deletion { delete: String },
    Replacement { delete: String, add: String },
}

impl Marker {
    pub fn addition(add: impl Into<String>) -> Self {
        Marker::Addition { add: add.into() }
    }

    pub fn deletion(delete: impl Into<String>) -> Self {
        Marker::Deletion {
            delete: delete.into(),
        }
    }

    pub fn replacement(delete: impl Into<String>, add: impl Into<String>) -> Self {
        Marker::Replacement {
            delete: delete.into(),
            add: add.into(),
        }
    }

    /// Render the marker into its inline textual form.
    pub fn encode(&self) -> String {
        match self {
            Marker::Addition { add } => format!("{OPEN_ADD}{}{CLOSE}", escape(add)),
            Marker::Deletion { delete } => format!("{OPEN_DELETE}{}{CLOSE}", escape(delete)),
            Marker::Replacement { delete, add } => format!(
                "{OPEN_DELETE}{}{ADD_SEPARATOR}{}{CLOSE}",
                escape(delete),
                escape(add)
            ),
        }
    }

    /// Text that replaces the marker once the decision is made.
    pub fn resolve(&self, decision: Decision) -> &str {
        match (self, decision) {
            (Marker::Addition { add }, Decision::Accept) => add,
            (Marker::Addition { .. }, Decision::Reject) => "",
            (Marker::Deletion { .. }, Decision::Accept) => "",
            (Marker::Deletion { delete }, Decision::Reject) => delete,
            (Marker::Replacement { add, .. }, Decision::Accept) => add,
            (Marker::Replacement { delete, .. }, Decision::Reject) => delete,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Marker::Addition { .. } => "addition",
            Marker::Deletion { .. } => "deletion",
            Marker::Replacement { .. } => "replacement",
        }
    }
}

/// A marker located inside a text, `start..end` being its byte span.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkerSpan {
    pub start: usize,
    pub end: usize,
    pub marker: Marker,
}

/// Escape marker delimiters inside a payload.
pub fn escape(payload: &str) -> String {
    let mut out = String::with_capacity(payload.len());
    for ch in payload.chars() {
        if matches!(ch, '\\' | '[' | ']' | '{' | '}') {
            out.push(ESCAPE);
        }
        out.push(ch);
    }
    out
}

/// Returns whether the text contains anything that opens a marker.
pub fn contains_marker_syntax(text: &str) -> bool {
    text.contains(OPEN_ADD) || text.contains(OPEN_DELETE)
}

/// Scan `text` once, yielding every well-formed marker in order.
pub fn scan(text: &str) -> MarkerScanner<'_> {
    MarkerScanner { text, pos: 0 }
}

/// Single-pass tokenizer over marker spans. Malformed openers are treated as plain text.
#[derive(Debug, Clone)]
pub struct MarkerScanner<'a> {
    text: &'a str,
    pos: usize,
}

impl Iterator for MarkerScanner<'_> {
    type Item = MarkerSpan;

    fn next(&mut self) -> Option<Self::Item> {
        while self.pos < self.text.len() {
            let offset = self.text[self.pos..].find("[{")?;
            let start = self.pos + offset;
            if let Some((marker, end)) = decode_at(self.text, start) {
                self.pos = end;
                return Some(MarkerSpan { start, end, marker });
            }
            // '[' is one byte, so start + 1 stays on a char boundary.
            self.pos = start + 1;
        }
        None
    }
}

fn decode_at(text: &str, start: usize) -> Option<(Marker, usize)> {
    let rest = &text[start..];
    let is_delete = if rest.starts_with(OPEN_DELETE) {
        true
    } else if rest.starts_with(OPEN_ADD) {
        false
    } else {
        return None;
    };

    let body_start = start + OPEN_DELETE.len();
    let body = &text[body_start..];
    let mut chars = body.char_indices();
    let mut current = String::new();
    let mut deleted: Option<String> = None;

    while let Some((idx, ch)) = chars.next() {
        match ch {
            ESCAPE => {
                let (_, escaped) = chars.next()?;
                current.push(escaped);
            }
            CLOSE => {
                let marker = match (is_delete, deleted) {
                    (false, _) => Marker::Addition { add: current },
                    (true, None) => Marker::Deletion { delete: current },
                    (true, Some(delete)) => Marker::Replacement {
                        delete,
                        add: current,
                    },
                };
                return Some((marker, body_start + idx + CLOSE.len_utf8()));
            }
            '{' if is_delete && deleted.is_none() && body[idx..].starts_with(ADD_SEPARATOR) => {
                deleted = Some(std::mem::take(&mut current));
                chars.next();
                chars.next();
            }
            // Encoded payloads never carry these unescaped.
            '[' | '{' | '}' => return None,
            _ => current.push(ch),
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn markers(text: &str) -> Vec<Marker> {
        scan(text).map(|span| span.marker).collect()
    }

    #[test]
    fn encodes_three_shapes() {
        assert_eq!(Marker::addition("new").encode(), "[{+}new]");
        assert_eq!(Marker::deletion("old").encode(), "[{-}old]");
        assert_eq!(Marker::replacement("old", "new").encode(), "[{-}old{+}new]");
    }

    #[test]
    fn scan_reports_spans_and_payloads() {
        let text = "a [{-}Title{+}Heading] b [{+}x] c [{-}y]";
        let spans: Vec<_> = scan(text).collect();
        assert_eq!(spans.len(), 3);
        assert_eq!(&text[spans[0].start..spans[0].end], "[{-}Title{+}Heading]");
        assert_eq!(spans[0].marker, Marker::replacement("Title", "Heading"));
        assert_eq!(spans[1].marker, Marker::addition("x"));
        assert_eq!(spans[2].marker, Marker::deletion("y"));
        assert_eq!(spans[2].end, text.len());
    }

    #[test]
    fn escaped_payload_survives_round_trip() {
        let payload = "see [docs](http://x) {braces} and \\ slash";
        let marker = Marker::replacement(payload, "]{+}[");
        let encoded = marker.encode();
        assert_eq!(markers(&encoded), vec![marker]);
    }

    #[test]
    fn ordinary_brackets_are_not_markers() {
        assert!(markers("[link](url) and [{x}] and {+}").is_empty());
        assert!(!contains_marker_syntax("[link](url)"));
    }

    #[test]
    fn unterminated_marker_is_plain_text() {
        assert!(markers("before [{+}never closed").is_empty());
        assert!(markers("dangling escape [{-}abc\\").is_empty());
    }

    #[test]
    fn literal_opener_in_text_is_not_a_marker() {
        let text = "Type [{+} to open a marker.\nend[{+}!]";
        let spans: Vec<_> = scan(text).collect();
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].marker, Marker::addition("!"));
        assert_eq!(&text[spans[0].start..], "[{+}!]");
        assert!(markers("[{-}a{+}b{+}c]").is_empty());
        assert!(markers("[{+}a}b]").is_empty());
    }

    #[test]
    fn multibyte_payloads_are_preserved() {
        let text = "标题[{-}实时渲染{+}即时渲染]。";
        let spans: Vec<_> = scan(text).collect();
        assert_eq!(spans[0].marker, Marker::replacement("实时渲染", "即时渲染"));
        assert_eq!(&text[spans[0].end..], "。");
    }

    #[test]
    fn resolve_follows_decision() {
        let replacement = Marker::replacement("old", "new");
        assert_eq!(replacement.resolve(Decision::Accept), "new");
        assert_eq!(replacement.resolve(Decision::Reject), "old");
        assert_eq!(Marker::addition("a").resolve(Decision::Reject), "");
        assert_eq!(Marker::deletion("d").resolve(Decision::Reject), "d");
        assert_eq!(Marker::deletion("d").resolve(Decision::Accept), "");
    }
}
