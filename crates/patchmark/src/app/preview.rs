//! Preview builder rendering hunks as inline review markers.

use crate::domain::marker::Marker;
use crate::domain::model::{Hunk, OperationKind};

/// One contiguous piece of a hunk, as written into the document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// Interior context kept verbatim.
    Keep(String),
    /// Pure addition.
    Insert(String),
    /// Pure deletion.
    Remove(String),
    /// Deletion immediately followed by an addition.
    Replace { delete: String, add: String },
}

impl Segment {
    /// Marker representing the segment, `None` for kept context.
    pub fn marker(&self) -> Option<Marker> {
        match self {
            Segment::Keep(_) => None,
            Segment::Insert(add) => Some(Marker::addition(add.as_str())),
            Segment::Remove(delete) => Some(Marker::deletion(delete.as_str())),
            Segment::Replace { delete, add } => {
                Some(Marker::replacement(delete.as_str(), add.as_str()))
            }
        }
    }

    /// Text written in highlight mode.
    pub fn highlighted(&self) -> String {
        match self {
            Segment::Keep(text) => text.clone(),
            other => other.marker().map(|m| m.encode()).unwrap_or_default(),
        }
    }

    /// Text written when the edit is applied directly.
    pub fn applied(&self) -> &str {
        match self {
            Segment::Keep(text) | Segment::Insert(text) => text,
            Segment::Remove(_) => "",
            Segment::Replace { add, .. } => add,
        }
    }

    /// Number of snapshot bytes the segment covers.
    pub fn source_len(&self) -> usize {
        match self {
            Segment::Keep(text) | Segment::Remove(text) => text.len(),
            Segment::Replace { delete, .. } => delete.len(),
            Segment::Insert(_) => 0,
        }
    }
}

/// Split a hunk into segments, pairing each deletion with an addition that directly follows.
///
/// An empty pure addition stands for a blank line and becomes `"\n"`.
pub fn segments(hunk: &Hunk) -> Vec<Segment> {
    let mut out = Vec::with_capacity(hunk.operations.len());
    let mut ops = hunk.operations.iter().peekable();

    while let Some(op) = ops.next() {
        let segment = match op.kind {
            OperationKind::Context => Segment::Keep(op.content.clone()),
            OperationKind::Delete => match ops.next_if(|next| next.kind == OperationKind::Add) {
                Some(add) => Segment::Replace {
                    delete: op.content.clone(),
                    add: add.content.clone(),
                },
                None => Segment::Remove(op.content.clone()),
            },
            OperationKind::Add if op.content.is_empty() => Segment::Insert("\n".into()),
            OperationKind::Add => Segment::Insert(op.content.clone()),
        };
        out.push(segment);
    }

    out
}

/// Render the marker text spliced into the document at the hunk's anchor.
pub fn build_marker(hunk: &Hunk) -> String {
    segments(hunk).iter().map(Segment::highlighted).collect()
}
