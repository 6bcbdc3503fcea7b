//! Patch applicator writing located hunks into a document.
//!
//! Application is split in two phases. Planning reads one snapshot, anchors every hunk with
//! a forward-advancing cursor and verifies the text it removes. Writing then walks the
//! planned edits from the highest offset down, so no write can shift an offset that is
//! still pending.

use serde::Serialize;

use crate::app::locate::{ContextMatch, ceil_char_boundary, floor_char_boundary, locate};
use crate::app::preview::{self, Segment};
use crate::domain::model::{Diagnostic, Hunk, OperationKind, PendingChange, Resolution};
use crate::infra::document::Document;

const DEFAULT_WINDOW_BEFORE: usize = 50;
const DEFAULT_WINDOW_AFTER: usize = 200;

/// Caller-supplied knobs for one apply run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApplyOptions {
    /// Write review markers instead of editing the text directly.
    pub highlight: bool,
    /// Bytes before the context start searched when deleted text is not at the anchor.
    pub window_before: usize,
    /// Bytes after the anchor searched when deleted text is not at the anchor.
    pub window_after: usize,
}

impl Default for ApplyOptions {
    fn default() -> Self {
        Self {
            highlight: true,
            window_before: DEFAULT_WINDOW_BEFORE,
            window_after: DEFAULT_WINDOW_AFTER,
        }
    }
}

impl ApplyOptions {
    pub fn plain() -> Self {
        Self {
            highlight: false,
            ..Self::default()
        }
    }
}

/// Outcome of applying a list of hunks.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ApplyResult {
    pub applied_count: usize,
    pub final_text: String,
    /// Changes awaiting review, ordered by position. Empty unless highlighting.
    pub pending: Vec<PendingChange>,
    pub diagnostics: Vec<Diagnostic>,
}

/// A hunk anchored in the snapshot and ready to be written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedEdit {
    /// 1-based position of the hunk in parse order.
    pub index: usize,
    pub hunk: Hunk,
    /// Snapshot offset where the edited region starts.
    pub start: usize,
    pub segments: Vec<Segment>,
}

impl PlannedEdit {
    /// Snapshot bytes covered by the edit.
    pub fn source_len(&self) -> usize {
        self.segments.iter().map(Segment::source_len).sum()
    }

    pub fn end(&self) -> usize {
        self.start + self.source_len()
    }

    pub fn marker_text(&self) -> String {
        self.segments.iter().map(Segment::highlighted).collect()
    }

    pub fn id(&self) -> String {
        format!("change-{}", self.index)
    }

    fn overlaps(&self, other: &PlannedEdit) -> bool {
        self.start < other.end() && other.start < self.end()
    }

    fn to_pending(&self) -> PendingChange {
        PendingChange {
            id: self.id(),
            hunk: self.hunk.clone(),
            anchor_offset: self.start,
            marker_text: self.marker_text(),
            resolved: Resolution::Pending,
        }
    }
}

/// Located edits plus everything dropped along the way.
#[derive(Debug, Clone, Default)]
pub struct Plan {
    /// Edits in parse order.
    pub edits: Vec<PlannedEdit>,
    pub diagnostics: Vec<Diagnostic>,
}

impl Plan {
    /// Pending changes the plan would produce, ordered by position.
    pub fn pending(&self) -> Vec<PendingChange> {
        let mut pending: Vec<_> = self.edits.iter().map(PlannedEdit::to_pending).collect();
        pending.sort_by_key(PendingChange::document_order);
        pending
    }
}

/// Anchor every hunk in `snapshot` without writing anything.
pub fn plan(snapshot: &str, hunks: &[Hunk], options: &ApplyOptions) -> Plan {
    let mut edits: Vec<PlannedEdit> = Vec::with_capacity(hunks.len());
    let mut diagnostics = Vec::new();
    let mut cursor = 0;

    for (position, hunk) in hunks.iter().enumerate() {
        let index = position + 1;

        let found = locate(snapshot, &hunk.context, cursor).or_else(|| {
            if cursor == 0 {
                return None;
            }
            tracing::debug!(hunk = index, "retrying context lookup from document start");
            locate(snapshot, &hunk.context, 0)
        });
        let Some(found) = found else {
            tracing::warn!(hunk = index, context = %hunk.context, "context not found");
            diagnostics.push(
                Diagnostic::warning(format!("context not found: {:?}", hunk.context))
                    .for_hunk(index),
            );
            continue;
        };
        cursor = found.end();

        let Some(start) = verify_source(snapshot, hunk, &found, options, index, &mut diagnostics)
        else {
            continue;
        };

        let edit = PlannedEdit {
            index,
            hunk: hunk.clone(),
            start,
            segments: preview::segments(&terminate_line_insertions(snapshot, hunk, start)),
        };

        if let Some(other) = edits.iter().find(|other| other.overlaps(&edit)) {
            tracing::warn!(hunk = index, other = other.index, "overlapping hunk dropped");
            diagnostics.push(
                Diagnostic::warning(format!("overlaps hunk {} and was dropped", other.index))
                    .for_hunk(index),
            );
            continue;
        }

        tracing::debug!(hunk = index, offset = start, "hunk located");
        edits.push(edit);
    }

    Plan { edits, diagnostics }
}

/// Apply `hunks` to `document`, either as review markers or as direct edits.
pub fn apply<D>(document: &mut D, hunks: &[Hunk], options: &ApplyOptions) -> ApplyResult
where
    D: Document + ?Sized,
{
    let snapshot = document.value();
    let plan = plan(&snapshot, hunks, options);

    let mut ordered: Vec<&PlannedEdit> = plan.edits.iter().collect();
    // Highest offset first. At equal offsets the edit covering text goes first so that
    // insertions land in front of it, and later hunks go before earlier ones.
    ordered.sort_by(|a, b| {
        b.start
            .cmp(&a.start)
            .then(b.source_len().cmp(&a.source_len()))
            .then(b.index.cmp(&a.index))
    });

    for edit in ordered {
        write_edit(document, edit, options.highlight);
    }

    let pending = if options.highlight {
        plan.pending()
    } else {
        Vec::new()
    };

    ApplyResult {
        applied_count: plan.edits.len(),
        final_text: document.value(),
        pending,
        diagnostics: plan.diagnostics,
    }
}

/// Check that the removed (and kept) text sits right after the anchor, or close to it.
fn verify_source(
    snapshot: &str,
    hunk: &Hunk,
    found: &ContextMatch,
    options: &ApplyOptions,
    index: usize,
    diagnostics: &mut Vec<Diagnostic>,
) -> Option<usize> {
    let anchor = found.end();
    let expected = hunk.expected_source();
    let at_anchor = snapshot.get(anchor..anchor + expected.len());
    if expected.is_empty() || at_anchor == Some(expected.as_str()) {
        return Some(anchor);
    }

    let window_start =
        floor_char_boundary(snapshot, found.offset.saturating_sub(options.window_before));
    let window_end = ceil_char_boundary(snapshot, anchor.saturating_add(options.window_after));
    match snapshot[window_start..window_end].find(&expected) {
        Some(pos) => {
            let start = window_start + pos;
            tracing::debug!(hunk = index, anchor, start, "deleted text found near anchor");
            diagnostics.push(
                Diagnostic::warning(format!(
                    "deleted text found at offset {start} instead of {anchor}"
                ))
                .for_hunk(index),
            );
            Some(start)
        }
        None => {
            tracing::warn!(hunk = index, anchor, "deleted text does not match document");
            diagnostics.push(
                Diagnostic::warning(format!(
                    "deleted text does not match the document near offset {anchor}: {expected:?}"
                ))
                .for_hunk(index),
            );
            None
        }
    }
}

/// Pure additions written at the start of a line in front of more text end with a line break.
fn terminate_line_insertions(snapshot: &str, hunk: &Hunk, start: usize) -> Hunk {
    let mut hunk = hunk.clone();
    let mut pos = start;
    let mut after_delete = false;

    for op in &mut hunk.operations {
        match op.kind {
            OperationKind::Add => {
                if !after_delete && starts_line_before_text(snapshot, pos) {
                    op.content.push('\n');
                }
                after_delete = false;
            }
            OperationKind::Delete | OperationKind::Context => {
                pos += op.content.len();
                after_delete = op.kind == OperationKind::Delete;
            }
        }
    }

    hunk
}

fn starts_line_before_text(snapshot: &str, pos: usize) -> bool {
    let at_line_start = pos == 0 || snapshot[..pos].ends_with('\n');
    let followed_by_text = snapshot[pos..].chars().next().is_some_and(|ch| ch != '\n');
    at_line_start && followed_by_text
}

fn write_edit<D>(document: &mut D, edit: &PlannedEdit, highlight: bool)
where
    D: Document + ?Sized,
{
    let mut pos = edit.start;
    for segment in &edit.segments {
        let text = if highlight {
            segment.highlighted()
        } else {
            segment.applied().to_owned()
        };
        match segment {
            Segment::Keep(_) => {}
            Segment::Insert(_) => document.insert_text(pos, &text),
            Segment::Remove(removed) if !highlight => document.delete_text(pos, removed.len()),
            Segment::Remove(_) | Segment::Replace { .. } => {
                document.replace_range(&text, pos, pos + segment.source_len())
            }
        }
        pos += text.len();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::parser::parse;
    use crate::infra::document::TextBuffer;

    #[derive(Default)]
    struct RecordingDocument {
        inner: TextBuffer,
        writes: Vec<(usize, usize)>,
    }

    impl Document for RecordingDocument {
        fn value(&self) -> String {
            self.inner.value()
        }

        fn set_value(&mut self, text: &str) {
            self.inner.set_value(text);
        }

        fn replace_range(&mut self, text: &str, from: usize, to: usize) {
            self.writes.push((from, to));
            self.inner.replace_range(text, from, to);
        }
    }

    fn hunks(raw: &str) -> Vec<Hunk> {
        let result = parse(raw);
        assert!(result.success, "{:?}", result.error);
        result.hunks
    }

    #[test]
    fn highlight_mode_writes_combined_marker() {
        let mut doc = TextBuffer::from("# Title\nHello world");
        let result = apply(
            &mut doc,
            &hunks("@# \n-Title\n+Heading\n[EOF]"),
            &ApplyOptions::default(),
        );
        assert_eq!(result.applied_count, 1);
        assert_eq!(result.final_text, "# [{-}Title{+}Heading]\nHello world");
        assert_eq!(result.pending.len(), 1);
        assert_eq!(result.pending[0].id, "change-1");
        assert_eq!(result.pending[0].anchor_offset, 2);
        assert_eq!(result.pending[0].marker_text, "[{-}Title{+}Heading]");
    }

    #[test]
    fn plain_mode_edits_directly() {
        let mut doc = TextBuffer::from("# Title\nHello world");
        let result = apply(
            &mut doc,
            &hunks("@# \n-Title\n+Heading\n@Hello \n-world\n[EOF]"),
            &ApplyOptions::plain(),
        );
        assert_eq!(result.applied_count, 2);
        assert_eq!(doc.as_str(), "# Heading\nHello ");
        assert!(result.pending.is_empty());
    }

    #[test]
    fn top_of_document_insertion_becomes_its_own_lines() {
        let mut doc = TextBuffer::from("Body text");
        let result = apply(
            &mut doc,
            &hunks("+# New Title\n+\n[EOF]"),
            &ApplyOptions::default(),
        );
        assert!(result.final_text.starts_with("[{+}# New Title\n"));
        assert_eq!(result.final_text, "[{+}# New Title\n\n]Body text");
    }

    #[test]
    fn writes_happen_back_to_front() {
        let mut doc = RecordingDocument {
            inner: TextBuffer::from("alpha beta gamma"),
            writes: Vec::new(),
        };
        let result = apply(
            &mut doc,
            &hunks("@alpha \n-beta\n+BETA\n@beta \n-gamma\n+GAMMA\n[EOF]"),
            &ApplyOptions::plain(),
        );
        assert_eq!(result.applied_count, 2);
        assert_eq!(doc.writes, vec![(11, 16), (6, 10)]);
        assert_eq!(doc.inner.as_str(), "alpha BETA GAMMA");
    }

    #[test]
    fn out_of_order_hunks_retry_from_start() {
        let mut doc = TextBuffer::from("one\ntwo\nthree");
        let result = apply(
            &mut doc,
            &hunks("@three\n+!\n@one\n+?\n[EOF]"),
            &ApplyOptions::plain(),
        );
        assert_eq!(result.applied_count, 2);
        assert_eq!(doc.as_str(), "one?\ntwo\nthree!");
    }

    #[test]
    fn unlocatable_context_leaves_document_unchanged() {
        let mut doc = TextBuffer::from("Hello world");
        let result = apply(
            &mut doc,
            &hunks("@Missing anchor\n-x\n+y\n[EOF]"),
            &ApplyOptions::default(),
        );
        assert_eq!(result.applied_count, 0);
        assert_eq!(result.final_text, "Hello world");
        assert_eq!(result.diagnostics.len(), 1);
        assert_eq!(result.diagnostics[0].hunk, Some(1));
    }

    #[test]
    fn mismatched_deletion_searches_nearby_window() {
        let mut doc = TextBuffer::from("Intro: the old value stays here");
        let result = apply(
            &mut doc,
            &hunks("@Intro:\n-old\n+new\n[EOF]"),
            &ApplyOptions::plain(),
        );
        assert_eq!(result.applied_count, 1);
        assert_eq!(doc.as_str(), "Intro: the new value stays here");
        assert_eq!(result.diagnostics.len(), 1);
    }

    #[test]
    fn deleted_text_before_context_is_found_in_window() {
        let mut doc = TextBuffer::from("old value here");
        let result = apply(
            &mut doc,
            &hunks("@value\n-old\n+new\n[EOF]"),
            &ApplyOptions::default(),
        );
        assert_eq!(result.applied_count, 1);
        assert_eq!(result.final_text, "[{-}old{+}new] value here");
        assert_eq!(result.pending[0].anchor_offset, 0);
        assert!(
            result.diagnostics[0]
                .message
                .contains("found at offset 0 instead of 9")
        );
    }

    #[test]
    fn deletion_outside_window_drops_only_that_hunk() {
        let far = format!("Anchor{}target", " ".repeat(300));
        let mut doc = TextBuffer::from(format!("{far}\nKeep me"));
        let options = ApplyOptions::plain();
        let result = apply(
            &mut doc,
            &hunks("@Anchor\n-target\n@Keep \n-me\n+you\n[EOF]"),
            &options,
        );
        assert_eq!(result.applied_count, 1);
        assert!(doc.as_str().ends_with("Keep you"));
        assert!(doc.as_str().contains("target"));
    }

    #[test]
    fn overlapping_hunks_keep_the_first() {
        let mut doc = TextBuffer::from("abc def");
        let result = apply(
            &mut doc,
            &hunks("@abc \n-def\n+xyz\n@abc\n- def\n+!\n[EOF]"),
            &ApplyOptions::plain(),
        );
        assert_eq!(result.applied_count, 1);
        assert_eq!(doc.as_str(), "abc xyz");
        assert!(result.diagnostics[0].message.contains("overlaps hunk 1"));
    }

    #[test]
    fn insertion_and_deletion_at_same_offset_keep_parse_order() {
        let mut doc = TextBuffer::from("key: value");
        let result = apply(
            &mut doc,
            &hunks("@key: \n-value\n+other\n@key: \n+new \n[EOF]"),
            &ApplyOptions::default(),
        );
        assert_eq!(result.applied_count, 2);
        assert_eq!(result.final_text, "key: [{+}new ][{-}value{+}other]");
    }

    #[test]
    fn pending_changes_follow_marker_order_at_same_offset() {
        let mut doc = TextBuffer::from("key: value");
        let result = apply(
            &mut doc,
            &hunks("@key: \n-value\n+other\n@key: \n+new \n[EOF]"),
            &ApplyOptions::default(),
        );
        let ids: Vec<_> = result.pending.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["change-2", "change-1"]);
    }

    #[test]
    fn interior_context_is_verified_and_kept() {
        let mut doc = TextBuffer::from("a = 1, b = 2");
        let result = apply(
            &mut doc,
            &hunks("@a = \n-1\n+10\n , b = \n-2\n+20\n[EOF]"),
            &ApplyOptions::default(),
        );
        assert_eq!(result.applied_count, 1);
        assert_eq!(result.final_text, "a = [{-}1{+}10], b = [{-}2{+}20]");
    }

    #[test]
    fn plan_reports_pending_without_writing() {
        let snapshot = "first\nsecond";
        let plan = plan(
            snapshot,
            &hunks("@second\n+!\n@first\n+?\n[EOF]"),
            &ApplyOptions::default(),
        );
        let ids: Vec<_> = plan.pending().into_iter().map(|c| c.id).collect();
        assert_eq!(ids, vec!["change-2", "change-1"]);
    }
}
