//! Review state machine resolving inline markers into accepted or original text.

use crate::domain::errors::ReviewError;
use crate::domain::marker::{self, Marker, MarkerSpan};
use crate::domain::model::{Decision, PendingChange, Resolution};
use crate::infra::document::Document;

/// Replace every marker in `text` according to `decision`. Marker-free text is returned as is.
pub fn resolve_all(text: &str, decision: Decision) -> String {
    let spans: Vec<MarkerSpan> = marker::scan(text).collect();
    substitute(text, &spans, decision)
}

/// Markers still present in `text`, in document order.
pub fn pending_markers(text: &str) -> Vec<MarkerSpan> {
    marker::scan(text).collect()
}

/// Resolve every marker held by `document`. Returns the number of markers resolved.
pub fn resolve_document<D>(document: &mut D, decision: Decision) -> usize
where
    D: Document + ?Sized,
{
    let text = document.value();
    let spans = pending_markers(&text);
    if spans.is_empty() {
        return 0;
    }
    document.set_value(&substitute(&text, &spans, decision));
    tracing::debug!(markers = spans.len(), ?decision, "resolved all markers");
    spans.len()
}

fn substitute(text: &str, spans: &[MarkerSpan], decision: Decision) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for span in spans {
        out.push_str(&text[last..span.start]);
        out.push_str(span.marker.resolve(decision));
        last = span.end;
    }
    out.push_str(&text[last..]);
    out
}

/// Tracks the pending changes produced by one apply and resolves them one at a time.
///
/// A change is found in the document by position: its markers follow the markers of every
/// still-pending change anchored before it. The decoded markers must match the change's own
/// marker text before anything is substituted.
#[derive(Debug, Clone, Default)]
pub struct ReviewSession {
    changes: Vec<PendingChange>,
}

impl ReviewSession {
    pub fn new(mut changes: Vec<PendingChange>) -> Self {
        changes.sort_by_key(PendingChange::document_order);
        Self { changes }
    }

    pub fn changes(&self) -> &[PendingChange] {
        &self.changes
    }

    pub fn into_changes(self) -> Vec<PendingChange> {
        self.changes
    }

    pub fn pending(&self) -> impl Iterator<Item = &PendingChange> {
        self.changes
            .iter()
            .filter(|change| !change.resolved.is_terminal())
    }

    /// Returns whether every change reached a terminal state.
    pub fn is_complete(&self) -> bool {
        self.pending().next().is_none()
    }

    /// Resolve the change `id` inside `document`, leaving all other markers untouched.
    pub fn resolve<D>(
        &mut self,
        document: &mut D,
        id: &str,
        decision: Decision,
    ) -> Result<(), ReviewError>
    where
        D: Document + ?Sized,
    {
        let position = self
            .changes
            .iter()
            .position(|change| change.id == id)
            .ok_or_else(|| ReviewError::UnknownChange(id.to_owned()))?;

        let target = &self.changes[position];
        if target.resolved.is_terminal() {
            return Err(ReviewError::AlreadyResolved {
                id: id.to_owned(),
                state: target.resolved.to_string(),
            });
        }

        let skip: usize = self.changes[..position]
            .iter()
            .filter(|change| !change.resolved.is_terminal())
            .map(token_count)
            .sum();
        let expected: Vec<Marker> = marker::scan(&target.marker_text)
            .map(|span| span.marker)
            .collect();

        let text = document.value();
        let spans: Vec<MarkerSpan> = marker::scan(&text)
            .skip(skip)
            .take(expected.len())
            .collect();
        let found: Vec<&Marker> = spans.iter().map(|span| &span.marker).collect();
        if found.len() != expected.len() || found.iter().zip(&expected).any(|(a, b)| *a != b) {
            tracing::warn!(change = id, "markers missing from document");
            return Err(ReviewError::MarkersMissing(id.to_owned()));
        }

        for span in spans.iter().rev() {
            document.replace_range(span.marker.resolve(decision), span.start, span.end);
        }

        self.changes[position].resolved = decision.resolution();
        tracing::debug!(change = id, ?decision, "resolved change");
        Ok(())
    }

    /// Resolve every marker in `document` and mark all pending changes with `decision`.
    /// Returns the number of changes that moved out of `Pending`.
    pub fn resolve_all<D>(&mut self, document: &mut D, decision: Decision) -> usize
    where
        D: Document + ?Sized,
    {
        resolve_document(document, decision);
        let mut resolved = 0;
        for change in &mut self.changes {
            if change.resolved == Resolution::Pending {
                change.resolved = decision.resolution();
                resolved += 1;
            }
        }
        resolved
    }
}

fn token_count(change: &PendingChange) -> usize {
    marker::scan(&change.marker_text).count()
}
