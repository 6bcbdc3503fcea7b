//! Grammar parser turning raw proposal text into hunks.
//!
//! The grammar is line oriented:
//!
//! ```text
//! @<context>
//! -<text to delete>
//! +<text to add>
//! [EOF]
//! ```
//!
//! Prose around the patch body is tolerated, a missing terminator is synthesized when the
//! input contains directives, and lines that cannot be classified are skipped with a
//! diagnostic. Only an input without any directive, or a deletion before any context, is
//! fatal.

use crate::domain::errors::ParseError;
use crate::domain::model::{Diagnostic, Hunk, OperationKind, ParseResult};

/// Sentinel line closing the patch body.
pub const TERMINATOR: &str = "[EOF]";

/// Parse a proposal into an ordered list of hunks.
pub fn parse(raw: &str) -> ParseResult {
    let mut diagnostics = Vec::new();
    match parse_hunks(raw, &mut diagnostics) {
        Ok(hunks) => {
            tracing::debug!(hunks = hunks.len(), "parsed proposal");
            ParseResult::ok(hunks, diagnostics)
        }
        Err(err) => {
            tracing::warn!(error = %err, "rejected proposal");
            diagnostics.push(Diagnostic::error(err.to_string()));
            ParseResult::failed(err, diagnostics)
        }
    }
}

/// Classification of one physical line of the body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LineKind<'a> {
    Blank,
    Header(&'a str),
    Operation(OperationKind, &'a str),
    Unknown,
}

fn parse_hunks(raw: &str, diagnostics: &mut Vec<Diagnostic>) -> Result<Vec<Hunk>, ParseError> {
    let normalized = raw.replace("\r\n", "\n");
    let lines: Vec<&str> = normalized.split('\n').collect();

    let (start, end) = body_span(&lines)?;
    for (index, line) in lines.iter().enumerate().take(start) {
        if matches!(classify(line), LineKind::Operation(..)) {
            let number = index + 1;
            tracing::warn!(line = number, "directive before first context ignored");
            diagnostics.push(
                Diagnostic::warning(format!(
                    "ignored directive before the first context line: {line:?}"
                ))
                .at_line(number),
            );
        }
    }

    let mut hunks = Vec::new();
    let mut current: Option<Hunk> = None;
    let mut saw_directive = false;
    let mut saw_text = false;

    for (index, line) in lines.iter().enumerate().take(end).skip(start) {
        let number = index + 1;
        let kind = match classify(line) {
            LineKind::Unknown => match recover(line, current.is_some()) {
                Some((kind, note)) => {
                    tracing::warn!(line = number, "{note}");
                    diagnostics.push(Diagnostic::warning(note).at_line(number));
                    kind
                }
                None => {
                    tracing::warn!(line = number, "skipping unrecognized line");
                    diagnostics.push(
                        Diagnostic::warning(format!("skipped unrecognized line: {line:?}"))
                            .at_line(number),
                    );
                    saw_text = true;
                    continue;
                }
            },
            kind => kind,
        };

        match kind {
            LineKind::Blank | LineKind::Unknown => continue,
            LineKind::Header(context) => {
                saw_directive = true;
                if let Some(previous) = current.take() {
                    finish_hunk(previous, &mut hunks);
                }
                current = Some(Hunk::new(context));
            }
            LineKind::Operation(OperationKind::Delete, content) => {
                saw_directive = true;
                let hunk = current
                    .as_mut()
                    .ok_or(ParseError::DeleteBeforeContext { line: number })?;
                hunk.push(OperationKind::Delete, content);
            }
            LineKind::Operation(OperationKind::Add, content) => {
                saw_directive = true;
                current
                    .get_or_insert_with(|| Hunk::new(""))
                    .push(OperationKind::Add, content);
            }
            LineKind::Operation(OperationKind::Context, content) => {
                if let Some(hunk) = current.as_mut() {
                    hunk.push(OperationKind::Context, content);
                }
            }
        }
    }

    if let Some(last) = current.take() {
        finish_hunk(last, &mut hunks);
    }

    if !saw_directive && saw_text {
        return Err(ParseError::NotAPatch);
    }

    Ok(hunks)
}

/// Locate the patch body: from the first `@` line up to the last terminator.
fn body_span(lines: &[&str]) -> Result<(usize, usize), ParseError> {
    let first_header = lines
        .iter()
        .position(|line| line.trim_start().starts_with('@'));
    let terminator = lines.iter().rposition(|line| line.trim() == TERMINATOR);

    match (first_header, terminator) {
        (Some(start), Some(end)) if end > start => Ok((start, end)),
        (_, Some(end)) => Ok((0, end)),
        (start, None) => {
            let start = start.unwrap_or(0);
            let has_directives = lines[start..].iter().any(|line| {
                matches!(
                    line.trim_start().chars().next(),
                    Some('@') | Some('-') | Some('+')
                )
            });
            if has_directives {
                tracing::debug!("terminator missing, parsing to end of input");
                Ok((start, lines.len()))
            } else {
                Err(ParseError::NotAPatch)
            }
        }
    }
}

fn classify(line: &str) -> LineKind<'_> {
    if line.trim().is_empty() {
        return LineKind::Blank;
    }
    match line.chars().next() {
        Some('@') => LineKind::Header(&line[1..]),
        Some('-') => LineKind::Operation(OperationKind::Delete, &line[1..]),
        Some('+') => LineKind::Operation(OperationKind::Add, &line[1..]),
        _ => LineKind::Unknown,
    }
}

/// Second chance for lines that do not start with a directive prefix.
///
/// Indented directives are accepted as if unindented. Inside an open hunk, a line starting
/// with a single space is interior context.
fn recover(line: &str, hunk_open: bool) -> Option<(LineKind<'_>, String)> {
    let trimmed = line.trim_start();
    let kind = classify(trimmed);
    if matches!(kind, LineKind::Header(_) | LineKind::Operation(..)) {
        return Some((kind, format!("accepted indented directive {trimmed:?}")));
    }

    if hunk_open && let Some(content) = line.strip_prefix(' ') {
        return Some((
            LineKind::Operation(OperationKind::Context, content),
            format!("treated line as interior context: {content:?}"),
        ));
    }

    None
}

fn finish_hunk(hunk: Hunk, hunks: &mut Vec<Hunk>) {
    if hunk.has_changes() {
        hunks.push(hunk);
    } else {
        tracing::debug!(context = %hunk.context, "dropping hunk without changes");
    }
}
