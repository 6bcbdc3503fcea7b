//! Domain models for patch proposals, pending changes, and diagnostics.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Kind of a single patch operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OperationKind {
    /// Verbatim text that must be present and is kept unchanged.
    Context,
    /// Text removed from the document, matched byte for byte.
    Delete,
    /// Text inserted into the document.
    Add,
}

impl OperationKind {
    /// Line prefix used by the patch grammar.
    pub fn prefix(&self) -> char {
        match self {
            OperationKind::Context => ' ',
            OperationKind::Delete => '-',
            OperationKind::Add => '+',
        }
    }
}

/// One operation inside a hunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operation {
    pub kind: OperationKind,
    pub content: String,
}

impl Operation {
    pub fn new(kind: OperationKind, content: impl Into<String>) -> Self {
        Self {
            kind,
            content: content.into(),
        }
    }

    pub fn context(content: impl Into<String>) -> Self {
        Self::new(OperationKind::Context, content)
    }

    pub fn delete(content: impl Into<String>) -> Self {
        Self::new(OperationKind::Delete, content)
    }

    pub fn add(content: impl Into<String>) -> Self {
        Self::new(OperationKind::Add, content)
    }
}

/// A context-anchored group of operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hunk {
    /// Text immediately preceding the change. Empty means document start.
    pub context: String,
    pub operations: Vec<Operation>,
}

impl Hunk {
    pub fn new(context: impl Into<String>) -> Self {
        Self {
            context: context.into(),
            operations: Vec::new(),
        }
    }

    /// Returns whether the hunk carries at least one Delete or Add.
    pub fn has_changes(&self) -> bool {
        self.operations
            .iter()
            .any(|op| op.kind != OperationKind::Context)
    }

    /// Returns whether the hunk removes any text.
    pub fn has_deletions(&self) -> bool {
        self.operations
            .iter()
            .any(|op| op.kind == OperationKind::Delete)
    }

    /// Text the hunk expects right after its anchor: Context and Delete payloads in order.
    pub fn expected_source(&self) -> String {
        self.operations
            .iter()
            .filter(|op| op.kind != OperationKind::Add)
            .map(|op| op.content.as_str())
            .collect()
    }

    /// Append an operation, merging it into the previous one when both share a kind.
    pub fn push(&mut self, kind: OperationKind, content: &str) {
        if let Some(last) = self.operations.last_mut()
            && last.kind == kind
        {
            last.content.push('\n');
            last.content.push_str(content);
            return;
        }
        self.operations.push(Operation::new(kind, content));
    }
}

/// Renders the hunk back into the wire grammar, one prefixed line per payload line.
impl fmt::Display for Hunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "@{}", self.context)?;
        for op in &self.operations {
            for line in op.content.split('\n') {
                writeln!(f, "{}{line}", op.kind.prefix())?;
            }
        }
        Ok(())
    }
}

/// Outcome of parsing one proposal.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ParseResult {
    pub success: bool,
    pub hunks: Vec<Hunk>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub diagnostics: Vec<Diagnostic>,
}

impl ParseResult {
    pub fn ok(hunks: Vec<Hunk>, diagnostics: Vec<Diagnostic>) -> Self {
        Self {
            success: true,
            hunks,
            error: None,
            diagnostics,
        }
    }

    pub fn failed(error: impl fmt::Display, diagnostics: Vec<Diagnostic>) -> Self {
        Self {
            success: false,
            hunks: Vec::new(),
            error: Some(error.to_string()),
            diagnostics,
        }
    }
}

/// Resolution state of a pending change. `Accepted` and `Rejected` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Resolution {
    #[default]
    Pending,
    Accepted,
    Rejected,
}

impl Resolution {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Resolution::Pending)
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Resolution::Pending => "pending",
            Resolution::Accepted => "accepted",
            Resolution::Rejected => "rejected",
        };
        f.write_str(label)
    }
}

/// A caller's verdict on pending changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Decision {
    Accept,
    Reject,
}

impl Decision {
    pub fn resolution(&self) -> Resolution {
        match self {
            Decision::Accept => Resolution::Accepted,
            Decision::Reject => Resolution::Rejected,
        }
    }
}

/// A hunk that was anchored in the document and rendered as markers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingChange {
    pub id: String,
    pub hunk: Hunk,
    /// Snapshot offset where the change region starts.
    pub anchor_offset: usize,
    pub marker_text: String,
    #[serde(default)]
    pub resolved: Resolution,
}

impl PendingChange {
    /// Key ordering changes the way their markers appear in the document. At equal
    /// offsets pure insertions come before a change covering text; a stable sort keeps
    /// parse order among insertions.
    pub fn document_order(&self) -> (usize, usize) {
        (self.anchor_offset, self.hunk.expected_source().len())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Severity {
    Warning,
    Error,
}

/// Structured record of a problem the engine recovered from (or gave up on).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub severity: Severity,
    /// 1-based index of the hunk in parse order.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hunk: Option<usize>,
    /// 1-based line number in the proposal text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<usize>,
    pub message: String,
}

impl Diagnostic {
    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            hunk: None,
            line: None,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            ..Self::warning(message)
        }
    }

    pub fn at_line(mut self, line: usize) -> Self {
        self.line = Some(line);
        self
    }

    pub fn for_hunk(mut self, hunk: usize) -> Self {
        self.hunk = Some(hunk);
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let level = match self.severity {
            Severity::Warning => "warning",
            Severity::Error => "error",
        };
        write!(f, "{level}")?;
        if let Some(hunk) = self.hunk {
            write!(f, " [hunk {hunk}]")?;
        }
        if let Some(line) = self.line {
            write!(f, " [line {line}]")?;
        }
        write!(f, ": {}", self.message)
    }
}
