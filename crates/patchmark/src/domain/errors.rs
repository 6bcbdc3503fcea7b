//! Domain-specific errors.

use thiserror::Error;

/// Fatal failures while parsing a proposal.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("response does not contain a patch (expected lines starting with '@', '-' or '+')")]
    NotAPatch,
    #[error("line {line}: delete before context (a '-' line needs a preceding '@' line)")]
    DeleteBeforeContext { line: usize },
}

/// Failures while resolving pending changes.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ReviewError {
    #[error("unknown change '{0}'")]
    UnknownChange(String),
    #[error("change '{id}' is already {state}")]
    AlreadyResolved { id: String, state: String },
    #[error("markers for change '{0}' are no longer present in the document")]
    MarkersMissing(String),
}

/// Typed failures reported by a generation-request collaborator.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GenerationError {
    #[error("missing credentials: {0}")]
    MissingCredentials(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("generation service returned an empty response")]
    EmptyResponse,
}

/// Failures of one request/apply cycle.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("a generation request is already in progress")]
    Busy,
    #[error(transparent)]
    Generation(#[from] GenerationError),
    #[error("{0}")]
    Parse(String),
}
