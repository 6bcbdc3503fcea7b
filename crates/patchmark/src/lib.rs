pub mod app;
pub mod cli;
pub mod domain;
pub mod infra;

pub use app::apply::{ApplyOptions, ApplyResult, apply};
pub use app::parser::parse;
pub use app::preview::build_marker;
pub use app::review::{ReviewSession, resolve_all};
pub use domain::model::{Decision, Hunk, Operation, OperationKind, ParseResult, PendingChange};
pub use infra::document::{Document, TextBuffer};

/// Install the tracing subscriber used by the binary.
pub fn init(verbosity: u8) {
    infra::logging::init(verbosity);
}
