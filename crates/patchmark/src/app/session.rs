//! Edit sessions: one request/response cycle against a proposal source, plus persistence
//! of the review state that cycle leaves behind.

use std::cell::Cell;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::app::apply::{ApplyOptions, ApplyResult, apply};
use crate::app::parser::parse;
use crate::app::review::ReviewSession;
use crate::domain::errors::{GenerationError, SessionError};
use crate::domain::model::PendingChange;
use crate::infra::document::Document;

const STORE_DIR: &str = ".patchmark";
const STORE_SUFFIX: &str = "review.json";

/// What a generation service is asked to do.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GenerationRequest {
    pub instruction: String,
    /// Full document text at request time.
    pub content: String,
    pub language: String,
}

impl GenerationRequest {
    pub fn new(
        instruction: impl Into<String>,
        content: impl Into<String>,
        language: impl Into<String>,
    ) -> Self {
        Self {
            instruction: instruction.into(),
            content: content.into(),
            language: language.into(),
        }
    }
}

/// Anything that can answer a [`GenerationRequest`] with proposal text.
pub trait ProposalSource {
    fn request(&self, request: &GenerationRequest) -> Result<String, GenerationError>;
}

impl<S: ProposalSource + ?Sized> ProposalSource for &S {
    fn request(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
        (**self).request(request)
    }
}

/// Answers every request with the same text.
#[derive(Debug, Clone, Default)]
pub struct StaticSource {
    response: String,
}

impl StaticSource {
    pub fn new(response: impl Into<String>) -> Self {
        Self {
            response: response.into(),
        }
    }
}

impl ProposalSource for StaticSource {
    fn request(&self, _request: &GenerationRequest) -> Result<String, GenerationError> {
        non_empty(self.response.clone())
    }
}

/// Reads the proposal from a file each time it is asked.
#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ProposalSource for FileSource {
    fn request(&self, _request: &GenerationRequest) -> Result<String, GenerationError> {
        let text = fs::read_to_string(&self.path).map_err(|err| {
            GenerationError::Transport(format!("{}: {err}", self.path.display()))
        })?;
        non_empty(text)
    }
}

fn non_empty(text: String) -> Result<String, GenerationError> {
    if text.trim().is_empty() {
        Err(GenerationError::EmptyResponse)
    } else {
        Ok(text)
    }
}

/// Drives request, parse and apply for one document, rejecting overlapping requests.
#[derive(Debug)]
pub struct EditSession<S> {
    source: S,
    options: ApplyOptions,
    busy: Cell<bool>,
}

/// Marks a session busy until dropped.
#[derive(Debug)]
pub struct BusyGuard<'a> {
    flag: &'a Cell<bool>,
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.flag.set(false);
    }
}

impl<S: ProposalSource> EditSession<S> {
    pub fn new(source: S, options: ApplyOptions) -> Self {
        Self {
            source,
            options,
            busy: Cell::new(false),
        }
    }

    pub fn is_busy(&self) -> bool {
        self.busy.get()
    }

    /// Claim the session for one request. Fails while another request is outstanding.
    pub fn begin(&self) -> Result<BusyGuard<'_>, SessionError> {
        if self.busy.replace(true) {
            return Err(SessionError::Busy);
        }
        Ok(BusyGuard { flag: &self.busy })
    }

    /// Request a proposal for `instruction`, parse it and apply it to `document`.
    ///
    /// Parse diagnostics come first in the returned diagnostics, followed by those of
    /// the apply step.
    pub fn run<D>(
        &self,
        document: &mut D,
        instruction: &str,
        language: &str,
    ) -> Result<ApplyResult, SessionError>
    where
        D: Document + ?Sized,
    {
        let _guard = self.begin()?;

        let request = GenerationRequest::new(instruction, document.value(), language);
        let raw = self.source.request(&request)?;
        tracing::debug!(bytes = raw.len(), "received proposal");

        let parsed = parse(&raw);
        if !parsed.success {
            let message = parsed.error.unwrap_or_else(|| "invalid proposal".to_owned());
            return Err(SessionError::Parse(message));
        }

        let mut result = apply(document, &parsed.hunks, &self.options);
        let mut diagnostics = parsed.diagnostics;
        diagnostics.append(&mut result.diagnostics);
        result.diagnostics = diagnostics;

        tracing::info!(
            applied = result.applied_count,
            hunks = parsed.hunks.len(),
            "applied proposal"
        );
        Ok(result)
    }
}

/// Review state persisted next to a document between invocations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewSnapshot {
    pub document: String,
    /// RFC 3339 timestamp of the apply that produced the changes.
    pub created_at: String,
    pub changes: Vec<PendingChange>,
}

impl ReviewSnapshot {
    pub fn new(document: &Path, changes: Vec<PendingChange>) -> Result<Self> {
        let created_at = OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .context("failed to format review timestamp")?;
        Ok(Self {
            document: document.display().to_string(),
            created_at,
            changes,
        })
    }

    pub fn into_session(self) -> ReviewSession {
        ReviewSession::new(self.changes)
    }
}

/// Persists a [`ReviewSnapshot`] under `.patchmark/` beside the document.
#[derive(Debug, Clone)]
pub struct ReviewStore {
    path: PathBuf,
}

impl ReviewStore {
    pub fn for_document(document: &Path) -> Self {
        let dir = document
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let name = document
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "document".to_owned());
        let path = dir.join(STORE_DIR).join(format!("{name}.{STORE_SUFFIX}"));
        Self { path }
    }

    /// Location of the persisted review file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<Option<ReviewSnapshot>> {
        if !self.path.exists() {
            return Ok(None);
        }

        let data = fs::read_to_string(&self.path)
            .with_context(|| format!("failed to read review file at {}", self.path.display()))?;
        let snapshot = serde_json::from_str(&data)
            .with_context(|| format!("invalid review data in {}", self.path.display()))?;
        Ok(Some(snapshot))
    }

    /// Persist the snapshot, creating parent directories as needed.
    pub fn save(&self, snapshot: &ReviewSnapshot) -> Result<()> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir).with_context(|| {
                format!("failed to create review directory {}", dir.display())
            })?;
        }

        let data = serde_json::to_string_pretty(snapshot)
            .context("failed to serialize review snapshot")?;
        fs::write(&self.path, data)
            .with_context(|| format!("failed to write review file to {}", self.path.display()))?;
        Ok(())
    }

    /// Remove the review file. Returns whether there was one.
    pub fn clear(&self) -> Result<bool> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err)
                .with_context(|| format!("failed to remove review file {}", self.path.display())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::{Decision, Resolution};
    use crate::infra::document::TextBuffer;

    struct FailingSource;

    impl ProposalSource for FailingSource {
        fn request(&self, _request: &GenerationRequest) -> Result<String, GenerationError> {
            Err(GenerationError::MissingCredentials("no api key configured".into()))
        }
    }

    struct EchoSource;

    impl ProposalSource for EchoSource {
        fn request(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
            Ok(format!("@{}\n+ ({})\n[EOF]", request.content, request.language))
        }
    }

    #[test]
    fn run_applies_proposal_in_highlight_mode() {
        let session = EditSession::new(
            StaticSource::new("@# \n-Title\n+Heading\n[EOF]"),
            ApplyOptions::default(),
        );
        let mut doc = TextBuffer::from("# Title\nHello world");
        let result = session.run(&mut doc, "rename the title", "en").unwrap();
        assert_eq!(result.applied_count, 1);
        assert_eq!(doc.as_str(), "# [{-}Title{+}Heading]\nHello world");
        assert!(!session.is_busy());
    }

    #[test]
    fn request_carries_document_and_language() {
        let session = EditSession::new(EchoSource, ApplyOptions::plain());
        let mut doc = TextBuffer::from("Hello");
        session.run(&mut doc, "tag it", "fr").unwrap();
        assert_eq!(doc.as_str(), "Hello (fr)");
    }

    #[test]
    fn second_request_while_busy_is_rejected() {
        let session = EditSession::new(StaticSource::new("+x\n[EOF]"), ApplyOptions::default());
        let guard = session.begin().unwrap();
        let mut doc = TextBuffer::from("text");
        let err = session.run(&mut doc, "again", "en").unwrap_err();
        assert!(matches!(err, SessionError::Busy));
        assert_eq!(doc.as_str(), "text");

        drop(guard);
        assert!(session.run(&mut doc, "again", "en").is_ok());
    }

    #[test]
    fn generation_errors_release_the_session() {
        let session = EditSession::new(FailingSource, ApplyOptions::default());
        let mut doc = TextBuffer::from("text");
        let err = session.run(&mut doc, "edit", "en").unwrap_err();
        assert!(matches!(
            err,
            SessionError::Generation(GenerationError::MissingCredentials(_))
        ));
        assert!(!session.is_busy());
    }

    #[test]
    fn unparseable_proposal_is_a_session_error() {
        let session = EditSession::new(
            StaticSource::new("Sorry, I cannot help with that."),
            ApplyOptions::default(),
        );
        let mut doc = TextBuffer::from("text");
        let err = session.run(&mut doc, "edit", "en").unwrap_err();
        assert!(matches!(err, SessionError::Parse(_)));
        assert_eq!(doc.as_str(), "text");
    }

    #[test]
    fn blank_responses_are_empty() {
        let request = GenerationRequest::new("i", "c", "en");
        assert_eq!(
            StaticSource::new("  \n").request(&request),
            Err(GenerationError::EmptyResponse)
        );
    }

    #[test]
    fn file_source_reports_missing_file_as_transport_error() {
        let request = GenerationRequest::new("i", "c", "en");
        let err = FileSource::new("/definitely/missing.patch")
            .request(&request)
            .unwrap_err();
        assert!(matches!(err, GenerationError::Transport(msg) if msg.contains("missing.patch")));
    }

    #[test]
    fn review_store_round_trips_snapshot() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let document = temp.path().join("notes.md");
        let store = ReviewStore::for_document(&document);
        assert_eq!(
            store.path(),
            temp.path().join(".patchmark/notes.md.review.json")
        );
        assert!(store.load()?.is_none());

        let mut doc = TextBuffer::from("# Title\n");
        let result = apply(
            &mut doc,
            &parse("@# \n-Title\n+Heading\n[EOF]").hunks,
            &ApplyOptions::default(),
        );
        let snapshot = ReviewSnapshot::new(&document, result.pending)?;
        store.save(&snapshot)?;

        let loaded = store.load()?.expect("snapshot saved");
        assert_eq!(loaded, snapshot);
        assert!(OffsetDateTime::parse(&loaded.created_at, &Rfc3339).is_ok());

        let mut review = loaded.into_session();
        review.resolve(&mut doc, "change-1", Decision::Accept)?;
        assert_eq!(review.changes()[0].resolved, Resolution::Accepted);
        assert_eq!(doc.as_str(), "# Heading\n");

        assert!(store.clear()?);
        assert!(!store.clear()?);
        Ok(())
    }

    #[test]
    fn bare_file_name_stores_in_current_directory() {
        let store = ReviewStore::for_document(Path::new("draft.md"));
        assert_eq!(store.path(), Path::new("./.patchmark/draft.md.review.json"));
    }
}
