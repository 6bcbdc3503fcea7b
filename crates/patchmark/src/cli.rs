//! Command line interface driving the engine over files on disk.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{Context, Result, anyhow, bail};
use clap::{ArgAction, CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use serde::{Deserialize, Serialize};

use crate::app::apply::{ApplyOptions, plan};
use crate::app::parser::parse;
use crate::app::prompt::PromptBuilder;
use crate::app::review::{ReviewSession, pending_markers, resolve_document};
use crate::app::session::{
    EditSession, GenerationRequest, ReviewSnapshot, ReviewStore, StaticSource,
};
use crate::domain::marker;
use crate::domain::model::{Decision, Diagnostic, Resolution};
use crate::infra::config::Config;
use crate::infra::document::{Document, FileDocument};

#[derive(Debug, Parser)]
#[command(
    name = "patchmark",
    version,
    about = "Apply context-anchored patch proposals and review them inline"
)]
pub struct Cli {
    /// Increase log verbosity (-v info, -vv debug). PATCHMARK_LOG overrides.
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Parse a proposal and print its hunks.
    Parse {
        /// Proposal file, `-` for stdin.
        patch: PathBuf,
        #[arg(long, value_enum)]
        format: Option<OutputFormat>,
    },
    /// Apply a proposal to a document.
    Apply {
        document: PathBuf,
        /// Proposal file, `-` for stdin.
        patch: PathBuf,
        /// Edit the document directly instead of writing review markers.
        #[arg(long)]
        plain: bool,
        /// Report where each hunk would land without touching the document.
        #[arg(long)]
        dry_run: bool,
    },
    /// Accept pending changes (all of them unless `--id` is given).
    Accept {
        document: PathBuf,
        #[arg(long = "id", value_name = "ID")]
        ids: Vec<String>,
    },
    /// Reject pending changes (all of them unless `--id` is given).
    Reject {
        document: PathBuf,
        #[arg(long = "id", value_name = "ID")]
        ids: Vec<String>,
    },
    /// Show pending changes and markers of a document.
    Status {
        document: PathBuf,
        #[arg(long, value_enum)]
        format: Option<OutputFormat>,
    },
    /// Render the prompt that asks for an edit of a document.
    Prompt {
        document: PathBuf,
        #[arg(short, long)]
        instruction: String,
        #[arg(long)]
        language: Option<String>,
        /// Built-in template name or template file path.
        #[arg(long)]
        template: Option<String>,
    },
    /// Print shell completions.
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Structured output formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
#[value(rename_all = "kebab-case")]
pub enum OutputFormat {
    Json,
    Yaml,
}

impl OutputFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Json => "json",
            OutputFormat::Yaml => "yaml",
        }
    }

    pub fn render<T: Serialize>(&self, value: &T) -> Result<String> {
        match self {
            OutputFormat::Json => {
                serde_json::to_string_pretty(value).context("failed to serialize JSON output")
            }
            OutputFormat::Yaml => {
                serde_yaml::to_string(value).context("failed to serialize YAML output")
            }
        }
    }
}

impl FromStr for OutputFormat {
    type Err = OutputFormatParseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(OutputFormat::Json),
            "yaml" | "yml" => Ok(OutputFormat::Yaml),
            other => Err(OutputFormatParseError::UnknownFormat(other.to_string())),
        }
    }
}

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum OutputFormatParseError {
    #[error("unknown output format '{0}'")]
    UnknownFormat(String),
}

pub fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "patchmark", &mut io::stdout());
            Ok(())
        }
        command => {
            let config = Config::load()?;
            dispatch(command, &config)
        }
    }
}

fn dispatch(command: Commands, config: &Config) -> Result<()> {
    match command {
        Commands::Parse { patch, format } => parse_command(&patch, output_format(format, config)),
        Commands::Apply {
            document,
            patch,
            plain,
            dry_run,
        } => {
            let mut options = config.apply_options();
            if plain {
                options.highlight = false;
            }
            if dry_run {
                dry_run_command(&document, &patch, &options)
            } else {
                apply_command(&document, &patch, &options, config)
            }
        }
        Commands::Accept { document, ids } => resolve_command(&document, &ids, Decision::Accept),
        Commands::Reject { document, ids } => resolve_command(&document, &ids, Decision::Reject),
        Commands::Status { document, format } => {
            status_command(&document, output_format(format, config))
        }
        Commands::Prompt {
            document,
            instruction,
            language,
            template,
        } => {
            let language = language.unwrap_or_else(|| config.prompt.language());
            let template = template.unwrap_or_else(|| config.prompt.template());
            prompt_command(&document, instruction, language, template)
        }
        Commands::Completions { .. } => Ok(()),
    }
}

fn output_format(flag: Option<OutputFormat>, config: &Config) -> OutputFormat {
    flag.unwrap_or_else(|| {
        let configured = config.output.format();
        configured.parse::<OutputFormat>().unwrap_or_else(|err| {
            tracing::warn!(error = %err, "falling back to JSON output");
            OutputFormat::Json
        })
    })
}

fn read_patch(path: &Path) -> Result<String> {
    if path == Path::new("-") {
        return io::read_to_string(io::stdin()).context("failed to read proposal from stdin");
    }
    fs::read_to_string(path)
        .with_context(|| format!("failed to read proposal {}", path.display()))
}

fn parse_command(patch: &Path, format: OutputFormat) -> Result<()> {
    let result = parse(&read_patch(patch)?);
    println!("{}", format.render(&result)?);
    match result.error {
        Some(error) if !result.success => Err(anyhow!(error)),
        _ => Ok(()),
    }
}

fn dry_run_command(document: &Path, patch: &Path, options: &ApplyOptions) -> Result<()> {
    let doc = FileDocument::open(document)?;
    let parsed = parse(&read_patch(patch)?);
    report_diagnostics(&parsed.diagnostics);
    if let Some(error) = parsed.error.filter(|_| !parsed.success) {
        bail!(error);
    }

    let plan = plan(&doc.value(), &parsed.hunks, options);
    for edit in &plan.edits {
        println!(
            "{} hunk {} at offset {} ({} bytes)",
            edit.id(),
            edit.index,
            edit.start,
            edit.source_len()
        );
    }
    report_diagnostics(&plan.diagnostics);
    println!(
        "{} of {} hunk(s) would apply",
        plan.edits.len(),
        parsed.hunks.len()
    );
    Ok(())
}

fn apply_command(
    document: &Path,
    patch: &Path,
    options: &ApplyOptions,
    config: &Config,
) -> Result<()> {
    let store = ReviewStore::for_document(document);
    if let Some(snapshot) = store.load()?
        && snapshot.changes.iter().any(|c| !c.resolved.is_terminal())
    {
        bail!(
            "{} has changes awaiting review; accept or reject them first",
            document.display()
        );
    }

    let mut doc = FileDocument::open(document)?;
    let session = EditSession::new(StaticSource::new(read_patch(patch)?), *options);
    let result = session
        .run(&mut doc, "", &config.prompt.language())
        .with_context(|| format!("failed to apply {}", patch.display()))?;
    report_diagnostics(&result.diagnostics);

    doc.save()?;
    if !result.pending.is_empty() {
        let snapshot = ReviewSnapshot::new(document, result.pending.clone())?;
        store.save(&snapshot)?;
    }

    for change in &result.pending {
        let kinds: Vec<&str> = marker::scan(&change.marker_text)
            .map(|span| span.marker.label())
            .collect();
        println!(
            "{} {} at offset {}",
            change.id,
            kinds.join("+"),
            change.anchor_offset
        );
    }
    println!("applied {} change(s)", result.applied_count);
    Ok(())
}

fn resolve_command(document: &Path, ids: &[String], decision: Decision) -> Result<()> {
    let store = ReviewStore::for_document(document);
    let mut doc = FileDocument::open(document)?;
    let verb = decision.resolution();

    let Some(snapshot) = store.load()? else {
        if !ids.is_empty() {
            bail!("no review state recorded for {}", document.display());
        }
        let count = resolve_document(&mut doc, decision);
        doc.save()?;
        println!("{verb} {count} marker(s)");
        return Ok(());
    };

    let mut review = snapshot.clone().into_session();
    if ids.is_empty() {
        let count = review.resolve_all(&mut doc, decision);
        println!("{verb} {count} change(s)");
    } else {
        for id in ids {
            review
                .resolve(&mut doc, id, decision)
                .with_context(|| format!("failed to resolve {id}"))?;
            println!("{verb} {id}");
        }
    }

    doc.save()?;
    persist_review(&store, snapshot, review)
}

fn persist_review(
    store: &ReviewStore,
    snapshot: ReviewSnapshot,
    review: ReviewSession,
) -> Result<()> {
    if review.is_complete() {
        store.clear()?;
        return Ok(());
    }
    store.save(&ReviewSnapshot {
        changes: review.into_changes(),
        ..snapshot
    })
}

#[derive(Debug, Serialize)]
struct StatusReport {
    document: String,
    markers: usize,
    changes: Vec<ChangeStatus>,
}

#[derive(Debug, Serialize)]
struct ChangeStatus {
    id: String,
    state: Resolution,
    anchor_offset: usize,
    marker_text: String,
}

fn status_command(document: &Path, format: OutputFormat) -> Result<()> {
    let doc = FileDocument::open(document)?;
    let changes = ReviewStore::for_document(document)
        .load()?
        .map(|snapshot| snapshot.changes)
        .unwrap_or_default()
        .into_iter()
        .map(|change| ChangeStatus {
            id: change.id,
            state: change.resolved,
            anchor_offset: change.anchor_offset,
            marker_text: change.marker_text,
        })
        .collect();

    let report = StatusReport {
        document: document.display().to_string(),
        markers: pending_markers(&doc.value()).len(),
        changes,
    };
    println!("{}", format.render(&report)?);
    Ok(())
}

fn prompt_command(
    document: &Path,
    instruction: String,
    language: String,
    template: String,
) -> Result<()> {
    let doc = FileDocument::open(document)?;
    let request = GenerationRequest::new(instruction, doc.value(), language);
    let prompt = PromptBuilder::with_template(template)?.render(&request)?;

    let mut out = io::stdout().lock();
    writeln!(out, "=== system ===\n{}\n", prompt.system)?;
    writeln!(out, "=== user ===\n{}", prompt.user)?;
    Ok(())
}

fn report_diagnostics(diagnostics: &[Diagnostic]) {
    for diagnostic in diagnostics {
        eprintln!("{diagnostic}");
    }
}
