//! Crate-wide error taxonomy.
//!
//! Mirrors the propagation policy of the resolver pipeline: extraction and
//! parsing failures are recovered locally wherever partial data remains
//! useful, and only a handful of conditions are genuinely fatal. Citation and
//! index-collision "failures" are *not* represented here — they are
//! statistics, not errors (see `resolve::ResolverStats` / `index::MediaIndex`).

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    /// The top-level archive could not be opened by any extractor. Fatal.
    #[error("archive is malformed and could not be opened: {path}")]
    ArchiveMalformed { path: PathBuf, #[source] source: anyhow::Error },

    /// A candidate document failed to parse as a conversation. Recovered —
    /// the document is skipped, not the whole run.
    #[error("failed to parse conversation document {path}: {reason}")]
    ConversationParseError { path: PathBuf, reason: String },

    /// The output directory exists and is non-empty. Fatal at start.
    #[error("output directory {path} already exists and is not empty")]
    OutputConflict { path: PathBuf },

    /// The output slot became unwritable mid-run. Fatal — partial output is
    /// worse than no output.
    #[error("failed to write output at {path}: {source}")]
    OutputUnwritable { path: PathBuf, #[source] source: std::io::Error },

    #[error("I/O error at {path}: {source}")]
    Io { path: PathBuf, #[source] source: std::io::Error },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, AppError>;

/// A nested archive failed every extraction strategy. Not an `AppError`
/// variant: logged via `tracing::warn!` and the archive is skipped, per the
/// `nested_archive_skipped` taxonomy entry. Kept as a lightweight value so
/// callers can accumulate them for the verbose-mode summary.
#[derive(Debug, Clone)]
pub struct NestedArchiveSkipped {
    pub path: PathBuf,
    pub reason: String,
}
