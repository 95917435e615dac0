//! Engine error taxonomy
//!
//! Per-file failures (`UnsupportedLanguage`, `Parse`) are isolated by the
//! pipeline and recorded in the output document; they never abort a batch.
//! Only configuration problems and a run where nothing parsed are fatal.

use std::path::PathBuf;
use thiserror::Error;

/// Errors surfaced by the analysis engine
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("unsupported language: {}", path.display())]
    UnsupportedLanguage { path: PathBuf },

    #[error("parse error in {} at byte {offset}", path.display())]
    Parse { path: PathBuf, offset: usize },

    #[error("{count} edges resolved as ambiguous (strict mode)")]
    AmbiguousResolution { count: usize },

    #[error("invalid configuration: {0}")]
    Configuration(String),

    #[error("no files could be parsed ({candidates} candidate files, all skipped)")]
    TotalParseFailure { candidates: usize },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, EngineError>;
