// src/error.rs
//
// =============================================================================
// SDFORGE: ERROR TAXONOMY
// =============================================================================
//
// Typed errors with a path chain, a one-line explanation, and (where
// meaningful) a set of valid alternatives. Generalizes the dsl-style
// kind+context error used upstream in this codebase's ancestry to the
// categories the template engine can fail with.

use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    #[error("io error")]
    Io,
    #[error("parse error")]
    Parse,
    #[error("inheritance cycle")]
    Cycle,
    #[error("import conflict")]
    ImportConflict,
    #[error("selector error")]
    Selector,
    #[error("unresolved placeholder")]
    UnresolvedPlaceholder,
    #[error("validation error")]
    Validation,
}

/// A single engine error: its category, the file/path chain that led to it,
/// a human-readable message, and (when applicable) nearby valid alternatives.
#[derive(Debug, Clone)]
pub struct EngineError {
    pub kind: ErrorKind,
    pub path_chain: Vec<PathBuf>,
    pub message: String,
    pub candidates: Vec<String>,
}

impl EngineError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            path_chain: Vec::new(),
            message: message.into(),
            candidates: Vec::new(),
        }
    }

    pub fn io(err: impl fmt::Display, path: impl AsRef<Path>) -> Self {
        Self::new(
            ErrorKind::Io,
            format!("I/O error while reading {}: {err}", path.as_ref().display()),
        )
        .with_path(path)
    }

    pub fn parse(err: impl fmt::Display, path: impl AsRef<Path>) -> Self {
        Self::new(ErrorKind::Parse, format!("failed to parse YAML: {err}")).with_path(path)
    }

    pub fn version(found: impl fmt::Display, path: impl AsRef<Path>) -> Self {
        Self::new(
            ErrorKind::Parse,
            format!("unsupported version \"{found}\", this build supports \"2.0\""),
        )
        .with_path(path)
    }

    pub fn cycle(chain: &[PathBuf]) -> Self {
        let joined = chain
            .iter()
            .map(|p| p.display().to_string())
            .collect::<Vec<_>>()
            .join(" -> ");
        Self::new(ErrorKind::Cycle, format!("inheritance/import cycle: {joined}"))
    }

    pub fn import_conflict(conflicts: &[(String, Vec<PathBuf>)]) -> Self {
        let mut lines = Vec::new();
        for (key, sources) in conflicts {
            let srcs = sources
                .iter()
                .map(|p| p.display().to_string())
                .collect::<Vec<_>>()
                .join(", ");
            lines.push(format!("key '{key}' present in: {srcs}"));
        }
        Self::new(
            ErrorKind::ImportConflict,
            format!(
                "duplicate variation keys across multi-source import:\n{}",
                lines.join("\n")
            ),
        )
    }

    pub fn selector(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Selector, message)
    }

    pub fn unresolved_placeholder(name: &str, candidates: Vec<String>) -> Self {
        Self {
            kind: ErrorKind::UnresolvedPlaceholder,
            path_chain: Vec::new(),
            message: format!("unresolved placeholder '{{{name}}}': no declared import or chunk field"),
            candidates,
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    pub fn with_path(mut self, path: impl AsRef<Path>) -> Self {
        self.path_chain.push(path.as_ref().to_path_buf());
        self
    }
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.kind)?;
        writeln!(f, "- {}", self.message)?;
        for p in &self.path_chain {
            writeln!(f, "  in: {}", p.display())?;
        }
        if !self.candidates.is_empty() {
            writeln!(f, "  did you mean: {}?", self.candidates.join(", "))?;
        }
        Ok(())
    }
}

impl std::error::Error for EngineError {}

pub type EngineResult<T> = Result<T, EngineError>;
