//! Error and diagnostic types for the standards corpus
//!
//! Two kinds of failure live here:
//! - [`LoadError`]: the corpus could not be read at all (ingress I/O)
//! - [`Diagnostic`]: a localized problem inside one document. Diagnostics are
//!   collected and reported, never raised.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Errors while reading documents from the filesystem
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    /// Path given by the caller does not exist
    #[error("path does not exist: {}", .0.display())]
    NotFound(PathBuf),

    /// IO error during read or directory walk
    #[error("io error reading {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// File content is not UTF-8 text
    #[error("document is not valid UTF-8: {}", .0.display())]
    InvalidUtf8(PathBuf),
}

impl LoadError {
    /// Create IO error for path
    pub fn io_error(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        if source.kind() == std::io::ErrorKind::NotFound {
            return Self::NotFound(path.into());
        }
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// How serious a diagnostic is
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Reported, the affected region is still used
    Warning,
    /// The affected region (or the rest of the document) is dropped
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Warning => write!(f, "warning"),
            Severity::Error => write!(f, "error"),
        }
    }
}

/// Classified parse problem
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    /// Block opened but never closed
    UnterminatedBlock,
    /// Test opened but never closed
    UnterminatedTest,
    /// Test region opened inside another test region
    NestedTest,
    /// Test marker found outside any verification block
    TestOutsideBlock,
    /// Close marker without a matching open marker
    UnexpectedClose,
    /// Open marker without its identifying attribute
    MissingAttribute,
    /// Test name is not an identifier
    InvalidName,
    /// Test region without a `TEST` line
    MissingTestField,
    /// `REQUIRED` / `BLOCKING` value is not `true` or `false`
    InvalidBoolean,
    /// `DEPENDS_ON` / `VARIABLES` value is not a quoted identifier list
    InvalidList,
    /// Field declared more than once in a test region
    DuplicateField,
    /// `UPPER_CASE:` line that is not a known field
    UnknownField,
    /// Line inside a test region that is not a field
    UnrecognizedLine,
    /// Same `context-check` id used by two blocks
    DuplicateContextCheck,
    /// Same test name declared twice under one `context-check` id
    DuplicateTestName,
}

impl DiagnosticKind {
    /// Severity implied by this kind
    #[must_use]
    pub fn severity(self) -> Severity {
        match self {
            DiagnosticKind::InvalidBoolean
            | DiagnosticKind::DuplicateField
            | DiagnosticKind::UnknownField
            | DiagnosticKind::UnrecognizedLine
            | DiagnosticKind::DuplicateContextCheck => Severity::Warning,
            _ => Severity::Error,
        }
    }
}

/// A located, classified problem found while parsing a document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{document}:{line}: {severity}: {message}")]
pub struct Diagnostic {
    /// Warning or error
    pub severity: Severity,
    /// Problem class
    pub kind: DiagnosticKind,
    /// Document path
    pub document: String,
    /// 1-based line number
    pub line: usize,
    /// Human readable message
    pub message: String,
    /// Test the problem belongs to, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub test: Option<String>,
}

impl Diagnostic {
    /// Create diagnostic; severity follows the kind
    pub fn new(
        kind: DiagnosticKind,
        document: impl Into<String>,
        line: usize,
        message: impl Into<String>,
    ) -> Self {
        Self {
            severity: kind.severity(),
            kind,
            document: document.into(),
            line,
            message: message.into(),
            test: None,
        }
    }

    /// Attach the test name
    #[must_use]
    pub fn with_test(mut self, test: impl Into<String>) -> Self {
        self.test = Some(test.into());
        self
    }

    /// Whether this diagnostic dropped content
    #[inline]
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}
