//! EOS Standards
//!
//! Reads standards documents and turns the verification blocks embedded in
//! them into typed test definitions.
//!
//! # Pipeline
//!
//! ```text
//! (path, content) → Document → BlockExtractor → VerificationBlockRegion
//!                                   → TestDeclarator → TestDefinition
//!                                         ↓
//!                          Corpus { tests, diagnostics, digest }
//! ```
//!
//! Problems inside a document never abort the pipeline; they become
//! [`Diagnostic`]s carried by the [`Corpus`].
//!
//! # Example
//!
//! ```rust
//! use eos_standards::{Corpus, DocumentLoader};
//!
//! let docs = DocumentLoader::from_pairs([(
//!     "testing.md",
//!     "<verification-block context-check=\"t\">\n\
//!      <test name=\"ok\">\nTEST: exit 0\n</test>\n</verification-block>\n",
//! )]);
//! let corpus = Corpus::build(&docs);
//! assert_eq!(corpus.tests()[0].name, "ok");
//! assert!(corpus.tests()[0].required);
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

pub mod corpus;
pub mod declare;
pub mod document;
pub mod error;
pub mod extract;
pub mod markdown;

// Re-exports for convenience
pub use corpus::{Corpus, DocumentSummary};
pub use declare::{Declaration, Field, TestDeclarator, TestDefinition, TestOrigin};
pub use document::{Document, DocumentLoader};
pub use error::{Diagnostic, DiagnosticKind, LoadError, Severity};
pub use extract::{BlockExtractor, Extraction, RawTestRegion, SourceLine, VerificationBlockRegion};
pub use markdown::{DocumentOutline, Heading};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for working with standards documents
    pub use crate::corpus::Corpus;
    pub use crate::declare::TestDefinition;
    pub use crate::document::{Document, DocumentLoader};
    pub use crate::error::{Diagnostic, DiagnosticKind, LoadError};
}
