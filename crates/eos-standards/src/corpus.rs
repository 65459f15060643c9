//! The flattened set of tests declared across every loaded document
//!
//! ```text
//! Documents → BlockExtractor → TestDeclarator → Corpus { tests, diagnostics }
//! ```
//!
//! Test names are unique within a `context-check`: a later declaration of the
//! same name under the same id is rejected. The same name under another id is
//! a distinct test. Duplicate `context-check` ids are only flagged.

use crate::declare::{TestDeclarator, TestDefinition};
use crate::document::Document;
use crate::error::{Diagnostic, DiagnosticKind};
use crate::extract::BlockExtractor;
use crate::markdown::DocumentOutline;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Per-document summary kept for reporting
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentSummary {
    /// Document path
    pub path: String,
    /// Front matter category or title
    pub label: Option<String>,
    /// Complete verification blocks found
    pub block_count: usize,
    /// Tests accepted from this document
    pub test_count: usize,
}

impl DocumentSummary {
    /// Label, falling back to the path
    #[must_use]
    pub fn display_label(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.path)
    }
}

/// Parsed standards corpus
#[derive(Debug, Clone, Default)]
pub struct Corpus {
    documents: Vec<DocumentSummary>,
    tests: Vec<TestDefinition>,
    diagnostics: Vec<Diagnostic>,
    digest: String,
}

impl Corpus {
    /// Extract and declare every test in `documents`
    #[must_use]
    pub fn build(documents: &[Document]) -> Self {
        let extractor = BlockExtractor::new();
        let declarator = TestDeclarator::new();

        let mut corpus = Corpus::default();
        let mut context_checks: IndexMap<String, (String, usize)> = IndexMap::new();
        let mut names: IndexMap<(String, String), (String, usize)> = IndexMap::new();
        let mut hasher = blake3::Hasher::new();

        for document in documents {
            hasher.update(document.path().as_bytes());
            hasher.update(&[0]);
            hasher.update(document.content().as_bytes());
            hasher.update(&[0]);

            let outline = DocumentOutline::parse(document.content());
            let extraction = extractor.extract(document);
            let mut summary = DocumentSummary {
                path: document.path().to_string(),
                label: outline.label().map(str::to_string),
                block_count: extraction.blocks.len(),
                test_count: 0,
            };

            corpus.diagnostics.extend(extraction.diagnostics);

            for block in &extraction.blocks {
                if let Some((first_doc, first_line)) = context_checks.get(&block.context_check_id) {
                    corpus.diagnostics.push(Diagnostic::new(
                        DiagnosticKind::DuplicateContextCheck,
                        document.path(),
                        block.line,
                        format!(
                            "context-check '{}' already used at {first_doc}:{first_line}",
                            block.context_check_id
                        ),
                    ));
                } else {
                    context_checks.insert(
                        block.context_check_id.clone(),
                        (document.path().to_string(), block.line),
                    );
                }

                for region in &block.raw_test_regions {
                    let declaration = declarator.declare(block, region);
                    corpus.diagnostics.extend(declaration.diagnostics);

                    let Some(mut test) = declaration.test else {
                        continue;
                    };

                    let key = (block.context_check_id.clone(), test.name.clone());
                    if let Some((first_doc, first_line)) = names.get(&key) {
                        corpus.diagnostics.push(
                            Diagnostic::new(
                                DiagnosticKind::DuplicateTestName,
                                document.path(),
                                region.line,
                                format!(
                                    "test '{}' already declared in context-check '{}' at \
                                     {first_doc}:{first_line}; this declaration was dropped",
                                    test.name, block.context_check_id
                                ),
                            )
                            .with_test(test.name.clone()),
                        );
                        continue;
                    }

                    names.insert(key, (document.path().to_string(), region.line));
                    test.origin.section = outline.section_at(region.line).map(str::to_string);
                    summary.test_count += 1;
                    corpus.tests.push(test);
                }
            }

            tracing::debug!(
                document = %summary.path,
                blocks = summary.block_count,
                tests = summary.test_count,
                "parsed standards document"
            );
            corpus.documents.push(summary);
        }

        corpus.digest = hasher.finalize().to_hex().to_string();
        tracing::info!(
            documents = corpus.documents.len(),
            tests = corpus.tests.len(),
            diagnostics = corpus.diagnostics.len(),
            "standards corpus built"
        );
        corpus
    }

    /// Tests in declaration order
    #[inline]
    #[must_use]
    pub fn tests(&self) -> &[TestDefinition] {
        &self.tests
    }

    /// Parse diagnostics in discovery order
    #[inline]
    #[must_use]
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// Document summaries in input order
    #[inline]
    #[must_use]
    pub fn documents(&self) -> &[DocumentSummary] {
        &self.documents
    }

    /// blake3 digest over all document paths and contents
    #[inline]
    #[must_use]
    pub fn digest(&self) -> &str {
        &self.digest
    }

    /// Whether any diagnostic dropped content
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(Diagnostic::is_error)
    }

    /// Look up a test by name, first declaration wins
    #[must_use]
    pub fn test(&self, name: &str) -> Option<&TestDefinition> {
        self.tests.iter().find(|t| t.name == name)
    }

    /// Look up a test by `context-check` id and name
    #[must_use]
    pub fn test_in(&self, context_check_id: &str, name: &str) -> Option<&TestDefinition> {
        self.tests
            .iter()
            .find(|t| t.origin.context_check_id == context_check_id && t.name == name)
    }
}
