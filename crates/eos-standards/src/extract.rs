//! Verification block extraction
//!
//! Scans a document line by line for block and test markers:
//!
//! ```text
//! <verification-block context-check="architecture">
//! <test name="tsconfig-strict">
//! TEST: grep -q '"strict": true' tsconfig.json
//! </test>
//! </verification-block>
//! ```
//!
//! Markers must sit alone on their line (surrounding whitespace is ignored).
//! Nesting is exactly two levels. A structural error stops the scan of that
//! document; complete blocks found before it are kept.

use crate::document::Document;
use crate::error::{Diagnostic, DiagnosticKind};
use once_cell::sync::Lazy;
use regex::Regex;

static BLOCK_OPEN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^<verification-block(\s[^>]*)?>$").expect("block open marker regex")
});
static BLOCK_CLOSE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^</verification-block\s*>$").expect("block close marker regex"));
static TEST_OPEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^<test(\s[^>]*)?>$").expect("test open marker regex"));
static TEST_CLOSE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^</test\s*>$").expect("test close marker regex"));
static ATTRIBUTE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"([A-Za-z_][A-Za-z0-9_-]*)\s*=\s*"([^"]*)""#).expect("attribute regex")
});

/// Attribute carrying the block identifier
pub const CONTEXT_CHECK_ATTR: &str = "context-check";
/// Attribute carrying the test identifier
pub const TEST_NAME_ATTR: &str = "name";

/// One line of a test region body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLine {
    /// 1-based line number in the document
    pub number: usize,
    /// Line text, untrimmed
    pub text: String,
}

/// Raw, unparsed test region
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawTestRegion {
    /// Value of the test marker's `name` attribute
    pub name: String,
    /// Line of the open marker
    pub line: usize,
    /// Lines between the open and close markers
    pub body: Vec<SourceLine>,
}

/// A verification block found in a document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationBlockRegion {
    /// Value of the `context-check` attribute
    pub context_check_id: String,
    /// Path of the document containing the block
    pub source_path: String,
    /// Line of the open marker
    pub line: usize,
    /// Test regions in document order
    pub raw_test_regions: Vec<RawTestRegion>,
}

/// Result of scanning one document
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extraction {
    /// Complete blocks, in document order
    pub blocks: Vec<VerificationBlockRegion>,
    /// Structural problems (at most one error, since the scan stops there)
    pub diagnostics: Vec<Diagnostic>,
}

/// Classified line
#[derive(Debug, PartialEq, Eq)]
enum Marker {
    BlockOpen(Option<String>),
    BlockClose,
    TestOpen(Option<String>),
    TestClose,
    Text,
}

impl Marker {
    fn classify(line: &str) -> Self {
        let trimmed = line.trim();
        if !trimmed.starts_with('<') {
            return Marker::Text;
        }
        if let Some(caps) = BLOCK_OPEN.captures(trimmed) {
            return Marker::BlockOpen(attribute(
                caps.get(1).map_or("", |m| m.as_str()),
                CONTEXT_CHECK_ATTR,
            ));
        }
        if BLOCK_CLOSE.is_match(trimmed) {
            return Marker::BlockClose;
        }
        if let Some(caps) = TEST_OPEN.captures(trimmed) {
            return Marker::TestOpen(attribute(
                caps.get(1).map_or("", |m| m.as_str()),
                TEST_NAME_ATTR,
            ));
        }
        if TEST_CLOSE.is_match(trimmed) {
            return Marker::TestClose;
        }
        Marker::Text
    }
}

/// Non-empty value of attribute `name`
fn attribute(attrs: &str, name: &str) -> Option<String> {
    ATTRIBUTE
        .captures_iter(attrs)
        .find(|caps| &caps[1] == name)
        .map(|caps| caps[2].trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Scanner state
enum State {
    Outside,
    InBlock(VerificationBlockRegion),
    InTest(VerificationBlockRegion, RawTestRegion),
}

/// Locates verification blocks and their test regions
#[derive(Debug, Clone, Copy, Default)]
pub struct BlockExtractor;

impl BlockExtractor {
    /// Create new extractor
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Scan a document
    #[must_use]
    pub fn extract(&self, document: &Document) -> Extraction {
        let path = document.path();
        let mut extraction = Extraction::default();
        let mut state = State::Outside;

        for (idx, text) in document.content().lines().enumerate() {
            let number = idx + 1;
            let marker = Marker::classify(text);

            state = match (state, marker) {
                (State::Outside, Marker::Text) => State::Outside,
                (State::Outside, Marker::BlockOpen(Some(id))) => {
                    State::InBlock(VerificationBlockRegion {
                        context_check_id: id,
                        source_path: path.to_string(),
                        line: number,
                        raw_test_regions: Vec::new(),
                    })
                }
                (State::Outside | State::InBlock(_), Marker::BlockOpen(None)) => {
                    return stop(
                        extraction,
                        missing_attr(path, number, CONTEXT_CHECK_ATTR, "verification-block"),
                    );
                }
                (State::Outside, Marker::TestOpen(_)) => {
                    return stop(
                        extraction,
                        Diagnostic::new(
                            DiagnosticKind::TestOutsideBlock,
                            path,
                            number,
                            "test marker outside of a verification block",
                        ),
                    );
                }
                (State::Outside, Marker::BlockClose | Marker::TestClose) => {
                    return stop(extraction, unexpected_close(path, number, text));
                }

                (State::InBlock(block), Marker::Text) => State::InBlock(block),
                (State::InBlock(block), Marker::BlockClose) => {
                    extraction.blocks.push(block);
                    State::Outside
                }
                (State::InBlock(block), Marker::BlockOpen(Some(_))) => {
                    return stop(
                        extraction,
                        Diagnostic::new(
                            DiagnosticKind::UnterminatedBlock,
                            path,
                            block.line,
                            format!(
                                "verification block '{}' is not closed before the next \
                                 block at line {number}",
                                block.context_check_id
                            ),
                        ),
                    );
                }
                (State::InBlock(block), Marker::TestOpen(Some(name))) => State::InTest(
                    block,
                    RawTestRegion {
                        name,
                        line: number,
                        body: Vec::new(),
                    },
                ),
                (State::InBlock(_), Marker::TestOpen(None)) => {
                    return stop(extraction, missing_attr(path, number, TEST_NAME_ATTR, "test"));
                }
                (State::InBlock(_), Marker::TestClose) => {
                    return stop(extraction, unexpected_close(path, number, text));
                }

                (State::InTest(block, mut test), Marker::Text) => {
                    test.body.push(SourceLine {
                        number,
                        text: text.to_string(),
                    });
                    State::InTest(block, test)
                }
                (State::InTest(mut block, test), Marker::TestClose) => {
                    block.raw_test_regions.push(test);
                    State::InBlock(block)
                }
                (State::InTest(_, test), Marker::TestOpen(_)) => {
                    return stop(
                        extraction,
                        Diagnostic::new(
                            DiagnosticKind::NestedTest,
                            path,
                            number,
                            format!("test region nested inside test '{}'", test.name),
                        )
                        .with_test(test.name),
                    );
                }
                (State::InTest(_, test), Marker::BlockOpen(_) | Marker::BlockClose) => {
                    return stop(extraction, unterminated_test(path, &test, Some(number)));
                }
            };
        }

        match state {
            State::Outside => extraction,
            State::InBlock(block) => stop(
                extraction,
                Diagnostic::new(
                    DiagnosticKind::UnterminatedBlock,
                    path,
                    block.line,
                    format!(
                        "verification block '{}' is not closed before end of document",
                        block.context_check_id
                    ),
                ),
            ),
            State::InTest(_, test) => stop(extraction, unterminated_test(path, &test, None)),
        }
    }
}

fn stop(mut extraction: Extraction, diagnostic: Diagnostic) -> Extraction {
    tracing::warn!(%diagnostic, "verification block scan stopped");
    extraction.diagnostics.push(diagnostic);
    extraction
}

fn missing_attr(path: &str, line: usize, attr: &str, marker: &str) -> Diagnostic {
    Diagnostic::new(
        DiagnosticKind::MissingAttribute,
        path,
        line,
        format!("{marker} marker has no '{attr}' attribute"),
    )
}

fn unexpected_close(path: &str, line: usize, text: &str) -> Diagnostic {
    Diagnostic::new(
        DiagnosticKind::UnexpectedClose,
        path,
        line,
        format!("close marker '{}' has no matching open marker", text.trim()),
    )
}

fn unterminated_test(path: &str, test: &RawTestRegion, next_marker: Option<usize>) -> Diagnostic {
    let message = match next_marker {
        Some(line) => format!("test '{}' is not closed before line {line}", test.name),
        None => format!("test '{}' is not closed before end of document", test.name),
    };
    Diagnostic::new(DiagnosticKind::UnterminatedTest, path, test.line, message)
        .with_test(test.name.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn extract(content: &str) -> Extraction {
        BlockExtractor::new().extract(&Document::new("doc.md", content))
    }

    #[test]
    fn extracts_blocks_and_tests_in_order() {
        let content = r#"# Architecture

Prose before.

<verification-block context-check="arch">
Some prose inside the block.
<test name="first">
TEST: exit 0
</test>
  <test name="second">
  TEST: exit 1
  </test>
</verification-block>

<verification-block context-check="testing">
</verification-block>
"#;
        let extraction = extract(content);
        assert!(extraction.diagnostics.is_empty());
        assert_eq!(extraction.blocks.len(), 2);

        let arch = &extraction.blocks[0];
        assert_eq!(arch.context_check_id, "arch");
        assert_eq!(arch.line, 5);
        assert_eq!(arch.source_path, "doc.md");
        let names: Vec<_> = arch.raw_test_regions.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["first", "second"]);
        assert_eq!(arch.raw_test_regions[0].body[0].number, 8);
        assert_eq!(arch.raw_test_regions[0].body[0].text, "TEST: exit 0");

        assert!(extraction.blocks[1].raw_test_regions.is_empty());
    }

    #[test]
    fn document_without_markers_is_empty() {
        let extraction = extract("# Just prose\n\n<div>html</div>\n<tests>\n");
        assert_eq!(extraction, Extraction::default());
    }

    #[test]
    fn unterminated_block_keeps_earlier_blocks() {
        let content = r#"<verification-block context-check="ok">
<test name="a">
TEST: exit 0
</test>
</verification-block>
<verification-block context-check="broken">
<test name="b">
TEST: exit 0
</test>
"#;
        let extraction = extract(content);
        assert_eq!(extraction.blocks.len(), 1);
        assert_eq!(extraction.blocks[0].context_check_id, "ok");
        assert_eq!(extraction.diagnostics.len(), 1);
        assert_eq!(extraction.diagnostics[0].kind, DiagnosticKind::UnterminatedBlock);
        assert_eq!(extraction.diagnostics[0].line, 6);
    }

    #[test]
    fn second_block_open_terminates_scan() {
        let content = r#"<verification-block context-check="one">
<verification-block context-check="two">
</verification-block>
"#;
        let extraction = extract(content);
        assert!(extraction.blocks.is_empty());
        assert_eq!(extraction.diagnostics[0].kind, DiagnosticKind::UnterminatedBlock);
    }

    #[test]
    fn nested_test_is_an_error() {
        let content = r#"<verification-block context-check="x">
<test name="outer">
<test name="inner">
TEST: exit 0
</test>
</test>
</verification-block>
"#;
        let extraction = extract(content);
        assert!(extraction.blocks.is_empty());
        assert_eq!(extraction.diagnostics[0].kind, DiagnosticKind::NestedTest);
        assert_eq!(extraction.diagnostics[0].line, 3);
        assert_eq!(extraction.diagnostics[0].test.as_deref(), Some("outer"));
    }

    #[test]
    fn test_closed_by_block_close_is_unterminated() {
        let content = r#"<verification-block context-check="x">
<test name="t">
TEST: exit 0
</verification-block>
"#;
        let extraction = extract(content);
        assert_eq!(extraction.diagnostics[0].kind, DiagnosticKind::UnterminatedTest);
        assert_eq!(extraction.diagnostics[0].line, 2);
    }

    #[test]
    fn test_outside_block_is_an_error() {
        let extraction = extract("<test name=\"t\">\nTEST: exit 0\n</test>\n");
        assert_eq!(extraction.diagnostics[0].kind, DiagnosticKind::TestOutsideBlock);
    }

    #[test]
    fn missing_attributes_are_errors() {
        let extraction = extract("<verification-block>\n</verification-block>\n");
        assert_eq!(extraction.diagnostics[0].kind, DiagnosticKind::MissingAttribute);

        let extraction = extract(
            "<verification-block context-check=\"x\">\n<test id=\"t\">\n</test>\n\
             </verification-block>\n",
        );
        assert_eq!(extraction.diagnostics[0].kind, DiagnosticKind::MissingAttribute);
        assert_eq!(extraction.diagnostics[0].line, 2);
    }

    #[test]
    fn stray_close_marker_is_an_error() {
        let extraction = extract("prose\n</verification-block>\n");
        assert_eq!(extraction.diagnostics[0].kind, DiagnosticKind::UnexpectedClose);
        assert_eq!(extraction.diagnostics[0].line, 2);
    }

    #[test]
    fn markers_inside_code_fences_are_recognised() {
        let content = "```xml\n<verification-block context-check=\"fenced\">\n\
                       <test name=\"t\">\nTEST: exit 0\n</test>\n</verification-block>\n```\n";
        let extraction = extract(content);
        assert_eq!(extraction.blocks.len(), 1);
        assert_eq!(extraction.blocks[0].raw_test_regions.len(), 1);
    }
}
