//! Run results and report rendering

use crate::error::VerifyResult;
use chrono::{DateTime, Utc};
use eos_standards::{Corpus, Diagnostic, DocumentSummary, TestDefinition};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Write as _};
use ulid::Ulid;

/// Unique run identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RunId(pub Ulid);

impl RunId {
    /// Generate new run ID
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Terminal status of one test
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestStatus {
    /// Command exited 0
    Passed,
    /// Non-zero exit, signal, timeout or spawn failure
    Failed,
    /// A blocking dependency did not pass
    SkippedDependencyFailed,
    /// Member of or downstream of a dependency cycle
    SkippedCircularDependency,
    /// A `DEPENDS_ON` target does not exist
    SkippedMissingDependency,
    /// The run was cancelled before the test started
    SkippedCancelled,
    /// A required variable had no usable value
    ErrorUnresolvedVariable,
}

impl TestStatus {
    /// Stable snake_case name
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            TestStatus::Passed => "passed",
            TestStatus::Failed => "failed",
            TestStatus::SkippedDependencyFailed => "skipped_dependency_failed",
            TestStatus::SkippedCircularDependency => "skipped_circular_dependency",
            TestStatus::SkippedMissingDependency => "skipped_missing_dependency",
            TestStatus::SkippedCancelled => "skipped_cancelled",
            TestStatus::ErrorUnresolvedVariable => "error_unresolved_variable",
        }
    }

    /// Command was actually executed
    #[inline]
    #[must_use]
    pub fn ran(self) -> bool {
        matches!(self, TestStatus::Passed | TestStatus::Failed)
    }

    /// Any skipped variant
    #[must_use]
    pub fn is_skipped(self) -> bool {
        matches!(
            self,
            TestStatus::SkippedDependencyFailed
                | TestStatus::SkippedCircularDependency
                | TestStatus::SkippedMissingDependency
                | TestStatus::SkippedCancelled
        )
    }

    fn marker(self) -> &'static str {
        match self {
            TestStatus::Passed => "✅",
            TestStatus::Failed => "❌",
            TestStatus::ErrorUnresolvedVariable => "⚠️",
            _ => "⏭️",
        }
    }
}

impl fmt::Display for TestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of settling one test
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// Test name
    pub test: String,
    /// Terminal status
    pub status: TestStatus,
    /// Copied from the definition
    pub required: bool,
    /// Copied from the definition
    pub blocking: bool,
    /// Declaring document
    pub document: String,
    /// Declaring block
    pub context_check_id: String,
    /// Exit code when the command ran to completion
    pub exit_code: Option<i32>,
    /// Captured stdout
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub stdout: String,
    /// Captured stderr
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub stderr: String,
    /// Command after substitution, absent when substitution failed
    pub resolved_command: Option<String>,
    /// Error message after substitution
    pub resolved_error_message: String,
    /// Fix command after substitution
    pub resolved_fix_command: Option<String>,
    /// Why the status was assigned
    pub detail: Option<String>,
    /// Wall-clock execution time
    pub duration_ms: u64,
}

impl ExecutionResult {
    /// Result for `test` with nothing executed yet
    #[must_use]
    pub fn new(test: &TestDefinition, status: TestStatus) -> Self {
        Self {
            test: test.name.clone(),
            status,
            required: test.required,
            blocking: test.blocking,
            document: test.origin.document.clone(),
            context_check_id: test.origin.context_check_id.clone(),
            exit_code: None,
            stdout: String::new(),
            stderr: String::new(),
            resolved_command: None,
            resolved_error_message: test.error_message.clone(),
            resolved_fix_command: test.fix_command.clone(),
            detail: None,
            duration_ms: 0,
        }
    }

    /// With detail
    #[must_use]
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    /// Required, blocking and not passed: fails the run
    #[inline]
    #[must_use]
    pub fn is_gate_failure(&self) -> bool {
        self.required && self.blocking && self.status != TestStatus::Passed
    }
}

/// Run verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverallStatus {
    /// No required+blocking test failed to pass
    Success,
    /// At least one gate failure
    Failure,
}

impl fmt::Display for OverallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OverallStatus::Success => write!(f, "SUCCESS"),
            OverallStatus::Failure => write!(f, "FAILURE"),
        }
    }
}

/// Counts per status family
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    /// All results
    pub total: usize,
    /// Passed
    pub passed: usize,
    /// Failed
    pub failed: usize,
    /// Any skipped variant
    pub skipped: usize,
    /// Unresolved variables
    pub errored: usize,
    /// Parse diagnostics
    pub diagnostics: usize,
}

/// Complete verification report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    /// Run identifier
    pub run_id: RunId,
    /// Report creation time
    pub generated_at: DateTime<Utc>,
    /// blake3 digest of the input documents
    pub corpus_digest: String,
    /// Loaded documents in input order
    pub documents: Vec<DocumentSummary>,
    /// Results in execution order
    pub results: Vec<ExecutionResult>,
    /// Run verdict
    pub overall_status: OverallStatus,
    /// Names of gate failures in result order
    pub failing_blocking_tests: Vec<String>,
    /// Parse diagnostics
    pub diagnostics: Vec<Diagnostic>,
    /// Status counts
    pub summary: RunSummary,
}

impl RunReport {
    /// Process exit code: 1 on failure, 0 otherwise
    #[inline]
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self.overall_status {
            OverallStatus::Success => 0,
            OverallStatus::Failure => 1,
        }
    }

    /// Result for a test by name
    #[must_use]
    pub fn result(&self, test: &str) -> Option<&ExecutionResult> {
        self.results.iter().find(|r| r.test == test)
    }

    /// Result for a test by `context-check` id and name
    #[must_use]
    pub fn result_in(&self, context_check_id: &str, test: &str) -> Option<&ExecutionResult> {
        self.results
            .iter()
            .find(|r| r.context_check_id == context_check_id && r.test == test)
    }

    /// Pretty JSON
    ///
    /// # Errors
    /// Returns `VerifyError::Report` if serialization fails.
    pub fn to_json(&self) -> VerifyResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    fn label_of<'a>(&'a self, path: &'a str) -> &'a str {
        self.documents
            .iter()
            .find(|d| d.path == path)
            .map_or(path, DocumentSummary::display_label)
    }

    /// Console rendering grouped by document category
    #[must_use]
    pub fn render_text(&self) -> String {
        const WIDTH: usize = 58;
        let mut out = String::new();

        let _ = writeln!(out, "╔{}╗", "═".repeat(WIDTH));
        let _ = writeln!(out, "║ {:<w$} ║", "EOS Verification Report", w = WIDTH - 2);
        let _ = writeln!(out, "║ {:<w$} ║", format!("run {}", self.run_id), w = WIDTH - 2);
        let _ = writeln!(out, "╚{}╝", "═".repeat(WIDTH));
        let _ = writeln!(
            out,
            "generated {} | corpus {}",
            self.generated_at.to_rfc3339(),
            self.corpus_digest.get(..12).unwrap_or(&self.corpus_digest)
        );

        let mut groups: IndexMap<&str, Vec<&ExecutionResult>> = IndexMap::new();
        for result in &self.results {
            groups
                .entry(self.label_of(&result.document))
                .or_default()
                .push(result);
        }

        for (label, results) in &groups {
            let _ = writeln!(out, "\n{label}");
            for result in results {
                render_result(&mut out, result);
            }
        }

        if !self.diagnostics.is_empty() {
            let _ = writeln!(out, "\nDiagnostics");
            for diagnostic in &self.diagnostics {
                let marker = if diagnostic.is_error() { "❌" } else { "⚠️" };
                let _ = writeln!(out, "  {marker} {diagnostic}");
            }
        }

        let s = &self.summary;
        let _ = write!(
            out,
            "\nSummary: {} tests, {} passed, {} failed, {} skipped, {} errors, {} diagnostics | {}",
            s.total, s.passed, s.failed, s.skipped, s.errored, s.diagnostics, self.overall_status
        );
        if !self.failing_blocking_tests.is_empty() {
            let _ = write!(out, " (blocking: {})", self.failing_blocking_tests.join(", "));
        }
        out.push('\n');
        out
    }
}

fn render_result(out: &mut String, result: &ExecutionResult) {
    let mut flags = Vec::new();
    if !result.required {
        flags.push("optional");
    }
    if result.blocking {
        flags.push("blocking");
    }
    let flags = if flags.is_empty() {
        String::new()
    } else {
        format!(" [{}]", flags.join(", "))
    };

    let _ = write!(out, "  {} {}{flags}", result.status.marker(), result.test);
    if result.status == TestStatus::Passed {
        let _ = writeln!(out, " ({} ms)", result.duration_ms);
        return;
    }
    let _ = writeln!(out, " ({})", result.status);
    let _ = writeln!(out, "     error: {}", result.resolved_error_message);
    if let Some(fix) = &result.resolved_fix_command {
        let _ = writeln!(out, "     fix:   {fix}");
    }
    if let Some(detail) = &result.detail {
        let _ = writeln!(out, "     why:   {detail}");
    }
}

/// Builds run reports
#[derive(Debug, Default, Clone, Copy)]
pub struct ReportAggregator;

impl ReportAggregator {
    /// Assemble the report for ordered `results` of `corpus`
    #[must_use]
    pub fn aggregate(results: Vec<ExecutionResult>, corpus: &Corpus) -> RunReport {
        let mut summary = RunSummary {
            total: results.len(),
            diagnostics: corpus.diagnostics().len(),
            ..RunSummary::default()
        };
        for result in &results {
            match result.status {
                TestStatus::Passed => summary.passed += 1,
                TestStatus::Failed => summary.failed += 1,
                TestStatus::ErrorUnresolvedVariable => summary.errored += 1,
                _ => summary.skipped += 1,
            }
        }

        let failing_blocking_tests: Vec<String> = results
            .iter()
            .filter(|r| r.is_gate_failure())
            .map(|r| r.test.clone())
            .collect();
        let overall_status = if failing_blocking_tests.is_empty() {
            OverallStatus::Success
        } else {
            OverallStatus::Failure
        };

        RunReport {
            run_id: RunId::new(),
            generated_at: Utc::now(),
            corpus_digest: corpus.digest().to_string(),
            documents: corpus.documents().to_vec(),
            results,
            overall_status,
            failing_blocking_tests,
            diagnostics: corpus.diagnostics().to_vec(),
            summary,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use eos_standards::DocumentLoader;
    use pretty_assertions::assert_eq;

    const DOC: &str = r#"---
category: Architecture
---
# Architecture

<verification-block context-check="arch">
<test name="gate">
TEST: exit 1
BLOCKING: true
ERROR: gate broke
FIX_COMMAND: make fix
</test>
<test name="soft">
TEST: exit 1
REQUIRED: false
BLOCKING: true
</test>
<test name="ok">
TEST: exit 0
</test>
</verification-block>
"#;

    fn corpus() -> Corpus {
        Corpus::build(&DocumentLoader::from_pairs([("arch.md", DOC)]))
    }

    fn result(corpus: &Corpus, name: &str, status: TestStatus) -> ExecutionResult {
        ExecutionResult::new(corpus.test(name).unwrap(), status)
    }

    #[test]
    fn gate_failure_decides_overall_status() {
        let corpus = corpus();
        let report = ReportAggregator::aggregate(
            vec![
                result(&corpus, "gate", TestStatus::Failed),
                result(&corpus, "soft", TestStatus::Failed),
                result(&corpus, "ok", TestStatus::Passed),
            ],
            &corpus,
        );
        assert_eq!(report.overall_status, OverallStatus::Failure);
        assert_eq!(report.failing_blocking_tests, vec!["gate"]);
        assert_eq!(report.exit_code(), 1);
        assert_eq!(report.summary.failed, 2);
        assert_eq!(report.summary.passed, 1);
    }

    #[test]
    fn skipped_gate_is_a_failure_but_optional_failure_is_not() {
        let corpus = corpus();
        let skipped = ReportAggregator::aggregate(
            vec![result(&corpus, "gate", TestStatus::SkippedDependencyFailed)],
            &corpus,
        );
        assert_eq!(skipped.overall_status, OverallStatus::Failure);

        let optional = ReportAggregator::aggregate(
            vec![result(&corpus, "soft", TestStatus::Failed)],
            &corpus,
        );
        assert_eq!(optional.overall_status, OverallStatus::Success);
        assert_eq!(optional.exit_code(), 0);
    }

    #[test]
    fn status_serializes_snake_case() {
        let json = serde_json::to_string(&TestStatus::SkippedCircularDependency).unwrap();
        assert_eq!(json, "\"skipped_circular_dependency\"");
        assert!(TestStatus::Failed.ran());
        assert!(!TestStatus::ErrorUnresolvedVariable.ran());
        assert!(TestStatus::SkippedCancelled.is_skipped());
    }

    #[test]
    fn text_rendering_groups_by_category() {
        let corpus = corpus();
        let report = ReportAggregator::aggregate(
            vec![
                result(&corpus, "gate", TestStatus::Failed).with_detail("exit code 1"),
                result(&corpus, "ok", TestStatus::Passed),
            ],
            &corpus,
        );
        let text = report.render_text();
        assert!(text.contains("EOS Verification Report"));
        assert!(text.contains("\nArchitecture\n"));
        assert!(text.contains("❌ gate [blocking] (failed)"));
        assert!(text.contains("error: gate broke"));
        assert!(text.contains("fix:   make fix"));
        assert!(text.contains("why:   exit code 1"));
        assert!(text.contains("✅ ok"));
        assert!(text.contains("FAILURE (blocking: gate)"));
    }

    #[test]
    fn json_report_round_trips() {
        let corpus = corpus();
        let report =
            ReportAggregator::aggregate(vec![result(&corpus, "ok", TestStatus::Passed)], &corpus);
        let json = report.to_json().unwrap();
        assert!(json.contains("\"overall_status\": \"success\""));
        let back: RunReport = serde_json::from_str(&json).unwrap();
        assert_eq!(back, report);
    }
}
