//! Verification runner
//!
//! Drives a corpus through planning, substitution and execution:
//!
//! ```text
//! Corpus → DependencyResolver::plan → waves
//!   wave: settle statically (cycle, missing, blocked, cancelled, unresolved)
//!         run the rest through the CommandExecutor (≤ max_parallel at once)
//!   → ReportAggregator → RunReport
//! ```
//!
//! A test never starts before every dependency has a terminal status.

use crate::config::RunConfig;
use crate::executor::{CommandExecutor, ShellExecutor};
use crate::report::{ExecutionResult, ReportAggregator, RunReport, TestStatus};
use crate::scheduler::{DependencyResolver, Disposition, PlannedTest};
use crate::substitution::VariableResolver;
use eos_standards::{Corpus, Document, TestDefinition};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared run-wide cancellation flag
///
/// Tests that have not started when the flag is raised settle as
/// [`TestStatus::SkippedCancelled`]. Running commands are left to finish.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    /// Create a raised-never handle
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// A test that cannot be evaluated, found without executing anything
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreflightFinding {
    /// Test name
    pub test: String,
    /// Status the test would settle with
    pub status: TestStatus,
    /// Reason
    pub detail: String,
    /// The test is required and blocking
    pub gate: bool,
}

enum Settlement {
    Finished(ExecutionResult),
    Ready(ExecutionResult, String),
}

/// Runs verification tests
pub struct VerificationRunner {
    config: RunConfig,
    executor: Arc<dyn CommandExecutor>,
    resolver: VariableResolver,
    cancel: CancelHandle,
}

impl VerificationRunner {
    /// Create runner executing through the configured shell
    #[must_use]
    pub fn new(config: RunConfig) -> Self {
        let executor = Arc::new(ShellExecutor::from_config(&config));
        Self::with_executor(config, executor)
    }

    /// Create with custom command executor
    #[must_use]
    pub fn with_executor(config: RunConfig, executor: Arc<dyn CommandExecutor>) -> Self {
        Self {
            resolver: VariableResolver::from_config(&config),
            config,
            executor,
            cancel: CancelHandle::new(),
        }
    }

    /// Active configuration
    #[inline]
    #[must_use]
    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Handle that cancels this runner's runs
    #[must_use]
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Parse `documents` and run every declared test
    pub async fn run_documents(&self, documents: &[Document]) -> RunReport {
        let corpus = Corpus::build(documents);
        self.run_corpus(&corpus).await
    }

    /// Run every test of `corpus`
    pub async fn run_corpus(&self, corpus: &Corpus) -> RunReport {
        let tests = corpus.tests();
        let plan = DependencyResolver::new().plan(tests);
        let mut outcomes: Vec<Option<TestStatus>> = vec![None; tests.len()];
        let mut results = Vec::with_capacity(tests.len());

        tracing::info!(
            tests = tests.len(),
            waves = plan.wave_count(),
            max_parallel = self.config.max_parallel,
            "verification run started"
        );

        for (wave, planned_wave) in plan.waves().enumerate() {
            let mut slots: Vec<Option<ExecutionResult>> = vec![None; planned_wave.len()];
            let mut runnable = Vec::new();

            for (pos, planned) in planned_wave.iter().enumerate() {
                match self.settle(tests, planned, &outcomes) {
                    Settlement::Finished(result) => {
                        self.check_fail_fast(&result);
                        slots[pos] = Some(result);
                    }
                    Settlement::Ready(result, command) => runnable.push((pos, result, command)),
                }
            }

            tracing::debug!(wave, runnable = runnable.len(), "executing wave");

            let executed: Vec<(usize, ExecutionResult)> = stream::iter(runnable)
                .map(|(pos, result, command)| async move {
                    (pos, self.execute(result, command).await)
                })
                .buffer_unordered(self.config.max_parallel.max(1))
                .collect()
                .await;
            for (pos, result) in executed {
                slots[pos] = Some(result);
            }

            for (planned, result) in planned_wave.iter().zip(slots) {
                if let Some(result) = result {
                    outcomes[planned.index] = Some(result.status);
                    log_result(&result);
                    results.push(result);
                }
            }
        }

        for planned in plan.unscheduled() {
            if let Settlement::Finished(result) = self.settle(tests, planned, &outcomes) {
                outcomes[planned.index] = Some(result.status);
                log_result(&result);
                results.push(result);
            }
        }

        let report = ReportAggregator::aggregate(results, corpus);
        tracing::info!(
            run_id = %report.run_id,
            overall = %report.overall_status,
            passed = report.summary.passed,
            failed = report.summary.failed,
            skipped = report.summary.skipped,
            errored = report.summary.errored,
            "verification run finished"
        );
        report
    }

    /// Settle what can be decided without executing
    fn settle(
        &self,
        tests: &[TestDefinition],
        planned: &PlannedTest,
        outcomes: &[Option<TestStatus>],
    ) -> Settlement {
        let test = &tests[planned.index];
        let resolution = self.resolver.resolve(test);
        let mut result = ExecutionResult::new(test, TestStatus::Passed);

        match &resolution {
            Ok(resolved) => {
                result.resolved_command = Some(resolved.command.clone());
                result.resolved_error_message = resolved.error_message.clone();
                result.resolved_fix_command = resolved.fix_command.clone();
            }
            Err(_) => {
                result.resolved_error_message = self.resolver.render_lenient(&test.error_message);
                result.resolved_fix_command = test
                    .fix_command
                    .as_deref()
                    .map(|fix| self.resolver.render_lenient(fix));
            }
        }

        let (status, detail) = if let Some(skip) = static_skip(&planned.disposition) {
            skip
        } else if self.cancel.is_cancelled() {
            (TestStatus::SkippedCancelled, "run cancelled before start".to_string())
        } else if let Some((dep, dep_status)) = blocking_dependency(tests, planned, outcomes) {
            (
                TestStatus::SkippedDependencyFailed,
                format!("dependency '{}' did not pass ({dep_status})", tests[dep].name),
            )
        } else {
            match resolution {
                Ok(resolved) => return Settlement::Ready(result, resolved.command),
                Err(err) => (TestStatus::ErrorUnresolvedVariable, err.to_string()),
            }
        };

        result.status = status;
        result.detail = Some(detail);
        Settlement::Finished(result)
    }

    async fn execute(&self, mut result: ExecutionResult, command: String) -> ExecutionResult {
        if self.cancel.is_cancelled() {
            result.status = TestStatus::SkippedCancelled;
            result.detail = Some("run cancelled before start".to_string());
            return result;
        }

        tracing::debug!(test = %result.test, command = %command, "executing");
        let timeout = self.config.timeout();

        match self.executor.execute(&command, timeout).await {
            Ok(output) => {
                result.duration_ms = u64::try_from(output.duration.as_millis()).unwrap_or(u64::MAX);
                result.exit_code = output.exit_code;
                result.stdout = output.stdout;
                result.stderr = output.stderr;
                let (status, detail) = if output.timed_out {
                    (
                        TestStatus::Failed,
                        Some(format!("timed out after {}s", timeout.as_secs())),
                    )
                } else {
                    match output.exit_code {
                        Some(0) => (TestStatus::Passed, None),
                        Some(code) => (TestStatus::Failed, Some(format!("exit code {code}"))),
                        None => (TestStatus::Failed, Some("terminated by signal".to_string())),
                    }
                };
                result.status = status;
                result.detail = detail;
            }
            Err(err) => {
                result.status = TestStatus::Failed;
                result.detail = Some(err.to_string());
            }
        }

        self.check_fail_fast(&result);
        result
    }

    fn check_fail_fast(&self, result: &ExecutionResult) {
        if self.config.fail_fast && result.is_gate_failure() && !self.cancel.is_cancelled() {
            tracing::warn!(test = %result.test, "gate failed, cancelling remaining tests");
            self.cancel.cancel();
        }
    }

    /// Find every test that cannot be evaluated, without executing anything
    #[must_use]
    pub fn preflight(&self, corpus: &Corpus) -> Vec<PreflightFinding> {
        let tests = corpus.tests();
        let plan = DependencyResolver::new().plan(tests);
        let mut blocked = vec![false; tests.len()];
        let mut findings = Vec::new();

        for planned in plan.order() {
            let test = &tests[planned.index];
            let finding = static_skip(&planned.disposition).or_else(|| {
                if let Some(&dep) = planned.dependencies.iter().find(|&&d| blocked[d]) {
                    Some((
                        TestStatus::SkippedDependencyFailed,
                        format!("dependency '{}' cannot be evaluated", tests[dep].name),
                    ))
                } else {
                    self.resolver
                        .resolve(test)
                        .err()
                        .map(|err| (TestStatus::ErrorUnresolvedVariable, err.to_string()))
                }
            });

            if let Some((status, detail)) = finding {
                blocked[planned.index] = true;
                findings.push(PreflightFinding {
                    test: test.name.clone(),
                    status,
                    detail,
                    gate: test.is_gate(),
                });
            }
        }

        findings
    }
}

/// Status for tests the plan rules out before anything runs
fn static_skip(disposition: &Disposition) -> Option<(TestStatus, String)> {
    match disposition {
        Disposition::Schedule => None,
        Disposition::MissingDependency { missing } => Some((
            TestStatus::SkippedMissingDependency,
            format!("unknown dependency: {}", missing.join(", ")),
        )),
        Disposition::AmbiguousDependency { ambiguous } => Some((
            TestStatus::SkippedMissingDependency,
            format!(
                "ambiguous dependency: {} (declared in several other context-checks)",
                ambiguous.join(", ")
            ),
        )),
        Disposition::CircularDependency { via } => Some((
            TestStatus::SkippedCircularDependency,
            format!("dependency cycle: {}", via.join(" -> ")),
        )),
    }
}

/// First dependency whose outcome blocks `planned`
///
/// A dependency blocks when it did not pass and is either required or never
/// ran. A non-required dependency that ran and failed does not block.
fn blocking_dependency(
    tests: &[TestDefinition],
    planned: &PlannedTest,
    outcomes: &[Option<TestStatus>],
) -> Option<(usize, TestStatus)> {
    planned.dependencies.iter().find_map(|&dep| {
        let status = outcomes[dep]?;
        let blocks = status != TestStatus::Passed && (tests[dep].required || !status.ran());
        blocks.then_some((dep, status))
    })
}

fn log_result(result: &ExecutionResult) {
    match result.status {
        TestStatus::Passed => tracing::info!(
            test = %result.test,
            status = %result.status,
            duration_ms = result.duration_ms,
            "test settled"
        ),
        _ => tracing::info!(
            test = %result.test,
            status = %result.status,
            detail = result.detail.as_deref().unwrap_or(""),
            "test settled"
        ),
    }
}
