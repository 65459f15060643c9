//! EOS Verify
//!
//! Runs the verification tests declared in standards documents and decides
//! whether the project meets its mandatory gates.
//!
//! # Architecture
//!
//! ```text
//! Corpus ─→ DependencyResolver ─→ ExecutionPlan (waves)
//!                                      │
//!          VariableResolver ─→ VerificationRunner ─→ CommandExecutor
//!                                      │
//!                              ReportAggregator ─→ RunReport (text / JSON)
//! ```
//!
//! # Gates
//!
//! A test that is both `REQUIRED` and `BLOCKING` is a gate. The run fails iff
//! some gate ends in any status other than passed, including skipped and
//! unresolved ones. Nothing else changes the verdict.
//!
//! # Example
//!
//! ```rust,ignore
//! use eos_standards::DocumentLoader;
//! use eos_verify::{RunConfig, VerificationRunner};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let documents = DocumentLoader::new().load_paths(&["standards"]).await?;
//! let runner = VerificationRunner::new(RunConfig::new().with_variable("PORT_WEB", "3000"));
//! let report = runner.run_documents(&documents).await;
//! println!("{}", report.render_text());
//! std::process::exit(report.exit_code());
//! # }
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

pub mod config;
pub mod error;
pub mod executor;
pub mod logging;
pub mod report;
pub mod runner;
pub mod scheduler;
pub mod substitution;

// Re-exports for convenience
pub use config::{parse_assignment, RunConfig, DEFAULT_CONFIG_FILE};
pub use error::{ConfigError, ExecutorError, VerifyError, VerifyResult};
pub use executor::{CommandExecutor, CommandOutput, ShellExecutor};
pub use report::{
    ExecutionResult, OverallStatus, ReportAggregator, RunId, RunReport, RunSummary, TestStatus,
};
pub use runner::{CancelHandle, PreflightFinding, VerificationRunner};
pub use scheduler::{DependencyResolver, Disposition, ExecutionPlan, PlannedTest};
pub use substitution::{ResolvedTest, SubstitutionError, VariableResolver};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for running verifications
    pub use crate::config::RunConfig;
    pub use crate::executor::{CommandExecutor, CommandOutput};
    pub use crate::report::{OverallStatus, RunReport, TestStatus};
    pub use crate::runner::{CancelHandle, VerificationRunner};
}
