//! Error types for the verification runner
//!
//! Only invocation-level problems are errors here. Everything that goes wrong
//! while verifying (parse problems, missing variables, failing commands) is
//! classified into the run report instead.

use std::path::PathBuf;

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("io error reading config {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Config file is not valid TOML for `RunConfig`
    #[error("invalid config {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// Value out of range
    #[error("invalid configuration: {0}")]
    Invalid(String),

    /// `KEY=VALUE` assignment could not be parsed
    #[error("invalid variable assignment '{0}': expected KEY=VALUE")]
    InvalidAssignment(String),
}

/// Errors raised by a command executor
#[derive(Debug, thiserror::Error)]
pub enum ExecutorError {
    /// Shell process could not be started
    #[error("failed to spawn '{shell}': {source}")]
    Spawn {
        shell: String,
        #[source]
        source: std::io::Error,
    },

    /// Waiting for the process failed
    #[error("failed to collect process output: {0}")]
    Wait(#[source] std::io::Error),
}

/// Combined runner error
#[derive(Debug, thiserror::Error)]
pub enum VerifyError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("report serialization failed: {0}")]
    Report(#[from] serde_json::Error),

    #[error("logging setup failed: {0}")]
    Logging(String),
}

/// Result type alias for runner operations
pub type VerifyResult<T> = Result<T, VerifyError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_display() {
        let err = ConfigError::InvalidAssignment("PORT".to_string());
        assert_eq!(
            err.to_string(),
            "invalid variable assignment 'PORT': expected KEY=VALUE"
        );
    }

    #[test]
    fn error_conversions() {
        let err: VerifyError = ConfigError::Invalid("timeout_secs must be positive".into()).into();
        assert!(matches!(err, VerifyError::Config(_)));
        assert!(err.to_string().contains("timeout_secs"));
    }

    #[test]
    fn serialization_error_converts() {
        let source = serde_json::from_str::<u8>("x").unwrap_err();
        let err: VerifyError = source.into();
        assert!(err.to_string().starts_with("report serialization failed"));
    }
}
