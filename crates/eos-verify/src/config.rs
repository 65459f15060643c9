//! Run configuration
//!
//! Loaded from a TOML file (`eos-verify.toml` by convention), then
//! overridden by the caller. The `[variables]` table is the substitution map.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Conventional config file name looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "eos-verify.toml";

/// Verification run configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunConfig {
    /// Per-test wall-clock timeout in seconds
    pub timeout_secs: u64,
    /// Shell used to run `TEST` commands (`<shell> -c <command>`)
    pub shell: String,
    /// Directory commands run in
    pub working_dir: PathBuf,
    /// Maximum tests running at once (1 = sequential)
    pub max_parallel: usize,
    /// Cancel the rest of the run after the first failed gate
    pub fail_fast: bool,
    /// Fall back to process environment for unknown variables
    pub env_fallback: bool,
    /// Captured stdout/stderr cap per stream, in bytes
    pub max_output_bytes: usize,
    /// File extensions picked up when walking directories
    pub extensions: Vec<String>,
    /// Substitution values for `${NAME}` placeholders
    pub variables: BTreeMap<String, String>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            shell: "sh".to_string(),
            working_dir: PathBuf::from("."),
            max_parallel: 1,
            fail_fast: false,
            env_fallback: false,
            max_output_bytes: 64 * 1024,
            extensions: vec!["md".to_string(), "markdown".to_string()],
            variables: BTreeMap::new(),
        }
    }
}

impl RunConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse configuration from TOML text
    ///
    /// # Errors
    /// Returns `ConfigError::Parse` for malformed TOML or unknown keys, and
    /// `ConfigError::Invalid` for out-of-range values.
    pub fn from_toml_str(source: &str, origin: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let config: RunConfig = toml::from_str(source).map_err(|source| ConfigError::Parse {
            path: origin.into(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    ///
    /// # Errors
    /// Returns `ConfigError` if the file cannot be read or is invalid.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let source = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        Self::from_toml_str(&source, path)
    }

    /// Check value ranges
    ///
    /// # Errors
    /// Returns `ConfigError::Invalid` naming the offending setting.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.timeout_secs == 0 {
            return Err(ConfigError::Invalid("timeout_secs must be positive".into()));
        }
        if self.max_parallel == 0 {
            return Err(ConfigError::Invalid("max_parallel must be at least 1".into()));
        }
        if self.shell.trim().is_empty() {
            return Err(ConfigError::Invalid("shell must not be empty".into()));
        }
        Ok(())
    }

    /// Per-test timeout
    #[inline]
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// With timeout
    #[inline]
    #[must_use]
    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    /// With shell
    #[inline]
    #[must_use]
    pub fn with_shell(mut self, shell: impl Into<String>) -> Self {
        self.shell = shell.into();
        self
    }

    /// With working directory
    #[inline]
    #[must_use]
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = dir.into();
        self
    }

    /// With max parallel tests
    #[inline]
    #[must_use]
    pub fn with_max_parallel(mut self, max: usize) -> Self {
        self.max_parallel = max;
        self
    }

    /// With fail-fast cancellation
    #[inline]
    #[must_use]
    pub fn with_fail_fast(mut self, fail_fast: bool) -> Self {
        self.fail_fast = fail_fast;
        self
    }

    /// With environment fallback for variables
    #[inline]
    #[must_use]
    pub fn with_env_fallback(mut self, env_fallback: bool) -> Self {
        self.env_fallback = env_fallback;
        self
    }

    /// With one substitution variable (overrides an existing value)
    #[must_use]
    pub fn with_variable(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.variables.insert(name.into(), value.into());
        self
    }

    /// With several substitution variables
    #[must_use]
    pub fn with_variables<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.variables
            .extend(vars.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }
}

/// Parse a `KEY=VALUE` assignment (value may be empty or contain `=`)
///
/// # Errors
/// Returns `ConfigError::InvalidAssignment` when there is no `=` or the key is
/// empty.
pub fn parse_assignment(raw: &str) -> Result<(String, String), ConfigError> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(ConfigError::InvalidAssignment(raw.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn defaults() {
        let config = RunConfig::new();
        assert_eq!(config.timeout(), Duration::from_secs(30));
        assert_eq!(config.shell, "sh");
        assert_eq!(config.max_parallel, 1);
        assert!(!config.fail_fast);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn parses_toml() {
        let config = RunConfig::from_toml_str(
            r#"
timeout_secs = 5
max_parallel = 4
fail_fast = true

[variables]
PROJECT_TYPE = "web"
PORT_WEB = "3000"
"#,
            "eos-verify.toml",
        )
        .unwrap();

        assert_eq!(config.timeout_secs, 5);
        assert_eq!(config.max_parallel, 4);
        assert!(config.fail_fast);
        assert_eq!(config.shell, "sh");
        assert_eq!(config.variables.get("PORT_WEB").map(String::as_str), Some("3000"));
    }

    #[test]
    fn rejects_unknown_keys_and_bad_ranges() {
        let err = RunConfig::from_toml_str("timeout = 5", "x.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));

        let err = RunConfig::from_toml_str("timeout_secs = 0", "x.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));

        let err = RunConfig::from_toml_str("max_parallel = 0", "x.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn builder_overrides_variables() {
        let config = RunConfig::new()
            .with_variables([("A", "1"), ("B", "2")])
            .with_variable("A", "3");
        assert_eq!(config.variables.get("A").map(String::as_str), Some("3"));
        assert_eq!(config.variables.len(), 2);
    }

    #[test]
    fn assignment_parsing() {
        assert_eq!(
            parse_assignment("NODE_VERSION=20").unwrap(),
            ("NODE_VERSION".to_string(), "20".to_string())
        );
        assert_eq!(
            parse_assignment("FLAGS=--a=b").unwrap(),
            ("FLAGS".to_string(), "--a=b".to_string())
        );
        assert_eq!(parse_assignment("EMPTY=").unwrap().1, "");
        assert!(parse_assignment("NOEQUALS").is_err());
        assert!(parse_assignment("=value").is_err());
    }
}
