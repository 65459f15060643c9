//! `${NAME}` placeholder substitution
//!
//! Substitution is a single textual pass: values are inserted verbatim and
//! never rescanned, so the result does not depend on variable order.

use crate::config::RunConfig;
use eos_standards::TestDefinition;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;

static PLACEHOLDER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("placeholder pattern is valid")
});

/// Marker that would start another substitution inside a value
const NESTED_MARKER: &str = "${";

/// Names of every placeholder in `text`, first occurrence order
#[must_use]
pub fn placeholders(text: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for caps in PLACEHOLDER.captures_iter(text) {
        let name = &caps[1];
        if !names.iter().any(|n| n == name) {
            names.push(name.to_string());
        }
    }
    names
}

/// Test fields after substitution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTest {
    /// Command to execute
    pub command: String,
    /// Error message shown on failure
    pub error_message: String,
    /// Advisory fix command
    pub fix_command: Option<String>,
}

/// Why a test's variables could not be resolved
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SubstitutionError {
    /// Names with no configured value
    pub missing: Vec<String>,
    /// Names whose value itself contains a placeholder
    pub recursive: Vec<String>,
}

impl fmt::Display for SubstitutionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if !self.missing.is_empty() {
            parts.push(format!("unresolved variables: {}", self.missing.join(", ")));
        }
        if !self.recursive.is_empty() {
            parts.push(format!(
                "recursive values not supported: {}",
                self.recursive.join(", ")
            ));
        }
        f.write_str(&parts.join("; "))
    }
}

impl std::error::Error for SubstitutionError {}

/// Resolves placeholders against the configured variable map
#[derive(Debug, Clone, Default)]
pub struct VariableResolver {
    variables: BTreeMap<String, String>,
    env_fallback: bool,
}

impl VariableResolver {
    /// Create resolver over an explicit variable map
    #[must_use]
    pub fn new(variables: BTreeMap<String, String>) -> Self {
        Self {
            variables,
            env_fallback: false,
        }
    }

    /// Create resolver from run configuration
    #[must_use]
    pub fn from_config(config: &RunConfig) -> Self {
        Self {
            variables: config.variables.clone(),
            env_fallback: config.env_fallback,
        }
    }

    /// With process environment fallback
    #[inline]
    #[must_use]
    pub fn with_env_fallback(mut self, enabled: bool) -> Self {
        self.env_fallback = enabled;
        self
    }

    /// Declared variables followed by any placeholder used in the test
    #[must_use]
    pub fn required_variables(test: &TestDefinition) -> Vec<String> {
        let mut names = test.variables.clone();
        let texts = [
            Some(test.test_command.as_str()),
            Some(test.error_message.as_str()),
            test.fix_command.as_deref(),
        ];
        for name in texts.into_iter().flatten().flat_map(placeholders) {
            if !names.contains(&name) {
                names.push(name);
            }
        }
        names
    }

    fn lookup(&self, name: &str) -> Option<Cow<'_, str>> {
        if let Some(value) = self.variables.get(name) {
            return Some(Cow::Borrowed(value));
        }
        if self.env_fallback {
            return std::env::var(name).ok().map(Cow::Owned);
        }
        None
    }

    /// Resolve every substitutable field of `test`
    ///
    /// # Errors
    /// Returns `SubstitutionError` when a required variable has no value or
    /// its value contains a placeholder. Nothing is partially applied.
    pub fn resolve(&self, test: &TestDefinition) -> Result<ResolvedTest, SubstitutionError> {
        let mut error = SubstitutionError::default();
        let mut values = BTreeMap::new();

        for name in Self::required_variables(test) {
            match self.lookup(&name) {
                None => error.missing.push(name),
                Some(value) if value.contains(NESTED_MARKER) => error.recursive.push(name),
                Some(value) => {
                    values.insert(name, value.into_owned());
                }
            }
        }

        if !error.missing.is_empty() || !error.recursive.is_empty() {
            return Err(error);
        }

        Ok(ResolvedTest {
            command: substitute(&test.test_command, &values),
            error_message: substitute(&test.error_message, &values),
            fix_command: test.fix_command.as_deref().map(|fix| substitute(fix, &values)),
        })
    }

    /// Best-effort rendering for reports: known values are inserted, anything
    /// unresolved is left as the literal placeholder
    #[must_use]
    pub fn render_lenient(&self, text: &str) -> String {
        PLACEHOLDER
            .replace_all(text, |caps: &Captures<'_>| match self.lookup(&caps[1]) {
                Some(value) if !value.contains(NESTED_MARKER) => value.into_owned(),
                _ => caps[0].to_string(),
            })
            .into_owned()
    }
}

fn substitute(text: &str, values: &BTreeMap<String, String>) -> String {
    PLACEHOLDER
        .replace_all(text, |caps: &Captures<'_>| {
            values
                .get(&caps[1])
                .cloned()
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}
