//! Test declarations
//!
//! Turns a [`RawTestRegion`] into a [`TestDefinition`]. A test region body is
//! a flat sequence of `FIELD: value` lines. Duplicate fields resolve to the
//! last occurrence (with a warning).

use crate::error::{Diagnostic, DiagnosticKind};
use crate::extract::{RawTestRegion, VerificationBlockRegion};
use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

static FIELD_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([A-Z][A-Z0-9_]*):(.*)$").expect("field line regex"));
static TEST_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_.-]*$").expect("test name regex"));
static VARIABLE_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("variable name regex"));

/// Recognised test region fields
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    /// Command to run (mandatory)
    Test,
    /// Whether failure counts against the run
    Required,
    /// Whether failure fails the run
    Blocking,
    /// Message shown on failure
    Error,
    /// Advisory remediation command
    FixCommand,
    /// Informational description
    Description,
    /// Prerequisite test names
    DependsOn,
    /// Variable names referenced by the test
    Variables,
    /// Justification needed to waive the test
    BypassRequires,
}

impl Field {
    /// All fields, in canonical order
    pub const ALL: [Field; 9] = [
        Field::Test,
        Field::Required,
        Field::Blocking,
        Field::Error,
        Field::FixCommand,
        Field::Description,
        Field::DependsOn,
        Field::Variables,
        Field::BypassRequires,
    ];

    /// Field key as written in documents
    #[must_use]
    pub fn key(self) -> &'static str {
        match self {
            Field::Test => "TEST",
            Field::Required => "REQUIRED",
            Field::Blocking => "BLOCKING",
            Field::Error => "ERROR",
            Field::FixCommand => "FIX_COMMAND",
            Field::Description => "DESCRIPTION",
            Field::DependsOn => "DEPENDS_ON",
            Field::Variables => "VARIABLES",
            Field::BypassRequires => "BYPASS_REQUIRES",
        }
    }
}

impl FromStr for Field {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Field::ALL
            .into_iter()
            .find(|field| field.key() == s)
            .ok_or_else(|| format!("unknown field: {s}"))
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Where a test was declared
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestOrigin {
    /// Document path
    pub document: String,
    /// Owning block's `context-check` id
    pub context_check_id: String,
    /// Line of the test open marker
    pub line: usize,
    /// Nearest Markdown heading above the test
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
}

/// A parsed verification test
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestDefinition {
    /// Unique name, the dependency-graph key
    pub name: String,
    /// Command string, may contain `${VAR}` placeholders
    pub test_command: String,
    /// Failure counts against the run (default `true`)
    pub required: bool,
    /// Failure fails the run when also required (default `false`)
    pub blocking: bool,
    /// Message shown on failure, may contain placeholders
    pub error_message: String,
    /// Advisory remediation, may contain placeholders
    pub fix_command: Option<String>,
    /// Informational description
    pub description: Option<String>,
    /// Tests that must settle first
    pub depends_on: Vec<String>,
    /// Declared variable names
    pub variables: Vec<String>,
    /// Justification needed to waive the test
    pub bypass_requires: Option<String>,
    /// Declaration site
    pub origin: TestOrigin,
}

impl TestDefinition {
    /// Create a test with default flags and no optional fields
    #[must_use]
    pub fn new(name: impl Into<String>, test_command: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            error_message: default_error_message(&name),
            name,
            test_command: test_command.into(),
            required: true,
            blocking: false,
            fix_command: None,
            description: None,
            depends_on: Vec::new(),
            variables: Vec::new(),
            bypass_requires: None,
            origin: TestOrigin::default(),
        }
    }

    /// With required flag
    #[inline]
    #[must_use]
    pub fn with_required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }

    /// With blocking flag
    #[inline]
    #[must_use]
    pub fn with_blocking(mut self, blocking: bool) -> Self {
        self.blocking = blocking;
        self
    }

    /// With error message
    #[inline]
    #[must_use]
    pub fn with_error_message(mut self, message: impl Into<String>) -> Self {
        self.error_message = message.into();
        self
    }

    /// With fix command
    #[inline]
    #[must_use]
    pub fn with_fix_command(mut self, fix: impl Into<String>) -> Self {
        self.fix_command = Some(fix.into());
        self
    }

    /// With dependencies
    #[must_use]
    pub fn with_depends_on<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.depends_on = deps.into_iter().map(Into::into).collect();
        self
    }

    /// With declared variables
    #[must_use]
    pub fn with_variables<I, S>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.variables = vars.into_iter().map(Into::into).collect();
        self
    }

    /// With origin
    #[inline]
    #[must_use]
    pub fn with_origin(mut self, origin: TestOrigin) -> Self {
        self.origin = origin;
        self
    }

    /// Required and blocking: failure fails the run
    #[inline]
    #[must_use]
    pub fn is_gate(&self) -> bool {
        self.required && self.blocking
    }
}

fn default_error_message(name: &str) -> String {
    format!("verification '{name}' failed")
}

/// Output of declaring one test region
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Declaration {
    /// The test, absent when the region was invalid
    pub test: Option<TestDefinition>,
    /// Warnings, plus the error that dropped the test if any
    pub diagnostics: Vec<Diagnostic>,
}

/// Parses raw test regions into test definitions
#[derive(Debug, Clone, Copy, Default)]
pub struct TestDeclarator;

impl TestDeclarator {
    /// Create new declarator
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Declare one test region of `block`
    #[must_use]
    pub fn declare(&self, block: &VerificationBlockRegion, region: &RawTestRegion) -> Declaration {
        let path = block.source_path.as_str();
        let name = region.name.as_str();
        let mut diagnostics = Vec::new();
        let mut fields: IndexMap<Field, (usize, String)> = IndexMap::new();

        if !TEST_NAME.is_match(name) {
            diagnostics.push(
                Diagnostic::new(
                    DiagnosticKind::InvalidName,
                    path,
                    region.line,
                    format!("test name '{name}' is not a valid identifier"),
                )
                .with_test(name),
            );
            return Declaration {
                test: None,
                diagnostics,
            };
        }

        for line in &region.body {
            let trimmed = line.text.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }

            let Some(caps) = FIELD_LINE.captures(trimmed) else {
                diagnostics.push(
                    Diagnostic::new(
                        DiagnosticKind::UnrecognizedLine,
                        path,
                        line.number,
                        format!("ignoring line that is not a FIELD: value pair: {trimmed}"),
                    )
                    .with_test(name),
                );
                continue;
            };

            let key = &caps[1];
            let value = caps[2].trim().to_string();
            let Ok(field) = key.parse::<Field>() else {
                diagnostics.push(
                    Diagnostic::new(
                        DiagnosticKind::UnknownField,
                        path,
                        line.number,
                        format!("unknown field '{key}' ignored"),
                    )
                    .with_test(name),
                );
                continue;
            };

            if let Some((previous, _)) = fields.insert(field, (line.number, value)) {
                diagnostics.push(
                    Diagnostic::new(
                        DiagnosticKind::DuplicateField,
                        path,
                        line.number,
                        format!(
                            "{field} already declared at line {previous}; last occurrence wins"
                        ),
                    )
                    .with_test(name),
                );
            }
        }

        let command = match fields.get(&Field::Test) {
            Some((_, command)) if !command.is_empty() => command.clone(),
            _ => {
                diagnostics.push(
                    Diagnostic::new(
                        DiagnosticKind::MissingTestField,
                        path,
                        region.line,
                        format!("test '{name}' has no TEST command and was dropped"),
                    )
                    .with_test(name),
                );
                return Declaration {
                    test: None,
                    diagnostics,
                };
            }
        };

        let mut test = TestDefinition::new(name, command).with_origin(TestOrigin {
            document: path.to_string(),
            context_check_id: block.context_check_id.clone(),
            line: region.line,
            section: None,
        });

        for (field, (number, value)) in &fields {
            let number = *number;
            match field {
                Field::Test => {}
                Field::Required | Field::Blocking => {
                    let default = *field == Field::Required;
                    let parsed = parse_bool(value).unwrap_or_else(|| {
                        diagnostics.push(
                            Diagnostic::new(
                                DiagnosticKind::InvalidBoolean,
                                path,
                                number,
                                format!(
                                    "{field} must be 'true' or 'false', got '{value}'; \
                                     using {default}"
                                ),
                            )
                            .with_test(name),
                        );
                        default
                    });
                    if *field == Field::Required {
                        test.required = parsed;
                    } else {
                        test.blocking = parsed;
                    }
                }
                Field::Error => {
                    if !value.is_empty() {
                        test.error_message.clone_from(value);
                    }
                }
                Field::FixCommand => test.fix_command = non_empty(value),
                Field::Description => test.description = non_empty(value),
                Field::BypassRequires => test.bypass_requires = non_empty(value),
                Field::DependsOn | Field::Variables => {
                    let pattern = if *field == Field::DependsOn {
                        &*TEST_NAME
                    } else {
                        &*VARIABLE_NAME
                    };
                    match parse_list(value, pattern) {
                        Ok(items) if *field == Field::DependsOn => test.depends_on = items,
                        Ok(items) => test.variables = items,
                        Err(reason) => {
                            diagnostics.push(
                                Diagnostic::new(
                                    DiagnosticKind::InvalidList,
                                    path,
                                    number,
                                    format!(
                                        "{field} is malformed ({reason}); \
                                         test '{name}' was dropped"
                                    ),
                                )
                                .with_test(name),
                            );
                            return Declaration {
                                test: None,
                                diagnostics,
                            };
                        }
                    }
                }
            }
        }

        Declaration {
            test: Some(test),
            diagnostics,
        }
    }
}

fn non_empty(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_string())
}

/// Parse literal `true` / `false`
#[must_use]
pub fn parse_bool(value: &str) -> Option<bool> {
    match value {
        "true" => Some(true),
        "false" => Some(false),
        _ => None,
    }
}

/// Parse `["a", "b"]` into identifiers matching `pattern`
///
/// Duplicates are dropped, first occurrence order is kept.
///
/// # Errors
/// Returns a reason string when the syntax is wrong or an item is not an
/// identifier.
pub fn parse_list(value: &str, pattern: &Regex) -> Result<Vec<String>, String> {
    let inner = value
        .strip_prefix('[')
        .and_then(|v| v.strip_suffix(']'))
        .ok_or_else(|| "expected a bracketed list".to_string())?
        .trim();

    if inner.is_empty() {
        return Ok(Vec::new());
    }

    let mut items: Vec<String> = Vec::new();
    for raw in inner.split(',') {
        let raw = raw.trim();
        let item = raw
            .strip_prefix('"')
            .and_then(|v| v.strip_suffix('"'))
            .ok_or_else(|| format!("item {raw} is not double-quoted"))?;
        if !pattern.is_match(item) {
            return Err(format!("'{item}' is not a valid identifier"));
        }
        if !items.iter().any(|existing| existing == item) {
            items.push(item.to_string());
        }
    }
    Ok(items)
}

/// Regex accepted for test names in `DEPENDS_ON`
#[must_use]
pub fn test_name_pattern() -> &'static Regex {
    &TEST_NAME
}

/// Regex accepted for names in `VARIABLES`
#[must_use]
pub fn variable_name_pattern() -> &'static Regex {
    &VARIABLE_NAME
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::SourceLine;
    use pretty_assertions::assert_eq;

    fn region(name: &str, body: &[&str]) -> (VerificationBlockRegion, RawTestRegion) {
        let block = VerificationBlockRegion {
            context_check_id: "ctx".to_string(),
            source_path: "doc.md".to_string(),
            line: 1,
            raw_test_regions: Vec::new(),
        };
        let raw = RawTestRegion {
            name: name.to_string(),
            line: 2,
            body: body
                .iter()
                .enumerate()
                .map(|(i, text)| SourceLine {
                    number: i + 3,
                    text: (*text).to_string(),
                })
                .collect(),
        };
        (block, raw)
    }

    fn declare(name: &str, body: &[&str]) -> Declaration {
        let (block, raw) = region(name, body);
        TestDeclarator::new().declare(&block, &raw)
    }

    #[test]
    fn defaults_when_flags_omitted() {
        let decl = declare("simple", &["TEST: exit 0"]);
        assert!(decl.diagnostics.is_empty());
        let test = decl.test.unwrap();
        assert_eq!(test.name, "simple");
        assert_eq!(test.test_command, "exit 0");
        assert!(test.required);
        assert!(!test.blocking);
        assert_eq!(test.error_message, "verification 'simple' failed");
        assert_eq!(test.origin.context_check_id, "ctx");
        assert_eq!(test.origin.line, 2);
    }

    #[test]
    fn parses_every_field() {
        let decl = declare(
            "coverage",
            &[
                "TEST: npm run coverage -- --min ${PROJECT_COVERAGE}",
                "REQUIRED: false",
                "BLOCKING: true",
                "ERROR: coverage below ${PROJECT_COVERAGE}%",
                "FIX_COMMAND: npm run test:coverage",
                "DESCRIPTION: Coverage gate",
                "DEPENDS_ON: [\"deps-installed\", \"lint.ok\"]",
                "VARIABLES: [\"PROJECT_COVERAGE\"]",
                "BYPASS_REQUIRES: architect sign-off",
            ],
        );
        assert!(decl.diagnostics.is_empty());
        let test = decl.test.unwrap();
        assert!(!test.required);
        assert!(test.blocking);
        assert_eq!(test.error_message, "coverage below ${PROJECT_COVERAGE}%");
        assert_eq!(test.fix_command.as_deref(), Some("npm run test:coverage"));
        assert_eq!(test.description.as_deref(), Some("Coverage gate"));
        assert_eq!(test.depends_on, vec!["deps-installed", "lint.ok"]);
        assert_eq!(test.variables, vec!["PROJECT_COVERAGE"]);
        assert_eq!(test.bypass_requires.as_deref(), Some("architect sign-off"));
    }

    #[test]
    fn missing_test_field_drops_region() {
        let decl = declare("empty", &["REQUIRED: true"]);
        assert!(decl.test.is_none());
        assert_eq!(decl.diagnostics.len(), 1);
        assert_eq!(decl.diagnostics[0].kind, DiagnosticKind::MissingTestField);
        assert_eq!(decl.diagnostics[0].test.as_deref(), Some("empty"));
    }

    #[test]
    fn invalid_boolean_falls_back_to_default() {
        let decl = declare("flags", &["TEST: exit 0", "REQUIRED: yes", "BLOCKING: TRUE"]);
        let test = decl.test.unwrap();
        assert!(test.required);
        assert!(!test.blocking);
        assert_eq!(decl.diagnostics.len(), 2);
        assert!(decl
            .diagnostics
            .iter()
            .all(|d| d.kind == DiagnosticKind::InvalidBoolean && !d.is_error()));
    }

    #[test]
    fn duplicate_field_last_wins() {
        let decl = declare("dup", &["TEST: exit 1", "TEST: exit 0"]);
        assert_eq!(decl.test.unwrap().test_command, "exit 0");
        assert_eq!(decl.diagnostics[0].kind, DiagnosticKind::DuplicateField);
        assert_eq!(decl.diagnostics[0].line, 4);
    }

    #[test]
    fn malformed_list_drops_test() {
        let decl = declare("bad", &["TEST: exit 0", "DEPENDS_ON: [a, b]"]);
        assert!(decl.test.is_none());
        assert_eq!(decl.diagnostics[0].kind, DiagnosticKind::InvalidList);
        assert!(decl.diagnostics[0].is_error());
    }

    #[test]
    fn unknown_and_stray_lines_warn() {
        let decl = declare(
            "noisy",
            &["# comment", "", "TEST: exit 0", "TIMEOUT: 5", "free text"],
        );
        assert!(decl.test.is_some());
        let kinds: Vec<_> = decl.diagnostics.iter().map(|d| d.kind).collect();
        assert_eq!(
            kinds,
            vec![DiagnosticKind::UnknownField, DiagnosticKind::UnrecognizedLine]
        );
    }

    #[test]
    fn list_parsing() {
        let names = test_name_pattern();
        assert_eq!(parse_list("[]", names), Ok(vec![]));
        assert_eq!(parse_list("[ ]", names), Ok(vec![]));
        assert_eq!(
            parse_list(r#"["a", "b", "a"]"#, names),
            Ok(vec!["a".to_string(), "b".to_string()])
        );
        assert!(parse_list(r#""a""#, names).is_err());
        assert!(parse_list(r#"["a b"]"#, names).is_err());
        assert!(parse_list(r#"["lint.ok"]"#, variable_name_pattern()).is_err());
    }

    #[test]
    fn bool_parsing_is_literal() {
        assert_eq!(parse_bool("true"), Some(true));
        assert_eq!(parse_bool("false"), Some(false));
        assert_eq!(parse_bool("True"), None);
        assert_eq!(parse_bool("1"), None);
    }

    #[test]
    fn field_keys_roundtrip() {
        for field in Field::ALL {
            assert_eq!(field.key().parse::<Field>(), Ok(field));
        }
        assert!("TIMEOUT".parse::<Field>().is_err());
    }
}
