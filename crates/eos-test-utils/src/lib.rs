//! Testing utilities for EOS workspace
//!
//! Shared document builders and a scripted command executor.

#![allow(missing_docs)]

use eos_standards::{Corpus, DocumentLoader};
use eos_verify::{CommandExecutor, CommandOutput, ExecutorError};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::time::Duration;

/// Builds the text of one `<test>` region
#[derive(Debug, Clone)]
pub struct TestRegionBuilder {
    name: String,
    fields: Vec<(String, String)>,
}

impl TestRegionBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            fields: Vec::new(),
        }
    }

    /// Append a raw `KEY: value` line
    pub fn field(mut self, key: &str, value: &str) -> Self {
        self.fields.push((key.to_string(), value.to_string()));
        self
    }

    pub fn test(self, command: &str) -> Self {
        self.field("TEST", command)
    }

    pub fn required(self, required: bool) -> Self {
        self.field("REQUIRED", if required { "true" } else { "false" })
    }

    pub fn blocking(self, blocking: bool) -> Self {
        self.field("BLOCKING", if blocking { "true" } else { "false" })
    }

    pub fn error(self, message: &str) -> Self {
        self.field("ERROR", message)
    }

    pub fn fix(self, command: &str) -> Self {
        self.field("FIX_COMMAND", command)
    }

    pub fn depends_on(self, names: &[&str]) -> Self {
        let list = quoted_list(names);
        self.field("DEPENDS_ON", &list)
    }

    pub fn variables(self, names: &[&str]) -> Self {
        let list = quoted_list(names);
        self.field("VARIABLES", &list)
    }

    pub fn build(&self) -> String {
        let mut out = format!("<test name=\"{}\">\n", self.name);
        for (key, value) in &self.fields {
            out.push_str(key);
            out.push_str(": ");
            out.push_str(value);
            out.push('\n');
        }
        out.push_str("</test>\n");
        out
    }
}

fn quoted_list(names: &[&str]) -> String {
    let quoted: Vec<String> = names.iter().map(|n| format!("\"{n}\"")).collect();
    format!("[{}]", quoted.join(", "))
}

/// Wrap test regions in a verification block
pub fn block(context_check: &str, regions: &[TestRegionBuilder]) -> String {
    let mut out = format!("<verification-block context-check=\"{context_check}\">\n");
    for region in regions {
        out.push_str(&region.build());
    }
    out.push_str("</verification-block>\n");
    out
}

/// Corpus from `(path, content)` pairs
pub fn corpus_from(pairs: &[(&str, &str)]) -> Corpus {
    Corpus::build(&DocumentLoader::from_pairs(pairs.iter().copied()))
}

/// Command executor with scripted outcomes
///
/// Unscripted commands of the form `exit N` exit with `N`; anything else
/// exits 0. Every invocation is recorded.
#[derive(Debug, Default)]
pub struct ScriptedExecutor {
    exits: HashMap<String, i32>,
    outputs: HashMap<String, String>,
    timeouts: HashSet<String>,
    invocations: Mutex<Vec<String>>,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_exit(mut self, command: &str, code: i32) -> Self {
        self.exits.insert(command.to_string(), code);
        self
    }

    pub fn with_stdout(mut self, command: &str, stdout: &str) -> Self {
        self.outputs.insert(command.to_string(), stdout.to_string());
        self
    }

    pub fn with_timeout(mut self, command: &str) -> Self {
        self.timeouts.insert(command.to_string());
        self
    }

    /// Commands executed so far, in call order
    pub fn invocations(&self) -> Vec<String> {
        self.invocations.lock().clone()
    }

    pub fn was_invoked(&self, command: &str) -> bool {
        self.invocations.lock().iter().any(|c| c == command)
    }
}

#[async_trait::async_trait]
impl CommandExecutor for ScriptedExecutor {
    async fn execute(
        &self,
        command: &str,
        _timeout: Duration,
    ) -> Result<CommandOutput, ExecutorError> {
        self.invocations.lock().push(command.to_string());

        if self.timeouts.contains(command) {
            return Ok(CommandOutput {
                timed_out: true,
                ..CommandOutput::default()
            });
        }

        let code = self.exits.get(command).copied().unwrap_or_else(|| {
            command
                .trim()
                .strip_prefix("exit ")
                .and_then(|n| n.trim().parse().ok())
                .unwrap_or(0)
        });

        Ok(CommandOutput {
            exit_code: Some(code),
            stdout: self.outputs.get(command).cloned().unwrap_or_default(),
            duration: Duration::from_millis(1),
            ..CommandOutput::default()
        })
    }
}
