use eos_standards::DocumentLoader;
use eos_verify::prelude::*;
use eos_verify::ShellExecutor;
use std::time::Duration;
use tempfile::TempDir;

const TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::test]
async fn exit_codes_and_output_are_captured() {
    let dir = TempDir::new().unwrap();
    let shell = ShellExecutor::new("sh", dir.path());

    let ok = shell.execute("echo hello; echo oops >&2", TIMEOUT).await.unwrap();
    assert_eq!(ok.exit_code, Some(0));
    assert_eq!(ok.stdout, "hello\n");
    assert_eq!(ok.stderr, "oops\n");
    assert!(ok.success());

    let failed = shell.execute("exit 3", TIMEOUT).await.unwrap();
    assert_eq!(failed.exit_code, Some(3));
    assert!(!failed.success());
}

#[tokio::test]
async fn commands_run_in_working_dir() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("tsconfig.json"), "{}").unwrap();

    let shell = ShellExecutor::new("sh", dir.path());
    let output = shell.execute("test -f tsconfig.json", TIMEOUT).await.unwrap();
    assert_eq!(output.exit_code, Some(0));
}

#[tokio::test]
async fn slow_command_times_out() {
    let dir = TempDir::new().unwrap();
    let shell = ShellExecutor::new("sh", dir.path());

    let output = shell
        .execute("sleep 5", Duration::from_millis(200))
        .await
        .unwrap();
    assert!(output.timed_out);
    assert_eq!(output.exit_code, None);
    assert!(output.duration < Duration::from_secs(4));
}

#[tokio::test]
async fn output_is_truncated() {
    let dir = TempDir::new().unwrap();
    let shell = ShellExecutor::new("sh", dir.path()).with_max_output_bytes(8);

    let output = shell.execute("printf 0123456789abcdef", TIMEOUT).await.unwrap();
    assert!(output.stdout.starts_with("01234567\n"));
    assert!(output.stdout.ends_with("[truncated 8 bytes]"));
}

#[tokio::test]
async fn background_process_holding_pipes_does_not_delay_exit() {
    let dir = TempDir::new().unwrap();
    let shell = ShellExecutor::new("sh", dir.path());

    let output = shell
        .execute("sleep 3 & echo started; exit 0", Duration::from_secs(1))
        .await
        .unwrap();
    assert!(!output.timed_out);
    assert_eq!(output.exit_code, Some(0));
    assert_eq!(output.stdout, "started\n");
    assert!(output.duration < Duration::from_secs(1));
}

#[tokio::test]
async fn large_output_is_capped_while_draining() {
    let dir = TempDir::new().unwrap();
    let shell = ShellExecutor::new("sh", dir.path()).with_max_output_bytes(16);

    // Far larger than a pipe buffer; the command must still finish.
    let output = shell
        .execute("head -c 1000000 /dev/zero | tr '\\0' x; exit 4", TIMEOUT)
        .await
        .unwrap();
    assert_eq!(output.exit_code, Some(4));
    assert!(output.stdout.starts_with("xxxxxxxxxxxxxxxx\n"));
    assert!(output.stdout.ends_with("[truncated 999984 bytes]"));
}

#[tokio::test]
async fn missing_shell_is_a_spawn_error() {
    let dir = TempDir::new().unwrap();
    let shell = ShellExecutor::new("/nonexistent/shell", dir.path());
    let err = shell.execute("exit 0", TIMEOUT).await.unwrap_err();
    assert!(err.to_string().contains("failed to spawn"));
}

#[tokio::test]
async fn end_to_end_run_through_sh() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("package.json"), "{}").unwrap();

    let doc = "# Tooling\n\n\
        <verification-block context-check=\"tooling\">\n\
        <test name=\"package-json\">\n\
        TEST: test -f ${MANIFEST}\n\
        BLOCKING: true\n\
        </test>\n\
        <test name=\"lockfile\">\n\
        TEST: test -f package-lock.json\n\
        REQUIRED: false\n\
        ERROR: no lockfile next to ${MANIFEST}\n\
        FIX_COMMAND: npm install\n\
        DEPENDS_ON: [\"package-json\"]\n\
        </test>\n\
        </verification-block>\n";

    let config = RunConfig::new()
        .with_working_dir(dir.path())
        .with_variable("MANIFEST", "package.json");
    let runner = VerificationRunner::new(config);
    let report = runner
        .run_documents(&DocumentLoader::from_pairs([("tooling.md", doc)]))
        .await;

    assert_eq!(report.result("package-json").unwrap().status, TestStatus::Passed);
    let lockfile = report.result("lockfile").unwrap();
    assert_eq!(lockfile.status, TestStatus::Failed);
    assert_eq!(lockfile.resolved_error_message, "no lockfile next to package.json");
    assert_eq!(lockfile.resolved_fix_command.as_deref(), Some("npm install"));
    assert_eq!(report.overall_status, OverallStatus::Success);
}

#[tokio::test]
async fn spawn_failure_settles_as_failed() {
    let doc = "<verification-block context-check=\"x\">\n\
        <test name=\"t\">\nTEST: exit 0\nBLOCKING: true\n</test>\n\
        </verification-block>\n";
    let runner = VerificationRunner::new(RunConfig::new().with_shell("/nonexistent/shell"));
    let report = runner
        .run_documents(&DocumentLoader::from_pairs([("x.md", doc)]))
        .await;

    let result = report.result("t").unwrap();
    assert_eq!(result.status, TestStatus::Failed);
    assert!(result.detail.as_deref().unwrap().contains("failed to spawn"));
    assert_eq!(report.overall_status, OverallStatus::Failure);
}
