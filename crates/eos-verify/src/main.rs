use anyhow::{Context, Result};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use eos_standards::{Corpus, Document, DocumentLoader};
use eos_verify::logging::{init_tracing, LogFormat};
use eos_verify::{parse_assignment, RunConfig, VerificationRunner, DEFAULT_CONFIG_FILE};
use std::path::{Path, PathBuf};

/// Exit code for invocation errors (bad config, unreadable paths)
const EXIT_INVOCATION: i32 = 2;

fn paths_arg() -> Arg {
    Arg::new("paths")
        .num_args(0..)
        .default_value(".")
        .value_parser(value_parser!(PathBuf))
        .help("Standards files or directories to scan")
}

fn config_args() -> [Arg; 3] {
    [
        Arg::new("config")
            .long("config")
            .short('c')
            .value_parser(value_parser!(PathBuf))
            .help("TOML config file (default: ./eos-verify.toml if present)"),
        Arg::new("var")
            .long("var")
            .action(ArgAction::Append)
            .value_name("KEY=VALUE")
            .help("Set a substitution variable, overriding the config file"),
        Arg::new("env-fallback")
            .long("env-fallback")
            .action(ArgAction::SetTrue)
            .help("Look up unknown variables in the process environment"),
    ]
}

fn cli() -> Command {
    Command::new("eos-verify")
        .version(eos_verify::VERSION)
        .about("Run the verification blocks embedded in standards documents")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("log-level")
                .long("log-level")
                .global(true)
                .help(
                    "Tracing filter, e.g. info or eos_verify=debug \
                     (default: RUST_LOG, else warn)",
                ),
        )
        .arg(
            Arg::new("log-format")
                .long("log-format")
                .global(true)
                .default_value("text")
                .value_parser(["text", "json"])
                .help("Log line format"),
        )
        .subcommand(
            Command::new("run")
                .about("Execute every verification test and report the verdict")
                .arg(paths_arg())
                .args(config_args())
                .arg(
                    Arg::new("timeout")
                        .long("timeout")
                        .value_parser(value_parser!(u64))
                        .help("Per-test timeout in seconds"),
                )
                .arg(
                    Arg::new("workdir")
                        .long("workdir")
                        .value_parser(value_parser!(PathBuf))
                        .help("Directory test commands run in"),
                )
                .arg(
                    Arg::new("shell")
                        .long("shell")
                        .help("Shell used as `<shell> -c <command>`"),
                )
                .arg(
                    Arg::new("parallel")
                        .long("parallel")
                        .short('j')
                        .value_parser(value_parser!(usize))
                        .help("Maximum tests running at once"),
                )
                .arg(
                    Arg::new("fail-fast")
                        .long("fail-fast")
                        .action(ArgAction::SetTrue)
                        .help("Cancel remaining tests after the first failed gate"),
                )
                .arg(
                    Arg::new("format")
                        .long("format")
                        .default_value("text")
                        .value_parser(["text", "json"])
                        .help("Report format"),
                )
                .arg(
                    Arg::new("output")
                        .long("output")
                        .short('o')
                        .value_parser(value_parser!(PathBuf))
                        .help("Write the report to a file instead of stdout"),
                ),
        )
        .subcommand(
            Command::new("list")
                .about("List discovered tests and parse diagnostics without executing")
                .arg(paths_arg())
                .arg(
                    Arg::new("config")
                        .long("config")
                        .short('c')
                        .value_parser(value_parser!(PathBuf))
                        .help("TOML config file (only `extensions` is used)"),
                ),
        )
        .subcommand(
            Command::new("check")
                .about("Check dependencies and variables without executing")
                .arg(paths_arg())
                .args(config_args()),
        )
}

#[tokio::main]
async fn main() {
    let code = match run_cli(cli().get_matches()).await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err:#}");
            EXIT_INVOCATION
        }
    };
    std::process::exit(code);
}

async fn run_cli(matches: ArgMatches) -> Result<i32> {
    let level = matches.get_one::<String>("log-level").map(String::as_str);
    let format: LogFormat = matches
        .get_one::<String>("log-format")
        .map_or(Ok(LogFormat::Text), |f| f.parse())
        .map_err(anyhow::Error::msg)?;
    init_tracing(level, format)?;

    match matches.subcommand() {
        Some(("run", args)) => cmd_run(args).await,
        Some(("list", args)) => cmd_list(args).await,
        Some(("check", args)) => cmd_check(args).await,
        _ => Ok(EXIT_INVOCATION),
    }
}

async fn load_config(args: &ArgMatches) -> Result<RunConfig> {
    let mut config = match args.get_one::<PathBuf>("config") {
        Some(path) => RunConfig::load(path).await?,
        None => {
            let default = Path::new(DEFAULT_CONFIG_FILE);
            if tokio::fs::try_exists(default).await.unwrap_or(false) {
                tracing::debug!(path = DEFAULT_CONFIG_FILE, "using config file");
                RunConfig::load(default).await?
            } else {
                RunConfig::default()
            }
        }
    };

    if let Ok(Some(vars)) = args.try_get_many::<String>("var") {
        for raw in vars {
            let (name, value) = parse_assignment(raw)?;
            config.variables.insert(name, value);
        }
    }
    if args.try_get_one::<bool>("env-fallback").ok().flatten() == Some(&true) {
        config.env_fallback = true;
    }
    Ok(config)
}

fn apply_run_overrides(mut config: RunConfig, args: &ArgMatches) -> RunConfig {
    if let Some(&secs) = args.get_one::<u64>("timeout") {
        config.timeout_secs = secs;
    }
    if let Some(dir) = args.get_one::<PathBuf>("workdir") {
        config.working_dir = dir.clone();
    }
    if let Some(shell) = args.get_one::<String>("shell") {
        config.shell = shell.clone();
    }
    if let Some(&parallel) = args.get_one::<usize>("parallel") {
        config.max_parallel = parallel;
    }
    if args.get_flag("fail-fast") {
        config.fail_fast = true;
    }
    config
}

async fn load_documents(args: &ArgMatches, config: &RunConfig) -> Result<Vec<Document>> {
    let paths: Vec<PathBuf> = args
        .get_many::<PathBuf>("paths")
        .map(|p| p.cloned().collect())
        .unwrap_or_default();
    let documents = DocumentLoader::new()
        .with_extensions(config.extensions.iter().cloned())
        .load_paths(&paths[..])
        .await
        .context("failed to load standards documents")?;
    tracing::info!(documents = documents.len(), "documents loaded");
    Ok(documents)
}

async fn cmd_run(args: &ArgMatches) -> Result<i32> {
    let config = apply_run_overrides(load_config(args).await?, args);
    config.validate()?;
    let documents = load_documents(args, &config).await?;

    let runner = VerificationRunner::new(config);
    let cancel = runner.cancel_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, cancelling remaining tests");
            cancel.cancel();
        }
    });

    let report = runner.run_documents(&documents).await;
    let rendered = match args.get_one::<String>("format").map(String::as_str) {
        Some("json") => report.to_json()?,
        _ => report.render_text(),
    };

    match args.get_one::<PathBuf>("output") {
        Some(path) => tokio::fs::write(path, rendered)
            .await
            .with_context(|| format!("failed to write report to {}", path.display()))?,
        None => println!("{rendered}"),
    }

    Ok(report.exit_code())
}

async fn cmd_list(args: &ArgMatches) -> Result<i32> {
    let config = load_config(args).await?;
    let corpus = Corpus::build(&load_documents(args, &config).await?);

    for test in corpus.tests() {
        let mut flags = vec![if test.required { "required" } else { "optional" }];
        if test.blocking {
            flags.push("blocking");
        }
        print!("{} [{}]", test.name, flags.join(", "));
        if !test.depends_on.is_empty() {
            print!(" after {}", test.depends_on.join(", "));
        }
        println!("  ({}:{})", test.origin.document, test.origin.line);
        if let Some(description) = &test.description {
            println!("    {description}");
        }
    }
    for diagnostic in corpus.diagnostics() {
        println!("{diagnostic}");
    }
    println!(
        "{} tests, {} diagnostics",
        corpus.tests().len(),
        corpus.diagnostics().len()
    );
    Ok(0)
}

async fn cmd_check(args: &ArgMatches) -> Result<i32> {
    let config = load_config(args).await?;
    config.validate()?;
    let corpus = Corpus::build(&load_documents(args, &config).await?);
    let findings = VerificationRunner::new(config).preflight(&corpus);

    for diagnostic in corpus.diagnostics() {
        println!("{diagnostic}");
    }
    for finding in &findings {
        let marker = if finding.gate { "❌" } else { "⚠️" };
        println!("{marker} {} ({}): {}", finding.test, finding.status, finding.detail);
    }

    let gate_blocked = findings.iter().filter(|f| f.gate).count();
    println!(
        "{} tests checked, {} cannot be evaluated ({} gates), {} diagnostics",
        corpus.tests().len(),
        findings.len(),
        gate_blocked,
        corpus.diagnostics().len()
    );

    Ok(i32::from(gate_blocked > 0 || corpus.has_errors()))
}
