#![cfg_attr(
    test,
    allow(
        clippy::panic,
        clippy::print_stdout,
        clippy::print_stderr,
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::use_debug,
        clippy::dbg_macro,
        clippy::panic_in_result_fn,
        clippy::unwrap_in_result,
        reason = "Test-only output and panic-based assertions are permitted."
    )
)]
// qti-session-cli/src/main.rs
// ============================================================================
// Module: Session CLI Entry Point
// Description: Command dispatcher driving a TestSessionDriver from fixture
//              and script files, plus snapshot inspection and config
//              validation.
// Purpose: Provide a local, scriptable way to exercise the test session
//          engine without a server surface.
// Dependencies: clap, qti-session-core, serde_json, thiserror.
// ============================================================================

//! ## Overview
//! This crate has no logging facade and no server surface: it is the only
//! place in the workspace that writes human-readable output, and it writes
//! via [`std::io::Write`] rather than `println!`/`eprintln!`, keeping the
//! core library silent and this output path explicit and testable.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Args;
use clap::Parser;
use clap::Subcommand;
use qti_session_core::SnapshotCodec;
use qti_session_core::TestSessionDriver;
use qti_session_core::core::variable::QtiValue;
use qti_session_core::interfaces::SessionStream;

mod config;
mod engine;
mod error;
mod fixture;
mod script;
mod snapshot;

use engine::FixtureExpressionEngine;
use error::CliError;
use error::CliResult;
use error::context_err;
use fixture::Fixture;
use fixture::LoadedFixture;
use script::Script;
use script::ScriptAction;
use snapshot::FileSessionStream;

// ============================================================================
// SECTION: CLI Types
// ============================================================================

/// Top-level CLI definition.
#[derive(Parser, Debug)]
#[command(name = "qti-session", arg_required_else_help = true)]
struct Cli {
    /// Selected subcommand to execute.
    #[command(subcommand)]
    command: Commands,
}

/// Supported CLI subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Drive a test session through a fixture and script.
    Run(RunCommand),
    /// Inspect or validate a persisted snapshot.
    Snapshot {
        /// Selected snapshot subcommand.
        #[command(subcommand)]
        command: SnapshotCommand,
    },
    /// Configuration utilities.
    Config {
        /// Selected config subcommand.
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

/// Arguments for the `run` command.
#[derive(Args, Debug)]
struct RunCommand {
    /// Path to the fixture JSON file (assessment test plus Route).
    #[arg(long, value_name = "PATH")]
    fixture: PathBuf,
    /// Path to the script JSON file (ordered driver actions).
    #[arg(long, value_name = "PATH")]
    script: PathBuf,
    /// Optional engine configuration TOML file.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Optional directory to persist/resume a snapshot from, keyed by
    /// session id.
    #[arg(long, value_name = "PATH")]
    snapshot_dir: Option<PathBuf>,
    /// Session identifier, used both as the printed label and the
    /// snapshot file name when `--snapshot-dir` is given.
    #[arg(long, value_name = "ID", default_value = "session")]
    session_id: String,
}

/// Snapshot subcommands.
#[derive(Subcommand, Debug)]
enum SnapshotCommand {
    /// Decode and print a persisted snapshot.
    Inspect(SnapshotInspectCommand),
}

/// Arguments for `snapshot inspect`.
#[derive(Args, Debug)]
struct SnapshotInspectCommand {
    /// Path to the fixture JSON file the snapshot was taken against.
    #[arg(long, value_name = "PATH")]
    fixture: PathBuf,
    /// Directory the snapshot was persisted under.
    #[arg(long, value_name = "PATH")]
    snapshot_dir: PathBuf,
    /// Session identifier to inspect.
    #[arg(long, value_name = "ID")]
    session_id: String,
    /// Optional engine configuration TOML file (affects `modelHash`
    /// verification only).
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
}

/// Config subcommands.
#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Parse a config file and report whether it is valid.
    Validate(ConfigValidateCommand),
}

/// Arguments for `config validate`.
#[derive(Args, Debug)]
struct ConfigValidateCommand {
    /// Path to the engine configuration TOML file.
    #[arg(long, value_name = "PATH")]
    config: PathBuf,
}

// ============================================================================
// SECTION: Entry Point
// ============================================================================

/// CLI entry point returning an exit code.
fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(err) => emit_error(&err.to_string()),
    }
}

/// Executes the CLI command dispatcher.
fn run() -> CliResult<ExitCode> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Run(command) => command_run(&command),
        Commands::Snapshot {
            command: SnapshotCommand::Inspect(command),
        } => command_snapshot_inspect(&command),
        Commands::Config {
            command: ConfigCommand::Validate(command),
        } => command_config_validate(&command),
    }
}

// ============================================================================
// SECTION: Run Command
// ============================================================================

/// Executes the `run` command.
fn command_run(command: &RunCommand) -> CliResult<ExitCode> {
    let engine_config = load_optional_config(command.config.as_deref())?;
    let loaded = load_fixture(&command.fixture)?;
    let script = Script::load(&command.script).map_err(|err| context_err("loading script", err))?;

    let mut stream = command
        .snapshot_dir
        .as_ref()
        .map(|dir| FileSessionStream::new(dir.clone()).map_err(|err| context_err("opening snapshot directory", err)))
        .transpose()?;

    let test = Arc::new(loaded.test);
    let resumed = stream.as_ref().and_then(|stream| stream.get_retrieval_stream(&command.session_id));

    let mut driver = match resumed {
        Some(bytes) => SnapshotCodec::decode(
            &bytes,
            command.session_id.clone(),
            Arc::clone(&test),
            loaded.route,
            FixtureExpressionEngine,
            engine_config,
        )
        .map_err(|err| context_err("decoding resumed snapshot", err))?,
        None => TestSessionDriver::new(
            command.session_id.clone(),
            Arc::clone(&test),
            loaded.route,
            FixtureExpressionEngine,
            engine_config,
        ),
    };

    for action in &script.actions {
        apply_action(&mut driver, action)?;
    }

    write_stdout_line(&format!("session {} state {}", driver.session_id(), driver.state()))
        .map_err(|err| output_error("stdout", &err))?;

    if let Some(stream) = stream.as_mut() {
        let bytes = SnapshotCodec::encode(&driver).map_err(|err| context_err("encoding snapshot", err))?;
        stream.persist_stream(&command.session_id, bytes);
        if let Some(message) = stream.take_last_error() {
            return Err(context_err("persisting snapshot", message));
        }
    }

    Ok(ExitCode::SUCCESS)
}

/// Applies one scripted action to `driver`, printing any value it reads.
fn apply_action(driver: &mut TestSessionDriver<FixtureExpressionEngine>, action: &ScriptAction) -> CliResult<()> {
    match action {
        ScriptAction::BeginTestSession => driver.begin_test_session().map_err(|err| context_err("beginTestSession", err)),
        ScriptAction::EndTestSession => driver.end_test_session().map_err(|err| context_err("endTestSession", err)),
        ScriptAction::BeginAttempt {
            allow_late_submission,
        } => driver.begin_attempt(*allow_late_submission).map_err(|err| context_err("beginAttempt", err)),
        ScriptAction::EndAttempt {
            responses,
            allow_late_submission,
        } => {
            let responses: Vec<(String, QtiValue)> = responses.iter().map(|(identifier, value)| (identifier.clone(), value.clone())).collect();
            driver.end_attempt(responses, *allow_late_submission).map_err(|err| context_err("endAttempt", err))
        }
        ScriptAction::MoveNext => driver.move_next().map_err(|err| context_err("moveNext", err)),
        ScriptAction::MoveBack => driver.move_back().map_err(|err| context_err("moveBack", err)),
        ScriptAction::JumpTo {
            position,
        } => driver.jump_to(*position).map_err(|err| context_err("jumpTo", err)),
        ScriptAction::MoveNextTestPart => driver.move_next_test_part().map_err(|err| context_err("moveNextTestPart", err)),
        ScriptAction::MoveNextAssessmentSection => {
            driver.move_next_assessment_section().map_err(|err| context_err("moveNextAssessmentSection", err))
        }
        ScriptAction::SetTimeUnixMillis {
            value,
        } => driver
            .set_time(qti_session_core::core::time::Observation::from_unix_millis(*value))
            .map_err(|err| context_err("setTime", err)),
        ScriptAction::Suspend => {
            driver.suspend();
            Ok(())
        }
        ScriptAction::Get {
            identifier,
        } => {
            let value = driver.get(identifier).map_err(|err| context_err("get", err))?;
            let rendered = value.map_or_else(|| "null".to_string(), |value| format!("{value:?}"));
            write_stdout_line(&format!("{identifier} = {rendered}")).map_err(|err| output_error("stdout", &err))
        }
        ScriptAction::Set {
            identifier,
            value,
        } => driver.set(identifier, value.clone()).map_err(|err| context_err("set", err)),
        ScriptAction::Unset {
            identifier,
        } => driver.unset(identifier).map_err(|err| context_err("unset", err)),
    }
}

// ============================================================================
// SECTION: Snapshot Command
// ============================================================================

/// Executes the `snapshot inspect` command.
fn command_snapshot_inspect(command: &SnapshotInspectCommand) -> CliResult<ExitCode> {
    let engine_config = load_optional_config(command.config.as_deref())?;
    let loaded = load_fixture(&command.fixture)?;
    let stream =
        FileSessionStream::new(command.snapshot_dir.clone()).map_err(|err| context_err("opening snapshot directory", err))?;
    let bytes = stream.get_retrieval_stream(&command.session_id).ok_or_else(|| {
        CliError::new(format!("no snapshot found for session {}", command.session_id))
    })?;
    if let Some(message) = stream.take_last_error() {
        return Err(context_err("reading snapshot", message));
    }

    let test = Arc::new(loaded.test);
    let driver = SnapshotCodec::decode(
        &bytes,
        command.session_id.clone(),
        test,
        loaded.route,
        FixtureExpressionEngine,
        engine_config,
    )
    .map_err(|err| context_err("decoding snapshot", err))?;

    write_stdout_line(&format!(
        "session {} state {} position {}/{}",
        driver.session_id(),
        driver.state(),
        driver.route().position(),
        driver.route().count()
    ))
    .map_err(|err| output_error("stdout", &err))?;
    Ok(ExitCode::SUCCESS)
}

// ============================================================================
// SECTION: Config Command
// ============================================================================

/// Executes the `config validate` command.
fn command_config_validate(command: &ConfigValidateCommand) -> CliResult<ExitCode> {
    let engine_config = config::load_engine_config(&command.config).map_err(|err| context_err("validating config", err))?;
    write_stdout_line(&format!("{engine_config:?}")).map_err(|err| output_error("stdout", &err))?;
    Ok(ExitCode::SUCCESS)
}

// ============================================================================
// SECTION: Shared Helpers
// ============================================================================

/// Loads and converts a fixture file into its domain representation.
fn load_fixture(path: &std::path::Path) -> CliResult<LoadedFixture> {
    let fixture = Fixture::load(path).map_err(|err| context_err("loading fixture", err))?;
    fixture.into_domain().map_err(|err| context_err("converting fixture", err))
}

/// Loads an optional engine configuration, defaulting when none is given.
fn load_optional_config(path: Option<&std::path::Path>) -> CliResult<qti_session_core::EngineConfig> {
    path.map_or_else(
        || Ok(qti_session_core::EngineConfig::default()),
        |path| config::load_engine_config(path).map_err(|err| context_err("loading config", err)),
    )
}

// ============================================================================
// SECTION: Output Helpers
// ============================================================================

/// Writes a single line to stdout.
fn write_stdout_line(message: &str) -> std::io::Result<()> {
    use std::io::Write;
    let mut stdout = std::io::stdout();
    writeln!(&mut stdout, "{message}")
}

/// Writes a single line to stderr.
fn write_stderr_line(message: &str) -> std::io::Result<()> {
    use std::io::Write;
    let mut stderr = std::io::stderr();
    writeln!(&mut stderr, "{message}")
}

/// Formats an output I/O failure as a [`CliError`].
fn output_error(stream: &str, error: &std::io::Error) -> CliError {
    CliError::new(format!("failed to write to {stream}: {error}"))
}

/// Emits an error message to stderr and returns a failure exit code.
fn emit_error(message: &str) -> ExitCode {
    let _ = write_stderr_line(message);
    ExitCode::FAILURE
}
