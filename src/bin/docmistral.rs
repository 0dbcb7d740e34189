//! CLI binary for docmistral.
//!
//! A thin shim over the library crate: pick the mode, then either print
//! (help, version) or bootstrap and supervise the worker (run, test).

use anyhow::{Context, Result};
use clap::{Arg, ArgAction, Command};
use docmistral::{
    signals, ErrorKind, Launcher, LauncherConfig, LauncherError, OperatingMode, Outcome,
};
use std::io;
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

const AFTER_HELP: &str = r#"MODES:
  (no flag)    Provision the Python environment on first use, then start the
               MCP server. stdin/stdout carry the MCP protocol.
  --test       Provision, check that the worker imports cleanly, then exit
               with the worker's status.

FIRST RUN:
  1. A Python 3.8+ interpreter is located on PATH (python3, then python).
  2. A private virtual environment is created in ~/.docmistral/venv-N and
     the worker's requirements are installed into it.
  3. ~/.docmistral/.env is created from the bundled template. Put your
     Mistral API key in it.

ENVIRONMENT VARIABLES:
  MISTRAL_API_KEY          Mistral API key (read by the worker)
  DOCMISTRAL_HOME          Override the per-user directory (~/.docmistral)
  DOCMISTRAL_PACKAGE_DIR   Directory containing worker/ (mcp_server.py, requirements.txt)
  DOCMISTRAL_PYTHON        Interpreter to try before python3/python
  RUST_LOG                 Launcher log filter, e.g. docmistral=debug (stderr)

MCP CLIENT CONFIG:
  { "mcpServers": { "docmistral": { "command": "docmistral" } } }
"#;

/// The CLI surface. Used for help output only: argument parsing is lenient
/// and handled by [`OperatingMode::from_args`].
fn cli() -> Command {
    Command::new("docmistral")
        .about("Run the DocMistral document-to-Markdown MCP server")
        .long_about(
            "Bootstrap and run the DocMistral MCP server, which converts PDF, DOCX, PPTX \
             and image files to Markdown using Mistral AI OCR. The Python worker and its \
             dependencies are provisioned automatically on first run.",
        )
        .disable_help_flag(true)
        .disable_version_flag(true)
        .arg(
            Arg::new("help")
                .short('h')
                .long("help")
                .action(ArgAction::SetTrue)
                .help("Print help and exit"),
        )
        .arg(
            Arg::new("version")
                .short('v')
                .long("version")
                .action(ArgAction::SetTrue)
                .help("Print version and exit"),
        )
        .arg(
            Arg::new("test")
                .long("test")
                .action(ArgAction::SetTrue)
                .help("Provision the environment and verify the worker, then exit"),
        )
        .after_long_help(AFTER_HELP)
}

/// Version from the package metadata on disk; the compiled version only if
/// that cannot be read.
fn declared_version() -> String {
    LauncherConfig::from_env()
        .and_then(|config| config.resolve_package())
        .ok()
        .and_then(|package| package.declared_version())
        .unwrap_or_else(|| env!("CARGO_PKG_VERSION").to_string())
}

#[tokio::main]
async fn main() -> ExitCode {
    let mode = OperatingMode::from_args(
        std::env::args_os()
            .skip(1)
            .map(|a| a.to_string_lossy().into_owned()),
    );

    let outcome = match mode {
        OperatingMode::Help => {
            println!("{}", cli().render_long_help());
            Outcome::Success
        }
        OperatingMode::Version => {
            println!("docmistral {}", declared_version());
            Outcome::Success
        }
        OperatingMode::Run | OperatingMode::Test => {
            init_logging();

            match bootstrap(mode).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    eprintln!("docmistral: failed to start: {e:#}");
                    let kind = e
                        .downcast_ref::<LauncherError>()
                        .map_or(ErrorKind::Bootstrap, LauncherError::kind);
                    Outcome::BootstrapFailure(kind)
                }
            }
        }
    };

    if let Some(e) = outcome.worker_error() {
        tracing::debug!("{e}");
    }
    ExitCode::from(u8::try_from(outcome.exit_code()).unwrap_or(1))
}

/// Logs go to stderr: stdout is reserved for the worker's protocol.
fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();
}

async fn bootstrap(mode: OperatingMode) -> Result<Outcome> {
    let config = LauncherConfig::from_env().context("Invalid launcher configuration")?;
    let launcher = Launcher::new(config);

    // Provisioning blocks on subprocesses. No handlers are installed yet, so
    // a termination signal here kills the launcher with the default action.
    let prepared = tokio::task::block_in_place(|| launcher.prepare())
        .context("Failed to prepare the Python worker environment")?;

    let cancel = CancellationToken::new();
    signals::cancel_on_shutdown_signal(cancel.clone());

    Ok(launcher.start(&prepared, mode, &cancel).await?)
}
