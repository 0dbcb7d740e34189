//! # docmistral
//!
//! Launcher and supervisor for the DocMistral MCP worker, a Python process
//! that converts documents and images to Markdown with Mistral OCR and talks
//! to its host application over stdio.
//!
//! The worker itself is opaque here. This crate gets it running:
//!
//! ```text
//! docmistral [--help | --version | --test]
//!  │
//!  ├─ help / version   print to stdout, exit 0, touch nothing else
//!  │
//!  └─ run / test
//!      ├─ 1. Locate     python ≥ 3.8 on PATH            (pyenv-auto)
//!      ├─ 2. Provision  ~/.docmistral/venv-N, pip -r    (pyenv-auto)
//!      ├─ 3. Config     ~/.docmistral/.env from template
//!      └─ 4. Supervise  worker inherits stdin/stdout/stderr;
//!                       its exit code becomes ours, SIGINT/SIGTERM forwarded
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use docmistral::{Launcher, LauncherConfig, OperatingMode};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let launcher = Launcher::new(LauncherConfig::from_env()?);
//!     let cancel = CancellationToken::new();
//!     let outcome = launcher.run(OperatingMode::Test, &cancel).await?;
//!     std::process::exit(outcome.exit_code());
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `docmistral` binary (clap + anyhow + tracing-subscriber) |
//!
//! ## Streams
//!
//! stdout belongs to the worker's protocol. Everything this crate prints
//! (logs, provisioning output, the config warning) goes to stderr.

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod launcher;
pub mod materialize;
pub mod mode;
pub mod signals;
pub mod supervisor;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{LauncherConfig, LauncherConfigBuilder, PackageLayout, ENV_REVISION, SECRET_KEY};
pub use error::{ErrorKind, LauncherError, PyEnvError};
pub use launcher::{Launcher, Prepared};
pub use materialize::{ensure_config, worker_environment, Materialized};
pub use mode::OperatingMode;
pub use supervisor::{launch, Outcome, WorkerCommand, WorkerHandle};
