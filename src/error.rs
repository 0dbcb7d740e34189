//! Error types for the docmistral launcher.
//!
//! Failures split the same way the launcher's control flow does:
//!
//! * Everything that can go wrong **before** the worker is spawned is a
//!   [`LauncherError`] returned as `Err`. These are fatal to the invocation:
//!   they are reported once and the process exits with status 1. Nothing is
//!   retried; provisioning is idempotent, so the next invocation is the retry.
//!
//! * A worker that exits non-zero is **not** a local error. It is carried as
//!   [`crate::Outcome::PropagatedFailure`] so the launcher can exit with the
//!   worker's own status. [`LauncherError::WorkerExitedNonZero`] exists only
//!   for callers that prefer a `Result` (see [`crate::Outcome::worker_error`]).
//!
//! Config seeding never produces an error at all; it is advisory.

use std::path::PathBuf;
use thiserror::Error;

pub use pyenv_auto::PyEnvError;

/// All fatal errors returned by the docmistral library.
#[derive(Debug, Error)]
pub enum LauncherError {
    // ── Provisioning errors ───────────────────────────────────────────────
    /// Interpreter discovery or environment provisioning failed.
    #[error(transparent)]
    Environment(#[from] PyEnvError),

    /// The package directory (worker sources, manifest, template) is missing.
    #[error(
        "Worker package not found (looked in: {}).\nSet DOCMISTRAL_PACKAGE_DIR to the directory containing worker/.",
        .searched.iter().map(|p| p.display().to_string()).collect::<Vec<_>>().join(", ")
    )]
    PackageNotFound { searched: Vec<PathBuf> },

    /// A termination request arrived before the worker was spawned.
    #[error("Interrupted before the worker was started")]
    Interrupted,

    // ── Worker errors ─────────────────────────────────────────────────────
    /// The worker (or the test probe) could not be spawned.
    #[error("Failed to launch worker '{}': {source}", .program.display())]
    WorkerLaunchFailed {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The worker ran and exited unsuccessfully.
    #[error("Worker exited with code {code}")]
    WorkerExitedNonZero { code: i32 },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// The launcher's error taxonomy, independent of payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InterpreterNotFound,
    InterpreterVersionUnsupported,
    EnvironmentCreationFailed,
    DependencyInstallFailed,
    WorkerLaunchFailed,
    WorkerExitedNonZero,
    /// Package layout, configuration, locking or spawn problems during
    /// bootstrap that have no more specific kind.
    Bootstrap,
}

impl LauncherError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LauncherError::Environment(e) => match e {
                PyEnvError::InterpreterNotFound { .. } => ErrorKind::InterpreterNotFound,
                PyEnvError::InterpreterVersionUnsupported { .. } => {
                    ErrorKind::InterpreterVersionUnsupported
                }
                PyEnvError::EnvironmentCreationFailed { .. } => {
                    ErrorKind::EnvironmentCreationFailed
                }
                PyEnvError::DependencyInstallFailed { .. } => ErrorKind::DependencyInstallFailed,
                _ => ErrorKind::Bootstrap,
            },
            LauncherError::WorkerLaunchFailed { .. } => ErrorKind::WorkerLaunchFailed,
            LauncherError::WorkerExitedNonZero { .. } => ErrorKind::WorkerExitedNonZero,
            LauncherError::PackageNotFound { .. }
            | LauncherError::Interrupted
            | LauncherError::InvalidConfig(_) => ErrorKind::Bootstrap,
        }
    }
}
