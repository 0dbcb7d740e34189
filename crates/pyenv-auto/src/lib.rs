//! # pyenv-auto
//!
//! Locate a usable Python interpreter and provision an isolated virtual
//! environment for it, so that a launcher can run a Python worker without the
//! user installing anything by hand.
//!
//! ## How it works
//!
//! 1. [`InterpreterLocator::locate`] walks an ordered candidate list
//!    (`python3`, `python`, …), resolves each on the search path and runs
//!    `<candidate> --version`. The first one reporting at least the minimum
//!    `<major>.<minor>` wins and is cached for the locator's lifetime.
//! 2. [`EnvironmentProvisioner::ensure`] creates the venv with
//!    `<interpreter> -m venv <root>` if `<root>` does not exist yet.
//! 3. It lists the venv's packages (`pip list --format=json`) and, only when
//!    the marker dependency is missing or too old, runs
//!    `pip install -r <manifest>`.
//!
//! Subsequent calls are a directory check plus one `pip list`.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use pyenv_auto::{EnvironmentProvisioner, InterpreterLocator, MarkerDependency, PythonVersion};
//! use std::path::Path;
//!
//! let locator = InterpreterLocator::new(["python3", "python"], PythonVersion::new(3, 8));
//! let python = locator.locate().expect("no usable python");
//!
//! let marker = MarkerDependency::new("mcp", "1.0.0").unwrap();
//! let report = EnvironmentProvisioner::new(python, marker)
//!     .ensure(Path::new("/home/me/.app/venv-1"), Path::new("requirements.txt"))
//!     .expect("provisioning failed");
//! eprintln!("created: {}, installed: {}", report.created, report.installed);
//! ```
//!
//! ## Output streams
//!
//! Provisioning subprocesses inherit stdin and stderr; their stdout is sent
//! to this process's stderr. Callers that later hand stdout to a protocol
//! peer can therefore provision first without polluting that channel.

use std::path::PathBuf;
use thiserror::Error;

mod environment;
mod interpreter;
mod version;

pub use environment::{
    env_python, installed_packages, EnvironmentProvisioner, InstalledPackage, MarkerDependency,
    ProvisionReport,
};
pub use interpreter::{probe_version, InterpreterLocator, RuntimeCandidate};
pub use version::{PackageVersion, PythonVersion};

// ── Error type ───────────────────────────────────────────────────────────────

/// Errors returned by pyenv-auto operations.
#[derive(Error, Debug)]
pub enum PyEnvError {
    /// None of the candidate executables exist on the search path.
    #[error(
        "No Python interpreter found (tried: {}).\nPython {minimum} or newer is required.",
        .candidates.join(", ")
    )]
    InterpreterNotFound {
        candidates: Vec<String>,
        minimum: PythonVersion,
    },

    /// Candidates exist, but none reports a recent enough version.
    #[error("No supported Python interpreter found (found: {found}).\nPython {minimum} or newer is required.")]
    InterpreterVersionUnsupported {
        found: String,
        minimum: PythonVersion,
    },

    /// `python -m venv <path>` exited unsuccessfully.
    #[error("Failed to create Python environment at '{}' ({})", .path.display(), exit_label(.code))]
    EnvironmentCreationFailed { path: PathBuf, code: Option<i32> },

    /// `pip install -r <manifest>` exited unsuccessfully.
    #[error("Failed to install dependencies from '{}' ({})", .manifest.display(), exit_label(.code))]
    DependencyInstallFailed {
        manifest: PathBuf,
        code: Option<i32>,
    },

    /// A provisioning subprocess could not be started at all.
    #[error("Failed to run '{}': {source}", .program.display())]
    Spawn {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// `pip list` produced output that is not the expected JSON array.
    #[error("Unreadable package listing from '{}': {detail}", .python.display())]
    InvalidListing { python: PathBuf, detail: String },

    /// The per-user parent directory could not be created.
    #[error("Cannot create directory '{}': {source}", .path.display())]
    CacheDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The advisory provisioning lock could not be taken.
    #[error("Cannot lock '{}': {source}", .path.display())]
    Lock {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(c) => format!("exit code {c}"),
        None => "terminated by signal".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_names_minimum_version() {
        let e = PyEnvError::InterpreterNotFound {
            candidates: vec!["python3".into(), "python".into()],
            minimum: PythonVersion::new(3, 8),
        };
        let msg = e.to_string();
        assert!(msg.contains("3.8"), "got: {msg}");
        assert!(msg.contains("python3, python"), "got: {msg}");
    }

    #[test]
    fn unsupported_names_minimum_version() {
        let e = PyEnvError::InterpreterVersionUnsupported {
            found: "python3 (3.7)".into(),
            minimum: PythonVersion::new(3, 8),
        };
        let msg = e.to_string();
        assert!(msg.contains("3.8 or newer"), "got: {msg}");
        assert!(msg.contains("python3 (3.7)"), "got: {msg}");
    }

    #[test]
    fn creation_failure_reports_exit_code() {
        let e = PyEnvError::EnvironmentCreationFailed {
            path: PathBuf::from("/tmp/venv"),
            code: Some(2),
        };
        assert!(e.to_string().contains("exit code 2"));

        let e = PyEnvError::DependencyInstallFailed {
            manifest: PathBuf::from("requirements.txt"),
            code: None,
        };
        assert!(e.to_string().contains("signal"));
    }
}
