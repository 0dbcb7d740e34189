//! Interpreter discovery.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use once_cell::sync::OnceCell;
use tracing::{debug, warn};

use crate::version::PythonVersion;
use crate::PyEnvError;

/// An interpreter that was found on the search path and reported a version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeCandidate {
    /// Name as listed by the caller, e.g. `python3`.
    pub program: String,
    /// Resolved executable.
    pub path: PathBuf,
    pub version: PythonVersion,
}

/// Finds the first acceptable interpreter from an ordered candidate list.
///
/// The result of [`locate`](Self::locate) is cached: repeated calls on the same
/// locator never re-probe. A fresh locator probes again.
#[derive(Debug)]
pub struct InterpreterLocator {
    candidates: Vec<String>,
    minimum: PythonVersion,
    search_path: Option<OsString>,
    resolved: OnceCell<RuntimeCandidate>,
}

impl InterpreterLocator {
    pub fn new<I, S>(candidates: I, minimum: PythonVersion) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            candidates: candidates.into_iter().map(Into::into).collect(),
            minimum,
            search_path: None,
            resolved: OnceCell::new(),
        }
    }

    /// Search this `PATH`-style list instead of the process `PATH`.
    pub fn with_search_path(mut self, path: impl Into<OsString>) -> Self {
        self.search_path = Some(path.into());
        self
    }

    pub fn minimum(&self) -> PythonVersion {
        self.minimum
    }

    pub fn candidates(&self) -> &[String] {
        &self.candidates
    }

    /// Returns the first candidate on the search path whose version is at
    /// least the minimum.
    ///
    /// # Errors
    /// - [`PyEnvError::InterpreterNotFound`] when no candidate resolves at all.
    /// - [`PyEnvError::InterpreterVersionUnsupported`] when candidates resolve
    ///   but every one is too old or printed nothing parseable.
    pub fn locate(&self) -> Result<&RuntimeCandidate, PyEnvError> {
        self.resolved.get_or_try_init(|| self.probe_candidates())
    }

    fn probe_candidates(&self) -> Result<RuntimeCandidate, PyEnvError> {
        let search_path = self
            .search_path
            .clone()
            .or_else(|| std::env::var_os("PATH"));
        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));

        let mut rejected: Vec<String> = Vec::new();

        for program in &self.candidates {
            let path = match which::which_in(program, search_path.as_ref(), &cwd) {
                Ok(p) => p,
                Err(_) => {
                    debug!("{program}: not on search path");
                    continue;
                }
            };

            match probe_version(&path) {
                Some(version) if version.satisfies(self.minimum) => {
                    debug!("Using {} ({version})", path.display());
                    return Ok(RuntimeCandidate {
                        program: program.clone(),
                        path,
                        version,
                    });
                }
                Some(version) => {
                    debug!("{}: version {version} is below {}", path.display(), self.minimum);
                    rejected.push(format!("{program} ({version})"));
                }
                None => {
                    warn!("{}: could not determine version, skipping", path.display());
                    rejected.push(format!("{program} (unknown version)"));
                }
            }
        }

        if rejected.is_empty() {
            Err(PyEnvError::InterpreterNotFound {
                candidates: self.candidates.clone(),
                minimum: self.minimum,
            })
        } else {
            Err(PyEnvError::InterpreterVersionUnsupported {
                found: rejected.join(", "),
                minimum: self.minimum,
            })
        }
    }
}

/// Runs `<python> --version` and parses `<major>.<minor>` from stdout+stderr.
///
/// Python 2 prints its banner on stderr, hence both streams. A spawn failure
/// or unparseable output yields `None`.
pub fn probe_version(python: &Path) -> Option<PythonVersion> {
    let output = Command::new(python)
        .arg("--version")
        .stdin(Stdio::null())
        .output()
        .map_err(|e| debug!("{}: --version failed to run: {e}", python.display()))
        .ok()?;

    let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
    combined.push_str(&String::from_utf8_lossy(&output.stderr));
    PythonVersion::parse(&combined)
}
