//! Isolated environment provisioning (`venv` + `pip`).

use std::ffi::OsString;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};

use fs2::FileExt;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::interpreter::RuntimeCandidate;
use crate::version::PackageVersion;
use crate::PyEnvError;

/// The dependency whose presence stands in for "environment fully populated".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkerDependency {
    pub name: String,
    pub minimum: PackageVersion,
}

impl MarkerDependency {
    /// Returns `None` when `minimum` has no numeric release part.
    pub fn new(name: impl Into<String>, minimum: &str) -> Option<Self> {
        Some(Self {
            name: name.into(),
            minimum: PackageVersion::parse(minimum)?,
        })
    }

    /// `true` if `packages` holds this dependency at a qualifying version.
    pub fn is_satisfied_by(&self, packages: &[InstalledPackage]) -> bool {
        let wanted = normalize_name(&self.name);
        packages.iter().any(|p| {
            normalize_name(&p.name) == wanted
                && PackageVersion::parse(&p.version).is_some_and(|v| v >= self.minimum)
        })
    }
}

/// One entry of `pip list --format=json`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct InstalledPackage {
    pub name: String,
    pub version: String,
}

/// What [`EnvironmentProvisioner::ensure`] actually had to do.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProvisionReport {
    /// The venv did not exist and was created.
    pub created: bool,
    /// The marker dependency was missing and the manifest was installed.
    pub installed: bool,
}

/// Creates and populates an isolated environment for one interpreter.
#[derive(Debug)]
pub struct EnvironmentProvisioner<'a> {
    interpreter: &'a RuntimeCandidate,
    marker: MarkerDependency,
}

impl<'a> EnvironmentProvisioner<'a> {
    pub fn new(interpreter: &'a RuntimeCandidate, marker: MarkerDependency) -> Self {
        Self {
            interpreter,
            marker,
        }
    }

    /// Make sure `root` holds a venv in which the manifest is installed.
    ///
    /// Idempotent. The existence of `root` is the only "created" signal and
    /// the marker dependency is the only "installed" signal. Nothing is rolled
    /// back on failure: a half-built `root` is reused by the next call.
    ///
    /// The sequence runs under an exclusive advisory lock on `<root>.lock` so
    /// concurrent first runs by the same user do not interleave.
    pub fn ensure(&self, root: &Path, manifest: &Path) -> Result<ProvisionReport, PyEnvError> {
        let _lock = lock_environment(root)?;
        let mut report = ProvisionReport::default();

        // 1. Create the venv.
        if !root.exists() {
            info!("Creating Python environment at {}", root.display());
            let mut cmd = Command::new(&self.interpreter.path);
            cmd.arg("-m").arg("venv").arg(root);
            let status = run_inherited(cmd, &self.interpreter.path)?;
            if !status.success() {
                return Err(PyEnvError::EnvironmentCreationFailed {
                    path: root.to_path_buf(),
                    code: status.code(),
                });
            }
            report.created = true;
        }

        // 2. Inspect.
        let python = env_python(root);
        let packages = installed_packages(&python).unwrap_or_else(|e| {
            warn!("{e}; treating environment as unpopulated");
            Vec::new()
        });

        // 3. Install only when the marker is missing.
        if self.marker.is_satisfied_by(&packages) {
            debug!(
                "{} >= {} already installed in {}",
                self.marker.name,
                self.marker.minimum,
                root.display()
            );
            return Ok(report);
        }

        info!(
            "Installing dependencies from {} into {}",
            manifest.display(),
            root.display()
        );
        let mut cmd = Command::new(&python);
        cmd.args(["-m", "pip", "install", "--disable-pip-version-check", "-r"])
            .arg(manifest);
        let status = run_inherited(cmd, &python)?;
        if !status.success() {
            return Err(PyEnvError::DependencyInstallFailed {
                manifest: manifest.to_path_buf(),
                code: status.code(),
            });
        }
        report.installed = true;

        Ok(report)
    }
}

/// The interpreter inside a venv rooted at `root`.
pub fn env_python(root: &Path) -> PathBuf {
    if cfg!(windows) {
        root.join("Scripts").join("python.exe")
    } else {
        root.join("bin").join("python")
    }
}

/// Lists the packages installed for `python` via `pip list --format=json`.
///
/// Read-only: pip's stdout is captured, its stderr passes through.
pub fn installed_packages(python: &Path) -> Result<Vec<InstalledPackage>, PyEnvError> {
    let output = Command::new(python)
        .args([
            "-m",
            "pip",
            "list",
            "--format=json",
            "--disable-pip-version-check",
        ])
        .stdin(Stdio::null())
        .stderr(Stdio::inherit())
        .output()
        .map_err(|source| PyEnvError::Spawn {
            program: python.to_path_buf(),
            source,
        })?;

    if !output.status.success() {
        return Err(PyEnvError::InvalidListing {
            python: python.to_path_buf(),
            detail: format!("pip list exited with {}", output.status),
        });
    }

    serde_json::from_slice(&output.stdout).map_err(|e| PyEnvError::InvalidListing {
        python: python.to_path_buf(),
        detail: e.to_string(),
    })
}

// ── Internal helpers ─────────────────────────────────────────────────────────

/// PEP 503 name normalisation: lowercase, runs of `-`, `_`, `.` become `-`.
fn normalize_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut in_sep = false;
    for ch in name.chars() {
        if matches!(ch, '-' | '_' | '.') {
            if !in_sep {
                out.push('-');
            }
            in_sep = true;
        } else {
            out.extend(ch.to_lowercase());
            in_sep = false;
        }
    }
    out
}

/// Runs `cmd` to completion with stdin/stderr inherited and stdout sent to
/// our stderr.
fn run_inherited(mut cmd: Command, program: &Path) -> Result<ExitStatus, PyEnvError> {
    debug!("Running {:?}", cmd);
    cmd.stdin(Stdio::inherit())
        .stdout(Stdio::from(std::io::stderr()))
        .stderr(Stdio::inherit())
        .status()
        .map_err(|source| PyEnvError::Spawn {
            program: program.to_path_buf(),
            source,
        })
}

fn lock_environment(root: &Path) -> Result<File, PyEnvError> {
    if let Some(parent) = root.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|source| PyEnvError::CacheDir {
            path: parent.to_path_buf(),
            source,
        })?;
    }

    let mut lock_path = OsString::from(root.as_os_str());
    lock_path.push(".lock");
    let lock_path = PathBuf::from(lock_path);

    let file = OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(&lock_path)
        .map_err(|source| PyEnvError::Lock {
            path: lock_path.clone(),
            source,
        })?;
    file.lock_exclusive().map_err(|source| PyEnvError::Lock {
        path: lock_path.clone(),
        source,
    })?;
    debug!("Locked {}", lock_path.display());
    Ok(file)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pkg(name: &str, version: &str) -> InstalledPackage {
        InstalledPackage {
            name: name.into(),
            version: version.into(),
        }
    }

    #[test]
    fn name_normalisation() {
        assert_eq!(normalize_name("Mistral_AI"), "mistral-ai");
        assert_eq!(normalize_name("python-dotenv"), "python-dotenv");
        assert_eq!(normalize_name("zope.interface"), "zope-interface");
        assert_eq!(normalize_name("a-_.b"), "a-b");
    }

    #[test]
    fn marker_requires_qualifying_version() {
        let marker = MarkerDependency::new("mcp", "1.0.0").unwrap();
        assert!(marker.is_satisfied_by(&[pkg("pydantic", "2.9.0"), pkg("mcp", "1.2.1")]));
        assert!(marker.is_satisfied_by(&[pkg("MCP", "1.0")]));
        assert!(!marker.is_satisfied_by(&[pkg("mcp", "0.9.1")]));
        assert!(!marker.is_satisfied_by(&[pkg("mistralai", "1.5.0")]));
        assert!(!marker.is_satisfied_by(&[]));
    }

    #[test]
    fn marker_rejects_unparseable_minimum() {
        assert!(MarkerDependency::new("mcp", "latest").is_none());
    }

    #[test]
    fn pip_list_json_shape() {
        let raw = r#"[{"name": "mcp", "version": "1.3.0"}, {"name": "pip", "version": "24.0", "editable_project_location": "/x"}]"#;
        let parsed: Vec<InstalledPackage> = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0], pkg("mcp", "1.3.0"));
    }

    #[test]
    fn env_python_lives_inside_root() {
        let root = Path::new("/home/u/.docmistral/venv-1");
        assert!(env_python(root).starts_with(root));
    }
}
