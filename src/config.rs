//! Launcher configuration and on-disk layout.
//!
//! Every path the launcher touches is derived from [`LauncherConfig`]:
//!
//! ```text
//! <product dir>/               per-user, default ~/.docmistral
//!   ├─ venv-<ENV_REVISION>/    provisioned environment
//!   ├─ venv-<ENV_REVISION>.lock
//!   └─ .env                    materialized config (secrets)
//!
//! <package dir>/               ships with the launcher, read-only
//!   ├─ Cargo.toml              declared version
//!   └─ worker/
//!        ├─ mcp_server.py      worker entry point
//!        ├─ requirements.txt   dependency manifest
//!        └─ .env.example       config template
//! ```
//!
//! [`LauncherConfig::from_env`] is the only place that reads environment
//! variables; tests build configs directly with the builder.

use crate::error::LauncherError;
use pyenv_auto::{MarkerDependency, PackageVersion, PythonVersion};
use serde::Deserialize;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// Bumped whenever the environment layout changes incompatibly, so upgrades
/// provision a fresh `venv-<N>` instead of reusing a stale one.
pub const ENV_REVISION: u32 = 1;

/// Secret consumed by the worker. Never validated here.
pub const SECRET_KEY: &str = "MISTRAL_API_KEY";

const WORKER_DIR: &str = "worker";
const MANIFEST_FILE: &str = "requirements.txt";
const TEMPLATE_FILE: &str = ".env.example";
const ENTRY_FILE: &str = "mcp_server.py";
const PROBE_MODULE: &str = "mcp_server";
const CONFIG_FILE: &str = ".env";
const METADATA_FILE: &str = "Cargo.toml";

/// Configuration for a launcher instance.
///
/// Built via [`LauncherConfig::builder()`] or [`LauncherConfig::from_env()`].
#[derive(Debug, Clone)]
pub struct LauncherConfig {
    /// Per-user directory holding the environment and the config file.
    pub product_dir: PathBuf,

    /// Directories searched, in order, for the shipped `worker/` package.
    pub package_candidates: Vec<PathBuf>,

    /// Interpreter names tried in order.
    pub interpreter_candidates: Vec<String>,

    /// Oldest acceptable interpreter. Default: 3.8.
    pub minimum_python: PythonVersion,

    /// Dependency whose presence means "environment populated". Default: `mcp >= 1.0.0`.
    pub marker: MarkerDependency,

    /// `PATH`-style list used for interpreter lookup. `None` uses `PATH`.
    pub search_path: Option<OsString>,
}

impl LauncherConfig {
    pub fn builder() -> LauncherConfigBuilder {
        LauncherConfigBuilder::default()
    }

    /// Defaults plus environment overrides:
    ///
    /// - `DOCMISTRAL_HOME`: per-user product directory.
    /// - `DOCMISTRAL_PACKAGE_DIR`: package directory (disables the search).
    /// - `DOCMISTRAL_PYTHON`: interpreter tried before the defaults.
    pub fn from_env() -> Result<Self, LauncherError> {
        let mut builder = Self::builder().product_dir(
            std::env::var_os("DOCMISTRAL_HOME")
                .map(PathBuf::from)
                .unwrap_or_else(default_product_dir),
        );

        builder = match std::env::var_os("DOCMISTRAL_PACKAGE_DIR") {
            Some(dir) => builder.package_candidates([PathBuf::from(dir)]),
            None => builder.package_candidates(default_package_candidates()),
        };

        if let Some(python) = std::env::var("DOCMISTRAL_PYTHON")
            .ok()
            .filter(|s| !s.trim().is_empty())
        {
            let mut candidates = vec![python];
            candidates.extend(default_interpreters().iter().map(|s| s.to_string()));
            builder = builder.interpreter_candidates(candidates);
        }

        builder.build()
    }

    /// The provisioned environment root.
    pub fn environment_root(&self) -> PathBuf {
        self.product_dir.join(format!("venv-{ENV_REVISION}"))
    }

    /// The materialized config file.
    pub fn config_path(&self) -> PathBuf {
        self.product_dir.join(CONFIG_FILE)
    }

    /// First package candidate that contains both the worker entry script
    /// and `worker/requirements.txt`.
    pub fn resolve_package(&self) -> Result<PackageLayout, LauncherError> {
        self.package_candidates
            .iter()
            .map(|root| PackageLayout::new(root.clone()))
            .find(PackageLayout::is_complete)
            .ok_or_else(|| LauncherError::PackageNotFound {
                searched: self.package_candidates.clone(),
            })
    }
}

impl Default for LauncherConfig {
    fn default() -> Self {
        Self {
            product_dir: default_product_dir(),
            package_candidates: default_package_candidates(),
            interpreter_candidates: default_interpreters().iter().map(|s| s.to_string()).collect(),
            minimum_python: PythonVersion::new(3, 8),
            marker: default_marker(),
            search_path: None,
        }
    }
}

/// Builder for [`LauncherConfig`].
#[derive(Debug, Default)]
pub struct LauncherConfigBuilder {
    config: LauncherConfig,
    marker_minimum: Option<(String, String)>,
}

impl LauncherConfigBuilder {
    pub fn product_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.product_dir = dir.into();
        self
    }

    pub fn package_dir(self, dir: impl Into<PathBuf>) -> Self {
        self.package_candidates([dir.into()])
    }

    pub fn package_candidates(mut self, dirs: impl IntoIterator<Item = PathBuf>) -> Self {
        self.config.package_candidates = dirs.into_iter().collect();
        self
    }

    pub fn interpreter_candidates<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.interpreter_candidates = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn minimum_python(mut self, major: u32, minor: u32) -> Self {
        self.config.minimum_python = PythonVersion::new(major, minor);
        self
    }

    pub fn marker(mut self, name: impl Into<String>, minimum: impl Into<String>) -> Self {
        self.marker_minimum = Some((name.into(), minimum.into()));
        self
    }

    pub fn search_path(mut self, path: impl Into<OsString>) -> Self {
        self.config.search_path = Some(path.into());
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(mut self) -> Result<LauncherConfig, LauncherError> {
        if let Some((name, minimum)) = self.marker_minimum.take() {
            self.config.marker = MarkerDependency::new(name.as_str(), &minimum).ok_or_else(|| {
                LauncherError::InvalidConfig(format!(
                    "marker dependency '{name}' has no numeric minimum version: '{minimum}'"
                ))
            })?;
        }

        let c = &self.config;
        if c.interpreter_candidates.is_empty() {
            return Err(LauncherError::InvalidConfig(
                "at least one interpreter candidate is required".into(),
            ));
        }
        if c.product_dir.as_os_str().is_empty() {
            return Err(LauncherError::InvalidConfig(
                "product directory must not be empty".into(),
            ));
        }
        if c.package_candidates.is_empty() {
            return Err(LauncherError::InvalidConfig(
                "at least one package directory candidate is required".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── Package layout ───────────────────────────────────────────────────────

/// Paths inside a resolved package directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageLayout {
    root: PathBuf,
}

impl PackageLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn worker_dir(&self) -> PathBuf {
        self.root.join(WORKER_DIR)
    }

    pub fn manifest(&self) -> PathBuf {
        self.worker_dir().join(MANIFEST_FILE)
    }

    pub fn config_template(&self) -> PathBuf {
        self.worker_dir().join(TEMPLATE_FILE)
    }

    pub fn entry_script(&self) -> PathBuf {
        self.worker_dir().join(ENTRY_FILE)
    }

    /// Entry script and manifest are both present.
    pub fn is_complete(&self) -> bool {
        self.entry_script().is_file() && self.manifest().is_file()
    }

    pub fn probe_module(&self) -> &'static str {
        PROBE_MODULE
    }

    /// Version declared in the package metadata, read now (not at build time).
    pub fn declared_version(&self) -> Option<String> {
        #[derive(Deserialize)]
        struct Metadata {
            package: PackageSection,
        }
        #[derive(Deserialize)]
        struct PackageSection {
            version: String,
        }

        let raw = std::fs::read_to_string(self.root.join(METADATA_FILE)).ok()?;
        let meta: Metadata = toml::from_str(&raw).ok()?;
        Some(meta.package.version)
    }
}

// ── Defaults ─────────────────────────────────────────────────────────────

fn default_interpreters() -> &'static [&'static str] {
    if cfg!(windows) {
        &["py", "python3", "python"]
    } else {
        &["python3", "python"]
    }
}

fn default_marker() -> MarkerDependency {
    MarkerDependency {
        name: "mcp".to_string(),
        minimum: PackageVersion::new(&[1, 0, 0]),
    }
}

/// `~/.docmistral`, or `<tmp>/.docmistral` when there is no home directory.
fn default_product_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(".docmistral")
}

/// Next to the executable, its parent, an FHS-style share dir, then the
/// source tree this binary was built from.
fn default_package_candidates() -> Vec<PathBuf> {
    let mut candidates = Vec::new();
    if let Some(exe_dir) = std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(Path::to_path_buf))
    {
        candidates.push(exe_dir.clone());
        if let Some(parent) = exe_dir.parent() {
            candidates.push(parent.to_path_buf());
            candidates.push(parent.join("share").join("docmistral"));
        }
    }
    candidates.push(PathBuf::from(env!("CARGO_MANIFEST_DIR")));
    candidates
}
