//! Bootstrap orchestration: locate → provision → materialize → supervise.
//!
//! ```text
//! run / test
//!  │
//!  ├─ 1. Locate     first python ≥ minimum on PATH (cached per Launcher)
//!  ├─ 2. Provision  venv created once, manifest installed if marker missing
//!  ├─ 3. Config     ~/.docmistral/.env seeded from template (advisory)
//!  └─ 4. Supervise  worker (run) or import probe (test), stdio inherited
//! ```
//!
//! Steps 1–3 are blocking and live in [`Launcher::prepare`]; the binary runs
//! them under `block_in_place`. Step 4 is async because it races the worker's
//! exit against cancellation. None of the steps can be skipped, and nothing
//! is spawned if any of steps 1–2 fails.

use crate::config::{LauncherConfig, PackageLayout, SECRET_KEY};
use crate::error::LauncherError;
use crate::materialize::{ensure_config, worker_environment, Materialized};
use crate::mode::OperatingMode;
use crate::supervisor::{launch, Outcome, WorkerCommand};
use pyenv_auto::{env_python, EnvironmentProvisioner, InterpreterLocator, ProvisionReport};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Everything the worker launch needs, produced by [`Launcher::prepare`].
#[derive(Debug, Clone)]
pub struct Prepared {
    /// Interpreter inside the provisioned environment.
    pub python: PathBuf,
    pub package: PackageLayout,
    pub provision: ProvisionReport,
    pub config: Materialized,
    /// Entries from the config file passed to the worker.
    pub worker_env: Vec<(String, String)>,
}

/// One launcher instance. Owns the interpreter cache for its lifetime.
#[derive(Debug)]
pub struct Launcher {
    config: LauncherConfig,
    locator: InterpreterLocator,
}

impl Launcher {
    pub fn new(config: LauncherConfig) -> Self {
        let mut locator = InterpreterLocator::new(
            config.interpreter_candidates.iter().cloned(),
            config.minimum_python,
        );
        if let Some(ref path) = config.search_path {
            locator = locator.with_search_path(path.clone());
        }
        Self { config, locator }
    }

    pub fn config(&self) -> &LauncherConfig {
        &self.config
    }

    /// Run the blocking bootstrap steps in order.
    ///
    /// # Errors
    /// Interpreter, provisioning and package-layout failures. Config seeding
    /// never fails.
    pub fn prepare(&self) -> Result<Prepared, LauncherError> {
        let package = self.config.resolve_package()?;
        debug!("Package directory: {}", package.root().display());

        // ── Step 1: Interpreter ──────────────────────────────────────────────
        let interpreter = self.locator.locate()?;
        info!(
            "Using Python {} at {}",
            interpreter.version,
            interpreter.path.display()
        );

        // ── Step 2: Environment ──────────────────────────────────────────────
        let root = self.config.environment_root();
        let provision = EnvironmentProvisioner::new(interpreter, self.config.marker.clone())
            .ensure(&root, &package.manifest())?;
        info!(
            "Environment ready at {} (created: {}, installed: {})",
            root.display(),
            provision.created,
            provision.installed
        );

        // ── Step 3: Config ───────────────────────────────────────────────────
        let config_path = self.config.config_path();
        let config = ensure_config(&config_path, &package.config_template(), SECRET_KEY);
        let worker_env = worker_environment(&config_path);

        Ok(Prepared {
            python: env_python(&root),
            package,
            provision,
            config,
            worker_env,
        })
    }

    /// The command for `mode`: the long-lived server for [`OperatingMode::Run`],
    /// an import probe for [`OperatingMode::Test`].
    pub fn worker_command(&self, prepared: &Prepared, mode: OperatingMode) -> WorkerCommand {
        debug_assert!(mode.needs_bootstrap(), "{mode:?} never launches a worker");
        let cmd = WorkerCommand::new(&prepared.python)
            .current_dir(prepared.package.worker_dir())
            .envs(prepared.worker_env.iter().cloned());
        match mode {
            OperatingMode::Test => cmd
                .arg("-c")
                .arg(format!("import {}", prepared.package.probe_module())),
            _ => cmd.arg(prepared.package.entry_script()),
        }
    }

    /// Step 4: spawn the worker and supervise it until it exits or `cancel`
    /// fires.
    ///
    /// If `cancel` already fired, nothing is spawned and the call fails with
    /// [`LauncherError::Interrupted`].
    pub async fn start(
        &self,
        prepared: &Prepared,
        mode: OperatingMode,
        cancel: &CancellationToken,
    ) -> Result<Outcome, LauncherError> {
        if cancel.is_cancelled() {
            info!("Termination requested before launch; not starting worker");
            return Err(LauncherError::Interrupted);
        }
        let cmd = self.worker_command(prepared, mode);
        let handle = launch(&cmd)?;
        Ok(handle.supervise(cancel).await)
    }

    /// [`prepare`](Self::prepare) then [`start`](Self::start).
    ///
    /// Blocks the calling thread during provisioning.
    pub async fn run(
        &self,
        mode: OperatingMode,
        cancel: &CancellationToken,
    ) -> Result<Outcome, LauncherError> {
        let prepared = self.prepare()?;
        self.start(&prepared, mode, cancel).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use std::ffi::OsString;
    use tempfile::TempDir;

    fn prepared(dir: &TempDir) -> Prepared {
        Prepared {
            python: dir.path().join("venv-1/bin/python"),
            package: PackageLayout::new(dir.path().join("pkg")),
            provision: ProvisionReport::default(),
            config: Materialized::Existing,
            worker_env: vec![("MISTRAL_API_KEY".into(), "k".into())],
        }
    }

    fn launcher(dir: &TempDir) -> Launcher {
        Launcher::new(
            LauncherConfig::builder()
                .product_dir(dir.path().join("home"))
                .package_dir(dir.path().join("pkg"))
                .build()
                .unwrap(),
        )
    }

    #[test]
    fn run_mode_launches_entry_script() {
        let dir = TempDir::new().unwrap();
        let p = prepared(&dir);
        let cmd = launcher(&dir).worker_command(&p, OperatingMode::Run);

        assert_eq!(cmd.program, p.python);
        assert_eq!(cmd.args, vec![OsString::from(p.package.entry_script())]);
        assert_eq!(cmd.current_dir, Some(p.package.worker_dir()));
        assert_eq!(cmd.envs, p.worker_env);
    }

    #[test]
    fn test_mode_only_imports_worker() {
        let dir = TempDir::new().unwrap();
        let p = prepared(&dir);
        let cmd = launcher(&dir).worker_command(&p, OperatingMode::Test);

        assert_eq!(
            cmd.args,
            vec![OsString::from("-c"), OsString::from("import mcp_server")]
        );
    }

    #[tokio::test]
    async fn cancelled_before_launch_spawns_nothing() {
        let dir = TempDir::new().unwrap();
        let p = prepared(&dir);
        let cancel = CancellationToken::new();
        cancel.cancel();

        // python does not exist: reaching launch() would be WorkerLaunchFailed.
        let err = launcher(&dir)
            .start(&p, OperatingMode::Run, &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, LauncherError::Interrupted));
        assert_eq!(err.kind(), ErrorKind::Bootstrap);
    }

    #[test]
    fn missing_package_fails_before_provisioning() {
        let dir = TempDir::new().unwrap();
        let err = launcher(&dir).prepare().unwrap_err();
        assert!(matches!(err, LauncherError::PackageNotFound { .. }));
        assert!(!dir.path().join("home").exists());
    }
}
