//! Worker process supervision.
//!
//! ## Lifecycle
//!
//! ```text
//! launch(cmd) ──▶ WorkerHandle ──▶ supervise(cancel)
//!                                     │
//!                 ┌───────────────────┴────────────────────┐
//!            child exits                            cancel fires
//!                 │                                        │
//!     Success / PropagatedFailure(code)     SIGTERM → worker, Terminated
//! ```
//!
//! `supervise` consumes the handle, so a launcher owns at most one worker at
//! a time and its termination is observed exactly once. The worker inherits
//! all three standard streams; after spawning, nothing in this crate writes
//! to stdout because it now carries the worker's protocol traffic.

use std::ffi::OsString;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};

use tokio::process::{Child, Command};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::{ErrorKind, LauncherError};

/// How an invocation ended, decoupled from the OS exit-status mechanism.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The worker (or probe) exited with status 0.
    Success,
    /// The worker exited unsuccessfully; its code becomes ours.
    PropagatedFailure(i32),
    /// Something failed before a worker was spawned.
    BootstrapFailure(ErrorKind),
    /// A termination request arrived; it was forwarded to the worker.
    Terminated,
}

impl Outcome {
    /// Map a child's exit status.
    ///
    /// A worker killed by signal `s` maps to `128 + s` on Unix (shell
    /// convention) and to `1` elsewhere.
    pub fn from_status(status: ExitStatus) -> Self {
        match status.code() {
            Some(0) => Outcome::Success,
            Some(code) => Outcome::PropagatedFailure(code),
            None => Outcome::PropagatedFailure(signal_exit_code(status)),
        }
    }

    /// The status this process should exit with.
    pub fn exit_code(&self) -> i32 {
        match self {
            Outcome::Success | Outcome::Terminated => 0,
            Outcome::PropagatedFailure(code) => *code,
            Outcome::BootstrapFailure(_) => 1,
        }
    }

    /// The worker failure as an error value, for callers that log or
    /// propagate it. `None` for every other outcome.
    pub fn worker_error(&self) -> Option<LauncherError> {
        match self {
            Outcome::PropagatedFailure(code) => {
                Some(LauncherError::WorkerExitedNonZero { code: *code })
            }
            _ => None,
        }
    }
}

#[cfg(unix)]
fn signal_exit_code(status: ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    status.signal().map_or(1, |s| 128 + s)
}

#[cfg(not(unix))]
fn signal_exit_code(_status: ExitStatus) -> i32 {
    1
}

/// Program, arguments, working directory and extra environment for a worker.
#[derive(Debug, Clone, Default)]
pub struct WorkerCommand {
    pub program: PathBuf,
    pub args: Vec<OsString>,
    pub current_dir: Option<PathBuf>,
    /// Added to the inherited environment.
    pub envs: Vec<(String, String)>,
}

impl WorkerCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            ..Self::default()
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    pub fn envs(mut self, envs: impl IntoIterator<Item = (String, String)>) -> Self {
        self.envs.extend(envs);
        self
    }
}

/// A running worker. Dropping it does not kill the process.
#[derive(Debug)]
pub struct WorkerHandle {
    child: Child,
}

/// Spawn the worker with stdin, stdout and stderr inherited.
pub fn launch(cmd: &WorkerCommand) -> Result<WorkerHandle, LauncherError> {
    let mut command = Command::new(&cmd.program);
    command
        .args(&cmd.args)
        .envs(cmd.envs.iter().map(|(k, v)| (k.as_str(), v.as_str())))
        .stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .kill_on_drop(false);
    if let Some(ref dir) = cmd.current_dir {
        command.current_dir(dir);
    }

    let child = command
        .spawn()
        .map_err(|source| LauncherError::WorkerLaunchFailed {
            program: cmd.program.clone(),
            source,
        })?;
    info!(
        "Worker started: {} (pid {})",
        cmd.program.display(),
        child.id().map_or_else(|| "?".to_string(), |p| p.to_string())
    );
    Ok(WorkerHandle { child })
}

impl WorkerHandle {
    /// Wait for whichever comes first: the worker exiting or `cancel`.
    ///
    /// On cancellation a termination signal is forwarded and the method
    /// returns immediately without waiting for the worker to finish.
    pub async fn supervise(mut self, cancel: &CancellationToken) -> Outcome {
        tokio::select! {
            status = self.child.wait() => match status {
                Ok(status) => {
                    debug!("Worker exited: {status}");
                    Outcome::from_status(status)
                }
                Err(e) => {
                    error!("Failed to wait for worker: {e}");
                    Outcome::PropagatedFailure(1)
                }
            },
            _ = cancel.cancelled() => {
                info!("Termination requested; stopping worker");
                self.terminate();
                Outcome::Terminated
            }
        }
    }

    #[cfg(unix)]
    fn terminate(&mut self) {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        let Some(pid) = self.child.id() else {
            debug!("Worker already exited");
            return;
        };
        let Ok(raw) = i32::try_from(pid) else {
            warn!("Worker pid {pid} out of range; not signalled");
            return;
        };
        if let Err(e) = kill(Pid::from_raw(raw), Signal::SIGTERM) {
            warn!("Failed to signal worker {pid}: {e}");
        }
    }

    #[cfg(not(unix))]
    fn terminate(&mut self) {
        if let Err(e) = self.child.start_kill() {
            warn!("Failed to stop worker: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes() {
        assert_eq!(Outcome::Success.exit_code(), 0);
        assert_eq!(Outcome::Terminated.exit_code(), 0);
        assert_eq!(Outcome::PropagatedFailure(3).exit_code(), 3);
        assert_eq!(
            Outcome::BootstrapFailure(ErrorKind::InterpreterNotFound).exit_code(),
            1
        );
    }

    #[test]
    fn worker_error_only_for_propagated_failure() {
        assert!(matches!(
            Outcome::PropagatedFailure(3).worker_error(),
            Some(LauncherError::WorkerExitedNonZero { code: 3 })
        ));
        assert!(Outcome::Success.worker_error().is_none());
        assert!(Outcome::Terminated.worker_error().is_none());
    }

    #[test]
    fn command_builder() {
        let cmd = WorkerCommand::new("/venv/bin/python")
            .arg("mcp_server.py")
            .current_dir("/pkg/worker")
            .envs([("MISTRAL_API_KEY".to_string(), "k".to_string())]);
        assert_eq!(cmd.args, vec![OsString::from("mcp_server.py")]);
        assert_eq!(cmd.current_dir, Some(PathBuf::from("/pkg/worker")));
        assert_eq!(cmd.envs.len(), 1);
    }

    #[tokio::test]
    async fn missing_program_is_launch_failure() {
        let err = launch(&WorkerCommand::new("/definitely/not/a/real/worker")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::WorkerLaunchFailed);
    }
}

#[cfg(all(test, unix))]
mod process_tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    fn sh(script: &str) -> WorkerCommand {
        WorkerCommand::new("/bin/sh").arg("-c").arg(script)
    }

    #[tokio::test]
    async fn zero_exit_is_success() {
        let outcome = launch(&sh("exit 0"))
            .unwrap()
            .supervise(&CancellationToken::new())
            .await;
        assert_eq!(outcome, Outcome::Success);
        assert_eq!(outcome.exit_code(), 0);
    }

    #[tokio::test]
    async fn nonzero_exit_is_propagated() {
        let outcome = launch(&sh("exit 3"))
            .unwrap()
            .supervise(&CancellationToken::new())
            .await;
        assert_eq!(outcome, Outcome::PropagatedFailure(3));
        assert_eq!(outcome.exit_code(), 3);
    }

    #[tokio::test]
    async fn killed_worker_maps_to_128_plus_signal() {
        let outcome = launch(&sh("kill -9 $$"))
            .unwrap()
            .supervise(&CancellationToken::new())
            .await;
        assert_eq!(outcome, Outcome::PropagatedFailure(128 + 9));
    }

    #[tokio::test]
    async fn extra_env_reaches_worker() {
        let cmd = sh("test \"$DOCMISTRAL_TEST_VALUE\" = hello").envs([(
            "DOCMISTRAL_TEST_VALUE".to_string(),
            "hello".to_string(),
        )]);
        let outcome = launch(&cmd)
            .unwrap()
            .supervise(&CancellationToken::new())
            .await;
        assert_eq!(outcome, Outcome::Success);
    }

    #[tokio::test]
    async fn cancellation_forwards_sigterm_without_hanging() {
        let dir = TempDir::new().unwrap();
        let marker = dir.path().join("got-term");
        let script = format!(
            "trap 'touch \"{}\"; exit 0' TERM; while :; do sleep 0.1; done",
            marker.display()
        );

        let cancel = CancellationToken::new();
        let handle = launch(&sh(&script)).unwrap();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(300)).await;
            trigger.cancel();
        });

        let outcome = tokio::time::timeout(Duration::from_secs(10), handle.supervise(&cancel))
            .await
            .expect("supervise must return promptly after cancellation");
        assert_eq!(outcome, Outcome::Terminated);

        let mut waited = Duration::ZERO;
        while !marker.exists() && waited < Duration::from_secs(10) {
            tokio::time::sleep(Duration::from_millis(50)).await;
            waited += Duration::from_millis(50);
        }
        assert!(marker.exists(), "worker should have received SIGTERM");
    }
}
