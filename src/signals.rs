//! OS termination signals as a cancellation token.
//!
//! The supervisor never installs its own handlers; it listens on a
//! [`CancellationToken`]. [`cancel_on_shutdown_signal`] is the only bridge
//! from the OS to that token.
//!
//! ## Unix
//! - **SIGINT** (Ctrl-C in a terminal)
//! - **SIGTERM** (default kill signal, used by process managers)
//!
//! ## Windows
//! Only [`tokio::signal::ctrl_c`] is awaited.
//!
//! Nothing is registered until [`cancel_on_shutdown_signal`] is called. The
//! binary calls it only after provisioning, so a signal during provisioning
//! terminates the launcher with the default action.
//!
//! Only the first signal is acted on. Later ones are absorbed by the same
//! listeners while the process finishes exiting.

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Registered termination-signal listeners.
///
/// Registration replaces the OS default action for these signals, so it
/// should happen only once something is ready to act on them.
#[cfg(unix)]
pub struct ShutdownSignals {
    sigint: tokio::signal::unix::Signal,
    sigterm: tokio::signal::unix::Signal,
}

#[cfg(unix)]
impl ShutdownSignals {
    /// Must be called from within a tokio runtime.
    pub fn register() -> std::io::Result<Self> {
        use tokio::signal::unix::{signal, SignalKind};

        Ok(Self {
            sigint: signal(SignalKind::interrupt())?,
            sigterm: signal(SignalKind::terminate())?,
        })
    }

    /// Completes on the next SIGINT or SIGTERM.
    pub async fn recv(&mut self) {
        tokio::select! {
            _ = self.sigint.recv()  => tracing::debug!("SIGINT received"),
            _ = self.sigterm.recv() => tracing::debug!("SIGTERM received"),
        }
    }
}

#[cfg(not(unix))]
pub struct ShutdownSignals(());

#[cfg(not(unix))]
impl ShutdownSignals {
    pub fn register() -> std::io::Result<Self> {
        Ok(Self(()))
    }

    pub async fn recv(&mut self) {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Ctrl-C handler unavailable: {e}");
            std::future::pending::<()>().await;
        }
    }
}

/// Register the listeners now and spawn a task that cancels `token` on the
/// first termination signal.
///
/// If the listeners cannot be registered the token is left alone and the
/// default OS behaviour applies.
pub fn cancel_on_shutdown_signal(token: CancellationToken) -> Option<JoinHandle<()>> {
    let mut signals = match ShutdownSignals::register() {
        Ok(signals) => signals,
        Err(e) => {
            warn!("Signal handlers unavailable: {e}");
            return None;
        }
    };
    Some(tokio::spawn(async move {
        signals.recv().await;
        token.cancel();
    }))
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn sigterm_cancels_token() {
        let token = CancellationToken::new();
        let listener = cancel_on_shutdown_signal(token.clone()).unwrap();

        // Registered synchronously: the signal below is caught, not fatal.
        nix::sys::signal::raise(nix::sys::signal::Signal::SIGTERM).unwrap();

        tokio::time::timeout(Duration::from_secs(5), token.cancelled())
            .await
            .expect("token should be cancelled by SIGTERM");
        listener.await.unwrap();
    }
}
