use std::future;
use tokio_util::sync::CancellationToken;

#[cfg(target_family = "unix")]
use tokio::signal::unix::{self, Signal, SignalKind};

/// Shared shutdown flag of the server
///
/// Clones observe the same flag.
#[derive(Clone, Default)]
pub struct Shutdown {
    token: CancellationToken,
}

impl Shutdown {
    /// Flag that gets raised as soon as the process receives a termination signal
    #[must_use]
    pub fn on_signal() -> Self {
        let shutdown = Self::default();

        tokio::spawn({
            let shutdown = shutdown.clone();
            async move {
                let signal = wait_for_signal().await;
                info!(signal, "shutting down");
                shutdown.trigger();
            }
        });

        shutdown
    }

    pub fn trigger(&self) {
        self.token.cancel();
    }

    pub async fn wait(self) {
        self.token.cancelled_owned().await;
    }
}

#[cfg(target_family = "unix")]
async fn recv(signal: Option<&mut Signal>) {
    match signal {
        Some(signal) => {
            signal.recv().await;
        }
        None => future::pending().await,
    }
}

#[cfg(target_family = "unix")]
async fn wait_for_signal() -> &'static str {
    let install = |kind: SignalKind, name: &str| {
        unix::signal(kind)
            .inspect_err(|error| warn!(?error, signal = name, "failed to listen for signal"))
            .ok()
    };

    let mut terminate = install(SignalKind::terminate(), "SIGTERM");
    let mut quit = install(SignalKind::quit(), "SIGQUIT");

    tokio::select! {
        _ = tokio::signal::ctrl_c() => "SIGINT",
        () = recv(terminate.as_mut()) => "SIGTERM",
        () = recv(quit.as_mut()) => "SIGQUIT",
    }
}

#[cfg(not(target_family = "unix"))]
async fn wait_for_signal() -> &'static str {
    if let Err(error) = tokio::signal::ctrl_c().await {
        warn!(?error, "failed to listen for ctrl-c");
        future::pending::<()>().await;
    }

    "ctrl-c"
}
