//! Owned handles for the worker's periodic jobs.
//!
//! Each job is a spawned task that runs its body to completion before
//! sleeping until the next tick, giving single-flight execution per job.
//! The handle owns the task: stopping goes through the handle instead of
//! any ambient running flag.

use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Handle owning one periodic job.
pub struct JobHandle {
    name: &'static str,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl JobHandle {
    /// Spawns a periodic job that runs `job` immediately and then once per
    /// `interval` until stopped.
    pub fn spawn<F, Fut>(name: &'static str, interval: Duration, mut job: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send,
    {
        let (shutdown, mut shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(async move {
            info!(job = name, interval_secs = interval.as_secs(), "job started");
            loop {
                job().await;

                tokio::select! {
                    () = tokio::time::sleep(interval) => {}
                    _ = shutdown_rx.changed() => break,
                }
            }
            info!(job = name, "job stopped");
        });

        Self {
            name,
            shutdown,
            task,
        }
    }

    /// Returns whether the job task is still alive.
    #[must_use]
    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Signals the job to stop and waits for the current run to finish.
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        if let Err(error) = self.task.await {
            warn!(job = self.name, error = %error, "job task ended abnormally");
        }
    }
}
