use std::fmt::Display;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

struct Run {
    active: Arc<AtomicBool>,
    cancel: Arc<Notify>,
    handle: JoinHandle<()>,
}

/// Re-runs a task on a fixed interval until stopped.
///
/// A single loop owns the schedule, so at most one recurrence is ever
/// pending. The `active` flag is checked after every sleep and after every
/// invocation, so nothing is scheduled once `stop` has been called. An
/// invocation already in flight when `stop` is called runs to completion.
#[derive(Default)]
pub struct PeriodicRefresher {
    run: Mutex<Option<Run>>,
}

impl PeriodicRefresher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_running(&self) -> bool {
        self.lock()
            .as_ref()
            .is_some_and(|run| run.active.load(Ordering::SeqCst))
    }

    /// Begin invoking `task` every `interval`. No-op if already running.
    /// Must be called from within a tokio runtime.
    pub fn start<F, Fut, E>(&self, interval: Duration, task: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
        E: Display + Send + 'static,
    {
        let mut slot = self.lock();
        if slot
            .as_ref()
            .is_some_and(|run| run.active.load(Ordering::SeqCst))
        {
            return;
        }

        let active = Arc::new(AtomicBool::new(true));
        let cancel = Arc::new(Notify::new());

        let handle = tokio::spawn({
            let active = Arc::clone(&active);
            let cancel = Arc::clone(&cancel);
            async move {
                loop {
                    tokio::select! {
                        _ = tokio::time::sleep(interval) => {}
                        _ = cancel.notified() => break,
                    }
                    if !active.load(Ordering::SeqCst) {
                        break;
                    }
                    if let Err(e) = task().await {
                        warn!(error = %e, "periodic refresh failed");
                    }
                    if !active.load(Ordering::SeqCst) {
                        break;
                    }
                }
                debug!("periodic refresher stopped");
            }
        });

        *slot = Some(Run {
            active,
            cancel,
            handle,
        });
    }

    /// Stop scheduling. Safe before `start` and after a previous `stop`.
    pub fn stop(&self) {
        if let Some(run) = self.lock().take() {
            run.active.store(false, Ordering::SeqCst);
            run.cancel.notify_one();
        }
    }

    /// Stop and wait for any in-flight invocation to finish.
    pub async fn shutdown(&self) {
        let run = self.lock().take();
        if let Some(run) = run {
            run.active.store(false, Ordering::SeqCst);
            run.cancel.notify_one();
            if let Err(e) = run.handle.await {
                warn!(error = %e, "periodic refresher task ended abnormally");
            }
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<Run>> {
        self.run.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for PeriodicRefresher {
    fn drop(&mut self) {
        self.stop();
    }
}
