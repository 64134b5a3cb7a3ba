use std::{
    future::Future,
    sync::{Arc, Mutex},
};

use tokio::task::JoinHandle;
use tokio_util::{sync::CancellationToken, task::TaskTracker};

use crate::error::{HlsqError, HlsqResult};

/// A set of tasks sharing one cancellation signal and one error slot.
///
/// The first task to fail stores its error and cancels the token, which every
/// sibling observes. [`TaskGroup::wait`] drains the remaining tasks and hands
/// back the first recorded error.
pub(crate) struct TaskGroup {
    tracker: TaskTracker,
    token: CancellationToken,
    error: Arc<Mutex<Option<HlsqError>>>,
}

impl TaskGroup {
    pub fn new(token: CancellationToken) -> Self {
        Self {
            tracker: TaskTracker::new(),
            token,
            error: Arc::new(Mutex::new(None)),
        }
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub async fn cancelled(&self) {
        self.token.cancelled().await
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Spawns a task that runs to completion. The task is expected to watch
    /// [`TaskGroup::token`] on its own.
    pub fn spawn<F>(&self, task: F)
    where
        F: Future<Output = HlsqResult<()>> + Send + 'static,
    {
        let handle = self.tracker.spawn(task);
        self.supervise(handle);
    }

    /// Spawns a task that is dropped as soon as the group is cancelled.
    pub fn spawn_abortable<F>(&self, task: F)
    where
        F: Future<Output = HlsqResult<()>> + Send + 'static,
    {
        let token = self.token.clone();
        let handle = self.tracker.spawn(async move {
            tokio::select! {
                biased;
                _ = token.cancelled() => Ok(()),
                result = task => result,
            }
        });
        self.supervise(handle);
    }

    /// Records the outcome of `handle`, a panic included.
    fn supervise(&self, handle: JoinHandle<HlsqResult<()>>) {
        let token = self.token.clone();
        let error = self.error.clone();
        self.tracker.spawn(async move {
            match handle.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => record(&error, &token, e),
                Err(e) if e.is_panic() => {
                    log::error!("Task panicked: {e}");
                    record(&error, &token, HlsqError::TaskPanicked(e));
                }
                Err(_) => {}
            }
        });
    }

    /// Records `error` unless another one was recorded earlier, then cancels
    /// the group.
    pub fn fail(&self, error: HlsqError) {
        record(&self.error, &self.token, error);
    }

    /// Waits for every spawned task and returns the first recorded error.
    pub async fn wait(&self) -> HlsqResult<()> {
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();

        match lock(&self.error).take() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

fn lock(slot: &Mutex<Option<HlsqError>>) -> std::sync::MutexGuard<'_, Option<HlsqError>> {
    slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn record(slot: &Mutex<Option<HlsqError>>, token: &CancellationToken, error: HlsqError) {
    {
        let mut slot = lock(slot);
        if slot.is_none() {
            *slot = Some(error);
        } else {
            log::debug!("Dropping error raised after the group failed: {error}");
        }
    }
    token.cancel();
}
