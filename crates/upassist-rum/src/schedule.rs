//! Deferred execution tied to page readiness.

use std::future::Future;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

/// Page load signal.
///
/// Clones observe the same signal. Once loaded, a page stays loaded.
#[derive(Debug, Clone)]
pub struct Readiness {
    loaded: Arc<watch::Sender<bool>>,
}

impl Readiness {
    /// A page that has not finished loading yet.
    pub fn pending() -> Self {
        let (loaded, _) = watch::channel(false);
        Self {
            loaded: Arc::new(loaded),
        }
    }

    /// A page that has already finished loading.
    pub fn loaded() -> Self {
        let (loaded, _) = watch::channel(true);
        Self {
            loaded: Arc::new(loaded),
        }
    }

    /// Signal load completion, waking every pending callback.
    pub fn mark_loaded(&self) {
        self.loaded.send_replace(true);
    }

    /// Whether the page has finished loading.
    pub fn is_loaded(&self) -> bool {
        *self.loaded.borrow()
    }
}

impl Default for Readiness {
    fn default() -> Self {
        Self::loaded()
    }
}

/// Runs work after the current turn once the page is ready.
#[derive(Debug, Clone)]
pub struct Scheduler {
    runtime: Handle,
    readiness: Readiness,
}

impl Scheduler {
    pub fn new(runtime: Handle, readiness: Readiness) -> Self {
        Self { runtime, readiness }
    }

    pub fn readiness(&self) -> &Readiness {
        &self.readiness
    }

    /// Run `task` after the page has loaded.
    ///
    /// On a loaded page the task starts on the next turn of the runtime. On a
    /// loading page it waits for the load signal, then defers the same way.
    /// Never runs `task` inline.
    pub fn run_after_ready<F>(&self, task: F) -> JoinHandle<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if self.readiness.is_loaded() {
            return self.runtime.spawn(async move {
                tokio::task::yield_now().await;
                task.await;
            });
        }

        debug!("document not ready, waiting for load");
        let mut loaded = self.readiness.loaded.subscribe();
        self.runtime.spawn(async move {
            let ready = loaded.wait_for(|ready| *ready).await.is_ok();
            if !ready {
                return;
            }
            tokio::task::yield_now().await;
            task.await;
        })
    }
}
