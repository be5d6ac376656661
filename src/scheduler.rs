//! Fixed-width worker pool (§4.4). Workers repeatedly ask a task provider
//! for the next unit of work; the provider's own scan-and-pop happens inside
//! the lock this module holds, which is what makes it atomic across
//! workers (§4.5).

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinHandle;

use crate::error::Result;

const POLL_BACKOFF: Duration = Duration::from_millis(100);

pub type BoxedTask = Pin<Box<dyn Future<Output = Result<()>> + Send>>;

/// Supplies the next unit of work, or `None` meaning "nothing ready right
/// now". Invoked on a worker task; the Scheduler serializes calls to this
/// trait across all workers so a scan-and-pop implementation (like
/// `Session`'s) never races with itself.
pub trait TaskProvider: Send + Sync {
    fn next_task(&self) -> Option<BoxedTask>;
}

/// A fixed-width pool of tokio tasks draining a shared `TaskProvider`.
pub struct Scheduler {
    width: usize,
    idle: Arc<AtomicUsize>,
    notify: Arc<Notify>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl Scheduler {
    /// Spawn `width` workers pulling from `provider` until `shutdown` is
    /// called. Each worker runs one task to completion, then asks for the
    /// next; when the provider returns `None` it sleeps for a bounded
    /// backoff before retrying.
    pub fn spawn<P>(width: usize, provider: Arc<P>) -> Self
    where
        P: TaskProvider + 'static,
    {
        let idle = Arc::new(AtomicUsize::new(0));
        let notify = Arc::new(Notify::new());
        let provider_lock = Arc::new(Mutex::new(()));

        let workers = (0..width)
            .map(|_| {
                let provider = Arc::clone(&provider);
                let provider_lock = Arc::clone(&provider_lock);
                let idle = Arc::clone(&idle);
                let notify = Arc::clone(&notify);

                tokio::spawn(async move {
                    loop {
                        let task = {
                            // Mutual exclusion on provider access (§4.4):
                            // only one worker at a time may be inside next_task.
                            let _guard = provider_lock.lock().unwrap();
                            provider.next_task()
                        };

                        match task {
                            Some(task) => {
                                if let Err(err) = task.await {
                                    tracing::warn!(error = %err, "chunk task failed");
                                }
                            }
                            None => {
                                idle.fetch_add(1, Ordering::SeqCst);
                                notify.notify_waiters();
                                tokio::time::sleep(POLL_BACKOFF).await;
                                idle.fetch_sub(1, Ordering::SeqCst);
                            }
                        }
                    }
                })
            })
            .collect();

        Self {
            width,
            idle,
            notify,
            workers: Mutex::new(workers),
        }
    }

    /// Block until the pool is idle: every worker is sleeping in the
    /// "no task" branch and the provider's most recent call returned `None`.
    /// Returns when no more work is *available*, not when every File is
    /// complete — callers check per-File completion explicitly (§7).
    pub async fn wait_until_complete(&self) {
        loop {
            let notified = self.notify.notified();
            if self.idle.load(Ordering::SeqCst) == self.width {
                return;
            }
            notified.await;
        }
    }

    /// Stop all workers. Not part of the core scheduling contract — the
    /// normal way a caller tears down is `wait_until_complete` followed by
    /// this (§4.4 Cancellation).
    pub fn shutdown(&self) {
        for handle in self.workers.lock().unwrap().drain(..) {
            handle.abort();
        }
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}
