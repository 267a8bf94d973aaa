//! Supervised worker tasks: bounded join with abort as the escalation path

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{error, warn, Instrument};

/// How a worker ended when joined
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerExit {
    /// Returned on its own within the join window
    Finished,
    /// Still alive at the deadline and aborted
    ForceTerminated,
    /// Panicked; carries the panic message when it was a string
    Panicked(String),
}

pub(crate) struct Worker {
    name: &'static str,
    handle: JoinHandle<()>,
}

impl Worker {
    /// Spawn `task` on the current runtime inside a span named after the worker
    pub(crate) fn spawn<F>(name: &'static str, task: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let span = tracing::info_span!("worker", worker = name);
        Self {
            name,
            handle: tokio::spawn(task.instrument(span)),
        }
    }

    pub(crate) fn name(&self) -> &'static str {
        self.name
    }

    /// Wait up to `limit` for the worker to finish, aborting it otherwise
    pub(crate) async fn join_within(mut self, limit: Duration) -> WorkerExit {
        match tokio::time::timeout(limit, &mut self.handle).await {
            Ok(Ok(())) => WorkerExit::Finished,
            Ok(Err(e)) if e.is_panic() => {
                let payload = e.into_panic();
                let message = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".into());
                error!("{} worker panicked: {}", self.name, message);
                WorkerExit::Panicked(message)
            }
            // Cancelled from outside; nothing left running
            Ok(Err(_)) => WorkerExit::ForceTerminated,
            Err(_) => {
                warn!(
                    "{} worker still running after {:?}, aborting",
                    self.name, limit
                );
                self.handle.abort();
                // Resolves once the task has been dropped
                let _ = (&mut self.handle).await;
                WorkerExit::ForceTerminated
            }
        }
    }

    pub(crate) fn abort(&self) {
        self.handle.abort();
    }
}

// A dropped handle would detach the task; a worker never outlives its owner
impl Drop for Worker {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_finished_within_window() {
        let worker = Worker::spawn("quick", async {
            tokio::time::sleep(Duration::from_millis(100)).await;
        });
        assert_eq!(worker.name(), "quick");
        assert_eq!(
            worker.join_within(Duration::from_secs(2)).await,
            WorkerExit::Finished
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_stuck_worker_is_aborted() {
        let dropped = Arc::new(AtomicBool::new(false));

        struct SetOnDrop(Arc<AtomicBool>);
        impl Drop for SetOnDrop {
            fn drop(&mut self) {
                self.0.store(true, Ordering::SeqCst);
            }
        }

        let guard = SetOnDrop(dropped.clone());
        let worker = Worker::spawn("stuck", async move {
            let _guard = guard;
            tokio::time::sleep(Duration::from_secs(3600)).await;
        });

        assert_eq!(
            worker.join_within(Duration::from_secs(2)).await,
            WorkerExit::ForceTerminated
        );
        assert!(dropped.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_worker_is_aborted() {
        let dropped = Arc::new(AtomicBool::new(false));

        struct SetOnDrop(Arc<AtomicBool>);
        impl Drop for SetOnDrop {
            fn drop(&mut self) {
                self.0.store(true, Ordering::SeqCst);
            }
        }

        let guard = SetOnDrop(dropped.clone());
        let worker = Worker::spawn("orphan", async move {
            let _guard = guard;
            tokio::time::sleep(Duration::from_secs(3600)).await;
        });
        drop(worker);

        // Let the runtime process the cancellation
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(dropped.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_panic_is_reported() {
        let worker = Worker::spawn("faulty", async {
            panic!("boom");
        });
        assert_eq!(
            worker.join_within(Duration::from_secs(2)).await,
            WorkerExit::Panicked("boom".into())
        );
    }
}
