//! Bounded worker pool — fixed set of worker loops over one bounded
//! intake queue.
//!
//! Jobs are fire-and-forget: no completion signal, failures surface
//! only through logs. A job that fails or panics is isolated — the
//! worker that ran it keeps pulling from the queue. Shutdown is a
//! graceful drain: everything already queued still executes.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures::FutureExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use appraise_core::Result;

type JobAction = Pin<Box<dyn Future<Output = Result<()>> + Send>>;

/// An inert unit of work: a name (for logging) plus a one-shot async
/// action. Owned by its queue slot until a worker claims it; dropped
/// after execution. The pool keeps no retry state.
pub struct Job {
    name: String,
    action: JobAction,
}

impl Job {
    pub fn new<F>(name: impl Into<String>, action: F) -> Self
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        Self {
            name: name.into(),
            action: Box::pin(action),
        }
    }
}

impl std::fmt::Debug for Job {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Job").field("name", &self.name).finish()
    }
}

/// Fixed-size pool of worker loops sharing one bounded intake queue.
///
/// Lifecycle: `Created → Started → Running → ShuttingDown → Stopped`.
/// No job executes before [`WorkerPool::start`]; no new job is accepted
/// once [`WorkerPool::shutdown`] begins.
pub struct WorkerPool {
    workers: usize,
    sender: std::sync::Mutex<Option<mpsc::Sender<Job>>>,
    receiver: Arc<tokio::sync::Mutex<mpsc::Receiver<Job>>>,
    shutting_down: Arc<AtomicBool>,
    started: AtomicBool,
    handles: std::sync::Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerPool {
    /// Create an idle pool. Panics if `workers` or `queue_capacity` is
    /// zero — both are construction-time programming errors.
    pub fn new(workers: usize, queue_capacity: usize) -> Self {
        assert!(workers > 0, "worker pool needs at least one worker");
        assert!(queue_capacity > 0, "intake queue needs capacity");
        let (tx, rx) = mpsc::channel(queue_capacity);
        Self {
            workers,
            sender: std::sync::Mutex::new(Some(tx)),
            receiver: Arc::new(tokio::sync::Mutex::new(rx)),
            shutting_down: Arc::new(AtomicBool::new(false)),
            started: AtomicBool::new(false),
            handles: std::sync::Mutex::new(Vec::new()),
        }
    }

    /// Spawn the worker loops. Idempotent.
    pub fn start(&self) {
        if self.started.swap(true, Ordering::SeqCst) {
            return;
        }
        let mut handles = self.handles.lock().expect("pool handles lock");
        for worker_id in 0..self.workers {
            let rx = Arc::clone(&self.receiver);
            handles.push(tokio::spawn(worker_loop(worker_id, rx)));
        }
        tracing::info!("⚙️ Worker pool started ({} workers)", self.workers);
    }

    /// Submit a job to the intake queue.
    ///
    /// Blocks while the queue is full and the pool is running — callers
    /// on latency-sensitive paths must treat this as potentially
    /// blocking backpressure. Once shutdown has begun the job is
    /// dropped with a warning instead of being queued indefinitely.
    pub async fn enqueue(&self, job: Job) {
        if self.shutting_down.load(Ordering::SeqCst) {
            tracing::warn!("⚠️ Pool shutting down; dropping job '{}'", job.name);
            return;
        }
        let sender = self.sender.lock().expect("pool sender lock").clone();
        let Some(tx) = sender else {
            tracing::warn!("⚠️ Intake queue closed; dropping job '{}'", job.name);
            return;
        };
        if let Err(err) = tx.send(job).await {
            // Shutdown closed the queue while we were waiting for space.
            tracing::warn!(
                "⚠️ Intake queue closed during shutdown; dropping job '{}'",
                err.0.name
            );
        }
    }

    /// Graceful drain: stop accepting submissions, execute everything
    /// already queued or in flight, then stop the workers.
    pub async fn shutdown(&self) {
        self.shutting_down.store(true, Ordering::SeqCst);
        // Dropping the sender closes the intake; workers exit once the
        // queue is empty.
        drop(self.sender.lock().expect("pool sender lock").take());
        let handles = std::mem::take(&mut *self.handles.lock().expect("pool handles lock"));
        for handle in handles {
            let _ = handle.await;
        }
        tracing::info!("⚙️ Worker pool drained and stopped");
    }
}

async fn worker_loop(worker_id: usize, receiver: Arc<tokio::sync::Mutex<mpsc::Receiver<Job>>>) {
    loop {
        // Hold the lock only while waiting for the next job; execution
        // happens after release so workers run jobs concurrently.
        let job = { receiver.lock().await.recv().await };
        let Some(job) = job else {
            break; // queue closed and fully drained
        };

        tracing::debug!("worker-{worker_id} picked up job '{}'", job.name);
        let name = job.name;
        match AssertUnwindSafe(job.action).catch_unwind().await {
            Ok(Ok(())) => {
                tracing::debug!("worker-{worker_id} finished job '{name}'");
            }
            Ok(Err(e)) => {
                tracing::error!("❌ Job '{name}' failed on worker-{worker_id}: {e}");
            }
            Err(payload) => {
                tracing::error!(
                    "❌ Job '{name}' panicked on worker-{worker_id}: {}",
                    panic_message(payload.as_ref())
                );
            }
        }
    }
    tracing::debug!("worker-{worker_id} stopped");
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
