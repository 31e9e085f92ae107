//! The speech job queue: a bounded, deduplicating, TTL-aware FIFO consumed
//! by one cooperative playback worker.

pub mod job;

pub use job::SpeakJob;

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::playback::PlaybackError;

/// Queueing error types.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum QueueError {
    #[error("queue is full")]
    Full,

    #[error("queue is closed")]
    Closed,

    #[error("duplicate job")]
    Duplicate,
}

/// Called by the worker to play a job. The token is the job's cancellation
/// handle; implementations must observe it at every suspension point.
pub type PlaybackHandler =
    Arc<dyn Fn(CancellationToken, SpeakJob) -> BoxFuture<'static, Result<(), PlaybackError>> + Send + Sync>;

/// Called when the queue has been idle for the configured timeout.
pub type IdleCallback = Arc<dyn Fn() + Send + Sync>;

/// Called once after the worker has exited during `stop`.
pub type ShutdownCallback = Arc<dyn Fn() + Send + Sync>;

/// Called after each handler invocation returns; primarily a
/// test-synchronization hook.
pub type JobCompletedCallback = Arc<dyn Fn(&SpeakJob) + Send + Sync>;

#[derive(Default)]
struct Hooks {
    playback: Option<PlaybackHandler>,
    idle: Option<IdleCallback>,
    shutdown: Option<ShutdownCallback>,
    job_completed: Option<JobCompletedCallback>,
}

#[derive(Default)]
struct State {
    jobs: VecDeque<SpeakJob>,
    dedupe_keys: HashSet<String>,
    closed: bool,
    cancel_current: Option<CancellationToken>,
}

struct Shared {
    capacity: usize,
    idle_timeout: Duration,
    state: parking_lot::Mutex<State>,
    hooks: parking_lot::Mutex<Hooks>,
    enqueue_notify: Notify,
    stop: CancellationToken,
}

/// Bounded speech queue with a single playback worker.
pub struct SpeakQueue {
    shared: Arc<Shared>,
    worker: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl SpeakQueue {
    pub fn new(capacity: usize, idle_timeout: Duration) -> Self {
        Self {
            shared: Arc::new(Shared {
                capacity,
                idle_timeout,
                state: parking_lot::Mutex::new(State::default()),
                hooks: parking_lot::Mutex::new(Hooks::default()),
                enqueue_notify: Notify::new(),
                stop: CancellationToken::new(),
            }),
            worker: parking_lot::Mutex::new(None),
        }
    }

    /// Set the function called to play each job. Set before `start`.
    pub fn set_playback_handler(&self, handler: PlaybackHandler) {
        self.shared.hooks.lock().playback = Some(handler);
    }

    /// Set the function called when the queue becomes idle. Set before `start`.
    pub fn set_idle_callback(&self, callback: IdleCallback) {
        self.shared.hooks.lock().idle = Some(callback);
    }

    /// Set the function called after the worker exits. Set before `start`.
    pub fn set_shutdown_callback(&self, callback: ShutdownCallback) {
        self.shared.hooks.lock().shutdown = Some(callback);
    }

    /// Set the function called after each job's handler returns. Set before
    /// `start`.
    pub fn set_job_completed_callback(&self, callback: JobCompletedCallback) {
        self.shared.hooks.lock().job_completed = Some(callback);
    }

    /// Add a job to the queue and wake the worker.
    pub fn enqueue(&self, job: SpeakJob) -> Result<(), QueueError> {
        {
            let mut state = self.shared.state.lock();

            if state.closed {
                return Err(QueueError::Closed);
            }
            if state.jobs.len() >= self.shared.capacity {
                return Err(QueueError::Full);
            }
            if !job.dedupe_key.is_empty() && state.dedupe_keys.contains(&job.dedupe_key) {
                return Err(QueueError::Duplicate);
            }

            if !job.dedupe_key.is_empty() {
                state.dedupe_keys.insert(job.dedupe_key.clone());
            }
            debug!(job_id = %job.id, queue_depth = state.jobs.len() + 1, "job enqueued");
            state.jobs.push_back(job);
        }

        self.shared.enqueue_notify.notify_one();
        Ok(())
    }

    /// Cancel the current playback and clear the queue. Does not close the
    /// queue.
    pub fn interrupt(&self) {
        let mut state = self.shared.state.lock();

        // The handle is cleared here even though the handler may not have
        // observed the cancellation yet; the next processed job overwrites
        // it. See DESIGN.md.
        if let Some(cancel) = state.cancel_current.take() {
            cancel.cancel();
        }

        let cleared = state.jobs.len();
        state.jobs.clear();
        state.dedupe_keys.clear();

        info!(jobs_cleared = cleared, "queue interrupted");
    }

    /// Current queue length.
    pub fn len(&self) -> usize {
        self.shared.state.lock().jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Spawn the playback worker. Exactly one worker per queue.
    pub fn start(&self) {
        let shared = self.shared.clone();
        let handle = tokio::spawn(async move {
            worker_loop(shared).await;
        });
        *self.worker.lock() = Some(handle);
    }

    /// Gracefully stop the worker: close the queue, cancel the in-flight
    /// job, wait for the worker to exit, then run the shutdown callback.
    /// Callers must not call `stop` twice.
    pub async fn stop(&self) {
        {
            let mut state = self.shared.state.lock();
            state.closed = true;
            if let Some(cancel) = &state.cancel_current {
                cancel.cancel();
            }
        }
        self.shared.stop.cancel();

        let handle = self.worker.lock().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }

        // Strictly after the worker has exited
        let shutdown = self.shared.hooks.lock().shutdown.clone();
        if let Some(callback) = shutdown {
            callback();
        }
    }
}

/// The single cooperative consumer.
async fn worker_loop(shared: Arc<Shared>) {
    let idle_timer = tokio::time::sleep(Duration::ZERO);
    tokio::pin!(idle_timer);
    let mut idle_armed = false;

    loop {
        if let Some(job) = dequeue(&shared) {
            idle_armed = false;
            process_job(&shared, job).await;
            continue;
        }

        // Queue is empty; arm the idle timer if configured
        if !idle_armed && !shared.idle_timeout.is_zero() {
            idle_timer
                .as_mut()
                .reset(tokio::time::Instant::now() + shared.idle_timeout);
            idle_armed = true;
        }

        tokio::select! {
            _ = shared.stop.cancelled() => return,
            _ = shared.enqueue_notify.notified() => {}
            _ = idle_timer.as_mut(), if idle_armed => {
                idle_armed = false;
                let callback = shared.hooks.lock().idle.clone();
                if let Some(callback) = callback {
                    info!("idle timeout reached");
                    callback();
                }
            }
        }
    }
}

/// Pop the next live job, releasing dedupe keys and skipping expired entries.
fn dequeue(shared: &Shared) -> Option<SpeakJob> {
    let mut state = shared.state.lock();

    while let Some(job) = state.jobs.pop_front() {
        if !job.dedupe_key.is_empty() {
            state.dedupe_keys.remove(&job.dedupe_key);
        }

        if job.is_expired() {
            debug!(job_id = %job.id, "skipping expired job");
            continue;
        }

        return Some(job);
    }

    None
}

/// Run one job under a fresh cancellation handle.
async fn process_job(shared: &Arc<Shared>, job: SpeakJob) {
    let handler = shared.hooks.lock().playback.clone();

    let cancel = CancellationToken::new();
    shared.state.lock().cancel_current = Some(cancel.clone());

    let result = match &handler {
        Some(handler) => {
            info!(job_id = %job.id, text_length = job.text.len(), "processing job");
            Some(handler(cancel.clone(), job.clone()).await)
        }
        None => {
            warn!(job_id = %job.id, "no playback handler set, skipping job");
            None
        }
    };

    cancel.cancel();
    shared.state.lock().cancel_current = None;

    match result {
        Some(Err(err)) if err.is_cancelled() => info!(job_id = %job.id, "job cancelled"),
        Some(Err(err)) => error!(job_id = %job.id, error = %err, "job failed"),
        Some(Ok(())) => info!(job_id = %job.id, "job completed"),
        None => {}
    }

    let completed = shared.hooks.lock().job_completed.clone();
    if let Some(callback) = completed {
        callback(&job);
    }
}
