//! Background request queues.
//!
//! Each queue owns one dedicated OS thread (or a small pool) and runs its
//! jobs in FIFO order. Remote calls block, so they run here and never on the
//! caller's thread. A failing or panicking job is logged and contained; the
//! thread keeps serving the queue.

use crate::error::SyncResult;
use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

/// Errors raised by the queue itself, never by a job.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorkerError {
    #[error("worker queue {0} is closed")]
    Closed(String),

    #[error("failed to spawn worker thread for {queue}: {reason}")]
    Spawn { queue: String, reason: String },
}

/// The five request concerns, one queue each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QueueKind {
    FriendInfo,
    PhotoInfo,
    NewsFeed,
    UserInteraction,
    CollectionUpdate,
}

impl QueueKind {
    pub const ALL: [QueueKind; 5] = [
        QueueKind::FriendInfo,
        QueueKind::PhotoInfo,
        QueueKind::NewsFeed,
        QueueKind::UserInteraction,
        QueueKind::CollectionUpdate,
    ];

    pub fn name(self) -> &'static str {
        match self {
            QueueKind::FriendInfo => "friend-info",
            QueueKind::PhotoInfo => "photo-info",
            QueueKind::NewsFeed => "news-feed",
            QueueKind::UserInteraction => "user-interaction",
            QueueKind::CollectionUpdate => "collection-update",
        }
    }
}

/// Thread settings for the request queues.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Threads per queue. Values above one trade FIFO for throughput.
    pub threads: usize,
    /// Prefix of every worker thread name.
    pub thread_name_prefix: String,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            threads: 1,
            thread_name_prefix: "socialite".to_string(),
        }
    }
}

/// What happens to queued work on shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownMode {
    /// Run everything already queued, then stop.
    Drain,
    /// Discard queued work; the running job finishes.
    Cancel,
}

type Job = Box<dyn FnOnce() -> SyncResult<()> + Send + 'static>;

struct Envelope {
    seq: u64,
    name: String,
    job: Job,
}

#[derive(Default)]
struct Progress {
    next_seq: u64,
    outstanding: BTreeSet<u64>,
    waiters: Vec<(u64, oneshot::Sender<()>)>,
    completed: u64,
    failed: u64,
    discarded: u64,
}

impl Progress {
    /// True once every job up to and including `mark` has finished.
    fn reached(&self, mark: u64) -> bool {
        self.outstanding.first().is_none_or(|&oldest| oldest > mark)
    }
}

struct QueueState {
    name: String,
    progress: Mutex<Progress>,
    settled: Condvar,
    cancelled: AtomicBool,
}

impl QueueState {
    fn finish(&self, seq: u64, outcome: JobOutcome) {
        let mut progress = self.progress.lock();
        progress.outstanding.remove(&seq);
        match outcome {
            JobOutcome::Completed => progress.completed += 1,
            JobOutcome::Failed => progress.failed += 1,
            JobOutcome::Discarded => progress.discarded += 1,
        }
        let waiters = std::mem::take(&mut progress.waiters);
        for (mark, tx) in waiters {
            if progress.reached(mark) {
                let _ = tx.send(());
            } else {
                progress.waiters.push((mark, tx));
            }
        }
        drop(progress);
        self.settled.notify_all();
    }
}

enum JobOutcome {
    Completed,
    Failed,
    Discarded,
}

/// A named FIFO of jobs served by dedicated threads.
pub struct WorkerQueue {
    state: Arc<QueueState>,
    sender: Mutex<Option<mpsc::UnboundedSender<Envelope>>>,
    threads: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerQueue {
    /// Spawns a single-threaded queue.
    pub fn new(name: impl Into<String>) -> Result<Self, WorkerError> {
        Self::with_config(name, &WorkerConfig::default())
    }

    /// Spawns a queue served by `threads` threads.
    pub fn pool(name: impl Into<String>, threads: usize) -> Result<Self, WorkerError> {
        Self::with_config(
            name,
            &WorkerConfig {
                threads,
                ..WorkerConfig::default()
            },
        )
    }

    pub fn with_config(name: impl Into<String>, config: &WorkerConfig) -> Result<Self, WorkerError> {
        let name = name.into();
        let (tx, rx) = mpsc::unbounded_channel::<Envelope>();
        let rx = Arc::new(Mutex::new(rx));
        let state = Arc::new(QueueState {
            name: name.clone(),
            progress: Mutex::new(Progress::default()),
            settled: Condvar::new(),
            cancelled: AtomicBool::new(false),
        });

        let count = config.threads.max(1);
        let mut threads = Vec::with_capacity(count);
        for index in 0..count {
            let thread_name = if count == 1 {
                format!("{}-{}", config.thread_name_prefix, name)
            } else {
                format!("{}-{}-{}", config.thread_name_prefix, name, index)
            };
            let rx = rx.clone();
            let state = state.clone();
            let handle = thread::Builder::new()
                .name(thread_name)
                .spawn(move || serve(&state, &rx))
                .map_err(|e| WorkerError::Spawn {
                    queue: name.clone(),
                    reason: e.to_string(),
                })?;
            threads.push(handle);
        }

        debug!(queue = %name, threads = count, "worker queue started");
        Ok(Self {
            state,
            sender: Mutex::new(Some(tx)),
            threads: Mutex::new(threads),
        })
    }

    pub fn name(&self) -> &str {
        &self.state.name
    }

    /// Enqueues `job` and returns immediately.
    pub fn queue_request(
        &self,
        name: impl Into<String>,
        job: impl FnOnce() -> SyncResult<()> + Send + 'static,
    ) -> Result<(), WorkerError> {
        let sender = self.sender.lock();
        let Some(sender) = sender.as_ref() else {
            return Err(WorkerError::Closed(self.state.name.clone()));
        };
        let seq = {
            let mut progress = self.state.progress.lock();
            let seq = progress.next_seq;
            progress.next_seq += 1;
            progress.outstanding.insert(seq);
            seq
        };
        let envelope = Envelope {
            seq,
            name: name.into(),
            job: Box::new(job),
        };
        if sender.send(envelope).is_err() {
            self.state.finish(seq, JobOutcome::Discarded);
            return Err(WorkerError::Closed(self.state.name.clone()));
        }
        Ok(())
    }

    /// Blocks until every job queued before this call has run.
    ///
    /// Must not be called from one of this queue's own jobs.
    pub fn flush(&self) {
        let mut progress = self.state.progress.lock();
        let Some(mark) = progress.next_seq.checked_sub(1) else {
            return;
        };
        while !progress.reached(mark) {
            self.state.settled.wait(&mut progress);
        }
    }

    /// Resolves once every job queued before this call has run.
    pub async fn idle(&self) {
        let rx = {
            let mut progress = self.state.progress.lock();
            let Some(mark) = progress.next_seq.checked_sub(1) else {
                return;
            };
            if progress.reached(mark) {
                return;
            }
            let (tx, rx) = oneshot::channel();
            progress.waiters.push((mark, tx));
            rx
        };
        let _ = rx.await;
    }

    /// Stops accepting work and joins the threads.
    pub fn shutdown(&self, mode: ShutdownMode) {
        if mode == ShutdownMode::Cancel {
            self.state.cancelled.store(true, Ordering::Release);
        }
        // Dropping the sender lets the threads exit once the channel drains.
        self.sender.lock().take();
        let threads = std::mem::take(&mut *self.threads.lock());
        let current = thread::current().id();
        for handle in threads {
            if handle.thread().id() == current {
                continue;
            }
            if handle.join().is_err() {
                error!(queue = %self.state.name, "worker thread terminated abnormally");
            }
        }
        info!(queue = %self.state.name, ?mode, "worker queue stopped");
    }

    pub fn is_closed(&self) -> bool {
        self.sender.lock().is_none()
    }

    /// Jobs queued but not yet finished.
    pub fn pending(&self) -> usize {
        self.state.progress.lock().outstanding.len()
    }

    /// Jobs that returned `Ok`.
    pub fn completed(&self) -> u64 {
        self.state.progress.lock().completed
    }

    /// Jobs that returned `Err` or panicked.
    pub fn failed(&self) -> u64 {
        self.state.progress.lock().failed
    }

    /// Jobs dropped by a cancelling shutdown.
    pub fn discarded(&self) -> u64 {
        self.state.progress.lock().discarded
    }
}

impl Drop for WorkerQueue {
    fn drop(&mut self) {
        // Threads are detached here; an owner that needs a deterministic stop
        // calls `shutdown` first.
        self.state.cancelled.store(true, Ordering::Release);
        self.sender.get_mut().take();
    }
}

fn serve(state: &QueueState, rx: &Mutex<mpsc::UnboundedReceiver<Envelope>>) {
    loop {
        let next = rx.lock().blocking_recv();
        let Some(Envelope { seq, name, job }) = next else {
            break;
        };

        if state.cancelled.load(Ordering::Acquire) {
            debug!(queue = %state.name, job = %name, "discarding cancelled job");
            drop(job);
            state.finish(seq, JobOutcome::Discarded);
            continue;
        }

        let outcome = match panic::catch_unwind(AssertUnwindSafe(job)) {
            Ok(Ok(())) => JobOutcome::Completed,
            Ok(Err(err)) => {
                warn!(queue = %state.name, job = %name, error = %err, "job failed");
                JobOutcome::Failed
            }
            Err(payload) => {
                let message = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                error!(queue = %state.name, job = %name, panic = %message, "job panicked");
                JobOutcome::Failed
            }
        };
        state.finish(seq, outcome);
    }
    debug!(queue = %state.name, "worker thread exiting");
}

/// One queue per [`QueueKind`].
pub struct WorkerQueues {
    queues: Vec<WorkerQueue>,
}

impl WorkerQueues {
    pub fn new(config: &WorkerConfig) -> Result<Self, WorkerError> {
        let queues = QueueKind::ALL
            .iter()
            .map(|kind| WorkerQueue::with_config(kind.name(), config))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { queues })
    }

    pub fn get(&self, kind: QueueKind) -> &WorkerQueue {
        // `ALL` is in declaration order.
        &self.queues[kind as usize]
    }

    pub fn queue_request(
        &self,
        kind: QueueKind,
        name: impl Into<String>,
        job: impl FnOnce() -> SyncResult<()> + Send + 'static,
    ) -> Result<(), WorkerError> {
        self.get(kind).queue_request(name, job)
    }

    /// Flushes every queue in turn.
    pub fn flush_all(&self) {
        for queue in &self.queues {
            queue.flush();
        }
    }

    pub async fn idle_all(&self) {
        for queue in &self.queues {
            queue.idle().await;
        }
    }

    pub fn shutdown(&self, mode: ShutdownMode) {
        for queue in &self.queues {
            queue.shutdown(mode);
        }
    }
}
