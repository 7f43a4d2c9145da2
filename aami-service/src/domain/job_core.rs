//! Job core (§4.6): runs work asynchronously with backpressure, cancellation, and a
//! clean shutdown.
//!
//! Grounded directly on the host framework's background-worker agent
//! (`agents::background_worker`): a per-job `CancellationToken` cloned from a root token
//! owned by the manager, dispatched with the same
//! `tokio::select! { biased; _ = token.cancelled() => .., result = fn(ctx) => .. }` shape.
//! Generalized from that agent's unbounded fire-and-forget `tokio::spawn` per submission
//! to a fixed pool of `max_workers` long-lived workers reading off a bounded
//! `tokio::sync::mpsc::channel(queue_size)`, since §4.6 calls for real backpressure
//! (`QueueFull` on overflow) rather than always-accept semantics.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::JobConfig;
use crate::error::{Error, Result};
use crate::ids::JobId;

/// A job's lifecycle state (§4.6). `Completed`/`Failed`/`Cancelled` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

/// A job record as persisted by a [`JobStore`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub job_type: String,
    pub status: JobStatus,
    pub result: Option<Value>,
    pub error: Option<String>,
    pub progress: u8,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl Job {
    fn new(id: JobId, job_type: String) -> Self {
        Self {
            id,
            job_type,
            status: JobStatus::Pending,
            result: None,
            error: None,
            progress: 0,
            created_at: Utc::now(),
            started_at: None,
            ended_at: None,
        }
    }
}

/// Aggregate counters for `Stats` (§4.6).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct JobStats {
    pub total_jobs: usize,
    pub queue_length: usize,
    pub max_workers: usize,
}

/// Pluggable job persistence (§4.6: "pluggable; default in-memory"). Every accessor
/// returns an owned `Job`, never a reference, so callers cannot observe or cause
/// mutation through the store (§5's deep-copy guarantee).
#[async_trait::async_trait]
pub trait JobStore: Send + Sync {
    async fn insert(&self, job: Job) -> Result<()>;
    async fn get(&self, id: &JobId) -> Result<Option<Job>>;
    async fn mark_running(&self, id: &JobId, started_at: DateTime<Utc>) -> Result<()>;
    /// Best-effort: persistence failure here is logged, never propagated (§4.6).
    async fn set_progress(&self, id: &JobId, progress: u8);
    async fn mark_terminal(
        &self,
        id: &JobId,
        status: JobStatus,
        result: Option<Value>,
        error: Option<String>,
        ended_at: DateTime<Utc>,
    ) -> Result<()>;
    /// A non-terminal job of the given type, if one exists (for `SubmitUnique`).
    async fn find_non_terminal_by_type(&self, job_type: &str) -> Result<Option<Job>>;
    async fn list(&self) -> Result<Vec<Job>>;
    async fn remove(&self, id: &JobId) -> Result<()>;
    /// Removes terminal jobs whose `ended_at` is older than `cutoff`, returning the count removed.
    async fn reap_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize>;
}

/// Default `JobStore`: a `DashMap` keyed by job id (§5: "reader/writer guard" is the
/// map's own per-shard locking, no separate `RwLock<HashMap<_>>` needed).
#[derive(Debug, Default)]
pub struct InMemoryJobStore {
    jobs: DashMap<JobId, Job>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl JobStore for InMemoryJobStore {
    async fn insert(&self, job: Job) -> Result<()> {
        self.jobs.insert(job.id.clone(), job);
        Ok(())
    }

    async fn get(&self, id: &JobId) -> Result<Option<Job>> {
        Ok(self.jobs.get(id).map(|j| j.clone()))
    }

    async fn mark_running(&self, id: &JobId, started_at: DateTime<Utc>) -> Result<()> {
        if let Some(mut job) = self.jobs.get_mut(id) {
            job.status = JobStatus::Running;
            job.started_at = Some(started_at);
        }
        Ok(())
    }

    async fn set_progress(&self, id: &JobId, progress: u8) {
        if let Some(mut job) = self.jobs.get_mut(id) {
            job.progress = progress.min(100);
        } else {
            tracing::debug!(job_id = %id, "progress update for unknown job dropped");
        }
    }

    async fn mark_terminal(
        &self,
        id: &JobId,
        status: JobStatus,
        result: Option<Value>,
        error: Option<String>,
        ended_at: DateTime<Utc>,
    ) -> Result<()> {
        if let Some(mut job) = self.jobs.get_mut(id) {
            job.status = status;
            job.result = result;
            job.error = error;
            job.progress = 100;
            job.ended_at = Some(ended_at);
        }
        Ok(())
    }

    async fn find_non_terminal_by_type(&self, job_type: &str) -> Result<Option<Job>> {
        Ok(self
            .jobs
            .iter()
            .find(|entry| entry.job_type == job_type && !entry.status.is_terminal())
            .map(|entry| entry.clone()))
    }

    async fn list(&self) -> Result<Vec<Job>> {
        Ok(self.jobs.iter().map(|entry| entry.clone()).collect())
    }

    async fn remove(&self, id: &JobId) -> Result<()> {
        self.jobs.remove(id);
        Ok(())
    }

    async fn reap_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let doomed: Vec<JobId> = self
            .jobs
            .iter()
            .filter(|entry| entry.status.is_terminal() && entry.ended_at.is_some_and(|e| e < cutoff))
            .map(|entry| entry.id.clone())
            .collect();
        let count = doomed.len();
        for id in doomed {
            self.jobs.remove(&id);
        }
        Ok(count)
    }
}

/// Reports progress from inside a running job body back to the store, clamped to `[0,100]`.
#[derive(Clone)]
pub struct ProgressReporter {
    store: Arc<dyn JobStore>,
    job_id: JobId,
}

impl ProgressReporter {
    pub async fn report(&self, progress: u8) {
        self.store.set_progress(&self.job_id, progress).await;
    }

    pub fn job_id(&self) -> &JobId {
        &self.job_id
    }
}

pub type JobOutcome = std::result::Result<Value, String>;
pub type JobFuture = Pin<Box<dyn Future<Output = JobOutcome> + Send>>;
/// A job body: takes its cancellation token and a progress reporter, returns its result
/// or an error message (§4.6: "`fn` receives a context and a `progress(int)` callback").
pub type JobFn = Box<dyn FnOnce(CancellationToken, ProgressReporter) -> JobFuture + Send>;

struct QueuedJob {
    id: JobId,
    f: JobFn,
}

/// Single process-wide job manager (§4.6).
pub struct JobManager {
    store: Arc<dyn JobStore>,
    tx: mpsc::Sender<QueuedJob>,
    root_token: CancellationToken,
    cancel_tokens: Arc<DashMap<JobId, CancellationToken>>,
    closed: Arc<AtomicBool>,
    queue_size: usize,
    max_workers: usize,
    worker_handles: AsyncMutex<Vec<JoinHandle<()>>>,
    reaper_handle: AsyncMutex<Option<JoinHandle<()>>>,
}

impl JobManager {
    pub fn new(config: JobConfig) -> Self {
        Self::with_store(config, Arc::new(InMemoryJobStore::new()))
    }

    pub fn with_store(config: JobConfig, store: Arc<dyn JobStore>) -> Self {
        let (tx, rx) = mpsc::channel::<QueuedJob>(config.queue_size.max(1));
        let root_token = CancellationToken::new();
        let cancel_tokens = Arc::new(DashMap::new());
        let closed = Arc::new(AtomicBool::new(false));

        let rx = Arc::new(AsyncMutex::new(rx));
        let mut worker_handles = Vec::with_capacity(config.max_workers);
        for _ in 0..config.max_workers.max(1) {
            worker_handles.push(tokio::spawn(worker_loop(
                rx.clone(),
                store.clone(),
                root_token.clone(),
                cancel_tokens.clone(),
            )));
        }

        let reaper_handle = tokio::spawn(reaper_loop(store.clone(), root_token.clone(), config.clone()));

        Self {
            store,
            tx,
            root_token,
            cancel_tokens,
            closed,
            queue_size: config.queue_size.max(1),
            max_workers: config.max_workers.max(1),
            worker_handles: AsyncMutex::new(worker_handles),
            reaper_handle: AsyncMutex::new(Some(reaper_handle)),
        }
    }

    /// `Submit(type, fn)` (§4.6).
    pub async fn submit(&self, job_type: impl Into<String>, f: JobFn) -> Result<JobId> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::ManagerClosed);
        }

        let id = JobId::new();
        let job_type = job_type.into();
        self.store.insert(Job::new(id.clone(), job_type)).await?;

        match self.tx.try_send(QueuedJob { id: id.clone(), f }) {
            Ok(()) => Ok(id),
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.store.remove(&id).await.ok();
                Err(Error::QueueFull)
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.store.remove(&id).await.ok();
                Err(Error::ManagerClosed)
            }
        }
    }

    /// `SubmitUnique(type, fn)` (§4.6): returns the existing job's id with `isNew=false`
    /// if a non-terminal job of the same type is already in flight.
    pub async fn submit_unique(&self, job_type: impl Into<String>, f: JobFn) -> Result<(JobId, bool)> {
        let job_type = job_type.into();
        if let Some(existing) = self.store.find_non_terminal_by_type(&job_type).await? {
            return Ok((existing.id, false));
        }
        let id = self.submit(job_type, f).await?;
        Ok((id, true))
    }

    /// `Cancel(id)` (§4.6).
    pub async fn cancel(&self, id: &JobId) -> Result<()> {
        let job = self
            .store
            .get(id)
            .await?
            .ok_or_else(|| Error::JobNotFound(id.to_string()))?;

        if job.status.is_terminal() {
            return Err(Error::JobNotCancellable(id.to_string()));
        }

        if let Some(token) = self.cancel_tokens.get(id) {
            token.cancel();
        } else {
            // Still queued — no worker has registered a token for it yet.
            self.store
                .mark_terminal(id, JobStatus::Cancelled, None, Some("job was cancelled".to_string()), Utc::now())
                .await?;
        }
        Ok(())
    }

    pub async fn get(&self, id: &JobId) -> Result<Job> {
        self.store.get(id).await?.ok_or_else(|| Error::JobNotFound(id.to_string()))
    }

    pub async fn list(&self) -> Result<Vec<Job>> {
        self.store.list().await
    }

    /// `Stats` (§4.6).
    pub async fn stats(&self) -> Result<JobStats> {
        let total_jobs = self.store.list().await?.len();
        let queue_length = self.queue_size.saturating_sub(self.tx.capacity());
        Ok(JobStats {
            total_jobs,
            queue_length,
            max_workers: self.max_workers,
        })
    }

    /// `Shutdown(ctx)` (§4.6): idempotent, signals the pool, waits for in-flight workers
    /// up to `timeout`, stops the reaper. Submissions after this return `ManagerClosed`.
    pub async fn shutdown(&self, timeout: std::time::Duration) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        self.root_token.cancel();

        let handles = {
            let mut guard = self.worker_handles.lock().await;
            std::mem::take(&mut *guard)
        };
        let _ = tokio::time::timeout(timeout, futures::future::join_all(handles)).await;

        if let Some(handle) = self.reaper_handle.lock().await.take() {
            handle.abort();
        }

        Ok(())
    }
}

async fn worker_loop(
    rx: Arc<AsyncMutex<mpsc::Receiver<QueuedJob>>>,
    store: Arc<dyn JobStore>,
    root_token: CancellationToken,
    cancel_tokens: Arc<DashMap<JobId, CancellationToken>>,
) {
    loop {
        let next = {
            let mut rx = rx.lock().await;
            tokio::select! {
                biased;
                () = root_token.cancelled() => None,
                item = rx.recv() => item,
            }
        };

        let Some(queued) = next else {
            return;
        };

        let job_token = root_token.child_token();
        cancel_tokens.insert(queued.id.clone(), job_token.clone());

        let started_at = Utc::now();
        if store.mark_running(&queued.id, started_at).await.is_err() {
            tracing::warn!(job_id = %queued.id, "failed to mark job running");
        }

        let progress = ProgressReporter {
            store: store.clone(),
            job_id: queued.id.clone(),
        };

        let outcome = tokio::select! {
            biased;
            () = job_token.cancelled() => None,
            result = (queued.f)(job_token.clone(), progress) => Some(result),
        };

        cancel_tokens.remove(&queued.id);
        let ended_at = Utc::now();

        let terminal = match outcome {
            None => (JobStatus::Cancelled, None, Some("job was cancelled".to_string())),
            Some(Ok(value)) => (JobStatus::Completed, Some(value), None),
            Some(Err(message)) => (JobStatus::Failed, None, Some(message)),
        };

        if let Err(e) = store
            .mark_terminal(&queued.id, terminal.0, terminal.1, terminal.2, ended_at)
            .await
        {
            tracing::warn!(job_id = %queued.id, error = %e, "failed to persist job completion");
        }
    }
}

async fn reaper_loop(store: Arc<dyn JobStore>, root_token: CancellationToken, config: JobConfig) {
    let mut ticker = tokio::time::interval(config.reap_interval());
    loop {
        tokio::select! {
            biased;
            () = root_token.cancelled() => return,
            _ = ticker.tick() => {
                let cutoff = Utc::now() - chrono::Duration::seconds(config.job_ttl_secs as i64);
                match store.reap_older_than(cutoff).await {
                    Ok(count) if count > 0 => tracing::debug!(count, "reaped terminal jobs"),
                    Ok(_) => {}
                    Err(e) => tracing::warn!(error = %e, "job reaper pass failed"),
                }
            }
        }
    }
}
