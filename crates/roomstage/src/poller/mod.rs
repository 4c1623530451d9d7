//! Per-job status polling against the remote job engine.
//!
//! Every polled job id owns one spawned task. The task ticks every
//! `interval`, fetches the job snapshot, reconciles it into the photo cache
//! and calls the caller's hooks. It stops on a terminal status, after
//! `max_consecutive_failures` failed fetches in a row, when the session
//! deadline passes, or when cancelled.
//!
//! Jobs that end in `error` or cross the failure threshold land in the
//! permanently-failed set and are never polled again.
//!
//! `start_polling` spawns onto the current tokio runtime and must be called
//! from within one.

pub mod failed;
pub mod job_id;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::cache::PhotoCache;
use crate::config::PollingConfig;
use crate::engine::{JobEngine, JobRecord, RemoteJobStatus};

pub use failed::FailedJobSet;
pub use job_id::is_valid_job_id;

/// Called with every successfully fetched snapshot.
pub type UpdateHook = Arc<dyn Fn(&JobRecord) + Send + Sync>;

/// Called once when a polling task ends.
pub type StoppedHook = Arc<dyn Fn(&str, StopReason) + Send + Sync>;

/// Outcome of a `start_polling` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollStart {
    Started,
    /// An existing timer for the job was cancelled and replaced.
    Restarted,
    /// The id is not a UUID v4; nothing was registered.
    InvalidJobId,
    /// The id is in the permanently-failed set; nothing was registered.
    PermanentlyFailed,
}

impl PollStart {
    pub fn is_polling(&self) -> bool {
        matches!(self, PollStart::Started | PollStart::Restarted)
    }
}

/// Why a polling task ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The job reported `done`.
    Completed,
    /// The job reported `error`.
    JobErrored,
    /// Too many consecutive failed fetches.
    FailureThreshold,
    /// The session deadline passed first.
    SessionTimeout,
    /// Stopped explicitly or replaced by a restart.
    Cancelled,
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            StopReason::Completed => "completed",
            StopReason::JobErrored => "job_errored",
            StopReason::FailureThreshold => "failure_threshold",
            StopReason::SessionTimeout => "session_timeout",
            StopReason::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Caller hooks for one polled job.
#[derive(Clone, Default)]
pub struct PollHooks {
    pub on_update: Option<UpdateHook>,
    pub on_stopped: Option<StoppedHook>,
}

impl PollHooks {
    pub fn on_update<F>(mut self, f: F) -> Self
    where
        F: Fn(&JobRecord) + Send + Sync + 'static,
    {
        self.on_update = Some(Arc::new(f));
        self
    }

    pub fn on_stopped<F>(mut self, f: F) -> Self
    where
        F: Fn(&str, StopReason) + Send + Sync + 'static,
    {
        self.on_stopped = Some(Arc::new(f));
        self
    }
}

struct ActivePoll {
    generation: u64,
    cancel: CancellationToken,
}

struct PollerInner {
    engine: Arc<dyn JobEngine>,
    cache: Arc<PhotoCache>,
    settings: PollingConfig,
    active: Mutex<HashMap<String, ActivePoll>>,
    failed: FailedJobSet,
    next_generation: AtomicU64,
    active_count: watch::Sender<usize>,
}

/// Polls remote jobs, one timer per job id. Cloning is cheap and clones
/// share all state.
#[derive(Clone)]
pub struct JobPoller {
    inner: Arc<PollerInner>,
}

impl JobPoller {
    pub fn new(
        engine: Arc<dyn JobEngine>,
        cache: Arc<PhotoCache>,
        settings: PollingConfig,
        failed: FailedJobSet,
    ) -> Self {
        let (active_count, _) = watch::channel(0);
        Self {
            inner: Arc::new(PollerInner {
                engine,
                cache,
                settings,
                active: Mutex::new(HashMap::new()),
                failed,
                next_generation: AtomicU64::new(1),
                active_count,
            }),
        }
    }

    /// Starts polling `job_id`, replacing any timer already running for it.
    pub fn start_polling(&self, job_id: &str, on_update: Option<UpdateHook>) -> PollStart {
        self.start_polling_with(
            job_id,
            PollHooks {
                on_update,
                on_stopped: None,
            },
        )
    }

    /// Like [`start_polling`](Self::start_polling), with a stop hook as well.
    pub fn start_polling_with(&self, job_id: &str, hooks: PollHooks) -> PollStart {
        if !is_valid_job_id(job_id) {
            log::warn!("Refusing to poll invalid job id '{}'", job_id);
            return PollStart::InvalidJobId;
        }
        if self.inner.failed.contains(job_id) {
            log::info!("Job {} is permanently failed, not polling", job_id);
            return PollStart::PermanentlyFailed;
        }

        let generation = self.inner.next_generation.fetch_add(1, Ordering::SeqCst);
        let cancel = CancellationToken::new();

        let previous = {
            let mut active = self.inner.lock_active();
            let previous = active.insert(
                job_id.to_string(),
                ActivePoll {
                    generation,
                    cancel: cancel.clone(),
                },
            );
            self.inner.publish_count(active.len());
            previous
        };

        let outcome = match previous {
            Some(old) => {
                old.cancel.cancel();
                log::debug!("Restarting polling for job {}", job_id);
                PollStart::Restarted
            }
            None => {
                log::info!("Started polling job {}", job_id);
                PollStart::Started
            }
        };

        let inner = Arc::clone(&self.inner);
        let job_id = job_id.to_string();
        let span = tracing::info_span!("poller.job", job_id = %job_id, generation);
        tokio::spawn(run_poll_loop(inner, job_id, generation, cancel, hooks).instrument(span));

        outcome
    }

    /// Cancels the timer for `job_id`, if any.
    pub fn stop_polling(&self, job_id: &str) {
        let removed = {
            let mut active = self.inner.lock_active();
            let removed = active.remove(job_id);
            self.inner.publish_count(active.len());
            removed
        };
        if let Some(poll) = removed {
            poll.cancel.cancel();
            log::info!("Stopped polling job {}", job_id);
        }
    }

    /// Cancels every timer.
    pub fn stop_all_polling(&self) {
        let drained: Vec<(String, ActivePoll)> = {
            let mut active = self.inner.lock_active();
            let drained = active.drain().collect();
            self.inner.publish_count(0);
            drained
        };
        for (_, poll) in &drained {
            poll.cancel.cancel();
        }
        if !drained.is_empty() {
            log::info!("Stopped polling {} jobs", drained.len());
        }
    }

    pub fn is_polling(&self, job_id: &str) -> bool {
        self.inner.lock_active().contains_key(job_id)
    }

    pub fn get_active_polling_count(&self) -> usize {
        self.inner.lock_active().len()
    }

    pub fn is_permanently_failed(&self, job_id: &str) -> bool {
        self.inner.failed.contains(job_id)
    }

    pub fn get_failed_jobs_count(&self) -> usize {
        self.inner.failed.len()
    }

    /// Forgets every permanently-failed job id.
    pub fn clear_failed_jobs(&self) {
        self.inner.failed.clear();
        log::info!("Cleared permanently-failed jobs");
    }

    /// Resolves once no job is being polled.
    pub async fn wait_idle(&self) {
        let mut rx = self.inner.active_count.subscribe();
        let _ = rx.wait_for(|count| *count == 0).await;
    }
}

impl PollerInner {
    fn lock_active(&self) -> MutexGuard<'_, HashMap<String, ActivePoll>> {
        match self.active.lock() {
            Ok(g) => g,
            Err(poisoned) => {
                log::warn!("Poller lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    fn publish_count(&self, count: usize) {
        self.active_count.send_replace(count);
    }

    /// Applies the consequences of a task ending and drops its entry, unless
    /// a newer generation has replaced it.
    fn finish(&self, job_id: &str, generation: u64, reason: StopReason) {
        match reason {
            StopReason::JobErrored => {
                self.failed.insert(job_id);
                log::warn!("Job {} reported an error, marked permanently failed", job_id);
            }
            StopReason::FailureThreshold => {
                self.failed.insert(job_id);
                log::warn!(
                    "Job {} failed {} consecutive fetches, marked permanently failed",
                    job_id,
                    self.settings.max_consecutive_failures
                );
                if let Some(photo) = self.cache.find_by_job_id(job_id) {
                    self.cache.mark_failed(&photo.id);
                }
            }
            StopReason::SessionTimeout => {
                log::info!("Polling session for job {} timed out", job_id);
            }
            StopReason::Completed => {
                log::info!("Job {} completed", job_id);
            }
            StopReason::Cancelled => {}
        }

        let mut active = self.lock_active();
        if active.get(job_id).map(|poll| poll.generation) == Some(generation) {
            active.remove(job_id);
            self.publish_count(active.len());
        }
    }
}

async fn run_poll_loop(
    inner: Arc<PollerInner>,
    job_id: String,
    generation: u64,
    cancel: CancellationToken,
    hooks: PollHooks,
) {
    let mut ticker = tokio::time::interval(inner.settings.interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker.tick().await; // skip immediate first tick

    let deadline = tokio::time::sleep(inner.settings.session_timeout());
    tokio::pin!(deadline);

    let mut failures: u32 = 0;

    let reason = loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break StopReason::Cancelled,
            _ = &mut deadline => break StopReason::SessionTimeout,
            _ = ticker.tick() => {}
        }

        let fetch = inner
            .engine
            .get_status(&job_id)
            .instrument(tracing::info_span!("poller.fetch", job_id = %job_id));

        let fetched = tokio::select! {
            biased;
            _ = cancel.cancelled() => break StopReason::Cancelled,
            _ = &mut deadline => break StopReason::SessionTimeout,
            result = fetch => result,
        };

        if cancel.is_cancelled() {
            break StopReason::Cancelled;
        }

        match fetched {
            Ok(Some(job)) => {
                failures = 0;
                inner.cache.reconcile(&job);
                if let Some(on_update) = &hooks.on_update {
                    on_update(&job);
                }
                match job.status {
                    RemoteJobStatus::Done => break StopReason::Completed,
                    RemoteJobStatus::Error => break StopReason::JobErrored,
                    RemoteJobStatus::Processing => {}
                }
            }
            Ok(None) => {
                failures += 1;
                log::warn!(
                    "Job {} not found by engine ({}/{})",
                    job_id,
                    failures,
                    inner.settings.max_consecutive_failures
                );
            }
            Err(e) => {
                failures += 1;
                log::warn!(
                    "Failed to fetch status of job {} ({}/{}): {}",
                    job_id,
                    failures,
                    inner.settings.max_consecutive_failures,
                    e
                );
            }
        }

        if failures >= inner.settings.max_consecutive_failures {
            break StopReason::FailureThreshold;
        }
    };

    inner.finish(&job_id, generation, reason);

    if let Some(on_stopped) = &hooks.on_stopped {
        on_stopped(&job_id, reason);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{EngineError, SubmitRequest, SubmitResponse};
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    const JOB: &str = "0b7e8f3c-2a9d-4c1e-9f6a-3d2b1c0a9e8f";

    /// Engine that always fails status fetches and counts them.
    #[derive(Default)]
    struct FailingEngine {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl JobEngine for FailingEngine {
        async fn submit(&self, _request: &SubmitRequest) -> Result<SubmitResponse, EngineError> {
            Err(EngineError::InvalidResponse("unused".into()))
        }

        async fn get_status(&self, _job_id: &str) -> Result<Option<JobRecord>, EngineError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(EngineError::InvalidResponse("offline".into()))
        }
    }

    fn poller(engine: Arc<FailingEngine>) -> JobPoller {
        let cache = Arc::new(PhotoCache::new(
            Arc::new(MemoryStore::new()),
            "https://cdn.example.com",
        ));
        JobPoller::new(engine, cache, PollingConfig::default(), FailedJobSet::in_memory())
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_job_id_is_rejected() {
        let engine = Arc::new(FailingEngine::default());
        let poller = poller(engine.clone());

        assert_eq!(poller.start_polling("not-a-uuid", None), PollStart::InvalidJobId);
        assert!(!poller.is_polling("not-a-uuid"));

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(engine.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_keeps_one_timer() {
        let engine = Arc::new(FailingEngine::default());
        let poller = poller(engine);

        assert_eq!(poller.start_polling(JOB, None), PollStart::Started);
        assert_eq!(poller.start_polling(JOB, None), PollStart::Restarted);
        assert_eq!(poller.get_active_polling_count(), 1);
        assert!(poller.is_polling(JOB));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_threshold_blacklists() {
        let engine = Arc::new(FailingEngine::default());
        let poller = poller(engine.clone());

        poller.start_polling(JOB, None);
        tokio::time::sleep(Duration::from_secs(16)).await;

        assert_eq!(engine.calls.load(Ordering::SeqCst), 3);
        assert!(!poller.is_polling(JOB));
        assert_eq!(poller.get_failed_jobs_count(), 1);
        assert_eq!(poller.start_polling(JOB, None), PollStart::PermanentlyFailed);

        poller.clear_failed_jobs();
        assert_eq!(poller.start_polling(JOB, None), PollStart::Started);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_polling_is_safe_when_absent() {
        let engine = Arc::new(FailingEngine::default());
        let poller = poller(engine.clone());

        poller.stop_polling(JOB);
        poller.start_polling(JOB, None);
        poller.stop_polling(JOB);
        assert!(!poller.is_polling(JOB));

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(engine.calls.load(Ordering::SeqCst), 0);
        assert_eq!(poller.get_failed_jobs_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_idle() {
        let engine = Arc::new(FailingEngine::default());
        let poller = poller(engine);

        poller.wait_idle().await;
        poller.start_polling(JOB, None);
        tokio::time::timeout(Duration::from_secs(60), poller.wait_idle())
            .await
            .unwrap();
        assert_eq!(poller.get_active_polling_count(), 0);
    }

    #[test]
    fn test_stop_reason_display() {
        assert_eq!(StopReason::FailureThreshold.to_string(), "failure_threshold");
        assert!(PollStart::Restarted.is_polling());
        assert!(!PollStart::InvalidJobId.is_polling());
    }
}
