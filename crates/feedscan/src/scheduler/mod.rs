//! Process-wide job scheduler.
//!
//! Constructed once at startup with its collaborators injected; the
//! hosting process owns the instance and calls `shutdown` on exit. It
//! enforces the concurrency cap, promotes queued jobs and recovers jobs
//! abandoned by a crashed instance.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{Duration as ChronoDuration, Utc};
use tracing::{debug, error, info, warn};

use crate::broadcast::JobProgressBroadcaster;
use crate::config::Settings;
use crate::registry::{JobPatch, JobRegistry, JobStatus};
use crate::runner::{CancelFlag, JobRunner, RunOutcome};
use crate::source::{DownloadUrlProvider, FileSource};
use crate::validate::ReferenceProvider;

const RECOVERY_SCAN_LIMIT: u64 = 500;

/// Collaborators the scheduler wires into every runner.
pub struct SchedulerContext {
    pub registry: Arc<dyn JobRegistry>,
    pub source: Arc<dyn FileSource>,
    pub urls: Arc<dyn DownloadUrlProvider>,
    pub reference: Arc<dyn ReferenceProvider>,
    pub broadcaster: JobProgressBroadcaster,
    pub settings: Arc<Settings>,
}

struct ActiveJob {
    cancel: CancelFlag,
}

struct SchedulerInner {
    context: SchedulerContext,
    active: Mutex<HashMap<String, ActiveJob>>,
}

/// Cheaply clonable handle to the process-wide scheduler state.
#[derive(Clone)]
pub struct JobScheduler {
    inner: Arc<SchedulerInner>,
}

impl JobScheduler {
    pub fn new(context: SchedulerContext) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                context,
                active: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn active_count(&self) -> usize {
        self.lock_active().len()
    }

    /// Starts a runner for the job if a slot is free. Returns false when
    /// the job stays QUEUED (or is already running here).
    pub async fn enqueue(&self, job_id: &str, download_url: &str) -> bool {
        let cancel = CancelFlag::new();
        {
            let mut active = self.lock_active();
            if active.contains_key(job_id) {
                warn!(job_id, "Job is already running on this instance");
                return false;
            }
            if active.len() >= self.inner.context.settings.max_concurrent_jobs {
                debug!(job_id, "Concurrency cap reached, leaving job queued");
                return false;
            }
            active.insert(
                job_id.to_string(),
                ActiveJob {
                    cancel: cancel.clone(),
                },
            );
        }

        info!(job_id, "Starting job runner");
        let scheduler = self.clone();
        let job_id = job_id.to_string();
        let download_url = download_url.to_string();
        tokio::spawn(async move {
            let context = &scheduler.inner.context;
            let runner = JobRunner::new(
                Arc::clone(&context.registry),
                Arc::clone(&context.source),
                Arc::clone(&context.reference),
                context.broadcaster.clone(),
                Arc::clone(&context.settings),
                cancel,
            );
            let outcome = runner.run(&job_id, &download_url).await;
            match outcome {
                RunOutcome::Finished(status) => info!(job_id, status = %status, "Runner finished"),
                RunOutcome::NotClaimed => debug!(job_id, "Runner exited without a claim"),
            }

            scheduler.lock_active().remove(&job_id);
            scheduler.auto_dequeue_boxed().await;
        });
        true
    }

    /// Flags a running job for cancellation. Safe to call repeatedly;
    /// jobs not running on this instance are left to the control plane.
    pub fn cancel(&self, job_id: &str) {
        let active = self.lock_active();
        match active.get(job_id) {
            Some(job) => {
                info!(job_id, "Cancelling active job");
                job.cancel.cancel();
            }
            None => debug!(job_id, "Cancel requested for job not active here"),
        }
    }

    /// Promotes queued jobs (oldest first) until the cap is reached.
    /// A no-op when already at capacity.
    pub async fn auto_dequeue(&self) {
        loop {
            let capacity = {
                let active = self.lock_active();
                self.inner
                    .context
                    .settings
                    .max_concurrent_jobs
                    .saturating_sub(active.len())
            };
            if capacity == 0 {
                return;
            }

            let queued = match self
                .inner
                .context
                .registry
                .list_by_status(JobStatus::Queued, capacity as u64)
                .await
            {
                Ok(jobs) => jobs,
                Err(e) => {
                    warn!(error = %e, "Could not list queued jobs");
                    return;
                }
            };
            if queued.is_empty() {
                return;
            }

            let mut started_any = false;
            for job in queued {
                if self.lock_active().contains_key(&job.id) {
                    continue;
                }
                match self
                    .inner
                    .context
                    .urls
                    .download_url(&job.source_item_id)
                    .await
                {
                    Ok(signed) => {
                        if self.enqueue(&job.id, &signed.url).await {
                            started_any = true;
                        }
                    }
                    Err(e) => {
                        error!(job_id = %job.id, error = %e, "Download URL refresh failed");
                        self.mark_error(&job.id, &format!("Could not obtain download URL: {}", e))
                            .await;
                    }
                }
            }
            if !started_any {
                return;
            }
        }
    }

    /// Startup recovery: jobs left in PROCESSING with an expired (or
    /// absent) heartbeat are owned by a dead instance and become ERROR.
    pub async fn recover_stale_jobs(&self) {
        let cutoff = Utc::now()
            - ChronoDuration::seconds(self.inner.context.settings.heartbeat_timeout_secs as i64);

        let processing = match self
            .inner
            .context
            .registry
            .list_by_status(JobStatus::Processing, RECOVERY_SCAN_LIMIT)
            .await
        {
            Ok(jobs) => jobs,
            Err(e) => {
                warn!(error = %e, "Stale-job scan failed");
                return;
            }
        };

        let mut recovered = 0u64;
        for job in processing {
            if self.lock_active().contains_key(&job.id) {
                continue; // owned by this instance, heartbeat is live
            }
            let stale = match job.heartbeat_at {
                None => true,
                Some(heartbeat) => heartbeat < cutoff,
            };
            if !stale {
                continue;
            }

            warn!(
                job_id = %job.id,
                claimed_by = job.claimed_by.as_deref().unwrap_or("unknown"),
                "Recovering job with stale heartbeat"
            );
            self.mark_error(&job.id, "Recovered after instance restart (stale heartbeat)")
                .await;
            recovered += 1;
        }

        if recovered > 0 {
            info!(recovered, "Stale jobs recovered");
        }
        self.auto_dequeue().await;
    }

    /// Signals cancellation to every active job. The registry keeps the
    /// durable state; runners finish their terminal writes on their own.
    pub fn shutdown(&self) {
        let active = self.lock_active();
        for (job_id, job) in active.iter() {
            info!(job_id, "Shutdown: cancelling active job");
            job.cancel.cancel();
        }
    }

    /// Type-erased `auto_dequeue`, breaking the future-type cycle between
    /// `enqueue`, the runner task and re-promotion.
    fn auto_dequeue_boxed(
        &self,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send + 'static>> {
        let scheduler = self.clone();
        Box::pin(async move { scheduler.auto_dequeue().await })
    }

    async fn mark_error(&self, job_id: &str, message: &str) {
        let patch = JobPatch {
            status: Some(JobStatus::Error),
            error_message: Some(message.to_string()),
            finished_at: Some(Utc::now()),
            ..Default::default()
        };
        if let Err(e) = self.inner.context.registry.update(job_id, patch).await {
            error!(job_id, error = %e, "Could not mark job as errored");
        }
    }

    fn lock_active(&self) -> std::sync::MutexGuard<'_, HashMap<String, ActiveJob>> {
        match self.inner.active.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
