//! Orchestration of a single job from claim to terminal state.

pub mod counters;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::broadcast::{JobPhase, JobProgressBroadcaster, JobProgressEvent};
use crate::config::Settings;
use crate::error::RunError;
use crate::fragment::{Fragment, Fragmenter, WorkerPool};
use crate::memsnap;
use crate::registry::{JobPatch, JobRegistry, JobStatus};
use crate::source::FileSource;
use crate::validate::{LineChecker, ReferenceProvider, RowValidator, ValidatorConfig};

use counters::JobCounters;

/// Set-once cooperative cancellation signal, shared between the
/// scheduler, the runner's suspension-point checks and the heartbeat.
#[derive(Clone, Debug, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// What a finished run amounted to, for the scheduler's bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// The job reached DONE, ERROR or CANCELLED.
    Finished(JobStatus),
    /// Another instance claimed the row first; nothing was run.
    NotClaimed,
}

/// Drives one job end to end. All failure paths converge on
/// [`JobRunner::finalize`], which owns the terminal write.
pub struct JobRunner {
    registry: Arc<dyn JobRegistry>,
    source: Arc<dyn FileSource>,
    reference: Arc<dyn ReferenceProvider>,
    broadcaster: JobProgressBroadcaster,
    settings: Arc<Settings>,
    cancel: CancelFlag,
}

impl JobRunner {
    pub fn new(
        registry: Arc<dyn JobRegistry>,
        source: Arc<dyn FileSource>,
        reference: Arc<dyn ReferenceProvider>,
        broadcaster: JobProgressBroadcaster,
        settings: Arc<Settings>,
        cancel: CancelFlag,
    ) -> Self {
        Self {
            registry,
            source,
            reference,
            broadcaster,
            settings,
            cancel,
        }
    }

    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    pub async fn run(&self, job_id: &str, download_url: &str) -> RunOutcome {
        let started_at = Utc::now();
        let started = std::time::Instant::now();

        let (file_name, total_bytes) = match self.registry.get(job_id).await {
            Ok(Some(record)) => (record.file_name, record.total_bytes),
            Ok(None) => (String::new(), 0),
            Err(e) => {
                warn!(job_id, error = %e, "Could not read job row");
                (String::new(), 0)
            }
        };

        self.broadcaster.send(JobProgressEvent::new(
            job_id,
            &file_name,
            JobPhase::Queued,
            "Job queued for processing",
        ));

        match self
            .registry
            .claim(job_id, &self.settings.instance_id(), started_at)
            .await
        {
            Ok(true) => {}
            Ok(false) => {
                info!(job_id, "Job is no longer queued, skipping");
                return RunOutcome::NotClaimed;
            }
            Err(e) => {
                warn!(job_id, error = %e, "Claim failed");
                return RunOutcome::NotClaimed;
            }
        }

        info!(job_id, file_name = %file_name, total_bytes, "Job claimed");
        self.broadcaster.send(JobProgressEvent::new(
            job_id,
            &file_name,
            JobPhase::Claimed,
            "Job claimed for processing",
        ));

        let counters = Arc::new(JobCounters::new());

        let reference = match self.reference.load().await {
            Ok(data) => {
                info!(
                    job_id,
                    categories = data.category_count(),
                    values = data.value_count(),
                    "Reference data snapshotted"
                );
                Arc::new(data)
            }
            Err(e) => {
                return self
                    .finalize(job_id, &file_name, &counters, started_at, Err(e.into()))
                    .await;
            }
        };

        let checker: Arc<dyn LineChecker> = Arc::new(RowValidator::new(
            ValidatorConfig::from_settings(&self.settings.validator),
            reference,
        ));
        let (mut pool, mut results) = WorkerPool::new(self.settings.num_workers, checker);

        let aggregator = {
            let counters = Arc::clone(&counters);
            tokio::spawn(async move {
                while let Some(result) = results.recv().await {
                    debug!(
                        sequence = result.sequence,
                        worker_id = result.worker_id,
                        lines = result.processed_lines,
                        resident_bytes = result.resident_bytes,
                        "Fragment scanned"
                    );
                    counters.record(&result);
                }
            })
        };

        let heartbeat = self.spawn_heartbeat(job_id, &counters);
        let metrics = self.spawn_metrics(job_id, &file_name, total_bytes, &counters, started);

        let drive_result = self.drive(download_url, &pool, &counters).await;

        // Let in-flight fragments finish so their counts are persisted,
        // then shut the pool down and fold the remaining results.
        pool.await_all_idle().await;
        pool.terminate();
        drop(pool);
        if aggregator.await.is_err() {
            error!(job_id, "Result aggregator panicked");
        }

        heartbeat.abort();
        metrics.abort();

        // Late results can push the error count over the threshold after
        // the last dispatch-time check.
        let drive_result = match drive_result {
            Ok(()) if counters.error_lines() >= self.settings.fail_fast_threshold => {
                Err(RunError::FailFast {
                    error_lines: counters.error_lines(),
                    threshold: self.settings.fail_fast_threshold,
                })
            }
            other => other,
        };

        self.finalize(job_id, &file_name, &counters, started_at, drive_result)
            .await
    }

    /// Streams the file body through the fragmenter, dispatching each
    /// fragment under backpressure.
    async fn drive(
        &self,
        download_url: &str,
        pool: &WorkerPool,
        counters: &Arc<JobCounters>,
    ) -> Result<(), RunError> {
        let mut stream = self.source.open(download_url).await?;
        let mut fragmenter = Fragmenter::new(self.settings.fragment_max_bytes);

        while let Some(chunk) = stream.next().await {
            if self.cancel.is_cancelled() {
                return Err(RunError::Cancelled);
            }
            let chunk = chunk?;
            for fragment in fragmenter.push(&chunk) {
                self.dispatch(pool, counters, fragment).await?;
            }
        }

        if let Some(tail) = fragmenter.finish() {
            self.dispatch(pool, counters, tail).await?;
        }
        Ok(())
    }

    /// Pre-dispatch checks plus the backpressure acquire. These are the
    /// only abort points while the stream is healthy.
    async fn dispatch(
        &self,
        pool: &WorkerPool,
        counters: &Arc<JobCounters>,
        fragment: Fragment,
    ) -> Result<(), RunError> {
        if self.cancel.is_cancelled() {
            return Err(RunError::Cancelled);
        }

        let error_lines = counters.error_lines();
        if error_lines >= self.settings.fail_fast_threshold {
            return Err(RunError::FailFast {
                error_lines,
                threshold: self.settings.fail_fast_threshold,
            });
        }

        if let Some((resident_mb, limit_mb)) = memsnap::over_limit(self.settings.memory_limit_bytes())
        {
            return Err(RunError::MemoryPressure {
                resident_mb,
                limit_mb,
            });
        }

        let permit = pool.acquire().await;
        if self.cancel.is_cancelled() {
            return Err(RunError::Cancelled);
        }
        counters.note_fragment_emitted();
        pool.dispatch(permit, fragment)?;
        Ok(())
    }

    fn spawn_heartbeat(&self, job_id: &str, counters: &Arc<JobCounters>) -> JoinHandle<()> {
        let registry = Arc::clone(&self.registry);
        let counters = Arc::clone(counters);
        let cancel = self.cancel.clone();
        let job_id = job_id.to_string();
        let period = self.settings.heartbeat_interval();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await; // skip immediate first tick
            loop {
                ticker.tick().await;

                match registry.get(&job_id).await {
                    Ok(Some(record)) => {
                        if record.cancel_requested && !cancel.is_cancelled() {
                            info!(job_id, "Cancellation requested via registry");
                            cancel.cancel();
                        }
                    }
                    Ok(None) => warn!(job_id, "Job row disappeared during processing"),
                    Err(e) => warn!(job_id, error = %e, "Heartbeat read failed"),
                }

                let snapshot = counters.snapshot();
                let patch = JobPatch {
                    heartbeat_at: Some(Utc::now()),
                    processed_lines: Some(snapshot.processed_lines),
                    processed_bytes: Some(snapshot.processed_bytes),
                    error_lines: Some(snapshot.error_lines),
                    num_fragments: Some(snapshot.fragments_emitted),
                    fragments_done: Some(snapshot.fragments_done),
                    ..Default::default()
                };
                if let Err(e) = registry.update(&job_id, patch).await {
                    // Swallowed until the next tick.
                    warn!(job_id, error = %e, "Heartbeat write failed");
                }
            }
        })
    }

    fn spawn_metrics(
        &self,
        job_id: &str,
        file_name: &str,
        total_bytes: u64,
        counters: &Arc<JobCounters>,
        started: std::time::Instant,
    ) -> JoinHandle<()> {
        let counters = Arc::clone(counters);
        let broadcaster = self.broadcaster.clone();
        let job_id = job_id.to_string();
        let file_name = file_name.to_string();
        let period = self.settings.metrics_log_interval();
        let memory_limit = self.settings.memory_limit_bytes();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                ticker.tick().await;

                let snapshot = counters.snapshot();
                let elapsed = started.elapsed().as_secs_f64();
                let lines_per_sec = if elapsed > 0.0 {
                    snapshot.processed_lines as f64 / elapsed
                } else {
                    0.0
                };
                let mb_per_sec = if elapsed > 0.0 {
                    snapshot.processed_bytes as f64 / elapsed / (1024.0 * 1024.0)
                } else {
                    0.0
                };
                let percent_done = if total_bytes > 0 {
                    (snapshot.processed_bytes as f64 / total_bytes as f64 * 100.0).min(100.0)
                } else {
                    0.0
                };

                info!(
                    job_id,
                    lines = snapshot.processed_lines,
                    errors = snapshot.error_lines,
                    fragments = snapshot.fragments_done,
                    lines_per_sec = lines_per_sec as u64,
                    mb_per_sec = %format!("{:.2}", mb_per_sec),
                    percent_done = %format!("{:.1}", percent_done),
                    "Throughput"
                );

                broadcaster.send(
                    JobProgressEvent::new(&job_id, &file_name, JobPhase::Streaming, "Validating")
                        .with_counters(&snapshot),
                );

                // Enforcement happens between dispatches; this is early
                // warning for operators watching the logs.
                if let Some((resident_mb, limit_mb)) = memsnap::over_limit(memory_limit) {
                    warn!(job_id, resident_mb, limit_mb, "Memory threshold exceeded");
                }
            }
        })
    }

    /// Chooses the terminal status and persists counters and timing.
    /// Runs for every outcome, including cancellation.
    async fn finalize(
        &self,
        job_id: &str,
        file_name: &str,
        counters: &Arc<JobCounters>,
        started_at: DateTime<Utc>,
        result: Result<(), RunError>,
    ) -> RunOutcome {
        let finished_at = Utc::now();
        let snapshot = counters.snapshot();

        self.broadcaster.send(
            JobProgressEvent::new(job_id, file_name, JobPhase::Finalizing, "Writing final state")
                .with_counters(&snapshot),
        );
        let duration_ms = (finished_at - started_at).num_milliseconds().max(0);
        let seconds = duration_ms as f64 / 1000.0;
        let (lines_per_second, bytes_per_second) = if seconds > 0.0 {
            (
                snapshot.processed_lines as f64 / seconds,
                snapshot.processed_bytes as f64 / seconds,
            )
        } else {
            (0.0, 0.0)
        };

        let (status, error_message) = match &result {
            Ok(()) => (JobStatus::Done, None),
            Err(RunError::Cancelled) => {
                (JobStatus::Cancelled, Some("Job cancelled by user".to_string()))
            }
            // A failure observed while cancellation was in flight (for
            // example the aborted stream erroring out) is still a cancel.
            Err(_) if self.cancel.is_cancelled() => {
                (JobStatus::Cancelled, Some("Job cancelled by user".to_string()))
            }
            Err(e) => (JobStatus::Error, Some(e.to_string())),
        };

        let mut patch = JobPatch {
            status: Some(status),
            processed_lines: Some(snapshot.processed_lines),
            processed_bytes: Some(snapshot.processed_bytes),
            error_lines: Some(snapshot.error_lines),
            num_fragments: Some(snapshot.fragments_emitted),
            fragments_done: Some(snapshot.fragments_done),
            finished_at: Some(finished_at),
            heartbeat_at: Some(finished_at),
            total_duration_ms: Some(duration_ms),
            lines_per_second: Some(lines_per_second),
            bytes_per_second: Some(bytes_per_second),
            error_message: error_message.clone(),
            ..Default::default()
        };
        if status == JobStatus::Done {
            patch.total_lines = Some(snapshot.processed_lines);
            patch.validation_passed = Some(snapshot.error_lines == 0);
        }

        if let Err(first) = self.registry.update(job_id, patch.clone()).await {
            warn!(job_id, error = %first, "Terminal write failed, retrying once");
            if let Err(second) = self.registry.update(job_id, patch).await {
                error!(job_id, error = %second, "Terminal write failed twice, giving up");
            }
        }

        let phase = match status {
            JobStatus::Done => JobPhase::Completed,
            JobStatus::Cancelled => JobPhase::Cancelled,
            _ => JobPhase::Failed,
        };
        let message = error_message
            .clone()
            .unwrap_or_else(|| "Validation finished".to_string());
        let mut event = JobProgressEvent::new(job_id, file_name, phase, &message)
            .with_counters(&snapshot)
            .with_first_error(counters.first_error());
        if let Some(ref error) = error_message {
            event = event.with_error(error);
        }
        self.broadcaster.send(event);

        info!(
            job_id,
            status = %status,
            lines = snapshot.processed_lines,
            errors = snapshot.error_lines,
            duration_ms,
            "Job finished"
        );

        RunOutcome::Finished(status)
    }
}
