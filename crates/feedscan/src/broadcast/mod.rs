//! Job progress broadcasting for real-time status streaming.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::fragment::FirstError;
use crate::runner::counters::CounterSnapshot;

/// Phase of job processing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobPhase {
    Queued,
    Claimed,
    Streaming,
    Finalizing,
    Completed,
    Failed,
    Cancelled,
}

impl std::fmt::Display for JobPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobPhase::Queued => write!(f, "Queued"),
            JobPhase::Claimed => write!(f, "Claimed"),
            JobPhase::Streaming => write!(f, "Streaming"),
            JobPhase::Finalizing => write!(f, "Finalizing"),
            JobPhase::Completed => write!(f, "Completed"),
            JobPhase::Failed => write!(f, "Failed"),
            JobPhase::Cancelled => write!(f, "Cancelled"),
        }
    }
}

/// Progress event for a job.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobProgressEvent {
    pub job_id: String,
    pub file_name: String,
    pub phase: JobPhase,
    pub processed_lines: u64,
    pub processed_bytes: u64,
    pub error_lines: u64,
    pub num_fragments: u64,
    pub fragments_done: u64,
    /// Human-readable message describing current activity.
    pub message: String,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Sample of the first rejected line, if any was captured.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_error: Option<FirstError>,
}

impl JobProgressEvent {
    pub fn new(job_id: &str, file_name: &str, phase: JobPhase, message: &str) -> Self {
        Self {
            job_id: job_id.to_string(),
            file_name: file_name.to_string(),
            phase,
            processed_lines: 0,
            processed_bytes: 0,
            error_lines: 0,
            num_fragments: 0,
            fragments_done: 0,
            message: message.to_string(),
            timestamp: Utc::now(),
            error: None,
            first_error: None,
        }
    }

    pub fn with_counters(mut self, counters: &CounterSnapshot) -> Self {
        self.processed_lines = counters.processed_lines;
        self.processed_bytes = counters.processed_bytes;
        self.error_lines = counters.error_lines;
        self.num_fragments = counters.fragments_emitted;
        self.fragments_done = counters.fragments_done;
        self
    }

    pub fn with_error(mut self, error: &str) -> Self {
        self.error = Some(error.to_string());
        self
    }

    pub fn with_first_error(mut self, first_error: Option<FirstError>) -> Self {
        self.first_error = first_error;
        self
    }
}

/// Broadcasts job progress events to any number of subscribers.
#[derive(Clone)]
pub struct JobProgressBroadcaster {
    sender: Arc<broadcast::Sender<JobProgressEvent>>,
}

impl JobProgressBroadcaster {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Sends an event to all subscribers. No active receivers is fine.
    pub fn send(&self, event: JobProgressEvent) {
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobProgressEvent> {
        self.sender.subscribe()
    }
}

impl Default for JobProgressBroadcaster {
    fn default() -> Self {
        Self::new(100)
    }
}
