//! Typed gateway over the durable job registry.
//!
//! The core only ever talks to [`JobRegistry`]; the persistence technology
//! behind it is interchangeable. Two backends ship here: a SeaORM-backed
//! store and an in-memory store for embedding and tests.

pub mod entity;
pub mod memory;
pub mod migrations;
pub mod seaorm;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::RegistryError;

pub use memory::MemoryRegistry;
pub use seaorm::SeaOrmRegistry;

/// Durable job states. DONE, ERROR and CANCELLED are absorbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    New,
    Queued,
    Processing,
    Done,
    Error,
    Cancelled,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::New => "new",
            JobStatus::Queued => "queued",
            JobStatus::Processing => "processing",
            JobStatus::Done => "done",
            JobStatus::Error => "error",
            JobStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "new" => Some(JobStatus::New),
            "queued" => Some(JobStatus::Queued),
            "processing" => Some(JobStatus::Processing),
            "done" => Some(JobStatus::Done),
            "error" => Some(JobStatus::Error),
            "cancelled" => Some(JobStatus::Cancelled),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Error | JobStatus::Cancelled)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One durable job row.
#[derive(Debug, Clone)]
pub struct JobRecord {
    pub id: String,
    pub file_name: String,
    pub source_item_id: String,
    /// Source-reported size; 0 when unknown.
    pub total_bytes: u64,
    pub status: JobStatus,
    pub processed_lines: u64,
    pub processed_bytes: u64,
    pub error_lines: u64,
    /// Authoritative line count, set at completion.
    pub total_lines: Option<u64>,
    pub num_fragments: u64,
    pub fragments_done: u64,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub heartbeat_at: Option<DateTime<Utc>>,
    pub total_duration_ms: Option<i64>,
    pub lines_per_second: Option<f64>,
    pub bytes_per_second: Option<f64>,
    pub cancel_requested: bool,
    pub claimed_by: Option<String>,
    pub error_message: Option<String>,
    pub validation_passed: Option<bool>,
}

impl JobRecord {
    /// Fresh QUEUED row for a file, as the control plane creates them.
    pub fn new(file_name: &str, source_item_id: &str, total_bytes: u64) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            file_name: file_name.to_string(),
            source_item_id: source_item_id.to_string(),
            total_bytes,
            status: JobStatus::Queued,
            processed_lines: 0,
            processed_bytes: 0,
            error_lines: 0,
            total_lines: None,
            num_fragments: 0,
            fragments_done: 0,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
            heartbeat_at: None,
            total_duration_ms: None,
            lines_per_second: None,
            bytes_per_second: None,
            cancel_requested: false,
            claimed_by: None,
            error_message: None,
            validation_passed: None,
        }
    }
}

/// Partial update of a job row; `None` fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct JobPatch {
    pub status: Option<JobStatus>,
    pub processed_lines: Option<u64>,
    pub processed_bytes: Option<u64>,
    pub error_lines: Option<u64>,
    pub total_lines: Option<u64>,
    pub num_fragments: Option<u64>,
    pub fragments_done: Option<u64>,
    pub finished_at: Option<DateTime<Utc>>,
    pub heartbeat_at: Option<DateTime<Utc>>,
    pub total_duration_ms: Option<i64>,
    pub lines_per_second: Option<f64>,
    pub bytes_per_second: Option<f64>,
    pub cancel_requested: Option<bool>,
    pub error_message: Option<String>,
    pub validation_passed: Option<bool>,
}

impl JobPatch {
    /// Applies every set field onto a record. Both backends funnel their
    /// writes through this so partial-update semantics stay identical.
    pub fn apply_to(&self, record: &mut JobRecord) {
        if let Some(status) = self.status {
            record.status = status;
        }
        if let Some(value) = self.processed_lines {
            record.processed_lines = value;
        }
        if let Some(value) = self.processed_bytes {
            record.processed_bytes = value;
        }
        if let Some(value) = self.error_lines {
            record.error_lines = value;
        }
        if let Some(value) = self.total_lines {
            record.total_lines = Some(value);
        }
        if let Some(value) = self.num_fragments {
            record.num_fragments = value;
        }
        if let Some(value) = self.fragments_done {
            record.fragments_done = value;
        }
        if let Some(value) = self.finished_at {
            record.finished_at = Some(value);
        }
        if let Some(value) = self.heartbeat_at {
            record.heartbeat_at = Some(value);
        }
        if let Some(value) = self.total_duration_ms {
            record.total_duration_ms = Some(value);
        }
        if let Some(value) = self.lines_per_second {
            record.lines_per_second = Some(value);
        }
        if let Some(value) = self.bytes_per_second {
            record.bytes_per_second = Some(value);
        }
        if let Some(value) = self.cancel_requested {
            record.cancel_requested = value;
        }
        if let Some(ref value) = self.error_message {
            record.error_message = Some(value.clone());
        }
        if let Some(value) = self.validation_passed {
            record.validation_passed = Some(value);
        }
    }
}

/// The exact registry operations the core needs, nothing more.
#[async_trait]
pub trait JobRegistry: Send + Sync {
    async fn get(&self, job_id: &str) -> Result<Option<JobRecord>, RegistryError>;

    /// Jobs in `status`, oldest first by creation time.
    async fn list_by_status(
        &self,
        status: JobStatus,
        limit: u64,
    ) -> Result<Vec<JobRecord>, RegistryError>;

    async fn update(&self, job_id: &str, patch: JobPatch) -> Result<(), RegistryError>;

    /// Atomic QUEUED -> PROCESSING transition recording the owning
    /// instance. Returns false when another instance won the row.
    async fn claim(
        &self,
        job_id: &str,
        instance: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, RegistryError>;

    /// Used by the control plane, not by the core.
    async fn create(&self, record: JobRecord) -> Result<(), RegistryError>;

    /// Used by the control plane, not by the core.
    async fn delete(&self, job_id: &str) -> Result<(), RegistryError>;
}
