//! Job entity for persistent storage.

use sea_orm::entity::prelude::*;

use super::{JobRecord, JobStatus};

/// Job row model.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "jobs")]
pub struct Model {
    /// Unique job identifier (UUID).
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub file_name: String,
    pub source_item_id: String,
    pub total_bytes: i64,
    /// Job status: new, queued, processing, done, error, cancelled.
    #[sea_orm(default_value = "queued")]
    pub status: String,
    pub processed_lines: i64,
    pub processed_bytes: i64,
    pub error_lines: i64,
    pub total_lines: Option<i64>,
    pub num_fragments: i64,
    pub fragments_done: i64,
    pub created_at: DateTimeUtc,
    pub started_at: Option<DateTimeUtc>,
    pub finished_at: Option<DateTimeUtc>,
    pub heartbeat_at: Option<DateTimeUtc>,
    pub total_duration_ms: Option<i64>,
    pub lines_per_second: Option<f64>,
    pub bytes_per_second: Option<f64>,
    pub cancel_requested: bool,
    /// Instance identity of the owning runner.
    pub claimed_by: Option<String>,
    pub error_message: Option<String>,
    pub validation_passed: Option<bool>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub fn into_record(self) -> JobRecord {
        let status = JobStatus::parse(&self.status).unwrap_or_else(|| {
            log::warn!("Unknown job status '{}' for job {}", self.status, self.id);
            JobStatus::Error
        });

        JobRecord {
            id: self.id,
            file_name: self.file_name,
            source_item_id: self.source_item_id,
            total_bytes: self.total_bytes.max(0) as u64,
            status,
            processed_lines: self.processed_lines.max(0) as u64,
            processed_bytes: self.processed_bytes.max(0) as u64,
            error_lines: self.error_lines.max(0) as u64,
            total_lines: self.total_lines.map(|v| v.max(0) as u64),
            num_fragments: self.num_fragments.max(0) as u64,
            fragments_done: self.fragments_done.max(0) as u64,
            created_at: self.created_at,
            started_at: self.started_at,
            finished_at: self.finished_at,
            heartbeat_at: self.heartbeat_at,
            total_duration_ms: self.total_duration_ms,
            lines_per_second: self.lines_per_second,
            bytes_per_second: self.bytes_per_second,
            cancel_requested: self.cancel_requested,
            claimed_by: self.claimed_by,
            error_message: self.error_message,
            validation_passed: self.validation_passed,
        }
    }
}

impl From<JobRecord> for Model {
    fn from(record: JobRecord) -> Self {
        Self {
            id: record.id,
            file_name: record.file_name,
            source_item_id: record.source_item_id,
            total_bytes: record.total_bytes as i64,
            status: record.status.as_str().to_string(),
            processed_lines: record.processed_lines as i64,
            processed_bytes: record.processed_bytes as i64,
            error_lines: record.error_lines as i64,
            total_lines: record.total_lines.map(|v| v as i64),
            num_fragments: record.num_fragments as i64,
            fragments_done: record.fragments_done as i64,
            created_at: record.created_at,
            started_at: record.started_at,
            finished_at: record.finished_at,
            heartbeat_at: record.heartbeat_at,
            total_duration_ms: record.total_duration_ms,
            lines_per_second: record.lines_per_second,
            bytes_per_second: record.bytes_per_second,
            cancel_requested: record.cancel_requested,
            claimed_by: record.claimed_by,
            error_message: record.error_message,
            validation_passed: record.validation_passed,
        }
    }
}
