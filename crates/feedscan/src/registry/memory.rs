//! In-memory registry backend for embedding and tests.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{JobPatch, JobRecord, JobRegistry, JobStatus};
use crate::error::RegistryError;

/// HashMap-backed registry. The write lock gives claims the same
/// winner-takes-all behavior as the conditional update in the database
/// backend.
#[derive(Default)]
pub struct MemoryRegistry {
    rows: RwLock<HashMap<String, JobRecord>>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, JobRecord>> {
        match self.rows.read() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!("Registry lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, JobRecord>> {
        match self.rows.write() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!("Registry lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }
}

#[async_trait]
impl JobRegistry for MemoryRegistry {
    async fn get(&self, job_id: &str) -> Result<Option<JobRecord>, RegistryError> {
        Ok(self.read().get(job_id).cloned())
    }

    async fn list_by_status(
        &self,
        status: JobStatus,
        limit: u64,
    ) -> Result<Vec<JobRecord>, RegistryError> {
        let mut matching: Vec<JobRecord> = self
            .read()
            .values()
            .filter(|r| r.status == status)
            .cloned()
            .collect();
        matching.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        matching.truncate(limit as usize);
        Ok(matching)
    }

    async fn update(&self, job_id: &str, patch: JobPatch) -> Result<(), RegistryError> {
        let mut rows = self.write();
        let record = rows
            .get_mut(job_id)
            .ok_or_else(|| RegistryError::NotFound(job_id.to_string()))?;
        patch.apply_to(record);
        Ok(())
    }

    async fn claim(
        &self,
        job_id: &str,
        instance: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, RegistryError> {
        let mut rows = self.write();
        let Some(record) = rows.get_mut(job_id) else {
            return Ok(false);
        };
        if record.status != JobStatus::Queued {
            return Ok(false);
        }
        record.status = JobStatus::Processing;
        record.started_at = Some(now);
        record.heartbeat_at = Some(now);
        record.claimed_by = Some(instance.to_string());
        Ok(true)
    }

    async fn create(&self, record: JobRecord) -> Result<(), RegistryError> {
        self.write().insert(record.id.clone(), record);
        Ok(())
    }

    async fn delete(&self, job_id: &str) -> Result<(), RegistryError> {
        self.write().remove(job_id);
        Ok(())
    }
}
