use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use super::model::{JobRecord, JobState, JobStatus, NewJobRecord};
use crate::infrastructure::db::pool::DbPool;

/// Persistence for per-image job records.
///
/// Status writes are unconditional (last writer wins); a redelivered job
/// simply overwrites the terminal state with an equivalent one.
#[async_trait]
pub trait JobRecordStore: Send + Sync {
    /// Inserts a `pending` record and returns its id.
    async fn create(&self, record: NewJobRecord) -> Result<Uuid>;

    async fn update_status(&self, id: Uuid, status: JobStatus, result_url: Option<&str>) -> Result<()>;

    async fn get_status(&self, id: Uuid) -> Result<Option<JobState>>;

    async fn get(&self, id: Uuid) -> Result<Option<JobRecord>>;

    /// Newest first.
    async fn list_by_owner(&self, owner_id: &str) -> Result<Vec<JobRecord>>;

    /// Returns `false` when no record with that id belongs to `owner_id`.
    async fn delete(&self, id: Uuid, owner_id: &str) -> Result<bool>;
}

const RECORD_COLUMNS: &str = "id, owner_id, file_name, source_key, source_url, size, content_type, \
                              width, height, status, result_url, created_at";

#[derive(Clone)]
pub struct ImageRepository {
    pool: DbPool,
}

impl ImageRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobRecordStore for ImageRepository {
    async fn create(&self, record: NewJobRecord) -> Result<Uuid> {
        let id = Uuid::new_v4();

        sqlx::query(
            r#"
            INSERT INTO images (id, owner_id, file_name, source_key, source_url, size, content_type, width, height, status)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(id)
        .bind(&record.owner_id)
        .bind(&record.file_name)
        .bind(&record.source_key)
        .bind(&record.source_url)
        .bind(record.size)
        .bind(&record.content_type)
        .bind(record.width)
        .bind(record.height)
        .bind(JobStatus::Pending.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| anyhow!("Failed to create image record: {}", e))?;

        Ok(id)
    }

    async fn update_status(&self, id: Uuid, status: JobStatus, result_url: Option<&str>) -> Result<()> {
        let result = sqlx::query("UPDATE images SET status = $1, result_url = $2, updated_at = NOW() WHERE id = $3")
            .bind(status.as_str())
            .bind(result_url)
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(anyhow!("Image {} not found", id));
        }

        Ok(())
    }

    async fn get_status(&self, id: Uuid) -> Result<Option<JobState>> {
        let row: Option<(String, Option<String>)> =
            sqlx::query_as("SELECT status, result_url FROM images WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        row.map(|(status, result_url)| -> Result<JobState> {
            Ok(JobState {
                status: status.parse()?,
                result_url,
            })
        })
        .transpose()
    }

    async fn get(&self, id: Uuid) -> Result<Option<JobRecord>> {
        let record = sqlx::query_as::<_, JobRecord>(&format!("SELECT {} FROM images WHERE id = $1", RECORD_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(record)
    }

    async fn list_by_owner(&self, owner_id: &str) -> Result<Vec<JobRecord>> {
        let records = sqlx::query_as::<_, JobRecord>(&format!(
            "SELECT {} FROM images WHERE owner_id = $1 ORDER BY created_at DESC",
            RECORD_COLUMNS
        ))
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| anyhow!("Failed to fetch images: {}", e))?;
        Ok(records)
    }

    async fn delete(&self, id: Uuid, owner_id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM images WHERE id = $1 AND owner_id = $2")
            .bind(id)
            .bind(owner_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

/// In-process record store. Keeps every status write so tests can assert on
/// the full transition sequence.
#[derive(Default)]
pub struct MemoryJobStore {
    records: Mutex<HashMap<Uuid, JobRecord>>,
    history: Mutex<HashMap<Uuid, Vec<JobStatus>>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every status the record has been written with, oldest first.
    pub fn history(&self, id: Uuid) -> Vec<JobStatus> {
        self.history
            .lock()
            .ok()
            .and_then(|h| h.get(&id).cloned())
            .unwrap_or_default()
    }

    /// Number of status writes across all records, including creation.
    pub fn write_count(&self) -> usize {
        self.history
            .lock()
            .map(|h| h.values().map(Vec::len).sum())
            .unwrap_or(0)
    }

    fn record_transition(&self, id: Uuid, status: JobStatus) -> Result<()> {
        self.history
            .lock()
            .map_err(|_| anyhow!("history lock poisoned"))?
            .entry(id)
            .or_default()
            .push(status);
        Ok(())
    }
}

#[async_trait]
impl JobRecordStore for MemoryJobStore {
    async fn create(&self, record: NewJobRecord) -> Result<Uuid> {
        let id = Uuid::new_v4();
        let row = JobRecord {
            id,
            owner_id: record.owner_id,
            file_name: record.file_name,
            source_key: record.source_key,
            source_url: record.source_url,
            size: record.size,
            content_type: record.content_type,
            width: record.width,
            height: record.height,
            status: JobStatus::Pending,
            result_url: None,
            created_at: OffsetDateTime::now_utc(),
        };
        self.records
            .lock()
            .map_err(|_| anyhow!("records lock poisoned"))?
            .insert(id, row);
        self.record_transition(id, JobStatus::Pending)?;
        Ok(id)
    }

    async fn update_status(&self, id: Uuid, status: JobStatus, result_url: Option<&str>) -> Result<()> {
        {
            let mut records = self.records.lock().map_err(|_| anyhow!("records lock poisoned"))?;
            let record = records.get_mut(&id).ok_or_else(|| anyhow!("Image {} not found", id))?;
            record.status = status;
            record.result_url = result_url.map(str::to_string);
        }
        self.record_transition(id, status)
    }

    async fn get_status(&self, id: Uuid) -> Result<Option<JobState>> {
        Ok(self.get(id).await?.map(|r| JobState {
            status: r.status,
            result_url: r.result_url,
        }))
    }

    async fn get(&self, id: Uuid) -> Result<Option<JobRecord>> {
        let records = self.records.lock().map_err(|_| anyhow!("records lock poisoned"))?;
        Ok(records.get(&id).cloned())
    }

    async fn list_by_owner(&self, owner_id: &str) -> Result<Vec<JobRecord>> {
        let records = self.records.lock().map_err(|_| anyhow!("records lock poisoned"))?;
        let mut owned: Vec<JobRecord> = records.values().filter(|r| r.owner_id == owner_id).cloned().collect();
        owned.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(owned)
    }

    async fn delete(&self, id: Uuid, owner_id: &str) -> Result<bool> {
        let mut records = self.records.lock().map_err(|_| anyhow!("records lock poisoned"))?;
        match records.get(&id) {
            Some(r) if r.owner_id == owner_id => {
                records.remove(&id);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
