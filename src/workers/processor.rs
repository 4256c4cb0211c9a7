use std::time::Duration;

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::config::settings::WorkerConfig;
use crate::infrastructure::storage::StorageError;
use crate::modules::image::events::JobDescriptor;
use crate::modules::image::model::JobStatus;
use crate::processing::{self, TransformError};
use crate::state::AppState;

#[derive(Debug, Error)]
pub enum JobError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Transform(#[from] TransformError),

    #[error("transform task aborted: {0}")]
    Aborted(String),
}

/// Storage key for the processed copy of `source_key`.
///
/// Deterministic, so a redelivered job overwrites its earlier result.
pub fn result_key(source_key: &str) -> String {
    let stem = match source_key.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.contains('/') => stem,
        _ => source_key,
    };
    format!("processed/{}.jpg", stem)
}

/// Single consumer of the image task queue.
pub struct ImageWorker {
    state: AppState,
    config: WorkerConfig,
}

impl ImageWorker {
    pub fn new(state: AppState, config: WorkerConfig) -> Self {
        Self { state, config }
    }

    /// Polls until `cancel` fires. Cancellation is checked between
    /// iterations; a job that has started always reaches a terminal status.
    pub async fn run(&self, cancel: CancellationToken) {
        info!("🖼️ Starting image worker");
        let mut logged_empty = false;

        while !cancel.is_cancelled() {
            match self.state.queue.dequeue().await {
                Ok(Some(raw)) => {
                    logged_empty = false;
                    self.handle_message(&raw).await;
                }
                Ok(None) => {
                    if !logged_empty {
                        info!("Queue is empty. Waiting for tasks...");
                        logged_empty = true;
                    }
                    Self::backoff(&cancel, self.config.idle_backoff).await;
                }
                Err(e) => {
                    error!(error = %e, "Error dequeuing task");
                    Self::backoff(&cancel, self.config.error_backoff).await;
                }
            }
        }

        info!("Image worker stopped");
    }

    async fn backoff(cancel: &CancellationToken, duration: Duration) {
        tokio::select! {
            _ = cancel.cancelled() => {}
            _ = tokio::time::sleep(duration) => {}
        }
    }

    /// Decodes and executes one queue message.
    ///
    /// Returns the terminal status written, or `None` when the message was
    /// malformed and named no job, so it was dropped without touching any
    /// record. A malformed message that still carries a job id fails that job.
    pub async fn handle_message(&self, raw: &str) -> Option<JobStatus> {
        let job = match JobDescriptor::decode(raw) {
            Ok(job) => job,
            Err(e) => {
                debug!(payload = raw, "Malformed task payload");
                let Some(job_id) = JobDescriptor::recover_job_id(raw) else {
                    warn!(error = %e, "Dropping malformed task");
                    return None;
                };

                warn!(error = %e, job_id = %job_id, "Malformed task, marking job as failed");
                if let Err(e) = self.state.jobs.update_status(job_id, JobStatus::Failed, None).await {
                    error!(error = %e, job_id = %job_id, "Failed to record terminal status");
                }
                return Some(JobStatus::Failed);
            }
        };

        let span = info_span!("job", job_id = %job.job_id, owner_id = %job.owner_id);
        Some(self.handle_job(&job).instrument(span).await)
    }

    async fn handle_job(&self, job: &JobDescriptor) -> JobStatus {
        let jobs = &self.state.jobs;
        info!(key = %job.source_key, "📦 Received image job");

        if let Err(e) = jobs.update_status(job.job_id, JobStatus::Processing, None).await {
            warn!(error = %e, "Failed to mark job as processing");
        }

        let (status, result_url) = match self.execute(job).await {
            Ok(url) => {
                info!(url = %url, "✅ Job completed");
                (JobStatus::Completed, Some(url))
            }
            Err(e) => {
                error!(error = %e, "❌ Job failed");
                (JobStatus::Failed, None)
            }
        };

        if let Err(e) = jobs.update_status(job.job_id, status, result_url.as_deref()).await {
            error!(error = %e, status = %status, "Failed to record terminal status");
        }

        status
    }

    async fn execute(&self, job: &JobDescriptor) -> Result<String, JobError> {
        let source = self.state.storage.get(&job.source_key).await?;
        debug!(size = source.len(), "Downloaded original");

        let options = job.options.clone();
        let processed = tokio::task::spawn_blocking(move || processing::process(&source, &options))
            .await
            .map_err(|e| JobError::Aborted(e.to_string()))??;

        let key = result_key(&job.source_key);
        let url = self
            .state
            .storage
            .put(&key, processed.data, Some(mime::IMAGE_JPEG.essence_str()))
            .await?;

        debug!(key = %key, width = processed.width, height = processed.height, "Uploaded processed image");
        Ok(url)
    }
}
