use std::io::Cursor;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use image::ImageReader;
use time::OffsetDateTime;
use tracing::{error, info};
use uuid::Uuid;

use super::dto::{StatusResponse, UploadRequest, UploadResponse};
use super::events::JobDescriptor;
use super::model::{JobRecord, JobStatus, NewJobRecord};
use crate::state::AppState;

pub struct ImageService;

impl ImageService {
    /// Storage key for a new original: `originals/img_<unix nanos><.ext>`.
    fn original_key(file_name: &str) -> String {
        let ext = Path::new(file_name)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| format!(".{}", e.to_ascii_lowercase()))
            .unwrap_or_default();
        format!("originals/img_{}{}", OffsetDateTime::now_utc().unix_timestamp_nanos(), ext)
    }

    /// Dimensions as stored on the record. Rejects images too large for the
    /// column type rather than truncating.
    fn record_dimensions(width: u32, height: u32) -> Result<(i32, i32)> {
        let width = i32::try_from(width).with_context(|| format!("Image width {} out of range", width))?;
        let height = i32::try_from(height).with_context(|| format!("Image height {} out of range", height))?;
        Ok((width, height))
    }

    /// Stores the original, records it as `pending` and queues the transform.
    ///
    /// Returns before any pixel work happens.
    pub async fn upload(state: &AppState, req: UploadRequest) -> Result<UploadResponse> {
        let reader = ImageReader::new(Cursor::new(&req.data[..]))
            .with_guessed_format()
            .context("Failed to read upload")?;
        let format = reader
            .format()
            .ok_or_else(|| anyhow!("Unsupported image format"))?;
        let (width, height) = reader.into_dimensions().context("Failed to decode image")?;
        let content_type = format.to_mime_type();
        let (record_width, record_height) = Self::record_dimensions(width, height)?;
        let size = i64::try_from(req.data.len()).context("Upload size out of range")?;

        let source_key = Self::original_key(&req.file_name);
        let source_url = state
            .storage
            .put(&source_key, req.data, Some(content_type))
            .await
            .context("Failed to store original image")?;

        let job_id = state
            .jobs
            .create(NewJobRecord {
                owner_id: req.owner_id.clone(),
                file_name: req.file_name,
                source_key: source_key.clone(),
                source_url: source_url.clone(),
                size,
                content_type: content_type.to_string(),
                width: record_width,
                height: record_height,
            })
            .await?;

        let descriptor = JobDescriptor::process(source_key.clone(), req.options, job_id, req.owner_id);
        let enqueued = match descriptor.encode() {
            Ok(payload) => state.queue.enqueue(&payload).await.map_err(anyhow::Error::from),
            Err(e) => Err(e.into()),
        };

        if let Err(e) = enqueued {
            error!(job_id = %job_id, error = %e, "Failed to queue processing task");
            if let Err(e) = state.jobs.update_status(job_id, JobStatus::Failed, None).await {
                error!(job_id = %job_id, error = %e, "Failed to mark unqueued job as failed");
            }
            return Err(e.context("Failed to queue processing task"));
        }

        info!(job_id = %job_id, key = %source_key, width, height, "📦 Image queued for processing");

        Ok(UploadResponse {
            job_id,
            source_key,
            source_url,
            width,
            height,
            status: JobStatus::Pending,
        })
    }

    pub async fn get_status(state: &AppState, id: Uuid) -> Result<StatusResponse> {
        state
            .jobs
            .get_status(id)
            .await?
            .map(StatusResponse::from)
            .ok_or_else(|| anyhow!("Image not found"))
    }

    pub async fn list_images(state: &AppState, owner_id: &str) -> Result<Vec<JobRecord>> {
        state.jobs.list_by_owner(owner_id).await
    }

    pub async fn delete_image(state: &AppState, id: Uuid, owner_id: &str) -> Result<()> {
        if !state.jobs.delete(id, owner_id).await? {
            return Err(anyhow!("Image not found or does not belong to the user"));
        }
        Ok(())
    }
}
