use bytes::Bytes;
use serde::Serialize;
use uuid::Uuid;

use super::model::{JobState, JobStatus};
use crate::processing::TransformOptions;

/// Raw upload handed over by the HTTP layer.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub data: Bytes,
    /// Client-side file name; only its extension is used.
    pub file_name: String,
    pub options: TransformOptions,
    pub owner_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct UploadResponse {
    pub job_id: Uuid,
    pub source_key: String,
    pub source_url: String,
    pub width: u32,
    pub height: u32,
    pub status: JobStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusResponse {
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_url: Option<String>,
}

impl From<JobState> for StatusResponse {
    fn from(state: JobState) -> Self {
        Self {
            status: state.status,
            result_url: state.result_url.filter(|url| !url.is_empty()),
        }
    }
}
