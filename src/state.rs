use std::sync::Arc;

use crate::infrastructure::queue::TaskQueue;
use crate::infrastructure::storage::BlobStore;
use crate::modules::image::repository::JobRecordStore;

/// Service handles built once by the entry point and shared by the upload
/// path and the worker.
#[derive(Clone)]
pub struct AppState {
    pub jobs: Arc<dyn JobRecordStore>,
    pub queue: Arc<dyn TaskQueue>,
    pub storage: Arc<dyn BlobStore>,
}

impl AppState {
    pub fn new(jobs: Arc<dyn JobRecordStore>, queue: Arc<dyn TaskQueue>, storage: Arc<dyn BlobStore>) -> Self {
        Self {
            jobs,
            queue,
            storage,
        }
    }
}
