use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use image::{DynamicImage, GenericImageView, ImageFormat, Rgba, RgbaImage};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use image_processor::config::settings::WorkerConfig;
use image_processor::infrastructure::queue::{MemoryQueue, TaskQueue};
use image_processor::infrastructure::storage::{BlobStore, MemoryBlobStore};
use image_processor::modules::image::dto::{StatusResponse, UploadRequest};
use image_processor::modules::image::events::JobDescriptor;
use image_processor::modules::image::model::{JobStatus, NewJobRecord};
use image_processor::modules::image::repository::{JobRecordStore, MemoryJobStore};
use image_processor::modules::image::service::ImageService;
use image_processor::processing::{ResizeOptions, TransformOptions};
use image_processor::state::AppState;
use image_processor::workers::processor::{result_key, ImageWorker};

struct Harness {
    state: AppState,
    queue: Arc<MemoryQueue>,
    blobs: Arc<MemoryBlobStore>,
    jobs: Arc<MemoryJobStore>,
}

fn harness() -> Harness {
    let queue = Arc::new(MemoryQueue::new());
    let blobs = Arc::new(MemoryBlobStore::new());
    let jobs = Arc::new(MemoryJobStore::new());
    let state = AppState::new(jobs.clone(), queue.clone(), blobs.clone());
    Harness {
        state,
        queue,
        blobs,
        jobs,
    }
}

fn fast_config() -> WorkerConfig {
    WorkerConfig {
        idle_backoff: Duration::from_millis(10),
        error_backoff: Duration::from_millis(10),
    }
}

fn png(width: u32, height: u32) -> Bytes {
    let img = DynamicImage::ImageRgba8(RgbaImage::from_fn(width, height, |x, y| {
        Rgba([(x % 256) as u8, (y % 256) as u8, 90, 255])
    }));
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, ImageFormat::Png).unwrap();
    Bytes::from(buf.into_inner())
}

fn resize_to(width: i64) -> TransformOptions {
    TransformOptions {
        resize: Some(ResizeOptions { width: Some(width) }),
        ..Default::default()
    }
}

async fn upload(h: &Harness, data: Bytes, options: TransformOptions) -> Uuid {
    let response = ImageService::upload(
        &h.state,
        UploadRequest {
            data,
            file_name: "photo.png".to_string(),
            options,
            owner_id: "user-1".to_string(),
        },
    )
    .await
    .unwrap();
    assert_eq!(response.status, JobStatus::Pending);
    response.job_id
}

async fn wait_for_terminal(state: &AppState, id: Uuid) -> StatusResponse {
    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            let status = ImageService::get_status(state, id).await.unwrap();
            if status.status.is_terminal() {
                return status;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("job never reached a terminal status")
}

async fn process_next(h: &Harness) -> Option<JobStatus> {
    let raw = h.queue.dequeue().await.unwrap().expect("queue should not be empty");
    ImageWorker::new(h.state.clone(), fast_config()).handle_message(&raw).await
}

#[tokio::test]
async fn upload_is_acknowledged_before_processing() {
    let h = harness();
    let response = ImageService::upload(
        &h.state,
        UploadRequest {
            data: png(1000, 500),
            file_name: "photo.PNG".to_string(),
            options: resize_to(500),
            owner_id: "user-1".to_string(),
        },
    )
    .await
    .unwrap();

    assert_eq!((response.width, response.height), (1000, 500));
    assert!(response.source_key.starts_with("originals/img_"));
    assert!(response.source_key.ends_with(".png"));
    assert_eq!(response.source_url, format!("memory://{}", response.source_key));
    assert_eq!(h.blobs.object(&response.source_key).unwrap().content_type, "image/png");
    assert_eq!(h.queue.len(), 1);

    let status = ImageService::get_status(&h.state, response.job_id).await.unwrap();
    assert_eq!(status, StatusResponse { status: JobStatus::Pending, result_url: None });
}

#[tokio::test]
async fn worker_resizes_and_completes_job() {
    let h = harness();
    let id = upload(&h, png(1000, 500), resize_to(500)).await;

    let cancel = CancellationToken::new();
    let worker = ImageWorker::new(h.state.clone(), fast_config());
    let handle = tokio::spawn({
        let cancel = cancel.clone();
        async move { worker.run(cancel).await }
    });

    let status = wait_for_terminal(&h.state, id).await;
    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(5), handle).await.unwrap().unwrap();

    assert_eq!(status.status, JobStatus::Completed);
    let url = status.result_url.expect("completed job must carry a result url");
    assert!(!url.is_empty());
    assert_eq!(
        h.jobs.history(id),
        vec![JobStatus::Pending, JobStatus::Processing, JobStatus::Completed]
    );

    let record = h.jobs.get(id).await.unwrap().unwrap();
    let stored = h.blobs.object(&result_key(&record.source_key)).unwrap();
    assert_eq!(stored.content_type, "image/jpeg");
    let output = image::load_from_memory(&stored.data).unwrap();
    assert_eq!(output.dimensions(), (500, 250));
}

#[tokio::test]
async fn invalid_tint_is_skipped_and_job_completes() {
    let h = harness();
    let options = TransformOptions {
        tint: Some("blue".to_string()),
        ..Default::default()
    };
    let id = upload(&h, png(40, 30), options).await;

    assert_eq!(process_next(&h).await, Some(JobStatus::Completed));
    let status = ImageService::get_status(&h.state, id).await.unwrap();
    assert_eq!(status.status, JobStatus::Completed);
    assert!(status.result_url.is_some());
}

#[tokio::test]
async fn blob_fetch_failure_marks_job_failed() {
    let h = harness();
    let id = upload(&h, png(40, 30), resize_to(20)).await;
    h.blobs.fail_gets(true);

    assert_eq!(process_next(&h).await, Some(JobStatus::Failed));
    let status = ImageService::get_status(&h.state, id).await.unwrap();
    assert_eq!(status, StatusResponse { status: JobStatus::Failed, result_url: None });
    assert_eq!(
        h.jobs.history(id),
        vec![JobStatus::Pending, JobStatus::Processing, JobStatus::Failed]
    );
}

#[tokio::test]
async fn undecodable_source_marks_job_failed() {
    let h = harness();
    let id = pending_record(&h, "originals/bad.png").await;
    h.blobs
        .put("originals/bad.png", Bytes::from_static(b"bad"), None)
        .await
        .unwrap();

    let raw = JobDescriptor::process("originals/bad.png", TransformOptions::default(), id, "user-1")
        .encode()
        .unwrap();
    h.queue.enqueue(&raw).await.unwrap();

    assert_eq!(process_next(&h).await, Some(JobStatus::Failed));
    let status = ImageService::get_status(&h.state, id).await.unwrap();
    assert_eq!(status, StatusResponse { status: JobStatus::Failed, result_url: None });
}

#[tokio::test]
async fn malformed_descriptor_is_dropped_without_status_writes() {
    let h = harness();
    let worker = ImageWorker::new(h.state.clone(), fast_config());

    assert_eq!(worker.handle_message("process:originals/img_1.png:no-json-here:user-1").await, None);
    assert_eq!(worker.handle_message("").await, None);
    assert_eq!(worker.handle_message(r#"{"v":1,"command":"PROCESS"}"#).await, None);
    assert_eq!(h.jobs.write_count(), 0);
}

async fn pending_record(h: &Harness, source_key: &str) -> Uuid {
    h.jobs
        .create(NewJobRecord {
            owner_id: "user-1".into(),
            file_name: "x.png".into(),
            source_key: source_key.into(),
            source_url: format!("memory://{source_key}"),
            size: 3,
            content_type: "image/png".into(),
            width: 1,
            height: 1,
        })
        .await
        .unwrap()
}

#[tokio::test]
async fn unparseable_options_fail_the_named_job() {
    let h = harness();
    let worker = ImageWorker::new(h.state.clone(), fast_config());

    let id = pending_record(&h, "originals/a.png").await;
    let raw = format!(
        r#"{{"v":1,"command":"PROCESS","source_key":"originals/a.png","options":{{"resize":{{"width":"wide"}}}},"job_id":"{id}","owner_id":"user-1"}}"#
    );
    assert_eq!(worker.handle_message(&raw).await, Some(JobStatus::Failed));
    assert_eq!(h.jobs.history(id), vec![JobStatus::Pending, JobStatus::Failed]);

    let legacy = pending_record(&h, "originals/b.png").await;
    let raw = format!(r#"process:originals/b.png:{{"jobID":"{legacy}","crop":"top"}}:user-1"#);
    assert_eq!(worker.handle_message(&raw).await, Some(JobStatus::Failed));
    let status = ImageService::get_status(&h.state, legacy).await.unwrap();
    assert_eq!(status, StatusResponse { status: JobStatus::Failed, result_url: None });
}

#[tokio::test]
async fn non_string_tint_is_skipped_and_job_completes() {
    let h = harness();
    let id = upload(&h, png(40, 30), TransformOptions::default()).await;
    let record = h.jobs.get(id).await.unwrap().unwrap();
    h.queue.dequeue().await.unwrap().unwrap();
    let raw = format!(
        r#"{{"v":1,"command":"PROCESS","source_key":"{}","options":{{"tint":123}},"job_id":"{id}","owner_id":"user-1"}}"#,
        record.source_key
    );
    h.queue.enqueue(&raw).await.unwrap();

    assert_eq!(process_next(&h).await, Some(JobStatus::Completed));
    let stored = h.blobs.object(&result_key(&record.source_key)).unwrap();
    assert_eq!(image::load_from_memory(&stored.data).unwrap().dimensions(), (40, 30));
}

#[tokio::test]
async fn worker_survives_malformed_messages_and_transport_errors() {
    let h = harness();
    h.queue.enqueue("garbage without braces").await.unwrap();
    let id = upload(&h, png(64, 32), resize_to(32)).await;
    h.queue.fail_next(3);

    let cancel = CancellationToken::new();
    let worker = ImageWorker::new(h.state.clone(), fast_config());
    let handle = tokio::spawn({
        let cancel = cancel.clone();
        async move { worker.run(cancel).await }
    });

    let status = wait_for_terminal(&h.state, id).await;
    assert_eq!(status.status, JobStatus::Completed);

    // Still polling after the job: empty queue does not end the loop.
    let polls = h.queue.polls();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(h.queue.polls() > polls);
    assert!(!handle.is_finished());

    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(5), handle).await.unwrap().unwrap();
}

#[tokio::test]
async fn cancellation_interrupts_idle_backoff() {
    let h = harness();
    let config = WorkerConfig {
        idle_backoff: Duration::from_secs(3600),
        error_backoff: Duration::from_secs(3600),
    };
    let cancel = CancellationToken::new();
    let worker = ImageWorker::new(h.state.clone(), config);
    let handle = tokio::spawn({
        let cancel = cancel.clone();
        async move { worker.run(cancel).await }
    });

    tokio::time::sleep(Duration::from_millis(50)).await;
    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(5), handle).await.unwrap().unwrap();
    assert_eq!(h.queue.polls(), 1);
}

#[tokio::test]
async fn redelivered_job_converges_to_same_result() {
    let h = harness();
    let id = upload(&h, png(80, 40), resize_to(40)).await;
    let raw = h.queue.dequeue().await.unwrap().unwrap();
    let worker = ImageWorker::new(h.state.clone(), fast_config());

    assert_eq!(worker.handle_message(&raw).await, Some(JobStatus::Completed));
    let first = ImageService::get_status(&h.state, id).await.unwrap();
    let blobs_after_first = h.blobs.len();

    assert_eq!(worker.handle_message(&raw).await, Some(JobStatus::Completed));
    let second = ImageService::get_status(&h.state, id).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(h.blobs.len(), blobs_after_first);
}

#[tokio::test]
async fn legacy_colon_message_is_processed() {
    let h = harness();
    let id = upload(&h, png(100, 50), TransformOptions::default()).await;
    let record = h.jobs.get(id).await.unwrap().unwrap();
    // Replace the queued envelope with the older colon form.
    h.queue.dequeue().await.unwrap().unwrap();
    let raw = format!(
        r#"process:{}:{{"jobID":"{}","resize":{{"width":10}}}}:user-1"#,
        record.source_key, id
    );
    h.queue.enqueue(&raw).await.unwrap();

    assert_eq!(process_next(&h).await, Some(JobStatus::Completed));
    let stored = h.blobs.object(&result_key(&record.source_key)).unwrap();
    assert_eq!(image::load_from_memory(&stored.data).unwrap().dimensions(), (10, 5));
}

#[tokio::test]
async fn undecodable_upload_is_rejected_before_anything_is_stored() {
    let h = harness();
    let result = ImageService::upload(
        &h.state,
        UploadRequest {
            data: Bytes::from_static(b"not an image at all"),
            file_name: "notes.txt".to_string(),
            options: TransformOptions::default(),
            owner_id: "user-1".to_string(),
        },
    )
    .await;

    assert!(result.is_err());
    assert!(h.blobs.is_empty());
    assert!(h.queue.is_empty());
    assert_eq!(h.jobs.write_count(), 0);
}

#[tokio::test]
async fn list_and_delete_respect_ownership() {
    let h = harness();
    let id = upload(&h, png(8, 8), TransformOptions::default()).await;

    let images = ImageService::list_images(&h.state, "user-1").await.unwrap();
    assert_eq!(images.len(), 1);
    assert_eq!(images[0].id, id);
    assert!(ImageService::list_images(&h.state, "someone-else").await.unwrap().is_empty());

    assert!(ImageService::delete_image(&h.state, id, "someone-else").await.is_err());
    ImageService::delete_image(&h.state, id, "user-1").await.unwrap();
    assert!(ImageService::get_status(&h.state, id).await.is_err());
}
