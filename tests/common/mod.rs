//! Shared fixtures for controller and route integration tests.

use std::collections::VecDeque;
use std::io::Cursor;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use avatar_stylizer::{
    AppError, ControllerHandle, ControllerOptions, FileUpload, GenerationClient, HistoryItem,
    ImagePayload, MemoryStore, StateSnapshot, StyleOption,
};

/// Generation client with a fixed delay and a queue of scripted outcomes.
#[derive(Debug, Default)]
pub struct ScriptedClient {
    delay: Duration,
    outcomes: Mutex<VecDeque<Result<ImagePayload, AppError>>>,
    calls: Mutex<Vec<StyleOption>>,
}

impl ScriptedClient {
    pub fn new(delay: Duration, outcomes: Vec<Result<ImagePayload, AppError>>) -> Arc<Self> {
        Arc::new(Self {
            delay,
            outcomes: Mutex::new(outcomes.into()),
            calls: Mutex::new(Vec::new()),
        })
    }

    #[allow(dead_code)]
    pub fn calls(&self) -> Vec<StyleOption> {
        self.calls.lock().expect("calls lock should work").clone()
    }
}

impl GenerationClient for ScriptedClient {
    async fn generate(
        &self,
        _source: &ImagePayload,
        style: StyleOption,
    ) -> Result<ImagePayload, AppError> {
        self.calls.lock().expect("calls lock should work").push(style);
        tokio::time::sleep(self.delay).await;
        self.outcomes
            .lock()
            .expect("outcome lock should work")
            .pop_front()
            .unwrap_or_else(|| Err(AppError::generation("no scripted outcome left")))
    }
}

#[allow(dead_code)]
pub fn fast_options() -> ControllerOptions {
    ControllerOptions {
        progress_expected: Duration::from_millis(1_000),
        progress_tick: Duration::from_millis(10),
        max_image_edge: 64,
        channel_capacity: 32,
    }
}

#[allow(dead_code)]
pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = image::RgbImage::from_pixel(width, height, image::Rgb([10, 120, 240]));
    let mut bytes = Vec::new();
    image::DynamicImage::ImageRgb8(img)
        .write_to(&mut Cursor::new(&mut bytes), image::ImageOutputFormat::Png)
        .expect("png fixture should encode");
    bytes
}

#[allow(dead_code)]
pub fn photo_upload() -> FileUpload {
    FileUpload::new("image/png", png_bytes(8, 8))
}

#[allow(dead_code)]
pub fn avatar_payload() -> ImagePayload {
    ImagePayload::from_bytes("image/png", &png_bytes(4, 4))
}

#[allow(dead_code)]
pub fn history_item(id: &str, style: StyleOption) -> HistoryItem {
    HistoryItem::new(
        id,
        ImagePayload::from_bytes("image/png", b"original"),
        ImagePayload::from_bytes("image/png", b"generated"),
        style,
        1_700_000_000_000,
    )
}

#[allow(dead_code)]
pub fn memory_store(items: Vec<HistoryItem>) -> Arc<MemoryStore> {
    Arc::new(MemoryStore::with_items(items))
}

/// Poll snapshots until `done` holds, failing after five seconds.
#[allow(dead_code)]
pub async fn wait_for<F>(handle: &ControllerHandle, done: F) -> StateSnapshot
where
    F: Fn(&StateSnapshot) -> bool,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let snapshot = handle.snapshot().await.expect("controller should be running");
        if done(&snapshot) {
            return snapshot;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not reached; last snapshot phase {:?}",
            snapshot.phase
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Wait until the store has seen `count` saves; writes land off the controller task.
#[allow(dead_code)]
pub async fn wait_for_saves(store: &MemoryStore, count: usize) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while store.save_count() < count {
        assert!(
            tokio::time::Instant::now() < deadline,
            "expected {count} saves, saw {}",
            store.save_count()
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Ingest a small photo and wait for it to land in the state.
#[allow(dead_code)]
pub async fn load_photo(handle: &ControllerHandle) -> StateSnapshot {
    handle
        .request(avatar_stylizer::Command::Ingest(photo_upload()))
        .await
        .expect("ingest should be accepted");
    wait_for(handle, |s| s.original_image.is_some() && !s.is_ingesting).await
}
