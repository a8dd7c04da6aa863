//! Per-record conversion pipeline
//!
//! `process` claims an idle record (idle -> processing), converts the source in
//! the record's target format, asks the captioner for a description, and merges
//! the outcome back into the store. A missing caption still completes the
//! record; only a codec failure (or a panicked codec task) ends in `error`.
//! If the record is removed while the run is in flight, the result is dropped.

use crate::caption::{Caption, Captioner};
use crate::encoding;
use crate::error::{MediaError, Result};
use crate::image::{ImageCodec, Quality};
use crate::metrics::{Metrics, Timer};
use crate::registry::{ConvertedImage, FileRecord, FileStore, RecordId, RecordPatch, RecordStatus};
use std::sync::Arc;
use tracing::{debug, error, info};

pub struct FilePipeline {
    store: Arc<FileStore>,
    codec: Arc<dyn ImageCodec>,
    captioner: Arc<dyn Captioner>,
    quality: Quality,
    metrics: Arc<Metrics>,
}

impl FilePipeline {
    pub fn new(store: Arc<FileStore>, codec: Arc<dyn ImageCodec>, captioner: Arc<dyn Captioner>) -> Self {
        Self {
            store,
            codec,
            captioner,
            quality: Quality::default(),
            metrics: Metrics::new(),
        }
    }

    pub fn with_quality(mut self, quality: Quality) -> Self {
        self.quality = quality;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn store(&self) -> &Arc<FileStore> {
        &self.store
    }

    pub fn metrics(&self) -> Arc<Metrics> {
        Arc::clone(&self.metrics)
    }

    /// Run one record through the pipeline.
    ///
    /// Returns the terminal status that was merged, or `None` when nothing ran
    /// (record absent or not idle) or the result was discarded because the
    /// record was removed mid-flight.
    pub async fn process(&self, id: RecordId) -> Option<RecordStatus> {
        if !self.store.merge(id, RecordPatch::processing()) {
            debug!("Record {} is absent or not idle, skipping", id);
            return None;
        }

        // Format is frozen while processing, so read it after the claim
        let record = self.store.snapshot().get(id).cloned()?;

        info!("🔄 Converting {} to {}", record.source.name(), record.target_format);
        let timer = Timer::new();

        let mut sizes = None;
        let patch = match self.run(&record).await {
            Ok((converted, caption)) => {
                sizes = Some((record.source.size(), converted.size(), caption.is_some()));
                RecordPatch::completed(converted, caption)
            }
            Err(e) => {
                error!("Conversion of {} failed: {}", record.source.name(), e);
                RecordPatch::failed()
            }
        };

        let status = patch.status();
        let elapsed = timer.elapsed_ms();

        if !self.store.merge(id, patch) {
            info!("Record {} removed while processing, result discarded", id);
            return None;
        }

        self.metrics.record_run(status == RecordStatus::Completed, elapsed);
        if let Some((bytes_in, bytes_out, captioned)) = sizes {
            self.metrics.record_bytes(bytes_in, bytes_out);
            self.metrics.record_caption(captioned);
        }

        debug!("Record {} settled as {:?} in {}ms", id, status, elapsed);
        Some(status)
    }

    async fn run(&self, record: &FileRecord) -> Result<(ConvertedImage, Option<Caption>)> {
        let codec = Arc::clone(&self.codec);
        let source = record.source.clone();
        let format = record.target_format;
        let quality = self.quality;

        let data = tokio::task::spawn_blocking(move || codec.convert(&source, format, quality))
            .await
            .map_err(|e| MediaError::Task(e.to_string()))??;
        let converted = ConvertedImage::new(format, data);

        let data_uri = encoding::to_data_uri(&record.source);
        let caption = self
            .captioner
            .caption(encoding::payload(&data_uri), record.source.mime_type())
            .await;

        Ok((converted, caption))
    }
}
