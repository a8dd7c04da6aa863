//! Batch controller: run the pipeline over every idle record, one at a time

use crate::error::{MediaError, Result};
use crate::pipeline::FilePipeline;
use crate::registry::RecordStatus;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchReport {
    pub attempted: usize,
    pub completed: usize,
    pub failed: usize,
    /// Removed or already claimed before their turn came
    pub skipped: usize,
}

pub struct BatchController {
    pipeline: Arc<FilePipeline>,
    running: AtomicBool,
}

/// Clears the running flag when the batch ends, even on panic
struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl BatchController {
    pub fn new(pipeline: Arc<FilePipeline>) -> Self {
        Self {
            pipeline,
            running: AtomicBool::new(false),
        }
    }

    pub fn pipeline(&self) -> &Arc<FilePipeline> {
        &self.pipeline
    }

    /// True for the whole duration of a batch
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Process every record that is idle right now, strictly in order.
    ///
    /// Record N+1 starts only after record N settles. A second call while a
    /// batch is running is rejected with [`MediaError::BatchInProgress`].
    pub async fn process_all(&self) -> Result<BatchReport> {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            warn!("Batch requested while another is running");
            return Err(MediaError::BatchInProgress);
        }
        let _guard = RunningGuard(&self.running);

        let ids = self.pipeline.store().snapshot().idle_ids();
        info!("⚡ Processing {} idle records", ids.len());

        let mut report = BatchReport {
            attempted: ids.len(),
            ..BatchReport::default()
        };

        for id in ids {
            match self.pipeline.process(id).await {
                Some(RecordStatus::Completed) => report.completed += 1,
                Some(RecordStatus::Error) => report.failed += 1,
                _ => report.skipped += 1,
            }
        }

        info!(
            "✅ Batch finished: {} completed, {} failed, {} skipped",
            report.completed, report.failed, report.skipped
        );
        Ok(report)
    }
}
