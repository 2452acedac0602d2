//! Batch synchronization for taps captured while offline.
//!
//! A batch is processed strictly in order through the same ingestion path
//! as live taps. Validation failures and duplicates never stop a batch;
//! a storage failure does, and the report tells the client exactly where
//! to resume. Nothing already persisted is ever rolled back.

use serde::Serialize;

use tapflow_core::event::RawTap;
use tapflow_core::types::ValidationError;

use crate::ingest::{IngestOutcome, IngestionService};

/// A batch item that failed validation, by position in the batch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RejectedItem {
    pub index: usize,
    pub error: ValidationError,
}

/// A batch item that hit a storage failure, by position in the batch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FaultItem {
    pub index: usize,
    pub message: String,
}

/// The outcome of one batch submission.
///
/// `recorded_count + duplicate_count + rejected_items.len() +
/// fault_items.len()` equals the number of items processed; when
/// `resume_from_index` is `None` that is the whole batch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncReport {
    pub recorded_count: usize,
    pub duplicate_count: usize,
    pub rejected_items: Vec<RejectedItem>,
    pub fault_items: Vec<FaultItem>,
    /// Zero-based index of the first unprocessed item, present only when
    /// processing halted early. Resubmit the batch suffix starting here.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resume_from_index: Option<usize>,
}

impl SyncReport {
    fn new() -> Self {
        Self {
            recorded_count: 0,
            duplicate_count: 0,
            rejected_items: Vec::new(),
            fault_items: Vec::new(),
            resume_from_index: None,
        }
    }

    /// Whether every item of the batch was processed.
    pub fn fully_processed(&self) -> bool {
        self.resume_from_index.is_none()
    }
}

/// Drives a batch through the ingestion service, item by item.
pub struct SyncCoordinator<'a> {
    service: &'a IngestionService,
}

impl<'a> SyncCoordinator<'a> {
    pub fn new(service: &'a IngestionService) -> Self {
        Self { service }
    }

    /// Processes a batch in submission order.
    pub fn sync_batch(&self, batch: &[RawTap]) -> SyncReport {
        self.sync_batch_with_progress(batch, |_, _| {})
    }

    /// Like [`Self::sync_batch`], invoking `progress(done, total)` after
    /// each processed item.
    pub fn sync_batch_with_progress(
        &self,
        batch: &[RawTap],
        mut progress: impl FnMut(usize, usize),
    ) -> SyncReport {
        let mut report = SyncReport::new();
        let total = batch.len();

        for (index, raw) in batch.iter().enumerate() {
            match self.service.ingest(raw) {
                Ok(IngestOutcome::Recorded(_)) => report.recorded_count += 1,
                Ok(IngestOutcome::Duplicate(_)) => report.duplicate_count += 1,
                Ok(IngestOutcome::Rejected(error)) => {
                    report.rejected_items.push(RejectedItem { index, error });
                }
                Err(error) => {
                    // Items before this one stay persisted; the client
                    // resubmits from here.
                    tracing::error!(index, %error, "sync halted on storage failure");
                    report.fault_items.push(FaultItem {
                        index,
                        message: error.to_string(),
                    });
                    report.resume_from_index = Some(index);
                    break;
                }
            }
            progress(index + 1, total);
        }

        tracing::info!(
            total,
            recorded = report.recorded_count,
            duplicates = report.duplicate_count,
            rejected = report.rejected_items.len(),
            halted = !report.fully_processed(),
            "sync batch finished"
        );
        report
    }
}
