//! Persistence and services for the tap station.
//!
//! - [`store`]: the append-only SQLite event log with windowed deduplication
//! - [`ingest`]: validation-then-append, the single write path for all taps
//! - [`sync`]: ordered batch processing with resumable partial failure
//! - [`metrics`]: queue metrics derived on demand from the log

pub mod ingest;
pub mod metrics;
pub mod store;
pub mod sync;

pub use ingest::{IngestOutcome, IngestionService, TapObserver};
pub use metrics::MetricsReader;
pub use store::{AppendOutcome, EventStore, StoreError};
pub use sync::{FaultItem, RejectedItem, SyncCoordinator, SyncReport};
