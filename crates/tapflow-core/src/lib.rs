//! Core domain logic for the tap station.
//!
//! This crate contains the fundamental types and logic for:
//! - Tap records: validated identifiers, stages, and the persisted record shape
//! - Deduplication: the duplicate-window predicate and its configuration
//! - Validation: the ordered pre-storage checks on candidate taps
//! - Metrics: queue length, wait estimates, and capacity utilization

pub mod dedup;
pub mod event;
pub mod metrics;
pub mod policy;
pub mod stage;
pub mod types;

pub use dedup::{DuplicateWindows, is_duplicate};
pub use event::{Origin, RawTap, TapRecord, ValidTap};
pub use metrics::{MetricsConfig, QueueHealth, SessionMetrics, TokenStatus};
pub use policy::IngestPolicy;
pub use stage::{Stage, StageVocabulary};
pub use types::{CardUid, SessionId, TimestampFault, TokenId, ValidationError};
