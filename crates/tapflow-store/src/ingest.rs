//! The single entry point through which any tap reaches the event log.

use std::sync::Arc;

use chrono::Utc;

use tapflow_core::event::{RawTap, TapRecord};
use tapflow_core::policy::IngestPolicy;
use tapflow_core::types::ValidationError;

use crate::store::{AppendOutcome, EventStore, StoreError};

/// What happened to one candidate tap.
///
/// `Duplicate` is the primary documented behavior of a retried tap, not an
/// error; it carries the retained record so callers can show "already
/// tapped" feedback.
#[derive(Debug, Clone, PartialEq)]
pub enum IngestOutcome {
    /// Validated, not a duplicate, durably persisted.
    Recorded(TapRecord),
    /// The same logical tap was already retained.
    Duplicate(TapRecord),
    /// Failed validation before touching storage.
    Rejected(ValidationError),
}

/// Callback fired once per `Recorded` outcome.
///
/// The seam for feedback hardware and live dashboard pushes; collaborators
/// choose their own side effects.
pub type TapObserver = Box<dyn Fn(&TapRecord) + Send + Sync>;

/// Validates candidate taps and applies them to the store.
///
/// Live hardware, manual entry, and every item of a sync batch all pass
/// through [`IngestionService::ingest`], so they share one atomicity
/// guarantee.
pub struct IngestionService {
    store: Arc<EventStore>,
    policy: IngestPolicy,
    observers: Vec<TapObserver>,
}

impl IngestionService {
    /// Creates a service over the given store and validation policy.
    pub fn new(store: Arc<EventStore>, policy: IngestPolicy) -> Self {
        Self {
            store,
            policy,
            observers: Vec::new(),
        }
    }

    /// Registers a notification observer. Builder-style.
    #[must_use]
    pub fn with_observer(mut self, observer: impl Fn(&TapRecord) + Send + Sync + 'static) -> Self {
        self.observers.push(Box::new(observer));
        self
    }

    /// The underlying event store.
    pub fn store(&self) -> &Arc<EventStore> {
        &self.store
    }

    /// Applies one candidate tap.
    ///
    /// Validation failures and duplicates are outcomes; only a
    /// [`StoreError`] (unrecoverable persistence failure) is an error.
    pub fn ingest(&self, raw: &RawTap) -> Result<IngestOutcome, StoreError> {
        let valid = match self.policy.validate(raw, Utc::now()) {
            Ok(valid) => valid,
            Err(error) => {
                tracing::debug!(token = %raw.token_id, %error, "tap rejected");
                return Ok(IngestOutcome::Rejected(error));
            }
        };

        match self.store.append(&valid)? {
            AppendOutcome::Inserted(record) => {
                tracing::info!(
                    seq = record.seq,
                    token = %record.token_id,
                    stage = %record.stage,
                    origin = %record.origin,
                    "tap recorded"
                );
                for observer in &self.observers {
                    observer(&record);
                }
                Ok(IngestOutcome::Recorded(record))
            }
            AppendOutcome::DuplicateOf(existing) => Ok(IngestOutcome::Duplicate(existing)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use tapflow_core::dedup::DuplicateWindows;
    use tapflow_core::event::Origin;

    fn service() -> IngestionService {
        let store = Arc::new(EventStore::open_in_memory(DuplicateWindows::default()).unwrap());
        IngestionService::new(store, IngestPolicy::default())
    }

    fn raw(token: &str, stage: &str, session: &str, observed_at: &str) -> RawTap {
        RawTap {
            token_id: token.to_string(),
            uid: "04A3B2C1".to_string(),
            stage: stage.to_string(),
            session_id: session.to_string(),
            origin: Origin::Station("front-desk".to_string()),
            observed_at: observed_at.parse().unwrap(),
        }
    }

    #[test]
    fn repeated_tap_is_recorded_then_duplicate() {
        let service = service();
        let tap = raw("042", "QUEUE_JOIN", "s1", "2025-06-01T12:00:00Z");

        let first = service.ingest(&tap).unwrap();
        assert!(matches!(first, IngestOutcome::Recorded(_)));

        let second = service.ingest(&tap).unwrap();
        match second {
            IngestOutcome::Duplicate(existing) => {
                assert_eq!(existing.token_id.as_str(), "042");
            }
            other => panic!("expected Duplicate, got {other:?}"),
        }

        assert_eq!(service.store().event_count(None).unwrap(), 1);
    }

    #[test]
    fn unknown_stage_is_rejected_without_storage() {
        let service = service();
        let outcome = service
            .ingest(&raw("042", "TEARDOWN", "s1", "2025-06-01T12:00:00Z"))
            .unwrap();
        assert!(matches!(
            outcome,
            IngestOutcome::Rejected(ValidationError::UnknownStage { .. })
        ));
        assert_eq!(service.store().event_count(None).unwrap(), 0);
    }

    #[test]
    fn malformed_uid_is_rejected() {
        let service = service();
        let mut tap = raw("042", "QUEUE_JOIN", "s1", "2025-06-01T12:00:00Z");
        tap.uid = "not-hex!".to_string();
        let outcome = service.ingest(&tap).unwrap();
        assert!(matches!(
            outcome,
            IngestOutcome::Rejected(ValidationError::MalformedIdentifier { .. })
        ));
    }

    #[test]
    fn observer_fires_once_per_recorded_tap() {
        let store = Arc::new(EventStore::open_in_memory(DuplicateWindows::default()).unwrap());
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        let service = IngestionService::new(store, IngestPolicy::default())
            .with_observer(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            });

        let tap = raw("042", "QUEUE_JOIN", "s1", "2025-06-01T12:00:00Z");
        service.ingest(&tap).unwrap();
        service.ingest(&tap).unwrap(); // duplicate, no notification
        service
            .ingest(&raw("042", "TEARDOWN", "s1", "2025-06-01T12:01:00Z"))
            .unwrap(); // rejected, no notification

        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn identical_taps_in_different_sessions_both_record() {
        let service = service();
        let first = service
            .ingest(&raw("042", "QUEUE_JOIN", "day-one", "2025-06-01T12:00:00Z"))
            .unwrap();
        let second = service
            .ingest(&raw("042", "QUEUE_JOIN", "day-two", "2025-06-01T12:00:00Z"))
            .unwrap();
        assert!(matches!(first, IngestOutcome::Recorded(_)));
        assert!(matches!(second, IngestOutcome::Recorded(_)));
    }

    #[test]
    fn concurrent_ingest_of_same_tap_records_exactly_once() {
        let service = Arc::new(service());
        let handles: Vec<_> = (0..6)
            .map(|_| {
                let service = Arc::clone(&service);
                std::thread::spawn(move || {
                    service
                        .ingest(&raw("042", "QUEUE_JOIN", "s1", "2025-06-01T12:00:00Z"))
                        .unwrap()
                })
            })
            .collect();

        let outcomes: Vec<IngestOutcome> =
            handles.into_iter().map(|h| h.join().unwrap()).collect();
        let recorded = outcomes
            .iter()
            .filter(|o| matches!(o, IngestOutcome::Recorded(_)))
            .count();
        let duplicates = outcomes
            .iter()
            .filter(|o| matches!(o, IngestOutcome::Duplicate(_)))
            .count();
        assert_eq!(recorded, 1);
        assert_eq!(duplicates, 5);
    }
}
