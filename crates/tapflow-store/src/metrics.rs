//! Metrics served straight from the event log.
//!
//! All figures are derived on demand from the session's ordered records;
//! there is no cached state to drift out of date.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use tapflow_core::metrics::{
    self, MetricsConfig, SessionMetrics, TokenStatus, average_service_seconds,
    completed_journeys, estimated_wait_seconds, queue_entries,
};
use tapflow_core::stage::StageVocabulary;
use tapflow_core::types::{SessionId, TokenId};

use crate::store::{EventStore, StoreError};

/// Read-side facade over the event store.
pub struct MetricsReader {
    store: Arc<EventStore>,
    vocabulary: StageVocabulary,
    config: MetricsConfig,
}

impl MetricsReader {
    pub fn new(store: Arc<EventStore>, vocabulary: StageVocabulary, config: MetricsConfig) -> Self {
        Self {
            store,
            vocabulary,
            config,
        }
    }

    /// Current queue metrics for a session.
    pub fn get_metrics(&self, session_id: &SessionId) -> Result<SessionMetrics, StoreError> {
        self.get_metrics_at(session_id, Utc::now())
    }

    /// Queue metrics as of an explicit instant.
    pub fn get_metrics_at(
        &self,
        session_id: &SessionId,
        now: DateTime<Utc>,
    ) -> Result<SessionMetrics, StoreError> {
        let records = self.store.query(session_id, None, None)?;
        Ok(metrics::session_metrics(
            &records,
            &self.vocabulary,
            &self.config,
            now,
        ))
    }

    /// Wait estimate for an arbitrary queue position, `None` until at
    /// least one journey has completed.
    pub fn estimated_wait(
        &self,
        session_id: &SessionId,
        position: usize,
    ) -> Result<Option<f64>, StoreError> {
        let records = self.store.query(session_id, None, None)?;
        let journeys = completed_journeys(&records, &self.vocabulary);
        let average = average_service_seconds(&journeys, self.config.recent_journeys);
        Ok(average.map(|avg| estimated_wait_seconds(avg, position)))
    }

    /// Where one token currently stands in a session.
    pub fn token_status(
        &self,
        session_id: &SessionId,
        token_id: &TokenId,
    ) -> Result<TokenStatus, StoreError> {
        let records = self.store.query(session_id, None, None)?;
        Ok(metrics::token_status(
            &records,
            &self.vocabulary,
            token_id,
            &self.config,
        ))
    }

    /// The queue's tokens in order, oldest join first.
    pub fn queue(&self, session_id: &SessionId) -> Result<Vec<TokenId>, StoreError> {
        let records = self.store.query(session_id, None, None)?;
        Ok(queue_entries(&records, &self.vocabulary)
            .into_iter()
            .map(|entry| entry.token_id)
            .collect())
    }
}
