//! Export command for dumping a session's log as JSON Lines.

use std::io::Write;

use anyhow::Result;

use tapflow_core::types::SessionId;
use tapflow_store::EventStore;

/// Writes every record of the session, one JSON object per line, in
/// `observed_at` order.
pub fn run<W: Write>(writer: &mut W, store: &EventStore, session_id: &SessionId) -> Result<()> {
    let records = store.query(session_id, None, None)?;
    for record in &records {
        serde_json::to_writer(&mut *writer, record)?;
        writeln!(writer)?;
    }
    tracing::debug!(session = %session_id, count = records.len(), "exported records");
    Ok(())
}
