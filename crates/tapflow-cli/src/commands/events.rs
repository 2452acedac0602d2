//! Events command for listing recent taps.

use std::io::Write;

use anyhow::Result;

use tapflow_core::types::SessionId;
use tapflow_store::EventStore;

pub fn run<W: Write>(
    writer: &mut W,
    store: &EventStore,
    session_id: &SessionId,
    limit: usize,
) -> Result<()> {
    let records = store.recent_events(session_id, limit)?;

    if records.is_empty() {
        writeln!(writer, "No taps recorded in session {session_id}.")?;
        return Ok(());
    }

    for record in records {
        writeln!(
            writer,
            "{}  {:<14} {}  {}",
            record.observed_at.to_rfc3339(),
            record.stage,
            record.token_id,
            record.origin
        )?;
    }
    Ok(())
}
