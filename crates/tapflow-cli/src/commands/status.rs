//! Status command for one token's place in the service flow.

use std::io::Write;

use anyhow::Result;

use tapflow_core::metrics::TokenStatus;
use tapflow_core::types::{SessionId, TokenId};
use tapflow_store::MetricsReader;

pub fn run<W: Write>(
    writer: &mut W,
    reader: &MetricsReader,
    session_id: &SessionId,
    token_id: &TokenId,
    json: bool,
) -> Result<()> {
    let status = reader.token_status(session_id, token_id)?;

    if json {
        serde_json::to_writer_pretty(&mut *writer, &status)?;
        writeln!(writer)?;
        return Ok(());
    }

    match status {
        TokenStatus::NotSeen => {
            writeln!(writer, "{token_id}: not seen in session {session_id}")?;
        }
        TokenStatus::InQueue {
            joined_at,
            position,
            estimated_wait_seconds,
        } => {
            writeln!(
                writer,
                "{token_id}: in queue at position {position} (joined {})",
                joined_at.to_rfc3339()
            )?;
            if let Some(secs) = estimated_wait_seconds {
                writeln!(writer, "estimated wait: {:.0}s", secs)?;
            }
        }
        TokenStatus::Completed {
            completed_at,
            wait_seconds,
            ..
        } => {
            writeln!(
                writer,
                "{token_id}: completed at {} after {:.0}s",
                completed_at.to_rfc3339(),
                wait_seconds
            )?;
        }
    }
    Ok(())
}
