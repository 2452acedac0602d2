//! Tap command for recording a single tap.

use std::io::Write;

use anyhow::{Result, bail};

use tapflow_core::event::RawTap;
use tapflow_store::{IngestOutcome, IngestionService};

pub fn run<W: Write>(writer: &mut W, service: &IngestionService, raw: &RawTap) -> Result<()> {
    match service.ingest(raw)? {
        IngestOutcome::Recorded(record) => {
            writeln!(
                writer,
                "recorded {} at {} ({}, seq {})",
                record.token_id,
                record.observed_at.to_rfc3339(),
                record.stage,
                record.seq
            )?;
        }
        IngestOutcome::Duplicate(existing) => {
            writeln!(
                writer,
                "already recorded: {} tapped {} at {}",
                existing.token_id,
                existing.stage,
                existing.observed_at.to_rfc3339()
            )?;
        }
        IngestOutcome::Rejected(error) => {
            writeln!(writer, "rejected: {error}")?;
            bail!("tap rejected: {error}");
        }
    }
    Ok(())
}
