//! Sync command for applying batches captured offline.

use std::io::{Read, Write};
use std::path::Path;

use anyhow::{Context, Result, bail, ensure};

use tapflow_core::event::RawTap;
use tapflow_store::{IngestionService, SyncCoordinator};

/// Largest batch accepted in one submission. Bigger uploads are split by
/// the client.
pub const MAX_BATCH_ITEMS: usize = 1000;

pub fn run<W: Write>(
    writer: &mut W,
    service: &IngestionService,
    file: Option<&Path>,
) -> Result<()> {
    let input = match file {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?,
        None => {
            let mut buffer = String::new();
            std::io::stdin()
                .read_to_string(&mut buffer)
                .context("failed to read batch from stdin")?;
            buffer
        }
    };
    run_from_str(writer, service, &input)
}

pub fn run_from_str<W: Write>(
    writer: &mut W,
    service: &IngestionService,
    input: &str,
) -> Result<()> {
    let batch: Vec<RawTap> =
        serde_json::from_str(input).context("batch is not a JSON array of taps")?;
    ensure!(
        batch.len() <= MAX_BATCH_ITEMS,
        "batch of {} items exceeds the {MAX_BATCH_ITEMS}-item limit; split it",
        batch.len()
    );

    let report = SyncCoordinator::new(service).sync_batch(&batch);
    serde_json::to_writer_pretty(&mut *writer, &report)?;
    writeln!(writer)?;

    if let Some(index) = report.resume_from_index {
        bail!("sync halted; resubmit the batch from index {index}");
    }
    Ok(())
}
