//! Metrics command for live queue figures.

use std::io::Write;

use anyhow::Result;

use tapflow_core::types::SessionId;
use tapflow_store::{EventStore, MetricsReader};

pub fn run<W: Write>(
    writer: &mut W,
    store: &EventStore,
    reader: &MetricsReader,
    session_id: &SessionId,
    json: bool,
) -> Result<()> {
    let metrics = reader.get_metrics(session_id)?;

    if json {
        serde_json::to_writer_pretty(&mut *writer, &metrics)?;
        writeln!(writer)?;
        return Ok(());
    }

    writeln!(writer, "Session: {session_id}")?;
    writeln!(
        writer,
        "Taps recorded: {}",
        store.event_count(Some(session_id))?
    )?;
    for (stage, count) in store.count_by_stage(session_id)? {
        writeln!(writer, "- {stage}: {count}")?;
    }
    writeln!(writer, "Queue length: {}", metrics.queue_length)?;
    match metrics.estimated_wait_seconds {
        Some(secs) => writeln!(writer, "Estimated wait: {}", humanize(secs))?,
        None => writeln!(writer, "Estimated wait: unavailable (no completed journeys)")?,
    }
    match metrics.average_service_seconds {
        Some(secs) => writeln!(writer, "Average service: {}", humanize(secs))?,
        None => writeln!(writer, "Average service: unavailable")?,
    }
    writeln!(
        writer,
        "Capacity utilization: {:.0}%",
        metrics.display_utilization_percent()
    )?;
    if let Some(secs) = metrics.longest_wait_seconds {
        #[expect(clippy::cast_precision_loss, reason = "wait ages fit in f64 exactly")]
        writeln!(writer, "Longest wait: {}", humanize(secs as f64))?;
    }
    writeln!(writer, "Health: {:?}", metrics.queue_health)?;
    Ok(())
}

/// Renders a duration in seconds as `4m 30s` or `45s`.
fn humanize(seconds: f64) -> String {
    let total = seconds.round().max(0.0) as i64;
    let minutes = total / 60;
    let secs = total % 60;
    if minutes > 0 {
        format!("{minutes}m {secs}s")
    } else {
        format!("{secs}s")
    }
}
