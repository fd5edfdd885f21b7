//! Status command for listing intervals that have not been closed.

use std::io::Write;

use anyhow::{Context, Result};
use serde::Serialize;
use vl_core::{IntervalRecord, IntervalStore};

/// An open interval and where it sits in the store.
#[derive(Debug, Serialize)]
struct OpenRow {
    /// Zero-based row index; row 0 is the header.
    row: usize,
    #[serde(flatten)]
    record: IntervalRecord,
}

fn open_rows(rows: &[Vec<String>]) -> Vec<OpenRow> {
    rows.iter()
        .enumerate()
        .skip(1)
        .map(|(row, cells)| OpenRow {
            row,
            record: IntervalRecord::from_row(cells),
        })
        .filter(|open| open.record.is_open())
        .collect()
}

pub async fn run<W: Write, S: IntervalStore>(writer: &mut W, store: &S, json: bool) -> Result<()> {
    let rows = store.read_all().await.context("failed to read rows")?;
    let open = open_rows(&rows);

    if json {
        for entry in &open {
            writeln!(writer, "{}", serde_json::to_string(entry)?)?;
        }
        return Ok(());
    }

    writeln!(writer, "Voice log status")?;
    writeln!(writer, "Rows: {}", rows.len().saturating_sub(1))?;

    if open.is_empty() {
        writeln!(writer, "No open intervals.")?;
        return Ok(());
    }

    writeln!(writer, "Open intervals:")?;
    for entry in &open {
        let r = &entry.record;
        writeln!(
            writer,
            "- row {}: {} ({}) in {} since {} {}",
            entry.row, r.name, r.participant_id, r.room_name, r.date, r.entry_time
        )?;
    }

    Ok(())
}
