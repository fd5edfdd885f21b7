//! Init command for preparing the sheet.

use std::io::Write;

use anyhow::{Context, Result};
use vl_core::{HEADER, HeaderStatus, IntervalStore};

/// Runs the init command.
///
/// Unlike `run`, a failure here is an error: there is nothing to continue with.
pub async fn run<W: Write, S: IntervalStore>(writer: &mut W, store: &S, sheet: &str) -> Result<()> {
    let status = store
        .ensure_header()
        .await
        .with_context(|| format!("failed to prepare sheet {sheet}"))?;

    match status {
        HeaderStatus::Unchanged => writeln!(writer, "Sheet {sheet} is ready.")?,
        HeaderStatus::Created => writeln!(writer, "Created header in sheet {sheet}.")?,
        HeaderStatus::Replaced { found } => {
            writeln!(writer, "Replaced header in sheet {sheet}.")?;
            writeln!(writer, "Was: {}", found.join(", "))?;
        }
    }
    writeln!(writer, "Columns: {}", HEADER.join(", "))?;

    Ok(())
}
