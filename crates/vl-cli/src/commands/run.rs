//! Run command: consume transition events and record intervals.

use std::fmt;
use std::io::Write;

use anyhow::Result;
use vl_core::record::header_row;
use vl_core::{ApplyOutcome, Clock, HeaderStatus, IntervalStore, MemoryStore, Reconciler};

use crate::backend::{Store, open_store};
use crate::config::Config;
use crate::source::{self, BridgeProcess, EventSource};

/// Counts of what a run did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub events: usize,
    pub entered: usize,
    pub left: usize,
    pub moved: usize,
    pub ignored: usize,
    /// Leaves that found no open row to close.
    pub misses: usize,
    /// Events where at least one store call failed.
    pub failures: usize,
    /// Intervals this run opened and never saw close.
    pub still_open: usize,
}

impl RunSummary {
    fn record(&mut self, outcome: &ApplyOutcome) {
        self.events += 1;
        match outcome {
            ApplyOutcome::Ignored => self.ignored += 1,
            ApplyOutcome::Entered(_) => self.entered += 1,
            ApplyOutcome::Left(_) => self.left += 1,
            ApplyOutcome::Moved(_) => self.moved += 1,
        }
        if outcome.is_miss() {
            self.misses += 1;
        }
        if outcome.has_store_error() {
            self.failures += 1;
        }
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} events: {} entered, {} left, {} moved, {} ignored, {} unmatched, {} failed",
            self.events,
            self.entered,
            self.left,
            self.moved,
            self.ignored,
            self.misses,
            self.failures
        )
    }
}

/// Options for [`run`].
#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    /// Read events from stdin instead of the bridge command.
    pub stdin: bool,
    /// Record into memory only.
    pub dry_run: bool,
}

/// Runs the run command.
///
/// Configuration is validated before the store is touched or the bridge is
/// started.
pub async fn run<W: Write>(writer: &mut W, config: &Config, options: RunOptions) -> Result<()> {
    let clock = config.clock()?;
    let bridge = if options.stdin {
        None
    } else {
        let token = config.require_discord_token()?;
        let command = config.require_bridge_command()?;
        Some((command, token))
    };
    let store = open_store(config, options.dry_run)?;
    tracing::debug!(backend = store.kind(), sheet = %config.sheet_name, "store ready");

    let reconciler = Reconciler::new(store);
    prepare(reconciler.store()).await;

    let started = clock.now();
    tracing::info!(date = %started.date, time = %started.time, "voice log started");

    let summary = match bridge {
        None => process_events(&reconciler, &mut source::stdin(), &clock).await?,
        Some((command, token)) => {
            let mut bridge = BridgeProcess::spawn(command, token)?;
            process_events(&reconciler, &mut bridge, &clock).await?
        }
    };

    tracing::info!(%summary, still_open = summary.still_open, "event source exhausted");
    writeln!(writer, "{summary}")?;

    if let Store::Memory(memory) = reconciler.store() {
        write_rows(writer, memory)?;
    }
    Ok(())
}

/// Makes sure the header row exists. Failures are logged and processing
/// continues; later store calls report their own errors.
pub async fn prepare<S: IntervalStore>(store: &S) -> Option<HeaderStatus> {
    match store.ensure_header().await {
        Ok(HeaderStatus::Unchanged) => {
            tracing::debug!("header row present");
            Some(HeaderStatus::Unchanged)
        }
        Ok(HeaderStatus::Created) => {
            tracing::info!("created header row");
            Some(HeaderStatus::Created)
        }
        Ok(HeaderStatus::Replaced { found }) => {
            tracing::warn!(?found, "replaced unexpected header row");
            Some(HeaderStatus::Replaced { found })
        }
        Err(e) => {
            tracing::error!(error = %e, "failed to prepare header row");
            None
        }
    }
}

/// Applies every event from `source` in delivery order.
///
/// Store failures are reported per event and never stop the loop; only a
/// failing event source ends the run with an error.
pub async fn process_events<S, E>(
    reconciler: &Reconciler<S>,
    source: &mut E,
    clock: &dyn Clock,
) -> Result<RunSummary>
where
    S: IntervalStore,
    E: EventSource + ?Sized,
{
    let mut summary = RunSummary::default();
    while let Some(event) = source.next_event().await? {
        let stamp = event.stamp(clock);
        let outcome = reconciler.apply(&event, &stamp).await;
        summary.record(&outcome);
    }
    let open = reconciler.open_intervals().await;
    summary.still_open = open.len();
    for (key, entry_time) in open {
        tracing::debug!(
            participant_id = %key.participant,
            room_id = %key.room,
            entry = %entry_time,
            "interval still open"
        );
    }
    Ok(summary)
}

fn write_rows<W: Write>(writer: &mut W, memory: &MemoryStore) -> Result<()> {
    let rows = memory.rows();
    let header = header_row();
    for row in rows.iter().filter(|row| **row != header) {
        writeln!(writer, "{}", row.join("\t"))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use insta::assert_snapshot;
    use vl_core::{FixedClock, IntervalRecord};

    use crate::source::JsonLines;

    fn events(lines: &[&str]) -> String {
        lines.join("\n")
    }

    const ALICE_ENTERS_GENERAL: &str = r#"{"participant":{"id":"1","name":"alice"},"after":{"id":"10","name":"General"}}"#;
    const ALICE_MOVES_TO_GAMING: &str = r#"{"participant":{"id":"1","name":"alice"},"before":{"id":"10","name":"General"},"after":{"id":"20","name":"Gaming"}}"#;
    const ALICE_LEAVES_GAMING: &str = r#"{"participant":{"id":"1","name":"alice"},"before":{"id":"20","name":"Gaming"}}"#;
    const BOB_LEAVES_GENERAL: &str = r#"{"participant":{"id":"2","name":"bob"},"before":{"id":"10","name":"General"}}"#;
    const ALICE_MUTES: &str = r#"{"participant":{"id":"1","name":"alice"},"before":{"id":"10","name":"General"},"after":{"id":"10","name":"General"}}"#;

    #[tokio::test]
    async fn process_events_records_enter_move_and_leave() {
        let reconciler = Reconciler::new(MemoryStore::new());
        reconciler.store().ensure_header().await.unwrap();
        let input = events(&[ALICE_ENTERS_GENERAL, ALICE_MOVES_TO_GAMING, ALICE_LEAVES_GAMING]);
        let clock = FixedClock::new("2024-05-01", "10:00:00");

        let summary = process_events(&reconciler, &mut JsonLines::new(input.as_bytes()), &clock)
            .await
            .unwrap();

        assert_eq!(summary.events, 3);
        assert_eq!((summary.entered, summary.moved, summary.left), (1, 1, 1));
        assert_eq!(summary.still_open, 0);
        let records = reconciler.store().records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].room_name, "General");
        assert_eq!(records[0].exit_time, "10:00:00");
        assert_eq!(records[1].room_name, "Gaming");
        assert_eq!(records[1].exit_time, "10:00:00");
        assert!(reconciler.open_intervals().await.is_empty());
    }

    #[tokio::test]
    async fn process_events_counts_misses_and_ignored() {
        let reconciler = Reconciler::new(MemoryStore::new());
        reconciler.store().ensure_header().await.unwrap();
        let input = events(&[BOB_LEAVES_GENERAL, ALICE_MUTES]);
        let clock = FixedClock::new("2024-05-01", "10:00:00");

        let summary = process_events(&reconciler, &mut JsonLines::new(input.as_bytes()), &clock)
            .await
            .unwrap();

        assert_eq!(summary.misses, 1);
        assert_eq!(summary.ignored, 1);
        assert_eq!(summary.still_open, 0);
        assert_eq!(reconciler.store().rows().len(), 1);
    }

    #[tokio::test]
    async fn process_events_reports_intervals_left_open() {
        let reconciler = Reconciler::new(MemoryStore::new());
        reconciler.store().ensure_header().await.unwrap();
        let input = events(&[ALICE_ENTERS_GENERAL, ALICE_MOVES_TO_GAMING]);
        let clock = FixedClock::new("2024-05-01", "10:00:00");

        let summary = process_events(&reconciler, &mut JsonLines::new(input.as_bytes()), &clock)
            .await
            .unwrap();

        assert_eq!(summary.still_open, 1);
        let open = reconciler.open_intervals().await;
        assert_eq!(open[0].0.room.as_str(), "20");
        assert_eq!(open[0].1, "10:00:00");
    }

    #[tokio::test]
    async fn process_events_continues_after_store_failure() {
        let reconciler = Reconciler::new(MemoryStore::new());
        reconciler.store().set_unavailable(true);
        let input = events(&[ALICE_ENTERS_GENERAL, ALICE_LEAVES_GAMING]);
        let clock = FixedClock::new("2024-05-01", "10:00:00");

        let summary = process_events(&reconciler, &mut JsonLines::new(input.as_bytes()), &clock)
            .await
            .unwrap();

        assert_eq!(summary.events, 2);
        assert_eq!(summary.failures, 2);
    }

    #[tokio::test]
    async fn explicit_event_time_is_used_for_stamp() {
        let reconciler = Reconciler::new(MemoryStore::new());
        reconciler.store().ensure_header().await.unwrap();
        let input = r#"{"participant":{"id":"1","name":"alice"},"after":{"id":"10","name":"General"},"at":"2024-05-01T23:30:00Z"}"#;
        let clock = FixedClock::new("1999-01-01", "00:00:00");

        process_events(&reconciler, &mut JsonLines::new(input.as_bytes()), &clock)
            .await
            .unwrap();

        let records = reconciler.store().records();
        assert_eq!(
            records,
            vec![IntervalRecord {
                date: "2024-05-02".into(),
                name: "alice".into(),
                participant_id: "1".into(),
                room_name: "General".into(),
                entry_time: "08:30:00".into(),
                exit_time: String::new(),
            }]
        );
    }

    #[tokio::test]
    async fn prepare_reports_status_and_swallows_errors() {
        let store = MemoryStore::new();
        assert_eq!(prepare(&store).await, Some(HeaderStatus::Created));
        assert_eq!(prepare(&store).await, Some(HeaderStatus::Unchanged));

        store.set_unavailable(true);
        assert_eq!(prepare(&store).await, None);
    }

    #[test]
    fn summary_display() {
        let summary = RunSummary {
            events: 5,
            entered: 2,
            left: 1,
            moved: 1,
            ignored: 1,
            misses: 1,
            failures: 0,
            still_open: 1,
        };
        assert_snapshot!(
            summary.to_string(),
            @"5 events: 2 entered, 1 left, 1 moved, 1 ignored, 1 unmatched, 0 failed"
        );
    }

    #[tokio::test]
    async fn run_without_token_fails_before_reading_events() {
        let config = Config {
            discord_token: None,
            bridge_command: vec!["bridge".into()],
            ..Config::default()
        };
        let mut output = Vec::new();

        let err = run(&mut output, &config, RunOptions::default()).await.unwrap_err();

        assert_eq!(err.to_string(), "discord_token is not set");
        assert!(output.is_empty());
    }

    #[tokio::test]
    async fn run_without_bridge_command_fails() {
        let config = Config {
            discord_token: Some("token".into()),
            ..Config::default()
        };
        let mut output = Vec::new();

        let err = run(&mut output, &config, RunOptions::default()).await.unwrap_err();

        assert_eq!(err.to_string(), "bridge_command is not set");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn dry_run_with_bridge_prints_recorded_rows() {
        let script = format!("printf '%s\\n' '{ALICE_ENTERS_GENERAL}' '{ALICE_MOVES_TO_GAMING}'");
        let config = Config {
            discord_token: Some("token".into()),
            bridge_command: vec!["sh".into(), "-c".into(), script],
            utc_offset_minutes: 0,
            ..Config::default()
        };
        let mut output = Vec::new();

        run(
            &mut output,
            &config,
            RunOptions {
                stdin: false,
                dry_run: true,
            },
        )
        .await
        .unwrap();

        let output = String::from_utf8(output).unwrap();
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(
            lines[0],
            "2 events: 1 entered, 0 left, 1 moved, 0 ignored, 0 unmatched, 0 failed"
        );
        assert_eq!(lines.len(), 3);
        let first: Vec<&str> = lines[1].split('\t').collect();
        assert_eq!(&first[1..4], ["alice", "1", "General"]);
        assert_eq!(first.len(), 6);
        let second: Vec<&str> = lines[2].split('\t').collect();
        assert_eq!(&second[1..4], ["alice", "1", "Gaming"]);
        assert_eq!(second[5], "");
    }
}
