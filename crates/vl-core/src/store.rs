//! Backing-store contract used by the reconciler.
//!
//! A store is a single labelled table of rows. Row 0 is the header; data rows
//! follow in append order. Indices passed to [`IntervalStore::update_exit_time`]
//! are positions in the sequence returned by [`IntervalStore::read_all`].

use std::error::Error as StdError;
use std::fmt;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use thiserror::Error;

use crate::record::{EXIT_COLUMN, IntervalRecord, Row, header_row};

/// Boxed backend error carried by [`StoreError::Unavailable`].
pub type BackendError = Box<dyn StdError + Send + Sync + 'static>;

/// Which store call failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOp {
    EnsureHeader,
    Append,
    ReadAll,
    UpdateExitTime,
}

impl StoreOp {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::EnsureHeader => "ensure_header",
            Self::Append => "append",
            Self::ReadAll => "read_all",
            Self::UpdateExitTime => "update_exit_time",
        }
    }
}

impl fmt::Display for StoreOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The store could not complete the call.
    #[error("store unavailable during {op}: {source}")]
    Unavailable {
        op: StoreOp,
        #[source]
        source: BackendError,
    },
    /// An update addressed a row the store does not have.
    #[error("row {index} out of range (store has {len} rows)")]
    RowOutOfRange { index: usize, len: usize },
}

impl StoreError {
    pub fn unavailable(op: StoreOp, source: impl Into<BackendError>) -> Self {
        Self::Unavailable {
            op,
            source: source.into(),
        }
    }
}

/// Result of preparing the header row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeaderStatus {
    /// The header was already correct.
    Unchanged,
    /// The table was empty or missing; a header was written.
    Created,
    /// A different header was found and overwritten.
    Replaced { found: Row },
}

/// Append, bulk-read and point-update access to the durable table.
///
/// `read_all` must observe every earlier `append` and `update_exit_time`.
#[async_trait]
pub trait IntervalStore: Send + Sync {
    /// Creates the table if needed and makes row 0 the expected header.
    async fn ensure_header(&self) -> Result<HeaderStatus, StoreError>;

    /// Appends a record after the last row.
    async fn append(&self, record: &IntervalRecord) -> Result<(), StoreError>;

    /// Returns every row, header included, oldest first.
    async fn read_all(&self) -> Result<Vec<Row>, StoreError>;

    /// Sets the exit time cell of the row at `index`.
    async fn update_exit_time(&self, index: usize, exit_time: &str) -> Result<(), StoreError>;
}

/// A mutation observed by [`MemoryStore`], in call order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    Append(IntervalRecord),
    UpdateExitTime { index: usize, exit_time: String },
}

#[derive(Debug, Default)]
struct MemoryState {
    rows: Vec<Row>,
    mutations: Vec<Mutation>,
    unavailable: bool,
}

/// Process-local store.
///
/// Used for dry runs and tests. It can be switched into an unavailable state
/// where every call fails.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

#[derive(Debug, Error)]
#[error("memory store marked unavailable")]
struct MarkedUnavailable;

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store that already holds a header and `rows`.
    pub fn with_rows(rows: impl IntoIterator<Item = Row>) -> Self {
        let mut all = vec![header_row()];
        all.extend(rows);
        Self {
            state: Mutex::new(MemoryState {
                rows: all,
                ..MemoryState::default()
            }),
        }
    }

    /// Makes every following call fail (or succeed again).
    pub fn set_unavailable(&self, unavailable: bool) {
        self.lock().unavailable = unavailable;
    }

    /// Snapshot of all rows.
    pub fn rows(&self) -> Vec<Row> {
        self.lock().rows.clone()
    }

    /// Data rows parsed as records.
    pub fn records(&self) -> Vec<IntervalRecord> {
        self.lock()
            .rows
            .iter()
            .skip(1)
            .map(|row| IntervalRecord::from_row(row))
            .collect()
    }

    /// Mutations applied so far, oldest first.
    pub fn mutations(&self) -> Vec<Mutation> {
        self.lock().mutations.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check(state: &MemoryState, op: StoreOp) -> Result<(), StoreError> {
        if state.unavailable {
            return Err(StoreError::unavailable(op, MarkedUnavailable));
        }
        Ok(())
    }
}

#[async_trait]
impl IntervalStore for MemoryStore {
    async fn ensure_header(&self) -> Result<HeaderStatus, StoreError> {
        let mut state = self.lock();
        Self::check(&state, StoreOp::EnsureHeader)?;
        let expected = header_row();
        match state.rows.first() {
            None => {
                state.rows.push(expected);
                Ok(HeaderStatus::Created)
            }
            Some(found) if *found == expected => Ok(HeaderStatus::Unchanged),
            Some(found) => {
                let found = found.clone();
                state.rows[0] = expected;
                Ok(HeaderStatus::Replaced { found })
            }
        }
    }

    async fn append(&self, record: &IntervalRecord) -> Result<(), StoreError> {
        let mut state = self.lock();
        Self::check(&state, StoreOp::Append)?;
        state.rows.push(record.to_row());
        state.mutations.push(Mutation::Append(record.clone()));
        Ok(())
    }

    async fn read_all(&self) -> Result<Vec<Row>, StoreError> {
        let state = self.lock();
        Self::check(&state, StoreOp::ReadAll)?;
        Ok(state.rows.clone())
    }

    async fn update_exit_time(&self, index: usize, exit_time: &str) -> Result<(), StoreError> {
        let mut state = self.lock();
        Self::check(&state, StoreOp::UpdateExitTime)?;
        let len = state.rows.len();
        let row = state
            .rows
            .get_mut(index)
            .ok_or(StoreError::RowOutOfRange { index, len })?;
        if row.len() <= EXIT_COLUMN {
            row.resize(EXIT_COLUMN + 1, String::new());
        }
        row[EXIT_COLUMN] = exit_time.to_string();
        state.mutations.push(Mutation::UpdateExitTime {
            index,
            exit_time: exit_time.to_string(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(entry: &str) -> IntervalRecord {
        IntervalRecord {
            date: "2025-05-01".into(),
            name: "alice".into(),
            participant_id: "1".into(),
            room_name: "General".into(),
            entry_time: entry.into(),
            exit_time: String::new(),
        }
    }

    #[tokio::test]
    async fn ensure_header_creates_then_is_unchanged() {
        let store = MemoryStore::new();
        assert_eq!(store.ensure_header().await.unwrap(), HeaderStatus::Created);
        assert_eq!(store.ensure_header().await.unwrap(), HeaderStatus::Unchanged);
        assert_eq!(store.rows(), vec![header_row()]);
    }

    #[tokio::test]
    async fn ensure_header_replaces_mismatch() {
        let store = MemoryStore::new();
        store.append(&record("09:00:00")).await.unwrap();
        let status = store.ensure_header().await.unwrap();
        assert!(matches!(status, HeaderStatus::Replaced { ref found } if found[4] == "09:00:00"));
        assert_eq!(store.rows()[0], header_row());
    }

    #[tokio::test]
    async fn read_all_reflects_writes() {
        let store = MemoryStore::with_rows([]);
        store.append(&record("09:00:00")).await.unwrap();
        store.update_exit_time(1, "09:30:00").await.unwrap();
        let rows = store.read_all().await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1][EXIT_COLUMN], "09:30:00");
    }

    #[tokio::test]
    async fn update_pads_short_rows() {
        let short = vec!["2025-05-01".into(), "alice".into(), "1".into(), "General".into()];
        let store = MemoryStore::with_rows([short]);
        store.update_exit_time(1, "10:00:00").await.unwrap();
        assert_eq!(store.rows()[1].len(), 6);
        assert_eq!(store.rows()[1][EXIT_COLUMN], "10:00:00");
    }

    #[tokio::test]
    async fn update_out_of_range_errors() {
        let store = MemoryStore::with_rows([]);
        let err = store.update_exit_time(3, "10:00:00").await.unwrap_err();
        assert!(matches!(err, StoreError::RowOutOfRange { index: 3, len: 1 }));
    }

    #[tokio::test]
    async fn unavailable_store_fails_every_call() {
        let store = MemoryStore::with_rows([]);
        store.set_unavailable(true);
        let err = store.append(&record("09:00:00")).await.unwrap_err();
        assert!(matches!(
            err,
            StoreError::Unavailable {
                op: StoreOp::Append,
                ..
            }
        ));
        assert!(store.read_all().await.is_err());
        store.set_unavailable(false);
        assert_eq!(store.read_all().await.unwrap().len(), 1);
    }
}
