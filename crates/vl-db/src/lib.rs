//! Storage layer for the voice log.
//!
//! Provides a spreadsheet-shaped table of interval rows using `rusqlite`.
//!
//! # Thread Safety
//!
//! A `rusqlite::Connection` is `Send` but not `Sync`. [`Sheet`] keeps its
//! connection behind a `Mutex` so it can be shared by the reconciler; every call
//! holds the lock for the duration of one statement.
//!
//! # Schema
//!
//! One database can hold several labelled sheets. Each sheet is a sequence of
//! six-cell rows numbered from 0 with no gaps: row 0 is the header and data
//! rows follow in append order. Rows are never deleted, so the position of a
//! row in [`Sheet::read_all`](vl_core::IntervalStore::read_all) is its
//! `row_index`.
//!
//! All cells are TEXT. Times are stored exactly as formatted by the clock
//! (`HH:MM:SS`), an open interval has an empty `c5` (exit time).

use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use thiserror::Error;
use vl_core::record::{COLUMN_COUNT, EXIT_COLUMN, header_row};
use vl_core::{HeaderStatus, IntervalRecord, IntervalStore, Row, StoreError, StoreOp};

/// Database errors.
#[derive(Debug, Error)]
pub enum DbError {
    /// An error from the underlying database.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// The sheet label was empty.
    #[error("sheet label cannot be empty")]
    EmptyLabel,
}

/// One labelled table of interval rows in a `SQLite` database.
pub struct Sheet {
    conn: Mutex<Connection>,
    label: String,
}

impl std::fmt::Debug for Sheet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sheet")
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}

impl Sheet {
    /// Opens a database at the given path, creating it if necessary.
    ///
    /// The schema is initialized on first open; the sheet itself is created
    /// by [`IntervalStore::ensure_header`].
    pub fn open(path: &Path, label: impl Into<String>) -> Result<Self, DbError> {
        let conn = Connection::open(path)?;
        Self::with_connection(conn, label.into())
    }

    /// Opens an in-memory database.
    ///
    /// Useful for testing. The database is destroyed when the sheet is dropped.
    pub fn open_in_memory(label: impl Into<String>) -> Result<Self, DbError> {
        let conn = Connection::open_in_memory()?;
        Self::with_connection(conn, label.into())
    }

    fn with_connection(conn: Connection, label: String) -> Result<Self, DbError> {
        if label.trim().is_empty() {
            return Err(DbError::EmptyLabel);
        }
        init(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            label,
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn ensure_header_impl(&self) -> Result<HeaderStatus, DbError> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT OR IGNORE INTO sheets (label, created_at) VALUES (?, ?)",
            params![
                self.label,
                Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
            ],
        )?;

        let expected = header_row();
        let found = tx
            .query_row(
                "SELECT c0, c1, c2, c3, c4, c5 FROM sheet_rows WHERE sheet = ? AND row_index = 0",
                params![self.label],
                read_cells,
            )
            .optional()?;

        let status = match found {
            None => {
                insert_row(&tx, &self.label, 0, &expected)?;
                HeaderStatus::Created
            }
            Some(found) if trim_trailing(&found) == expected.as_slice() => HeaderStatus::Unchanged,
            Some(found) => {
                tx.execute(
                    "
                    UPDATE sheet_rows
                    SET c0 = ?, c1 = ?, c2 = ?, c3 = ?, c4 = ?, c5 = ?
                    WHERE sheet = ? AND row_index = 0
                    ",
                    params![
                        expected[0],
                        expected[1],
                        expected[2],
                        expected[3],
                        expected[4],
                        expected[5],
                        self.label
                    ],
                )?;
                HeaderStatus::Replaced {
                    found: trim_trailing(&found).to_vec(),
                }
            }
        };
        tx.commit()?;
        Ok(status)
    }

    fn append_impl(&self, record: &IntervalRecord) -> Result<(), DbError> {
        let conn = self.conn();
        let next: i64 = conn.query_row(
            "SELECT COALESCE(MAX(row_index) + 1, 0) FROM sheet_rows WHERE sheet = ?",
            params![self.label],
            |row| row.get(0),
        )?;
        insert_row(&conn, &self.label, next, &record.to_row())?;
        tracing::trace!(sheet = %self.label, row = next, "appended row");
        Ok(())
    }

    fn read_all_impl(&self) -> Result<Vec<Row>, DbError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "
            SELECT c0, c1, c2, c3, c4, c5
            FROM sheet_rows
            WHERE sheet = ?
            ORDER BY row_index ASC
            ",
        )?;
        let rows = stmt.query_map(params![self.label], read_cells)?;
        let mut all = Vec::new();
        for row in rows {
            all.push(trim_trailing(&row?).to_vec());
        }
        Ok(all)
    }

    fn update_exit_time_impl(&self, index: usize, exit_time: &str) -> Result<usize, DbError> {
        let conn = self.conn();
        let Ok(row_index) = i64::try_from(index) else {
            return Ok(0);
        };
        let changed = conn.execute(
            "UPDATE sheet_rows SET c5 = ? WHERE sheet = ? AND row_index = ?",
            params![exit_time, self.label, row_index],
        )?;
        Ok(changed)
    }

    fn row_count(&self) -> Result<usize, DbError> {
        let conn = self.conn();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM sheet_rows WHERE sheet = ?",
            params![self.label],
            |row| row.get(0),
        )?;
        Ok(usize::try_from(count).unwrap_or(0))
    }
}

#[async_trait]
impl IntervalStore for Sheet {
    async fn ensure_header(&self) -> Result<HeaderStatus, StoreError> {
        self.ensure_header_impl()
            .map_err(|e| StoreError::unavailable(StoreOp::EnsureHeader, e))
    }

    async fn append(&self, record: &IntervalRecord) -> Result<(), StoreError> {
        self.append_impl(record)
            .map_err(|e| StoreError::unavailable(StoreOp::Append, e))
    }

    async fn read_all(&self) -> Result<Vec<Row>, StoreError> {
        self.read_all_impl()
            .map_err(|e| StoreError::unavailable(StoreOp::ReadAll, e))
    }

    async fn update_exit_time(&self, index: usize, exit_time: &str) -> Result<(), StoreError> {
        let changed = self
            .update_exit_time_impl(index, exit_time)
            .map_err(|e| StoreError::unavailable(StoreOp::UpdateExitTime, e))?;
        if changed == 0 {
            let len = self
                .row_count()
                .map_err(|e| StoreError::unavailable(StoreOp::UpdateExitTime, e))?;
            return Err(StoreError::RowOutOfRange { index, len });
        }
        Ok(())
    }
}

/// Initializes the database schema.
///
/// This is idempotent - safe to call on an already-initialized database.
fn init(conn: &Connection) -> Result<(), DbError> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS sheets (
            label TEXT PRIMARY KEY,
            created_at TEXT NOT NULL
        );

        -- One row per spreadsheet row; c0..c5 follow the header order
        -- (Date, Name, ID, RoomName, EntryTime, ExitTime).
        CREATE TABLE IF NOT EXISTS sheet_rows (
            sheet TEXT NOT NULL,
            row_index INTEGER NOT NULL,
            c0 TEXT NOT NULL DEFAULT '',
            c1 TEXT NOT NULL DEFAULT '',
            c2 TEXT NOT NULL DEFAULT '',
            c3 TEXT NOT NULL DEFAULT '',
            c4 TEXT NOT NULL DEFAULT '',
            c5 TEXT NOT NULL DEFAULT '',
            PRIMARY KEY (sheet, row_index),
            FOREIGN KEY (sheet) REFERENCES sheets(label) ON DELETE CASCADE
        );

        CREATE INDEX IF NOT EXISTS idx_sheet_rows_match ON sheet_rows(sheet, c2, c3);
        ",
    )?;
    Ok(())
}

fn insert_row(conn: &Connection, sheet: &str, row_index: i64, cells: &[String]) -> Result<(), DbError> {
    let cell = |i: usize| cells.get(i).map_or("", String::as_str);
    // Appending before the header exists still needs the parent sheet row.
    conn.execute(
        "INSERT OR IGNORE INTO sheets (label, created_at) VALUES (?, ?)",
        params![sheet, Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)],
    )?;
    conn.execute(
        "
        INSERT INTO sheet_rows (sheet, row_index, c0, c1, c2, c3, c4, c5)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        ",
        params![
            sheet,
            row_index,
            cell(0),
            cell(1),
            cell(2),
            cell(3),
            cell(4),
            cell(EXIT_COLUMN)
        ],
    )?;
    Ok(())
}

fn read_cells(row: &rusqlite::Row<'_>) -> rusqlite::Result<Row> {
    let mut cells = Vec::with_capacity(COLUMN_COUNT);
    for i in 0..COLUMN_COUNT {
        cells.push(row.get(i)?);
    }
    Ok(cells)
}

/// Drops trailing empty cells, the way spreadsheet value reads do.
fn trim_trailing(cells: &[String]) -> &[String] {
    let end = cells
        .iter()
        .rposition(|c| !c.is_empty())
        .map_or(0, |i| i + 1);
    &cells[..end]
}
