//! The durable unit: one occupancy interval per row.

use serde::{Deserialize, Serialize};

/// Label of the table every store writes to unless configured otherwise.
pub const DEFAULT_SHEET_NAME: &str = "VoiceLog";

/// Column headers, in storage order.
pub const HEADER: [&str; 6] = ["Date", "Name", "ID", "RoomName", "EntryTime", "ExitTime"];

/// Number of columns in a row.
pub const COLUMN_COUNT: usize = HEADER.len();

/// Zero-based position of the participant ID cell.
pub const ID_COLUMN: usize = 2;
/// Zero-based position of the room name cell.
pub const ROOM_COLUMN: usize = 3;
/// Zero-based position of the exit time cell.
pub const EXIT_COLUMN: usize = 5;

/// A row of raw cells as read from a store.
pub type Row = Vec<String>;

/// Returns the expected header as an owned row.
pub fn header_row() -> Row {
    HEADER.iter().map(ToString::to_string).collect()
}

/// One continuous occupancy span.
///
/// Names and the date are snapshots from the entry event. `exit_time` is empty
/// while the interval is open.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntervalRecord {
    pub date: String,
    pub name: String,
    pub participant_id: String,
    pub room_name: String,
    pub entry_time: String,
    #[serde(default)]
    pub exit_time: String,
}

impl IntervalRecord {
    pub fn is_open(&self) -> bool {
        self.exit_time.is_empty()
    }

    /// Converts to cells in [`HEADER`] order.
    pub fn to_row(&self) -> Row {
        vec![
            self.date.clone(),
            self.name.clone(),
            self.participant_id.clone(),
            self.room_name.clone(),
            self.entry_time.clone(),
            self.exit_time.clone(),
        ]
    }

    /// Reads a record from raw cells.
    ///
    /// Stores trim trailing empty cells, so short rows are padded with empty
    /// strings: a row without an exit cell is an open interval.
    pub fn from_row(row: &[String]) -> Self {
        let cell = |i: usize| row.get(i).cloned().unwrap_or_default();
        Self {
            date: cell(0),
            name: cell(1),
            participant_id: cell(ID_COLUMN),
            room_name: cell(ROOM_COLUMN),
            entry_time: cell(4),
            exit_time: cell(EXIT_COLUMN),
        }
    }
}

/// Returns `true` if `row` is an open interval for the participant in the
/// named room.
pub fn row_is_open_for(row: &[String], participant_id: &str, room_name: &str) -> bool {
    let cell = |i: usize| row.get(i).map_or("", String::as_str);
    cell(ID_COLUMN) == participant_id && cell(ROOM_COLUMN) == room_name && cell(EXIT_COLUMN).is_empty()
}
