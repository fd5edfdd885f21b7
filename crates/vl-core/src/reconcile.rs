//! Interval reconciliation.
//!
//! Turns classified transitions into store mutations:
//!
//! - Enter appends an open row and records the entry in the index.
//! - Leave scans the stored rows from newest to oldest for the first open row
//!   with the same participant ID and room name, fills its exit time, and
//!   forgets the index entry. When several open rows match, the most recent
//!   one is closed; older duplicates stay open.
//! - Move is Leave on the old room followed by Enter on the new one, with the
//!   same stamp. Each half runs even if the other fails.
//!
//! # Locking
//!
//! Every handler holds one reconciler-wide lock from its first store call to
//! its last, so two concurrent Leaves can never both claim the same open row.
//! Event rates are low enough that a single lock costs nothing noticeable.

use tokio::sync::Mutex;

use crate::clock::Stamp;
use crate::event::TransitionEvent;
use crate::index::{IntervalKey, OpenIntervalIndex};
use crate::record::{IntervalRecord, row_is_open_for};
use crate::store::{IntervalStore, StoreError};
use crate::transition::{Transition, classify};
use crate::types::{Participant, Room};

/// Result of a Leave.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseOutcome {
    /// The row at `index` was closed.
    Closed {
        index: usize,
        record: IntervalRecord,
    },
    /// No open row matched; nothing was changed.
    Missed,
}

impl CloseOutcome {
    pub const fn is_closed(&self) -> bool {
        matches!(self, Self::Closed { .. })
    }
}

/// Result of a Move; each half is reported on its own.
#[derive(Debug)]
pub struct MoveOutcome {
    pub leave: Result<CloseOutcome, StoreError>,
    pub enter: Result<(), StoreError>,
}

/// Result of applying one transition event.
#[derive(Debug)]
pub enum ApplyOutcome {
    Ignored,
    Entered(Result<(), StoreError>),
    Left(Result<CloseOutcome, StoreError>),
    Moved(MoveOutcome),
}

impl ApplyOutcome {
    /// Returns `true` if any store call failed.
    pub const fn has_store_error(&self) -> bool {
        match self {
            Self::Ignored => false,
            Self::Entered(r) => r.is_err(),
            Self::Left(r) => r.is_err(),
            Self::Moved(m) => m.leave.is_err() || m.enter.is_err(),
        }
    }

    /// Returns `true` if a Leave (or the leave half of a Move) found nothing to close.
    pub const fn is_miss(&self) -> bool {
        match self {
            Self::Left(Ok(CloseOutcome::Missed)) => true,
            Self::Moved(m) => matches!(m.leave, Ok(CloseOutcome::Missed)),
            _ => false,
        }
    }
}

/// Owns the open-interval index and drives a store.
pub struct Reconciler<S> {
    store: S,
    index: Mutex<OpenIntervalIndex>,
}

impl<S: IntervalStore> Reconciler<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            index: Mutex::new(OpenIntervalIndex::new()),
        }
    }

    pub const fn store(&self) -> &S {
        &self.store
    }

    /// Snapshot of the index, sorted by key.
    pub async fn open_intervals(&self) -> Vec<(IntervalKey, String)> {
        self.index.lock().await.sorted()
    }

    /// Classifies `event` and runs the matching handler.
    pub async fn apply(&self, event: &TransitionEvent, stamp: &Stamp) -> ApplyOutcome {
        let participant = &event.participant;
        match classify(event.before.as_ref(), event.after.as_ref()) {
            Transition::Enter { room } => {
                ApplyOutcome::Entered(self.handle_enter(participant, &room, stamp).await)
            }
            Transition::Leave { room } => {
                ApplyOutcome::Left(self.handle_leave(participant, &room, stamp).await)
            }
            Transition::Move { from, to } => {
                ApplyOutcome::Moved(self.handle_move(participant, &from, &to, stamp).await)
            }
            Transition::NoOp => {
                tracing::debug!(participant_id = %participant.id, "membership unchanged, ignoring");
                ApplyOutcome::Ignored
            }
        }
    }

    /// Opens an interval.
    ///
    /// An existing index entry for the same key is overwritten and a new row
    /// is appended regardless; duplicates are not rejected.
    pub async fn handle_enter(
        &self,
        participant: &Participant,
        room: &Room,
        stamp: &Stamp,
    ) -> Result<(), StoreError> {
        let mut index = self.index.lock().await;
        self.enter_locked(&mut index, participant, room, stamp).await
    }

    /// Closes the most recent open interval for the participant in the room.
    pub async fn handle_leave(
        &self,
        participant: &Participant,
        room: &Room,
        stamp: &Stamp,
    ) -> Result<CloseOutcome, StoreError> {
        let mut index = self.index.lock().await;
        self.leave_locked(&mut index, participant, room, stamp).await
    }

    /// Closes the interval in `from`, then opens one in `to`.
    pub async fn handle_move(
        &self,
        participant: &Participant,
        from: &Room,
        to: &Room,
        stamp: &Stamp,
    ) -> MoveOutcome {
        tracing::info!(
            participant_id = %participant.id,
            name = %participant.name,
            from = %from.name,
            to = %to.name,
            time = %stamp.time,
            "moved"
        );
        let mut index = self.index.lock().await;
        let leave = self.leave_locked(&mut index, participant, from, stamp).await;
        let enter = self.enter_locked(&mut index, participant, to, stamp).await;
        MoveOutcome { leave, enter }
    }

    async fn enter_locked(
        &self,
        index: &mut OpenIntervalIndex,
        participant: &Participant,
        room: &Room,
        stamp: &Stamp,
    ) -> Result<(), StoreError> {
        let key = IntervalKey::new(participant.id.clone(), room.id.clone());
        if let Some(previous) = index.put(key, stamp.time.clone()) {
            tracing::debug!(
                participant_id = %participant.id,
                room = %room.name,
                previous = %previous,
                "replacing open index entry"
            );
        }

        let record = IntervalRecord {
            date: stamp.date.clone(),
            name: participant.name.clone(),
            participant_id: participant.id.to_string(),
            room_name: room.name.clone(),
            entry_time: stamp.time.clone(),
            exit_time: String::new(),
        };
        match self.store.append(&record).await {
            Ok(()) => {
                tracing::info!(
                    participant_id = %participant.id,
                    name = %participant.name,
                    room = %room.name,
                    time = %stamp.time,
                    "entered"
                );
                Ok(())
            }
            Err(e) => {
                tracing::error!(
                    participant_id = %participant.id,
                    room = %room.name,
                    error = %e,
                    "failed to record entry"
                );
                Err(e)
            }
        }
    }

    async fn leave_locked(
        &self,
        index: &mut OpenIntervalIndex,
        participant: &Participant,
        room: &Room,
        stamp: &Stamp,
    ) -> Result<CloseOutcome, StoreError> {
        let result = self.close_latest_open(participant, room, stamp).await;
        match &result {
            Ok(CloseOutcome::Closed { index: row, record }) => {
                index.remove(&IntervalKey::new(participant.id.clone(), room.id.clone()));
                tracing::info!(
                    participant_id = %participant.id,
                    name = %record.name,
                    room = %room.name,
                    row,
                    entry = %record.entry_time,
                    time = %stamp.time,
                    "left"
                );
            }
            Ok(CloseOutcome::Missed) => {
                tracing::warn!(
                    participant_id = %participant.id,
                    room = %room.name,
                    time = %stamp.time,
                    "no open interval to close"
                );
            }
            Err(e) => {
                tracing::error!(
                    participant_id = %participant.id,
                    room = %room.name,
                    error = %e,
                    "failed to record exit"
                );
            }
        }
        result
    }

    async fn close_latest_open(
        &self,
        participant: &Participant,
        room: &Room,
        stamp: &Stamp,
    ) -> Result<CloseOutcome, StoreError> {
        let rows = self.store.read_all().await?;
        let participant_id = participant.id.as_str();
        // Row 0 is the header.
        let Some(row) =
            (1..rows.len()).rev().find(|&i| row_is_open_for(&rows[i], participant_id, &room.name))
        else {
            return Ok(CloseOutcome::Missed);
        };

        self.store.update_exit_time(row, &stamp.time).await?;
        let mut record = IntervalRecord::from_row(&rows[row]);
        record.exit_time.clone_from(&stamp.time);
        Ok(CloseOutcome::Closed { index: row, record })
    }
}
