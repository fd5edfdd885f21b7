//! Core domain logic for the voice log.
//!
//! This crate contains the fundamental types and logic for:
//! - Classification: turning before/after room membership into Enter, Leave or Move
//! - Reconciliation: opening interval rows and closing the right one later
//! - The store contract every backend implements

pub mod clock;
pub mod event;
pub mod index;
pub mod record;
mod reconcile;
pub mod store;
pub mod transition;
pub mod types;

pub use clock::{Clock, FixedClock, Stamp, SystemClock};
pub use event::TransitionEvent;
pub use index::{IntervalKey, OpenIntervalIndex};
pub use reconcile::{ApplyOutcome, CloseOutcome, MoveOutcome, Reconciler};
pub use record::{HEADER, IntervalRecord, Row};
pub use store::{HeaderStatus, IntervalStore, MemoryStore, StoreError, StoreOp};
pub use transition::{Transition, classify};
pub use types::{Participant, ParticipantId, Room, RoomId, ValidationError};
