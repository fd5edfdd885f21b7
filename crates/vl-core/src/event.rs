//! Transition events as delivered by an event source.

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

use crate::clock::{Clock, Stamp};
use crate::types::{Participant, Room};

/// A participant's membership immediately before and after a change.
///
/// Serialized one per line (JSON Lines) by event sources:
///
/// ```json
/// {"participant":{"id":"1","name":"alice"},"before":null,"after":{"id":"10","name":"General"}}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionEvent {
    pub participant: Participant,
    #[serde(default)]
    pub before: Option<Room>,
    #[serde(default)]
    pub after: Option<Room>,
    /// When the change happened. Sources that cannot tell leave this out and
    /// the time of processing is used instead.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub at: Option<DateTime<FixedOffset>>,
}

impl TransitionEvent {
    pub const fn new(participant: Participant, before: Option<Room>, after: Option<Room>) -> Self {
        Self {
            participant,
            before,
            after,
            at: None,
        }
    }

    /// Stamps the event in the clock's offset.
    pub fn stamp(&self, clock: &dyn Clock) -> Stamp {
        self.at
            .as_ref()
            .map_or_else(|| clock.now(), |at| Stamp::at(at, clock.offset()))
    }
}
