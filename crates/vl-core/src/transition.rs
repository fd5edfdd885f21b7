//! Classification of membership changes.

use std::fmt;

use crate::types::Room;

/// What a before/after membership pair means for interval tracking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// Joined a room from no room.
    Enter { room: Room },
    /// Left a room for no room.
    Leave { room: Room },
    /// Switched directly from one room to another.
    Move { from: Room, to: Room },
    /// Nothing interval-relevant changed (mute, deafen, rename, ...).
    NoOp,
}

impl Transition {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Enter { .. } => "enter",
            Self::Leave { .. } => "leave",
            Self::Move { .. } => "move",
            Self::NoOp => "noop",
        }
    }
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classifies a membership change.
///
/// Rooms are compared by ID only, so a room renamed between the two snapshots
/// is still the same room.
pub fn classify(before: Option<&Room>, after: Option<&Room>) -> Transition {
    match (before, after) {
        (None, Some(to)) => Transition::Enter { room: to.clone() },
        (Some(from), None) => Transition::Leave { room: from.clone() },
        (Some(from), Some(to)) if !from.same_as(to) => Transition::Move {
            from: from.clone(),
            to: to.clone(),
        },
        _ => Transition::NoOp,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RoomId;

    fn room(id: u64, name: &str) -> Room {
        Room::new(RoomId::from(id), name)
    }

    #[test]
    fn none_to_room_is_enter() {
        let general = room(1, "General");
        assert_eq!(
            classify(None, Some(&general)),
            Transition::Enter { room: general }
        );
    }

    #[test]
    fn room_to_none_is_leave() {
        let general = room(1, "General");
        assert_eq!(
            classify(Some(&general), None),
            Transition::Leave { room: general }
        );
    }

    #[test]
    fn room_to_other_room_is_move() {
        let lounge = room(1, "Lounge");
        let study = room(2, "Study");
        assert_eq!(
            classify(Some(&lounge), Some(&study)),
            Transition::Move {
                from: lounge,
                to: study
            }
        );
    }

    #[test]
    fn unchanged_or_absent_is_noop() {
        let lounge = room(1, "Lounge");
        assert_eq!(classify(Some(&lounge), Some(&lounge)), Transition::NoOp);
        assert_eq!(classify(None, None), Transition::NoOp);
    }

    #[test]
    fn rename_without_moving_is_noop() {
        let before = room(1, "Lounge");
        let after = room(1, "Chill Lounge");
        assert_eq!(classify(Some(&before), Some(&after)), Transition::NoOp);
    }

    #[test]
    fn same_name_different_id_is_move() {
        let a = room(1, "Voice");
        let b = room(2, "Voice");
        assert_eq!(classify(Some(&a), Some(&b)).as_str(), "move");
    }
}
