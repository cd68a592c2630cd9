use thiserror::Error;

use crate::dao::models::DuelStatus;

/// Events that drive a duel through its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DuelEvent {
    /// Opponent commits to a pending challenge.
    Accept,
    /// The contest begins and the duel timer is armed.
    Start,
    /// The contest is settled (timer elapsed or both scores reported).
    Finish,
    /// Opponent refuses a pending challenge.
    Decline,
    /// A participant withdraws before the contest starts.
    Cancel,
}

/// Error returned when attempting to apply an invalid transition.
///
/// Status transitions are monotonic: once a duel leaves a status there is no
/// edge leading back to it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid transition: {event:?} cannot be applied while {from:?}")]
pub struct InvalidTransition {
    /// The status the duel was in when the invalid event was received.
    pub from: DuelStatus,
    /// The event that cannot be applied from this status.
    pub event: DuelEvent,
}

/// Compute the next status for an event, rejecting anything outside the
/// lifecycle table.
pub fn advance(from: DuelStatus, event: DuelEvent) -> Result<DuelStatus, InvalidTransition> {
    let next = match (from, event) {
        (DuelStatus::Pending, DuelEvent::Accept) => DuelStatus::Waiting,
        (DuelStatus::Waiting, DuelEvent::Start) => DuelStatus::InProgress,
        (DuelStatus::InProgress, DuelEvent::Finish) => DuelStatus::Completed,
        (DuelStatus::Pending, DuelEvent::Decline) => DuelStatus::Declined,
        (DuelStatus::Pending | DuelStatus::Waiting, DuelEvent::Cancel) => DuelStatus::Cancelled,
        (from, event) => return Err(InvalidTransition { from, event }),
    };

    Ok(next)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_through_settlement() {
        let mut status = DuelStatus::Pending;
        for (event, expected) in [
            (DuelEvent::Accept, DuelStatus::Waiting),
            (DuelEvent::Start, DuelStatus::InProgress),
            (DuelEvent::Finish, DuelStatus::Completed),
        ] {
            status = advance(status, event).unwrap();
            assert_eq!(status, expected);
        }
    }

    #[test]
    fn decline_only_from_pending() {
        assert_eq!(
            advance(DuelStatus::Pending, DuelEvent::Decline).unwrap(),
            DuelStatus::Declined
        );
        let err = advance(DuelStatus::Waiting, DuelEvent::Decline).unwrap_err();
        assert_eq!(err.from, DuelStatus::Waiting);
        assert_eq!(err.event, DuelEvent::Decline);
    }

    #[test]
    fn cancel_reachable_only_before_start() {
        assert_eq!(
            advance(DuelStatus::Pending, DuelEvent::Cancel).unwrap(),
            DuelStatus::Cancelled
        );
        assert_eq!(
            advance(DuelStatus::Waiting, DuelEvent::Cancel).unwrap(),
            DuelStatus::Cancelled
        );
        assert!(advance(DuelStatus::InProgress, DuelEvent::Cancel).is_err());
    }

    #[test]
    fn terminal_statuses_accept_no_events() {
        for terminal in [
            DuelStatus::Completed,
            DuelStatus::Declined,
            DuelStatus::Cancelled,
        ] {
            for event in [
                DuelEvent::Accept,
                DuelEvent::Start,
                DuelEvent::Finish,
                DuelEvent::Decline,
                DuelEvent::Cancel,
            ] {
                assert!(advance(terminal, event).is_err(), "{terminal:?} {event:?}");
            }
        }
    }

    #[test]
    fn no_backward_edges() {
        // in_progress cannot return to waiting, completed cannot reopen.
        assert!(advance(DuelStatus::InProgress, DuelEvent::Accept).is_err());
        assert!(advance(DuelStatus::Completed, DuelEvent::Start).is_err());
    }
}
