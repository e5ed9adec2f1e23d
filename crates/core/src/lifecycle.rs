//! Session lifecycle state machine.
//!
//! ```text
//!   (human, no doctor)
//!   ┌─────────┐  assign doctor   ┌───────────┐   doctor start   ┌─────────────┐
//!   │ Pending │─────────────────▶│ Scheduled │─────────────────▶│ In progress │
//!   └────┬────┘                  └─────┬─────┘                  └──────┬──────┘
//!        │                             │                               │
//!        │ cancel                      │ cancel                        │ complete
//!        ▼                             ▼                               ▼
//!   ┌───────────┐◀─────────────────────┘                        ┌───────────┐
//!   │ Cancelled │                                               │ Completed │
//!   └───────────┘                                               └───────────┘
//! ```
//!
//! Completion requested by the client may also leave `Pending` or `Scheduled`
//! directly; completion requested by the doctor requires `InProgress`.

use thiserror::Error;

use crate::model::SessionStatus;

/// Who is asking to complete a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletedBy {
    /// The doctor endpoint: only an in-progress session can be completed.
    Doctor,
    /// The client endpoint: client-led sessions never pass through a doctor start.
    Client,
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("cannot transition session from {from} to {to}")]
pub struct TransitionError {
    pub from: SessionStatus,
    pub to: SessionStatus,
}

/// Check if a transition is allowed by the state machine, for any actor.
#[must_use]
pub const fn is_valid_transition(from: SessionStatus, to: SessionStatus) -> bool {
    use SessionStatus::{Cancelled, Completed, InProgress, Pending, Scheduled};

    matches!(
        (from, to),
        (Pending, Scheduled)
            | (Scheduled, InProgress)
            | (Pending | Scheduled | InProgress, Completed)
            | (Pending | Scheduled, Cancelled)
    )
}

/// Returns the statuses from which `actor` may complete a session.
#[must_use]
pub const fn can_complete(from: SessionStatus, actor: CompletedBy) -> bool {
    match actor {
        CompletedBy::Doctor => matches!(from, SessionStatus::InProgress),
        CompletedBy::Client => is_valid_transition(from, SessionStatus::Completed),
    }
}

/// Validates a transition and returns the target status if allowed.
///
/// # Errors
///
/// Returns `TransitionError` if the edge is not part of the state machine.
pub fn validate_transition(
    from: SessionStatus,
    to: SessionStatus,
) -> Result<SessionStatus, TransitionError> {
    if is_valid_transition(from, to) {
        Ok(to)
    } else {
        Err(TransitionError { from, to })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use SessionStatus::*;

    const ALL: [SessionStatus; 5] = [Scheduled, Pending, InProgress, Completed, Cancelled];

    #[test]
    fn allowed_edges() {
        assert!(is_valid_transition(Pending, Scheduled));
        assert!(is_valid_transition(Scheduled, InProgress));
        assert!(is_valid_transition(InProgress, Completed));
        assert!(is_valid_transition(Scheduled, Cancelled));
        assert!(is_valid_transition(Pending, Cancelled));
    }

    #[test]
    fn rejected_edges() {
        assert!(!is_valid_transition(InProgress, Scheduled));
        assert!(!is_valid_transition(InProgress, Cancelled));
        assert!(!is_valid_transition(Pending, InProgress));
        assert!(!is_valid_transition(Completed, Completed));
        assert!(!is_valid_transition(Cancelled, Scheduled));
    }

    #[test]
    fn terminal_statuses_have_no_exits() {
        for to in ALL {
            assert!(!is_valid_transition(Completed, to));
            assert!(!is_valid_transition(Cancelled, to));
        }
    }

    #[test]
    fn doctor_completion_requires_in_progress() {
        assert!(can_complete(InProgress, CompletedBy::Doctor));
        assert!(!can_complete(Scheduled, CompletedBy::Doctor));
        assert!(!can_complete(Pending, CompletedBy::Doctor));
    }

    // Client completion skips the doctor start on purpose; keep this visible.
    #[test]
    fn client_completion_accepts_any_open_status() {
        assert!(can_complete(Scheduled, CompletedBy::Client));
        assert!(can_complete(Pending, CompletedBy::Client));
        assert!(can_complete(InProgress, CompletedBy::Client));
        assert!(!can_complete(Completed, CompletedBy::Client));
        assert!(!can_complete(Cancelled, CompletedBy::Client));
    }

    #[test]
    fn validate_reports_both_ends() {
        let err = validate_transition(Completed, InProgress).unwrap_err();
        assert_eq!(err.from, Completed);
        assert_eq!(err.to, InProgress);
        assert_eq!(
            err.to_string(),
            "cannot transition session from completed to in_progress"
        );
    }
}
