use std::fmt;

use super::progress::ProgressEvent;

pub const INIT_MSG: &str = "Initializing deletion process...";
pub const REVOKE_SESSIONS_MSG: &str = "Revoking active sessions...";
pub const DELETE_DATA_MSG: &str = "Removing user data...";
pub const COMPLETE_MSG: &str = "Your account has been permanently deleted";

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RunState {
    Unauthenticated,
    Verified,
    RateChecked,
    ReauthPassed,
    Locked,
    Revoking,
    Erasing,
    Finalizing,
    Deleted,
    Failed,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Signal {
    IdentityVerified,
    RateAllowed,
    ReauthSucceeded,
    LockAcquired,
    RevocationStarted,
    RevocationJoined,
    ErasureSucceeded,
    Finalized,
    Fault(String),
}

#[derive(Debug, PartialEq)]
pub struct Transition {
    pub state: RunState,
    pub event: Option<ProgressEvent>,
}

#[derive(Debug, Eq, PartialEq)]
pub struct TransitionError {
    pub from: RunState,
    pub signal: Signal,
}

impl std::error::Error for TransitionError {}

impl fmt::Display for TransitionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "TransitionError: {:?} cannot accept {:?}",
            self.from, self.signal
        )
    }
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Deleted | RunState::Failed)
    }

    /// States after the ledger lock. Failures here are persisted and streamed rather than
    /// answered directly.
    pub fn is_streaming(&self) -> bool {
        matches!(
            self,
            RunState::Locked | RunState::Revoking | RunState::Erasing | RunState::Finalizing
        )
    }

    pub fn next(self, signal: Signal) -> Result<Transition, TransitionError> {
        let (state, event) = match (self, &signal) {
            (RunState::Unauthenticated, Signal::IdentityVerified) => (RunState::Verified, None),
            (RunState::Verified, Signal::RateAllowed) => (RunState::RateChecked, None),
            (RunState::RateChecked, Signal::ReauthSucceeded) => (RunState::ReauthPassed, None),
            (RunState::ReauthPassed, Signal::LockAcquired) => (
                RunState::Locked,
                Some(ProgressEvent::progress("init", INIT_MSG)),
            ),
            (RunState::Locked, Signal::RevocationStarted) => (
                RunState::Revoking,
                Some(ProgressEvent::progress("revoke_sessions", REVOKE_SESSIONS_MSG)),
            ),
            (RunState::Revoking, Signal::RevocationJoined) => (
                RunState::Erasing,
                Some(ProgressEvent::progress("delete_data", DELETE_DATA_MSG)),
            ),
            (RunState::Erasing, Signal::ErasureSucceeded) => (RunState::Finalizing, None),
            (RunState::Finalizing, Signal::Finalized) => {
                (RunState::Deleted, Some(ProgressEvent::complete(COMPLETE_MSG)))
            }
            (from, Signal::Fault(error)) if from.is_streaming() => {
                (RunState::Failed, Some(ProgressEvent::error(error)))
            }
            _ => return Err(TransitionError { from: self, signal }),
        };

        Ok(Transition { state, event })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::progress::EventType;

    #[test]
    fn test_happy_path_transitions() {
        let signals = [
            (Signal::IdentityVerified, RunState::Verified, None),
            (Signal::RateAllowed, RunState::RateChecked, None),
            (Signal::ReauthSucceeded, RunState::ReauthPassed, None),
            (Signal::LockAcquired, RunState::Locked, Some("init")),
            (Signal::RevocationStarted, RunState::Revoking, Some("revoke_sessions")),
            (Signal::RevocationJoined, RunState::Erasing, Some("delete_data")),
            (Signal::ErasureSucceeded, RunState::Finalizing, None),
        ];

        let mut state = RunState::Unauthenticated;
        for (signal, expected_state, expected_step) in signals {
            let transition = state.next(signal).unwrap();
            assert_eq!(transition.state, expected_state);
            assert_eq!(
                transition.event.as_ref().and_then(|e| e.step()),
                expected_step
            );
            state = transition.state;
        }

        let transition = state.next(Signal::Finalized).unwrap();
        assert_eq!(transition.state, RunState::Deleted);
        assert_eq!(
            transition.event.unwrap().event_type,
            EventType::Complete
        );
        assert!(transition.state.is_terminal());
    }

    #[test]
    fn test_fault_only_fails_streaming_states() {
        for state in [
            RunState::Locked,
            RunState::Revoking,
            RunState::Erasing,
            RunState::Finalizing,
        ] {
            let transition = state.next(Signal::Fault(String::from("boom"))).unwrap();
            assert_eq!(transition.state, RunState::Failed);

            let event = transition.event.unwrap();
            assert_eq!(event.event_type, EventType::Error);
            assert_eq!(event.payload["error"], "boom");
        }

        for state in [
            RunState::Unauthenticated,
            RunState::Verified,
            RunState::RateChecked,
            RunState::ReauthPassed,
            RunState::Deleted,
            RunState::Failed,
        ] {
            assert!(state.next(Signal::Fault(String::from("boom"))).is_err());
        }
    }

    #[test]
    fn test_out_of_order_signals_are_rejected() {
        assert_eq!(
            RunState::Verified.next(Signal::LockAcquired),
            Err(TransitionError {
                from: RunState::Verified,
                signal: Signal::LockAcquired,
            })
        );
        assert!(RunState::Unauthenticated.next(Signal::RateAllowed).is_err());
        assert!(RunState::Locked.next(Signal::ErasureSucceeded).is_err());
        assert!(RunState::Erasing.next(Signal::Finalized).is_err());
        assert!(RunState::Deleted.next(Signal::IdentityVerified).is_err());
        assert!(RunState::Failed.next(Signal::RevocationStarted).is_err());
    }
}
