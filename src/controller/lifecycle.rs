//! Controller lifecycle state machine.
//!
//! ```text
//! Unconstructed ─► Constructed ─► PreStarted ─► Started ─► PreStopped ─► Stopped
//!       │               │              ▲                                    │
//!       │               │              └────────────── restart ─────────────┤
//!       ▼               ▼                                                   ▼
//!   Destroyed ◄─────────┴───────────────────────────────────────────── Destroyed
//! ```
//!
//! The host drives every transition. `Destroyed` is terminal: a new
//! instance needs a new construct.

use crate::error::{Error, Result};

/// Where a controller instance is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LifecycleState {
    /// Created but `construct` has not succeeded yet.
    #[default]
    Unconstructed,
    /// `construct` succeeded.
    Constructed,
    /// `pre_start` has run for the stream's filters.
    PreStarted,
    /// Filters started and `post_start` has run.
    Started,
    /// `pre_stop` has run.
    PreStopped,
    /// Filters stopped and `post_stop` has run.
    Stopped,
    /// `destroy` has run; the instance is gone.
    Destroyed,
}

impl LifecycleState {
    /// Whether the state machine allows `self -> to`.
    pub fn can_transition(self, to: LifecycleState) -> bool {
        use LifecycleState::*;
        matches!(
            (self, to),
            (Unconstructed, Constructed)
                | (Unconstructed, Destroyed)
                | (Constructed, PreStarted)
                | (Constructed, Destroyed)
                | (PreStarted, Started)
                | (Started, PreStopped)
                | (PreStopped, Stopped)
                | (Stopped, PreStarted)
                | (Stopped, Destroyed)
        )
    }

    /// Move to `to`, or fail without changing state.
    pub fn transition(&mut self, to: LifecycleState) -> Result<()> {
        if !self.can_transition(to) {
            return Err(Error::InvalidTransition { from: *self, to });
        }
        *self = to;
        Ok(())
    }

    /// Whether the instance is between `pre_start` and `post_stop`.
    pub fn is_active(self) -> bool {
        matches!(
            self,
            LifecycleState::PreStarted | LifecycleState::Started | LifecycleState::PreStopped
        )
    }

    /// Whether no further transition is possible.
    pub fn is_terminal(self) -> bool {
        self == LifecycleState::Destroyed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use LifecycleState::*;

    #[test]
    fn test_full_cycle() {
        let mut state = LifecycleState::default();
        for next in [Constructed, PreStarted, Started, PreStopped, Stopped, Destroyed] {
            state.transition(next).unwrap();
        }
        assert!(state.is_terminal());
    }

    #[test]
    fn test_restart_allowed() {
        let mut state = Stopped;
        state.transition(PreStarted).unwrap();
        assert!(state.is_active());
    }

    #[test]
    fn test_no_skipping_or_going_back() {
        assert!(!Constructed.can_transition(Started));
        assert!(!Started.can_transition(PreStarted));
        assert!(!PreStarted.can_transition(PreStopped));
        assert!(!Started.can_transition(Destroyed));
    }

    #[test]
    fn test_destroyed_is_terminal() {
        for to in [
            Unconstructed,
            Constructed,
            PreStarted,
            Started,
            PreStopped,
            Stopped,
            Destroyed,
        ] {
            assert!(!Destroyed.can_transition(to));
        }
    }

    #[test]
    fn test_failed_transition_keeps_state() {
        let mut state = Constructed;
        let err = state.transition(Stopped).unwrap_err();
        assert_eq!(
            err,
            Error::InvalidTransition {
                from: Constructed,
                to: Stopped
            }
        );
        assert_eq!(state, Constructed);
    }
}
