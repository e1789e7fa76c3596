use serde::Serialize;
use thiserror::Error;
use utoipa::ToSchema;

/// Phases of a sync session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    /// No identity; every mutation is refused.
    Unauthenticated,
    /// Identity established, initial read in flight.
    Loading,
    /// Initial state applied and the subscription is open.
    Live,
}

/// Events that drive the session machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// An identity was installed.
    SignedIn,
    /// The initial read completed and the subscription is open.
    Loaded,
    /// The initial read or subscribe failed.
    LoadFailed,
    /// The identity was removed or the engine is shutting down.
    SignedOut,
}

/// Error returned when an event is not valid from the current phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid session transition: {event:?} cannot be applied while {from:?}")]
pub struct InvalidTransition {
    /// Phase the machine was in.
    pub from: SessionPhase,
    /// Event that was refused.
    pub event: SessionEvent,
}

/// Point-in-time view of the session machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub struct SessionSnapshot {
    /// Current phase.
    pub phase: SessionPhase,
    /// Incremented on every applied transition.
    pub version: u64,
}

/// Session lifecycle as an explicit transition table.
#[derive(Debug, Clone)]
pub struct SessionMachine {
    phase: SessionPhase,
    version: u64,
}

impl Default for SessionMachine {
    fn default() -> Self {
        Self {
            phase: SessionPhase::Unauthenticated,
            version: 0,
        }
    }
}

impl SessionMachine {
    /// Machine in the `Unauthenticated` phase.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current phase.
    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    /// Phase together with the transition counter.
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            phase: self.phase,
            version: self.version,
        }
    }

    /// Apply `event`, returning the new phase.
    pub fn apply(&mut self, event: SessionEvent) -> Result<SessionPhase, InvalidTransition> {
        self.phase = self.compute_transition(event)?;
        self.version += 1;
        Ok(self.phase)
    }

    fn compute_transition(&self, event: SessionEvent) -> Result<SessionPhase, InvalidTransition> {
        let next = match (self.phase, event) {
            (SessionPhase::Unauthenticated, SessionEvent::SignedIn) => SessionPhase::Loading,
            (SessionPhase::Loading, SessionEvent::Loaded) => SessionPhase::Live,
            (SessionPhase::Loading, SessionEvent::LoadFailed) => SessionPhase::Unauthenticated,
            (SessionPhase::Loading | SessionPhase::Live, SessionEvent::SignedOut) => {
                SessionPhase::Unauthenticated
            }
            (from, event) => return Err(InvalidTransition { from, event }),
        };

        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_phase_is_unauthenticated() {
        let sm = SessionMachine::new();
        assert_eq!(sm.phase(), SessionPhase::Unauthenticated);
        assert_eq!(sm.snapshot().version, 0);
    }

    #[test]
    fn happy_path_and_sign_out() {
        let mut sm = SessionMachine::new();
        assert_eq!(sm.apply(SessionEvent::SignedIn), Ok(SessionPhase::Loading));
        assert_eq!(sm.apply(SessionEvent::Loaded), Ok(SessionPhase::Live));
        assert_eq!(
            sm.apply(SessionEvent::SignedOut),
            Ok(SessionPhase::Unauthenticated)
        );
        assert_eq!(sm.snapshot().version, 3);
    }

    #[test]
    fn failed_load_returns_to_unauthenticated() {
        let mut sm = SessionMachine::new();
        sm.apply(SessionEvent::SignedIn).unwrap();
        assert_eq!(
            sm.apply(SessionEvent::LoadFailed),
            Ok(SessionPhase::Unauthenticated)
        );
    }

    #[test]
    fn invalid_transition_leaves_the_phase_untouched() {
        let mut sm = SessionMachine::new();
        sm.apply(SessionEvent::SignedIn).unwrap();
        sm.apply(SessionEvent::Loaded).unwrap();

        let err = sm.apply(SessionEvent::SignedIn).unwrap_err();
        assert_eq!(err.from, SessionPhase::Live);
        assert_eq!(err.event, SessionEvent::SignedIn);
        assert_eq!(sm.phase(), SessionPhase::Live);
        assert_eq!(sm.snapshot().version, 2);

        let mut fresh = SessionMachine::new();
        assert!(fresh.apply(SessionEvent::SignedOut).is_err());
    }
}
