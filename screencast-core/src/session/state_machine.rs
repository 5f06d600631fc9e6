use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::models::error::CaptureError;
use crate::models::state::SessionState;
use crate::traits::subscription::{ListenerSet, Subscription};

/// Called with `(from, to)` after the machine enters a state.
pub type EnterListener = Arc<dyn Fn(SessionState, SessionState) + Send + Sync + 'static>;

type Listener = dyn Fn(SessionState, SessionState) + Send + Sync;

const ALL_STATES: [SessionState; 7] = [
    SessionState::Idle,
    SessionState::Preparing,
    SessionState::Recording,
    SessionState::Paused,
    SessionState::Stopping,
    SessionState::Completed,
    SessionState::Error,
];

struct MachineInner {
    state: SessionState,
    starting: bool,
}

/// Session lifecycle with legal-transition enforcement.
///
/// Transitions are checked against [`SessionState::allowed_next`]; an
/// illegal one fails with `InvalidTransition` and leaves the state as it
/// was. A separate start guard rejects overlapping starts even while the
/// table would still allow them.
pub struct SessionStateMachine {
    inner: Mutex<MachineInner>,
    listeners: HashMap<SessionState, ListenerSet<Listener>>,
}

impl SessionStateMachine {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(MachineInner {
                state: SessionState::Idle,
                starting: false,
            }),
            listeners: ALL_STATES.iter().map(|s| (*s, ListenerSet::new())).collect(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.inner.lock().state
    }

    /// Move to `to`, returning the previous state.
    ///
    /// Listeners for `to` run after the lock is released.
    pub fn transition(&self, to: SessionState) -> Result<SessionState, CaptureError> {
        let from = {
            let mut inner = self.inner.lock();
            let from = inner.state;
            if !from.can_transition_to(to) {
                return Err(CaptureError::InvalidTransition { from, to });
            }
            inner.state = to;
            from
        };

        log::debug!("session {} → {}", from, to);
        if let Some(set) = self.listeners.get(&to) {
            for listener in set.snapshot() {
                listener(from, to);
            }
        }
        Ok(from)
    }

    /// Register for entries into `state`.
    pub fn on_enter(&self, state: SessionState, listener: EnterListener) -> Subscription {
        match self.listeners.get(&state) {
            Some(set) => set.add(listener),
            None => Subscription::detached(),
        }
    }

    /// Claim the start guard.
    ///
    /// Fails while another start is in flight or a session is active; the
    /// state is left untouched either way.
    pub fn try_begin_start(&self) -> Result<StartGuard<'_>, CaptureError> {
        let mut inner = self.inner.lock();
        if inner.starting || inner.state.is_active() {
            return Err(CaptureError::InvalidTransition {
                from: inner.state,
                to: SessionState::Preparing,
            });
        }
        inner.starting = true;
        Ok(StartGuard { machine: self })
    }

    pub fn is_starting(&self) -> bool {
        self.inner.lock().starting
    }
}

impl Default for SessionStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

/// Held for the duration of a start; releases the guard on drop.
#[must_use]
pub struct StartGuard<'a> {
    machine: &'a SessionStateMachine,
}

impl Drop for StartGuard<'_> {
    fn drop(&mut self) {
        self.machine.inner.lock().starting = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recording() -> SessionStateMachine {
        let machine = SessionStateMachine::new();
        machine.transition(SessionState::Preparing).unwrap();
        machine.transition(SessionState::Recording).unwrap();
        machine
    }

    #[test]
    fn full_lifecycle() {
        let machine = recording();
        for next in [
            SessionState::Paused,
            SessionState::Recording,
            SessionState::Stopping,
            SessionState::Completed,
            SessionState::Idle,
        ] {
            machine.transition(next).unwrap();
        }
        assert_eq!(machine.state(), SessionState::Idle);
    }

    #[test]
    fn illegal_transition_leaves_state() {
        let machine = SessionStateMachine::new();
        let err = machine.transition(SessionState::Recording).unwrap_err();
        assert_eq!(
            err,
            CaptureError::InvalidTransition {
                from: SessionState::Idle,
                to: SessionState::Recording
            }
        );
        assert_eq!(machine.state(), SessionState::Idle);
    }

    #[test]
    fn start_rejected_while_recording_or_preparing() {
        let machine = recording();
        assert!(machine.try_begin_start().is_err());
        assert_eq!(machine.state(), SessionState::Recording);

        let preparing = SessionStateMachine::new();
        preparing.transition(SessionState::Preparing).unwrap();
        let err = preparing.try_begin_start().err().unwrap();
        assert_eq!(
            err,
            CaptureError::InvalidTransition {
                from: SessionState::Preparing,
                to: SessionState::Preparing
            }
        );
        assert_eq!(preparing.state(), SessionState::Preparing);
    }

    #[test]
    fn overlapping_start_is_rejected_until_guard_drops() {
        let machine = SessionStateMachine::new();
        let guard = machine.try_begin_start().unwrap();
        assert!(machine.is_starting());
        assert!(machine.try_begin_start().is_err());
        assert_eq!(machine.state(), SessionState::Idle);

        drop(guard);
        assert!(!machine.is_starting());
        assert!(machine.try_begin_start().is_ok());
    }

    #[test]
    fn enter_listeners_fire_for_their_state_only() {
        let machine = SessionStateMachine::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = Arc::clone(&seen);
        let sub = machine.on_enter(
            SessionState::Recording,
            Arc::new(move |from: SessionState, to: SessionState| s.lock().push((from, to))),
        );

        machine.transition(SessionState::Preparing).unwrap();
        machine.transition(SessionState::Recording).unwrap();
        machine.transition(SessionState::Paused).unwrap();
        machine.transition(SessionState::Recording).unwrap();
        sub.unsubscribe();
        machine.transition(SessionState::Paused).unwrap();
        machine.transition(SessionState::Recording).unwrap();

        assert_eq!(
            *seen.lock(),
            vec![
                (SessionState::Preparing, SessionState::Recording),
                (SessionState::Paused, SessionState::Recording)
            ]
        );
    }
}
