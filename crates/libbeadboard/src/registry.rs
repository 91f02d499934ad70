use crate::error::OrchestratorError;
use beadboard_proto::{BeadId, SessionInfo, SessionState};
use std::collections::HashMap;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// One live session: the bead's execution context plus the handles needed
/// to tear its monitor loop down deterministically.
pub struct Session {
    pub info: SessionInfo,
    /// Cancels the monitor loop; cancellation is idempotent.
    pub(crate) cancel: CancellationToken,
    /// Awaited on stop so no stale event can outlive the session.
    pub(crate) monitor: Option<JoinHandle<()>>,
}

impl Session {
    pub(crate) fn new(info: SessionInfo, cancel: CancellationToken) -> Self {
        Self {
            info,
            cancel,
            monitor: None,
        }
    }

    /// User-requested pause. Legal from Busy or Waiting.
    pub(crate) fn request_pause(
        &mut self,
    ) -> Result<(SessionState, SessionState), OrchestratorError> {
        match self.info.state {
            SessionState::Busy | SessionState::Waiting => {
                let from = self.info.state;
                self.info.state = SessionState::Paused;
                Ok((from, SessionState::Paused))
            }
            state => Err(OrchestratorError::InvalidTransition {
                bead_id: self.info.bead_id.clone(),
                state,
                requested: "pause",
            }),
        }
    }

    /// User-requested resume. Legal only from Paused.
    pub(crate) fn request_resume(
        &mut self,
    ) -> Result<(SessionState, SessionState), OrchestratorError> {
        match self.info.state {
            SessionState::Paused => {
                self.info.state = SessionState::Busy;
                Ok((SessionState::Paused, SessionState::Busy))
            }
            state => Err(OrchestratorError::InvalidTransition {
                bead_id: self.info.bead_id.clone(),
                state,
                requested: "resume",
            }),
        }
    }

    /// Apply a monitor observation. Returns the transition when the state
    /// actually changed, `None` otherwise — callers emit an event only on
    /// `Some`, which is what keeps consecutive identical states from ever
    /// reaching the presentation queue.
    ///
    /// Paused is user-owned: the monitor may only pull a paused session
    /// into Error (dead pane). Done sticks the same way. Error may recover
    /// to any observed state once captures succeed again.
    pub(crate) fn apply_observed(
        &mut self,
        observed: SessionState,
    ) -> Option<(SessionState, SessionState)> {
        let current = self.info.state;
        if observed == current {
            return None;
        }
        let allowed = match current {
            SessionState::Paused | SessionState::Done => observed == SessionState::Error,
            SessionState::Idle
            | SessionState::Busy
            | SessionState::Waiting
            | SessionState::Error => true,
        };
        if !allowed {
            return None;
        }
        self.info.state = observed;
        Some((current, observed))
    }
}

/// In-memory table of active sessions, keyed by bead id. The narrow
/// surface here is the only way to mutate it; at most one entry per bead
/// can ever exist.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: HashMap<BeadId, Session>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new session. Rejects a second session for the same bead.
    pub(crate) fn insert(&mut self, session: Session) -> Result<(), OrchestratorError> {
        let bead_id = session.info.bead_id.clone();
        if self.sessions.contains_key(&bead_id) {
            return Err(OrchestratorError::AlreadyActive(bead_id));
        }
        self.sessions.insert(bead_id, session);
        Ok(())
    }

    pub fn contains(&self, bead_id: &str) -> bool {
        self.sessions.contains_key(bead_id)
    }

    pub fn get(&self, bead_id: &str) -> Option<&Session> {
        self.sessions.get(bead_id)
    }

    pub(crate) fn get_mut(&mut self, bead_id: &str) -> Option<&mut Session> {
        self.sessions.get_mut(bead_id)
    }

    /// Remove a session. Safe no-op when absent.
    pub(crate) fn remove(&mut self, bead_id: &str) -> Option<Session> {
        self.sessions.remove(bead_id)
    }

    pub fn bead_ids(&self) -> Vec<BeadId> {
        self.sessions.keys().cloned().collect()
    }

    pub fn list(&self) -> Vec<SessionInfo> {
        let mut infos: Vec<_> = self.sessions.values().map(|s| s.info.clone()).collect();
        infos.sort_by(|a, b| a.bead_id.cmp(&b.bead_id));
        infos
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn session(bead_id: &str, state: SessionState) -> Session {
        Session::new(
            SessionInfo {
                bead_id: bead_id.to_string(),
                state,
                started_at_epoch_ms: Some(0),
                worktree_path: PathBuf::new(),
                dev_server_port: None,
            },
            CancellationToken::new(),
        )
    }

    #[test]
    fn duplicate_insert_is_rejected() {
        let mut registry = SessionRegistry::new();
        registry
            .insert(session("az-1", SessionState::Busy))
            .expect("first insert");
        let err = registry
            .insert(session("az-1", SessionState::Busy))
            .expect_err("second insert must fail");
        assert!(matches!(err, OrchestratorError::AlreadyActive(id) if id == "az-1"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn remove_is_noop_safe() {
        let mut registry = SessionRegistry::new();
        assert!(registry.remove("az-1").is_none());
        registry
            .insert(session("az-1", SessionState::Busy))
            .expect("insert");
        assert!(registry.remove("az-1").is_some());
        assert!(registry.remove("az-1").is_none());
    }

    #[test]
    fn pause_legal_from_busy_and_waiting_only() {
        let mut s = session("az-1", SessionState::Busy);
        s.request_pause().expect("pause from busy");
        assert_eq!(s.info.state, SessionState::Paused);

        let err = s.request_pause().expect_err("pause from paused");
        assert!(matches!(err, OrchestratorError::InvalidTransition { .. }));
        assert_eq!(s.info.state, SessionState::Paused, "no state change on error");

        let mut s = session("az-2", SessionState::Waiting);
        s.request_pause().expect("pause from waiting");
    }

    #[test]
    fn resume_legal_from_paused_only() {
        let mut s = session("az-1", SessionState::Paused);
        s.request_resume().expect("resume from paused");
        assert_eq!(s.info.state, SessionState::Busy);

        let err = s.request_resume().expect_err("resume from busy");
        assert!(matches!(
            err,
            OrchestratorError::InvalidTransition { requested: "resume", .. }
        ));
    }

    #[test]
    fn observation_is_debounced() {
        let mut s = session("az-1", SessionState::Busy);
        assert!(s.apply_observed(SessionState::Busy).is_none());
        assert_eq!(
            s.apply_observed(SessionState::Waiting),
            Some((SessionState::Busy, SessionState::Waiting))
        );
        assert!(s.apply_observed(SessionState::Waiting).is_none());
    }

    #[test]
    fn paused_only_yields_to_error() {
        let mut s = session("az-1", SessionState::Paused);
        assert!(s.apply_observed(SessionState::Busy).is_none());
        assert!(s.apply_observed(SessionState::Done).is_none());
        assert_eq!(
            s.apply_observed(SessionState::Error),
            Some((SessionState::Paused, SessionState::Error))
        );
    }

    #[test]
    fn done_sticks_except_for_error() {
        let mut s = session("az-1", SessionState::Done);
        assert!(s.apply_observed(SessionState::Busy).is_none());
        assert_eq!(
            s.apply_observed(SessionState::Error),
            Some((SessionState::Done, SessionState::Error))
        );
    }

    #[test]
    fn error_recovers_when_captures_succeed_again() {
        let mut s = session("az-1", SessionState::Error);
        assert_eq!(
            s.apply_observed(SessionState::Busy),
            Some((SessionState::Error, SessionState::Busy))
        );
    }
}
