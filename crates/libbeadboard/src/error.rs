use crate::exec::ExecError;
use beadboard_proto::{BeadId, ErrorCode, SessionState};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("session already active for bead: {0}")]
    AlreadyActive(BeadId),

    #[error("no session for bead: {0}")]
    SessionNotFound(BeadId),

    #[error("invalid transition for bead {bead_id}: {requested} requested while {state:?}")]
    InvalidTransition {
        bead_id: BeadId,
        state: SessionState,
        requested: &'static str,
    },

    #[error("no ports available in configured range")]
    NoPortsAvailable,

    #[error("worktree already exists: {}", .0.display())]
    WorktreeExists(PathBuf),

    #[error("worktree not found: {}", .0.display())]
    WorktreeMissing(PathBuf),

    #[error("base branch not found: {0}")]
    BaseBranchMissing(String),

    #[error("external command failed: {0}")]
    Exec(#[from] ExecError),

    #[error("timed out: {0}")]
    Timeout(String),
}

impl OrchestratorError {
    /// Convert to a structured code for the display layer.
    pub fn to_error_code(&self) -> ErrorCode {
        match self {
            OrchestratorError::AlreadyActive(_) => ErrorCode::AlreadyActive,
            OrchestratorError::SessionNotFound(_) => ErrorCode::SessionNotFound,
            OrchestratorError::InvalidTransition { .. } => ErrorCode::InvalidTransition,
            OrchestratorError::NoPortsAvailable => ErrorCode::NoPortsAvailable,
            OrchestratorError::WorktreeExists(_) => ErrorCode::WorktreeExists,
            OrchestratorError::WorktreeMissing(_) => ErrorCode::WorktreeMissing,
            OrchestratorError::BaseBranchMissing(_) => ErrorCode::BaseBranchMissing,
            OrchestratorError::Exec(_) => ErrorCode::ExecFailure,
            OrchestratorError::Timeout(_) => ErrorCode::Timeout,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_codes_map_per_variant() {
        let err = OrchestratorError::AlreadyActive("az-1".to_string());
        assert_eq!(err.to_error_code(), ErrorCode::AlreadyActive);

        let err = OrchestratorError::InvalidTransition {
            bead_id: "az-1".to_string(),
            state: SessionState::Busy,
            requested: "resume",
        };
        assert_eq!(err.to_error_code(), ErrorCode::InvalidTransition);

        let err = OrchestratorError::Exec(ExecError::new("tmux kill-session", "exit 1"));
        assert_eq!(err.to_error_code(), ErrorCode::ExecFailure);
    }
}
