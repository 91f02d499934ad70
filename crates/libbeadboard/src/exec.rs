//! Contracts for the external tools the engine drives. The real
//! implementations (tmux and git command wrappers, the bead tracker CLI)
//! live outside this crate; the engine only ever sees these traits, so
//! every call site converts failure into a typed result instead of
//! crashing the process.

use crate::error::OrchestratorError;
use async_trait::async_trait;
use beadboard_proto::{Bead, NetworkStatus};
use std::future::Future;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Failure of one external command invocation.
#[derive(Error, Debug, Clone)]
#[error("{command}: {message}")]
pub struct ExecError {
    pub command: String,
    pub message: String,
}

impl ExecError {
    pub fn new(command: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            message: message.into(),
        }
    }
}

/// Run one external call under a bounded deadline. Expiry becomes a
/// recoverable [`OrchestratorError::Timeout`] naming the command; the
/// caller is never left awaiting a wedged external process.
pub(crate) async fn bounded<T>(
    deadline: Duration,
    command: &str,
    call: impl Future<Output = Result<T, ExecError>>,
) -> Result<T, OrchestratorError> {
    match tokio::time::timeout(deadline, call).await {
        Ok(result) => Ok(result?),
        Err(_) => Err(OrchestratorError::Timeout(command.to_string())),
    }
}

/// Terminal multiplexer driver. Session ids are bead ids.
#[async_trait]
pub trait MuxExecutor: Send + Sync {
    async fn create_session(&self, id: &str, working_dir: &Path) -> Result<(), ExecError>;
    async fn send_input(&self, id: &str, text: &str) -> Result<(), ExecError>;
    /// Capture a bounded tail of the session's pane, newest lines last.
    async fn capture_pane(&self, id: &str, max_lines: usize) -> Result<String, ExecError>;
    async fn kill_session(&self, id: &str) -> Result<(), ExecError>;
    async fn has_session(&self, id: &str) -> bool;
}

/// Source-control driver. Worktree management runs against the main
/// repository; the remaining operations are scoped to the working
/// directory they are given.
#[async_trait]
pub trait GitExecutor: Send + Sync {
    async fn add_worktree(
        &self,
        path: &Path,
        branch: &str,
        base_branch: &str,
    ) -> Result<(), ExecError>;
    async fn remove_worktree(&self, path: &Path) -> Result<(), ExecError>;
    async fn fetch(&self, workdir: &Path) -> Result<(), ExecError>;
    async fn merge(&self, workdir: &Path, branch: &str) -> Result<(), ExecError>;
    async fn abort_merge(&self, workdir: &Path) -> Result<(), ExecError>;
    async fn current_branch(&self, workdir: &Path) -> Result<String, ExecError>;
    async fn diff_stat(&self, workdir: &Path) -> Result<String, ExecError>;
    async fn branch_exists(&self, branch: &str) -> Result<bool, ExecError>;
}

/// Read-only view of the external bead tracker. Transient failures are
/// expected; callers retry on the next timer tick.
#[async_trait]
pub trait BeadSource: Send + Sync {
    async fn list(&self, timeout: Duration) -> Result<Vec<Bead>, ExecError>;
}

/// Network reachability probe with a bounded deadline.
#[async_trait]
pub trait NetworkProbe: Send + Sync {
    async fn check_online(&self, timeout: Duration) -> NetworkStatus;
}
