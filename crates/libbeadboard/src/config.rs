use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Tunables for the orchestration engine.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct OrchestratorConfig {
    /// First port handed out to dev servers.
    pub base_port: u16,
    /// Number of ports scanned upward from `base_port` before allocation
    /// reports exhaustion.
    pub port_span: u16,
    /// Interval between monitor polls of a session's pane.
    pub poll_interval_ms: u64,
    /// Bounded tail captured from a pane on each poll.
    pub capture_lines: usize,
    /// Deadline for any single multiplexer or source-control command.
    pub exec_timeout_ms: u64,
    /// Deadline for the network reachability probe.
    pub probe_timeout_ms: u64,
    /// Deadline for bead tracker queries.
    pub list_timeout_ms: u64,
    /// Directory under which per-bead worktrees are created.
    pub worktree_root: PathBuf,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            base_port: 3000,
            port_span: 100,
            poll_interval_ms: 2_000,
            capture_lines: 50,
            exec_timeout_ms: 10_000,
            probe_timeout_ms: 3_000,
            list_timeout_ms: 5_000,
            worktree_root: PathBuf::from(".beadboard-worktrees"),
        }
    }
}

impl OrchestratorConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn exec_timeout(&self) -> Duration {
        Duration::from_millis(self.exec_timeout_ms)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn list_timeout(&self) -> Duration {
        Duration::from_millis(self.list_timeout_ms)
    }
}
