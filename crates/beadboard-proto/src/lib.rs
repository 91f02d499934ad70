use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Unique identifier for a bead (a tracked unit of work).
pub type BeadId = String;

/// A unit of work owned by the external bead tracker. The orchestration
/// engine treats beads as read-only input; only the tracker mutates them.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Bead {
    pub id: BeadId,
    pub title: String,
    pub status: BeadStatus,
    #[serde(default)]
    pub priority: u8,
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub parent: Option<BeadId>,
    #[serde(default)]
    pub deps: Vec<BeadId>,
    #[serde(default)]
    pub created_at_epoch_ms: u64,
    #[serde(default)]
    pub updated_at_epoch_ms: u64,
}

/// Tracker-side lifecycle of a bead.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BeadStatus {
    Open,
    InProgress,
    Blocked,
    Done,
}

/// Live state of a session. A bead with no session has no state at all;
/// absence is represented by the registry having no entry, never by a
/// variant here.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Busy,
    Waiting,
    Paused,
    Done,
    Error,
}

/// Summary info for one active session, keyed by its bead.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct SessionInfo {
    pub bead_id: BeadId,
    pub state: SessionState,
    pub started_at_epoch_ms: Option<u64>,
    /// Empty until the worktree step has succeeded.
    pub worktree_path: PathBuf,
    pub dev_server_port: Option<u16>,
}

/// Events pushed onto the presentation queue. A closed union: the display
/// loop matches exhaustively, no runtime type assertions.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EngineEvent {
    SessionStarted {
        bead_id: BeadId,
        info: SessionInfo,
    },
    SessionStateChanged {
        bead_id: BeadId,
        from: SessionState,
        to: SessionState,
    },
    SessionStopped {
        bead_id: BeadId,
    },
    Diagnostics {
        snapshot: DiagnosticsSnapshot,
    },
    BeadsRefreshed {
        beads: Vec<Bead>,
    },
    BeadListFailed {
        message: String,
    },
}

/// Overall health reported by a diagnostics snapshot.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Critical,
}

/// Point-in-time health report over the orchestration subsystems.
/// Derived and disposable: rebuilt fresh on every collection, never
/// mutated afterwards.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct DiagnosticsSnapshot {
    pub timestamp_epoch_ms: u64,
    pub health: HealthStatus,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub sessions: Vec<String>,
    pub ports: Vec<String>,
    pub worktrees: Vec<String>,
    pub network: Vec<String>,
}

/// Result of a network reachability probe.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkStatus {
    pub online: bool,
    pub latency_ms: Option<u64>,
}

/// Error codes for structured error reporting to the display layer.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    AlreadyActive,
    InvalidTransition,
    SessionNotFound,
    NoPortsAvailable,
    WorktreeExists,
    WorktreeMissing,
    BaseBranchMissing,
    ExecFailure,
    Timeout,
}
