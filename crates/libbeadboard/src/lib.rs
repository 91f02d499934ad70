pub mod classify;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod exec;
mod monitor;
pub mod orchestrator;
pub mod ports;
pub mod registry;
pub mod worktree;

pub use config::OrchestratorConfig;
pub use error::OrchestratorError;
pub use exec::{BeadSource, ExecError, GitExecutor, MuxExecutor, NetworkProbe};
pub use orchestrator::SessionOrchestrator;
pub use ports::PortAllocator;
pub use registry::{Session, SessionRegistry};
pub use worktree::WorktreeCoordinator;

/// Milliseconds since the Unix epoch, saturating at zero on clock skew.
pub(crate) fn now_epoch_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
