//! Diagnostics aggregation: folds registry, port table, worktree existence
//! and network reachability into one disposable snapshot. The fold itself
//! is pure; the orchestrator gathers the inputs and tolerates any one
//! subsystem being unavailable by degrading the score instead of failing.

use crate::now_epoch_ms;
use beadboard_proto::{
    BeadId, DiagnosticsSnapshot, HealthStatus, NetworkStatus, SessionInfo, SessionState,
};
use std::collections::HashMap;

/// Inputs gathered for one collection pass.
pub(crate) struct DiagnosticsInput {
    /// Each active session paired with whether its recorded worktree path
    /// still exists on disk.
    pub sessions: Vec<(SessionInfo, bool)>,
    pub ports: Vec<(BeadId, u16)>,
    /// `None` means the probe itself timed out.
    pub network: Option<NetworkStatus>,
}

pub(crate) fn build_snapshot(input: DiagnosticsInput) -> DiagnosticsSnapshot {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();
    let mut sessions = Vec::new();
    let mut worktrees = Vec::new();

    for (info, worktree_present) in &input.sessions {
        let state = format!("{:?}", info.state).to_lowercase();
        sessions.push(format!("{}: {state}", info.bead_id));

        if info.state == SessionState::Error {
            warnings.push(format!("session {} is in error state", info.bead_id));
        }

        if info.worktree_path.as_os_str().is_empty() {
            worktrees.push(format!("{}: no worktree recorded", info.bead_id));
        } else if *worktree_present {
            worktrees.push(format!(
                "{}: {}",
                info.bead_id,
                info.worktree_path.display()
            ));
        } else {
            worktrees.push(format!(
                "{}: missing {}",
                info.bead_id,
                info.worktree_path.display()
            ));
            warnings.push(format!(
                "worktree for {} no longer exists: {}",
                info.bead_id,
                info.worktree_path.display()
            ));
        }
    }

    let mut ports = Vec::new();
    let mut holders_by_port: HashMap<u16, Vec<&str>> = HashMap::new();
    for (bead_id, port) in &input.ports {
        ports.push(format!("{port}: {bead_id}"));
        holders_by_port.entry(*port).or_default().push(bead_id);
    }
    // Structurally impossible through the allocator; if it shows up anyway
    // it is a defect, not a runtime condition.
    for (port, holders) in &holders_by_port {
        if holders.len() > 1 {
            errors.push(format!(
                "port {port} allocated to multiple beads: {}",
                holders.join(", ")
            ));
        }
    }

    let mut network = Vec::new();
    match input.network {
        Some(status) if status.online => match status.latency_ms {
            Some(latency) => network.push(format!("online ({latency}ms)")),
            None => network.push("online".to_string()),
        },
        Some(_) => {
            network.push("offline".to_string());
            // A hard offline answer with sessions running is an error; a
            // mere probe timeout below stays a warning.
            if !input.sessions.is_empty() {
                errors.push("network unreachable while sessions are active".to_string());
            }
        }
        None => {
            network.push("probe timed out".to_string());
            warnings.push("network probe timed out".to_string());
        }
    }

    let health = if !errors.is_empty() {
        HealthStatus::Critical
    } else if !warnings.is_empty() {
        HealthStatus::Degraded
    } else {
        HealthStatus::Healthy
    };

    DiagnosticsSnapshot {
        timestamp_epoch_ms: now_epoch_ms(),
        health,
        errors,
        warnings,
        sessions,
        ports,
        worktrees,
        network,
    }
}
