use crate::config::OrchestratorConfig;
use crate::diagnostics::{DiagnosticsInput, build_snapshot};
use crate::error::OrchestratorError;
use crate::exec::{BeadSource, GitExecutor, MuxExecutor, NetworkProbe, bounded};
use crate::monitor;
use crate::now_epoch_ms;
use crate::ports::PortAllocator;
use crate::registry::{Session, SessionRegistry};
use crate::worktree::WorktreeCoordinator;
use beadboard_proto::{DiagnosticsSnapshot, EngineEvent, SessionInfo, SessionState};
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Registry and port table behind one lock: the single serialized
/// decision point for all lifecycle mutation.
pub(crate) struct Inner {
    pub(crate) registry: SessionRegistry,
    pub(crate) ports: PortAllocator,
}

/// Orchestrates per-bead sessions: worktree, multiplexer session, monitor
/// loop and dev-server port, created and torn down together.
///
/// Lifecycle operations return their errors synchronously to the caller.
/// Everything the background monitors learn flows back solely as
/// [`EngineEvent`] values on the queue handed out by [`Self::new`]; the
/// presentation loop never reads shared state directly.
pub struct SessionOrchestrator {
    inner: Arc<Mutex<Inner>>,
    mux: Arc<dyn MuxExecutor>,
    beads: Arc<dyn BeadSource>,
    probe: Arc<dyn NetworkProbe>,
    worktrees: WorktreeCoordinator,
    events: mpsc::UnboundedSender<EngineEvent>,
    config: OrchestratorConfig,
}

impl SessionOrchestrator {
    pub fn new(
        mux: Arc<dyn MuxExecutor>,
        git: Arc<dyn GitExecutor>,
        beads: Arc<dyn BeadSource>,
        probe: Arc<dyn NetworkProbe>,
        config: OrchestratorConfig,
    ) -> (Self, mpsc::UnboundedReceiver<EngineEvent>) {
        let (events, events_rx) = mpsc::unbounded_channel();
        let worktrees =
            WorktreeCoordinator::new(git, config.worktree_root.clone(), config.exec_timeout());
        let orchestrator = Self {
            inner: Arc::new(Mutex::new(Inner {
                registry: SessionRegistry::new(),
                ports: PortAllocator::new(config.base_port, config.port_span),
            })),
            mux,
            beads,
            probe,
            worktrees,
            events,
            config,
        };
        (orchestrator, events_rx)
    }

    /// Start a session for a bead: worktree, multiplexer session, registry
    /// entry, monitor loop — in that order, fail-fast. A failure after the
    /// worktree step leaves the worktree in place (removal is never
    /// implicit) and the error names what went wrong.
    pub async fn start(
        &self,
        bead_id: &str,
        base_branch: &str,
    ) -> Result<SessionInfo, OrchestratorError> {
        let mut inner = self.inner.lock().await;
        if inner.registry.contains(bead_id) {
            return Err(OrchestratorError::AlreadyActive(bead_id.to_string()));
        }

        let worktree_path = self.worktrees.create(bead_id, base_branch).await?;
        if let Err(err) = bounded(
            self.config.exec_timeout(),
            "tmux new-session",
            self.mux.create_session(bead_id, &worktree_path),
        )
        .await
        {
            warn!(
                bead_id = %bead_id,
                worktree = %worktree_path.display(),
                error = %err,
                "mux session creation failed; worktree left for explicit removal"
            );
            return Err(err);
        }

        let info = SessionInfo {
            bead_id: bead_id.to_string(),
            state: SessionState::Busy,
            started_at_epoch_ms: Some(now_epoch_ms()),
            worktree_path,
            dev_server_port: None,
        };
        let cancel = CancellationToken::new();
        inner.registry.insert(Session::new(info.clone(), cancel.clone()))?;

        let handle = monitor::spawn(
            self.inner.clone(),
            self.mux.clone(),
            self.events.clone(),
            bead_id.to_string(),
            cancel,
            self.config.poll_interval(),
            self.config.capture_lines,
            self.config.exec_timeout(),
        );
        if let Some(session) = inner.registry.get_mut(bead_id) {
            session.monitor = Some(handle);
        }
        drop(inner);

        info!(bead_id = %bead_id, base_branch = %base_branch, "session started");
        let _ = self.events.send(EngineEvent::SessionStarted {
            bead_id: bead_id.to_string(),
            info: info.clone(),
        });
        Ok(info)
    }

    /// Stop a bead's session. Idempotent: stopping an absent session is a
    /// no-op. Not complete until the monitor loop has terminated, so no
    /// stale event can resurrect the removed session; the wait is bounded
    /// because every capture inside the loop carries a deadline. The
    /// worktree is left untouched.
    pub async fn stop(&self, bead_id: &str) -> Result<(), OrchestratorError> {
        let removed = {
            let mut inner = self.inner.lock().await;
            let removed = inner.registry.remove(bead_id);
            if removed.is_some() {
                inner.ports.release(bead_id);
            }
            removed
        };
        let Some(mut session) = removed else {
            return Ok(());
        };

        // Await the loop outside the lock: a slow capture must not be able
        // to deadlock shutdown.
        session.cancel.cancel();
        if let Some(handle) = session.monitor.take() {
            let _ = handle.await;
        }

        if let Err(err) = bounded(
            self.config.exec_timeout(),
            "tmux kill-session",
            self.mux.kill_session(bead_id),
        )
        .await
        {
            warn!(bead_id = %bead_id, error = %err, "mux kill failed during stop");
        }

        info!(bead_id = %bead_id, "session stopped");
        let _ = self.events.send(EngineEvent::SessionStopped {
            bead_id: bead_id.to_string(),
        });
        Ok(())
    }

    pub async fn pause(&self, bead_id: &str) -> Result<(), OrchestratorError> {
        let (from, to) = {
            let mut inner = self.inner.lock().await;
            let session = inner
                .registry
                .get_mut(bead_id)
                .ok_or_else(|| OrchestratorError::SessionNotFound(bead_id.to_string()))?;
            session.request_pause()?
        };
        info!(bead_id = %bead_id, "session paused");
        let _ = self.events.send(EngineEvent::SessionStateChanged {
            bead_id: bead_id.to_string(),
            from,
            to,
        });
        Ok(())
    }

    pub async fn resume(&self, bead_id: &str) -> Result<(), OrchestratorError> {
        let (from, to) = {
            let mut inner = self.inner.lock().await;
            let session = inner
                .registry
                .get_mut(bead_id)
                .ok_or_else(|| OrchestratorError::SessionNotFound(bead_id.to_string()))?;
            session.request_resume()?
        };
        info!(bead_id = %bead_id, "session resumed");
        let _ = self.events.send(EngineEvent::SessionStateChanged {
            bead_id: bead_id.to_string(),
            from,
            to,
        });
        Ok(())
    }

    /// Allocate (or re-fetch) the dev-server port for an active session.
    pub async fn allocate_dev_port(&self, bead_id: &str) -> Result<u16, OrchestratorError> {
        let mut inner = self.inner.lock().await;
        if !inner.registry.contains(bead_id) {
            return Err(OrchestratorError::SessionNotFound(bead_id.to_string()));
        }
        let port = inner.ports.allocate(bead_id)?;
        if let Some(session) = inner.registry.get_mut(bead_id) {
            session.info.dev_server_port = Some(port);
        }
        Ok(port)
    }

    /// Forward text to the session's terminal.
    pub async fn send_input(&self, bead_id: &str, text: &str) -> Result<(), OrchestratorError> {
        {
            let inner = self.inner.lock().await;
            if !inner.registry.contains(bead_id) {
                return Err(OrchestratorError::SessionNotFound(bead_id.to_string()));
            }
        }
        bounded(
            self.config.exec_timeout(),
            "tmux send-keys",
            self.mux.send_input(bead_id, text),
        )
        .await
    }

    /// Remove a bead's worktree. Refused while its session is still
    /// active; stopping a session never does this implicitly.
    pub async fn remove_worktree(&self, bead_id: &str) -> Result<(), OrchestratorError> {
        {
            let inner = self.inner.lock().await;
            if inner.registry.contains(bead_id) {
                return Err(OrchestratorError::AlreadyActive(bead_id.to_string()));
            }
        }
        self.worktrees.remove(bead_id).await
    }

    /// Pull the base branch into a bead's worktree (fetch + merge, with
    /// abort on conflict). Works for stopped sessions too, as long as the
    /// worktree exists.
    pub async fn sync_worktree(
        &self,
        bead_id: &str,
        base_branch: &str,
    ) -> Result<(), OrchestratorError> {
        self.worktrees.sync(bead_id, base_branch).await
    }

    /// Diff summary for a bead's worktree.
    pub async fn worktree_diff_stat(&self, bead_id: &str) -> Result<String, OrchestratorError> {
        self.worktrees.diff_stat(bead_id).await
    }

    /// Re-query the bead tracker. Failure is transient: it becomes a
    /// `BeadListFailed` event and the next timer tick simply tries again.
    pub async fn refresh_beads(&self) {
        match self.beads.list(self.config.list_timeout()).await {
            Ok(beads) => {
                let _ = self.events.send(EngineEvent::BeadsRefreshed { beads });
            }
            Err(err) => {
                warn!(error = %err, "bead tracker query failed");
                let _ = self.events.send(EngineEvent::BeadListFailed {
                    message: err.to_string(),
                });
            }
        }
    }

    /// Collect a diagnostics snapshot. Reads, never mutates; a timed-out
    /// network probe degrades the snapshot instead of failing it.
    pub async fn collect_diagnostics(&self) -> DiagnosticsSnapshot {
        let (sessions, ports) = {
            let inner = self.inner.lock().await;
            (inner.registry.list(), inner.ports.snapshot())
        };

        let sessions = sessions
            .into_iter()
            .map(|info| {
                let present =
                    !info.worktree_path.as_os_str().is_empty() && info.worktree_path.exists();
                (info, present)
            })
            .collect();

        let timeout = self.config.probe_timeout();
        let network = tokio::time::timeout(timeout, self.probe.check_online(timeout))
            .await
            .ok();

        let snapshot = build_snapshot(DiagnosticsInput {
            sessions,
            ports,
            network,
        });
        let _ = self.events.send(EngineEvent::Diagnostics {
            snapshot: snapshot.clone(),
        });
        snapshot
    }

    /// Active sessions, sorted by bead id.
    pub async fn sessions(&self) -> Vec<SessionInfo> {
        self.inner.lock().await.registry.list()
    }

    pub async fn session(&self, bead_id: &str) -> Option<SessionInfo> {
        self.inner
            .lock()
            .await
            .registry
            .get(bead_id)
            .map(|s| s.info.clone())
    }

    /// Stop every session, awaiting each monitor loop, so no background
    /// work survives process shutdown.
    pub async fn shutdown(&self) {
        let bead_ids = {
            let inner = self.inner.lock().await;
            inner.registry.bead_ids()
        };
        for bead_id in bead_ids {
            if let Err(err) = self.stop(&bead_id).await {
                warn!(bead_id = %bead_id, error = %err, "stop failed during shutdown");
            }
        }
        info!("orchestrator shut down");
    }
}
