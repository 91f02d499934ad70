pub mod fakes;

use beadboard_proto::EngineEvent;
use fakes::{FakeBeadSource, FakeGit, FakeMux, FakeProbe};
use libbeadboard::{OrchestratorConfig, SessionOrchestrator};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;

/// Orchestrator wired to in-memory executors, plus handles to script them.
pub struct TestBed {
    pub orchestrator: SessionOrchestrator,
    pub events: UnboundedReceiver<EngineEvent>,
    pub mux: Arc<FakeMux>,
    pub git: Arc<FakeGit>,
    pub beads: Arc<FakeBeadSource>,
    pub probe: Arc<FakeProbe>,
    // Dropping this deletes the worktree root.
    _worktree_root: tempfile::TempDir,
}

impl TestBed {
    pub fn new() -> Self {
        Self::with_config(|_| {})
    }

    pub fn with_config(tweak: impl FnOnce(&mut OrchestratorConfig)) -> Self {
        init_tracing();
        let worktree_root = tempfile::tempdir().expect("tempdir for worktrees");

        let mut config = OrchestratorConfig {
            poll_interval_ms: 25,
            exec_timeout_ms: 200,
            probe_timeout_ms: 200,
            list_timeout_ms: 200,
            worktree_root: worktree_root.path().to_path_buf(),
            ..Default::default()
        };
        tweak(&mut config);

        let mux = Arc::new(FakeMux::new());
        let git = Arc::new(FakeGit::with_branches(&["main"]));
        let beads = Arc::new(FakeBeadSource::new());
        let probe = Arc::new(FakeProbe::online());

        let (orchestrator, events) = SessionOrchestrator::new(
            mux.clone(),
            git.clone(),
            beads.clone(),
            probe.clone(),
            config,
        );

        Self {
            orchestrator,
            events,
            mux,
            git,
            beads,
            probe,
            _worktree_root: worktree_root,
        }
    }
}

impl Default for TestBed {
    fn default() -> Self {
        Self::new()
    }
}

/// Receive events until one matches, or until the deadline passes.
pub async fn next_event_matching(
    events: &mut UnboundedReceiver<EngineEvent>,
    timeout: Duration,
    matches: impl Fn(&EngineEvent) -> bool,
) -> Option<EngineEvent> {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        if remaining.is_zero() {
            return None;
        }
        match tokio::time::timeout(remaining, events.recv()).await {
            Ok(Some(event)) if matches(&event) => return Some(event),
            Ok(Some(_)) => continue,
            Ok(None) | Err(_) => return None,
        }
    }
}

/// Drain every event already queued plus whatever arrives within `window`.
pub async fn drain_events(
    events: &mut UnboundedReceiver<EngineEvent>,
    window: Duration,
) -> Vec<EngineEvent> {
    let mut collected = Vec::new();
    let deadline = tokio::time::Instant::now() + window;
    loop {
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        if remaining.is_zero() {
            return collected;
        }
        match tokio::time::timeout(remaining, events.recv()).await {
            Ok(Some(event)) => collected.push(event),
            Ok(None) | Err(_) => return collected,
        }
    }
}

/// Initialize tracing for tests (only once per process).
pub fn init_tracing() {
    use std::sync::Once;
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "warn".into()),
            )
            .with_test_writer()
            .try_init();
    });
}
