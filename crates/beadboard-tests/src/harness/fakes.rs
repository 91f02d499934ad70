//! In-memory stand-ins for the external executors. Each one records the
//! calls it receives and can be scripted to fail, so flows exercise the
//! engine without tmux, git, or a network.

use async_trait::async_trait;
use beadboard_proto::{Bead, NetworkStatus};
use libbeadboard::{BeadSource, ExecError, GitExecutor, MuxExecutor, NetworkProbe};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

#[derive(Default)]
pub struct FakeMux {
    sessions: Mutex<HashSet<String>>,
    panes: Mutex<HashMap<String, String>>,
    inputs: Mutex<Vec<(String, String)>>,
    killed: Mutex<Vec<String>>,
    fail_create: AtomicBool,
    fail_capture: AtomicBool,
    hang_capture: AtomicBool,
}

impl FakeMux {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script what the next pane captures return for a session.
    pub fn set_pane(&self, id: &str, text: &str) {
        self.panes
            .lock()
            .expect("panes lock")
            .insert(id.to_string(), text.to_string());
    }

    pub fn fail_next_creates(&self, fail: bool) {
        self.fail_create.store(fail, Ordering::SeqCst);
    }

    pub fn fail_captures(&self, fail: bool) {
        self.fail_capture.store(fail, Ordering::SeqCst);
    }

    /// Make captures hang forever, like a wedged mux process.
    pub fn hang_captures(&self, hang: bool) {
        self.hang_capture.store(hang, Ordering::SeqCst);
    }

    pub fn kill_count(&self, id: &str) -> usize {
        self.killed
            .lock()
            .expect("killed lock")
            .iter()
            .filter(|k| k.as_str() == id)
            .count()
    }

    pub fn inputs(&self) -> Vec<(String, String)> {
        self.inputs.lock().expect("inputs lock").clone()
    }
}

#[async_trait]
impl MuxExecutor for FakeMux {
    async fn create_session(&self, id: &str, _working_dir: &Path) -> Result<(), ExecError> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(ExecError::new("tmux new-session", "scripted failure"));
        }
        self.sessions
            .lock()
            .expect("sessions lock")
            .insert(id.to_string());
        Ok(())
    }

    async fn send_input(&self, id: &str, text: &str) -> Result<(), ExecError> {
        if !self.sessions.lock().expect("sessions lock").contains(id) {
            return Err(ExecError::new("tmux send-keys", "no such session"));
        }
        self.inputs
            .lock()
            .expect("inputs lock")
            .push((id.to_string(), text.to_string()));
        Ok(())
    }

    async fn capture_pane(&self, id: &str, _max_lines: usize) -> Result<String, ExecError> {
        if self.hang_capture.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if self.fail_capture.load(Ordering::SeqCst) {
            return Err(ExecError::new("tmux capture-pane", "can't find session"));
        }
        Ok(self
            .panes
            .lock()
            .expect("panes lock")
            .get(id)
            .cloned()
            .unwrap_or_default())
    }

    async fn kill_session(&self, id: &str) -> Result<(), ExecError> {
        self.sessions.lock().expect("sessions lock").remove(id);
        self.killed
            .lock()
            .expect("killed lock")
            .push(id.to_string());
        Ok(())
    }

    async fn has_session(&self, id: &str) -> bool {
        self.sessions.lock().expect("sessions lock").contains(id)
    }
}

/// Pretends to be the git wrapper: tracks worktrees as real directories so
/// path-existence checks behave, knows a fixed branch list.
pub struct FakeGit {
    branches: Vec<String>,
    worktrees: Mutex<Vec<PathBuf>>,
}

impl FakeGit {
    pub fn with_branches(branches: &[&str]) -> Self {
        Self {
            branches: branches.iter().map(ToString::to_string).collect(),
            worktrees: Mutex::new(Vec::new()),
        }
    }

    pub fn worktrees(&self) -> Vec<PathBuf> {
        self.worktrees.lock().expect("worktrees lock").clone()
    }
}

#[async_trait]
impl GitExecutor for FakeGit {
    async fn add_worktree(
        &self,
        path: &Path,
        _branch: &str,
        _base_branch: &str,
    ) -> Result<(), ExecError> {
        std::fs::create_dir_all(path)
            .map_err(|e| ExecError::new("git worktree add", e.to_string()))?;
        self.worktrees
            .lock()
            .expect("worktrees lock")
            .push(path.to_path_buf());
        Ok(())
    }

    async fn remove_worktree(&self, path: &Path) -> Result<(), ExecError> {
        std::fs::remove_dir_all(path)
            .map_err(|e| ExecError::new("git worktree remove", e.to_string()))?;
        self.worktrees
            .lock()
            .expect("worktrees lock")
            .retain(|p| p != path);
        Ok(())
    }

    async fn fetch(&self, _workdir: &Path) -> Result<(), ExecError> {
        Ok(())
    }

    async fn merge(&self, _workdir: &Path, _branch: &str) -> Result<(), ExecError> {
        Ok(())
    }

    async fn abort_merge(&self, _workdir: &Path) -> Result<(), ExecError> {
        Ok(())
    }

    async fn current_branch(&self, workdir: &Path) -> Result<String, ExecError> {
        // Real worktrees sit on their bead branch; reconstruct it from the
        // directory name the coordinator chose.
        let name = workdir
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        Ok(format!("bead/{name}"))
    }

    async fn diff_stat(&self, _workdir: &Path) -> Result<String, ExecError> {
        Ok(" 3 files changed, 21 insertions(+), 4 deletions(-)".to_string())
    }

    async fn branch_exists(&self, branch: &str) -> Result<bool, ExecError> {
        Ok(self.branches.iter().any(|b| b == branch))
    }
}

#[derive(Default)]
pub struct FakeBeadSource {
    beads: Mutex<Vec<Bead>>,
    fail: AtomicBool,
}

impl FakeBeadSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_beads(&self, beads: Vec<Bead>) {
        *self.beads.lock().expect("beads lock") = beads;
    }

    pub fn fail_lists(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl BeadSource for FakeBeadSource {
    async fn list(&self, _timeout: Duration) -> Result<Vec<Bead>, ExecError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(ExecError::new("bd list", "tracker unavailable"));
        }
        Ok(self.beads.lock().expect("beads lock").clone())
    }
}

pub struct FakeProbe {
    status: Mutex<NetworkStatus>,
    /// Sleep this long before answering; longer than the configured probe
    /// timeout simulates a hung probe.
    delay: Mutex<Duration>,
}

impl FakeProbe {
    pub fn online() -> Self {
        Self {
            status: Mutex::new(NetworkStatus {
                online: true,
                latency_ms: Some(12),
            }),
            delay: Mutex::new(Duration::ZERO),
        }
    }

    pub fn set_status(&self, status: NetworkStatus) {
        *self.status.lock().expect("status lock") = status;
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().expect("delay lock") = delay;
    }
}

#[async_trait]
impl NetworkProbe for FakeProbe {
    async fn check_online(&self, _timeout: Duration) -> NetworkStatus {
        let delay = *self.delay.lock().expect("delay lock");
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        *self.status.lock().expect("status lock")
    }
}
