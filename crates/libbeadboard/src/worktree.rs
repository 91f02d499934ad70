use crate::error::OrchestratorError;
use crate::exec::{GitExecutor, bounded};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Creates and removes per-bead worktrees through the source-control
/// executor. Directory and branch names derive deterministically from the
/// bead id, so a bead maps to exactly one worktree.
///
/// Removal is only ever a direct call: nothing here deletes a worktree as
/// a side effect of another operation. Every git invocation runs under
/// `deadline`; expiry surfaces as a recoverable timeout.
pub struct WorktreeCoordinator {
    git: Arc<dyn GitExecutor>,
    root: PathBuf,
    deadline: Duration,
}

impl WorktreeCoordinator {
    pub fn new(git: Arc<dyn GitExecutor>, root: PathBuf, deadline: Duration) -> Self {
        Self {
            git,
            root,
            deadline,
        }
    }

    pub fn path_for(&self, bead_id: &str) -> PathBuf {
        self.root.join(sanitize_name(bead_id))
    }

    pub fn branch_for(bead_id: &str) -> String {
        format!("bead/{}", sanitize_name(bead_id))
    }

    /// Create the worktree for a bead, branched off `base_branch`. Not
    /// idempotent: a second create without an intervening remove is an
    /// error, so a stale tree is never silently reused.
    pub async fn create(
        &self,
        bead_id: &str,
        base_branch: &str,
    ) -> Result<PathBuf, OrchestratorError> {
        let path = self.path_for(bead_id);
        if path.exists() {
            return Err(OrchestratorError::WorktreeExists(path));
        }
        if !bounded(self.deadline, "git branch", self.git.branch_exists(base_branch)).await? {
            return Err(OrchestratorError::BaseBranchMissing(base_branch.to_string()));
        }

        let branch = Self::branch_for(bead_id);
        bounded(
            self.deadline,
            "git worktree add",
            self.git.add_worktree(&path, &branch, base_branch),
        )
        .await?;
        info!(bead_id = %bead_id, path = %path.display(), branch = %branch, "worktree created");
        Ok(path)
    }

    /// Remove the worktree for a bead. Errors when no worktree exists at
    /// the expected path.
    pub async fn remove(&self, bead_id: &str) -> Result<(), OrchestratorError> {
        let path = self.path_for(bead_id);
        if !path.exists() {
            return Err(OrchestratorError::WorktreeMissing(path));
        }
        bounded(
            self.deadline,
            "git worktree remove",
            self.git.remove_worktree(&path),
        )
        .await?;
        info!(bead_id = %bead_id, path = %path.display(), "worktree removed");
        Ok(())
    }

    /// Pull the base branch into a bead's worktree: fetch, then merge. A
    /// failed merge is aborted before the error is reported, so the tree
    /// is never left mid-merge.
    pub async fn sync(&self, bead_id: &str, base_branch: &str) -> Result<(), OrchestratorError> {
        let path = self.path_for(bead_id);
        if !path.exists() {
            return Err(OrchestratorError::WorktreeMissing(path));
        }

        let branch = bounded(self.deadline, "git rev-parse", self.git.current_branch(&path)).await?;
        if branch != Self::branch_for(bead_id) {
            warn!(
                bead_id = %bead_id,
                branch = %branch,
                "worktree is not on its bead branch; merging anyway"
            );
        }

        bounded(self.deadline, "git fetch", self.git.fetch(&path)).await?;
        if let Err(err) = bounded(
            self.deadline,
            "git merge",
            self.git.merge(&path, base_branch),
        )
        .await
        {
            if let Err(abort_err) = bounded(
                self.deadline,
                "git merge --abort",
                self.git.abort_merge(&path),
            )
            .await
            {
                warn!(bead_id = %bead_id, error = %abort_err, "merge abort failed");
            }
            return Err(err);
        }
        info!(bead_id = %bead_id, base_branch = %base_branch, "worktree synced");
        Ok(())
    }

    /// Diff summary for a bead's worktree, for the dashboard's detail view.
    pub async fn diff_stat(&self, bead_id: &str) -> Result<String, OrchestratorError> {
        let path = self.path_for(bead_id);
        if !path.exists() {
            return Err(OrchestratorError::WorktreeMissing(path));
        }
        bounded(self.deadline, "git diff", self.git.diff_stat(&path)).await
    }
}

/// Longest directory/branch name derived from a bead id.
const MAX_NAME_LEN: usize = 64;

/// Fold a bead id into something safe for a directory or branch name:
/// lowercase alphanumerics with single dashes, capped in length. An id
/// with nothing usable in it still yields a non-empty name.
fn sanitize_name(value: &str) -> String {
    let mut out = String::with_capacity(value.len().min(MAX_NAME_LEN));
    for ch in value.chars() {
        if out.len() == MAX_NAME_LEN {
            break;
        }
        if ch.is_ascii_alphanumeric() || ch == '_' {
            out.push(ch.to_ascii_lowercase());
        } else if !out.is_empty() && !out.ends_with('-') {
            out.push('-');
        }
    }
    while out.ends_with('-') {
        out.pop();
    }
    if out.is_empty() {
        out.push_str("bead");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::{ExecError, GitExecutor};
    use async_trait::async_trait;
    use std::path::Path;
    use std::sync::Mutex;

    /// Minimal executor: records calls, creates and deletes the directory
    /// like the real binary would, and can be told to fail merges or hang
    /// on fetch.
    struct RecordingGit {
        branches: Vec<String>,
        added: Mutex<Vec<PathBuf>>,
        fail_merge: bool,
        hang_fetch: bool,
        aborted: Mutex<usize>,
    }

    impl RecordingGit {
        fn with_branches(branches: &[&str]) -> Arc<Self> {
            Arc::new(Self {
                branches: branches.iter().map(ToString::to_string).collect(),
                added: Mutex::new(Vec::new()),
                fail_merge: false,
                hang_fetch: false,
                aborted: Mutex::new(0),
            })
        }

        fn failing_merges(branches: &[&str]) -> Arc<Self> {
            Arc::new(Self {
                branches: branches.iter().map(ToString::to_string).collect(),
                added: Mutex::new(Vec::new()),
                fail_merge: true,
                hang_fetch: false,
                aborted: Mutex::new(0),
            })
        }

        fn hanging_fetches(branches: &[&str]) -> Arc<Self> {
            Arc::new(Self {
                branches: branches.iter().map(ToString::to_string).collect(),
                added: Mutex::new(Vec::new()),
                fail_merge: false,
                hang_fetch: true,
                aborted: Mutex::new(0),
            })
        }
    }

    #[async_trait]
    impl GitExecutor for RecordingGit {
        async fn add_worktree(
            &self,
            path: &Path,
            _branch: &str,
            _base_branch: &str,
        ) -> Result<(), ExecError> {
            std::fs::create_dir_all(path)
                .map_err(|e| ExecError::new("git worktree add", e.to_string()))?;
            self.added.lock().expect("lock").push(path.to_path_buf());
            Ok(())
        }

        async fn remove_worktree(&self, path: &Path) -> Result<(), ExecError> {
            std::fs::remove_dir_all(path)
                .map_err(|e| ExecError::new("git worktree remove", e.to_string()))
        }

        async fn fetch(&self, _workdir: &Path) -> Result<(), ExecError> {
            if self.hang_fetch {
                std::future::pending::<()>().await;
            }
            Ok(())
        }

        async fn merge(&self, _workdir: &Path, _branch: &str) -> Result<(), ExecError> {
            if self.fail_merge {
                return Err(ExecError::new("git merge", "merge conflict"));
            }
            Ok(())
        }

        async fn abort_merge(&self, _workdir: &Path) -> Result<(), ExecError> {
            *self.aborted.lock().expect("lock") += 1;
            Ok(())
        }

        async fn current_branch(&self, _workdir: &Path) -> Result<String, ExecError> {
            Ok("bead/az-1".to_string())
        }

        async fn diff_stat(&self, _workdir: &Path) -> Result<String, ExecError> {
            Ok(" 2 files changed, 8 insertions(+)".to_string())
        }

        async fn branch_exists(&self, branch: &str) -> Result<bool, ExecError> {
            Ok(self.branches.iter().any(|b| b == branch))
        }
    }

    #[tokio::test]
    async fn create_then_remove_round_trip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let git = RecordingGit::with_branches(&["main"]);
        let coordinator = WorktreeCoordinator::new(git.clone(), dir.path().to_path_buf(), Duration::from_secs(5));

        let path = coordinator.create("az-1", "main").await.expect("create");
        assert!(path.exists());
        assert_eq!(git.added.lock().expect("lock").len(), 1);

        coordinator.remove("az-1").await.expect("remove");
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn second_create_without_remove_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let git = RecordingGit::with_branches(&["main"]);
        let coordinator = WorktreeCoordinator::new(git, dir.path().to_path_buf(), Duration::from_secs(5));

        coordinator.create("az-1", "main").await.expect("create");
        let err = coordinator
            .create("az-1", "main")
            .await
            .expect_err("duplicate create must fail");
        assert!(matches!(err, OrchestratorError::WorktreeExists(_)));
    }

    #[tokio::test]
    async fn missing_base_branch_is_reported() {
        let dir = tempfile::tempdir().expect("tempdir");
        let git = RecordingGit::with_branches(&["main"]);
        let coordinator = WorktreeCoordinator::new(git, dir.path().to_path_buf(), Duration::from_secs(5));

        let err = coordinator
            .create("az-1", "release")
            .await
            .expect_err("unknown base branch");
        assert!(matches!(err, OrchestratorError::BaseBranchMissing(b) if b == "release"));
    }

    #[tokio::test]
    async fn remove_without_worktree_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let git = RecordingGit::with_branches(&["main"]);
        let coordinator = WorktreeCoordinator::new(git, dir.path().to_path_buf(), Duration::from_secs(5));

        let err = coordinator
            .remove("az-1")
            .await
            .expect_err("nothing to remove");
        assert!(matches!(err, OrchestratorError::WorktreeMissing(_)));
    }

    #[tokio::test]
    async fn sync_fetches_and_merges() {
        let dir = tempfile::tempdir().expect("tempdir");
        let git = RecordingGit::with_branches(&["main"]);
        let coordinator = WorktreeCoordinator::new(git, dir.path().to_path_buf(), Duration::from_secs(5));

        coordinator.create("az-1", "main").await.expect("create");
        coordinator.sync("az-1", "main").await.expect("sync");
    }

    #[tokio::test]
    async fn failed_merge_is_aborted_before_reporting() {
        let dir = tempfile::tempdir().expect("tempdir");
        let git = RecordingGit::failing_merges(&["main"]);
        let coordinator = WorktreeCoordinator::new(git.clone(), dir.path().to_path_buf(), Duration::from_secs(5));

        coordinator.create("az-1", "main").await.expect("create");
        let err = coordinator
            .sync("az-1", "main")
            .await
            .expect_err("merge conflict propagates");
        assert!(matches!(err, OrchestratorError::Exec(_)));
        assert_eq!(*git.aborted.lock().expect("lock"), 1, "merge was aborted");
    }

    #[tokio::test]
    async fn hung_git_call_is_cut_off_at_the_deadline() {
        let dir = tempfile::tempdir().expect("tempdir");
        let git = RecordingGit::hanging_fetches(&["main"]);
        let coordinator =
            WorktreeCoordinator::new(git, dir.path().to_path_buf(), Duration::from_millis(50));

        coordinator.create("az-1", "main").await.expect("create");
        let err = coordinator
            .sync("az-1", "main")
            .await
            .expect_err("fetch never returns");
        assert!(matches!(err, OrchestratorError::Timeout(_)));
    }

    #[tokio::test]
    async fn sync_and_diff_require_an_existing_worktree() {
        let dir = tempfile::tempdir().expect("tempdir");
        let git = RecordingGit::with_branches(&["main"]);
        let coordinator = WorktreeCoordinator::new(git, dir.path().to_path_buf(), Duration::from_secs(5));

        let err = coordinator.sync("az-1", "main").await.expect_err("no worktree");
        assert!(matches!(err, OrchestratorError::WorktreeMissing(_)));
        let err = coordinator.diff_stat("az-1").await.expect_err("no worktree");
        assert!(matches!(err, OrchestratorError::WorktreeMissing(_)));
    }

    #[tokio::test]
    async fn diff_stat_passes_through() {
        let dir = tempfile::tempdir().expect("tempdir");
        let git = RecordingGit::with_branches(&["main"]);
        let coordinator = WorktreeCoordinator::new(git, dir.path().to_path_buf(), Duration::from_secs(5));

        coordinator.create("az-1", "main").await.expect("create");
        let stat = coordinator.diff_stat("az-1").await.expect("diff stat");
        assert!(stat.contains("2 files changed"));
    }

    #[test]
    fn sanitize_folds_awkward_ids() {
        assert_eq!(sanitize_name("az-1"), "az-1");
        assert_eq!(sanitize_name("Feature/Login Form"), "feature-login-form");
        assert_eq!(sanitize_name("--weird--"), "weird");
        assert_eq!(sanitize_name("a///b"), "a-b");
    }

    #[test]
    fn sanitize_caps_overlong_ids() {
        let long = "x".repeat(200);
        assert_eq!(sanitize_name(&long).len(), MAX_NAME_LEN);
    }

    #[test]
    fn sanitize_never_yields_an_empty_name() {
        assert_eq!(sanitize_name("///"), "bead");
        assert_eq!(sanitize_name(""), "bead");
    }

    #[test]
    fn branch_name_is_deterministic() {
        assert_eq!(WorktreeCoordinator::branch_for("az-1"), "bead/az-1");
        assert_eq!(
            WorktreeCoordinator::branch_for("az-1"),
            WorktreeCoordinator::branch_for("az-1")
        );
    }
}
