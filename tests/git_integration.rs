//! Integration tests for the repository gateway.
//!
//! These tests use real git repositories created via tempfile: a bare
//! remote, the working clone under test, and a second clone standing in for
//! other people pushing to trunk.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use tempfile::TempDir;

use gflow::core::stack::{BranchRecord, Parent, ReviewRef};
use gflow::core::types::{BranchName, Oid};
use gflow::git::{
    GatewaySettings, Git, GitError, GitGateway, RebaseOutcome, RepoGateway,
};

/// Run a git command in the given directory, returning trimmed stdout.
fn run_git(dir: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .env("GIT_TERMINAL_PROMPT", "0")
        .output()
        .expect("failed to run git");
    assert!(
        output.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8(output.stdout).unwrap().trim().to_string()
}

fn configure(dir: &Path) {
    run_git(dir, &["config", "user.email", "test@example.com"]);
    run_git(dir, &["config", "user.name", "Test User"]);
    run_git(dir, &["config", "commit.gpgsign", "false"]);
}

/// A bare remote with `main`, a working clone and a second clone.
struct TestRepo {
    _dir: TempDir,
    work: PathBuf,
    other: PathBuf,
}

impl TestRepo {
    fn new() -> Self {
        let dir = TempDir::new().expect("failed to create temp dir");
        let remote = dir.path().join("remote.git");
        let work = dir.path().join("work");
        let other = dir.path().join("other");

        std::fs::create_dir_all(&remote).unwrap();
        run_git(&remote, &["init", "--bare", "--quiet"]);
        run_git(&remote, &["symbolic-ref", "HEAD", "refs/heads/main"]);

        std::fs::create_dir_all(&work).unwrap();
        run_git(&work, &["init", "--quiet"]);
        run_git(&work, &["symbolic-ref", "HEAD", "refs/heads/main"]);
        configure(&work);
        std::fs::write(work.join("README.md"), "# Test Repo\n").unwrap();
        run_git(&work, &["add", "README.md"]);
        run_git(&work, &["commit", "--quiet", "-m", "Initial commit"]);
        run_git(&work, &["remote", "add", "origin", remote.to_str().unwrap()]);
        run_git(&work, &["push", "--quiet", "-u", "origin", "main"]);

        run_git(
            dir.path(),
            &["clone", "--quiet", remote.to_str().unwrap(), "other"],
        );
        configure(&other);

        Self {
            _dir: dir,
            work,
            other,
        }
    }

    fn gateway(&self) -> GitGateway {
        self.gateway_with_timeout(Duration::from_secs(30))
    }

    fn gateway_with_timeout(&self, timeout: Duration) -> GitGateway {
        GitGateway::open(
            &self.work,
            GatewaySettings {
                remote: "origin".into(),
                trunk: BranchName::new("main").unwrap(),
                forge: "github".into(),
                verify: true,
                timeout,
                echo: false,
            },
        )
        .expect("failed to open gateway")
    }

    fn git(&self) -> Git {
        Git::open(&self.work).expect("failed to open test repo")
    }

    fn commit(&self, dir: &Path, file: &str, content: &str, message: &str) -> Oid {
        std::fs::write(dir.join(file), content).unwrap();
        run_git(dir, &["add", file]);
        run_git(dir, &["commit", "--quiet", "-m", message]);
        Oid::new(run_git(dir, &["rev-parse", "HEAD"])).unwrap()
    }

    /// Push a commit to the remote trunk from the second clone.
    fn advance_trunk(&self, file: &str, content: &str) -> Oid {
        run_git(&self.other, &["pull", "--quiet", "--ff-only", "origin", "main"]);
        let head = self.commit(&self.other, file, content, "Upstream change");
        run_git(&self.other, &["push", "--quiet", "origin", "main"]);
        head
    }

    /// Create `branch` off `from` in the working clone with one commit.
    fn branch_with_commit(&self, branch: &str, from: &str, file: &str, message: &str) -> Oid {
        run_git(&self.work, &["checkout", "--quiet", "-b", branch, from]);
        let head = self.commit(&self.work, file, message, message);
        run_git(&self.work, &["checkout", "--quiet", "main"]);
        head
    }
}

fn name(s: &str) -> BranchName {
    BranchName::new(s).unwrap()
}

#[tokio::test]
async fn fetch_trunk_leaves_local_trunk() {
    let repo = TestRepo::new();
    let local = repo.git().branch_head(&name("main")).unwrap();
    let upstream = repo.advance_trunk("upstream.txt", "new\n");

    let head = repo.gateway().fetch_trunk(&name("main")).await.unwrap();
    assert_eq!(head, upstream);
    assert_eq!(repo.git().branch_head(&name("main")).unwrap(), local);
}

#[tokio::test]
async fn fast_forward_checked_out_trunk() {
    let repo = TestRepo::new();
    let gateway = repo.gateway();
    let upstream = repo.advance_trunk("upstream.txt", "new\n");

    gateway.fetch_trunk(&name("main")).await.unwrap();
    assert!(gateway.fast_forward_trunk(&name("main")).await.unwrap());
    assert_eq!(repo.git().branch_head(&name("main")).unwrap(), Some(upstream));
    assert!(!gateway.fast_forward_trunk(&name("main")).await.unwrap());
}

#[tokio::test]
async fn fast_forward_trunk_not_checked_out() {
    let repo = TestRepo::new();
    let gateway = repo.gateway();
    repo.branch_with_commit("a", "main", "a.txt", "Add a");
    run_git(&repo.work, &["checkout", "--quiet", "a"]);
    let upstream = repo.advance_trunk("upstream.txt", "new\n");

    gateway.fetch_trunk(&name("main")).await.unwrap();
    assert!(gateway.fast_forward_trunk(&name("main")).await.unwrap());
    assert_eq!(repo.git().branch_head(&name("main")).unwrap(), Some(upstream));
    assert_eq!(repo.git().current_branch().unwrap(), Some(name("a")));
}

#[tokio::test]
async fn diverged_trunk_is_not_fast_forwarded() {
    let repo = TestRepo::new();
    let gateway = repo.gateway();
    let local = repo.commit(&repo.work, "local.txt", "local\n", "Local trunk commit");
    repo.advance_trunk("upstream.txt", "new\n");

    gateway.fetch_trunk(&name("main")).await.unwrap();
    assert!(!gateway.fast_forward_trunk(&name("main")).await.unwrap());
    assert_eq!(repo.git().branch_head(&name("main")).unwrap(), Some(local));
}

#[tokio::test]
async fn rebase_onto_new_trunk_and_push() {
    let repo = TestRepo::new();
    let gateway = repo.gateway();
    let old_trunk = repo.git().branch_head(&name("main")).unwrap().unwrap();
    repo.branch_with_commit("a", "main", "a.txt", "Add a");

    let new_trunk = repo.advance_trunk("upstream.txt", "new\n");
    gateway.fetch_trunk(&name("main")).await.unwrap();

    let outcome = gateway
        .rebase(&name("a"), &new_trunk, &old_trunk)
        .await
        .unwrap();
    let RebaseOutcome::Done { head } = outcome else {
        panic!("unexpected conflict");
    };
    assert!(repo.git().is_ancestor(&new_trunk, &head).unwrap());
    assert_eq!(gateway.current_head(&name("a")).await.unwrap(), head);

    gateway.force_push(&name("a")).await.unwrap();
    assert_eq!(gateway.remote_head(&name("a")).await.unwrap(), Some(head));
}

/// A rebase that outlasts the network timeout still runs to completion.
#[cfg(unix)]
#[tokio::test]
async fn slow_rebase_is_not_cut_short() {
    use std::os::unix::fs::PermissionsExt;

    let repo = TestRepo::new();
    let old_trunk = repo.git().branch_head(&name("main")).unwrap().unwrap();
    run_git(&repo.work, &["checkout", "--quiet", "-b", "a"]);
    for i in 0..3 {
        let file = format!("a{i}.txt");
        repo.commit(&repo.work, &file, "a\n", &format!("Add {file}"));
    }
    run_git(&repo.work, &["checkout", "--quiet", "main"]);
    let new_trunk = repo.advance_trunk("upstream.txt", "new\n");
    repo.gateway().fetch_trunk(&name("main")).await.unwrap();

    // Every replayed commit now takes a second.
    let hook = repo.work.join(".git/hooks/post-commit");
    std::fs::write(&hook, "#!/bin/sh\nsleep 1\n").unwrap();
    std::fs::set_permissions(&hook, std::fs::Permissions::from_mode(0o755)).unwrap();

    let gateway = repo.gateway_with_timeout(Duration::from_secs(1));
    let outcome = gateway
        .rebase(&name("a"), &new_trunk, &old_trunk)
        .await
        .unwrap();

    let RebaseOutcome::Done { head } = outcome else {
        panic!("unexpected conflict");
    };
    assert!(!repo.git().state().is_in_progress());
    assert!(repo.git().is_ancestor(&new_trunk, &head).unwrap());
    assert_eq!(
        run_git(&repo.work, &["rev-list", "--count", &format!("{new_trunk}..{head}")]),
        "3"
    );
}

#[tokio::test]
async fn rebase_onto_current_base_is_noop() {
    let repo = TestRepo::new();
    let base = repo.git().branch_head(&name("main")).unwrap().unwrap();
    let head = repo.branch_with_commit("a", "main", "a.txt", "Add a");

    let outcome = repo.gateway().rebase(&name("a"), &base, &base).await.unwrap();
    assert_eq!(outcome, RebaseOutcome::Done { head });
}

#[tokio::test]
async fn conflict_pauses_then_aborts() {
    let repo = TestRepo::new();
    let gateway = repo.gateway();
    let old_trunk = repo.git().branch_head(&name("main")).unwrap().unwrap();
    let before = repo.branch_with_commit("a", "main", "README.md", "branch edit\n");

    let new_trunk = repo.advance_trunk("README.md", "upstream edit\n");
    gateway.fetch_trunk(&name("main")).await.unwrap();

    let outcome = gateway
        .rebase(&name("a"), &new_trunk, &old_trunk)
        .await
        .unwrap();
    assert_eq!(outcome, RebaseOutcome::Conflict);
    assert!(repo.git().state().is_rebase());
    assert!(matches!(
        gateway.ensure_clean().await,
        Err(GitError::OperationInProgress { .. })
    ));

    gateway.abort_rebase().await.unwrap();
    assert!(!repo.git().state().is_in_progress());
    assert_eq!(gateway.current_head(&name("a")).await.unwrap(), before);
}

#[tokio::test]
async fn dirty_worktree_is_rejected() {
    let repo = TestRepo::new();
    std::fs::write(repo.work.join("README.md"), "changed\n").unwrap();

    assert!(matches!(
        repo.gateway().ensure_clean().await,
        Err(GitError::DirtyWorktree { .. })
    ));
}

#[tokio::test]
async fn records_round_trip() {
    let repo = TestRepo::new();
    let gateway = repo.gateway();
    let base = repo.git().branch_head(&name("main")).unwrap().unwrap();
    let a = repo.branch_with_commit("a", "main", "a.txt", "Add a");
    let b = repo.branch_with_commit("b", "a", "b.txt", "Add b");

    let record_a = BranchRecord::new(Parent::Trunk, base).with_review(ReviewRef {
        number: 7,
        url: "https://github.com/o/r/pull/7".into(),
        target: "main".into(),
    });
    let record_b = BranchRecord::new(Parent::Branch(name("a")), a.clone());
    gateway.save_record(&name("a"), &record_a).await.unwrap();
    gateway.save_record(&name("b"), &record_b).await.unwrap();

    let tracked = gateway.tracked_branches().await.unwrap();
    assert_eq!(tracked.len(), 2);
    assert_eq!(tracked[&name("a")].record, record_a);
    assert_eq!(tracked[&name("a")].head, Some(a));
    assert_eq!(tracked[&name("b")].record, record_b);
    assert_eq!(tracked[&name("b")].head, Some(b));

    // Overwrite keeps working through compare-and-swap.
    let moved = BranchRecord::new(Parent::Trunk, record_b.base.clone());
    gateway.save_record(&name("b"), &moved).await.unwrap();
    assert_eq!(
        gateway.tracked_branches().await.unwrap()[&name("b")].record,
        moved
    );

    gateway.remove_record(&name("a")).await.unwrap();
    gateway.remove_record(&name("a")).await.unwrap();
    let tracked = gateway.tracked_branches().await.unwrap();
    assert!(!tracked.contains_key(&name("a")));
}

#[tokio::test]
async fn review_text_from_commits() {
    let repo = TestRepo::new();
    let gateway = repo.gateway();
    let base = repo.git().branch_head(&name("main")).unwrap().unwrap();
    repo.branch_with_commit("a", "main", "a.txt", "Add a");

    let text = gateway.review_text(&name("a"), &base).await.unwrap();
    assert_eq!(text.title, "Add a");

    run_git(&repo.work, &["checkout", "--quiet", "a"]);
    repo.commit(&repo.work, "a2.txt", "more", "Polish a");
    run_git(&repo.work, &["checkout", "--quiet", "main"]);

    let text = gateway.review_text(&name("a"), &base).await.unwrap();
    assert_eq!(text.title, "Add a");
    assert_eq!(text.body.as_deref(), Some("- Add a\n- Polish a"));
}

#[tokio::test]
async fn branch_cleanup_local_and_remote() {
    let repo = TestRepo::new();
    let gateway = repo.gateway();
    repo.branch_with_commit("a", "main", "a.txt", "Add a");
    gateway.force_push(&name("a")).await.unwrap();
    assert!(gateway.remote_head(&name("a")).await.unwrap().is_some());

    gateway.delete_remote_branch(&name("a")).await.unwrap();
    run_git(&repo.work, &["fetch", "--quiet", "--prune", "origin"]);
    assert_eq!(gateway.remote_head(&name("a")).await.unwrap(), None);

    gateway.delete_local_branch(&name("a")).await.unwrap();
    assert_eq!(repo.git().branch_head(&name("a")).unwrap(), None);
}
