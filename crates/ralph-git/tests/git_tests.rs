use git2::{Repository, Signature, Time};
use std::fs;
use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;

use ralph_git::{is_repository, GitError, GitRepo};

fn init_repo() -> (TempDir, Repository) {
    let dir = tempfile::tempdir().unwrap();
    let repo = Repository::init(dir.path()).unwrap();
    (dir, repo)
}

fn commit_all(repo: &Repository, message: &str, time: Option<Time>) {
    let mut index = repo.index().unwrap();
    index
        .add_all(["*"].iter(), git2::IndexAddOption::DEFAULT, None)
        .unwrap();
    index.write().unwrap();
    let tree_id = index.write_tree().unwrap();
    let tree = repo.find_tree(tree_id).unwrap();

    let sig = match time {
        Some(time) => Signature::new("Ralph Test", "ralph@example.com", &time).unwrap(),
        None => Signature::now("Ralph Test", "ralph@example.com").unwrap(),
    };
    let parents = match repo.head() {
        Ok(head) => vec![head.peel_to_commit().unwrap()],
        Err(_) => Vec::new(),
    };
    let parent_refs: Vec<&git2::Commit> = parents.iter().collect();
    repo.commit(Some("HEAD"), &sig, &sig, message, &tree, &parent_refs)
        .unwrap();
}

fn write(dir: &Path, name: &str, contents: &str) {
    fs::write(dir.join(name), contents).unwrap();
}

#[test]
fn test_outside_repository_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    assert!(!is_repository(dir.path()));
    assert!(matches!(
        GitRepo::discover(dir.path()),
        Err(GitError::NotARepo(_))
    ));
}

#[test]
fn test_discovers_from_subdirectory() {
    let (dir, _repo) = init_repo();
    let nested = dir.path().join("src").join("deep");
    fs::create_dir_all(&nested).unwrap();

    let repo = GitRepo::discover(&nested).unwrap();
    let workdir = repo.workdir().unwrap();
    assert_eq!(
        workdir.canonicalize().unwrap(),
        dir.path().canonicalize().unwrap()
    );
}

#[test]
fn test_empty_repository_queries() {
    let (dir, _repo) = init_repo();
    let repo = GitRepo::discover(dir.path()).unwrap();

    assert!(repo.recent_commits(5).unwrap().is_empty());
    assert!(!repo.committed_within(Duration::from_secs(30)).unwrap());
    assert!(repo.status().unwrap().is_clean());
}

#[test]
fn test_recent_commits_newest_first() {
    let (dir, raw) = init_repo();
    for n in 1..=3 {
        write(dir.path(), "notes.md", &format!("step {}\n", n));
        commit_all(&raw, &format!("Step {}", n), Some(Time::new(1_700_000_000 + n * 60, 0)));
    }

    let repo = GitRepo::discover(dir.path()).unwrap();
    let commits = repo.recent_commits(2).unwrap();
    assert_eq!(commits.len(), 2);
    assert_eq!(commits[0].summary, "Step 3");
    assert_eq!(commits[1].summary, "Step 2");
    assert_eq!(commits[0].id.len(), 7);
    assert!(commits[0].to_string().ends_with(" Step 3"));
}

#[test]
fn test_committed_within_window() {
    let (dir, raw) = init_repo();
    write(dir.path(), "a.txt", "a\n");
    commit_all(&raw, "Old", Some(Time::new(1_600_000_000, 0)));

    let repo = GitRepo::discover(dir.path()).unwrap();
    assert!(!repo.committed_within(Duration::from_secs(30)).unwrap());

    write(dir.path(), "a.txt", "b\n");
    commit_all(&raw, "Fresh", None);
    assert!(repo.committed_within(Duration::from_secs(30)).unwrap());
}

#[test]
fn test_status_and_diff_summary() {
    let (dir, raw) = init_repo();
    write(dir.path(), "tracked.txt", "one\ntwo\n");
    commit_all(&raw, "Initial", None);

    write(dir.path(), "tracked.txt", "one\nthree\nfour\n");
    write(dir.path(), "new.txt", "hello\n");

    let repo = GitRepo::discover(dir.path()).unwrap();
    let status = repo.status().unwrap();
    assert_eq!(status.total_changes(), 2);
    assert_eq!(status.modified, vec!["tracked.txt"]);
    assert_eq!(status.untracked, vec!["new.txt"]);

    let short = status.short();
    assert!(short.contains(&" M tracked.txt".to_string()));
    assert!(short.contains(&"?? new.txt".to_string()));

    // Untracked files are not part of the diff against HEAD
    let summary = repo.diff_summary().unwrap();
    assert_eq!(summary.files_changed, 1);
    assert_eq!(summary.insertions, 2);
    assert_eq!(summary.deletions, 1);
}
