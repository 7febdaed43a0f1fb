use std::path::{Path, PathBuf};
use std::process::Command;
use thiserror::Error;

/// Branch name used when the current branch cannot be determined.
pub const UNKNOWN_BRANCH: &str = "unknown";

#[derive(Debug, Error)]
pub enum GitError {
    #[error("not in a git repository")]
    NotARepo,
    #[error("git command failed: {0}")]
    CommandFailed(String),
    #[error("utf-8 error: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, GitError>;

fn git_in(dir: Option<&Path>) -> Command {
    let mut cmd = Command::new("git");
    if let Some(dir) = dir {
        cmd.current_dir(dir);
    }
    cmd
}

/// Find the root of the git repository containing `dir` (or the cwd).
pub fn find_repo_root(dir: Option<&Path>) -> Result<PathBuf> {
    let output = git_in(dir)
        .arg("rev-parse")
        .arg("--show-toplevel")
        .output()?;

    if !output.status.success() {
        return Err(GitError::NotARepo);
    }

    let path = String::from_utf8(output.stdout)?.trim().to_string();

    Ok(PathBuf::from(path))
}

/// Resolve the hooks directory, honoring `core.hooksPath` and worktrees.
pub fn hooks_dir(repo_root: &Path) -> Result<PathBuf> {
    let output = git_in(Some(repo_root))
        .arg("rev-parse")
        .arg("--git-path")
        .arg("hooks")
        .output()?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(GitError::CommandFailed(format!(
            "git rev-parse --git-path hooks failed: {}",
            stderr
        )));
    }

    let path = PathBuf::from(String::from_utf8(output.stdout)?.trim());
    Ok(if path.is_absolute() {
        path
    } else {
        repo_root.join(path)
    })
}

/// Get the current branch name (None for detached HEAD).
pub fn get_current_branch(dir: Option<&Path>) -> Result<Option<String>> {
    let output = git_in(dir)
        .arg("symbolic-ref")
        .arg("--short")
        .arg("-q")
        .arg("HEAD")
        .output()?;

    if !output.status.success() {
        // Exit status 1 with -q means detached HEAD.
        if output.status.code() == Some(1) {
            return Ok(None);
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(GitError::CommandFailed(format!(
            "git symbolic-ref failed: {}",
            stderr
        )));
    }

    let branch = String::from_utf8(output.stdout)?.trim().to_string();
    if branch.is_empty() {
        Ok(None)
    } else {
        Ok(Some(branch))
    }
}

/// Current branch for display, never failing.
pub fn branch_or_placeholder(dir: Option<&Path>) -> String {
    match get_current_branch(dir) {
        Ok(Some(branch)) => branch,
        Ok(None) => UNKNOWN_BRANCH.to_string(),
        Err(err) => {
            tracing::warn!(error = %err, "branch detection failed");
            UNKNOWN_BRANCH.to_string()
        }
    }
}
