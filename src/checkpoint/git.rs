use git2::{BranchType, ErrorCode, Oid, Repository, build::CheckoutBuilder};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::{Checkpointer, SAVEPOINT_PREFIX, savepoint_name};
use crate::errors::CheckpointError;

/// Savepoints as local git branches named `savepoint/{phase}`.
///
/// Every operation mutates the shared working tree in place; callers must not
/// run two of them (or a code-editing step) against the same checkout at once.
#[derive(Debug, Clone)]
pub struct CheckpointManager {
    repo_path: PathBuf,
}

impl CheckpointManager {
    pub fn new(repo_path: &Path) -> Self {
        Self {
            repo_path: repo_path.to_path_buf(),
        }
    }

    pub fn repo_path(&self) -> &Path {
        &self.repo_path
    }

    fn open(&self) -> Result<Repository, CheckpointError> {
        Repository::open(&self.repo_path).map_err(|e| CheckpointError::NotARepository {
            path: self.repo_path.clone(),
            message: e.message().to_string(),
        })
    }

    /// Savepoint branch names currently present, sorted.
    pub fn list_savepoints(&self) -> Result<Vec<String>, CheckpointError> {
        let repo = self.open()?;
        let branches = repo
            .branches(Some(BranchType::Local))
            .map_err(CheckpointError::git("branch --list"))?;

        let mut names = Vec::new();
        for entry in branches {
            let (branch, _) = entry.map_err(CheckpointError::git("branch --list"))?;
            if let Some(name) = branch.name().map_err(CheckpointError::git("branch --list"))?
                && name.starts_with(SAVEPOINT_PREFIX)
            {
                names.push(name.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    /// Check out a local branch, restoring its recorded file state.
    ///
    /// Uses a safe checkout: uncommitted changes that would be overwritten make
    /// the switch fail rather than being discarded.
    pub fn switch_to(&self, branch: &str) -> Result<(), CheckpointError> {
        let repo = self.open()?;
        let found = repo
            .find_branch(branch, BranchType::Local)
            .map_err(CheckpointError::git("checkout"))?;
        let reference = found.get();
        let refname = reference
            .name()
            .ok_or_else(|| CheckpointError::Git {
                op: "checkout",
                message: format!("branch '{}' has a non UTF-8 ref name", branch),
            })?
            .to_string();
        let commit = reference
            .peel_to_commit()
            .map_err(CheckpointError::git("checkout"))?;

        let mut opts = CheckoutBuilder::new();
        opts.safe();
        repo.checkout_tree(commit.as_object(), Some(&mut opts))
            .map_err(CheckpointError::git("checkout"))?;
        repo.set_head(&refname)
            .map_err(CheckpointError::git("checkout"))?;
        debug!(repo = %self.repo_path.display(), branch = %branch, "checked out branch");
        Ok(())
    }

    /// Point HEAD directly at `revision`, leaving no branch checked out.
    ///
    /// Only moves HEAD. The working tree is expected to already match the
    /// commit, as it does right after `create_savepoint`.
    pub fn detach_at(&self, revision: &str) -> Result<(), CheckpointError> {
        let repo = self.open()?;
        let oid = Oid::from_str(revision).map_err(CheckpointError::git("checkout --detach"))?;
        repo.set_head_detached(oid)
            .map_err(CheckpointError::git("checkout --detach"))?;
        debug!(repo = %self.repo_path.display(), revision = %revision, "detached HEAD");
        Ok(())
    }

    /// Short name of the branch HEAD points at, or `None` when detached or unborn.
    pub fn current_branch(&self) -> Option<String> {
        let repo = Repository::open(&self.repo_path).ok()?;
        let head = repo.head().ok()?;
        if !head.is_branch() {
            return None;
        }
        head.shorthand().map(|s| s.to_string())
    }
}

impl Checkpointer for CheckpointManager {
    fn create_savepoint(&self, phase: &str) -> Result<String, CheckpointError> {
        let repo = self.open()?;
        let name = savepoint_name(phase);

        let head = repo.head().map_err(CheckpointError::git("rev-parse HEAD"))?;
        let commit = head
            .peel_to_commit()
            .map_err(CheckpointError::git("rev-parse HEAD"))?;

        repo.branch(&name, &commit, false)
            .map_err(CheckpointError::git("branch"))?;
        repo.set_head(&format!("refs/heads/{}", name))
            .map_err(CheckpointError::git("checkout"))?;

        info!(
            repo = %self.repo_path.display(),
            savepoint = %name,
            commit = %commit.id(),
            "created savepoint"
        );
        Ok(name)
    }

    fn rollback_to_savepoint(&self, name: &str) -> Result<(), CheckpointError> {
        self.switch_to(name)?;
        info!(
            repo = %self.repo_path.display(),
            savepoint = %name,
            "switched to savepoint"
        );
        Ok(())
    }

    fn delete_savepoint(&self, name: &str) -> Result<(), CheckpointError> {
        let Ok(repo) = Repository::open(&self.repo_path) else {
            debug!(repo = %self.repo_path.display(), "not a repository, nothing to delete");
            return Ok(());
        };
        let mut branch = match repo.find_branch(name, BranchType::Local) {
            Ok(branch) => branch,
            Err(e) if e.code() == ErrorCode::NotFound => {
                debug!(savepoint = %name, "savepoint already absent");
                return Ok(());
            }
            Err(e) => return Err(CheckpointError::git("branch -D")(e)),
        };

        // A branch cannot be deleted while HEAD points at it.
        if branch.is_head() {
            let oid = branch
                .get()
                .peel_to_commit()
                .map_err(CheckpointError::git("branch -D"))?
                .id();
            repo.set_head_detached(oid)
                .map_err(CheckpointError::git("checkout --detach"))?;
        }

        branch
            .delete()
            .map_err(CheckpointError::git("branch -D"))?;
        info!(repo = %self.repo_path.display(), savepoint = %name, "deleted savepoint");
        Ok(())
    }

    fn current_revision(&self) -> Option<String> {
        let repo = Repository::open(&self.repo_path).ok()?;
        let commit = repo.head().ok()?.peel_to_commit().ok()?;
        Some(commit.id().to_string())
    }
}
