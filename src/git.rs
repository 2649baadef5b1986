//! Heuristic recognition of git operations from the metadata paths they touch.
//!
//! Nothing here reads repository content. A hand edit to a ref file will be
//! reported as the operation that normally writes it, and a branch checkout
//! that rewrites `refs/heads` is reported as a commit. Specific markers are
//! checked before `HEAD`, which many operations touch as a side effect.

use std::fmt;
use std::path::{Component, Path};

use serde::{Deserialize, Serialize};

use crate::filter::is_metadata_path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GitOperation {
    Commit,
    Push,
    Fetch,
    Pull,
    Merge,
    Rebase,
    Stash,
    Checkout,
}

impl GitOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Commit => "commit",
            Self::Push => "push",
            Self::Fetch => "fetch",
            Self::Pull => "pull",
            Self::Merge => "merge",
            Self::Rebase => "rebase",
            Self::Stash => "stash",
            Self::Checkout => "checkout",
        }
    }
}

impl fmt::Display for GitOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// Drop the notification without emitting anything
    Suppress,
    /// Not a metadata path; report as a plain file change
    Ordinary,
    Git(GitOperation),
}

const LOCK_SUFFIX: &str = ".lock";
const COMMIT_MSG: &str = "COMMIT_EDITMSG";
const MERGE_MSG: &str = "MERGE_MSG";
const FETCH_HEAD: &str = "FETCH_HEAD";
const ORIG_HEAD: &str = "ORIG_HEAD";
const MERGE_HEAD: &str = "MERGE_HEAD";
const HEAD: &str = "HEAD";

/// Maps a path (relative to the watched root) and its base name to a classification.
pub fn classify<P: AsRef<Path>>(path: P, name: &str) -> Classification {
    let path = path.as_ref();

    // Every rule only makes sense for files git itself writes; a Cargo.lock
    // in the worktree is an ordinary file
    if !is_metadata_path(path) {
        return Classification::Ordinary;
    }

    if name.ends_with(LOCK_SUFFIX) {
        return Classification::Suppress;
    }

    let op = if name == COMMIT_MSG || name == MERGE_MSG {
        Some(GitOperation::Commit)
    } else if has_segment(path, &["refs", "heads"]) {
        // also matches logs/refs/heads
        Some(GitOperation::Commit)
    } else if has_segment(path, &["refs", "remotes"]) {
        Some(GitOperation::Push)
    } else if name == FETCH_HEAD {
        Some(GitOperation::Fetch)
    } else if name == ORIG_HEAD {
        Some(GitOperation::Pull)
    } else if name == MERGE_HEAD {
        Some(GitOperation::Merge)
    } else if has_segment(path, &["rebase-merge"]) || has_segment(path, &["rebase-apply"]) {
        Some(GitOperation::Rebase)
    } else if has_segment(path, &["refs", "stash"]) || name == "stash" {
        Some(GitOperation::Stash)
    } else if name == HEAD && !has_segment(path, &["logs"]) {
        Some(GitOperation::Checkout)
    } else {
        None
    };

    match op {
        Some(op) => Classification::Git(op),
        None => Classification::Suppress,
    }
}

/// True if `segment` appears as consecutive components of `path`.
fn has_segment(path: &Path, segment: &[&str]) -> bool {
    let parts: Vec<&std::ffi::OsStr> = path
        .components()
        .filter_map(|comp| match comp {
            Component::Normal(part) => Some(part),
            _ => None,
        })
        .collect();

    parts
        .windows(segment.len())
        .any(|window| window.iter().zip(segment).all(|(a, b)| *a == *b))
}
