//! VCS metadata port: upstream commit hashes and commit-range diffs.

pub mod github;

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::addon::InstalledAddon;

/// Upstream state of one addon's declared branch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteRef {
    /// Head commit of the branch; `None` when the branch does not exist or is
    /// not accessible to the checker.
    pub latest_commit: Option<String>,
    pub is_private: bool,
}

/// Commit-range diff between two states of a repository.
///
/// Opaque to the reconciliation logic; attached to update records and
/// rendered by the notification sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompareInfo {
    /// Web page showing the full diff.
    pub url: String,
    pub commits: Vec<CommitInfo>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitInfo {
    pub sha: String,
    pub message: String,
    pub url: String,
    pub author: CommitAuthor,
    pub verified: bool,
    pub date: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitAuthor {
    pub username: String,
    pub avatar: String,
    pub url: String,
}

/// Read-only access to the source-control host's metadata.
#[async_trait]
pub trait VcsMetadata: Send + Sync {
    /// Bulk-fetch the head commit of every addon's declared branch, keyed by
    /// canonical URL.
    async fn latest_commits(
        &self,
        addons: &BTreeMap<String, InstalledAddon>,
    ) -> anyhow::Result<BTreeMap<String, RemoteRef>>;

    /// Fetch the commit-range diff between two commits of a repository.
    async fn commit_range_diff(
        &self,
        owner: &str,
        repo: &str,
        old_sha: &str,
        new_sha: &str,
    ) -> anyhow::Result<CompareInfo>;
}
