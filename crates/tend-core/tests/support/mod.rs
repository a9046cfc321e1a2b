//! In-memory port fakes shared by the integration tests.
//!
//! Not every test binary exercises every fixture.
#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;

use tend_core::addon::{DesiredAddon, InstalledAddon};
use tend_core::error::RemoteError;
use tend_core::notify::NotifySink;
use tend_core::remote::{CloneOutcome, FileMatch, FileSearchResults, PullOutcome, RemoteExec};
use tend_core::report::{ChangeSet, FailureSet};
use tend_core::vcs::{CompareInfo, RemoteRef, VcsMetadata};

pub fn installed(repo: &str, branch: &str, commit: &str) -> InstalledAddon {
    InstalledAddon {
        path: format!("/garrysmod/addons/{repo}"),
        name: repo.to_string(),
        url: format!("https://github.com/acme/{repo}"),
        owner: "acme".to_string(),
        repo: repo.to_string(),
        branch: branch.to_string(),
        commit: commit.to_string(),
    }
}

pub fn desired(repo: &str, branch: &str) -> DesiredAddon {
    DesiredAddon {
        url: format!("https://github.com/acme/{repo}"),
        owner: "acme".to_string(),
        repo: repo.to_string(),
        branch: branch.to_string(),
        name: None,
    }
}

/// Scripted remote execution port. Records every mutating call; failures are
/// injected per path/URL.
#[derive(Default)]
pub struct FakeRemote {
    pub calls: Mutex<Vec<String>>,
    /// File contents served by `read_file`.
    pub files: BTreeMap<String, String>,
    /// dir -> error text; the pull fails on every attempt.
    pub pull_fail_always: BTreeMap<String, String>,
    /// dir -> error text; only the first pull attempt fails.
    pub pull_fail_first: BTreeMap<String, String>,
    /// dir -> commit reported by a successful pull (defaults to "newcommit").
    pub pull_commit: BTreeMap<String, String>,
    /// Clone URLs that fail.
    pub clone_fail: BTreeMap<String, String>,
    /// Paths whose deletion fails.
    pub delete_fail: BTreeMap<String, String>,
    /// Whether renames fail.
    pub rename_fail: bool,
    /// Paths answered by `search_files`.
    pub search_hits: Vec<String>,
    pub pull_attempts: Mutex<BTreeMap<String, u32>>,
}

impl FakeRemote {
    pub fn log(&self, entry: String) {
        self.calls.lock().unwrap().push(entry);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl RemoteExec for FakeRemote {
    async fn search_files(&self, pattern: &str) -> Result<FileSearchResults, RemoteError> {
        self.log(format!("search {pattern}"));
        Ok(FileSearchResults {
            files: self
                .search_hits
                .iter()
                .map(|path| (path.clone(), FileMatch::default()))
                .collect(),
            too_many: false,
        })
    }

    async fn read_file(&self, path: &str) -> Result<String, RemoteError> {
        self.log(format!("read {path}"));
        self.files
            .get(path)
            .cloned()
            .ok_or_else(|| RemoteError::NotFound(path.to_string()))
    }

    async fn write_file(&self, path: &str, _content: &str) -> Result<(), RemoteError> {
        self.log(format!("write {path}"));
        Ok(())
    }

    async fn delete_files(&self, paths: &[String]) -> Result<(), RemoteError> {
        for path in paths {
            self.log(format!("delete {path}"));
            if let Some(message) = self.delete_fail.get(path) {
                return Err(RemoteError::Unknown(message.clone()));
            }
        }
        Ok(())
    }

    async fn rename_file(&self, from: &str, to: &str) -> Result<(), RemoteError> {
        self.log(format!("rename {from} -> {to}"));
        if self.rename_fail {
            return Err(RemoteError::Unknown("rename refused".to_string()));
        }
        Ok(())
    }

    async fn run_command_with_nonce(
        &self,
        _prefix: &str,
        command: &str,
    ) -> Result<String, RemoteError> {
        self.log(format!("command {command}"));
        Ok("ok".to_string())
    }

    async fn git_clone(
        &self,
        url: &str,
        _dir: &str,
        branch: &str,
    ) -> Result<CloneOutcome, RemoteError> {
        self.log(format!("clone {url} @{branch}"));
        if let Some(message) = self.clone_fail.get(url) {
            return Err(RemoteError::Unknown(message.clone()));
        }
        Ok(CloneOutcome { is_private: false })
    }

    async fn git_pull(&self, dir: &str) -> Result<PullOutcome, RemoteError> {
        self.log(format!("pull {dir}"));

        let attempt = {
            let mut attempts = self.pull_attempts.lock().unwrap();
            let entry = attempts.entry(dir.to_string()).or_insert(0);
            *entry += 1;
            *entry
        };

        if let Some(message) = self.pull_fail_always.get(dir) {
            return Err(RemoteError::Unknown(message.clone()));
        }
        if attempt == 1
            && let Some(message) = self.pull_fail_first.get(dir)
        {
            return Err(RemoteError::Unknown(message.clone()));
        }

        Ok(PullOutcome {
            new_commit: self
                .pull_commit
                .get(dir)
                .cloned()
                .unwrap_or_else(|| "newcommit".to_string()),
            is_private: false,
        })
    }
}

/// Scripted VCS metadata port.
#[derive(Default)]
pub struct FakeVcs {
    /// Canonical URL -> upstream ref.
    pub refs: BTreeMap<String, RemoteRef>,
    /// Every diff request fails when set.
    pub diff_fail: bool,
    pub diff_requests: Mutex<Vec<String>>,
}

impl FakeVcs {
    pub fn with_ref(mut self, repo: &str, latest: Option<&str>) -> Self {
        self.refs.insert(
            format!("https://github.com/acme/{repo}"),
            RemoteRef {
                latest_commit: latest.map(str::to_string),
                is_private: false,
            },
        );
        self
    }
}

#[async_trait]
impl VcsMetadata for FakeVcs {
    async fn latest_commits(
        &self,
        addons: &BTreeMap<String, InstalledAddon>,
    ) -> anyhow::Result<BTreeMap<String, RemoteRef>> {
        Ok(addons
            .keys()
            .filter_map(|url| self.refs.get(url).map(|r| (url.clone(), r.clone())))
            .collect())
    }

    async fn commit_range_diff(
        &self,
        owner: &str,
        repo: &str,
        old_sha: &str,
        new_sha: &str,
    ) -> anyhow::Result<CompareInfo> {
        self.diff_requests
            .lock()
            .unwrap()
            .push(format!("{owner}/{repo} {old_sha}..{new_sha}"));

        if self.diff_fail {
            anyhow::bail!("diff unavailable");
        }
        Ok(CompareInfo {
            url: format!("https://github.com/{owner}/{repo}/compare/{old_sha}...{new_sha}"),
            commits: Vec::new(),
        })
    }
}

/// Sink that records what it was handed.
#[derive(Default)]
pub struct RecordingSink {
    pub changes: Mutex<Option<ChangeSet>>,
    pub failures: Mutex<Option<FailureSet>>,
    pub config_diffs: Mutex<Vec<String>>,
    /// Every publish fails when set.
    pub fail: bool,
}

#[async_trait]
impl NotifySink for RecordingSink {
    async fn publish_changes(
        &self,
        _server_name: &str,
        changes: &ChangeSet,
    ) -> anyhow::Result<()> {
        if self.fail {
            anyhow::bail!("webhook down");
        }
        *self.changes.lock().unwrap() = Some(changes.clone());
        Ok(())
    }

    async fn publish_failures(
        &self,
        _server_name: &str,
        failures: &FailureSet,
    ) -> anyhow::Result<()> {
        if self.fail {
            anyhow::bail!("webhook down");
        }
        *self.failures.lock().unwrap() = Some(failures.clone());
        Ok(())
    }

    async fn publish_config_diff(&self, _server_name: &str, diff: &str) -> anyhow::Result<()> {
        if self.fail {
            anyhow::bail!("webhook down");
        }
        self.config_diffs.lock().unwrap().push(diff.to_string());
        Ok(())
    }
}
