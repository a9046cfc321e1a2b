//! Remote execution port: everything the reconciler asks the game server's
//! hosting panel to do.

pub mod http;
pub mod panel;
pub mod socket;

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::RemoteError;

/// Result of a filesystem search on the remote host.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FileSearchResults {
    #[serde(default)]
    pub files: BTreeMap<String, FileMatch>,
    #[serde(default, rename = "tooMany")]
    pub too_many: bool,
}

/// A single file that matched a search, with the matching lines.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FileMatch {
    #[serde(default)]
    pub results: u64,
    #[serde(default)]
    pub lines: BTreeMap<String, String>,
}

/// Outcome of a git clone through the panel.
#[derive(Debug, Clone, Copy, Default)]
pub struct CloneOutcome {
    pub is_private: bool,
}

/// Outcome of a git pull through the panel.
#[derive(Debug, Clone, Default)]
pub struct PullOutcome {
    /// Commit the checkout ended up at.
    pub new_commit: String,
    pub is_private: bool,
}

/// Asynchronous access to the remote host's filesystem, console, and git
/// transport. All calls suspend on network I/O.
#[async_trait]
pub trait RemoteExec: Send + Sync {
    /// Search the server filesystem for files containing `pattern`.
    async fn search_files(&self, pattern: &str) -> Result<FileSearchResults, RemoteError>;

    async fn read_file(&self, path: &str) -> Result<String, RemoteError>;

    async fn write_file(&self, path: &str, content: &str) -> Result<(), RemoteError>;

    async fn delete_files(&self, paths: &[String]) -> Result<(), RemoteError>;

    async fn rename_file(&self, from: &str, to: &str) -> Result<(), RemoteError>;

    /// Run a console command and return the first line of output following
    /// `prefix`, with the prefix stripped.
    async fn run_command_with_nonce(
        &self,
        prefix: &str,
        command: &str,
    ) -> Result<String, RemoteError>;

    /// Clone `url` at `branch` into `dir` on the remote host.
    async fn git_clone(
        &self,
        url: &str,
        dir: &str,
        branch: &str,
    ) -> Result<CloneOutcome, RemoteError>;

    /// Pull the checkout at `dir` on the remote host.
    async fn git_pull(&self, dir: &str) -> Result<PullOutcome, RemoteError>;
}
