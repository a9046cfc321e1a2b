//! Addon data model shared by the collector, planner, and executor.
//!
//! Both state maps are keyed by the canonical repository URL; see
//! [`identity::canonical_url`] for the normalization rules.

mod identity;

pub use identity::{canonical_url, split_owner_repo};

use serde::{Deserialize, Serialize};

/// An addon currently checked out on the server's filesystem.
///
/// Built once by the collector at the start of a run and immutable afterwards;
/// never persisted across runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstalledAddon {
    /// Absolute install path on the remote filesystem.
    pub path: String,
    /// Directory name of the checkout.
    pub name: String,
    /// Canonical repository URL (lowercase, no `.git` suffix).
    pub url: String,
    pub owner: String,
    pub repo: String,
    pub branch: String,
    pub commit: String,
}

impl InstalledAddon {
    /// URL handed to the panel's git transport.
    pub fn clone_url(&self) -> String {
        format!("{}.git", self.url)
    }

    /// Primary branches are protected from destructive pull recovery.
    pub fn on_primary_branch(&self) -> bool {
        matches!(self.branch.as_str(), "main" | "master")
    }
}

/// An addon declared in the control document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DesiredAddon {
    /// Canonical repository URL (lowercase, no `.git` suffix).
    pub url: String,
    pub owner: String,
    pub repo: String,
    pub branch: String,
    /// Directory name to install under, when it differs from the repo name.
    pub name: Option<String>,
}

impl DesiredAddon {
    /// URL handed to the panel's git transport.
    pub fn clone_url(&self) -> String {
        format!("{}.git", self.url)
    }

    /// The directory name this addon should end up under.
    pub fn install_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.repo)
    }
}
