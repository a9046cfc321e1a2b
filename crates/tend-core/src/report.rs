//! Change and failure aggregation.
//!
//! Each executor phase returns its own contribution; the run merges them and
//! hands the final three-way partition to the notification sink. Records are
//! write-once: appended during execution, read once by the reporter.

use serde::Serialize;

use crate::addon::{DesiredAddon, InstalledAddon};
use crate::vcs::CompareInfo;

/// A freshly cloned addon.
#[derive(Debug, Clone, Serialize)]
pub struct CreatedAddon {
    pub addon: DesiredAddon,
    pub is_private: bool,
}

/// An addon whose checkout moved to a new commit.
#[derive(Debug, Clone, Serialize)]
pub struct UpdatedAddon {
    pub addon: InstalledAddon,
    /// Commit-range diff; `None` when the pull succeeded but the diff could
    /// not be fetched (degraded success).
    pub diff: Option<CompareInfo>,
    pub is_private: bool,
}

/// An addon removed from the server.
#[derive(Debug, Clone, Serialize)]
pub struct DeletedAddon {
    pub addon: InstalledAddon,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateFailure {
    pub addon: DesiredAddon,
    pub error: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct UpdateFailure {
    pub addon: InstalledAddon,
    pub error: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeleteFailure {
    pub addon: InstalledAddon,
    pub error: String,
}

/// The three-way partition of successful changes.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ChangeSet {
    pub created: Vec<CreatedAddon>,
    pub updated: Vec<UpdatedAddon>,
    pub deleted: Vec<DeletedAddon>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.created.is_empty() && self.updated.is_empty() && self.deleted.is_empty()
    }

    pub fn total(&self) -> usize {
        self.created.len() + self.updated.len() + self.deleted.len()
    }

    pub fn merge(&mut self, other: ChangeSet) {
        self.created.extend(other.created);
        self.updated.extend(other.updated);
        self.deleted.extend(other.deleted);
    }
}

/// The three-way partition of per-item failures.
#[derive(Debug, Clone, Default, Serialize)]
pub struct FailureSet {
    pub create: Vec<CreateFailure>,
    pub update: Vec<UpdateFailure>,
    pub delete: Vec<DeleteFailure>,
}

impl FailureSet {
    pub fn is_empty(&self) -> bool {
        self.create.is_empty() && self.update.is_empty() && self.delete.is_empty()
    }

    pub fn total(&self) -> usize {
        self.create.len() + self.update.len() + self.delete.len()
    }

    pub fn merge(&mut self, other: FailureSet) {
        self.create.extend(other.create);
        self.update.extend(other.update);
        self.delete.extend(other.delete);
    }
}
