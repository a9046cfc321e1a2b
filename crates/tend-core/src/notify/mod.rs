//! Notification sink port.

pub mod discord;

use async_trait::async_trait;

use crate::report::{ChangeSet, FailureSet};

/// Where the run's outcome reports go.
///
/// The sink receives the three-way (create/update/delete) partition of both
/// changes and failures after each run; delivery failures are the caller's to
/// log, never to re-fail the run over.
#[async_trait]
pub trait NotifySink: Send + Sync {
    async fn publish_changes(&self, server_name: &str, changes: &ChangeSet) -> anyhow::Result<()>;

    async fn publish_failures(
        &self,
        server_name: &str,
        failures: &FailureSet,
    ) -> anyhow::Result<()>;

    /// Announce a server-config update with its unified diff.
    async fn publish_config_diff(&self, server_name: &str, diff: &str) -> anyhow::Result<()>;
}
