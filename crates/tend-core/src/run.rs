//! Run orchestration: one reconciliation pass from snapshot to report.

use anyhow::Context;
use tracing::{error, info};

use crate::collect::{self, CollectStrategy};
use crate::control::parse_control_document;
use crate::exec::{run_clone_queue, run_delete_queue, run_update_queue};
use crate::filter::filter_update_queue;
use crate::notify::NotifySink;
use crate::plan;
use crate::remote::RemoteExec;
use crate::report::{ChangeSet, FailureSet, UpdateFailure};
use crate::server_cfg::sync_server_config;
use crate::vcs::VcsMetadata;

/// Inputs for one reconciliation run.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Server name used in notifications.
    pub server_name: String,
    /// Raw control document. When absent, the run degenerates to a pure
    /// refresh of everything installed.
    pub control_document: Option<String>,
    /// Desired `server.cfg` contents, installed after reconciling.
    pub server_config: Option<String>,
    pub strategy: CollectStrategy,
}

/// Everything that happened during a run.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub changes: ChangeSet,
    pub failures: FailureSet,
}

/// Run one reconciliation pass.
///
/// Fatal errors (failure to collect the installed snapshot, or to fetch
/// upstream refs) abort the run; per-addon failures are collected into the
/// summary and the run completes. Reports are always attempted, and a report
/// delivery failure never re-fails the run.
pub async fn reconcile(
    remote: &dyn RemoteExec,
    vcs: &dyn VcsMetadata,
    sink: &dyn NotifySink,
    opts: &RunOptions,
) -> anyhow::Result<RunSummary> {
    info!("collecting installed addons");
    let installed = collect::collect(remote, opts.strategy)
        .await
        .context("failed to collect installed addons")?;

    info!("found {} installed addons; fetching upstream refs", installed.len());
    let remote_refs = vcs
        .latest_commits(&installed)
        .await
        .context("failed to fetch upstream commit hashes")?;

    let plan = match &opts.control_document {
        Some(document) => {
            info!("control document provided - reconciling against the desired set");
            let desired =
                parse_control_document(document).context("failed to parse the control document")?;
            plan::plan(&installed, &desired)
        }
        None => {
            info!("no control document - refreshing every installed addon");
            plan::refresh_all(&installed)
        }
    };

    let mut summary = RunSummary::default();

    if plan.to_delete.is_empty() {
        info!("no addons to delete");
    } else {
        let outcome = run_delete_queue(remote, plan.to_delete).await;
        summary.changes.merge(outcome.changes);
        summary.failures.merge(outcome.failures);
    }

    if plan.to_clone.is_empty() {
        info!("no addons to clone");
    } else {
        let outcome = run_clone_queue(remote, plan.to_clone).await;
        summary.changes.merge(outcome.changes);
        summary.failures.merge(outcome.failures);
    }

    if plan.to_update.is_empty() {
        info!("no addons to update");
    } else {
        let filtered = filter_update_queue(plan.to_update, &remote_refs);

        for addon in filtered.bad_branches {
            error!(
                "branch '{}' of {} does not exist upstream or is not accessible",
                addon.branch, addon.url
            );
            summary.failures.update.push(UpdateFailure {
                error: format!(
                    "Branch does not exist or is not accessible: '{}'",
                    addon.branch
                ),
                addon,
            });
        }

        if filtered.ready.is_empty() {
            info!("every update candidate is already at its latest commit");
        } else {
            let outcome = run_update_queue(remote, vcs, filtered.ready).await;
            summary.changes.merge(outcome.changes);
            summary.failures.merge(outcome.failures);
        }
    }

    if !summary.failures.is_empty()
        && let Ok(rendered) = serde_json::to_string_pretty(&summary.failures)
    {
        info!("failures:\n{rendered}");
    }

    if let Err(err) = sink.publish_changes(&opts.server_name, &summary.changes).await {
        error!("failed to publish the change report: {err:#}");
    }
    if let Err(err) = sink
        .publish_failures(&opts.server_name, &summary.failures)
        .await
    {
        error!("failed to publish the failure report: {err:#}");
    }

    if let Some(config) = &opts.server_config {
        sync_server_config(remote, sink, &opts.server_name, config)
            .await
            .context("failed to synchronize the server config")?;
    }

    // Leave the on-server manifest reflecting what this run changed.
    collect::refresh_git_info(remote).await;

    info!(
        "run finished: {} changes, {} failures",
        summary.changes.total(),
        summary.failures.total()
    );
    Ok(summary)
}
