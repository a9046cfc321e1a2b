//! Remote change executor: drive the three action queues against the panel.
//!
//! Every queue isolates per-item failures — one addon's failure never aborts
//! its siblings. Clone and pull fan-outs are bounded so the panel's command
//! budget is not overwhelmed; results are collected after the join and
//! appended sequentially.

use futures::{StreamExt, stream};
use tracing::{debug, error, info, warn};

use crate::addon::{DesiredAddon, InstalledAddon};
use crate::error::RemoteError;
use crate::paths::{ADDONS_DIR, addon_path};
use crate::remote::{CloneOutcome, PullOutcome, RemoteExec};
use crate::report::{
    ChangeSet, CreateFailure, CreatedAddon, DeleteFailure, DeletedAddon, FailureSet, UpdateFailure,
    UpdatedAddon,
};
use crate::vcs::VcsMetadata;

/// Concurrent remote operations kept in flight per queue.
const MAX_IN_FLIGHT: usize = 8;

/// Pull errors that are recoverable by deleting the checkout and recloning.
const RECLONE_ERRORS: [&str; 2] = ["No merge base found", "Unknown Error. Try again later."];

/// One queue's contribution to the run outcome.
#[derive(Debug, Default)]
pub struct QueueOutcome {
    pub changes: ChangeSet,
    pub failures: FailureSet,
}

/// Delete every addon in the queue, one at a time.
pub async fn run_delete_queue(
    remote: &dyn RemoteExec,
    to_delete: Vec<InstalledAddon>,
) -> QueueOutcome {
    let mut outcome = QueueOutcome::default();

    for addon in to_delete {
        info!("deleting {}", addon.path);
        match remote
            .delete_files(std::slice::from_ref(&addon.path))
            .await
        {
            Ok(()) => outcome.changes.deleted.push(DeletedAddon { addon }),
            Err(err) => {
                error!("failed to delete {}: {}", addon.repo, err.message());
                outcome.failures.delete.push(DeleteFailure {
                    error: err.message(),
                    addon,
                });
            }
        }
    }

    outcome
}

/// Clone every addon in the queue, bounded-concurrently.
pub async fn run_clone_queue(
    remote: &dyn RemoteExec,
    to_clone: Vec<DesiredAddon>,
) -> QueueOutcome {
    let results: Vec<(DesiredAddon, Result<CloneOutcome, RemoteError>)> =
        stream::iter(to_clone.into_iter().map(|addon| async move {
            let result = clone_addon(remote, &addon).await;
            (addon, result)
        }))
        .buffer_unordered(MAX_IN_FLIGHT)
        .collect()
        .await;

    let mut outcome = QueueOutcome::default();
    for (addon, result) in results {
        match result {
            Ok(clone) => {
                info!("cloned {} into {ADDONS_DIR}", addon.url);
                outcome.changes.created.push(CreatedAddon {
                    is_private: clone.is_private,
                    addon,
                });
            }
            Err(err) => {
                error!("failed to clone {}: {}", addon.url, err.message());
                outcome.failures.create.push(CreateFailure {
                    error: err.message(),
                    addon,
                });
            }
        }
    }

    outcome
}

async fn clone_addon(
    remote: &dyn RemoteExec,
    addon: &DesiredAddon,
) -> Result<CloneOutcome, RemoteError> {
    info!("cloning {} into {ADDONS_DIR}", addon.clone_url());
    let outcome = remote
        .git_clone(&addon.clone_url(), ADDONS_DIR, &addon.branch)
        .await?;

    // A declared name differing from the repo's natural name means the fresh
    // checkout has to move. Rename failure is non-fatal: the addon is
    // functionally installed, and the next run repairs the name through
    // mismatch detection.
    if let Some(name) = &addon.name
        && name != &addon.repo
    {
        info!("new addon wants a custom name: {} -> {name}", addon.repo);
        if let Err(err) = remote
            .rename_file(&addon_path(&addon.repo), &addon_path(name))
            .await
        {
            warn!(
                "rename of fresh clone {} failed: {}; keeping the natural name for now",
                addon.url,
                err.message()
            );
        }
    }

    Ok(outcome)
}

/// Pull every addon in the (already filtered) queue, bounded-concurrently.
pub async fn run_update_queue(
    remote: &dyn RemoteExec,
    vcs: &dyn VcsMetadata,
    to_update: Vec<InstalledAddon>,
) -> QueueOutcome {
    let results: Vec<(InstalledAddon, Result<PullOutcome, RemoteError>)> =
        stream::iter(to_update.into_iter().map(|addon| async move {
            let result = pull_addon(remote, &addon).await;
            (addon, result)
        }))
        .buffer_unordered(MAX_IN_FLIGHT)
        .collect()
        .await;

    let mut outcome = QueueOutcome::default();
    for (addon, result) in results {
        match result {
            Ok(pull) => {
                if pull.new_commit == addon.commit {
                    debug!("no changes for {}", addon.repo);
                    continue;
                }

                info!(
                    "{} moved {} -> {}",
                    addon.repo, addon.commit, pull.new_commit
                );
                let diff = match vcs
                    .commit_range_diff(&addon.owner, &addon.repo, &addon.commit, &pull.new_commit)
                    .await
                {
                    Ok(diff) => Some(diff),
                    Err(err) => {
                        // Degraded success: the checkout moved, only the
                        // report loses its commit detail.
                        warn!(
                            "update of {} succeeded but the diff could not be fetched: {err:#}",
                            addon.repo
                        );
                        None
                    }
                };

                outcome.changes.updated.push(UpdatedAddon {
                    diff,
                    is_private: pull.is_private,
                    addon,
                });
            }
            Err(err) => {
                error!("failed to update {}: {}", addon.repo, err.message());
                outcome.failures.update.push(UpdateFailure {
                    error: err.message(),
                    addon,
                });
            }
        }
    }

    outcome
}

/// Pull one addon, recovering by reclone where policy allows.
async fn pull_addon(
    remote: &dyn RemoteExec,
    addon: &InstalledAddon,
) -> Result<PullOutcome, RemoteError> {
    let err = match remote.git_pull(&addon.path).await {
        Ok(pull) => return Ok(pull),
        Err(err) => err,
    };

    let message = err.message();
    if !RECLONE_ERRORS.contains(&message.as_str()) {
        return Err(err);
    }

    if addon.on_primary_branch() {
        // A known-recoverable error on a primary branch is assumed transient;
        // never auto-delete a primary checkout over it.
        info!(
            "'{message}' while pulling {} on primary branch {}; leaving it alone",
            addon.path, addon.branch
        );
        return Err(err);
    }

    info!(
        "'{message}' while pulling {}; deleting and recloning",
        addon.path
    );
    remote
        .delete_files(std::slice::from_ref(&addon.path))
        .await?;
    remote
        .git_clone(&addon.clone_url(), ADDONS_DIR, &addon.branch)
        .await?;

    if addon.name != addon.repo {
        info!(
            "recloned a checkout with a custom name: {} wants to be at {}",
            addon.url, addon.name
        );
        remote
            .rename_file(&addon_path(&addon.repo), &addon_path(&addon.name))
            .await?;
    }

    remote.git_pull(&addon.path).await
}
