//! Update necessity filter: prune the update queue against live upstream
//! refs before anything is pulled.

use std::collections::BTreeMap;

use tracing::debug;

use crate::addon::InstalledAddon;
use crate::vcs::RemoteRef;

/// Result of filtering the update queue.
#[derive(Debug, Default)]
pub struct UpdateFilter {
    /// Addons that actually need a pull.
    pub ready: Vec<InstalledAddon>,
    /// Addons whose declared branch does not exist (or is not accessible)
    /// upstream. These must never reach the pull step; the caller records
    /// them as update failures.
    pub bad_branches: Vec<InstalledAddon>,
}

/// Partition the update queue against the bulk-fetched upstream refs.
///
/// Bad-branch detection runs before no-op filtering: an inaccessible branch
/// has no meaningful latest commit to compare against. Addons absent from the
/// ref map entirely are treated as inaccessible. Addons already at the latest
/// known commit are dropped silently.
pub fn filter_update_queue(
    to_update: Vec<InstalledAddon>,
    remote_refs: &BTreeMap<String, RemoteRef>,
) -> UpdateFilter {
    let mut filter = UpdateFilter::default();

    for addon in to_update {
        match remote_refs
            .get(&addon.url)
            .and_then(|r| r.latest_commit.as_deref())
        {
            None => filter.bad_branches.push(addon),
            Some(latest) if addon.commit == latest => {
                debug!("{} is already at {latest}; skipping", addon.repo);
            }
            Some(_) => filter.ready.push(addon),
        }
    }

    filter
}
