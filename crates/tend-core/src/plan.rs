//! Reconciliation planner: diff installed state against the desired set.

use std::collections::BTreeMap;

use tracing::info;

use crate::addon::{DesiredAddon, InstalledAddon};

/// The three action queues produced by a planning pass.
///
/// Queues are disjoint by construction, except that a branch or name mismatch
/// puts the installed addon in `to_delete` and its desired counterpart in
/// `to_clone` — drift cannot be reconciled in place, so the checkout is
/// destroyed and recreated.
#[derive(Debug, Clone, Default)]
pub struct ReconcilePlan {
    pub to_clone: Vec<DesiredAddon>,
    pub to_update: Vec<InstalledAddon>,
    pub to_delete: Vec<InstalledAddon>,
}

/// Partition the desired and installed maps into clone/update/delete queues.
///
/// Both maps must be keyed by canonical URL. Inputs are borrowed immutably;
/// queue order follows map iteration order.
pub fn plan(
    installed: &BTreeMap<String, InstalledAddon>,
    desired: &BTreeMap<String, DesiredAddon>,
) -> ReconcilePlan {
    let mut plan = ReconcilePlan::default();

    for (url, desired_addon) in desired {
        let Some(installed_addon) = installed.get(url) else {
            info!("{url} is not installed; queueing a clone");
            plan.to_clone.push(desired_addon.clone());
            continue;
        };

        let branch_match = installed_addon.branch == desired_addon.branch;
        // An absent desired name matches any installed name.
        let name_match = match &desired_addon.name {
            Some(name) => name == &installed_addon.name,
            None => true,
        };

        if branch_match && name_match {
            plan.to_update.push(installed_addon.clone());
        } else {
            if !branch_match {
                info!(
                    "branch mismatch for {}: {} != {}",
                    installed_addon.path, installed_addon.branch, desired_addon.branch
                );
            }
            if !name_match {
                info!(
                    "name mismatch for {}: {} != {}",
                    installed_addon.path,
                    installed_addon.name,
                    desired_addon.install_name()
                );
            }

            plan.to_delete.push(installed_addon.clone());
            plan.to_clone.push(desired_addon.clone());
        }
    }

    for (url, installed_addon) in installed {
        if !desired.contains_key(url) {
            info!("{url} is installed but no longer desired; queueing a delete");
            plan.to_delete.push(installed_addon.clone());
        }
    }

    plan
}

/// Degenerate planning mode used when no control document is supplied:
/// refresh every installed addon, create and delete nothing.
pub fn refresh_all(installed: &BTreeMap<String, InstalledAddon>) -> ReconcilePlan {
    ReconcilePlan {
        to_update: installed.values().cloned().collect(),
        ..ReconcilePlan::default()
    }
}
