//! Installed-state collection: build the map of addons currently checked out
//! on the server.
//!
//! Two strategies are supported. The snapshot strategy asks the server-side
//! companion to regenerate a JSON manifest and reads it in one call; the probe
//! strategy walks the filesystem for git markers and inspects each checkout.
//! A run picks one strategy and sticks with it.

use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::Utc;
use futures::{StreamExt, stream};
use serde::Deserialize;
use tracing::{info, warn};

use crate::addon::{InstalledAddon, canonical_url, split_owner_repo};
use crate::error::CollectError;
use crate::paths::GIT_INFO_PATH;
use crate::remote::RemoteExec;

/// Console command the server-side companion listens for.
const GIT_INFO_COMMAND: &str = "tend";

/// Concurrent probe calls kept in flight against the remote host.
const PROBE_BATCH: usize = 8;

/// How the installed-addon map is discovered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CollectStrategy {
    /// Read the companion-generated git-info manifest. One remote round trip;
    /// preferred when the companion is installed.
    #[default]
    Snapshot,
    /// Search the filesystem for git checkouts and probe each one.
    Probe,
}

/// Shape of the companion-generated manifest.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GitInfoManifest {
    generated_at: i64,
    installed_addons: Vec<ManifestAddon>,
}

#[derive(Debug, Deserialize)]
struct ManifestAddon {
    path: String,
    url: String,
    branch: String,
    commit: String,
}

/// Ask the server to rebuild its git-info manifest.
///
/// Best-effort: if the server is down the stale manifest is still readable,
/// so a command failure is logged and swallowed.
pub async fn refresh_git_info(remote: &dyn RemoteExec) {
    let nonce = format!("tend-{}", nonce_suffix());
    let command = format!("{GIT_INFO_COMMAND} {nonce} gitinfo");

    match remote
        .run_command_with_nonce(&format!("{nonce}: "), &command)
        .await
    {
        Ok(_) => info!("server regenerated its git info manifest"),
        Err(err) => warn!(
            "could not regenerate the git info manifest (is the server down?): {}",
            err.message()
        ),
    }
}

/// Build the installed-addon map, keyed by canonical URL.
///
/// Fails with a [`CollectError`] when the snapshot/search call itself fails;
/// individual addon detail failures in the probe strategy are non-fatal.
pub async fn collect(
    remote: &dyn RemoteExec,
    strategy: CollectStrategy,
) -> Result<BTreeMap<String, InstalledAddon>, CollectError> {
    match strategy {
        CollectStrategy::Snapshot => collect_from_manifest(remote).await,
        CollectStrategy::Probe => collect_by_probe(remote).await,
    }
}

async fn collect_from_manifest(
    remote: &dyn RemoteExec,
) -> Result<BTreeMap<String, InstalledAddon>, CollectError> {
    refresh_git_info(remote).await;

    let raw = remote.read_file(GIT_INFO_PATH).await?;
    let manifest: GitInfoManifest = serde_json::from_str(&raw)?;

    let age = Utc::now().timestamp() - manifest.generated_at;
    info!("git info manifest is {age}s old");

    let mut installed = BTreeMap::new();
    for entry in manifest.installed_addons {
        let url = canonical_url(&entry.url);
        let (owner, repo) = split_owner_repo(&url)?;
        let name = entry
            .path
            .rsplit('/')
            .next()
            .unwrap_or(entry.path.as_str())
            .to_string();

        installed.insert(
            url.clone(),
            InstalledAddon {
                path: entry.path,
                name,
                url,
                owner,
                repo,
                branch: entry.branch,
                commit: entry.commit,
            },
        );
    }

    Ok(installed)
}

async fn collect_by_probe(
    remote: &dyn RemoteExec,
) -> Result<BTreeMap<String, InstalledAddon>, CollectError> {
    let search = remote.search_files("remote \"origin\"").await?;
    if search.too_many {
        warn!("filesystem search was truncated; some addons may be missed");
    }

    let mut checkouts = Vec::new();
    for key in search.files.keys() {
        // "garrysmod/addons/niknaks/.git/config"
        let Some(dir) = key.strip_suffix("/.git/config") else {
            continue;
        };
        let path = if dir.starts_with('/') {
            dir.to_string()
        } else {
            format!("/{dir}")
        };
        let name = path
            .rsplit('/')
            .next()
            .unwrap_or(path.as_str())
            .to_string();
        checkouts.push((path, name));
    }

    let probed: Vec<Option<InstalledAddon>> =
        stream::iter(checkouts.into_iter().map(|(path, name)| async move {
            probe_checkout(remote, path, name).await
        }))
        .buffer_unordered(PROBE_BATCH)
        .collect()
        .await;

    let mut installed = BTreeMap::new();
    for addon in probed.into_iter().flatten() {
        installed.insert(addon.url.clone(), addon);
    }

    Ok(installed)
}

/// Inspect one checkout. The URL is required (it is the map key); branch and
/// commit are best-effort and left empty when a probe fails.
async fn probe_checkout(
    remote: &dyn RemoteExec,
    path: String,
    name: String,
) -> Option<InstalledAddon> {
    let config = match remote.read_file(&format!("{path}/.git/config")).await {
        Ok(config) => config,
        Err(err) => {
            warn!("skipping {path}: could not read git config: {}", err.message());
            return None;
        }
    };

    let Some(raw_url) = parse_remote_url(&config) else {
        warn!("skipping {path}: no remote url in git config");
        return None;
    };

    let url = canonical_url(raw_url);
    let (owner, repo) = match split_owner_repo(&url) {
        Ok(pair) => pair,
        Err(err) => {
            warn!("skipping {path}: {err}");
            return None;
        }
    };

    let mut branch = String::new();
    let mut commit = String::new();
    match remote.read_file(&format!("{path}/.git/HEAD")).await {
        Ok(head) => {
            let head = head.trim();
            if let Some(reference) = head.strip_prefix("ref: refs/heads/") {
                branch = reference.to_string();
                match remote
                    .read_file(&format!("{path}/.git/refs/heads/{branch}"))
                    .await
                {
                    Ok(resolved) => commit = resolved.trim().to_string(),
                    Err(err) => warn!(
                        "could not resolve branch {branch} of {path}: {}",
                        err.message()
                    ),
                }
            } else {
                // Detached HEAD carries the commit directly.
                commit = head.to_string();
            }
        }
        Err(err) => warn!("could not read HEAD of {path}: {}", err.message()),
    }

    Some(InstalledAddon {
        path,
        name,
        url,
        owner,
        repo,
        branch,
        commit,
    })
}

/// Pull the `url = ...` line out of a git config file.
fn parse_remote_url(config: &str) -> Option<&str> {
    config
        .lines()
        .map(str::trim)
        .find_map(|line| line.strip_prefix("url = "))
        .map(str::trim)
}

fn nonce_suffix() -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);
    format!("{nanos:08x}")
}
