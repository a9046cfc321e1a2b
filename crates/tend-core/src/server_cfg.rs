//! Server configuration synchronization.
//!
//! When a desired `server.cfg` is supplied, install it on the remote host and
//! announce the unified diff through the notification sink.

use anyhow::Context;
use similar::TextDiff;
use tracing::{debug, error, info};

use crate::notify::NotifySink;
use crate::paths::SERVER_CFG_PATH;
use crate::remote::RemoteExec;

pub async fn sync_server_config(
    remote: &dyn RemoteExec,
    sink: &dyn NotifySink,
    server_name: &str,
    desired: &str,
) -> anyhow::Result<()> {
    if desired.is_empty() {
        return Ok(());
    }

    let current = remote
        .read_file(SERVER_CFG_PATH)
        .await
        .context("failed to read the current server config")?;

    if current == desired {
        debug!("server config already up to date");
        return Ok(());
    }

    let diff = TextDiff::from_lines(current.as_str(), desired)
        .unified_diff()
        .context_radius(3)
        .header("current", "desired")
        .to_string();

    remote
        .write_file(SERVER_CFG_PATH, desired)
        .await
        .context("failed to write the server config")?;
    info!("server config updated");

    if let Err(err) = sink.publish_config_diff(server_name, &diff).await {
        error!("failed to publish the server config diff: {err:#}");
    }

    Ok(())
}
