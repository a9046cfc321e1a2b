//! tend - keep a game server's addons in sync with a control document.
//!
//! Usage:
//!   tend --domain https://panel.example.com --server-id abc123 \
//!        --server-name "My Server" --control-file addons.yaml
//!
//! Secrets (panel token, VCS token, webhook URLs) are usually supplied
//! through the environment.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use tend_core::collect::CollectStrategy;
use tend_core::notify::discord::DiscordSink;
use tend_core::remote::panel::{PanelClient, PanelConfig};
use tend_core::run::{RunOptions, reconcile};
use tend_core::vcs::github::GithubClient;

#[derive(Parser)]
#[command(name = "tend")]
#[command(about = "Reconcile game-server addons against a control document", version)]
struct Cli {
    /// Panel base URL, e.g. https://panel.example.com
    #[arg(long, env = "TEND_PANEL_DOMAIN")]
    domain: String,

    /// Identifier of the target server on the panel
    #[arg(long, env = "TEND_SERVER_ID")]
    server_id: String,

    /// Panel API token
    #[arg(long, env = "TEND_PANEL_TOKEN", hide_env_values = true)]
    token: String,

    /// Server name shown in notifications
    #[arg(long, env = "TEND_SERVER_NAME")]
    server_name: String,

    /// GitHub token used for commit metadata and private repositories
    #[arg(long, env = "TEND_GITHUB_TOKEN", hide_env_values = true)]
    github_token: String,

    /// Webhook receiving the change report
    #[arg(long, env = "TEND_ALERT_WEBHOOK", hide_env_values = true)]
    alert_webhook: String,

    /// Webhook receiving the failure report
    #[arg(long, env = "TEND_FAILURE_WEBHOOK", hide_env_values = true)]
    failure_webhook: String,

    /// YAML control document; omit to refresh every installed addon
    #[arg(long, env = "TEND_CONTROL_FILE")]
    control_file: Option<PathBuf>,

    /// server.cfg contents to install after reconciling
    #[arg(long, env = "TEND_SERVER_CONFIG")]
    server_config: Option<PathBuf>,

    /// Discover installed addons by probing the filesystem instead of the
    /// git-info manifest
    #[arg(long)]
    probe: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let control_document = read_optional(&cli.control_file, "control file")?;
    let server_config = read_optional(&cli.server_config, "server config")?;

    let vcs = GithubClient::new(&cli.github_token)?;
    let sink = DiscordSink::new(&cli.alert_webhook, &cli.failure_webhook)?;

    let panel = PanelClient::connect(&PanelConfig {
        domain: cli.domain.clone(),
        server_id: cli.server_id.clone(),
        token: cli.token.clone(),
        git_token: Some(cli.github_token.clone()),
    })
    .await
    .context("failed to connect to the panel")?;

    let opts = RunOptions {
        server_name: cli.server_name.clone(),
        control_document,
        server_config,
        strategy: if cli.probe {
            CollectStrategy::Probe
        } else {
            CollectStrategy::Snapshot
        },
    };

    // Always release the panel connection, also when the run fails.
    let result = reconcile(&panel, &vcs, &sink, &opts).await;
    panel.disconnect().await;

    let summary = result?;
    if summary.failures.is_empty() {
        info!("done: {} changes", summary.changes.total());
    } else {
        warn!(
            "done with {} failures ({} changes applied)",
            summary.failures.total(),
            summary.changes.total()
        );
    }

    Ok(())
}

fn read_optional(path: &Option<PathBuf>, what: &str) -> Result<Option<String>> {
    match path {
        Some(path) => std::fs::read_to_string(path)
            .map(Some)
            .with_context(|| format!("failed to read {what}: {}", path.display())),
        None => Ok(None),
    }
}
