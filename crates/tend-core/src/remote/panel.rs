//! The panel client: REST and websocket halves composed into the remote
//! execution port.

use anyhow::Context;
use async_trait::async_trait;
use tracing::info;

use super::http::PanelHttp;
use super::socket::{CONSOLE_TIMEOUT, PanelSocket};
use super::{CloneOutcome, FileSearchResults, PullOutcome, RemoteExec};
use crate::error::RemoteError;

/// Connection settings for one panel server.
#[derive(Debug, Clone)]
pub struct PanelConfig {
    /// Panel base URL, e.g. `https://panel.example.com`.
    pub domain: String,
    /// Identifier of the target server on the panel.
    pub server_id: String,
    /// Panel API token.
    pub token: String,
    /// Token forwarded to the panel for private clones and pulls.
    pub git_token: Option<String>,
}

pub struct PanelClient {
    http: PanelHttp,
    socket: PanelSocket,
    git_token: Option<String>,
}

impl PanelClient {
    /// Connect and authenticate both halves of the client.
    pub async fn connect(config: &PanelConfig) -> anyhow::Result<Self> {
        let http = PanelHttp::new(&config.domain, &config.server_id, &config.token)?;

        let details = http
            .websocket_details()
            .await
            .context("failed to fetch websocket credentials")?;
        let socket = PanelSocket::connect(&details.url, &details.token)
            .await
            .context("failed to open the panel websocket")?;

        info!("connected to panel server {}", config.server_id);
        Ok(Self {
            http,
            socket,
            git_token: config.git_token.clone(),
        })
    }

    /// Close the websocket. Always attempted, also on fatal error paths.
    pub async fn disconnect(&self) {
        self.socket.close().await;
        info!("disconnected from panel");
    }
}

#[async_trait]
impl RemoteExec for PanelClient {
    async fn search_files(&self, pattern: &str) -> Result<FileSearchResults, RemoteError> {
        self.socket.filesearch(pattern).await
    }

    async fn read_file(&self, path: &str) -> Result<String, RemoteError> {
        self.http.read_file(path).await
    }

    async fn write_file(&self, path: &str, content: &str) -> Result<(), RemoteError> {
        self.http.write_file(path, content).await
    }

    async fn delete_files(&self, paths: &[String]) -> Result<(), RemoteError> {
        self.http.delete_files(paths).await
    }

    async fn rename_file(&self, from: &str, to: &str) -> Result<(), RemoteError> {
        self.http.rename_file(from, to).await
    }

    async fn run_command_with_nonce(
        &self,
        prefix: &str,
        command: &str,
    ) -> Result<String, RemoteError> {
        // Hold the socket before firing the command so its output cannot slip
        // past between send and listen.
        let mut stream = self.socket.lock_stream().await;
        self.http.send_command(command).await?;
        PanelSocket::await_console_line(&mut stream, prefix, CONSOLE_TIMEOUT).await
    }

    async fn git_clone(
        &self,
        url: &str,
        dir: &str,
        branch: &str,
    ) -> Result<CloneOutcome, RemoteError> {
        self.socket
            .git_clone(url, dir, branch, self.git_token.as_deref())
            .await
    }

    async fn git_pull(&self, dir: &str) -> Result<PullOutcome, RemoteError> {
        self.socket
            .git_pull(dir, self.git_token.as_deref())
            .await
    }
}
