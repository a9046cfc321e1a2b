//! Websocket half of the panel client: git operations, file searches, and
//! console output.
//!
//! The panel speaks a JSON frame protocol of `{event, args}` pairs. Frames
//! carry no correlation ids, so in-flight requests are serialized behind a
//! mutex; replies are matched purely by event name. Concurrency across addons
//! happens at the executor level, not here.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::net::TcpStream;
use tokio::sync::{Mutex, MutexGuard};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::debug;

use super::{CloneOutcome, FileSearchResults, PullOutcome};
use crate::error::RemoteError;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

const AUTH_TIMEOUT: Duration = Duration::from_secs(10);
/// File searches fail closed if the host does not answer promptly.
const FILESEARCH_TIMEOUT: Duration = Duration::from_secs(5);
/// Clones of large repositories can legitimately take a while.
const GIT_TIMEOUT: Duration = Duration::from_secs(300);
pub(crate) const CONSOLE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Serialize, Deserialize)]
struct Frame {
    event: String,
    #[serde(default)]
    args: Vec<Value>,
}

/// Connected websocket session with the panel console.
pub struct PanelSocket {
    stream: Mutex<WsStream>,
}

impl PanelSocket {
    /// Connect and authenticate with the token from the REST API.
    pub async fn connect(url: &str, token: &str) -> Result<Self, RemoteError> {
        let (mut stream, _) = connect_async(url)
            .await
            .map_err(|err| RemoteError::Network(format!("websocket connect failed: {err}")))?;

        send_frame(&mut stream, "auth", vec![Value::String(token.to_string())]).await?;

        let auth = timeout(AUTH_TIMEOUT, async {
            loop {
                let frame = next_frame(&mut stream).await?;
                match frame.event.as_str() {
                    "auth_success" => return Ok(()),
                    "error" => {
                        let text = first_string(&frame);
                        return Err(RemoteError::Protocol(format!("panel auth failed: {text}")));
                    }
                    _ => continue,
                }
            }
        })
        .await;

        match auth {
            Ok(result) => result?,
            Err(_) => {
                return Err(RemoteError::Network(
                    "timed out waiting for panel auth".to_string(),
                ));
            }
        }

        debug!("panel websocket authenticated");
        Ok(Self {
            stream: Mutex::new(stream),
        })
    }

    pub(crate) async fn lock_stream(&self) -> MutexGuard<'_, WsStream> {
        self.stream.lock().await
    }

    pub async fn close(&self) {
        let mut stream = self.stream.lock().await;
        let _ = stream.close(None).await;
    }

    pub async fn filesearch(&self, pattern: &str) -> Result<FileSearchResults, RemoteError> {
        let value = self
            .request(
                "filesearch-start",
                vec![Value::String(pattern.to_string())],
                &["filesearch-results"],
                &[],
                FILESEARCH_TIMEOUT,
            )
            .await?;

        serde_json::from_value(value)
            .map_err(|err| RemoteError::Protocol(format!("malformed filesearch results: {err}")))
    }

    pub async fn git_clone(
        &self,
        url: &str,
        dir: &str,
        branch: &str,
        authkey: Option<&str>,
    ) -> Result<CloneOutcome, RemoteError> {
        let payload = json!({ "url": url, "dir": dir, "branch": branch, "authkey": authkey });
        let value = self
            .request(
                "git-clone",
                vec![payload],
                &["git-success"],
                &["git-error"],
                GIT_TIMEOUT,
            )
            .await?;

        Ok(CloneOutcome {
            is_private: value
                .get("isPrivate")
                .and_then(Value::as_bool)
                .unwrap_or(false),
        })
    }

    pub async fn git_pull(
        &self,
        dir: &str,
        authkey: Option<&str>,
    ) -> Result<PullOutcome, RemoteError> {
        let payload = json!({ "dir": dir, "authkey": authkey });
        let value = self
            .request(
                "git-pull",
                vec![payload],
                &["git-success"],
                &["git-error"],
                GIT_TIMEOUT,
            )
            .await?;

        // Older panels answer with a bare commit string.
        Ok(match value {
            Value::String(commit) => PullOutcome {
                new_commit: commit,
                is_private: false,
            },
            other => PullOutcome {
                new_commit: other
                    .get("output")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                is_private: other
                    .get("isPrivate")
                    .and_then(Value::as_bool)
                    .unwrap_or(false),
            },
        })
    }

    /// Send one frame and wait for the first success or failure event,
    /// ignoring unrelated console traffic. Fails closed on timeout.
    async fn request(
        &self,
        event: &str,
        args: Vec<Value>,
        success: &[&str],
        failure: &[&str],
        wait: Duration,
    ) -> Result<Value, RemoteError> {
        let mut stream = self.stream.lock().await;
        send_frame(&mut stream, event, args).await?;

        let reply = timeout(wait, async {
            loop {
                let frame = next_frame(&mut stream).await?;
                if success.contains(&frame.event.as_str()) {
                    return Ok(frame.args.into_iter().next().unwrap_or(Value::Null));
                }
                if failure.contains(&frame.event.as_str()) {
                    return Err(RemoteError::Unknown(first_string(&frame)));
                }
            }
        })
        .await;

        match reply {
            Ok(result) => result,
            Err(_) => Err(RemoteError::Network(format!(
                "timed out waiting for a reply to {event}"
            ))),
        }
    }

    /// Wait for a console line starting with `prefix` and return the rest.
    pub(crate) async fn await_console_line(
        stream: &mut WsStream,
        prefix: &str,
        wait: Duration,
    ) -> Result<String, RemoteError> {
        let line = timeout(wait, async {
            loop {
                let frame = next_frame(stream).await?;
                if frame.event == "console output"
                    && let Some(line) = frame.args.first().and_then(Value::as_str)
                    && let Some(rest) = line.strip_prefix(prefix)
                {
                    return Ok(rest.to_string());
                }
            }
        })
        .await;

        match line {
            Ok(result) => result,
            Err(_) => Err(RemoteError::Network(format!(
                "timed out waiting for console output matching '{prefix}'"
            ))),
        }
    }
}

fn first_string(frame: &Frame) -> String {
    frame
        .args
        .first()
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

pub(crate) async fn send_frame(
    stream: &mut WsStream,
    event: &str,
    args: Vec<Value>,
) -> Result<(), RemoteError> {
    let frame = Frame {
        event: event.to_string(),
        args,
    };
    let text = serde_json::to_string(&frame)
        .map_err(|err| RemoteError::Protocol(format!("could not encode {event} frame: {err}")))?;

    stream
        .send(Message::Text(text))
        .await
        .map_err(|err| RemoteError::Network(format!("websocket send failed: {err}")))
}

pub(crate) async fn next_frame(stream: &mut WsStream) -> Result<Frame, RemoteError> {
    loop {
        let message = stream
            .next()
            .await
            .ok_or_else(|| RemoteError::Network("websocket closed".to_string()))?
            .map_err(|err| RemoteError::Network(format!("websocket receive failed: {err}")))?;

        match message {
            Message::Text(text) => {
                if let Ok(frame) = serde_json::from_str::<Frame>(&text) {
                    return Ok(frame);
                }
                // Non-frame traffic (keepalives, stats) is ignored.
            }
            Message::Close(_) => {
                return Err(RemoteError::Network(
                    "websocket closed by the panel".to_string(),
                ));
            }
            _ => continue,
        }
    }
}
