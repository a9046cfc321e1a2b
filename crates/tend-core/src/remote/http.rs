//! REST half of the panel client: file operations and console commands.

use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderValue};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::debug;

use crate::error::RemoteError;

/// Credentials for the panel's websocket console.
#[derive(Debug, Clone, Deserialize)]
pub struct WebsocketDetails {
    pub url: String,
    pub token: String,
}

#[derive(Debug, Deserialize)]
struct WebsocketResponse {
    data: WebsocketDetails,
}

/// Thin client for the panel's per-server REST API.
pub struct PanelHttp {
    http: reqwest::Client,
    base: String,
}

impl PanelHttp {
    pub fn new(domain: &str, server_id: &str, token: &str) -> Result<Self, RemoteError> {
        let mut headers = HeaderMap::new();
        let mut auth = HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|_| RemoteError::Protocol("panel token is not a valid header value".into()))?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let http = reqwest::Client::builder()
            .user_agent(concat!("tend/", env!("CARGO_PKG_VERSION")))
            .default_headers(headers)
            .build()
            .map_err(|err| RemoteError::Network(err.to_string()))?;

        Ok(Self {
            http,
            base: format!(
                "{}/api/client/servers/{server_id}",
                domain.trim_end_matches('/')
            ),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{path}", self.base)
    }

    /// Fetch websocket credentials for the server console.
    pub async fn websocket_details(&self) -> Result<WebsocketDetails, RemoteError> {
        let response = self.get("websocket", &[]).await?;
        let details: WebsocketResponse = response
            .json()
            .await
            .map_err(|err| RemoteError::Protocol(format!("malformed websocket details: {err}")))?;
        Ok(details.data)
    }

    pub async fn read_file(&self, path: &str) -> Result<String, RemoteError> {
        let response = self.get("files/read", &[("path", path)]).await?;
        let body: Value = response
            .json()
            .await
            .map_err(|err| RemoteError::Protocol(format!("malformed file read response: {err}")))?;

        body.get("content")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| {
                RemoteError::Protocol(format!("file read response carried no content for {path}"))
            })
    }

    pub async fn write_file(&self, path: &str, content: &str) -> Result<(), RemoteError> {
        self.post("files/write", &json!({ "path": path, "content": content }))
            .await
            .map(|_| ())
    }

    pub async fn delete_files(&self, paths: &[String]) -> Result<(), RemoteError> {
        self.post("files/delete", &json!({ "paths": paths }))
            .await
            .map(|_| ())
    }

    pub async fn rename_file(&self, from: &str, to: &str) -> Result<(), RemoteError> {
        let url = self.url("files/rename");
        debug!("PUT {url}");
        let response = self
            .http
            .put(&url)
            .json(&json!({ "path": from, "to": to }))
            .send()
            .await
            .map_err(|err| RemoteError::Network(err.to_string()))?;
        check_status(&url, response).map(|_| ())
    }

    /// Fire a console command. Output is observed separately over the socket.
    pub async fn send_command(&self, command: &str) -> Result<(), RemoteError> {
        self.post("command", &json!({ "command": command }))
            .await
            .map(|_| ())
    }

    async fn get(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<reqwest::Response, RemoteError> {
        let url = self.url(path);
        debug!("GET {url}");
        let response = self
            .http
            .get(&url)
            .query(query)
            .send()
            .await
            .map_err(|err| RemoteError::Network(err.to_string()))?;
        check_status(&url, response)
    }

    async fn post(&self, path: &str, body: &Value) -> Result<reqwest::Response, RemoteError> {
        let url = self.url(path);
        debug!("POST {url}");
        let response = self
            .http
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|err| RemoteError::Network(err.to_string()))?;
        check_status(&url, response)
    }
}

fn check_status(
    url: &str,
    response: reqwest::Response,
) -> Result<reqwest::Response, RemoteError> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else if status == reqwest::StatusCode::NOT_FOUND {
        Err(RemoteError::NotFound(url.to_string()))
    } else {
        Err(RemoteError::Protocol(format!("HTTP {status} from {url}")))
    }
}
