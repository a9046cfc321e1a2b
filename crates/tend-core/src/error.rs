//! Error types for tend-core.

use thiserror::Error;

/// A repository URL the identity resolver could not make sense of.
///
/// Owner and repo feed directly into VCS metadata queries, so a malformed URL
/// is a hard error rather than a garbage key.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unsupported repository url: {url}")]
pub struct BadUrl {
    pub url: String,
}

/// All errors that can arise from talking to the remote execution port.
///
/// Raw error text from the panel is preserved in the `Unknown` variant; the
/// pull-recovery policy matches against it verbatim.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RemoteError {
    /// Transport-level failure: connect, send, receive, timeout.
    #[error("network error: {0}")]
    Network(String),

    /// The panel answered, but not with anything we could use.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The panel reported the target path or resource as missing.
    #[error("not found: {0}")]
    NotFound(String),

    /// Unrecognized failure; carries whatever text the panel produced.
    #[error("{0}")]
    Unknown(String),
}

impl RemoteError {
    /// Human-readable message for failure reports.
    ///
    /// Unrecognized failures keep their raw text; an empty raw text collapses
    /// to the `"Unknown Error"` placeholder.
    pub fn message(&self) -> String {
        match self {
            RemoteError::Unknown(raw) if raw.trim().is_empty() => "Unknown Error".to_string(),
            RemoteError::Unknown(raw) => raw.clone(),
            other => other.to_string(),
        }
    }
}

/// Errors from parsing the control document.
#[derive(Debug, Error)]
pub enum ControlError {
    /// Not valid YAML, or an entry is missing a required `url`/`branch` field.
    #[error("invalid control document: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    BadUrl(#[from] BadUrl),
}

/// Errors from collecting the installed-addon snapshot. Fatal to the run.
#[derive(Debug, Error)]
pub enum CollectError {
    #[error("failed to read installed-addon state: {0}")]
    Remote(#[from] RemoteError),

    #[error("git info manifest is not valid JSON: {0}")]
    Manifest(#[from] serde_json::Error),

    #[error(transparent)]
    BadUrl(#[from] BadUrl),
}
