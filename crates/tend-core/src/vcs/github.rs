//! GitHub-backed implementation of the VCS metadata port.
//!
//! Head commits are fetched in bulk through the GraphQL API (one aliased
//! `repository` field per addon, chunked to respect API limits); commit-range
//! diffs come from the REST compare endpoint.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderValue};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::debug;

use super::{CommitAuthor, CommitInfo, CompareInfo, RemoteRef, VcsMetadata};
use crate::addon::InstalledAddon;

const API_ROOT: &str = "https://api.github.com";
const GRAPHQL_URL: &str = "https://api.github.com/graphql";
const API_VERSION: &str = "2022-11-28";

/// Addons per GraphQL request.
const BULK_CHUNK: usize = 50;

/// Length commit SHAs are truncated to for compare queries.
const SHORT_SHA_LEN: usize = 6;

pub struct GithubClient {
    http: reqwest::Client,
}

impl GithubClient {
    pub fn new(token: &str) -> anyhow::Result<Self> {
        let mut headers = HeaderMap::new();
        let mut auth = HeaderValue::from_str(&format!("Bearer {token}"))
            .context("GitHub token is not a valid header value")?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);
        headers.insert(ACCEPT, HeaderValue::from_static("application/vnd.github+json"));
        headers.insert(
            "X-GitHub-Api-Version",
            HeaderValue::from_static(API_VERSION),
        );

        let http = reqwest::Client::builder()
            .user_agent(concat!("tend/", env!("CARGO_PKG_VERSION")))
            .default_headers(headers)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self { http })
    }
}

#[async_trait]
impl VcsMetadata for GithubClient {
    async fn latest_commits(
        &self,
        addons: &BTreeMap<String, InstalledAddon>,
    ) -> anyhow::Result<BTreeMap<String, RemoteRef>> {
        let list: Vec<&InstalledAddon> = addons.values().collect();
        let total_chunks = list.len().div_ceil(BULK_CHUNK);

        let mut refs = BTreeMap::new();
        for (index, chunk) in list.chunks(BULK_CHUNK).enumerate() {
            debug!("fetching ref chunk {}/{}", index + 1, total_chunks);

            let query = build_ref_query(chunk);
            let response = self
                .http
                .post(GRAPHQL_URL)
                .json(&json!({ "query": query }))
                .send()
                .await
                .context("GraphQL request failed")?;

            let status = response.status();
            if !status.is_success() {
                anyhow::bail!("GraphQL request failed: HTTP {status}");
            }

            let body: Value = response
                .json()
                .await
                .context("Failed to parse GraphQL response")?;
            let data = body
                .get("data")
                .filter(|data| !data.is_null())
                .ok_or_else(|| anyhow::anyhow!("GraphQL response carried no data: {body}"))?;

            refs.append(&mut map_ref_response(data, chunk));
        }

        Ok(refs)
    }

    async fn commit_range_diff(
        &self,
        owner: &str,
        repo: &str,
        old_sha: &str,
        new_sha: &str,
    ) -> anyhow::Result<CompareInfo> {
        let basehead = format!("{}...{}", short_sha(old_sha), short_sha(new_sha));
        let url = format!("{API_ROOT}/repos/{owner}/{repo}/compare/{basehead}");
        debug!("fetching diff {basehead} for {owner}/{repo}");

        let response = self
            .http
            .get(&url)
            .send()
            .await
            .with_context(|| format!("Compare request failed for {owner}/{repo}"))?;

        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("Compare request for {owner}/{repo} failed: HTTP {status}");
        }

        let compare: CompareResponse = response
            .json()
            .await
            .context("Failed to parse compare response")?;

        Ok(compare.into())
    }
}

/// One aliased `repository` field per addon, so a single request answers for
/// the whole chunk. Aliases are positional (`repo0`, `repo1`, ...).
fn build_ref_query(addons: &[&InstalledAddon]) -> String {
    let mut query = String::from("query {");
    for (index, addon) in addons.iter().enumerate() {
        let _ = write!(
            query,
            r#" repo{index}: repository(owner: "{}", name: "{}") {{ isPrivate ref(qualifiedName: "{}") {{ target {{ ... on Commit {{ oid }} }} }} }}"#,
            graphql_escape(&addon.owner),
            graphql_escape(&addon.repo),
            graphql_escape(&addon.branch),
        );
    }
    query.push_str(" }");
    query
}

fn graphql_escape(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Map the aliased GraphQL answer back onto the queried addons.
///
/// A null repository (missing or inaccessible) or a null ref (branch does not
/// exist) both come out as `latest_commit: None`.
fn map_ref_response(data: &Value, addons: &[&InstalledAddon]) -> BTreeMap<String, RemoteRef> {
    let mut refs = BTreeMap::new();

    let Some(entries) = data.as_object() else {
        return refs;
    };

    for (alias, item) in entries {
        let Some(index) = alias
            .strip_prefix("repo")
            .and_then(|n| n.parse::<usize>().ok())
        else {
            continue;
        };
        let Some(addon) = addons.get(index) else {
            continue;
        };

        let latest_commit = item
            .pointer("/ref/target/oid")
            .and_then(Value::as_str)
            .map(str::to_string);
        let is_private = item
            .get("isPrivate")
            .and_then(Value::as_bool)
            .unwrap_or(false);

        refs.insert(
            addon.url.clone(),
            RemoteRef {
                latest_commit,
                is_private,
            },
        );
    }

    refs
}

fn short_sha(sha: &str) -> &str {
    &sha[..sha.len().min(SHORT_SHA_LEN)]
}

#[derive(Debug, Deserialize)]
struct CompareResponse {
    html_url: String,
    commits: Vec<CompareCommit>,
}

#[derive(Debug, Deserialize)]
struct CompareCommit {
    sha: String,
    html_url: String,
    author: Option<GithubUser>,
    commit: GitCommit,
}

#[derive(Debug, Deserialize)]
struct GithubUser {
    login: String,
    #[serde(default)]
    avatar_url: String,
    #[serde(default)]
    html_url: String,
}

#[derive(Debug, Deserialize)]
struct GitCommit {
    message: String,
    author: Option<GitAuthor>,
    verification: Option<Verification>,
}

#[derive(Debug, Deserialize)]
struct GitAuthor {
    #[serde(default)]
    date: String,
}

#[derive(Debug, Deserialize)]
struct Verification {
    #[serde(default)]
    verified: bool,
}

impl From<CompareResponse> for CompareInfo {
    fn from(response: CompareResponse) -> Self {
        let commits = response
            .commits
            .into_iter()
            .map(|commit| {
                let author = match commit.author {
                    Some(user) => CommitAuthor {
                        username: user.login,
                        avatar: user.avatar_url,
                        url: user.html_url,
                    },
                    None => CommitAuthor {
                        username: "unknown".to_string(),
                        avatar: String::new(),
                        url: String::new(),
                    },
                };

                CommitInfo {
                    sha: commit.sha,
                    message: commit.commit.message,
                    url: commit.html_url,
                    author,
                    verified: commit
                        .commit
                        .verification
                        .map(|v| v.verified)
                        .unwrap_or(false),
                    date: commit.commit.author.map(|a| a.date).unwrap_or_default(),
                }
            })
            .collect();

        CompareInfo {
            url: response.html_url,
            commits,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addon(url: &str, owner: &str, repo: &str, branch: &str) -> InstalledAddon {
        InstalledAddon {
            path: format!("/garrysmod/addons/{repo}"),
            name: repo.to_string(),
            url: url.to_string(),
            owner: owner.to_string(),
            repo: repo.to_string(),
            branch: branch.to_string(),
            commit: "abc123".to_string(),
        }
    }

    #[test]
    fn ref_query_aliases_every_addon() {
        let a = addon("https://github.com/acme/widgets", "acme", "widgets", "main");
        let b = addon("https://github.com/acme/gadgets", "acme", "gadgets", "dev");
        let query = build_ref_query(&[&a, &b]);

        assert!(query.contains(r#"repo0: repository(owner: "acme", name: "widgets")"#));
        assert!(query.contains(r#"repo1: repository(owner: "acme", name: "gadgets")"#));
        assert!(query.contains(r#"qualifiedName: "dev""#));
    }

    #[test]
    fn ref_query_escapes_quotes() {
        let a = addon("https://github.com/acme/widgets", "acme", "widgets", "a\"b");
        let query = build_ref_query(&[&a]);
        assert!(query.contains(r#"qualifiedName: "a\"b""#));
    }

    #[test]
    fn ref_response_maps_oid_and_privacy() {
        let a = addon("https://github.com/acme/widgets", "acme", "widgets", "main");
        let data = json!({
            "repo0": {
                "isPrivate": true,
                "ref": { "target": { "oid": "deadbeef" } }
            }
        });

        let refs = map_ref_response(&data, &[&a]);
        let entry = &refs["https://github.com/acme/widgets"];
        assert_eq!(entry.latest_commit.as_deref(), Some("deadbeef"));
        assert!(entry.is_private);
    }

    #[test]
    fn missing_ref_means_inaccessible_branch() {
        let a = addon("https://github.com/acme/widgets", "acme", "widgets", "gone");
        let data = json!({
            "repo0": { "isPrivate": false, "ref": null }
        });

        let refs = map_ref_response(&data, &[&a]);
        assert_eq!(refs["https://github.com/acme/widgets"].latest_commit, None);
    }

    #[test]
    fn null_repository_means_inaccessible_branch() {
        let a = addon("https://github.com/acme/widgets", "acme", "widgets", "main");
        let data = json!({ "repo0": null });

        let refs = map_ref_response(&data, &[&a]);
        assert_eq!(refs["https://github.com/acme/widgets"].latest_commit, None);
    }

    #[test]
    fn short_sha_truncates_long_hashes_only() {
        assert_eq!(short_sha("0123456789abcdef"), "012345");
        assert_eq!(short_sha("0123"), "0123");
    }

    #[test]
    fn compare_response_falls_back_for_missing_authors() {
        let response = CompareResponse {
            html_url: "https://github.com/acme/widgets/compare/012345...abcdef".to_string(),
            commits: vec![CompareCommit {
                sha: "abcdef0".to_string(),
                html_url: "https://github.com/acme/widgets/commit/abcdef0".to_string(),
                author: None,
                commit: GitCommit {
                    message: "fix the thing".to_string(),
                    author: None,
                    verification: None,
                },
            }],
        };

        let info: CompareInfo = response.into();
        assert_eq!(info.commits.len(), 1);
        assert_eq!(info.commits[0].author.username, "unknown");
        assert!(!info.commits[0].verified);
        assert_eq!(info.commits[0].date, "");
    }
}
