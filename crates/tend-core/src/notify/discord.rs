//! Discord webhook implementation of the notification sink.
//!
//! Changes go to the alert webhook, failures to the failure webhook. Private
//! repositories get their commit metadata redacted before anything leaves the
//! process.

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Value, json};
use tracing::{debug, info};

use super::NotifySink;
use crate::report::{ChangeSet, CreatedAddon, DeletedAddon, FailureSet, UpdatedAddon};
use crate::vcs::CommitInfo;

const COLOR_UPDATE: u32 = 0x1E90FF;
const COLOR_DELETE: u32 = 0xFF4500;
const COLOR_CREATE: u32 = 0x32CD32;
const COLOR_FAILURE: u32 = 0xFF0000;

/// Link target substituted for anything belonging to a private repository.
const HIDDEN_URL: &str = "https://github.com/404";

/// Discord caps embeds per message.
const MAX_EMBEDS_PER_POST: usize = 10;
/// Discord caps embed descriptions.
const MAX_DESCRIPTION: usize = 2048;
const MAX_COMMIT_MESSAGE: usize = 50;

pub struct DiscordSink {
    http: reqwest::Client,
    alert_url: String,
    failure_url: String,
}

impl DiscordSink {
    pub fn new(alert_url: &str, failure_url: &str) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("tend/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            http,
            alert_url: alert_url.to_string(),
            failure_url: failure_url.to_string(),
        })
    }

    async fn post_embeds(
        &self,
        url: &str,
        server_name: &str,
        embeds: &[Value],
    ) -> anyhow::Result<()> {
        for chunk in embeds.chunks(MAX_EMBEDS_PER_POST) {
            let response = self
                .http
                .post(url)
                .json(&json!({ "username": server_name, "embeds": chunk }))
                .send()
                .await
                .context("failed to send webhook")?;

            let status = response.status();
            if !status.is_success() {
                anyhow::bail!("webhook returned HTTP {status}");
            }
        }
        Ok(())
    }
}

#[async_trait]
impl NotifySink for DiscordSink {
    async fn publish_changes(&self, server_name: &str, changes: &ChangeSet) -> anyhow::Result<()> {
        if changes.is_empty() {
            debug!("no changes to report");
            return Ok(());
        }
        info!(
            "publishing change report for {server_name}: {} changes",
            changes.total()
        );

        let mut embeds = Vec::new();
        if !changes.created.is_empty() {
            embeds.push(created_embed(&changes.created));
        }
        if !changes.deleted.is_empty() {
            embeds.push(deleted_embed(&changes.deleted));
        }
        embeds.extend(changes.updated.iter().filter_map(update_embed));

        self.post_embeds(&self.alert_url, server_name, &embeds).await
    }

    async fn publish_failures(
        &self,
        server_name: &str,
        failures: &FailureSet,
    ) -> anyhow::Result<()> {
        if failures.is_empty() {
            debug!("no failures to report");
            return Ok(());
        }
        info!(
            "publishing failure report for {server_name}: {} failures",
            failures.total()
        );

        let mut embeds = Vec::new();
        if !failures.create.is_empty() {
            let lines = failures
                .create
                .iter()
                .map(|f| format!("- **{}**: `{}`", f.addon.repo, f.error))
                .collect();
            embeds.push(failure_embed("❌ Failed Installs", lines));
        }
        if !failures.update.is_empty() {
            let lines = failures
                .update
                .iter()
                .map(|f| format!("- **{}**: `{}`", f.addon.repo, f.error))
                .collect();
            embeds.push(failure_embed("❌ Failed Updates", lines));
        }
        if !failures.delete.is_empty() {
            let lines = failures
                .delete
                .iter()
                .map(|f| format!("- **{}**: `{}`", f.addon.repo, f.error))
                .collect();
            embeds.push(failure_embed("❌ Failed Removals", lines));
        }

        self.post_embeds(&self.failure_url, server_name, &embeds)
            .await
    }

    async fn publish_config_diff(&self, server_name: &str, diff: &str) -> anyhow::Result<()> {
        let body: String = diff.chars().take(MAX_DESCRIPTION - 16).collect();
        let embed = json!({
            "title": "⚙️ Server config updated",
            "description": format!("```diff\n{body}```"),
            "color": COLOR_UPDATE,
            "timestamp": Utc::now().to_rfc3339(),
        });

        self.post_embeds(&self.alert_url, server_name, &[embed])
            .await
    }
}

fn failure_embed(title: &str, lines: Vec<String>) -> Value {
    json!({
        "title": title,
        "description": lines.join("\n"),
        "color": COLOR_FAILURE,
        "timestamp": Utc::now().to_rfc3339(),
    })
}

fn created_embed(created: &[CreatedAddon]) -> Value {
    let lines: Vec<String> = created
        .iter()
        .map(|change| {
            let url = if change.is_private {
                HIDDEN_URL
            } else {
                change.addon.url.as_str()
            };
            format!("- [**{}**]({url})", change.addon.repo)
        })
        .collect();

    json!({
        "title": "✨ New Addons",
        "description": lines.join("\n"),
        "color": COLOR_CREATE,
        "timestamp": Utc::now().to_rfc3339(),
    })
}

fn deleted_embed(deleted: &[DeletedAddon]) -> Value {
    let lines: Vec<String> = deleted
        .iter()
        .map(|change| format!("- [**{}**]({})", change.addon.repo, change.addon.url))
        .collect();

    json!({
        "title": "🗑️ Removed",
        "description": lines.join("\n"),
        "color": COLOR_DELETE,
        "timestamp": Utc::now().to_rfc3339(),
    })
}

/// One embed per updated addon. Updates without a fetched diff have nothing
/// to render and produce no embed.
fn update_embed(update: &UpdatedAddon) -> Option<Value> {
    let diff = update.diff.as_ref()?;
    let private = update.is_private;

    let diff_url = if private {
        HIDDEN_URL.to_string()
    } else {
        format!("{}/tree/{}", diff.url, update.addon.branch)
    };

    let blocks: Vec<String> = diff
        .commits
        .iter()
        .map(|commit| commit_block(commit, private))
        .collect();

    let mut description = String::new();
    for (index, block) in blocks.iter().enumerate() {
        let and_more = format!("\n_And {} more..._", blocks.len() - index);
        if description.len() + block.len() + 1 > MAX_DESCRIPTION - and_more.len() {
            description.push_str(&and_more);
            break;
        }
        description.push_str(block);
        description.push('\n');
    }

    Some(json!({
        "title": format!("🚀 Updates for: **`{}`**", update.addon.repo),
        "description": description,
        "url": diff_url,
        "color": COLOR_UPDATE,
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

fn commit_block(commit: &CommitInfo, private: bool) -> String {
    let (message, sha, username, commit_url, author_url) = if private {
        (
            mask(&commit.message),
            mask(&commit.sha),
            "unknown".to_string(),
            HIDDEN_URL.to_string(),
            HIDDEN_URL.to_string(),
        )
    } else {
        (
            commit.message.clone(),
            commit.sha.clone(),
            commit.author.username.clone(),
            commit.url.clone(),
            commit.author.url.clone(),
        )
    };

    let message = truncate_message(&message);
    let short_sha: String = sha.chars().take(6).collect();

    let prefix = if private {
        "🔒"
    } else if commit.verified {
        "✅"
    } else {
        "#️⃣"
    };

    let time_line = DateTime::parse_from_rfc3339(&commit.date)
        .map(|date| format!("_(<t:{}:R>)_", date.timestamp()))
        .unwrap_or_default();

    let commit_line =
        format!("**[@{username}]({author_url}) - [`{prefix}{short_sha}`]({commit_url}):**᲼{time_line}");
    format!("{commit_line}\n```{message}```")
}

fn truncate_message(message: &str) -> String {
    if message.chars().count() > MAX_COMMIT_MESSAGE {
        let head: String = message.chars().take(MAX_COMMIT_MESSAGE).collect();
        format!("{head}...")
    } else {
        message.to_string()
    }
}

/// Replace every non-space character, keeping the shape of the text without
/// leaking its content.
fn mask(text: &str) -> String {
    text.chars()
        .map(|c| if c == ' ' { ' ' } else { '❚' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::addon::InstalledAddon;
    use crate::vcs::{CommitAuthor, CompareInfo};

    fn commit(message: &str, date: &str) -> CommitInfo {
        CommitInfo {
            sha: "0123456789abcdef".to_string(),
            message: message.to_string(),
            url: "https://github.com/acme/widgets/commit/0123456".to_string(),
            author: CommitAuthor {
                username: "dev".to_string(),
                avatar: String::new(),
                url: "https://github.com/dev".to_string(),
            },
            verified: true,
            date: date.to_string(),
        }
    }

    fn updated(diff: Option<CompareInfo>, is_private: bool) -> UpdatedAddon {
        UpdatedAddon {
            addon: InstalledAddon {
                path: "/garrysmod/addons/widgets".to_string(),
                name: "widgets".to_string(),
                url: "https://github.com/acme/widgets".to_string(),
                owner: "acme".to_string(),
                repo: "widgets".to_string(),
                branch: "main".to_string(),
                commit: "abc".to_string(),
            },
            diff,
            is_private,
        }
    }

    #[test]
    fn updates_without_a_diff_render_no_embed() {
        assert!(update_embed(&updated(None, false)).is_none());
    }

    #[test]
    fn update_embed_links_the_branch_tree() {
        let diff = CompareInfo {
            url: "https://github.com/acme/widgets/compare/abc...def".to_string(),
            commits: vec![commit("fix", "2024-05-01T12:00:00Z")],
        };

        let embed = update_embed(&updated(Some(diff), false)).unwrap();
        assert_eq!(
            embed["url"],
            "https://github.com/acme/widgets/compare/abc...def/tree/main"
        );
        let description = embed["description"].as_str().unwrap();
        assert!(description.contains("✅012345"));
        assert!(description.contains("```fix```"));
    }

    #[test]
    fn long_descriptions_end_with_a_summary_line() {
        let commits: Vec<CommitInfo> = (0..100)
            .map(|i| commit(&format!("commit number {i}"), "2024-05-01T12:00:00Z"))
            .collect();
        let diff = CompareInfo {
            url: "https://github.com/acme/widgets/compare/abc...def".to_string(),
            commits,
        };

        let embed = update_embed(&updated(Some(diff), false)).unwrap();
        let description = embed["description"].as_str().unwrap();
        assert!(description.len() <= MAX_DESCRIPTION);
        assert!(description.contains("more..._"));
    }

    #[test]
    fn private_repos_leak_nothing() {
        let diff = CompareInfo {
            url: "https://github.com/acme/secret/compare/abc...def".to_string(),
            commits: vec![commit("topsecret change", "2024-05-01T12:00:00Z")],
        };

        let embed = update_embed(&updated(Some(diff), true)).unwrap();
        assert_eq!(embed["url"], HIDDEN_URL);

        let description = embed["description"].as_str().unwrap();
        assert!(!description.contains("topsecret"));
        assert!(!description.contains("0123456789abcdef"));
        assert!(!description.contains("@dev"));
        assert!(description.contains("🔒"));
    }

    #[test]
    fn commit_messages_are_truncated() {
        let long = "x".repeat(80);
        let block = commit_block(&commit(&long, "2024-05-01T12:00:00Z"), false);
        assert!(block.contains(&format!("{}...", "x".repeat(50))));
    }

    #[test]
    fn unparseable_dates_drop_the_relative_timestamp() {
        let block = commit_block(&commit("fix", "not a date"), false);
        assert!(!block.contains("<t:"));
    }

    #[test]
    fn mask_keeps_spaces_only() {
        assert_eq!(mask("ab cd"), "❚❚ ❚❚");
    }
}
