//! Canonical repository identity.

use url::Url;

use crate::error::BadUrl;

/// Normalize a repository URL into the canonical join key used by both state
/// maps: lowercase, no trailing slash, no `.git` suffix.
///
/// The suffix is re-added only when building a clone URL for the panel.
pub fn canonical_url(raw: &str) -> String {
    let lowered = raw.trim().to_lowercase();
    let trimmed = lowered.trim_end_matches('/');
    trimmed.strip_suffix(".git").unwrap_or(trimmed).to_string()
}

/// Split a repository URL into its `(owner, repo)` pair.
///
/// Expects `scheme://host/owner/repo[.git]`; anything else is a hard error
/// since owner and repo feed directly into VCS metadata queries.
pub fn split_owner_repo(url: &str) -> Result<(String, String), BadUrl> {
    let bad = || BadUrl {
        url: url.to_string(),
    };

    let parsed = Url::parse(url).map_err(|_| bad())?;
    let mut segments = parsed.path_segments().ok_or_else(bad)?;

    let owner = segments.next().filter(|s| !s.is_empty()).ok_or_else(bad)?;
    let repo = segments.next().filter(|s| !s.is_empty()).ok_or_else(bad)?;
    let repo = repo.strip_suffix(".git").unwrap_or(repo);

    Ok((owner.to_string(), repo.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_url_lowercases_and_strips_the_suffix() {
        assert_eq!(
            canonical_url("https://GitHub.com/Acme/Widgets.git"),
            "https://github.com/acme/widgets"
        );
    }

    #[test]
    fn canonical_url_leaves_plain_urls_alone() {
        assert_eq!(
            canonical_url("https://github.com/acme/widgets"),
            "https://github.com/acme/widgets"
        );
    }

    #[test]
    fn canonical_url_drops_trailing_slashes() {
        assert_eq!(
            canonical_url("https://github.com/acme/widgets/"),
            "https://github.com/acme/widgets"
        );
    }

    #[test]
    fn split_owner_repo_handles_the_git_suffix() {
        let (owner, repo) =
            split_owner_repo("https://github.com/acme-servers/cl_http_whitelist.git").unwrap();
        assert_eq!(owner, "acme-servers");
        assert_eq!(repo, "cl_http_whitelist");
    }

    #[test]
    fn split_owner_repo_rejects_urls_without_a_repo_segment() {
        assert!(split_owner_repo("https://github.com/acme").is_err());
        assert!(split_owner_repo("https://github.com/").is_err());
    }

    #[test]
    fn split_owner_repo_rejects_non_urls() {
        assert!(split_owner_repo("not a url at all").is_err());
        assert!(split_owner_repo("acme/widgets").is_err());
    }
}
