//! Control document parsing: the desired-addon set.
//!
//! The control document is a YAML list of `{url, branch, name?}` entries under
//! an `addons` key. Parsing is pure and schema-validated; a missing `url` or
//! `branch` fails the whole document.

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::addon::{DesiredAddon, canonical_url, split_owner_repo};
use crate::error::ControlError;

#[derive(Debug, Deserialize)]
struct ControlDocument {
    addons: Vec<ControlEntry>,
}

#[derive(Debug, Deserialize)]
struct ControlEntry {
    url: String,
    branch: String,
    #[serde(default)]
    name: Option<String>,
}

/// Parse a control document into the desired-addon map, keyed by canonical
/// repository URL.
pub fn parse_control_document(
    content: &str,
) -> Result<BTreeMap<String, DesiredAddon>, ControlError> {
    let document: ControlDocument = serde_yaml::from_str(content)?;

    let mut desired = BTreeMap::new();
    for entry in document.addons {
        let url = canonical_url(&entry.url);
        let (owner, repo) = split_owner_repo(&url)?;

        desired.insert(
            url.clone(),
            DesiredAddon {
                url,
                owner,
                repo,
                branch: entry.branch,
                name: entry.name,
            },
        );
    }

    Ok(desired)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_minimal_document() {
        let doc = r#"
addons:
  - url: https://github.com/Acme/Widgets.git
    branch: main
  - url: https://github.com/acme/gadgets
    branch: develop
    name: gadgets-dev
"#;

        let desired = parse_control_document(doc).unwrap();
        assert_eq!(desired.len(), 2);

        let widgets = &desired["https://github.com/acme/widgets"];
        assert_eq!(widgets.owner, "acme");
        assert_eq!(widgets.repo, "widgets");
        assert_eq!(widgets.branch, "main");
        assert_eq!(widgets.name, None);

        let gadgets = &desired["https://github.com/acme/gadgets"];
        assert_eq!(gadgets.name.as_deref(), Some("gadgets-dev"));
    }

    #[test]
    fn keys_are_canonical() {
        let doc = r#"
addons:
  - url: HTTPS://GITHUB.COM/ACME/WIDGETS.GIT
    branch: main
"#;

        let desired = parse_control_document(doc).unwrap();
        assert!(desired.contains_key("https://github.com/acme/widgets"));
    }

    #[test]
    fn rejects_entries_missing_a_branch() {
        let doc = r#"
addons:
  - url: https://github.com/acme/widgets
"#;

        assert!(matches!(
            parse_control_document(doc),
            Err(ControlError::Yaml(_))
        ));
    }

    #[test]
    fn rejects_non_yaml_input() {
        assert!(parse_control_document("{addons: [").is_err());
    }

    #[test]
    fn rejects_malformed_repository_urls() {
        let doc = r#"
addons:
  - url: just-a-name
    branch: main
"#;

        assert!(matches!(
            parse_control_document(doc),
            Err(ControlError::BadUrl(_))
        ));
    }

    #[test]
    fn duplicate_urls_collapse_to_the_last_entry() {
        let doc = r#"
addons:
  - url: https://github.com/acme/widgets
    branch: main
  - url: https://github.com/acme/widgets.git
    branch: develop
"#;

        let desired = parse_control_document(doc).unwrap();
        assert_eq!(desired.len(), 1);
        assert_eq!(desired["https://github.com/acme/widgets"].branch, "develop");
    }
}
