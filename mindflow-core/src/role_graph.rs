//! Role-graph documents and per-character attribute extraction.
//!
//! A role graph is a JSON document:
//!
//! ```json
//! {"roles": {"艾琳": {
//!     "attributes": {"性格": [{"description": "开朗", "access_rights": "unlimited"}]},
//!     "ideas": {"旅人": ["值得信任"]}
//! }}}
//! ```
//!
//! [`RoleGraph::entity_attributes`] flattens one character's view of the
//! graph into the `{label -> [description]}` map the attribute index embeds.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{MindflowError, Result};

/// Prefix of the labels carrying a character's ideas about another.
pub const IDEA_LABEL_PREFIX: &str = "idea_to-";

/// Who may see a description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AccessRights {
    /// `"unlimited"`, empty, or a single character name.
    Single(String),
    /// An explicit list of character names.
    List(Vec<String>),
}

impl Default for AccessRights {
    fn default() -> Self {
        Self::Single("unlimited".to_string())
    }
}

impl AccessRights {
    /// Whether `viewer` may see the description.
    #[must_use]
    pub fn grants(&self, viewer: &str) -> bool {
        match self {
            Self::Single(s) => s.is_empty() || s == "unlimited" || s == viewer,
            Self::List(names) => names.iter().any(|n| n == viewer),
        }
    }
}

/// One attribute description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeEntry {
    /// The description text.
    #[serde(default)]
    pub description: String,
    /// Visibility.
    #[serde(default)]
    pub access_rights: AccessRights,
}

/// One character in the graph.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleEntity {
    /// `{attribute -> [entry]}`.
    #[serde(default)]
    pub attributes: BTreeMap<String, Vec<AttributeEntry>>,
    /// `{other character -> [idea]}`; `null` means no ideas yet.
    #[serde(default)]
    pub ideas: BTreeMap<String, Option<Vec<String>>>,
}

/// The whole role-graph document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleGraph {
    /// Characters by name.
    #[serde(default)]
    pub roles: BTreeMap<String, RoleEntity>,
}

impl RoleGraph {
    /// Parse a role graph from JSON text.
    ///
    /// # Errors
    /// Returns [`MindflowError::Config`] if the JSON is malformed.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| MindflowError::Config(format!("invalid role graph: {e}")))
    }

    /// Load a role graph file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Flatten `role`'s attributes and ideas into `{label -> [description]}`.
    ///
    /// Returns an empty map for an unknown character.
    #[must_use]
    pub fn entity_attributes(&self, role: &str) -> BTreeMap<String, Vec<String>> {
        let Some(entity) = self.roles.get(role) else {
            debug!(role, "role not present in role graph");
            return BTreeMap::new();
        };

        let mut out = visible_attributes(entity, role, role);
        for (other, ideas) in &entity.ideas {
            let mut lines = Vec::new();
            if let Some(ideas) = ideas.as_ref().filter(|ideas| !ideas.is_empty()) {
                lines.push(format!("{role}对{other}想法包括: {}", ideas.join("; ")));
            }
            if let Some(other_entity) = self.roles.get(other) {
                lines.extend(
                    visible_attributes(other_entity, other, role)
                        .into_values()
                        .flatten(),
                );
            }
            out.insert(format!("{IDEA_LABEL_PREFIX}{other}"), lines);
        }
        out
    }
}

/// Descriptions of `entity` (named `owner`) visible to `viewer`.
fn visible_attributes(
    entity: &RoleEntity,
    owner: &str,
    viewer: &str,
) -> BTreeMap<String, Vec<String>> {
    let prefix = if owner == viewer {
        String::new()
    } else {
        format!("{viewer}对{owner}的认识:")
    };

    let mut out: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (attr, entries) in &entity.attributes {
        for entry in entries {
            if entry.description.is_empty() || !entry.access_rights.grants(viewer) {
                continue;
            }
            out.entry(attr.clone())
                .or_default()
                .push(format!("{prefix}{owner}的{attr}包括: {}", entry.description));
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const GRAPH: &str = r#"{
        "roles": {
            "艾琳": {
                "attributes": {
                    "性格": [
                        {"description": "开朗", "access_rights": "unlimited"},
                        {"description": "怕黑", "access_rights": ["旅人"]},
                        {"description": "", "access_rights": ""}
                    ],
                    "职业": [{"description": "酒馆老板"}]
                },
                "ideas": {"旅人": ["值得信任", "有点笨"]}
            },
            "旅人": {
                "attributes": {
                    "秘密": [
                        {"description": "是王子", "access_rights": "旅人"},
                        {"description": "在找剑", "access_rights": ["艾琳"]}
                    ]
                }
            }
        }
    }"#;

    #[test]
    fn own_attributes_respect_access_rights() {
        let graph = RoleGraph::from_json(GRAPH).expect("parse");
        let attrs = graph.entity_attributes("艾琳");
        assert_eq!(attrs["性格"], vec!["艾琳的性格包括: 开朗".to_string()]);
        assert_eq!(attrs["职业"], vec!["艾琳的职业包括: 酒馆老板".to_string()]);
    }

    #[test]
    fn ideas_include_visible_attributes_of_other() {
        let graph = RoleGraph::from_json(GRAPH).expect("parse");
        let attrs = graph.entity_attributes("艾琳");
        assert_eq!(
            attrs["idea_to-旅人"],
            vec![
                "艾琳对旅人想法包括: 值得信任; 有点笨".to_string(),
                "艾琳对旅人的认识:旅人的秘密包括: 在找剑".to_string(),
            ]
        );
    }

    #[test]
    fn null_ideas_keep_the_other_role() {
        let graph = RoleGraph::from_json(
            r#"{"roles": {
                "艾琳": {"ideas": {"旅人": null}},
                "旅人": {"attributes": {"秘密": [{"description": "在找剑", "access_rights": ["艾琳"]}]}}
            }}"#,
        )
        .expect("parse");
        assert_eq!(
            graph.entity_attributes("艾琳")["idea_to-旅人"],
            vec!["艾琳对旅人的认识:旅人的秘密包括: 在找剑".to_string()]
        );
    }

    #[test]
    fn unknown_role_is_empty() {
        let graph = RoleGraph::from_json(GRAPH).expect("parse");
        assert!(graph.entity_attributes("路人").is_empty());
    }

    #[test]
    fn malformed_graph_is_config_error() {
        assert!(matches!(
            RoleGraph::from_json("{\"roles\": 3}"),
            Err(MindflowError::Config(_))
        ));
    }

    #[test]
    fn loads_from_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("role_graph.json");
        std::fs::write(&path, GRAPH).expect("write");
        let graph = RoleGraph::from_file(&path).expect("load");
        assert_eq!(graph.roles.len(), 2);
    }
}
