//! Character data files: role graph, query schema, answer schema.

use std::collections::BTreeMap;
use std::path::Path;

use mindflow_core::RoleGraph;
use tracing::{info, warn};

use crate::config::DataConfig;
use crate::error::{ChatError, Result};

/// `{key -> [text]}` document shared by the query and answer schemas.
pub type Schema = BTreeMap<String, Vec<String>>;

/// Load a schema JSON file.
///
/// # Errors
/// I/O failure, or [`ChatError::Config`] when the JSON is not a map of
/// string lists.
pub fn load_schema(path: &Path) -> Result<Schema> {
    let content = std::fs::read_to_string(path)?;
    serde_json::from_str(&content)
        .map_err(|e| ChatError::Config(format!("invalid schema {}: {e}", path.display())))
}

/// Load a schema, or an empty one when the file does not exist.
///
/// # Errors
/// Same as [`load_schema`] for files that exist.
pub fn load_schema_or_empty(path: &Path) -> Result<Schema> {
    if path.exists() {
        load_schema(path)
    } else {
        warn!(path = %path.display(), "schema file missing, using empty schema");
        Ok(Schema::new())
    }
}

/// Everything one character needs to build its retriever.
#[derive(Debug, Clone, Default)]
pub struct CharacterData {
    /// The role graph.
    pub role_graph: RoleGraph,
    /// `{label -> [query phrase]}`.
    pub query_schema: Schema,
    /// `{standard question -> [answer exemplar]}`.
    pub answer_schema: Schema,
}

impl CharacterData {
    /// Load the three files named in `data`. Paths must already be resolved.
    ///
    /// The role graph is mandatory; missing schemas load as empty.
    ///
    /// # Errors
    /// I/O and parse failures.
    pub fn load(data: &DataConfig) -> Result<Self> {
        let role_graph = RoleGraph::from_file(&data.role_graph_path)?;
        let query_schema = load_schema_or_empty(&data.query_schema_path)?;
        let answer_schema = load_schema_or_empty(&data.answer_schema_path)?;
        info!(
            roles = role_graph.roles.len(),
            query_labels = query_schema.len(),
            questions = answer_schema.len(),
            "character data loaded"
        );
        Ok(Self {
            role_graph,
            query_schema,
            answer_schema,
        })
    }
}
