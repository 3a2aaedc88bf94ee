//! Application configuration.
//!
//! One file, TOML or JSON, with a section per concern. Paths under `[data]`
//! may use `{DATA_DIR}` and `{ROLE}` placeholders, substituted by
//! [`MindflowConfig::resolve_paths`].

use std::path::{Path, PathBuf};
use std::sync::Arc;

use mindflow_core::embedding::provider_from_name;
use mindflow_core::{EmbeddingProvider, GeneralConfig, InMemoryStore, RecallConfig, SessionConfig};
use mindflow_llm::LlmConfig;
use serde::{Deserialize, Serialize};

use crate::error::{ChatError, Result};

/// Placeholder for the data directory in `[data]` paths.
pub const DATA_DIR_PLACEHOLDER: &str = "{DATA_DIR}";
/// Placeholder for the character name in `[data]` paths.
pub const ROLE_PLACEHOLDER: &str = "{ROLE}";

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MindflowConfig {
    /// Logging.
    #[serde(default)]
    pub general: GeneralConfig,
    /// Who is talking to whom.
    #[serde(default)]
    pub character: CharacterConfig,
    /// Recall thresholds and limits.
    #[serde(default)]
    pub recall: RecallConfig,
    /// Generation backend.
    #[serde(default)]
    pub llm: LlmConfig,
    /// Summarisation.
    #[serde(default)]
    pub session: SessionConfig,
    /// Data files and the embedding model.
    #[serde(default)]
    pub data: DataConfig,
}

impl MindflowConfig {
    /// Parse TOML.
    ///
    /// # Errors
    /// Returns [`ChatError::Config`] if the TOML is invalid.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        toml::from_str(toml_str).map_err(|e| ChatError::Config(e.to_string()))
    }

    /// Parse JSON.
    ///
    /// # Errors
    /// Returns [`ChatError::Config`] if the JSON is invalid.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| ChatError::Config(e.to_string()))
    }

    /// Load a `.json` or TOML file, resolve placeholders and validate.
    ///
    /// # Errors
    /// I/O, parse and validation failures.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut config = if path.extension().is_some_and(|ext| ext == "json") {
            Self::from_json(&content)?
        } else {
            Self::from_toml(&content)?
        };
        config.resolve_paths();
        config.validate()?;
        Ok(config)
    }

    /// Substitute `{DATA_DIR}` and `{ROLE}` in every data path.
    pub fn resolve_paths(&mut self) {
        let data_dir = self.data.data_dir.to_string_lossy().into_owned();
        let role = self.character.role.clone();
        for path in [
            &mut self.data.role_graph_path,
            &mut self.data.query_schema_path,
            &mut self.data.answer_schema_path,
        ] {
            let resolved = path
                .to_string_lossy()
                .replace(DATA_DIR_PLACEHOLDER, &data_dir)
                .replace(ROLE_PLACEHOLDER, &role);
            *path = PathBuf::from(resolved);
        }
    }

    /// The embedder named by `data.embedding_provider`.
    ///
    /// # Errors
    /// Returns [`ChatError::Core`] for an unknown provider.
    pub fn embedder(&self) -> Result<Arc<dyn EmbeddingProvider>> {
        let provider =
            provider_from_name(&self.data.embedding_provider, self.data.embedding_dimensions)?;
        Ok(Arc::from(provider))
    }

    /// An in-process memory store over [`Self::embedder`].
    ///
    /// # Errors
    /// Same as [`Self::embedder`].
    pub fn memory_store(&self) -> Result<Arc<InMemoryStore>> {
        Ok(Arc::new(InMemoryStore::new(self.embedder()?)))
    }

    /// Reject configurations that cannot produce a working chatbot.
    ///
    /// # Errors
    /// Returns [`ChatError::Config`] naming the problem.
    pub fn validate(&self) -> Result<()> {
        self.recall
            .validate()
            .map_err(|e| ChatError::Config(e.to_string()))?;
        self.llm
            .validate()
            .map_err(|e| ChatError::Config(e.to_string()))?;
        if self.character.role.trim().is_empty() {
            return Err(ChatError::Config("character.role must be set".to_string()));
        }
        if self.character.user.trim().is_empty() {
            return Err(ChatError::Config("character.user must be set".to_string()));
        }
        if self.data.embedding_dimensions == 0 {
            return Err(ChatError::Config(
                "data.embedding_dimensions must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

/// The conversation pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CharacterConfig {
    /// The user's display name.
    #[serde(default = "default_user")]
    pub user: String,
    /// The character being played.
    #[serde(default)]
    pub role: String,
    /// Initial character description.
    #[serde(default)]
    pub role_description: String,
}

impl Default for CharacterConfig {
    fn default() -> Self {
        Self {
            user: default_user(),
            role: String::new(),
            role_description: String::new(),
        }
    }
}

/// Where character data lives and how it is embedded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConfig {
    /// Root directory substituted for `{DATA_DIR}`.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Role graph JSON.
    #[serde(default = "default_role_graph_path")]
    pub role_graph_path: PathBuf,
    /// Query schema JSON (`{label -> [phrase]}`).
    #[serde(default = "default_query_schema_path")]
    pub query_schema_path: PathBuf,
    /// Answer schema JSON (`{question -> [answer]}`).
    #[serde(default = "default_answer_schema_path")]
    pub answer_schema_path: PathBuf,
    /// Embedding provider: `hash`, `random`, `stub` or `onnx`.
    #[serde(default = "default_embedding_provider")]
    pub embedding_provider: String,
    /// Vector width for providers that take one.
    #[serde(default = "default_embedding_dimensions")]
    pub embedding_dimensions: usize,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            role_graph_path: default_role_graph_path(),
            query_schema_path: default_query_schema_path(),
            answer_schema_path: default_answer_schema_path(),
            embedding_provider: default_embedding_provider(),
            embedding_dimensions: default_embedding_dimensions(),
        }
    }
}

fn default_user() -> String {
    "用户".to_string()
}
fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}
fn default_role_graph_path() -> PathBuf {
    PathBuf::from("{DATA_DIR}/role_graph/role_graph.json")
}
fn default_query_schema_path() -> PathBuf {
    PathBuf::from("{DATA_DIR}/standard_query/queries_{ROLE}.json")
}
fn default_answer_schema_path() -> PathBuf {
    PathBuf::from("{DATA_DIR}/standard_answer/qna_{ROLE}.json")
}
fn default_embedding_provider() -> String {
    "hash".to_string()
}
fn default_embedding_dimensions() -> usize {
    256
}
