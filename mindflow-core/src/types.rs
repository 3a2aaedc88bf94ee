//! Core type definitions shared by every mindflow layer.
//!
//! The memory store owns the storage layout of sessions and units; the
//! types here are the short-lived projections the dialogue core works with.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Identity Types
// ---------------------------------------------------------------------------

/// Opaque identifier for one stored memory unit (one utterance or summary).
///
/// Also used as the turn id that correlates an emitted character line with
/// its mind-flow entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UnitId(pub String);

impl UnitId {
    /// Create a new random unit ID.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Borrow the raw id string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for UnitId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque identifier for one conversation session in the memory store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    /// Create a new random session ID.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Borrow the raw id string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Embeddings
// ---------------------------------------------------------------------------

/// A dense vector embedding for semantic similarity.
///
/// Providers return L2-normalised vectors, so a dot product between two
/// embeddings is their cosine similarity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding(pub Vec<f32>);

impl Embedding {
    /// Number of dimensions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the vector has no dimensions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Memory units
// ---------------------------------------------------------------------------

/// Action tag for an ordinary spoken line.
pub const ACTION_SPEAK: &str = "speak";

/// Action tag for a summary unit produced by the store's summariser.
pub const ACTION_SUMMARY: &str = "summary";

/// Which memory tier a store query is restricted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryScope {
    /// Only the recent-turn window of the current session.
    ShortTerm,
    /// Only persisted, cross-session memory.
    LongTerm,
    /// Either tier.
    Any,
}

/// A projection of one stored memory unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryUnit {
    /// Unit id.
    pub id: UnitId,
    /// Who produced the content (user name, character name, `system`).
    pub source: String,
    /// The text.
    pub content: String,
    /// Action tag, usually [`ACTION_SPEAK`] or [`ACTION_SUMMARY`].
    pub action: String,
    /// The summary unit this unit was folded into, if any.
    pub parent_id: Option<UnitId>,
    /// Units summarised by this one.
    #[serde(default)]
    pub children_ids: Vec<UnitId>,
    /// Position within its session.
    pub rank: u32,
    /// When the unit was written.
    pub creation_time: DateTime<Utc>,
}

impl MemoryUnit {
    /// Whether this unit is a summary rather than an utterance.
    #[must_use]
    pub fn is_summary(&self) -> bool {
        self.action == ACTION_SUMMARY
    }
}

/// A request to write one utterance into the memory store.
#[derive(Debug, Clone, PartialEq)]
pub struct NewMemory {
    /// The text.
    pub content: String,
    /// Who produced the content.
    pub source: String,
    /// When the content was produced.
    pub creation_time: DateTime<Utc>,
    /// Action tag.
    pub action: String,
    /// Caller-chosen id; the store generates one when absent.
    pub id: Option<UnitId>,
}

impl NewMemory {
    /// A spoken line stamped with the current time.
    #[must_use]
    pub fn speak(source: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            source: source.into(),
            creation_time: Utc::now(),
            action: ACTION_SPEAK.to_string(),
            id: None,
        }
    }

    /// Attach a caller-chosen id.
    #[must_use]
    pub fn with_id(mut self, id: UnitId) -> Self {
        self.id = Some(id);
        self
    }
}

// ---------------------------------------------------------------------------
// Prompt messages
// ---------------------------------------------------------------------------

/// A role/content pair as handed to summarisers and returned by `resume`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptMessage {
    /// Speaker role (`system`, `user`, a character name, ...).
    pub role: String,
    /// Message text.
    pub content: String,
}

impl PromptMessage {
    /// Build a message.
    #[must_use]
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Role state
// ---------------------------------------------------------------------------

/// Per-conversation state owned by the turn orchestrator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoleState {
    /// The user's display name.
    pub user: String,
    /// The character being played.
    pub role: String,
    /// Free-text character description injected into the task message.
    pub role_description: String,
    /// Rolling digest of the narrative, overwritten every turn.
    pub scene_summary: String,
    /// The most recent user utterance.
    pub latest_user_input: Option<String>,
    /// The most recent spoken character line.
    pub latest_role_output: Option<String>,
    /// Turn id of the most recent character line.
    pub latest_role_output_id: Option<UnitId>,
    /// Whether the latest turn has already been written to the store.
    #[serde(default)]
    pub latest_committed: bool,
}

impl RoleState {
    /// Fresh state for a user/character pair.
    #[must_use]
    pub fn new(
        user: impl Into<String>,
        role: impl Into<String>,
        role_description: impl Into<String>,
    ) -> Self {
        Self {
            user: user.into(),
            role: role.into(),
            role_description: role_description.into(),
            ..Self::default()
        }
    }

    /// Clear the latest-turn fields. The scene summary survives.
    pub fn reset_volatile(&mut self) {
        self.latest_user_input = None;
        self.latest_role_output = None;
        self.latest_role_output_id = None;
        self.latest_committed = false;
    }

    /// Clear the latest-turn fields and the scene summary.
    pub fn reset_all(&mut self) {
        self.reset_volatile();
        self.scene_summary.clear();
    }

    /// Whether a turn exists that has not been written to the store yet.
    #[must_use]
    pub fn has_pending_turn(&self) -> bool {
        !self.latest_committed
            && (self.latest_user_input.is_some() || self.latest_role_output.is_some())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
