//! Query catalog and recall-category classifier.
//!
//! A query schema maps each attribute label to canonical query phrases. The
//! catalog inverts it into `{phrase -> [labels]}`, embeds every phrase once,
//! and at turn time selects the labels of the closest phrases.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::embedding::{EmbeddingMatrix, EmbeddingProvider};
use crate::error::Result;
use crate::types::Embedding;

/// Reserved label routed to short-term recall.
pub const SHORT_TERM_LABEL: &str = "短期记忆";
/// Reserved label routed to long-term recall.
pub const LONG_TERM_LABEL: &str = "长期记忆";
/// Placeholder label meaning "no recall"; never reported.
pub const NULL_LABEL: &str = "0";

/// Number of top-scoring catalog phrases whose labels are unioned.
const TOP_PHRASES: usize = 3;

// ---------------------------------------------------------------------------
// Labels
// ---------------------------------------------------------------------------

/// A recall category produced by the classifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RecallLabel {
    /// Recent turns of the current session.
    ShortTerm,
    /// Persisted cross-session memory.
    LongTerm,
    /// A character attribute from the role graph.
    Attribute(String),
}

impl RecallLabel {
    /// Map a schema label to a recall category. The null label maps to `None`.
    #[must_use]
    pub fn parse(label: &str) -> Option<Self> {
        match label {
            SHORT_TERM_LABEL => Some(Self::ShortTerm),
            LONG_TERM_LABEL => Some(Self::LongTerm),
            NULL_LABEL | "" => None,
            other => Some(Self::Attribute(other.to_string())),
        }
    }
}

impl fmt::Display for RecallLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ShortTerm => f.write_str(SHORT_TERM_LABEL),
            Self::LongTerm => f.write_str(LONG_TERM_LABEL),
            Self::Attribute(name) => f.write_str(name),
        }
    }
}

// ---------------------------------------------------------------------------
// Catalog
// ---------------------------------------------------------------------------

/// One canonical query phrase and the labels it selects.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryCatalogEntry {
    /// The phrase as written in the schema.
    pub query: String,
    /// Labels selected when this phrase matches.
    pub labels: Vec<RecallLabel>,
}

/// Immutable catalog plus its parallel embedding matrix.
#[derive(Debug, Clone, Default)]
pub struct QueryCatalog {
    entries: Vec<QueryCatalogEntry>,
    embeddings: EmbeddingMatrix,
}

impl QueryCatalog {
    /// Invert a `{label -> [phrase]}` schema and embed every distinct phrase.
    ///
    /// # Errors
    /// Propagates embedding failures.
    pub fn build(
        schema: &BTreeMap<String, Vec<String>>,
        embedder: &dyn EmbeddingProvider,
    ) -> Result<Self> {
        let mut by_query: BTreeMap<&str, Vec<RecallLabel>> = BTreeMap::new();
        for (label, queries) in schema {
            let Some(label) = RecallLabel::parse(label) else {
                continue;
            };
            for query in queries {
                let labels = by_query.entry(query.as_str()).or_default();
                if !labels.contains(&label) {
                    labels.push(label.clone());
                }
            }
        }

        let entries: Vec<QueryCatalogEntry> = by_query
            .into_iter()
            .map(|(query, labels)| QueryCatalogEntry {
                query: query.to_string(),
                labels,
            })
            .collect();
        let texts: Vec<&str> = entries.iter().map(|e| e.query.as_str()).collect();
        let embeddings = EmbeddingMatrix::build(embedder, &texts)?;
        debug!(phrases = entries.len(), "query catalog built");
        Ok(Self { entries, embeddings })
    }

    /// Select recall labels for an utterance embedding.
    ///
    /// Keeps phrases with similarity at or above `threshold`, sorts them
    /// descending and unions the labels of the top three. An empty set means
    /// "no targeted recall".
    #[must_use]
    pub fn classify(&self, utterance: &Embedding, threshold: f32) -> BTreeSet<RecallLabel> {
        let mut hits: Vec<(usize, f32)> = self
            .embeddings
            .scores(utterance)
            .into_iter()
            .enumerate()
            .filter(|(_, sim)| *sim >= threshold)
            .collect();
        hits.sort_by_key(|(_, sim)| std::cmp::Reverse(OrderedFloat(*sim)));

        hits.iter()
            .take(TOP_PHRASES)
            .flat_map(|(idx, _)| self.entries[*idx].labels.iter().cloned())
            .collect()
    }

    /// Every label the catalog can return.
    #[must_use]
    pub fn labels(&self) -> BTreeSet<RecallLabel> {
        self.entries
            .iter()
            .flat_map(|e| e.labels.iter().cloned())
            .collect()
    }

    /// Catalog entries in phrase order.
    #[must_use]
    pub fn entries(&self) -> &[QueryCatalogEntry] {
        &self.entries
    }

    /// Number of distinct phrases.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the catalog has no phrases.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
