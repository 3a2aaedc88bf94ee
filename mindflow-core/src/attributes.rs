//! Character attribute knowledge and entailment/contradiction recall.

use std::collections::BTreeMap;

use ordered_float::OrderedFloat;
use tracing::debug;

use crate::embedding::{EmbeddingMatrix, EmbeddingProvider};
use crate::error::Result;
use crate::types::Embedding;

/// Max entailed descriptions rendered per attribute.
const MAX_ENTAILED: usize = 3;
/// Max contradictions rendered per attribute.
const MAX_CONTRADICTIONS: usize = 2;

/// Descriptions of one attribute plus their embeddings.
#[derive(Debug, Clone)]
pub struct AttributeDescriptor {
    /// Natural-language descriptions, in role-graph order.
    pub descriptions: Vec<String>,
    embeddings: EmbeddingMatrix,
}

impl AttributeDescriptor {
    /// Embed every description.
    ///
    /// # Errors
    /// Propagates embedding failures.
    pub fn build(descriptions: Vec<String>, embedder: &dyn EmbeddingProvider) -> Result<Self> {
        let texts: Vec<&str> = descriptions.iter().map(String::as_str).collect();
        let embeddings = EmbeddingMatrix::build(embedder, &texts)?;
        Ok(Self {
            descriptions,
            embeddings,
        })
    }

    /// Similarity of every description to `query`, in description order.
    #[must_use]
    pub fn scores(&self, query: &Embedding) -> Vec<f32> {
        self.embeddings.scores(query)
    }
}

/// All attribute descriptors of one character, keyed by label.
#[derive(Debug, Clone, Default)]
pub struct AttributeIndex {
    attributes: BTreeMap<String, AttributeDescriptor>,
}

impl AttributeIndex {
    /// Build from a `{label -> [description]}` map.
    ///
    /// # Errors
    /// Propagates embedding failures.
    pub fn build(
        entity_attr: BTreeMap<String, Vec<String>>,
        embedder: &dyn EmbeddingProvider,
    ) -> Result<Self> {
        let mut attributes = BTreeMap::new();
        for (label, descriptions) in entity_attr {
            attributes.insert(label, AttributeDescriptor::build(descriptions, embedder)?);
        }
        debug!(attributes = attributes.len(), "attribute index built");
        Ok(Self { attributes })
    }

    /// Descriptor for `label`.
    #[must_use]
    pub fn get(&self, label: &str) -> Option<&AttributeDescriptor> {
        self.attributes.get(label)
    }

    /// Known labels.
    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.attributes.keys().map(String::as_str)
    }

    /// Number of attributes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    /// Whether the index is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

/// A description with its similarity to the utterance.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredDescription {
    /// The description text.
    pub text: String,
    /// Dot-product similarity.
    pub similarity: f32,
}

/// Result of classifying one attribute's descriptions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AttributeRecall {
    /// Entailed descriptions, highest similarity first.
    pub entailed: Vec<ScoredDescription>,
    /// Contradicting descriptions, lowest similarity first.
    pub contradictions: Vec<ScoredDescription>,
}

impl AttributeRecall {
    /// Whether nothing was recalled.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entailed.is_empty() && self.contradictions.is_empty()
    }

    /// Render the "possibly relevant" block, followed by the warning block
    /// when contradictions exist. Empty when nothing was recalled.
    #[must_use]
    pub fn render(&self, user: &str) -> String {
        if self.is_empty() {
            return String::new();
        }
        let mut out = String::from("(system: 对话可能涉及的信息:");
        out.push_str("\n\t");
        out.push_str(&join_texts(&self.entailed, MAX_ENTAILED));
        out.push_str("\t\n)");
        if !self.contradictions.is_empty() {
            out.push_str(&format!(
                "(system: [警告]以下角色信息或与{user}意图矛盾，以以下为准:"
            ));
            out.push_str("\n\t");
            out.push_str(&join_texts(&self.contradictions, MAX_CONTRADICTIONS));
            out.push_str("\t\n)");
        }
        out
    }
}

fn join_texts(items: &[ScoredDescription], limit: usize) -> String {
    items
        .iter()
        .take(limit)
        .map(|d| d.text.as_str())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Split descriptions by similarity.
///
/// `sim <= contradict` is a contradiction, otherwise `sim >= entail` is
/// entailed. When nothing is entailed, the single best description is used
/// as the entailed set, even if it is also a contradiction.
#[must_use]
pub fn classify_descriptions(
    descriptions: &[String],
    similarities: &[f32],
    contradict_threshold: f32,
    entail_threshold: f32,
) -> AttributeRecall {
    let mut entailed = Vec::new();
    let mut contradictions = Vec::new();
    let mut best: Option<ScoredDescription> = None;

    for (text, &similarity) in descriptions.iter().zip(similarities) {
        let scored = ScoredDescription {
            text: text.clone(),
            similarity,
        };
        if best.as_ref().is_none_or(|b| similarity > b.similarity) {
            best = Some(scored.clone());
        }
        if similarity <= contradict_threshold {
            contradictions.push(scored);
        } else if similarity >= entail_threshold {
            entailed.push(scored);
        }
    }

    if entailed.is_empty() {
        entailed.extend(best);
    }
    entailed.sort_by_key(|d| std::cmp::Reverse(OrderedFloat(d.similarity)));
    contradictions.sort_by_key(|d| OrderedFloat(d.similarity));

    AttributeRecall {
        entailed,
        contradictions,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
