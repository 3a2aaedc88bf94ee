//! Retrieval primitives behind the role-info and style messages.
//!
//! [`RecallSource`] is the seam the turn orchestrator depends on: embedding,
//! classification, short-term, long-term and attribute recall, the rolling
//! context window, and style recall. [`MemoryRetriever`] implements it on
//! top of a [`MemoryStore`], a [`QueryCatalog`], an [`AttributeIndex`] and
//! a [`StyleRetriever`].

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::attributes::{AttributeIndex, classify_descriptions};
use crate::catalog::{QueryCatalog, RecallLabel};
use crate::config::RecallConfig;
use crate::error::Result;
use crate::store::{MemoryQuery, MemoryStore};
use crate::style::StyleRetriever;
use crate::types::{Embedding, MemoryScope, MemoryUnit};

/// Header of the short-term recall block.
pub const STM_HEADER: &str = "system: 近期对话中有关的消息:\n";
/// Header of the long-term recall block.
pub const LTM_HEADER: &str = "system: 历史对话中有关的消息:\n";

/// The retrieval operations the orchestrator needs.
#[async_trait]
pub trait RecallSource: Send + Sync {
    /// Embed text with the store's embedder.
    ///
    /// # Errors
    /// Propagates embedding failures.
    fn embed(&self, text: &str) -> Result<Embedding>;

    /// Recall categories for an utterance embedding.
    fn classify(&self, utterance: &Embedding, config: &RecallConfig) -> BTreeSet<RecallLabel>;

    /// Short-term block, or empty when disabled or nothing matched.
    async fn recall_short_term(&self, query: &Embedding, config: &RecallConfig) -> Result<String>;

    /// Long-term block with parent summaries, or empty.
    async fn recall_long_term(&self, query: &Embedding, config: &RecallConfig) -> Result<String>;

    /// Attribute block for `label`, or empty when the attribute is unknown
    /// or has no descriptions.
    fn recall_attribute(
        &self,
        query: &Embedding,
        label: &str,
        user: &str,
        config: &RecallConfig,
    ) -> String;

    /// The most recent `length` units of the rolling context.
    async fn context_window(&self, length: usize) -> Result<Vec<MemoryUnit>>;

    /// Style block, or the "none yet" sentinel.
    fn recall_style(&self, query: &Embedding, config: &RecallConfig) -> String;
}

/// Render recalled groups as numbered transcripts.
#[must_use]
pub fn render_groups(groups: &[Vec<MemoryUnit>]) -> String {
    groups
        .iter()
        .enumerate()
        .map(|(i, units)| {
            let lines = units
                .iter()
                .map(|u| format!("{}-{}: {}", u.source, u.action, u.content))
                .collect::<Vec<_>>()
                .join("\n");
            format!("{i}:(\n\t{lines}\t\n)")
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Store-backed [`RecallSource`].
pub struct MemoryRetriever {
    store: Arc<dyn MemoryStore>,
    catalog: QueryCatalog,
    attributes: AttributeIndex,
    style: StyleRetriever,
}

impl MemoryRetriever {
    /// Assemble a retriever from prebuilt parts.
    #[must_use]
    pub fn new(
        store: Arc<dyn MemoryStore>,
        catalog: QueryCatalog,
        attributes: AttributeIndex,
        style: StyleRetriever,
    ) -> Self {
        Self {
            store,
            catalog,
            attributes,
            style,
        }
    }

    /// The underlying store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn MemoryStore> {
        &self.store
    }

    /// The query catalog.
    #[must_use]
    pub fn catalog(&self) -> &QueryCatalog {
        &self.catalog
    }
}

#[async_trait]
impl RecallSource for MemoryRetriever {
    fn embed(&self, text: &str) -> Result<Embedding> {
        self.store.get_embedding(text)
    }

    fn classify(&self, utterance: &Embedding, config: &RecallConfig) -> BTreeSet<RecallLabel> {
        let labels = self.catalog.classify(utterance, config.recall_attr_threshold);
        debug!(?labels, "utterance classified");
        labels
    }

    async fn recall_short_term(&self, query: &Embedding, config: &RecallConfig) -> Result<String> {
        if !self.store.is_short_term_enabled() {
            return Ok(String::new());
        }
        let request = MemoryQuery::similar(
            query.clone(),
            config.stm_max_fetch_count,
            MemoryScope::ShortTerm,
        )
        .with_range(config.stm_search_range)
        .with_context(config.stm_recall_context);
        let groups = self.store.query(&request).await?;
        if groups.is_empty() {
            return Ok(String::new());
        }
        debug!(groups = groups.len(), "short-term hit");
        Ok(format!("{STM_HEADER}{}", render_groups(&groups)))
    }

    async fn recall_long_term(&self, query: &Embedding, config: &RecallConfig) -> Result<String> {
        let request = MemoryQuery::similar(
            query.clone(),
            config.ltm_max_fetch_count,
            MemoryScope::LongTerm,
        )
        .with_range(config.ltm_search_range)
        .with_context(config.ltm_recall_context)
        .adding_to_short_term(false);
        let mut groups = self.store.query(&request).await?;
        if groups.is_empty() {
            return Ok(String::new());
        }

        let present: HashSet<_> = groups.iter().flatten().map(|u| u.id.clone()).collect();
        let mut parents = Vec::new();
        for unit in groups.iter().flatten() {
            if unit.is_summary() {
                continue;
            }
            let Some(parent) = &unit.parent_id else {
                continue;
            };
            if !present.contains(parent) && !parents.contains(parent) {
                parents.push(parent.clone());
            }
        }
        for parent in parents {
            let summary = self
                .store
                .query(&MemoryQuery::by_id(parent, MemoryScope::LongTerm).adding_to_short_term(true))
                .await?;
            groups.extend(summary);
        }

        debug!(groups = groups.len(), "long-term hit");
        Ok(format!("{LTM_HEADER}{}", render_groups(&groups)))
    }

    fn recall_attribute(
        &self,
        query: &Embedding,
        label: &str,
        user: &str,
        config: &RecallConfig,
    ) -> String {
        let Some(attribute) = self.attributes.get(label) else {
            debug!(label, "attribute not in role graph");
            return String::new();
        };
        classify_descriptions(
            &attribute.descriptions,
            &attribute.scores(query),
            config.attr_contradict_threshold,
            config.attr_entailment_threshold,
        )
        .render(user)
    }

    async fn context_window(&self, length: usize) -> Result<Vec<MemoryUnit>> {
        self.store.get_context(length).await
    }

    fn recall_style(&self, query: &Embedding, config: &RecallConfig) -> String {
        self.style.recall(query, config.recall_style_threshold)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashEmbeddingProvider;
    use crate::store::InMemoryStore;
    use crate::types::NewMemory;
    use std::collections::BTreeMap;

    fn retriever(store: Arc<InMemoryStore>) -> MemoryRetriever {
        let embedder = HashEmbeddingProvider::new(128);
        let mut attrs = BTreeMap::new();
        attrs.insert(
            "性格".to_string(),
            vec!["艾琳的性格包括: 开朗".to_string(), "艾琳的性格包括: 怕黑".to_string()],
        );
        MemoryRetriever::new(
            store,
            QueryCatalog::default(),
            AttributeIndex::build(attrs, &embedder).expect("attrs"),
            StyleRetriever::default(),
        )
    }

    #[test]
    fn render_groups_format() {
        let unit = |source: &str, content: &str| MemoryUnit {
            id: crate::types::UnitId::generate(),
            source: source.to_string(),
            content: content.to_string(),
            action: "speak".to_string(),
            parent_id: None,
            children_ids: Vec::new(),
            rank: 0,
            creation_time: chrono::Utc::now(),
        };
        let text = render_groups(&[vec![unit("u", "a"), unit("r", "b")], vec![unit("u", "c")]]);
        assert_eq!(text, "0:(\n\tu-speak: a\nr-speak: b\t\n)\n1:(\n\tu-speak: c\t\n)");
    }

    #[tokio::test]
    async fn short_term_disabled_is_empty() {
        let store = Arc::new(
            InMemoryStore::new(Arc::new(HashEmbeddingProvider::new(128))).with_short_term(false),
        );
        store.add_memory(NewMemory::speak("u", "你好")).await.expect("add");
        let r = retriever(store);
        let q = r.embed("你好").expect("embed");
        let block = r.recall_short_term(&q, &RecallConfig::default()).await.expect("stm");
        assert!(block.is_empty());
    }

    #[tokio::test]
    async fn short_term_hit_has_header() {
        let store = Arc::new(InMemoryStore::new(Arc::new(HashEmbeddingProvider::new(128))));
        store.add_memory(NewMemory::speak("u", "你好")).await.expect("add");
        let r = retriever(store);
        let q = r.embed("你好").expect("embed");
        let block = r.recall_short_term(&q, &RecallConfig::default()).await.expect("stm");
        assert!(block.starts_with(STM_HEADER));
        assert!(block.contains("u-speak: 你好"));
    }

    #[tokio::test]
    async fn long_term_appends_parent_summary() {
        let store = Arc::new(InMemoryStore::new(Arc::new(HashEmbeddingProvider::new(128))));
        let session = store.start_session(None).await.expect("start");
        store.add_memory(NewMemory::speak("u", "我喜欢苹果")).await.expect("add");
        store.summarize_session(&session, "艾琳", &[]).await.expect("summarize");
        store.flush_context().await.expect("flush");

        let r = retriever(Arc::clone(&store));
        let q = r.embed("我喜欢苹果").expect("embed");
        let config = RecallConfig {
            ltm_recall_context: false,
            ..RecallConfig::default()
        };
        let block = r.recall_long_term(&q, &config).await.expect("ltm");
        assert!(block.starts_with(LTM_HEADER));
        assert!(block.contains("0:(\n\tu-speak: 我喜欢苹果\t\n)"));
        assert!(block.contains("1:(\n\t艾琳-summary: u: 我喜欢苹果\t\n)"));
    }

    #[tokio::test]
    async fn long_term_empty_without_hits() {
        let store = Arc::new(InMemoryStore::new(Arc::new(HashEmbeddingProvider::new(128))));
        let r = retriever(store);
        let q = r.embed("你好").expect("embed");
        assert_eq!(r.recall_long_term(&q, &RecallConfig::default()).await.expect("ltm"), "");
    }

    #[test]
    fn unknown_attribute_is_empty() {
        let store = Arc::new(InMemoryStore::new(Arc::new(HashEmbeddingProvider::new(128))));
        let r = retriever(store);
        let q = r.embed("你好").expect("embed");
        assert_eq!(r.recall_attribute(&q, "外貌", "旅人", &RecallConfig::default()), "");
        assert!(!r.recall_attribute(&q, "性格", "旅人", &RecallConfig::default()).is_empty());
    }
}
