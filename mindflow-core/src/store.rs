//! Memory store contract and an in-process reference implementation.
//!
//! The dialogue core never defines how vectors are indexed or persisted; it
//! talks to the store through [`MemoryStore`]. [`InMemoryStore`] implements
//! the contract in process (sessions, a short-term window with promotion to
//! long-term memory, range-filtered vector queries with surrounding context,
//! summary units) for tests, benches and local runs.

use std::collections::{BTreeMap, HashSet, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use ordered_float::OrderedFloat;
use parking_lot::Mutex;
use tracing::{debug, info};

use crate::config::SearchRange;
use crate::embedding::{EmbeddingProvider, dot};
use crate::error::{MindflowError, Result};
use crate::types::{
    ACTION_SUMMARY, Embedding, MemoryScope, MemoryUnit, NewMemory, PromptMessage, SessionId,
    UnitId,
};

// ---------------------------------------------------------------------------
// Query
// ---------------------------------------------------------------------------

/// Metadata filter applied before similarity ranking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryFilter {
    /// Only the unit with this id.
    IdEquals(UnitId),
}

impl QueryFilter {
    fn matches(&self, unit: &MemoryUnit) -> bool {
        match self {
            Self::IdEquals(id) => &unit.id == id,
        }
    }
}

/// A store query.
#[derive(Debug, Clone)]
pub struct MemoryQuery {
    /// Query vector; `None` ranks every candidate equally.
    pub vector: Option<Embedding>,
    /// Max number of groups returned.
    pub limit: usize,
    /// All filters must match.
    pub filters: Vec<QueryFilter>,
    /// Return each hit together with its neighbouring units.
    pub recall_context: bool,
    /// Similarity window; ignored when `vector` is `None`.
    pub range: Option<SearchRange>,
    /// Which tier to search.
    pub scope: MemoryScope,
    /// Copy long-term hits into the short-term window.
    pub add_ltm_to_stm: bool,
}

impl MemoryQuery {
    /// Similarity query over `scope`.
    #[must_use]
    pub fn similar(vector: Embedding, limit: usize, scope: MemoryScope) -> Self {
        Self {
            vector: Some(vector),
            limit,
            filters: Vec::new(),
            recall_context: false,
            range: None,
            scope,
            add_ltm_to_stm: false,
        }
    }

    /// Fetch one unit by id.
    #[must_use]
    pub fn by_id(id: UnitId, scope: MemoryScope) -> Self {
        Self {
            vector: None,
            limit: 1,
            filters: vec![QueryFilter::IdEquals(id)],
            recall_context: false,
            range: None,
            scope,
            add_ltm_to_stm: false,
        }
    }

    /// Set the similarity window.
    #[must_use]
    pub fn with_range(mut self, range: SearchRange) -> Self {
        self.range = Some(range);
        self
    }

    /// Toggle surrounding-context recall.
    #[must_use]
    pub fn with_context(mut self, recall_context: bool) -> Self {
        self.recall_context = recall_context;
        self
    }

    /// Toggle copying long-term hits into the short-term window.
    #[must_use]
    pub fn adding_to_short_term(mut self, add: bool) -> Self {
        self.add_ltm_to_stm = add;
        self
    }
}

// ---------------------------------------------------------------------------
// Contract
// ---------------------------------------------------------------------------

/// The narrow contract the dialogue core consumes.
#[async_trait]
pub trait MemoryStore: Send + Sync {
    /// Write one unit into the current session (opening one if needed).
    async fn add_memory(&self, memory: NewMemory) -> Result<UnitId>;

    /// Ranked groups of units; each group is a hit plus optional context.
    async fn query(&self, query: &MemoryQuery) -> Result<Vec<Vec<MemoryUnit>>>;

    /// The most recent `length` units of the short-term window, oldest first.
    async fn get_context(&self, length: usize) -> Result<Vec<MemoryUnit>>;

    /// Open a new session, or re-open `id`.
    ///
    /// Re-opening an unknown id is [`MindflowError::SessionNotFound`].
    async fn start_session(&self, id: Option<SessionId>) -> Result<SessionId>;

    /// The session new units are written to.
    async fn current_session_id(&self) -> Option<SessionId>;

    /// Rebuild the short-term window from a persisted session and return it.
    async fn restore_short_term(&self, id: &SessionId) -> Result<Vec<MemoryUnit>>;

    /// Delete a session and every unit in it.
    async fn remove_session(&self, id: &SessionId) -> Result<()>;

    /// Promote the short-term window to long-term memory and empty it.
    async fn flush_context(&self) -> Result<()>;

    /// Empty the short-term window without promotion.
    async fn clear_context(&self) -> Result<()>;

    /// Drop every short-term unit that was never promoted.
    async fn clear_all(&self) -> Result<()>;

    /// Summarise a session's unsummarised utterances into a summary unit.
    async fn summarize_session(
        &self,
        id: &SessionId,
        role: &str,
        prompt: &[PromptMessage],
    ) -> Result<Option<UnitId>>;

    /// Optionally summarise, then release per-session resources.
    async fn close(&self, auto_summarize: bool, prompt: &[PromptMessage]) -> Result<()>;

    /// The embedder this store indexes with.
    fn embedder(&self) -> &dyn EmbeddingProvider;

    /// Whether short-term recall is available.
    fn is_short_term_enabled(&self) -> bool;

    /// Embed one text with the store's embedder.
    ///
    /// # Errors
    /// Propagates the embedder's failure.
    fn get_embedding(&self, text: &str) -> Result<Embedding> {
        self.embedder().embed(text)
    }
}

// ---------------------------------------------------------------------------
// Summariser
// ---------------------------------------------------------------------------

/// Turns a transcript into summary text for [`InMemoryStore`].
#[async_trait]
pub trait SessionSummarizer: Send + Sync {
    /// Summarise `transcript` from `role`'s perspective.
    async fn summarize(
        &self,
        role: &str,
        prompt: &[PromptMessage],
        transcript: &[MemoryUnit],
    ) -> Result<String>;
}

/// Summariser that keeps the leading characters of the transcript.
#[derive(Debug, Clone)]
pub struct ExtractiveSummarizer {
    max_chars: usize,
}

impl ExtractiveSummarizer {
    /// Keep at most `max_chars` characters.
    #[must_use]
    pub fn new(max_chars: usize) -> Self {
        Self { max_chars }
    }
}

impl Default for ExtractiveSummarizer {
    fn default() -> Self {
        Self::new(200)
    }
}

#[async_trait]
impl SessionSummarizer for ExtractiveSummarizer {
    async fn summarize(
        &self,
        _role: &str,
        _prompt: &[PromptMessage],
        transcript: &[MemoryUnit],
    ) -> Result<String> {
        let joined = transcript
            .iter()
            .map(|u| format!("{}: {}", u.source, u.content))
            .collect::<Vec<_>>()
            .join("; ");
        Ok(joined.chars().take(self.max_chars).collect())
    }
}

// ---------------------------------------------------------------------------
// InMemoryStore
// ---------------------------------------------------------------------------

struct StoredUnit {
    unit: MemoryUnit,
    embedding: Embedding,
    long_term: bool,
}

#[derive(Default)]
struct StoreInner {
    sessions: BTreeMap<SessionId, Vec<StoredUnit>>,
    current: Option<SessionId>,
    window: VecDeque<(SessionId, UnitId)>,
}

impl StoreInner {
    fn find(&self, session: &SessionId, id: &UnitId) -> Option<&StoredUnit> {
        self.sessions
            .get(session)?
            .iter()
            .find(|s| &s.unit.id == id)
    }

    fn find_mut(&mut self, session: &SessionId, id: &UnitId) -> Option<&mut StoredUnit> {
        self.sessions
            .get_mut(session)?
            .iter_mut()
            .find(|s| &s.unit.id == id)
    }

    fn in_window(&self, session: &SessionId, id: &UnitId) -> bool {
        self.window.iter().any(|(s, u)| s == session && u == id)
    }

    fn promote(&mut self, session: &SessionId, id: &UnitId) {
        if let Some(stored) = self.find_mut(session, id) {
            stored.long_term = true;
        }
    }

    fn push_window(&mut self, session: SessionId, id: UnitId, capacity: usize) {
        if self.in_window(&session, &id) {
            return;
        }
        self.window.push_back((session, id));
        while self.window.len() > capacity {
            if let Some((s, u)) = self.window.pop_front() {
                self.promote(&s, &u);
            }
        }
    }

    fn ensure_session(&mut self) -> SessionId {
        if let Some(id) = &self.current {
            return id.clone();
        }
        let id = SessionId::generate();
        self.sessions.insert(id.clone(), Vec::new());
        self.current = Some(id.clone());
        id
    }
}

/// In-process [`MemoryStore`].
pub struct InMemoryStore {
    inner: Mutex<StoreInner>,
    embedder: Arc<dyn EmbeddingProvider>,
    summarizer: Arc<dyn SessionSummarizer>,
    stm_capacity: usize,
    short_term_enabled: bool,
}

impl InMemoryStore {
    /// A store with a 32-unit short-term window and the extractive summariser.
    #[must_use]
    pub fn new(embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            inner: Mutex::new(StoreInner::default()),
            embedder,
            summarizer: Arc::new(ExtractiveSummarizer::default()),
            stm_capacity: 32,
            short_term_enabled: true,
        }
    }

    /// Replace the summariser.
    #[must_use]
    pub fn with_summarizer(mut self, summarizer: Arc<dyn SessionSummarizer>) -> Self {
        self.summarizer = summarizer;
        self
    }

    /// Set the short-term window capacity.
    #[must_use]
    pub fn with_stm_capacity(mut self, capacity: usize) -> Self {
        self.stm_capacity = capacity.max(1);
        self
    }

    /// Enable or disable short-term recall.
    #[must_use]
    pub fn with_short_term(mut self, enabled: bool) -> Self {
        self.short_term_enabled = enabled;
        self
    }

    /// Ids of every known session.
    #[must_use]
    pub fn session_ids(&self) -> Vec<SessionId> {
        self.inner.lock().sessions.keys().cloned().collect()
    }

    /// Every unit of a session in rank order.
    #[must_use]
    pub fn session_units(&self, id: &SessionId) -> Vec<MemoryUnit> {
        self.inner
            .lock()
            .sessions
            .get(id)
            .map(|units| units.iter().map(|s| s.unit.clone()).collect())
            .unwrap_or_default()
    }

    fn group_for(
        inner: &StoreInner,
        session: &SessionId,
        hit: &StoredUnit,
        with_context: bool,
    ) -> Vec<MemoryUnit> {
        if !with_context {
            return vec![hit.unit.clone()];
        }
        let Some(units) = inner.sessions.get(session) else {
            return vec![hit.unit.clone()];
        };
        let rank = hit.unit.rank;
        units
            .iter()
            .filter(|s| !s.unit.is_summary() || s.unit.id == hit.unit.id)
            .filter(|s| s.unit.rank + 1 >= rank && s.unit.rank <= rank + 1)
            .map(|s| s.unit.clone())
            .collect()
    }
}

#[async_trait]
impl MemoryStore for InMemoryStore {
    async fn add_memory(&self, memory: NewMemory) -> Result<UnitId> {
        let embedding = self.embedder.embed(&memory.content)?;
        let mut inner = self.inner.lock();
        let session = inner.ensure_session();
        let id = memory.id.unwrap_or_else(UnitId::generate);
        let units = inner.sessions.entry(session.clone()).or_default();
        #[allow(clippy::cast_possible_truncation)]
        let rank = units.len() as u32;
        units.push(StoredUnit {
            unit: MemoryUnit {
                id: id.clone(),
                source: memory.source,
                content: memory.content,
                action: memory.action,
                parent_id: None,
                children_ids: Vec::new(),
                rank,
                creation_time: memory.creation_time,
            },
            embedding,
            long_term: false,
        });
        inner.push_window(session, id.clone(), self.stm_capacity);
        debug!(unit = %id, "memory added");
        Ok(id)
    }

    async fn query(&self, query: &MemoryQuery) -> Result<Vec<Vec<MemoryUnit>>> {
        let mut inner = self.inner.lock();

        let mut hits: Vec<(SessionId, UnitId, f32)> = Vec::new();
        for (session, units) in &inner.sessions {
            for stored in units {
                let in_scope = match query.scope {
                    MemoryScope::ShortTerm => inner.in_window(session, &stored.unit.id),
                    MemoryScope::LongTerm => stored.long_term,
                    MemoryScope::Any => true,
                };
                if !in_scope || !query.filters.iter().all(|f| f.matches(&stored.unit)) {
                    continue;
                }
                let similarity = match &query.vector {
                    Some(v) => {
                        let sim = dot(v, &stored.embedding);
                        if query.range.is_some_and(|r| !r.contains(sim)) {
                            continue;
                        }
                        sim
                    }
                    None => 1.0,
                };
                hits.push((session.clone(), stored.unit.id.clone(), similarity));
            }
        }
        hits.sort_by_key(|(_, _, sim)| std::cmp::Reverse(OrderedFloat(*sim)));

        let mut seen: HashSet<UnitId> = HashSet::new();
        let mut groups = Vec::new();
        for (session, id, _) in hits {
            if groups.len() >= query.limit {
                break;
            }
            if seen.contains(&id) {
                continue;
            }
            let Some(hit) = inner.find(&session, &id) else {
                continue;
            };
            let group = Self::group_for(&inner, &session, hit, query.recall_context);
            seen.extend(group.iter().map(|u| u.id.clone()));
            groups.push((session, group));
        }

        if query.add_ltm_to_stm {
            for (session, group) in &groups {
                for unit in group {
                    inner.push_window(session.clone(), unit.id.clone(), self.stm_capacity);
                }
            }
        }

        Ok(groups.into_iter().map(|(_, g)| g).collect())
    }

    async fn get_context(&self, length: usize) -> Result<Vec<MemoryUnit>> {
        let inner = self.inner.lock();
        let skip = inner.window.len().saturating_sub(length);
        Ok(inner
            .window
            .iter()
            .skip(skip)
            .filter_map(|(s, u)| inner.find(s, u).map(|stored| stored.unit.clone()))
            .collect())
    }

    async fn start_session(&self, id: Option<SessionId>) -> Result<SessionId> {
        let mut inner = self.inner.lock();
        let id = match id {
            Some(id) => {
                if !inner.sessions.contains_key(&id) {
                    return Err(MindflowError::SessionNotFound(id.to_string()));
                }
                id
            }
            None => {
                let id = SessionId::generate();
                inner.sessions.insert(id.clone(), Vec::new());
                id
            }
        };
        inner.current = Some(id.clone());
        info!(session = %id, "session opened");
        Ok(id)
    }

    async fn current_session_id(&self) -> Option<SessionId> {
        self.inner.lock().current.clone()
    }

    async fn restore_short_term(&self, id: &SessionId) -> Result<Vec<MemoryUnit>> {
        let mut inner = self.inner.lock();
        let units: Vec<MemoryUnit> = inner
            .sessions
            .get(id)
            .ok_or_else(|| MindflowError::SessionNotFound(id.to_string()))?
            .iter()
            .filter(|s| !s.unit.is_summary())
            .map(|s| s.unit.clone())
            .collect();
        let skip = units.len().saturating_sub(self.stm_capacity);
        let restored: Vec<MemoryUnit> = units.into_iter().skip(skip).collect();

        let drained: Vec<(SessionId, UnitId)> = inner.window.drain(..).collect();
        for (s, u) in &drained {
            inner.promote(s, u);
        }
        for unit in &restored {
            inner.window.push_back((id.clone(), unit.id.clone()));
        }
        debug!(session = %id, units = restored.len(), "short-term window restored");
        Ok(restored)
    }

    async fn remove_session(&self, id: &SessionId) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.sessions.remove(id);
        inner.window.retain(|(s, _)| s != id);
        if inner.current.as_ref() == Some(id) {
            inner.current = None;
        }
        info!(session = %id, "session removed");
        Ok(())
    }

    async fn flush_context(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        let drained: Vec<(SessionId, UnitId)> = inner.window.drain(..).collect();
        for (s, u) in &drained {
            inner.promote(s, u);
        }
        debug!(promoted = drained.len(), "short-term window flushed");
        Ok(())
    }

    async fn clear_context(&self) -> Result<()> {
        self.inner.lock().window.clear();
        Ok(())
    }

    async fn clear_all(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.window.clear();
        for units in inner.sessions.values_mut() {
            units.retain(|s| s.long_term);
        }
        Ok(())
    }

    async fn summarize_session(
        &self,
        id: &SessionId,
        role: &str,
        prompt: &[PromptMessage],
    ) -> Result<Option<UnitId>> {
        let transcript: Vec<MemoryUnit> = {
            let inner = self.inner.lock();
            inner
                .sessions
                .get(id)
                .ok_or_else(|| MindflowError::SessionNotFound(id.to_string()))?
                .iter()
                .filter(|s| !s.unit.is_summary() && s.unit.parent_id.is_none())
                .map(|s| s.unit.clone())
                .collect()
        };
        if transcript.is_empty() {
            return Ok(None);
        }

        let text = self.summarizer.summarize(role, prompt, &transcript).await?;
        let embedding = self.embedder.embed(&text)?;
        let summary_id = UnitId::generate();
        let children: Vec<UnitId> = transcript.iter().map(|u| u.id.clone()).collect();

        let mut inner = self.inner.lock();
        let units = inner
            .sessions
            .get_mut(id)
            .ok_or_else(|| MindflowError::SessionNotFound(id.to_string()))?;
        for stored in units.iter_mut() {
            if children.contains(&stored.unit.id) {
                stored.unit.parent_id = Some(summary_id.clone());
            }
        }
        #[allow(clippy::cast_possible_truncation)]
        let rank = units.len() as u32;
        units.push(StoredUnit {
            unit: MemoryUnit {
                id: summary_id.clone(),
                source: role.to_string(),
                content: text,
                action: ACTION_SUMMARY.to_string(),
                parent_id: None,
                children_ids: children,
                rank,
                creation_time: Utc::now(),
            },
            embedding,
            long_term: true,
        });
        info!(session = %id, summary = %summary_id, "session summarised");
        Ok(Some(summary_id))
    }

    async fn close(&self, auto_summarize: bool, prompt: &[PromptMessage]) -> Result<()> {
        let current = self.inner.lock().current.clone();
        if let Some(id) = current.filter(|_| auto_summarize) {
            let role = self
                .inner
                .lock()
                .sessions
                .get(&id)
                .and_then(|units| units.last().map(|s| s.unit.source.clone()))
                .unwrap_or_default();
            self.summarize_session(&id, &role, prompt).await?;
        }
        self.flush_context().await?;
        self.inner.lock().current = None;
        Ok(())
    }

    fn embedder(&self) -> &dyn EmbeddingProvider {
        self.embedder.as_ref()
    }

    fn is_short_term_enabled(&self) -> bool {
        self.short_term_enabled
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
