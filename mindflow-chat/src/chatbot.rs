//! The roleplay turn orchestrator.
//!
//! A [`RolePlayChatbot`] owns one [`RoleState`] and one [`MindFlowCache`]
//! and drives every turn through the same pipeline:
//!
//! 1. commit the previous exchange to the memory store
//! 2. assemble the prompt from recall, style and the rolling context
//! 3. invoke the generation backend
//! 4. parse the structured reply, falling back on malformed output
//! 5. record the private reasoning and update the turn state
//!
//! State changes are applied only after the backend answered. A failed
//! generation leaves the previous turn's fields untouched.

use std::sync::Arc;

use mindflow_core::recall::RecallSource;
use mindflow_core::{
    AttributeIndex, MemoryRetriever, MemoryStore, MindFlowCache, NewMemory, PromptMessage,
    QueryCatalog, RecallConfig, RoleState, SessionConfig, SessionId, StyleRetriever, UnitId,
};
use mindflow_llm::{ChatModel, GenerationOptions, PromptSet, ResponseValidator};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::assembler::PromptAssembler;
use crate::config::MindflowConfig;
use crate::error::Result;
use crate::schemas::CharacterData;

/// What one turn hands back to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatReply {
    /// Objective scene summary.
    pub desc: String,
    /// The character's private reasoning.
    pub think: String,
    /// The spoken line.
    pub content: String,
    /// The character who spoke.
    pub role: String,
}

/// Supplies a fresh role description for a round.
///
/// Returning `None` or an empty string keeps the current description.
pub trait RoleDescriber: Send + Sync {
    /// Description for `round`, given the user's utterance.
    fn describe(&self, round: usize, user_input: &str) -> Option<String>;
}

/// One character talking to one user.
pub struct RolePlayChatbot {
    model: Arc<dyn ChatModel>,
    recall: Arc<dyn RecallSource>,
    store: Arc<dyn MemoryStore>,
    assembler: PromptAssembler,
    validator: ResponseValidator,
    state: RoleState,
    mind_flow: MindFlowCache,
    recall_config: RecallConfig,
    session_config: SessionConfig,
    options: GenerationOptions,
}

impl RolePlayChatbot {
    /// Assemble a chatbot from its collaborators.
    #[must_use]
    pub fn new(
        model: Arc<dyn ChatModel>,
        recall: Arc<dyn RecallSource>,
        store: Arc<dyn MemoryStore>,
        state: RoleState,
        recall_config: RecallConfig,
        session_config: SessionConfig,
    ) -> Self {
        let validator = ResponseValidator::new(state.role.clone(), state.user.clone());
        let mind_flow = MindFlowCache::new(recall_config.max_context_length);
        Self {
            model,
            recall,
            store,
            assembler: PromptAssembler::default(),
            validator,
            state,
            mind_flow,
            recall_config,
            session_config,
            options: GenerationOptions::default(),
        }
    }

    /// Build the retriever indexes from `data` and wire a chatbot around
    /// `store`, embedding with the store's own embedder.
    ///
    /// # Errors
    /// Embedding failures while indexing the schemas and the role graph.
    pub fn from_config(
        config: &MindflowConfig,
        data: CharacterData,
        model: Arc<dyn ChatModel>,
        store: Arc<dyn MemoryStore>,
    ) -> Result<Self> {
        let character = &config.character;
        let (catalog, attributes, style) = {
            let embedder = store.embedder();
            (
                QueryCatalog::build(&data.query_schema, embedder)?,
                AttributeIndex::build(data.role_graph.entity_attributes(&character.role), embedder)?,
                StyleRetriever::build(data.answer_schema, embedder)?,
            )
        };
        info!(
            role = %character.role,
            catalog = catalog.len(),
            attributes = attributes.len(),
            "chatbot indexes built"
        );
        let recall = Arc::new(MemoryRetriever::new(
            Arc::clone(&store),
            catalog,
            attributes,
            style,
        ));
        let state = RoleState::new(
            character.user.clone(),
            character.role.clone(),
            character.role_description.clone(),
        );
        Ok(Self::new(
            model,
            recall,
            store,
            state,
            config.recall.clone(),
            config.session.clone(),
        ))
    }

    /// Replace the prompt templates.
    #[must_use]
    pub fn with_prompts(mut self, prompts: PromptSet) -> Self {
        self.assembler = PromptAssembler::new(prompts);
        self
    }

    /// Override sampling for every turn.
    #[must_use]
    pub fn with_generation_options(mut self, options: GenerationOptions) -> Self {
        self.options = options;
        self
    }

    /// The current turn state.
    #[must_use]
    pub fn state(&self) -> &RoleState {
        &self.state
    }

    /// Whether closing should summarise the session by default.
    #[must_use]
    pub fn auto_summarize_on_close(&self) -> bool {
        self.session_config.auto_summarize_on_close
    }

    /// The private-reasoning cache.
    #[must_use]
    pub fn mind_flow(&self) -> &MindFlowCache {
        &self.mind_flow
    }

    /// The character's name.
    #[must_use]
    pub fn role(&self) -> &str {
        &self.state.role
    }

    /// The user's name.
    #[must_use]
    pub fn user(&self) -> &str {
        &self.state.user
    }

    // -----------------------------------------------------------------------
    // Turns
    // -----------------------------------------------------------------------

    /// Answer `input` in character.
    ///
    /// A non-empty `role_description` replaces the current one before the
    /// prompt is built, and is kept only if generation succeeds.
    ///
    /// # Errors
    /// Store, embedding and generation failures. The previous turn may
    /// already have been committed when generation fails.
    pub async fn chat(&mut self, input: &str, role_description: Option<&str>) -> Result<ChatReply> {
        self.commit_pending().await?;
        let previous = role_description
            .filter(|d| !d.is_empty())
            .map(|d| std::mem::replace(&mut self.state.role_description, d.to_string()));
        match self.generate(input).await {
            Ok(reply) => {
                self.state.latest_user_input = Some(input.to_string());
                Ok(reply)
            }
            Err(e) => {
                if let Some(description) = previous {
                    self.state.role_description = description;
                }
                Err(e)
            }
        }
    }

    /// Regenerate the answer to the latest input.
    ///
    /// Returns `Ok(None)` when there is no input to answer or the turn was
    /// already committed by a later `chat`.
    ///
    /// # Errors
    /// Same as [`Self::chat`]. The replaced reasoning is restored on failure.
    pub async fn refresh(&mut self) -> Result<Option<ChatReply>> {
        if self.state.latest_committed {
            return Ok(None);
        }
        let Some(input) = self.state.latest_user_input.clone() else {
            return Ok(None);
        };
        let replaced = self
            .state
            .latest_role_output_id
            .clone()
            .and_then(|id| self.mind_flow.consume(&id).map(|mind| (id, mind)));

        match self.generate(&input).await {
            Ok(reply) => Ok(Some(reply)),
            Err(e) => {
                if let Some((id, mind)) = replaced {
                    self.mind_flow.record(id, mind);
                }
                Err(e)
            }
        }
    }

    /// Replace the latest input with `input` and regenerate.
    ///
    /// Returns `Ok(None)` under the same conditions as [`Self::refresh`].
    ///
    /// # Errors
    /// Same as [`Self::refresh`]; the previous input is restored on failure.
    pub async fn update_input(&mut self, input: &str) -> Result<Option<ChatReply>> {
        if self.state.latest_committed || self.state.latest_user_input.is_none() {
            return Ok(None);
        }
        let previous = self.state.latest_user_input.replace(input.to_string());
        let result = self.refresh().await;
        if result.is_err() {
            self.state.latest_user_input = previous;
        }
        result
    }

    /// Write the pending exchange to the store, once.
    ///
    /// # Errors
    /// Store failures.
    pub async fn commit_pending(&mut self) -> Result<()> {
        if !self.state.has_pending_turn() {
            return Ok(());
        }
        if let Some(input) = &self.state.latest_user_input {
            self.store
                .add_memory(NewMemory::speak(&self.state.user, input))
                .await?;
        }
        if let Some(output) = &self.state.latest_role_output {
            let mut memory = NewMemory::speak(&self.state.role, output);
            if let Some(id) = &self.state.latest_role_output_id {
                memory = memory.with_id(id.clone());
            }
            self.store.add_memory(memory).await?;
        }
        self.state.latest_committed = true;
        debug!("previous turn committed");
        Ok(())
    }

    async fn generate(&mut self, input: &str) -> Result<ChatReply> {
        let messages = self
            .assembler
            .build(
                self.recall.as_ref(),
                &self.state,
                &self.mind_flow,
                input,
                &self.recall_config,
            )
            .await?;
        let completion = self.model.invoke(&messages, &self.options).await?;
        let reply = self.validator.parse(&completion.content);

        let turn_id = UnitId::generate();
        self.mind_flow.record(turn_id.clone(), reply.think.clone());
        self.state.scene_summary.clone_from(&reply.desc);
        self.state.latest_role_output = Some(reply.speak.clone());
        self.state.latest_role_output_id = Some(turn_id);
        self.state.latest_committed = false;
        debug!(
            messages = messages.len(),
            latency_ms = completion.latency_ms,
            "turn generated"
        );

        Ok(ChatReply {
            desc: reply.desc,
            think: reply.think,
            content: reply.speak,
            role: self.state.role.clone(),
        })
    }

    // -----------------------------------------------------------------------
    // Sessions
    // -----------------------------------------------------------------------

    /// Drop the pending turn and the reasoning cache, flush the context and
    /// open a fresh session. `auto_summarize` summarises the outgoing session
    /// first.
    ///
    /// # Errors
    /// Store failures.
    pub async fn start_new_session(&mut self, auto_summarize: bool) -> Result<SessionId> {
        self.state.reset_volatile();
        self.mind_flow.clear();
        self.store.flush_context().await?;
        if auto_summarize {
            self.summarize_all().await?;
        }
        let id = self.store.start_session(None).await?;
        info!(session = %id, "new session started");
        Ok(id)
    }

    /// Reopen `id` and return its restored transcript as `{source, content}`
    /// pairs in chronological order.
    ///
    /// # Errors
    /// [`mindflow_core::MindflowError::SessionNotFound`] for unknown ids.
    pub async fn resume_session(&mut self, id: &SessionId) -> Result<Vec<PromptMessage>> {
        self.state.reset_volatile();
        self.mind_flow.clear();
        let id = self.store.start_session(Some(id.clone())).await?;
        let units = self.store.restore_short_term(&id).await?;
        info!(session = %id, units = units.len(), "session resumed");
        Ok(units
            .into_iter()
            .map(|unit| PromptMessage::new(unit.source, unit.content))
            .collect())
    }

    /// Delete the current session, reset every turn field including the
    /// scene, and open a fresh session.
    ///
    /// # Errors
    /// Store failures.
    pub async fn clear_session(&mut self) -> Result<SessionId> {
        if let Some(current) = self.store.current_session_id().await {
            self.store.remove_session(&current).await?;
        }
        self.state.reset_all();
        self.mind_flow.clear();
        self.store.clear_context().await?;
        self.store.clear_all().await?;
        let id = self.store.start_session(None).await?;
        info!(session = %id, "session cleared");
        Ok(id)
    }

    /// Commit the pending turn and release the store's per-session
    /// resources. Data is kept.
    ///
    /// # Errors
    /// Store failures.
    pub async fn close(&mut self, auto_summarize: bool) -> Result<()> {
        self.commit_pending().await?;
        self.store
            .close(auto_summarize, &self.session_config.summarizing_prompt)
            .await?;
        info!(auto_summarize, "chatbot closed");
        Ok(())
    }

    /// Summarise the current session. `None` when there is no session or
    /// nothing to summarise.
    ///
    /// # Errors
    /// Store and summariser failures.
    pub async fn summarize_current(&self) -> Result<Option<UnitId>> {
        let Some(id) = self.store.current_session_id().await else {
            warn!("no current session to summarise");
            return Ok(None);
        };
        let summary = self
            .store
            .summarize_session(&id, &self.state.role, &self.session_config.summarizing_prompt)
            .await?;
        Ok(summary)
    }

    /// Summarise everything pending. Only the current session can hold
    /// unsummarised turns, so this is [`Self::summarize_current`].
    ///
    /// # Errors
    /// Same as [`Self::summarize_current`].
    pub async fn summarize_all(&self) -> Result<Option<UnitId>> {
        self.summarize_current().await
    }

    /// Point the generation backend at a new endpoint. Empty values keep
    /// the current setting. Returns whether the backend accepted.
    pub fn update_llm_config(&self, base_url: &str, model: &str, api_key: &str) -> bool {
        let accepted = self.model.reconfigure(base_url, model, api_key);
        if !accepted {
            warn!("generation backend does not support reconfiguration");
        }
        accepted
    }
}
