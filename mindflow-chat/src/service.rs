//! Status-gated chat facade.
//!
//! [`ChatService`] is what a request handler talks to. It owns the shared
//! chatbot, admits every call through the [`StatusGate`] and keeps the
//! UI-visible transcript mirror with its round counter.
//!
//! The gate lock is taken only for check-and-set. Generation and store
//! calls run under the chatbot's own async mutex, which also serialises
//! turns for the single character instance.

use std::sync::Arc;

use mindflow_core::{
    Admission, GateRole, MemoryStore, MindflowError, SessionId, StatusGate, SystemStatus, UnitId,
};
use mindflow_llm::ChatModel;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::chatbot::{ChatReply, RoleDescriber, RolePlayChatbot};
use crate::config::MindflowConfig;
use crate::error::{ChatError, Result};
use crate::schemas::CharacterData;

type SharedChatbot = Arc<tokio::sync::Mutex<RolePlayChatbot>>;

/// One line of the UI-visible history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptEntry {
    /// Speaker name: the user's or the character's.
    pub role: String,
    /// What was said.
    pub content: String,
    /// Scene summary, on character lines produced this session.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub desc: Option<String>,
    /// Private reasoning, on character lines produced this session.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub think: Option<String>,
}

impl TranscriptEntry {
    /// A plain `{role, content}` line.
    #[must_use]
    pub fn plain(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
            desc: None,
            think: None,
        }
    }

    fn from_reply(reply: &ChatReply) -> Self {
        Self {
            role: reply.role.clone(),
            content: reply.content.clone(),
            desc: Some(reply.desc.clone()),
            think: Some(reply.think.clone()),
        }
    }
}

#[derive(Debug, Default)]
struct Transcript {
    entries: Vec<TranscriptEntry>,
    round: usize,
}

impl Transcript {
    fn clear(&mut self) {
        self.entries.clear();
        self.round = 0;
    }
}

/// The chat-facing service shared by every request handler.
pub struct ChatService {
    gate: StatusGate,
    chatbot: RwLock<Option<SharedChatbot>>,
    transcript: Mutex<Transcript>,
    describer: Option<Arc<dyn RoleDescriber>>,
}

impl ChatService {
    /// A service with no chatbot yet, sharing `gate` with the editors.
    #[must_use]
    pub fn new(gate: StatusGate) -> Self {
        Self {
            gate,
            chatbot: RwLock::new(None),
            transcript: Mutex::new(Transcript::default()),
            describer: None,
        }
    }

    /// Ask `describer` for a role description every round.
    #[must_use]
    pub fn with_describer(mut self, describer: Arc<dyn RoleDescriber>) -> Self {
        self.describer = Some(describer);
        self
    }

    /// The shared status gate.
    #[must_use]
    pub fn gate(&self) -> &StatusGate {
        &self.gate
    }

    /// Current status.
    #[must_use]
    pub fn status(&self) -> SystemStatus {
        self.gate.status()
    }

    // -----------------------------------------------------------------------
    // Initialisation
    // -----------------------------------------------------------------------

    /// Install a ready chatbot and settle the gate to `closed`.
    pub fn install(&self, chatbot: RolePlayChatbot) {
        *self.chatbot.write() = Some(Arc::new(tokio::sync::Mutex::new(chatbot)));
        self.gate.mark_initialized(true);
    }

    /// Load the character data named in `config` and build the chatbot.
    ///
    /// # Errors
    /// Any load or indexing failure; the gate then settles to `init_failed`.
    pub fn initialize(
        &self,
        config: &MindflowConfig,
        model: Arc<dyn ChatModel>,
        store: Arc<dyn MemoryStore>,
    ) -> Result<()> {
        let built = CharacterData::load(&config.data)
            .and_then(|data| RolePlayChatbot::from_config(config, data, model, store));
        match built {
            Ok(chatbot) => {
                self.install(chatbot);
                info!(role = %config.character.role, "chat service initialised");
                Ok(())
            }
            Err(e) => {
                error!("chatbot initialisation failed: {e}");
                self.gate.mark_initialized(false);
                Err(e)
            }
        }
    }

    /// [`Self::initialize`] over an in-process store built from `config`.
    ///
    /// # Errors
    /// An unknown embedding provider, then everything [`Self::initialize`]
    /// reports.
    pub fn initialize_in_memory(
        &self,
        config: &MindflowConfig,
        model: Arc<dyn ChatModel>,
    ) -> Result<()> {
        match config.memory_store() {
            Ok(store) => self.initialize(config, model, store),
            Err(e) => {
                error!("memory store construction failed: {e}");
                self.gate.mark_initialized(false);
                Err(e)
            }
        }
    }

    fn chatbot(&self) -> Result<SharedChatbot> {
        self.chatbot
            .read()
            .clone()
            .ok_or_else(|| MindflowError::Unavailable("chatbot is not initialised".into()).into())
    }

    /// Admit a chat call, activating the chatbot when coming from `closed`.
    ///
    /// Activation opens a fresh session and clears the transcript; if that
    /// fails the gate moves to `init_failed`.
    async fn ensure_active(&self) -> Result<SharedChatbot> {
        let admission = self.gate.try_enter_write(GateRole::Chat)?;
        let chatbot = match self.chatbot() {
            Ok(chatbot) => chatbot,
            Err(e) => {
                self.gate.set_init_failed();
                return Err(e);
            }
        };
        if admission == Admission::Activated {
            self.transcript.lock().clear();
            if let Err(e) = chatbot.lock().await.start_new_session(false).await {
                error!("activation failed: {e}");
                self.gate.set_init_failed();
                return Err(e);
            }
            info!("chat activated");
        }
        Ok(chatbot)
    }

    // -----------------------------------------------------------------------
    // Turns
    // -----------------------------------------------------------------------

    /// Answer `input` and append both lines to the transcript.
    ///
    /// # Errors
    /// * [`ChatError::InvalidRequest`] for empty input.
    /// * Gate refusals, store and generation failures.
    pub async fn chat(&self, input: &str) -> Result<ChatReply> {
        if input.is_empty() {
            return Err(ChatError::InvalidRequest("user_input is required".into()));
        }
        let chatbot = self.ensure_active().await?;
        let description = self
            .describer
            .as_ref()
            .and_then(|d| d.describe(self.round(), input));

        let mut chatbot = chatbot.lock().await;
        let reply = chatbot.chat(input, description.as_deref()).await?;

        let mut transcript = self.transcript.lock();
        transcript
            .entries
            .push(TranscriptEntry::plain(chatbot.user(), input));
        transcript.entries.push(TranscriptEntry::from_reply(&reply));
        transcript.round += 1;
        Ok(reply)
    }

    /// Regenerate the latest answer, replacing it in the transcript.
    ///
    /// # Errors
    /// [`ChatError::NoPendingInput`] when there is nothing to regenerate,
    /// plus everything [`Self::chat`] can return.
    pub async fn refresh(&self) -> Result<ChatReply> {
        let chatbot = self.ensure_active().await?;
        let mut chatbot = chatbot.lock().await;
        let reply = chatbot.refresh().await?.ok_or(ChatError::NoPendingInput)?;

        let mut transcript = self.transcript.lock();
        if transcript
            .entries
            .last()
            .is_some_and(|last| last.role == reply.role)
        {
            transcript.entries.pop();
        }
        transcript.entries.push(TranscriptEntry::from_reply(&reply));
        Ok(reply)
    }

    /// Replace the latest user line with `input` and regenerate.
    ///
    /// # Errors
    /// * [`ChatError::InvalidRequest`] when the transcript does not end with
    ///   a user line followed by an answer, or `input` is empty.
    /// * Everything [`Self::refresh`] can return.
    pub async fn update_input(&self, input: &str) -> Result<ChatReply> {
        let chatbot = self.ensure_active().await?;
        let mut chatbot = chatbot.lock().await;
        {
            let transcript = self.transcript.lock();
            let len = transcript.entries.len();
            if len < 2 {
                return Err(ChatError::InvalidRequest("Need history".into()));
            }
            if transcript.entries[len - 2].role != chatbot.user() {
                return Err(ChatError::InvalidRequest("Last msg not user".into()));
            }
        }
        if input.is_empty() {
            return Err(ChatError::InvalidRequest("new_user_input required".into()));
        }

        let reply = chatbot
            .update_input(input)
            .await?
            .ok_or(ChatError::NoPendingInput)?;

        let mut transcript = self.transcript.lock();
        let keep = transcript.entries.len().saturating_sub(2);
        transcript.entries.truncate(keep);
        transcript
            .entries
            .push(TranscriptEntry::plain(chatbot.user(), input));
        transcript.entries.push(TranscriptEntry::from_reply(&reply));
        Ok(reply)
    }

    /// Summarise the current session.
    ///
    /// # Errors
    /// Gate refusals, store and summariser failures.
    pub async fn summarize_current(&self) -> Result<Option<UnitId>> {
        let chatbot = self.ensure_active().await?;
        let summary = chatbot.lock().await.summarize_current().await?;
        Ok(summary)
    }

    /// Summarise everything pending.
    ///
    /// # Errors
    /// Same as [`Self::summarize_current`].
    pub async fn summarize_all(&self) -> Result<Option<UnitId>> {
        let chatbot = self.ensure_active().await?;
        let summary = chatbot.lock().await.summarize_all().await?;
        Ok(summary)
    }

    // -----------------------------------------------------------------------
    // Sessions
    // -----------------------------------------------------------------------

    /// Open a new session and go `active`.
    ///
    /// # Errors
    /// Busy under any editing status, unavailable before initialisation,
    /// and store failures. A failed start from `closed` stays `closed`.
    pub async fn start_new_session(&self, auto_summarize: bool) -> Result<SessionId> {
        let admission = self.gate.try_enter_write(GateRole::Chat)?;
        let release = |gate: &StatusGate| {
            if admission == Admission::Activated {
                gate.exit_write(GateRole::Chat);
            }
        };
        let chatbot = match self.chatbot() {
            Ok(chatbot) => chatbot,
            Err(e) => {
                release(&self.gate);
                return Err(e);
            }
        };
        match chatbot.lock().await.start_new_session(auto_summarize).await {
            Ok(id) => {
                self.transcript.lock().clear();
                Ok(id)
            }
            Err(e) => {
                warn!("new session failed: {e}");
                release(&self.gate);
                Err(e)
            }
        }
    }

    /// Reopen `id` and replace the transcript with its history.
    ///
    /// # Errors
    /// [`MindflowError::SessionNotFound`] for unknown ids, plus gate
    /// refusals and store failures.
    pub async fn resume_session(&self, id: &SessionId) -> Result<Vec<TranscriptEntry>> {
        let chatbot = self.ensure_active().await?;
        let mut chatbot = chatbot.lock().await;
        let messages = chatbot.resume_session(id).await?;

        let entries: Vec<TranscriptEntry> = messages
            .into_iter()
            .map(|m| TranscriptEntry::plain(m.role, m.content))
            .collect();
        let mut transcript = self.transcript.lock();
        transcript.round = entries.iter().filter(|e| e.role == chatbot.user()).count();
        transcript.entries.clone_from(&entries);
        Ok(entries)
    }

    /// Delete the current session and start over.
    ///
    /// # Errors
    /// Gate refusals and store failures.
    pub async fn clear_session(&self) -> Result<SessionId> {
        let chatbot = self.ensure_active().await?;
        let id = chatbot.lock().await.clear_session().await?;
        self.transcript.lock().clear();
        Ok(id)
    }

    /// Close the live chat and go back to `closed`.
    ///
    /// Returns `false` when there was nothing to close.
    ///
    /// # Errors
    /// Busy while an editor holds the gate, and store failures.
    pub async fn close(&self, auto_summarize: bool) -> Result<bool> {
        match self.gate.status() {
            SystemStatus::Active => {}
            status if status.is_editing() => {
                return Err(MindflowError::Busy { status }.into());
            }
            status => {
                info!(%status, "nothing to close");
                return Ok(false);
            }
        }
        let chatbot = self.chatbot()?;
        chatbot.lock().await.close(auto_summarize).await?;
        self.gate.exit_write(GateRole::Chat);
        self.transcript.lock().clear();
        info!("chat closed");
        Ok(true)
    }

    /// [`Self::close`] with the configured `auto_summarize_on_close`.
    ///
    /// # Errors
    /// Same as [`Self::close`].
    pub async fn close_default(&self) -> Result<bool> {
        let auto_summarize = match self.chatbot() {
            Ok(chatbot) => chatbot.lock().await.auto_summarize_on_close(),
            Err(_) => false,
        };
        self.close(auto_summarize).await
    }

    // -----------------------------------------------------------------------
    // Transcript
    // -----------------------------------------------------------------------

    /// A copy of the UI-visible history.
    #[must_use]
    pub fn history(&self) -> Vec<TranscriptEntry> {
        self.transcript.lock().entries.clone()
    }

    /// Number of completed user rounds.
    #[must_use]
    pub fn round(&self) -> usize {
        self.transcript.lock().round
    }

    // -----------------------------------------------------------------------
    // Administrative access
    // -----------------------------------------------------------------------

    /// Enter an editing mode. Held until [`Self::finish_edit`].
    ///
    /// # Errors
    /// [`ChatError::InvalidRequest`] for [`GateRole::Chat`], and busy
    /// refusals.
    pub fn begin_edit(&self, role: GateRole) -> Result<Admission> {
        if role == GateRole::Chat {
            return Err(ChatError::InvalidRequest(
                "chat is entered through chat operations".into(),
            ));
        }
        Ok(self.gate.try_enter_write(role)?)
    }

    /// Leave an editing mode. Returns whether the status changed.
    pub fn finish_edit(&self, role: GateRole) -> bool {
        self.gate.exit_write(role)
    }

    /// Check that `role`'s data may be read now.
    ///
    /// # Errors
    /// Busy with the blocking status.
    pub fn check_read(&self, role: GateRole) -> Result<()> {
        Ok(self.gate.check_read_allowed(role)?)
    }

    /// Run a one-shot write under `role`, releasing the gate afterwards.
    ///
    /// # Errors
    /// Busy refusals and whatever `write` returns.
    pub fn edit<T>(&self, role: GateRole, write: impl FnOnce() -> Result<T>) -> Result<T> {
        let _scope = self.gate.edit_scope(role)?;
        write()
    }

    /// Reconfigure the generation backend under `config_editing`.
    ///
    /// # Errors
    /// Busy while chat or an editor is live; unavailable before
    /// initialisation.
    pub async fn update_llm_config(&self, base_url: &str, model: &str, api_key: &str) -> Result<bool> {
        let _scope = self.gate.edit_scope(GateRole::ConfigEdit)?;
        let chatbot = self.chatbot()?;
        let accepted = chatbot
            .lock()
            .await
            .update_llm_config(base_url, model, api_key);
        Ok(accepted)
    }
}
