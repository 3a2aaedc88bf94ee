//! Session summaries produced by the generation backend.

use std::sync::Arc;

use async_trait::async_trait;
use mindflow_core::store::SessionSummarizer;
use mindflow_core::{MemoryUnit, MindflowError, PromptMessage};
use mindflow_llm::{ChatMessage, ChatModel, GenerationOptions};
use tracing::debug;

/// [`SessionSummarizer`] that asks a [`ChatModel`] for the summary.
///
/// The configured summarising prompt goes first, then one message from the
/// character carrying the transcript as `source: content` lines.
pub struct LlmSummarizer {
    model: Arc<dyn ChatModel>,
    options: GenerationOptions,
}

impl LlmSummarizer {
    /// Summarise with `model`.
    #[must_use]
    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        Self {
            model,
            options: GenerationOptions::default(),
        }
    }
}

#[async_trait]
impl SessionSummarizer for LlmSummarizer {
    async fn summarize(
        &self,
        role: &str,
        prompt: &[PromptMessage],
        transcript: &[MemoryUnit],
    ) -> mindflow_core::Result<String> {
        let mut messages: Vec<ChatMessage> = prompt
            .iter()
            .map(|m| ChatMessage::named(m.role.clone(), m.content.clone()))
            .collect();
        let lines = transcript
            .iter()
            .map(|u| format!("{}: {}", u.source, u.content))
            .collect::<Vec<_>>()
            .join("\n");
        messages.push(ChatMessage::named(role, lines));

        let completion = self
            .model
            .invoke(&messages, &self.options)
            .await
            .map_err(|e| MindflowError::Store(format!("summarisation failed: {e}")))?;
        debug!(units = transcript.len(), "session summarised");
        Ok(completion.content.trim().to_string())
    }
}
