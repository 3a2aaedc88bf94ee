//! Ordered prompt construction for one roleplay turn.
//!
//! The message order is fixed:
//!
//! ```text
//! task → role info → style → context header → transcript → instruction → user turn
//! ```
//!
//! Recall results always precede style, and style always precedes the
//! transcript. The three leading system messages are omitted only when their
//! content is empty.

use mindflow_core::catalog::RecallLabel;
use mindflow_core::recall::RecallSource;
use mindflow_core::{Embedding, MemoryUnit, MindFlowCache, RecallConfig, RoleState};
use mindflow_llm::ChatMessage;
use mindflow_llm::prompt::{PromptSet, ROLE_INFO_SECTION, STYLE_SECTION, TASK_SECTION};
use tracing::debug;

use crate::error::Result;

/// Role-info body when nothing was recalled.
pub const NO_RESULTS: &str = "无查询结果";

/// Builds the message list handed to the generation backend.
#[derive(Debug, Clone, Default)]
pub struct PromptAssembler {
    prompts: PromptSet,
}

impl PromptAssembler {
    /// Assemble with the given templates.
    #[must_use]
    pub fn new(prompts: PromptSet) -> Self {
        Self { prompts }
    }

    /// The templates in use.
    #[must_use]
    pub fn prompts(&self) -> &PromptSet {
        &self.prompts
    }

    /// Build the full message list for `input`.
    ///
    /// The context window is read once and shared by the short-term query
    /// text and the transcript message.
    ///
    /// # Errors
    /// Embedding and store failures.
    pub async fn build(
        &self,
        recall: &dyn RecallSource,
        state: &RoleState,
        mind_flow: &MindFlowCache,
        input: &str,
        config: &RecallConfig,
    ) -> Result<Vec<ChatMessage>> {
        let context = recall.context_window(config.max_context_length).await?;
        let embedding = recall.embed(input)?;
        let role_info = Self::build_role_info(
            recall, state, mind_flow, &context, input, &embedding, config,
        )
        .await?;
        let style = recall.recall_style(&embedding, config);

        let mut messages = Vec::with_capacity(7);
        let task = self
            .prompts
            .task_description(&state.role, &state.role_description);
        if !task.is_empty() {
            messages.push(ChatMessage::system(format!("{TASK_SECTION}{task}")));
        }
        if !role_info.is_empty() {
            messages.push(ChatMessage::system(format!("{ROLE_INFO_SECTION}{role_info}")));
        }
        let style = self.prompts.style_block(&style);
        if !style.is_empty() {
            messages.push(ChatMessage::system(format!("{STYLE_SECTION}{style}")));
        }
        messages.push(ChatMessage::system(
            self.prompts.context_header(&state.scene_summary),
        ));
        messages.push(context_message(&state.role, &context, mind_flow));
        messages.push(ChatMessage::system(self.prompts.reply_instruction.clone()));
        messages.push(ChatMessage::named(state.user.clone(), input));
        Ok(messages)
    }

    /// Concatenate the recall blocks selected for `input`, whose embedding
    /// the caller has already computed.
    ///
    /// Short-term recall runs first when selected, with its own query text;
    /// long-term recall and attribute lookups follow in label order. Returns
    /// [`NO_RESULTS`] when every block is empty.
    ///
    /// # Errors
    /// Embedding and store failures.
    pub async fn build_role_info(
        recall: &dyn RecallSource,
        state: &RoleState,
        mind_flow: &MindFlowCache,
        context: &[MemoryUnit],
        input: &str,
        embedding: &Embedding,
        config: &RecallConfig,
    ) -> Result<String> {
        let embedding_with_role = recall.embed(&format!("{}说:{input}", state.user))?;
        let mut labels = recall.classify(embedding, config);

        let mut blocks = Vec::new();
        if labels.remove(&RecallLabel::ShortTerm) {
            let query = match stm_query_text(state, mind_flow, context, input) {
                Some(text) => recall.embed(&text)?,
                None => embedding_with_role.clone(),
            };
            blocks.push(recall.recall_short_term(&query, config).await?);
        }
        for label in &labels {
            let block = match label {
                RecallLabel::ShortTerm => continue,
                RecallLabel::LongTerm => {
                    recall.recall_long_term(&embedding_with_role, config).await?
                }
                RecallLabel::Attribute(name) => {
                    recall.recall_attribute(embedding, name, &state.user, config)
                }
            };
            blocks.push(block);
        }

        blocks.retain(|b| !b.is_empty());
        debug!(labels = labels.len(), blocks = blocks.len(), "role info built");
        if blocks.is_empty() {
            Ok(NO_RESULTS.to_string())
        } else {
            Ok(blocks.join("\n"))
        }
    }
}

/// Short-term query text built from the previous exchange, or `None` when
/// there is no context or no recorded reasoning yet.
#[must_use]
pub fn stm_query_text(
    state: &RoleState,
    mind_flow: &MindFlowCache,
    context: &[MemoryUnit],
    input: &str,
) -> Option<String> {
    let last = context.last()?;
    let mind = mind_flow.latest()?;
    Some(format!(
        "{speaker}想:{mind}\n{speaker}说:{content}\n{user}说:{input}",
        speaker = last.source,
        content = last.content,
        user = state.user,
    ))
}

/// Render the rolling context as one system message.
///
/// Lines spoken by `role` are annotated with their stored reasoning when the
/// mind-flow cache still holds it.
#[must_use]
pub fn context_message(role: &str, context: &[MemoryUnit], mind_flow: &MindFlowCache) -> ChatMessage {
    let turns: Vec<String> = context
        .iter()
        .map(|unit| {
            let content = match mind_flow.get(&unit.id) {
                Some(mind) if unit.source == role => {
                    format!("[\"(think: {mind})\",\n \"speak: {}\"]", unit.content)
                }
                _ => format!("[{}]", unit.content),
            };
            format!("{{\n\t{} : {content}\t\n}}", unit.source)
        })
        .collect();
    ChatMessage::system(turns.join("\n"))
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use async_trait::async_trait;
    use chrono::Utc;
    use mindflow_core::{ACTION_SPEAK, UnitId};
    use parking_lot::Mutex;

    use super::*;

    /// Recalls nothing and records every text it embeds.
    #[derive(Default)]
    struct EmptyRecall {
        embedded: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl RecallSource for EmptyRecall {
        fn embed(&self, text: &str) -> mindflow_core::Result<Embedding> {
            self.embedded.lock().push(text.to_string());
            Ok(Embedding(vec![1.0, 0.0]))
        }

        fn classify(&self, _utterance: &Embedding, _config: &RecallConfig) -> BTreeSet<RecallLabel> {
            BTreeSet::new()
        }

        async fn recall_short_term(
            &self,
            _query: &Embedding,
            _config: &RecallConfig,
        ) -> mindflow_core::Result<String> {
            Ok(String::new())
        }

        async fn recall_long_term(
            &self,
            _query: &Embedding,
            _config: &RecallConfig,
        ) -> mindflow_core::Result<String> {
            Ok(String::new())
        }

        fn recall_attribute(
            &self,
            _query: &Embedding,
            _label: &str,
            _user: &str,
            _config: &RecallConfig,
        ) -> String {
            String::new()
        }

        async fn context_window(&self, _length: usize) -> mindflow_core::Result<Vec<MemoryUnit>> {
            Ok(Vec::new())
        }

        fn recall_style(&self, _query: &Embedding, _config: &RecallConfig) -> String {
            String::new()
        }
    }

    fn unit(id: &str, source: &str, content: &str) -> MemoryUnit {
        MemoryUnit {
            id: UnitId::from(id),
            source: source.to_string(),
            content: content.to_string(),
            action: ACTION_SPEAK.to_string(),
            parent_id: None,
            children_ids: Vec::new(),
            rank: 0,
            creation_time: Utc::now(),
        }
    }

    #[test]
    fn context_annotates_role_lines_with_reasoning() {
        let mut mind_flow = MindFlowCache::new(10);
        mind_flow.record(UnitId::from("r1"), "他看起来很累");
        let context = vec![unit("u1", "旅人", "有空房吗"), unit("r1", "艾琳", "有的")];

        let message = context_message("艾琳", &context, &mind_flow);
        assert!(message.is_system());
        assert_eq!(
            message.content,
            "{\n\t旅人 : [有空房吗]\t\n}\n{\n\t艾琳 : [\"(think: 他看起来很累)\",\n \"speak: 有的\"]\t\n}"
        );
    }

    #[test]
    fn reasoning_is_ignored_for_other_speakers() {
        let mut mind_flow = MindFlowCache::new(10);
        mind_flow.record(UnitId::from("u1"), "不该出现");
        let message = context_message("艾琳", &[unit("u1", "旅人", "你好")], &mind_flow);
        assert!(!message.content.contains("think"));
    }

    #[tokio::test]
    async fn utterance_is_embedded_once_per_build() {
        let recall = EmptyRecall::default();
        let state = RoleState::new("旅人", "艾琳", "");
        let mind_flow = MindFlowCache::new(10);

        PromptAssembler::default()
            .build(&recall, &state, &mind_flow, "你好", &RecallConfig::default())
            .await
            .expect("build");

        let embedded = recall.embedded.lock().clone();
        assert_eq!(embedded.iter().filter(|t| t.as_str() == "你好").count(), 1);
        assert_eq!(embedded, vec!["你好".to_string(), "旅人说:你好".to_string()]);
    }

    #[test]
    fn stm_query_text_needs_context_and_reasoning() {
        let state = RoleState::new("旅人", "艾琳", "");
        let mut mind_flow = MindFlowCache::new(10);
        let context = vec![unit("r1", "艾琳", "欢迎")];
        assert!(stm_query_text(&state, &mind_flow, &context, "谢谢").is_none());

        mind_flow.record(UnitId::from("r1"), "客人来了");
        assert_eq!(
            stm_query_text(&state, &mind_flow, &context, "谢谢").as_deref(),
            Some("艾琳想:客人来了\n艾琳说:欢迎\n旅人说:谢谢")
        );
        assert!(stm_query_text(&state, &mind_flow, &[], "谢谢").is_none());
    }
}
