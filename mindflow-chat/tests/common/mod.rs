//! Shared fixtures: a scripted generation backend and a small character.

#![allow(dead_code)]

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use mindflow_chat::{CharacterData, MindflowConfig, RolePlayChatbot};
use mindflow_core::embedding::HashEmbeddingProvider;
use mindflow_core::{InMemoryStore, RoleGraph};
use mindflow_llm::{ChatCompletion, ChatMessage, ChatModel, GenerationOptions, LlmError};
use parking_lot::Mutex;

pub const ROLE: &str = "艾琳";
pub const USER: &str = "旅人";

const ROLE_GRAPH: &str = r#"{
    "roles": {
        "艾琳": {
            "attributes": {
                "喜好": [
                    {"description": "喜欢吃苹果派", "access_rights": "unlimited"},
                    {"description": "讨厌下雨天", "access_rights": "unlimited"}
                ]
            },
            "ideas": {}
        }
    }
}"#;

enum Step {
    Reply(String),
    Fail(String),
}

/// A [`ChatModel`] that answers from a queue, then with numbered replies.
///
/// Every request is recorded so tests can inspect the assembled prompt.
#[derive(Default)]
pub struct ScriptedModel {
    script: Mutex<VecDeque<Step>>,
    calls: Mutex<Vec<Vec<ChatMessage>>>,
}

impl ScriptedModel {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Queue a raw reply.
    pub fn push_reply(&self, raw: impl Into<String>) {
        self.script.lock().push_back(Step::Reply(raw.into()));
    }

    /// Queue a backend failure.
    pub fn push_error(&self, message: &str) {
        self.script.lock().push_back(Step::Fail(message.to_string()));
    }

    /// Every request received so far.
    pub fn calls(&self) -> Vec<Vec<ChatMessage>> {
        self.calls.lock().clone()
    }

    /// The most recent request.
    pub fn last_call(&self) -> Vec<ChatMessage> {
        self.calls.lock().last().cloned().expect("at least one call")
    }
}

/// A well-formed reply numbered `n`.
pub fn reply(n: usize) -> String {
    format!(
        "```json\n{{\"desc\": \"场景{n}\", \"think\": \"想法{n}\", \"speak\": \"回答{n}\"}}\n```"
    )
}

#[async_trait]
impl ChatModel for ScriptedModel {
    async fn invoke(
        &self,
        messages: &[ChatMessage],
        _options: &GenerationOptions,
    ) -> Result<ChatCompletion, LlmError> {
        let n = {
            let mut calls = self.calls.lock();
            calls.push(messages.to_vec());
            calls.len()
        };
        match self.script.lock().pop_front() {
            Some(Step::Reply(raw)) => Ok(ChatCompletion::text(raw)),
            Some(Step::Fail(message)) => Err(LlmError::RequestFailed(message)),
            None => Ok(ChatCompletion::text(reply(n))),
        }
    }

    fn model_name(&self) -> String {
        "scripted".to_string()
    }
}

fn schema(pairs: &[(&str, &[&str])]) -> BTreeMap<String, Vec<String>> {
    pairs
        .iter()
        .map(|(k, v)| ((*k).to_string(), v.iter().map(|s| (*s).to_string()).collect()))
        .collect()
}

pub fn config() -> MindflowConfig {
    let mut config = MindflowConfig::default();
    config.character.role = ROLE.to_string();
    config.character.user = USER.to_string();
    config.character.role_description = "旅店老板娘".to_string();
    config
}

pub fn character_data() -> CharacterData {
    CharacterData {
        role_graph: RoleGraph::from_json(ROLE_GRAPH).expect("graph"),
        query_schema: schema(&[
            ("喜好", &["你喜欢吃什么"]),
            ("短期记忆", &["刚才说了什么"]),
            ("长期记忆", &["我们以前见过吗"]),
        ]),
        answer_schema: schema(&[("你喜欢吃什么", &["当然是苹果派啦！"])]),
    }
}

pub fn store() -> Arc<InMemoryStore> {
    Arc::new(InMemoryStore::new(Arc::new(HashEmbeddingProvider::new(256))))
}

/// A chatbot over a fresh store with an open session.
pub async fn chatbot(model: &Arc<ScriptedModel>) -> (RolePlayChatbot, Arc<InMemoryStore>) {
    let store = store();
    let mut chatbot = RolePlayChatbot::from_config(
        &config(),
        character_data(),
        model.clone(),
        store.clone(),
    )
    .expect("chatbot");
    chatbot.start_new_session(false).await.expect("session");
    (chatbot, store)
}
