//! Core types for chat requests and responses.

use serde::{Deserialize, Serialize};

/// Role of the built-in system speaker.
pub const ROLE_SYSTEM: &str = "system";
/// Role of a generic human speaker.
pub const ROLE_USER: &str = "user";
/// Role of the model itself.
pub const ROLE_ASSISTANT: &str = "assistant";

/// One message of an ordered prompt.
///
/// `role` is free text: besides `system`/`user`/`assistant`, a speaker may
/// be named (the user's display name for the new turn).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Speaker role or name.
    pub role: String,
    /// Message text.
    pub content: String,
}

impl ChatMessage {
    /// A system message.
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self::named(ROLE_SYSTEM, content)
    }

    /// A message from a generic user.
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self::named(ROLE_USER, content)
    }

    /// A message from a named speaker.
    #[must_use]
    pub fn named(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }

    /// Whether this is a system message.
    #[must_use]
    pub fn is_system(&self) -> bool {
        self.role == ROLE_SYSTEM
    }

    /// The role as sent to chat-completion APIs, which only accept the three
    /// standard roles. Named speakers are sent as `user`.
    #[must_use]
    pub fn wire_role(&self) -> &str {
        match self.role.as_str() {
            ROLE_SYSTEM => ROLE_SYSTEM,
            ROLE_ASSISTANT => ROLE_ASSISTANT,
            _ => ROLE_USER,
        }
    }
}

/// Per-call overrides of the client's sampling settings.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct GenerationOptions {
    /// Sampling temperature.
    pub temperature: Option<f32>,
    /// Maximum tokens to generate.
    pub max_tokens: Option<u32>,
}

/// A completed generation.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ChatCompletion {
    /// The generated text.
    pub content: String,
    /// How many tokens were generated, when reported.
    pub tokens_generated: u32,
    /// Latency in milliseconds.
    pub latency_ms: u64,
    /// Which model was used.
    pub model: String,
}

impl ChatCompletion {
    /// A completion with only text, as produced by scripted backends.
    #[must_use]
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            tokens_generated: 0,
            latency_ms: 0,
            model: String::new(),
        }
    }
}

/// Structured roleplay reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleplayReply {
    /// Objective summary of the scene so far.
    pub desc: String,
    /// The character's private reasoning.
    pub think: String,
    /// The spoken line, free of parenthetical stage directions.
    pub speak: String,
}
