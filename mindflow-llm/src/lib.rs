//! # mindflow-llm: generation backend layer for mindflow
//!
//! Everything that talks to a language model goes through this crate:
//!   - **[`ChatModel`]**: the narrow contract, ordered messages in and raw
//!     text out.
//!   - **[`LlmClient`]**: HTTP implementation for OpenAI-compatible APIs
//!     and Ollama, with retries and per-request timeouts.
//!   - **[`PromptSet`]**: roleplay prompt templates, built-in or from TOML.
//!   - **[`ResponseValidator`]**: `{desc, think, speak}` reply parsing with a
//!     fixed fallback.
//!
//! This crate has no dependency on `mindflow-core`.

#![deny(clippy::unwrap_used)]
#![deny(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod client;
pub mod config;
pub mod error;
pub mod prompt;
pub mod types;
pub mod validator;

pub use client::{ChatModel, LlmClient, LlmProvider};
pub use config::LlmConfig;
pub use error::LlmError;
pub use prompt::PromptSet;
pub use types::{ChatCompletion, ChatMessage, GenerationOptions, RoleplayReply};
pub use validator::ResponseValidator;
