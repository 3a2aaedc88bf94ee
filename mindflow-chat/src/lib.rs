//! # mindflow-chat: roleplay turns over layered memory
//!
//! This crate wires the retrieval primitives of `mindflow-core` to the
//! generation backend of `mindflow-llm` and exposes a status-gated chat
//! service.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │              ChatService                 │
//! │   StatusGate · transcript · round       │
//! │  ┌───────────────────────────────────┐  │
//! │  │        RolePlayChatbot            │  │
//! │  │  ┌─────────────┐ ┌─────────────┐ │  │
//! │  │  │  Assembler  │ │  Validator  │ │  │
//! │  │  └──────┬──────┘ └──────┬──────┘ │  │
//! │  │         ▼               ▼         │  │
//! │  │    ┌─────────────────────────┐    │  │
//! │  │    │  mindflow-core (recall) │    │  │
//! │  │    └─────────────────────────┘    │  │
//! │  │    ┌─────────────────────────┐    │  │
//! │  │    │  mindflow-llm (model)   │    │  │
//! │  │    └─────────────────────────┘    │  │
//! │  └───────────────────────────────────┘  │
//! └─────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - `assembler`: ordered prompt construction
//! - `chatbot`: the turn orchestrator and session lifecycle
//! - `service`: status-gated facade with the UI transcript mirror
//! - `config`: application configuration with path placeholders
//! - `schemas`: role graph and schema file loading
//! - `summarizer`: session summaries through the generation backend
//! - `telemetry`: tracing bootstrap

#![deny(clippy::unwrap_used)]
#![deny(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod assembler;
pub mod chatbot;
pub mod config;
pub mod error;
pub mod schemas;
pub mod service;
pub mod summarizer;
pub mod telemetry;

pub use assembler::PromptAssembler;
pub use chatbot::{ChatReply, RoleDescriber, RolePlayChatbot};
pub use config::{CharacterConfig, DataConfig, MindflowConfig};
pub use error::{ChatError, Result};
pub use schemas::CharacterData;
pub use service::{ChatService, TranscriptEntry};
pub use summarizer::LlmSummarizer;
pub use telemetry::init_tracing;
