//! # mindflow core library
//!
//! Retrieval and turn-state primitives for a roleplay character that speaks
//! from layered memory:
//!
//! - **Short-term memory**: the recent-turn window of the current session
//! - **Long-term memory**: persisted, cross-session units and their summaries
//! - **Attributes**: role-graph descriptions, split into entailed and
//!   contradicting facts for the current utterance
//! - **Style**: exemplar answers in the character's voice
//! - **Mind-flow**: a bounded FIFO of the character's private reasoning
//!
//! A process-wide [`StatusGate`] serialises live chat against the
//! administrative edit modes.
//!
//! The memory store and the embedding model are collaborators consumed
//! through [`MemoryStore`] and [`EmbeddingProvider`]; [`InMemoryStore`] is an
//! in-process reference store.

#![deny(clippy::unwrap_used)]
#![deny(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod attributes;
pub mod catalog;
pub mod config;
pub mod embedding;
pub mod error;
pub mod mind_flow;
pub mod recall;
pub mod role_graph;
pub mod status;
pub mod store;
pub mod style;
pub mod types;

pub use attributes::{AttributeIndex, AttributeRecall, classify_descriptions};
pub use catalog::{QueryCatalog, RecallLabel};
pub use config::{GeneralConfig, RecallConfig, SearchRange, SessionConfig};
pub use embedding::EmbeddingProvider;
pub use error::{MindflowError, Result};
pub use mind_flow::{BoundedFifoMap, MindFlowCache};
pub use recall::{MemoryRetriever, RecallSource};
pub use role_graph::RoleGraph;
pub use status::{Admission, EditScope, GateRole, StatusGate, SystemStatus};
pub use store::{InMemoryStore, MemoryQuery, MemoryStore, SessionSummarizer};
pub use style::StyleRetriever;
pub use types::*;
