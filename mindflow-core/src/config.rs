//! Configuration sections owned by the core.
//!
//! The application-level file (`mindflow.toml` / `config.json`) is assembled
//! in `mindflow-chat`; the recall thresholds, logging and session sections
//! live here so the retrievers can take them by value.

use serde::{Deserialize, Serialize};

use crate::error::{MindflowError, Result};
use crate::types::PromptMessage;

// ---------------------------------------------------------------------------
// Search range
// ---------------------------------------------------------------------------

/// Similarity window `[min, max]` applied to store queries.
///
/// Serialises as a two-element array; a `null` upper bound means unbounded.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "(f32, Option<f32>)", into = "(f32, Option<f32>)")]
pub struct SearchRange {
    /// Inclusive lower bound.
    pub min: f32,
    /// Inclusive upper bound, `None` for unbounded.
    pub max: Option<f32>,
}

impl SearchRange {
    /// A range bounded below only.
    #[must_use]
    pub fn at_least(min: f32) -> Self {
        Self { min, max: None }
    }

    /// Whether `similarity` falls inside the range.
    #[must_use]
    pub fn contains(&self, similarity: f32) -> bool {
        similarity >= self.min && self.max.is_none_or(|max| similarity <= max)
    }
}

impl From<(f32, Option<f32>)> for SearchRange {
    fn from((min, max): (f32, Option<f32>)) -> Self {
        Self { min, max }
    }
}

impl From<SearchRange> for (f32, Option<f32>) {
    fn from(range: SearchRange) -> Self {
        (range.min, range.max)
    }
}

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

/// General process settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Log level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Emit JSON lines instead of human-readable logs.
    #[serde(default)]
    pub log_json: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_json: false,
        }
    }
}

/// Recall limits and thresholds, passed by value into every retrieval call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecallConfig {
    /// Max groups returned by a short-term query.
    #[serde(default = "default_stm_fetch")]
    pub stm_max_fetch_count: usize,
    /// Similarity window for short-term queries.
    #[serde(default = "default_range")]
    pub stm_search_range: SearchRange,
    /// Return the turns surrounding each short-term hit.
    #[serde(default = "default_true")]
    pub stm_recall_context: bool,
    /// Max groups returned by a long-term query.
    #[serde(default = "default_ltm_fetch")]
    pub ltm_max_fetch_count: usize,
    /// Similarity window for long-term queries.
    #[serde(default = "default_range")]
    pub ltm_search_range: SearchRange,
    /// Return the units surrounding each long-term hit.
    #[serde(default = "default_true")]
    pub ltm_recall_context: bool,
    /// Descriptions at or below this similarity are contradictions.
    #[serde(default = "default_contradict")]
    pub attr_contradict_threshold: f32,
    /// Descriptions at or above this similarity are entailed.
    #[serde(default = "default_entail")]
    pub attr_entailment_threshold: f32,
    /// Minimum catalog similarity for a label to be selected.
    #[serde(default = "default_attr_recall")]
    pub recall_attr_threshold: f32,
    /// Minimum question similarity for a style exemplar.
    #[serde(default = "default_style_recall")]
    pub recall_style_threshold: f32,
    /// Context window length and mind-flow capacity.
    #[serde(default = "default_ctx_len")]
    pub max_context_length: usize,
}

impl Default for RecallConfig {
    fn default() -> Self {
        Self {
            stm_max_fetch_count: 3,
            stm_search_range: SearchRange::at_least(0.7),
            stm_recall_context: true,
            ltm_max_fetch_count: 6,
            ltm_search_range: SearchRange::at_least(0.7),
            ltm_recall_context: true,
            attr_contradict_threshold: 0.58,
            attr_entailment_threshold: 0.7,
            recall_attr_threshold: 0.65,
            recall_style_threshold: 0.7,
            max_context_length: 10,
        }
    }
}

impl RecallConfig {
    /// Reject values that would make recall meaningless.
    ///
    /// # Errors
    /// Returns [`MindflowError::Config`] naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        let thresholds = [
            ("attr_contradict_threshold", self.attr_contradict_threshold),
            ("attr_entailment_threshold", self.attr_entailment_threshold),
            ("recall_attr_threshold", self.recall_attr_threshold),
            ("recall_style_threshold", self.recall_style_threshold),
        ];
        for (name, value) in thresholds {
            if !(-1.0..=1.0).contains(&value) {
                return Err(MindflowError::Config(format!(
                    "{name} must be within [-1, 1], got {value}"
                )));
            }
        }
        if self.attr_contradict_threshold > self.attr_entailment_threshold {
            return Err(MindflowError::Config(format!(
                "attr_contradict_threshold ({}) exceeds attr_entailment_threshold ({})",
                self.attr_contradict_threshold, self.attr_entailment_threshold
            )));
        }
        if self.max_context_length == 0 {
            return Err(MindflowError::Config(
                "max_context_length must be positive".to_string(),
            ));
        }
        if self.stm_max_fetch_count == 0 || self.ltm_max_fetch_count == 0 {
            return Err(MindflowError::Config(
                "fetch counts must be positive".to_string(),
            ));
        }
        for (name, range) in [
            ("stm_search_range", self.stm_search_range),
            ("ltm_search_range", self.ltm_search_range),
        ] {
            if range.max.is_some_and(|max| max < range.min) {
                return Err(MindflowError::Config(format!(
                    "{name} is inverted: [{}, {:?}]",
                    range.min, range.max
                )));
            }
        }
        Ok(())
    }
}

/// Session summarisation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Messages handed to the store's summariser.
    #[serde(default = "default_summarizing_prompt")]
    pub summarizing_prompt: Vec<PromptMessage>,
    /// Summarise the session automatically on close.
    #[serde(default)]
    pub auto_summarize_on_close: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            summarizing_prompt: default_summarizing_prompt(),
            auto_summarize_on_close: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Default value helpers (for serde)
// ---------------------------------------------------------------------------

fn default_true() -> bool {
    true
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_stm_fetch() -> usize {
    3
}
fn default_ltm_fetch() -> usize {
    6
}
fn default_range() -> SearchRange {
    SearchRange::at_least(0.7)
}
fn default_contradict() -> f32 {
    0.58
}
fn default_entail() -> f32 {
    0.7
}
fn default_attr_recall() -> f32 {
    0.65
}
fn default_style_recall() -> f32 {
    0.7
}
fn default_ctx_len() -> usize {
    10
}
fn default_summarizing_prompt() -> Vec<PromptMessage> {
    vec![PromptMessage::new(
        "system",
        "客观总结以下对话，保留人物、地点、事件与情绪变化，不超过200字。",
    )]
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_table() {
        let cfg = RecallConfig::default();
        assert_eq!(cfg.stm_max_fetch_count, 3);
        assert_eq!(cfg.ltm_max_fetch_count, 6);
        assert_eq!(cfg.stm_search_range, SearchRange::at_least(0.7));
        assert!(cfg.stm_recall_context && cfg.ltm_recall_context);
        assert!((cfg.attr_contradict_threshold - 0.58).abs() < f32::EPSILON);
        assert!((cfg.attr_entailment_threshold - 0.7).abs() < f32::EPSILON);
        assert!((cfg.recall_attr_threshold - 0.65).abs() < f32::EPSILON);
        assert!((cfg.recall_style_threshold - 0.7).abs() < f32::EPSILON);
        assert_eq!(cfg.max_context_length, 10);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn empty_toml_yields_defaults() {
        let cfg: RecallConfig = toml::from_str("").expect("parse");
        assert_eq!(cfg.max_context_length, 10);
    }

    #[test]
    fn search_range_round_trips_as_pair() {
        let cfg: RecallConfig =
            serde_json::from_str(r#"{"stm_search_range": [0.6, null], "ltm_search_range": [0.5, 0.9]}"#)
                .expect("parse");
        assert_eq!(cfg.stm_search_range, SearchRange::at_least(0.6));
        assert_eq!(cfg.ltm_search_range.max, Some(0.9));
        let json = serde_json::to_value(cfg.stm_search_range).expect("serialize");
        assert_eq!(json, serde_json::json!([0.6_f32, null]));
    }

    #[test]
    fn search_range_contains() {
        let open = SearchRange::at_least(0.7);
        assert!(open.contains(0.7));
        assert!(open.contains(1.0));
        assert!(!open.contains(0.69));
        let closed = SearchRange { min: 0.2, max: Some(0.4) };
        assert!(closed.contains(0.4));
        assert!(!closed.contains(0.41));
    }

    #[test]
    fn validate_rejects_crossed_thresholds() {
        let cfg = RecallConfig {
            attr_contradict_threshold: 0.8,
            ..RecallConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(MindflowError::Config(_))));
    }

    #[test]
    fn validate_rejects_zero_context() {
        let cfg = RecallConfig {
            max_context_length: 0,
            ..RecallConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validate_rejects_inverted_range() {
        let cfg = RecallConfig {
            ltm_search_range: SearchRange { min: 0.9, max: Some(0.1) },
            ..RecallConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn session_prompt_parses_from_list() {
        let cfg: SessionConfig = serde_json::from_str(
            r#"{"summarizing_prompt": [{"role": "system", "content": "总结"}]}"#,
        )
        .expect("parse");
        assert_eq!(cfg.summarizing_prompt, vec![PromptMessage::new("system", "总结")]);
        assert!(!cfg.auto_summarize_on_close);
    }
}
