//! Speaking-style exemplar recall.
//!
//! The answer schema maps standard questions to exemplar answers in the
//! character's voice. Questions close to the utterance contribute their
//! exemplars to the style message.

use std::collections::BTreeMap;

use ordered_float::OrderedFloat;

use crate::embedding::{EmbeddingMatrix, EmbeddingProvider};
use crate::error::Result;
use crate::types::Embedding;

/// Sentinel rendered when no exemplar matches.
pub const NO_STYLE: &str = "暂无";

/// Number of matching questions whose answers are rendered.
const TOP_QUESTIONS: usize = 2;

/// Exemplar answers plus the embedding of each standard question.
#[derive(Debug, Clone, Default)]
pub struct StyleRetriever {
    questions: Vec<String>,
    answers: Vec<Vec<String>>,
    embeddings: EmbeddingMatrix,
}

impl StyleRetriever {
    /// Embed every question of a `{question -> [answer]}` schema.
    ///
    /// # Errors
    /// Propagates embedding failures.
    pub fn build(
        answer_schema: BTreeMap<String, Vec<String>>,
        embedder: &dyn EmbeddingProvider,
    ) -> Result<Self> {
        let (questions, answers): (Vec<String>, Vec<Vec<String>>) =
            answer_schema.into_iter().unzip();
        let texts: Vec<&str> = questions.iter().map(String::as_str).collect();
        let embeddings = EmbeddingMatrix::build(embedder, &texts)?;
        Ok(Self {
            questions,
            answers,
            embeddings,
        })
    }

    /// Render the top two matching answer lists, or [`NO_STYLE`].
    #[must_use]
    pub fn recall(&self, utterance: &Embedding, threshold: f32) -> String {
        let mut hits: Vec<(usize, f32)> = self
            .embeddings
            .scores(utterance)
            .into_iter()
            .enumerate()
            .filter(|(_, sim)| *sim >= threshold)
            .collect();
        if hits.is_empty() {
            return NO_STYLE.to_string();
        }
        hits.sort_by_key(|(_, sim)| std::cmp::Reverse(OrderedFloat(*sim)));

        let blocks: Vec<String> = hits
            .iter()
            .take(TOP_QUESTIONS)
            .filter_map(|(idx, _)| serde_json::to_string(&self.answers[*idx]).ok())
            .collect();
        format!("(\n\t{}\t\n)", blocks.join("\n"))
    }

    /// Standard questions in schema order.
    #[must_use]
    pub fn questions(&self) -> &[String] {
        &self.questions
    }
}
