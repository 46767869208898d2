//! Answer synthesis from retrieved passages.
//!
//! An [`AnswerSynthesizer`] turns a question and the passages retrieved for it
//! into an answer. It reports which passages it drew on as indices into the
//! passage slice, so the engine can only ever attribute an answer to segments
//! that were actually retrieved.
//!
//! Two synthesizers are provided:
//!
//! - [`ExcerptSynthesizer`] answers with an excerpt of the best passage and
//!   needs no model.
//! - [`ModelSynthesizer`] stuffs the passages into a prompt for a
//!   [`LanguageModel`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::document::{SearchResult, Turn};
use crate::error::Result;

/// Message returned by [`ExcerptSynthesizer`] when nothing was retrieved.
pub const NO_PASSAGES_MESSAGE: &str = "No relevant passages were found in the indexed documents.";

/// An answer and the passages it was built from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Synthesis {
    /// The answer text.
    pub text: String,
    /// Indices into the passages handed to the synthesizer.
    pub used: Vec<usize>,
}

/// Produces an answer from a question and retrieved passages.
#[async_trait]
pub trait AnswerSynthesizer: Send + Sync {
    /// Answer `question` from `passages`, which are ordered by relevance.
    ///
    /// `history` holds earlier turns of the conversation, oldest first.
    async fn synthesize(
        &self,
        question: &str,
        history: &[Turn],
        passages: &[SearchResult],
    ) -> Result<Synthesis>;

    /// Name used in logs and errors.
    fn name(&self) -> &str;
}

/// Answers with a window of text around the first question keyword found.
///
/// Keywords are the question's words of four or more characters, compared
/// case-insensitively. The first passage in rank order containing one is
/// excerpted; if none does, the top passage is returned whole.
#[derive(Debug, Clone)]
pub struct ExcerptSynthesizer {
    window_chars: usize,
}

impl ExcerptSynthesizer {
    /// Default excerpt length in characters.
    pub const DEFAULT_WINDOW_CHARS: usize = 400;

    /// Create a synthesizer returning excerpts of at most `window_chars`
    /// characters.
    pub fn new(window_chars: usize) -> Self {
        Self { window_chars: window_chars.max(1) }
    }

    /// Excerpt length in characters.
    pub fn window_chars(&self) -> usize {
        self.window_chars
    }

    fn keywords(question: &str) -> Vec<Vec<char>> {
        let mut keywords: Vec<Vec<char>> = Vec::new();
        for word in question.split(|c: char| !c.is_alphanumeric()) {
            let lowered: Vec<char> = word.chars().map(fold_case).collect();
            if lowered.len() >= 4 && !keywords.contains(&lowered) {
                keywords.push(lowered);
            }
        }
        keywords
    }

    /// Char index of the earliest keyword occurrence in `text`.
    fn find_keyword(text: &[char], keywords: &[Vec<char>]) -> Option<usize> {
        keywords
            .iter()
            .filter_map(|keyword| text.windows(keyword.len()).position(|w| w == keyword.as_slice()))
            .min()
    }

    fn excerpt(&self, chars: &[char], hit: usize) -> String {
        if chars.len() <= self.window_chars {
            return chars.iter().collect::<String>().trim().to_string();
        }

        let start = hit.saturating_sub(self.window_chars / 2).min(chars.len() - self.window_chars);
        let end = start + self.window_chars;
        let body: String = chars[start..end].iter().collect();

        let mut excerpt = String::new();
        if start > 0 {
            excerpt.push_str("...");
        }
        excerpt.push_str(body.trim());
        if end < chars.len() {
            excerpt.push_str("...");
        }
        excerpt
    }
}

impl Default for ExcerptSynthesizer {
    fn default() -> Self {
        Self::new(Self::DEFAULT_WINDOW_CHARS)
    }
}

fn fold_case(c: char) -> char {
    c.to_lowercase().next().unwrap_or(c)
}

#[async_trait]
impl AnswerSynthesizer for ExcerptSynthesizer {
    async fn synthesize(
        &self,
        question: &str,
        _history: &[Turn],
        passages: &[SearchResult],
    ) -> Result<Synthesis> {
        let Some(top) = passages.first() else {
            return Ok(Synthesis { text: NO_PASSAGES_MESSAGE.to_string(), used: Vec::new() });
        };

        let keywords = Self::keywords(question);
        for (index, passage) in passages.iter().enumerate() {
            let chars: Vec<char> = passage.segment.text.chars().collect();
            let folded: Vec<char> = chars.iter().copied().map(fold_case).collect();
            if let Some(hit) = Self::find_keyword(&folded, &keywords) {
                return Ok(Synthesis { text: self.excerpt(&chars, hit), used: vec![index] });
            }
        }

        Ok(Synthesis { text: top.segment.text.trim().to_string(), used: vec![0] })
    }

    fn name(&self) -> &str {
        "excerpt"
    }
}

/// A prompt for a [`LanguageModel`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Prompt {
    /// Instructions for the model.
    pub system: String,
    /// Earlier conversation turns, oldest first.
    pub history: Vec<Turn>,
    /// The message to answer.
    pub user: String,
}

/// A text-generation backend.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Generate a completion for `prompt`.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Synthesis`](crate::RagError::Synthesis) when the
    /// backend fails or returns no text.
    async fn complete(&self, prompt: &Prompt) -> Result<String>;

    /// Model identifier.
    fn model(&self) -> &str;
}

const GROUNDED_INSTRUCTIONS: &str = "You are a helpful assistant. Answer the question using the \
numbered context passages. If the passages do not contain the answer, say that you do not know. \
Keep the answer concise.";

const UNGROUNDED_INSTRUCTIONS: &str = "You are a helpful assistant. Answer the question concisely.";

/// Answers by prompting a [`LanguageModel`] with the retrieved passages.
///
/// Every passage is included in the prompt, so every passage is reported as
/// used.
pub struct ModelSynthesizer<M> {
    model: M,
}

impl<M: LanguageModel> ModelSynthesizer<M> {
    /// Wrap `model`.
    pub fn new(model: M) -> Self {
        Self { model }
    }

    /// Build the prompt sent to the model.
    pub fn prompt(question: &str, history: &[Turn], passages: &[SearchResult]) -> Prompt {
        if passages.is_empty() {
            return Prompt {
                system: UNGROUNDED_INSTRUCTIONS.to_string(),
                history: history.to_vec(),
                user: question.to_string(),
            };
        }

        let mut user = String::from("Context:\n");
        for (i, passage) in passages.iter().enumerate() {
            let reference = passage.segment.metadata.source_ref();
            user.push_str(&format!(
                "[{}] ({}, {})\n{}\n\n",
                i + 1,
                reference.source,
                reference.locator,
                passage.segment.text.trim()
            ));
        }
        user.push_str("Question: ");
        user.push_str(question);

        Prompt { system: GROUNDED_INSTRUCTIONS.to_string(), history: history.to_vec(), user }
    }
}

#[async_trait]
impl<M: LanguageModel> AnswerSynthesizer for ModelSynthesizer<M> {
    async fn synthesize(
        &self,
        question: &str,
        history: &[Turn],
        passages: &[SearchResult],
    ) -> Result<Synthesis> {
        let prompt = Self::prompt(question, history, passages);
        let text = self.model.complete(&prompt).await?;
        Ok(Synthesis { text: text.trim().to_string(), used: (0..passages.len()).collect() })
    }

    fn name(&self) -> &str {
        self.model.model()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::document::{Locator, Segment, SourceMetadata};

    fn passage(source: &str, text: &str) -> SearchResult {
        let metadata =
            SourceMetadata { source: source.into(), locator: Locator::Page(2), start: 0, end: 1 };
        SearchResult { segment: Segment::new(text, metadata), score: 0.5 }
    }

    #[tokio::test]
    async fn excerpt_prefers_first_passage_with_a_keyword() {
        let passages = vec![
            passage("a.pdf", "Nothing relevant here."),
            passage("b.pdf", "Rest the RIBEYE for five minutes before slicing."),
        ];
        let synthesis = ExcerptSynthesizer::default()
            .synthesize("How long should a ribeye rest?", &[], &passages)
            .await
            .unwrap();

        assert_eq!(synthesis.used, vec![1]);
        assert_eq!(synthesis.text, "Rest the RIBEYE for five minutes before slicing.");
    }

    #[tokio::test]
    async fn excerpt_windows_long_passages_around_the_hit() {
        let text = format!("{}brisket{}", "x".repeat(500), "y".repeat(500));
        let synthesis = ExcerptSynthesizer::new(20)
            .synthesize("brisket?", &[], &[passage("a.txt", &text)])
            .await
            .unwrap();

        assert!(synthesis.text.starts_with("..."));
        assert!(synthesis.text.ends_with("..."));
        assert!(synthesis.text.contains("brisket"));
        assert_eq!(synthesis.text.chars().count(), 26);
    }

    #[tokio::test]
    async fn excerpt_falls_back_to_top_passage() {
        let passages = vec![passage("a.txt", " first "), passage("b.txt", "second")];
        let synthesis =
            ExcerptSynthesizer::default().synthesize("why?", &[], &passages).await.unwrap();

        assert_eq!(synthesis, Synthesis { text: "first".into(), used: vec![0] });
    }

    #[tokio::test]
    async fn excerpt_without_passages_has_no_sources() {
        let synthesis =
            ExcerptSynthesizer::default().synthesize("anything", &[], &[]).await.unwrap();
        assert_eq!(synthesis.text, NO_PASSAGES_MESSAGE);
        assert!(synthesis.used.is_empty());
    }

    struct RecordingModel {
        prompts: Mutex<Vec<Prompt>>,
    }

    #[async_trait]
    impl LanguageModel for RecordingModel {
        async fn complete(&self, prompt: &Prompt) -> Result<String> {
            self.prompts.lock().unwrap().push(prompt.clone());
            Ok("  grounded answer \n".to_string())
        }

        fn model(&self) -> &str {
            "recording"
        }
    }

    #[tokio::test]
    async fn model_synthesizer_stuffs_numbered_passages() {
        let synthesizer = ModelSynthesizer::new(RecordingModel { prompts: Mutex::new(Vec::new()) });
        let history = vec![Turn { question: "hi".into(), answer: "hello".into() }];
        let passages = vec![passage("guide.pdf", "Sear first."), passage("notes.txt", "Rest after.")];

        let synthesis = synthesizer.synthesize("What next?", &history, &passages).await.unwrap();
        assert_eq!(synthesis, Synthesis { text: "grounded answer".into(), used: vec![0, 1] });

        let prompts = synthesizer.model.prompts.lock().unwrap();
        let prompt = &prompts[0];
        assert_eq!(prompt.history, history);
        assert!(prompt.user.contains("[1] (guide.pdf, page 2)\nSear first."));
        assert!(prompt.user.contains("[2] (notes.txt, page 2)\nRest after."));
        assert!(prompt.user.ends_with("Question: What next?"));
    }

    #[test]
    fn prompt_without_passages_is_the_bare_question() {
        let prompt = ModelSynthesizer::<RecordingModel>::prompt("Why?", &[], &[]);
        assert_eq!(prompt.user, "Why?");
        assert_eq!(prompt.system, UNGROUNDED_INSTRUCTIONS);
    }
}
