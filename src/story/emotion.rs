//! Emotion classification of player utterances

use std::sync::Arc;

use super::{Mood, TextGenerator};

/// Classifies the emotional tone of text, defaulting to neutral
#[derive(Clone)]
pub struct EmotionClassifier {
    llm: Option<Arc<dyn TextGenerator>>,
}

impl EmotionClassifier {
    #[must_use]
    pub fn new(llm: Arc<dyn TextGenerator>) -> Self {
        Self { llm: Some(llm) }
    }

    /// Classifier with no service; every input is neutral
    #[must_use]
    pub const fn disabled() -> Self {
        Self { llm: None }
    }

    /// Classify `text` into one of the known moods
    ///
    /// Empty input, a missing service, a failed request or an answer outside the
    /// mood set all produce [`Mood::Neutral`].
    pub async fn classify(&self, text: &str) -> Mood {
        if text.trim().is_empty() {
            return Mood::Neutral;
        }

        let Some(llm) = &self.llm else {
            return Mood::Neutral;
        };

        let labels: Vec<&str> = Mood::ALL.iter().map(|m| m.as_str()).collect();
        let prompt = format!(
            "Analyze the following text and determine the primary emotional state expressed.\n\
             Classify the emotion as one of the following: {}.\n\n\
             Text: \"{text}\"\n\n\
             Return only the emotion name, with no additional text or explanation.",
            labels.join(", ")
        );

        match llm.complete(&prompt).await {
            Ok(answer) => {
                let mood = Mood::normalize(&answer);
                tracing::debug!(answer = %answer.trim(), %mood, "classified emotion");
                mood
            }
            Err(e) => {
                tracing::warn!(error = %e, "emotion classification failed, assuming neutral");
                Mood::Neutral
            }
        }
    }
}
