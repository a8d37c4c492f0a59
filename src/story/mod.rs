//! Story content: scenes, choices and the moods used to bias generation
//!
//! Static stories live in [`StoryStore`]; dynamic scenes come from
//! [`SceneGenerator`], which always hands back a usable scene.

pub mod emotion;
pub mod generator;
pub mod llm;
pub mod store;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub use emotion::EmotionClassifier;
pub use generator::{SceneGenerator, fallback_scene, opening_scene};
pub use llm::{ChatCompletionClient, TextGenerator};
pub use store::StoryStore;

/// Scene id used when a user has no recorded progress
pub const START_SCENE_ID: &str = "start";

/// A node in the story graph
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scene {
    /// Unique within a story
    #[serde(rename = "scene_id", default)]
    pub id: String,

    #[serde(default)]
    pub title: String,

    /// Text read aloud to the player
    #[serde(default)]
    pub narrative: String,

    /// Background sound description
    #[serde(default)]
    pub ambience: String,

    /// Outgoing options; empty for terminal scenes
    #[serde(default)]
    pub choices: Vec<Choice>,
}

impl Scene {
    /// Find a choice by id
    #[must_use]
    pub fn choice(&self, choice_id: &str) -> Option<&Choice> {
        self.choices.iter().find(|c| c.id == choice_id)
    }

    /// Whether the scene ends the story
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.choices.is_empty()
    }
}

/// A labeled option on a scene
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Choice {
    pub id: String,
    pub text: String,

    /// Successor scene id. Not guaranteed to exist in the story.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_scene: Option<String>,
}

/// Emotional tone label used to bias generated narrative
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mood {
    Happy,
    Sad,
    Angry,
    Scared,
    Curious,
    Excited,
    Confused,
    #[default]
    Neutral,
    Surprised,
}

impl Mood {
    pub const ALL: [Self; 9] = [
        Self::Happy,
        Self::Sad,
        Self::Angry,
        Self::Scared,
        Self::Curious,
        Self::Excited,
        Self::Confused,
        Self::Neutral,
        Self::Surprised,
    ];

    /// Parse a free-form label, mapping anything outside the set to `Neutral`
    #[must_use]
    pub fn normalize(label: &str) -> Self {
        label.parse().unwrap_or_default()
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Happy => "happy",
            Self::Sad => "sad",
            Self::Angry => "angry",
            Self::Scared => "scared",
            Self::Curious => "curious",
            Self::Excited => "excited",
            Self::Confused => "confused",
            Self::Neutral => "neutral",
            Self::Surprised => "surprised",
        }
    }

    /// Instruction appended to generation prompts for this mood
    #[must_use]
    pub const fn tone_modifier(self) -> &'static str {
        match self {
            Self::Happy => "Make the scene uplifting and positive, with hopeful elements.",
            Self::Sad => "Add melancholic elements to the scene, with a touch of hope.",
            Self::Angry => "Add intensity to the scene with opportunities to overcome challenges.",
            Self::Scared => {
                "Soften the tension slightly while maintaining the adventure atmosphere."
            }
            Self::Curious => "Add more mysteries and discoverable elements to the scene.",
            Self::Excited => "Amplify the adventure elements with thrilling discoveries.",
            Self::Confused => "Provide clearer explanations and simpler choices.",
            Self::Neutral => {
                "Maintain a balanced tone with equal elements of mystery and clarity."
            }
            Self::Surprised => {
                "Add unexpected elements that capitalize on the user's sense of wonder."
            }
        }
    }
}

impl fmt::Display for Mood {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mood {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let label = s.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|m| m.as_str() == label)
            .ok_or(())
    }
}
