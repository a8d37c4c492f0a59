//! Dynamic scene generation with a fixed fallback
//!
//! The generator never fails: any problem with the text service or its answer
//! produces a stock scene instead.

use std::collections::HashSet;
use std::sync::Arc;

use super::{Choice, Mood, Scene, TextGenerator};
use crate::{Error, Result};

/// Id of the scene returned when generation fails
pub const FALLBACK_SCENE_ID: &str = "fallback_scene";

const SCENE_FORMAT: &str = r#"Return the scene in this JSON format:
{
  "scene_id": "unique_id",
  "title": "Scene Title",
  "narrative": "Detailed scene description that can be read aloud...",
  "ambience": "Description of background sounds",
  "choices": [
    {"id": "choice1_id", "text": "First choice description"},
    {"id": "choice2_id", "text": "Second choice description"},
    {"id": "choice3_id", "text": "Optional third choice description"}
  ]
}"#;

/// Produces new scenes through an external text generator
#[derive(Clone)]
pub struct SceneGenerator {
    llm: Option<Arc<dyn TextGenerator>>,
}

impl SceneGenerator {
    /// Create a generator backed by a text service
    #[must_use]
    pub fn new(llm: Arc<dyn TextGenerator>) -> Self {
        Self { llm: Some(llm) }
    }

    /// Generator with no service configured; always yields fallback scenes
    #[must_use]
    pub const fn disabled() -> Self {
        Self { llm: None }
    }

    /// Whether a text service is configured
    #[must_use]
    pub const fn is_configured(&self) -> bool {
        self.llm.is_some()
    }

    /// Generate the scene following a choice
    pub async fn generate(
        &self,
        previous_summary: Option<&str>,
        chosen: Option<&Choice>,
        mood: Option<Mood>,
    ) -> Scene {
        let prompt = build_prompt(previous_summary, chosen, mood);
        match self.request_scene(&prompt).await {
            Ok(scene) => scene,
            Err(e) => {
                tracing::warn!(error = %e, "scene generation failed, using fallback scene");
                fallback_scene()
            }
        }
    }

    /// Generate the first scene of a new adventure
    pub async fn generate_opening(&self) -> Scene {
        let prompt = format!(
            "Generate the first scene of an interactive audio quest adventure.\n\
             The scene should be detailed, immersive, and include ambient sound descriptions.\n\
             It should set up an intriguing beginning to a fantasy adventure.\n\
             Use \"start\" as the scene_id.\n\n{SCENE_FORMAT}"
        );
        match self.request_scene(&prompt).await {
            Ok(scene) => scene,
            Err(e) => {
                tracing::warn!(error = %e, "opening generation failed, using default opening");
                opening_scene()
            }
        }
    }

    async fn request_scene(&self, prompt: &str) -> Result<Scene> {
        let llm = self
            .llm
            .as_ref()
            .ok_or_else(|| Error::Config("no text generator configured".to_string()))?;

        tracing::debug!(provider = llm.name(), "requesting scene");
        let text = llm.complete(prompt).await?;
        parse_scene(&text)
    }
}

/// Build the generation prompt from whichever inputs are present
#[must_use]
pub fn build_prompt(
    previous_summary: Option<&str>,
    chosen: Option<&Choice>,
    mood: Option<Mood>,
) -> String {
    let mut prompt = String::from("Generate an interactive audio quest scene in JSON format.");

    if let Some(summary) = previous_summary.filter(|s| !s.trim().is_empty()) {
        prompt.push_str("\n\nPrevious scene summary: ");
        prompt.push_str(summary);
    }

    if let Some(choice) = chosen {
        prompt.push_str("\n\nUser chose: ");
        prompt.push_str(&choice.text);
    }

    if let Some(mood) = mood {
        prompt.push_str(&format!(
            "\n\nUser's emotional state: {mood}. {}",
            mood.tone_modifier()
        ));
    }

    prompt.push_str(
        "\n\nThe scene should be detailed, immersive, and include ambient sound descriptions.\n",
    );
    prompt.push_str(SCENE_FORMAT);
    prompt
}

/// Remove a surrounding ```` ```json ```` (or bare ```` ``` ````) fence
#[must_use]
pub fn strip_code_fence(text: &str) -> &str {
    for marker in ["```json", "```"] {
        if let Some(start) = text.find(marker) {
            let rest = &text[start + marker.len()..];
            if let Some(end) = rest.find("```") {
                return rest[..end].trim();
            }
        }
    }
    text.trim()
}

/// Parse and validate a generated scene
///
/// # Errors
///
/// Returns error if the text is not JSON or the scene fails validation
pub fn parse_scene(text: &str) -> Result<Scene> {
    let scene: Scene = serde_json::from_str(strip_code_fence(text))?;
    validate_scene(&scene)?;
    Ok(scene)
}

fn validate_scene(scene: &Scene) -> Result<()> {
    let blank = |s: &str| s.trim().is_empty();

    if blank(&scene.id) {
        return Err(Error::InvalidScene("missing scene_id".to_string()));
    }
    if blank(&scene.title) {
        return Err(Error::InvalidScene("missing title".to_string()));
    }
    if blank(&scene.narrative) {
        return Err(Error::InvalidScene("missing narrative".to_string()));
    }
    if scene.choices.is_empty() {
        return Err(Error::InvalidScene("no choices".to_string()));
    }

    let mut seen = HashSet::new();
    for choice in &scene.choices {
        if blank(&choice.id) || blank(&choice.text) {
            return Err(Error::InvalidScene("choice without id or text".to_string()));
        }
        if !seen.insert(choice.id.as_str()) {
            return Err(Error::InvalidScene(format!(
                "duplicate choice id {}",
                choice.id
            )));
        }
    }

    Ok(())
}

fn choice(id: &str, text: &str) -> Choice {
    Choice {
        id: id.to_string(),
        text: text.to_string(),
        next_scene: None,
    }
}

/// Scene returned whenever generation fails
#[must_use]
pub fn fallback_scene() -> Scene {
    Scene {
        id: FALLBACK_SCENE_ID.to_string(),
        title: "Continuing Your Journey".to_string(),
        narrative: "As you continue on your journey, you notice the path diverges ahead. \
                    What would you like to do?"
            .to_string(),
        ambience: "Gentle wind rustling through leaves".to_string(),
        choices: vec![
            choice("path_left", "Take the path to the left"),
            choice("path_right", "Take the path to the right"),
            choice("wait", "Wait and observe"),
        ],
    }
}

/// Opening scene used when the first scene cannot be generated
#[must_use]
pub fn opening_scene() -> Scene {
    Scene {
        id: super::START_SCENE_ID.to_string(),
        title: "The Whispering Forest".to_string(),
        narrative: "You stand at the edge of the Whispering Forest. The ancient trees sway \
                    gently, their leaves rustling with secrets older than time itself. A narrow \
                    path winds its way into the dense foliage, barely visible in the dappled \
                    sunlight. From somewhere deep within, you hear what sounds like distant \
                    voices carried on the breeze."
            .to_string(),
        ambience: "Rustling leaves, distant whispers, occasional bird calls".to_string(),
        choices: vec![
            choice("enter_forest", "Enter the forest and follow the path"),
            choice(
                "listen_carefully",
                "Stand still and listen carefully to the whispers",
            ),
            choice(
                "circle_perimeter",
                "Circle around the perimeter to find another entrance",
            ),
        ],
    }
}
