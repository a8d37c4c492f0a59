//! Read-only story graph loaded once at startup

use std::path::Path;

use indexmap::IndexMap;
use serde::Deserialize;

use super::Scene;
use crate::{Error, Result};

/// Story bundled with the binary
const SAMPLE_STORY: &str = include_str!("../../data/sample_story.json");

/// On-disk story definition
#[derive(Debug, Deserialize)]
struct StoryFile {
    #[serde(default)]
    title: Option<String>,

    /// Explicit entry scene; defaults to the first scene in the file
    #[serde(default)]
    start_scene: Option<String>,

    scenes: IndexMap<String, Scene>,
}

/// A choice whose `next_scene` points outside the story
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DanglingReference {
    pub scene_id: String,
    pub choice_id: String,
    pub target: String,
}

/// Static tree of scenes keyed by id
#[derive(Debug, Clone)]
pub struct StoryStore {
    title: Option<String>,
    start_scene: String,
    scenes: IndexMap<String, Scene>,
}

impl StoryStore {
    /// Load the story bundled with the binary
    ///
    /// # Errors
    ///
    /// Returns error if the bundled story is malformed
    pub fn sample() -> Result<Self> {
        Self::from_json(SAMPLE_STORY)
    }

    /// Load a story from a JSON file
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or is not a valid story
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Story(format!("failed to read {}: {e}", path.display()))
        })?;
        Self::from_json(&content)
    }

    /// Parse and validate a story definition
    ///
    /// # Errors
    ///
    /// Returns error if the JSON is malformed, has no scenes, or is inconsistent
    pub fn from_json(json: &str) -> Result<Self> {
        let file: StoryFile = serde_json::from_str(json)?;
        Self::from_scenes(file.title, file.start_scene, file.scenes)
    }

    fn from_scenes(
        title: Option<String>,
        start_scene: Option<String>,
        mut scenes: IndexMap<String, Scene>,
    ) -> Result<Self> {
        if scenes.is_empty() {
            return Err(Error::Story("story has no scenes".to_string()));
        }

        for (key, scene) in &mut scenes {
            if scene.id.is_empty() {
                scene.id.clone_from(key);
            } else if scene.id != *key {
                return Err(Error::Story(format!(
                    "scene keyed {key} declares scene_id {}",
                    scene.id
                )));
            }
        }

        let start_scene = match start_scene {
            Some(id) if scenes.contains_key(&id) => id,
            Some(id) => {
                return Err(Error::Story(format!("start scene {id} not in story")));
            }
            None => scenes
                .keys()
                .next()
                .cloned()
                .ok_or_else(|| Error::Story("story has no scenes".to_string()))?,
        };

        let store = Self {
            title,
            start_scene,
            scenes,
        };

        for dangling in store.dangling_references() {
            tracing::warn!(
                scene = %dangling.scene_id,
                choice = %dangling.choice_id,
                target = %dangling.target,
                "choice points at a scene missing from the story"
            );
        }

        Ok(store)
    }

    /// Story title, if the definition has one
    #[must_use]
    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    /// Number of scenes
    #[must_use]
    pub fn len(&self) -> usize {
        self.scenes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.scenes.is_empty()
    }

    /// Entry scene of the story
    #[must_use]
    pub fn initial_scene(&self) -> &Scene {
        // start_scene is checked against the map at construction
        &self.scenes[&self.start_scene]
    }

    /// Look up a scene by id
    ///
    /// # Errors
    ///
    /// Returns `SceneNotFound` if the id is not in the story
    pub fn get_scene(&self, scene_id: &str) -> Result<&Scene> {
        self.scenes
            .get(scene_id)
            .ok_or_else(|| Error::SceneNotFound(scene_id.to_string()))
    }

    /// Follow `choice_id` out of `scene_id` to its successor
    ///
    /// # Errors
    ///
    /// - `SceneNotFound` if `scene_id` is unknown
    /// - `ChoiceNotFound` if the scene has no such choice, or the choice has no successor
    /// - `SceneNotFound` if the successor is missing from the story
    pub fn resolve_choice(&self, scene_id: &str, choice_id: &str) -> Result<&Scene> {
        let current = self.get_scene(scene_id)?;
        let next_id = current
            .choice(choice_id)
            .and_then(|c| c.next_scene.as_deref())
            .ok_or_else(|| Error::ChoiceNotFound {
                scene: scene_id.to_string(),
                choice: choice_id.to_string(),
            })?;
        self.get_scene(next_id)
    }

    /// All scenes in definition order
    pub fn scenes(&self) -> impl Iterator<Item = &Scene> {
        self.scenes.values()
    }

    /// Choices whose successor is not part of the story
    #[must_use]
    pub fn dangling_references(&self) -> Vec<DanglingReference> {
        self.scenes
            .values()
            .flat_map(|scene| {
                scene.choices.iter().filter_map(move |choice| {
                    let target = choice.next_scene.as_ref()?;
                    (!self.scenes.contains_key(target)).then(|| DanglingReference {
                        scene_id: scene.id.clone(),
                        choice_id: choice.id.clone(),
                        target: target.clone(),
                    })
                })
            })
            .collect()
    }
}
