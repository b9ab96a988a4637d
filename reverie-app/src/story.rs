//! Story graph played by the terminal host.
//!
//! A story is a set of named scenes. Each scene shows some text and offers
//! choices; a choice names the scene it leads to. A scene without choices
//! ends the story.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use reverie_core::{Choice, Choices, Intention};
use serde::{Deserialize, Serialize};

const DEMO_STORY: &str = r#"{
  "title": "The Schoolroom",
  "start": "desk",
  "scenes": {
    "desk": {
      "text": "Miss Avery taps the blackboard. \"Well? The answer, please.\"",
      "choices": [
        { "text": "I give up, Miss", "phrases": ["I don't know"], "next": "corner" },
        { "text": "I have a dream", "next": "dream" }
      ],
      "onTimeout": "corner"
    },
    "corner": {
      "text": "You spend the afternoon in the corner. Do you apologise?",
      "intention": "confirm",
      "choices": [
        { "text": "Yes", "phrases": ["sorry"], "next": "forgiven" },
        { "text": "No", "next": "expelled" }
      ]
    },
    "dream": {
      "text": "The class falls silent. Miss Avery lowers her chalk and smiles.",
      "choices": []
    },
    "forgiven": {
      "text": "Miss Avery nods. Tomorrow is another day.",
      "choices": []
    },
    "expelled": {
      "text": "The headmaster is summoned. Your school days are over.",
      "choices": []
    }
  }
}"#;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Story {
    pub title: String,
    pub start: String,
    pub scenes: HashMap<String, Scene>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scene {
    pub text: String,
    #[serde(default)]
    pub intention: Intention,
    #[serde(default)]
    pub choices: Vec<StoryChoice>,
    /// Scene to move to when the prompt times out. Without one the prompt
    /// is shown again.
    #[serde(default)]
    pub on_timeout: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoryChoice {
    pub text: String,
    #[serde(default)]
    pub phrases: Vec<String>,
    pub next: String,
}

impl Story {
    pub fn demo() -> Result<Self> {
        Self::from_json(DEMO_STORY).context("built-in story")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("reading story {}", path.display()))?;
        Self::from_json(&raw).with_context(|| format!("loading story {}", path.display()))
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let story: Story = serde_json::from_str(raw)?;
        story.validate()?;
        Ok(story)
    }

    pub fn scene(&self, id: &str) -> Result<&Scene> {
        self.scenes
            .get(id)
            .with_context(|| format!("unknown scene '{id}'"))
    }

    /// Every link must land on a scene, and every scene's choices must form
    /// a valid choice set.
    fn validate(&self) -> Result<()> {
        self.scene(&self.start)?;
        for (id, scene) in &self.scenes {
            for target in scene
                .choices
                .iter()
                .map(|c| &c.next)
                .chain(scene.on_timeout.as_ref())
            {
                if !self.scenes.contains_key(target) {
                    bail!("scene '{id}' links to unknown scene '{target}'");
                }
            }
            if !scene.is_ending() {
                scene
                    .choices("en-US")
                    .with_context(|| format!("scene '{id}'"))?;
            }
        }
        Ok(())
    }
}

impl Scene {
    pub fn is_ending(&self) -> bool {
        self.choices.is_empty()
    }

    pub fn choices(&self, locale: &str) -> reverie_core::Result<Choices> {
        let items = self
            .choices
            .iter()
            .map(|c| Choice::new(c.text.clone()).with_phrases(c.phrases.iter().cloned()))
            .collect();
        Choices::new(items, self.intention, locale)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn demo_story_is_valid() {
        let story = Story::demo().expect("demo story");
        let desk = story.scene(&story.start).expect("start scene");
        let choices = desk.choices("en-US").expect("choices");
        assert_eq!(choices.len(), 2);
        assert_eq!(choices[1].text(), "I have a dream");
        assert_eq!(choices[0].phrases(), ["I don't know".to_string()]);
        assert_eq!(
            story.scene("corner").expect("corner").intention,
            Intention::Confirm
        );
        assert!(story.scene("dream").expect("dream").is_ending());
    }

    #[test]
    fn dangling_link_is_rejected() {
        let raw = r#"{
            "title": "Broken",
            "start": "a",
            "scenes": {
                "a": { "text": "A", "choices": [ { "text": "Go", "next": "b" } ] }
            }
        }"#;
        let err = Story::from_json(raw).expect_err("dangling link");
        assert!(err.to_string().contains("unknown scene 'b'"));
    }

    #[test]
    fn missing_start_is_rejected() {
        let raw = r#"{ "title": "Empty", "start": "nowhere", "scenes": {} }"#;
        assert!(Story::from_json(raw).is_err());
    }

    #[test]
    fn duplicate_choice_texts_are_rejected() {
        let raw = r#"{
            "title": "Twins",
            "start": "a",
            "scenes": {
                "a": { "text": "A", "choices": [
                    { "text": "Left", "next": "end" },
                    { "text": " left ", "next": "end" }
                ] },
                "end": { "text": "Done" }
            }
        }"#;
        assert!(Story::from_json(raw).is_err());
    }
}
