//! Immutable choice model.

use std::collections::HashMap;
use std::ops::Index;

use serde::{Deserialize, Serialize};

use crate::error::{Result, ReverieError};
use crate::speech::matcher::normalize;

/// How eagerly producers may match a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Intention {
    /// Pick one of several story branches. Best-effort matching is allowed.
    #[default]
    Decide,
    /// Confirm or reject something. Only exact matches count.
    Confirm,
}

/// One selectable option.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Choice {
    text: String,
    #[serde(default)]
    phrases: Vec<String>,
    #[serde(default)]
    id: Option<String>,
}

impl Choice {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            phrases: Vec::new(),
            id: None,
        }
    }

    /// Extra phrases a recognizer should accept for this choice.
    pub fn with_phrases<I, S>(mut self, phrases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.phrases.extend(phrases.into_iter().map(Into::into));
        self
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn phrases(&self) -> &[String] {
        &self.phrases
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    /// Display text followed by every extra phrase.
    pub fn utterances(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.text.as_str()).chain(self.phrases.iter().map(String::as_str))
    }
}

/// Ordered set of choices for one decision point.
///
/// Order is significant: a choice's position is the index producers resolve with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Choices {
    items: Vec<Choice>,
    intention: Intention,
    locale: String,
}

impl Choices {
    /// Utterances are compared in their speech-normalized form, so two
    /// choices never share anything a producer could hear or match.
    ///
    /// # Errors
    /// `ReverieError::InvalidChoices` when `items` is empty, when a display
    /// text normalizes to nothing, or when an utterance of one choice
    /// normalizes to the same text as an utterance of another.
    pub fn new(items: Vec<Choice>, intention: Intention, locale: impl Into<String>) -> Result<Self> {
        if items.is_empty() {
            return Err(ReverieError::InvalidChoices("no choices given".into()));
        }

        let mut owners: HashMap<String, usize> = HashMap::new();
        for (index, choice) in items.iter().enumerate() {
            if normalize(&choice.text).is_empty() {
                return Err(ReverieError::InvalidChoices(format!(
                    "blank choice text '{}'",
                    choice.text
                )));
            }
            for utterance in choice.utterances() {
                let key = normalize(utterance);
                if key.is_empty() {
                    continue;
                }
                if let Some(&owner) = owners.get(&key) {
                    if owner != index {
                        return Err(ReverieError::InvalidChoices(format!(
                            "'{utterance}' is ambiguous between choices {owner} and {index}"
                        )));
                    }
                } else {
                    owners.insert(key, index);
                }
            }
        }

        Ok(Self {
            items,
            intention,
            locale: locale.into(),
        })
    }

    /// Shorthand for a `Decide` set built from display texts.
    pub fn decide<I, S>(texts: I, locale: impl Into<String>) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(
            texts.into_iter().map(Choice::new).collect(),
            Intention::Decide,
            locale,
        )
    }

    pub fn intention(&self) -> Intention {
        self.intention
    }

    pub fn locale(&self) -> &str {
        &self.locale
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Always false; kept for clippy's `len_without_is_empty`.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Choice> {
        self.items.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Choice> {
        self.items.iter()
    }

    /// Position of the choice with the same display text.
    pub fn position(&self, choice: &Choice) -> Option<usize> {
        self.items.iter().position(|c| c.text == choice.text)
    }
}

impl Index<usize> for Choices {
    type Output = Choice;

    fn index(&self, index: usize) -> &Choice {
        &self.items[index]
    }
}

impl<'a> IntoIterator for &'a Choices {
    type Item = &'a Choice;
    type IntoIter = std::slice::Iter<'a, Choice>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}
