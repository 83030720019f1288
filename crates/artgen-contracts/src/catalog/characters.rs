use std::path::Path;

use anyhow::Context;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharacterInfo {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(
        default,
        alias = "character_description",
        alias = "intro",
        skip_serializing_if = "Option::is_none"
    )]
    pub descriptive_text: Option<String>,
}

impl CharacterInfo {
    pub fn new(id: impl Into<String>, descriptive_text: Option<&str>) -> Self {
        Self {
            id: id.into(),
            name: None,
            descriptive_text: descriptive_text.map(str::to_string),
        }
    }

    pub fn has_description(&self) -> bool {
        self.descriptive_text
            .as_deref()
            .is_some_and(|text| !text.trim().is_empty())
    }

    /// Confirmed blank, as opposed to `None` which means not fetched yet.
    pub fn lacks_description(&self) -> bool {
        self.descriptive_text
            .as_deref()
            .is_some_and(|text| text.trim().is_empty())
    }
}

pub trait CharacterDirectory: Send + Sync {
    fn lookup_character(&self, id: &str) -> Option<CharacterInfo>;

    /// True while descriptions are still being fetched; resolution waits on it.
    fn is_loading(&self) -> bool {
        false
    }
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryCharacters {
    characters: IndexMap<String, CharacterInfo>,
}

impl InMemoryCharacters {
    pub fn new(characters: impl IntoIterator<Item = CharacterInfo>) -> Self {
        let mut directory = Self::default();
        for character in characters {
            directory.insert(character);
        }
        directory
    }

    /// Reads a JSON array of characters.
    pub fn from_path(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading character directory {}", path.display()))?;
        let rows: Vec<CharacterInfo> = serde_json::from_str(&raw)
            .with_context(|| format!("parsing character directory {}", path.display()))?;
        Ok(Self::new(rows))
    }

    pub fn insert(&mut self, character: CharacterInfo) {
        self.characters.insert(character.id.clone(), character);
    }

    pub fn len(&self) -> usize {
        self.characters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.characters.is_empty()
    }
}

impl CharacterDirectory for InMemoryCharacters {
    fn lookup_character(&self, id: &str) -> Option<CharacterInfo> {
        self.characters.get(id.trim().trim_start_matches('@')).cloned()
    }
}
