use std::path::Path;

use anyhow::Context;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

const DEFAULT_PRESETS_JSON: &str = include_str!("../../resources/default_presets.json");

/// Minimum model class a preset needs to render faithfully.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelRequirement {
    #[default]
    None,
    Seedream,
    HighCapability,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresetEntry {
    pub value: String,
    pub label: String,
    pub fragment: String,
    #[serde(default)]
    pub requirement: ModelRequirement,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

impl PresetEntry {
    pub fn requires_high_capability(&self) -> bool {
        self.requirement == ModelRequirement::HighCapability
    }
}

/// Read-only dictionary queries made while compiling a request.
pub trait PresetLookup: Send + Sync {
    /// General-compatible styles first, then the tag-model styles.
    fn lookup_style(&self, value: &str) -> Option<PresetEntry>;
    fn lookup_grid(&self, value: &str) -> Option<PresetEntry>;
    fn is_general_style(&self, value: &str) -> bool;
}

#[derive(Debug, Clone, Default, Deserialize)]
struct RawPreset {
    label: String,
    #[serde(default)]
    fragment: Option<String>,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    requires: Option<ModelRequirement>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct RawCatalog {
    #[serde(default)]
    general_styles: IndexMap<String, RawPreset>,
    #[serde(default)]
    special_styles: IndexMap<String, RawPreset>,
    #[serde(default)]
    grids: IndexMap<String, RawPreset>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresetCatalog {
    general_styles: IndexMap<String, PresetEntry>,
    special_styles: IndexMap<String, PresetEntry>,
    grids: IndexMap<String, PresetEntry>,
}

impl Default for PresetCatalog {
    fn default() -> Self {
        let mut catalog = Self::empty();
        if let Err(err) = catalog.merge_json(DEFAULT_PRESETS_JSON) {
            tracing::error!(error = %err, "built-in preset table failed to parse");
        }
        catalog
    }
}

impl PresetCatalog {
    pub fn empty() -> Self {
        Self {
            general_styles: IndexMap::new(),
            special_styles: IndexMap::new(),
            grids: IndexMap::new(),
        }
    }

    /// Built-in presets with entries from `path` added or replaced.
    pub fn with_overrides(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading preset overrides {}", path.display()))?;
        let mut catalog = Self::default();
        catalog
            .merge_json(&raw)
            .with_context(|| format!("parsing preset overrides {}", path.display()))?;
        Ok(catalog)
    }

    pub fn merge_json(&mut self, raw: &str) -> anyhow::Result<()> {
        let parsed: RawCatalog = serde_json::from_str(raw)?;
        merge_entries(&mut self.general_styles, parsed.general_styles, ModelRequirement::None);
        merge_entries(&mut self.special_styles, parsed.special_styles, ModelRequirement::None);
        merge_entries(&mut self.grids, parsed.grids, ModelRequirement::Seedream);
        Ok(())
    }

    pub fn general_styles(&self) -> impl Iterator<Item = &PresetEntry> {
        self.general_styles.values()
    }

    pub fn special_styles(&self) -> impl Iterator<Item = &PresetEntry> {
        self.special_styles.values()
    }

    pub fn grids(&self) -> impl Iterator<Item = &PresetEntry> {
        self.grids.values()
    }
}

impl PresetLookup for PresetCatalog {
    fn lookup_style(&self, value: &str) -> Option<PresetEntry> {
        let key = preset_key(value);
        self.general_styles
            .get(&key)
            .or_else(|| self.special_styles.get(&key))
            .cloned()
    }

    fn lookup_grid(&self, value: &str) -> Option<PresetEntry> {
        self.grids.get(&preset_key(value)).cloned()
    }

    fn is_general_style(&self, value: &str) -> bool {
        self.general_styles.contains_key(&preset_key(value))
    }
}

fn merge_entries(
    target: &mut IndexMap<String, PresetEntry>,
    rows: IndexMap<String, RawPreset>,
    default_requirement: ModelRequirement,
) {
    for (value, row) in rows {
        let key = preset_key(&value);
        if key.is_empty() {
            continue;
        }
        // Tag-model styles carry no prose; their label doubles as the fragment.
        let fragment = row
            .fragment
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty())
            .unwrap_or_else(|| row.label.clone());
        target.insert(
            key.clone(),
            PresetEntry {
                value: key,
                label: row.label,
                fragment,
                requirement: row.requires.unwrap_or(default_requirement),
                category: row.category,
            },
        );
    }
}

fn preset_key(value: &str) -> String {
    value
        .trim()
        .trim_start_matches(['[', '<'])
        .trim_end_matches([']', '>'])
        .trim()
        .to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_tables_are_populated() {
        let catalog = PresetCatalog::default();
        assert_eq!(catalog.general_styles().count(), 23);
        assert_eq!(catalog.special_styles().count(), 70);
        assert_eq!(catalog.grids().count(), 12);
    }

    #[test]
    fn style_lookup_prefers_general_table() {
        let catalog = PresetCatalog::default();
        let general = catalog.lookup_style("pop-anime-style");
        assert!(general.is_some_and(|entry| entry.fragment.starts_with("Generate in modern pop")));
        assert!(catalog.is_general_style("pop-anime-style"));

        let special = catalog.lookup_style("vibrant-anime-style");
        assert_eq!(
            special.map(|entry| entry.fragment),
            Some("vibrant anime style".to_string())
        );
        assert!(!catalog.is_general_style("vibrant-anime-style"));
    }

    #[test]
    fn grid_requirements_split_by_density() {
        let catalog = PresetCatalog::default();
        let dense = catalog.lookup_grid("5x5-grid");
        assert!(dense.is_some_and(|entry| entry.requires_high_capability()));
        let strip = catalog.lookup_grid("<three-panel-strip>");
        assert_eq!(
            strip.map(|entry| entry.requirement),
            Some(ModelRequirement::Seedream)
        );
        assert!(catalog.lookup_grid("7x7-grid").is_none());
    }

    #[test]
    fn lookups_ignore_case_and_padding() {
        let catalog = PresetCatalog::default();
        assert!(catalog.lookup_style(" Pop-Anime-Style ").is_some());
    }

    #[test]
    fn overrides_add_and_replace_entries() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("presets.json");
        std::fs::write(
            &path,
            r#"{
                "general_styles": {"ink-wash": {"label": "ink wash", "fragment": "Render as ink wash."}},
                "grids": {"2x2-grid": {"label": "2 x 2", "fragment": "Four panels.", "requires": "high_capability"}}
            }"#,
        )?;
        let catalog = PresetCatalog::with_overrides(&path)?;
        assert!(catalog.is_general_style("ink-wash"));
        assert!(catalog
            .lookup_grid("2x2-grid")
            .is_some_and(|entry| entry.requires_high_capability()));
        assert_eq!(catalog.grids().count(), 12);
        Ok(())
    }
}
