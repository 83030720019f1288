use std::fmt;
use std::str::FromStr;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::dimensions::DimensionFamily;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub enum ModelIdentity {
    #[default]
    #[serde(rename = "Auto Model")]
    AutoModel,
    #[serde(rename = "Art Pro")]
    ArtPro,
    #[serde(rename = "Art Unlimited")]
    ArtUnlimited,
    #[serde(rename = "Seedream 4.5")]
    Seedream45,
    #[serde(rename = "Seedream 4")]
    Seedream4,
    #[serde(rename = "Gemini")]
    Gemini,
    #[serde(rename = "Gemini Pro")]
    GeminiPro,
    #[serde(rename = "Animagine")]
    Animagine,
    #[serde(rename = "Illustrious")]
    Illustrious,
    #[serde(rename = "Noobai")]
    Noobai,
    #[serde(rename = "KusaXL")]
    KusaXL,
    #[serde(rename = "GPT")]
    Gpt,
    #[serde(rename = "Flux")]
    Flux,
    #[serde(rename = "Flux Context")]
    FluxContext,
}

/// Prompt-handling partition of the model set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelFamily {
    /// Tag-driven danbooru-style models, plus the GPT and Flux backends.
    /// Prompts pass through with tokens left for the downstream expansion.
    Anime,
    /// Instruction-following models whose prompts get the preset template.
    General,
}

impl ModelIdentity {
    pub const ALL: [ModelIdentity; 14] = [
        ModelIdentity::AutoModel,
        ModelIdentity::ArtPro,
        ModelIdentity::ArtUnlimited,
        ModelIdentity::Seedream45,
        ModelIdentity::Seedream4,
        ModelIdentity::Gemini,
        ModelIdentity::GeminiPro,
        ModelIdentity::Animagine,
        ModelIdentity::Illustrious,
        ModelIdentity::Noobai,
        ModelIdentity::KusaXL,
        ModelIdentity::Gpt,
        ModelIdentity::Flux,
        ModelIdentity::FluxContext,
    ];

    /// The model a final `AutoModel` stands for when sizing and pricing.
    pub const DEFAULT: ModelIdentity = ModelIdentity::ArtPro;

    pub fn key(self) -> &'static str {
        match self {
            ModelIdentity::AutoModel => "Auto Model",
            ModelIdentity::ArtPro => "Art Pro",
            ModelIdentity::ArtUnlimited => "Art Unlimited",
            ModelIdentity::Seedream45 => "Seedream 4.5",
            ModelIdentity::Seedream4 => "Seedream 4",
            ModelIdentity::Gemini => "Gemini",
            ModelIdentity::GeminiPro => "Gemini Pro",
            ModelIdentity::Animagine => "Animagine",
            ModelIdentity::Illustrious => "Illustrious",
            ModelIdentity::Noobai => "Noobai",
            ModelIdentity::KusaXL => "KusaXL",
            ModelIdentity::Gpt => "GPT",
            ModelIdentity::Flux => "Flux",
            ModelIdentity::FluxContext => "Flux Context",
        }
    }

    pub fn is_auto(self) -> bool {
        self == ModelIdentity::AutoModel
    }

    /// Replaces the placeholder with the default tag model.
    pub fn or_default(self) -> ModelIdentity {
        if self.is_auto() {
            Self::DEFAULT
        } else {
            self
        }
    }

    pub fn family(self) -> ModelFamily {
        match self.or_default() {
            ModelIdentity::Seedream45
            | ModelIdentity::Seedream4
            | ModelIdentity::Gemini
            | ModelIdentity::GeminiPro => ModelFamily::General,
            _ => ModelFamily::Anime,
        }
    }

    pub fn dimension_family(self) -> DimensionFamily {
        match self.or_default() {
            ModelIdentity::ArtPro | ModelIdentity::ArtUnlimited | ModelIdentity::KusaXL => {
                DimensionFamily::Anime
            }
            ModelIdentity::Seedream45 | ModelIdentity::Seedream4 => DimensionFamily::Seedream,
            ModelIdentity::GeminiPro => DimensionFamily::GeminiPro,
            _ => DimensionFamily::Standard,
        }
    }

    /// Only escalations that proved the input needs a stronger model may persist.
    pub fn is_sticky_eligible(self) -> bool {
        matches!(self, ModelIdentity::Seedream45 | ModelIdentity::GeminiPro)
    }

    /// Models that read prompts in any language, so no translation pass is needed.
    pub fn is_multilingual(self) -> bool {
        matches!(
            self,
            ModelIdentity::Gemini | ModelIdentity::Seedream45 | ModelIdentity::Seedream4
        )
    }
}

impl fmt::Display for ModelIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for ModelIdentity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = normalize_model_name(s);
        ModelIdentity::ALL
            .into_iter()
            .find(|model| normalize_model_name(model.key()) == wanted)
            .ok_or_else(|| format!("Unknown model '{}'.", s.trim()))
    }
}

fn normalize_model_name(raw: &str) -> String {
    raw.chars()
        .filter(|ch| ch.is_ascii_alphanumeric())
        .map(|ch| ch.to_ascii_lowercase())
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSpec {
    pub identity: ModelIdentity,
    pub label: String,
    pub aliases: Vec<String>,
}

impl ModelSpec {
    pub fn matches(&self, name: &str) -> bool {
        let wanted = normalize_model_name(name);
        if wanted.is_empty() {
            return false;
        }
        normalize_model_name(self.identity.key()) == wanted
            || normalize_model_name(&self.label) == wanted
            || self
                .aliases
                .iter()
                .any(|alias| normalize_model_name(alias) == wanted)
    }
}

#[derive(Debug, Clone)]
pub struct ModelRegistry {
    models: IndexMap<ModelIdentity, ModelSpec>,
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self::new(None)
    }
}

impl ModelRegistry {
    pub fn new(models: Option<IndexMap<ModelIdentity, ModelSpec>>) -> Self {
        Self {
            models: models.unwrap_or_else(default_models),
        }
    }

    pub fn get(&self, identity: ModelIdentity) -> Option<&ModelSpec> {
        self.models.get(&identity)
    }

    pub fn list(&self) -> impl Iterator<Item = &ModelSpec> {
        self.models.values()
    }

    pub fn by_family(&self, family: ModelFamily) -> Vec<ModelSpec> {
        self.models
            .values()
            .filter(|spec| !spec.identity.is_auto() && spec.identity.family() == family)
            .cloned()
            .collect()
    }

    /// Finds a model by key, display label or alias, ignoring case and punctuation.
    pub fn lookup(&self, name: &str) -> Option<&ModelSpec> {
        self.models.values().find(|spec| spec.matches(name))
    }

    pub fn label(&self, identity: ModelIdentity) -> String {
        self.get(identity)
            .map(|spec| spec.label.clone())
            .unwrap_or_else(|| identity.key().to_string())
    }
}

fn default_models() -> IndexMap<ModelIdentity, ModelSpec> {
    let mut map = IndexMap::new();

    let mut insert = |identity: ModelIdentity, label: &str, aliases: &[&str]| {
        map.insert(
            identity,
            ModelSpec {
                identity,
                label: label.to_string(),
                aliases: aliases.iter().map(|item| (*item).to_string()).collect(),
            },
        );
    };

    insert(ModelIdentity::AutoModel, "Auto Model", &["auto"]);
    insert(ModelIdentity::ArtPro, "Art Pro", &["artpro"]);
    insert(ModelIdentity::ArtUnlimited, "Art Unlimited", &["kusa"]);
    insert(ModelIdentity::Seedream45, "Seedream 4.5", &["seedream", "seedream edit"]);
    insert(ModelIdentity::Seedream4, "Seedream 4", &["seedream v4"]);
    insert(ModelIdentity::Gemini, "Gemini (Nano Banana)", &["nano banana", "gemini nano"]);
    insert(ModelIdentity::GeminiPro, "Nano Banana Pro", &["banana pro"]);
    insert(ModelIdentity::Animagine, "Animagine XL 3.1", &["animagine xl"]);
    insert(ModelIdentity::Illustrious, "Illustrious", &[]);
    insert(ModelIdentity::Noobai, "Noobai XL", &["noobai xl"]);
    insert(ModelIdentity::KusaXL, "KusaXL", &["kusa xl"]);
    insert(ModelIdentity::Gpt, "GPT-4o", &["gpt4o", "gpt image"]);
    insert(ModelIdentity::Flux, "Flux", &[]);
    insert(ModelIdentity::FluxContext, "Flux Kontext", &["flux kontext"]);

    map
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auto_model_sizes_and_prices_as_default() {
        assert_eq!(ModelIdentity::AutoModel.or_default(), ModelIdentity::ArtPro);
        assert_eq!(
            ModelIdentity::AutoModel.dimension_family(),
            DimensionFamily::Anime
        );
        assert_eq!(ModelIdentity::AutoModel.family(), ModelFamily::Anime);
    }

    #[test]
    fn families_partition_the_closed_set() {
        let general: Vec<ModelIdentity> = ModelIdentity::ALL
            .into_iter()
            .filter(|model| !model.is_auto() && model.family() == ModelFamily::General)
            .collect();
        assert_eq!(
            general,
            vec![
                ModelIdentity::Seedream45,
                ModelIdentity::Seedream4,
                ModelIdentity::Gemini,
                ModelIdentity::GeminiPro,
            ]
        );
        for model in [ModelIdentity::Gpt, ModelIdentity::Flux, ModelIdentity::FluxContext] {
            assert_eq!(model.family(), ModelFamily::Anime);
        }
    }

    #[test]
    fn only_escalations_are_sticky() {
        let sticky: Vec<ModelIdentity> = ModelIdentity::ALL
            .into_iter()
            .filter(|model| model.is_sticky_eligible())
            .collect();
        assert_eq!(
            sticky,
            vec![ModelIdentity::Seedream45, ModelIdentity::GeminiPro]
        );
    }

    #[test]
    fn parse_accepts_display_keys_loosely() {
        assert_eq!(
            "seedream-4.5".parse::<ModelIdentity>(),
            Ok(ModelIdentity::Seedream45)
        );
        assert_eq!(
            "Gemini Pro".parse::<ModelIdentity>(),
            Ok(ModelIdentity::GeminiPro)
        );
        assert_eq!("auto model".parse::<ModelIdentity>(), Ok(ModelIdentity::AutoModel));
        assert!("dall-e".parse::<ModelIdentity>().is_err());
    }

    #[test]
    fn registry_lookup_resolves_labels_and_aliases() {
        let registry = ModelRegistry::default();
        assert_eq!(
            registry.lookup("nano banana pro").map(|spec| spec.identity),
            Some(ModelIdentity::GeminiPro)
        );
        assert_eq!(
            registry.lookup("Seedream").map(|spec| spec.identity),
            Some(ModelIdentity::Seedream45)
        );
        assert_eq!(
            registry.lookup("auto").map(|spec| spec.identity),
            Some(ModelIdentity::AutoModel)
        );
        assert!(registry.lookup("").is_none());
    }

    #[test]
    fn registry_lists_family_members_in_insertion_order() {
        let registry = ModelRegistry::default();
        let anime: Vec<ModelIdentity> = registry
            .by_family(ModelFamily::Anime)
            .into_iter()
            .map(|spec| spec.identity)
            .collect();
        assert_eq!(anime.first(), Some(&ModelIdentity::ArtPro));
        assert!(!anime.contains(&ModelIdentity::AutoModel));
        assert_eq!(registry.label(ModelIdentity::GeminiPro), "Nano Banana Pro");
    }

    #[test]
    fn serde_uses_display_keys() -> anyhow::Result<()> {
        let encoded = serde_json::to_string(&ModelIdentity::Seedream45)?;
        assert_eq!(encoded, "\"Seedream 4.5\"");
        let decoded: ModelIdentity = serde_json::from_str("\"Gemini Pro\"")?;
        assert_eq!(decoded, ModelIdentity::GeminiPro);
        Ok(())
    }
}
