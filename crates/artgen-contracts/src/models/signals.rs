use std::sync::{Arc, OnceLock};

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::catalog::{CharacterInfo, ModelRequirement, PresetLookup};
use crate::prompt::{scan, tokens_of, TokenKind};

/// Four-way output of auto-detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Signal {
    Seedream45,
    GeminiPro,
    Gemini,
    None,
}

/// A `@mention` and whatever the directory knows about it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MentionedCharacter {
    pub id: String,
    pub info: Option<CharacterInfo>,
}

impl MentionedCharacter {
    /// Known to the directory with an empty description, or an unknown id shaped
    /// like a user-created character (`name-x9f2`) rather than `Name_(Series)`.
    fn needs_reference_model(&self) -> bool {
        match &self.info {
            Some(info) => info.lacks_description(),
            None => !self.id.contains('(') && oc_suffix().is_match(&self.id),
        }
    }
}

fn oc_suffix() -> &'static Regex {
    static SUFFIX: OnceLock<Regex> = OnceLock::new();
    SUFFIX.get_or_init(|| Regex::new(r"-[A-Za-z0-9]{3,}$").expect("oc suffix pattern"))
}

#[derive(Debug, Clone, Copy)]
pub struct SignalInput<'a> {
    pub prompt: &'a str,
    pub reference_count: usize,
    pub mentions: &'a [MentionedCharacter],
}

pub trait SignalDetector: Send + Sync {
    fn name(&self) -> &str;
    fn detect(&self, input: &SignalInput<'_>) -> Signal;
}

/// Default classifier driven by reference count, preset requirements and mentions.
pub struct HeuristicSignalDetector {
    presets: Arc<dyn PresetLookup>,
}

impl HeuristicSignalDetector {
    pub fn new(presets: Arc<dyn PresetLookup>) -> Self {
        Self { presets }
    }
}

impl SignalDetector for HeuristicSignalDetector {
    fn name(&self) -> &str {
        "heuristic"
    }

    fn detect(&self, input: &SignalInput<'_>) -> Signal {
        if input.reference_count > 1 {
            return Signal::Seedream45;
        }

        let scanned = scan(input.prompt);
        let requirements: Vec<ModelRequirement> = tokens_of(input.prompt, TokenKind::Grid)
            .iter()
            .filter_map(|token| self.presets.lookup_grid(&token.value))
            .map(|entry| entry.requirement)
            .collect();
        if requirements.contains(&ModelRequirement::HighCapability) {
            return Signal::GeminiPro;
        }
        if requirements.contains(&ModelRequirement::Seedream) {
            return Signal::Seedream45;
        }

        if !input.mentions.is_empty() {
            return if input
                .mentions
                .iter()
                .any(MentionedCharacter::needs_reference_model)
            {
                Signal::Seedream45
            } else {
                Signal::None
            };
        }

        if let Some(style) = &scanned.style {
            return if self.presets.is_general_style(&style.value) {
                Signal::Gemini
            } else {
                Signal::None
            };
        }

        if input.reference_count == 1 || scanned.grid.is_some() {
            return Signal::Gemini;
        }
        Signal::None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::PresetCatalog;

    fn detect(prompt: &str, reference_count: usize, mentions: &[MentionedCharacter]) -> Signal {
        let detector = HeuristicSignalDetector::new(Arc::new(PresetCatalog::default()));
        detector.detect(&SignalInput {
            prompt,
            reference_count,
            mentions,
        })
    }

    fn mention(id: &str, description: Option<&str>) -> MentionedCharacter {
        MentionedCharacter {
            id: id.to_string(),
            info: description.map(|text| CharacterInfo::new(id, Some(text))),
        }
    }

    #[test]
    fn multiple_references_win_over_everything() {
        assert_eq!(detect("[pop-anime-style] <5x5-grid>", 2, &[]), Signal::Seedream45);
    }

    #[test]
    fn grid_requirement_picks_escalation() {
        assert_eq!(detect("crowd <6x6-grid>", 0, &[]), Signal::GeminiPro);
        assert_eq!(detect("crowd <2x2-grid>", 1, &[]), Signal::Seedream45);
    }

    #[test]
    fn any_grid_token_can_escalate() {
        assert_eq!(detect("crowd <odd-layout> <5x5-grid>", 0, &[]), Signal::GeminiPro);
        assert_eq!(detect("crowd <2x2-grid> <6x6-grid>", 0, &[]), Signal::GeminiPro);
        assert_eq!(detect("crowd <odd-layout> <3x3-grid>", 0, &[]), Signal::Seedream45);
    }

    #[test]
    fn mentions_escalate_only_when_description_is_missing() {
        assert_eq!(
            detect("@rem_(re:zero) waves", 0, &[mention("rem_(re:zero)", Some("blue hair maid"))]),
            Signal::None
        );
        assert_eq!(
            detect("@mika-x9f2 waves", 0, &[mention("mika-x9f2", Some(""))]),
            Signal::Seedream45
        );
        assert_eq!(
            detect("@mika-x9f2 waves", 0, &[mention("mika-x9f2", None)]),
            Signal::Seedream45
        );
        assert_eq!(
            detect("@rem_(re:zero) [pop-anime-style]", 1, &[mention("rem_(re:zero)", None)]),
            Signal::None
        );
    }

    #[test]
    fn general_style_prefers_gemini_and_tag_style_does_not() {
        assert_eq!(detect("[pop-anime-style] a girl", 0, &[]), Signal::Gemini);
        assert_eq!(detect("[vibrant-anime-style] a girl", 0, &[]), Signal::None);
        assert_eq!(detect("[vibrant-anime-style] a girl", 1, &[]), Signal::None);
    }

    #[test]
    fn single_reference_or_unknown_grid_is_gemini() {
        assert_eq!(detect("make it night", 1, &[]), Signal::Gemini);
        assert_eq!(detect("castle <odd-layout>", 0, &[]), Signal::Gemini);
        assert_eq!(detect("castle", 0, &[]), Signal::None);
    }
}
