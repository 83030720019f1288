use std::fmt;

use serde::Serialize;

use super::scanner::{remove_span, scan, Token, TokenKind};
use crate::catalog::{PresetEntry, PresetLookup};
use crate::models::{ModelFamily, ModelIdentity};

const COMIC_LEAD: &str = "Generate a comic following these requirements:\n\n";
const IMAGE_LEAD: &str = "Generate an image following these requirements:\n\n";

/// Non-fatal findings attached to a compiled request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CompileWarning {
    UnrecognizedToken { token: TokenKind, value: String },
}

impl fmt::Display for CompileWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompileWarning::UnrecognizedToken { token, value } => {
                write!(f, "Unrecognized {token} token '{value}' left as plain text.")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledPrompt {
    pub text: String,
    pub style: Option<PresetEntry>,
    pub grid: Option<PresetEntry>,
    /// False when the prompt was passed through unchanged.
    pub templated: bool,
    pub warnings: Vec<CompileWarning>,
}

pub struct PromptTemplateCompiler<'a> {
    presets: &'a dyn PresetLookup,
}

impl<'a> PromptTemplateCompiler<'a> {
    pub fn new(presets: &'a dyn PresetLookup) -> Self {
        Self { presets }
    }

    pub fn compile(&self, model: ModelIdentity, prompt: &str) -> CompiledPrompt {
        let scanned = scan(prompt);
        let mut warnings = Vec::new();
        let style = self.resolve(scanned.style.as_ref(), &mut warnings, |value| {
            self.presets.lookup_style(value)
        });
        let grid = self.resolve(scanned.grid.as_ref(), &mut warnings, |value| {
            self.presets.lookup_grid(value)
        });

        let passthrough = |style, grid, warnings| CompiledPrompt {
            text: prompt.to_string(),
            style,
            grid,
            templated: false,
            warnings,
        };

        // Tag models expand tokens downstream.
        if model.family() == ModelFamily::Anime {
            return passthrough(style, grid, warnings);
        }
        if style.is_none() && grid.is_none() {
            return passthrough(style, grid, warnings);
        }

        let mut remaining = prompt.to_string();
        if let (Some(_), Some(token)) = (&style, &scanned.style) {
            remaining = remove_span(&remaining, &token.raw);
        }
        // Style removal re-tidies the text, so the grid span is located again.
        if grid.is_some() {
            if let Some(token) = scan(&remaining).grid {
                remaining = remove_span(&remaining, &token.raw);
            }
        }

        let mut text = String::from(if grid.is_some() { COMIC_LEAD } else { IMAGE_LEAD });
        if !remaining.is_empty() {
            text.push_str(&format!("User input prompt: {remaining}\n\n"));
        }
        if let Some(entry) = &style {
            text.push_str(&format!("Required art style: {}\n\n", entry.fragment));
        }
        if let Some(entry) = &grid {
            text.push_str(&format!("Grid format: {}", entry.fragment));
        }

        CompiledPrompt {
            text,
            style,
            grid,
            templated: true,
            warnings,
        }
    }

    fn resolve(
        &self,
        token: Option<&Token>,
        warnings: &mut Vec<CompileWarning>,
        lookup: impl Fn(&str) -> Option<PresetEntry>,
    ) -> Option<PresetEntry> {
        let token = token?;
        let entry = lookup(&token.value);
        if entry.is_none() {
            tracing::warn!(kind = %token.kind, value = %token.value, "unrecognized prompt token");
            warnings.push(CompileWarning::UnrecognizedToken {
                token: token.kind,
                value: token.value.clone(),
            });
        }
        entry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::PresetCatalog;

    fn compile(model: ModelIdentity, prompt: &str) -> CompiledPrompt {
        let catalog = PresetCatalog::default();
        PromptTemplateCompiler::new(&catalog).compile(model, prompt)
    }

    #[test]
    fn general_model_templates_special_style() {
        let compiled = compile(ModelIdentity::Gemini, "a girl, [vibrant-anime-style]");
        assert!(compiled.templated);
        assert_eq!(
            compiled.text,
            "Generate an image following these requirements:\n\n\
             User input prompt: a girl\n\n\
             Required art style: vibrant anime style\n\n"
        );
        assert!(!compiled.text.contains("[vibrant-anime-style]"));
    }

    #[test]
    fn grid_switches_to_comic_lead_and_ends_with_grid_section() {
        let compiled = compile(
            ModelIdentity::Seedream45,
            "[pop-anime-style] two cats arguing <2x2-grid>",
        );
        assert!(compiled.text.starts_with(COMIC_LEAD));
        assert!(compiled.text.contains("User input prompt: two cats arguing\n\n"));
        assert!(compiled
            .text
            .contains("Required art style: Generate in modern pop"));
        assert!(compiled.text.ends_with("The storyboard should be rendered in 4k quality."));
        let user = compiled.text.find("User input prompt").unwrap_or(usize::MAX);
        let style = compiled.text.find("Required art style").unwrap_or(0);
        let grid = compiled.text.find("Grid format").unwrap_or(0);
        assert!(user < style && style < grid);
    }

    #[test]
    fn tokens_only_prompt_omits_user_section() {
        let compiled = compile(ModelIdentity::GeminiPro, "<5x5-grid>");
        assert_eq!(
            compiled.text,
            format!(
                "{COMIC_LEAD}Grid format: {}",
                compiled.grid.as_ref().map(|g| g.fragment.as_str()).unwrap_or("")
            )
        );
    }

    #[test]
    fn plain_general_prompt_passes_through_byte_for_byte() {
        let prompt = "  a lighthouse at dusk ,, oil on canvas  ";
        let compiled = compile(ModelIdentity::Gemini, prompt);
        assert!(!compiled.templated);
        assert_eq!(compiled.text, prompt);
    }

    #[test]
    fn anime_family_keeps_tokens_in_place() {
        let prompt = "a girl, [vibrant-anime-style] <2x2-grid>";
        let compiled = compile(ModelIdentity::ArtPro, prompt);
        assert_eq!(compiled.text, prompt);
        assert!(compiled.style.is_some());
        assert!(compiled.grid.is_some());
    }

    #[test]
    fn unknown_tokens_warn_and_stay_in_text() {
        let prompt = "castle [no-such-style] <7x7-grid>";
        let compiled = compile(ModelIdentity::Gemini, prompt);
        assert_eq!(compiled.text, prompt);
        assert_eq!(
            compiled.warnings,
            vec![
                CompileWarning::UnrecognizedToken {
                    token: TokenKind::Style,
                    value: "no-such-style".to_string()
                },
                CompileWarning::UnrecognizedToken {
                    token: TokenKind::Grid,
                    value: "7x7-grid".to_string()
                },
            ]
        );
    }

    #[test]
    fn known_grid_with_unknown_style_strips_only_grid() {
        let compiled = compile(ModelIdentity::Gemini, "castle [no-such-style], <2x2-grid>");
        assert!(compiled.templated);
        assert!(compiled
            .text
            .contains("User input prompt: castle [no-such-style]\n\n"));
        assert!(!compiled.text.contains("Required art style"));
        assert_eq!(compiled.warnings.len(), 1);
    }

    #[test]
    fn padded_grid_token_is_stripped_after_style_removal() {
        let compiled = compile(ModelIdentity::Gemini, "[pop-anime-style] duel <  2x2-grid>");
        assert!(compiled.templated);
        assert!(compiled.text.contains("User input prompt: duel\n\n"));
        assert!(!compiled.text.contains('<'));
        assert!(compiled.text.contains("Grid format: Generate a 2x2 grid"));
    }

    #[test]
    fn gpt_and_flux_prompts_pass_through() {
        let prompt = "a cat, [pop-anime-style] <2x2-grid>";
        for model in [ModelIdentity::Gpt, ModelIdentity::Flux, ModelIdentity::FluxContext] {
            let compiled = compile(model, prompt);
            assert!(!compiled.templated);
            assert_eq!(compiled.text, prompt);
        }
    }
}
