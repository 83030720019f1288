use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::registry::ModelIdentity;
use super::signals::{MentionedCharacter, Signal, SignalDetector, SignalInput};
use crate::catalog::PresetLookup;
use crate::prompt::scan;

/// Per-session resolver memory, threaded through every pass by the caller.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "StoredResolverState")]
pub struct ResolverState {
    sticky_model: Option<ModelIdentity>,
    last_model: Option<ModelIdentity>,
}

#[derive(Deserialize)]
struct StoredResolverState {
    #[serde(default)]
    sticky_model: Option<ModelIdentity>,
    #[serde(default)]
    last_model: Option<ModelIdentity>,
}

impl From<StoredResolverState> for ResolverState {
    fn from(stored: StoredResolverState) -> Self {
        let mut state = ResolverState {
            sticky_model: None,
            last_model: stored.last_model,
        };
        if let Some(model) = stored.sticky_model {
            state.set_sticky(model);
        }
        state
    }
}

impl ResolverState {
    pub fn sticky_model(&self) -> Option<ModelIdentity> {
        self.sticky_model
    }

    pub fn last_model(&self) -> Option<ModelIdentity> {
        self.last_model
    }

    /// Ignores models outside the escalation set. Returns whether the value changed.
    pub fn set_sticky(&mut self, model: ModelIdentity) -> bool {
        if !model.is_sticky_eligible() || self.sticky_model == Some(model) {
            return false;
        }
        self.sticky_model = Some(model);
        true
    }

    pub fn clear_sticky(&mut self) {
        self.sticky_model = None;
    }

    /// User picked a model from the selector. Re-selecting Auto forgets escalations
    /// and resets the displayed model.
    pub fn on_model_selected(&mut self, model: ModelIdentity) {
        if model.is_auto() {
            self.clear_sticky();
        }
        self.last_model = Some(model);
    }
}

/// Which branch of the decision produced the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionRule {
    Explicit,
    Suspended,
    EscalateSeedream,
    EscalateGeminiPro,
    GeminiSignal,
    TagStyle,
    Sticky,
    Default,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ModelResolution {
    /// What the selector shows; may still be `AutoModel`.
    pub model: ModelIdentity,
    pub rule: ResolutionRule,
    pub signal: Option<Signal>,
    pub sticky_updated: bool,
}

impl ModelResolution {
    /// Never `AutoModel`.
    pub fn effective_model(&self) -> ModelIdentity {
        self.model.or_default()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ResolveInput<'a> {
    pub explicit_model: ModelIdentity,
    pub prompt: &'a str,
    pub reference_count: usize,
    pub mentions: &'a [MentionedCharacter],
    /// Mention dropdown open or character data still loading.
    pub suspended: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StyleClass {
    Absent,
    General,
    Tag,
}

pub struct ModelResolver {
    detector: Arc<dyn SignalDetector>,
    presets: Arc<dyn PresetLookup>,
}

impl ModelResolver {
    pub fn new(detector: Arc<dyn SignalDetector>, presets: Arc<dyn PresetLookup>) -> Self {
        Self { detector, presets }
    }

    pub fn detector_name(&self) -> &str {
        self.detector.name()
    }

    pub fn resolve(&self, input: &ResolveInput<'_>, state: &mut ResolverState) -> ModelResolution {
        if !input.explicit_model.is_auto() {
            state.last_model = Some(input.explicit_model);
            return ModelResolution {
                model: input.explicit_model,
                rule: ResolutionRule::Explicit,
                signal: None,
                sticky_updated: false,
            };
        }

        if input.suspended {
            let model = state
                .last_model
                .or(state.sticky_model)
                .unwrap_or(ModelIdentity::AutoModel);
            return ModelResolution {
                model,
                rule: ResolutionRule::Suspended,
                signal: None,
                sticky_updated: false,
            };
        }

        let signal = self.detector.detect(&SignalInput {
            prompt: input.prompt,
            reference_count: input.reference_count,
            mentions: input.mentions,
        });
        let style = self.classify_style(input.prompt);

        let (model, rule) = match (signal, style) {
            (Signal::Seedream45, _) => (ModelIdentity::Seedream45, ResolutionRule::EscalateSeedream),
            (Signal::GeminiPro, _) => (ModelIdentity::GeminiPro, ResolutionRule::EscalateGeminiPro),
            (Signal::Gemini, StyleClass::Absent | StyleClass::Tag) => {
                (ModelIdentity::Gemini, ResolutionRule::GeminiSignal)
            }
            (_, StyleClass::Tag) => (ModelIdentity::ArtPro, ResolutionRule::TagStyle),
            _ => match state.sticky_model {
                Some(sticky) => (sticky, ResolutionRule::Sticky),
                None => (ModelIdentity::AutoModel, ResolutionRule::Default),
            },
        };

        let sticky_updated = matches!(
            rule,
            ResolutionRule::EscalateSeedream | ResolutionRule::EscalateGeminiPro
        ) && state.set_sticky(model);
        state.last_model = Some(model);

        tracing::debug!(
            detector = self.detector.name(),
            ?signal,
            ?rule,
            model = %model,
            sticky_updated,
            "resolved model"
        );

        ModelResolution {
            model,
            rule,
            signal: Some(signal),
            sticky_updated,
        }
    }

    fn classify_style(&self, prompt: &str) -> StyleClass {
        match scan(prompt).style {
            None => StyleClass::Absent,
            Some(token) if self.presets.is_general_style(&token.value) => StyleClass::General,
            Some(_) => StyleClass::Tag,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::PresetCatalog;
    use crate::models::HeuristicSignalDetector;

    struct FixedSignal(Signal);

    impl SignalDetector for FixedSignal {
        fn name(&self) -> &str {
            "fixed"
        }

        fn detect(&self, _input: &SignalInput<'_>) -> Signal {
            self.0
        }
    }

    fn resolver() -> ModelResolver {
        let presets: Arc<dyn PresetLookup> = Arc::new(PresetCatalog::default());
        ModelResolver::new(
            Arc::new(HeuristicSignalDetector::new(presets.clone())),
            presets,
        )
    }

    fn auto(prompt: &str, reference_count: usize) -> ResolveInput<'_> {
        ResolveInput {
            explicit_model: ModelIdentity::AutoModel,
            prompt,
            reference_count,
            mentions: &[],
            suspended: false,
        }
    }

    #[test]
    fn explicit_model_always_wins() {
        let mut state = ResolverState::default();
        let mut input = auto("crowd <6x6-grid>", 3);
        input.explicit_model = ModelIdentity::Noobai;
        input.suspended = true;
        let resolution = resolver().resolve(&input, &mut state);
        assert_eq!(resolution.model, ModelIdentity::Noobai);
        assert_eq!(resolution.rule, ResolutionRule::Explicit);
        assert_eq!(state.sticky_model(), None);
    }

    #[test]
    fn dense_grid_escalates_and_sticks() {
        let resolver = resolver();
        let mut state = ResolverState::default();
        let first = resolver.resolve(&auto("crowd <5x5-grid>", 0), &mut state);
        assert_eq!(first.model, ModelIdentity::GeminiPro);
        assert!(first.sticky_updated);

        let second = resolver.resolve(&auto("crowd", 0), &mut state);
        assert_eq!(second.model, ModelIdentity::GeminiPro);
        assert_eq!(second.rule, ResolutionRule::Sticky);
    }

    #[test]
    fn sticky_survives_default_passes_until_auto_is_reselected() {
        let resolver = resolver();
        let mut state = ResolverState::default();
        resolver.resolve(&auto("two refs", 2), &mut state);
        for _ in 0..3 {
            let pass = resolver.resolve(&auto("plain", 0), &mut state);
            assert_eq!(pass.model, ModelIdentity::Seedream45);
        }

        state.on_model_selected(ModelIdentity::AutoModel);
        let reset = resolver.resolve(&auto("plain", 0), &mut state);
        assert_eq!(reset.model, ModelIdentity::AutoModel);
        assert_eq!(reset.effective_model(), ModelIdentity::ArtPro);
    }

    #[test]
    fn different_escalation_replaces_sticky() {
        let resolver = resolver();
        let mut state = ResolverState::default();
        resolver.resolve(&auto("two refs", 2), &mut state);
        resolver.resolve(&auto("crowd <4x4-grid>", 0), &mut state);
        assert_eq!(state.sticky_model(), Some(ModelIdentity::GeminiPro));
    }

    #[test]
    fn single_reference_gemini_is_reversible() {
        let resolver = resolver();
        let mut state = ResolverState::default();
        let with_ref = resolver.resolve(&auto("make it night", 1), &mut state);
        assert_eq!(with_ref.model, ModelIdentity::Gemini);
        assert!(!with_ref.sticky_updated);

        let without = resolver.resolve(&auto("make it night", 0), &mut state);
        assert_eq!(without.model, ModelIdentity::AutoModel);
        assert_eq!(state.sticky_model(), None);
    }

    #[test]
    fn tag_style_selects_art_pro_without_sticking() {
        let resolver = resolver();
        let mut state = ResolverState::default();
        let styled = resolver.resolve(&auto("[vibrant-anime-style] a girl", 0), &mut state);
        assert_eq!(styled.model, ModelIdentity::ArtPro);
        assert_eq!(styled.rule, ResolutionRule::TagStyle);
        assert_eq!(state.sticky_model(), None);
    }

    #[test]
    fn gemini_signal_is_ignored_with_general_style() {
        let presets: Arc<dyn PresetLookup> = Arc::new(PresetCatalog::default());
        let resolver = ModelResolver::new(Arc::new(FixedSignal(Signal::Gemini)), presets);
        let mut state = ResolverState::default();
        let general = resolver.resolve(&auto("[pop-anime-style] a girl", 0), &mut state);
        assert_eq!(general.rule, ResolutionRule::Default);

        let tag = resolver.resolve(&auto("[vibrant-anime-style] a girl", 0), &mut state);
        assert_eq!(tag.model, ModelIdentity::Gemini);
    }

    #[test]
    fn suspended_pass_keeps_previous_model() {
        let resolver = resolver();
        let mut state = ResolverState::default();
        resolver.resolve(&auto("make it night", 1), &mut state);

        let mut input = auto("@someone-abc1 typing", 3);
        input.suspended = true;
        let held = resolver.resolve(&input, &mut state);
        assert_eq!(held.model, ModelIdentity::Gemini);
        assert_eq!(held.rule, ResolutionRule::Suspended);
        assert_eq!(state.sticky_model(), None);
    }

    #[test]
    fn suspended_pass_after_reselecting_auto_shows_auto() {
        let resolver = resolver();
        let mut state = ResolverState::default();
        let mut explicit = auto("castle", 0);
        explicit.explicit_model = ModelIdentity::Noobai;
        resolver.resolve(&explicit, &mut state);
        assert_eq!(state.last_model(), Some(ModelIdentity::Noobai));

        state.on_model_selected(ModelIdentity::AutoModel);
        let mut input = auto("castle @someone", 0);
        input.suspended = true;
        let held = resolver.resolve(&input, &mut state);
        assert_eq!(held.model, ModelIdentity::AutoModel);
        assert_eq!(held.rule, ResolutionRule::Suspended);
    }

    #[test]
    fn resolution_is_idempotent_for_same_inputs() {
        let resolver = resolver();
        let mut state = ResolverState::default();
        let first = resolver.resolve(&auto("crowd <2x2-grid>", 0), &mut state);
        let snapshot = state.clone();
        let second = resolver.resolve(&auto("crowd <2x2-grid>", 0), &mut state);
        assert_eq!(first.model, second.model);
        assert_eq!(state, snapshot);
        assert!(!second.sticky_updated);
    }

    #[test]
    fn sticky_guard_rejects_non_escalation_models() {
        let mut state = ResolverState::default();
        assert!(!state.set_sticky(ModelIdentity::Gemini));
        assert!(!state.set_sticky(ModelIdentity::ArtPro));
        assert!(state.set_sticky(ModelIdentity::Seedream45));
        assert_eq!(state.sticky_model(), Some(ModelIdentity::Seedream45));
    }

    #[test]
    fn stored_state_cannot_smuggle_non_sticky_model() -> anyhow::Result<()> {
        let state: ResolverState =
            serde_json::from_str(r#"{"sticky_model": "Gemini", "last_model": "Gemini"}"#)?;
        assert_eq!(state.sticky_model(), None);
        assert_eq!(state.last_model(), Some(ModelIdentity::Gemini));
        Ok(())
    }
}
