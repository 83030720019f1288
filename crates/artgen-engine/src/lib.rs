pub mod config;
pub mod error;
pub mod packaging;
pub mod upload;

use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::{json, Map, Value};

use artgen_contracts::catalog::{
    CharacterDirectory, InMemoryCharacters, PresetCatalog, PresetLookup,
};
use artgen_contracts::dimensions::{AspectRatio, Dimensions, ResolutionTier};
use artgen_contracts::events::{CompileEvent, CompileLog};
use artgen_contracts::models::{
    HeuristicSignalDetector, MentionedCharacter, ModelIdentity, ModelRegistry, ModelResolution,
    ModelResolver, ResolutionRule, ResolveInput, ResolverState, SignalDetector,
};
use artgen_contracts::pricing::CostTable;
use artgen_contracts::prompt::{scan, PromptTemplateCompiler};
use artgen_contracts::request::{GenerationRequest, ReferenceImage};

pub use artgen_contracts::dimensions::resolve_dimensions;
pub use artgen_contracts::prompt::strip_tokens;

use crate::config::CompilerConfig;
use crate::error::CompileError;
use crate::packaging::{PackagingStrategy, ReferencePackager};
use crate::upload::{DryrunUploader, HttpUploader, Uploader};

/// UI-level settings plus the text and images of one submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileInput {
    pub prompt: String,
    pub explicit_model: ModelIdentity,
    pub aspect_ratio: AspectRatio,
    pub resolution: Option<ResolutionTier>,
    pub count: u32,
    pub references: Vec<ReferenceImage>,
    pub negative_prompt: Option<String>,
    pub use_magic_prompt: bool,
    /// Caller-side guard, e.g. the mention dropdown is open.
    pub suspended: bool,
}

impl Default for CompileInput {
    fn default() -> Self {
        Self {
            prompt: String::new(),
            explicit_model: ModelIdentity::AutoModel,
            aspect_ratio: AspectRatio::default(),
            resolution: None,
            count: 1,
            references: Vec::new(),
            negative_prompt: None,
            use_magic_prompt: false,
            suspended: false,
        }
    }
}

impl CompileInput {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Self::default()
        }
    }
}

/// Live model/size/cost readout shown before submitting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Preview {
    pub display_model: ModelIdentity,
    pub effective_model: ModelIdentity,
    pub model_label: String,
    pub rule: ResolutionRule,
    pub sticky_model: Option<ModelIdentity>,
    pub width: u32,
    pub height: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolution: Option<ResolutionTier>,
    pub count: u32,
    pub cost_per_image: u64,
    pub cost: u64,
}

pub struct RequestCompiler {
    config: CompilerConfig,
    registry: ModelRegistry,
    presets: Arc<dyn PresetLookup>,
    characters: Arc<dyn CharacterDirectory>,
    resolver: ModelResolver,
    costs: CostTable,
    uploader: Arc<dyn Uploader>,
    log: Option<CompileLog>,
}

impl RequestCompiler {
    /// Builds every collaborator from `config`: preset and cost overrides,
    /// the character directory, the uploader and the event log.
    pub fn from_config(config: CompilerConfig, session_id: &str) -> Result<Self> {
        config.validate()?;
        let presets: Arc<dyn PresetLookup> = match &config.presets_path {
            Some(path) => Arc::new(PresetCatalog::with_overrides(path)?),
            None => Arc::new(PresetCatalog::default()),
        };
        let costs = match &config.costs_path {
            Some(path) => CostTable::with_overrides(path)?,
            None => CostTable::default(),
        };
        let characters: Arc<dyn CharacterDirectory> = match &config.characters_path {
            Some(path) => Arc::new(InMemoryCharacters::from_path(path)?),
            None => Arc::new(InMemoryCharacters::default()),
        };
        let uploader: Arc<dyn Uploader> = if config.upload.endpoint.is_some() {
            Arc::new(HttpUploader::from_config(&config.upload).context("configuring uploader")?)
        } else {
            Arc::new(DryrunUploader::new(config.upload.prefix.clone()))
        };
        let log = config
            .events_path
            .as_ref()
            .map(|path| CompileLog::new(path, session_id));

        let mut compiler = Self::new(config, presets, costs);
        compiler.characters = characters;
        compiler.uploader = uploader;
        compiler.log = log;
        Ok(compiler)
    }

    /// Heuristic detection, an empty character directory and dry-run uploads.
    pub fn new(config: CompilerConfig, presets: Arc<dyn PresetLookup>, costs: CostTable) -> Self {
        let detector: Arc<dyn SignalDetector> =
            Arc::new(HeuristicSignalDetector::new(presets.clone()));
        let uploader: Arc<dyn Uploader> =
            Arc::new(DryrunUploader::new(config.upload.prefix.clone()));
        Self {
            config,
            registry: ModelRegistry::default(),
            resolver: ModelResolver::new(detector, presets.clone()),
            presets,
            characters: Arc::new(InMemoryCharacters::default()),
            costs,
            uploader,
            log: None,
        }
    }

    pub fn with_characters(mut self, characters: Arc<dyn CharacterDirectory>) -> Self {
        self.characters = characters;
        self
    }

    pub fn with_detector(mut self, detector: Arc<dyn SignalDetector>) -> Self {
        self.resolver = ModelResolver::new(detector, self.presets.clone());
        self
    }

    pub fn with_uploader(mut self, uploader: Arc<dyn Uploader>) -> Self {
        self.uploader = uploader;
        self
    }

    pub fn with_log(mut self, log: CompileLog) -> Self {
        self.log = Some(log);
        self
    }

    pub fn config(&self) -> &CompilerConfig {
        &self.config
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    pub fn costs(&self) -> &CostTable {
        &self.costs
    }

    /// One resolution pass. Updates `state` in place.
    pub fn resolve_model(&self, input: &CompileInput, state: &mut ResolverState) -> ModelResolution {
        let resolution = self.run_resolver(input, state);
        self.record_resolution(&resolution, state);
        resolution
    }

    fn run_resolver(&self, input: &CompileInput, state: &mut ResolverState) -> ModelResolution {
        let mentions = self.mentioned_characters(&input.prompt);
        self.resolver.resolve(
            &ResolveInput {
                explicit_model: input.explicit_model,
                prompt: &input.prompt,
                reference_count: input.references.len(),
                mentions: &mentions,
                suspended: input.suspended || self.characters.is_loading(),
            },
            state,
        )
    }

    fn record_resolution(&self, resolution: &ModelResolution, state: &ResolverState) {
        self.record(&CompileEvent::ModelResolved {
            display_model: resolution.model,
            effective_model: resolution.effective_model(),
            rule: resolution.rule,
            signal: resolution.signal,
            sticky_model: state.sticky_model(),
            sticky_updated: resolution.sticky_updated,
        });
    }

    pub fn preview(&self, input: &CompileInput, state: &mut ResolverState) -> Result<Preview, CompileError> {
        if input.count == 0 {
            return Err(CompileError::InvalidCount(input.count));
        }
        let resolution = self.resolve_model(input, state);
        let effective = resolution.effective_model();
        let tier = tier_for(effective, input.resolution);
        let dims = self.dimensions_for(effective, input.aspect_ratio, tier);
        let cost_per_image = self.costs.per_image_cost(effective, tier);
        Ok(Preview {
            display_model: resolution.model,
            effective_model: effective,
            model_label: self.registry.label(effective),
            rule: resolution.rule,
            sticky_model: state.sticky_model(),
            width: dims.width,
            height: dims.height,
            resolution: tier,
            count: input.count,
            cost_per_image,
            cost: cost_per_image * u64::from(input.count),
        })
    }

    /// Either a complete request, or an error with `state` left as it was.
    pub fn compile(
        &self,
        input: &CompileInput,
        state: &mut ResolverState,
    ) -> Result<GenerationRequest, CompileError> {
        self.compile_with_resolution(input, state)
            .map(|(request, _)| request)
    }

    /// Like [`compile`](Self::compile), also returning the resolver decision for receipts.
    pub fn compile_with_resolution(
        &self,
        input: &CompileInput,
        state: &mut ResolverState,
    ) -> Result<(GenerationRequest, ModelResolution), CompileError> {
        match self.compile_inner(input, state) {
            Ok(compiled) => Ok(compiled),
            Err(err) => {
                tracing::warn!(error = %err, "compile failed");
                self.record(&CompileEvent::CompileFailed {
                    error: err.to_string(),
                });
                Err(err)
            }
        }
    }

    fn compile_inner(
        &self,
        input: &CompileInput,
        state: &mut ResolverState,
    ) -> Result<(GenerationRequest, ModelResolution), CompileError> {
        if input.prompt.trim().is_empty() {
            return Err(CompileError::EmptyPrompt);
        }
        if input.count == 0 {
            return Err(CompileError::InvalidCount(input.count));
        }
        if input.references.len() > self.config.max_reference_images {
            return Err(CompileError::TooManyReferences {
                count: input.references.len(),
                max: self.config.max_reference_images,
            });
        }

        let mut next_state = state.clone();
        let resolution = self.run_resolver(input, &mut next_state);
        let effective = resolution.effective_model();
        let tier = tier_for(effective, input.resolution);
        let dims = self.dimensions_for(effective, input.aspect_ratio, tier);
        let cost_per_image = self.costs.per_image_cost(effective, tier);

        let prompt = PromptTemplateCompiler::new(self.presets.as_ref()).compile(effective, &input.prompt);

        let packaged = ReferencePackager::new(self.uploader.as_ref(), self.config.inline_threshold_bytes)
            .package(&input.references)?;

        let mut metadata = map_object(json!({
            "model_label": self.registry.label(effective),
            "reference_names": input
                .references
                .iter()
                .map(ReferenceImage::display_name)
                .collect::<Vec<_>>(),
            "templated": prompt.templated,
        }));
        if let Some(tier) = tier {
            metadata.insert("resolution".to_string(), Value::String(tier.key().to_string()));
        }
        if effective == ModelIdentity::Gemini && input.references.len() == 1 {
            metadata.insert(
                "aspect_template_ratio".to_string(),
                Value::String(input.aspect_ratio.key().to_string()),
            );
        }
        if packaged.strategy != PackagingStrategy::None {
            metadata.insert("reference_packaging".to_string(), json!(packaged.strategy));
        }

        let request = GenerationRequest {
            display_model: resolution.model,
            effective_model: effective,
            prompt_for_model: prompt.text,
            raw_user_prompt: input.prompt.clone(),
            width: dims.width,
            height: dims.height,
            aspect_ratio: input.aspect_ratio,
            resolution: tier,
            negative_prompt: input
                .negative_prompt
                .as_deref()
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .map(str::to_string),
            count: input.count,
            cost_per_image,
            cost: cost_per_image * u64::from(input.count),
            reference_payload: packaged.payloads,
            no_translate: effective.is_multilingual() || input.use_magic_prompt,
            metadata,
            warnings: prompt.warnings,
        };

        *state = next_state;
        self.record_resolution(&resolution, state);

        tracing::info!(
            model = %effective,
            size = %request.dimensions(),
            count = request.count,
            cost = request.cost,
            "compiled generation request"
        );
        self.record(&CompileEvent::RequestCompiled {
            effective_model: effective,
            width: request.width,
            height: request.height,
            count: request.count,
            cost: request.cost,
            inline_references: request.reference_payload.len() - request.uploaded_count(),
            uploaded_references: request.uploaded_count(),
            templated: prompt.templated,
            warnings: request.warnings.iter().map(ToString::to_string).collect(),
        });
        Ok((request, resolution))
    }

    fn dimensions_for(
        &self,
        model: ModelIdentity,
        aspect: AspectRatio,
        tier: Option<ResolutionTier>,
    ) -> Dimensions {
        resolve_dimensions(aspect, model.dimension_family(), tier)
    }

    fn mentioned_characters(&self, prompt: &str) -> Vec<MentionedCharacter> {
        scan(prompt)
            .mentions
            .into_iter()
            .map(|token| MentionedCharacter {
                info: self.characters.lookup_character(&token.value),
                id: token.value,
            })
            .collect()
    }

    fn record(&self, event: &CompileEvent) {
        let Some(log) = &self.log else {
            return;
        };
        if let Err(err) = log.emit(event) {
            tracing::warn!(path = %log.path().display(), error = %err, "failed to append compile event");
        }
    }
}

/// Only the tiered model carries a resolution; it defaults to 1k.
fn tier_for(model: ModelIdentity, requested: Option<ResolutionTier>) -> Option<ResolutionTier> {
    (model == ModelIdentity::GeminiPro).then(|| requested.unwrap_or_default())
}

fn map_object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}
