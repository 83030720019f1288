use serde::Serialize;
use serde_json::{Map, Value};

use crate::dimensions::{AspectRatio, Dimensions, ResolutionTier};
use crate::models::ModelIdentity;
use crate::prompt::CompileWarning;

/// An attached image. Owned by the request being built.
#[derive(Clone, PartialEq, Eq)]
pub struct ReferenceImage {
    pub id: String,
    pub name: Option<String>,
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

impl ReferenceImage {
    pub fn new(id: impl Into<String>, bytes: Vec<u8>, mime_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            bytes,
            mime_type: mime_type.into(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }
}

impl std::fmt::Debug for ReferenceImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReferenceImage")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("bytes", &self.bytes.len())
            .field("mime_type", &self.mime_type)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReferencePayload {
    /// `data:` URL carried in the request body.
    Inline {
        id: String,
        mime_type: String,
        data: String,
    },
    Uploaded {
        id: String,
        mime_type: String,
        uri: String,
    },
}

impl ReferencePayload {
    pub fn id(&self) -> &str {
        match self {
            ReferencePayload::Inline { id, .. } | ReferencePayload::Uploaded { id, .. } => id,
        }
    }

    pub fn is_inline(&self) -> bool {
        matches!(self, ReferencePayload::Inline { .. })
    }
}

/// Fully compiled submission. Built once, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationRequest {
    pub display_model: ModelIdentity,
    pub effective_model: ModelIdentity,
    pub prompt_for_model: String,
    pub raw_user_prompt: String,
    pub width: u32,
    pub height: u32,
    pub aspect_ratio: AspectRatio,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolution: Option<ResolutionTier>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub negative_prompt: Option<String>,
    pub count: u32,
    pub cost_per_image: u64,
    pub cost: u64,
    pub reference_payload: Vec<ReferencePayload>,
    pub no_translate: bool,
    pub metadata: Map<String, Value>,
    pub warnings: Vec<CompileWarning>,
}

impl GenerationRequest {
    pub fn dimensions(&self) -> Dimensions {
        Dimensions::new(self.width, self.height)
    }

    pub fn uploaded_count(&self) -> usize {
        self.reference_payload
            .iter()
            .filter(|payload| !payload.is_inline())
            .count()
    }
}
