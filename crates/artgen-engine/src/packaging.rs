use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::Serialize;

use artgen_contracts::request::{ReferenceImage, ReferencePayload};

use crate::error::CompileError;
use crate::upload::Uploader;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PackagingStrategy {
    None,
    Inline,
    Upload,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackagedReferences {
    pub strategy: PackagingStrategy,
    /// Combined base64 length, data URL headers excluded.
    pub encoded_bytes: usize,
    pub payloads: Vec<ReferencePayload>,
}

pub fn data_url(image: &ReferenceImage) -> String {
    format!(
        "data:{};base64,{}",
        image.mime_type,
        BASE64.encode(&image.bytes)
    )
}

/// Length of the base64 payload, the part after the comma.
fn base64_len(data_url: &str) -> usize {
    data_url
        .split_once(',')
        .map_or(data_url.len(), |(_, payload)| payload.len())
}

pub struct ReferencePackager<'a> {
    uploader: &'a dyn Uploader,
    inline_threshold_bytes: usize,
}

impl<'a> ReferencePackager<'a> {
    pub fn new(uploader: &'a dyn Uploader, inline_threshold_bytes: usize) -> Self {
        Self {
            uploader,
            inline_threshold_bytes,
        }
    }

    /// Inlines everything when the encoded total stays below the threshold,
    /// otherwise uploads each image in input order. The first failed upload
    /// aborts packaging.
    pub fn package(&self, images: &[ReferenceImage]) -> Result<PackagedReferences, CompileError> {
        if images.is_empty() {
            return Ok(PackagedReferences {
                strategy: PackagingStrategy::None,
                encoded_bytes: 0,
                payloads: Vec::new(),
            });
        }

        let encoded: Vec<String> = images.iter().map(data_url).collect();
        let encoded_bytes: usize = encoded.iter().map(|url| base64_len(url)).sum();

        if encoded_bytes < self.inline_threshold_bytes {
            let payloads = images
                .iter()
                .zip(encoded)
                .map(|(image, data)| ReferencePayload::Inline {
                    id: image.id.clone(),
                    mime_type: image.mime_type.clone(),
                    data,
                })
                .collect();
            return Ok(PackagedReferences {
                strategy: PackagingStrategy::Inline,
                encoded_bytes,
                payloads,
            });
        }

        tracing::info!(
            encoded_bytes,
            threshold = self.inline_threshold_bytes,
            uploader = self.uploader.name(),
            count = images.len(),
            "references exceed inline limit; uploading"
        );
        let mut payloads = Vec::with_capacity(images.len());
        for (index, image) in images.iter().enumerate() {
            let uri = self
                .uploader
                .upload(&image.bytes, &image.mime_type)
                .map_err(|source| {
                    tracing::warn!(index, id = %image.id, error = %source, "reference upload failed");
                    CompileError::UploadFailure {
                        index,
                        id: image.id.clone(),
                        source,
                    }
                })?;
            payloads.push(ReferencePayload::Uploaded {
                id: image.id.clone(),
                mime_type: image.mime_type.clone(),
                uri,
            });
        }
        Ok(PackagedReferences {
            strategy: PackagingStrategy::Upload,
            encoded_bytes,
            payloads,
        })
    }
}
