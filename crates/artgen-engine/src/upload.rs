use std::time::Duration;

use anyhow::{bail, Context, Result};
use reqwest::blocking::Client as HttpClient;
use sha2::{Digest, Sha256};

use crate::config::UploadConfig;

/// Stores one image and returns a URI the generation backend can fetch.
pub trait Uploader: Send + Sync {
    fn name(&self) -> &str;
    fn upload(&self, bytes: &[u8], mime_type: &str) -> Result<String>;
}

/// Extension from the MIME subtype, `jpg` when there is none.
pub fn extension_for_mime(mime_type: &str) -> String {
    let subtype = mime_type
        .split(';')
        .next()
        .and_then(|essence| essence.split_once('/'))
        .map(|(_, subtype)| subtype.split('+').next().unwrap_or(subtype))
        .map(|subtype| subtype.trim().to_ascii_lowercase())
        .unwrap_or_default();
    if subtype.is_empty() || !subtype.chars().all(|ch| ch.is_ascii_alphanumeric()) {
        "jpg".to_string()
    } else {
        subtype
    }
}

pub fn object_key(prefix: &str, mime_type: &str) -> String {
    format!(
        "{}/{}.{}",
        prefix.trim_matches('/'),
        uuid::Uuid::new_v4(),
        extension_for_mime(mime_type)
    )
}

/// Content-addressed URIs with no network access.
pub struct DryrunUploader {
    base: String,
    prefix: String,
}

impl DryrunUploader {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            base: "dryrun://uploads".to_string(),
            prefix: prefix.into(),
        }
    }
}

impl Default for DryrunUploader {
    fn default() -> Self {
        Self::new(UploadConfig::default().prefix)
    }
}

impl Uploader for DryrunUploader {
    fn name(&self) -> &str {
        "dryrun"
    }

    fn upload(&self, bytes: &[u8], mime_type: &str) -> Result<String> {
        let digest = hex::encode(Sha256::digest(bytes));
        Ok(format!(
            "{}/{}/{}.{}",
            self.base,
            self.prefix.trim_matches('/'),
            &digest[..16],
            extension_for_mime(mime_type)
        ))
    }
}

/// `PUT`s each object to `{endpoint}/{prefix}/{uuid}.{ext}`.
pub struct HttpUploader {
    endpoint: String,
    public_base: String,
    prefix: String,
    token: Option<String>,
    http: HttpClient,
}

impl HttpUploader {
    pub fn from_config(config: &UploadConfig) -> Result<Self> {
        let Some(endpoint) = config
            .endpoint
            .as_deref()
            .map(|value| value.trim().trim_end_matches('/').to_string())
            .filter(|value| !value.is_empty())
        else {
            bail!("upload.endpoint is not configured");
        };
        let public_base = config
            .public_base
            .as_deref()
            .map(|value| value.trim().trim_end_matches('/').to_string())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| endpoint.clone());
        let http = HttpClient::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .context("building upload http client")?;
        Ok(Self {
            endpoint,
            public_base,
            prefix: config.prefix.clone(),
            token: config.token(),
            http,
        })
    }
}

impl Uploader for HttpUploader {
    fn name(&self) -> &str {
        "http"
    }

    fn upload(&self, bytes: &[u8], mime_type: &str) -> Result<String> {
        let key = object_key(&self.prefix, mime_type);
        let url = format!("{}/{}", self.endpoint, key);
        let mut request = self
            .http
            .put(&url)
            .header(reqwest::header::CONTENT_TYPE, mime_type)
            .body(bytes.to_vec());
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        let response = request
            .send()
            .with_context(|| format!("upload request to {url} failed"))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            bail!(
                "upload to {url} returned {}: {}",
                status.as_u16(),
                body.chars().take(240).collect::<String>()
            );
        }
        tracing::debug!(%url, bytes = bytes.len(), "uploaded reference image");
        Ok(format!("{}/{}", self.public_base, key))
    }
}
