use std::env;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::error::CompileError;

/// Base64 bytes above which references are uploaded instead of inlined.
pub const DEFAULT_INLINE_THRESHOLD_BYTES: usize = 4_718_592;
pub const DEFAULT_MAX_REFERENCE_IMAGES: usize = 9;
pub const CONFIG_ENV: &str = "ARTGEN_CONFIG";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    /// Object store base URL objects are `PUT` to. Unset means dry-run uploads.
    pub endpoint: Option<String>,
    /// Public URL prefix returned to callers; defaults to `endpoint`.
    pub public_base: Option<String>,
    /// Name of the env var holding the bearer token.
    pub token_env: String,
    pub prefix: String,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            public_base: None,
            token_env: "ARTGEN_UPLOAD_TOKEN".to_string(),
            prefix: "app_media/references".to_string(),
        }
    }
}

impl UploadConfig {
    pub fn token(&self) -> Option<String> {
        non_empty_env(&self.token_env)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompilerConfig {
    pub inline_threshold_bytes: usize,
    pub max_reference_images: usize,
    pub presets_path: Option<PathBuf>,
    pub costs_path: Option<PathBuf>,
    pub characters_path: Option<PathBuf>,
    pub events_path: Option<PathBuf>,
    pub sessions_path: Option<PathBuf>,
    pub upload: UploadConfig,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            inline_threshold_bytes: DEFAULT_INLINE_THRESHOLD_BYTES,
            max_reference_images: DEFAULT_MAX_REFERENCE_IMAGES,
            presets_path: None,
            costs_path: None,
            characters_path: None,
            events_path: None,
            sessions_path: None,
            upload: UploadConfig::default(),
        }
    }
}

impl CompilerConfig {
    /// `explicit`, then `$ARTGEN_CONFIG`, then `~/.artgen/config.json`, then defaults.
    pub fn load(explicit: Option<&Path>) -> anyhow::Result<Self> {
        if let Some(path) = explicit {
            return Self::from_path(path);
        }
        if let Some(path) = non_empty_env(CONFIG_ENV) {
            return Self::from_path(Path::new(&path));
        }
        match artgen_home().map(|home| home.join("config.json")) {
            Some(path) if path.is_file() => Self::from_path(&path),
            _ => Ok(Self::default()),
        }
    }

    pub fn from_path(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config: Self = serde_json::from_str(&raw)
            .with_context(|| format!("parsing config {}", path.display()))?;
        config.validate()?;
        tracing::debug!(path = %path.display(), "loaded compiler config");
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), CompileError> {
        if self.inline_threshold_bytes == 0 {
            return Err(CompileError::Config(
                "inline_threshold_bytes must be positive".to_string(),
            ));
        }
        if !(1..=DEFAULT_MAX_REFERENCE_IMAGES).contains(&self.max_reference_images) {
            return Err(CompileError::Config(format!(
                "max_reference_images must be between 1 and {DEFAULT_MAX_REFERENCE_IMAGES}"
            )));
        }
        if self.upload.prefix.trim_matches('/').is_empty() {
            return Err(CompileError::Config("upload.prefix must not be empty".to_string()));
        }
        Ok(())
    }

    pub fn sessions_path_or_default(&self) -> Option<PathBuf> {
        self.sessions_path
            .clone()
            .or_else(|| artgen_home().map(|home| home.join("sessions.json")))
    }
}

pub fn artgen_home() -> Option<PathBuf> {
    env::var_os("HOME")
        .map(PathBuf::from)
        .map(|home| home.join(".artgen"))
}

pub(crate) fn non_empty_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_front_end_limits() {
        let config = CompilerConfig::default();
        assert_eq!(config.inline_threshold_bytes, 4_718_592);
        assert_eq!(config.max_reference_images, 9);
        assert_eq!(config.upload.prefix, "app_media/references");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn explicit_path_fills_missing_fields_with_defaults() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("config.json");
        std::fs::write(
            &path,
            r#"{"inline_threshold_bytes": 1024, "upload": {"endpoint": "https://store.example"}}"#,
        )?;
        let config = CompilerConfig::load(Some(&path))?;
        assert_eq!(config.inline_threshold_bytes, 1024);
        assert_eq!(config.max_reference_images, 9);
        assert_eq!(config.upload.endpoint.as_deref(), Some("https://store.example"));
        assert_eq!(config.upload.token_env, "ARTGEN_UPLOAD_TOKEN");
        Ok(())
    }

    #[test]
    fn invalid_limits_are_rejected() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("config.json");
        std::fs::write(&path, r#"{"max_reference_images": 12}"#)?;
        let err = CompilerConfig::from_path(&path).err();
        assert!(err.is_some_and(|err| err.to_string().contains("max_reference_images")));
        Ok(())
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        assert!(CompilerConfig::load(Some(Path::new("/nonexistent/artgen.json"))).is_err());
    }
}
