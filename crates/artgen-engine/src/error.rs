use thiserror::Error;

#[derive(Debug, Error)]
pub enum CompileError {
    #[error("prompt is empty")]
    EmptyPrompt,

    /// No retry is attempted; the caller decides whether to resubmit.
    #[error("uploading reference image {index} ({id}) failed: {source}")]
    UploadFailure {
        index: usize,
        id: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("{count} reference images attached; at most {max} are allowed")]
    TooManyReferences { count: usize, max: usize },

    #[error("generation count must be at least 1, got {0}")]
    InvalidCount(u32),

    #[error("invalid compiler configuration: {0}")]
    Config(String),
}

impl CompileError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, CompileError::UploadFailure { .. })
    }
}
