use thiserror::Error;

/// Failure taxonomy for the extraction pass. Expected absences (no keyword
/// hit, no identifier in the window) are plain result values, never errors.
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("unsupported input format: {0}")]
    UnsupportedFormat(String),

    #[error("text extraction failed for {path} page {page}: {reason}")]
    ExtractionFailure {
        path: String,
        page: usize,
        reason: String,
    },

    #[error("record sink write failed: {0}")]
    SinkWriteFailure(String),

    #[error("output document write failed for {path}: {reason}")]
    OutputWriteFailure { path: String, reason: String },
}
