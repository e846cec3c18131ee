//! Error kinds for the analysis pipeline.
//!
//! Each stage has its own enum so callers can match on the failure class.
//! [`AnalysisError`] unifies them for the job worker, which records
//! `"<Kind>: <message>"` as the request's error text.

use std::path::PathBuf;

/// Document loading failures. Surfaced, never swallowed: an empty document
/// and a failed extraction must stay distinguishable downstream.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("not a PDF file: {}", .0.display())]
    NotPdf(PathBuf),

    #[error("PDF extraction failed: {0}")]
    Parse(String),

    #[error("no extractable text in {} (scanned image without OCR layer?)", .0.display())]
    NoText(PathBuf),
}

#[derive(Debug, thiserror::Error)]
pub enum ChunkError {
    #[error("invalid chunk parameters: max_chars={max_chars}, overlap_chars={overlap_chars} (need 0 < overlap < max)")]
    InvalidParams {
        max_chars: usize,
        overlap_chars: usize,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum EmbeddingError {
    #[error("embedding input is empty")]
    EmptyInput,

    #[error("failed to load embedding model: {0}")]
    ModelLoad(String),

    #[error("embedding provider error: {0}")]
    Provider(String),

    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    Dimension { expected: usize, actual: usize },

    #[error("embedding count mismatch: sent {sent} texts, got {received} vectors")]
    Count { sent: usize, received: usize },
}

#[derive(Debug, thiserror::Error)]
pub enum RetrievalError {
    #[error("vector dimension mismatch: index holds {expected}, got {actual}")]
    Dimension { expected: usize, actual: usize },

    #[error("query embedding failed: {0}")]
    Embedding(#[from] EmbeddingError),
}

#[derive(Debug, thiserror::Error)]
pub enum OrchestrationError {
    #[error("step '{step}' failed: {message}")]
    Step { step: String, message: String },

    #[error("language model error: {0}")]
    Model(String),

    #[error("language model returned an empty response")]
    EmptyResponse,
}

/// Queue or database unavailable.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct TransientInfraError(pub String);

impl From<sqlx::Error> for TransientInfraError {
    fn from(e: sqlx::Error) -> Self {
        Self(format!("database error: {}", e))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    #[error(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    Chunk(#[from] ChunkError),

    #[error(transparent)]
    Embedding(#[from] EmbeddingError),

    #[error(transparent)]
    Retrieval(#[from] RetrievalError),

    #[error(transparent)]
    Orchestration(#[from] OrchestrationError),

    #[error(transparent)]
    Infra(#[from] TransientInfraError),

    #[error("analysis timed out after {0}s")]
    Timeout(u64),
}

impl AnalysisError {
    pub fn kind(&self) -> &'static str {
        match self {
            AnalysisError::Load(_) => "LoadError",
            AnalysisError::Chunk(_) => "ChunkError",
            AnalysisError::Embedding(_) => "EmbeddingError",
            AnalysisError::Retrieval(_) => "RetrievalError",
            AnalysisError::Orchestration(_) => "OrchestrationError",
            AnalysisError::Infra(_) => "TransientInfraError",
            AnalysisError::Timeout(_) => "TimeoutError",
        }
    }

    /// Text stored on a FAILED request and shown to polling clients.
    pub fn report(&self) -> String {
        format!("{}: {}", self.kind(), self)
    }
}
