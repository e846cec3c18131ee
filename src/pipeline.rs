//! End-to-end analysis of one report: load → chunk → embed → index → agents.
//!
//! [`AnalysisServices`] is built once at startup and shared by every job.
//! Everything derived from a document (segments, vectors, the index) lives
//! inside the job's future and is dropped when the job ends.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::agents::{AnalysisReport, Orchestrator};
use crate::chunk::{chunk_text, ChunkParams};
use crate::config::Config;
use crate::embedding::{create_embedder, Embedder};
use crate::error::{AnalysisError, EmbeddingError, LoadError};
use crate::extract::{load_pdf, LoadedDocument};
use crate::index::{Metric, VectorIndex};
use crate::llm::{create_model, LanguageModel};
use crate::retriever::{DocumentRetriever, ReportSearchTool};

#[derive(Debug, Clone, Copy)]
pub struct PipelineSettings {
    pub chunk: ChunkParams,
    pub top_k: usize,
    pub metric: Metric,
    pub max_searches_per_step: usize,
}

impl PipelineSettings {
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        Ok(Self {
            chunk: ChunkParams::new(config.chunking.max_chars, config.chunking.overlap_chars)?,
            top_k: config.retrieval.top_k,
            metric: config.retrieval.metric.parse()?,
            max_searches_per_step: config.agents.max_searches_per_step,
        })
    }
}

/// Long-lived, read-only collaborators shared across requests.
#[derive(Clone)]
pub struct AnalysisServices {
    pub embedder: Arc<dyn Embedder>,
    pub llm: Arc<dyn LanguageModel>,
    pub settings: PipelineSettings,
}

impl AnalysisServices {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        llm: Arc<dyn LanguageModel>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            embedder,
            llm,
            settings,
        }
    }

    /// Build the configured embedder and language model. Local models are
    /// loaded here, once.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let settings = PipelineSettings::from_config(config)?;
        let embedder = create_embedder(&config.embedding)?;
        let llm = create_model(&config.llm)?;
        tracing::info!(
            embedder = embedder.model_name(),
            dims = embedder.dims(),
            llm = llm.model_name(),
            "analysis services ready"
        );
        Ok(Self::new(embedder, llm, settings))
    }
}

/// Parse the PDF off the async runtime.
pub async fn load_document(path: &Path) -> Result<LoadedDocument, LoadError> {
    let owned: PathBuf = path.to_path_buf();
    tokio::task::spawn_blocking(move || load_pdf(&owned))
        .await
        .map_err(|e| LoadError::Parse(format!("PDF loader task failed: {}", e)))?
}

/// Chunk, embed and index an already-loaded document.
pub async fn index_document(
    doc: &LoadedDocument,
    embedder: Arc<dyn Embedder>,
    settings: &PipelineSettings,
) -> Result<DocumentRetriever, AnalysisError> {
    let mut segments = chunk_text(&doc.id, &doc.text(), &settings.chunk);
    for segment in &mut segments {
        segment.page = doc.page_at(segment.start);
    }
    segments.retain(|s| !s.text.trim().is_empty());

    let mut index = VectorIndex::new(settings.metric);
    if segments.is_empty() {
        return Ok(DocumentRetriever::new(doc.id.clone(), index, embedder));
    }

    let texts: Vec<String> = segments.iter().map(|s| s.text.clone()).collect();
    let vectors = embedder.embed(&texts).await?;
    if vectors.len() != segments.len() {
        return Err(EmbeddingError::Count {
            sent: segments.len(),
            received: vectors.len(),
        }
        .into());
    }

    for (segment, vector) in segments.into_iter().zip(vectors) {
        index.insert(segment, vector)?;
    }

    tracing::debug!(
        document_id = %doc.id,
        pages = doc.pages.len(),
        segments = index.len(),
        dims = ?index.dims(),
        metric = ?index.metric(),
        "document indexed"
    );
    Ok(DocumentRetriever::new(doc.id.clone(), index, embedder))
}

/// Load and index a report from disk.
pub async fn build_retriever(
    path: &Path,
    embedder: Arc<dyn Embedder>,
    settings: &PipelineSettings,
) -> Result<DocumentRetriever, AnalysisError> {
    let doc = load_document(path).await?;
    index_document(&doc, embedder, settings).await
}

/// Run the full four-step analysis of the report at `path`.
pub async fn analyze(
    services: &AnalysisServices,
    query: &str,
    path: &Path,
) -> Result<AnalysisReport, AnalysisError> {
    let retriever = build_retriever(path, Arc::clone(&services.embedder), &services.settings).await?;
    tracing::info!(
        document_id = retriever.document_id(),
        segments = retriever.len(),
        "report ready for analysis"
    );
    let tool = ReportSearchTool::new(Arc::new(retriever), services.settings.top_k);
    Orchestrator::standard(services.settings.max_searches_per_step)
        .run(query, &tool, services.llm.as_ref())
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashingEmbedder;
    use crate::retriever::Retriever;

    fn settings() -> PipelineSettings {
        PipelineSettings::from_config(&Config::minimal()).unwrap()
    }

    #[tokio::test]
    async fn pages_are_assigned_from_offsets() {
        let doc = LoadedDocument::from_pages(
            "r.pdf",
            vec![
                "Patient Name: Jane Doe\nLab Results".into(),
                "Hemoglobin 13.5 g/dL (Reference: 12.0–15.5)".into(),
            ],
        );
        let mut s = settings();
        s.chunk = ChunkParams::new(40, 0).unwrap();
        let retriever = index_document(&doc, Arc::new(HashingEmbedder::default()), &s)
            .await
            .unwrap();
        let hits = retriever.retrieve("hemoglobin", 1).await.unwrap();
        assert_eq!(hits[0].page, 2);
    }

    #[tokio::test]
    async fn missing_file_is_load_error() {
        let err = build_retriever(
            Path::new("/no/such/report.pdf"),
            Arc::new(HashingEmbedder::default()),
            &settings(),
        )
        .await
        .err()
        .unwrap();
        assert_eq!(err.kind(), "LoadError");
    }
}
