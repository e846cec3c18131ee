//! Per-document semantic retrieval and the report search tool the agents use.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::embedding::{embed_query, Embedder};
use crate::error::RetrievalError;
use crate::index::VectorIndex;
use crate::models::RetrievedSegment;

pub const SEARCH_TOOL_NAME: &str = "Blood Test Report Searcher";
pub const SEARCH_TOOL_DESCRIPTION: &str =
    "Searches the uploaded blood test report for sections relevant to a query.";

const RESULT_SEPARATOR: &str = "\n---\n";
const NO_RESULTS: &str = "No relevant sections found in the report.";

#[async_trait]
pub trait Retriever: Send + Sync {
    /// Up to `k` distinct segments, best first.
    async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<RetrievedSegment>, RetrievalError>;
}

/// Retriever over a single document's index. Built per request and dropped
/// with it; only the embedder is shared.
pub struct DocumentRetriever {
    document_id: String,
    index: VectorIndex,
    embedder: Arc<dyn Embedder>,
}

impl DocumentRetriever {
    pub fn new(document_id: impl Into<String>, index: VectorIndex, embedder: Arc<dyn Embedder>) -> Self {
        Self {
            document_id: document_id.into(),
            index,
            embedder,
        }
    }

    pub fn document_id(&self) -> &str {
        &self.document_id
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
}

#[async_trait]
impl Retriever for DocumentRetriever {
    async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<RetrievedSegment>, RetrievalError> {
        if k == 0 || query.trim().is_empty() || self.index.is_empty() {
            return Ok(Vec::new());
        }

        let query_vec = embed_query(self.embedder.as_ref(), query).await?;
        let ranked = self.index.rank_all(&query_vec)?;

        let mut seen: HashSet<&str> = HashSet::new();
        let hits: Vec<RetrievedSegment> = ranked
            .into_iter()
            .filter(|(segment, _)| seen.insert(segment.text.as_str()))
            .take(k)
            .map(|(segment, score)| RetrievedSegment::from_segment(segment, score))
            .collect();

        tracing::debug!(
            document_id = %self.document_id,
            query,
            hits = hits.len(),
            "retrieved segments"
        );
        Ok(hits)
    }
}

/// The "Blood Test Report Searcher" tool handed to every agent step.
pub struct ReportSearchTool {
    retriever: Arc<dyn Retriever>,
    top_k: usize,
}

impl ReportSearchTool {
    pub fn new(retriever: Arc<dyn Retriever>, top_k: usize) -> Self {
        Self { retriever, top_k }
    }

    pub fn name(&self) -> &'static str {
        SEARCH_TOOL_NAME
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    /// Retrieve for every term of a batch query and merge, keeping the best
    /// score per unique text. Ordered by score descending, then segment index.
    pub async fn search_segments(&self, query: &str) -> Result<Vec<RetrievedSegment>, RetrievalError> {
        let mut best: HashMap<String, RetrievedSegment> = HashMap::new();

        for term in split_batch_query(query) {
            for hit in self.retriever.retrieve(&term, self.top_k).await? {
                let better = best
                    .get(&hit.text)
                    .map_or(true, |existing| hit.score > existing.score);
                if better {
                    best.insert(hit.text.clone(), hit);
                }
            }
        }

        let mut merged: Vec<RetrievedSegment> = best.into_values().collect();
        merged.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.index.cmp(&b.index))
        });
        Ok(merged)
    }

    /// Matching report sections as one text block, each tagged with its page
    /// the same way agent steps receive them.
    pub async fn search(&self, query: &str) -> Result<String, RetrievalError> {
        let hits = self.search_segments(query).await?;
        Ok(render_hits(&hits))
    }
}

/// `[page N] text`
pub fn render_hit(hit: &RetrievedSegment) -> String {
    format!("[page {}] {}", hit.page, hit.text.trim())
}

pub fn render_hits(hits: &[RetrievedSegment]) -> String {
    if hits.is_empty() {
        return NO_RESULTS.to_string();
    }
    hits.iter()
        .map(render_hit)
        .collect::<Vec<_>>()
        .join(RESULT_SEPARATOR)
}

/// `"Patient Name" OR "Lab Results"` → `["Patient Name", "Lab Results"]`.
/// A query without ` OR ` is a single term.
pub fn split_batch_query(query: &str) -> Vec<String> {
    query
        .split(" OR ")
        .map(|term| term.trim().trim_matches('"').trim().to_string())
        .filter(|term| !term.is_empty())
        .collect()
}
