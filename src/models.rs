//! Core data types shared by the retrieval pipeline and the job store.

use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// Lifecycle of an analysis request: `PENDING → PROCESSING → COMPLETED | FAILED`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "PENDING",
            JobStatus::Processing => "PROCESSING",
            JobStatus::Completed => "COMPLETED",
            JobStatus::Failed => "FAILED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(JobStatus::Pending),
            "PROCESSING" => Ok(JobStatus::Processing),
            "COMPLETED" => Ok(JobStatus::Completed),
            "FAILED" => Ok(JobStatus::Failed),
            other => anyhow::bail!("unknown job status: {}", other),
        }
    }
}

/// Row of `analysis_requests`.
#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    pub id: String,
    pub query: String,
    pub file_path: String,
    pub status: JobStatus,
    /// Set only when `status` is FAILED.
    pub error: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Row of `analysis_results`. Written once, on success.
#[derive(Debug, Clone)]
pub struct AnalysisResult {
    pub id: i64,
    pub request_id: String,
    pub content: String,
    pub created_at: i64,
}

/// A contiguous slice of document text, the unit of retrieval.
///
/// `start`/`end` are char offsets into the loaded document's full text.
/// Segments live only as long as the index that owns them.
#[derive(Debug, Clone, PartialEq)]
pub struct TextSegment {
    pub id: String,
    pub document_id: String,
    pub index: usize,
    pub text: String,
    pub start: usize,
    pub end: usize,
    /// 1-based page the segment starts on.
    pub page: u32,
    pub hash: String,
}

/// A segment returned by a retriever, with its similarity score.
#[derive(Debug, Clone, Serialize)]
pub struct RetrievedSegment {
    pub index: usize,
    pub page: u32,
    pub score: f32,
    pub text: String,
}

impl RetrievedSegment {
    pub fn from_segment(segment: &TextSegment, score: f32) -> Self {
        Self {
            index: segment.index,
            page: segment.page,
            score,
            text: segment.text.clone(),
        }
    }
}

pub fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%dT%H:%M:%SZ").to_string())
        .unwrap_or_else(|| ts.to_string())
}
