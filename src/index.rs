//! In-memory brute-force vector index.
//!
//! One index per analysis request. Reports are a few pages, so scanning every
//! stored vector on each query is cheaper than maintaining an ANN structure.

use std::str::FromStr;

use crate::embedding::cosine_similarity;
use crate::error::RetrievalError;
use crate::models::TextSegment;

/// Similarity measure. Higher scores are always better.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Metric {
    #[default]
    Cosine,
    Dot,
    /// Score is the negative L2 distance.
    Euclidean,
}

impl Metric {
    pub fn score(&self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            Metric::Cosine => cosine_similarity(a, b),
            Metric::Dot => a.iter().zip(b).map(|(x, y)| x * y).sum(),
            Metric::Euclidean => -a
                .iter()
                .zip(b)
                .map(|(x, y)| (x - y) * (x - y))
                .sum::<f32>()
                .sqrt(),
        }
    }
}

impl FromStr for Metric {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cosine" => Ok(Metric::Cosine),
            "dot" => Ok(Metric::Dot),
            "euclidean" => Ok(Metric::Euclidean),
            other => anyhow::bail!("unknown retrieval metric: {}", other),
        }
    }
}

pub struct VectorIndex {
    metric: Metric,
    dims: Option<usize>,
    entries: Vec<(TextSegment, Vec<f32>)>,
}

impl VectorIndex {
    pub fn new(metric: Metric) -> Self {
        Self {
            metric,
            dims: None,
            entries: Vec::new(),
        }
    }

    /// Add a segment. The first vector fixes the index dimension.
    pub fn insert(&mut self, segment: TextSegment, vector: Vec<f32>) -> Result<(), RetrievalError> {
        match self.dims {
            Some(dims) if dims != vector.len() => {
                return Err(RetrievalError::Dimension {
                    expected: dims,
                    actual: vector.len(),
                })
            }
            None => self.dims = Some(vector.len()),
            _ => {}
        }
        self.entries.push((segment, vector));
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn dims(&self) -> Option<usize> {
        self.dims
    }

    pub fn metric(&self) -> Metric {
        self.metric
    }

    /// Score every entry and return the best `k`, ordered by score
    /// descending, ties by segment index ascending.
    pub fn search(
        &self,
        query: &[f32],
        k: usize,
    ) -> Result<Vec<(&TextSegment, f32)>, RetrievalError> {
        if let Some(dims) = self.dims {
            if dims != query.len() {
                return Err(RetrievalError::Dimension {
                    expected: dims,
                    actual: query.len(),
                });
            }
        }

        let mut scored: Vec<(&TextSegment, f32)> = self
            .entries
            .iter()
            .map(|(segment, vector)| (segment, self.metric.score(query, vector)))
            .collect();
        sort_ranked(&mut scored);
        scored.truncate(k);
        Ok(scored)
    }

    /// All entries ranked against `query`; used when the caller needs to
    /// filter before truncating.
    pub(crate) fn rank_all(&self, query: &[f32]) -> Result<Vec<(&TextSegment, f32)>, RetrievalError> {
        self.search(query, self.entries.len())
    }
}

pub(crate) fn sort_ranked(scored: &mut [(&TextSegment, f32)]) {
    scored.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.0.index.cmp(&b.0.index))
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seg(index: usize, text: &str) -> TextSegment {
        TextSegment {
            id: format!("s{}", index),
            document_id: "doc".into(),
            index,
            text: text.into(),
            start: 0,
            end: text.chars().count(),
            page: 1,
            hash: String::new(),
        }
    }

    #[test]
    fn metric_parses() {
        assert_eq!("dot".parse::<Metric>().unwrap(), Metric::Dot);
        assert!("manhattan".parse::<Metric>().is_err());
    }

    #[test]
    fn euclidean_prefers_closer_vectors() {
        let m = Metric::Euclidean;
        assert!(m.score(&[0.0, 0.0], &[1.0, 0.0]) > m.score(&[0.0, 0.0], &[3.0, 4.0]));
        assert_eq!(m.score(&[0.0, 0.0], &[3.0, 4.0]), -5.0);
    }

    #[test]
    fn dimension_mismatch_rejected() {
        let mut index = VectorIndex::new(Metric::Cosine);
        index.insert(seg(0, "a"), vec![1.0, 0.0]).unwrap();
        let err = index.insert(seg(1, "b"), vec![1.0, 0.0, 0.0]).unwrap_err();
        assert!(matches!(
            err,
            RetrievalError::Dimension {
                expected: 2,
                actual: 3
            }
        ));
        assert!(index.search(&[1.0], 1).is_err());
    }

    #[test]
    fn search_orders_by_score_then_index() {
        let mut index = VectorIndex::new(Metric::Cosine);
        index.insert(seg(0, "far"), vec![0.0, 1.0]).unwrap();
        index.insert(seg(1, "tie-b"), vec![1.0, 0.0]).unwrap();
        index.insert(seg(2, "tie-a"), vec![2.0, 0.0]).unwrap();

        let hits = index.search(&[1.0, 0.0], 3).unwrap();
        let order: Vec<usize> = hits.iter().map(|(s, _)| s.index).collect();
        assert_eq!(order, vec![1, 2, 0]);
    }

    #[test]
    fn k_larger_than_index_returns_all() {
        let mut index = VectorIndex::new(Metric::Dot);
        index.insert(seg(0, "a"), vec![1.0]).unwrap();
        assert_eq!(index.search(&[1.0], 10).unwrap().len(), 1);
        assert!(VectorIndex::new(Metric::Dot).search(&[1.0], 3).unwrap().is_empty());
    }
}
