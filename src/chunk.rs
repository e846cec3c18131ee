//! Overlapping fixed-window text chunker.
//!
//! Splits document text into [`TextSegment`]s of at most `max_chars`
//! characters, each starting exactly `overlap_chars` characters before the
//! previous one ended. A window that does not reach the end of the text is
//! cut at the last newline (else the last space) that lies past the overlap,
//! so lab-result lines are kept whole where possible.
//!
//! Dropping the first `overlap_chars` characters of every segment after the
//! first and concatenating reproduces the input exactly.
//!
//! Each segment gets a random UUID plus a SHA-256 hash of its text.

use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::ChunkError;
use crate::models::TextSegment;

/// Validated window parameters: `0 <= overlap_chars < max_chars`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkParams {
    max_chars: usize,
    overlap_chars: usize,
}

impl ChunkParams {
    pub fn new(max_chars: usize, overlap_chars: usize) -> Result<Self, ChunkError> {
        if max_chars == 0 || overlap_chars >= max_chars {
            return Err(ChunkError::InvalidParams {
                max_chars,
                overlap_chars,
            });
        }
        Ok(Self {
            max_chars,
            overlap_chars,
        })
    }

    pub fn max_chars(&self) -> usize {
        self.max_chars
    }

    pub fn overlap_chars(&self) -> usize {
        self.overlap_chars
    }
}

/// Split text into overlapping segments. Indices are contiguous from 0.
///
/// Text no longer than `max_chars` (including empty text) yields exactly one
/// segment. `page` is left at 1; the pipeline assigns real page numbers.
pub fn chunk_text(document_id: &str, text: &str, params: &ChunkParams) -> Vec<TextSegment> {
    let chars: Vec<char> = text.chars().collect();
    let len = chars.len();

    if len <= params.max_chars {
        return vec![make_segment(document_id, 0, 0, len, text)];
    }

    let mut segments = Vec::new();
    let mut start = 0usize;

    loop {
        let window_end = (start + params.max_chars).min(len);
        let end = if window_end < len {
            find_cut(&chars, start + params.overlap_chars, window_end)
        } else {
            window_end
        };

        let piece: String = chars[start..end].iter().collect();
        segments.push(make_segment(document_id, segments.len(), start, end, &piece));

        if end >= len {
            break;
        }
        start = end - params.overlap_chars;
    }

    segments
}

/// Cut position in `(floor, window_end]`: just after the last newline, else
/// just after the last space, else `window_end`. Keeping the cut above
/// `floor` guarantees the next window starts past the current one.
fn find_cut(chars: &[char], floor: usize, window_end: usize) -> usize {
    let search = &chars[floor..window_end];
    search
        .iter()
        .rposition(|&c| c == '\n')
        .or_else(|| search.iter().rposition(|&c| c == ' '))
        .map(|pos| floor + pos + 1)
        .unwrap_or(window_end)
}

fn make_segment(
    document_id: &str,
    index: usize,
    start: usize,
    end: usize,
    text: &str,
) -> TextSegment {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let hash = format!("{:x}", hasher.finalize());

    TextSegment {
        id: Uuid::new_v4().to_string(),
        document_id: document_id.to_string(),
        index,
        text: text.to_string(),
        start,
        end,
        page: 1,
        hash,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(max: usize, overlap: usize) -> ChunkParams {
        ChunkParams::new(max, overlap).unwrap()
    }

    fn stitch(segments: &[TextSegment], overlap: usize) -> String {
        let mut out = String::new();
        for (i, s) in segments.iter().enumerate() {
            if i == 0 {
                out.push_str(&s.text);
            } else {
                out.extend(s.text.chars().skip(overlap));
            }
        }
        out
    }

    fn sample_report() -> String {
        [
            "Patient Name: Jane Doe",
            "Lab Results - Complete Blood Count",
            "Hemoglobin 13.5 g/dL (Reference: 12.0–15.5)",
            "Hematocrit 40 % (Reference: 36–46)",
            "WBC 6.1 10^3/uL (Reference: 4.5–11.0)",
            "Platelets 250 10^3/uL (Reference: 150–400)",
            "Glucose, Fasting 95 mg/dL (Reference: 70–99)",
            "Cholesterol, Total 180 mg/dL (Reference: <200)",
            "LDL Cholesterol 110 mg/dL (Reference: <130)",
            "HDL Cholesterol 55 mg/dL (Reference: >40)",
            "Triglycerides 120 mg/dL (Reference: <150)",
            "Vitamin D 32 ng/mL (Reference: 30–100)",
        ]
        .join("\n")
    }

    #[test]
    fn rejects_overlap_not_smaller_than_window() {
        assert!(ChunkParams::new(10, 10).is_err());
        assert!(ChunkParams::new(0, 0).is_err());
        assert!(ChunkParams::new(10, 9).is_ok());
    }

    #[test]
    fn short_text_single_segment() {
        let segments = chunk_text("doc1", "Hemoglobin 13.5 g/dL", &params(100, 20));
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].index, 0);
        assert_eq!(segments[0].text, "Hemoglobin 13.5 g/dL");
        assert_eq!((segments[0].start, segments[0].end), (0, 20));
    }

    #[test]
    fn empty_text_single_segment() {
        let segments = chunk_text("doc1", "", &params(100, 20));
        assert_eq!(segments.len(), 1);
        assert!(segments[0].text.is_empty());
    }

    #[test]
    fn text_exactly_window_size_single_segment() {
        let text = "x".repeat(50);
        assert_eq!(chunk_text("doc1", &text, &params(50, 10)).len(), 1);
    }

    #[test]
    fn stitching_reconstructs_text_for_many_parameters() {
        let text = sample_report();
        for max in [16usize, 25, 40, 64, 100, 333] {
            for overlap in [0usize, 1, 5, max / 2, max - 1] {
                let p = params(max, overlap);
                let segments = chunk_text("doc1", &text, &p);
                assert_eq!(
                    stitch(&segments, overlap),
                    text,
                    "reconstruction failed for max={} overlap={}",
                    max,
                    overlap
                );
            }
        }
    }

    #[test]
    fn stitching_reconstructs_text_without_break_points() {
        let text = "abcdefghijklmnopqrstuvwxyz".repeat(7);
        let segments = chunk_text("doc1", &text, &params(30, 7));
        assert!(segments.len() > 1);
        assert_eq!(stitch(&segments, 7), text);
    }

    #[test]
    fn segments_respect_window_and_overlap() {
        let text = sample_report();
        let p = params(80, 20);
        let segments = chunk_text("doc1", &text, &p);
        for pair in segments.windows(2) {
            assert!(pair[0].text.chars().count() <= 80);
            assert_eq!(pair[1].start, pair[0].end - 20);
            let tail: String = pair[0].text.chars().skip(pair[0].text.chars().count() - 20).collect();
            let head: String = pair[1].text.chars().take(20).collect();
            assert_eq!(tail, head);
        }
    }

    #[test]
    fn cuts_prefer_line_boundaries() {
        let text = sample_report();
        let segments = chunk_text("doc1", &text, &params(120, 30));
        for s in &segments[..segments.len() - 1] {
            assert!(s.text.ends_with('\n'), "segment should end at a line: {:?}", s.text);
        }
        assert!(segments
            .iter()
            .any(|s| s.text.contains("Hemoglobin 13.5 g/dL (Reference: 12.0–15.5)")));
    }

    #[test]
    fn multibyte_characters_never_split() {
        let text = "–é€😀".repeat(40);
        let segments = chunk_text("doc1", &text, &params(17, 4));
        assert_eq!(stitch(&segments, 4), text);
    }

    #[test]
    fn indices_contiguous_and_hashes_deterministic() {
        let text = sample_report();
        let a = chunk_text("doc1", &text, &params(50, 10));
        let b = chunk_text("doc1", &text, &params(50, 10));
        assert_eq!(a.len(), b.len());
        for (i, (x, y)) in a.iter().zip(b.iter()).enumerate() {
            assert_eq!(x.index, i);
            assert_eq!(x.text, y.text);
            assert_eq!(x.hash, y.hash);
        }
    }
}
