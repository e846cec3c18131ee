//! PDF document loader.
//!
//! Reads a report from disk and returns ordered page texts. The file is
//! checked for a PDF header before the parser runs, so a non-PDF upload
//! fails fast with [`LoadError::NotPdf`] and no embedding work happens.
//!
//! Raw page text is the canonical extraction feeding retrieval.
//! [`extract_tables`] derives row/cell data from the same page text for
//! inspection.

use std::path::{Path, PathBuf};

use uuid::Uuid;

use crate::error::LoadError;

/// The PDF spec allows the header anywhere in the first 1024 bytes.
const HEADER_SEARCH_BYTES: usize = 1024;
const PDF_MAGIC: &[u8] = b"%PDF-";

/// Text of one page, `number` is 1-based.
#[derive(Debug, Clone, PartialEq)]
pub struct PageText {
    pub number: u32,
    pub text: String,
}

/// A loaded document: one instance per analysis request.
#[derive(Debug, Clone)]
pub struct LoadedDocument {
    pub id: String,
    pub source: PathBuf,
    pub pages: Vec<PageText>,
}

impl LoadedDocument {
    /// Build from already-extracted pages. Pages are renumbered from 1.
    pub fn from_pages(source: impl Into<PathBuf>, pages: Vec<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            source: source.into(),
            pages: pages
                .into_iter()
                .enumerate()
                .map(|(i, text)| PageText {
                    number: i as u32 + 1,
                    text,
                })
                .collect(),
        }
    }

    /// Full document text, pages joined by a newline.
    pub fn text(&self) -> String {
        self.pages
            .iter()
            .map(|p| p.text.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Page number containing the given char offset of [`text`](Self::text).
    pub fn page_at(&self, char_offset: usize) -> u32 {
        let mut page_start = 0usize;
        for page in &self.pages {
            let page_end = page_start + page.text.chars().count();
            // The joining newline belongs to the preceding page.
            if char_offset <= page_end {
                return page.number;
            }
            page_start = page_end + 1;
        }
        self.pages.last().map(|p| p.number).unwrap_or(1)
    }

    pub fn is_blank(&self) -> bool {
        self.pages.iter().all(|p| p.text.trim().is_empty())
    }
}

/// One table row: the cells of a line that splits into two or more columns.
#[derive(Debug, Clone, PartialEq)]
pub struct TableRow {
    pub page: u32,
    pub cells: Vec<String>,
}

/// Load a PDF from disk.
///
/// Blocking: callers on the async runtime should wrap this in
/// `spawn_blocking`.
pub fn load_pdf(path: &Path) -> Result<LoadedDocument, LoadError> {
    if !path.exists() {
        return Err(LoadError::NotFound(path.to_path_buf()));
    }
    let bytes = std::fs::read(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    load_pdf_bytes(path, &bytes)
}

/// Load a PDF from memory; `source` is only used for error messages and
/// provenance.
pub fn load_pdf_bytes(source: &Path, bytes: &[u8]) -> Result<LoadedDocument, LoadError> {
    if !has_pdf_header(bytes) {
        return Err(LoadError::NotPdf(source.to_path_buf()));
    }

    // pdf-extract panics on some malformed inputs instead of returning Err.
    let raw_pages =
        std::panic::catch_unwind(|| pdf_extract::extract_text_from_mem_by_pages(bytes))
            .map_err(|_| LoadError::Parse("PDF parser panicked".to_string()))?
            .map_err(|e| LoadError::Parse(e.to_string()))?;

    let doc = LoadedDocument::from_pages(
        source,
        raw_pages.iter().map(|p| normalize_page_text(p)).collect(),
    );

    if doc.pages.is_empty() || doc.is_blank() {
        return Err(LoadError::NoText(source.to_path_buf()));
    }
    Ok(doc)
}

pub fn has_pdf_header(bytes: &[u8]) -> bool {
    let head = &bytes[..bytes.len().min(HEADER_SEARCH_BYTES)];
    head.windows(PDF_MAGIC.len()).any(|w| w == PDF_MAGIC)
}

/// Normalize extracted page text: CRLF to LF, trailing whitespace removed
/// per line, runs of blank lines collapsed, outer blank lines dropped.
pub fn normalize_page_text(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for line in raw.replace("\r\n", "\n").replace('\r', "\n").lines() {
        let line = line.trim_end();
        if line.trim().is_empty() {
            continue;
        }
        if !out.is_empty() {
            out.push('\n');
        }
        out.push_str(line);
    }
    out
}

/// Split every page line on runs of two or more spaces (or tabs) and keep
/// lines that yield at least two cells.
pub fn extract_tables(doc: &LoadedDocument) -> Vec<TableRow> {
    let mut rows = Vec::new();
    for page in &doc.pages {
        for line in page.text.lines() {
            let cells = split_cells(line);
            if cells.len() >= 2 {
                rows.push(TableRow {
                    page: page.number,
                    cells,
                });
            }
        }
    }
    rows
}

fn split_cells(line: &str) -> Vec<String> {
    let mut cells = Vec::new();
    let mut current = String::new();
    let mut spaces = 0usize;

    for ch in line.chars() {
        if ch == '\t' {
            spaces = 2;
            continue;
        }
        if ch == ' ' {
            spaces += 1;
            continue;
        }
        if spaces >= 2 {
            if !current.trim().is_empty() {
                cells.push(current.trim().to_string());
            }
            current.clear();
        } else if spaces == 1 && !current.is_empty() {
            current.push(' ');
        }
        spaces = 0;
        current.push(ch);
    }
    if !current.trim().is_empty() {
        cells.push(current.trim().to_string());
    }
    cells
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_file_is_not_found() {
        let err = load_pdf(Path::new("/no/such/report.pdf")).unwrap_err();
        assert!(matches!(err, LoadError::NotFound(_)));
    }

    #[test]
    fn non_pdf_bytes_rejected_before_parsing() {
        let err = load_pdf_bytes(Path::new("notes.txt"), b"Hemoglobin 13.5").unwrap_err();
        assert!(matches!(err, LoadError::NotPdf(_)));
    }

    #[test]
    fn non_pdf_file_on_disk_rejected() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(b"just some text, not a report").unwrap();
        let err = load_pdf(tmp.path()).unwrap_err();
        assert!(matches!(err, LoadError::NotPdf(_)));
    }

    #[test]
    fn corrupt_pdf_is_parse_error() {
        let err = load_pdf_bytes(Path::new("broken.pdf"), b"%PDF-1.4\ngarbage").unwrap_err();
        assert!(matches!(err, LoadError::Parse(_) | LoadError::NoText(_)));
    }

    #[test]
    fn header_may_follow_leading_bytes() {
        let mut bytes = vec![0u8; 10];
        bytes.extend_from_slice(b"%PDF-1.7");
        assert!(has_pdf_header(&bytes));
        assert!(!has_pdf_header(b"PK\x03\x04"));
    }

    #[test]
    fn normalize_collapses_blank_lines() {
        let raw = "Patient Name: Jane\r\n\r\n\r\nHemoglobin 13.5   \n\n\nGlucose 95\n";
        assert_eq!(
            normalize_page_text(raw),
            "Patient Name: Jane\nHemoglobin 13.5\nGlucose 95"
        );
    }

    #[test]
    fn page_at_maps_offsets_to_pages() {
        let doc = LoadedDocument::from_pages("r.pdf", vec!["abc".into(), "defg".into()]);
        assert_eq!(doc.text(), "abc\ndefg");
        assert_eq!(doc.page_at(0), 1);
        assert_eq!(doc.page_at(3), 1);
        assert_eq!(doc.page_at(4), 2);
        assert_eq!(doc.page_at(100), 2);
    }

    #[test]
    fn blank_document_detected() {
        let doc = LoadedDocument::from_pages("scan.pdf", vec!["  ".into(), String::new()]);
        assert!(doc.is_blank());
    }

    #[test]
    fn tables_split_on_wide_gaps() {
        let doc = LoadedDocument::from_pages(
            "r.pdf",
            vec![
                "Test  Result  Units\nHemoglobin  13.5  g/dL\nFree text line".into(),
                "Glucose\t95\tmg/dL".into(),
            ],
        );
        let rows = extract_tables(&doc);
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[1].cells, vec!["Hemoglobin", "13.5", "g/dL"]);
        assert_eq!(rows[2].page, 2);
        assert_eq!(rows[2].cells, vec!["Glucose", "95", "mg/dL"]);
    }

    #[test]
    fn single_spaces_stay_inside_cells() {
        assert_eq!(
            split_cells("Cholesterol, Total   180 mg/dL"),
            vec!["Cholesterol, Total", "180 mg/dL"]
        );
    }
}
