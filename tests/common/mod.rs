//! Shared fixtures: synthetic blood test reports rendered as real PDFs.

#![allow(dead_code)]

use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};
use std::path::{Path, PathBuf};

pub const HEMOGLOBIN_LINE: &str = "Hemoglobin 13.5 g/dL (Reference: 12.0–15.5)";

pub fn report_pages() -> Vec<Vec<&'static str>> {
    vec![
        vec![
            "City Diagnostics Laboratory",
            "Patient Name: Jane Doe",
            "Age: 42  Sex: F",
            "Lab Results - Complete Blood Count",
            "Collected: 2024-03-01",
            "Glucose, Fasting 95 mg/dL (Reference: 70–99)",
            "Cholesterol, Total 180 mg/dL (Reference: <200)",
            "LDL Cholesterol 110 mg/dL (Reference: <130)",
            "HDL Cholesterol 55 mg/dL (Reference: >40)",
            "Triglycerides 120 mg/dL (Reference: <150)",
        ],
        vec![
            "Complete Blood Count (continued)",
            HEMOGLOBIN_LINE,
            "Hematocrit 40 % (Reference: 36–46)",
            "WBC 6.1 10^3/uL (Reference: 4.5–11.0)",
            "Platelets 250 10^3/uL (Reference: 150–400)",
            "Vitamin D 32 ng/mL (Reference: 30–100)",
            "Iron 80 ug/dL (Reference: 60–170)",
            "Reference Range values are laboratory specific.",
        ],
    ]
}

/// WinAnsi bytes for the standard Type1 fonts; the en dash is 0x96.
fn win_ansi(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| match c {
            '–' => 0x96,
            c if c.is_ascii() => c as u8,
            _ => b'?',
        })
        .collect()
}

/// Build a PDF with one text line per `Tj`, one page per entry.
pub fn report_pdf(pages: &[Vec<&str>]) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
        "Encoding" => "WinAnsiEncoding",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    let mut kids: Vec<Object> = Vec::new();
    for lines in pages {
        let mut operations = vec![
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec!["F1".into(), Object::Integer(11)]),
            Operation::new("TL", vec![Object::Integer(16)]),
            Operation::new("Td", vec![Object::Integer(50), Object::Integer(780)]),
        ];
        for line in lines {
            operations.push(Operation::new(
                "Tj",
                vec![Object::string_literal(win_ansi(line))],
            ));
            operations.push(Operation::new("T*", vec![]));
        }
        operations.push(Operation::new("ET", vec![]));

        let content = Content { operations };
        let content_id = doc.add_object(Stream::new(
            dictionary! {},
            content.encode().expect("encode page content"),
        ));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => Object::Integer(count),
            "Resources" => resources_id,
            "MediaBox" => vec![
                Object::Integer(0),
                Object::Integer(0),
                Object::Integer(595),
                Object::Integer(842),
            ],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).expect("serialize PDF");
    bytes
}

/// Write the standard two-page report into `dir`.
pub fn write_report(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, report_pdf(&report_pages())).expect("write report");
    path
}
