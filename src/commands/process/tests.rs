use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;

use crate::cli::{OcrMode, ProcessArgs};
use crate::error::ProcessError;
use crate::model::{ExtractionRecord, ProcessCounts};

use super::matcher::KeywordMatcher;
use super::output::{output_base_name, render_page_selection, unique_output_path};
use super::page_source::{
    InputKind, OcrConfig, PageTextSource, detect_input_kind, needs_ocr, open_document,
    split_text_layer_pages,
};
use super::recorder::{RecorderContext, process_source};
use super::run::render_process_command;
use super::sink::{RecordSink, SqliteSink, escape_csv_cell, render_report_row};

fn sample_record(extracted_id: Option<&str>, page_index: usize) -> ExtractionRecord {
    ExtractionRecord {
        source_path: "uploads/dismissal_batch.pdf".to_string(),
        keyword: "fileNo".to_string(),
        extracted_id: extracted_id.map(ToOwned::to_owned),
        page_index,
        matched_at: "2026-08-28T10:15:00Z".to_string(),
        source_modified_at: Some("2026-08-27T09:00:00Z".to_string()),
        run_id: "run-20260828T101500Z".to_string(),
    }
}

#[test]
fn matcher_extracts_id_following_keyword() {
    let matcher = KeywordMatcher::new("fileNo", 20).expect("matcher builds");

    let hit = matcher
        .find_match("...see fileNo: 12345 for details...")
        .expect("keyword present");
    assert_eq!(hit.extracted_id.as_deref(), Some("12345"));
}

#[test]
fn matcher_reports_absent_id_when_window_has_no_token() {
    let matcher = KeywordMatcher::new("fileNo", 20).expect("matcher builds");

    let hit = matcher.find_match("...fileNo: ...").expect("keyword present");
    assert_eq!(hit.extracted_id, None);
}

#[test]
fn matcher_is_case_insensitive_and_preserves_id_case() {
    let matcher = KeywordMatcher::new("fileNo", 32).expect("matcher builds");

    let hit = matcher
        .find_match("NOTICE OF DISMISSAL FILENO: Ab-12_c")
        .expect("keyword present");
    assert_eq!(hit.extracted_id.as_deref(), Some("Ab-12_c"));
}

#[test]
fn matcher_uses_first_keyword_occurrence_only() {
    let matcher = KeywordMatcher::new("fileNo", 20).expect("matcher builds");

    let hit = matcher
        .find_match("fileNo: AAA1 ... later fileNo: BBB2")
        .expect("keyword present");
    assert_eq!(hit.extracted_id.as_deref(), Some("AAA1"));
}

#[test]
fn matcher_returns_none_without_keyword() {
    let matcher = KeywordMatcher::new("fileNo", 20).expect("matcher builds");

    assert!(matcher.find_match("no identifiers on this page").is_none());
}

#[test]
fn identifier_search_stops_at_window_boundary() {
    let matcher = KeywordMatcher::new("ref", 5).expect("matcher builds");

    let hit = matcher.find_match("ref:12345678").expect("keyword present");
    assert_eq!(hit.extracted_id.as_deref(), Some("1234"));
}

#[test]
fn identifier_pattern_keeps_separators() {
    let matcher = KeywordMatcher::new("fileNo", 32).expect("matcher builds");

    let hit = matcher
        .find_match("fileNo 2024-CV_001 entered on docket")
        .expect("keyword present");
    assert_eq!(hit.extracted_id.as_deref(), Some("2024-CV_001"));
}

#[test]
fn empty_keyword_is_rejected() {
    assert!(KeywordMatcher::new("   ", 20).is_err());
}

#[test]
fn detect_input_kind_covers_supported_extensions() {
    assert_eq!(detect_input_kind(Path::new("a.pdf")), Some(InputKind::Pdf));
    assert_eq!(detect_input_kind(Path::new("b.PNG")), Some(InputKind::Image));
    assert_eq!(detect_input_kind(Path::new("c.jpeg")), Some(InputKind::Image));
    assert_eq!(detect_input_kind(Path::new("d.docx")), None);
    assert_eq!(detect_input_kind(Path::new("no_extension")), None);
}

#[test]
fn open_document_rejects_unsupported_extension_before_reading_pages() {
    let error = open_document(Path::new("scan.docx"), None).expect_err("unsupported");
    assert!(matches!(error, ProcessError::UnsupportedFormat(_)));
}

#[test]
fn text_layer_split_keeps_fully_scanned_pages() {
    // pdftotext emits one form feed per page even when every text layer is
    // empty; the page count must survive so the OCR fallback sees each page.
    let pages = split_text_layer_pages("\u{000C}\u{000C}\u{000C}");
    assert_eq!(pages.len(), 3);
    assert!(pages.iter().all(|page| page.trim().is_empty()));

    let source = PageTextSource::PdfTextLayer {
        path: PathBuf::from("uploads/scanned.pdf"),
        pages,
    };
    assert_eq!(source.page_count(), 3);
}

#[test]
fn text_layer_split_drops_only_the_trailing_artifact() {
    let pages = split_text_layer_pages("alpha\u{000C}\u{000C}omega\u{000C}");
    assert_eq!(pages, vec!["alpha", "", "omega"]);
}

#[test]
fn text_layer_split_handles_plain_multi_page_output() {
    let pages = split_text_layer_pages("page one\u{000C}page two\u{000C}");
    assert_eq!(pages, vec!["page one", "page two"]);

    assert!(split_text_layer_pages("").is_empty());
}

#[test]
fn zero_match_document_emits_no_records_and_writes_no_output() {
    let stamp = Utc::now().timestamp_nanos_opt().unwrap_or_default();
    let output_dir = std::env::temp_dir().join(format!(
        "pagesift_out_{}_{}",
        std::process::id(),
        stamp
    ));

    let matcher = KeywordMatcher::new("fileNo", 32).expect("matcher builds");
    let ocr = OcrConfig {
        mode: OcrMode::Off,
        lang: "eng".to_string(),
        dpi: 350,
        min_text_chars: 120,
    };
    let context = RecorderContext {
        keyword: "fileNo",
        matcher: &matcher,
        ocr: &ocr,
        output_dir: &output_dir,
        run_id: "run-20260828T101500Z",
        max_pages_per_doc: None,
    };

    let source = PageTextSource::PdfTextLayer {
        path: PathBuf::from("uploads/unrelated.pdf"),
        pages: vec![
            "nothing of interest on this page".to_string(),
            "still nothing here".to_string(),
        ],
    };

    let mut sinks: Vec<Box<dyn RecordSink>> =
        vec![Box::new(SqliteSink::in_memory().expect("in-memory sink"))];
    let mut counts = ProcessCounts::default();
    let mut warnings = Vec::new();

    let outcome = process_source(
        Path::new("uploads/unrelated.pdf"),
        &source,
        &context,
        &mut sinks,
        &mut counts,
        &mut warnings,
    );

    assert_eq!(outcome.page_count, 2);
    assert_eq!(outcome.match_count, 0);
    assert!(outcome.output_path.is_none());
    assert!(outcome.error.is_none());
    assert_eq!(counts.match_count, 0);
    assert_eq!(counts.record_count, 0);
    assert_eq!(counts.output_documents_written, 0);
    assert!(!output_dir.exists());
}

#[test]
fn needs_ocr_auto_uses_text_threshold() {
    assert!(needs_ocr("tiny", OcrMode::Auto, 10));
    assert!(!needs_ocr(
        "this page has plenty of extractable text",
        OcrMode::Auto,
        10
    ));
    assert!(needs_ocr("plenty of text here as well", OcrMode::Force, 10));
    assert!(!needs_ocr("", OcrMode::Off, 10));
}

#[test]
fn render_page_selection_compresses_consecutive_runs() {
    assert_eq!(render_page_selection(&[0, 1, 2, 4]), "1-3,5");
    assert_eq!(render_page_selection(&[3]), "4");
    assert_eq!(render_page_selection(&[0, 2, 3]), "1,3-4");
}

#[test]
fn output_base_name_prefers_extracted_id() {
    let name = output_base_name(Some("2024-CV_001"), Path::new("uploads/batch.pdf"), "fileNo");
    assert_eq!(name, "2024-CV_001");
}

#[test]
fn output_base_name_falls_back_to_stem_and_keyword() {
    let name = output_base_name(None, Path::new("uploads/batch.pdf"), "fileNo");
    assert_eq!(name, "batch_fileNo");
}

#[test]
fn unique_output_path_appends_copy_suffix() {
    let stamp = Utc::now().timestamp_nanos_opt().unwrap_or_default();
    let dir = std::env::temp_dir().join(format!(
        "pagesift_test_{}_{}",
        std::process::id(),
        stamp
    ));
    fs::create_dir_all(&dir).expect("temp dir");

    let first = unique_output_path(&dir, "12345", "pdf");
    assert_eq!(first, dir.join("12345.pdf"));

    fs::write(&first, b"placeholder").expect("write placeholder");
    let second = unique_output_path(&dir, "12345", "pdf");
    assert_eq!(second, dir.join("12345_copy1.pdf"));

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn escape_csv_cell_quotes_special_characters() {
    assert_eq!(escape_csv_cell("plain"), "plain");
    assert_eq!(escape_csv_cell("a,b"), "\"a,b\"");
    assert_eq!(escape_csv_cell("say \"hi\""), "\"say \"\"hi\"\"\"");
}

#[test]
fn render_report_row_uses_placeholder_for_absent_id() {
    let row = render_report_row(&sample_record(None, 0));
    assert_eq!(
        row,
        "N/A,fileNo,1,2026-08-28T10:15:00Z,2026-08-27T09:00:00Z,uploads/dismissal_batch.pdf"
    );
}

#[test]
fn render_report_row_uses_placeholder_when_source_mtime_is_unknown() {
    let mut record = sample_record(Some("12345"), 0);
    record.source_modified_at = None;

    let row = render_report_row(&record);
    assert_eq!(
        row,
        "12345,fileNo,1,2026-08-28T10:15:00Z,N/A,uploads/dismissal_batch.pdf"
    );
}

#[test]
fn render_report_row_preserves_extracted_id_exactly() {
    let row = render_report_row(&sample_record(Some("2024-CV_001"), 2));
    assert!(row.starts_with("2024-CV_001,fileNo,3,"));
}

#[test]
fn sqlite_sink_appends_records_with_placeholder() {
    let mut sink = SqliteSink::in_memory().expect("in-memory sink");

    sink.append(&sample_record(Some("12345"), 0))
        .expect("append with id");

    let mut unknown_mtime = sample_record(None, 1);
    unknown_mtime.source_modified_at = None;
    sink.append(&unknown_mtime).expect("append without id");

    let count: i64 = sink
        .connection()
        .query_row("SELECT COUNT(*) FROM extractions", [], |row| row.get(0))
        .expect("count rows");
    assert_eq!(count, 2);

    let (absent_id, absent_mtime): (String, String) = sink
        .connection()
        .query_row(
            "SELECT extracted_id, source_modified_at FROM extractions WHERE page_index = 1",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .expect("fetch placeholder row");
    assert_eq!(absent_id, "N/A");
    assert_eq!(absent_mtime, "N/A");
}

#[test]
fn render_process_command_includes_ocr_flags_when_enabled() {
    let args = ProcessArgs {
        inputs: vec![PathBuf::from("uploads")],
        keyword: "fileNo".to_string(),
        id_window: 32,
        output_dir: PathBuf::from("output"),
        cache_root: PathBuf::from(".cache/pagesift"),
        db_path: None,
        report_path: None,
        ocr_mode: OcrMode::Force,
        ocr_lang: "eng".to_string(),
        ocr_dpi: 350,
        ocr_min_text_chars: 200,
        max_pages_per_doc: Some(5),
    };

    let command = render_process_command(&args);
    assert!(command.contains("--keyword fileNo"));
    assert!(command.contains("--ocr-mode force"));
    assert!(command.contains("--ocr-lang eng"));
    assert!(command.contains("--ocr-min-text-chars 200"));
    assert!(command.contains("--max-pages-per-doc 5"));
}
