use std::path::Path;

use tracing::{info, warn};

use crate::cli::OcrMode;
use crate::model::{DocumentOutcome, ExtractionRecord, ProcessCounts};
use crate::util::{modified_at_utc, now_utc_string};

use super::matcher::KeywordMatcher;
use super::output::{output_base_name, write_output_document};
use super::page_source::{OcrConfig, PageTextSource, TextBackend, open_document};
use super::sink::RecordSink;

pub(crate) struct RecorderContext<'a> {
    pub keyword: &'a str,
    pub matcher: &'a KeywordMatcher,
    pub ocr: &'a OcrConfig,
    pub output_dir: &'a Path,
    pub run_id: &'a str,
    pub max_pages_per_doc: Option<usize>,
}

/// Per-document loop: derive page text in index order, match, emit records,
/// and assemble the output document at the end. Never returns an error; every
/// failure lands in the outcome so a batch continues to the next document.
pub(crate) fn process_document(
    path: &Path,
    context: &RecorderContext<'_>,
    sinks: &mut [Box<dyn RecordSink>],
    counts: &mut ProcessCounts,
    warnings: &mut Vec<String>,
) -> DocumentOutcome {
    let source = match open_document(path, context.max_pages_per_doc) {
        Ok(source) => source,
        Err(error) => {
            warn!(path = %path.display(), error = %error, "skipping document");
            counts.failed_document_count += 1;
            let mut outcome = new_outcome(path);
            outcome.error = Some(error.to_string());
            return outcome;
        }
    };

    process_source(path, &source, context, sinks, counts, warnings)
}

pub(super) fn process_source(
    path: &Path,
    source: &PageTextSource,
    context: &RecorderContext<'_>,
    sinks: &mut [Box<dyn RecordSink>],
    counts: &mut ProcessCounts,
    warnings: &mut Vec<String>,
) -> DocumentOutcome {
    let mut outcome = new_outcome(path);

    let source_modified_at = match modified_at_utc(path) {
        Ok(stamp) => Some(stamp),
        Err(error) => {
            warnings.push(format!("{}: {}", path.display(), error));
            None
        }
    };

    outcome.page_count = source.page_count();
    counts.page_count += outcome.page_count;

    let mut matched_pages = Vec::new();

    for index in 0..source.page_count() {
        let page = match source.page_text(index, context.ocr) {
            Ok(page) => page,
            Err(error) => {
                // One bad page never aborts the document; partial results
                // are more useful than none.
                warn!(path = %path.display(), page = index, error = %error, "page text extraction failed");
                counts.page_failure_count += 1;
                outcome.page_failures.push(error.to_string());
                continue;
            }
        };

        match page.backend {
            TextBackend::TextLayer => counts.text_layer_page_count += 1,
            TextBackend::Ocr => {
                counts.ocr_page_count += 1;
                if context.ocr.mode == OcrMode::Auto {
                    counts.ocr_fallback_page_count += 1;
                }
            }
        }
        if let Some(warning) = page.warning {
            warnings.push(warning);
        }

        let Some(hit) = context.matcher.find_match(&page.text) else {
            continue;
        };

        if outcome.extracted_id.is_none() {
            outcome.extracted_id = hit.extracted_id.clone();
        }
        matched_pages.push(index);
        outcome.match_count += 1;
        counts.match_count += 1;

        let record = ExtractionRecord {
            source_path: path.display().to_string(),
            keyword: context.keyword.to_string(),
            extracted_id: hit.extracted_id,
            page_index: index,
            matched_at: now_utc_string(),
            source_modified_at: source_modified_at.clone(),
            run_id: context.run_id.to_string(),
        };

        let mut record_accepted = false;
        for sink in sinks.iter_mut() {
            match sink.append(&record) {
                Ok(()) => record_accepted = true,
                Err(error) => outcome.sink_failures.push(error.to_string()),
            }
        }
        if record_accepted {
            counts.record_count += 1;
        }
    }

    if matched_pages.is_empty() {
        info!(path = %path.display(), "no keyword matches; no output written");
        counts.processed_document_count += 1;
        return outcome;
    }

    let base_name = output_base_name(outcome.extracted_id.as_deref(), path, context.keyword);
    match write_output_document(
        path,
        source.kind(),
        &matched_pages,
        &base_name,
        context.output_dir,
    ) {
        Ok(output_path) => {
            info!(
                path = %output_path.display(),
                pages = matched_pages.len(),
                "wrote output document"
            );
            counts.output_documents_written += 1;
            outcome.output_path = Some(output_path.display().to_string());
        }
        Err(error) => {
            // Records already emitted for this document stand; the log sink
            // and the output file are independent side effects.
            warn!(path = %path.display(), error = %error, "failed to write output document");
            outcome.error = Some(error.to_string());
        }
    }

    counts.processed_document_count += 1;
    outcome
}

fn new_outcome(path: &Path) -> DocumentOutcome {
    DocumentOutcome {
        source_path: path.display().to_string(),
        page_count: 0,
        match_count: 0,
        extracted_id: None,
        output_path: None,
        page_failures: Vec::new(),
        sink_failures: Vec::new(),
        error: None,
    }
}
