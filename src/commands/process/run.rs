use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use chrono::Utc;
use tracing::{info, warn};

use crate::cli::{OcrMode, ProcessArgs};
use crate::model::{ProcessCounts, ProcessPaths, ProcessRunManifest, ToolVersions};
use crate::util::{ensure_directory, now_utc_string, utc_compact_string, write_json_pretty};

use super::db_setup::DB_SCHEMA_VERSION;
use super::matcher::KeywordMatcher;
use super::page_source::{
    OcrConfig, command_available, command_version, command_version_optional, detect_input_kind,
};
use super::recorder::{RecorderContext, process_document};
use super::sink::{CsvReportSink, RecordSink, SqliteSink};

pub fn run(args: ProcessArgs) -> Result<()> {
    let started_ts = Utc::now();
    let started_at = now_utc_string();
    let run_id = format!("run-{}", utc_compact_string(started_ts));

    let cache_root = args.cache_root.clone();
    let manifest_dir = cache_root.join("manifests");
    ensure_directory(&manifest_dir)?;
    ensure_directory(&args.output_dir)?;

    let db_path = args
        .db_path
        .clone()
        .unwrap_or_else(|| cache_root.join("pagesift_log.sqlite"));
    let report_path = args.report_path.clone().unwrap_or_else(|| {
        cache_root.join("reports").join(format!(
            "{}_report_{}.csv",
            args.keyword,
            utc_compact_string(started_ts)
        ))
    });
    let run_manifest_path = manifest_dir.join(format!(
        "process_run_{}.json",
        utc_compact_string(started_ts)
    ));

    info!(run_id = %run_id, keyword = %args.keyword, "starting process run");

    let documents = discover_inputs(&args.inputs)?;
    if documents.is_empty() {
        bail!("no input documents found");
    }

    let tool_versions = collect_tool_versions();

    let mut warnings = Vec::new();
    let ocr_mode = resolve_ocr_mode(args.ocr_mode, &mut warnings)?;

    let matcher = KeywordMatcher::new(&args.keyword, args.id_window)?;
    let ocr = OcrConfig {
        mode: ocr_mode,
        lang: args.ocr_lang.clone(),
        dpi: args.ocr_dpi,
        min_text_chars: args.ocr_min_text_chars,
    };

    let mut sinks: Vec<Box<dyn RecordSink>> = vec![
        Box::new(SqliteSink::open(&db_path)?),
        Box::new(CsvReportSink::create(&report_path)?),
    ];

    let context = RecorderContext {
        keyword: &args.keyword,
        matcher: &matcher,
        ocr: &ocr,
        output_dir: &args.output_dir,
        run_id: &run_id,
        max_pages_per_doc: args.max_pages_per_doc,
    };

    let mut counts = ProcessCounts {
        document_count: documents.len(),
        ..ProcessCounts::default()
    };
    let mut outcomes = Vec::with_capacity(documents.len());

    // Strictly sequential: one document runs to completion before the next
    // starts, and a failed document never stops the batch.
    for path in &documents {
        info!(path = %path.display(), "processing document");
        let outcome = process_document(path, &context, &mut sinks, &mut counts, &mut warnings);
        outcomes.push(outcome);
    }

    for outcome in &outcomes {
        for failure in &outcome.sink_failures {
            warn!(source = %outcome.source_path, failure = %failure, "record sink failure");
        }
    }

    let status = if counts.failed_document_count > 0 || outcomes.iter().any(|o| o.error.is_some()) {
        "completed_with_failures"
    } else {
        "completed"
    };

    let manifest = ProcessRunManifest {
        manifest_version: 1,
        run_id: run_id.clone(),
        db_schema_version: DB_SCHEMA_VERSION.to_string(),
        status: status.to_string(),
        started_at,
        updated_at: now_utc_string(),
        command: render_process_command(&args),
        keyword: args.keyword.clone(),
        id_window: args.id_window,
        tool_versions,
        paths: ProcessPaths {
            cache_root: cache_root.display().to_string(),
            manifest_dir: manifest_dir.display().to_string(),
            output_dir: args.output_dir.display().to_string(),
            db_path: db_path.display().to_string(),
            report_path: report_path.display().to_string(),
        },
        counts,
        outcomes,
        warnings,
    };

    write_json_pretty(&run_manifest_path, &manifest)?;

    info!(path = %run_manifest_path.display(), "wrote process run manifest");
    info!(
        documents = manifest.counts.document_count,
        matches = manifest.counts.match_count,
        outputs = manifest.counts.output_documents_written,
        failed = manifest.counts.failed_document_count,
        "process completed"
    );

    Ok(())
}

fn discover_inputs(inputs: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut documents = Vec::new();

    for input in inputs {
        if input.is_dir() {
            let mut found = Vec::new();
            let entries = fs::read_dir(input)
                .with_context(|| format!("failed to read {}", input.display()))?;

            for entry in entries {
                let entry = entry
                    .with_context(|| format!("failed to read entry in {}", input.display()))?;
                let path = entry.path();
                if path.is_file() && detect_input_kind(&path).is_some() {
                    found.push(path);
                }
            }

            found.sort();
            documents.extend(found);
        } else {
            // Explicit files stay in the batch even when unsupported so the
            // per-document outcome carries the UnsupportedFormat error.
            documents.push(input.clone());
        }
    }

    Ok(documents)
}

fn collect_tool_versions() -> ToolVersions {
    ToolVersions {
        pdftotext: command_version("pdftotext", &["-v"]).unwrap_or_else(|_| "missing".to_string()),
        pdftoppm: command_version_optional("pdftoppm", &["-v"]),
        tesseract: command_version_optional("tesseract", &["--version"]),
        qpdf: command_version_optional("qpdf", &["--version"]),
    }
}

/// OCR needs pdftoppm and tesseract on the path. Force mode without them is
/// fatal; auto mode downgrades to text-layer-only with a warning.
fn resolve_ocr_mode(requested: OcrMode, warnings: &mut Vec<String>) -> Result<OcrMode> {
    if requested == OcrMode::Off {
        return Ok(requested);
    }

    if command_available("pdftoppm") && command_available("tesseract") {
        return Ok(requested);
    }

    let message = format!(
        "OCR mode '{}' requested but pdftoppm/tesseract are unavailable",
        requested.as_str()
    );
    if requested == OcrMode::Force {
        bail!(message);
    }

    warn!("{message}; continuing with text layer only");
    warnings.push(message);
    Ok(OcrMode::Off)
}

pub(super) fn render_process_command(args: &ProcessArgs) -> String {
    let mut command = vec!["pagesift".to_string(), "process".to_string()];

    for input in &args.inputs {
        command.push(input.display().to_string());
    }

    command.push("--keyword".to_string());
    command.push(args.keyword.clone());
    command.push("--id-window".to_string());
    command.push(args.id_window.to_string());
    command.push("--output-dir".to_string());
    command.push(args.output_dir.display().to_string());
    command.push("--cache-root".to_string());
    command.push(args.cache_root.display().to_string());

    if let Some(path) = &args.db_path {
        command.push("--db-path".to_string());
        command.push(path.display().to_string());
    }
    if let Some(path) = &args.report_path {
        command.push("--report-path".to_string());
        command.push(path.display().to_string());
    }
    if args.ocr_mode != OcrMode::Auto {
        command.push("--ocr-mode".to_string());
        command.push(args.ocr_mode.as_str().to_string());
    }
    if args.ocr_mode != OcrMode::Off {
        command.push("--ocr-lang".to_string());
        command.push(args.ocr_lang.clone());
        command.push("--ocr-dpi".to_string());
        command.push(args.ocr_dpi.to_string());
        command.push("--ocr-min-text-chars".to_string());
        command.push(args.ocr_min_text_chars.to_string());
    }
    if let Some(max_pages) = args.max_pages_per_doc {
        command.push("--max-pages-per-doc".to_string());
        command.push(max_pages.to_string());
    }

    command.join(" ")
}
