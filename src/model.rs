use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceEntry {
    pub filename: String,
    pub kind: String,
    pub modified_at: String,
    pub sha256: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceInventoryManifest {
    pub manifest_version: u32,
    pub generated_at: String,
    pub source_directory: String,
    pub document_count: usize,
    pub documents: Vec<SourceEntry>,
}

/// One row per keyword match, appended once and never mutated. Absent values
/// stay `None` in memory; sinks render the `N/A` placeholder at the boundary.
#[derive(Debug, Clone, Serialize)]
pub struct ExtractionRecord {
    pub source_path: String,
    pub keyword: String,
    pub extracted_id: Option<String>,
    pub page_index: usize,
    pub matched_at: String,
    pub source_modified_at: Option<String>,
    pub run_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolVersions {
    pub pdftotext: String,
    pub pdftoppm: Option<String>,
    pub tesseract: Option<String>,
    pub qpdf: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessPaths {
    pub cache_root: String,
    pub manifest_dir: String,
    pub output_dir: String,
    pub db_path: String,
    pub report_path: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProcessCounts {
    pub document_count: usize,
    pub processed_document_count: usize,
    pub failed_document_count: usize,
    pub page_count: usize,
    pub text_layer_page_count: usize,
    pub ocr_page_count: usize,
    pub ocr_fallback_page_count: usize,
    pub page_failure_count: usize,
    pub match_count: usize,
    pub record_count: usize,
    pub output_documents_written: usize,
}

/// Per-document result returned to the caller and persisted in the run
/// manifest. A failed document never stops the batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentOutcome {
    pub source_path: String,
    pub page_count: usize,
    pub match_count: usize,
    pub extracted_id: Option<String>,
    pub output_path: Option<String>,
    pub page_failures: Vec<String>,
    pub sink_failures: Vec<String>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessRunManifest {
    pub manifest_version: u32,
    pub run_id: String,
    pub db_schema_version: String,
    pub status: String,
    pub started_at: String,
    pub updated_at: String,
    pub command: String,
    pub keyword: String,
    pub id_window: usize,
    pub tool_versions: ToolVersions,
    pub paths: ProcessPaths,
    pub counts: ProcessCounts,
    pub outcomes: Vec<DocumentOutcome>,
    pub warnings: Vec<String>,
}
