use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::error::ProcessError;
use crate::util::ensure_directory;

use super::page_source::InputKind;

/// Output documents are named from the first extracted identifier; documents
/// that matched without yielding one fall back to the source stem plus the
/// keyword.
pub(crate) fn output_base_name(extracted_id: Option<&str>, source: &Path, keyword: &str) -> String {
    if let Some(id) = extracted_id {
        return id.to_string();
    }

    let stem = source
        .file_stem()
        .and_then(|value| value.to_str())
        .unwrap_or("document");

    format!("{stem}_{keyword}")
}

/// Next free path for `base_name` in `output_dir`; `_copyN` suffixes keep
/// earlier runs' output intact.
pub(crate) fn unique_output_path(output_dir: &Path, base_name: &str, extension: &str) -> PathBuf {
    let mut candidate = output_dir.join(format!("{base_name}.{extension}"));
    let mut counter = 1;

    while candidate.exists() {
        candidate = output_dir.join(format!("{base_name}_copy{counter}.{extension}"));
        counter += 1;
    }

    candidate
}

/// qpdf page selection for the matched page indices: 1-based, original order,
/// consecutive runs compressed ("1-3,5").
pub(crate) fn render_page_selection(matched_pages: &[usize]) -> String {
    let mut parts = Vec::new();
    let mut iter = matched_pages.iter().copied().peekable();

    while let Some(start) = iter.next() {
        let mut end = start;
        while let Some(&next) = iter.peek() {
            if next != end + 1 {
                break;
            }
            end = next;
            iter.next();
        }

        if start == end {
            parts.push((start + 1).to_string());
        } else {
            parts.push(format!("{}-{}", start + 1, end + 1));
        }
    }

    parts.join(",")
}

pub(crate) fn write_output_document(
    source: &Path,
    kind: InputKind,
    matched_pages: &[usize],
    base_name: &str,
    output_dir: &Path,
) -> Result<PathBuf, ProcessError> {
    ensure_directory(output_dir).map_err(|error| ProcessError::OutputWriteFailure {
        path: output_dir.display().to_string(),
        reason: error.to_string(),
    })?;

    match kind {
        InputKind::Pdf => {
            let output_path = unique_output_path(output_dir, base_name, "pdf");
            assemble_pdf(source, matched_pages, &output_path)?;
            Ok(output_path)
        }
        InputKind::Image => {
            let extension = source
                .extension()
                .and_then(|value| value.to_str())
                .unwrap_or("png");
            let output_path = unique_output_path(output_dir, base_name, extension);

            fs::copy(source, &output_path).map_err(|error| ProcessError::OutputWriteFailure {
                path: output_path.display().to_string(),
                reason: error.to_string(),
            })?;

            Ok(output_path)
        }
    }
}

fn assemble_pdf(
    source: &Path,
    matched_pages: &[usize],
    output_path: &Path,
) -> Result<(), ProcessError> {
    let selection = render_page_selection(matched_pages);

    let output = Command::new("qpdf")
        .arg("--empty")
        .arg("--pages")
        .arg(source)
        .arg(&selection)
        .arg("--")
        .arg(output_path)
        .output()
        .map_err(|error| ProcessError::OutputWriteFailure {
            path: output_path.display().to_string(),
            reason: format!("failed to execute qpdf: {error}"),
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(ProcessError::OutputWriteFailure {
            path: output_path.display().to_string(),
            reason: format!("qpdf returned non-zero exit status: {}", stderr.trim()),
        });
    }

    Ok(())
}
