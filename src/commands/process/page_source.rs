use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{Context, Result, bail};
use chrono::Utc;

use crate::cli::OcrMode;
use crate::error::ProcessError;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) enum InputKind {
    Pdf,
    Image,
}

impl InputKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Image => "image",
        }
    }
}

pub(crate) fn detect_input_kind(path: &Path) -> Option<InputKind> {
    let extension = path.extension()?.to_str()?.to_ascii_lowercase();
    match extension.as_str() {
        "pdf" => Some(InputKind::Pdf),
        "png" | "jpg" | "jpeg" | "tif" | "tiff" => Some(InputKind::Image),
        _ => None,
    }
}

#[derive(Debug, Clone)]
pub(crate) struct OcrConfig {
    pub mode: OcrMode,
    pub lang: String,
    pub dpi: u32,
    pub min_text_chars: usize,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) enum TextBackend {
    TextLayer,
    Ocr,
}

/// Derived text for one page plus the backend that produced it.
pub(crate) struct PageText {
    pub text: String,
    pub backend: TextBackend,
    pub warning: Option<String>,
}

/// Per-document text source, selected once per input file from its format.
/// PDF inputs read the embedded text layer and fall back to raster OCR per
/// page; image inputs are single-page and always go through OCR.
#[derive(Debug)]
pub(crate) enum PageTextSource {
    PdfTextLayer { path: PathBuf, pages: Vec<String> },
    ImageRaster { path: PathBuf },
}

impl PageTextSource {
    pub fn kind(&self) -> InputKind {
        match self {
            Self::PdfTextLayer { .. } => InputKind::Pdf,
            Self::ImageRaster { .. } => InputKind::Image,
        }
    }

    pub fn page_count(&self) -> usize {
        match self {
            Self::PdfTextLayer { pages, .. } => pages.len(),
            Self::ImageRaster { .. } => 1,
        }
    }

    pub fn page_text(&self, index: usize, ocr: &OcrConfig) -> Result<PageText, ProcessError> {
        match self {
            Self::PdfTextLayer { path, pages } => pdf_page_text(path, pages, index, ocr),
            Self::ImageRaster { path } => image_page_text(path, index, ocr),
        }
    }
}

/// Fails with `UnsupportedFormat` before any page is read when the extension
/// is not among the supported set.
pub(crate) fn open_document(
    path: &Path,
    max_pages_per_doc: Option<usize>,
) -> Result<PageTextSource, ProcessError> {
    let Some(kind) = detect_input_kind(path) else {
        return Err(ProcessError::UnsupportedFormat(path.display().to_string()));
    };

    match kind {
        InputKind::Pdf => {
            let pages = extract_pdf_text_layer(path, max_pages_per_doc).map_err(|error| {
                ProcessError::ExtractionFailure {
                    path: path.display().to_string(),
                    page: 0,
                    reason: error.to_string(),
                }
            })?;
            Ok(PageTextSource::PdfTextLayer {
                path: path.to_path_buf(),
                pages,
            })
        }
        InputKind::Image => Ok(PageTextSource::ImageRaster {
            path: path.to_path_buf(),
        }),
    }
}

fn pdf_page_text(
    path: &Path,
    pages: &[String],
    index: usize,
    ocr: &OcrConfig,
) -> Result<PageText, ProcessError> {
    let layer_text = pages.get(index).cloned().unwrap_or_default();

    if !needs_ocr(&layer_text, ocr.mode, ocr.min_text_chars) {
        return Ok(PageText {
            text: layer_text,
            backend: TextBackend::TextLayer,
            warning: None,
        });
    }

    match ocr_pdf_page(path, index + 1, &ocr.lang, ocr.dpi) {
        Ok(ocr_text) => {
            if non_whitespace_char_count(&ocr_text) == 0 && ocr.mode == OcrMode::Auto {
                return Ok(PageText {
                    text: layer_text,
                    backend: TextBackend::TextLayer,
                    warning: Some(format!(
                        "OCR text was empty for {} page {} in auto mode",
                        path.display(),
                        index + 1
                    )),
                });
            }

            Ok(PageText {
                text: ocr_text,
                backend: TextBackend::Ocr,
                warning: None,
            })
        }
        Err(error) => {
            if ocr.mode == OcrMode::Force {
                return Err(ProcessError::ExtractionFailure {
                    path: path.display().to_string(),
                    page: index,
                    reason: error.to_string(),
                });
            }

            Ok(PageText {
                text: layer_text,
                backend: TextBackend::TextLayer,
                warning: Some(format!(
                    "OCR fallback failed for {} page {}: {}",
                    path.display(),
                    index + 1,
                    error
                )),
            })
        }
    }
}

fn image_page_text(path: &Path, index: usize, ocr: &OcrConfig) -> Result<PageText, ProcessError> {
    let text = ocr_image(path, &ocr.lang).map_err(|error| ProcessError::ExtractionFailure {
        path: path.display().to_string(),
        page: index,
        reason: error.to_string(),
    })?;

    Ok(PageText {
        text,
        backend: TextBackend::Ocr,
        warning: None,
    })
}

pub(crate) fn needs_ocr(layer_text: &str, mode: OcrMode, min_text_chars: usize) -> bool {
    match mode {
        OcrMode::Off => false,
        OcrMode::Force => true,
        OcrMode::Auto => non_whitespace_char_count(layer_text) < min_text_chars,
    }
}

pub(crate) fn non_whitespace_char_count(text: &str) -> usize {
    text.chars()
        .filter(|character| !character.is_whitespace())
        .count()
}

fn extract_pdf_text_layer(pdf_path: &Path, max_pages_per_doc: Option<usize>) -> Result<Vec<String>> {
    let mut command = Command::new("pdftotext");
    command.arg("-enc").arg("UTF-8").arg("-f").arg("1");
    if let Some(max_pages) = max_pages_per_doc {
        command.arg("-l").arg(max_pages.to_string());
    }
    command.arg(pdf_path).arg("-");

    let output = command
        .output()
        .with_context(|| format!("failed to execute pdftotext for {}", pdf_path.display()))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!(
            "pdftotext returned non-zero exit status for {}: {}",
            pdf_path.display(),
            stderr.trim()
        );
    }

    let raw = String::from_utf8_lossy(&output.stdout);
    Ok(split_text_layer_pages(&raw))
}

/// pdftotext emits exactly one form feed after each page, so the split leaves
/// a single artifact chunk at the end; only that chunk is discarded.
/// Whitespace-only pages stay in place so scanned pages still reach the OCR
/// fallback.
pub(super) fn split_text_layer_pages(raw: &str) -> Vec<String> {
    let mut pages: Vec<String> = raw
        .split('\u{000C}')
        .map(|chunk| chunk.replace('\u{0000}', ""))
        .collect();

    if pages.last().is_some_and(|page| page.trim().is_empty()) {
        pages.pop();
    }

    pages
}

/// Rasterize one PDF page to a temporary PNG and recognize it. The PNG is
/// scoped to this call and removed before the exit status is inspected.
fn ocr_pdf_page(pdf_path: &Path, page_number: usize, ocr_lang: &str, dpi: u32) -> Result<String> {
    let pdf_stem = pdf_path
        .file_stem()
        .and_then(|value| value.to_str())
        .unwrap_or("pdf");
    let safe_stem = pdf_stem
        .chars()
        .map(|character| {
            if character.is_ascii_alphanumeric() {
                character
            } else {
                '_'
            }
        })
        .collect::<String>();

    let stamp = Utc::now().timestamp_nanos_opt().unwrap_or_default();
    let output_root = std::env::temp_dir().join(format!(
        "pagesift_ocr_{}_{}_{}_{}",
        safe_stem,
        std::process::id(),
        page_number,
        stamp
    ));
    let png_path = PathBuf::from(format!("{}.png", output_root.display()));

    let pdftoppm_output = Command::new("pdftoppm")
        .arg("-r")
        .arg(dpi.to_string())
        .arg("-f")
        .arg(page_number.to_string())
        .arg("-l")
        .arg(page_number.to_string())
        .arg("-singlefile")
        .arg("-png")
        .arg(pdf_path)
        .arg(&output_root)
        .output()
        .with_context(|| format!("failed to execute pdftoppm for {}", pdf_path.display()))?;

    if !pdftoppm_output.status.success() {
        let _ = fs::remove_file(&png_path);
        let stderr = String::from_utf8_lossy(&pdftoppm_output.stderr);
        bail!(
            "pdftoppm returned non-zero exit status for {} page {}: {}",
            pdf_path.display(),
            page_number,
            stderr.trim()
        );
    }

    if !png_path.exists() {
        bail!(
            "pdftoppm did not produce expected image for {} page {}",
            pdf_path.display(),
            page_number
        );
    }

    let tesseract_output = Command::new("tesseract")
        .arg(&png_path)
        .arg("stdout")
        .arg("-l")
        .arg(ocr_lang)
        .output();

    let _ = fs::remove_file(&png_path);

    let tesseract_output = tesseract_output
        .with_context(|| format!("failed to execute tesseract for {}", png_path.display()))?;

    if !tesseract_output.status.success() {
        let stderr = String::from_utf8_lossy(&tesseract_output.stderr);
        bail!(
            "tesseract returned non-zero exit status for {} page {}: {}",
            pdf_path.display(),
            page_number,
            stderr.trim()
        );
    }

    Ok(String::from_utf8_lossy(&tesseract_output.stdout)
        .replace('\u{0000}', "")
        .trim()
        .to_string())
}

fn ocr_image(image_path: &Path, ocr_lang: &str) -> Result<String> {
    let output = Command::new("tesseract")
        .arg(image_path)
        .arg("stdout")
        .arg("-l")
        .arg(ocr_lang)
        .output()
        .with_context(|| format!("failed to execute tesseract for {}", image_path.display()))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!(
            "tesseract returned non-zero exit status for {}: {}",
            image_path.display(),
            stderr.trim()
        );
    }

    Ok(String::from_utf8_lossy(&output.stdout)
        .replace('\u{0000}', "")
        .trim()
        .to_string())
}

pub(crate) fn command_available(program: &str) -> bool {
    Command::new(program).arg("--version").output().is_ok()
}

pub(crate) fn command_version(program: &str, args: &[&str]) -> Result<String> {
    let output = Command::new(program)
        .args(args)
        .output()
        .with_context(|| format!("failed to run {} {}", program, args.join(" ")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!("{} {} failed: {}", program, args.join(" "), stderr.trim());
    }

    Ok(first_output_line(&output.stdout, &output.stderr).unwrap_or_else(|| "unknown".to_string()))
}

pub(crate) fn command_version_optional(program: &str, args: &[&str]) -> Option<String> {
    let output = Command::new(program).args(args).output().ok()?;
    first_output_line(&output.stdout, &output.stderr)
}

fn first_output_line(stdout: &[u8], stderr: &[u8]) -> Option<String> {
    let stdout = String::from_utf8_lossy(stdout);
    let stderr = String::from_utf8_lossy(stderr);
    let source = if stdout.trim().is_empty() {
        stderr.trim()
    } else {
        stdout.trim()
    };

    source
        .lines()
        .next()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| line.to_string())
}
