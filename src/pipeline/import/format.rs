use std::path::Path;

use serde::Serialize;

use super::ImportError;
use crate::models::DocumentFormat;
use crate::pipeline::extraction::docx::is_word_package;

/// Result of format detection
#[derive(Debug, Clone, Serialize)]
pub struct FormatDetection {
    pub format: DocumentFormat,
    pub mime_type: &'static str,
    /// PDFs only: whether the raw stream carries text operators at all.
    pub has_text_layer: Option<bool>,
    pub size_bytes: u64,
}

pub const MAX_FILE_SIZE: u64 = 100 * 1024 * 1024; // 100MB

const SNIFF_WINDOW: usize = 4096;
const DELIMITER_SAMPLE_LINES: usize = 10;

/// Detect the document format from magic bytes first, then content.
/// The filename only breaks ties for delimited text.
pub fn detect_format(content: &[u8], filename_hint: &str) -> Result<FormatDetection, ImportError> {
    let size_bytes = content.len() as u64;
    if content.is_empty() {
        return Err(ImportError::Empty);
    }
    if size_bytes > MAX_FILE_SIZE {
        return Err(ImportError::FileTooLarge {
            size_mb: size_bytes as f64 / (1024.0 * 1024.0),
            max_mb: MAX_FILE_SIZE / (1024 * 1024),
        });
    }

    let mut has_text_layer = None;
    let format = match content {
        // %PDF
        [0x25, 0x50, 0x44, 0x46, ..] => {
            has_text_layer = Some(check_pdf_has_text(content));
            DocumentFormat::Pdf
        }
        [0xFF, 0xD8, 0xFF, ..]
        | [0x89, 0x50, 0x4E, 0x47, ..]
        | [0x49, 0x49, 0x2A, 0x00, ..]
        | [0x4D, 0x4D, 0x00, 0x2A, ..]
        | [0x47, 0x49, 0x46, 0x38, ..]
        // BMP: reserved header words are zero
        | [0x42, 0x4D, _, _, _, _, 0, 0, 0, 0, ..] => DocumentFormat::Image,
        // PK\x03\x04: only Word packages are accepted among ZIP archives
        [0x50, 0x4B, 0x03, 0x04, ..] => {
            if !is_word_package(content) {
                return Err(ImportError::UnsupportedFormat(format!(
                    "ZIP archive without a Word document in {}",
                    sanitize_filename(filename_hint)
                )));
            }
            DocumentFormat::Docx
        }
        _ => detect_text_format(content, filename_hint)?,
    };

    Ok(FormatDetection {
        format,
        mime_type: format.mime_type(),
        has_text_layer,
        size_bytes,
    })
}

fn detect_text_format(content: &[u8], filename_hint: &str) -> Result<DocumentFormat, ImportError> {
    if !is_likely_text(content) {
        return Err(ImportError::UnsupportedFormat(format!(
            "binary content in {}",
            sanitize_filename(filename_hint)
        )));
    }

    let extension = extension_of(filename_hint);
    match extension.as_deref() {
        Some("csv") => return Ok(DocumentFormat::Csv),
        Some("tsv") | Some("tab") => return Ok(DocumentFormat::Tsv),
        Some("html") | Some("htm") => return Ok(DocumentFormat::Html),
        _ => {}
    }

    let head = String::from_utf8_lossy(&content[..content.len().min(SNIFF_WINDOW)]);
    let trimmed = head.trim_start_matches('\u{feff}').trim_start();

    if looks_like_html(trimmed) {
        return Ok(DocumentFormat::Html);
    }

    if trimmed.starts_with("<?xml") {
        return Ok(DocumentFormat::Xml);
    }
    if (trimmed.starts_with('{') || trimmed.starts_with('['))
        && (extension.as_deref() == Some("json") || serde_json::from_slice::<serde_json::Value>(content).is_ok())
    {
        return Ok(DocumentFormat::Json);
    }
    if trimmed.starts_with('<') && extension.as_deref() == Some("xml") {
        return Ok(DocumentFormat::Xml);
    }

    match sniff_delimiter(trimmed) {
        Some('\t') => Ok(DocumentFormat::Tsv),
        Some(_) => Ok(DocumentFormat::Csv),
        None => Ok(DocumentFormat::PlainText),
    }
}

/// Pick the delimiter whose per-line count is both consistent and at least 2
/// across the first lines. `None` means the text is not delimited.
pub fn sniff_delimiter(text: &str) -> Option<char> {
    let lines: Vec<&str> = text
        .lines()
        .filter(|l| !l.trim().is_empty())
        .take(DELIMITER_SAMPLE_LINES)
        .collect();
    if lines.len() < 2 {
        return None;
    }

    let mut best: Option<(char, f64)> = None;
    for delimiter in [',', '\t', ';', '|'] {
        let counts: Vec<usize> = lines.iter().map(|l| l.matches(delimiter).count()).collect();
        let mean = counts.iter().sum::<usize>() as f64 / counts.len() as f64;
        if mean < 2.0 {
            continue;
        }
        let consistent = counts.iter().filter(|&&c| c as f64 == mean.round()).count();
        if (consistent as f64) / (counts.len() as f64) < 0.8 {
            continue;
        }
        if best.map_or(true, |(_, m)| mean > m) {
            best = Some((delimiter, mean));
        }
    }
    best.map(|(d, _)| d)
}

/// Delimiter for a known tabular format, sniffing CSV-like content.
pub fn delimiter_for(format: DocumentFormat, text: &str) -> char {
    match format {
        DocumentFormat::Tsv => '\t',
        _ => sniff_delimiter(text).unwrap_or(','),
    }
}

/// A doctype or `<html>` root, possibly behind an XML declaration.
fn looks_like_html(head: &str) -> bool {
    let lower = head
        .get(..head.len().min(512))
        .unwrap_or(head)
        .to_ascii_lowercase();
    let body = if lower.starts_with("<?xml") {
        lower.split_once("?>").map_or("", |(_, rest)| rest.trim_start())
    } else {
        lower.as_str()
    };
    body.starts_with("<!doctype html") || body.starts_with("<html")
}

/// Quick scan for text operators (BT/ET, Tj/TJ, Tf) in the raw stream.
fn check_pdf_has_text(content: &[u8]) -> bool {
    let window = &content[..content.len().min(256 * 1024)];
    let text = String::from_utf8_lossy(window);
    let marker_count: usize = ["BT", "ET", " Tj", " TJ", " Tf"]
        .iter()
        .map(|m| text.matches(m).count())
        .sum();
    marker_count >= 3
}

/// Valid UTF-8 (allowing a cut final char) and mostly printable.
fn is_likely_text(content: &[u8]) -> bool {
    let window = &content[..content.len().min(SNIFF_WINDOW)];
    let text = match std::str::from_utf8(window) {
        Ok(t) => t,
        Err(e) if e.error_len().is_none() => {
            // Sniff window ended mid-character.
            match std::str::from_utf8(&window[..e.valid_up_to()]) {
                Ok(t) => t,
                Err(_) => return false,
            }
        }
        Err(_) => return false,
    };
    if text.contains('\0') {
        return false;
    }
    let total = text.chars().count().max(1);
    let printable = text
        .chars()
        .filter(|c| !c.is_control() || c.is_whitespace())
        .count();
    printable as f64 / total as f64 > 0.95
}

fn extension_of(filename: &str) -> Option<String> {
    Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

/// Sanitize a filename hint: strip path components, limit length
pub fn sanitize_filename(original: &str) -> String {
    let name = original
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default();

    let clean: String = name
        .chars()
        .filter(|c| !c.is_control())
        .take(255)
        .collect();
    let clean = clean.trim();

    if clean.is_empty() || clean == "." || clean == ".." {
        "document".to_string()
    } else {
        clean.to_string()
    }
}
