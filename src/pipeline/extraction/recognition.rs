use std::io::Write;
use std::process::{Command, Stdio};

use super::types::{ImageRegion, RecognitionEngine, RecognizedText};
use super::ExtractionError;

/// Stand-in when no engine is installed. Always reports unavailable, which
/// the slow pass turns into a degraded completion.
pub struct DisabledRecognition;

impl RecognitionEngine for DisabledRecognition {
    fn name(&self) -> &'static str {
        "disabled"
    }

    fn is_available(&self) -> bool {
        false
    }

    fn recognize(&self, _source: &[u8], _region: &ImageRegion) -> Result<RecognizedText, ExtractionError> {
        Err(ExtractionError::RecognitionUnavailable(
            "no recognition engine configured".into(),
        ))
    }
}

/// Tesseract via its command-line binary. Image bytes go in on stdin and
/// TSV comes back on stdout. Only whole-image regions are supported; PDF
/// pages would need rasterizing first.
pub struct TesseractCli {
    binary: String,
    languages: String,
    available: bool,
}

impl TesseractCli {
    /// Probe `binary --version` once and remember the outcome.
    pub fn detect(binary: &str, languages: &str) -> Self {
        let available = Command::new(binary)
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|s| s.success())
            .unwrap_or(false);
        if available {
            tracing::info!(binary, languages, "Tesseract found");
        } else {
            tracing::warn!(binary, "Tesseract not found, recognition disabled");
        }
        Self {
            binary: binary.to_string(),
            languages: languages.to_string(),
            available,
        }
    }
}

impl RecognitionEngine for TesseractCli {
    fn name(&self) -> &'static str {
        "tesseract"
    }

    fn is_available(&self) -> bool {
        self.available
    }

    fn recognize(&self, source: &[u8], region: &ImageRegion) -> Result<RecognizedText, ExtractionError> {
        if !self.available {
            return Err(ExtractionError::RecognitionUnavailable(self.binary.clone()));
        }
        if let Some(page) = region.page_number {
            return Err(ExtractionError::Recognition(format!(
                "page {page}: PDF pages cannot be rasterized for recognition"
            )));
        }

        let mut child = Command::new(&self.binary)
            .args(["stdin", "stdout", "-l", &self.languages, "tsv"])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| ExtractionError::RecognitionUnavailable(e.to_string()))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(source)
                .map_err(|e| ExtractionError::Recognition(e.to_string()))?;
        }
        let output = child
            .wait_with_output()
            .map_err(|e| ExtractionError::Recognition(e.to_string()))?;
        if !output.status.success() {
            return Err(ExtractionError::Recognition(format!(
                "tesseract exited with {}",
                output.status
            )));
        }

        Ok(parse_tsv(&String::from_utf8_lossy(&output.stdout)))
    }
}

/// Rebuild text and mean word confidence from Tesseract TSV.
/// Columns: level page block par line word left top width height conf text.
/// Level 5 rows are words; confidence is 0-100, or -1 when unassigned.
fn parse_tsv(tsv: &str) -> RecognizedText {
    let mut lines: Vec<String> = Vec::new();
    let mut current_key: Option<(u32, u32, u32)> = None;
    let mut confidences: Vec<f32> = Vec::new();

    for line in tsv.lines().skip(1) {
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() < 12 || fields[0].trim() != "5" {
            continue;
        }
        let word = fields[11].trim();
        if word.is_empty() {
            continue;
        }
        let conf: f32 = fields[10].trim().parse().unwrap_or(-1.0);
        confidences.push(if conf < 0.0 { 0.0 } else { conf / 100.0 });

        let key = (
            fields[2].parse().unwrap_or(0),
            fields[3].parse().unwrap_or(0),
            fields[4].parse().unwrap_or(0),
        );
        match lines.last_mut() {
            Some(last) if current_key == Some(key) => {
                last.push(' ');
                last.push_str(word);
            }
            _ => {
                lines.push(word.to_string());
                current_key = Some(key);
            }
        }
    }

    let confidence = if confidences.is_empty() {
        0.0
    } else {
        confidences.iter().sum::<f32>() / confidences.len() as f32
    };
    RecognizedText {
        text: lines.join("\n"),
        confidence,
    }
}
