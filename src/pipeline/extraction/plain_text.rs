use super::types::{NativeExtractor, NativeText};
use super::ExtractionError;

/// Plain text, Markdown, JSON and XML. Content is read as UTF-8 with a
/// lossy fallback; there is never anything left for recognition.
pub struct PlainTextExtractor;

impl NativeExtractor for PlainTextExtractor {
    fn name(&self) -> &'static str {
        "plain-text"
    }

    fn extract(&self, raw: &[u8]) -> Result<NativeText, ExtractionError> {
        let text = match std::str::from_utf8(raw) {
            Ok(t) => t.to_string(),
            Err(_) => {
                tracing::warn!(bytes = raw.len(), "Invalid UTF-8 in text document, decoding lossily");
                String::from_utf8_lossy(raw).into_owned()
            }
        };
        let text = text.strip_prefix('\u{feff}').map(str::to_string).unwrap_or(text);
        Ok(NativeText::full_coverage(text))
    }
}
