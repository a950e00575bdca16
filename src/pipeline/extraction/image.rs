use super::types::{ImageRegion, NativeExtractor, NativeText, AVERAGE_PAGE_CHARS};
use super::ExtractionError;

/// Standalone images carry no digital text. The whole file is one region.
pub struct ImageExtractor;

impl NativeExtractor for ImageExtractor {
    fn name(&self) -> &'static str {
        "image"
    }

    fn extract(&self, _raw: &[u8]) -> Result<NativeText, ExtractionError> {
        Ok(NativeText {
            page_count: 1,
            digital_chars: 0,
            estimated_chars: AVERAGE_PAGE_CHARS,
            regions: vec![ImageRegion { page_number: None }],
            ..NativeText::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_needs_recognition() {
        let native = ImageExtractor.extract(&[0xFF, 0xD8, 0xFF]).unwrap();
        assert_eq!(native.coverage(), 0.0);
        assert_eq!(native.regions.len(), 1);
        assert!(native.text().is_empty());
    }
}
