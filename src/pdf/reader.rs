//! Contract text extraction backed by PDFium

use crate::error::{Error, ExtractionCause, Result};
use crate::source::{content_key, MemoCache};
use pdfium_render::prelude::*;

/// Text extracted from one contract document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedText {
    /// Content key of the source document (hex SHA-256 of its bytes)
    pub key: String,
    /// Concatenated text of all pages, in page order
    pub text: String,
}

impl ExtractedText {
    /// Whether the text contains anything worth sending for analysis
    pub fn is_analyzable(&self) -> bool {
        !self.text.trim().is_empty()
    }

    /// Number of characters (not bytes) in the text
    pub fn char_count(&self) -> usize {
        self.text.chars().count()
    }
}

/// Per-page text provider.
///
/// Returns one entry per page in document order; `None` marks a page the
/// backend reports as having no text layer (scanned or image-only pages).
pub trait PageTextSource: Send + Sync {
    fn page_texts(&self, data: &[u8]) -> Result<Vec<Option<String>>>;
}

/// Create a PDFium instance (creates new instance each time - PDFium is not thread-safe)
fn create_pdfium() -> Result<Pdfium> {
    let bindings = Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
        .or_else(|_| {
            Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(
                "/opt/pdfium/lib",
            ))
        })
        .or_else(|_| Pdfium::bind_to_system_library())
        .map_err(|e| Error::ExtractionFailed {
            cause: ExtractionCause::LibraryUnavailable,
            reason: format!("Failed to initialize PDFium: {}", e),
        })?;

    Ok(Pdfium::new(bindings))
}

/// Page text source using the PDFium library
#[derive(Debug, Default, Clone, Copy)]
pub struct PdfiumPages;

impl PdfiumPages {
    /// Map PDFium errors to our error type
    fn map_pdfium_error(err: PdfiumError) -> Error {
        match err {
            PdfiumError::PdfiumLibraryInternalError(PdfiumInternalError::PasswordError) => {
                Error::ExtractionFailed {
                    cause: ExtractionCause::PasswordProtected,
                    reason: "PDF is password protected".to_string(),
                }
            }
            _ => Error::ExtractionFailed {
                cause: ExtractionCause::Unreadable,
                reason: format!("{}", err),
            },
        }
    }
}

impl PageTextSource for PdfiumPages {
    fn page_texts(&self, data: &[u8]) -> Result<Vec<Option<String>>> {
        let pdfium = create_pdfium()?;
        let document = pdfium
            .load_pdf_from_byte_slice(data, None)
            .map_err(Self::map_pdfium_error)?;

        let pages = document.pages();
        let mut texts = Vec::with_capacity(pages.len() as usize);

        for page in pages.iter() {
            let text = match page.text() {
                Ok(text) => Some(text.all()),
                Err(_) => None,
            };
            texts.push(text);
        }

        Ok(texts)
    }
}

/// Join page texts in order, with no separator beyond what each page yields
pub fn concatenate_pages(pages: Vec<Option<String>>) -> String {
    pages.into_iter().flatten().collect()
}

/// Memoizing extractor: identical documents are parsed once while cached
pub struct TextExtractor {
    source: Box<dyn PageTextSource>,
    cache: MemoCache<String>,
}

impl TextExtractor {
    /// Extractor backed by PDFium
    pub fn new(cache_entries: usize, cache_bytes: usize) -> Self {
        Self::with_source(Box::new(PdfiumPages), cache_entries, cache_bytes)
    }

    pub fn with_source(
        source: Box<dyn PageTextSource>,
        cache_entries: usize,
        cache_bytes: usize,
    ) -> Self {
        Self {
            source,
            cache: MemoCache::new(cache_entries, cache_bytes),
        }
    }

    /// Extract the text of a document.
    ///
    /// Bytes without a PDF header, or that the backend refuses, yield
    /// `ExtractionFailed`. An empty result is not an error here; callers
    /// check [`ExtractedText::is_analyzable`].
    pub fn extract(&self, data: &[u8]) -> Result<ExtractedText> {
        let key = content_key(data);

        if let Some(text) = self.cache.get(&key) {
            tracing::debug!(key = %key, "extraction cache hit");
            return Ok(ExtractedText { key, text });
        }

        if data.len() < 4 || &data[0..4] != b"%PDF" {
            return Err(Error::ExtractionFailed {
                cause: ExtractionCause::NotPdf,
                reason: "Not a valid PDF file".to_string(),
            });
        }

        let pages = self.source.page_texts(data)?;
        let page_count = pages.len();
        let text = concatenate_pages(pages);
        tracing::info!(key = %key, pages = page_count, chars = text.len(), "extracted contract text");

        self.cache.put(key.clone(), text.clone());
        Ok(ExtractedText { key, text })
    }

    /// Look up previously extracted text by content key
    pub fn cached(&self, key: &str) -> Result<ExtractedText> {
        self.cache
            .get(key)
            .map(|text| ExtractedText {
                key: key.to_string(),
                text,
            })
            .ok_or_else(|| Error::CacheKeyNotFound {
                key: key.to_string(),
            })
    }

    #[cfg(test)]
    fn cache_len(&self) -> usize {
        self.cache.len()
    }
}

/// First `limit` characters of `text`, with "..." appended when truncated.
/// Display only; analysis always uses the full text.
pub fn preview(text: &str, limit: usize) -> String {
    match text.char_indices().nth(limit) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct FixedPages {
        pages: Vec<Option<String>>,
        calls: Arc<AtomicUsize>,
    }

    impl PageTextSource for FixedPages {
        fn page_texts(&self, _data: &[u8]) -> Result<Vec<Option<String>>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.pages.clone())
        }
    }

    fn fixed_extractor(pages: Vec<Option<&str>>) -> (TextExtractor, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let source = FixedPages {
            pages: pages.into_iter().map(|p| p.map(str::to_string)).collect(),
            calls: calls.clone(),
        };
        (TextExtractor::with_source(Box::new(source), 10, 1024 * 1024), calls)
    }

    #[test]
    fn test_two_pages_concatenate_without_separator() {
        let (extractor, _) = fixed_extractor(vec![Some("Hello "), Some("World")]);
        let extracted = extractor.extract(b"%PDF-1.4 two pages").unwrap();
        assert_eq!(extracted.text, "Hello World");
        assert!(extracted.is_analyzable());
    }

    #[test]
    fn test_textless_pages_contribute_nothing() {
        let (extractor, _) = fixed_extractor(vec![Some("Clause 1. "), None, Some("Clause 2.")]);
        let extracted = extractor.extract(b"%PDF-1.4 scanned middle").unwrap();
        assert_eq!(extracted.text, "Clause 1. Clause 2.");
    }

    #[test]
    fn test_all_pages_textless_is_not_analyzable() {
        let (extractor, _) = fixed_extractor(vec![None, Some("  \n")]);
        let extracted = extractor.extract(b"%PDF-1.4 scan").unwrap();
        assert!(!extracted.is_analyzable());

        let (extractor, _) = fixed_extractor(vec![]);
        let extracted = extractor.extract(b"%PDF-1.4 zero pages").unwrap();
        assert_eq!(extracted.text, "");
    }

    #[test]
    fn test_non_pdf_bytes_fail_without_parsing() {
        let (extractor, calls) = fixed_extractor(vec![Some("never")]);
        let inputs: [&[u8]; 4] = [b"", b"%PD", b"not a pdf", &[0xff, 0xfe, 0x00, 0x01]];
        for data in inputs {
            let result = extractor.extract(data);
            assert!(matches!(
                result,
                Err(Error::ExtractionFailed {
                    cause: ExtractionCause::NotPdf,
                    ..
                })
            ));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_identical_bytes_are_parsed_once() {
        let (extractor, calls) = fixed_extractor(vec![Some("Terms")]);
        let first = extractor.extract(b"%PDF-1.4 same").unwrap();
        let second = extractor.extract(b"%PDF-1.4 same").unwrap();
        assert_eq!(first, second);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        extractor.extract(b"%PDF-1.4 different").unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(extractor.cache_len(), 2);
    }

    #[test]
    fn test_cached_lookup_by_key() {
        let (extractor, _) = fixed_extractor(vec![Some("Lease")]);
        let extracted = extractor.extract(b"%PDF-1.4 lease").unwrap();

        assert_eq!(extractor.cached(&extracted.key).unwrap().text, "Lease");
        assert!(matches!(
            extractor.cached("missing"),
            Err(Error::CacheKeyNotFound { .. })
        ));
    }

    #[test]
    fn test_backend_failure_propagates() {
        struct Broken;
        impl PageTextSource for Broken {
            fn page_texts(&self, _data: &[u8]) -> Result<Vec<Option<String>>> {
                Err(Error::ExtractionFailed {
                    cause: ExtractionCause::Unreadable,
                    reason: "trailer not found".to_string(),
                })
            }
        }

        let extractor = TextExtractor::with_source(Box::new(Broken), 10, 1024);
        let result = extractor.extract(b"%PDF-1.4 truncated");
        assert!(matches!(result, Err(Error::ExtractionFailed { .. })));
        assert_eq!(extractor.cache_len(), 0);
    }

    #[test]
    fn test_pdfium_password_error_is_reported_as_such() {
        let err = PdfiumPages::map_pdfium_error(PdfiumError::PdfiumLibraryInternalError(
            PdfiumInternalError::PasswordError,
        ));
        assert!(matches!(
            err,
            Error::ExtractionFailed {
                cause: ExtractionCause::PasswordProtected,
                ..
            }
        ));
        assert_eq!(err.client_message(), "PDF is password protected");

        let err = PdfiumPages::map_pdfium_error(PdfiumError::PdfiumLibraryInternalError(
            PdfiumInternalError::FormatError,
        ));
        assert!(matches!(
            err,
            Error::ExtractionFailed {
                cause: ExtractionCause::Unreadable,
                ..
            }
        ));
    }

    #[test]
    fn test_preview_truncates_on_char_boundary() {
        assert_eq!(preview("short", 1000), "short");
        assert_eq!(preview("abcdef", 3), "abc...");
        assert_eq!(preview("pasal ketentuan", 5), "pasal...");
        assert_eq!(preview("äöüß", 2), "äö...");
        assert_eq!(preview("exact", 5), "exact");
    }
}
