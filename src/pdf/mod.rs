//! PDF processing layer
//!
//! This module turns contract documents into plain text using PDFium.

mod reader;

pub use reader::{
    concatenate_pages, preview, ExtractedText, PageTextSource, PdfiumPages, TextExtractor,
};
