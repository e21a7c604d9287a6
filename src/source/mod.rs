//! Source resolution and caching

pub mod cache;
pub mod resolver;

pub use cache::{content_key, MemoCache, Weigh};
pub use resolver::{resolve_base64, resolve_path, validate_path_access, ResolvedPdf};
