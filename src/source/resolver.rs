//! Source resolution for uploaded contract documents

use crate::error::{Error, Result};
use base64::Engine;
use std::path::{Path, PathBuf};

/// Raw document bytes plus a display name for the source
pub struct ResolvedPdf {
    pub data: Vec<u8>,
    pub source_name: String,
}

/// Resolve a file path to document bytes
pub fn resolve_path<P: AsRef<Path>>(path: P) -> Result<ResolvedPdf> {
    let path = path.as_ref();

    if !path.exists() {
        return Err(Error::PdfNotFound {
            path: path.display().to_string(),
        });
    }

    let data = std::fs::read(path)?;

    Ok(ResolvedPdf {
        data,
        source_name: path.display().to_string(),
    })
}

/// Resolve base64 encoded data to document bytes
pub fn resolve_base64(base64_data: &str) -> Result<ResolvedPdf> {
    let engine = base64::engine::general_purpose::STANDARD;
    let data = engine.decode(base64_data.trim())?;

    Ok(ResolvedPdf {
        data,
        source_name: "<base64>".to_string(),
    })
}

/// Validate that a path is within allowed resource directories.
/// If no resource directories are configured, all paths are allowed.
pub fn validate_path_access(path: &str, resource_dirs: &[String]) -> Result<PathBuf> {
    if resource_dirs.is_empty() {
        return Ok(PathBuf::from(path));
    }

    let canonical = std::fs::canonicalize(path).map_err(|_| Error::PathAccessDenied {
        path: path.to_string(),
    })?;

    let allowed = resource_dirs.iter().any(|dir| {
        std::fs::canonicalize(dir)
            .map(|canonical_dir| canonical.starts_with(canonical_dir))
            .unwrap_or(false)
    });

    if allowed {
        Ok(canonical)
    } else {
        Err(Error::PathAccessDenied {
            path: path.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_base64_roundtrips_bytes() {
        let resolved = resolve_base64("JVBERi0xLjQ=").unwrap(); // "%PDF-1.4"
        assert_eq!(resolved.data, b"%PDF-1.4");
        assert_eq!(resolved.source_name, "<base64>");
    }

    #[test]
    fn test_resolve_base64_invalid_base64() {
        let result = resolve_base64("not valid base64!!!");
        assert!(matches!(result, Err(Error::Base64Decode(_))));
    }

    #[test]
    fn test_resolve_path_not_found() {
        let result = resolve_path("/nonexistent/path/contract.pdf");
        assert!(matches!(result, Err(Error::PdfNotFound { .. })));
    }

    #[test]
    fn test_resolve_path_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("contract.pdf");
        std::fs::write(&path, b"%PDF-1.7 body").unwrap();

        let resolved = resolve_path(&path).unwrap();
        assert_eq!(resolved.data, b"%PDF-1.7 body");
        assert!(resolved.source_name.ends_with("contract.pdf"));
    }

    #[test]
    fn test_validate_path_no_resource_dirs_allows_all() {
        let path = validate_path_access("/anywhere/contract.pdf", &[]).unwrap();
        assert_eq!(path, PathBuf::from("/anywhere/contract.pdf"));
    }

    #[test]
    fn test_validate_path_within_resource_dir() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("contract.pdf");
        std::fs::write(&path, b"%PDF").unwrap();

        let dirs = vec![dir.path().to_string_lossy().to_string()];
        assert!(validate_path_access(&path.to_string_lossy(), &dirs).is_ok());
    }

    #[test]
    fn test_validate_path_outside_resource_dir_denied() {
        let allowed = tempfile::tempdir().unwrap();
        let other = tempfile::tempdir().unwrap();
        let path = other.path().join("contract.pdf");
        std::fs::write(&path, b"%PDF").unwrap();

        let dirs = vec![allowed.path().to_string_lossy().to_string()];
        let result = validate_path_access(&path.to_string_lossy(), &dirs);
        assert!(matches!(result, Err(Error::PathAccessDenied { .. })));
    }

    #[test]
    fn test_validate_path_traversal_denied() {
        let allowed = tempfile::tempdir().unwrap();
        let outside = tempfile::tempdir().unwrap();
        std::fs::write(outside.path().join("contract.pdf"), b"%PDF").unwrap();

        // Both temp dirs share a parent, so ".." escapes into the sibling
        let sneaky = format!(
            "{}/../{}/contract.pdf",
            allowed.path().display(),
            outside.path().file_name().unwrap().to_string_lossy()
        );
        let dirs = vec![allowed.path().to_string_lossy().to_string()];
        assert!(matches!(
            validate_path_access(&sneaky, &dirs),
            Err(Error::PathAccessDenied { .. })
        ));
    }
}
