//! Error types for the contract analyzer

use schemars::JsonSchema;
use serde::Serialize;
use thiserror::Error;

/// Result type alias for the contract analyzer
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for the contract analyzer
#[derive(Error, Debug)]
pub enum Error {
    /// No API key was supplied with the request or configured on the server
    #[error("API key is missing")]
    MissingCredential,

    /// The document yielded no analyzable text
    #[error("Extracted text is empty")]
    EmptyExtractedText,

    /// The analysis prompt is empty
    #[error("Analysis prompt is empty")]
    EmptyPrompt,

    /// The provider rejected the API key
    #[error("Authentication failed")]
    AuthenticationFailed,

    /// The provider reported a quota or request-rate limit
    #[error("Rate limit exceeded")]
    RateLimited,

    /// The request did not complete within the configured timeout
    #[error("Request timed out")]
    RequestTimedOut,

    /// The provider could not be reached
    #[error("Connection failed: {detail}")]
    ConnectionFailed { detail: String },

    /// Any other provider or protocol failure
    #[error("Unexpected error: {detail}")]
    Unexpected { detail: String },

    /// The document could not be turned into text
    #[error("Text extraction failed ({cause}): {reason}")]
    ExtractionFailed {
        cause: ExtractionCause,
        reason: String,
    },

    /// A generation parameter is outside its allowed range
    #[error("Invalid parameter {name}: {reason}")]
    InvalidParameter { name: String, reason: String },

    /// Model identifier is not one of the supported models
    #[error("Unknown model: {model}")]
    UnknownModel { model: String },

    /// Analysis preset identifier is not known
    #[error("Unknown analysis preset: {preset}")]
    UnknownPreset { preset: String },

    /// PDF file not found
    #[error("PDF not found: {path}")]
    PdfNotFound { path: String },

    /// Path access denied (outside allowed resource directories)
    #[error("Path access denied: {path}")]
    PathAccessDenied { path: String },

    /// Cache key not found
    #[error("Cache key not found: {key}")]
    CacheKeyNotFound { key: String },

    /// Base64 decode error
    #[error("Invalid base64 data: {0}")]
    Base64Decode(#[from] base64::DecodeError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Why a document's text could not be extracted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionCause {
    /// The bytes do not start with a PDF header
    NotPdf,
    /// The document is encrypted and no password is available
    PasswordProtected,
    /// The PDFium library could not be loaded by the server
    LibraryUnavailable,
    /// The PDF is damaged or otherwise unreadable
    Unreadable,
}

impl std::fmt::Display for ExtractionCause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            ExtractionCause::NotPdf => "not a pdf",
            ExtractionCause::PasswordProtected => "password protected",
            ExtractionCause::LibraryUnavailable => "library unavailable",
            ExtractionCause::Unreadable => "unreadable",
        })
    }
}

/// Machine-readable error tag reported alongside the client message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    MissingCredential,
    EmptyExtractedText,
    EmptyPrompt,
    AuthenticationFailed,
    RateLimited,
    RequestTimedOut,
    ConnectionFailed,
    Unexpected,
    ExtractionFailed,
    InvalidParameter,
    UnknownModel,
    UnknownPreset,
    PdfNotFound,
    PathAccessDenied,
    CacheKeyNotFound,
    InvalidBase64,
    Io,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::MissingCredential => ErrorKind::MissingCredential,
            Error::EmptyExtractedText => ErrorKind::EmptyExtractedText,
            Error::EmptyPrompt => ErrorKind::EmptyPrompt,
            Error::AuthenticationFailed => ErrorKind::AuthenticationFailed,
            Error::RateLimited => ErrorKind::RateLimited,
            Error::RequestTimedOut => ErrorKind::RequestTimedOut,
            Error::ConnectionFailed { .. } => ErrorKind::ConnectionFailed,
            Error::Unexpected { .. } => ErrorKind::Unexpected,
            Error::ExtractionFailed { .. } => ErrorKind::ExtractionFailed,
            Error::InvalidParameter { .. } => ErrorKind::InvalidParameter,
            Error::UnknownModel { .. } => ErrorKind::UnknownModel,
            Error::UnknownPreset { .. } => ErrorKind::UnknownPreset,
            Error::PdfNotFound { .. } => ErrorKind::PdfNotFound,
            Error::PathAccessDenied { .. } => ErrorKind::PathAccessDenied,
            Error::CacheKeyNotFound { .. } => ErrorKind::CacheKeyNotFound,
            Error::Base64Decode(_) => ErrorKind::InvalidBase64,
            Error::Io(_) => ErrorKind::Io,
        }
    }

    /// Return a sanitized error message safe to send to clients.
    /// Internal details (paths, library errors) are omitted, except for the
    /// connection and unexpected-failure diagnostics the user needs to act on.
    /// Full details should be logged via tracing before calling this.
    pub fn client_message(&self) -> String {
        match self {
            Error::MissingCredential => {
                "Please provide an OpenAI API key before starting the analysis".to_string()
            }
            Error::EmptyExtractedText => {
                "No text could be extracted from the PDF. Make sure the document is not empty \
                 and its text is machine-readable"
                    .to_string()
            }
            Error::EmptyPrompt => "Please enter an analysis prompt".to_string(),
            Error::AuthenticationFailed => {
                "Authentication failed. Check that your OpenAI API key is valid".to_string()
            }
            Error::RateLimited => {
                "OpenAI rate limit exceeded. Wait a moment or check your usage quota".to_string()
            }
            Error::RequestTimedOut => "The request to OpenAI timed out. Try again".to_string(),
            Error::ConnectionFailed { detail } => {
                format!("Could not connect to OpenAI: {}", detail)
            }
            Error::Unexpected { detail } => {
                format!("An unexpected error occurred while contacting OpenAI: {}", detail)
            }
            Error::ExtractionFailed { cause, .. } => match cause {
                ExtractionCause::NotPdf => "The file is not a PDF document".to_string(),
                ExtractionCause::PasswordProtected => "PDF is password protected".to_string(),
                ExtractionCause::LibraryUnavailable => {
                    "PDF text extraction is unavailable on this server".to_string()
                }
                ExtractionCause::Unreadable => "Could not read the PDF file".to_string(),
            },
            Error::InvalidParameter { name, reason } => {
                format!("Invalid {}: {}", name, reason)
            }
            Error::UnknownModel { model } => format!("Unknown model: {}", model),
            Error::UnknownPreset { preset } => format!("Unknown analysis preset: {}", preset),
            Error::PdfNotFound { .. } => "PDF not found".to_string(),
            Error::PathAccessDenied { .. } => "Access denied".to_string(),
            Error::CacheKeyNotFound { .. } => "Cache key not found".to_string(),
            Error::Base64Decode(_) => "Invalid base64 data".to_string(),
            Error::Io(_) => "I/O error".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_failures_have_distinct_kinds() {
        let errors = [
            Error::AuthenticationFailed,
            Error::RateLimited,
            Error::RequestTimedOut,
            Error::ConnectionFailed {
                detail: "refused".to_string(),
            },
            Error::Unexpected {
                detail: "boom".to_string(),
            },
        ];

        let kinds: Vec<ErrorKind> = errors.iter().map(Error::kind).collect();
        for (i, a) in kinds.iter().enumerate() {
            for b in &kinds[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn test_client_message_hides_extraction_detail() {
        let err = Error::ExtractionFailed {
            cause: ExtractionCause::Unreadable,
            reason: "/srv/uploads/secret.pdf: bad xref".to_string(),
        };
        assert!(!err.client_message().contains("secret"));
        assert!(err.to_string().contains("bad xref"));
    }

    #[test]
    fn test_extraction_causes_have_distinct_messages() {
        let causes = [
            ExtractionCause::NotPdf,
            ExtractionCause::PasswordProtected,
            ExtractionCause::LibraryUnavailable,
            ExtractionCause::Unreadable,
        ];
        let errors: Vec<Error> = causes
            .into_iter()
            .map(|cause| Error::ExtractionFailed {
                cause,
                reason: "detail".to_string(),
            })
            .collect();

        for (i, a) in errors.iter().enumerate() {
            assert_eq!(a.kind(), ErrorKind::ExtractionFailed);
            for b in &errors[i + 1..] {
                assert_ne!(a.client_message(), b.client_message());
            }
        }
        assert!(errors[1].client_message().contains("password"));
        assert!(!errors[2].client_message().contains("Could not read"));
    }

    #[test]
    fn test_client_message_keeps_connection_detail() {
        let err = Error::ConnectionFailed {
            detail: "dns lookup failed".to_string(),
        };
        assert!(err.client_message().contains("dns lookup failed"));
    }

    #[test]
    fn test_kind_serializes_snake_case() {
        let json = serde_json::to_string(&ErrorKind::RequestTimedOut).unwrap();
        assert_eq!(json, "\"request_timed_out\"");
    }
}
