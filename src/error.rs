//! Crate-wide error taxonomy.
//!
//! `InputError`, `FormatError`, and `UnsupportedArchitecture` are fatal for
//! the whole analysis. `DecodeError` is downgraded to a log message for the
//! affected function and never reaches this type. `LookupError` is returned
//! as a structured "not found" value by the callers that need it, never
//! raised across the API boundary — so it is not a variant here either.
//! `InternalInvariantError` is the one variant produced after an automatic
//! cache-invalidate-and-retry has itself failed.

use thiserror::Error;

/// Why a requested input path could not be used.
#[derive(Debug, Error)]
pub enum InputErrorKind {
    #[error("path does not exist: {0}")]
    NotFound(std::path::PathBuf),
    #[error("path is not a regular file: {0}")]
    NotRegularFile(std::path::PathBuf),
    #[error("path is not readable: {0}")]
    NotReadable(std::path::PathBuf),
    #[error("file size {found} exceeds the maximum allowed size of {limit}")]
    TooLarge { limit: u64, found: u64 },
}

/// Why the file's contents could not be parsed as a supported ELF.
#[derive(Debug, Error)]
pub enum FormatErrorKind {
    #[error("not an ELF file (bad magic)")]
    NotElf,
    #[error("unsupported ELF class or data encoding")]
    UnsupportedClass,
    #[error("truncated ELF header or section table")]
    Truncated,
    #[error("{0}")]
    Other(String),
}

/// The crate-wide error type.
#[derive(Debug, Error)]
pub enum AnalyzerError {
    #[error("input error: {0}")]
    InputError(#[from] InputErrorKind),

    #[error("format error: {0}")]
    FormatError(#[from] FormatErrorKind),

    #[error("unsupported architecture: {0}")]
    UnsupportedArchitecture(String),

    #[error("internal invariant violated: {0}")]
    InternalInvariantError(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<crate::io::error::IoError> for AnalyzerError {
    fn from(e: crate::io::error::IoError) -> Self {
        match e {
            crate::io::error::IoError::FileTooLarge { limit, found } => {
                AnalyzerError::InputError(InputErrorKind::TooLarge { limit, found })
            }
            other => AnalyzerError::Io(std::io::Error::other(other.to_string())),
        }
    }
}

/// Result alias used throughout the crate's fallible, analysis-fatal paths.
pub type Result<T> = std::result::Result<T, AnalyzerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn input_error_displays_path() {
        let err = AnalyzerError::InputError(InputErrorKind::NotFound("/nope".into()));
        assert!(err.to_string().contains("/nope"));
    }

    #[test]
    fn format_error_variants_have_distinct_messages() {
        let a = FormatErrorKind::NotElf.to_string();
        let b = FormatErrorKind::Truncated.to_string();
        assert_ne!(a, b);
    }
}
