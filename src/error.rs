use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using the library's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Comprehensive error types for the cpf-export library.
///
/// Expected divergences found during validation (sentinel serials, mismatched
/// revisions, absent fields) are *not* errors: validators return verdict
/// values for those so the orchestrator can make batch-level decisions.
/// Variants here cover IO, configuration, and structural integrity faults
/// that break the pipeline's assumptions about its inputs.
#[derive(Error, Debug, Clone)]
#[non_exhaustive]
pub enum Error {
    /// IO error with context about the file path.
    #[error("IO error accessing '{path}': {message}")]
    Io {
        /// Path where the error occurred
        path: PathBuf,
        /// Error message
        message: String,
    },

    /// Configuration validation error.
    #[error("Invalid configuration: {message}")]
    Config {
        /// Detailed error message
        message: String,
    },

    /// No convertible source files found in the import directory.
    #[error("No .cpf/.cdf source files found in '{path}'")]
    NoSources {
        /// Directory that was scanned
        path: PathBuf,
    },

    /// A variable row carried an alias other than the one this pipeline
    /// assumes, meaning the export's variable dictionary is not ours.
    #[error(
        "Alias mismatch for variable '{variable}' in '{path}': expected '{expected}', found '{found}'"
    )]
    AliasMismatch {
        /// Variable name whose alias was checked
        variable: String,
        /// Alias the pipeline expects
        expected: String,
        /// Alias actually present in the export
        found: String,
        /// Export the row came from
        path: PathBuf,
    },

    /// A variable expected to appear exactly once appeared several times.
    #[error("Variable '{variable}' appears {count} times in '{path}', expected exactly one row")]
    DuplicateVariable {
        /// Variable name searched for
        variable: String,
        /// Number of rows found
        count: usize,
        /// Export the rows came from
        path: PathBuf,
    },

    /// Zero or multiple worksheets matched the project part-number pattern.
    #[error("Found {count} project-file worksheets in '{path}', expected exactly one")]
    ProjectTab {
        /// Number of matching worksheet names
        count: usize,
        /// Export the worksheets came from
        path: PathBuf,
    },

    /// A required sheet is missing from a loaded export.
    #[error("Export '{path}' has no '{sheet}' sheet")]
    MissingSheet {
        /// Sheet name looked up
        sheet: String,
        /// Export searched
        path: PathBuf,
    },

    /// A required column is missing from a sheet.
    #[error("Sheet '{sheet}' in '{path}' has no '{column}' column")]
    MissingColumn {
        /// Column header looked up
        column: String,
        /// Sheet searched
        sheet: String,
        /// Export searched
        path: PathBuf,
    },

    /// A part number has no entry in the revision map.
    #[error("Part number '{part_number}' has no entry in the revision map")]
    UnknownPartNumber {
        /// Part number that failed lookup
        part_number: String,
    },

    /// The external conversion tool failed an operation.
    #[error("Tool driver failed during {operation}: {message}")]
    Driver {
        /// Operation being attempted (select/open/export)
        operation: String,
        /// Error message
        message: String,
    },

    /// An export the tool should have produced does not exist and the
    /// operator declined to accept the file as genuinely empty.
    #[error("Expected export '{path}' was not produced by the tool")]
    ExportMissing {
        /// Export path that should exist
        path: PathBuf,
    },

    /// Operator input could not be read.
    #[error("Operator prompt failed: {message}")]
    Prompt {
        /// Error message
        message: String,
    },

    /// The operator chose to abort the whole run.
    #[error("Aborted by operator")]
    Aborted,

    /// JSON serialization error.
    #[error("Serialization error: {message}")]
    Serialization {
        /// Error message
        message: String,
    },

    /// System time error.
    #[error("System time error: {message}")]
    SystemTime {
        /// Error message
        message: String,
    },
}

impl Error {
    /// Creates an IO error with path context.
    #[must_use]
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            message: source.to_string(),
        }
    }

    /// Creates a configuration error.
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates a no-sources error.
    #[must_use]
    pub fn no_sources(path: impl Into<PathBuf>) -> Self {
        Self::NoSources { path: path.into() }
    }

    /// Creates a tool-driver error.
    #[must_use]
    pub fn driver(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Driver {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Creates an operator-prompt error.
    #[must_use]
    pub fn prompt(message: impl Into<String>) -> Self {
        Self::Prompt {
            message: message.into(),
        }
    }

    /// Creates an unknown-part-number error.
    #[must_use]
    pub fn unknown_part(part_number: impl Into<String>) -> Self {
        Self::UnknownPartNumber {
            part_number: part_number.into(),
        }
    }

    /// Returns true if this is an IO error.
    #[must_use]
    pub const fn is_io(&self) -> bool {
        matches!(self, Self::Io { .. })
    }

    /// Returns true for structural integrity faults: conditions that mean
    /// the export violates the pipeline's assumptions (wrong variable
    /// dictionary, ambiguous project tabs). Fatal for the file, not the batch.
    #[must_use]
    pub const fn is_integrity(&self) -> bool {
        matches!(
            self,
            Self::AliasMismatch { .. }
                | Self::DuplicateVariable { .. }
                | Self::ProjectTab { .. }
                | Self::MissingSheet { .. }
                | Self::MissingColumn { .. }
        )
    }

    /// Returns true if the operator requested a full abort.
    #[must_use]
    pub const fn is_abort(&self) -> bool {
        matches!(self, Self::Aborted)
    }
}

// Conversion implementations for convenient error handling
impl From<std::time::SystemTimeError> for Error {
    fn from(e: std::time::SystemTimeError) -> Self {
        Self::SystemTime {
            message: e.to_string(),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization {
            message: e.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = Error::config("test message");
        assert!(err.to_string().contains("test message"));
    }

    #[test]
    fn test_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err = Error::io("/tmp/test.cpf", io_err);
        assert!(err.is_io());
        assert!(err.to_string().contains("/tmp/test.cpf"));
    }

    #[test]
    fn test_integrity_classification() {
        let alias = Error::AliasMismatch {
            variable: "NV_Mem8".to_string(),
            expected: "Vehicle_Serial_Number".to_string(),
            found: "Motor_Temp".to_string(),
            path: PathBuf::from("x.cdf"),
        };
        assert!(alias.is_integrity());

        let tabs = Error::ProjectTab {
            count: 2,
            path: PathBuf::from("x.cdf"),
        };
        assert!(tabs.is_integrity());

        assert!(!Error::config("nope").is_integrity());
        assert!(!Error::Aborted.is_integrity());
    }

    #[test]
    fn test_abort_classification() {
        assert!(Error::Aborted.is_abort());
        assert!(!Error::prompt("stdin closed").is_abort());
    }

    #[test]
    fn test_serialization_error() {
        let json_err = serde_json::from_str::<serde_json::Value>("invalid json").unwrap_err();
        let err: Error = json_err.into();
        assert!(err.to_string().contains("Serialization error"));
    }

    #[test]
    fn test_error_clone() {
        let err = Error::unknown_part("16G34");
        let cloned = err.clone();
        assert_eq!(err.to_string(), cloned.to_string());
    }
}
