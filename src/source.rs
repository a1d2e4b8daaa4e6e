use crate::error::{Error, Result};
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use once_cell::sync::Lazy;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

static SOURCE_MATCHER: Lazy<GlobSet> = Lazy::new(|| {
    let mut builder = GlobSetBuilder::new();
    for pattern in ["*.cpf", "*.cdf"] {
        builder.add(
            GlobBuilder::new(pattern)
                .case_insensitive(true)
                .build()
                .expect("source glob is valid"),
        );
    }
    builder.build().expect("source glob set is valid")
});

/// Kind of raw export source the legacy tool produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceKind {
    /// `.cpf` parameter/fault export source
    ParamSource,
    /// `.cdf` clone-data-file export source (vehicle parameter snapshot)
    CloneSource,
}

impl SourceKind {
    /// Maps a file extension to a source kind (case-insensitive).
    #[must_use]
    pub fn from_path(path: &Path) -> Option<Self> {
        match path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .as_deref()
        {
            Some("cpf") => Some(Self::ParamSource),
            Some("cdf") => Some(Self::CloneSource),
            _ => None,
        }
    }

    /// Suffix appended to export workbook names for this kind.
    #[must_use]
    pub const fn export_suffix(self) -> &'static str {
        match self {
            Self::ParamSource => "_cpf",
            Self::CloneSource => "_CDF",
        }
    }
}

/// One raw export-source file discovered in the import directory.
///
/// Immutable after discovery; the pipeline never deletes a source, and only
/// the datestamping pass renames one.
#[derive(Debug, Clone)]
pub struct SourceFile {
    /// Absolute path to the source file
    pub path: PathBuf,
    /// Format kind derived from the extension
    pub kind: SourceKind,
    /// Byte size at discovery time
    pub size: u64,
}

impl SourceFile {
    /// Creates a source file record from a path, reading its metadata.
    ///
    /// # Errors
    ///
    /// Returns an error if the extension is not a known source kind or the
    /// file metadata cannot be read.
    pub fn from_path(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let kind = SourceKind::from_path(&path)
            .ok_or_else(|| Error::config(format!("not a source file: {}", path.display())))?;
        let size = fs::metadata(&path).map_err(|e| Error::io(&path, e))?.len();
        Ok(Self { path, kind, size })
    }

    /// File name portion of the path.
    #[must_use]
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default()
    }

    /// Stem of the file name (without extension).
    #[must_use]
    pub fn stem(&self) -> String {
        self.path
            .file_stem()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default()
    }

    /// True for a zero-byte clone source. Such files hold no parameter
    /// snapshot and are never submitted to conversion.
    #[must_use]
    pub const fn is_empty_clone(&self) -> bool {
        matches!(self.kind, SourceKind::CloneSource) && self.size == 0
    }
}

/// Scans the import directory (non-recursively) for `.cpf`/`.cdf` sources.
///
/// Non-source files are ignored with a debug note; results are sorted by
/// file name for deterministic pass ordering.
///
/// # Errors
///
/// Returns an error if the directory cannot be walked or no source files
/// are found.
pub fn scan_sources(dir: &Path) -> Result<Vec<SourceFile>> {
    let mut sources = Vec::new();

    for entry in WalkDir::new(dir).min_depth(1).max_depth(1).sort_by_file_name() {
        let entry = entry.map_err(|e| {
            Error::io(
                dir,
                e.into_io_error()
                    .unwrap_or_else(|| std::io::Error::other("walk error")),
            )
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        if !SOURCE_MATCHER.is_match(entry.file_name()) {
            debug!("Ignoring non-source file {}", entry.path().display());
            continue;
        }
        match SourceFile::from_path(entry.path()) {
            Ok(source) => sources.push(source),
            Err(e) => warn!("Skipping {}: {}", entry.path().display(), e),
        }
    }

    if sources.is_empty() {
        return Err(Error::no_sources(dir));
    }

    debug!("Found {} source files in {}", sources.len(), dir.display());
    Ok(sources)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_fs::prelude::*;

    #[test]
    fn test_kind_from_extension() {
        assert_eq!(
            SourceKind::from_path(Path::new("a.cpf")),
            Some(SourceKind::ParamSource)
        );
        assert_eq!(
            SourceKind::from_path(Path::new("a.CDF")),
            Some(SourceKind::CloneSource)
        );
        assert_eq!(SourceKind::from_path(Path::new("a.xlsx")), None);
        assert_eq!(SourceKind::from_path(Path::new("noext")), None);
    }

    #[test]
    fn test_scan_finds_sources_sorted() {
        let temp = assert_fs::TempDir::new().unwrap();
        temp.child("b_3123456.cpf").write_str("data").unwrap();
        temp.child("a_5234567.cdf").write_str("data").unwrap();
        temp.child("notes.txt").write_str("ignored").unwrap();

        let sources = scan_sources(temp.path()).unwrap();
        assert_eq!(sources.len(), 2);
        assert_eq!(sources[0].file_name(), "a_5234567.cdf");
        assert_eq!(sources[0].kind, SourceKind::CloneSource);
        assert_eq!(sources[1].kind, SourceKind::ParamSource);
    }

    #[test]
    fn test_scan_is_not_recursive() {
        let temp = assert_fs::TempDir::new().unwrap();
        temp.child("top.cpf").write_str("data").unwrap();
        temp.child("nested/deep.cpf").write_str("data").unwrap();

        let sources = scan_sources(temp.path()).unwrap();
        assert_eq!(sources.len(), 1);
        assert_eq!(sources[0].file_name(), "top.cpf");
    }

    #[test]
    fn test_scan_empty_directory_errors() {
        let temp = assert_fs::TempDir::new().unwrap();
        temp.child("readme.md").write_str("no sources").unwrap();

        assert!(scan_sources(temp.path()).is_err());
    }

    #[test]
    fn test_empty_clone_detection() {
        let temp = assert_fs::TempDir::new().unwrap();
        temp.child("empty.cdf").touch().unwrap();
        temp.child("empty.cpf").touch().unwrap();
        temp.child("full.cdf").write_str("snapshot").unwrap();

        let sources = scan_sources(temp.path()).unwrap();
        let by_name = |n: &str| sources.iter().find(|s| s.file_name() == n).unwrap();

        assert!(by_name("empty.cdf").is_empty_clone());
        // Zero-byte rule applies to clone sources only.
        assert!(!by_name("empty.cpf").is_empty_clone());
        assert!(!by_name("full.cdf").is_empty_clone());
    }
}
