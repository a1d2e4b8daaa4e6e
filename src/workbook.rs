use crate::error::{Error, Result};
use std::path::{Path, PathBuf};
use tracing::debug;

/// One worksheet of a converted export: a header row plus data rows.
#[derive(Debug, Clone, Default)]
pub struct Sheet {
    /// Worksheet/tab name
    pub name: String,
    /// Header row (column labels)
    pub headers: Vec<String>,
    /// Data rows, in file order
    pub rows: Vec<Vec<String>>,
}

impl Sheet {
    /// Builds a sheet from in-memory rows; the first row becomes headers.
    #[must_use]
    pub fn from_rows(name: impl Into<String>, mut rows: Vec<Vec<String>>) -> Self {
        let headers = if rows.is_empty() {
            Vec::new()
        } else {
            rows.remove(0)
        };
        Self {
            name: name.into(),
            headers,
            rows,
        }
    }

    /// Reads a sheet from a tab-separated export file. Rows may have uneven
    /// lengths; missing trailing cells read back as absent.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not parseable TSV.
    pub fn from_tsv_path(path: &Path, name: impl Into<String>) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(b'\t')
            .has_headers(false)
            .flexible(true)
            .from_path(path)
            .map_err(|e| Error::io(path, std::io::Error::other(e.to_string())))?;

        let mut rows = Vec::new();
        for record in reader.records() {
            let record =
                record.map_err(|e| Error::io(path, std::io::Error::other(e.to_string())))?;
            rows.push(record.iter().map(str::to_string).collect());
        }
        Ok(Self::from_rows(name, rows))
    }

    /// Index of a column by header label, case-insensitive.
    #[must_use]
    pub fn column(&self, header: &str) -> Option<usize> {
        self.headers
            .iter()
            .position(|h| h.eq_ignore_ascii_case(header))
    }

    /// Cell content at `(row, column)`, `None` past row bounds.
    #[must_use]
    pub fn cell(&self, row: usize, column: usize) -> Option<&str> {
        self.rows.get(row).and_then(|r| r.get(column)).map(String::as_str)
    }
}

/// A converted tabular export: the workbook artifact path plus its sheets.
///
/// The sheets are read back from the per-file tab-separated exports the tool
/// writes next to the workbook; their names become the workbook's tab names,
/// which is how a clone export's project part number travels in a *sheet
/// name* rather than in cell data.
#[derive(Debug, Clone)]
pub struct Workbook {
    /// Path of the export artifact this data belongs to
    pub path: PathBuf,
    sheets: Vec<Sheet>,
}

impl Workbook {
    /// Creates a workbook from already-loaded sheets.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, sheets: Vec<Sheet>) -> Self {
        Self {
            path: path.into(),
            sheets,
        }
    }

    /// Loads every `{stem}-<sheet>.tsv` in `dir` as a sheet named by the
    /// suffix after `{stem}-`.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be read, a sheet file cannot
    /// be parsed, or no sheet files exist for the stem.
    pub fn load_sheets(dir: &Path, stem: &str, artifact: impl Into<PathBuf>) -> Result<Self> {
        let artifact = artifact.into();
        let prefix = format!("{stem}-");
        let mut sheets = Vec::new();

        let mut entries: Vec<PathBuf> = std::fs::read_dir(dir)
            .map_err(|e| Error::io(dir, e))?
            .filter_map(std::result::Result::ok)
            .map(|e| e.path())
            .collect();
        entries.sort();

        for path in entries {
            let Some(file_stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let is_tsv = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e.eq_ignore_ascii_case("tsv"));
            if !is_tsv {
                continue;
            }
            let Some(sheet_name) = file_stem.strip_prefix(&prefix) else {
                continue;
            };
            debug!("Loading sheet '{sheet_name}' from {}", path.display());
            sheets.push(Sheet::from_tsv_path(&path, sheet_name)?);
        }

        if sheets.is_empty() {
            return Err(Error::ExportMissing { path: artifact });
        }
        Ok(Self::new(artifact, sheets))
    }

    /// Looks up a sheet by name, case-insensitive.
    #[must_use]
    pub fn sheet(&self, name: &str) -> Option<&Sheet> {
        self.sheets.iter().find(|s| s.name.eq_ignore_ascii_case(name))
    }

    /// All tab names, in load order.
    #[must_use]
    pub fn sheet_names(&self) -> Vec<&str> {
        self.sheets.iter().map(|s| s.name.as_str()).collect()
    }

    /// File name of the export artifact.
    #[must_use]
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default()
    }
}
