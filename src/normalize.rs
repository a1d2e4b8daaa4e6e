use crate::error::{Error, Result};
use crate::identity::{self, Identity};
use crate::prompt::Prompter;
use crate::source::SourceFile;
use chrono::{DateTime, Local, NaiveDate};
use std::fs;
use std::path::Path;
use tracing::{debug, info};

/// Files stamped before this date carry a bogus timestamp: several legacy
/// export tools write 1999/2000 mtimes on empty or placeholder files.
const MTIME_FLOOR: (i32, u32, u32) = (2020, 1, 1);

/// Default prefix marking the serial-number field in canonical names.
pub const DEFAULT_SERIAL_PREFIX: &str = "sn";

/// One before/after pair from a datestamping pass.
///
/// Accumulated purely for the end-of-run human-readable audit; has no effect
/// on control flow.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct Rename {
    /// File name before normalization
    pub from: String,
    /// File name after normalization
    pub to: String,
}

impl std::fmt::Display for Rename {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} -> {}", self.from, self.to)
    }
}

/// Produces canonical `{date}_{prefix}{serial}{ext}` names and renames
/// source files in place.
#[derive(Debug, Clone)]
pub struct FilenameNormalizer {
    serial_prefix: String,
    mtime_floor: NaiveDate,
}

impl Default for FilenameNormalizer {
    fn default() -> Self {
        Self::new(DEFAULT_SERIAL_PREFIX)
    }
}

impl FilenameNormalizer {
    /// Creates a normalizer with the given serial prefix.
    #[must_use]
    pub fn new(serial_prefix: impl Into<String>) -> Self {
        let (y, m, d) = MTIME_FLOOR;
        Self {
            serial_prefix: serial_prefix.into(),
            mtime_floor: NaiveDate::from_ymd_opt(y, m, d).expect("floor date is valid"),
        }
    }

    /// Canonical file name for an identity and extension (`ext` includes the
    /// leading dot).
    #[must_use]
    pub fn canonical_name(&self, identity: &Identity, ext: &str) -> String {
        format!(
            "{}_{}{}{}",
            identity.date, self.serial_prefix, identity.serial, ext
        )
    }

    /// Resolves the identity of a source file: serial from the name
    /// (escalating when absent or ambiguous), date from the name substrings
    /// around the serial, falling back to file modification time.
    ///
    /// # Errors
    ///
    /// Returns an error if operator input or file metadata access fails.
    pub fn identify(&self, source: &SourceFile, prompter: &mut dyn Prompter) -> Result<Identity> {
        let name = source.file_name();
        let stem = source.stem();

        let serial = identity::extract_serial(&stem, &name, prompter)?
            .value
            .unwrap_or_default();

        // Date search runs over everything except the serial itself, one
        // substring at a time; the first substring yielding a valid date
        // wins. Duplicates across substrings are not reconciled.
        let mut date = None;
        for part in stem.split(serial.as_str()) {
            if let Some(found) = identity::extract_date(part, &name, prompter)?.value {
                date = Some(found);
                break;
            }
        }

        let date = match date {
            Some(d) => d,
            None => self.fallback_date(&source.path)?,
        };

        Ok(Identity { serial, date })
    }

    /// Normalizes one source file, renaming it in place.
    ///
    /// Returns `Ok(None)` when the file already carries its canonical name,
    /// keeping repeated runs idempotent and the rename audit free of no-ops.
    ///
    /// # Errors
    ///
    /// Returns an error if identity resolution or the rename itself fails.
    pub fn normalize(
        &self,
        source: &mut SourceFile,
        prompter: &mut dyn Prompter,
    ) -> Result<Option<Rename>> {
        let name = source.file_name();
        let identity = self.identify(source, prompter)?;

        let ext = source
            .path
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy()))
            .unwrap_or_default();
        let canonical = self.canonical_name(&identity, &ext);

        if canonical == name {
            debug!("{name} already canonical");
            return Ok(None);
        }

        let target = source.path.with_file_name(&canonical);
        fs::rename(&source.path, &target).map_err(|e| Error::io(&source.path, e))?;
        info!("Renamed {name} -> {canonical}");
        source.path = target;

        Ok(Some(Rename {
            from: name,
            to: canonical,
        }))
    }

    /// Datestamps every source in place, returning the rename audit.
    ///
    /// # Errors
    ///
    /// Returns the first error encountered; earlier renames stay applied.
    pub fn datestamp(
        &self,
        sources: &mut [SourceFile],
        prompter: &mut dyn Prompter,
    ) -> Result<Vec<Rename>> {
        let mut audit = Vec::new();
        for source in sources {
            if let Some(rename) = self.normalize(source, prompter)? {
                audit.push(rename);
            }
        }
        Ok(audit)
    }

    /// Date to use when the filename carries none: the file modification
    /// date, unless it predates the sanity floor, in which case today.
    fn fallback_date(&self, path: &Path) -> Result<String> {
        let modified = fs::metadata(path)
            .and_then(|m| m.modified())
            .map_err(|e| Error::io(path, e))?;
        let mtime_date = DateTime::<Local>::from(modified).date_naive();
        let today = Local::now().date_naive();
        Ok(resolve_fallback(mtime_date, today, self.mtime_floor)
            .format("%Y%m%d")
            .to_string())
    }
}

/// Pure fallback rule: the mtime date, or today when the mtime is implausibly
/// old.
fn resolve_fallback(mtime: NaiveDate, today: NaiveDate, floor: NaiveDate) -> NaiveDate {
    if mtime < floor { today } else { mtime }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompt::ScriptedPrompter;
    use assert_fs::prelude::*;

    fn source(temp: &assert_fs::TempDir, name: &str) -> SourceFile {
        let child = temp.child(name);
        child.write_str("data").unwrap();
        SourceFile::from_path(child.path()).unwrap()
    }

    #[test]
    fn test_normalize_serial_and_date_from_name() {
        let temp = assert_fs::TempDir::new().unwrap();
        let mut src = source(&temp, "3123456_20230815_export.cpf");
        let mut p = ScriptedPrompter::new();

        let rename = FilenameNormalizer::default()
            .normalize(&mut src, &mut p)
            .unwrap()
            .unwrap();

        assert_eq!(rename.to, "20230815_sn3123456.cpf");
        assert!(temp.child("20230815_sn3123456.cpf").path().exists());
        assert!(!temp.child("3123456_20230815_export.cpf").path().exists());
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let temp = assert_fs::TempDir::new().unwrap();
        let mut src = source(&temp, "3123456_20230815_export.cpf");
        let normalizer = FilenameNormalizer::default();
        let mut p = ScriptedPrompter::new();

        normalizer.normalize(&mut src, &mut p).unwrap().unwrap();
        assert_eq!(src.file_name(), "20230815_sn3123456.cpf");

        // Second pass over the canonical name is a no-op.
        let again = normalizer.normalize(&mut src, &mut p).unwrap();
        assert_eq!(again, None);
        assert_eq!(src.file_name(), "20230815_sn3123456.cpf");
    }

    #[test]
    fn test_normalize_falls_back_to_mtime() {
        let temp = assert_fs::TempDir::new().unwrap();
        let mut src = source(&temp, "export_3123456.cpf");
        let mut p = ScriptedPrompter::new();

        let rename = FilenameNormalizer::default()
            .normalize(&mut src, &mut p)
            .unwrap()
            .unwrap();

        // Freshly written file: mtime is now, after the floor.
        let today = Local::now().date_naive().format("%Y%m%d").to_string();
        assert_eq!(rename.to, format!("{today}_sn3123456.cpf"));
    }

    #[test]
    fn test_fallback_floor_substitutes_current_date() {
        let floor = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();
        let today = NaiveDate::from_ymd_opt(2026, 8, 28).unwrap();

        let plausible = NaiveDate::from_ymd_opt(2023, 3, 1).unwrap();
        assert_eq!(resolve_fallback(plausible, today, floor), plausible);

        let bogus = NaiveDate::from_ymd_opt(1999, 12, 31).unwrap();
        assert_eq!(resolve_fallback(bogus, today, floor), today);

        // Exactly at the floor is plausible.
        assert_eq!(resolve_fallback(floor, today, floor), floor);
    }

    #[test]
    fn test_invalid_calendar_date_in_name_uses_mtime() {
        let temp = assert_fs::TempDir::new().unwrap();
        // Passes the coarse date filter but not the strict parse.
        let mut src = source(&temp, "3123456_20230931.cpf");
        let mut p = ScriptedPrompter::new();

        let rename = FilenameNormalizer::default()
            .normalize(&mut src, &mut p)
            .unwrap()
            .unwrap();

        let today = Local::now().date_naive().format("%Y%m%d").to_string();
        assert_eq!(rename.to, format!("{today}_sn3123456.cpf"));
    }

    #[test]
    fn test_missing_serial_escalates() {
        let temp = assert_fs::TempDir::new().unwrap();
        let mut src = source(&temp, "mystery_export.cpf");
        let mut p = ScriptedPrompter::new().with_replacement("5234567");

        let rename = FilenameNormalizer::default()
            .normalize(&mut src, &mut p)
            .unwrap()
            .unwrap();

        assert!(rename.to.contains("sn5234567"));
    }

    #[test]
    fn test_datestamp_batch_audit() {
        let temp = assert_fs::TempDir::new().unwrap();
        let mut sources = vec![
            source(&temp, "3123456_20230815.cpf"),
            source(&temp, "20231104_sn5234567.cdf"), // already canonical
        ];
        let mut p = ScriptedPrompter::new();

        let audit = FilenameNormalizer::default()
            .datestamp(&mut sources, &mut p)
            .unwrap();

        // Only the actual rename appears in the audit.
        assert_eq!(audit.len(), 1);
        assert_eq!(audit[0].from, "3123456_20230815.cpf");
        assert_eq!(audit[0].to, "20230815_sn3123456.cpf");
    }
}
