use crate::error::{Error, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// Project/software part-number pattern: 6 or 8 digits, the letter `G`, two
/// digits. The stored software part number uses a period where the project
/// file uses `G`; [`normalize_part`] maps both to the `G` form.
pub static PART_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\d{6}(?:\d{2})?G\d{2}").expect("part-number pattern is valid"));

/// Canonicalizes a part number to the `G`-separated uppercase form.
#[must_use]
pub fn normalize_part(part: &str) -> String {
    part.trim().to_ascii_uppercase().replace('.', "G")
}

/// Static lookup from a hardware/software part number to its canonical
/// firmware revision.
///
/// Injected configuration, read-only for the pipeline. Absent entries raise
/// a lookup fault; defaulting silently would let a mis-mapped conversion
/// through.
#[derive(Debug, Clone, Default)]
pub struct RevisionMap {
    entries: HashMap<String, String>,
}

impl RevisionMap {
    /// Builds a map from `(part_number, revision)` pairs. Part numbers are
    /// canonicalized on insertion.
    #[must_use]
    pub fn from_entries<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        Self {
            entries: entries
                .into_iter()
                .map(|(k, v)| (normalize_part(k.as_ref()), v.into()))
                .collect(),
        }
    }

    /// Loads the map from a JSON object file of `"part": "revision"` pairs.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not a JSON object
    /// of strings.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        let raw: HashMap<String, String> = serde_json::from_str(&text)?;
        Ok(Self::from_entries(raw))
    }

    /// Looks up the canonical revision for a part number.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownPartNumber`] when the part has no entry.
    pub fn lookup(&self, part: &str) -> Result<&str> {
        let key = normalize_part(part);
        self.entries
            .get(&key)
            .map(String::as_str)
            .ok_or_else(|| Error::unknown_part(key))
    }

    /// Number of known part numbers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when the map holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
