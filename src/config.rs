use crate::error::{Error, Result};
use crate::normalize::DEFAULT_SERIAL_PREFIX;
use std::path::PathBuf;

const TMP_SUBDIR: &str = "tmp";

/// Configuration for the cpf-export pipeline.
///
/// Use [`Config::builder()`] to construct a new configuration.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct Config {
    /// Directory holding raw `.cpf`/`.cdf` source files
    pub import_dir: PathBuf,

    /// Directory receiving converted workbook exports
    pub export_dir: PathBuf,

    /// Prefix marking the serial field in canonical filenames
    pub serial_prefix: String,

    /// Path to the JSON revision map (part number -> revision)
    pub revision_map_path: Option<PathBuf>,

    /// External tool command driving open/export operations
    pub tool_command: Option<PathBuf>,

    /// Cross-check revision mappings after conversion
    pub check_revisions: bool,

    /// Only normalize filenames; skip conversion entirely
    pub datestamp_only: bool,

    /// Write the `conversion_summary.json` sidecar after a full run
    pub write_summary: bool,
}

impl Config {
    /// Creates a new configuration builder.
    ///
    /// # Examples
    ///
    /// ```
    /// use cpf_export::Config;
    ///
    /// let config = Config::builder()
    ///     .import_dir(".")
    ///     .export_dir("./exports")
    ///     .check_revisions(false)
    ///     .build()
    ///     .expect("valid configuration");
    /// ```
    #[must_use]
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Directory holding the intermediate per-file tab-separated exports.
    #[must_use]
    pub fn tmp_dir(&self) -> PathBuf {
        self.export_dir.join(TMP_SUBDIR)
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Import directory doesn't exist or is not a directory
    /// - Revision checking is enabled without a revision map
    /// - A configured revision map or tool command does not exist
    pub fn validate(&self) -> Result<()> {
        if !self.import_dir.exists() {
            return Err(Error::config(format!(
                "Import directory does not exist: {}",
                self.import_dir.display()
            )));
        }
        if !self.import_dir.is_dir() {
            return Err(Error::config(format!(
                "Import path is not a directory: {}",
                self.import_dir.display()
            )));
        }

        if self.serial_prefix.is_empty() {
            return Err(Error::config("serial_prefix must not be empty"));
        }

        if self.check_revisions && !self.datestamp_only {
            match &self.revision_map_path {
                None => {
                    return Err(Error::config(
                        "revision checking is enabled but no revision map is configured",
                    ));
                }
                Some(path) if !path.is_file() => {
                    return Err(Error::config(format!(
                        "Revision map does not exist: {}",
                        path.display()
                    )));
                }
                Some(_) => {}
            }
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            import_dir: PathBuf::from("."),
            export_dir: PathBuf::from("exports"),
            serial_prefix: DEFAULT_SERIAL_PREFIX.to_string(),
            revision_map_path: None,
            tool_command: None,
            check_revisions: true,
            datestamp_only: false,
            write_summary: true,
        }
    }
}

/// Builder for creating a [`Config`].
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    import_dir: Option<PathBuf>,
    export_dir: Option<PathBuf>,
    serial_prefix: Option<String>,
    revision_map_path: Option<PathBuf>,
    tool_command: Option<PathBuf>,
    check_revisions: Option<bool>,
    datestamp_only: bool,
    write_summary: Option<bool>,
}

impl ConfigBuilder {
    /// Sets the directory holding raw source files.
    #[must_use]
    pub fn import_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.import_dir = Some(path.into());
        self
    }

    /// Sets the directory receiving converted exports.
    #[must_use]
    pub fn export_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.export_dir = Some(path.into());
        self
    }

    /// Sets the serial-field prefix used in canonical filenames.
    #[must_use]
    pub fn serial_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.serial_prefix = Some(prefix.into());
        self
    }

    /// Sets the path to the JSON revision map.
    #[must_use]
    pub fn revision_map_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.revision_map_path = Some(path.into());
        self
    }

    /// Sets the external tool command.
    #[must_use]
    pub fn tool_command(mut self, path: impl Into<PathBuf>) -> Self {
        self.tool_command = Some(path.into());
        self
    }

    /// Enables or disables revision-mapping checks.
    #[must_use]
    pub fn check_revisions(mut self, enabled: bool) -> Self {
        self.check_revisions = Some(enabled);
        self
    }

    /// Enables datestamp-only mode (normalize filenames, no conversion).
    #[must_use]
    pub fn datestamp_only(mut self, enabled: bool) -> Self {
        self.datestamp_only = enabled;
        self
    }

    /// Enables or disables the summary sidecar.
    #[must_use]
    pub fn write_summary(mut self, enabled: bool) -> Self {
        self.write_summary = Some(enabled);
        self
    }

    /// Builds the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if validation fails.
    pub fn build(self) -> Result<Config> {
        let config = Config {
            import_dir: self.import_dir.unwrap_or_else(|| PathBuf::from(".")),
            export_dir: self.export_dir.unwrap_or_else(|| PathBuf::from("exports")),
            serial_prefix: self
                .serial_prefix
                .unwrap_or_else(|| DEFAULT_SERIAL_PREFIX.to_string()),
            revision_map_path: self.revision_map_path,
            tool_command: self.tool_command,
            check_revisions: self.check_revisions.unwrap_or(true),
            datestamp_only: self.datestamp_only,
            write_summary: self.write_summary.unwrap_or(true),
        };

        config.validate()?;
        Ok(config)
    }
}
