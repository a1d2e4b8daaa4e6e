use crate::error::{Error, Result};
use crate::source::SourceKind;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::debug;

/// The legacy conversion tool, seen as an external collaborator with five
/// primitive operations.
///
/// The tool is a single exclusive resource: one file at a time, operations
/// strictly sequential, every operation assuming the selection precondition
/// established by [`ToolDriver::select`]. Implementations may block for
/// wall-clock pauses; callers never retry an operation on their own.
pub trait ToolDriver {
    /// Puts the tool in the mode for the given source kind. Called before
    /// each file so interactive prompts in between cannot leave the tool in
    /// a stale state.
    fn select(&mut self, kind: SourceKind) -> Result<()>;

    /// Opens a source file in the tool. Returns false if the tool refused
    /// the file.
    fn open(&mut self, path: &Path) -> Result<bool>;

    /// Exports the opened file's parameter table as `{stem}-params.tsv`
    /// under `dir`, returning the expected path.
    fn export_params(&mut self, dir: &Path, stem: &str) -> Result<PathBuf>;

    /// Exports the opened file's fault table as `{stem}-faults.tsv` under
    /// `dir`. Returns `None` when the tool reports no fault data.
    fn export_faults(&mut self, dir: &Path, stem: &str) -> Result<Option<PathBuf>>;

    /// Exports the combined workbook as `{stem}.xlsx` under `dir`,
    /// returning the expected path.
    fn export_spreadsheet(&mut self, dir: &Path, stem: &str) -> Result<PathBuf>;

    /// Loads a different tool configuration matching `revision`. Called
    /// between retry passes, after the operator confirms.
    fn reconfigure(&mut self, revision: &str) -> Result<()>;
}

/// Driver that delegates each operation to a host-configured command.
///
/// The command is invoked once per operation with a subcommand and positional
/// arguments; a non-zero exit is a driver fault except for `open`, where it
/// means the tool refused the file.
#[derive(Debug)]
pub struct CommandDriver {
    program: PathBuf,
    // Memoized selection so repeated same-kind files skip the select round
    // trip. Instance state, deliberately not a process-wide global.
    selected: Option<SourceKind>,
}

impl CommandDriver {
    /// Creates a driver wrapping the given command.
    #[must_use]
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            selected: None,
        }
    }

    fn invoke(&self, operation: &str, args: &[&str]) -> Result<bool> {
        debug!("tool {} {}", operation, args.join(" "));
        let status = Command::new(&self.program)
            .arg(operation)
            .args(args)
            .status()
            .map_err(|e| Error::driver(operation, e.to_string()))?;
        Ok(status.success())
    }

    fn invoke_ok(&self, operation: &str, args: &[&str]) -> Result<()> {
        if self.invoke(operation, args)? {
            Ok(())
        } else {
            Err(Error::driver(operation, "tool reported failure"))
        }
    }
}

impl ToolDriver for CommandDriver {
    fn select(&mut self, kind: SourceKind) -> Result<()> {
        if self.selected == Some(kind) {
            return Ok(());
        }
        let mode = match kind {
            SourceKind::ParamSource => "cpf",
            SourceKind::CloneSource => "cdf",
        };
        self.invoke_ok("select", &[mode])?;
        self.selected = Some(kind);
        Ok(())
    }

    fn open(&mut self, path: &Path) -> Result<bool> {
        self.invoke("open", &[&path.to_string_lossy()])
    }

    fn export_params(&mut self, dir: &Path, stem: &str) -> Result<PathBuf> {
        self.invoke_ok("export-params", &[&dir.to_string_lossy(), stem])?;
        Ok(dir.join(format!("{stem}-params.tsv")))
    }

    fn export_faults(&mut self, dir: &Path, stem: &str) -> Result<Option<PathBuf>> {
        if self.invoke("export-faults", &[&dir.to_string_lossy(), stem])? {
            Ok(Some(dir.join(format!("{stem}-faults.tsv"))))
        } else {
            Ok(None)
        }
    }

    fn export_spreadsheet(&mut self, dir: &Path, stem: &str) -> Result<PathBuf> {
        self.invoke_ok("export-spreadsheet", &[&dir.to_string_lossy(), stem])?;
        Ok(dir.join(format!("{stem}.xlsx")))
    }

    fn reconfigure(&mut self, revision: &str) -> Result<()> {
        // A new configuration invalidates the memoized selection.
        self.selected = None;
        self.invoke_ok("reconfigure", &[revision])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expected_export_paths() {
        // Paths are derived without touching the filesystem.
        let dir = Path::new("/exports/tmp");
        assert_eq!(
            dir.join(format!("{}-params.tsv", "20230815_sn3123456_cpf")),
            PathBuf::from("/exports/tmp/20230815_sn3123456_cpf-params.tsv")
        );
    }

    #[test]
    fn test_command_driver_missing_program_is_driver_fault() {
        let mut driver = CommandDriver::new("/nonexistent/tool-driver");
        let err = driver.select(SourceKind::ParamSource).unwrap_err();
        assert!(matches!(err, Error::Driver { .. }));
    }

    #[test]
    fn test_selection_memoization() {
        // `true` exits 0 regardless of arguments; good enough to observe
        // the cached-selection short circuit.
        let mut driver = CommandDriver::new("true");
        driver.select(SourceKind::ParamSource).unwrap();
        assert_eq!(driver.selected, Some(SourceKind::ParamSource));
        // Second select of the same kind is a no-op.
        driver.select(SourceKind::ParamSource).unwrap();

        driver.reconfigure("rev-B").unwrap();
        assert_eq!(driver.selected, None);
    }
}
