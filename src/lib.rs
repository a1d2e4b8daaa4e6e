//! # cpf-export
//!
//! Batch conversion and validation pipeline for legacy vehicle-controller
//! parameter (`.cpf`) and clone (`.cdf`) exports.
//!
//! ## Features
//!
//! - Canonical `{date}_sn{serial}` filename normalization with operator
//!   escalation for ambiguous names
//! - Sequential batch conversion through an external tool, resumable via
//!   existence checks on the produced workbooks
//! - Post-conversion validation of the stored vehicle serial and of the
//!   part-number-to-revision mapping
//! - Deferred-retry passes for files that need the tool reconfigured to a
//!   different firmware revision
//!
//! ## Quick Start
//!
//! ```no_run
//! use cpf_export::{Config, run};
//!
//! # fn main() -> anyhow::Result<()> {
//! let config = Config::builder()
//!     .import_dir("./import")
//!     .export_dir("./export")
//!     .revision_map_path("./revisions.json")
//!     .tool_command("/usr/local/bin/controller-tool")
//!     .build()?;
//!
//! let stats = run(config)?;
//! stats.print_summary();
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! The library follows a pipeline architecture:
//! 1. **Scan**: Discovers `.cpf`/`.cdf` files in the import directory
//! 2. **Datestamp**: Renames each file to its canonical identity
//! 3. **Orchestrate**: Converts and validates each file, deferring
//!    revision-mismatched files to later passes

#![warn(
    missing_docs,
    rust_2018_idioms,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::nursery
)]
#![allow(clippy::module_name_repetitions)]

mod config;
mod driver;
mod error;
mod identity;
mod normalize;
mod orchestrator;
mod pipeline;
mod prompt;
mod revision;
mod source;
mod validator;
mod workbook;

pub use config::{Config, ConfigBuilder};
pub use driver::{CommandDriver, ToolDriver};
pub use error::{Error, Result};
pub use identity::{
    extract, extract_date, extract_serial, parse_date, Extraction, Field, Identity, DATE_FORMATS,
    DATE_RE, SERIAL_RE,
};
pub use normalize::{FilenameNormalizer, Rename, DEFAULT_SERIAL_PREFIX};
pub use orchestrator::{
    BatchReport, ConversionOrchestrator, ConversionRecord, FileReport, Outcome, PassStats,
};
pub use pipeline::{Pipeline, RunStats, SUMMARY_FILE};
pub use prompt::{ConsolePrompter, OperatorChoice, Prompter, ScriptedPrompter};
pub use revision::{normalize_part, RevisionMap, PART_RE};
pub use source::{scan_sources, SourceFile, SourceKind};
pub use validator::{ExportValidator, RevisionVerdict};
pub use workbook::{Sheet, Workbook};

/// Runs the complete pipeline with the given configuration, driving the
/// configured external tool and prompting the operator on the console.
///
/// This is the main entry point for the library.
///
/// # Errors
///
/// Returns an error if:
/// - No tool command is configured (and the run is not datestamp-only)
/// - The import directory holds no source files
/// - The revision map cannot be loaded
/// - The operator aborts the run
///
/// # Examples
///
/// ```no_run
/// use cpf_export::{Config, run};
///
/// # fn main() -> anyhow::Result<()> {
/// let config = Config::builder()
///     .import_dir("./import")
///     .tool_command("/usr/local/bin/controller-tool")
///     .build()?;
///
/// run(config)?;
/// # Ok(())
/// # }
/// ```
pub fn run(config: Config) -> Result<RunStats> {
    let tool = match &config.tool_command {
        Some(path) => path.clone(),
        None if config.datestamp_only => std::path::PathBuf::new(),
        None => {
            return Err(Error::config(
                "no external tool command is configured; set one or use datestamp-only mode",
            ));
        }
    };

    let mut driver = CommandDriver::new(tool);
    let mut prompter = ConsolePrompter::new();
    Pipeline::new(&config).run(&mut driver, &mut prompter)
}
