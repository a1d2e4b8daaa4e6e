use crate::config::Config;
use crate::driver::ToolDriver;
use crate::error::{Error, Result};
use crate::normalize::{FilenameNormalizer, Rename};
use crate::orchestrator::{ConversionOrchestrator, FileReport, PassStats};
use crate::prompt::Prompter;
use crate::revision::RevisionMap;
use crate::source::scan_sources;
use crate::validator::ExportValidator;
use serde::Serialize;
use std::fs;
use std::time::Instant;
use tracing::info;

/// Name of the end-of-run summary sidecar written to the export directory.
pub const SUMMARY_FILE: &str = "conversion_summary.json";

/// End-of-run statistics, printable and serialized to the summary sidecar.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunStats {
    /// Source files found in the import directory
    pub sources: usize,
    /// Filename normalizations applied this run
    pub renames: Vec<Rename>,
    /// Aggregate conversion tallies
    pub stats: PassStats,
    /// Conversion passes executed (0 in datestamp-only runs)
    pub passes: usize,
    /// True when the operator stopped the run early
    pub stopped: bool,
    /// Terminal outcome per processed file
    pub outcomes: Vec<FileReport>,
    /// Wall-clock duration of the run
    pub duration_secs: f64,
}

impl RunStats {
    /// Prints the human-readable run summary to stdout.
    pub fn print_summary(&self) {
        println!("\nRun summary");
        println!("  Sources found:   {}", self.sources);
        println!("  Renamed:         {}", self.renames.len());
        for rename in &self.renames {
            println!("    {rename}");
        }
        if self.passes > 0 {
            println!("  Passes:          {}", self.passes);
            println!("  Accepted:        {}", self.stats.accepted);
            println!("  Already done:    {}", self.stats.cached);
            println!("  Skipped (empty): {}", self.stats.skipped_empty);
            println!("  Accepted empty:  {}", self.stats.accepted_empty);
            println!("  Deferred:        {}", self.stats.deferred);
            println!("  Failed:          {}", self.stats.failed);
        }
        if self.stopped {
            println!("  Run stopped early by operator.");
        }
        println!("  Duration:        {:.1}s", self.duration_secs);
    }
}

/// Wires the run end to end: scan the import directory, normalize file
/// names, then hand the batch to the conversion orchestrator.
pub struct Pipeline<'a> {
    config: &'a Config,
}

impl<'a> Pipeline<'a> {
    /// Creates a pipeline over a validated configuration.
    #[must_use]
    pub const fn new(config: &'a Config) -> Self {
        Self { config }
    }

    /// Runs all stages and returns the run statistics.
    ///
    /// # Errors
    ///
    /// Returns an error when no sources are found, when the revision map
    /// cannot be loaded, when the operator aborts, or when an I/O failure
    /// ends the run.
    pub fn run(
        &self,
        driver: &mut dyn ToolDriver,
        prompter: &mut dyn Prompter,
    ) -> Result<RunStats> {
        let started = Instant::now();

        let mut sources = scan_sources(&self.config.import_dir)?;
        info!(
            "Found {} source file(s) in {}",
            sources.len(),
            self.config.import_dir.display()
        );

        let normalizer = FilenameNormalizer::new(&self.config.serial_prefix);
        let renames = normalizer.datestamp(&mut sources, prompter)?;
        info!(
            "Datestamp stage done: {} of {} file(s) renamed",
            renames.len(),
            sources.len()
        );

        let mut run = RunStats {
            sources: sources.len(),
            renames,
            ..RunStats::default()
        };

        if self.config.datestamp_only {
            info!("Datestamp-only run, conversion skipped");
            run.duration_secs = started.elapsed().as_secs_f64();
            return Ok(run);
        }

        let revisions = match &self.config.revision_map_path {
            Some(path) => {
                let map = RevisionMap::from_json_file(path)?;
                info!("Loaded {} revision mapping(s) from {}", map.len(), path.display());
                map
            }
            None => RevisionMap::default(),
        };

        let orchestrator = ConversionOrchestrator::new(
            self.config,
            ExportValidator::new(revisions),
            driver,
            prompter,
        );
        let report = orchestrator.run(sources)?;

        run.stats = report.stats;
        run.passes = report.passes;
        run.stopped = report.stopped;
        run.outcomes = report.outcomes;
        run.duration_secs = started.elapsed().as_secs_f64();

        if self.config.write_summary {
            self.write_summary(&run)?;
        }

        Ok(run)
    }

    /// Writes the JSON summary sidecar next to the exports.
    fn write_summary(&self, run: &RunStats) -> Result<()> {
        let path = self.config.export_dir.join(SUMMARY_FILE);
        let json = serde_json::to_string_pretty(run)?;
        fs::write(&path, json).map_err(|e| Error::io(&path, e))?;
        info!("Wrote {}", path.display());
        Ok(())
    }
}
