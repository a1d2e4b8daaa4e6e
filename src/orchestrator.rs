use crate::config::Config;
use crate::driver::ToolDriver;
use crate::error::{Error, Result};
use crate::prompt::{OperatorChoice, Prompter};
use crate::source::{SourceFile, SourceKind};
use crate::validator::{ExportValidator, RevisionVerdict};
use crate::workbook::Workbook;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Terminal outcome of processing one source file in a pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Outcome {
    /// Converted and validated in this run.
    Accepted,
    /// A validated export already existed; the tool was not invoked.
    AlreadyConverted,
    /// Zero-byte clone source; never attempted.
    SkippedEmpty,
    /// The tool produced no export and the operator accepted the file as
    /// genuinely empty.
    AcceptedEmpty,
    /// Revision mismatch; waiting for a pass under the named revision.
    Deferred(String),
    /// Rejected for the stated reason; export (if any) was discarded.
    Failed(String),
}

/// Relationship between a source file and its produced export.
///
/// `required_revision` is set only when validation failed with a revision
/// mismatch; such a record is eligible for retry under a different tool
/// configuration, never for a silent skip.
#[derive(Debug, Clone, Default)]
pub struct ConversionRecord {
    /// Export artifact path; `None` until conversion produced one
    pub export_path: Option<PathBuf>,
    /// True once validation accepted the export
    pub validated: bool,
    /// Revision the source requires, when validation found a mismatch
    pub required_revision: Option<String>,
}

impl ConversionRecord {
    /// True when the export path is set and the file actually exists.
    #[must_use]
    pub fn has_export(&self) -> bool {
        self.export_path.as_deref().is_some_and(Path::exists)
    }

    /// True for records eligible for the deferred-revision retry pass.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        !self.validated && self.required_revision.is_some()
    }
}

/// Outcome tallies across a batch run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PassStats {
    /// Converted and validated in this run
    pub accepted: usize,
    /// Valid exports found on disk, skipped without tool invocation
    pub cached: usize,
    /// Zero-byte clone sources
    pub skipped_empty: usize,
    /// Missing exports accepted as genuinely empty
    pub accepted_empty: usize,
    /// Files still waiting for a different tool configuration at run end
    pub deferred: usize,
    /// Files rejected or errored
    pub failed: usize,
}

impl PassStats {
    fn record(&mut self, outcome: &Outcome) {
        match outcome {
            Outcome::Accepted => self.accepted += 1,
            Outcome::AlreadyConverted => self.cached += 1,
            Outcome::SkippedEmpty => self.skipped_empty += 1,
            Outcome::AcceptedEmpty => self.accepted_empty += 1,
            Outcome::Deferred(_) => self.deferred += 1,
            Outcome::Failed(_) => self.failed += 1,
        }
    }
}

/// Per-file outcome entry for the run summary.
#[derive(Debug, Clone, Serialize)]
pub struct FileReport {
    /// Source file name
    pub file: String,
    /// Terminal outcome
    pub outcome: Outcome,
}

/// Result of a whole batch run, across all retry passes.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
    /// Aggregate tallies
    pub stats: PassStats,
    /// Number of passes executed (1 + one per retried revision)
    pub passes: usize,
    /// True when the operator stopped the loop early
    pub stopped: bool,
    /// Terminal outcome per file
    pub outcomes: Vec<FileReport>,
}

impl BatchReport {
    fn push(&mut self, file: String, outcome: Outcome) {
        self.stats.record(&outcome);
        self.outcomes.push(FileReport { file, outcome });
    }
}

/// Drives the batch: converts each pending source through the external tool,
/// gates acceptance on validation, and sweeps revision-mismatched files in
/// later passes under reconfigured tool revisions.
///
/// Strictly sequential: the tool is a single exclusive resource, so there is
/// no parallelism here by design. The operator can abort only at exception
/// and escalation points; there is no background cancellation.
pub struct ConversionOrchestrator<'a> {
    config: &'a Config,
    validator: ExportValidator,
    driver: &'a mut dyn ToolDriver,
    prompter: &'a mut dyn Prompter,
}

impl<'a> ConversionOrchestrator<'a> {
    /// Creates an orchestrator over the injected collaborators.
    pub fn new(
        config: &'a Config,
        validator: ExportValidator,
        driver: &'a mut dyn ToolDriver,
        prompter: &'a mut dyn Prompter,
    ) -> Self {
        Self {
            config,
            validator,
            driver,
            prompter,
        }
    }

    /// Runs the batch to completion: a first unkeyed pass over `sources`,
    /// then one pass per deferred revision until the queue drains or the
    /// operator stops.
    ///
    /// # Errors
    ///
    /// Returns an error when the operator aborts or when directory setup
    /// fails. Per-file errors are contained by operator decisions and do not
    /// themselves end the run.
    pub fn run(mut self, sources: Vec<SourceFile>) -> Result<BatchReport> {
        fs::create_dir_all(self.config.tmp_dir())
            .map_err(|e| Error::io(self.config.tmp_dir(), e))?;

        let mut report = BatchReport::default();
        let mut deferred: BTreeMap<String, Vec<SourceFile>> = BTreeMap::new();
        let mut batch = sources;
        let mut pass_revision: Option<String> = None;

        'passes: loop {
            report.passes += 1;
            info!(
                "Pass {} ({}): {} file(s)",
                report.passes,
                pass_revision.as_deref().unwrap_or("initial"),
                batch.len()
            );

            for source in batch {
                let name = source.file_name();
                match self.process_file(&source) {
                    Ok(Outcome::Deferred(revision)) => {
                        info!("{name}: deferred until tool is configured for '{revision}'");
                        deferred.entry(revision).or_default().push(source);
                    }
                    Ok(outcome) => {
                        debug!("{name}: {outcome:?}");
                        report.push(name, outcome);
                    }
                    Err(e) if e.is_abort() => return Err(e),
                    Err(e) => {
                        warn!("{name}: {e}");
                        let context = format!("Exception while processing '{name}':\n  {e}");
                        match self.prompter.decide(&context)? {
                            OperatorChoice::Continue => {
                                report.push(name, Outcome::Failed(e.to_string()));
                            }
                            OperatorChoice::Stop => {
                                report.push(name, Outcome::Failed(e.to_string()));
                                report.stopped = true;
                                break 'passes;
                            }
                            OperatorChoice::Abort => return Err(Error::Aborted),
                        }
                    }
                }
            }

            let Some((revision, files)) = deferred.pop_first() else {
                break;
            };
            if !self.prompter.confirm_reconfigured(&revision)? {
                report.stopped = true;
                deferred.insert(revision, files);
                break;
            }
            self.driver.reconfigure(&revision)?;
            pass_revision = Some(revision);
            batch = files;
        }

        // Whatever is still queued when the run ends stays deferred.
        for (revision, files) in deferred {
            for source in files {
                report.push(source.file_name(), Outcome::Deferred(revision.clone()));
            }
        }

        Ok(report)
    }

    /// Processes one source file to a terminal outcome.
    fn process_file(&mut self, source: &SourceFile) -> Result<Outcome> {
        if source.is_empty_clone() {
            info!("{}: empty clone source, skipping", source.file_name());
            return Ok(Outcome::SkippedEmpty);
        }

        let stem = format!("{}{}", source.stem(), source.kind.export_suffix());
        let artifact = self.config.export_dir.join(format!("{stem}.xlsx"));

        let record = ConversionRecord {
            export_path: Some(artifact.clone()),
            ..ConversionRecord::default()
        };

        if record.has_export() {
            if let Some(outcome) = self.revalidate_cached(source, &stem, &artifact)? {
                return Ok(outcome);
            }
        }

        self.convert(source, &stem)
    }

    /// Decides whether an on-disk export can stand in for a conversion.
    ///
    /// Exported artifacts are never trusted without re-validation: a stale
    /// export whose revision mapping no longer validates is deleted so the
    /// file falls through to reprocessing.
    fn revalidate_cached(
        &mut self,
        source: &SourceFile,
        stem: &str,
        artifact: &Path,
    ) -> Result<Option<Outcome>> {
        let name = source.file_name();
        if !self.config.check_revisions || source.kind != SourceKind::CloneSource {
            info!("{name}: export already exists, skipping");
            return Ok(Some(Outcome::AlreadyConverted));
        }

        match Workbook::load_sheets(&self.config.tmp_dir(), stem, artifact) {
            Ok(workbook) => {
                if self.validator.validate_revision_mapping(&workbook)?.is_valid() {
                    info!("{name}: validated export already exists, skipping");
                    return Ok(Some(Outcome::AlreadyConverted));
                }
                warn!("{name}: existing export fails revision validation, discarding");
            }
            Err(Error::ExportMissing { .. }) => {
                warn!("{name}: existing export has no sheet data, discarding");
            }
            Err(e) => return Err(e),
        }

        self.remove_export(stem, artifact)?;
        Ok(None)
    }

    /// One conversion attempt through the external tool.
    fn convert(&mut self, source: &SourceFile, stem: &str) -> Result<Outcome> {
        let name = source.file_name();
        let tmp = self.config.tmp_dir();

        // Selecting before every file also restores tool focus lost to any
        // interactive prompt since the last operation.
        self.driver.select(source.kind)?;
        debug!("{name}: requesting open");

        if !self.driver.open(&source.path)? {
            return Err(Error::driver("open", format!("tool refused to open '{name}'")));
        }

        self.driver.export_params(&tmp, stem)?;
        if source.kind == SourceKind::ParamSource {
            self.driver.export_faults(&tmp, stem)?;
        }
        let produced = self
            .driver
            .export_spreadsheet(&self.config.export_dir, stem)?;
        debug!("{name}: export complete");

        let mut record = ConversionRecord {
            export_path: Some(produced.clone()),
            ..ConversionRecord::default()
        };

        if !record.has_export() {
            let context = format!(
                "Expected export '{}' was not produced for '{name}'.",
                produced.display()
            );
            return if self.prompter.accept_empty(&context)? {
                Ok(Outcome::AcceptedEmpty)
            } else {
                Err(Error::ExportMissing { path: produced })
            };
        }

        debug!("{name}: validating export");
        let outcome = match self.validate_export(source, stem, &produced, &mut record) {
            Ok(outcome) => outcome,
            Err(e) => {
                // A rejected export must not survive to be picked up as a
                // cached conversion by a later run.
                if let Err(cleanup) = self.remove_export(stem, &produced) {
                    warn!("{name}: could not discard rejected export: {cleanup}");
                }
                return Err(e);
            }
        };
        debug!("{name}: {record:?}");
        Ok(outcome)
    }

    /// Gates acceptance of a freshly produced export on validation.
    ///
    /// Deletes the export on the expected rejection paths itself; when
    /// validation errors out, the caller deletes it before propagating.
    fn validate_export(
        &mut self,
        source: &SourceFile,
        stem: &str,
        produced: &Path,
        record: &mut ConversionRecord,
    ) -> Result<Outcome> {
        let workbook = Workbook::load_sheets(&self.config.tmp_dir(), stem, produced)?;

        if !self.validator.validate_serial(&workbook, &mut *self.prompter)? {
            self.remove_export(stem, produced)?;
            record.export_path = None;
            return Ok(Outcome::Failed("stored serial did not validate".to_string()));
        }
        if !self.config.check_revisions || source.kind != SourceKind::CloneSource {
            record.validated = true;
            return Ok(Outcome::Accepted);
        }
        match self.validator.validate_revision_mapping(&workbook)? {
            RevisionVerdict::Valid => {
                record.validated = true;
                Ok(Outcome::Accepted)
            }
            RevisionVerdict::Mismatch { required } => {
                // The invalid export must not stay on disk masquerading
                // as valid while the file waits for the retry pass.
                self.remove_export(stem, produced)?;
                record.export_path = None;
                record.required_revision = Some(required.clone());
                debug_assert!(record.is_retryable());
                Ok(Outcome::Deferred(required))
            }
            RevisionVerdict::Unconfirmed { reason } => {
                self.remove_export(stem, produced)?;
                record.export_path = None;
                Ok(Outcome::Failed(reason))
            }
        }
    }

    /// Removes an export artifact together with its intermediate sheets.
    fn remove_export(&self, stem: &str, artifact: &Path) -> Result<()> {
        if artifact.exists() {
            fs::remove_file(artifact).map_err(|e| Error::io(artifact, e))?;
            info!("Removed export {}", artifact.display());
        }

        let tmp = self.config.tmp_dir();
        if !tmp.is_dir() {
            return Ok(());
        }
        let prefix = format!("{stem}-");
        for entry in fs::read_dir(&tmp).map_err(|e| Error::io(&tmp, e))? {
            let entry = entry.map_err(|e| Error::io(&tmp, e))?;
            let is_sheet = entry
                .file_name()
                .to_str()
                .is_some_and(|n| n.starts_with(&prefix));
            if is_sheet {
                fs::remove_file(entry.path()).map_err(|e| Error::io(entry.path(), e))?;
            }
        }
        Ok(())
    }
}
