use crate::error::{Error, Result};
use crate::identity;
use crate::prompt::Prompter;
use crate::revision::{self, RevisionMap, PART_RE};
use crate::workbook::{Sheet, Workbook};
use tracing::warn;

/// Variable-name column header in the Parameters sheet.
const VARIABLE_COLUMN: &str = "Variable Name";
/// Default-value column header in the Parameters sheet.
const DEFAULT_COLUMN: &str = "Application Default";
/// Optional alias/label column header in the Parameters sheet.
const ALIAS_COLUMN: &str = "VCL Alias";

/// The tool's "serial never programmed" sentinel: `0xFFFFFFFF` read as an
/// unsigned 32-bit integer.
const UNPROGRAMMED_SERIAL: u64 = u32::MAX as u64;

/// Verdict from the revision-mapping check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RevisionVerdict {
    /// Project and source revisions agree; export accepted.
    Valid,
    /// Source was built against a different revision. The export must be
    /// discarded and the source reprocessed once the tool is configured for
    /// `required`.
    Mismatch {
        /// Revision the source file actually requires
        required: String,
    },
    /// The source part number is missing or unparseable, so compatibility
    /// cannot be confirmed. Fails closed.
    Unconfirmed {
        /// Why confirmation was impossible
        reason: String,
    },
}

impl RevisionVerdict {
    /// True only for [`RevisionVerdict::Valid`].
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        matches!(self, Self::Valid)
    }
}

/// Cross-checks a converted export's embedded fields against its filename
/// and the injected revision map.
#[derive(Debug, Clone)]
pub struct ExportValidator {
    revisions: RevisionMap,
}

impl ExportValidator {
    /// Variable holding the controller's stored vehicle serial number.
    pub const SERIAL_VARIABLE: &'static str = "NV_Mem8";
    /// Alias the serial variable must carry.
    pub const SERIAL_ALIAS: &'static str = "Vehicle_Serial_Number";
    /// Variable holding the controller's stored software part number.
    pub const PART_VARIABLE: &'static str = "NV_Mem17";
    /// Alias the part-number variable must carry.
    pub const PART_ALIAS: &'static str = "Software_Part_Number";

    /// Creates a validator over an injected revision map.
    #[must_use]
    pub const fn new(revisions: RevisionMap) -> Self {
        Self { revisions }
    }

    fn parameters_sheet<'a>(&self, workbook: &'a Workbook) -> Result<&'a Sheet> {
        workbook
            .sheet("Parameters")
            .or_else(|| workbook.sheet("params"))
            .ok_or_else(|| Error::MissingSheet {
                sheet: "Parameters".to_string(),
                path: workbook.path.clone(),
            })
    }

    /// Reads one embedded field out of the export's Parameters sheet.
    ///
    /// Locates the row whose variable-name column equals `variable`; when an
    /// alias column is present, the row's alias must match `expected_alias`
    /// (case-insensitive); a mismatch means the export's variable dictionary
    /// is not the one this pipeline assumes, a non-recoverable integrity
    /// fault. Returns the default-value cell, `None` when the row is absent
    /// or the cell is blank.
    ///
    /// # Errors
    ///
    /// Returns an integrity fault for a duplicated variable row, an alias
    /// mismatch, or a missing sheet/column.
    pub fn extract_field(
        &self,
        workbook: &Workbook,
        variable: &str,
        expected_alias: &str,
    ) -> Result<Option<String>> {
        let sheet = self.parameters_sheet(workbook)?;
        let missing_column = |column: &str| Error::MissingColumn {
            column: column.to_string(),
            sheet: sheet.name.clone(),
            path: workbook.path.clone(),
        };
        let var_col = sheet
            .column(VARIABLE_COLUMN)
            .ok_or_else(|| missing_column(VARIABLE_COLUMN))?;
        let default_col = sheet
            .column(DEFAULT_COLUMN)
            .ok_or_else(|| missing_column(DEFAULT_COLUMN))?;
        let alias_col = sheet.column(ALIAS_COLUMN);

        let matches: Vec<usize> = (0..sheet.rows.len())
            .filter(|&row| sheet.cell(row, var_col).map(str::trim) == Some(variable))
            .collect();

        let row = match matches.as_slice() {
            [] => return Ok(None),
            [row] => *row,
            many => {
                return Err(Error::DuplicateVariable {
                    variable: variable.to_string(),
                    count: many.len(),
                    path: workbook.path.clone(),
                });
            }
        };

        if let Some(alias_col) = alias_col {
            let found = sheet.cell(row, alias_col).unwrap_or("").trim();
            if !found.eq_ignore_ascii_case(expected_alias) {
                return Err(Error::AliasMismatch {
                    variable: variable.to_string(),
                    expected: expected_alias.to_string(),
                    found: found.to_string(),
                    path: workbook.path.clone(),
                });
            }
        }

        Ok(sheet
            .cell(row, default_col)
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string))
    }

    /// Checks that the controller's stored serial matches the serial encoded
    /// in the export's own filename.
    ///
    /// Expected divergences return `false` with a report, never an error: an
    /// absent value, the `4294967295` never-programmed sentinel, and a plain
    /// mismatch all fail the check. A value that merely *contains* the
    /// filename serial is surfaced to the operator for manual review and
    /// passes only on an explicit override.
    ///
    /// # Errors
    ///
    /// Returns an error for integrity faults in the Parameters sheet or a
    /// failed operator prompt.
    pub fn validate_serial(&self, workbook: &Workbook, prompter: &mut dyn Prompter) -> Result<bool> {
        let export_name = workbook.file_name();
        let declared = self.extract_field(workbook, Self::SERIAL_VARIABLE, Self::SERIAL_ALIAS)?;

        let Some(declared) = declared else {
            warn!("{export_name}: no stored serial number in export");
            return Ok(false);
        };

        if declared.parse::<u64>() == Ok(UNPROGRAMMED_SERIAL) {
            warn!("{export_name}: stored serial is {declared} (serial never programmed)");
            return Ok(false);
        }

        let stem = workbook
            .path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        let filename_serial = identity::extract_serial(&stem, &export_name, prompter)?
            .value
            .unwrap_or_default();

        if declared == filename_serial {
            return Ok(true);
        }

        if !filename_serial.is_empty() && declared.contains(&filename_serial) {
            // Looks right but isn't exact; needs manual review, never a
            // silent accept.
            warn!(
                "{export_name}: stored serial '{declared}' contains '{filename_serial}' \
                 but is not an exact match"
            );
            let context = format!(
                "Stored serial '{declared}' in '{export_name}' contains the filename \
                 serial '{filename_serial}' but is not an exact match.\n  \
                 Accept this export after manual review?"
            );
            return prompter.confirm(&context);
        }

        warn!(
            "{export_name}: stored serial '{declared}' does not match \
             filename serial '{filename_serial}'"
        );
        Ok(false)
    }

    /// Determines whether the conversion used a compatible revision mapping.
    ///
    /// The project part number travels in a worksheet *name*; exactly one
    /// tab must match the part-number pattern. Its revision is compared to
    /// the revision of the software part number stored inside the export
    /// (period form, canonicalized before lookup).
    ///
    /// # Errors
    ///
    /// Returns an integrity fault when zero or multiple project tabs match,
    /// and a lookup fault when a part number has no revision-map entry.
    pub fn validate_revision_mapping(&self, workbook: &Workbook) -> Result<RevisionVerdict> {
        let export_name = workbook.file_name();

        let project_parts: Vec<String> = workbook
            .sheet_names()
            .iter()
            .filter_map(|name| PART_RE.find(name).map(|m| m.as_str().to_string()))
            .collect();
        let [project_part] = project_parts.as_slice() else {
            return Err(Error::ProjectTab {
                count: project_parts.len(),
                path: workbook.path.clone(),
            });
        };
        let project_rev = self.revisions.lookup(project_part)?.to_string();

        let stored = self.extract_field(workbook, Self::PART_VARIABLE, Self::PART_ALIAS)?;
        let Some(stored) = stored else {
            warn!("{export_name}: no stored software part number; cannot confirm revision mapping");
            return Ok(RevisionVerdict::Unconfirmed {
                reason: "stored software part number missing".to_string(),
            });
        };

        let source_part = revision::normalize_part(&stored);
        if !PART_RE.is_match(&source_part) {
            warn!(
                "{export_name}: stored software part number '{stored}' is unparseable; \
                 cannot confirm revision mapping"
            );
            return Ok(RevisionVerdict::Unconfirmed {
                reason: format!("unparseable software part number '{stored}'"),
            });
        }
        let source_rev = self.revisions.lookup(&source_part)?.to_string();

        if source_rev == project_rev {
            return Ok(RevisionVerdict::Valid);
        }

        warn!(
            "{export_name}: converted with project '{project_part}' (revision '{project_rev}') \
             but source requires '{source_part}' (revision '{source_rev}')"
        );
        Ok(RevisionVerdict::Mismatch {
            required: source_rev,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompt::ScriptedPrompter;
    use crate::workbook::Sheet;

    fn params_sheet(rows: &[(&str, &str, &str)]) -> Sheet {
        let mut data = vec![vec![
            VARIABLE_COLUMN.to_string(),
            DEFAULT_COLUMN.to_string(),
            ALIAS_COLUMN.to_string(),
        ]];
        for (var, value, alias) in rows {
            data.push(vec![(*var).into(), (*value).into(), (*alias).into()]);
        }
        Sheet::from_rows("Parameters", data)
    }

    fn workbook_named(name: &str, sheets: Vec<Sheet>) -> Workbook {
        Workbook::new(format!("/exports/{name}"), sheets)
    }

    fn serial_workbook(declared: &str) -> Workbook {
        workbook_named(
            "20230815_sn3123456_cpf.xlsx",
            vec![params_sheet(&[(
                ExportValidator::SERIAL_VARIABLE,
                declared,
                ExportValidator::SERIAL_ALIAS,
            )])],
        )
    }

    fn validator() -> ExportValidator {
        ExportValidator::new(RevisionMap::from_entries([
            ("123456G78", "rev-C"),
            ("654321G11", "rev-A"),
            ("654321G12", "rev-B"),
        ]))
    }

    #[test]
    fn test_extract_field_returns_value() {
        let wb = serial_workbook("3123456");
        let got = validator()
            .extract_field(&wb, ExportValidator::SERIAL_VARIABLE, ExportValidator::SERIAL_ALIAS)
            .unwrap();
        assert_eq!(got.as_deref(), Some("3123456"));
    }

    #[test]
    fn test_extract_field_blank_and_absent_are_none() {
        let blank = serial_workbook("   ");
        let got = validator()
            .extract_field(&blank, ExportValidator::SERIAL_VARIABLE, ExportValidator::SERIAL_ALIAS)
            .unwrap();
        assert_eq!(got, None);

        let got = validator()
            .extract_field(&blank, "NV_Mem99", "Whatever")
            .unwrap();
        assert_eq!(got, None);
    }

    #[test]
    fn test_extract_field_alias_mismatch_is_integrity_fault() {
        let wb = workbook_named(
            "x_cpf.xlsx",
            vec![params_sheet(&[(
                ExportValidator::SERIAL_VARIABLE,
                "3123456",
                "Motor_Temp",
            )])],
        );
        let err = validator()
            .extract_field(&wb, ExportValidator::SERIAL_VARIABLE, ExportValidator::SERIAL_ALIAS)
            .unwrap_err();
        assert!(err.is_integrity());
    }

    #[test]
    fn test_extract_field_duplicate_rows_are_integrity_fault() {
        let wb = workbook_named(
            "x_cpf.xlsx",
            vec![params_sheet(&[
                (ExportValidator::SERIAL_VARIABLE, "1", ExportValidator::SERIAL_ALIAS),
                (ExportValidator::SERIAL_VARIABLE, "2", ExportValidator::SERIAL_ALIAS),
            ])],
        );
        let err = validator()
            .extract_field(&wb, ExportValidator::SERIAL_VARIABLE, ExportValidator::SERIAL_ALIAS)
            .unwrap_err();
        assert!(err.is_integrity());
    }

    #[test]
    fn test_extract_field_without_alias_column() {
        let sheet = Sheet::from_rows(
            "Parameters",
            vec![
                vec![VARIABLE_COLUMN.into(), DEFAULT_COLUMN.into()],
                vec![ExportValidator::SERIAL_VARIABLE.into(), "3123456".into()],
            ],
        );
        let wb = workbook_named("x_cpf.xlsx", vec![sheet]);
        let got = validator()
            .extract_field(&wb, ExportValidator::SERIAL_VARIABLE, ExportValidator::SERIAL_ALIAS)
            .unwrap();
        assert_eq!(got.as_deref(), Some("3123456"));
    }

    #[test]
    fn test_validate_serial_exact_match() {
        let wb = serial_workbook("3123456");
        let mut p = ScriptedPrompter::new();
        assert!(validator().validate_serial(&wb, &mut p).unwrap());
    }

    #[test]
    fn test_validate_serial_absent_is_false_not_error() {
        let wb = serial_workbook("");
        let mut p = ScriptedPrompter::new();
        assert!(!validator().validate_serial(&wb, &mut p).unwrap());
    }

    #[test]
    fn test_validate_serial_unprogrammed_sentinel() {
        // 0xFFFFFFFF regardless of what the filename says.
        let wb = serial_workbook("4294967295");
        let mut p = ScriptedPrompter::new();
        assert!(!validator().validate_serial(&wb, &mut p).unwrap());
    }

    #[test]
    fn test_validate_serial_mismatch() {
        let wb = serial_workbook("5234567");
        let mut p = ScriptedPrompter::new();
        assert!(!validator().validate_serial(&wb, &mut p).unwrap());
    }

    #[test]
    fn test_validate_serial_containment_defaults_to_reject() {
        // Unlike a plain mismatch, containment asks the operator; a declined
        // review fails the check.
        let wb = serial_workbook("31234567");
        let mut p = ScriptedPrompter::new().with_confirmation(false);
        assert!(!validator().validate_serial(&wb, &mut p).unwrap());
    }

    #[test]
    fn test_validate_serial_containment_operator_override() {
        let wb = serial_workbook("31234567");
        let mut p = ScriptedPrompter::new().with_confirmation(true);
        assert!(validator().validate_serial(&wb, &mut p).unwrap());
    }

    fn cdf_workbook(tabs: &[&str], stored_part: &str) -> Workbook {
        let mut sheets = vec![params_sheet(&[(
            ExportValidator::PART_VARIABLE,
            stored_part,
            ExportValidator::PART_ALIAS,
        )])];
        for tab in tabs {
            sheets.push(Sheet::from_rows(*tab, vec![vec!["x".into()]]));
        }
        workbook_named("20230815_sn3123456_CDF.xlsx", sheets)
    }

    #[test]
    fn test_revision_mapping_valid() {
        let wb = cdf_workbook(&["123456G78"], "123456.78");
        let verdict = validator().validate_revision_mapping(&wb).unwrap();
        assert!(verdict.is_valid());
    }

    #[test]
    fn test_revision_mapping_mismatch_reports_required() {
        let wb = cdf_workbook(&["654321G11"], "654321.12");
        let verdict = validator().validate_revision_mapping(&wb).unwrap();
        assert_eq!(
            verdict,
            RevisionVerdict::Mismatch {
                required: "rev-B".to_string()
            }
        );
    }

    #[test]
    fn test_revision_mapping_unparseable_part_fails_closed() {
        // Project revision resolves fine; the stored part number does not.
        let wb = cdf_workbook(&["123456G78"], "garbage");
        let verdict = validator().validate_revision_mapping(&wb).unwrap();
        assert!(matches!(verdict, RevisionVerdict::Unconfirmed { .. }));
    }

    #[test]
    fn test_revision_mapping_missing_part_fails_closed() {
        let wb = cdf_workbook(&["123456G78"], "");
        let verdict = validator().validate_revision_mapping(&wb).unwrap();
        assert!(matches!(verdict, RevisionVerdict::Unconfirmed { .. }));
    }

    #[test]
    fn test_two_project_tabs_are_integrity_fault() {
        let wb = cdf_workbook(&["123456G78", "654321G11"], "123456.78");
        let err = validator().validate_revision_mapping(&wb).unwrap_err();
        assert!(err.is_integrity());
    }

    #[test]
    fn test_zero_project_tabs_are_integrity_fault() {
        let wb = cdf_workbook(&[], "123456.78");
        let err = validator().validate_revision_mapping(&wb).unwrap_err();
        assert!(err.is_integrity());
    }

    #[test]
    fn test_unknown_part_number_raises() {
        let wb = cdf_workbook(&["999999G99"], "123456.78");
        let err = validator().validate_revision_mapping(&wb).unwrap_err();
        assert!(matches!(err, Error::UnknownPartNumber { .. }));
    }
}
