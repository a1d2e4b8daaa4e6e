use crate::error::Result;
use crate::prompt::Prompter;
use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;

/// Serial numbers are 7-digit tokens whose first digit is 3, 5, or 8.
pub static SERIAL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[358]\d{6}").expect("serial pattern is valid"));

/// Coarse date filter: an 8-digit `20YY[0-1]D[0-3]D` token, or one of the
/// two dashed alternates accepted by manual entry. Deliberately admits some
/// calendar-invalid strings (e.g. day 31 in a 30-day month); a strict parse
/// against [`DATE_FORMATS`] decides what actually counts as a date.
pub static DATE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"20\d{2}[0-1]\d[0-3]\d|20\d{2}-\d{2}-\d{2}|\d{2}-\d{2}-20\d{2}")
        .expect("date pattern is valid")
});

/// Accepted date formats, tried in order; first successful parse wins.
pub const DATE_FORMATS: [&str; 3] = ["%Y%m%d", "%Y-%m-%d", "%m-%d-%Y"];

/// Canonical identity of a source file: serial number plus datestamp.
///
/// The serial is always present after extraction; the date is extracted from
/// the filename or synthesized from the file modification time (see
/// `FilenameNormalizer`). Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    /// 7-digit serial number beginning with 3, 5, or 8
    pub serial: String,
    /// Datestamp in canonical `YYYYMMDD` form
    pub date: String,
}

/// Which identity field an extraction targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    /// 7-digit vehicle/controller serial number
    Serial,
    /// Datestamp, canonicalized to `YYYYMMDD`
    Date,
}

impl Field {
    fn pattern(self) -> &'static Regex {
        match self {
            Self::Serial => &SERIAL_RE,
            Self::Date => &DATE_RE,
        }
    }

    const fn describe(self) -> &'static str {
        match self {
            Self::Serial => "serial number",
            Self::Date => "date",
        }
    }

    const fn entry_prompt(self) -> &'static str {
        match self {
            Self::Serial => "enter 7-digit serial number (first digit 3, 5 or 8)",
            Self::Date => "enter date (YYYYMMDD)",
        }
    }
}

/// Outcome of one extraction.
///
/// `escalated` is reported so callers can perform compensating actions after
/// an interactive prompt stole focus from the external tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extraction {
    /// Extracted value, canonicalized (`YYYYMMDD` for dates). `None` only
    /// when absence was allowed and nothing usable was found.
    pub value: Option<String>,
    /// True if the operator was consulted to resolve the value.
    pub escalated: bool,
}

/// Parses `text` as a date against the accepted formats, returning the
/// canonical `YYYYMMDD` form of the first format that parses.
#[must_use]
pub fn parse_date(text: &str) -> Option<String> {
    DATE_FORMATS.iter().find_map(|fmt| {
        NaiveDate::parse_from_str(text, fmt)
            .ok()
            .map(|d| d.format("%Y%m%d").to_string())
    })
}

/// Collects non-overlapping matches of `field`'s pattern in `text`.
///
/// Matches flanked by further digits are discarded: a serial or date token
/// embedded in a longer digit run is not that token. For dates, candidates
/// are strictly parsed and deduplicated, so the returned list holds only
/// *differing* valid dates in canonical form.
fn candidates(field: Field, text: &str) -> Vec<String> {
    let bytes = text.as_bytes();
    let digit_flanked = |start: usize, end: usize| {
        let before = start > 0 && bytes[start - 1].is_ascii_digit();
        let after = end < bytes.len() && bytes[end].is_ascii_digit();
        before || after
    };

    let raw: Vec<&str> = field
        .pattern()
        .find_iter(text)
        .filter(|m| !digit_flanked(m.start(), m.end()))
        .map(|m| m.as_str())
        .collect();

    match field {
        Field::Serial => raw.into_iter().map(str::to_string).collect(),
        Field::Date => {
            let mut seen = Vec::new();
            for candidate in raw.into_iter().filter_map(parse_date) {
                if !seen.contains(&candidate) {
                    seen.push(candidate);
                }
            }
            seen
        }
    }
}

/// Extracts exactly one `field` value from `text`.
///
/// - Exactly one usable match: returned immediately.
/// - Zero usable matches with `allow_absent`: `Ok(None)`, no escalation.
///   Date candidates that fail the strict calendar parse count as no match;
///   "zero matches" and "all matches invalid" are deliberately the same case
///   (callers fall through to their own fallback, e.g. file mtime).
/// - Otherwise (absence disallowed, or multiple differing candidates): the
///   ambiguity is surfaced to the operator through `prompter` together with
///   the original text, and extraction re-runs against the replacement
///   line until it resolves. Escalation never fails permanently.
///
/// `context` names the task for operator display (typically the filename).
///
/// # Errors
///
/// Returns an error only if operator input itself fails (e.g. stdin closed).
pub fn extract(
    field: Field,
    text: &str,
    context: &str,
    allow_absent: bool,
    prompter: &mut dyn Prompter,
) -> Result<Extraction> {
    let mut escalated = false;
    let mut subject = text.to_string();

    loop {
        let found = candidates(field, &subject);
        match found.len() {
            1 => {
                return Ok(Extraction {
                    value: Some(found[0].clone()),
                    escalated,
                });
            }
            0 if allow_absent && !escalated => {
                return Ok(Extraction {
                    value: None,
                    escalated: false,
                });
            }
            _ => {}
        }

        let issue = if found.is_empty() {
            format!(
                "{context}: no usable {} found in '{subject}'",
                field.describe()
            )
        } else {
            format!(
                "{context}: {} {} candidates found in '{subject}': {}",
                found.len(),
                field.describe(),
                found.join(", ")
            )
        };

        escalated = true;
        subject = prompter.resolve(&issue, text, field.entry_prompt())?;
    }
}

/// Extracts the serial number from `text`. Absence is never allowed: a
/// filename without a serial is escalated until the operator supplies one.
///
/// # Errors
///
/// Returns an error only if operator input fails.
pub fn extract_serial(text: &str, context: &str, prompter: &mut dyn Prompter) -> Result<Extraction> {
    extract(Field::Serial, text, context, false, prompter)
}

/// Extracts a date from `text` with absence allowed.
///
/// # Errors
///
/// Returns an error only if operator input fails.
pub fn extract_date(text: &str, context: &str, prompter: &mut dyn Prompter) -> Result<Extraction> {
    extract(Field::Date, text, context, true, prompter)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompt::ScriptedPrompter;

    #[test]
    fn test_single_serial_extracted() {
        let mut p = ScriptedPrompter::new();
        let got = extract_serial("3123456_20230815_export.cpf", "test", &mut p).unwrap();
        assert_eq!(got.value.as_deref(), Some("3123456"));
        assert!(!got.escalated);
    }

    #[test]
    fn test_serial_first_digit_constraint() {
        let mut p = ScriptedPrompter::new().with_replacement("5765432");
        // 7 digits starting with 4 is not a serial; escalates.
        let got = extract_serial("export_4123456.cpf", "test", &mut p).unwrap();
        assert_eq!(got.value.as_deref(), Some("5765432"));
        assert!(got.escalated);
    }

    #[test]
    fn test_serial_inside_longer_digit_run_rejected() {
        let mut p = ScriptedPrompter::new().with_replacement("8111222");
        // "31234567" is an 8-digit run, not a serial.
        let got = extract_serial("31234567.cpf", "test", &mut p).unwrap();
        assert_eq!(got.value.as_deref(), Some("8111222"));
        assert!(got.escalated);
    }

    #[test]
    fn test_two_serials_escalate_never_auto_select() {
        let mut p = ScriptedPrompter::new().with_replacement("3123456");
        let got = extract_serial("3123456_5234567.cpf", "test", &mut p).unwrap();
        assert_eq!(got.value.as_deref(), Some("3123456"));
        assert!(got.escalated);
    }

    #[test]
    fn test_escalation_loops_until_usable() {
        let mut p = ScriptedPrompter::new()
            .with_replacement("still wrong")
            .with_replacement("")
            .with_replacement("8000001");
        let got = extract_serial("nothing_here.cpf", "test", &mut p).unwrap();
        assert_eq!(got.value.as_deref(), Some("8000001"));
        assert!(got.escalated);
    }

    #[test]
    fn test_single_date_extracted_and_canonical() {
        let mut p = ScriptedPrompter::new();
        let got = extract_date("_20230815_export", "test", &mut p).unwrap();
        assert_eq!(got.value.as_deref(), Some("20230815"));
        assert!(!got.escalated);
    }

    #[test]
    fn test_alternate_date_formats_canonicalized() {
        assert_eq!(parse_date("2023-08-15").as_deref(), Some("20230815"));
        assert_eq!(parse_date("08-15-2023").as_deref(), Some("20230815"));
        assert_eq!(parse_date("20230815").as_deref(), Some("20230815"));
        assert_eq!(parse_date("20230230"), None); // Feb 30
    }

    #[test]
    fn test_coarse_match_invalid_calendar_date_is_absent() {
        // 20230931 passes the coarse filter but fails the strict parse;
        // with absence allowed this is "no date", not an escalation.
        let mut p = ScriptedPrompter::new();
        let got = extract_date("_20230931_export", "test", &mut p).unwrap();
        assert_eq!(got.value, None);
        assert!(!got.escalated);
    }

    #[test]
    fn test_zero_dates_absent_allowed() {
        let mut p = ScriptedPrompter::new();
        let got = extract_date("export_only", "test", &mut p).unwrap();
        assert_eq!(got.value, None);
        assert!(!got.escalated);
    }

    #[test]
    fn test_multiple_differing_dates_escalate() {
        let mut p = ScriptedPrompter::new().with_replacement("20230815");
        let got = extract_date("_20230815_20231104_", "test", &mut p).unwrap();
        assert_eq!(got.value.as_deref(), Some("20230815"));
        assert!(got.escalated);
    }

    #[test]
    fn test_duplicate_dates_are_one_candidate() {
        let mut p = ScriptedPrompter::new();
        let got = extract_date("_20230815_copy_20230815_", "test", &mut p).unwrap();
        assert_eq!(got.value.as_deref(), Some("20230815"));
        assert!(!got.escalated);
    }

    #[test]
    fn test_date_required_escalates_on_absence() {
        let mut p = ScriptedPrompter::new().with_replacement("2023-08-15");
        let got = extract(Field::Date, "no date here", "test", false, &mut p).unwrap();
        assert_eq!(got.value.as_deref(), Some("20230815"));
        assert!(got.escalated);
    }
}
