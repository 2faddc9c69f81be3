//! Client-side structural check of appointment CSVs before upload.
//!
//! The header is compared against the fixed column set of the declared
//! [`RecordKind`]; the first [`PREVIEW_ROWS`] data rows are type-checked.
//! Authoritative validation still happens on the server after upload.

use std::fmt;

use chrono::{NaiveDate, NaiveDateTime};

use crate::models::RecordKind;

/// Number of data rows type-checked and kept for preview.
pub const PREVIEW_ROWS: usize = 5;

pub const UPCOMING_COLUMNS: [&str; 10] = [
    "id",
    "age",
    "days_lps",
    "employed",
    "benefits",
    "driver",
    "vdu",
    "varifocal",
    "high_rx",
    "appointment_date",
];

pub const PAST_COLUMNS: [&str; 11] = [
    "id",
    "age",
    "days_lps",
    "employed",
    "benefits",
    "driver",
    "vdu",
    "varifocal",
    "high_rx",
    "appointment_date",
    "amount_spent",
];

pub const DATE_COLUMN: &str = "appointment_date";

pub const BOOLEAN_COLUMNS: [&str; 6] = ["employed", "benefits", "driver", "vdu", "varifocal", "high_rx"];

const UPCOMING_NUMERIC: [&str; 3] = ["id", "age", "days_lps"];
const PAST_NUMERIC: [&str; 4] = ["id", "age", "days_lps", "amount_spent"];

/// Literal values accepted in boolean-like columns (compared lower-cased).
const FLAG_LITERALS: [(&str, bool); 6] = [
    ("0", false),
    ("1", true),
    ("true", true),
    ("false", false),
    ("y", true),
    ("n", false),
];

pub fn expected_columns(kind: RecordKind) -> &'static [&'static str] {
    match kind {
        RecordKind::Upcoming => &UPCOMING_COLUMNS,
        RecordKind::Past => &PAST_COLUMNS,
    }
}

pub fn numeric_columns(kind: RecordKind) -> &'static [&'static str] {
    match kind {
        RecordKind::Upcoming => &UPCOMING_NUMERIC,
        RecordKind::Past => &PAST_NUMERIC,
    }
}

// ==================== Cell Checks ====================

/// Parse a boolean-like cell: `0/1`, `true/false`, `y/n`, any case.
pub fn parse_flag(value: &str) -> Option<bool> {
    let lowered = value.trim().to_ascii_lowercase();
    FLAG_LITERALS
        .iter()
        .find(|(literal, _)| *literal == lowered)
        .map(|(_, flag)| *flag)
}

pub fn is_flag(value: &str) -> bool {
    parse_flag(value).is_some()
}

/// Finite number check. `NaN` and infinities are rejected.
pub fn is_numeric(value: &str) -> bool {
    value
        .trim()
        .parse::<f64>()
        .map(|n| n.is_finite())
        .unwrap_or(false)
}

/// `YYYY-MM-DD` or `YYYY-MM-DD HH:MM:SS`, and a real calendar date/time.
pub fn is_valid_date(value: &str) -> bool {
    let bytes = value.as_bytes();
    match bytes.len() {
        10 => {
            has_date_shape(bytes) && NaiveDate::parse_from_str(value, "%Y-%m-%d").is_ok()
        }
        19 => {
            has_date_shape(&bytes[..10])
                && bytes[10] == b' '
                && has_time_shape(&bytes[11..])
                && NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S").is_ok()
        }
        _ => false,
    }
}

fn has_date_shape(bytes: &[u8]) -> bool {
    bytes.len() == 10
        && bytes.iter().enumerate().all(|(i, b)| match i {
            4 | 7 => *b == b'-',
            _ => b.is_ascii_digit(),
        })
}

fn has_time_shape(bytes: &[u8]) -> bool {
    bytes.len() == 8
        && bytes.iter().enumerate().all(|(i, b)| match i {
            2 | 5 => *b == b':',
            _ => b.is_ascii_digit(),
        })
}

// ==================== Report Types ====================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowProblem {
    Date,
    Numeric,
    Boolean,
    /// The CSV reader could not decode the row at all.
    Unreadable(String),
}

/// One type violation in a data row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowError {
    /// 1-based line number counting the header as row 1.
    pub row: usize,
    pub column: String,
    pub value: String,
    pub problem: RowProblem,
}

impl fmt::Display for RowError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.problem {
            RowProblem::Date => write!(
                f,
                "Row {}: {} should be YYYY-MM-DD or YYYY-MM-DD HH:MM:SS format, got \"{}\"",
                self.row, self.column, self.value
            ),
            RowProblem::Numeric => write!(
                f,
                "Row {}: {} should be numeric, got \"{}\"",
                self.row, self.column, self.value
            ),
            RowProblem::Boolean => write!(
                f,
                "Row {}: {} should be 0/1, true/false, or Y/N, got \"{}\"",
                self.row, self.column, self.value
            ),
            RowProblem::Unreadable(reason) => {
                write!(f, "Row {}: could not be read ({})", self.row, reason)
            }
        }
    }
}

/// Outcome of checking one CSV file.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationReport {
    pub kind: RecordKind,
    pub valid: bool,
    /// Primary error: the missing-column summary or the first row error.
    pub error: Option<String>,
    /// Header as found, lower-cased and trimmed, in file order.
    pub header: Vec<String>,
    pub missing_columns: Vec<String>,
    pub extra_columns: Vec<String>,
    pub row_errors: Vec<RowError>,
    /// First data rows, one value per header column.
    pub preview: Vec<Vec<String>>,
    pub total_rows: usize,
}

impl ValidationReport {
    fn empty_file(kind: RecordKind) -> Self {
        Self {
            kind,
            valid: false,
            error: Some("CSV file is empty".to_string()),
            header: Vec::new(),
            missing_columns: Vec::new(),
            extra_columns: Vec::new(),
            row_errors: Vec::new(),
            preview: Vec::new(),
            total_rows: 0,
        }
    }

    pub fn expected_columns(&self) -> &'static [&'static str] {
        expected_columns(self.kind)
    }

    /// Non-fatal findings worth surfacing next to a valid result.
    pub fn warnings(&self) -> Vec<String> {
        if self.extra_columns.is_empty() {
            Vec::new()
        } else {
            vec![format!(
                "Extra columns (will be ignored): {}",
                self.extra_columns.join(", ")
            )]
        }
    }

    /// Preview cell by data-row index and column name.
    pub fn preview_value(&self, row: usize, column: &str) -> Option<&str> {
        let idx = self.header.iter().position(|h| h == column)?;
        self.preview.get(row)?.get(idx).map(String::as_str)
    }
}

// ==================== Validation ====================

/// Check raw CSV text against the column set of `kind`.
pub fn validate_csv(text: &str, kind: RecordKind) -> ValidationReport {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(text.as_bytes());

    let mut records = reader
        .records()
        .filter(|r| r.as_ref().map(|rec| !is_blank(rec)).unwrap_or(true));

    let header: Vec<String> = match records.next() {
        Some(Ok(record)) => record
            .iter()
            .enumerate()
            .map(|(i, h)| {
                let h = if i == 0 { h.trim_start_matches('\u{feff}') } else { h };
                h.trim().to_lowercase()
            })
            .collect(),
        Some(Err(e)) => {
            let mut report = ValidationReport::empty_file(kind);
            report.error = Some(format!("Could not read CSV header: {}", e));
            return report;
        }
        None => return ValidationReport::empty_file(kind),
    };

    let expected = expected_columns(kind);
    let missing_columns: Vec<String> = expected
        .iter()
        .filter(|col| !header.iter().any(|h| h == *col))
        .map(|col| col.to_string())
        .collect();
    let extra_columns: Vec<String> = header
        .iter()
        .filter(|h| !expected.contains(&h.as_str()))
        .cloned()
        .collect();

    let mut preview = Vec::new();
    let mut row_errors = Vec::new();
    let mut total_rows = 0;

    for (idx, record) in records.enumerate() {
        total_rows += 1;
        if idx >= PREVIEW_ROWS {
            continue;
        }
        let row_number = idx + 2;

        match record {
            Ok(record) => {
                let values: Vec<String> = (0..header.len())
                    .map(|i| record.get(i).unwrap_or("").to_string())
                    .collect();
                if missing_columns.is_empty() {
                    check_row(&header, &values, row_number, kind, &mut row_errors);
                }
                preview.push(values);
            }
            Err(e) => row_errors.push(RowError {
                row: row_number,
                column: String::new(),
                value: String::new(),
                problem: RowProblem::Unreadable(e.to_string()),
            }),
        }
    }

    let error = if !missing_columns.is_empty() {
        Some(format!(
            "Missing required columns: {}",
            missing_columns.join(", ")
        ))
    } else {
        row_errors.first().map(ToString::to_string)
    };

    ValidationReport {
        kind,
        valid: missing_columns.is_empty() && row_errors.is_empty(),
        error,
        header,
        missing_columns,
        extra_columns,
        row_errors,
        preview,
        total_rows,
    }
}

fn is_blank(record: &csv::StringRecord) -> bool {
    record.iter().all(|field| field.trim().is_empty())
}

/// Cell under `column`, if present and non-empty.
fn non_empty_cell<'a>(header: &[String], values: &'a [String], column: &str) -> Option<&'a str> {
    let idx = header.iter().position(|h| h == column)?;
    values.get(idx).map(String::as_str).filter(|v| !v.is_empty())
}

fn check_row(
    header: &[String],
    values: &[String],
    row: usize,
    kind: RecordKind,
    errors: &mut Vec<RowError>,
) {
    let cell = |column: &str| non_empty_cell(header, values, column);
    let mut push = |column: &str, value: &str, problem: RowProblem| {
        errors.push(RowError {
            row,
            column: column.to_string(),
            value: value.to_string(),
            problem,
        });
    };

    if let Some(value) = cell(DATE_COLUMN) {
        if !is_valid_date(value) {
            push(DATE_COLUMN, value, RowProblem::Date);
        }
    }

    for column in numeric_columns(kind).iter().copied() {
        if let Some(value) = cell(column) {
            if !is_numeric(value) {
                push(column, value, RowProblem::Numeric);
            }
        }
    }

    for column in BOOLEAN_COLUMNS {
        if let Some(value) = cell(column) {
            if !is_flag(value) {
                push(column, value, RowProblem::Boolean);
            }
        }
    }
}
