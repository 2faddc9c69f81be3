use std::fmt::Write;

use crate::{
    style,
    validator::ValidationReport,
    widgets::rule,
};

/// Row errors listed before the rest are summarised.
const MAX_LISTED_ERRORS: usize = 10;

pub struct ValidationPanel<'a> {
    pub file_name: &'a str,
    pub report: &'a ValidationReport,
}

impl<'a> ValidationPanel<'a> {
    pub fn render(&self) -> String {
        let report = self.report;
        let mut out = String::new();

        if report.valid {
            let _ = writeln!(
                out,
                "{} {} is a valid {} CSV",
                style::MARK_OK,
                self.file_name,
                report.kind
            );
            let _ = writeln!(out, "  • Found {} data rows", report.total_rows);
            let _ = writeln!(out, "  • All required columns present");
        } else {
            let _ = writeln!(
                out,
                "{} {} failed validation as {} CSV",
                style::MARK_ERROR,
                self.file_name,
                report.kind
            );
            if let Some(error) = &report.error {
                let _ = writeln!(out, "  {}", error);
            }
        }

        for warning in report.warnings() {
            let _ = writeln!(out, "  {} {}", style::MARK_WARN, warning);
        }

        if !report.missing_columns.is_empty() {
            let _ = writeln!(out, "Missing columns:");
            for column in &report.missing_columns {
                let _ = writeln!(out, "  - {}", column);
            }
            let _ = writeln!(
                out,
                "Expected columns: {}",
                report.expected_columns().join(", ")
            );
        }

        if report.row_errors.len() > 1 {
            let _ = writeln!(out, "Row errors:");
            for error in report.row_errors.iter().take(MAX_LISTED_ERRORS) {
                let _ = writeln!(out, "  - {}", error);
            }
            if report.row_errors.len() > MAX_LISTED_ERRORS {
                let _ = writeln!(
                    out,
                    "  ... and {} more",
                    report.row_errors.len() - MAX_LISTED_ERRORS
                );
            }
        }

        if !report.preview.is_empty() {
            let _ = writeln!(out, "{}", rule());
            let _ = writeln!(out, "Preview (first {} rows):", report.preview.len());
            let _ = writeln!(out, "{}", report.header.join(" | "));
            for row in &report.preview {
                let _ = writeln!(out, "{}", row.join(" | "));
            }
        }

        out
    }
}
