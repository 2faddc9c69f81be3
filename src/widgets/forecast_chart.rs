use std::fmt::Write;

use chrono::NaiveDate;

use crate::{
    forecast::ForecastSeries,
    style,
    widgets::{format_money, format_signed_money, rule},
};

/// Horizontal bar chart of predicted (and, when present, actual) spend.
pub struct ForecastChart<'a> {
    pub series: &'a ForecastSeries,
    /// Bar length of the largest value.
    pub width: usize,
    pub failed_dates: &'a [NaiveDate],
}

impl<'a> ForecastChart<'a> {
    pub fn new(series: &'a ForecastSeries, width: usize) -> Self {
        Self {
            series,
            width: width.max(1),
            failed_dates: &[],
        }
    }

    pub fn with_failed_dates(mut self, failed_dates: &'a [NaiveDate]) -> Self {
        self.failed_dates = failed_dates;
        self
    }

    fn scale(&self) -> f64 {
        let actual_max = self
            .series
            .actual
            .iter()
            .flatten()
            .copied()
            .fold(0.0_f64, f64::max);
        self.series
            .predicted
            .iter()
            .copied()
            .fold(actual_max, f64::max)
    }

    fn bar(&self, value: f64, max: f64, glyph: char) -> String {
        if max <= 0.0 || value <= 0.0 {
            return String::new();
        }
        let len = ((value / max) * self.width as f64).round() as usize;
        glyph.to_string().repeat(len.clamp(1, self.width))
    }

    pub fn render(&self) -> String {
        let series = self.series;
        let max = self.scale();
        let label_width = series.labels.iter().map(String::len).max().unwrap_or(0);
        let mut out = String::new();

        let _ = writeln!(out, "{}", series.title);
        let _ = writeln!(out, "{}", rule());

        for (label, predicted, actual) in series.points() {
            let _ = writeln!(
                out,
                "{:>lw$} │ {:<w$} {}",
                label,
                self.bar(predicted, max, style::BAR_PREDICTED),
                format_money(predicted),
                lw = label_width,
                w = self.width
            );
            if let Some(actual) = actual {
                let _ = writeln!(
                    out,
                    "{:>lw$} │ {:<w$} {}",
                    "",
                    self.bar(actual, max, style::BAR_ACTUAL),
                    format_money(actual),
                    lw = label_width,
                    w = self.width
                );
            }
        }

        let _ = writeln!(out, "{}", rule());
        let _ = write!(
            out,
            "{} Predicted",
            style::BAR_PREDICTED
        );
        if series.has_actual() {
            let _ = write!(out, "   {} Actual", style::BAR_ACTUAL);
        }
        let _ = writeln!(out);

        for month in &series.months {
            let _ = writeln!(
                out,
                "{}: predicted {}, actual {} over {} days",
                month.label(),
                format_money(month.total_predicted),
                format_money(month.total_actual),
                month.days
            );
        }

        let totals = &series.totals;
        let _ = write!(
            out,
            "Total predicted: {}  Records: {}",
            format_money(totals.predicted),
            totals.record_count
        );
        if series.has_actual() {
            let _ = write!(
                out,
                "  Actual: {}  Variance: {}",
                format_money(totals.actual),
                format_signed_money(totals.variance)
            );
        }
        let _ = writeln!(out);

        if !self.failed_dates.is_empty() {
            let dates: Vec<String> = self
                .failed_dates
                .iter()
                .map(|d| d.format("%Y-%m-%d").to_string())
                .collect();
            let _ = writeln!(
                out,
                "{} Could not load: {}",
                style::MARK_WARN,
                dates.join(", ")
            );
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forecast::{DayBucket, Granularity, build_series};

    fn day(d: u32, predicted: f64, actual: f64) -> DayBucket {
        DayBucket {
            date: NaiveDate::from_ymd_opt(2024, 3, d).unwrap(),
            total_predicted: predicted,
            total_actual: actual,
            record_count: 2,
        }
    }

    fn anchor() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 4).unwrap()
    }

    #[test]
    fn test_render_predicted_only() {
        let buckets = vec![day(4, 100.0, 0.0), day(5, 50.0, 0.0)];
        let series = build_series(Granularity::Weekly, anchor(), &buckets);
        let text = ForecastChart::new(&series, 10).render();

        assert!(text.starts_with("Weekly View - Week of Mar 04, 2024"));
        assert!(text.contains(&format!("Mon Mar 04 │ {} £100.00", "█".repeat(10))));
        assert!(text.contains(&format!("Tue Mar 05 │ {:<10} £50.00", "█".repeat(5))));
        assert!(!text.contains("Actual"));
        assert!(text.contains("Total predicted: £150.00  Records: 4"));
    }

    #[test]
    fn test_render_with_actual_and_variance() {
        let buckets = vec![day(4, 100.0, 120.0)];
        let series = build_series(Granularity::Daily, anchor(), &buckets);
        let text = ForecastChart::new(&series, 12).render();

        assert!(text.contains("▒ Actual"));
        assert!(text.contains("£120.00"));
        assert!(text.contains("Variance: +£20.00"));
    }

    #[test]
    fn test_render_all_zero_has_no_bars() {
        let buckets = vec![day(4, 0.0, 0.0)];
        let series = build_series(Granularity::Daily, anchor(), &buckets);
        let text = ForecastChart::new(&series, 8).render();
        assert!(!text.contains("██"));
        assert!(text.contains("£0.00"));
    }

    #[test]
    fn test_render_failed_dates() {
        let buckets = vec![day(4, 1.0, 0.0)];
        let failed = vec![NaiveDate::from_ymd_opt(2024, 3, 15).unwrap()];
        let series = build_series(Granularity::Monthly, anchor(), &buckets);
        let text = ForecastChart::new(&series, 8)
            .with_failed_dates(&failed)
            .render();

        assert!(text.contains("Could not load: 2024-03-15"));
        assert!(text.contains("March 2024: predicted £1.00"));
    }
}
