//! Patient table for a single day.

use chrono::NaiveDate;

use crate::{
    error::ClientError,
    models::{AppointmentRecord, RecordKind},
    traits::RecordSource,
};

/// Rows at or above this predicted spend are highlighted as high value.
pub const HIGH_SPEND: f64 = 150.0;
pub const MEDIUM_SPEND: f64 = 80.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpendTier {
    High,
    Medium,
    Low,
}

impl SpendTier {
    pub fn for_spend(predicted: f64) -> Self {
        if predicted >= HIGH_SPEND {
            SpendTier::High
        } else if predicted >= MEDIUM_SPEND {
            SpendTier::Medium
        } else {
            SpendTier::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SpendTier::High => "high",
            SpendTier::Medium => "medium",
            SpendTier::Low => "low",
        }
    }
}

/// A record tagged with the set it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct PatientRow {
    pub source: RecordKind,
    pub record: AppointmentRecord,
}

impl PatientRow {
    pub fn tier(&self) -> SpendTier {
        SpendTier::for_spend(self.record.predicted())
    }
}

/// `0.4567` -> `45.7%`
pub fn format_probability(probability: f64) -> String {
    format!("{:.1}%", probability * 100.0)
}

/// Upcoming rows followed by past rows for `date`.
///
/// A set that is absent or fails to load contributes no rows. A rejected
/// token is returned so the caller can end the session.
pub async fn load_day<S: RecordSource>(
    source: &S,
    date: NaiveDate,
) -> Result<Vec<PatientRow>, ClientError> {
    let (upcoming, past) = tokio::join!(
        source.fetch_records(RecordKind::Upcoming, date),
        source.fetch_records(RecordKind::Past, date)
    );

    let mut rows = Vec::new();
    for (kind, result) in [(RecordKind::Upcoming, upcoming), (RecordKind::Past, past)] {
        match result {
            Ok(records) => rows.extend(records.into_iter().map(|record| PatientRow {
                source: kind,
                record,
            })),
            Err(ClientError::Unauthorized) => return Err(ClientError::Unauthorized),
            Err(e) => tracing::debug!(%date, %kind, error = %e, "No records loaded"),
        }
    }
    Ok(rows)
}

/// 1-based pager over a list of `total` items.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Paginator {
    page: usize,
    per_page: usize,
    total: usize,
    window: usize,
}

impl Paginator {
    pub fn new(total: usize, per_page: usize, window: usize) -> Self {
        Self {
            page: 1,
            per_page: per_page.max(1),
            total,
            window: window.max(1),
        }
    }

    pub fn page(&self) -> usize {
        self.page
    }

    pub fn total(&self) -> usize {
        self.total
    }

    /// Never less than one, so an empty table still has a page.
    pub fn total_pages(&self) -> usize {
        self.total.div_ceil(self.per_page).max(1)
    }

    pub fn has_previous(&self) -> bool {
        self.page > 1
    }

    pub fn has_next(&self) -> bool {
        self.page < self.total_pages()
    }

    pub fn next(&mut self) {
        self.go_to(self.page + 1);
    }

    pub fn previous(&mut self) {
        self.go_to(self.page.saturating_sub(1));
    }

    pub fn go_to(&mut self, page: usize) {
        self.page = page.clamp(1, self.total_pages());
    }

    /// Index range of the current page.
    pub fn range(&self) -> std::ops::Range<usize> {
        let start = ((self.page - 1) * self.per_page).min(self.total);
        let end = (start + self.per_page).min(self.total);
        start..end
    }

    pub fn slice<'a, T>(&self, items: &'a [T]) -> &'a [T] {
        let range = self.range();
        let end = range.end.min(items.len());
        &items[range.start.min(end)..end]
    }

    /// Up to `window` page numbers, centred on the current page where the
    /// edges allow.
    pub fn page_numbers(&self) -> Vec<usize> {
        let total_pages = self.total_pages();
        let half = self.window / 2;
        let mut start = self.page.saturating_sub(half).max(1);
        let end = (start + self.window - 1).min(total_pages);
        if end + 1 - start < self.window {
            start = (end + 1).saturating_sub(self.window).max(1);
        }
        (start..=end).collect()
    }

    /// `Showing 21-40 of 45`
    pub fn summary(&self) -> String {
        let range = self.range();
        if range.is_empty() {
            return format!("Showing 0 of {}", self.total);
        }
        format!("Showing {}-{} of {}", range.start + 1, range.end, self.total)
    }
}
