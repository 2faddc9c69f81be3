use std::{collections::BTreeMap, fmt, str::FromStr, sync::Arc};

use chrono::{Datelike, Duration as ChronoDuration, Months, NaiveDate};
use serde::Deserialize;
use tokio::task::JoinSet;

use crate::{
    error::ClientError,
    models::{AppointmentRecord, RecordKind},
    traits::RecordSource,
};

// ==================== Window Types ====================

/// Aggregation window of the forecast chart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    /// A single calendar day
    Daily,
    /// Monday through Sunday
    #[default]
    Weekly,
    /// First through last day of a calendar month
    Monthly,
}

impl Granularity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Granularity::Daily => "daily",
            Granularity::Weekly => "weekly",
            Granularity::Monthly => "monthly",
        }
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Granularity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "daily" | "day" | "d" => Ok(Granularity::Daily),
            "weekly" | "week" | "w" => Ok(Granularity::Weekly),
            "monthly" | "month" | "m" => Ok(Granularity::Monthly),
            other => Err(format!("unknown view '{}'", other)),
        }
    }
}

/// Summed spend for one calendar day.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DayBucket {
    pub date: NaiveDate,
    pub total_predicted: f64,
    pub total_actual: f64,
    pub record_count: usize,
}

impl DayBucket {
    /// A day with no records, or one whose fetch failed.
    pub fn empty(date: NaiveDate) -> Self {
        Self {
            date,
            total_predicted: 0.0,
            total_actual: 0.0,
            record_count: 0,
        }
    }

    /// Predicted spend comes from both sets; actual spend only exists on
    /// past records.
    pub fn from_records(
        date: NaiveDate,
        upcoming: &[AppointmentRecord],
        past: &[AppointmentRecord],
    ) -> Self {
        let total_predicted = upcoming
            .iter()
            .chain(past.iter())
            .map(AppointmentRecord::predicted)
            .sum();
        let total_actual = past.iter().map(AppointmentRecord::actual).sum();

        Self {
            date,
            total_predicted,
            total_actual,
            record_count: upcoming.len() + past.len(),
        }
    }
}

/// Daily buckets rolled up to one calendar month.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MonthBucket {
    pub year: i32,
    pub month: u32,
    pub total_predicted: f64,
    pub total_actual: f64,
    pub record_count: usize,
    /// Number of daily buckets that went into this month.
    pub days: usize,
}

impl MonthBucket {
    pub fn label(&self) -> String {
        NaiveDate::from_ymd_opt(self.year, self.month, 1)
            .map(|d| d.format("%B %Y").to_string())
            .unwrap_or_else(|| format!("{}-{:02}", self.year, self.month))
    }
}

/// Sums over a whole window.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct WindowTotals {
    pub predicted: f64,
    pub actual: f64,
    /// Actual minus predicted.
    pub variance: f64,
    pub record_count: usize,
}

/// Chart-ready output: one label per bucket, a predicted series and an
/// actual series that is only present when some day has realized spend.
#[derive(Debug, Clone, PartialEq)]
pub struct ForecastSeries {
    pub granularity: Granularity,
    pub title: String,
    pub labels: Vec<String>,
    pub predicted: Vec<f64>,
    pub actual: Option<Vec<f64>>,
    pub totals: WindowTotals,
    /// Month roll-up; filled for the monthly view only.
    pub months: Vec<MonthBucket>,
}

impl ForecastSeries {
    pub fn has_actual(&self) -> bool {
        self.actual.is_some()
    }

    /// `(label, predicted, actual)` per bucket.
    pub fn points(&self) -> impl Iterator<Item = (&str, f64, Option<f64>)> + '_ {
        self.labels.iter().enumerate().map(|(i, label)| {
            let actual = self.actual.as_ref().and_then(|a| a.get(i).copied());
            (label.as_str(), self.predicted[i], actual)
        })
    }
}

// ==================== Window Arithmetic ====================

/// Monday of the week containing `date`.
pub fn week_start(date: NaiveDate) -> NaiveDate {
    date - ChronoDuration::days(i64::from(date.weekday().num_days_from_monday()))
}

pub fn month_start(date: NaiveDate) -> NaiveDate {
    date - ChronoDuration::days(i64::from(date.day0()))
}

pub fn month_end(date: NaiveDate) -> NaiveDate {
    let start = month_start(date);
    start + ChronoDuration::days(i64::from(days_in_month(start.year(), start.month())) - 1)
}

pub fn days_in_month(year: i32, month: u32) -> u32 {
    match month {
        1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
        4 | 6 | 9 | 11 => 30,
        _ => {
            if NaiveDate::from_ymd_opt(year, 2, 29).is_some() {
                29
            } else {
                28
            }
        }
    }
}

/// Ordered calendar dates covered by the window around `anchor`.
pub fn window_dates(granularity: Granularity, anchor: NaiveDate) -> Vec<NaiveDate> {
    let (start, len) = match granularity {
        Granularity::Daily => (anchor, 1),
        Granularity::Weekly => (week_start(anchor), 7),
        Granularity::Monthly => {
            let start = month_start(anchor);
            (start, days_in_month(start.year(), start.month()))
        }
    };

    (0..len)
        .map(|i| start + ChronoDuration::days(i64::from(i)))
        .collect()
}

/// Move the anchor by `steps` units of the granularity.
///
/// Monthly steps keep the day of month, clamped to the target month's
/// length (`2024-01-31` + 1 month is `2024-02-29`).
pub fn shift_anchor(granularity: Granularity, anchor: NaiveDate, steps: i32) -> NaiveDate {
    match granularity {
        Granularity::Daily => anchor + ChronoDuration::days(i64::from(steps)),
        Granularity::Weekly => anchor + ChronoDuration::days(7 * i64::from(steps)),
        Granularity::Monthly => {
            let months = Months::new(steps.unsigned_abs());
            let shifted = if steps >= 0 {
                anchor.checked_add_months(months)
            } else {
                anchor.checked_sub_months(months)
            };
            shifted.unwrap_or(anchor)
        }
    }
}

pub fn chart_title(granularity: Granularity, anchor: NaiveDate) -> String {
    match granularity {
        Granularity::Daily => format!("Daily View - {}", anchor.format("%A, %B %d, %Y")),
        Granularity::Weekly => format!(
            "Weekly View - Week of {}",
            week_start(anchor).format("%b %d, %Y")
        ),
        Granularity::Monthly => format!("Monthly View - {}", anchor.format("%B %Y")),
    }
}

pub fn bucket_label(granularity: Granularity, date: NaiveDate) -> String {
    match granularity {
        Granularity::Daily | Granularity::Weekly => date.format("%a %b %d").to_string(),
        Granularity::Monthly => date.format("%d").to_string(),
    }
}

// ==================== Aggregation ====================

/// Group daily buckets by calendar month, in date order.
pub fn roll_up_monthly(buckets: &[DayBucket]) -> Vec<MonthBucket> {
    let mut months: BTreeMap<(i32, u32), MonthBucket> = BTreeMap::new();

    for bucket in buckets {
        let key = (bucket.date.year(), bucket.date.month());
        let entry = months.entry(key).or_insert(MonthBucket {
            year: key.0,
            month: key.1,
            total_predicted: 0.0,
            total_actual: 0.0,
            record_count: 0,
            days: 0,
        });
        entry.total_predicted += bucket.total_predicted;
        entry.total_actual += bucket.total_actual;
        entry.record_count += bucket.record_count;
        entry.days += 1;
    }

    months.into_values().collect()
}

pub fn window_totals(buckets: &[DayBucket]) -> WindowTotals {
    let predicted: f64 = buckets.iter().map(|b| b.total_predicted).sum();
    let actual: f64 = buckets.iter().map(|b| b.total_actual).sum();
    WindowTotals {
        predicted,
        actual,
        variance: actual - predicted,
        record_count: buckets.iter().map(|b| b.record_count).sum(),
    }
}

/// Turn the buckets of a window into chart series.
pub fn build_series(
    granularity: Granularity,
    anchor: NaiveDate,
    buckets: &[DayBucket],
) -> ForecastSeries {
    let labels = buckets
        .iter()
        .map(|b| bucket_label(granularity, b.date))
        .collect();
    let predicted = buckets.iter().map(|b| b.total_predicted).collect();
    let actual = buckets
        .iter()
        .any(|b| b.total_actual != 0.0)
        .then(|| buckets.iter().map(|b| b.total_actual).collect());
    let months = match granularity {
        Granularity::Monthly => roll_up_monthly(buckets),
        _ => Vec::new(),
    };

    ForecastSeries {
        granularity,
        title: chart_title(granularity, anchor),
        labels,
        predicted,
        actual,
        totals: window_totals(buckets),
        months,
    }
}

/// Every bucket of one window, plus the dates whose fetch failed.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowAggregate {
    pub granularity: Granularity,
    pub anchor: NaiveDate,
    pub buckets: Vec<DayBucket>,
    /// Dates degraded to a zero bucket because a fetch failed.
    pub failed_dates: Vec<NaiveDate>,
}

impl WindowAggregate {
    pub fn has_actual(&self) -> bool {
        self.buckets.iter().any(|b| b.total_actual != 0.0)
    }

    pub fn bucket(&self, date: NaiveDate) -> Option<&DayBucket> {
        self.buckets.iter().find(|b| b.date == date)
    }

    pub fn months(&self) -> Vec<MonthBucket> {
        roll_up_monthly(&self.buckets)
    }

    pub fn totals(&self) -> WindowTotals {
        window_totals(&self.buckets)
    }

    pub fn series(&self) -> ForecastSeries {
        build_series(self.granularity, self.anchor, &self.buckets)
    }
}

/// Outcome of fetching one date.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DayFetch {
    pub bucket: DayBucket,
    /// At least one record set failed to load and counted as empty.
    pub degraded: bool,
}

/// Records of one set, or an empty list when the set is absent or failed.
///
/// Only a rejected token is returned as an error. The flag is set when a
/// failure (anything but "not found") was mapped to an empty list.
fn settle_set(
    date: NaiveDate,
    kind: RecordKind,
    result: Result<Vec<AppointmentRecord>, ClientError>,
) -> Result<(Vec<AppointmentRecord>, bool), ClientError> {
    match result {
        Ok(records) => Ok((records, false)),
        Err(ClientError::Unauthorized) => Err(ClientError::Unauthorized),
        Err(e) if e.is_not_found() => Ok((Vec::new(), false)),
        Err(e) => {
            tracing::warn!(%date, %kind, error = %e, "Fetch failed, counting set as empty");
            Ok((Vec::new(), true))
        }
    }
}

/// Fetch both record sets for one date and sum them.
///
/// The sets are settled independently: a failure in one keeps the other.
pub async fn fetch_day<S: RecordSource>(
    source: &S,
    date: NaiveDate,
) -> Result<DayFetch, ClientError> {
    let (upcoming, past) = tokio::join!(
        source.fetch_records(RecordKind::Upcoming, date),
        source.fetch_records(RecordKind::Past, date)
    );
    let (upcoming, upcoming_failed) = settle_set(date, RecordKind::Upcoming, upcoming)?;
    let (past, past_failed) = settle_set(date, RecordKind::Past, past)?;

    tracing::debug!(
        %date,
        upcoming = upcoming.len(),
        past = past.len(),
        "Fetched records"
    );

    Ok(DayFetch {
        bucket: DayBucket::from_records(date, &upcoming, &past),
        degraded: upcoming_failed || past_failed,
    })
}

/// Aggregate the window around `anchor`, one task per date.
///
/// Nothing is returned until every task has finished. A record set that
/// fails (anything but "not found") counts as empty and its date is listed
/// in [`WindowAggregate::failed_dates`]; the other set and the rest of the
/// window are unaffected. A rejected token on any fetch aborts the window
/// with [`ClientError::Unauthorized`].
pub async fn aggregate_window<S>(
    source: Arc<S>,
    granularity: Granularity,
    anchor: NaiveDate,
) -> Result<WindowAggregate, ClientError>
where
    S: RecordSource + 'static,
{
    let dates = window_dates(granularity, anchor);
    let mut by_date: BTreeMap<NaiveDate, DayBucket> =
        dates.iter().map(|d| (*d, DayBucket::empty(*d))).collect();

    let mut tasks = JoinSet::new();
    for date in dates {
        let source = Arc::clone(&source);
        tasks.spawn(async move { (date, fetch_day(source.as_ref(), date).await) });
    }

    let mut failed_dates = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((date, Ok(fetch))) => {
                if fetch.degraded {
                    failed_dates.push(date);
                }
                by_date.insert(date, fetch.bucket);
            }
            Ok((date, Err(e))) => {
                tracing::warn!(%date, error = %e, "Token rejected, abandoning window");
                tasks.abort_all();
                return Err(e);
            }
            Err(e) => {
                tracing::warn!(error = %e, "Fetch task did not complete");
            }
        }
    }
    failed_dates.sort();

    Ok(WindowAggregate {
        granularity,
        anchor,
        buckets: by_date.into_values().collect(),
        failed_dates,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn record(predicted: Option<f64>, actual: Option<f64>) -> AppointmentRecord {
        AppointmentRecord {
            id: 1,
            age: 50,
            days_since_last_purchase: 400,
            employed: true,
            benefits: false,
            driver: false,
            vdu: true,
            varifocal: false,
            high_rx: false,
            appointment_date: "2024-03-05".to_string(),
            predicted_spend: predicted,
            purchase_probability: Some(0.6),
            actual_spend: actual,
        }
    }

    fn bucket(d: NaiveDate, predicted: f64, actual: f64) -> DayBucket {
        DayBucket {
            date: d,
            total_predicted: predicted,
            total_actual: actual,
            record_count: 1,
        }
    }

    // ==================== Window Tests ====================

    #[test]
    fn test_daily_window_is_anchor() {
        assert_eq!(
            window_dates(Granularity::Daily, date(2024, 3, 5)),
            vec![date(2024, 3, 5)]
        );
    }

    #[test]
    fn test_weekly_window_starts_monday() {
        // 2024-03-07 is a Thursday
        let dates = window_dates(Granularity::Weekly, date(2024, 3, 7));
        assert_eq!(dates.len(), 7);
        assert_eq!(dates[0], date(2024, 3, 4));
        assert_eq!(dates[6], date(2024, 3, 10));
    }

    #[test]
    fn test_weekly_window_sunday_belongs_to_previous_monday() {
        let dates = window_dates(Granularity::Weekly, date(2024, 3, 10));
        assert_eq!(dates[0], date(2024, 3, 4));
    }

    #[test]
    fn test_weekly_window_spans_year_boundary() {
        let dates = window_dates(Granularity::Weekly, date(2025, 1, 1));
        assert_eq!(dates[0], date(2024, 12, 30));
        assert_eq!(dates[6], date(2025, 1, 5));
    }

    #[test]
    fn test_monthly_window_lengths() {
        assert_eq!(window_dates(Granularity::Monthly, date(2024, 2, 10)).len(), 29);
        assert_eq!(window_dates(Granularity::Monthly, date(2023, 2, 10)).len(), 28);
        assert_eq!(window_dates(Granularity::Monthly, date(2024, 4, 30)).len(), 30);
        let march = window_dates(Granularity::Monthly, date(2024, 3, 15));
        assert_eq!(march.first(), Some(&date(2024, 3, 1)));
        assert_eq!(march.last(), Some(&date(2024, 3, 31)));
    }

    #[test]
    fn test_month_start_end() {
        assert_eq!(month_start(date(2024, 4, 15)), date(2024, 4, 1));
        assert_eq!(month_end(date(2024, 4, 15)), date(2024, 4, 30));
        assert_eq!(month_end(date(2024, 12, 3)), date(2024, 12, 31));
        assert_eq!(month_end(date(2100, 2, 1)), date(2100, 2, 28));
    }

    // ==================== Shift Tests ====================

    #[test]
    fn test_shift_daily_and_weekly() {
        assert_eq!(
            shift_anchor(Granularity::Daily, date(2024, 3, 1), -1),
            date(2024, 2, 29)
        );
        assert_eq!(
            shift_anchor(Granularity::Weekly, date(2024, 3, 28), 1),
            date(2024, 4, 4)
        );
    }

    #[test]
    fn test_shift_monthly_preserves_day() {
        let next = shift_anchor(Granularity::Monthly, date(2024, 3, 15), 1);
        assert_eq!(next, date(2024, 4, 15));
        let window = window_dates(Granularity::Monthly, next);
        assert_eq!(window.first(), Some(&date(2024, 4, 1)));
        assert_eq!(window.last(), Some(&date(2024, 4, 30)));
    }

    #[test]
    fn test_shift_monthly_clamps_short_month() {
        assert_eq!(
            shift_anchor(Granularity::Monthly, date(2024, 1, 31), 1),
            date(2024, 2, 29)
        );
        assert_eq!(
            shift_anchor(Granularity::Monthly, date(2024, 3, 31), -1),
            date(2024, 2, 29)
        );
        assert_eq!(
            shift_anchor(Granularity::Monthly, date(2024, 12, 10), 1),
            date(2025, 1, 10)
        );
    }

    // ==================== Bucket Tests ====================

    #[test]
    fn test_bucket_sums_predicted_from_both_sets() {
        let upcoming = vec![record(Some(100.0), None), record(Some(50.0), None)];
        let past = vec![record(Some(30.0), Some(45.0)), record(None, Some(10.0))];

        let b = DayBucket::from_records(date(2024, 3, 5), &upcoming, &past);

        assert_eq!(b.total_predicted, 180.0);
        assert_eq!(b.total_actual, 55.0);
        assert_eq!(b.record_count, 4);
    }

    #[test]
    fn test_bucket_ignores_actual_on_upcoming() {
        let upcoming = vec![record(Some(10.0), Some(99.0))];
        let b = DayBucket::from_records(date(2024, 3, 5), &upcoming, &[]);
        assert_eq!(b.total_actual, 0.0);
    }

    #[test]
    fn test_roll_up_monthly() {
        let buckets = vec![
            bucket(date(2024, 3, 30), 10.0, 5.0),
            bucket(date(2024, 3, 31), 20.0, 0.0),
            bucket(date(2024, 4, 1), 7.0, 3.0),
        ];
        let months = roll_up_monthly(&buckets);

        assert_eq!(months.len(), 2);
        assert_eq!((months[0].year, months[0].month), (2024, 3));
        assert_eq!(months[0].total_predicted, 30.0);
        assert_eq!(months[0].total_actual, 5.0);
        assert_eq!(months[0].days, 2);
        assert_eq!(months[1].record_count, 1);
        assert_eq!(months[0].label(), "March 2024");
    }

    // ==================== Series Tests ====================

    #[test]
    fn test_series_omits_actual_without_history() {
        let buckets: Vec<DayBucket> = window_dates(Granularity::Weekly, date(2024, 3, 4))
            .into_iter()
            .map(|d| bucket(d, 25.0, 0.0))
            .collect();

        let series = build_series(Granularity::Weekly, date(2024, 3, 4), &buckets);

        assert!(series.actual.is_none());
        assert_eq!(series.predicted.len(), 7);
        assert_eq!(series.labels[0], "Mon Mar 04");
        assert_eq!(series.totals.predicted, 175.0);
        assert_eq!(series.totals.variance, -175.0);
        assert!(series.months.is_empty());
    }

    #[test]
    fn test_series_includes_actual_when_any_nonzero() {
        let buckets = vec![
            bucket(date(2024, 3, 4), 25.0, 0.0),
            bucket(date(2024, 3, 5), 25.0, 40.0),
        ];
        let series = build_series(Granularity::Weekly, date(2024, 3, 4), &buckets);

        assert_eq!(series.actual, Some(vec![0.0, 40.0]));
        let points: Vec<_> = series.points().collect();
        assert_eq!(points[1], ("Tue Mar 05", 25.0, Some(40.0)));
    }

    #[test]
    fn test_monthly_series_labels_and_rollup() {
        let buckets: Vec<DayBucket> = window_dates(Granularity::Monthly, date(2024, 2, 10))
            .into_iter()
            .map(|d| bucket(d, 1.0, 0.0))
            .collect();
        let series = build_series(Granularity::Monthly, date(2024, 2, 10), &buckets);

        assert_eq!(series.labels.first().map(String::as_str), Some("01"));
        assert_eq!(series.labels.last().map(String::as_str), Some("29"));
        assert_eq!(series.months.len(), 1);
        assert_eq!(series.months[0].total_predicted, 29.0);
    }

    #[test]
    fn test_titles() {
        assert_eq!(
            chart_title(Granularity::Daily, date(2024, 3, 5)),
            "Daily View - Tuesday, March 05, 2024"
        );
        assert_eq!(
            chart_title(Granularity::Weekly, date(2024, 3, 7)),
            "Weekly View - Week of Mar 04, 2024"
        );
        assert_eq!(
            chart_title(Granularity::Monthly, date(2024, 3, 7)),
            "Monthly View - March 2024"
        );
    }

    #[test]
    fn test_granularity_from_str() {
        assert_eq!("Weekly".parse::<Granularity>(), Ok(Granularity::Weekly));
        assert_eq!("m".parse::<Granularity>(), Ok(Granularity::Monthly));
        assert!("yearly".parse::<Granularity>().is_err());
    }

    // ==================== Fan-out Tests ====================

    mod fanout_tests {
        use super::*;
        use crate::traits::MockRecordSource;

        #[tokio::test]
        async fn test_week_without_history_has_no_actual_series() {
            let monday = date(2024, 3, 4);
            let mut source = MockRecordSource::new();
            for d in window_dates(Granularity::Weekly, monday) {
                source = source.with_records(
                    RecordKind::Upcoming,
                    d,
                    vec![record(Some(100.0), None)],
                );
            }

            let aggregate = aggregate_window(Arc::new(source), Granularity::Weekly, monday)
                .await
                .unwrap();
            let series = aggregate.series();

            assert!(aggregate.failed_dates.is_empty());
            assert!(series.actual.is_none());
            assert_eq!(series.predicted, vec![100.0; 7]);
        }

        #[tokio::test]
        async fn test_failed_day_becomes_zero_bucket() {
            let anchor = date(2024, 3, 1);
            let bad_day = date(2024, 3, 15);
            let mut source = MockRecordSource::new();
            for d in window_dates(Granularity::Monthly, anchor) {
                source = source
                    .with_records(RecordKind::Upcoming, d, vec![record(Some(10.0), None)])
                    .with_records(RecordKind::Past, d, vec![record(Some(5.0), Some(8.0))]);
            }
            let source = source.failing_date(bad_day);

            let aggregate = aggregate_window(Arc::new(source), Granularity::Monthly, anchor)
                .await
                .unwrap();

            assert_eq!(aggregate.buckets.len(), 31);
            assert_eq!(aggregate.failed_dates, vec![bad_day]);
            assert_eq!(aggregate.bucket(bad_day), Some(&DayBucket::empty(bad_day)));

            let other = aggregate.bucket(date(2024, 3, 14)).unwrap();
            assert_eq!(other.total_predicted, 15.0);
            assert_eq!(other.total_actual, 8.0);
            assert_eq!(aggregate.totals().actual, 8.0 * 30.0);
        }

        #[tokio::test]
        async fn test_failed_past_set_keeps_upcoming() {
            let day = date(2024, 3, 5);
            let source = MockRecordSource::new()
                .with_records(RecordKind::Upcoming, day, vec![record(Some(10.0), None)])
                .failing(RecordKind::Past, day);

            let aggregate = aggregate_window(Arc::new(source), Granularity::Daily, day)
                .await
                .unwrap();

            assert_eq!(aggregate.failed_dates, vec![day]);
            let only = aggregate.bucket(day).unwrap();
            assert_eq!(only.total_predicted, 10.0);
            assert_eq!(only.total_actual, 0.0);
            assert_eq!(only.record_count, 1);
        }

        #[tokio::test]
        async fn test_failed_upcoming_set_keeps_actual_spend() {
            let day = date(2024, 3, 5);
            let source = MockRecordSource::new()
                .failing(RecordKind::Upcoming, day)
                .with_records(RecordKind::Past, day, vec![record(Some(40.0), Some(120.0))]);

            let aggregate = aggregate_window(Arc::new(source), Granularity::Daily, day)
                .await
                .unwrap();
            let series = aggregate.series();

            assert_eq!(aggregate.failed_dates, vec![day]);
            assert_eq!(series.predicted, vec![40.0]);
            assert_eq!(series.actual, Some(vec![120.0]));
        }

        #[tokio::test]
        async fn test_missing_listings_are_empty_not_failures() {
            let source = Arc::new(MockRecordSource::new());
            let aggregate =
                aggregate_window(Arc::clone(&source), Granularity::Weekly, date(2024, 3, 4))
                    .await
                    .unwrap();

            assert!(aggregate.failed_dates.is_empty());
            assert!(aggregate.buckets.iter().all(|b| b.record_count == 0));
            assert_eq!(source.call_count(), 14);
        }

        #[tokio::test]
        async fn test_rejected_token_fails_whole_window() {
            let monday = date(2024, 3, 4);
            let mut source = MockRecordSource::new();
            for d in window_dates(Granularity::Weekly, monday) {
                source = source.with_records(
                    RecordKind::Upcoming,
                    d,
                    vec![record(Some(100.0), None)],
                );
            }
            let source = source.rejecting(RecordKind::Past, date(2024, 3, 7));

            let result = aggregate_window(Arc::new(source), Granularity::Weekly, monday).await;

            assert!(result.unwrap_err().is_unauthorized());
        }

        #[tokio::test]
        async fn test_fetch_day_flags_degraded_set() {
            let day = date(2024, 3, 5);
            let healthy = MockRecordSource::new()
                .with_records(RecordKind::Upcoming, day, vec![record(Some(10.0), None)]);
            let fetch = fetch_day(&healthy, day).await.unwrap();
            assert!(!fetch.degraded);
            assert_eq!(fetch.bucket.total_predicted, 10.0);

            let degraded = healthy.failing(RecordKind::Past, day);
            let fetch = fetch_day(&degraded, day).await.unwrap();
            assert!(fetch.degraded);
            assert_eq!(fetch.bucket.total_predicted, 10.0);
        }
    }

    // ==================== Property-Based Tests ====================

    mod proptest_tests {
        use proptest::prelude::*;

        use super::*;

        proptest! {
            #[test]
            fn window_always_contains_anchor(
                ordinal in 1u32..=365,
                year in 1990i32..2100,
                g in 0usize..3
            ) {
                let anchor = NaiveDate::from_yo_opt(year, ordinal).unwrap();
                let granularity = [Granularity::Daily, Granularity::Weekly, Granularity::Monthly][g];
                let dates = window_dates(granularity, anchor);
                prop_assert!(dates.contains(&anchor));
                prop_assert!(dates.windows(2).all(|w| w[1] - w[0] == ChronoDuration::days(1)));
            }

            #[test]
            fn monthly_next_lands_in_following_month(
                ordinal in 1u32..=365,
                year in 1990i32..2100
            ) {
                let anchor = NaiveDate::from_yo_opt(year, ordinal).unwrap();
                let next = shift_anchor(Granularity::Monthly, anchor, 1);
                let expected_month = anchor.month() % 12 + 1;
                prop_assert_eq!(next.month(), expected_month);
                prop_assert!(next.day() <= anchor.day());
            }

            #[test]
            fn totals_match_bucket_sums(
                values in prop::collection::vec((0.0f64..500.0, 0.0f64..500.0), 1..31)
            ) {
                let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
                let buckets: Vec<DayBucket> = values
                    .iter()
                    .enumerate()
                    .map(|(i, (p, a))| bucket(start + ChronoDuration::days(i as i64), *p, *a))
                    .collect();
                let totals = window_totals(&buckets);
                let predicted: f64 = values.iter().map(|(p, _)| p).sum();
                prop_assert!((totals.predicted - predicted).abs() < 1e-6);
                prop_assert!((totals.variance - (totals.actual - totals.predicted)).abs() < 1e-9);
            }
        }
    }
}
