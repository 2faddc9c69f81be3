//! Abstractions for time, token persistence and record fetching.
//!
//! This module provides traits for:
//! - `Clock`: "today" for the forecast and patient views
//! - `TokenStore`: where the bearer token survives between runs
//! - `RecordSource`: per-date record listings feeding the aggregator
//!
//! Each trait ships with an in-memory implementation for tests.

use std::{
    collections::{HashMap, HashSet},
    future::Future,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
};

use chrono::{DateTime, Local, NaiveDate, Utc};
use reqwest::StatusCode;

use crate::{
    error::ClientError,
    models::{AppointmentRecord, RecordKind},
};

// ==================== Clock Trait ====================

/// Trait for abstracting time access.
pub trait Clock: Send + Sync {
    /// Get the current time in UTC.
    fn now_utc(&self) -> DateTime<Utc>;

    /// Get the current time in the local timezone.
    fn now_local(&self) -> DateTime<Local>;

    /// Local calendar day, the default anchor for date-driven views.
    fn today(&self) -> NaiveDate {
        self.now_local().date_naive()
    }
}

/// System clock implementation using real time.
#[derive(Debug, Clone, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_utc(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn now_local(&self) -> DateTime<Local> {
        Local::now()
    }
}

/// Mock clock for testing with controllable time.
#[derive(Debug, Clone)]
pub struct MockClock {
    utc_time: Arc<Mutex<DateTime<Utc>>>,
}

impl MockClock {
    /// Create a new mock clock set to the given UTC time.
    pub fn new(time: DateTime<Utc>) -> Self {
        Self {
            utc_time: Arc::new(Mutex::new(time)),
        }
    }

    /// Set the mock clock to a new time.
    pub fn set_time(&self, time: DateTime<Utc>) {
        *self.utc_time.lock().unwrap() = time;
    }

    /// Advance the clock by a duration.
    pub fn advance(&self, duration: chrono::Duration) {
        let mut time = self.utc_time.lock().unwrap();
        *time = *time + duration;
    }
}

impl Clock for MockClock {
    fn now_utc(&self) -> DateTime<Utc> {
        *self.utc_time.lock().unwrap()
    }

    fn now_local(&self) -> DateTime<Local> {
        self.now_utc().with_timezone(&Local)
    }

    /// Calendar day in UTC, so tests do not depend on the host timezone.
    fn today(&self) -> NaiveDate {
        self.now_utc().date_naive()
    }
}

// ==================== TokenStore Trait ====================

/// Client-local persistence for the bearer token.
///
/// Swappable per platform (plain file, OS keychain, ...). `load` returns
/// `Ok(None)` when nothing is stored.
pub trait TokenStore: Send + Sync {
    fn load(&self) -> std::io::Result<Option<String>>;

    fn save(&self, token: &str) -> std::io::Result<()>;

    /// Remove the token. Clearing an empty store is not an error.
    fn clear(&self) -> std::io::Result<()>;
}

/// Token store that lives only as long as the process.
#[derive(Debug, Clone, Default)]
pub struct MemoryTokenStore {
    token: Arc<Mutex<Option<String>>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with a token already present.
    pub fn with_token(token: &str) -> Self {
        Self {
            token: Arc::new(Mutex::new(Some(token.to_string()))),
        }
    }

    pub fn current(&self) -> Option<String> {
        self.token.lock().unwrap().clone()
    }
}

impl TokenStore for MemoryTokenStore {
    fn load(&self) -> std::io::Result<Option<String>> {
        Ok(self.current())
    }

    fn save(&self, token: &str) -> std::io::Result<()> {
        *self.token.lock().unwrap() = Some(token.to_string());
        Ok(())
    }

    fn clear(&self) -> std::io::Result<()> {
        *self.token.lock().unwrap() = None;
        Ok(())
    }
}

// ==================== RecordSource Trait ====================

/// Anything that can list appointment records for one exact date.
///
/// Implemented by [`crate::api::OptoComClient`]; the returned future must be
/// `Send` so the aggregator can fan dates out across tasks.
pub trait RecordSource: Send + Sync {
    fn fetch_records(
        &self,
        kind: RecordKind,
        date: NaiveDate,
    ) -> impl Future<Output = Result<Vec<AppointmentRecord>, ClientError>> + Send;
}

/// Canned record source for testing aggregation and the patient table.
///
/// Dates with no entry answer with a 404, like the real backend does for a
/// day without appointments.
#[derive(Debug, Clone, Default)]
pub struct MockRecordSource {
    records: HashMap<(RecordKind, NaiveDate), Vec<AppointmentRecord>>,
    failing: HashSet<(RecordKind, NaiveDate)>,
    rejected: HashSet<(RecordKind, NaiveDate)>,
    calls: Arc<AtomicUsize>,
}

impl MockRecordSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `records` for `kind` on `date`.
    pub fn with_records(
        mut self,
        kind: RecordKind,
        date: NaiveDate,
        records: Vec<AppointmentRecord>,
    ) -> Self {
        self.records.insert((kind, date), records);
        self
    }

    /// Answer with a 500 for `kind` on `date`.
    pub fn failing(mut self, kind: RecordKind, date: NaiveDate) -> Self {
        self.failing.insert((kind, date));
        self
    }

    /// Answer with a 500 for both record kinds on `date`.
    pub fn failing_date(self, date: NaiveDate) -> Self {
        self.failing(RecordKind::Upcoming, date)
            .failing(RecordKind::Past, date)
    }

    /// Answer with a 401 for `kind` on `date`, as for an expired token.
    pub fn rejecting(mut self, kind: RecordKind, date: NaiveDate) -> Self {
        self.rejected.insert((kind, date));
        self
    }

    /// Number of fetches served so far.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl RecordSource for MockRecordSource {
    async fn fetch_records(
        &self,
        kind: RecordKind,
        date: NaiveDate,
    ) -> Result<Vec<AppointmentRecord>, ClientError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if self.rejected.contains(&(kind, date)) {
            return Err(ClientError::Unauthorized);
        }
        if self.failing.contains(&(kind, date)) {
            return Err(ClientError::Backend {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                detail: Some("simulated failure".to_string()),
            });
        }

        self.records
            .get(&(kind, date))
            .cloned()
            .ok_or_else(|| ClientError::Backend {
                status: StatusCode::NOT_FOUND,
                detail: Some("No appointments found for this date".to_string()),
            })
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn record(id: i64, date: &str) -> AppointmentRecord {
        AppointmentRecord {
            id,
            age: 40,
            days_since_last_purchase: 365,
            employed: true,
            benefits: false,
            driver: true,
            vdu: false,
            varifocal: false,
            high_rx: false,
            appointment_date: date.to_string(),
            predicted_spend: Some(100.0),
            purchase_probability: Some(0.5),
            actual_spend: None,
        }
    }

    #[test]
    fn test_system_clock_returns_current_time() {
        let clock = SystemClock;
        let before = Utc::now();
        let clock_time = clock.now_utc();
        let after = Utc::now();

        assert!(clock_time >= before);
        assert!(clock_time <= after);
    }

    #[test]
    fn test_mock_clock_returns_set_time() {
        let fixed_time = Utc.with_ymd_and_hms(2024, 6, 15, 14, 30, 0).unwrap();
        let clock = MockClock::new(fixed_time);

        assert_eq!(clock.now_utc(), fixed_time);
        assert_eq!(clock.today(), NaiveDate::from_ymd_opt(2024, 6, 15).unwrap());
    }

    #[test]
    fn test_mock_clock_advance_crosses_midnight() {
        let start = Utc.with_ymd_and_hms(2024, 6, 15, 23, 0, 0).unwrap();
        let clock = MockClock::new(start);

        clock.advance(chrono::Duration::hours(2));

        assert_eq!(clock.today(), NaiveDate::from_ymd_opt(2024, 6, 16).unwrap());
    }

    #[test]
    fn test_mock_clock_can_be_updated() {
        let time1 = Utc.with_ymd_and_hms(2024, 6, 15, 10, 0, 0).unwrap();
        let time2 = Utc.with_ymd_and_hms(2024, 7, 1, 10, 0, 0).unwrap();

        let clock = MockClock::new(time1);
        clock.set_time(time2);
        assert_eq!(clock.now_utc(), time2);
    }

    #[test]
    fn test_memory_token_store_roundtrip() {
        let store = MemoryTokenStore::new();
        assert_eq!(store.load().unwrap(), None);

        store.save("abc").unwrap();
        assert_eq!(store.load().unwrap(), Some("abc".to_string()));

        store.clear().unwrap();
        assert_eq!(store.load().unwrap(), None);
        store.clear().unwrap();
    }

    #[test]
    fn test_memory_token_store_clones_share_state() {
        let store = MemoryTokenStore::with_token("t1");
        let clone = store.clone();
        clone.clear().unwrap();
        assert_eq!(store.current(), None);
    }

    #[tokio::test]
    async fn test_mock_source_serves_and_fails() {
        let day = NaiveDate::from_ymd_opt(2024, 3, 5).unwrap();
        let other = NaiveDate::from_ymd_opt(2024, 3, 6).unwrap();
        let source = MockRecordSource::new()
            .with_records(RecordKind::Upcoming, day, vec![record(1, "2024-03-05")])
            .failing(RecordKind::Past, day);

        let upcoming = source.fetch_records(RecordKind::Upcoming, day).await.unwrap();
        assert_eq!(upcoming.len(), 1);

        let past = source.fetch_records(RecordKind::Past, day).await;
        assert!(matches!(past, Err(ClientError::Backend { .. })));
        assert!(!past.unwrap_err().is_not_found());

        let absent = source.fetch_records(RecordKind::Upcoming, other).await;
        assert!(absent.unwrap_err().is_not_found());

        assert_eq!(source.call_count(), 3);
    }

    #[tokio::test]
    async fn test_mock_source_rejects_token() {
        let day = NaiveDate::from_ymd_opt(2024, 3, 5).unwrap();
        let source = MockRecordSource::new()
            .with_records(RecordKind::Past, day, vec![record(1, "2024-03-05")])
            .rejecting(RecordKind::Past, day);

        let result = source.fetch_records(RecordKind::Past, day).await;
        assert!(result.unwrap_err().is_unauthorized());
    }
}
