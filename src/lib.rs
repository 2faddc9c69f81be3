//! OptoCom Client Library
//!
//! Client side of the OptoCom optical-retail prediction service: CSV
//! pre-upload validation, date-bucketed spend aggregation for the forecast
//! chart, and a typed REST client with session handling.

pub mod api;
pub mod config;
pub mod error;
pub mod forecast;
pub mod models;
pub mod navigation;
pub mod patients;
pub mod session;
pub mod state;
pub mod style;
pub mod traits;
pub mod validator;
pub mod widgets;

// Re-export commonly used types
pub use api::OptoComClient;
pub use config::AppConfig;
pub use error::ClientError;
pub use forecast::{
    DayBucket,
    DayFetch,
    ForecastSeries,
    Granularity,
    MonthBucket,
    WindowAggregate,
    WindowTotals,
    // Aggregation
    aggregate_window,
    build_series,
    fetch_day,
    chart_title,
    // Window arithmetic
    shift_anchor,
    window_dates,
};
pub use models::{
    AppointmentRecord, Credentials, PatientInput, PredictionOutput, RecordKind, Registration,
    UserProfile,
};
pub use navigation::{ForecastView, NavCommand, RequestToken, WindowRequest};
pub use patients::{Paginator, PatientRow, SpendTier};
pub use session::{FileTokenStore, Session};
pub use state::{AppState, Route, StatusMessage};
pub use traits::{
    Clock, MemoryTokenStore, MockClock, MockRecordSource, RecordSource, SystemClock, TokenStore,
};
pub use validator::{ValidationReport, validate_csv};
