//! Wire types exchanged with the OptoCom backend.

use std::{fmt, str::FromStr};

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};

use crate::validator::parse_flag;

/// Which record set a CSV or a listing belongs to.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    /// Future appointments with a predicted spend, no realized spend.
    Upcoming,
    /// Historical appointments carrying the amount actually spent.
    Past,
}

impl RecordKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordKind::Upcoming => "upcoming",
            RecordKind::Past => "past",
        }
    }

    /// Path segment of the per-date listing endpoint.
    pub fn listing_segment(&self) -> &'static str {
        match self {
            RecordKind::Upcoming => "patients",
            RecordKind::Past => "past",
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecordKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "upcoming" => Ok(RecordKind::Upcoming),
            "past" => Ok(RecordKind::Past),
            other => Err(format!("unknown record kind '{}'", other)),
        }
    }
}

/// One patient appointment as returned by the per-date listings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppointmentRecord {
    pub id: i64,
    #[serde(default)]
    pub age: u32,
    #[serde(
        default,
        rename = "days_lps",
        alias = "days_since_last_purchase"
    )]
    pub days_since_last_purchase: u32,
    #[serde(default, deserialize_with = "flag")]
    pub employed: bool,
    #[serde(default, deserialize_with = "flag")]
    pub benefits: bool,
    #[serde(default, deserialize_with = "flag")]
    pub driver: bool,
    #[serde(default, deserialize_with = "flag")]
    pub vdu: bool,
    #[serde(default, deserialize_with = "flag")]
    pub varifocal: bool,
    #[serde(default, deserialize_with = "flag")]
    pub high_rx: bool,
    pub appointment_date: String,
    #[serde(default)]
    pub predicted_spend: Option<f64>,
    #[serde(default)]
    pub purchase_probability: Option<f64>,
    #[serde(default, alias = "amount_spent")]
    pub actual_spend: Option<f64>,
}

impl AppointmentRecord {
    pub fn predicted(&self) -> f64 {
        self.predicted_spend.unwrap_or(0.0)
    }

    pub fn actual(&self) -> f64 {
        self.actual_spend.unwrap_or(0.0)
    }

    pub fn probability(&self) -> f64 {
        self.purchase_probability.unwrap_or(0.0)
    }

    /// Calendar day of the appointment, ignoring any time component.
    pub fn appointment_day(&self) -> Option<NaiveDate> {
        let head = self.appointment_date.get(..10)?;
        NaiveDate::parse_from_str(head, "%Y-%m-%d").ok()
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawFlag {
    Bool(bool),
    Int(i64),
    Text(String),
}

/// Accept `true`, `1`, `"Y"`, `"false"`, ... for boolean record flags.
fn flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<RawFlag>::deserialize(deserializer)? {
        None => Ok(false),
        Some(RawFlag::Bool(b)) => Ok(b),
        Some(RawFlag::Int(n)) => Ok(n != 0),
        Some(RawFlag::Text(s)) => parse_flag(&s)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid flag value '{}'", s))),
    }
}

/// Current user as returned by `GET /me`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(default)]
    pub id: Option<i64>,
    pub username: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub practice_name: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Registration {
    pub username: String,
    pub email: String,
    pub password: String,
    pub practice_name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    #[allow(dead_code)]
    pub token_type: Option<String>,
}

/// `{"message": "..."}` bodies returned by upload and clear.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

/// Input for a single ad-hoc prediction.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PatientInput {
    pub age: u32,
    pub days_lps: u32,
    pub employed: bool,
    pub benefits: bool,
    pub driver: bool,
    pub vdu: bool,
    pub varifocal: bool,
    pub high_rx: bool,
}

impl Default for PatientInput {
    fn default() -> Self {
        Self {
            age: 0,
            days_lps: 700,
            employed: false,
            benefits: false,
            driver: false,
            vdu: false,
            varifocal: false,
            high_rx: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PredictionOutput {
    pub purchase_probability: f64,
    #[serde(default)]
    pub purchase_probability_percent: Option<f64>,
    pub predicted_spend: f64,
}

impl PredictionOutput {
    /// Percentage form, preferring the backend's own rounding when sent.
    pub fn probability_percent(&self) -> f64 {
        self.purchase_probability_percent
            .unwrap_or(self.purchase_probability * 100.0)
    }
}
