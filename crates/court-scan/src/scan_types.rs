use std::fmt;

use chrono::{NaiveDate, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};

/// A bookable time unit for one court on one date
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slot {
    /// Upstream identifier of the court
    pub court_id: String,
    /// Display name of the court
    pub court_name: String,
    /// Civil date of the slot in the facility timezone
    pub date: NaiveDate,
    /// Start time of the slot in the facility timezone
    #[serde(with = "hh_mm")]
    pub time: NaiveTime,
    /// Length of the reservation in minutes
    pub duration_minutes: u32,
    /// Price of the reservation, when upstream reports one
    pub price: Option<Price>,
}

impl Slot {
    /// De-duplication key of the slot.
    ///
    /// Depends only on date, court and start time, so the same slot seen at a
    /// different price or duration keeps its identity.
    pub fn slot_id(&self) -> String {
        format!("{}-{}-{}", self.date, self.court_id, self.time_label())
    }

    /// Start time rendered as `HH:MM`
    pub fn time_label(&self) -> String {
        self.time.format("%H:%M").to_string()
    }

    /// Booking datetime rendered as `YYYY-MM-DD HH:MM`
    pub fn datetime_label(&self) -> String {
        format!("{} {}", self.date, self.time_label())
    }
}

/// Monetary amount in cents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Price {
    /// Amount in cents
    pub cents: i64,
}

impl fmt::Display for Price {
    /// Formats the amount the way the facility shows it (es-AR): `$15.000` or `$15.000,50`
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.cents < 0 { "-" } else { "" };
        let cents = self.cents.unsigned_abs();
        let units = (cents / 100).to_string();

        let mut grouped = String::with_capacity(units.len() + units.len() / 3);
        for (i, digit) in units.chars().enumerate() {
            if i > 0 && (units.len() - i) % 3 == 0 {
                grouped.push('.');
            }
            grouped.push(digit);
        }

        match cents % 100 {
            0 => write!(f, "{}${}", sign, grouped),
            rest => write!(f, "{}${},{:02}", sign, grouped, rest),
        }
    }
}

/// Inclusive time-of-day window, in minutes since midnight
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    start: u32,
    end: u32,
}

impl TimeRange {
    /// Builds a range from two `HH:MM` strings
    pub fn parse(start: &str, end: &str) -> Result<Self, ScanError> {
        let start_minutes = parse_minutes(start)?;
        let end_minutes = parse_minutes(end)?;

        if start_minutes > end_minutes {
            return Err(ScanError::ConfigError(format!(
                "time range start {} is after end {}",
                start, end
            )));
        }

        Ok(Self {
            start: start_minutes,
            end: end_minutes,
        })
    }

    /// Whether the given time of day falls within the range, both ends included
    pub fn contains(&self, time: NaiveTime) -> bool {
        let minutes = time.hour() * 60 + time.minute();
        minutes >= self.start && minutes <= self.end
    }

    /// Start of the range as `HH:MM`
    pub fn start_label(&self) -> String {
        format!("{:02}:{:02}", self.start / 60, self.start % 60)
    }

    /// End of the range as `HH:MM`
    pub fn end_label(&self) -> String {
        format!("{:02}:{:02}", self.end / 60, self.end % 60)
    }
}

impl Default for TimeRange {
    fn default() -> Self {
        Self {
            start: 16 * 60 + 30,
            end: 20 * 60,
        }
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start_label(), self.end_label())
    }
}

/// Parses `HH:MM` into a time of day
pub fn parse_time_of_day(value: &str) -> Result<NaiveTime, ScanError> {
    NaiveTime::parse_from_str(value.trim(), "%H:%M")
        .map_err(|_| ScanError::ConfigError(format!("invalid time of day '{}', expected HH:MM", value)))
}

fn parse_minutes(value: &str) -> Result<u32, ScanError> {
    let time = parse_time_of_day(value)?;
    Ok(time.hour() * 60 + time.minute())
}

mod hh_mm {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(time: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&time.format("%H:%M").to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        NaiveTime::parse_from_str(&raw, "%H:%M").map_err(serde::de::Error::custom)
    }
}

/// Custom error type for scan operations
#[derive(thiserror::Error, Debug)]
pub enum ScanError {
    /// Resource not found upstream
    #[error("Resource not found")]
    NotFound,

    /// API error
    #[error("API error: {0}")]
    ApiError(String),

    /// Rate limited by external API
    #[error("Rate limited by external API")]
    RateLimited,

    /// Authentication failed with external service
    #[error("Authentication failed with external service")]
    AuthenticationFailed,

    /// Data format error
    #[error("Data format error: {0}")]
    DataFormat(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Network error
    #[error("Network error: {0}")]
    Network(String),

    /// Fetching one of the monitored dates failed
    #[error("Fetch failed for {date}: {reason}")]
    DateFetch {
        /// Date whose availability could not be retrieved
        date: NaiveDate,
        /// Underlying failure
        reason: String,
    },
}

impl actix_web::ResponseError for ScanError {
    fn error_response(&self) -> actix_web::HttpResponse {
        use actix_web::HttpResponse;

        match self {
            ScanError::NotFound => HttpResponse::NotFound().json(serde_json::json!({
                "error": "not_found",
                "message": "Upstream resource not found"
            })),
            ScanError::RateLimited => HttpResponse::TooManyRequests().json(serde_json::json!({
                "error": "rate_limited",
                "message": "Rate limited by external service. Please try again later."
            })),
            ScanError::AuthenticationFailed => HttpResponse::BadGateway().json(serde_json::json!({
                "error": "authentication_failed",
                "message": "Failed to authenticate with external service"
            })),
            ScanError::ApiError(_) | ScanError::Network(_) | ScanError::DateFetch { .. } => {
                HttpResponse::BadGateway().json(serde_json::json!({
                    "error": "upstream_error",
                    "message": self.to_string()
                }))
            }
            ScanError::DataFormat(_) | ScanError::ConfigError(_) => {
                HttpResponse::InternalServerError().json(serde_json::json!({
                    "error": "internal_error",
                    "message": self.to_string()
                }))
            }
        }
    }
}
