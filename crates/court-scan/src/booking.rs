use std::borrow::Cow;

use chrono::NaiveDateTime;
use reqwest::Client;
use serde::{Serialize, Serializer};
use serde_json::Value;
use tracing::{error, info};
use validator::{Validate, ValidationError, ValidationErrors};

use crate::scan_types::Slot;

/// Default booking endpoint
pub const DEFAULT_BOOKING_URL: &str = "https://alquilatucancha.com/api/v2/bookings";

/// Default base of the checkout deep-link
pub const DEFAULT_CHECKOUT_URL: &str = "https://alquilatucancha.com/checkout/bookings";

/// Sport identifier used when none is configured
pub const DEFAULT_SPORT_ID: u32 = 7;

lazy_static::lazy_static! {
    static ref DATETIME_REGEX: regex::Regex =
        regex::Regex::new(r"^\d{4}-\d{2}-\d{2} \d{2}:\d{2}$").unwrap();
    static ref EMAIL_REGEX: regex::Regex = regex::Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").unwrap();
}

/// Static contact details used for every booking
#[derive(Debug, Clone, Default)]
pub struct CustomerInfo {
    /// Name on the reservation
    pub name: Option<String>,
    /// Contact email
    pub email: Option<String>,
    /// Contact phone
    pub phone: Option<String>,
    /// Sport identifier expected by the facility
    pub sport_id: u32,
}

/// Payload of the booking-creation endpoint
#[derive(Debug, Clone, Serialize, Validate)]
pub struct BookingRequest {
    /// Start of the reservation as `YYYY-MM-DD HH:MM`
    #[validate(custom(function = "validate_booking_datetime"))]
    pub datetime: String,

    /// Length in minutes
    #[validate(range(min = 1, message = "Duration is required"))]
    pub duration: u32,

    /// Court to book
    #[serde(serialize_with = "serialize_court_id")]
    #[validate(length(min = 1, message = "Court is required"))]
    pub court_id: String,

    /// Sport identifier
    #[validate(range(min = 1, message = "Sport is required"))]
    pub sport_id: u32,

    /// Customer name
    #[validate(length(min = 1, message = "Name is required"))]
    pub name: String,

    /// Customer email
    #[validate(custom(function = "validate_booking_email"))]
    pub email: String,

    /// Booking channel
    #[validate(length(min = 1, message = "Origin is required"))]
    pub from: String,

    /// Customer phone
    #[validate(length(min = 1, message = "Phone is required"))]
    pub phone: String,
}

impl BookingRequest {
    /// Build the payload for a slot using the configured customer details
    pub fn from_slot(slot: &Slot, customer: &CustomerInfo) -> Self {
        Self {
            datetime: slot.datetime_label(),
            duration: slot.duration_minutes,
            court_id: slot.court_id.clone(),
            sport_id: if customer.sport_id == 0 {
                DEFAULT_SPORT_ID
            } else {
                customer.sport_id
            },
            name: customer.name.clone().unwrap_or_default(),
            email: customer.email.clone().unwrap_or_default(),
            from: "web".to_string(),
            phone: customer.phone.clone().unwrap_or_default(),
        }
    }

    /// Validate every required field and format
    pub fn check(&self) -> Result<(), BookingError> {
        self.validate()
            .map_err(|e| BookingError::Validation(describe_validation_errors(&e)))
    }
}

/// Upstream court ids are numeric; send them as JSON numbers when they are
fn serialize_court_id<S: Serializer>(court_id: &str, serializer: S) -> Result<S::Ok, S::Error> {
    match court_id.parse::<u64>() {
        Ok(id) => serializer.serialize_u64(id),
        Err(_) => serializer.serialize_str(court_id),
    }
}

fn validate_booking_datetime(datetime: &str) -> Result<(), ValidationError> {
    let well_formed = DATETIME_REGEX.is_match(datetime)
        && NaiveDateTime::parse_from_str(datetime, "%Y-%m-%d %H:%M").is_ok();

    if well_formed {
        return Ok(());
    }

    let mut err = ValidationError::new("datetime_format");
    err.message = Some(Cow::Borrowed(
        "Invalid datetime format. Expected: \"YYYY-MM-DD HH:MM\"",
    ));
    Err(err)
}

fn validate_booking_email(email: &str) -> Result<(), ValidationError> {
    let (code, message) = if email.is_empty() {
        ("required", "Email is required")
    } else if EMAIL_REGEX.is_match(email) {
        return Ok(());
    } else {
        ("email_format", "Invalid email format")
    };

    let mut err = ValidationError::new(code);
    err.message = Some(Cow::Borrowed(message));
    Err(err)
}

fn describe_validation_errors(errors: &ValidationErrors) -> String {
    let mut fields: Vec<String> = errors
        .field_errors()
        .iter()
        .map(|(field, errs)| {
            let reason = errs
                .first()
                .and_then(|e| e.message.as_ref().map(|m| m.to_string()))
                .unwrap_or_else(|| "invalid value".to_string());
            format!("{}: {}", field, reason)
        })
        .collect();
    fields.sort();
    fields.join("; ")
}

/// Booking accepted by the facility
#[derive(Debug, Clone, Serialize)]
pub struct BookingConfirmation {
    /// Identifier assigned by the facility, if the response carried one
    pub booking_id: Option<String>,
    /// Raw response body
    pub payload: Value,
}

impl BookingConfirmation {
    /// Wrap a raw response, locating the booking id in it
    pub fn from_payload(payload: Value) -> Self {
        let id = payload
            .pointer("/data/id")
            .or_else(|| payload.get("id"))
            .and_then(|id| match id {
                Value::String(s) => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            });

        Self {
            booking_id: id,
            payload,
        }
    }

    /// Deep-link the customer follows to confirm the reservation
    pub fn checkout_link(&self, checkout_url: &str) -> Option<String> {
        self.booking_id.as_ref().map(|id| {
            format!(
                "{}/{}?is_beelup=false",
                checkout_url.trim_end_matches('/'),
                id
            )
        })
    }
}

/// Custom error type for booking operations
#[derive(thiserror::Error, Debug)]
pub enum BookingError {
    /// A required field is missing or malformed; nothing was sent
    #[error("Validation error: {0}")]
    Validation(String),

    /// Booking is not possible with the current configuration
    #[error("Booking not configured: {0}")]
    NotConfigured(String),

    /// Facility answered with an error status
    #[error("Booking rejected with HTTP {status}: {body}")]
    Upstream {
        /// HTTP status code
        status: u16,
        /// Response body, JSON when possible
        body: Value,
    },

    /// No response from the facility
    #[error("Booking request failed: {0}")]
    Transport(String),
}

/// Anything that can place a booking
#[async_trait::async_trait]
pub trait BookingSubmitter: Send + Sync {
    /// Validate and submit one booking. A single attempt, never retried.
    async fn submit(&self, request: &BookingRequest) -> Result<BookingConfirmation, BookingError>;
}

/// Client for the facility's booking endpoint
pub struct BookingClient {
    client: Client,
    booking_url: String,
    auth_token: Option<String>,
}

impl BookingClient {
    /// Create a new booking client
    pub fn new(
        booking_url: impl Into<String>,
        auth_token: Option<String>,
    ) -> Result<Self, BookingError> {
        let client = Client::builder()
            .user_agent(concat!("court-monitor/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| BookingError::Transport(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            booking_url: booking_url.into(),
            auth_token: auth_token.filter(|t| !t.trim().is_empty()),
        })
    }
}

#[async_trait::async_trait]
impl BookingSubmitter for BookingClient {
    async fn submit(&self, request: &BookingRequest) -> Result<BookingConfirmation, BookingError> {
        request.check()?;

        let token = self
            .auth_token
            .as_deref()
            .ok_or_else(|| BookingError::NotConfigured("AUTH_TOKEN is not set".to_string()))?;

        info!(
            "Submitting booking for court {} at {}",
            request.court_id, request.datetime
        );

        let response = self
            .client
            .post(&self.booking_url)
            .bearer_auth(token)
            .json(request)
            .send()
            .await
            .map_err(|e| {
                error!("Error creating booking: {}", e);
                BookingError::Transport(e.to_string())
            })?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| BookingError::Transport(format!("Failed to read response: {}", e)))?;
        let body = serde_json::from_str::<Value>(&text).unwrap_or(Value::String(text));

        if !status.is_success() {
            error!("Booking rejected with status {}: {}", status, body);
            return Err(BookingError::Upstream {
                status: status.as_u16(),
                body,
            });
        }

        Ok(BookingConfirmation::from_payload(body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveTime};
    use serde_json::json;

    fn slot() -> Slot {
        Slot {
            court_id: "1501".to_string(),
            court_name: "Cancha 3".to_string(),
            date: NaiveDate::from_ymd_opt(2026, 10, 21).unwrap(),
            time: NaiveTime::from_hms_opt(18, 30, 0).unwrap(),
            duration_minutes: 90,
            price: None,
        }
    }

    fn customer() -> CustomerInfo {
        CustomerInfo {
            name: Some("Ana Pérez".to_string()),
            email: Some("ana@example.com".to_string()),
            phone: Some("+5491100000000".to_string()),
            sport_id: 0,
        }
    }

    fn unreachable_client() -> BookingClient {
        BookingClient::new("http://127.0.0.1:9/bookings", Some("token".to_string())).unwrap()
    }

    #[test]
    fn builds_payload_from_slot() {
        let request = BookingRequest::from_slot(&slot(), &customer());

        assert_eq!(request.datetime, "2026-10-21 18:30");
        assert_eq!(request.sport_id, DEFAULT_SPORT_ID);
        assert_eq!(request.from, "web");
        assert!(request.check().is_ok());

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["court_id"], 1501);
        assert_eq!(json["duration"], 90);
        assert_eq!(json["phone"], "+5491100000000");
    }

    #[test]
    fn non_numeric_court_ids_stay_strings() {
        let mut s = slot();
        s.court_id = "central".to_string();
        let json = serde_json::to_value(BookingRequest::from_slot(&s, &customer())).unwrap();
        assert_eq!(json["court_id"], "central");
    }

    #[test]
    fn rejects_malformed_datetime() {
        let mut request = BookingRequest::from_slot(&slot(), &customer());
        request.datetime = "2026-13-45 18:30".to_string();

        match request.check() {
            Err(BookingError::Validation(msg)) => assert!(msg.starts_with("datetime:")),
            other => panic!("unexpected result: {other:?}"),
        }

        request.datetime = "2026-10-21T18:30".to_string();
        assert!(request.check().is_err());
    }

    #[tokio::test]
    async fn missing_phone_fails_before_network() {
        let mut info = customer();
        info.phone = None;
        let request = BookingRequest::from_slot(&slot(), &info);

        // The endpoint is unreachable: a transport error would mean we tried to send.
        match unreachable_client().submit(&request).await {
            Err(BookingError::Validation(msg)) => assert_eq!(msg, "phone: Phone is required"),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn malformed_email_is_a_format_error() {
        let mut info = customer();
        info.email = Some("not-an-email".to_string());
        let request = BookingRequest::from_slot(&slot(), &info);

        match unreachable_client().submit(&request).await {
            Err(BookingError::Validation(msg)) => assert_eq!(msg, "email: Invalid email format"),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn missing_email_is_reported_as_missing() {
        let mut info = customer();
        info.email = None;
        let request = BookingRequest::from_slot(&slot(), &info);

        match request.check() {
            Err(BookingError::Validation(msg)) => assert_eq!(msg, "email: Email is required"),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn email_needs_a_dotted_domain() {
        let mut request = BookingRequest::from_slot(&slot(), &customer());

        request.email = "a@b".to_string();
        match request.check() {
            Err(BookingError::Validation(msg)) => assert_eq!(msg, "email: Invalid email format"),
            other => panic!("unexpected result: {other:?}"),
        }

        request.email = "ana perez@example.com".to_string();
        assert!(request.check().is_err());

        request.email = "ana@example.com.ar".to_string();
        assert!(request.check().is_ok());
    }

    #[tokio::test]
    async fn missing_token_fails_before_network() {
        let client = BookingClient::new("http://127.0.0.1:9/bookings", Some("  ".to_string())).unwrap();
        let request = BookingRequest::from_slot(&slot(), &customer());

        assert!(matches!(
            client.submit(&request).await,
            Err(BookingError::NotConfigured(_))
        ));
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_a_transport_error() {
        let request = BookingRequest::from_slot(&slot(), &customer());

        assert!(matches!(
            unreachable_client().submit(&request).await,
            Err(BookingError::Transport(_))
        ));
    }

    #[test]
    fn confirmation_builds_checkout_link() {
        let confirmation = BookingConfirmation::from_payload(json!({ "data": { "id": 98765 } }));
        assert_eq!(confirmation.booking_id.as_deref(), Some("98765"));
        assert_eq!(
            confirmation.checkout_link("https://example.com/checkout/bookings/").as_deref(),
            Some("https://example.com/checkout/bookings/98765?is_beelup=false")
        );

        let flat = BookingConfirmation::from_payload(json!({ "id": "abc" }));
        assert_eq!(flat.booking_id.as_deref(), Some("abc"));

        let empty = BookingConfirmation::from_payload(json!({ "ok": true }));
        assert_eq!(empty.checkout_link(DEFAULT_CHECKOUT_URL), None);
    }
}
