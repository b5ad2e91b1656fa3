use chrono::NaiveDate;
use reqwest::{Client, Response, StatusCode};
use serde_json::Value;
use tracing::{debug, warn};

use crate::scan_types::ScanError;

/// Default availability endpoint of the monitored sport club
pub const DEFAULT_AVAILABILITY_URL: &str =
    "https://alquilatucancha.com/api/v3/availability/sportclubs/1003";

/// Anything that can return raw availability data for one date
#[async_trait::async_trait]
pub trait AvailabilitySource: Send + Sync {
    /// Fetch the unvalidated availability document for `date`.
    ///
    /// A single attempt; retry policy belongs to the polling driver.
    async fn fetch_availability(&self, date: NaiveDate) -> Result<Value, ScanError>;
}

/// Client for the facility's availability API
pub struct AvailabilityClient {
    client: Client,
    availability_url: String,
}

impl AvailabilityClient {
    /// Create a new availability API client
    pub fn new(availability_url: impl Into<String>) -> Result<Self, ScanError> {
        let client = Client::builder()
            .user_agent(concat!("court-monitor/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ScanError::ApiError(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            availability_url: availability_url.into(),
        })
    }

    /// Endpoint this client polls
    pub fn availability_url(&self) -> &str {
        &self.availability_url
    }
}

#[async_trait::async_trait]
impl AvailabilitySource for AvailabilityClient {
    async fn fetch_availability(&self, date: NaiveDate) -> Result<Value, ScanError> {
        debug!("Fetching availability for {}", date);

        let params = [("date", date.format("%Y-%m-%d").to_string())];

        let response = self
            .client
            .get(&self.availability_url)
            .query(&params)
            .send()
            .await
            .map_err(|e| ScanError::Network(format!("HTTP request failed: {}", e)))?;

        debug!("Availability response status for {}: {}", date, response.status());

        let response = ensure_success(response).await?;

        response
            .json::<Value>()
            .await
            .map_err(|e| ScanError::DataFormat(format!("Failed to parse response: {}", e)))
    }
}

async fn ensure_success(response: Response) -> Result<Response, ScanError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "Unable to read response body".to_string());
    warn!("API request failed with status {}: {}", status, body);

    Err(map_status(status, &body))
}

fn map_status(status: StatusCode, body: &str) -> ScanError {
    match status.as_u16() {
        429 => ScanError::RateLimited,
        401 | 403 => ScanError::AuthenticationFailed,
        404 => ScanError::NotFound,
        _ if body.is_empty() => ScanError::ApiError(format!("HTTP {}", status)),
        _ => ScanError::ApiError(format!("HTTP {} - {}", status, body)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_status() {
        assert!(matches!(
            map_status(StatusCode::TOO_MANY_REQUESTS, ""),
            ScanError::RateLimited
        ));
        assert!(matches!(
            map_status(StatusCode::UNAUTHORIZED, ""),
            ScanError::AuthenticationFailed
        ));
        assert!(matches!(
            map_status(StatusCode::FORBIDDEN, "nope"),
            ScanError::AuthenticationFailed
        ));
        assert!(matches!(map_status(StatusCode::NOT_FOUND, ""), ScanError::NotFound));

        match map_status(StatusCode::BAD_GATEWAY, "upstream down") {
            ScanError::ApiError(msg) => {
                assert!(msg.contains("502"));
                assert!(msg.contains("upstream down"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn unreachable_host_is_a_network_error() {
        let client = AvailabilityClient::new("http://127.0.0.1:9/availability").unwrap();
        let date = NaiveDate::from_ymd_opt(2026, 10, 19).unwrap();

        let result = client.fetch_availability(date).await;
        assert!(matches!(result, Err(ScanError::Network(_))));
    }
}
