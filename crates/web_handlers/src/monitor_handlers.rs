use actix_web::{HttpResponse, Result, web};
use chrono::{DateTime, Utc};
use serde::Serialize;

use court_scan::{ScanError, ScanExecutor, Slot, TickReport};

/// Response of a regular check cycle triggered over HTTP
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckResponse {
    /// Always `true`; failures are reported through [`ScanError`]
    pub success: bool,
    /// Time-of-day filter applied
    pub time_range: String,
    /// Outcome of the cycle
    pub report: TickReport,
}

/// Wall-clock bounds of an on-demand check
#[derive(Debug, Serialize)]
pub struct ExecutionTime {
    /// When the request arrived
    pub start: DateTime<Utc>,
    /// When the check finished
    pub end: DateTime<Utc>,
    /// Elapsed time, e.g. `412ms`
    pub duration: String,
}

/// Response of an on-demand check
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ManualCheckResponse {
    /// Whether the check reached upstream
    pub success: bool,
    /// Always `manual`
    pub trigger: &'static str,
    /// First date of the window
    pub date: String,
    /// Time-of-day filter applied
    pub time_range: String,
    /// Number of available slots
    pub slots_count: usize,
    /// Available slots
    pub slots: Vec<Slot>,
    /// Wall-clock bounds of the check
    pub execution_time: ExecutionTime,
}

/// Current candidates, as last computed by the monitor
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotsResponse {
    /// Civil date the list was computed on
    pub civil_date: String,
    /// Completion time of the last successful check, if any
    pub last_checked: Option<String>,
    /// Number of slots in the list
    pub total: usize,
    /// Slots numbered from 1 in the order of this list
    pub slots: Vec<Slot>,
}

/// Liveness check
pub async fn health() -> Result<HttpResponse> {
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "status": "ok",
        "timestamp": Utc::now().to_rfc3339()
    })))
}

/// Runs one regular check cycle, exactly as the polling loop would
pub async fn trigger_check(executor: web::Data<ScanExecutor>) -> Result<HttpResponse, ScanError> {
    log::info!("Check triggered over HTTP");

    let report = executor.check_availability(false).await?;

    Ok(HttpResponse::Ok().json(CheckResponse {
        success: true,
        time_range: executor.config().time_range.to_string(),
        report,
    }))
}

/// Checks the current window and reports every available slot without touching
/// the notified-slot state
pub async fn manual_check(executor: web::Data<ScanExecutor>) -> Result<HttpResponse> {
    let start = Utc::now();

    match executor.manual_check().await {
        Ok(report) => {
            let end = Utc::now();
            Ok(HttpResponse::Ok().json(ManualCheckResponse {
                success: true,
                trigger: "manual",
                date: report.window.target_date.to_string(),
                time_range: report.time_range,
                slots_count: report.slots.len(),
                slots: report.slots,
                execution_time: ExecutionTime {
                    start,
                    end,
                    duration: format!("{}ms", (end - start).num_milliseconds()),
                },
            }))
        }
        Err(e) => {
            log::error!("Manual check failed: {}", e);
            Ok(HttpResponse::InternalServerError().json(serde_json::json!({
                "success": false,
                "error": e.to_string(),
                "trigger": "manual",
                "timestamp": Utc::now().to_rfc3339()
            })))
        }
    }
}

/// Lists the slots of the last completed check
pub async fn current_slots(executor: web::Data<ScanExecutor>) -> Result<HttpResponse> {
    let snapshot = executor.snapshot().await;

    Ok(HttpResponse::Ok().json(SlotsResponse {
        civil_date: snapshot.civil_date.to_string(),
        last_checked: snapshot.last_checked.map(|at| at.to_rfc3339()),
        total: snapshot.slots.len(),
        slots: snapshot.slots,
    }))
}

/// Mounts every monitor route
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health)).service(
        web::scope("/api")
            .route("/check", web::post().to(trigger_check))
            .route("/manual-check", web::get().to(manual_check))
            .route("/manual-check", web::post().to(manual_check))
            .route("/slots", web::get().to(current_slots)),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{App, http::StatusCode, test};
    use chrono::{NaiveDate, TimeZone};
    use chrono_tz::America::Argentina::Buenos_Aires;
    use court_scan::{
        AvailabilitySource, BookingConfirmation, BookingError, BookingRequest, BookingSubmitter,
        ManualClock, NotificationError, Notifier, ScanExecutorConfig,
    };
    use serde_json::{Value, json};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    struct FixedAvailability {
        fail: bool,
    }

    #[async_trait::async_trait]
    impl AvailabilitySource for FixedAvailability {
        async fn fetch_availability(&self, date: NaiveDate) -> Result<Value, ScanError> {
            if self.fail {
                return Err(ScanError::Network("connection refused".to_string()));
            }
            Ok(json!({
                "available_courts": [{
                    "id": 1,
                    "name": "Cancha 1",
                    "available_slots": [
                        { "start": format!("{}T15:00:00", date) },
                        { "start": format!("{}T18:00:00", date) }
                    ]
                }]
            }))
        }
    }

    #[derive(Default)]
    struct RecordingNotifier {
        messages: Mutex<Vec<String>>,
    }

    #[async_trait::async_trait]
    impl Notifier for RecordingNotifier {
        async fn send_message(&self, text: &str) -> Result<(), NotificationError> {
            self.messages.lock().unwrap().push(text.to_string());
            Ok(())
        }
    }

    struct RejectingBooking;

    #[async_trait::async_trait]
    impl BookingSubmitter for RejectingBooking {
        async fn submit(&self, _: &BookingRequest) -> Result<BookingConfirmation, BookingError> {
            Err(BookingError::NotConfigured("test".to_string()))
        }
    }

    fn executor(fail: bool) -> (web::Data<ScanExecutor>, Arc<RecordingNotifier>) {
        let notifier = Arc::new(RecordingNotifier::default());
        let clock = ManualClock::new(Buenos_Aires.with_ymd_and_hms(2026, 10, 19, 12, 0, 0).unwrap());
        let config = ScanExecutorConfig {
            notification_delay: Duration::ZERO,
            ..ScanExecutorConfig::default()
        };

        let executor = ScanExecutor::new(
            Arc::new(FixedAvailability { fail }),
            Arc::new(RejectingBooking),
            notifier.clone(),
            Arc::new(clock),
            Some(config),
        );
        (web::Data::new(executor), notifier)
    }

    #[actix_web::test]
    async fn health_is_ok() {
        let app = test::init_service(App::new().configure(configure)).await;
        let req = test::TestRequest::get().uri("/health").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["status"], "ok");
    }

    #[actix_web::test]
    async fn check_runs_a_regular_cycle() {
        let (data, notifier) = executor(false);
        let app = test::init_service(App::new().app_data(data.clone()).configure(configure)).await;

        let req = test::TestRequest::post().uri("/api/check").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["timeRange"], "16:30-20:00");
        assert_eq!(body["report"]["candidates"], 2);
        assert_eq!(body["report"]["notified"], 2);
        assert_eq!(notifier.messages.lock().unwrap().len(), 2);

        let req = test::TestRequest::get().uri("/api/slots").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["total"], 2);
        assert_eq!(body["civilDate"], "2026-10-19");
        assert_eq!(body["slots"][0]["time"], "18:00");
        assert_eq!(body["slots"][1]["date"], "2026-10-20");
    }

    #[actix_web::test]
    async fn check_failure_is_a_bad_gateway() {
        let (data, _) = executor(true);
        let app = test::init_service(App::new().app_data(data).configure(configure)).await;

        let req = test::TestRequest::post().uri("/api/check").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
    }

    #[actix_web::test]
    async fn manual_check_reports_without_notified_state() {
        let (data, notifier) = executor(false);
        let app = test::init_service(App::new().app_data(data.clone()).configure(configure)).await;

        let req = test::TestRequest::get().uri("/api/manual-check").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["trigger"], "manual");
        assert_eq!(body["date"], "2026-10-19");
        assert_eq!(body["slotsCount"], 2);
        assert!(body["executionTime"]["duration"].as_str().unwrap().ends_with("ms"));
        assert!(data.notified_ids().await.is_empty());

        let req = test::TestRequest::post().uri("/api/manual-check").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(notifier.messages.lock().unwrap().len(), 2);
    }

    #[actix_web::test]
    async fn manual_check_failure_is_reported() {
        let (data, notifier) = executor(true);
        let app = test::init_service(App::new().app_data(data).configure(configure)).await;

        let req = test::TestRequest::get().uri("/api/manual-check").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["trigger"], "manual");
        assert!(notifier.messages.lock().unwrap()[0].starts_with("❌ Manual check error"));
    }
}
