//! Main entry point for the court availability monitor.
//! Polls the facility, notifies a Telegram chat and serves a small HTTP API.

mod config;
mod scan_manager;

use std::sync::Arc;

use actix_web::{App, HttpServer, middleware::Logger, web};
use court_scan::{AvailabilityClient, BookingClient, Notifier, ScanExecutor, SystemClock};
use notification_services::TelegramService;

use crate::config::AppConfig;
use crate::scan_manager::ScanManager;

/// Best-effort notice when the monitor cannot start; needs the bot credentials
async fn report_startup_failure(reason: &str) {
    let (Ok(token), Ok(chat_id)) = (
        std::env::var("TELEGRAM_BOT_TOKEN"),
        std::env::var("TELEGRAM_CHAT_ID"),
    ) else {
        return;
    };

    match TelegramService::new(&token, chat_id) {
        Ok(telegram) => {
            let message = format!("❌ Court monitor failed to start: {}", reason);
            if let Err(e) = telegram.send_message(&message).await {
                log::error!("❌ Failed to send startup failure notice: {}", e);
            }
        }
        Err(e) => log::error!("❌ Failed to create Telegram client: {}", e),
    }
}

async fn report_fatal(reason: String) {
    log::error!("❌ {}", reason);
    report_startup_failure(&reason).await;
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize logger
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    log::info!("🚀 Starting court monitor...");

    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            report_fatal(format!("Invalid configuration: {:#}", e)).await;
            std::process::exit(1);
        }
    };

    let telegram = match TelegramService::new(&config.telegram_bot_token, config.telegram_chat_id.clone()) {
        Ok(service) => Arc::new(service),
        Err(e) => {
            report_fatal(format!("Failed to initialize Telegram service: {}", e)).await;
            std::process::exit(1);
        }
    };

    let availability = match AvailabilityClient::new(config.availability_url.clone()) {
        Ok(client) => client,
        Err(e) => {
            report_fatal(format!("Failed to initialize availability client: {}", e)).await;
            std::process::exit(1);
        }
    };

    let booking = match BookingClient::new(config.booking_url.clone(), config.auth_token.clone()) {
        Ok(client) => client,
        Err(e) => {
            report_fatal(format!("Failed to initialize booking client: {}", e)).await;
            std::process::exit(1);
        }
    };

    if config.auth_token.is_none() {
        log::warn!("🔧 AUTH_TOKEN is not set; bookings will be rejected");
    }

    log::info!("🕐 Facility timezone: {}", config.timezone);
    log::info!("🎾 Availability endpoint: {}", availability.availability_url());

    let executor = Arc::new(ScanExecutor::new(
        Arc::new(availability),
        Arc::new(booking),
        telegram.clone(),
        Arc::new(SystemClock::new(config.timezone)),
        Some(config.executor.clone()),
    ));

    let mut manager = ScanManager::new(executor.clone()).with_command_listener(telegram);
    manager.start();

    let executor_data = web::Data::from(executor);
    let port = config.http_port;

    log::info!("🌐 Server will be available at: http://0.0.0.0:{}", port);

    let server = match HttpServer::new(move || {
        App::new()
            .app_data(executor_data.clone())
            .wrap(Logger::default())
            .configure(web_handlers::configure)
    })
    .bind(("0.0.0.0", port))
    {
        Ok(server) => server,
        Err(e) => {
            log::error!("❌ Failed to bind port {}: {}", port, e);
            manager.stop().await;
            return Err(e);
        }
    };

    // Returns once SIGINT or SIGTERM has shut the server down
    let result = server.run().await;

    manager.stop().await;
    result
}
