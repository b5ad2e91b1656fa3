use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use chrono_tz::Tz;

use court_scan::{
    AutoBookingRule, CustomerInfo, DEFAULT_AVAILABILITY_URL, DEFAULT_BOOKING_URL,
    DEFAULT_CHECKOUT_URL, DEFAULT_SPORT_ID, ScanExecutorConfig, TimeRange,
};

/// Everything the monitor needs, read from the environment at startup
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub telegram_bot_token: String,
    pub telegram_chat_id: String,
    pub availability_url: String,
    pub booking_url: String,
    pub auth_token: Option<String>,
    pub timezone: Tz,
    pub http_port: u16,
    pub executor: ScanExecutorConfig,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from any key lookup; blank values count as unset
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let telegram_bot_token = get("TELEGRAM_BOT_TOKEN").context("TELEGRAM_BOT_TOKEN must be set")?;
        let telegram_chat_id = get("TELEGRAM_CHAT_ID").context("TELEGRAM_CHAT_ID must be set")?;

        let time_range = TimeRange::parse(
            &get("START_TIME").unwrap_or_else(|| "16:30".to_string()),
            &get("END_TIME").unwrap_or_else(|| "20:00".to_string()),
        )
        .context("START_TIME and END_TIME must be HH:MM with START_TIME <= END_TIME")?;

        let interval_minutes: u64 = parse_or(&get, "INTERVAL_MINUTES", 1)?;
        if interval_minutes == 0 {
            bail!("INTERVAL_MINUTES must be at least 1");
        }
        let heartbeat_minutes: u64 = parse_or(&get, "HEARTBEAT_INTERVAL_MINUTES", 60)?;
        if heartbeat_minutes == 0 {
            bail!("HEARTBEAT_INTERVAL_MINUTES must be at least 1");
        }

        let timezone_name = get("FACILITY_TIMEZONE")
            .unwrap_or_else(|| "America/Argentina/Buenos_Aires".to_string());
        let timezone = timezone_name
            .parse::<Tz>()
            .map_err(|e| anyhow!("FACILITY_TIMEZONE '{}' is not a valid timezone: {}", timezone_name, e))?;

        let auto_booking = if get("AUTO_BOOKING_ENABLED").as_deref() == Some("true") {
            match (get("AUTO_BOOKING_DAY"), get("AUTO_BOOKING_TIME")) {
                (Some(day), Some(time)) => Some(
                    AutoBookingRule::parse(&day, &time)
                        .context("AUTO_BOOKING_DAY or AUTO_BOOKING_TIME is invalid")?,
                ),
                _ => {
                    log::warn!(
                        "AUTO_BOOKING_ENABLED is set but AUTO_BOOKING_DAY or AUTO_BOOKING_TIME is missing; auto-booking disabled"
                    );
                    None
                }
            }
        } else {
            None
        };

        let executor = ScanExecutorConfig {
            time_range,
            poll_interval: Duration::from_secs(interval_minutes * 60),
            heartbeat_interval: Duration::from_secs(heartbeat_minutes * 60),
            notification_delay: Duration::from_millis(parse_or(&get, "NOTIFICATION_DELAY_MS", 100)?),
            shift_days: parse_or(&get, "SHIFT_DAYS", 0)?,
            default_duration_minutes: parse_or(&get, "DEFAULT_DURATION_MINUTES", 90)?,
            assume_available_when_unmarked: parse_or(&get, "ASSUME_AVAILABLE_WHEN_UNMARKED", false)?,
            auto_booking,
            customer: CustomerInfo {
                name: get("BOOKING_NAME"),
                email: get("BOOKING_EMAIL"),
                phone: get("BOOKING_PHONE"),
                sport_id: parse_or(&get, "BOOKING_SPORT_ID", DEFAULT_SPORT_ID)?,
            },
            checkout_url: get("CHECKOUT_URL").unwrap_or_else(|| DEFAULT_CHECKOUT_URL.to_string()),
            max_consecutive_error_notices: get("MAX_CONSECUTIVE_ERROR_NOTICES")
                .map(|v| v.trim().parse())
                .transpose()
                .context("MAX_CONSECUTIVE_ERROR_NOTICES must be a valid number")?,
        };

        Ok(Self {
            telegram_bot_token,
            telegram_chat_id,
            availability_url: get("AVAILABILITY_URL")
                .unwrap_or_else(|| DEFAULT_AVAILABILITY_URL.to_string()),
            booking_url: get("BOOKING_URL").unwrap_or_else(|| DEFAULT_BOOKING_URL.to_string()),
            auth_token: get("AUTH_TOKEN"),
            timezone,
            http_port: parse_or(&get, "HTTP_PORT", 8080)?,
            executor,
        })
    }
}

fn parse_or<T, G>(get: &G, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{} must be a valid value, got '{}'", key, raw)),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveTime, Weekday};
    use std::collections::HashMap;

    fn config(pairs: &[(&str, &str)]) -> Result<AppConfig> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| vars.get(key).cloned())
    }

    const CREDENTIALS: [(&str, &str); 2] = [("TELEGRAM_BOT_TOKEN", "123:abc"), ("TELEGRAM_CHAT_ID", "555")];

    #[test]
    fn defaults_apply_when_only_credentials_are_set() {
        let config = config(&CREDENTIALS).unwrap();

        assert_eq!(config.executor.time_range.to_string(), "16:30-20:00");
        assert_eq!(config.executor.poll_interval, Duration::from_secs(60));
        assert_eq!(config.executor.heartbeat_interval, Duration::from_secs(3600));
        assert_eq!(config.executor.notification_delay, Duration::from_millis(100));
        assert_eq!(config.executor.shift_days, 0);
        assert_eq!(config.executor.default_duration_minutes, 90);
        assert_eq!(config.executor.customer.sport_id, 7);
        assert_eq!(config.executor.auto_booking, None);
        assert_eq!(config.executor.max_consecutive_error_notices, None);
        assert_eq!(config.timezone, chrono_tz::America::Argentina::Buenos_Aires);
        assert_eq!(config.availability_url, DEFAULT_AVAILABILITY_URL);
        assert_eq!(config.http_port, 8080);
        assert_eq!(config.auth_token, None);
    }

    #[test]
    fn credentials_are_mandatory() {
        let err = config(&[("TELEGRAM_CHAT_ID", "555")]).unwrap_err();
        assert!(err.to_string().contains("TELEGRAM_BOT_TOKEN"));

        let err = config(&[("TELEGRAM_BOT_TOKEN", "123:abc"), ("TELEGRAM_CHAT_ID", " ")]).unwrap_err();
        assert!(err.to_string().contains("TELEGRAM_CHAT_ID"));
    }

    #[test]
    fn rejects_malformed_values() {
        let mut pairs = CREDENTIALS.to_vec();
        pairs.push(("START_TIME", "21:00"));
        assert!(config(&pairs).is_err());

        let mut pairs = CREDENTIALS.to_vec();
        pairs.push(("INTERVAL_MINUTES", "often"));
        let err = config(&pairs).unwrap_err();
        assert!(err.to_string().contains("INTERVAL_MINUTES"));

        let mut pairs = CREDENTIALS.to_vec();
        pairs.push(("FACILITY_TIMEZONE", "Mars/Olympus"));
        assert!(config(&pairs).is_err());
    }

    #[test]
    fn reads_overrides() {
        let mut pairs = CREDENTIALS.to_vec();
        pairs.extend([
            ("START_TIME", "18:00"),
            ("END_TIME", "22:00"),
            ("INTERVAL_MINUTES", "5"),
            ("SHIFT_DAYS", "2"),
            ("FACILITY_TIMEZONE", "Europe/Madrid"),
            ("BOOKING_PHONE", "1122334455"),
            ("AUTH_TOKEN", "secret"),
            ("MAX_CONSECUTIVE_ERROR_NOTICES", "3"),
        ]);
        let config = config(&pairs).unwrap();

        assert_eq!(config.executor.time_range.to_string(), "18:00-22:00");
        assert_eq!(config.executor.poll_interval, Duration::from_secs(300));
        assert_eq!(config.executor.shift_days, 2);
        assert_eq!(config.timezone, chrono_tz::Europe::Madrid);
        assert_eq!(config.executor.customer.phone.as_deref(), Some("1122334455"));
        assert_eq!(config.auth_token.as_deref(), Some("secret"));
        assert_eq!(config.executor.max_consecutive_error_notices, Some(3));
    }

    #[test]
    fn auto_booking_needs_flag_day_and_time() {
        let mut pairs = CREDENTIALS.to_vec();
        pairs.extend([("AUTO_BOOKING_DAY", "2"), ("AUTO_BOOKING_TIME", "18:00")]);
        assert_eq!(config(&pairs).unwrap().executor.auto_booking, None);

        pairs.push(("AUTO_BOOKING_ENABLED", "true"));
        let rule = config(&pairs).unwrap().executor.auto_booking.unwrap();
        assert_eq!(rule.weekday, Weekday::Tue);
        assert_eq!(rule.time, NaiveTime::from_hms_opt(18, 0, 0).unwrap());

        let mut missing_time = CREDENTIALS.to_vec();
        missing_time.extend([("AUTO_BOOKING_ENABLED", "true"), ("AUTO_BOOKING_DAY", "2")]);
        assert_eq!(config(&missing_time).unwrap().executor.auto_booking, None);

        let mut invalid = CREDENTIALS.to_vec();
        invalid.extend([
            ("AUTO_BOOKING_ENABLED", "true"),
            ("AUTO_BOOKING_DAY", "9"),
            ("AUTO_BOOKING_TIME", "18:00"),
        ]);
        assert!(config(&invalid).is_err());
    }
}
