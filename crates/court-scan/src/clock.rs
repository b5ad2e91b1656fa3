use std::sync::Mutex;

use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;

/// Source of the current instant in the facility timezone.
///
/// Day rollover is decided on the facility's civil calendar, never on UTC.
pub trait Clock: Send + Sync {
    /// Current instant in the facility timezone
    fn now(&self) -> DateTime<Tz>;

    /// Current civil date in the facility timezone
    fn today(&self) -> NaiveDate {
        self.now().date_naive()
    }
}

/// Wall clock projected into a fixed timezone
pub struct SystemClock {
    timezone: Tz,
}

impl SystemClock {
    /// Create a clock for the given facility timezone
    pub fn new(timezone: Tz) -> Self {
        Self { timezone }
    }
}

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Tz> {
        Utc::now().with_timezone(&self.timezone)
    }
}

/// Clock that only moves when told to
pub struct ManualClock {
    now: Mutex<DateTime<Tz>>,
}

impl ManualClock {
    /// Create a clock frozen at the given instant
    pub fn new(now: DateTime<Tz>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    /// Move the clock to a new instant
    pub fn set(&self, now: DateTime<Tz>) {
        if let Ok(mut guard) = self.now.lock() {
            *guard = now;
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Tz> {
        match self.now.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use chrono_tz::America::Argentina::Buenos_Aires;

    #[test]
    fn civil_date_follows_facility_timezone() {
        // 02:30 UTC is still the previous evening in Buenos Aires (UTC-3)
        let instant = Utc.with_ymd_and_hms(2026, 10, 20, 2, 30, 0).unwrap();
        let clock = ManualClock::new(instant.with_timezone(&Buenos_Aires));

        assert_eq!(clock.today(), NaiveDate::from_ymd_opt(2026, 10, 19).unwrap());

        clock.set(
            Utc.with_ymd_and_hms(2026, 10, 20, 3, 0, 0)
                .unwrap()
                .with_timezone(&Buenos_Aires),
        );
        assert_eq!(clock.today(), NaiveDate::from_ymd_opt(2026, 10, 20).unwrap());
    }
}
