use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, Weekday};
use chrono_tz::Tz;
use futures_util::future::join_all;
use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use tokio::time::{MissedTickBehavior, interval, sleep};
use tracing::{debug, error, info, warn};

use crate::availability_client::AvailabilitySource;
use crate::booking::{BookingRequest, BookingSubmitter, CustomerInfo, DEFAULT_CHECKOUT_URL};
use crate::clock::Clock;
use crate::monitor_state::{MonitorState, MonitoringWindow};
use crate::notification_service::*;
use crate::scan_types::*;
use crate::slot_extractor::SlotExtractor;

/// Weekday and start time that trigger an automatic booking
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AutoBookingRule {
    /// Day of week of the slot date
    pub weekday: Weekday,
    /// Exact start time of the slot
    pub time: NaiveTime,
}

impl AutoBookingRule {
    /// Parse a weekday (`0`-`6` counting from Sunday, or a name such as `tue`) and an `HH:MM` time
    pub fn parse(day: &str, time: &str) -> Result<Self, ScanError> {
        let day = day.trim();
        let weekday = match day.parse::<u32>() {
            Ok(n) if n < 7 => (0..n).fold(Weekday::Sun, |weekday, _| weekday.succ()),
            Ok(_) => {
                return Err(ScanError::ConfigError(format!(
                    "weekday number '{}' must be between 0 (Sunday) and 6",
                    day
                )));
            }
            Err(_) => day
                .parse::<Weekday>()
                .map_err(|_| ScanError::ConfigError(format!("invalid weekday '{}'", day)))?,
        };

        Ok(Self {
            weekday,
            time: parse_time_of_day(time)?,
        })
    }

    /// Whether a slot falls exactly on the configured weekday and time
    pub fn matches(&self, slot: &Slot) -> bool {
        slot.date.weekday() == self.weekday && slot.time == self.time
    }

    /// Human description, e.g. `martes a las 18:00`
    pub fn describe(&self) -> String {
        let day = match self.weekday {
            Weekday::Mon => "lunes",
            Weekday::Tue => "martes",
            Weekday::Wed => "miércoles",
            Weekday::Thu => "jueves",
            Weekday::Fri => "viernes",
            Weekday::Sat => "sábado",
            Weekday::Sun => "domingo",
        };
        format!("{} a las {}", day, self.time.format("%H:%M"))
    }
}

/// Configuration for the scan executor
#[derive(Debug, Clone)]
pub struct ScanExecutorConfig {
    /// Time-of-day window slots must start in (default: 16:30-20:00)
    pub time_range: TimeRange,

    /// How often availability is checked (default: 1 minute)
    pub poll_interval: Duration,

    /// How often a liveness notice is sent (default: 60 minutes)
    pub heartbeat_interval: Duration,

    /// Pause between consecutive slot notices (default: 100 ms)
    pub notification_delay: Duration,

    /// Offset of the target date from today (default: 0)
    pub shift_days: i64,

    /// Duration assumed when upstream omits it (default: 90 minutes)
    pub default_duration_minutes: u32,

    /// Treat slots without any status field as available (default: false)
    pub assume_available_when_unmarked: bool,

    /// Automatic booking trigger (default: disabled)
    pub auto_booking: Option<AutoBookingRule>,

    /// Contact details used for every booking
    pub customer: CustomerInfo,

    /// Base of the checkout deep-link
    pub checkout_url: String,

    /// Consecutive failed ticks reported before error notices are muted (default: never muted)
    pub max_consecutive_error_notices: Option<u32>,
}

impl Default for ScanExecutorConfig {
    fn default() -> Self {
        Self {
            time_range: TimeRange::default(),
            poll_interval: Duration::from_secs(60),
            heartbeat_interval: Duration::from_secs(60 * 60),
            notification_delay: Duration::from_millis(100),
            shift_days: 0,
            default_duration_minutes: 90,
            assume_available_when_unmarked: false,
            auto_booking: None,
            customer: CustomerInfo::default(),
            checkout_url: DEFAULT_CHECKOUT_URL.to_string(),
            max_consecutive_error_notices: None,
        }
    }
}

/// Read-only view of the last completed tick
#[derive(Debug, Clone, Serialize)]
pub struct ScanSnapshot {
    /// Candidates of the last tick, in the order they were numbered
    pub slots: Vec<Slot>,
    /// Civil date the slots were computed on
    pub civil_date: NaiveDate,
    /// Completion time of the last successful tick
    pub last_checked: Option<DateTime<Tz>>,
    /// Ticks that failed in a row
    pub consecutive_errors: u32,
    /// Ticks attempted since startup
    pub ticks: u64,
}

/// Result of the diff-and-notify step
#[derive(Debug, Clone, Default, Serialize)]
pub struct NotifyReport {
    /// Slots currently available in the window
    pub candidates: usize,
    /// Slots selected for announcement
    pub new_slots: usize,
    /// Slot notices delivered
    pub notified: usize,
    /// Slot notices that could not be delivered
    pub failed_notifications: usize,
    /// Automatic bookings attempted
    pub auto_bookings: usize,
    /// Whether the "nothing available" summary went out
    pub summary_sent: bool,
}

/// Result of one availability check
#[derive(Debug, Clone, Serialize)]
pub struct TickReport {
    /// Whether every slot was announced regardless of history
    pub first_run: bool,
    /// Whether the civil date changed during this tick
    pub rolled_over: bool,
    /// Window that was checked
    pub window: MonitoringWindow,
    /// Diff outcome
    #[serde(flatten)]
    pub notify: NotifyReport,
}

/// Result of an on-demand check that leaves notification state untouched
#[derive(Debug, Clone, Serialize)]
pub struct ManualCheckReport {
    /// Window that was checked
    pub window: MonitoringWindow,
    /// Time-of-day filter applied
    pub time_range: String,
    /// Available slots
    pub slots: Vec<Slot>,
}

/// Polling driver and owner of the notification state
pub struct ScanExecutor {
    availability: Arc<dyn AvailabilitySource>,
    booking: Arc<dyn BookingSubmitter>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    extractor: SlotExtractor,

    /// Exclusively held for a whole check cycle, so cycles never overlap
    state: Mutex<MonitorState>,

    snapshot: RwLock<ScanSnapshot>,

    config: ScanExecutorConfig,
}

impl ScanExecutor {
    /// Create an executor; `None` uses the default configuration
    pub fn new(
        availability: Arc<dyn AvailabilitySource>,
        booking: Arc<dyn BookingSubmitter>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
        config: Option<ScanExecutorConfig>,
    ) -> Self {
        let config = config.unwrap_or_default();
        let today = clock.today();
        let extractor = SlotExtractor::new(config.time_range, config.default_duration_minutes)
            .assume_available_when_unmarked(config.assume_available_when_unmarked);

        Self {
            availability,
            booking,
            notifier,
            clock,
            extractor,
            state: Mutex::new(MonitorState::new(today, config.shift_days)),
            snapshot: RwLock::new(ScanSnapshot {
                slots: Vec::new(),
                civil_date: today,
                last_checked: None,
                consecutive_errors: 0,
                ticks: 0,
            }),
            config,
        }
    }

    /// Executor configuration
    pub fn config(&self) -> &ScanExecutorConfig {
        &self.config
    }

    /// Announce startup, then check availability on every poll interval
    pub async fn start(&self) -> Result<(), ScanError> {
        info!(
            "Starting court availability monitoring ({} every {:?})",
            self.config.time_range, self.config.poll_interval
        );

        self.announce_start().await;

        let mut poll_interval = interval(self.config.poll_interval);
        poll_interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            poll_interval.tick().await;

            // The first successful cycle since startup announces everything on its own,
            // whether it runs here or over HTTP
            if let Err(e) = self.check_availability(false).await {
                error!("Error in court availability check: {}", e);
            }
        }
    }

    /// Send a liveness notice on every heartbeat interval
    pub async fn run_heartbeat(&self) {
        let mut heartbeat = interval(self.config.heartbeat_interval);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

        // The first tick completes immediately
        heartbeat.tick().await;

        loop {
            heartbeat.tick().await;
            self.send_heartbeat().await;
        }
    }

    /// One full check cycle: rollover check, fetch, filter, diff and notify.
    ///
    /// Fetch failures abort the cycle before any state is touched. `is_first_run`
    /// forces every slot to be announced; the first successful cycle after startup
    /// or a rollover does so regardless.
    pub async fn check_availability(&self, is_first_run: bool) -> Result<TickReport, ScanError> {
        let mut state = self.state.lock().await;

        let rolled_over = self.roll_over_locked(&mut state).await;
        let first_run = is_first_run || rolled_over || state.first_run_pending();
        let window = state.window();

        debug!(
            "Checking availability for {} and {} (first run: {})",
            window.target_date, window.next_date, first_run
        );

        let candidates = match self.fetch_window(window).await {
            Ok(candidates) => candidates,
            Err(e) => {
                drop(state);
                self.record_failure(&e).await;
                return Err(e);
            }
        };

        let notify = self.notify_locked(&mut state, candidates, first_run).await;
        drop(state);

        self.record_success().await;

        Ok(TickReport {
            first_run,
            rolled_over,
            window,
            notify,
        })
    }

    /// Reset the window and notified set if the facility's civil date changed.
    ///
    /// Returns `true` when a rollover happened, in which case the caller must treat
    /// the tick as a first run.
    pub async fn handle_day_change(&self) -> bool {
        let mut state = self.state.lock().await;
        self.roll_over_locked(&mut state).await
    }

    /// Announce new slots among `candidates` and update the notified set
    pub async fn diff_and_notify(&self, candidates: Vec<Slot>, is_first_run: bool) -> NotifyReport {
        let mut state = self.state.lock().await;
        self.notify_locked(&mut state, candidates, is_first_run).await
    }

    async fn roll_over_locked(&self, state: &mut MonitorState) -> bool {
        let today = self.clock.today();
        let previous = state.window();

        let Some(window) = state.roll_over(today) else {
            return false;
        };

        info!(
            "Day changed from monitoring {} to {}",
            previous.target_date, window.target_date
        );

        {
            let mut snapshot = self.snapshot.write().await;
            snapshot.slots.clear();
            snapshot.civil_date = today;
        }

        if let Err(e) = self
            .notifier
            .send_message(&new_day_message(&window, today))
            .await
        {
            error!("Failed to send new day notification: {}", e);
        }

        true
    }

    /// Fetch both dates concurrently and extract their slots
    async fn fetch_window(&self, window: MonitoringWindow) -> Result<Vec<Slot>, ScanError> {
        let fetches = window.dates().map(|date| async move {
            (date, self.availability.fetch_availability(date).await)
        });
        let results = join_all(fetches).await;

        let mut slots = Vec::new();
        let mut failures = Vec::new();

        for (date, result) in results {
            match result {
                Ok(data) => slots.extend(self.extractor.extract(&data, date)),
                Err(e) => {
                    error!("Error fetching availability for {}: {}", date, e);
                    failures.push((date, e));
                }
            }
        }

        let failed_count = failures.len();
        match failures.into_iter().next() {
            None => Ok(slots),
            Some((date, e)) if failed_count > 1 => Err(ScanError::DateFetch {
                date,
                reason: format!("{} (and {} more date(s))", e, failed_count - 1),
            }),
            Some((date, e)) => Err(ScanError::DateFetch {
                date,
                reason: e.to_string(),
            }),
        }
    }

    async fn notify_locked(
        &self,
        state: &mut MonitorState,
        candidates: Vec<Slot>,
        is_first_run: bool,
    ) -> NotifyReport {
        let today = state.civil_date();
        let mut report = NotifyReport {
            candidates: candidates.len(),
            ..NotifyReport::default()
        };

        {
            let mut snapshot = self.snapshot.write().await;
            snapshot.slots = candidates.clone();
            snapshot.civil_date = today;
        }

        if candidates.is_empty() {
            if is_first_run {
                let message =
                    nothing_available_message(&self.config.time_range, &state.window(), today);
                match self.notifier.send_message(&message).await {
                    Ok(()) => report.summary_sent = true,
                    Err(e) => error!("Failed to send empty availability summary: {}", e),
                }
            } else {
                debug!("No slots available");
            }
            state.retain_available(&candidates);
            state.complete_first_run();
            return report;
        }

        let new_indices = state.select_new(&candidates, is_first_run);
        report.new_slots = new_indices.len();

        if new_indices.is_empty() {
            debug!("No new slots to notify");
        } else {
            info!("Found {} new slots out of {}", new_indices.len(), candidates.len());
        }

        for (position, index) in new_indices.into_iter().enumerate() {
            if position > 0 && !self.config.notification_delay.is_zero() {
                sleep(self.config.notification_delay).await;
            }

            let slot = &candidates[index];
            let slot_id = slot.slot_id();

            match self
                .notifier
                .send_slot_offer(&slot_message(slot, today), &slot_id)
                .await
            {
                Ok(()) => {
                    state.mark_notified(slot_id.clone());
                    report.notified += 1;
                }
                Err(e) => {
                    error!("Failed to send notification for slot {}: {}", slot_id, e);
                    report.failed_notifications += 1;
                }
            }

            // A booking is a single attempt, even when the notice is retried
            if self.should_auto_book(slot) && state.mark_auto_booked(slot_id) {
                report.auto_bookings += 1;
                self.auto_book(slot).await;
            }
        }

        state.retain_available(&candidates);
        state.complete_first_run();
        report
    }

    fn should_auto_book(&self, slot: &Slot) -> bool {
        self.config
            .auto_booking
            .as_ref()
            .is_some_and(|rule| rule.matches(slot))
    }

    async fn auto_book(&self, slot: &Slot) {
        info!("Auto-booking slot {}", slot.slot_id());

        if let Err(e) = self.notifier.send_message(&auto_booking_message(slot)).await {
            warn!("Failed to send auto-booking notice: {}", e);
        }

        let outcome = self.submit_booking(slot).await;
        if let Err(e) = self.notifier.send_message(&outcome).await {
            error!("Failed to send auto-booking result: {}", e);
        }
    }

    /// Submit a booking for `slot` and describe the outcome
    pub async fn submit_booking(&self, slot: &Slot) -> String {
        let request = BookingRequest::from_slot(slot, &self.config.customer);
        let result = self.booking.submit(&request).await;

        match &result {
            Ok(confirmation) => info!(
                "Booking created for {} (id: {:?})",
                slot.slot_id(),
                confirmation.booking_id
            ),
            Err(e) => warn!("Booking failed for {}: {}", slot.slot_id(), e),
        }

        booking_result_message(&result, &request, &slot.court_name, &self.config.checkout_url)
    }

    /// Book slot number `number` (1-based) of the last list, reporting to `reply`
    pub async fn book_slot(&self, number: usize, reply: &dyn Notifier) -> Result<(), NotificationError> {
        let (slot, today) = {
            let snapshot = self.snapshot.read().await;
            let slot = number
                .checked_sub(1)
                .and_then(|index| snapshot.slots.get(index))
                .cloned();
            (slot, snapshot.civil_date)
        };

        let Some(slot) = slot else {
            return reply.send_message(&invalid_slot_number_message()).await;
        };

        self.book_and_reply(&slot, today, reply).await
    }

    /// Book the slot a notice was sent for, if it is still in the last list
    pub async fn book_slot_by_id(&self, slot_id: &str, reply: &dyn Notifier) -> Result<(), NotificationError> {
        let (slot, today) = {
            let snapshot = self.snapshot.read().await;
            let slot = snapshot
                .slots
                .iter()
                .find(|slot| slot.slot_id() == slot_id)
                .cloned();
            (slot, snapshot.civil_date)
        };

        let Some(slot) = slot else {
            info!("Slot {} is no longer available", slot_id);
            return reply.send_message(&slot_no_longer_available_message()).await;
        };

        self.book_and_reply(&slot, today, reply).await
    }

    async fn book_and_reply(
        &self,
        slot: &Slot,
        today: NaiveDate,
        reply: &dyn Notifier,
    ) -> Result<(), NotificationError> {
        reply
            .send_message(&booking_pending_message(slot, today))
            .await?;
        let outcome = self.submit_booking(slot).await;
        reply.send_message(&outcome).await
    }

    /// Numbered list of the slots currently available
    pub async fn slots_message(&self) -> String {
        let snapshot = self.snapshot.read().await;
        slots_list_message(&snapshot.slots, snapshot.civil_date)
    }

    /// Copy of the last published snapshot
    pub async fn snapshot(&self) -> ScanSnapshot {
        self.snapshot.read().await.clone()
    }

    /// Ids announced for the current window
    pub async fn notified_ids(&self) -> HashSet<String> {
        self.state.lock().await.notified_ids().clone()
    }

    /// Check the current window without touching notification state.
    ///
    /// Always reports the result to the recipient, even when nothing is available.
    pub async fn manual_check(&self) -> Result<ManualCheckReport, ScanError> {
        let window = MonitoringWindow::for_day(self.clock.today(), self.config.shift_days);
        info!("Manual check for {} and {}", window.target_date, window.next_date);

        match self.fetch_window(window).await {
            Ok(slots) => {
                let message = manual_check_message(&slots, &self.config.time_range);
                if let Err(e) = self.notifier.send_message(&message).await {
                    error!("Failed to send manual check summary: {}", e);
                }
                Ok(ManualCheckReport {
                    window,
                    time_range: self.config.time_range.to_string(),
                    slots,
                })
            }
            Err(e) => {
                error!("Error in manual check: {}", e);
                if let Err(send_err) = self
                    .notifier
                    .send_message(&manual_check_error_message(&e.to_string()))
                    .await
                {
                    error!("Failed to send manual check error notice: {}", send_err);
                }
                Err(e)
            }
        }
    }

    /// Send the startup notice
    pub async fn announce_start(&self) {
        let window = MonitoringWindow::for_day(self.clock.today(), self.config.shift_days);
        let message = startup_message(
            &self.config.time_range,
            (self.config.poll_interval.as_secs() / 60).max(1),
            &window,
            self.clock.today(),
            self.config.auto_booking.as_ref().map(AutoBookingRule::describe),
        );

        if let Err(e) = self.notifier.send_message(&message).await {
            error!("Failed to send startup notification: {}", e);
        }
    }

    /// Send the shutdown notice, best effort
    pub async fn announce_stop(&self) {
        if let Err(e) = self.notifier.send_message(&stopped_message()).await {
            error!("Failed to send stop notification: {}", e);
        }
    }

    /// Send one liveness notice
    pub async fn send_heartbeat(&self) {
        let message = {
            let snapshot = self.snapshot.read().await;
            heartbeat_message(snapshot.last_checked, snapshot.slots.len(), snapshot.ticks)
        };

        if let Err(e) = self.notifier.send_message(&message).await {
            error!("Failed to send heartbeat: {}", e);
        }
    }

    async fn record_failure(&self, e: &ScanError) {
        let failures = {
            let mut snapshot = self.snapshot.write().await;
            snapshot.consecutive_errors += 1;
            snapshot.ticks += 1;
            snapshot.consecutive_errors
        };

        match self.config.max_consecutive_error_notices {
            Some(limit) if failures > limit => {
                if failures == limit + 1 {
                    warn!(
                        "{} consecutive failed checks, muting error notices until recovery",
                        failures
                    );
                }
                return;
            }
            _ => {}
        }

        if let Err(send_err) = self
            .notifier
            .send_message(&error_message(&e.to_string()))
            .await
        {
            error!("Failed to send error notification: {}", send_err);
        }
    }

    async fn record_success(&self) {
        let failures = {
            let mut snapshot = self.snapshot.write().await;
            let failures = snapshot.consecutive_errors;
            snapshot.consecutive_errors = 0;
            snapshot.ticks += 1;
            snapshot.last_checked = Some(self.clock.now());
            failures
        };

        if failures == 0 {
            return;
        }

        info!("Availability checks recovered after {} failures", failures);

        let muted = self
            .config
            .max_consecutive_error_notices
            .is_some_and(|limit| failures > limit);
        if muted {
            if let Err(e) = self.notifier.send_message(&recovered_message(failures)).await {
                error!("Failed to send recovery notification: {}", e);
            }
        }
    }
}
