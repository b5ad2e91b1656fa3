use std::collections::HashSet;

use chrono::{Days, NaiveDate};
use serde::Serialize;

use crate::scan_types::Slot;

/// The two consecutive civil dates currently being watched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MonitoringWindow {
    /// `today + shift_days`
    pub target_date: NaiveDate,
    /// The day after `target_date`
    pub next_date: NaiveDate,
}

impl MonitoringWindow {
    /// Window for the given civil date and day offset
    pub fn for_day(today: NaiveDate, shift_days: i64) -> Self {
        let target_date = shift(today, shift_days);
        Self {
            target_date,
            next_date: shift(target_date, 1),
        }
    }

    /// Both dates, target first
    pub fn dates(&self) -> [NaiveDate; 2] {
        [self.target_date, self.next_date]
    }
}

fn shift(date: NaiveDate, days: i64) -> NaiveDate {
    let magnitude = Days::new(days.unsigned_abs());
    let shifted = if days >= 0 {
        date.checked_add_days(magnitude)
    } else {
        date.checked_sub_days(magnitude)
    };
    shifted.unwrap_or(date)
}

/// Notification state owned by the scan executor.
///
/// Holds the monitoring window and the ids of slots already announced for it.
/// Both are reset together when the facility's civil date changes.
#[derive(Debug, Clone)]
pub struct MonitorState {
    shift_days: i64,
    civil_date: NaiveDate,
    window: MonitoringWindow,
    notified: HashSet<String>,
    auto_booked: HashSet<String>,
    first_run_pending: bool,
}

impl MonitorState {
    /// Fresh state for the given civil date
    pub fn new(today: NaiveDate, shift_days: i64) -> Self {
        Self {
            shift_days,
            civil_date: today,
            window: MonitoringWindow::for_day(today, shift_days),
            notified: HashSet::new(),
            auto_booked: HashSet::new(),
            first_run_pending: true,
        }
    }

    /// Last civil date observed
    pub fn civil_date(&self) -> NaiveDate {
        self.civil_date
    }

    /// Configured offset of the target date
    pub fn shift_days(&self) -> i64 {
        self.shift_days
    }

    /// Current monitoring window
    pub fn window(&self) -> MonitoringWindow {
        self.window
    }

    /// Ids announced for the current window
    pub fn notified_ids(&self) -> &HashSet<String> {
        &self.notified
    }

    /// Whether the slot with this id was already announced
    pub fn is_notified(&self, slot_id: &str) -> bool {
        self.notified.contains(slot_id)
    }

    /// Handle a civil date change.
    ///
    /// Returns the new window when `today` differs from the last observed date, after
    /// clearing the notified set. Returns `None` on the same civil day.
    pub fn roll_over(&mut self, today: NaiveDate) -> Option<MonitoringWindow> {
        if today == self.civil_date {
            return None;
        }

        self.civil_date = today;
        self.window = MonitoringWindow::for_day(today, self.shift_days);
        self.notified.clear();
        self.auto_booked.clear();
        self.first_run_pending = true;
        Some(self.window)
    }

    /// Whether no tick has completed since startup or the last rollover.
    ///
    /// Such a tick announces every available slot, not only the new ones.
    pub fn first_run_pending(&self) -> bool {
        self.first_run_pending
    }

    /// Mark the current window as announced at least once
    pub fn complete_first_run(&mut self) {
        self.first_run_pending = false;
    }

    /// Indices of the candidates that have to be announced this tick
    pub fn select_new(&self, candidates: &[Slot], is_first_run: bool) -> Vec<usize> {
        candidates
            .iter()
            .enumerate()
            .filter(|(_, slot)| is_first_run || !self.notified.contains(&slot.slot_id()))
            .map(|(index, _)| index)
            .collect()
    }

    /// Record a slot as announced
    pub fn mark_notified(&mut self, slot_id: String) {
        self.notified.insert(slot_id);
    }

    /// Whether an automatic booking was already attempted for this slot
    pub fn is_auto_booked(&self, slot_id: &str) -> bool {
        self.auto_booked.contains(slot_id)
    }

    /// Record an automatic booking attempt; returns `false` if one was already made
    pub fn mark_auto_booked(&mut self, slot_id: String) -> bool {
        self.auto_booked.insert(slot_id)
    }

    /// Forget announced and auto-booked slots that are no longer available
    pub fn retain_available(&mut self, candidates: &[Slot]) {
        let current: HashSet<String> = candidates.iter().map(Slot::slot_id).collect();
        self.notified.retain(|id| current.contains(id));
        self.auto_booked.retain(|id| current.contains(id));
    }
}
