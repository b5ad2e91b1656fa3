//! Normalisation of the upstream availability document into [`Slot`] records.
//!
//! The facility API has shipped several response shapes over time. Every place
//! where the shapes differ is resolved by an ordered table of strategies; the
//! first strategy that resolves wins.

use chrono::{NaiveDate, NaiveTime};
use serde_json::Value;
use tracing::{debug, warn};

use crate::scan_types::{Price, Slot, TimeRange};

/// Where a list of courts may live in the response document
struct CourtContainer {
    name: &'static str,
    path: &'static [&'static str],
    /// The container only lists slots that are open for booking
    open_only: bool,
}

const COURT_CONTAINERS: &[CourtContainer] = &[
    CourtContainer {
        name: "available_courts",
        path: &["available_courts"],
        open_only: true,
    },
    CourtContainer {
        name: "courts",
        path: &["courts"],
        open_only: false,
    },
    CourtContainer {
        name: "data.courts",
        path: &["data", "courts"],
        open_only: false,
    },
    CourtContainer {
        name: "root array",
        path: &[],
        open_only: false,
    },
    CourtContainer {
        name: "availability",
        path: &["availability"],
        open_only: false,
    },
];

/// Per-court slot list fields, with whether the list holds open slots only
const SLOT_LISTS: &[(&str, bool)] = &[
    ("available_slots", true),
    ("schedule", false),
    ("slots", false),
    ("availability", false),
    ("times", false),
];

const COURT_NAME_FIELDS: &[&str] = &["name", "court_name", "title"];
const COURT_ID_FIELDS: &[&str] = &["id", "court_id"];
const START_FIELDS: &[&str] = &["start", "time", "start_time"];

type StatusReader = fn(&Value) -> Option<bool>;

/// Ordered availability readers. `Some(true)` means open, `Some(false)` means taken.
const STATUS_READERS: &[(&str, StatusReader)] = &[
    ("available", read_available_flag),
    ("status", read_status),
    ("state", read_state),
    ("occupied", read_occupied),
    ("booked", read_booked),
];

fn read_available_flag(slot: &Value) -> Option<bool> {
    slot.get("available")?.as_bool()
}

fn read_status(slot: &Value) -> Option<bool> {
    read_status_field(slot, "status")
}

fn read_state(slot: &Value) -> Option<bool> {
    read_status_field(slot, "state")
}

fn read_status_field(slot: &Value, field: &str) -> Option<bool> {
    let value = slot.get(field)?.as_str()?;
    Some(value.eq_ignore_ascii_case("available"))
}

fn read_occupied(slot: &Value) -> Option<bool> {
    slot.get("occupied")?.as_bool().map(|occupied| !occupied)
}

fn read_booked(slot: &Value) -> Option<bool> {
    slot.get("booked")?.as_bool().map(|booked| !booked)
}

/// Turns raw availability documents into filtered slot lists
#[derive(Debug, Clone)]
pub struct SlotExtractor {
    time_range: TimeRange,
    default_duration_minutes: u32,
    assume_available_when_unmarked: bool,
}

impl SlotExtractor {
    /// Create an extractor for the given time window
    pub fn new(time_range: TimeRange, default_duration_minutes: u32) -> Self {
        Self {
            time_range,
            default_duration_minutes,
            assume_available_when_unmarked: false,
        }
    }

    /// Treat slots without any status field as available even outside open-only lists
    pub fn assume_available_when_unmarked(mut self, assume: bool) -> Self {
        self.assume_available_when_unmarked = assume;
        self
    }

    /// Extract the open slots of `date` whose start time falls in the configured range.
    ///
    /// A missing or malformed document yields an empty list, never an error.
    pub fn extract(&self, data: &Value, date: NaiveDate) -> Vec<Slot> {
        let Some((container, courts)) = resolve_courts(data) else {
            warn!("Invalid API response structure for {} - no court list found", date);
            return Vec::new();
        };

        debug!(
            "Found {} courts for {} under '{}'",
            courts.len(),
            date,
            container.name
        );

        let mut slots = Vec::new();
        for court in courts {
            self.extract_court(court, container.open_only, date, &mut slots);
        }

        slots
    }

    fn extract_court(&self, court: &Value, open_only: bool, date: NaiveDate, out: &mut Vec<Slot>) {
        let court_name = first_string(court, COURT_NAME_FIELDS);
        let court_id = first_string(court, COURT_ID_FIELDS).or_else(|| court_name.clone());

        let Some(court_id) = court_id else {
            warn!("Skipping court without id or name for {}", date);
            return;
        };
        let court_name = court_name.unwrap_or_else(|| format!("Cancha {}", court_id));

        let Some((raw_slots, list_open_only)) = resolve_slot_list(court) else {
            debug!("Court {} has no slot list for {}", court_id, date);
            return;
        };
        let open_only = open_only || list_open_only;

        for raw in raw_slots {
            if !self.is_available(raw, open_only) {
                continue;
            }

            let Some(time) = first_start_time(raw) else {
                debug!("Skipping slot without a readable start time on court {}", court_id);
                continue;
            };

            if !self.time_range.contains(time) {
                continue;
            }

            out.push(Slot {
                court_id: court_id.clone(),
                court_name: court_name.clone(),
                date,
                time,
                duration_minutes: raw
                    .get("duration")
                    .and_then(Value::as_u64)
                    .and_then(|d| u32::try_from(d).ok())
                    .filter(|d| *d > 0)
                    .unwrap_or(self.default_duration_minutes),
                price: extract_price(raw),
            });
        }
    }

    fn is_available(&self, slot: &Value, open_only: bool) -> bool {
        match availability_verdict(slot) {
            Some(open) => open,
            None => open_only || self.assume_available_when_unmarked,
        }
    }
}

/// First status reader that resolves, or `None` when the slot carries no status at all
fn availability_verdict(slot: &Value) -> Option<bool> {
    STATUS_READERS.iter().find_map(|(_, read)| read(slot))
}

fn resolve_courts(data: &Value) -> Option<(&'static CourtContainer, &Vec<Value>)> {
    COURT_CONTAINERS.iter().find_map(|container| {
        let target = container
            .path
            .iter()
            .try_fold(data, |node, key| node.get(*key))?;
        target.as_array().map(|courts| (container, courts))
    })
}

fn resolve_slot_list(court: &Value) -> Option<(&Vec<Value>, bool)> {
    SLOT_LISTS.iter().find_map(|(field, open_only)| {
        court
            .get(*field)
            .and_then(Value::as_array)
            .map(|slots| (slots, *open_only))
    })
}

fn first_string(node: &Value, fields: &[&str]) -> Option<String> {
    fields.iter().find_map(|field| match node.get(*field)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

fn first_start_time(slot: &Value) -> Option<NaiveTime> {
    START_FIELDS
        .iter()
        .find_map(|field| slot.get(*field)?.as_str().and_then(parse_start_time))
}

/// Accepts `2026-10-19T17:00:00-03:00`, `17:00:00` and `17:00`
fn parse_start_time(raw: &str) -> Option<NaiveTime> {
    let time_part = match raw.split_once('T') {
        Some((_, rest)) => rest,
        None => raw,
    };
    let hh_mm = time_part.get(..5)?;
    NaiveTime::parse_from_str(hh_mm, "%H:%M").ok()
}

fn extract_price(slot: &Value) -> Option<Price> {
    slot.get("price")
        .and_then(|price| price.get("cents"))
        .or_else(|| slot.get("price_cents"))
        .and_then(Value::as_i64)
        .map(|cents| Price { cents })
}
