use chrono::{DateTime, NaiveDate};
use chrono_tz::Tz;

use crate::booking::{BookingConfirmation, BookingError, BookingRequest};
use crate::monitor_state::MonitoringWindow;
use crate::scan_types::{Slot, TimeRange};

/// Outbound side of the messaging transport.
///
/// Every message goes to the single configured recipient.
#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    /// Send a plain-text message
    async fn send_message(&self, text: &str) -> Result<(), NotificationError>;

    /// Send a slot notice offering to book the slot identified by `slot_id`.
    ///
    /// Transports without interactive buttons fall back to plain text.
    async fn send_slot_offer(&self, text: &str, _slot_id: &str) -> Result<(), NotificationError> {
        self.send_message(text).await
    }
}

/// Errors raised while delivering a message
#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    /// The transport could not be reached
    #[error("Transport error: {0}")]
    Transport(String),
    /// The messaging API refused the request
    #[error("Messaging API error {status}: {description}")]
    Api {
        /// HTTP status returned by the messaging API
        status: u16,
        /// Error description returned by the messaging API
        description: String,
    },
}

/// Human description of a date relative to today
pub fn day_description(offset_days: i64) -> String {
    match offset_days {
        0 => "hoy".to_string(),
        1 => "mañana".to_string(),
        2 => "pasado mañana".to_string(),
        n if n > 0 => format!("en {} días", n),
        n => format!("hace {} días", n.abs()),
    }
}

fn describe_date(date: NaiveDate, today: NaiveDate) -> String {
    day_description((date - today).num_days())
}

fn price_label(slot: &Slot) -> String {
    slot.price
        .map(|p| p.to_string())
        .unwrap_or_else(|| "Precio no disponible".to_string())
}

/// Notice for one newly available slot
pub fn slot_message(slot: &Slot, today: NaiveDate) -> String {
    format!(
        "🎾 Turno disponible {} ({}) a las {}hs en {}\n💰 Precio: {}\n⏱️ Duración: {} minutos",
        describe_date(slot.date, today),
        slot.date,
        slot.time_label(),
        slot.court_name,
        price_label(slot),
        slot.duration_minutes
    )
}

/// Summary sent on a first-run tick that found nothing
pub fn nothing_available_message(
    range: &TimeRange,
    window: &MonitoringWindow,
    today: NaiveDate,
) -> String {
    format!(
        "No hay turnos disponibles entre {} y {} para:\n• {} ({})\n• {} ({})",
        range.start_label(),
        range.end_label(),
        describe_date(window.target_date, today),
        window.target_date,
        describe_date(window.next_date, today),
        window.next_date
    )
}

/// One-time notice after a civil-day rollover
pub fn new_day_message(window: &MonitoringWindow, today: NaiveDate) -> String {
    format!(
        "🌅 New day started! Now monitoring court availability for {} ({}) + {} ({})",
        window.target_date,
        describe_date(window.target_date, today),
        window.next_date,
        describe_date(window.next_date, today)
    )
}

/// Startup notice
pub fn startup_message(
    range: &TimeRange,
    poll_minutes: u64,
    window: &MonitoringWindow,
    today: NaiveDate,
    auto_booking: Option<String>,
) -> String {
    let mut message = format!(
        "🚀 Court availability monitoring started!\n⏰ Checking every {} minute(s) between {} and {}",
        poll_minutes,
        range.start_label(),
        range.end_label()
    );
    if let Some(rule) = auto_booking {
        message.push_str(&format!("\n🤖 Auto-reservando activo para {}", rule));
    }
    message.push_str(&format!(
        "\n📅 Monitoring both:\n• {} ({})\n• {} ({})",
        window.target_date,
        describe_date(window.target_date, today),
        window.next_date,
        describe_date(window.next_date, today)
    ));
    message
}

/// Shutdown notice
pub fn stopped_message() -> String {
    "🛑 Court availability monitoring stopped.".to_string()
}

/// Liveness notice
pub fn heartbeat_message(
    last_checked: Option<DateTime<Tz>>,
    available: usize,
    ticks: u64,
) -> String {
    let last = last_checked
        .map(|at| at.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "todavía no".to_string());
    format!(
        "💓 Monitor activo\n🕐 Último chequeo: {}\n🎾 Turnos disponibles: {}\n🔁 Chequeos realizados: {}",
        last, available, ticks
    )
}

/// Error notice for a failed tick
pub fn error_message(reason: &str) -> String {
    format!("❌ Error checking court availability: {}", reason)
}

/// Notice sent when checks succeed again after failures
pub fn recovered_message(failed_ticks: u32) -> String {
    format!(
        "✅ Court availability checks recovered after {} failed attempt(s)",
        failed_ticks
    )
}

/// Numbered list answering the "list slots" command
pub fn slots_list_message(slots: &[Slot], today: NaiveDate) -> String {
    if slots.is_empty() {
        return "No hay turnos disponibles en este momento.".to_string();
    }

    let mut message = String::from("🎾 Turnos disponibles:\n\n");
    for (index, slot) in slots.iter().enumerate() {
        message.push_str(&format!(
            "{}. {} ({}) {}hs - {} - {} - {} min\n",
            index + 1,
            describe_date(slot.date, today),
            slot.date,
            slot.time_label(),
            slot.court_name,
            price_label(slot),
            slot.duration_minutes
        ));
    }
    message.push_str("\nUsa /book [número] para reservar (ej: /book 1)");
    message
}

/// Summary of an on-demand check
pub fn manual_check_message(slots: &[Slot], range: &TimeRange) -> String {
    if slots.is_empty() {
        return format!(
            "🔍 Manual check: No hay turnos disponibles entre {} y {}.",
            range.start_label(),
            range.end_label()
        );
    }

    let lines: Vec<String> = slots
        .iter()
        .map(|s| format!("• {} {}hs - {}", s.date, s.time_label(), s.court_name))
        .collect();
    format!(
        "🔍 Manual check: {} turnos disponibles:\n{}",
        slots.len(),
        lines.join("\n")
    )
}

/// Progress notice before submitting a booking
pub fn booking_pending_message(slot: &Slot, today: NaiveDate) -> String {
    format!(
        "⏳ Procesando reserva para:\n{} ({}) {}hs - {}...",
        describe_date(slot.date, today),
        slot.date,
        slot.time_label(),
        slot.court_name
    )
}

/// Notice announcing an automatic booking
pub fn auto_booking_message(slot: &Slot) -> String {
    format!(
        "🤖 Auto-reservando {} a las {}hs en {}",
        slot.date,
        slot.time_label(),
        slot.court_name
    )
}

/// Reply to a booking command whose number is not in the last list
pub fn invalid_slot_number_message() -> String {
    "❌ Número de turno inválido. Usa /slots para ver los turnos disponibles.".to_string()
}

/// Reply to a booking button whose slot has disappeared since the notice
pub fn slot_no_longer_available_message() -> String {
    "❌ Ese turno ya no está disponible. Usa /slots para ver los turnos disponibles.".to_string()
}

/// Error notice for a failed on-demand check
pub fn manual_check_error_message(reason: &str) -> String {
    format!("❌ Manual check error: {}", reason)
}

/// Outcome of a booking attempt
pub fn booking_result_message(
    result: &Result<BookingConfirmation, BookingError>,
    request: &BookingRequest,
    court_name: &str,
    checkout_url: &str,
) -> String {
    match result {
        Ok(confirmation) => {
            let link = confirmation
                .checkout_link(checkout_url)
                .unwrap_or_else(|| "no disponible".to_string());
            format!(
                "⏳ Turno bloqueado\n👉 Link para confirmar reserva: {}\n📅 Fecha: {}\n⏱️ Duración: {} minutos\n🎾 Cancha: {}\n👤 Nombre: {}\n📧 Email: {}\n📱 Teléfono: {}",
                link,
                request.datetime,
                request.duration,
                court_name,
                request.name,
                request.email,
                request.phone
            )
        }
        Err(BookingError::Upstream { status, body }) => {
            format!("❌ Error al reservar (HTTP {}): {}", status, body)
        }
        Err(e) => format!("❌ Error al reservar: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::booking::CustomerInfo;
    use crate::scan_types::Price;
    use chrono::NaiveTime;
    use serde_json::json;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, d).unwrap()
    }

    fn slot(date: NaiveDate, price: Option<i64>) -> Slot {
        Slot {
            court_id: "4".to_string(),
            court_name: "Cancha 4".to_string(),
            date,
            time: NaiveTime::from_hms_opt(17, 0, 0).unwrap(),
            duration_minutes: 60,
            price: price.map(|cents| Price { cents }),
        }
    }

    #[test]
    fn describes_days_relative_to_today() {
        assert_eq!(day_description(0), "hoy");
        assert_eq!(day_description(1), "mañana");
        assert_eq!(day_description(2), "pasado mañana");
        assert_eq!(day_description(5), "en 5 días");
        assert_eq!(day_description(-3), "hace 3 días");
    }

    #[test]
    fn slot_message_tolerates_missing_price() {
        let with_price = slot_message(&slot(day(20), Some(1_800_000)), day(19));
        assert!(with_price.contains("mañana (2026-10-20) a las 17:00hs en Cancha 4"));
        assert!(with_price.contains("$18.000"));

        let without = slot_message(&slot(day(19), None), day(19));
        assert!(without.contains("hoy"));
        assert!(without.contains("Precio no disponible"));
    }

    #[test]
    fn slots_list_is_numbered() {
        let list = slots_list_message(&[slot(day(19), None), slot(day(20), None)], day(19));
        assert!(list.contains("1. hoy (2026-10-19) 17:00hs"));
        assert!(list.contains("2. mañana (2026-10-20) 17:00hs"));
        assert!(list.ends_with("(ej: /book 1)"));

        assert_eq!(
            slots_list_message(&[], day(19)),
            "No hay turnos disponibles en este momento."
        );
    }

    #[test]
    fn nothing_available_names_both_dates() {
        let window = MonitoringWindow::for_day(day(19), 0);
        let message = nothing_available_message(&TimeRange::default(), &window, day(19));
        assert!(message.contains("entre 16:30 y 20:00"));
        assert!(message.contains("• hoy (2026-10-19)"));
        assert!(message.contains("• mañana (2026-10-20)"));
    }

    #[test]
    fn booking_result_reports_link_or_failure() {
        let s = slot(day(19), None);
        let customer = CustomerInfo {
            name: Some("Ana".to_string()),
            email: Some("ana@example.com".to_string()),
            phone: Some("123".to_string()),
            sport_id: 7,
        };
        let request = BookingRequest::from_slot(&s, &customer);

        let ok = Ok(BookingConfirmation::from_payload(json!({ "data": { "id": 55 } })));
        let message = booking_result_message(&ok, &request, &s.court_name, "https://x.test/b");
        assert!(message.contains("https://x.test/b/55?is_beelup=false"));
        assert!(message.contains("🎾 Cancha: Cancha 4"));

        let rejected = Err(BookingError::Upstream {
            status: 422,
            body: json!({ "message": "slot taken" }),
        });
        let message = booking_result_message(&rejected, &request, &s.court_name, "https://x.test/b");
        assert!(message.contains("HTTP 422"));
        assert!(message.contains("slot taken"));
    }
}
