//! # Court Scan
//!
//! This crate watches a sports facility's court availability for two consecutive
//! days, announces newly opened slots through a [`Notifier`] and books slots on
//! request or automatically.

/// Types shared by the scan operations
mod scan_types;
pub use scan_types::*;

/// Facility-timezone clock
mod clock;
pub use clock::*;

/// HTTP client for the availability endpoint
mod availability_client;
pub use availability_client::*;

/// Normalisation of availability documents into slots
mod slot_extractor;
pub use slot_extractor::*;

/// Monitoring window and notified-slot bookkeeping
mod monitor_state;
pub use monitor_state::*;

/// Booking payload, validation and submission
mod booking;
pub use booking::*;

/// Notifier trait and message formatting
mod notification_service;
pub use notification_service::*;

/// Polling driver tying everything together
mod executor;
pub use executor::*;
