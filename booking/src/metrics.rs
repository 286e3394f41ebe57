//! Business metrics for the booking services.
//!
//! # Exported Metrics
//!
//! ## Counters
//! - `booking_transitions_total{to}` - Committed status transitions by target status
//! - `booking_transition_rejections_total{reason}` - Refused transitions by error kind
//! - `booking_concurrent_modifications_total` - Saves that lost an optimistic concurrency race
//! - `booking_bulk_items_total{outcome}` - Bulk items by outcome (succeeded, failed)
//! - `booking_addon_conflicts_total` - Add-on selections refused as incompatible
//! - `booking_store_version_conflicts_total` - Conditional updates rejected by `PostgreSQL`
//!
//! ## Histograms
//! - `booking_addon_quote_cents` - Subtotal of each add-on quote in cents

use medtour_core::BookingStatus;
use metrics::{describe_counter, describe_histogram};

/// Initialize and register all booking metrics descriptions.
///
/// This should be called once at application startup, before any metrics are recorded.
pub fn register_booking_metrics() {
    describe_counter!(
        "booking_transitions_total",
        "Total number of committed status transitions by target status"
    );
    describe_counter!(
        "booking_transition_rejections_total",
        "Total number of refused status transitions by reason"
    );
    describe_counter!(
        "booking_concurrent_modifications_total",
        "Total number of saves rejected because another writer committed first"
    );
    describe_counter!(
        "booking_bulk_items_total",
        "Total number of bulk transition items by outcome (succeeded, failed)"
    );
    describe_counter!(
        "booking_addon_conflicts_total",
        "Total number of add-on selections refused as mutually exclusive"
    );
    describe_counter!(
        "booking_store_version_conflicts_total",
        "Total number of conditional booking updates rejected by the database"
    );
    describe_histogram!(
        "booking_addon_quote_cents",
        "Subtotal of add-on quotes in cents"
    );

    tracing::info!("Booking metrics registered");
}

// ============================================================================
// Metric Recording Functions
// ============================================================================

/// Record a committed transition.
pub fn record_transition(to: BookingStatus) {
    metrics::counter!("booking_transitions_total", "to" => to.as_str()).increment(1);
}

/// Record a refused transition.
///
/// # Arguments
///
/// * `reason` - Error kind (e.g., `illegal_transition`, `not_found`)
pub fn record_transition_rejected(reason: &'static str) {
    metrics::counter!("booking_transition_rejections_total", "reason" => reason).increment(1);
}

/// Record a lost optimistic concurrency race.
pub fn record_concurrent_modification() {
    metrics::counter!("booking_concurrent_modifications_total").increment(1);
}

/// Record the outcome of one bulk item.
pub fn record_bulk_item(succeeded: bool) {
    let outcome = if succeeded { "succeeded" } else { "failed" };
    metrics::counter!("booking_bulk_items_total", "outcome" => outcome).increment(1);
}

/// Record an incompatible add-on selection.
pub fn record_addon_conflict() {
    metrics::counter!("booking_addon_conflicts_total").increment(1);
}

/// Record a quote subtotal.
#[allow(clippy::cast_precision_loss)] // Histogram values are approximate by nature
pub fn record_quote(subtotal_cents: u64) {
    metrics::histogram!("booking_addon_quote_cents").record(subtotal_cents as f64);
}
