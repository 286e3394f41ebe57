//! Storage abstractions the booking services depend on.
//!
//! Persistence is external to the domain. Services only ever see these three
//! traits:
//!
//! - [`BookingStore`]: load and save bookings with optimistic concurrency
//! - [`AuditSink`]: append-only status history (status changes write theirs
//!   through [`BookingStore::save_with_history`])
//! - [`CatalogStore`]: read-only add-on definitions
//!
//! # Implementations
//!
//! - `PostgresBookingStore` (in `medtour-postgres`): Production implementation
//! - `InMemoryBookingStore` (in `medtour-testing`): Fast, deterministic testing
//!
//! # Dyn Compatibility
//!
//! Methods return `Pin<Box<dyn Future>>` instead of using `async fn` so the
//! traits can be used as `Arc<dyn BookingStore>`.

use crate::addon::{AddOnDefinition, AddOnType};
use crate::booking::Booking;
use crate::history::StatusHistoryEntry;
use crate::types::{BookingId, HospitalId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Boxed future returned by store methods.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + Send + 'a>>;

/// Errors that can occur during store operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Optimistic concurrency conflict: the stored version moved since the read.
    #[error("Concurrency conflict on booking {booking_id}: expected version {expected}, found {actual}")]
    VersionConflict {
        /// Booking being saved
        booking_id: BookingId,
        /// Version the writer read
        expected: u64,
        /// Version currently stored
        actual: u64,
    },

    /// Booking does not exist.
    #[error("Booking not found: {0}")]
    NotFound(BookingId),

    /// Booking already exists.
    #[error("Booking already exists: {0}")]
    AlreadyExists(BookingId),

    /// A stored row carries a status this build does not know.
    #[error("Booking {booking_id} has undecodable status {status:?}")]
    UndecodableStatus {
        /// Booking id
        booking_id: BookingId,
        /// Raw status text
        status: String,
    },

    /// Database connection or query error.
    #[error("Database error: {0}")]
    Database(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// A booking's status exactly as stored, before decoding.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredStatus {
    /// Booking id
    pub booking_id: BookingId,
    /// Raw status text
    pub status: String,
}

/// Narrows a booking listing.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingFilter {
    /// Only bookings at this hospital
    pub hospital_id: Option<HospitalId>,
    /// Created at or after (inclusive)
    pub created_from: Option<DateTime<Utc>>,
    /// Created before (exclusive)
    pub created_to: Option<DateTime<Utc>>,
}

impl BookingFilter {
    /// Whether `booking` passes the filter.
    #[must_use]
    pub fn matches(&self, booking: &Booking) -> bool {
        self.hospital_id.is_none_or(|h| booking.hospital_id == h)
            && self.created_from.is_none_or(|from| booking.created_at >= from)
            && self.created_to.is_none_or(|to| booking.created_at < to)
    }
}

/// Booking persistence with compare-and-swap saves.
pub trait BookingStore: Send + Sync {
    /// Load a booking.
    ///
    /// # Errors
    ///
    /// - `UndecodableStatus`: the stored status is not a known [`BookingStatus`](crate::status::BookingStatus)
    /// - `Database`: query failed
    fn find(&self, id: BookingId) -> StoreFuture<'_, Option<Booking>>;

    /// Insert a new booking at version 0.
    ///
    /// # Errors
    ///
    /// - `AlreadyExists`: a booking with this id exists
    /// - `Database`: query failed
    fn insert(&self, booking: Booking) -> StoreFuture<'_, Booking>;

    /// Save a booking if the stored version still equals `expected_version`.
    ///
    /// On success the stored booking has `version == expected_version + 1`
    /// and is returned.
    ///
    /// # Errors
    ///
    /// - `VersionConflict`: another writer committed first
    /// - `NotFound`: no such booking
    /// - `Database`: query failed
    fn save(&self, booking: Booking, expected_version: u64) -> StoreFuture<'_, Booking>;

    /// Save a booking and append its history entry as one unit.
    ///
    /// Either both the change and `entry` are committed or neither is, so a
    /// status change never exists without its audit record. Entries written
    /// here are visible through the [`AuditSink`] backed by the same storage.
    ///
    /// # Errors
    ///
    /// - `VersionConflict`, `NotFound`: as for [`save`](Self::save)
    /// - `Database`: the update or the history insert failed; nothing was committed
    fn save_with_history(
        &self,
        booking: Booking,
        expected_version: u64,
        entry: StatusHistoryEntry,
    ) -> StoreFuture<'_, Booking>;

    /// List bookings passing `filter`.
    ///
    /// # Errors
    ///
    /// - `UndecodableStatus`, `Database`
    fn list(&self, filter: BookingFilter) -> StoreFuture<'_, Vec<Booking>>;

    /// Raw statuses of the bookings passing `filter`.
    ///
    /// Unlike [`list`](Self::list) this never fails on an unknown status, so
    /// reporting can count such rows instead of aborting.
    ///
    /// # Errors
    ///
    /// - `Database`: query failed
    fn list_statuses(&self, filter: BookingFilter) -> StoreFuture<'_, Vec<StoredStatus>>;
}

/// Append-only audit trail of status changes.
pub trait AuditSink: Send + Sync {
    /// Append an entry. Entries are never updated or deleted.
    ///
    /// # Errors
    ///
    /// - `Database`: insert failed
    fn append(&self, entry: StatusHistoryEntry) -> StoreFuture<'_, ()>;

    /// All entries of a booking, newest first.
    ///
    /// # Errors
    ///
    /// - `Database`: query failed
    fn history(&self, booking_id: BookingId) -> StoreFuture<'_, Vec<StatusHistoryEntry>>;
}

/// Read-only add-on catalog.
pub trait CatalogStore: Send + Sync {
    /// Look up a definition.
    ///
    /// # Errors
    ///
    /// - `Database`: query failed
    fn find_add_on(&self, add_on_type: AddOnType) -> StoreFuture<'_, Option<AddOnDefinition>>;

    /// Every definition, active or not.
    ///
    /// # Errors
    ///
    /// - `Database`: query failed
    fn list_add_ons(&self) -> StoreFuture<'_, Vec<AddOnDefinition>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Currency, PatientId, TreatmentId};
    use chrono::Duration;

    #[test]
    fn version_conflict_display() {
        let error = StoreError::VersionConflict {
            booking_id: BookingId::new(),
            expected: 5,
            actual: 7,
        };

        let display = format!("{error}");
        assert!(display.contains("expected version 5"));
        assert!(display.contains("found 7"));
    }

    #[test]
    fn filter_bounds_are_half_open() {
        let now = Utc::now();
        let hospital = HospitalId::new();
        let booking = Booking::new(
            PatientId::new(),
            hospital,
            TreatmentId::new(),
            Currency::usd(),
            now,
        );

        let inclusive_from = BookingFilter {
            hospital_id: Some(hospital),
            created_from: Some(now),
            created_to: Some(now + Duration::seconds(1)),
        };
        assert!(inclusive_from.matches(&booking));

        let exclusive_to = BookingFilter {
            created_to: Some(now),
            ..BookingFilter::default()
        };
        assert!(!exclusive_to.matches(&booking));

        let other_hospital = BookingFilter {
            hospital_id: Some(HospitalId::new()),
            ..BookingFilter::default()
        };
        assert!(!other_hospital.matches(&booking));
    }
}
