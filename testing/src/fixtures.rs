//! Builders for bookings and history entries in arbitrary states.

use crate::mocks::test_clock;
use chrono::{DateTime, Duration, Utc};
use medtour_core::environment::Clock;
use medtour_core::{
    Actor, Booking, BookingAddOnSelection, BookingStatus, Cancellation, ClientMetadata, Currency,
    HistoryEntryId, HospitalId, PatientId, StatusHistoryEntry, TreatmentId,
};

/// Builds a [`Booking`] that satisfies the status invariants for whatever
/// status it is put in.
///
/// # Example
///
/// ```
/// use medtour_testing::BookingBuilder;
/// use medtour_core::BookingStatus;
///
/// let booking = BookingBuilder::new().status(BookingStatus::Cancelled).build();
/// assert!(booking.cancellation.is_some());
/// ```
#[derive(Clone, Debug)]
pub struct BookingBuilder {
    status: BookingStatus,
    hospital_id: HospitalId,
    currency: Currency,
    created_at: DateTime<Utc>,
    add_ons: Vec<BookingAddOnSelection>,
}

impl Default for BookingBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl BookingBuilder {
    /// A `Requested` booking in USD created at the test clock's time
    #[must_use]
    pub fn new() -> Self {
        Self {
            status: BookingStatus::Requested,
            hospital_id: HospitalId::new(),
            currency: Currency::usd(),
            created_at: test_clock().now(),
            add_ons: Vec::new(),
        }
    }

    /// Set the status
    #[must_use]
    pub const fn status(mut self, status: BookingStatus) -> Self {
        self.status = status;
        self
    }

    /// Set the hospital
    #[must_use]
    pub const fn hospital(mut self, hospital_id: HospitalId) -> Self {
        self.hospital_id = hospital_id;
        self
    }

    /// Set the currency
    #[must_use]
    pub fn currency(mut self, currency: Currency) -> Self {
        self.currency = currency;
        self
    }

    /// Set the creation time
    #[must_use]
    pub const fn created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    /// Attach add-on selections
    #[must_use]
    pub fn add_ons(mut self, add_ons: Vec<BookingAddOnSelection>) -> Self {
        self.add_ons = add_ons;
        self
    }

    /// Build the booking
    #[must_use]
    pub fn build(self) -> Booking {
        let mut booking = Booking::new(
            PatientId::new(),
            self.hospital_id,
            TreatmentId::new(),
            self.currency,
            self.created_at,
        );
        booking.status = self.status;
        booking.add_ons = self.add_ons;

        let index = BookingStatus::ALL
            .iter()
            .position(|s| *s == self.status)
            .unwrap_or(0);
        let accepted = BookingStatus::ALL
            .iter()
            .position(|s| *s == BookingStatus::Accepted)
            .unwrap_or(usize::MAX);
        let completed = BookingStatus::ALL
            .iter()
            .position(|s| *s == BookingStatus::Completed)
            .unwrap_or(usize::MAX);

        // Statuses after `completed` in `ALL` are the rejected/cancelled exits.
        let on_main_path = index <= completed + 1;
        if on_main_path && index >= accepted {
            booking.confirmed_date = Some(self.created_at + Duration::hours(1));
        }
        if on_main_path && index >= completed {
            booking.completion_date = Some(self.created_at + Duration::hours(2));
        }
        if self.status == BookingStatus::Cancelled {
            booking.cancellation = Some(Cancellation {
                reason: "fixture".to_string(),
                cancelled_by: Actor::system(),
                cancelled_at: self.created_at + Duration::hours(1),
            });
        }
        booking
    }

    /// History entries walking `booking` from its status through `path`,
    /// one minute apart.
    #[must_use]
    pub fn history_chain(booking: &Booking, path: &[BookingStatus]) -> Vec<StatusHistoryEntry> {
        let mut from = booking.status;
        path.iter()
            .enumerate()
            .map(|(i, to)| {
                let entry = StatusHistoryEntry {
                    id: HistoryEntryId::new(),
                    booking_id: booking.id,
                    from_status: from,
                    to_status: *to,
                    actor: Actor::system(),
                    reason: None,
                    notes: None,
                    client: ClientMetadata::default(),
                    created_at: booking.created_at
                        + Duration::minutes(i64::try_from(i).unwrap_or(0) + 1),
                };
                from = *to;
                entry
            })
            .collect()
    }
}
