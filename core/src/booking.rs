//! The booking aggregate and the typed patch that is the only way to change it.
//!
//! Lifecycle decisions are pure: [`Booking::plan_transition`] inspects the
//! current state and returns a [`BookingPatch`] naming exactly the fields the
//! change touches. Persisting the patched booking is the caller's job.

use crate::addon::{BookingAddOnSelection, SelectionStatus};
use crate::error::LifecycleError;
use crate::history::Actor;
use crate::status::BookingStatus;
use crate::types::{BookingId, CoordinatorId, Currency, HospitalId, PatientId, TreatmentId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Reason recorded when a booking is cancelled without one.
pub const DEFAULT_CANCELLATION_REASON: &str = "No reason provided";

/// Why, by whom and when a booking was cancelled.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cancellation {
    /// Cancellation reason
    pub reason: String,
    /// Who cancelled
    pub cancelled_by: Actor,
    /// When
    pub cancelled_at: DateTime<Utc>,
}

/// A medical-tourism booking.
///
/// Invariants:
/// - `cancellation` is `Some` if and only if `status == Cancelled`
/// - `confirmed_date` is set once, on the first entry into `Accepted`
/// - `completion_date` is set once, on the first entry into `Completed`
/// - `version` increases by one on every committed save
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    /// Booking id
    pub id: BookingId,
    /// Patient being treated
    pub patient_id: PatientId,
    /// Treating hospital
    pub hospital_id: HospitalId,
    /// Booked treatment
    pub treatment_id: TreatmentId,
    /// Current lifecycle status
    pub status: BookingStatus,
    /// Free-form descriptor refining the status
    pub sub_status: Option<String>,
    /// Assigned coordinator
    pub coordinator_id: Option<CoordinatorId>,
    /// Present only for cancelled bookings
    pub cancellation: Option<Cancellation>,
    /// First entry into `Accepted`
    pub confirmed_date: Option<DateTime<Utc>>,
    /// First entry into `Completed`
    pub completion_date: Option<DateTime<Utc>>,
    /// Currency every add-on line must use
    pub currency: Currency,
    /// Selected add-ons
    pub add_ons: Vec<BookingAddOnSelection>,
    /// When the booking was created
    pub created_at: DateTime<Utc>,
    /// When the booking last changed
    pub updated_at: DateTime<Utc>,
    /// Optimistic concurrency version
    pub version: u64,
}

impl Booking {
    /// Creates a booking in `Requested`.
    #[must_use]
    pub fn new(
        patient_id: PatientId,
        hospital_id: HospitalId,
        treatment_id: TreatmentId,
        currency: Currency,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: BookingId::new(),
            patient_id,
            hospital_id,
            treatment_id,
            status: BookingStatus::Requested,
            sub_status: None,
            coordinator_id: None,
            cancellation: None,
            confirmed_date: None,
            completion_date: None,
            currency,
            add_ons: Vec::new(),
            created_at: now,
            updated_at: now,
            version: 0,
        }
    }

    /// Plans a status change, including its side effects.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::IllegalTransition`] listing the legal
    /// alternatives when `target` is not reachable from the current status.
    pub fn plan_transition(
        &self,
        target: BookingStatus,
        actor: Actor,
        reason: Option<&str>,
        sub_status: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<BookingPatch, LifecycleError> {
        if !self.status.can_transition_to(target) {
            return Err(LifecycleError::IllegalTransition {
                booking_id: self.id,
                from: self.status,
                to: target,
                allowed: self.status.allowed_next_states().to_vec(),
            });
        }

        let mut patch = BookingPatch::at(now);
        patch.status = Some(target);
        patch.sub_status = sub_status;

        match target {
            BookingStatus::Cancelled => {
                patch.cancellation = Some(Cancellation {
                    reason: reason.unwrap_or(DEFAULT_CANCELLATION_REASON).to_string(),
                    cancelled_by: actor,
                    cancelled_at: now,
                });
                patch.add_ons = self.add_ons_moved(
                    |s| matches!(s, SelectionStatus::Pending | SelectionStatus::Confirmed),
                    SelectionStatus::Cancelled,
                );
            }
            BookingStatus::Accepted if self.confirmed_date.is_none() => {
                patch.confirmed_date = Some(now);
            }
            BookingStatus::Completed if self.completion_date.is_none() => {
                patch.completion_date = Some(now);
            }
            BookingStatus::PaymentReceived => {
                patch.add_ons = self.add_ons_moved(
                    |s| s == SelectionStatus::Pending,
                    SelectionStatus::Confirmed,
                );
            }
            _ => {}
        }

        Ok(patch)
    }

    /// Plans a coordinator change. The status is left untouched.
    #[must_use]
    pub fn plan_coordinator_assignment(
        &self,
        coordinator_id: CoordinatorId,
        now: DateTime<Utc>,
    ) -> BookingPatch {
        let mut patch = BookingPatch::at(now);
        patch.coordinator_id = Some(coordinator_id);
        patch
    }

    /// Plans replacing the add-on selections.
    #[must_use]
    pub fn plan_add_ons(
        &self,
        add_ons: Vec<BookingAddOnSelection>,
        now: DateTime<Utc>,
    ) -> BookingPatch {
        let mut patch = BookingPatch::at(now);
        patch.add_ons = Some(add_ons);
        patch
    }

    fn add_ons_moved(
        &self,
        from: impl Fn(SelectionStatus) -> bool,
        to: SelectionStatus,
    ) -> Option<Vec<BookingAddOnSelection>> {
        if !self.add_ons.iter().any(|s| from(s.status)) {
            return None;
        }
        Some(
            self.add_ons
                .iter()
                .cloned()
                .map(|mut s| {
                    if from(s.status) {
                        s.status = to;
                    }
                    s
                })
                .collect(),
        )
    }
}

/// A patch that violates a booking invariant.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PatchError {
    /// Cancellation fields must be present exactly when the status is `cancelled`.
    #[error("Cancellation fields do not match resulting status {status}")]
    CancellationMismatch {
        /// Status the patch would leave the booking in
        status: BookingStatus,
    },

    /// A set-once timestamp would be overwritten.
    #[error("{field} is already set and cannot be overwritten")]
    TimestampAlreadySet {
        /// Name of the timestamp field
        field: &'static str,
    },
}

/// The fields a lifecycle operation may change. `None` leaves a field as is.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BookingPatch {
    /// New status
    pub status: Option<BookingStatus>,
    /// New sub-status
    pub sub_status: Option<String>,
    /// New coordinator
    pub coordinator_id: Option<CoordinatorId>,
    /// Cancellation details
    pub cancellation: Option<Cancellation>,
    /// Confirmation timestamp
    pub confirmed_date: Option<DateTime<Utc>>,
    /// Completion timestamp
    pub completion_date: Option<DateTime<Utc>>,
    /// Replacement add-on list
    pub add_ons: Option<Vec<BookingAddOnSelection>>,
    /// Modification time
    pub updated_at: DateTime<Utc>,
}

impl BookingPatch {
    /// An empty patch stamped with `now`
    #[must_use]
    pub const fn at(now: DateTime<Utc>) -> Self {
        Self {
            status: None,
            sub_status: None,
            coordinator_id: None,
            cancellation: None,
            confirmed_date: None,
            completion_date: None,
            add_ons: None,
            updated_at: now,
        }
    }

    /// Checks the patch against `booking` without changing anything.
    ///
    /// # Errors
    ///
    /// Returns [`PatchError`] if applying the patch would break an invariant.
    pub fn validate(&self, booking: &Booking) -> Result<(), PatchError> {
        let status = self.status.unwrap_or(booking.status);
        let cancelled = self.cancellation.is_some() || booking.cancellation.is_some();
        if cancelled != (status == BookingStatus::Cancelled) {
            return Err(PatchError::CancellationMismatch { status });
        }
        if self.confirmed_date.is_some() && booking.confirmed_date.is_some() {
            return Err(PatchError::TimestampAlreadySet {
                field: "confirmed_date",
            });
        }
        if self.completion_date.is_some() && booking.completion_date.is_some() {
            return Err(PatchError::TimestampAlreadySet {
                field: "completion_date",
            });
        }
        Ok(())
    }

    /// Validates, then applies the patch to a copy of `booking`.
    ///
    /// # Errors
    ///
    /// Returns [`PatchError`] if applying the patch would break an invariant.
    pub fn apply(self, booking: &Booking) -> Result<Booking, PatchError> {
        self.validate(booking)?;

        let mut next = booking.clone();
        if let Some(status) = self.status {
            next.status = status;
        }
        if let Some(sub_status) = self.sub_status {
            next.sub_status = Some(sub_status);
        }
        if let Some(coordinator_id) = self.coordinator_id {
            next.coordinator_id = Some(coordinator_id);
        }
        if let Some(cancellation) = self.cancellation {
            next.cancellation = Some(cancellation);
        }
        if let Some(confirmed) = self.confirmed_date {
            next.confirmed_date = Some(confirmed);
        }
        if let Some(completed) = self.completion_date {
            next.completion_date = Some(completed);
        }
        if let Some(add_ons) = self.add_ons {
            next.add_ons = add_ons;
        }
        next.updated_at = self.updated_at;
        Ok(next)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::addon::AddOnType;
    use crate::types::{Money, SelectionId};
    use chrono::TimeZone;

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, hour, 0, 0).unwrap()
    }

    fn booking() -> Booking {
        Booking::new(
            PatientId::new(),
            HospitalId::new(),
            TreatmentId::new(),
            Currency::usd(),
            at(0),
        )
    }

    fn selection(status: SelectionStatus) -> BookingAddOnSelection {
        BookingAddOnSelection {
            id: SelectionId::new(),
            add_on_type: AddOnType::ServiceInterpreter,
            quantity: 1,
            unit_price: Money::from_cents(100),
            total_price: Money::from_cents(100),
            discount: Money::ZERO,
            final_price: Money::from_cents(100),
            currency: Currency::usd(),
            status,
            selected_at: at(0),
        }
    }

    #[test]
    fn illegal_transition_lists_alternatives() {
        let err = booking()
            .plan_transition(BookingStatus::Completed, Actor::system(), None, None, at(1))
            .unwrap_err();
        match err {
            LifecycleError::IllegalTransition { from, to, allowed, .. } => {
                assert_eq!(from, BookingStatus::Requested);
                assert_eq!(to, BookingStatus::Completed);
                assert_eq!(
                    allowed,
                    vec![
                        BookingStatus::UnderReview,
                        BookingStatus::Rejected,
                        BookingStatus::Cancelled
                    ]
                );
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn cancellation_fills_fields_and_cancels_selections() {
        let mut b = booking();
        b.add_ons = vec![
            selection(SelectionStatus::Pending),
            selection(SelectionStatus::Refunded),
        ];

        let patch = b
            .plan_transition(BookingStatus::Cancelled, Actor::system(), None, None, at(2))
            .unwrap();
        let next = patch.apply(&b).unwrap();

        let cancellation = next.cancellation.unwrap();
        assert_eq!(cancellation.reason, DEFAULT_CANCELLATION_REASON);
        assert_eq!(cancellation.cancelled_at, at(2));
        assert_eq!(next.add_ons[0].status, SelectionStatus::Cancelled);
        assert_eq!(next.add_ons[1].status, SelectionStatus::Refunded);
    }

    #[test]
    fn confirmed_date_set_on_first_acceptance_only() {
        let mut b = booking();
        b.status = BookingStatus::UnderReview;
        let next = b
            .plan_transition(BookingStatus::Accepted, Actor::system(), None, None, at(3))
            .unwrap()
            .apply(&b)
            .unwrap();
        assert_eq!(next.confirmed_date, Some(at(3)));

        // A booking that already carries a confirmation keeps it.
        let mut revisited = next.clone();
        revisited.status = BookingStatus::UnderReview;
        let again = revisited
            .plan_transition(BookingStatus::Accepted, Actor::system(), None, None, at(9))
            .unwrap();
        assert_eq!(again.confirmed_date, None);
        assert_eq!(again.apply(&revisited).unwrap().confirmed_date, Some(at(3)));
    }

    #[test]
    fn payment_received_confirms_pending_selections() {
        let mut b = booking();
        b.status = BookingStatus::ConfirmationSent;
        b.add_ons = vec![selection(SelectionStatus::Pending)];
        let next = b
            .plan_transition(BookingStatus::PaymentReceived, Actor::system(), None, None, at(4))
            .unwrap()
            .apply(&b)
            .unwrap();
        assert_eq!(next.add_ons[0].status, SelectionStatus::Confirmed);
    }

    #[test]
    fn patch_rejects_cancellation_without_cancelled_status() {
        let b = booking();
        let mut patch = BookingPatch::at(at(5));
        patch.cancellation = Some(Cancellation {
            reason: "x".into(),
            cancelled_by: Actor::system(),
            cancelled_at: at(5),
        });
        assert_eq!(
            patch.apply(&b),
            Err(PatchError::CancellationMismatch {
                status: BookingStatus::Requested
            })
        );
    }

    #[test]
    fn patch_refuses_to_overwrite_completion_date() {
        let mut b = booking();
        b.completion_date = Some(at(1));
        let mut patch = BookingPatch::at(at(6));
        patch.completion_date = Some(at(6));
        assert_eq!(
            patch.validate(&b),
            Err(PatchError::TimestampAlreadySet {
                field: "completion_date"
            })
        );
    }
}
