//! Errors raised by lifecycle and add-on operations.

use crate::addon::{AddOnType, ExclusionGroup};
use crate::booking::PatchError;
use crate::status::BookingStatus;
use crate::store::StoreError;
use crate::types::{BookingId, Currency};
use thiserror::Error;

fn list_statuses(statuses: &[BookingStatus]) -> String {
    if statuses.is_empty() {
        return "none (terminal status)".to_string();
    }
    statuses
        .iter()
        .map(|s| s.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Errors from status transitions and coordinator assignment.
#[derive(Error, Debug)]
pub enum LifecycleError {
    /// Booking does not exist.
    #[error("Booking not found: {0}")]
    NotFound(BookingId),

    /// The stored status is not part of the transition table.
    #[error("Booking {booking_id} has unrecognised status {status:?}")]
    InvalidCurrentState {
        /// Booking id
        booking_id: BookingId,
        /// The raw stored status
        status: String,
    },

    /// The target status is not reachable from the current one.
    ///
    /// `allowed` always lists the legal next states so callers can correct
    /// the request without another round trip.
    #[error(
        "Cannot move booking {booking_id} from {from} to {to}; valid next states: {}",
        list_statuses(.allowed)
    )]
    IllegalTransition {
        /// Booking id
        booking_id: BookingId,
        /// Current status
        from: BookingStatus,
        /// Requested status
        to: BookingStatus,
        /// Legal next states
        allowed: Vec<BookingStatus>,
    },

    /// Another writer changed the booking between read and write. Retryable.
    #[error("Booking {booking_id} was modified concurrently; retry the request")]
    ConcurrentModification {
        /// Booking id
        booking_id: BookingId,
    },

    /// The request itself is malformed.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// A planned change would break a booking invariant.
    #[error("Invariant violation: {0}")]
    Patch(#[from] PatchError),

    /// Storage failure.
    #[error("Storage error: {0}")]
    Store(StoreError),
}

impl LifecycleError {
    /// Whether retrying the same request may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::ConcurrentModification { .. })
    }

    /// Short, stable label used in logs and metrics.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::InvalidCurrentState { .. } => "invalid_current_state",
            Self::IllegalTransition { .. } => "illegal_transition",
            Self::ConcurrentModification { .. } => "concurrent_modification",
            Self::InvalidRequest(_) => "invalid_request",
            Self::Patch(_) => "invariant_violation",
            Self::Store(_) => "store",
        }
    }
}

impl From<StoreError> for LifecycleError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::VersionConflict { booking_id, .. } => {
                Self::ConcurrentModification { booking_id }
            }
            StoreError::UndecodableStatus { booking_id, status } => {
                Self::InvalidCurrentState { booking_id, status }
            }
            StoreError::NotFound(booking_id) => Self::NotFound(booking_id),
            other => Self::Store(other),
        }
    }
}

/// Errors from add-on validation, pricing and application.
#[derive(Error, Debug)]
pub enum AddOnError {
    /// Two selected add-ons share a mutual-exclusion group.
    #[error("Add-ons {first} and {second} cannot be combined (both in {group})")]
    ConflictingAddOns {
        /// Earlier selection
        first: AddOnType,
        /// Later selection
        second: AddOnType,
        /// Group both belong to
        group: ExclusionGroup,
    },

    /// No catalog definition exists for the type.
    #[error("Unknown add-on type: {0}")]
    UnknownAddOnType(AddOnType),

    /// The definition exists but is switched off.
    #[error("Add-on {0} is not currently available")]
    InactiveAddOn(AddOnType),

    /// Lines of one booking must share a currency.
    #[error("Add-on {add_on_type} is priced in {found}, booking uses {expected}")]
    CurrencyMismatch {
        /// Offending add-on
        add_on_type: AddOnType,
        /// Booking currency
        expected: Currency,
        /// Add-on currency
        found: Currency,
    },

    /// Quantity outside the accepted range.
    #[error("Quantity {quantity} for {add_on_type} exceeds the maximum of {max}")]
    InvalidQuantity {
        /// Offending add-on
        add_on_type: AddOnType,
        /// Requested quantity
        quantity: u32,
        /// Upper bound
        max: u32,
    },

    /// Price arithmetic overflowed.
    #[error("Price overflow while pricing {0}")]
    PriceOverflow(AddOnType),

    /// Selections cannot change once a booking is closed.
    #[error("Add-ons of booking {booking_id} are locked in status {status}")]
    AddOnsLocked {
        /// Booking id
        booking_id: BookingId,
        /// Current status
        status: BookingStatus,
    },

    /// Booking does not exist.
    #[error("Booking not found: {0}")]
    BookingNotFound(BookingId),

    /// Another writer changed the booking between read and write. Retryable.
    #[error("Booking {booking_id} was modified concurrently; retry the request")]
    ConcurrentModification {
        /// Booking id
        booking_id: BookingId,
    },

    /// A planned change would break a booking invariant.
    #[error("Invariant violation: {0}")]
    Patch(#[from] PatchError),

    /// Storage failure.
    #[error("Storage error: {0}")]
    Store(StoreError),
}

impl AddOnError {
    /// Whether retrying the same request may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::ConcurrentModification { .. })
    }
}

impl From<StoreError> for AddOnError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::VersionConflict { booking_id, .. } => {
                Self::ConcurrentModification { booking_id }
            }
            StoreError::NotFound(booking_id) => Self::BookingNotFound(booking_id),
            other => Self::Store(other),
        }
    }
}
