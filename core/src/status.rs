//! Booking statuses and the fixed transition table between them.
//!
//! The table is a `match` expression over a closed enum, so there is no
//! runtime path that can add, remove or reorder a transition. Terminal
//! statuses map to an empty slice.
//!
//! ```text
//! requested ─▶ under_review ─▶ accepted ─▶ quotation_sent ─▶ payment_details
//!     │             │                                              │
//!     ▼             ▼                                              ▼
//!  rejected      rejected                                 confirmation_sent
//!                                                                  │
//!   ... ─▶ payment_received ─▶ confirmation_completed ─▶ invoice_sent ─▶ ...
//!
//!   ... ─▶ travel_arrangements ─▶ consultation_scheduled ─▶ in_progress
//!                                                              │
//!                                      completed ◀─────────────┘
//!                                          │
//!                                          ▼
//!                                  feedback_received
//! ```
//!
//! Every non-terminal status before `completed` may also move to `cancelled`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Lifecycle status of a booking.
///
/// The declaration order is the lifecycle order and is used when statuses are
/// reported side by side (statistics, valid-transition listings).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    /// Patient submitted the booking
    Requested,
    /// Staff is reviewing the request
    UnderReview,
    /// Hospital accepted the patient
    Accepted,
    /// Quotation sent to the patient
    QuotationSent,
    /// Payment instructions shared
    PaymentDetails,
    /// Confirmation sent, awaiting payment
    ConfirmationSent,
    /// Payment received
    PaymentReceived,
    /// Booking fully confirmed
    ConfirmationCompleted,
    /// Invoice issued
    InvoiceSent,
    /// Travel and stay being arranged
    TravelArrangements,
    /// Consultation date fixed
    ConsultationScheduled,
    /// Treatment under way
    InProgress,
    /// Treatment finished
    Completed,
    /// Patient left feedback
    FeedbackReceived,
    /// Request turned down
    Rejected,
    /// Booking cancelled
    Cancelled,
}

/// Error returned when a status name is not part of the lifecycle.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unknown booking status: {0}")]
pub struct UnknownStatus(pub String);

impl BookingStatus {
    /// Every status, in lifecycle order.
    pub const ALL: [Self; 16] = [
        Self::Requested,
        Self::UnderReview,
        Self::Accepted,
        Self::QuotationSent,
        Self::PaymentDetails,
        Self::ConfirmationSent,
        Self::PaymentReceived,
        Self::ConfirmationCompleted,
        Self::InvoiceSent,
        Self::TravelArrangements,
        Self::ConsultationScheduled,
        Self::InProgress,
        Self::Completed,
        Self::FeedbackReceived,
        Self::Rejected,
        Self::Cancelled,
    ];

    /// Statuses this status may legally move to next.
    #[must_use]
    pub const fn allowed_next_states(self) -> &'static [Self] {
        use BookingStatus::{
            Accepted, Cancelled, Completed, ConfirmationCompleted, ConfirmationSent,
            ConsultationScheduled, FeedbackReceived, InProgress, InvoiceSent, PaymentDetails,
            PaymentReceived, QuotationSent, Rejected, Requested, TravelArrangements, UnderReview,
        };

        match self {
            Requested => &[UnderReview, Rejected, Cancelled],
            UnderReview => &[Accepted, Rejected, Cancelled],
            Accepted => &[QuotationSent, Cancelled],
            QuotationSent => &[PaymentDetails, Cancelled],
            PaymentDetails => &[ConfirmationSent, Cancelled],
            ConfirmationSent => &[PaymentReceived, Cancelled],
            PaymentReceived => &[ConfirmationCompleted, Cancelled],
            ConfirmationCompleted => &[InvoiceSent, Cancelled],
            InvoiceSent => &[TravelArrangements, Cancelled],
            TravelArrangements => &[ConsultationScheduled, Cancelled],
            ConsultationScheduled => &[InProgress, Cancelled],
            InProgress => &[Completed, Cancelled],
            Completed => &[FeedbackReceived],
            FeedbackReceived | Rejected | Cancelled => &[],
        }
    }

    /// Whether `target` is reachable from this status in one step.
    #[must_use]
    pub fn can_transition_to(self, target: Self) -> bool {
        self.allowed_next_states().contains(&target)
    }

    /// Whether no transition leaves this status.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        self.allowed_next_states().is_empty()
    }

    /// Whether add-on selections may no longer change.
    #[must_use]
    pub const fn is_closed(self) -> bool {
        matches!(
            self,
            Self::Completed | Self::FeedbackReceived | Self::Cancelled | Self::Rejected
        )
    }

    /// Wire name used in storage and APIs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Requested => "requested",
            Self::UnderReview => "under_review",
            Self::Accepted => "accepted",
            Self::QuotationSent => "quotation_sent",
            Self::PaymentDetails => "payment_details",
            Self::ConfirmationSent => "confirmation_sent",
            Self::PaymentReceived => "payment_received",
            Self::ConfirmationCompleted => "confirmation_completed",
            Self::InvoiceSent => "invoice_sent",
            Self::TravelArrangements => "travel_arrangements",
            Self::ConsultationScheduled => "consultation_scheduled",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::FeedbackReceived => "feedback_received",
            Self::Rejected => "rejected",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BookingStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| UnknownStatus(s.to_string()))
    }
}
