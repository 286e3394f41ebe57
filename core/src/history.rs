//! Audit records for booking status changes.

use crate::status::BookingStatus;
use crate::types::{BookingId, HistoryEntryId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Who performed a change.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorKind {
    /// Automated process
    System,
    /// Coordinator, admin or other staff
    Staff,
    /// The patient themselves
    Patient,
}

impl ActorKind {
    /// Wire name used in storage.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::System => "system",
            Self::Staff => "staff",
            Self::Patient => "patient",
        }
    }

    /// Parses the wire name.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "system" => Some(Self::System),
            "staff" => Some(Self::Staff),
            "patient" => Some(Self::Patient),
            _ => None,
        }
    }
}

impl fmt::Display for ActorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The identity behind a change. System actors have no user id.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    /// Acting user, if any
    pub id: Option<UserId>,
    /// Kind of actor
    pub kind: ActorKind,
}

impl Actor {
    /// An automated actor
    #[must_use]
    pub const fn system() -> Self {
        Self {
            id: None,
            kind: ActorKind::System,
        }
    }

    /// A staff member
    #[must_use]
    pub const fn staff(id: UserId) -> Self {
        Self {
            id: Some(id),
            kind: ActorKind::Staff,
        }
    }

    /// A patient
    #[must_use]
    pub const fn patient(id: UserId) -> Self {
        Self {
            id: Some(id),
            kind: ActorKind::Patient,
        }
    }
}

/// Network metadata of the request that caused a change.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientMetadata {
    /// Client IP address (if available)
    pub ip_address: Option<String>,
    /// Client user agent (if available)
    pub user_agent: Option<String>,
}

/// One immutable row of a booking's status history.
///
/// `from_status` is the booking's status immediately before the change. For
/// coordinator assignment `from_status == to_status`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusHistoryEntry {
    /// Entry id
    pub id: HistoryEntryId,
    /// Booking the entry belongs to
    pub booking_id: BookingId,
    /// Status before the change
    pub from_status: BookingStatus,
    /// Status after the change
    pub to_status: BookingStatus,
    /// Who made the change
    pub actor: Actor,
    /// Why
    pub reason: Option<String>,
    /// Free-text notes
    pub notes: Option<String>,
    /// Request metadata
    pub client: ClientMetadata,
    /// When the entry was written
    pub created_at: DateTime<Utc>,
}

impl StatusHistoryEntry {
    /// Whether the entry records a change that left the status unchanged.
    #[must_use]
    pub fn is_self_transition(&self) -> bool {
        self.from_status == self.to_status
    }
}
