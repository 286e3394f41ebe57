//! Entries for the append-only status history, and the reader for it.
//!
//! Entries are built here but written by
//! [`BookingStore::save_with_history`](medtour_core::BookingStore::save_with_history),
//! in the same commit as the change they describe.

use medtour_core::{
    Actor, AuditSink, Booking, BookingId, BookingStatus, ClientMetadata, CoordinatorId,
    HistoryEntryId, StatusHistoryEntry, StoreError,
};
use std::sync::Arc;

/// Reason recorded on coordinator assignment entries.
pub const COORDINATOR_ASSIGNED_REASON: &str = "Coordinator assigned";

/// Who, why and from where a change was requested.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChangeContext {
    /// Acting identity
    pub actor: Actor,
    /// Reason, if any
    pub reason: Option<String>,
    /// Free-text notes
    pub notes: Option<String>,
    /// Request metadata
    pub client: ClientMetadata,
}

/// Builds history entries and reads them back from an [`AuditSink`].
#[derive(Clone)]
pub struct StatusHistoryLog {
    sink: Arc<dyn AuditSink>,
}

impl StatusHistoryLog {
    /// Create a log writing to `sink`.
    #[must_use]
    pub fn new(sink: Arc<dyn AuditSink>) -> Self {
        Self { sink }
    }

    /// Entry for a status change.
    ///
    /// `from` is the status the booking had when the change was validated;
    /// `booking` is the changed booking about to be saved. The entry is
    /// stamped with the booking's `updated_at`.
    #[must_use]
    pub fn transition_entry(
        from: BookingStatus,
        booking: &Booking,
        context: ChangeContext,
    ) -> StatusHistoryEntry {
        StatusHistoryEntry {
            id: HistoryEntryId::new(),
            booking_id: booking.id,
            from_status: from,
            to_status: booking.status,
            actor: context.actor,
            reason: context.reason,
            notes: context.notes,
            client: context.client,
            created_at: booking.updated_at,
        }
    }

    /// Same-status entry for a coordinator change.
    ///
    /// The reason is always [`COORDINATOR_ASSIGNED_REASON`]; the notes name
    /// the previous and new coordinator followed by any caller notes.
    #[must_use]
    pub fn coordinator_entry(
        previous: Option<CoordinatorId>,
        booking: &Booking,
        context: ChangeContext,
    ) -> StatusHistoryEntry {
        let notes = coordinator_notes(previous, booking.coordinator_id, context.notes.as_deref());
        Self::transition_entry(
            booking.status,
            booking,
            ChangeContext {
                reason: Some(COORDINATOR_ASSIGNED_REASON.to_string()),
                notes: Some(notes),
                ..context
            },
        )
    }

    /// All entries of a booking, newest first.
    ///
    /// # Errors
    ///
    /// Returns the sink's [`StoreError`] if the read fails.
    pub async fn history(&self, booking_id: BookingId) -> Result<Vec<StatusHistoryEntry>, StoreError> {
        self.sink.history(booking_id).await
    }
}

fn coordinator_notes(
    previous: Option<CoordinatorId>,
    current: Option<CoordinatorId>,
    extra: Option<&str>,
) -> String {
    let name = |id: Option<CoordinatorId>| id.map_or_else(|| "none".to_string(), |c| c.to_string());
    let change = format!("Coordinator changed from {} to {}", name(previous), name(current));
    match extra {
        Some(extra) if !extra.trim().is_empty() => format!("{change}: {}", extra.trim()),
        _ => change,
    }
}
