//! Single-booking status changes with optimistic concurrency and audit.
//!
//! Every change follows the same steps:
//!
//! 1. Load the booking (and remember the version that was read)
//! 2. Plan the change with [`Booking::plan_transition`], a pure function
//! 3. Apply the resulting [`BookingPatch`](medtour_core::BookingPatch)
//! 4. Save with `expected_version` = the version read in step 1, together
//!    with its [`StatusHistoryEntry`] in one commit
//!
//! If another writer committed between steps 1 and 4, the save fails and the
//! caller receives [`LifecycleError::ConcurrentModification`]. The manager never
//! retries on its own; see [`BookingService`](crate::BookingService) for the
//! retrying facade.

use crate::history::{ChangeContext, StatusHistoryLog};
use crate::metrics;
use medtour_core::environment::Clock;
use medtour_core::{
    Actor, AuditSink, Booking, BookingId, BookingStatus, BookingStore, ClientMetadata,
    CoordinatorId, LifecycleError, StatusHistoryEntry,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A request to move one booking to another status.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionRequest {
    /// Booking to change
    pub booking_id: BookingId,
    /// Requested status
    pub target: BookingStatus,
    /// Who asks
    pub actor: Actor,
    /// Why (used as the cancellation reason when cancelling)
    pub reason: Option<String>,
    /// Free-text notes for the audit trail
    pub notes: Option<String>,
    /// Replacement sub-status
    pub sub_status: Option<String>,
    /// Request metadata copied into the audit trail
    #[serde(default)]
    pub client: ClientMetadata,
}

impl TransitionRequest {
    /// A request with no reason, notes or metadata.
    #[must_use]
    pub fn new(booking_id: BookingId, target: BookingStatus, actor: Actor) -> Self {
        Self {
            booking_id,
            target,
            actor,
            reason: None,
            notes: None,
            sub_status: None,
            client: ClientMetadata::default(),
        }
    }

    /// Set the reason
    #[must_use]
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Set the notes
    #[must_use]
    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    /// Set the sub-status
    #[must_use]
    pub fn with_sub_status(mut self, sub_status: impl Into<String>) -> Self {
        self.sub_status = Some(sub_status.into());
        self
    }

    /// Set the client metadata
    #[must_use]
    pub fn with_client(mut self, client: ClientMetadata) -> Self {
        self.client = client;
        self
    }

    fn context(&self) -> ChangeContext {
        ChangeContext {
            actor: self.actor,
            reason: self.reason.clone(),
            notes: self.notes.clone(),
            client: self.client.clone(),
        }
    }
}

/// Current status of a booking and where it may go next.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidTransitions {
    /// Booking id
    pub booking_id: BookingId,
    /// Current status
    pub current_status: BookingStatus,
    /// Legal next states, in table order
    pub valid_transitions: Vec<BookingStatus>,
}

/// Validates, applies and audits single-booking changes.
#[derive(Clone)]
pub struct BookingLifecycleManager {
    bookings: Arc<dyn BookingStore>,
    history: StatusHistoryLog,
    clock: Arc<dyn Clock>,
}

impl BookingLifecycleManager {
    /// Create a manager over the given stores.
    #[must_use]
    pub fn new(
        bookings: Arc<dyn BookingStore>,
        audit: Arc<dyn AuditSink>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            bookings,
            history: StatusHistoryLog::new(audit),
            clock,
        }
    }

    /// Move a booking to `request.target`.
    ///
    /// Returns the committed booking, which carries its patient, hospital and
    /// treatment references.
    ///
    /// # Errors
    ///
    /// - [`LifecycleError::NotFound`]: no such booking
    /// - [`LifecycleError::InvalidCurrentState`]: the stored status is unknown
    /// - [`LifecycleError::IllegalTransition`]: `target` is not a legal next state
    /// - [`LifecycleError::ConcurrentModification`]: another writer committed first
    /// - [`LifecycleError::Store`]: storage failure
    #[tracing::instrument(
        skip_all,
        fields(booking_id = %request.booking_id, to = %request.target)
    )]
    pub async fn transition(&self, request: TransitionRequest) -> Result<Booking, LifecycleError> {
        let booking_id = request.booking_id;
        let result = self.try_transition(request).await;
        if let Err(err) = &result {
            note_rejection(booking_id, err);
        }
        result
    }

    async fn try_transition(&self, request: TransitionRequest) -> Result<Booking, LifecycleError> {
        let current = self.load(request.booking_id).await?;
        let now = self.clock.now();

        let patch = current.plan_transition(
            request.target,
            request.actor,
            request.reason.as_deref(),
            request.sub_status.clone(),
            now,
        )?;
        let next = patch.apply(&current)?;
        let entry = StatusHistoryLog::transition_entry(current.status, &next, request.context());
        let saved = self
            .bookings
            .save_with_history(next, current.version, entry)
            .await?;

        metrics::record_transition(saved.status);
        tracing::info!(
            booking_id = %saved.id,
            from = %current.status,
            to = %saved.status,
            version = saved.version,
            "Booking status changed"
        );
        Ok(saved)
    }

    /// Assign (or reassign) a coordinator.
    ///
    /// The status is left unchanged and the transition table is not consulted,
    /// but a same-status history entry is still written.
    ///
    /// # Errors
    ///
    /// - [`LifecycleError::NotFound`], [`LifecycleError::InvalidCurrentState`]
    /// - [`LifecycleError::ConcurrentModification`]: another writer committed first
    /// - [`LifecycleError::Store`]: storage failure
    #[tracing::instrument(skip_all, fields(booking_id = %booking_id, coordinator_id = %coordinator_id))]
    pub async fn assign_coordinator(
        &self,
        booking_id: BookingId,
        coordinator_id: CoordinatorId,
        context: ChangeContext,
    ) -> Result<Booking, LifecycleError> {
        let result = self
            .try_assign_coordinator(booking_id, coordinator_id, context)
            .await;
        if let Err(err) = &result {
            note_rejection(booking_id, err);
        }
        result
    }

    async fn try_assign_coordinator(
        &self,
        booking_id: BookingId,
        coordinator_id: CoordinatorId,
        context: ChangeContext,
    ) -> Result<Booking, LifecycleError> {
        let current = self.load(booking_id).await?;
        let next = current
            .plan_coordinator_assignment(coordinator_id, self.clock.now())
            .apply(&current)?;
        let entry = StatusHistoryLog::coordinator_entry(current.coordinator_id, &next, context);
        let saved = self
            .bookings
            .save_with_history(next, current.version, entry)
            .await?;

        tracing::info!(
            booking_id = %saved.id,
            status = %saved.status,
            previous = ?current.coordinator_id.map(|c| c.to_string()),
            "Coordinator assigned"
        );
        Ok(saved)
    }

    /// Current status and legal next states of a booking.
    ///
    /// # Errors
    ///
    /// - [`LifecycleError::NotFound`], [`LifecycleError::InvalidCurrentState`]
    /// - [`LifecycleError::Store`]: storage failure
    pub async fn valid_transitions(
        &self,
        booking_id: BookingId,
    ) -> Result<ValidTransitions, LifecycleError> {
        let booking = self.load(booking_id).await?;
        Ok(ValidTransitions {
            booking_id,
            current_status: booking.status,
            valid_transitions: booking.status.allowed_next_states().to_vec(),
        })
    }

    /// History of a booking, newest first.
    ///
    /// Unknown bookings have an empty history.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::Store`] if the read fails.
    pub async fn history(
        &self,
        booking_id: BookingId,
    ) -> Result<Vec<StatusHistoryEntry>, LifecycleError> {
        Ok(self.history.history(booking_id).await?)
    }

    async fn load(&self, booking_id: BookingId) -> Result<Booking, LifecycleError> {
        self.bookings
            .find(booking_id)
            .await?
            .ok_or(LifecycleError::NotFound(booking_id))
    }
}

fn note_rejection(booking_id: BookingId, err: &LifecycleError) {
    metrics::record_transition_rejected(err.kind());
    match err {
        LifecycleError::ConcurrentModification { .. } => {
            metrics::record_concurrent_modification();
            tracing::warn!(%booking_id, "Lost concurrent modification race");
        }
        LifecycleError::Store(e) => {
            tracing::error!(%booking_id, error = %e, "Storage failure during lifecycle change");
        }
        other => {
            tracing::warn!(%booking_id, kind = other.kind(), error = %other, "Lifecycle change rejected");
        }
    }
}
