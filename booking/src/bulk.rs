//! Batch status changes with per-item isolation.
//!
//! Items run one after another in request order, so `succeeded` and `failed`
//! keep that order. A failing item never aborts the batch.

use crate::lifecycle::{BookingLifecycleManager, TransitionRequest};
use crate::metrics;
use crate::retry::{RetryPolicy, retry_with_predicate};
use medtour_core::{Actor, BookingId, BookingStatus, ClientMetadata, LifecycleError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Default upper bound on the number of ids in one request.
pub const DEFAULT_MAX_BATCH: usize = 100;

/// The same change applied to many bookings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkTransitionRequest {
    /// Bookings to change, processed in order
    pub booking_ids: Vec<BookingId>,
    /// Requested status
    pub target: BookingStatus,
    /// Who asks
    pub actor: Actor,
    /// Why
    pub reason: Option<String>,
    /// Free-text notes
    pub notes: Option<String>,
    /// Request metadata
    #[serde(default)]
    pub client: ClientMetadata,
}

impl BulkTransitionRequest {
    /// A request with no reason, notes or metadata.
    #[must_use]
    pub fn new(booking_ids: Vec<BookingId>, target: BookingStatus, actor: Actor) -> Self {
        Self {
            booking_ids,
            target,
            actor,
            reason: None,
            notes: None,
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

    fn item(&self, booking_id: BookingId) -> TransitionRequest {
        TransitionRequest {
            booking_id,
            target: self.target,
            actor: self.actor,
            reason: self.reason.clone(),
            notes: self.notes.clone(),
            sub_status: None,
            client: self.client.clone(),
        }
    }
}

/// One item that did not go through.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkFailure {
    /// Booking id
    pub id: BookingId,
    /// Error kind, e.g. `illegal_transition`
    pub kind: String,
    /// Human-readable reason
    pub reason: String,
}

/// Aggregated result of a batch.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkOutcome {
    /// Changed bookings, in request order
    pub succeeded: Vec<BookingId>,
    /// Failed items, in request order
    pub failed: Vec<BulkFailure>,
}

impl BulkOutcome {
    /// Number of changed bookings
    #[must_use]
    pub fn succeeded_count(&self) -> usize {
        self.succeeded.len()
    }

    /// Number of failed items
    #[must_use]
    pub fn failed_count(&self) -> usize {
        self.failed.len()
    }
}

/// Runs a [`BulkTransitionRequest`] through a [`BookingLifecycleManager`].
#[derive(Clone)]
pub struct BulkLifecycleRunner {
    manager: Arc<BookingLifecycleManager>,
    retry: RetryPolicy,
    max_batch: usize,
}

impl BulkLifecycleRunner {
    /// Create a runner. Items that lose a concurrency race are retried
    /// according to `retry` before being reported as failed.
    #[must_use]
    pub const fn new(manager: Arc<BookingLifecycleManager>, retry: RetryPolicy, max_batch: usize) -> Self {
        Self {
            manager,
            retry,
            max_batch,
        }
    }

    /// Replace the per-item retry policy.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Apply the change to every id.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::InvalidRequest`] only for an empty id list or
    /// one longer than the configured maximum. Per-item errors are reported
    /// in [`BulkOutcome::failed`].
    #[tracing::instrument(skip_all, fields(items = request.booking_ids.len(), to = %request.target))]
    pub async fn run(&self, request: &BulkTransitionRequest) -> Result<BulkOutcome, LifecycleError> {
        if request.booking_ids.is_empty() {
            return Err(LifecycleError::InvalidRequest(
                "booking_ids must not be empty".to_string(),
            ));
        }
        if request.booking_ids.len() > self.max_batch {
            return Err(LifecycleError::InvalidRequest(format!(
                "at most {} booking ids per request, got {}",
                self.max_batch,
                request.booking_ids.len()
            )));
        }

        let mut outcome = BulkOutcome::default();
        for &booking_id in &request.booking_ids {
            let result = retry_with_predicate(
                &self.retry,
                || self.manager.transition(request.item(booking_id)),
                LifecycleError::is_retryable,
            )
            .await;

            metrics::record_bulk_item(result.is_ok());
            match result {
                Ok(_) => outcome.succeeded.push(booking_id),
                Err(err) => outcome.failed.push(BulkFailure {
                    id: booking_id,
                    kind: err.kind().to_string(),
                    reason: err.to_string(),
                }),
            }
        }

        tracing::info!(
            succeeded = outcome.succeeded_count(),
            failed = outcome.failed_count(),
            "Bulk transition finished"
        );
        Ok(outcome)
    }
}
