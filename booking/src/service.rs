//! The operation surface of the booking core.
//!
//! [`BookingService`] wires the lifecycle manager, bulk runner, statistics and
//! add-on engine over one set of stores. It is what a transport layer (HTTP,
//! queue consumer, CLI) wraps. Single-booking writes that lose an optimistic
//! concurrency race are retried with the configured [`RetryPolicy`].

use crate::bulk::{BulkLifecycleRunner, BulkOutcome, BulkTransitionRequest, DEFAULT_MAX_BATCH};
use crate::catalog::AddOnCatalog;
use crate::compatibility::{AddOnCompatibilityChecker, CompatibilityReport};
use crate::config::Config;
use crate::history::ChangeContext;
use crate::lifecycle::{BookingLifecycleManager, TransitionRequest, ValidTransitions};
use crate::pricing::{AddOnPricingEngine, Quote};
use crate::retry::{RetryPolicy, retry_with_predicate};
use crate::statistics::{LifecycleStatistics, StatisticsFilter, StatusStatistics};
use medtour_core::environment::Clock;
use medtour_core::types::InvalidCurrency;
use medtour_core::{
    AddOnError, AddOnType, AuditSink, Booking, BookingAddOnSelection, BookingId, BookingStore,
    CatalogStore, CoordinatorId, Currency, HospitalId, LifecycleError, PatientId,
    SelectionRequest, SelectionStatus, StatusHistoryEntry, TreatmentId,
};
use std::sync::Arc;
use thiserror::Error;

/// Errors surfaced by [`BookingService`].
#[derive(Error, Debug)]
pub enum ServiceError {
    /// Lifecycle failure
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    /// Add-on failure
    #[error(transparent)]
    AddOn(#[from] AddOnError),
}

impl ServiceError {
    /// Whether retrying the same request may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Lifecycle(e) => e.is_retryable(),
            Self::AddOn(e) => e.is_retryable(),
        }
    }

    /// Short, stable label for logs and transport status mapping.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Lifecycle(e) => e.kind(),
            Self::AddOn(e) => match e {
                AddOnError::ConflictingAddOns { .. } => "conflicting_add_ons",
                AddOnError::UnknownAddOnType(_) => "unknown_add_on_type",
                AddOnError::InactiveAddOn(_) => "inactive_add_on",
                AddOnError::CurrencyMismatch { .. } => "currency_mismatch",
                AddOnError::InvalidQuantity { .. } => "invalid_quantity",
                AddOnError::PriceOverflow(_) => "price_overflow",
                AddOnError::AddOnsLocked { .. } => "add_ons_locked",
                AddOnError::BookingNotFound(_) => "not_found",
                AddOnError::ConcurrentModification { .. } => "concurrent_modification",
                AddOnError::Patch(_) => "invariant_violation",
                AddOnError::Store(_) => "store",
            },
        }
    }
}

/// Facade over every booking operation.
#[derive(Clone)]
pub struct BookingService {
    bookings: Arc<dyn BookingStore>,
    lifecycle: Arc<BookingLifecycleManager>,
    bulk: BulkLifecycleRunner,
    statistics: LifecycleStatistics,
    checker: AddOnCompatibilityChecker,
    pricing: AddOnPricingEngine,
    clock: Arc<dyn Clock>,
    retry: RetryPolicy,
    default_currency: Currency,
}

impl BookingService {
    /// Create a service with default retry, batch size and currency (USD).
    #[must_use]
    pub fn new(
        bookings: Arc<dyn BookingStore>,
        audit: Arc<dyn AuditSink>,
        catalog: Arc<dyn CatalogStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self::assemble(
            bookings,
            audit,
            catalog,
            clock,
            RetryPolicy::default(),
            DEFAULT_MAX_BATCH,
            Currency::usd(),
        )
    }

    /// Create a service with retry, batch size and currency taken from `config`.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidCurrency`] if `DEFAULT_CURRENCY` is malformed.
    pub fn from_config(
        bookings: Arc<dyn BookingStore>,
        audit: Arc<dyn AuditSink>,
        catalog: Arc<dyn CatalogStore>,
        clock: Arc<dyn Clock>,
        config: &Config,
    ) -> Result<Self, InvalidCurrency> {
        Ok(Self::assemble(
            bookings,
            audit,
            catalog,
            clock,
            config.retry_policy(),
            config.bulk.max_batch,
            config.currency()?,
        ))
    }

    fn assemble(
        bookings: Arc<dyn BookingStore>,
        audit: Arc<dyn AuditSink>,
        catalog: Arc<dyn CatalogStore>,
        clock: Arc<dyn Clock>,
        retry: RetryPolicy,
        max_batch: usize,
        default_currency: Currency,
    ) -> Self {
        let lifecycle = Arc::new(BookingLifecycleManager::new(
            Arc::clone(&bookings),
            audit,
            Arc::clone(&clock),
        ));
        Self {
            bulk: BulkLifecycleRunner::new(Arc::clone(&lifecycle), retry.clone(), max_batch),
            statistics: LifecycleStatistics::new(Arc::clone(&bookings)),
            checker: AddOnCompatibilityChecker::standard(),
            pricing: AddOnPricingEngine::new(AddOnCatalog::new(catalog)),
            bookings,
            lifecycle,
            clock,
            retry,
            default_currency,
        }
    }

    /// Replace the retry policy used for writes.
    #[must_use]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.bulk = self.bulk.with_retry(retry.clone());
        self.retry = retry;
        self
    }

    /// The underlying lifecycle manager (no retries).
    #[must_use]
    pub fn lifecycle(&self) -> &BookingLifecycleManager {
        &self.lifecycle
    }

    /// Create a booking in `requested`.
    ///
    /// `currency` defaults to the configured currency.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::Store`] if the insert fails.
    pub async fn create_booking(
        &self,
        patient_id: PatientId,
        hospital_id: HospitalId,
        treatment_id: TreatmentId,
        currency: Option<Currency>,
    ) -> Result<Booking, ServiceError> {
        let booking = Booking::new(
            patient_id,
            hospital_id,
            treatment_id,
            currency.unwrap_or_else(|| self.default_currency.clone()),
            self.clock.now(),
        );
        let created = self
            .bookings
            .insert(booking)
            .await
            .map_err(LifecycleError::from)?;
        tracing::info!(booking_id = %created.id, hospital_id = %created.hospital_id, "Booking created");
        Ok(created)
    }

    /// Move a booking to another status, retrying lost races.
    ///
    /// # Errors
    ///
    /// See [`BookingLifecycleManager::transition`].
    /// [`LifecycleError::ConcurrentModification`] surfaces only after the
    /// retry budget is spent.
    pub async fn transition(&self, request: TransitionRequest) -> Result<Booking, ServiceError> {
        let booking = retry_with_predicate(
            &self.retry,
            || self.lifecycle.transition(request.clone()),
            LifecycleError::is_retryable,
        )
        .await?;
        Ok(booking)
    }

    /// History of a booking, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::Store`] if the read fails.
    pub async fn history(
        &self,
        booking_id: BookingId,
    ) -> Result<Vec<StatusHistoryEntry>, ServiceError> {
        Ok(self.lifecycle.history(booking_id).await?)
    }

    /// Assign a coordinator, retrying lost races.
    ///
    /// # Errors
    ///
    /// See [`BookingLifecycleManager::assign_coordinator`].
    pub async fn assign_coordinator(
        &self,
        booking_id: BookingId,
        coordinator_id: CoordinatorId,
        context: ChangeContext,
    ) -> Result<Booking, ServiceError> {
        let booking = retry_with_predicate(
            &self.retry,
            || {
                self.lifecycle
                    .assign_coordinator(booking_id, coordinator_id, context.clone())
            },
            LifecycleError::is_retryable,
        )
        .await?;
        Ok(booking)
    }

    /// Apply one change to many bookings.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::InvalidRequest`] for an empty or oversized id
    /// list. Per-item failures are reported in the outcome.
    pub async fn bulk_transition(
        &self,
        request: &BulkTransitionRequest,
    ) -> Result<BulkOutcome, ServiceError> {
        Ok(self.bulk.run(request).await?)
    }

    /// Current status and legal next states.
    ///
    /// # Errors
    ///
    /// See [`BookingLifecycleManager::valid_transitions`].
    pub async fn valid_transitions(
        &self,
        booking_id: BookingId,
    ) -> Result<ValidTransitions, ServiceError> {
        Ok(self.lifecycle.valid_transitions(booking_id).await?)
    }

    /// Status distribution of the bookings passing `filter`.
    ///
    /// # Errors
    ///
    /// See [`LifecycleStatistics::compute`].
    pub async fn statistics(
        &self,
        filter: StatisticsFilter,
    ) -> Result<StatusStatistics, ServiceError> {
        Ok(self.statistics.compute(filter).await?)
    }

    /// Check a selection for mutual-exclusion conflicts without failing.
    #[must_use]
    pub fn validate_add_on_selection(&self, selected: &[AddOnType]) -> CompatibilityReport {
        self.checker.check(selected)
    }

    /// Price a selection in the booking's currency. Nothing is saved.
    ///
    /// # Errors
    ///
    /// - [`AddOnError::BookingNotFound`]: no such booking
    /// - [`AddOnError::ConflictingAddOns`]: the selection is incompatible
    /// - any pricing error of [`AddOnPricingEngine::quote`]
    pub async fn price_selection(
        &self,
        booking_id: BookingId,
        selections: &[SelectionRequest],
    ) -> Result<Quote, ServiceError> {
        let booking = self.load_for_add_ons(booking_id).await?;
        let types: Vec<AddOnType> = selections.iter().map(|s| s.add_on_type).collect();
        self.checker.validate_selection(&types)?;
        Ok(self.pricing.quote(&booking.currency, selections).await?)
    }

    /// Replace the pending add-ons of a booking, retrying lost races.
    ///
    /// Confirmed, cancelled and refunded selections are kept. The new lines
    /// are priced now and stored as `pending`. Compatibility is checked over
    /// the confirmed selections plus the new ones.
    ///
    /// # Errors
    ///
    /// - [`AddOnError::BookingNotFound`]: no such booking
    /// - [`AddOnError::AddOnsLocked`]: the booking is closed
    /// - [`AddOnError::ConflictingAddOns`] and any pricing error
    /// - [`AddOnError::ConcurrentModification`]: retries exhausted
    pub async fn apply_add_ons(
        &self,
        booking_id: BookingId,
        selections: &[SelectionRequest],
    ) -> Result<Booking, ServiceError> {
        let booking = retry_with_predicate(
            &self.retry,
            || self.try_apply_add_ons(booking_id, selections),
            AddOnError::is_retryable,
        )
        .await?;
        Ok(booking)
    }

    #[tracing::instrument(skip_all, fields(booking_id = %booking_id, lines = selections.len()))]
    async fn try_apply_add_ons(
        &self,
        booking_id: BookingId,
        selections: &[SelectionRequest],
    ) -> Result<Booking, AddOnError> {
        let current = self.load_for_add_ons(booking_id).await?;
        if current.status.is_closed() {
            return Err(AddOnError::AddOnsLocked {
                booking_id,
                status: current.status,
            });
        }

        let kept: Vec<BookingAddOnSelection> = current
            .add_ons
            .iter()
            .filter(|s| s.status != SelectionStatus::Pending)
            .cloned()
            .collect();
        let selected: Vec<AddOnType> = kept
            .iter()
            .filter(|s| s.status == SelectionStatus::Confirmed)
            .map(|s| s.add_on_type)
            .chain(selections.iter().map(|s| s.add_on_type))
            .collect();
        self.checker.validate_selection(&selected)?;

        let quote = self.pricing.quote(&current.currency, selections).await?;
        let now = self.clock.now();
        let mut add_ons = kept;
        add_ons.extend(quote.lines.into_iter().map(|line| line.into_selection(now)));

        let next = current.plan_add_ons(add_ons, now).apply(&current)?;
        let saved = self.bookings.save(next, current.version).await?;

        tracing::info!(
            booking_id = %saved.id,
            add_ons = saved.add_ons.len(),
            subtotal = %quote.subtotal,
            version = saved.version,
            "Add-ons applied"
        );
        Ok(saved)
    }

    async fn load_for_add_ons(&self, booking_id: BookingId) -> Result<Booking, AddOnError> {
        self.bookings
            .find(booking_id)
            .await?
            .ok_or(AddOnError::BookingNotFound(booking_id))
    }
}
