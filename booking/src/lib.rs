//! # Medtour Booking
//!
//! Booking lifecycle and add-on services built on `medtour-core`.
//!
//! - [`lifecycle`]: single-booking status changes with optimistic concurrency
//! - [`history`]: the append-only status audit trail
//! - [`bulk`]: one change over many bookings with per-item isolation
//! - [`statistics`]: status distribution over a booking population
//! - [`catalog`], [`compatibility`], [`pricing`]: the add-on engine
//! - [`service`]: [`BookingService`], the operation surface a transport wraps
//!
//! ## Example
//!
//! ```
//! use medtour_booking::BookingService;
//! use medtour_booking::catalog::standard_definitions;
//! use medtour_booking::lifecycle::TransitionRequest;
//! use medtour_core::{Actor, BookingStatus, Currency, HospitalId, PatientId, TreatmentId};
//! use medtour_testing::{InMemoryBookingStore, InMemoryCatalogStore, test_clock};
//! use std::sync::Arc;
//!
//! # tokio_test::block_on(async {
//! let store = Arc::new(InMemoryBookingStore::new());
//! let service = BookingService::new(
//!     store.clone(),
//!     store.audit_sink(),
//!     Arc::new(InMemoryCatalogStore::new(standard_definitions(&Currency::usd()))),
//!     Arc::new(test_clock()),
//! );
//!
//! let booking = service
//!     .create_booking(PatientId::new(), HospitalId::new(), TreatmentId::new(), None)
//!     .await
//!     .unwrap();
//! let reviewed = service
//!     .transition(TransitionRequest::new(booking.id, BookingStatus::UnderReview, Actor::system()))
//!     .await
//!     .unwrap();
//! assert_eq!(reviewed.status, BookingStatus::UnderReview);
//! # });
//! ```

pub mod bulk;
pub mod catalog;
pub mod compatibility;
pub mod config;
pub mod history;
pub mod lifecycle;
pub mod metrics;
pub mod pricing;
pub mod retry;
pub mod service;
pub mod statistics;

pub use bulk::{BulkFailure, BulkLifecycleRunner, BulkOutcome, BulkTransitionRequest};
pub use catalog::AddOnCatalog;
pub use compatibility::{AddOnCompatibilityChecker, CompatibilityReport, Conflict};
pub use config::Config;
pub use history::{ChangeContext, StatusHistoryLog};
pub use lifecycle::{BookingLifecycleManager, TransitionRequest, ValidTransitions};
pub use pricing::{AddOnPricingEngine, PricedLine, Quote};
pub use retry::RetryPolicy;
pub use service::{BookingService, ServiceError};
pub use statistics::{LifecycleStatistics, StatisticsFilter, StatusCount, StatusStatistics};
