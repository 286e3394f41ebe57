//! # Medtour Core
//!
//! Domain types and storage traits for the medical-tourism booking platform.
//!
//! This crate is pure: it performs no I/O. It provides:
//!
//! - **Status**: the booking lifecycle and its fixed transition table
//! - **Booking**: the aggregate root and the typed patch used to change it
//! - **History**: immutable audit entries for status changes
//! - **Add-ons**: catalog definitions, exclusion groups and selections
//! - **Store**: traits the services use to reach persistence
//! - **Environment**: injected dependencies such as the clock
//!
//! ## Example
//!
//! ```
//! use medtour_core::status::BookingStatus;
//!
//! let next = BookingStatus::Requested.allowed_next_states();
//! assert!(next.contains(&BookingStatus::UnderReview));
//! assert!(BookingStatus::Cancelled.is_terminal());
//! ```

pub mod addon;
pub mod booking;
pub mod error;
pub mod history;
pub mod status;
pub mod store;
pub mod types;

// Re-export commonly used types
pub use chrono::{DateTime, Utc};
pub use serde::{Deserialize, Serialize};

pub use addon::{
    AddOnCategory, AddOnDefinition, AddOnType, AddOnUnit, BookingAddOnSelection, ExclusionGroup,
    SelectionRequest, SelectionStatus,
};
pub use booking::{Booking, BookingPatch, Cancellation, PatchError};
pub use error::{AddOnError, LifecycleError};
pub use history::{Actor, ActorKind, ClientMetadata, StatusHistoryEntry};
pub use status::BookingStatus;
pub use store::{
    AuditSink, BookingFilter, BookingStore, CatalogStore, StoreError, StoreFuture, StoredStatus,
};
pub use types::{
    BookingId, CoordinatorId, Currency, HistoryEntryId, HospitalId, Money, Multiplier, PatientId,
    PriceRange, SelectionId, TreatmentId, UserId,
};

/// Environment module - Dependency injection traits
///
/// All external dependencies are abstracted behind traits and injected
/// into the services that need them.
pub mod environment {
    use chrono::{DateTime, Utc};

    /// Clock trait - abstracts time operations for testability
    ///
    /// # Examples
    ///
    /// ```
    /// use medtour_core::environment::{Clock, SystemClock};
    ///
    /// let clock = SystemClock;
    /// let before = clock.now();
    /// assert!(clock.now() >= before);
    /// ```
    pub trait Clock: Send + Sync {
        /// Get the current time
        fn now(&self) -> DateTime<Utc>;
    }

    /// Production clock backed by the system time.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }
}
