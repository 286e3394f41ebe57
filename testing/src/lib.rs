//! # Medtour Testing
//!
//! Testing utilities and helpers for the Medtour booking platform.
//!
//! This crate provides:
//! - In-memory implementations of the store traits
//! - A fixed clock for deterministic timestamps
//! - Builders for bookings in any lifecycle status
//! - Property-based testing strategies
//!
//! ## Example
//!
//! ```
//! use medtour_testing::{BookingBuilder, InMemoryBookingStore};
//! use medtour_core::{BookingStatus, BookingStore};
//!
//! # tokio_test::block_on(async {
//! let store = InMemoryBookingStore::new();
//! let booking = BookingBuilder::new().status(BookingStatus::Accepted).build();
//! let id = booking.id;
//! store.insert(booking).await.unwrap();
//!
//! let loaded = store.find(id).await.unwrap().unwrap();
//! assert_eq!(loaded.status, BookingStatus::Accepted);
//! # });
//! ```

use chrono::{DateTime, Utc};
use medtour_core::environment::Clock;

pub mod fixtures;
pub mod in_memory;

pub use fixtures::BookingBuilder;
pub use in_memory::{InMemoryAuditSink, InMemoryBookingStore, InMemoryCatalogStore};

/// Mock implementations of Environment traits
pub mod mocks {
    use super::{Clock, DateTime, Utc};

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use medtour_testing::mocks::FixedClock;
    /// use medtour_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// let time1 = clock.now();
    /// let time2 = clock.now();
    /// assert_eq!(time1, time2); // Always the same!
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    ///
    /// # Panics
    ///
    /// This function will panic if the hardcoded timestamp fails to parse,
    /// which should never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(
            DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
                .expect("hardcoded timestamp should always parse")
                .with_timezone(&Utc),
        )
    }
}

/// Property-based testing strategies for domain types.
pub mod properties {
    use medtour_core::{AddOnType, BookingStatus, Money, SelectionRequest};
    use proptest::prelude::*;
    use proptest::sample::select;

    /// Any booking status.
    pub fn any_status() -> impl Strategy<Value = BookingStatus> {
        select(BookingStatus::ALL.to_vec())
    }

    /// Any add-on type.
    pub fn any_add_on_type() -> impl Strategy<Value = AddOnType> {
        select(AddOnType::ALL.to_vec())
    }

    /// A selection with a plausible quantity and an optional discount.
    pub fn any_selection_request() -> impl Strategy<Value = SelectionRequest> {
        (
            any_add_on_type(),
            0u32..=30,
            proptest::option::of(0u64..2_000_000),
        )
            .prop_map(|(add_on_type, quantity, discount)| SelectionRequest {
                add_on_type,
                quantity,
                discount: discount.map(Money::from_cents),
            })
    }
}

/// Install a `tracing` subscriber for test output. Safe to call repeatedly.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with_test_writer()
        .try_init();
}

// Re-export commonly used items
pub use mocks::{FixedClock, test_clock};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_clock() {
        let clock = test_clock();
        let time1 = clock.now();
        let time2 = clock.now();
        assert_eq!(time1, time2);
    }
}
