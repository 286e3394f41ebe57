//! Status distribution over a booking population.

use medtour_core::{BookingFilter, BookingStatus, BookingStore, LifecycleError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Narrows the population: optional hospital, `created_from` inclusive,
/// `created_to` exclusive.
pub type StatisticsFilter = BookingFilter;

/// Count and share of one status.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StatusCount {
    /// Status
    pub status: BookingStatus,
    /// Bookings in this status
    pub count: u64,
    /// `count / total * 100`, rounded half-up to two decimals
    pub percentage: f64,
}

/// Status distribution.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StatusStatistics {
    /// Bookings counted
    pub total: u64,
    /// Observed statuses in lifecycle order
    pub by_status: Vec<StatusCount>,
    /// Bookings whose stored status could not be decoded; not part of `total`
    #[serde(default)]
    pub unrecognized: u64,
}

impl StatusStatistics {
    /// Tally a population of statuses.
    ///
    /// Only observed statuses are listed. An empty population yields
    /// `total == 0` and no rows.
    #[must_use]
    pub fn from_statuses(statuses: impl IntoIterator<Item = BookingStatus>) -> Self {
        let mut counts: BTreeMap<usize, u64> = BTreeMap::new();
        let mut total = 0u64;
        for status in statuses {
            *counts.entry(lifecycle_position(status)).or_default() += 1;
            total += 1;
        }

        let by_status = counts
            .into_iter()
            .map(|(position, count)| StatusCount {
                status: BookingStatus::ALL[position],
                count,
                percentage: percentage(count, total),
            })
            .collect();

        Self {
            total,
            by_status,
            unrecognized: 0,
        }
    }

    /// Row for `status`, if observed.
    #[must_use]
    pub fn get(&self, status: BookingStatus) -> Option<&StatusCount> {
        self.by_status.iter().find(|row| row.status == status)
    }
}

fn lifecycle_position(status: BookingStatus) -> usize {
    BookingStatus::ALL
        .iter()
        .position(|s| *s == status)
        .unwrap_or(BookingStatus::ALL.len() - 1)
}

/// Percentage rounded half-up to two decimals, 0 when `total` is 0.
#[allow(clippy::cast_precision_loss)] // Hundredths of a percent fit easily in f64
fn percentage(count: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let numerator = u128::from(count) * 10_000;
    let denominator = u128::from(total);
    let hundredths = (numerator * 2 + denominator) / (denominator * 2);
    hundredths as f64 / 100.0
}

/// Computes [`StatusStatistics`] from a [`BookingStore`].
#[derive(Clone)]
pub struct LifecycleStatistics {
    bookings: Arc<dyn BookingStore>,
}

impl LifecycleStatistics {
    /// Create a statistics reader over `bookings`.
    #[must_use]
    pub fn new(bookings: Arc<dyn BookingStore>) -> Self {
        Self { bookings }
    }

    /// Distribution of the bookings passing `filter`.
    ///
    /// Rows with an undecodable status are logged and counted in
    /// [`StatusStatistics::unrecognized`] instead of failing the report.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::Store`] on storage failure.
    pub async fn compute(&self, filter: StatisticsFilter) -> Result<StatusStatistics, LifecycleError> {
        let rows = self.bookings.list_statuses(filter).await?;

        let mut statuses = Vec::with_capacity(rows.len());
        let mut unrecognized = 0u64;
        for row in rows {
            match row.status.parse::<BookingStatus>() {
                Ok(status) => statuses.push(status),
                Err(_) => {
                    tracing::warn!(
                        booking_id = %row.booking_id,
                        status = %row.status,
                        "Skipping booking with undecodable status in statistics"
                    );
                    unrecognized += 1;
                }
            }
        }

        Ok(StatusStatistics {
            unrecognized,
            ..StatusStatistics::from_statuses(statuses)
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp, clippy::cast_precision_loss)]
mod tests {
    use super::*;
    use medtour_testing::properties::any_status;
    use proptest::prelude::*;

    #[test]
    fn empty_population_has_no_rows() {
        let none: [BookingStatus; 0] = [];
        let stats = StatusStatistics::from_statuses(none);
        assert_eq!(stats.total, 0);
        assert!(stats.by_status.is_empty());
        assert_eq!(percentage(0, 0), 0.0);
    }

    #[tokio::test]
    async fn undecodable_rows_are_counted_apart() {
        use medtour_testing::{BookingBuilder, InMemoryBookingStore};

        let store = Arc::new(InMemoryBookingStore::new());
        for status in [BookingStatus::Completed, BookingStatus::Completed, BookingStatus::Cancelled] {
            store.insert(BookingBuilder::new().status(status).build()).await.unwrap();
        }
        let corrupt = store.insert(BookingBuilder::new().build()).await.unwrap();
        store.corrupt_status(corrupt.id, "scheduled");

        let stats = LifecycleStatistics::new(store)
            .compute(StatisticsFilter::default())
            .await
            .unwrap();

        assert_eq!(stats.total, 3);
        assert_eq!(stats.unrecognized, 1);
        assert_eq!(stats.get(BookingStatus::Completed).unwrap().percentage, 66.67);
        assert_eq!(stats.get(BookingStatus::Cancelled).unwrap().percentage, 33.33);
    }

    #[test]
    fn three_to_one_split() {
        let mut statuses = vec![BookingStatus::ConsultationScheduled; 3];
        statuses.push(BookingStatus::Completed);
        let stats = StatusStatistics::from_statuses(statuses);

        assert_eq!(stats.total, 4);
        assert_eq!(stats.get(BookingStatus::ConsultationScheduled).unwrap().percentage, 75.0);
        assert_eq!(stats.get(BookingStatus::Completed).unwrap().percentage, 25.0);
    }

    #[test]
    fn rows_follow_lifecycle_order_and_round_half_up() {
        let stats = StatusStatistics::from_statuses([
            BookingStatus::Cancelled,
            BookingStatus::Requested,
            BookingStatus::Accepted,
        ]);
        let order: Vec<_> = stats.by_status.iter().map(|r| r.status).collect();
        assert_eq!(
            order,
            vec![BookingStatus::Requested, BookingStatus::Accepted, BookingStatus::Cancelled]
        );
        // 1/3 = 33.333..%
        assert_eq!(stats.by_status[0].percentage, 33.33);
        // 2/3 = 66.666..%
        assert_eq!(percentage(2, 3), 66.67);
    }

    proptest! {
        #[test]
        fn counts_sum_to_total(statuses in prop::collection::vec(any_status(), 0..50)) {
            let stats = StatusStatistics::from_statuses(statuses.clone());
            let sum: u64 = stats.by_status.iter().map(|r| r.count).sum();
            prop_assert_eq!(sum, statuses.len() as u64);
            prop_assert_eq!(stats.total, statuses.len() as u64);

            let share: f64 = stats.by_status.iter().map(|r| r.percentage).sum();
            if stats.total > 0 {
                // Each row rounds by at most half a hundredth
                prop_assert!((share - 100.0).abs() <= 0.005 * BookingStatus::ALL.len() as f64 + 1e-9);
            }
        }
    }
}
