//! In-memory store implementations for fast, deterministic tests.
//!
//! - [`InMemoryBookingStore`]: `HashMap`-backed bookings with version-checked saves
//! - [`InMemoryAuditSink`]: append-only `Vec` of history entries, shared with
//!   the booking store it belongs to
//! - [`InMemoryCatalogStore`]: fixed add-on definitions

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)] // Lock poisoning only happens after a test already panicked

use medtour_core::store::StoreFuture;
use medtour_core::{
    AddOnDefinition, AddOnType, AuditSink, Booking, BookingFilter, BookingId, BookingStore,
    CatalogStore, StatusHistoryEntry, StoreError, StoredStatus,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use tokio::sync::Barrier;

#[derive(Clone, Debug)]
struct StoredBooking {
    booking: Booking,
    /// Raw status text that failed to decode, simulating a corrupt row
    corrupt_status: Option<String>,
}

#[derive(Debug)]
struct ReadGate {
    barrier: Arc<Barrier>,
    remaining: usize,
}

/// In-memory booking store with optimistic concurrency.
///
/// `save` commits only when the stored version equals the expected version,
/// exactly like the `PostgreSQL` implementation. History entries passed to
/// `save_with_history` land in the store's own [`InMemoryAuditSink`], reachable
/// through [`audit_sink`](Self::audit_sink).
///
/// # Example
///
/// ```
/// use medtour_testing::{BookingBuilder, InMemoryBookingStore};
/// use medtour_core::{BookingStore, StoreError};
///
/// # tokio_test::block_on(async {
/// let store = InMemoryBookingStore::new();
/// let booking = store.insert(BookingBuilder::new().build()).await.unwrap();
///
/// let saved = store.save(booking.clone(), 0).await.unwrap();
/// assert_eq!(saved.version, 1);
///
/// // A second writer that also read version 0 loses
/// let err = store.save(booking, 0).await.unwrap_err();
/// assert!(matches!(err, StoreError::VersionConflict { expected: 0, actual: 1, .. }));
/// # });
/// ```
#[derive(Clone, Debug, Default)]
pub struct InMemoryBookingStore {
    bookings: Arc<RwLock<HashMap<BookingId, StoredBooking>>>,
    read_gate: Arc<Mutex<Option<ReadGate>>>,
    saves: Arc<Mutex<usize>>,
    audit: Arc<InMemoryAuditSink>,
}

impl InMemoryBookingStore {
    /// Create a new empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The audit trail `save_with_history` writes to.
    #[must_use]
    pub fn audit_sink(&self) -> Arc<InMemoryAuditSink> {
        Arc::clone(&self.audit)
    }

    /// Make the next `readers` calls to `find` wait for each other.
    ///
    /// Each gated reader takes its snapshot first and then blocks until all
    /// `readers` have done the same, so they all observe the same version.
    /// Used to force read-then-write races deterministically.
    pub fn hold_reads(&self, readers: usize) {
        *self.read_gate.lock().unwrap() = Some(ReadGate {
            barrier: Arc::new(Barrier::new(readers)),
            remaining: readers,
        });
    }

    /// Mark a stored booking's status as undecodable.
    pub fn corrupt_status(&self, id: BookingId, raw_status: &str) {
        if let Some(row) = self.bookings.write().unwrap().get_mut(&id) {
            row.corrupt_status = Some(raw_status.to_string());
        }
    }

    /// Current stored copy of a booking, bypassing the read gate.
    #[must_use]
    pub fn get(&self, id: BookingId) -> Option<Booking> {
        self.bookings
            .read()
            .unwrap()
            .get(&id)
            .map(|row| row.booking.clone())
    }

    /// Number of committed saves (not counting inserts).
    #[must_use]
    pub fn save_count(&self) -> usize {
        *self.saves.lock().unwrap()
    }

    /// Get the number of stored bookings
    #[must_use]
    pub fn len(&self) -> usize {
        self.bookings.read().unwrap().len()
    }

    /// Check if the store is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bookings.read().unwrap().is_empty()
    }

    fn take_gate(&self) -> Option<Arc<Barrier>> {
        let mut gate = self.read_gate.lock().unwrap();
        let active = gate.as_mut()?;
        active.remaining -= 1;
        let barrier = Arc::clone(&active.barrier);
        if active.remaining == 0 {
            *gate = None;
        }
        Some(barrier)
    }

    fn decode(row: &StoredBooking) -> Result<Booking, StoreError> {
        match &row.corrupt_status {
            Some(raw) => Err(StoreError::UndecodableStatus {
                booking_id: row.booking.id,
                status: raw.clone(),
            }),
            None => Ok(row.booking.clone()),
        }
    }

    /// Version-checked write; the history entry is appended under the same
    /// lock and the booking is only replaced once the append succeeded.
    fn commit(
        &self,
        booking: Booking,
        expected_version: u64,
        entry: Option<StatusHistoryEntry>,
    ) -> Result<Booking, StoreError> {
        let mut bookings = self.bookings.write().unwrap();
        let row = bookings
            .get_mut(&booking.id)
            .ok_or(StoreError::NotFound(booking.id))?;

        let actual = row.booking.version;
        if actual != expected_version {
            return Err(StoreError::VersionConflict {
                booking_id: booking.id,
                expected: expected_version,
                actual,
            });
        }
        if let Some(entry) = entry {
            self.audit.push(entry)?;
        }

        let mut booking = booking;
        booking.version = expected_version + 1;
        row.booking = booking.clone();
        drop(bookings);

        *self.saves.lock().unwrap() += 1;
        Ok(booking)
    }
}

impl BookingStore for InMemoryBookingStore {
    fn find(&self, id: BookingId) -> StoreFuture<'_, Option<Booking>> {
        Box::pin(async move {
            let snapshot = self.bookings.read().unwrap().get(&id).cloned();
            if let Some(barrier) = self.take_gate() {
                barrier.wait().await;
            }
            snapshot.as_ref().map(Self::decode).transpose()
        })
    }

    fn insert(&self, booking: Booking) -> StoreFuture<'_, Booking> {
        Box::pin(async move {
            let mut bookings = self.bookings.write().unwrap();
            if bookings.contains_key(&booking.id) {
                return Err(StoreError::AlreadyExists(booking.id));
            }
            let mut booking = booking;
            booking.version = 0;
            bookings.insert(
                booking.id,
                StoredBooking {
                    booking: booking.clone(),
                    corrupt_status: None,
                },
            );
            Ok(booking)
        })
    }

    fn save(&self, booking: Booking, expected_version: u64) -> StoreFuture<'_, Booking> {
        Box::pin(async move { self.commit(booking, expected_version, None) })
    }

    fn save_with_history(
        &self,
        booking: Booking,
        expected_version: u64,
        entry: StatusHistoryEntry,
    ) -> StoreFuture<'_, Booking> {
        Box::pin(async move { self.commit(booking, expected_version, Some(entry)) })
    }

    fn list(&self, filter: BookingFilter) -> StoreFuture<'_, Vec<Booking>> {
        Box::pin(async move {
            let bookings = self.bookings.read().unwrap();
            let mut matching = bookings
                .values()
                .filter(|row| filter.matches(&row.booking))
                .map(Self::decode)
                .collect::<Result<Vec<_>, _>>()?;
            matching.sort_by_key(|b| (b.created_at, b.id));
            Ok(matching)
        })
    }

    fn list_statuses(&self, filter: BookingFilter) -> StoreFuture<'_, Vec<StoredStatus>> {
        Box::pin(async move {
            let bookings = self.bookings.read().unwrap();
            let mut rows: Vec<_> = bookings
                .values()
                .filter(|row| filter.matches(&row.booking))
                .collect();
            rows.sort_by_key(|row| (row.booking.created_at, row.booking.id));
            Ok(rows
                .into_iter()
                .map(|row| StoredStatus {
                    booking_id: row.booking.id,
                    status: row
                        .corrupt_status
                        .clone()
                        .unwrap_or_else(|| row.booking.status.as_str().to_string()),
                })
                .collect())
        })
    }
}

/// In-memory append-only audit trail.
#[derive(Clone, Debug, Default)]
pub struct InMemoryAuditSink {
    entries: Arc<RwLock<Vec<StatusHistoryEntry>>>,
    unavailable: Arc<AtomicBool>,
}

impl InMemoryAuditSink {
    /// Create an empty sink
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following append fail with [`StoreError::Database`].
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn push(&self, entry: StatusHistoryEntry) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Database("audit trail unavailable".to_string()));
        }
        self.entries.write().unwrap().push(entry);
        Ok(())
    }

    /// Every entry in append order
    #[must_use]
    pub fn entries(&self) -> Vec<StatusHistoryEntry> {
        self.entries.read().unwrap().clone()
    }

    /// Entries of one booking in append order
    #[must_use]
    pub fn entries_for(&self, booking_id: BookingId) -> Vec<StatusHistoryEntry> {
        self.entries
            .read()
            .unwrap()
            .iter()
            .filter(|e| e.booking_id == booking_id)
            .cloned()
            .collect()
    }

    /// Get the number of entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().unwrap().len()
    }

    /// Check if no entries were appended
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().unwrap().is_empty()
    }
}

impl AuditSink for InMemoryAuditSink {
    fn append(&self, entry: StatusHistoryEntry) -> StoreFuture<'_, ()> {
        Box::pin(async move { self.push(entry) })
    }

    fn history(&self, booking_id: BookingId) -> StoreFuture<'_, Vec<StatusHistoryEntry>> {
        Box::pin(async move {
            let mut entries = self.entries_for(booking_id);
            entries.reverse();
            Ok(entries)
        })
    }
}

/// In-memory add-on catalog.
#[derive(Clone, Debug, Default)]
pub struct InMemoryCatalogStore {
    definitions: Arc<RwLock<HashMap<AddOnType, AddOnDefinition>>>,
}

impl InMemoryCatalogStore {
    /// Create a catalog holding `definitions`
    #[must_use]
    pub fn new(definitions: impl IntoIterator<Item = AddOnDefinition>) -> Self {
        let definitions = definitions
            .into_iter()
            .map(|d| (d.add_on_type, d))
            .collect();
        Self {
            definitions: Arc::new(RwLock::new(definitions)),
        }
    }

    /// Replace or add a definition
    pub fn upsert(&self, definition: AddOnDefinition) {
        self.definitions
            .write()
            .unwrap()
            .insert(definition.add_on_type, definition);
    }

    /// Remove a definition
    pub fn remove(&self, add_on_type: AddOnType) {
        self.definitions.write().unwrap().remove(&add_on_type);
    }
}

impl CatalogStore for InMemoryCatalogStore {
    fn find_add_on(&self, add_on_type: AddOnType) -> StoreFuture<'_, Option<AddOnDefinition>> {
        Box::pin(async move { Ok(self.definitions.read().unwrap().get(&add_on_type).cloned()) })
    }

    fn list_add_ons(&self) -> StoreFuture<'_, Vec<AddOnDefinition>> {
        Box::pin(async move {
            let mut all: Vec<_> = self.definitions.read().unwrap().values().cloned().collect();
            all.sort_by_key(|d| d.add_on_type);
            Ok(all)
        })
    }
}
