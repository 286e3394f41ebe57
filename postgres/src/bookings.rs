//! Bookings and their status history.

use crate::db_err;
use chrono::{DateTime, Utc};
use medtour_core::store::StoreFuture;
use medtour_core::{
    Actor, ActorKind, AuditSink, Booking, BookingAddOnSelection, BookingFilter, BookingId,
    BookingStatus, BookingStore, Cancellation, ClientMetadata, CoordinatorId, Currency,
    HistoryEntryId, HospitalId, PatientId, StatusHistoryEntry, StoreError, StoredStatus, TreatmentId,
    UserId,
};
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::{PgExecutor, PgPool, Postgres, QueryBuilder, Row};
use uuid::Uuid;

const BOOKING_COLUMNS: &str = "id, patient_id, hospital_id, treatment_id, status, sub_status, \
     coordinator_id, cancellation_reason, cancelled_by_id, cancelled_by_kind, cancelled_at, \
     confirmed_date, completion_date, currency, add_ons, created_at, updated_at, version";

/// `PostgreSQL`-backed [`BookingStore`] and [`AuditSink`].
///
/// # Example
///
/// ```no_run
/// use medtour_postgres::PostgresBookingStore;
///
/// # async fn example(pool: sqlx::PgPool) -> Result<(), Box<dyn std::error::Error>> {
/// let store = PostgresBookingStore::from_pool(pool);
/// store.migrate().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct PostgresBookingStore {
    pool: PgPool,
}

impl PostgresBookingStore {
    /// Create a store on an existing pool.
    #[must_use]
    pub const fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect using `config` and wrap the resulting pool.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the connection fails.
    pub async fn connect(config: &crate::PoolConfig) -> Result<Self, StoreError> {
        Ok(Self::from_pool(crate::connect(config).await?))
    }

    /// Run database migrations.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if a migration fails.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        crate::run_migrations(&self.pool).await
    }

    /// The underlying pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn current_version(&self, id: BookingId) -> Result<Option<u64>, StoreError> {
        let row: Option<(i64,)> = sqlx::query_as("SELECT version FROM bookings WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err("Failed to read booking version"))?;
        row.map(|(v,)| from_db_version(v)).transpose()
    }

    /// Explain why a conditional update matched no row.
    async fn rejected_update(&self, booking_id: BookingId, expected_version: u64) -> StoreError {
        match self.current_version(booking_id).await {
            Err(e) => e,
            Ok(None) => StoreError::NotFound(booking_id),
            Ok(Some(actual)) => {
                tracing::warn!(
                    %booking_id,
                    expected = expected_version,
                    actual,
                    "Conditional booking update rejected"
                );
                metrics::counter!("booking_store_version_conflicts_total").increment(1);
                StoreError::VersionConflict {
                    booking_id,
                    expected: expected_version,
                    actual,
                }
            }
        }
    }
}

impl BookingStore for PostgresBookingStore {
    fn find(&self, id: BookingId) -> StoreFuture<'_, Option<Booking>> {
        Box::pin(async move {
            let row = sqlx::query(&format!("SELECT {BOOKING_COLUMNS} FROM bookings WHERE id = $1"))
                .bind(id.as_uuid())
                .fetch_optional(&self.pool)
                .await
                .map_err(db_err("Failed to load booking"))?;
            row.as_ref().map(decode_booking).transpose()
        })
    }

    fn insert(&self, booking: Booking) -> StoreFuture<'_, Booking> {
        Box::pin(async move {
            let mut booking = booking;
            booking.version = 0;
            let cancellation = booking.cancellation.as_ref();

            sqlx::query(
                r"
                INSERT INTO bookings (
                    id, patient_id, hospital_id, treatment_id, status, sub_status,
                    coordinator_id, cancellation_reason, cancelled_by_id, cancelled_by_kind,
                    cancelled_at, confirmed_date, completion_date, currency, add_ons,
                    created_at, updated_at, version
                ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, 0)
                ",
            )
            .bind(booking.id.as_uuid())
            .bind(booking.patient_id.as_uuid())
            .bind(booking.hospital_id.as_uuid())
            .bind(booking.treatment_id.as_uuid())
            .bind(booking.status.as_str())
            .bind(booking.sub_status.as_deref())
            .bind(booking.coordinator_id.map(|c| *c.as_uuid()))
            .bind(cancellation.map(|c| c.reason.as_str()))
            .bind(cancellation.and_then(|c| c.cancelled_by.id).map(|u| *u.as_uuid()))
            .bind(cancellation.map(|c| c.cancelled_by.kind.as_str()))
            .bind(cancellation.map(|c| c.cancelled_at))
            .bind(booking.confirmed_date)
            .bind(booking.completion_date)
            .bind(booking.currency.as_str())
            .bind(Json(&booking.add_ons))
            .bind(booking.created_at)
            .bind(booking.updated_at)
            .execute(&self.pool)
            .await
            .map_err(|e| match &e {
                sqlx::Error::Database(db) if db.is_unique_violation() => {
                    StoreError::AlreadyExists(booking.id)
                }
                _ => StoreError::Database(format!("Failed to insert booking: {e}")),
            })?;

            tracing::debug!(booking_id = %booking.id, status = %booking.status, "Booking inserted");
            Ok(booking)
        })
    }

    fn save(&self, booking: Booking, expected_version: u64) -> StoreFuture<'_, Booking> {
        Box::pin(async move {
            match update_booking(&self.pool, &booking, expected_version).await? {
                Some(version) => with_version(booking, version),
                None => Err(self.rejected_update(booking.id, expected_version).await),
            }
        })
    }

    fn save_with_history(
        &self,
        booking: Booking,
        expected_version: u64,
        entry: StatusHistoryEntry,
    ) -> StoreFuture<'_, Booking> {
        Box::pin(async move {
            let mut tx = self
                .pool
                .begin()
                .await
                .map_err(db_err("Failed to start transaction"))?;

            let Some(version) = update_booking(&mut *tx, &booking, expected_version).await? else {
                let _ = tx.rollback().await;
                return Err(self.rejected_update(booking.id, expected_version).await);
            };
            insert_history(&mut *tx, &entry).await?;

            tx.commit()
                .await
                .map_err(db_err("Failed to commit booking change"))?;
            with_version(booking, version)
        })
    }

    fn list(&self, filter: BookingFilter) -> StoreFuture<'_, Vec<Booking>> {
        Box::pin(async move {
            let mut query = filtered(BOOKING_COLUMNS, &filter);
            let rows = query
                .build()
                .fetch_all(&self.pool)
                .await
                .map_err(db_err("Failed to list bookings"))?;
            rows.iter().map(decode_booking).collect()
        })
    }

    fn list_statuses(&self, filter: BookingFilter) -> StoreFuture<'_, Vec<StoredStatus>> {
        Box::pin(async move {
            let mut query = filtered("id, status", &filter);
            let rows: Vec<(Uuid, String)> = query
                .build_query_as()
                .fetch_all(&self.pool)
                .await
                .map_err(db_err("Failed to list booking statuses"))?;
            Ok(rows
                .into_iter()
                .map(|(id, status)| StoredStatus {
                    booking_id: BookingId::from_uuid(id),
                    status,
                })
                .collect())
        })
    }
}

/// `SELECT columns FROM bookings` narrowed by `filter`, oldest first.
fn filtered(columns: &str, filter: &BookingFilter) -> QueryBuilder<'static, Postgres> {
    let mut query = QueryBuilder::new(format!("SELECT {columns} FROM bookings WHERE TRUE"));
    if let Some(hospital_id) = filter.hospital_id {
        query.push(" AND hospital_id = ").push_bind(*hospital_id.as_uuid());
    }
    if let Some(from) = filter.created_from {
        query.push(" AND created_at >= ").push_bind(from);
    }
    if let Some(to) = filter.created_to {
        query.push(" AND created_at < ").push_bind(to);
    }
    query.push(" ORDER BY created_at, id");
    query
}

impl AuditSink for PostgresBookingStore {
    fn append(&self, entry: StatusHistoryEntry) -> StoreFuture<'_, ()> {
        Box::pin(async move { insert_history(&self.pool, &entry).await })
    }

    fn history(&self, booking_id: BookingId) -> StoreFuture<'_, Vec<StatusHistoryEntry>> {
        Box::pin(async move {
            let rows = sqlx::query(
                r"
                SELECT id, booking_id, from_status, to_status, actor_id, actor_kind,
                       reason, notes, ip_address, user_agent, created_at
                FROM booking_status_history
                WHERE booking_id = $1
                ORDER BY created_at DESC, seq DESC
                ",
            )
            .bind(booking_id.as_uuid())
            .fetch_all(&self.pool)
            .await
            .map_err(db_err("Failed to load history"))?;
            rows.iter().map(decode_history).collect()
        })
    }
}

/// Conditional update; `None` when no row had `expected_version`.
async fn update_booking<'e, E>(
    executor: E,
    booking: &Booking,
    expected_version: u64,
) -> Result<Option<i64>, StoreError>
where
    E: PgExecutor<'e>,
{
    let cancellation = booking.cancellation.as_ref();
    let updated: Option<(i64,)> = sqlx::query_as(
        r"
        UPDATE bookings SET
            status = $3,
            sub_status = $4,
            coordinator_id = $5,
            cancellation_reason = $6,
            cancelled_by_id = $7,
            cancelled_by_kind = $8,
            cancelled_at = $9,
            confirmed_date = $10,
            completion_date = $11,
            add_ons = $12,
            updated_at = $13,
            version = version + 1
        WHERE id = $1 AND version = $2
        RETURNING version
        ",
    )
    .bind(booking.id.as_uuid())
    .bind(to_db_version(expected_version)?)
    .bind(booking.status.as_str())
    .bind(booking.sub_status.as_deref())
    .bind(booking.coordinator_id.map(|c| *c.as_uuid()))
    .bind(cancellation.map(|c| c.reason.as_str()))
    .bind(cancellation.and_then(|c| c.cancelled_by.id).map(|u| *u.as_uuid()))
    .bind(cancellation.map(|c| c.cancelled_by.kind.as_str()))
    .bind(cancellation.map(|c| c.cancelled_at))
    .bind(booking.confirmed_date)
    .bind(booking.completion_date)
    .bind(Json(&booking.add_ons))
    .bind(booking.updated_at)
    .fetch_optional(executor)
    .await
    .map_err(db_err("Failed to save booking"))?;
    Ok(updated.map(|(version,)| version))
}

async fn insert_history<'e, E>(executor: E, entry: &StatusHistoryEntry) -> Result<(), StoreError>
where
    E: PgExecutor<'e>,
{
    sqlx::query(
        r"
        INSERT INTO booking_status_history (
            id, booking_id, from_status, to_status, actor_id, actor_kind,
            reason, notes, ip_address, user_agent, created_at
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        ",
    )
    .bind(entry.id.as_uuid())
    .bind(entry.booking_id.as_uuid())
    .bind(entry.from_status.as_str())
    .bind(entry.to_status.as_str())
    .bind(entry.actor.id.map(|u| *u.as_uuid()))
    .bind(entry.actor.kind.as_str())
    .bind(entry.reason.as_deref())
    .bind(entry.notes.as_deref())
    .bind(entry.client.ip_address.as_deref())
    .bind(entry.client.user_agent.as_deref())
    .bind(entry.created_at)
    .execute(executor)
    .await
    .map_err(db_err("Failed to append history entry"))?;
    Ok(())
}

fn with_version(mut booking: Booking, version: i64) -> Result<Booking, StoreError> {
    booking.version = from_db_version(version)?;
    Ok(booking)
}

fn to_db_version(version: u64) -> Result<i64, StoreError> {
    i64::try_from(version)
        .map_err(|_| StoreError::Serialization(format!("Version {version} out of range")))
}

fn from_db_version(version: i64) -> Result<u64, StoreError> {
    u64::try_from(version)
        .map_err(|_| StoreError::Serialization(format!("Negative version {version}")))
}

fn column<'r, T>(row: &'r PgRow, name: &str) -> Result<T, StoreError>
where
    T: sqlx::Decode<'r, sqlx::Postgres> + sqlx::Type<sqlx::Postgres>,
{
    row.try_get(name)
        .map_err(|e| StoreError::Serialization(format!("Column {name}: {e}")))
}

fn status(booking_id: BookingId, raw: String) -> Result<BookingStatus, StoreError> {
    raw.parse()
        .map_err(|_| StoreError::UndecodableStatus { booking_id, status: raw })
}

fn actor_kind(raw: &str) -> Result<ActorKind, StoreError> {
    ActorKind::parse(raw)
        .ok_or_else(|| StoreError::Serialization(format!("Unknown actor kind: {raw}")))
}

fn decode_booking(row: &PgRow) -> Result<Booking, StoreError> {
    let id = BookingId::from_uuid(column(row, "id")?);
    let status = status(id, column(row, "status")?)?;

    let cancellation = match (
        column::<Option<String>>(row, "cancellation_reason")?,
        column::<Option<DateTime<Utc>>>(row, "cancelled_at")?,
    ) {
        (Some(reason), Some(cancelled_at)) => {
            let kind: Option<String> = column(row, "cancelled_by_kind")?;
            let cancelled_by = Actor {
                id: column::<Option<Uuid>>(row, "cancelled_by_id")?.map(UserId::from_uuid),
                kind: kind.as_deref().map_or(Ok(ActorKind::System), actor_kind)?,
            };
            Some(Cancellation {
                reason,
                cancelled_by,
                cancelled_at,
            })
        }
        _ => None,
    };

    let currency: String = column(row, "currency")?;
    let currency = Currency::new(currency.trim())
        .map_err(|e| StoreError::Serialization(e.to_string()))?;
    let Json(add_ons): Json<Vec<BookingAddOnSelection>> = column(row, "add_ons")?;

    Ok(Booking {
        id,
        patient_id: PatientId::from_uuid(column(row, "patient_id")?),
        hospital_id: HospitalId::from_uuid(column(row, "hospital_id")?),
        treatment_id: TreatmentId::from_uuid(column(row, "treatment_id")?),
        status,
        sub_status: column(row, "sub_status")?,
        coordinator_id: column::<Option<Uuid>>(row, "coordinator_id")?.map(CoordinatorId::from_uuid),
        cancellation,
        confirmed_date: column(row, "confirmed_date")?,
        completion_date: column(row, "completion_date")?,
        currency,
        add_ons,
        created_at: column(row, "created_at")?,
        updated_at: column(row, "updated_at")?,
        version: from_db_version(column(row, "version")?)?,
    })
}

fn decode_history(row: &PgRow) -> Result<StatusHistoryEntry, StoreError> {
    let booking_id = BookingId::from_uuid(column(row, "booking_id")?);
    let kind: String = column(row, "actor_kind")?;

    Ok(StatusHistoryEntry {
        id: HistoryEntryId::from_uuid(column(row, "id")?),
        booking_id,
        from_status: status(booking_id, column(row, "from_status")?)?,
        to_status: status(booking_id, column(row, "to_status")?)?,
        actor: Actor {
            id: column::<Option<Uuid>>(row, "actor_id")?.map(UserId::from_uuid),
            kind: actor_kind(&kind)?,
        },
        reason: column(row, "reason")?,
        notes: column(row, "notes")?,
        client: ClientMetadata {
            ip_address: column(row, "ip_address")?,
            user_agent: column(row, "user_agent")?,
        },
        created_at: column(row, "created_at")?,
    })
}
