//! Add-on definitions stored as JSONB documents keyed by type name.

use crate::db_err;
use medtour_core::store::StoreFuture;
use medtour_core::{AddOnDefinition, AddOnType, CatalogStore, StoreError};
use sqlx::PgPool;
use sqlx::types::Json;

/// `PostgreSQL`-backed [`CatalogStore`].
#[derive(Clone, Debug)]
pub struct PostgresCatalogStore {
    pool: PgPool,
}

impl PostgresCatalogStore {
    /// Create a catalog store on an existing pool.
    #[must_use]
    pub const fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert or replace a definition.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the write fails.
    pub async fn upsert_add_on(&self, definition: &AddOnDefinition) -> Result<(), StoreError> {
        sqlx::query(
            r"
            INSERT INTO add_on_definitions (add_on_type, definition, updated_at)
            VALUES ($1, $2, now())
            ON CONFLICT (add_on_type)
            DO UPDATE SET definition = EXCLUDED.definition, updated_at = now()
            ",
        )
        .bind(definition.add_on_type.as_str())
        .bind(Json(definition))
        .execute(&self.pool)
        .await
        .map_err(db_err("Failed to upsert add-on definition"))?;

        tracing::debug!(add_on_type = %definition.add_on_type, "Add-on definition stored");
        Ok(())
    }
}

impl CatalogStore for PostgresCatalogStore {
    fn find_add_on(&self, add_on_type: AddOnType) -> StoreFuture<'_, Option<AddOnDefinition>> {
        Box::pin(async move {
            let row: Option<(Json<AddOnDefinition>,)> = sqlx::query_as(
                "SELECT definition FROM add_on_definitions WHERE add_on_type = $1",
            )
            .bind(add_on_type.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err("Failed to load add-on definition"))?;
            Ok(row.map(|(Json(definition),)| definition))
        })
    }

    fn list_add_ons(&self) -> StoreFuture<'_, Vec<AddOnDefinition>> {
        Box::pin(async move {
            let rows: Vec<(Json<AddOnDefinition>,)> =
                sqlx::query_as("SELECT definition FROM add_on_definitions")
                    .fetch_all(&self.pool)
                    .await
                    .map_err(db_err("Failed to list add-on definitions"))?;
            let mut definitions: Vec<_> = rows.into_iter().map(|(Json(d),)| d).collect();
            definitions.sort_by_key(|d| d.add_on_type);
            Ok(definitions)
        })
    }
}
