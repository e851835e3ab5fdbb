use futures::stream::{BoxStream, StreamExt, TryStreamExt};
use sqlx::{FromRow, PgPool};
use tracing::{debug, info, instrument};

use crate::db::{City, CityInput, DbError, UpsertOutcome};

/// SQLSTATE for foreign_key_violation
const FOREIGN_KEY_VIOLATION: &str = "23503";

const CITY_COLUMNS: &str = "id, name, country, latitude, longitude, timezone, active, created_at, updated_at";

#[derive(Debug, FromRow)]
struct UpsertedCity {
    #[sqlx(flatten)]
    city: City,
    inserted: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    NotFound,
    Referenced,
}

#[derive(Clone)]
pub struct CityRepository {
    pool: PgPool,
}

impl CityRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert or merge a city keyed by (name, country).
    ///
    /// Runs as a single `INSERT ... ON CONFLICT` against the unique constraint,
    /// so concurrent upserts of the same key converge on one row. `xmax = 0`
    /// holds only for freshly inserted tuples. Re-writing identical values
    /// leaves the row (and `updated_at`) untouched.
    #[instrument(skip(self, city), fields(name = %city.name, country = %city.country))]
    pub async fn upsert(&self, city: &CityInput) -> Result<(City, UpsertOutcome), DbError> {
        let row = sqlx::query_as::<_, UpsertedCity>(
            r#"
            INSERT INTO cities (name, country, latitude, longitude, timezone, active)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT ON CONSTRAINT cities_name_country_key DO UPDATE SET
                latitude = EXCLUDED.latitude,
                longitude = EXCLUDED.longitude,
                timezone = EXCLUDED.timezone,
                active = EXCLUDED.active,
                updated_at = NOW()
            WHERE (cities.latitude, cities.longitude, cities.timezone, cities.active)
                IS DISTINCT FROM (EXCLUDED.latitude, EXCLUDED.longitude, EXCLUDED.timezone, EXCLUDED.active)
            RETURNING id, name, country, latitude, longitude, timezone, active,
                      created_at, updated_at, (xmax = 0) AS inserted
            "#,
        )
        .bind(&city.name)
        .bind(&city.country)
        .bind(city.latitude)
        .bind(city.longitude)
        .bind(&city.timezone)
        .bind(city.active)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            // Conflict with identical values: nothing was written
            let existing = self
                .find(&city.name, &city.country)
                .await?
                .ok_or(sqlx::Error::RowNotFound)?;
            debug!("City {} unchanged", existing.id);
            return Ok((existing, UpsertOutcome::Updated));
        };

        let outcome = if row.inserted {
            UpsertOutcome::Inserted
        } else {
            UpsertOutcome::Updated
        };
        debug!("Upserted city {} ({:?})", row.city.id, outcome);
        Ok((row.city, outcome))
    }

    #[instrument(skip(self))]
    pub async fn find(&self, name: &str, country: &str) -> Result<Option<City>, DbError> {
        let city = sqlx::query_as::<_, City>(&format!(
            "SELECT {CITY_COLUMNS} FROM cities WHERE name = $1 AND country = $2"
        ))
        .bind(name)
        .bind(country)
        .fetch_optional(&self.pool)
        .await?;

        if city.is_none() {
            debug!("City not found");
        }
        Ok(city)
    }

    #[instrument(skip(self))]
    pub async fn find_by_id(&self, id: i64) -> Result<Option<City>, DbError> {
        let city = sqlx::query_as::<_, City>(&format!("SELECT {CITY_COLUMNS} FROM cities WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(city)
    }

    /// All cities sharing a name, across countries
    #[instrument(skip(self))]
    pub async fn find_by_name(&self, name: &str) -> Result<Vec<City>, DbError> {
        let cities = sqlx::query_as::<_, City>(&format!(
            "SELECT {CITY_COLUMNS} FROM cities WHERE name = $1 ORDER BY id ASC"
        ))
        .bind(name)
        .fetch_all(&self.pool)
        .await?;

        debug!("Found {} cities named {}", cities.len(), name);
        Ok(cities)
    }

    #[instrument(skip(self))]
    pub async fn exists(&self, id: i64) -> Result<bool, DbError> {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM cities WHERE id = $1)")
            .bind(id)
            .fetch_one(&self.pool)
            .await?;

        Ok(exists)
    }

    /// Stream cities in insertion order. Each call issues a fresh query.
    pub fn stream(&self, active_only: bool) -> BoxStream<'_, Result<City, DbError>> {
        sqlx::query_as::<_, City>(
            r#"
            SELECT id, name, country, latitude, longitude, timezone, active, created_at, updated_at
            FROM cities
            WHERE active OR NOT $1
            ORDER BY id ASC
            "#,
        )
        .bind(active_only)
        .fetch(&self.pool)
        .map_err(DbError::from)
        .boxed()
    }

    #[instrument(skip(self))]
    pub async fn count(&self) -> Result<usize, DbError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM cities")
            .fetch_one(&self.pool)
            .await?;

        Ok(count as usize)
    }

    /// Returns `None` if no city has this id
    #[instrument(skip(self))]
    pub async fn set_active(&self, id: i64, active: bool) -> Result<Option<City>, DbError> {
        let city = sqlx::query_as::<_, City>(&format!(
            "UPDATE cities SET active = $2, updated_at = NOW() WHERE id = $1 RETURNING {CITY_COLUMNS}"
        ))
        .bind(id)
        .bind(active)
        .fetch_optional(&self.pool)
        .await?;

        if city.is_some() {
            info!("City {} active = {}", id, active);
        }
        Ok(city)
    }

    #[instrument(skip(self))]
    pub async fn update_coordinates(
        &self,
        id: i64,
        latitude: f64,
        longitude: f64,
    ) -> Result<Option<City>, DbError> {
        let city = sqlx::query_as::<_, City>(&format!(
            r#"
            UPDATE cities SET latitude = $2, longitude = $3, updated_at = NOW()
            WHERE id = $1
            RETURNING {CITY_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(latitude)
        .bind(longitude)
        .fetch_optional(&self.pool)
        .await?;

        Ok(city)
    }

    /// Delete a city. Referencing rows block the delete at the storage level
    /// (`ON DELETE RESTRICT`), reported as [`DeleteOutcome::Referenced`].
    #[instrument(skip(self))]
    pub async fn delete(&self, id: i64) -> Result<DeleteOutcome, DbError> {
        let result = sqlx::query("DELETE FROM cities WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await;

        match result {
            Ok(done) if done.rows_affected() == 0 => Ok(DeleteOutcome::NotFound),
            Ok(_) => {
                info!("Deleted city {}", id);
                Ok(DeleteOutcome::Deleted)
            }
            Err(sqlx::Error::Database(db_err))
                if db_err.code().as_deref() == Some(FOREIGN_KEY_VIOLATION) =>
            {
                debug!("City {} is still referenced: {}", id, db_err);
                Ok(DeleteOutcome::Referenced)
            }
            Err(e) => Err(e.into()),
        }
    }
}
