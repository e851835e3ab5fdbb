use sqlx::PgPool;
use tracing::{debug, instrument};

use crate::db::DbError;

#[derive(Clone)]
pub struct RetentionPolicyRepository {
    pool: PgPool,
}

impl RetentionPolicyRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Declare the maximum record age for a collection. Re-declaring the same
    /// value is a no-op.
    #[instrument(skip(self))]
    pub async fn declare(&self, collection: &str, max_age_seconds: i64) -> Result<(), DbError> {
        let result = sqlx::query(
            r#"
            INSERT INTO retention_policies (collection, max_age_seconds)
            VALUES ($1, $2)
            ON CONFLICT (collection) DO UPDATE SET
                max_age_seconds = EXCLUDED.max_age_seconds,
                updated_at = NOW()
            WHERE retention_policies.max_age_seconds <> EXCLUDED.max_age_seconds
            "#,
        )
        .bind(collection)
        .bind(max_age_seconds)
        .execute(&self.pool)
        .await?;

        debug!(
            "Retention policy for {} ({}s) changed: {}",
            collection,
            max_age_seconds,
            result.rows_affected() > 0
        );
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn find(&self, collection: &str) -> Result<Option<i64>, DbError> {
        let max_age: Option<i64> =
            sqlx::query_scalar("SELECT max_age_seconds FROM retention_policies WHERE collection = $1")
                .bind(collection)
                .fetch_optional(&self.pool)
                .await?;

        Ok(max_age)
    }
}
