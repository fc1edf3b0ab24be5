//! Global variable store.

use std::collections::BTreeMap;

use sqlx::{PgPool, Row};

use crate::error::Result;

#[derive(Clone, Debug)]
pub struct VarRepository {
    pool: PgPool,
}

impl VarRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Full key/value map, read at every command substitution.
    pub async fn all(&self) -> Result<BTreeMap<String, String>> {
        let rows = sqlx::query("SELECT key, value FROM global_vars")
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter()
            .map(|row| Ok((row.try_get("key")?, row.try_get("value")?)))
            .collect()
    }

    /// Upsert by key: the latest write wins.
    pub async fn set(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO global_vars (key, value)
            VALUES ($1, $2)
            ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value
            "#,
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn delete(&self, key: &str) -> Result<()> {
        sqlx::query("DELETE FROM global_vars WHERE key = $1")
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
