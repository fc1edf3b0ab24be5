//! Scan tabs.

use sqlx::{PgPool, Row};

use redops_model::TabInfo;

use crate::error::Result;

#[derive(Clone, Debug)]
pub struct TabRepository {
    pool: PgPool,
}

impl TabRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn list(&self) -> Result<Vec<TabInfo>> {
        let rows = sqlx::query("SELECT id, name FROM scan_tabs ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter()
            .map(|row| {
                Ok(TabInfo {
                    id: row.try_get("id")?,
                    name: row.try_get("name")?,
                })
            })
            .collect()
    }

    pub async fn create(&self, name: &str) -> Result<i32> {
        let name = name.trim();
        let name = if name.is_empty() { "Scan" } else { name };
        let id: i32 =
            sqlx::query_scalar("INSERT INTO scan_tabs (name) VALUES ($1) RETURNING id")
                .bind(name)
                .fetch_one(&self.pool)
                .await?;
        Ok(id)
    }

    pub async fn rename(&self, tab_id: i32, name: &str) -> Result<()> {
        sqlx::query("UPDATE scan_tabs SET name = $2 WHERE id = $1")
            .bind(tab_id)
            .bind(name)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Deletes the tab; its tasks go with it through the FK cascade.
    pub async fn delete(&self, tab_id: i32) -> Result<()> {
        sqlx::query("DELETE FROM scan_tabs WHERE id = $1")
            .bind(tab_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
