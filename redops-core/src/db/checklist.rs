//! Checklist definitions and per-target progress.

use std::collections::BTreeMap;

use sqlx::{PgPool, Row};

use redops_model::ChecklistEntry;

use crate::error::{EngineError, Result};

#[derive(Clone, Debug)]
pub struct ChecklistRepository {
    pool: PgPool,
}

impl ChecklistRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Mark an item done (or not) for a target. Upsert on the composite
    /// key; re-checking just refreshes the timestamp.
    pub async fn set_checked(
        &self,
        target: &str,
        key: &str,
        is_checked: bool,
    ) -> Result<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO checklist_status (target, checklist_key, is_checked, updated_at)
            VALUES ($1, $2, $3, NOW())
            ON CONFLICT (target, checklist_key)
            DO UPDATE SET is_checked = EXCLUDED.is_checked, updated_at = NOW()
            "#,
        )
        .bind(target)
        .bind(key)
        .bind(is_checked)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            // FK violation: the checklist key does not exist.
            Err(sqlx::Error::Database(err)) if err.is_foreign_key_violation() => {
                Err(EngineError::NotFound(format!("checklist key '{key}'")))
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Checklist grouped by category, each item carrying the targets that
    /// validated it.
    pub async fn grouped(&self) -> Result<BTreeMap<String, Vec<ChecklistEntry>>> {
        let rows = sqlx::query(
            r#"
            SELECT d.category, d.name, d.description, d.key,
                   array_agg(DISTINCT s.target)
                       FILTER (WHERE s.is_checked IS TRUE) AS targets_done
            FROM checklist_definitions d
            LEFT JOIN checklist_status s ON d.key = s.checklist_key
            GROUP BY d.category, d.name, d.description, d.key
            ORDER BY d.category, d.name
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut grouped: BTreeMap<String, Vec<ChecklistEntry>> = BTreeMap::new();
        for row in rows {
            let category: String = row.try_get("category")?;
            let targets: Option<Vec<String>> = row.try_get("targets_done")?;
            grouped.entry(category).or_default().push(ChecklistEntry {
                key: row.try_get("key")?,
                name: row.try_get("name")?,
                description: row.try_get("description")?,
                targets: targets.unwrap_or_default(),
            });
        }
        Ok(grouped)
    }
}
