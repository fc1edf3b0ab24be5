//! Idempotent schema creation and seeding.

use sqlx::PgPool;
use tracing::{info, warn};

use redops_model::ChecklistDefinition;

use crate::error::Result;

const TABLES: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS scan_tabs (
        id SERIAL PRIMARY KEY,
        name TEXT NOT NULL,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS scan_tasks (
        id SERIAL PRIMARY KEY,
        tab_id INTEGER REFERENCES scan_tabs(id) ON DELETE CASCADE,
        module_id TEXT NOT NULL,
        module_name TEXT NOT NULL,
        command_executed TEXT NOT NULL DEFAULT '',
        status TEXT NOT NULL DEFAULT 'pending',
        pid INTEGER,
        log_file TEXT,
        result_content TEXT,
        target TEXT NOT NULL,
        current_step INTEGER NOT NULL DEFAULT 0,
        context TEXT NOT NULL DEFAULT '{}',
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS hosts (
        ip TEXT PRIMARY KEY,
        hostname TEXT,
        domain TEXT,
        os_info TEXT,
        criticality TEXT NOT NULL DEFAULT 'low',
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS vulnerabilities (
        id SERIAL PRIMARY KEY,
        host_ip TEXT REFERENCES hosts(ip) ON DELETE CASCADE,
        module_source TEXT NOT NULL,
        title TEXT NOT NULL,
        severity TEXT NOT NULL,
        details TEXT NOT NULL DEFAULT '',
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS global_vars (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS checklist_definitions (
        key TEXT PRIMARY KEY,
        category TEXT NOT NULL,
        name TEXT NOT NULL,
        description TEXT NOT NULL DEFAULT ''
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS checklist_status (
        target TEXT NOT NULL,
        checklist_key TEXT REFERENCES checklist_definitions(key) ON DELETE CASCADE,
        is_checked BOOLEAN NOT NULL DEFAULT FALSE,
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        PRIMARY KEY (target, checklist_key)
    )
    "#,
];

/// Create all tables, seed the default tab and the checklist definitions.
pub async fn init_schema(
    pool: &PgPool,
    checklist: &[ChecklistDefinition],
) -> Result<()> {
    for ddl in TABLES {
        sqlx::query(ddl).execute(pool).await?;
    }

    let tab_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM scan_tabs")
        .fetch_one(pool)
        .await?;
    if tab_count == 0 {
        sqlx::query("INSERT INTO scan_tabs (name) VALUES ('Scan 1')")
            .execute(pool)
            .await?;
    }

    for item in checklist {
        sqlx::query(
            r#"
            INSERT INTO checklist_definitions (key, category, name, description)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (key) DO NOTHING
            "#,
        )
        .bind(&item.key)
        .bind(&item.category)
        .bind(&item.name)
        .bind(&item.description)
        .execute(pool)
        .await?;
    }

    info!(checklist_items = checklist.len(), "database schema ready");
    Ok(())
}

/// Load checklist definitions from a YAML seed file. A missing or broken
/// file degrades to an empty checklist with a warning.
pub fn load_checklist_seed(path: &std::path::Path) -> Vec<ChecklistDefinition> {
    match std::fs::read_to_string(path) {
        Ok(raw) => match serde_yaml::from_str::<Vec<ChecklistDefinition>>(&raw) {
            Ok(items) => items,
            Err(err) => {
                warn!(?path, %err, "checklist seed file is malformed");
                Vec::new()
            }
        },
        Err(err) => {
            warn!(?path, %err, "checklist seed file unreadable");
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seed_file_parses() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("checklist.yaml");
        std::fs::write(
            &path,
            r#"
- key: smb_signing
  category: Active Directory
  name: SMB signing audit
  description: Check for hosts not requiring SMB signing
- key: anon_ftp
  category: Services
  name: Anonymous FTP
"#,
        )
        .unwrap();

        let items = load_checklist_seed(&path);
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].key, "smb_signing");
        assert_eq!(items[1].description, "");
    }

    #[test]
    fn missing_seed_file_is_empty() {
        let items =
            load_checklist_seed(std::path::Path::new("/nonexistent/checklist.yaml"));
        assert!(items.is_empty());
    }
}
