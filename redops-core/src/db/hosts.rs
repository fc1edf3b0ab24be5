//! Hosts and their vulnerabilities.

use sqlx::{PgPool, Row};

use redops_model::{Severity, VulnRow};

use crate::error::{EngineError, Result};

#[derive(Clone, Debug)]
pub struct HostRepository {
    pool: PgPool,
}

/// (host_ip, severity, count) aggregate feeding the host summary.
#[derive(Debug, Clone)]
pub struct SeverityCount {
    pub host_ip: String,
    pub severity: Severity,
    pub count: i64,
}

impl HostRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn upsert_host(&self, ip: &str) -> Result<()> {
        sqlx::query("INSERT INTO hosts (ip) VALUES ($1) ON CONFLICT (ip) DO NOTHING")
            .bind(ip)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Every known host address.
    pub async fn list_ips(&self) -> Result<Vec<String>> {
        let ips = sqlx::query_scalar("SELECT ip FROM hosts ORDER BY ip")
            .fetch_all(&self.pool)
            .await?;
        Ok(ips)
    }

    /// Vulnerability counts per (host, severity) across the whole store.
    pub async fn severity_counts(&self) -> Result<Vec<SeverityCount>> {
        let rows = sqlx::query(
            r#"
            SELECT host_ip, severity, COUNT(*) AS n
            FROM vulnerabilities
            GROUP BY host_ip, severity
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                let severity_raw: String = row.try_get("severity")?;
                let severity = severity_raw.parse::<Severity>().map_err(|e| {
                    EngineError::Internal(format!("corrupt severity column: {e}"))
                })?;
                Ok(SeverityCount {
                    host_ip: row.try_get("host_ip")?,
                    severity,
                    count: row.try_get("n")?,
                })
            })
            .collect()
    }

    /// Free-text vulnerability search with optional severity filter.
    pub async fn search_vulns(
        &self,
        query: &str,
        severity: Option<Severity>,
        limit: i64,
    ) -> Result<Vec<VulnRow>> {
        let sql = "SELECT id, host_ip, title, severity, module_source, details, \
             to_char(created_at, 'YYYY-MM-DD HH24:MI') AS date \
             FROM vulnerabilities \
             WHERE ($1::text IS NULL OR severity = $1) \
               AND (host_ip ILIKE $2 OR title ILIKE $2 OR details ILIKE $2 OR module_source ILIKE $2) \
             ORDER BY created_at DESC LIMIT $3";

        let wildcard = format!("%{query}%");
        let rows = sqlx::query(sql)
            .bind(severity.map(|s| s.as_str()))
            .bind(wildcard)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter()
            .map(|row| {
                let severity_raw: String = row.try_get("severity")?;
                let severity = severity_raw.parse::<Severity>().map_err(|e| {
                    EngineError::Internal(format!("corrupt severity column: {e}"))
                })?;
                Ok(VulnRow {
                    id: row.try_get("id")?,
                    ip: row.try_get("host_ip")?,
                    title: row.try_get("title")?,
                    severity,
                    module: row.try_get("module_source")?,
                    details: row.try_get("details")?,
                    date: row.try_get("date")?,
                })
            })
            .collect()
    }

    pub async fn vuln_details(&self, vuln_id: i32) -> Result<String> {
        sqlx::query_scalar("SELECT details FROM vulnerabilities WHERE id = $1")
            .bind(vuln_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("vulnerability {vuln_id}")))
    }
}
