//! Result extraction.
//!
//! Converts a completed task's accumulated output into findings according
//! to the module's parsing rules, then persists hosts and deduplicated
//! vulnerabilities. Extraction is a pure function over the text so the
//! matching behaviour is testable without a database; persistence wraps it
//! in one transaction and always finalizes the task, because a parse
//! failure must never leave a task stuck in `parsing`.

use std::collections::BTreeSet;
use std::net::IpAddr;
use std::sync::{Arc, LazyLock};

use regex::Regex;
use sqlx::PgPool;
use tracing::{debug, warn};

use redops_model::{Finding, JsonRule, ScanTask, Severity, TaskStatus};

use crate::db::TaskRepository;
use crate::error::Result;
use crate::registry::{
    CompiledParsing, CompiledTextRule, ModuleRegistry, ParsingKind,
};

static PORT_TABLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+/tcp)\s+open\s+([\w-]+)").expect("static pattern"));

/// Everything the pure extraction phase learned from the output.
#[derive(Debug, Default)]
pub struct Extraction {
    pub findings: Vec<Finding>,
    /// Every address sighted, independent of rule matches.
    pub hosts: BTreeSet<IpAddr>,
}

/// Run the module's parsing rules over consolidated output.
pub fn extract(content: &str, parsing: &CompiledParsing, target: &str) -> Extraction {
    let target_ip = target.parse::<IpAddr>().ok();
    let mut out = Extraction::default();

    match &parsing.kind {
        ParsingKind::Text(rules) => {
            extract_text(content, parsing, rules, target_ip, &mut out)
        }
        ParsingKind::Block { separator } => {
            extract_blocks(content, parsing, separator.as_ref(), target_ip, &mut out)
        }
        ParsingKind::Json(rules) => {
            extract_json(content, parsing, rules, target_ip, &mut out)
        }
        ParsingKind::Line => {
            for line in content.lines() {
                sight_ip(line, parsing, &mut out);
            }
        }
    }

    out
}

/// First address in `text` matching the module's IP pattern, recorded as a
/// discovered host when it parses.
fn sight_ip(text: &str, parsing: &CompiledParsing, out: &mut Extraction) -> Option<IpAddr> {
    let matched = parsing.ip_extract.find(text)?;
    let ip = matched.as_str().parse::<IpAddr>().ok()?;
    out.hosts.insert(ip);
    Some(ip)
}

fn extract_text(
    content: &str,
    parsing: &CompiledParsing,
    rules: &[CompiledTextRule],
    target_ip: Option<IpAddr>,
    out: &mut Extraction,
) {
    for line in content.lines() {
        // Step banners and consolidation separators are all dashes.
        if line.contains("---") || line.trim().is_empty() {
            continue;
        }

        let host = sight_ip(line, parsing, out).or(target_ip);

        for rule in rules {
            if !rule.regex.is_match(line) {
                continue;
            }
            let Some(host) = host else { continue };
            out.findings.push(Finding {
                host,
                severity: Severity::from_badge(&rule.badge),
                title: rule.name.clone(),
                details: truncate(line.trim(), 250),
            });
        }
    }
}

fn extract_blocks(
    content: &str,
    parsing: &CompiledParsing,
    separator: Option<&Regex>,
    target_ip: Option<IpAddr>,
    out: &mut Extraction,
) {
    let blocks = split_blocks(content, separator);
    for block in blocks {
        let host = sight_ip(block, parsing, out).or(target_ip);

        if block.contains("open") {
            let ports: Vec<String> = PORT_TABLE
                .captures_iter(block)
                .map(|cap| format!("{}:{}", &cap[1], &cap[2]))
                .collect();
            if !ports.is_empty() {
                if let Some(host) = host {
                    out.findings.push(Finding {
                        host,
                        severity: Severity::Info,
                        title: "Ports Ouverts".to_string(),
                        details: ports.join(", "),
                    });
                }
            }
        }
    }
}

/// Split so every separator match starts a new block; content before the
/// first match is its own block, and no separator means one block.
fn split_blocks<'a>(content: &'a str, separator: Option<&Regex>) -> Vec<&'a str> {
    let Some(separator) = separator else {
        return vec![content];
    };

    let mut starts: Vec<usize> = vec![0];
    starts.extend(separator.find_iter(content).map(|m| m.start()));
    starts.dedup();

    starts
        .windows(2)
        .map(|w| &content[w[0]..w[1]])
        .chain(std::iter::once(
            &content[*starts.last().expect("starts never empty")..],
        ))
        .filter(|b| !b.is_empty())
        .collect()
}

fn extract_json(
    content: &str,
    parsing: &CompiledParsing,
    rules: &[JsonRule],
    target_ip: Option<IpAddr>,
    out: &mut Extraction,
) {
    // Tool output often prefixes the JSON document with log noise.
    let start = match (content.find('['), content.find('{')) {
        (Some(i), _) => i,
        (None, Some(i)) => i,
        (None, None) => return,
    };

    let data: serde_json::Value = match serde_json::from_str(&content[start..]) {
        Ok(value) => value,
        Err(err) => {
            debug!(%err, "output is not parseable JSON, no findings");
            return;
        }
    };

    let entries = match data {
        serde_json::Value::Array(entries) => entries,
        object @ serde_json::Value::Object(_) => vec![object],
        _ => return,
    };

    for entry in &entries {
        let Some(fields) = entry.as_object() else {
            continue;
        };

        // First embedded address wins as the entry's host.
        let mut host = None;
        for value in fields.values() {
            if let Some(text) = value.as_str() {
                if let Some(ip) = sight_ip(text, parsing, out) {
                    host = Some(ip);
                    break;
                }
            }
        }
        let host = host.or(target_ip);

        for rule in rules {
            let value = fields.get(&rule.condition_key);
            let matched = match value {
                Some(value) if rule.check_existence => value_is_present(value),
                Some(value) => match &rule.condition_value {
                    Some(needle) if value_is_present(value) => {
                        stringify(value).contains(needle.as_str())
                    }
                    _ => false,
                },
                None => false,
            };

            if matched {
                let Some(host) = host else { continue };
                out.findings.push(Finding {
                    host,
                    severity: Severity::from_badge(&rule.badge),
                    title: rule.name.clone(),
                    details: format!("Via {}", rule.condition_key),
                });
            }
        }
    }
}

fn value_is_present(value: &serde_json::Value) -> bool {
    match value {
        serde_json::Value::Null => false,
        serde_json::Value::Bool(b) => *b,
        serde_json::Value::Number(n) => n.as_f64() != Some(0.0),
        serde_json::Value::String(s) => !s.is_empty(),
        serde_json::Value::Array(a) => !a.is_empty(),
        serde_json::Value::Object(o) => !o.is_empty(),
    }
}

fn stringify(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

/// Persists extraction results and finalizes tasks.
#[derive(Clone)]
pub struct ResultParser {
    pool: PgPool,
    tasks: TaskRepository,
    registry: Arc<ModuleRegistry>,
}

impl std::fmt::Debug for ResultParser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultParser").finish_non_exhaustive()
    }
}

impl ResultParser {
    pub fn new(pool: PgPool, registry: Arc<ModuleRegistry>) -> Self {
        let tasks = TaskRepository::new(pool.clone());
        Self {
            pool,
            tasks,
            registry,
        }
    }

    /// Parse a task's accumulated output and finalize it.
    ///
    /// The task always leaves in a terminal display state: `hidden` when
    /// the module opts out of results, otherwise `completed` — even when
    /// extraction or persistence fails.
    pub async fn parse(&self, task_id: i32) -> Result<()> {
        let task = self.tasks.fetch(task_id).await?;

        let module = self.registry.get(&task.module_id);
        let content = task.result_content.as_deref().unwrap_or("");

        let Some(module) = module else {
            return self.tasks.set_status(task_id, TaskStatus::Completed).await;
        };
        let Some(parsing) = module.parsing.as_ref() else {
            return self.tasks.set_status(task_id, TaskStatus::Completed).await;
        };
        if !parsing.save_results {
            debug!(task_id, "module opted out of results, hiding task");
            return self.tasks.set_status(task_id, TaskStatus::Hidden).await;
        }
        if content.is_empty() {
            return self.tasks.set_status(task_id, TaskStatus::Completed).await;
        }

        let extraction = extract(content, parsing, &task.target);
        if let Err(err) = self.persist(&task, &extraction).await {
            // Best-effort finalization: the findings are lost but the task
            // must not stay in `parsing`.
            warn!(task_id, %err, "failed to persist findings");
        }

        self.tasks.set_status(task_id, TaskStatus::Completed).await
    }

    async fn persist(&self, task: &ScanTask, extraction: &Extraction) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        for host in &extraction.hosts {
            upsert_host(&mut tx, &host.to_string()).await?;
        }

        // Exact-tuple dedup first, then the (host, title) guard that keeps
        // repeated parser runs from re-inserting the same vulnerability.
        let mut seen = BTreeSet::new();
        for finding in &extraction.findings {
            let key = (
                finding.host,
                finding.title.clone(),
                finding.severity,
                finding.details.clone(),
            );
            if !seen.insert(key) {
                continue;
            }

            let host_ip = finding.host.to_string();
            upsert_host(&mut tx, &host_ip).await?;

            let exists: Option<i32> = sqlx::query_scalar(
                "SELECT id FROM vulnerabilities WHERE host_ip = $1 AND title = $2 LIMIT 1",
            )
            .bind(&host_ip)
            .bind(&finding.title)
            .fetch_optional(&mut *tx)
            .await?;
            if exists.is_some() {
                continue;
            }

            sqlx::query(
                r#"
                INSERT INTO vulnerabilities (host_ip, module_source, title, severity, details)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(&host_ip)
            .bind(&task.module_name)
            .bind(&finding.title)
            .bind(finding.severity.as_str())
            .bind(&finding.details)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        debug!(
            task_id = task.id,
            findings = extraction.findings.len(),
            hosts = extraction.hosts.len(),
            "parsing finished"
        );
        Ok(())
    }
}

async fn upsert_host(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    ip: &str,
) -> Result<()> {
    sqlx::query("INSERT INTO hosts (ip) VALUES ($1) ON CONFLICT (ip) DO NOTHING")
        .bind(ip)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use redops_model::{ParsingDef, TextRule};

    fn text_parsing(rules: Vec<TextRule>) -> CompiledParsing {
        crate::registry::compile(redops_model::ModuleDefinition {
            id: "t".into(),
            name: "T".into(),
            command: Some("true".into()),
            steps: None,
            parsing: Some(ParsingDef::Text {
                ip_extract: None,
                rules,
                save_results: true,
            }),
            checklist_keys: None,
            inputs: None,
        })
        .unwrap()
        .parsing
        .unwrap()
    }

    fn rule(name: &str, regex: &str, badge: &str) -> TextRule {
        TextRule {
            name: name.into(),
            regex: regex.into(),
            badge: badge.into(),
        }
    }

    #[test]
    fn text_mode_matches_rules_per_line() {
        let parsing = text_parsing(vec![rule(
            "SMB signing disabled",
            "signing:False",
            "DANGER",
        )]);
        let content = "SMB 192.168.1.10 445 DC01 signing:False\n\
                       SMB 192.168.1.11 445 WS02 signing:True\n";

        let out = extract(content, &parsing, "192.168.1.0/24");
        assert_eq!(out.findings.len(), 1);
        assert_eq!(out.findings[0].host.to_string(), "192.168.1.10");
        assert_eq!(out.findings[0].severity, Severity::High);
        assert_eq!(out.hosts.len(), 2);
    }

    #[test]
    fn text_mode_skips_separator_and_blank_lines() {
        let parsing = text_parsing(vec![rule("Any", ".", "INFO")]);
        let content = "--- STEP 0: Execution ---\n\n   \npayload 10.0.0.5 hit\n";

        let out = extract(content, &parsing, "10.0.0.5");
        assert_eq!(out.findings.len(), 1);
        assert_eq!(out.findings[0].details, "payload 10.0.0.5 hit");
    }

    #[test]
    fn banner_lines_never_become_hosts_or_findings() {
        let parsing = text_parsing(vec![rule(
            "Anonymous FTP allowed",
            "ftp-anon",
            "DANGER",
        )]);
        // Step header and command line as the engine writes them; the tool
        // itself produced nothing with an address in it.
        let content = "--- Step 1/1: Execution ---\n\
                       --- CMD: nmap -p21 --script ftp-anon 10.0.0.5 ---\n\n\
                       Note: Host seems down.\n";

        let out = extract(content, &parsing, "10.0.0.5");
        assert!(out.findings.is_empty());
        assert!(out.hosts.is_empty());
    }

    #[test]
    fn text_mode_falls_back_to_valid_address_target() {
        let parsing = text_parsing(vec![rule("Hit", "vulnerable", "MOYEN")]);

        let out = extract("service is vulnerable\n", &parsing, "10.1.2.3");
        assert_eq!(out.findings.len(), 1);
        assert_eq!(out.findings[0].host.to_string(), "10.1.2.3");
        assert_eq!(out.findings[0].severity, Severity::Medium);

        // CIDR and hostname targets are not addresses: the line is dropped.
        let out = extract("service is vulnerable\n", &parsing, "10.1.2.0/24");
        assert!(out.findings.is_empty());
        let out = extract("service is vulnerable\n", &parsing, "dc01.corp.local");
        assert!(out.findings.is_empty());
    }

    #[test]
    fn text_mode_truncates_details() {
        let parsing = text_parsing(vec![rule("Long", "AAA", "INFO")]);
        let long_line = format!("10.0.0.1 AAA {}", "x".repeat(400));

        let out = extract(&long_line, &parsing, "Workflow");
        assert_eq!(out.findings[0].details.chars().count(), 250);
    }

    fn block_parsing(separator: Option<&str>) -> CompiledParsing {
        crate::registry::compile(redops_model::ModuleDefinition {
            id: "b".into(),
            name: "B".into(),
            command: Some("true".into()),
            steps: None,
            parsing: Some(ParsingDef::Block {
                ip_extract: None,
                block_separator: separator.map(Into::into),
                save_results: true,
            }),
            checklist_keys: None,
            inputs: None,
        })
        .unwrap()
        .parsing
        .unwrap()
    }

    #[test]
    fn block_mode_collects_open_ports_per_block() {
        let parsing = block_parsing(Some("regex:Nmap scan report"));
        let content = "\
Nmap scan report for 192.168.1.10
22/tcp   open  ssh
445/tcp  open  microsoft-ds
Nmap scan report for 192.168.1.20
80/tcp   open  http
";

        let out = extract(content, &parsing, "192.168.1.0/24");
        assert_eq!(out.findings.len(), 2);
        assert_eq!(out.findings[0].title, "Ports Ouverts");
        assert_eq!(out.findings[0].details, "22/tcp:ssh, 445/tcp:microsoft-ds");
        assert_eq!(out.findings[1].details, "80/tcp:http");
        assert_eq!(out.hosts.len(), 2);
    }

    #[test]
    fn block_mode_without_separator_is_one_block() {
        let parsing = block_parsing(None);
        let content = "host 10.0.0.9\n21/tcp open ftp\n80/tcp open http\n";

        let out = extract(content, &parsing, "10.0.0.0/24");
        assert_eq!(out.findings.len(), 1);
        assert_eq!(out.findings[0].details, "21/tcp:ftp, 80/tcp:http");
    }

    fn json_parsing(rules: Vec<JsonRule>) -> CompiledParsing {
        crate::registry::compile(redops_model::ModuleDefinition {
            id: "j".into(),
            name: "J".into(),
            command: Some("true".into()),
            steps: None,
            parsing: Some(ParsingDef::Json {
                ip_extract: None,
                rules,
                save_results: true,
            }),
            checklist_keys: None,
            inputs: None,
        })
        .unwrap()
        .parsing
        .unwrap()
    }

    #[test]
    fn json_mode_tolerates_leading_noise_and_single_object() {
        let rules = vec![JsonRule {
            name: "Kerberoastable account".into(),
            badge: "DANGER".into(),
            condition_key: "hash".into(),
            check_existence: true,
            condition_value: None,
        }];
        let parsing = json_parsing(rules);
        let content = "[*] connecting...\n{\"host\": \"10.0.0.7\", \"hash\": \"$krb5tgs$23$...\"}";

        let out = extract(content, &parsing, "Workflow");
        assert_eq!(out.findings.len(), 1);
        assert_eq!(out.findings[0].host.to_string(), "10.0.0.7");
        assert_eq!(out.findings[0].details, "Via hash");
    }

    #[test]
    fn json_mode_substring_condition() {
        let rules = vec![JsonRule {
            name: "Signing off".into(),
            badge: "MOYEN".into(),
            condition_key: "signing".into(),
            check_existence: false,
            condition_value: Some("False".into()),
        }];
        let parsing = json_parsing(rules);
        let content = r#"[
            {"ip": "10.0.0.1", "signing": "False"},
            {"ip": "10.0.0.2", "signing": "True"}
        ]"#;

        let out = extract(content, &parsing, "Workflow");
        assert_eq!(out.findings.len(), 1);
        assert_eq!(out.findings[0].host.to_string(), "10.0.0.1");
        assert_eq!(out.hosts.len(), 2);
    }

    #[test]
    fn line_mode_discovers_hosts_without_findings() {
        let compiled = crate::registry::compile(redops_model::ModuleDefinition {
            id: "l".into(),
            name: "L".into(),
            command: Some("true".into()),
            steps: None,
            parsing: Some(ParsingDef::Line {
                ip_extract: None,
                save_results: true,
            }),
            checklist_keys: None,
            inputs: None,
        })
        .unwrap();
        let parsing = compiled.parsing.unwrap();

        let out = extract("alive: 172.16.0.4\nalive: 172.16.0.9\n", &parsing, "x");
        assert!(out.findings.is_empty());
        assert_eq!(out.hosts.len(), 2);
    }
}
