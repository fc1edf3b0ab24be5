//! Findings and the entities they persist into.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;

use crate::severity::Severity;

/// A candidate vulnerability produced by the parser, before deduplication
/// and persistence.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Finding {
    pub host: IpAddr,
    pub severity: Severity,
    pub title: String,
    pub details: String,
}

/// A host, unique by IP string. Created implicitly whenever the parser
/// observes an address.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Host {
    pub ip: String,
    pub hostname: Option<String>,
    pub domain: Option<String>,
    pub os_info: Option<String>,
    pub criticality: String,
}

/// A persisted vulnerability row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vulnerability {
    pub id: i32,
    pub host_ip: String,
    pub module_source: String,
    pub title: String,
    pub severity: Severity,
    pub details: String,
    pub created_at: DateTime<Utc>,
}

/// Key/value pair substituted into every command template and exported into
/// the sandbox shell environment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalVar {
    pub key: String,
    pub value: String,
}
