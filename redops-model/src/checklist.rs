//! Pentest-methodology checklist records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A named methodology item, seeded from the checklist definition file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChecklistDefinition {
    pub key: String,
    pub category: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
}

/// Per-target progress on one checklist item. Composite key
/// (target, checklist_key); upserted, removed only by cascade when the
/// definition disappears.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChecklistStatus {
    pub target: String,
    pub checklist_key: String,
    pub is_checked: bool,
    pub updated_at: DateTime<Utc>,
}
