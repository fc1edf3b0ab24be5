//! Vulnerability severity tiers.
//!
//! The parser classifies findings from free-text "badge" labels coming out
//! of module definitions. Historical module packs label severities in
//! French, so both English and French tokens are accepted on input; the
//! canonical wire/storage form is the upper-case English name.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Info,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Map a free-text badge label to a tier. Case-insensitive substring
    /// match, first rule wins; anything unrecognized is informational.
    pub fn from_badge(badge: &str) -> Self {
        let badge = badge.to_uppercase();
        if ["CRITIQUE", "PWNED", "ADMIN"].iter().any(|t| badge.contains(t)) {
            Severity::Critical
        } else if ["DANGER", "ELEVÉ", "GOLDEN"].iter().any(|t| badge.contains(t))
        {
            Severity::High
        } else if ["MOYEN", "RISQUE"].iter().any(|t| badge.contains(t)) {
            Severity::Medium
        } else {
            Severity::Info
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Info => "INFO",
            Severity::Medium => "MEDIUM",
            Severity::High => "HIGH",
            Severity::Critical => "CRITICAL",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("unknown severity: {0}")]
pub struct ParseSeverityError(String);

impl FromStr for Severity {
    type Err = ParseSeverityError;

    /// Accepts canonical English names and the French tokens used by
    /// legacy module packs.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "INFO" => Ok(Severity::Info),
            "MEDIUM" | "MOYEN" => Ok(Severity::Medium),
            "HIGH" | "ELEVÉ" | "ELEVE" => Ok(Severity::High),
            "CRITICAL" | "CRITIQUE" => Ok(Severity::Critical),
            other => Err(ParseSeverityError(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn badge_mapping() {
        assert_eq!(Severity::from_badge("PWNED"), Severity::Critical);
        assert_eq!(Severity::from_badge("Admin obtenu"), Severity::Critical);
        assert_eq!(Severity::from_badge("Golden Ticket"), Severity::High);
        assert_eq!(Severity::from_badge("Danger"), Severity::High);
        assert_eq!(Severity::from_badge("Risque moyen"), Severity::Medium);
        assert_eq!(Severity::from_badge("unknown"), Severity::Info);
        assert_eq!(Severity::from_badge(""), Severity::Info);
    }

    #[test]
    fn french_tokens_parse() {
        assert_eq!("CRITIQUE".parse::<Severity>().unwrap(), Severity::Critical);
        assert_eq!("ELEVÉ".parse::<Severity>().unwrap(), Severity::High);
        assert_eq!("moyen".parse::<Severity>().unwrap(), Severity::Medium);
        assert!("bogus".parse::<Severity>().is_err());
    }

    #[test]
    fn ordering_is_ascending() {
        assert!(Severity::Info < Severity::Medium);
        assert!(Severity::Medium < Severity::High);
        assert!(Severity::High < Severity::Critical);
    }
}
