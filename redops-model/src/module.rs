//! Declarative module definitions.
//!
//! A module is one scan capability: either a single `command` template or an
//! ordered list of `steps`, plus the parsing rules that turn its raw output
//! into findings. Definitions are YAML files on disk; this module only holds
//! their serde shape — pattern compilation and validation happen in the
//! registry, so a bad regex is rejected when the file is loaded rather than
//! when a task finishes.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Default dotted-quad IPv4 matcher used when a module declares no
/// `ip_extract` pattern of its own.
pub const DEFAULT_IP_PATTERN: &str =
    r"\b((?:25[0-5]|2[0-4][0-9]|[01]?[0-9][0-9]?)\.){3}(?:25[0-5]|2[0-4][0-9]|[01]?[0-9][0-9]?)\b";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleDefinition {
    pub id: String,
    pub name: String,
    /// Single-command ("manual") mode. Mutually exclusive with `steps` in
    /// practice; when both are present, `steps` wins.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    /// Multi-step ("workflow") mode.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub steps: Option<Vec<StepDef>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parsing: Option<ParsingDef>,
    /// Checklist item keys this module satisfies for its target on
    /// completion.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checklist_keys: Option<Vec<String>>,
    /// Free-form input descriptors, passed through to clients untouched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inputs: Option<serde_json::Value>,
}

impl ModuleDefinition {
    /// Workflow modules carry `steps`; everything else is single-command.
    pub fn is_workflow(&self) -> bool {
        self.steps.is_some()
    }

    /// Number of steps this module runs (single-command counts as one).
    pub fn step_count(&self) -> usize {
        match &self.steps {
            Some(steps) => steps.len(),
            None => 1,
        }
    }
}

/// One command within a workflow module.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepDef {
    pub command: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Template gating the step: if it still contains unresolved
    /// placeholders (or renders blank) after context substitution, the step
    /// is skipped.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    /// Variable name → regex run against the step output; the first match
    /// populates the task context.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extract: Option<BTreeMap<String, String>>,
}

impl StepDef {
    pub fn label(&self, index: usize) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| format!("Step {}", index + 1))
    }
}

/// Parsing configuration, tagged by `mode`.
///
/// `line` is the degenerate default: host discovery only, no rules. Unknown
/// modes are normalized to `line` by the registry before this type is built.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum ParsingDef {
    Line {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        ip_extract: Option<String>,
        #[serde(default = "default_save_results")]
        save_results: bool,
    },
    Text {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        ip_extract: Option<String>,
        #[serde(default)]
        rules: Vec<TextRule>,
        #[serde(default = "default_save_results")]
        save_results: bool,
    },
    Block {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        ip_extract: Option<String>,
        /// Separator pattern; a `regex:` prefix is tolerated and stripped.
        /// Absent separator means the whole output is one block.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        block_separator: Option<String>,
        #[serde(default = "default_save_results")]
        save_results: bool,
    },
    Json {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        ip_extract: Option<String>,
        #[serde(default)]
        rules: Vec<JsonRule>,
        #[serde(default = "default_save_results")]
        save_results: bool,
    },
}

fn default_save_results() -> bool {
    true
}

impl ParsingDef {
    pub fn save_results(&self) -> bool {
        match self {
            ParsingDef::Line { save_results, .. }
            | ParsingDef::Text { save_results, .. }
            | ParsingDef::Block { save_results, .. }
            | ParsingDef::Json { save_results, .. } => *save_results,
        }
    }

    pub fn ip_extract(&self) -> Option<&str> {
        match self {
            ParsingDef::Line { ip_extract, .. }
            | ParsingDef::Text { ip_extract, .. }
            | ParsingDef::Block { ip_extract, .. }
            | ParsingDef::Json { ip_extract, .. } => ip_extract.as_deref(),
        }
    }
}

/// Line-matching rule for `text` mode.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextRule {
    pub name: String,
    pub regex: String,
    #[serde(default)]
    pub badge: String,
}

/// Field-matching rule for `json` mode. A rule matches when the named field
/// exists non-empty (`check_existence`) or when `condition_value` is a
/// substring of the field's stringified value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRule {
    pub name: String,
    #[serde(default)]
    pub badge: String,
    pub condition_key: String,
    #[serde(default)]
    pub check_existence: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition_value: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn workflow_detection() {
        let manual = ModuleDefinition {
            id: "nmap_quick".into(),
            name: "Nmap Quick".into(),
            command: Some("nmap -F {{target}}".into()),
            steps: None,
            parsing: None,
            checklist_keys: None,
            inputs: None,
        };
        assert!(!manual.is_workflow());
        assert_eq!(manual.step_count(), 1);

        let workflow = ModuleDefinition {
            steps: Some(vec![
                StepDef {
                    command: "whoami".into(),
                    name: None,
                    condition: None,
                    extract: None,
                },
                StepDef {
                    command: "id {{user}}".into(),
                    name: Some("Lookup".into()),
                    condition: Some("{{user}}".into()),
                    extract: None,
                },
            ]),
            command: None,
            ..manual
        };
        assert!(workflow.is_workflow());
        assert_eq!(workflow.step_count(), 2);
    }

    #[test]
    fn parsing_def_deserializes_from_yaml() {
        let yaml = r#"
mode: text
ip_extract: '(\d+\.\d+\.\d+\.\d+)'
rules:
  - name: "Anonymous FTP"
    regex: "Anonymous.*allowed"
    badge: "DANGER"
"#;
        let def: ParsingDef = serde_yaml::from_str(yaml).unwrap();
        match &def {
            ParsingDef::Text { rules, .. } => {
                assert_eq!(rules.len(), 1);
                assert_eq!(rules[0].badge, "DANGER");
            }
            other => panic!("expected text mode, got {other:?}"),
        }
        assert!(def.save_results());
    }

    #[test]
    fn save_results_false_round_trip() {
        let yaml = "mode: line\nsave_results: false\n";
        let def: ParsingDef = serde_yaml::from_str(yaml).unwrap();
        assert!(!def.save_results());
    }
}
