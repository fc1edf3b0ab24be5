//! Versioned module registry.
//!
//! Module definitions live as YAML files in a directory that operators edit
//! while the server runs. The registry loads them into an immutable
//! snapshot: every pattern is compiled up front so configuration mistakes
//! surface at load time with a warning instead of at parse time, and
//! lookups hand out cheap `Arc` clones of the compiled form. A new snapshot
//! is swapped in atomically by [`ModuleRegistry::reload`]; nothing re-reads
//! the directory implicitly.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use regex::Regex;
use tracing::{debug, warn};

use redops_model::{
    DEFAULT_IP_PATTERN, JsonRule, ModuleDefinition, ParsingDef, StepDef,
};

use crate::error::{EngineError, Result};

/// A `text`-mode rule with its pattern compiled.
#[derive(Debug, Clone)]
pub struct CompiledTextRule {
    pub name: String,
    pub regex: Regex,
    pub badge: String,
}

/// Mode-specific compiled parsing behaviour.
#[derive(Debug, Clone)]
pub enum ParsingKind {
    /// Host discovery only.
    Line,
    Text(Vec<CompiledTextRule>),
    Block { separator: Option<Regex> },
    Json(Vec<JsonRule>),
}

/// A module's parsing configuration with every pattern compiled.
#[derive(Debug, Clone)]
pub struct CompiledParsing {
    pub save_results: bool,
    pub ip_extract: Regex,
    pub kind: ParsingKind,
}

/// A loaded module: the raw definition plus compiled per-step extraction
/// patterns and parsing rules.
#[derive(Debug, Clone)]
pub struct CompiledModule {
    pub def: ModuleDefinition,
    pub parsing: Option<CompiledParsing>,
    /// Parallel to `def.steps`; empty map for steps without `extract`.
    pub step_extracts: Vec<BTreeMap<String, Regex>>,
}

impl CompiledModule {
    pub fn id(&self) -> &str {
        &self.def.id
    }

    pub fn step(&self, index: usize) -> Option<&StepDef> {
        self.def.steps.as_ref()?.get(index)
    }

    pub fn extracts_for_step(&self, index: usize) -> Option<&BTreeMap<String, Regex>> {
        self.step_extracts.get(index).filter(|m| !m.is_empty())
    }
}

#[derive(Debug, Default)]
struct Snapshot {
    version: u64,
    by_id: BTreeMap<String, Arc<CompiledModule>>,
}

/// Snapshot registry over a directory of YAML module files.
#[derive(Debug)]
pub struct ModuleRegistry {
    dir: PathBuf,
    snapshot: RwLock<Arc<Snapshot>>,
}

impl ModuleRegistry {
    /// Create an empty registry rooted at `dir`. Call [`reload`] to
    /// populate it.
    ///
    /// [`reload`]: ModuleRegistry::reload
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            snapshot: RwLock::new(Arc::new(Snapshot::default())),
        }
    }

    /// Re-read the module directory and swap in a fresh snapshot.
    /// Malformed files are skipped with a warning; a missing directory
    /// yields an empty registry. Returns the number of modules loaded.
    pub fn reload(&self) -> Result<usize> {
        let mut by_id = BTreeMap::new();

        if self.dir.is_dir() {
            let mut files = Vec::new();
            collect_yaml_files(&self.dir, &mut files)?;
            files.sort();

            for path in files {
                match load_module(&path) {
                    Ok(module) => {
                        let id = module.id().to_string();
                        if by_id.insert(id.clone(), Arc::new(module)).is_some() {
                            warn!(module = %id, ?path, "duplicate module id, keeping the later file");
                        }
                    }
                    Err(err) => {
                        warn!(?path, %err, "skipping malformed module definition");
                    }
                }
            }
        } else {
            warn!(dir = ?self.dir, "module directory does not exist");
        }

        let count = by_id.len();
        let mut guard = self
            .snapshot
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let version = guard.version + 1;
        *guard = Arc::new(Snapshot { version, by_id });
        debug!(count, version, "module registry reloaded");
        Ok(count)
    }

    /// Resolve a module by identifier from the current snapshot.
    pub fn get(&self, id: &str) -> Option<Arc<CompiledModule>> {
        self.current().by_id.get(id).cloned()
    }

    /// All module definitions in the current snapshot, id order.
    pub fn list(&self) -> Vec<ModuleDefinition> {
        self.current()
            .by_id
            .values()
            .map(|m| m.def.clone())
            .collect()
    }

    /// Monotonic snapshot version, bumped on every reload.
    pub fn version(&self) -> u64 {
        self.current().version
    }

    fn current(&self) -> Arc<Snapshot> {
        self.snapshot
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

fn collect_yaml_files(dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_yaml_files(&path, out)?;
        } else if matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("yaml" | "yml")
        ) {
            out.push(path);
        }
    }
    Ok(())
}

fn load_module(path: &Path) -> Result<CompiledModule> {
    let raw = std::fs::read_to_string(path)?;
    let def: ModuleDefinition = serde_yaml::from_str(&raw)
        .map_err(|e| EngineError::InvalidModule(e.to_string()))?;
    compile(def)
}

/// Validate a definition, compiling every pattern it declares.
pub fn compile(def: ModuleDefinition) -> Result<CompiledModule> {
    let parsing = def.parsing.clone().map(compile_parsing).transpose()?;

    let step_extracts = match &def.steps {
        Some(steps) => steps
            .iter()
            .map(compile_extracts)
            .collect::<Result<Vec<_>>>()?,
        None => Vec::new(),
    };

    Ok(CompiledModule {
        def,
        parsing,
        step_extracts,
    })
}

fn compile_extracts(step: &StepDef) -> Result<BTreeMap<String, Regex>> {
    let mut compiled = BTreeMap::new();
    if let Some(extract) = &step.extract {
        for (var, pattern) in extract {
            let regex = Regex::new(pattern).map_err(|e| {
                EngineError::InvalidModule(format!(
                    "extract pattern for '{var}' does not compile: {e}"
                ))
            })?;
            compiled.insert(var.clone(), regex);
        }
    }
    Ok(compiled)
}

fn compile_parsing(def: ParsingDef) -> Result<CompiledParsing> {
    let save_results = def.save_results();
    let ip_extract = def.ip_extract().unwrap_or(DEFAULT_IP_PATTERN);
    let ip_extract = Regex::new(ip_extract).map_err(|e| {
        EngineError::InvalidModule(format!("ip_extract does not compile: {e}"))
    })?;

    let kind = match def {
        ParsingDef::Line { .. } => ParsingKind::Line,
        ParsingDef::Text { rules, .. } => {
            let compiled = rules
                .into_iter()
                .map(|rule| {
                    Regex::new(&rule.regex)
                        .map(|regex| CompiledTextRule {
                            name: rule.name,
                            regex,
                            badge: rule.badge,
                        })
                        .map_err(|e| {
                            EngineError::InvalidModule(format!(
                                "rule pattern does not compile: {e}"
                            ))
                        })
                })
                .collect::<Result<Vec<_>>>()?;
            ParsingKind::Text(compiled)
        }
        ParsingDef::Block {
            block_separator, ..
        } => {
            let separator = block_separator
                .as_deref()
                .map(|s| s.trim_start_matches("regex:"))
                .filter(|s| !s.is_empty())
                .map(Regex::new)
                .transpose()
                .map_err(|e| {
                    EngineError::InvalidModule(format!(
                        "block_separator does not compile: {e}"
                    ))
                })?;
            ParsingKind::Block { separator }
        }
        ParsingDef::Json { rules, .. } => ParsingKind::Json(rules),
    };

    Ok(CompiledParsing {
        save_results,
        ip_extract,
        kind,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write_module(dir: &Path, name: &str, content: &str) {
        fs::write(dir.join(name), content).unwrap();
    }

    #[test]
    fn loads_valid_modules_and_skips_broken_ones() {
        let dir = tempfile::tempdir().unwrap();
        write_module(
            dir.path(),
            "nmap.yaml",
            r#"
id: nmap_full
name: Nmap Full
command: "nmap -sV {{target}}"
parsing:
  mode: block
  block_separator: "regex:Nmap scan report"
"#,
        );
        write_module(dir.path(), "broken.yaml", "id: [not, a, module");

        let registry = ModuleRegistry::new(dir.path());
        assert_eq!(registry.reload().unwrap(), 1);
        assert!(registry.get("nmap_full").is_some());
        assert!(registry.get("broken").is_none());
    }

    #[test]
    fn bad_regex_rejects_the_module() {
        let dir = tempfile::tempdir().unwrap();
        write_module(
            dir.path(),
            "bad.yaml",
            r#"
id: bad_rule
name: Bad Rule
command: "true"
parsing:
  mode: text
  rules:
    - name: Broken
      regex: "((("
      badge: INFO
"#,
        );

        let registry = ModuleRegistry::new(dir.path());
        assert_eq!(registry.reload().unwrap(), 0);
    }

    #[test]
    fn reload_bumps_version_and_sees_new_files() {
        let dir = tempfile::tempdir().unwrap();
        let registry = ModuleRegistry::new(dir.path());
        registry.reload().unwrap();
        let v1 = registry.version();

        write_module(
            dir.path(),
            "whoami.yaml",
            "id: whoami\nname: Whoami\ncommand: whoami\n",
        );
        registry.reload().unwrap();
        assert!(registry.version() > v1);
        assert_eq!(registry.list().len(), 1);
    }

    #[test]
    fn workflow_extract_patterns_are_compiled() {
        let dir = tempfile::tempdir().unwrap();
        write_module(
            dir.path(),
            "chain.yaml",
            r#"
id: ad_chain
name: AD Chain
steps:
  - command: "nxc smb {{range}}"
    extract:
      dc_ip: 'DC=(\S+)'
  - command: "secretsdump {{dc_ip}}"
    condition: "{{dc_ip}}"
"#,
        );

        let registry = ModuleRegistry::new(dir.path());
        registry.reload().unwrap();
        let module = registry.get("ad_chain").unwrap();
        assert!(module.extracts_for_step(0).is_some());
        assert!(module.extracts_for_step(1).is_none());
    }
}
