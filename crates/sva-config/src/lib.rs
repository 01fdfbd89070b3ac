//! sva-config
//!
//! Layered YAML configuration for audit runs.
//!
//! Documents merge in order (later documents override earlier ones, objects
//! merge key by key), the result is canonicalized to compact JSON and hashed
//! with SHA-256 so every run can record exactly which settings it used.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::fs;
use std::path::PathBuf;

use sva_ledger::{LedgerConfig, DEFAULT_FLUSH_INTERVAL, DEFAULT_STATE_KEY};

#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config_hash: String,
    pub canonical_json: String,
    pub config_json: Value,
}

impl LoadedConfig {
    /// Typed view of the merged document.
    pub fn audit_config(&self) -> Result<AuditConfig> {
        AuditConfig::from_json(&self.config_json)
    }
}

pub fn load_layered_yaml(paths: &[&str]) -> Result<LoadedConfig> {
    let mut docs: Vec<String> = Vec::new();
    for p in paths {
        let raw =
            fs::read_to_string(p).with_context(|| format!("failed to read yaml path: {p}"))?;
        docs.push(raw);
    }

    let doc_refs: Vec<&str> = docs.iter().map(|s| s.as_str()).collect();
    load_layered_yaml_from_strings(&doc_refs)
}

pub fn load_layered_yaml_from_strings(yaml_docs: &[&str]) -> Result<LoadedConfig> {
    let mut merged = serde_json::json!({});
    for raw in yaml_docs {
        let v_yaml: serde_yaml::Value = serde_yaml::from_str(raw).context("invalid yaml")?;
        // An empty document parses as null; treat it as "no overrides".
        if v_yaml.is_null() {
            continue;
        }
        let v_json = serde_json::to_value(v_yaml).context("yaml->json conversion failed")?;
        merged = deep_merge(merged, v_json);
    }

    // serde_json's default Map is ordered by key, so this is canonical.
    let canonical_json =
        serde_json::to_string(&merged).context("canonical json serialize failed")?;
    let config_hash = sha256_hex(canonical_json.as_bytes());
    Ok(LoadedConfig {
        config_hash,
        canonical_json,
        config_json: merged,
    })
}

fn deep_merge(a: Value, b: Value) -> Value {
    match (a, b) {
        (Value::Object(mut a_map), Value::Object(b_map)) => {
            for (k, b_val) in b_map {
                let a_val = a_map.remove(&k).unwrap_or(Value::Null);
                a_map.insert(k, deep_merge(a_val, b_val));
            }
            Value::Object(a_map)
        }
        (_, b_other) => b_other,
    }
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

// ---------------------------------------------------------------------------
// Typed view
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuditConfig {
    #[serde(default)]
    pub ledger: LedgerSection,
    #[serde(default)]
    pub storage: StorageSection,
    #[serde(default)]
    pub inspection: InspectionSection,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LedgerSection {
    /// Protocol reward addresses (founders' reward, dev fund, ...).
    #[serde(default)]
    pub excluded_addresses: Vec<String>,
    #[serde(default = "default_flush_interval")]
    pub flush_interval: usize,
}

impl Default for LedgerSection {
    fn default() -> Self {
        Self {
            excluded_addresses: Vec::new(),
            flush_interval: DEFAULT_FLUSH_INTERVAL,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StorageSection {
    #[serde(default = "default_checkpoint_dir")]
    pub checkpoint_dir: PathBuf,
    #[serde(default = "default_state_file")]
    pub state_file: String,
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            checkpoint_dir: default_checkpoint_dir(),
            state_file: default_state_file(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InspectionSection {
    #[serde(default = "default_inspection_log")]
    pub log_path: PathBuf,
    #[serde(default = "default_true")]
    pub hash_chain: bool,
}

impl Default for InspectionSection {
    fn default() -> Self {
        Self {
            log_path: default_inspection_log(),
            hash_chain: true,
        }
    }
}

fn default_flush_interval() -> usize {
    DEFAULT_FLUSH_INTERVAL
}

fn default_checkpoint_dir() -> PathBuf {
    PathBuf::from("checkpoints")
}

fn default_state_file() -> String {
    DEFAULT_STATE_KEY.to_string()
}

fn default_inspection_log() -> PathBuf {
    PathBuf::from("inspection.jsonl")
}

fn default_true() -> bool {
    true
}

impl AuditConfig {
    pub fn from_json(v: &Value) -> Result<Self> {
        let cfg: AuditConfig =
            serde_json::from_value(v.clone()).context("CONFIG_INVALID: audit config")?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.ledger.flush_interval == 0 {
            bail!("CONFIG_INVALID leaf=/ledger/flush_interval: must be positive");
        }
        if self.storage.state_file.trim().is_empty()
            || self.storage.state_file.contains(|c: char| c == '/' || c == '\\')
        {
            bail!(
                "CONFIG_INVALID leaf=/storage/state_file: must be a bare file name, got {:?}",
                self.storage.state_file
            );
        }
        let mut seen = BTreeSet::new();
        for a in &self.ledger.excluded_addresses {
            let t = a.trim();
            if t.is_empty() {
                bail!("CONFIG_INVALID leaf=/ledger/excluded_addresses: blank address");
            }
            if !seen.insert(t) {
                bail!(
                    "CONFIG_INVALID leaf=/ledger/excluded_addresses: duplicate address {}",
                    t
                );
            }
        }
        Ok(())
    }

    pub fn ledger_config(&self) -> LedgerConfig {
        LedgerConfig {
            excluded_addresses: self
                .ledger
                .excluded_addresses
                .iter()
                .map(|a| a.trim().to_string())
                .collect(),
            flush_interval: self.ledger.flush_interval,
            state_key: self.storage.state_file.clone(),
        }
    }
}
