//! Command handler modules for sva-cli.
//!
//! Shared utilities used by multiple command paths live here.
//! Command-specific logic lives in the submodules.

pub mod audit;
pub mod query;

use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

use sva_config::{load_layered_yaml, AuditConfig, LoadedConfig};
use sva_ledger::{decode_log, LedgerConfig, MemoryCheckpointStore, ReconciliationLedger};

/// Load layered config files, or all defaults when none are given.
pub fn load_config(paths: &[String]) -> Result<(Option<LoadedConfig>, AuditConfig)> {
    if paths.is_empty() {
        return Ok((None, AuditConfig::default()));
    }
    let refs: Vec<&str> = paths.iter().map(|s| s.as_str()).collect();
    let loaded = load_layered_yaml(&refs)?;
    let cfg = loaded.audit_config()?;
    Ok((Some(loaded), cfg))
}

/// Rebuild a read-only ledger from a miner delta log dump on disk.
///
/// Backed by an in-memory store: query commands must never write checkpoints.
pub fn ledger_from_file(
    path: &Path,
    config: LedgerConfig,
) -> Result<ReconciliationLedger<MemoryCheckpointStore>> {
    let bytes = fs::read(path).with_context(|| format!("read state file {}", path.display()))?;
    let log = decode_log(&bytes).with_context(|| format!("decode state file {}", path.display()))?;
    ReconciliationLedger::from_log(config, log, MemoryCheckpointStore::new())
        .with_context(|| format!("replay state file {}", path.display()))
}
