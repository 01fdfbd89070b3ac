//! Read-only queries over a persisted miner delta log.

use anyhow::Result;
use std::path::Path;

use sva_ledger::{Amount, Height, LedgerConfig, MinerTotal};

use super::ledger_from_file;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviationReport {
    pub height: Height,
    /// Deviation accumulated strictly before `height`.
    pub deviation: Amount,
    pub running_total: Amount,
    pub entries: usize,
}

pub fn deviation(state: &Path, height: Height, config: LedgerConfig) -> Result<DeviationReport> {
    let ledger = ledger_from_file(state, config)?;
    Ok(DeviationReport {
        height,
        deviation: ledger.deviation_as_of(height),
        running_total: ledger.running_total(),
        entries: ledger.len(),
    })
}

/// Per-miner totals, largest first, truncated to `limit` when given.
pub fn miners(state: &Path, limit: Option<usize>, config: LedgerConfig) -> Result<Vec<MinerTotal>> {
    let ledger = ledger_from_file(state, config)?;
    let mut totals = ledger.miner_totals();
    if let Some(n) = limit {
        totals.truncate(n);
    }
    Ok(totals)
}
