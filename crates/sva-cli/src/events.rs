//! Scanner event input.
//!
//! The external block scanner emits one JSON object per line:
//!
//! ```json
//! {"height":1204,"theoretical_supply":150000000000,"empirical_supply":149375000000,
//!  "coinbase":[{"value":625000000,"addresses":["t1Miner"]}]}
//! ```
//!
//! Blank lines and lines starting with `#` are skipped.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::io::BufRead;

use sva_ledger::{Amount, BlockRecord, CoinbaseOutput, Height};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockAuditEvent {
    pub height: Height,
    pub theoretical_supply: Amount,
    pub empirical_supply: Amount,
    #[serde(default)]
    pub coinbase: Vec<CoinbaseOutput>,
}

impl BlockAuditEvent {
    pub fn block(&self) -> BlockRecord {
        BlockRecord::new(self.height, self.coinbase.clone())
    }

    /// `true` when the two supply figures disagree.
    pub fn is_mismatch(&self) -> bool {
        self.theoretical_supply != self.empirical_supply
    }
}

/// Iterate events from JSONL input. Parse errors carry the 1-based line number.
pub fn read_events<R: BufRead>(input: R) -> impl Iterator<Item = Result<BlockAuditEvent>> {
    input
        .lines()
        .enumerate()
        .filter_map(|(i, line)| {
            let line = match line.with_context(|| format!("read event line {}", i + 1)) {
                Ok(l) => l,
                Err(e) => return Some(Err(e)),
            };
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                return None;
            }
            Some(
                serde_json::from_str::<BlockAuditEvent>(trimmed)
                    .with_context(|| format!("EVENT_PARSE line={}", i + 1)),
            )
        })
}
