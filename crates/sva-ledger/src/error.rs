use thiserror::Error;

use crate::Height;

/// Ledger failures.
///
/// Expected audit outcomes (unattributable or negative divergence) are not
/// errors; they come back as [`crate::MismatchOutcome`] values.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// The caller fed heights out of order. Its traversal is broken.
    #[error("height {got} is not above the last recorded height {last}")]
    HeightNotIncreasing { last: Height, got: Height },

    /// A persisted log records two deltas at the same height.
    #[error("replayed log records height {height} under both '{first}' and '{second}'")]
    DuplicateHeight {
        height: Height,
        first: String,
        second: String,
    },

    #[error("running total or supply delta overflowed at height {height}")]
    Overflow { height: Height },

    #[error("flush interval must be positive")]
    ZeroFlushInterval,

    #[error("checkpoint '{key}' failed: {source}")]
    Checkpoint {
        key: String,
        #[source]
        source: std::io::Error,
    },

    #[error("miner delta log codec failed: {0}")]
    Codec(#[from] serde_json::Error),
}

impl LedgerError {
    /// `true` for invariant violations that must terminate the audit run.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            LedgerError::HeightNotIncreasing { .. }
                | LedgerError::DuplicateHeight { .. }
                | LedgerError::Overflow { .. }
        )
    }
}
