//! sva-ledger
//!
//! Supply reconciliation ledger.
//!
//! Architectural decisions:
//! - Blocks are audited in strictly increasing height order
//! - Positive supply divergence is attributed to the coinbase's non-excluded addresses
//! - Cumulative deviation is queryable at any height (right-open)
//! - Unattributable or negative divergence is returned to the caller, never ingested
//! - Out-of-order heights are fatal
//!
//! Checkpoint IO goes through the [`CheckpointStore`] trait; everything else is
//! deterministic in-memory logic.

mod attribution;
mod codec;
mod error;
mod ledger;
mod series;
mod store;
mod types;

pub use attribution::{attribution_key, AttributionKey, KEY_SEPARATOR};
pub use codec::{decode_log, encode_log};
pub use error::LedgerError;
pub use ledger::{
    LedgerConfig, MinerTotal, MismatchOutcome, ReconciliationLedger, DEFAULT_FLUSH_INTERVAL,
    DEFAULT_STATE_KEY,
};
pub use series::{DeviationPoint, DeviationSeries};
pub use store::{
    checkpoint_key, latest_checkpoint, parse_checkpoint_count, CheckpointStore,
    FsCheckpointStore, MemoryCheckpointStore,
};
pub use types::*;
