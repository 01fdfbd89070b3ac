//! Reconciliation ledger.
//!
//! Owns the miner delta log, the deviation series derived from it and the
//! running total, and writes checkpoints through an injected
//! [`CheckpointStore`].
//!
//! # Invariants
//!
//! - The series is strictly increasing by height; the running total equals the
//!   last point's cumulative value (zero when empty).
//! - Every entry in the miner delta log has exactly one series point at the
//!   same height, and vice versa, when mutated through
//!   [`ReconciliationLedger::handle_mismatch`].
//! - Failed operations leave the log, series and total untouched. A failed
//!   checkpoint write happens after the entry is recorded; the in-memory state
//!   stays consistent and the write can be retried.

use std::collections::BTreeSet;

use tracing::{debug, info, warn};

use crate::{
    attribution_key, checkpoint_key, codec, Amount, BlockRecord, CheckpointStore,
    CoinbaseOutput, DeviationSeries, Height, LedgerError, MinerDeltaLog,
};

pub const DEFAULT_FLUSH_INTERVAL: usize = 500;

/// Fixed key of the on-demand [`ReconciliationLedger::snapshot`].
pub const DEFAULT_STATE_KEY: &str = "miner_deltas.json";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LedgerConfig {
    /// Addresses never treated as a miner (protocol reward addresses etc.).
    pub excluded_addresses: BTreeSet<String>,
    /// Checkpoint every time the entry count hits a multiple of this.
    pub flush_interval: usize,
    pub state_key: String,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            excluded_addresses: BTreeSet::new(),
            flush_interval: DEFAULT_FLUSH_INTERVAL,
            state_key: DEFAULT_STATE_KEY.to_string(),
        }
    }
}

impl LedgerConfig {
    pub fn with_excluded<I, A>(addresses: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<String>,
    {
        Self {
            excluded_addresses: addresses.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub fn flush_interval(mut self, n: usize) -> Self {
        self.flush_interval = n;
        self
    }
}

/// What [`ReconciliationLedger::handle_mismatch`] did with a block.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MismatchOutcome {
    /// Delta attributed and ingested. `checkpoint` names the checkpoint
    /// written by this call, if the flush interval was hit.
    Recorded {
        height: Height,
        delta: Amount,
        key: String,
        checkpoint: Option<String>,
    },

    /// Non-negative delta but every coinbase address is excluded (or there
    /// are none). Nothing was ingested.
    Unattributable {
        height: Height,
        delta: Amount,
        coinbase: Vec<CoinbaseOutput>,
    },

    /// Empirical supply exceeds theoretical. Nothing was ingested; the audit
    /// run must halt.
    NegativeDelta {
        height: Height,
        delta: Amount,
        coinbase: Vec<CoinbaseOutput>,
    },
}

impl MismatchOutcome {
    pub fn is_recorded(&self) -> bool {
        matches!(self, MismatchOutcome::Recorded { .. })
    }

    /// `true` when the caller should stop the audit run.
    pub fn requires_halt(&self) -> bool {
        !self.is_recorded()
    }

    pub fn height(&self) -> Height {
        match self {
            MismatchOutcome::Recorded { height, .. }
            | MismatchOutcome::Unattributable { height, .. }
            | MismatchOutcome::NegativeDelta { height, .. } => *height,
        }
    }

    pub fn delta(&self) -> Amount {
        match self {
            MismatchOutcome::Recorded { delta, .. }
            | MismatchOutcome::Unattributable { delta, .. }
            | MismatchOutcome::NegativeDelta { delta, .. } => *delta,
        }
    }
}

/// Per-key aggregate, see [`ReconciliationLedger::miner_totals`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MinerTotal {
    pub key: String,
    pub total: Amount,
    pub entries: usize,
    pub first_height: Height,
    pub last_height: Height,
}

pub struct ReconciliationLedger<S: CheckpointStore> {
    config: LedgerConfig,
    log: MinerDeltaLog,
    series: DeviationSeries,
    running_total: Amount,
    store: S,
}

impl<S: CheckpointStore> ReconciliationLedger<S> {
    /// Empty ledger.
    pub fn new(config: LedgerConfig, store: S) -> Result<Self, LedgerError> {
        Self::from_log(config, MinerDeltaLog::new(), store)
    }

    /// Rebuild a ledger by replaying a persisted miner delta log.
    ///
    /// All pairs are flattened across keys, sorted by height and re-ingested.
    /// Fails with [`LedgerError::DuplicateHeight`] if two entries share a
    /// height, whether under one key or two.
    pub fn from_log(
        config: LedgerConfig,
        log: MinerDeltaLog,
        store: S,
    ) -> Result<Self, LedgerError> {
        if config.flush_interval == 0 {
            return Err(LedgerError::ZeroFlushInterval);
        }

        let mut ledger = Self {
            config,
            log: MinerDeltaLog::new(),
            series: DeviationSeries::new(),
            running_total: 0,
            store,
        };

        let flat = log.flatten_by_height();
        for pair in flat.windows(2) {
            let (h0, _, k0) = pair[0];
            let (h1, _, k1) = pair[1];
            if h0 == h1 {
                return Err(LedgerError::DuplicateHeight {
                    height: h0,
                    first: k0.to_string(),
                    second: k1.to_string(),
                });
            }
        }
        for (height, delta, _) in flat {
            ledger.record_delta(height, delta)?;
        }

        ledger.log = log;
        if !ledger.log.is_empty() {
            info!(
                keys = ledger.log.key_count(),
                entries = ledger.log.entry_count(),
                running_total = ledger.running_total,
                "miner delta log replayed"
            );
        }
        Ok(ledger)
    }

    /// Rebuild from a dump stored under `key` in `store`.
    ///
    /// A missing key yields an empty ledger.
    pub fn from_store(config: LedgerConfig, store: S, key: &str) -> Result<Self, LedgerError> {
        let log = match store.read(key) {
            Ok(Some(bytes)) => codec::decode_log(&bytes)?,
            Ok(None) => MinerDeltaLog::new(),
            Err(source) => {
                return Err(LedgerError::Checkpoint {
                    key: key.to_string(),
                    source,
                })
            }
        };
        Self::from_log(config, log, store)
    }

    /// Ingest a delta at `height`.
    ///
    /// `height` must be strictly above the last recorded height; anything else
    /// is a fatal ordering error and leaves the ledger untouched. This does not
    /// touch the miner delta log; [`Self::handle_mismatch`] is the path that
    /// keeps both in step.
    pub fn record_delta(&mut self, height: Height, delta: Amount) -> Result<(), LedgerError> {
        self.series.check_next(height)?;
        let total = self
            .running_total
            .checked_add(delta)
            .ok_or(LedgerError::Overflow { height })?;
        self.series.push(height, total)?;
        self.running_total = total;
        debug!(height, delta, running_total = total, "delta recorded");
        Ok(())
    }

    /// Cumulative deviation strictly before `height`. O(log n).
    pub fn deviation_as_of(&self, height: Height) -> Amount {
        self.series.as_of(height)
    }

    /// Classify and, where possible, record the supply divergence of `block`.
    ///
    /// Only `Err` for fatal ordering/overflow problems and checkpoint IO.
    /// Unattributable and negative divergence come back as `Ok` outcomes
    /// with no state changed.
    pub fn handle_mismatch(
        &mut self,
        block: &BlockRecord,
        theoretical_supply: Amount,
        empirical_supply: Amount,
    ) -> Result<MismatchOutcome, LedgerError> {
        let height = block.height;
        let delta = theoretical_supply
            .checked_sub(empirical_supply)
            .ok_or(LedgerError::Overflow { height })?;

        if delta < 0 {
            warn!(
                height,
                delta,
                theoretical_supply,
                empirical_supply,
                coinbase = ?block.coinbase,
                "empirical supply exceeds theoretical; manual inspection required"
            );
            return Ok(MismatchOutcome::NegativeDelta {
                height,
                delta,
                coinbase: block.coinbase.clone(),
            });
        }

        let Some(key) = attribution_key(&block.coinbase, &self.config.excluded_addresses) else {
            warn!(
                height,
                delta,
                coinbase = ?block.coinbase,
                "mismatch has no attributable coinbase address; manual inspection required"
            );
            return Ok(MismatchOutcome::Unattributable {
                height,
                delta,
                coinbase: block.coinbase.clone(),
            });
        };

        self.record_delta(height, delta)?;
        self.log.append(key.as_str(), height, delta);

        let count = self.log.entry_count();
        let checkpoint = if count % self.config.flush_interval == 0 {
            let name = checkpoint_key(count);
            self.write_log(&name)?;
            info!(height, entries = count, checkpoint = %name, "checkpoint written");
            Some(name)
        } else {
            None
        };

        Ok(MismatchOutcome::Recorded {
            height,
            delta,
            key: key.into_string(),
            checkpoint,
        })
    }

    /// Write the full miner delta log under the configured state key.
    pub fn snapshot(&mut self) -> Result<(), LedgerError> {
        let key = self.config.state_key.clone();
        self.write_log(&key)?;
        info!(entries = self.log.entry_count(), state = %key, "snapshot written");
        Ok(())
    }

    fn write_log(&mut self, key: &str) -> Result<(), LedgerError> {
        let bytes = codec::encode_log(&self.log)?;
        self.store
            .write(key, &bytes)
            .map_err(|source| LedgerError::Checkpoint {
                key: key.to_string(),
                source,
            })
    }

    /// Per-key totals, largest total first (ties by key).
    pub fn miner_totals(&self) -> Vec<MinerTotal> {
        let mut totals: Vec<MinerTotal> = self
            .log
            .iter()
            .filter_map(|(key, pairs)| {
                let first = pairs.first()?;
                let last = pairs.last()?;
                Some(MinerTotal {
                    key: key.to_string(),
                    total: pairs.iter().map(|(_, d)| *d).sum(),
                    entries: pairs.len(),
                    first_height: first.0,
                    last_height: last.0,
                })
            })
            .collect();
        totals.sort_by(|a, b| b.total.cmp(&a.total).then_with(|| a.key.cmp(&b.key)));
        totals
    }

    pub fn running_total(&self) -> Amount {
        self.running_total
    }

    pub fn last_height(&self) -> Option<Height> {
        self.series.last().map(|p| p.height)
    }

    pub fn series(&self) -> &DeviationSeries {
        &self.series
    }

    pub fn miner_delta_log(&self) -> &MinerDeltaLog {
        &self.log
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    /// Number of recorded entries.
    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }
}
