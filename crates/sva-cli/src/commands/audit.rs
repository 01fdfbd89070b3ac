//! `sva audit`: drive one audit run from scanner events.
//!
//! Flow per event:
//! 1. Events at or below the resumed tip are skipped (already accounted).
//! 2. Event heights must strictly increase; anything else is fatal.
//! 3. Agreeing supplies are counted clean and not ingested.
//! 4. Mismatches go to `handle_mismatch`; unattributable or negative outcomes
//!    are written to the inspection log and halt the run. A failed checkpoint
//!    write halts too, after the entry has been recorded.
//!
//! Runs that do not start from the checkpoint dir's own history (`Empty`,
//! `File`) refuse a dir that already holds a state file or checkpoints;
//! `Fresh` clears them first.
//!
//! The final state snapshot is written on every exit path where the ledger
//! exists, including halts.

use anyhow::{anyhow, bail, Context, Result};
use serde::Serialize;
use std::io::BufRead;
use std::path::PathBuf;
use tracing::{error, info, warn};
use uuid::Uuid;

use sva_audit::{FindingKind, InspectionFinding, InspectionLog};
use sva_config::AuditConfig;
use sva_ledger::{
    latest_checkpoint, parse_checkpoint_count, Amount, CheckpointStore, FsCheckpointStore, Height,
    LedgerError, MismatchOutcome, ReconciliationLedger,
};

use crate::events::read_events;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResumeFrom {
    /// Start with an empty ledger. Refuses a checkpoint dir holding history.
    Empty,
    /// Start with an empty ledger after deleting existing history.
    Fresh,
    /// Replay the configured state file in the checkpoint dir (empty if absent).
    StateFile,
    /// Replay the checkpoint with the highest entry count (empty if none).
    LatestCheckpoint,
    /// Replay an explicit dump file. Refuses a checkpoint dir holding history.
    File(PathBuf),
}

pub struct AuditRunArgs<'a> {
    pub config: &'a AuditConfig,
    pub resume: ResumeFrom,
    pub run_id: Uuid,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HaltReason {
    /// The ledger refused a mismatch; see the inspection log.
    Inspection {
        height: Height,
        finding: FindingKind,
        delta: Amount,
    },
    /// An ordering or overflow invariant was violated.
    Fatal { message: String },
    /// A checkpoint write failed. The entry at `height` is recorded.
    Storage { height: Height, message: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditSummary {
    pub run_id: Uuid,
    pub events_read: u64,
    pub skipped: u64,
    pub clean: u64,
    pub recorded: u64,
    pub checkpoints: Vec<String>,
    pub running_total: Amount,
    pub tip_height: Option<Height>,
    pub halt: Option<HaltReason>,
}

impl AuditSummary {
    pub fn is_halted(&self) -> bool {
        self.halt.is_some()
    }
}

/// Run one audit over `events`.
///
/// Returns `Ok` with `halt` set when the run stops on a finding, a fatal
/// ledger error or a failed checkpoint write; `Err` for config, malformed
/// input, a checkpoint dir that would be clobbered, or other IO.
pub fn run_audit<R: BufRead>(args: AuditRunArgs<'_>, events: R) -> Result<AuditSummary> {
    let cfg = args.config;
    let store = FsCheckpointStore::open(&cfg.storage.checkpoint_dir).with_context(|| {
        format!(
            "open checkpoint dir {}",
            cfg.storage.checkpoint_dir.display()
        )
    })?;

    let mut ledger = open_ledger(cfg, store, &args.resume)?;
    let resumed_tip = ledger.last_height();
    info!(
        run_id = %args.run_id,
        resumed_entries = ledger.len(),
        resumed_tip = ?resumed_tip,
        running_total = ledger.running_total(),
        "audit run starting"
    );

    let mut inspection = InspectionLog::resume(&cfg.inspection.log_path, cfg.inspection.hash_chain)
        .with_context(|| {
            format!(
                "open inspection log {}",
                cfg.inspection.log_path.display()
            )
        })?;

    let mut summary = AuditSummary {
        run_id: args.run_id,
        events_read: 0,
        skipped: 0,
        clean: 0,
        recorded: 0,
        checkpoints: Vec::new(),
        running_total: 0,
        tip_height: None,
        halt: None,
    };

    let scan = scan_events(
        &mut ledger,
        &mut inspection,
        args.run_id,
        resumed_tip,
        events,
        &mut summary,
    );

    // Persist whatever was recorded before surfacing scan errors.
    let snap = ledger.snapshot();

    summary.running_total = ledger.running_total();
    summary.tip_height = ledger.last_height();

    scan?;
    snap.context("write final snapshot")?;

    match &summary.halt {
        None => info!(
            events = summary.events_read,
            recorded = summary.recorded,
            running_total = summary.running_total,
            "audit run complete"
        ),
        Some(reason) => error!(?reason, "audit run halted"),
    }
    Ok(summary)
}

/// State file and checkpoint keys already in `store`, sorted.
fn existing_history(store: &FsCheckpointStore, state_file: &str) -> Result<Vec<String>> {
    let mut keys: Vec<String> = store
        .keys()
        .with_context(|| format!("list checkpoint dir {}", store.dir().display()))?
        .into_iter()
        .filter(|k| k == state_file || parse_checkpoint_count(k).is_some())
        .collect();
    keys.sort();
    Ok(keys)
}

fn open_ledger(
    cfg: &AuditConfig,
    mut store: FsCheckpointStore,
    resume: &ResumeFrom,
) -> Result<ReconciliationLedger<FsCheckpointStore>> {
    let lc = cfg.ledger_config();

    if matches!(resume, ResumeFrom::Empty | ResumeFrom::File(_)) {
        let existing = existing_history(&store, &cfg.storage.state_file)?;
        if !existing.is_empty() {
            bail!(
                "CHECKPOINT_DIR_NOT_EMPTY dir={} existing={}: resume from it or start with --fresh",
                store.dir().display(),
                existing.join(",")
            );
        }
    }

    let ledger = match resume {
        ResumeFrom::Empty => ReconciliationLedger::new(lc, store)?,
        ResumeFrom::Fresh => {
            let existing = existing_history(&store, &cfg.storage.state_file)?;
            for key in &existing {
                store
                    .remove(key)
                    .with_context(|| format!("remove stale checkpoint {key}"))?;
            }
            if !existing.is_empty() {
                warn!(removed = existing.len(), "discarded existing ledger history");
            }
            ReconciliationLedger::new(lc, store)?
        }
        ResumeFrom::StateFile => {
            let key = cfg.storage.state_file.clone();
            ReconciliationLedger::from_store(lc, store, &key)?
        }
        ResumeFrom::LatestCheckpoint => match latest_checkpoint(&store)? {
            Some(key) => {
                info!(checkpoint = %key, "resuming from latest checkpoint");
                ReconciliationLedger::from_store(lc, store, &key)?
            }
            None => {
                warn!("no checkpoint found; starting empty");
                ReconciliationLedger::new(lc, store)?
            }
        },
        ResumeFrom::File(path) => {
            let bytes = std::fs::read(path)
                .with_context(|| format!("read resume file {}", path.display()))?;
            let log = sva_ledger::decode_log(&bytes)
                .with_context(|| format!("decode resume file {}", path.display()))?;
            ReconciliationLedger::from_log(lc, log, store)?
        }
    };
    Ok(ledger)
}

fn scan_events<R: BufRead>(
    ledger: &mut ReconciliationLedger<FsCheckpointStore>,
    inspection: &mut InspectionLog,
    run_id: Uuid,
    resumed_tip: Option<Height>,
    events: R,
    summary: &mut AuditSummary,
) -> Result<()> {
    let mut last_event: Option<Height> = None;

    for event in read_events(events) {
        let event = event?;
        summary.events_read += 1;

        if resumed_tip.is_some_and(|tip| event.height <= tip) {
            summary.skipped += 1;
            continue;
        }

        if let Some(prev) = last_event {
            if event.height <= prev {
                let err = LedgerError::HeightNotIncreasing {
                    last: prev,
                    got: event.height,
                };
                error!(%err, "scanner emitted heights out of order");
                summary.halt = Some(HaltReason::Fatal {
                    message: err.to_string(),
                });
                return Ok(());
            }
        }
        last_event = Some(event.height);

        if !event.is_mismatch() {
            summary.clean += 1;
            continue;
        }

        let outcome = match ledger.handle_mismatch(
            &event.block(),
            event.theoretical_supply,
            event.empirical_supply,
        ) {
            Ok(o) => o,
            Err(e) if e.is_fatal() => {
                error!(err = %e, height = event.height, "ledger invariant violated");
                summary.halt = Some(HaltReason::Fatal {
                    message: e.to_string(),
                });
                return Ok(());
            }
            Err(e) => {
                // Checkpoint writes happen after the entry is recorded.
                if ledger.last_height() == Some(event.height) {
                    summary.recorded += 1;
                }
                error!(err = %e, height = event.height, "checkpoint write failed");
                summary.halt = Some(HaltReason::Storage {
                    height: event.height,
                    message: e.to_string(),
                });
                return Ok(());
            }
        };

        match &outcome {
            MismatchOutcome::Recorded { checkpoint, .. } => {
                summary.recorded += 1;
                if let Some(name) = checkpoint {
                    summary.checkpoints.push(name.clone());
                }
            }
            MismatchOutcome::Unattributable { .. } | MismatchOutcome::NegativeDelta { .. } => {
                let finding = InspectionFinding::from_outcome(&outcome)
                    .ok_or_else(|| anyhow!("failure outcome without finding"))?;
                let kind = finding.kind;
                inspection.append(run_id, finding)?;
                summary.halt = Some(HaltReason::Inspection {
                    height: outcome.height(),
                    finding: kind,
                    delta: outcome.delta(),
                });
                return Ok(());
            }
        }
    }
    Ok(())
}
