//! sva-audit
//!
//! Inspection log for mismatches the ledger refuses to ingest.
//!
//! Every unattributable or negative divergence is appended as one canonical
//! JSON line carrying the raw coinbase outputs, so an operator can inspect the
//! block by hand. Lines are optionally hash-chained (`hash_prev` + `hash_self`)
//! and the chain can be verified offline.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use sva_ledger::{Amount, CoinbaseOutput, Height, MismatchOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FindingKind {
    Unattributable,
    NegativeDelta,
}

impl FindingKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FindingKind::Unattributable => "UNATTRIBUTABLE",
            FindingKind::NegativeDelta => "NEGATIVE_DELTA",
        }
    }
}

/// A block that needs manual inspection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InspectionFinding {
    pub height: Height,
    pub kind: FindingKind,
    pub delta: Amount,
    pub coinbase: Vec<CoinbaseOutput>,
}

impl InspectionFinding {
    /// `None` for [`MismatchOutcome::Recorded`]; recorded mismatches need no
    /// inspection.
    pub fn from_outcome(outcome: &MismatchOutcome) -> Option<Self> {
        match outcome {
            MismatchOutcome::Recorded { .. } => None,
            MismatchOutcome::Unattributable {
                height,
                delta,
                coinbase,
            } => Some(Self {
                height: *height,
                kind: FindingKind::Unattributable,
                delta: *delta,
                coinbase: coinbase.clone(),
            }),
            MismatchOutcome::NegativeDelta {
                height,
                delta,
                coinbase,
            } => Some(Self {
                height: *height,
                kind: FindingKind::NegativeDelta,
                delta: *delta,
                coinbase: coinbase.clone(),
            }),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InspectionEvent {
    pub event_id: Uuid,
    pub run_id: Uuid,
    pub seq: u64,
    pub ts_utc: DateTime<Utc>,
    pub finding: InspectionFinding,
    pub hash_prev: Option<String>,
    pub hash_self: Option<String>,
}

/// Append-only inspection writer. JSON Lines, one finding per line.
pub struct InspectionLog {
    path: PathBuf,
    hash_chain: bool,
    last_hash: Option<String>,
    /// Number of events in the file; the next event's `seq`.
    seq: u64,
}

impl InspectionLog {
    /// Creates the writer and ensures parent dirs exist. Starts a fresh chain.
    pub fn new(path: impl AsRef<Path>, hash_chain: bool) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| format!("create_dir_all {:?}", parent))?;
        }

        Ok(Self {
            path,
            hash_chain,
            last_hash: None,
            seq: 0,
        })
    }

    /// Opens an existing log and continues its chain.
    ///
    /// Refuses to continue a log whose chain is already broken.
    pub fn resume(path: impl AsRef<Path>, hash_chain: bool) -> Result<Self> {
        let mut log = Self::new(&path, hash_chain)?;
        if !log.path.exists() {
            return Ok(log);
        }

        let content = fs::read_to_string(&log.path)
            .with_context(|| format!("read inspection log {:?}", log.path))?;
        if let VerifyResult::Broken { line, reason } = verify_hash_chain_str(&content)? {
            bail!(
                "INSPECTION_CHAIN_BROKEN {:?} line={} reason={}",
                log.path,
                line,
                reason
            );
        }

        for line in content.lines().map(str::trim).filter(|l| !l.is_empty()) {
            let ev: InspectionEvent =
                serde_json::from_str(line).context("parse inspection event")?;
            log.last_hash = ev.hash_self;
            log.seq = ev.seq + 1;
        }
        Ok(log)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn last_hash(&self) -> Option<&str> {
        self.last_hash.as_deref()
    }

    /// Number of events appended so far (including resumed ones).
    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn append(&mut self, run_id: Uuid, finding: InspectionFinding) -> Result<InspectionEvent> {
        let payload = serde_json::to_value(&finding).context("serialize finding failed")?;
        let event_id = derive_event_id(self.last_hash.as_deref(), &payload, self.seq)?;

        let mut ev = InspectionEvent {
            event_id,
            run_id,
            seq: self.seq,
            ts_utc: Utc::now(),
            finding,
            hash_prev: None,
            hash_self: None,
        };

        if self.hash_chain {
            ev.hash_prev = self.last_hash.clone();
            ev.hash_self = Some(compute_event_hash(&ev)?);
        }

        let line = canonical_json_line(&ev)?;
        append_line(&self.path, &line)?;

        // Only advance once the line is on disk.
        self.seq += 1;
        if self.hash_chain {
            self.last_hash = ev.hash_self.clone();
        }
        Ok(ev)
    }
}

/// Deterministic event id: UUIDv5 over previous hash, sequence and payload.
fn derive_event_id(prev_hash: Option<&str>, payload: &Value, seq: u64) -> Result<Uuid> {
    let payload = canonical_json_line(payload)?;
    let name = format!("{}|{}|{}", prev_hash.unwrap_or("-"), seq, payload);
    Ok(Uuid::new_v5(&Uuid::NAMESPACE_OID, name.as_bytes()))
}

fn append_line(path: &Path, line: &str) -> Result<()> {
    let mut f = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("open inspection log {:?}", path))?;
    f.write_all(line.as_bytes())
        .context("write inspection line failed")?;
    f.write_all(b"\n").context("write newline failed")?;
    Ok(())
}

/// Compact JSON with keys sorted recursively.
fn canonical_json_line<T: Serialize>(v: &T) -> Result<String> {
    let raw = serde_json::to_value(v).context("serialize inspection event failed")?;
    serde_json::to_string(&sort_keys(&raw)).context("json stringify failed")
}

fn sort_keys(v: &Value) -> Value {
    match v {
        Value::Object(map) => {
            let mut keys: Vec<_> = map.keys().cloned().collect();
            keys.sort();
            let mut new = serde_json::Map::new();
            for k in keys {
                new.insert(k.clone(), sort_keys(&map[&k]));
            }
            Value::Object(new)
        }
        Value::Array(arr) => Value::Array(arr.iter().map(sort_keys).collect()),
        _ => v.clone(),
    }
}

/// Hash over the canonical JSON of the event with `hash_self` cleared.
pub fn compute_event_hash(ev: &InspectionEvent) -> Result<String> {
    let mut clone = ev.clone();
    clone.hash_self = None;

    let canonical = canonical_json_line(&clone)?;
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    Ok(hex::encode(hasher.finalize()))
}

/// Verify the hash chain of an inspection log file.
pub fn verify_hash_chain(path: impl AsRef<Path>) -> Result<VerifyResult> {
    let content = fs::read_to_string(path.as_ref())
        .with_context(|| format!("read inspection log {:?}", path.as_ref()))?;
    verify_hash_chain_str(&content)
}

/// Same as [`verify_hash_chain`] over in-memory JSONL.
///
/// Also checks that `seq` counts up from zero without gaps, which catches
/// deleted lines in unchained logs.
pub fn verify_hash_chain_str(content: &str) -> Result<VerifyResult> {
    let mut prev_hash: Option<String> = None;
    let mut line_count = 0usize;

    for (i, line) in content.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let ev: InspectionEvent = serde_json::from_str(trimmed)
            .with_context(|| format!("parse inspection event at line {}", i + 1))?;

        if ev.seq != line_count as u64 {
            return Ok(VerifyResult::Broken {
                line: i + 1,
                reason: format!("seq gap: expected {}, got {}", line_count, ev.seq),
            });
        }
        line_count += 1;

        if ev.hash_prev != prev_hash {
            return Ok(VerifyResult::Broken {
                line: i + 1,
                reason: format!(
                    "hash_prev mismatch: expected {:?}, got {:?}",
                    prev_hash, ev.hash_prev
                ),
            });
        }

        if let Some(ref claimed_hash) = ev.hash_self {
            let recomputed = compute_event_hash(&ev)?;
            if *claimed_hash != recomputed {
                return Ok(VerifyResult::Broken {
                    line: i + 1,
                    reason: format!(
                        "hash_self mismatch: claimed {}, recomputed {}",
                        claimed_hash, recomputed
                    ),
                });
            }
        }

        prev_hash = ev.hash_self.clone();
    }

    Ok(VerifyResult::Valid { lines: line_count })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyResult {
    Valid { lines: usize },
    Broken { line: usize, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recorded_outcome_needs_no_inspection() {
        let out = MismatchOutcome::Recorded {
            height: 1,
            delta: 1,
            key: "tA".to_string(),
            checkpoint: None,
        };
        assert!(InspectionFinding::from_outcome(&out).is_none());
    }

    #[test]
    fn kind_serializes_screaming_snake() {
        let v = serde_json::to_value(FindingKind::NegativeDelta).unwrap();
        assert_eq!(v, Value::String(FindingKind::NegativeDelta.as_str().to_string()));
    }

    #[test]
    fn event_id_depends_on_seq() {
        let payload = serde_json::json!({"a": 1});
        let a = derive_event_id(None, &payload, 0).unwrap();
        let b = derive_event_id(None, &payload, 1).unwrap();
        assert_ne!(a, b);
        assert_eq!(a, derive_event_id(None, &payload, 0).unwrap());
    }
}
