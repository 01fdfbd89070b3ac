//! Scenario: Mismatch classification
//!
//! # Invariants under test
//!
//! 1. A positive delta with a non-excluded coinbase address is recorded under
//!    the canonical attribution key.
//! 2. A coinbase paying only excluded addresses is Unattributable, even with
//!    a positive delta, and mutates nothing.
//! 3. `theoretical < empirical` is NegativeDelta and mutates nothing.
//! 4. Excluded addresses are stripped from mixed coinbases before keying.
//! 5. A zero delta with an attributable coinbase is still recorded.
//! 6. Failure outcomes carry the raw coinbase outputs for inspection.

use sva_ledger::{
    BlockRecord, CoinbaseOutput, LedgerConfig, MemoryCheckpointStore, MismatchOutcome,
    ReconciliationLedger,
};

const FOUNDERS: &str = "t3Founders";
const DEV_FUND: &str = "t3DevFund";

fn ledger() -> ReconciliationLedger<MemoryCheckpointStore> {
    ReconciliationLedger::new(
        LedgerConfig::with_excluded([FOUNDERS, DEV_FUND]),
        MemoryCheckpointStore::new(),
    )
    .unwrap()
}

fn block(height: u64, outputs: Vec<CoinbaseOutput>) -> BlockRecord {
    BlockRecord::new(height, outputs)
}

// ---------------------------------------------------------------------------
// 1. Recorded
// ---------------------------------------------------------------------------

#[test]
fn positive_delta_is_recorded_under_sorted_key() {
    let mut l = ledger();
    let b = block(
        1_000,
        vec![
            CoinbaseOutput::to_address(500, "t1Zulu"),
            CoinbaseOutput::to_address(500, "t1Alpha"),
        ],
    );

    let out = l.handle_mismatch(&b, 2_000_000, 1_999_990).unwrap();
    assert_eq!(
        out,
        MismatchOutcome::Recorded {
            height: 1_000,
            delta: 10,
            key: "t1Alpha,t1Zulu".to_string(),
            checkpoint: None,
        }
    );
    assert!(!out.requires_halt());
    assert_eq!(l.running_total(), 10);
    assert_eq!(l.deviation_as_of(1_001), 10);
    assert_eq!(
        l.miner_delta_log().get("t1Alpha,t1Zulu"),
        Some(&[(1_000, 10)][..])
    );
}

#[test]
fn same_miner_accumulates_in_observation_order() {
    let mut l = ledger();
    let cb = vec![CoinbaseOutput::to_address(1, "t1Miner")];
    l.handle_mismatch(&block(10, cb.clone()), 105, 100).unwrap();
    l.handle_mismatch(&block(20, cb.clone()), 203, 200).unwrap();
    l.handle_mismatch(&block(30, cb), 301, 300).unwrap();

    assert_eq!(
        l.miner_delta_log().get("t1Miner"),
        Some(&[(10, 5), (20, 3), (30, 1)][..])
    );
    let totals = l.miner_totals();
    assert_eq!(totals.len(), 1);
    assert_eq!(totals[0].total, 9);
    assert_eq!(totals[0].entries, 3);
    assert_eq!(totals[0].first_height, 10);
    assert_eq!(totals[0].last_height, 30);
}

// ---------------------------------------------------------------------------
// 2. Unattributable
// ---------------------------------------------------------------------------

#[test]
fn only_excluded_address_is_unattributable_without_mutation() {
    let mut l = ledger();
    l.handle_mismatch(
        &block(5, vec![CoinbaseOutput::to_address(1, "t1Miner")]),
        11,
        10,
    )
    .unwrap();

    let cb = vec![CoinbaseOutput::to_address(1_250, FOUNDERS)];
    let out = l.handle_mismatch(&block(9, cb.clone()), 1_000, 900).unwrap();

    assert_eq!(
        out,
        MismatchOutcome::Unattributable {
            height: 9,
            delta: 100,
            coinbase: cb,
        }
    );
    assert!(out.requires_halt());
    assert_eq!(l.running_total(), 1);
    assert_eq!(l.len(), 1);
    assert_eq!(l.miner_delta_log().entry_count(), 1);
    assert_eq!(l.last_height(), Some(5));
}

#[test]
fn coinbase_without_addresses_is_unattributable() {
    let mut l = ledger();
    let cb = vec![CoinbaseOutput::new(625, Vec::<String>::new())];
    let out = l.handle_mismatch(&block(3, cb), 10, 0).unwrap();
    assert!(matches!(out, MismatchOutcome::Unattributable { .. }));
    assert!(l.is_empty());
}

// ---------------------------------------------------------------------------
// 3. Negative delta
// ---------------------------------------------------------------------------

#[test]
fn negative_delta_halts_without_mutation() {
    let mut l = ledger();
    let cb = vec![CoinbaseOutput::to_address(1, "t1Miner")];
    l.handle_mismatch(&block(10, cb.clone()), 110, 100).unwrap();
    let before = l.series().clone();

    let out = l.handle_mismatch(&block(11, cb.clone()), 100, 101).unwrap();
    assert_eq!(
        out,
        MismatchOutcome::NegativeDelta {
            height: 11,
            delta: -1,
            coinbase: cb,
        }
    );
    assert!(out.requires_halt());
    assert_eq!(l.series(), &before);
    assert_eq!(l.running_total(), 10);
    assert_eq!(l.miner_delta_log().entry_count(), 1);
}

// ---------------------------------------------------------------------------
// 4–5. Key derivation details
// ---------------------------------------------------------------------------

#[test]
fn excluded_addresses_are_stripped_from_mixed_coinbase() {
    let mut l = ledger();
    let cb = vec![
        CoinbaseOutput::to_address(1_000, FOUNDERS),
        CoinbaseOutput::to_address(5_000, "t1Miner"),
        CoinbaseOutput::to_address(500, DEV_FUND),
    ];
    let out = l.handle_mismatch(&block(77, cb), 42, 40).unwrap();
    match out {
        MismatchOutcome::Recorded { key, .. } => assert_eq!(key, "t1Miner"),
        other => panic!("expected Recorded, got {other:?}"),
    }
}

#[test]
fn zero_delta_is_recorded() {
    let mut l = ledger();
    let out = l
        .handle_mismatch(
            &block(8, vec![CoinbaseOutput::to_address(1, "t1Miner")]),
            50,
            50,
        )
        .unwrap();
    assert!(out.is_recorded());
    assert_eq!(out.delta(), 0);
    assert_eq!(l.len(), 1);
    assert_eq!(l.running_total(), 0);
}
