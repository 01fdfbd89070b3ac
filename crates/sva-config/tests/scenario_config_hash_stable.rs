//! Config hash stability and typed view
//!
//! GREEN when:
//! - The same YAML input hashes identically across calls.
//! - Reordering keys does not change the hash.
//! - An overlay changes the hash and overrides only the keys it names.
//! - Unknown keys and a zero flush interval are rejected by the typed view.
//! - The typed view maps onto the ledger configuration.
//! - The shipped base config is exactly the defaults.

use sva_config::{load_layered_yaml, load_layered_yaml_from_strings, AuditConfig};
use sva_ledger::DEFAULT_FLUSH_INTERVAL;

const BASE_YAML: &str = r#"
ledger:
  excluded_addresses:
    - "t3Vz22vK5z2LcKEdg16Yv4FFneEL1zg9ojd"
    - "t3cL9AucCajm3HXDhb5jBnJK2vapVoXsop3"
  flush_interval: 500
storage:
  checkpoint_dir: "/var/lib/sva/checkpoints"
  state_file: "miner_deltas.json"
inspection:
  log_path: "/var/lib/sva/inspection.jsonl"
  hash_chain: true
"#;

const BASE_YAML_REORDERED: &str = r#"
inspection:
  hash_chain: true
  log_path: "/var/lib/sva/inspection.jsonl"
storage:
  state_file: "miner_deltas.json"
  checkpoint_dir: "/var/lib/sva/checkpoints"
ledger:
  flush_interval: 500
  excluded_addresses:
    - "t3Vz22vK5z2LcKEdg16Yv4FFneEL1zg9ojd"
    - "t3cL9AucCajm3HXDhb5jBnJK2vapVoXsop3"
"#;

const OVERLAY_YAML: &str = r#"
ledger:
  flush_interval: 50
"#;

#[test]
fn same_input_produces_identical_hash() {
    let a = load_layered_yaml_from_strings(&[BASE_YAML]).unwrap();
    let b = load_layered_yaml_from_strings(&[BASE_YAML]).unwrap();
    assert_eq!(a.config_hash, b.config_hash);
    assert_eq!(a.canonical_json, b.canonical_json);
    assert_eq!(a.config_hash.len(), 64, "sha256 hex digest");
}

#[test]
fn key_order_does_not_change_hash() {
    let a = load_layered_yaml_from_strings(&[BASE_YAML]).unwrap();
    let b = load_layered_yaml_from_strings(&[BASE_YAML_REORDERED]).unwrap();
    assert_eq!(a.config_hash, b.config_hash);
}

#[test]
fn overlay_changes_hash_and_only_named_keys() {
    let base = load_layered_yaml_from_strings(&[BASE_YAML]).unwrap();
    let merged = load_layered_yaml_from_strings(&[BASE_YAML, OVERLAY_YAML]).unwrap();
    assert_ne!(base.config_hash, merged.config_hash);

    let cfg = merged.audit_config().unwrap();
    assert_eq!(cfg.ledger.flush_interval, 50);
    assert_eq!(cfg.ledger.excluded_addresses.len(), 2);
    assert!(cfg.inspection.hash_chain);
}

#[test]
fn unknown_key_is_rejected() {
    let loaded =
        load_layered_yaml_from_strings(&["ledger:\n  flush_intervall: 10\n"]).unwrap();
    let err = loaded.audit_config().unwrap_err();
    assert!(format!("{err:#}").contains("flush_intervall"), "{err:#}");
}

#[test]
fn zero_flush_interval_is_rejected() {
    let loaded = load_layered_yaml_from_strings(&["ledger:\n  flush_interval: 0\n"]).unwrap();
    let err = loaded.audit_config().unwrap_err();
    assert!(err.to_string().contains("/ledger/flush_interval"));
}

#[test]
fn duplicate_excluded_address_is_rejected() {
    let loaded = load_layered_yaml_from_strings(&[
        "ledger:\n  excluded_addresses: [\"t3A\", \" t3A \"]\n",
    ])
    .unwrap();
    assert!(loaded.audit_config().is_err());
}

#[test]
fn state_file_must_be_bare_name() {
    let loaded =
        load_layered_yaml_from_strings(&["storage:\n  state_file: \"../escape.json\"\n"])
            .unwrap();
    assert!(loaded.audit_config().is_err());
}

#[test]
fn typed_view_maps_onto_ledger_config() {
    let cfg = load_layered_yaml_from_strings(&[BASE_YAML])
        .unwrap()
        .audit_config()
        .unwrap();
    let lc = cfg.ledger_config();
    assert_eq!(lc.flush_interval, DEFAULT_FLUSH_INTERVAL);
    assert!(lc
        .excluded_addresses
        .contains("t3Vz22vK5z2LcKEdg16Yv4FFneEL1zg9ojd"));
    assert_eq!(lc.state_key, "miner_deltas.json");
}

#[test]
fn defaults_apply_when_sections_missing() {
    let cfg = load_layered_yaml_from_strings(&["{}"])
        .unwrap()
        .audit_config()
        .unwrap();
    assert_eq!(cfg, AuditConfig::default());
    assert_eq!(cfg.ledger.flush_interval, 500);
}

#[test]
fn layered_files_load_from_disk() {
    let tmp = tempfile::tempdir().unwrap();
    let base = tmp.path().join("base.yaml");
    let overlay = tmp.path().join("overlay.yaml");
    std::fs::write(&base, BASE_YAML).unwrap();
    std::fs::write(&overlay, OVERLAY_YAML).unwrap();

    let from_disk = load_layered_yaml(&[base.to_str().unwrap(), overlay.to_str().unwrap()])
        .unwrap();
    let from_str = load_layered_yaml_from_strings(&[BASE_YAML, OVERLAY_YAML]).unwrap();
    assert_eq!(from_disk.config_hash, from_str.config_hash);
}

#[test]
fn shipped_base_config_matches_defaults() {
    let base = std::path::Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("../../config/defaults/base.yaml");
    let base = base.to_string_lossy().to_string();

    let cfg = load_layered_yaml(&[base.as_str()])
        .unwrap()
        .audit_config()
        .unwrap();
    assert_eq!(cfg, AuditConfig::default());
}
