use serde::{Deserialize, Serialize, Serializer};
use std::collections::BTreeMap;

/// Block height.
pub type Height = u64;

/// Signed supply quantity in base units (no floating point anywhere).
pub type Amount = i64;

/// One coinbase output as reported by the block scanner.
///
/// Multisig-style outputs may carry more than one destination address.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoinbaseOutput {
    pub value: Amount,
    #[serde(default)]
    pub addresses: Vec<String>,
}

impl CoinbaseOutput {
    pub fn new(value: Amount, addresses: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            value,
            addresses: addresses.into_iter().map(Into::into).collect(),
        }
    }

    /// Single-address convenience constructor.
    pub fn to_address(value: Amount, address: impl Into<String>) -> Self {
        Self {
            value,
            addresses: vec![address.into()],
        }
    }
}

/// The slice of a block the ledger needs: its height and coinbase outputs.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockRecord {
    pub height: Height,
    pub coinbase: Vec<CoinbaseOutput>,
}

impl BlockRecord {
    pub fn new(height: Height, coinbase: Vec<CoinbaseOutput>) -> Self {
        Self { height, coinbase }
    }
}

/// Attribution key -> `(height, delta)` pairs in the order they were observed.
///
/// Keys are held in a `BTreeMap` so persisted dumps are byte-stable.
/// Append-only: there is no API to remove or rewrite an entry.
/// Serialized as the bare key map; the entry count is rebuilt on decode.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(from = "BTreeMap<String, Vec<(Height, Amount)>>")]
pub struct MinerDeltaLog {
    entries: BTreeMap<String, Vec<(Height, Amount)>>,
    len: usize,
}

impl From<BTreeMap<String, Vec<(Height, Amount)>>> for MinerDeltaLog {
    fn from(entries: BTreeMap<String, Vec<(Height, Amount)>>) -> Self {
        let len = entries.values().map(Vec::len).sum();
        Self { entries, len }
    }
}

impl Serialize for MinerDeltaLog {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.entries.serialize(serializer)
    }
}

impl MinerDeltaLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, key: impl Into<String>, height: Height, delta: Amount) {
        self.entries
            .entry(key.into())
            .or_default()
            .push((height, delta));
        self.len += 1;
    }

    /// Entries recorded under one key, in observation order.
    pub fn get(&self, key: &str) -> Option<&[(Height, Amount)]> {
        self.entries.get(key).map(Vec::as_slice)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[(Height, Amount)])> {
        self.entries
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// Number of attribution keys.
    pub fn key_count(&self) -> usize {
        self.entries.len()
    }

    /// Total number of `(height, delta)` entries across every key.
    pub fn entry_count(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Every entry tagged with its key, sorted by height ascending.
    ///
    /// The sort is stable, so ties keep key order then observation order;
    /// callers that must reject ties check adjacent heights themselves.
    pub fn flatten_by_height(&self) -> Vec<(Height, Amount, &str)> {
        let mut flat: Vec<(Height, Amount, &str)> = self
            .entries
            .iter()
            .flat_map(|(k, v)| v.iter().map(move |(h, d)| (*h, *d, k.as_str())))
            .collect();
        flat.sort_by_key(|(h, _, _)| *h);
        flat
    }
}

impl FromIterator<(String, Vec<(Height, Amount)>)> for MinerDeltaLog {
    fn from_iter<T: IntoIterator<Item = (String, Vec<(Height, Amount)>)>>(iter: T) -> Self {
        let mut log = MinerDeltaLog::new();
        for (key, pairs) in iter {
            for (h, d) in pairs {
                log.append(key.clone(), h, d);
            }
        }
        log
    }
}
