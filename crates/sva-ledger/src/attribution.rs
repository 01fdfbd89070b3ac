//! Attribution key derivation.
//!
//! The key for a mismatched block is the set of its coinbase destination
//! addresses minus the excluded set, sorted and joined with [`KEY_SEPARATOR`].
//! Sorting through a `BTreeSet` makes the key independent of output order and
//! of duplicate addresses.
//!
//! Address sets that overlap or nest (e.g. `{A}` and `{A, B}`) produce distinct
//! keys; no merging is attempted.

use std::collections::BTreeSet;
use std::fmt;

use crate::CoinbaseOutput;

pub const KEY_SEPARATOR: &str = ",";

/// Canonical identifier of the party a deviation is attributed to.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AttributionKey(String);

impl AttributionKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    /// Addresses making up this key, in canonical order.
    pub fn addresses(&self) -> impl Iterator<Item = &str> {
        self.0.split(KEY_SEPARATOR)
    }
}

impl fmt::Display for AttributionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Derive the attribution key for a coinbase.
///
/// Returns `None` when no address survives the exclusion filter, i.e. the
/// mismatch cannot be pinned on a miner. Blank address strings are ignored.
pub fn attribution_key(
    coinbase: &[CoinbaseOutput],
    excluded: &BTreeSet<String>,
) -> Option<AttributionKey> {
    let miners: BTreeSet<&str> = coinbase
        .iter()
        .flat_map(|o| o.addresses.iter())
        .map(|a| a.trim())
        .filter(|a| !a.is_empty() && !excluded.contains(*a))
        .collect();

    if miners.is_empty() {
        return None;
    }

    let joined = miners.into_iter().collect::<Vec<_>>().join(KEY_SEPARATOR);
    Some(AttributionKey(joined))
}
