//! Persisted miner delta log format.
//!
//! Pretty-printed JSON object, attribution key -> array of `[height, delta]`
//! pairs. Keys come out sorted, so equal logs encode to equal bytes.
//!
//! ```json
//! {
//!   "tMinerA,tMinerB": [
//!     [1204, 625000000],
//!     [1311, 12500]
//!   ]
//! }
//! ```

use crate::{LedgerError, MinerDeltaLog};

pub fn encode_log(log: &MinerDeltaLog) -> Result<Vec<u8>, LedgerError> {
    let mut bytes = serde_json::to_vec_pretty(log)?;
    bytes.push(b'\n');
    Ok(bytes)
}

/// Decode a dump produced by [`encode_log`]. A UTF-8 BOM is tolerated.
pub fn decode_log(bytes: &[u8]) -> Result<MinerDeltaLog, LedgerError> {
    let bytes = bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(bytes);
    Ok(serde_json::from_slice(bytes)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_hand_written_dump() {
        let raw = br#"{ "tA": [[5, 10], [9, 1]], "tB,tC": [[7, -3]] }"#;
        let log = decode_log(raw).unwrap();
        assert_eq!(log.get("tA"), Some(&[(5, 10), (9, 1)][..]));
        assert_eq!(log.get("tB,tC"), Some(&[(7, -3)][..]));
    }

    #[test]
    fn encoding_is_byte_stable() {
        let mut a = MinerDeltaLog::new();
        a.append("tZ", 2, 1);
        a.append("tA", 1, 1);
        let mut b = MinerDeltaLog::new();
        b.append("tA", 1, 1);
        b.append("tZ", 2, 1);
        assert_eq!(encode_log(&a).unwrap(), encode_log(&b).unwrap());
    }

    #[test]
    fn malformed_dump_is_a_codec_error() {
        let err = decode_log(br#"{ "tA": [[5]] }"#).unwrap_err();
        assert!(matches!(err, LedgerError::Codec(_)));
        assert!(!err.is_fatal());
    }
}
