//! Checkpoint storage.
//!
//! The ledger never touches the file system directly; it writes opaque bytes
//! under string keys through [`CheckpointStore`]. Writes overwrite, so retrying
//! a failed snapshot is safe.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

const CHECKPOINT_PREFIX: &str = "miner_deltas_";
const CHECKPOINT_SUFFIX: &str = ".json";

/// Key/value sink for miner delta log dumps.
pub trait CheckpointStore {
    fn write(&mut self, key: &str, bytes: &[u8]) -> io::Result<()>;

    fn read(&self, key: &str) -> io::Result<Option<Vec<u8>>>;

    /// All keys currently held, in no particular order.
    fn keys(&self) -> io::Result<Vec<String>>;

    /// Drop `key`. Removing a missing key is not an error.
    fn remove(&mut self, key: &str) -> io::Result<()>;
}

/// Checkpoint name for a log holding `entry_count` entries.
pub fn checkpoint_key(entry_count: usize) -> String {
    format!("{CHECKPOINT_PREFIX}{entry_count:08}{CHECKPOINT_SUFFIX}")
}

/// Inverse of [`checkpoint_key`]; `None` for any other name.
pub fn parse_checkpoint_count(key: &str) -> Option<usize> {
    let digits = key
        .strip_prefix(CHECKPOINT_PREFIX)?
        .strip_suffix(CHECKPOINT_SUFFIX)?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Key of the checkpoint with the highest entry count, if any.
pub fn latest_checkpoint<S: CheckpointStore + ?Sized>(store: &S) -> io::Result<Option<String>> {
    let latest = store
        .keys()?
        .into_iter()
        .filter_map(|k| parse_checkpoint_count(&k).map(|n| (n, k)))
        .max_by_key(|(n, _)| *n)
        .map(|(_, k)| k);
    Ok(latest)
}

// ---------------------------------------------------------------------------
// File system
// ---------------------------------------------------------------------------

/// Directory-backed store: one file per key.
///
/// Each write goes to `<key>.tmp` first and is renamed into place, so a crash
/// mid-write leaves the previous file under `key` intact.
#[derive(Clone, Debug)]
pub struct FsCheckpointStore {
    dir: PathBuf,
}

impl FsCheckpointStore {
    /// Opens the store, creating `dir` if needed.
    pub fn open(dir: impl AsRef<Path>) -> io::Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(key)
    }
}

impl CheckpointStore for FsCheckpointStore {
    fn write(&mut self, key: &str, bytes: &[u8]) -> io::Result<()> {
        let dst = self.path_for(key);
        let tmp = self.dir.join(format!("{key}.tmp"));
        fs::write(&tmp, bytes)?;
        fs::rename(&tmp, &dst)
    }

    fn read(&self, key: &str) -> io::Result<Option<Vec<u8>>> {
        match fs::read(self.path_for(key)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn keys(&self) -> io::Result<Vec<String>> {
        let mut out = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                if !name.ends_with(".tmp") {
                    out.push(name.to_string());
                }
            }
        }
        Ok(out)
    }

    fn remove(&mut self, key: &str) -> io::Result<()> {
        match fs::remove_file(self.path_for(key)) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }
}

// ---------------------------------------------------------------------------
// In memory
// ---------------------------------------------------------------------------

/// In-memory store for tests and dry runs.
///
/// Keeps the latest bytes per key plus the ordered list of every write.
/// `fail_writes(true)` makes every write return an IO error.
#[derive(Clone, Debug, Default)]
pub struct MemoryCheckpointStore {
    blobs: BTreeMap<String, Vec<u8>>,
    writes: Vec<String>,
    fail_writes: bool,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_writes(&mut self, fail: bool) {
        self.fail_writes = fail;
    }

    /// Keys of successful writes, oldest first (repeats included).
    pub fn writes(&self) -> &[String] {
        &self.writes
    }

    pub fn get(&self, key: &str) -> Option<&[u8]> {
        self.blobs.get(key).map(Vec::as_slice)
    }
}

impl CheckpointStore for MemoryCheckpointStore {
    fn write(&mut self, key: &str, bytes: &[u8]) -> io::Result<()> {
        if self.fail_writes {
            return Err(io::Error::other(format!("injected write failure for '{key}'")));
        }
        self.blobs.insert(key.to_string(), bytes.to_vec());
        self.writes.push(key.to_string());
        Ok(())
    }

    fn read(&self, key: &str) -> io::Result<Option<Vec<u8>>> {
        Ok(self.blobs.get(key).cloned())
    }

    fn keys(&self) -> io::Result<Vec<String>> {
        Ok(self.blobs.keys().cloned().collect())
    }

    fn remove(&mut self, key: &str) -> io::Result<()> {
        self.blobs.remove(key);
        Ok(())
    }
}
