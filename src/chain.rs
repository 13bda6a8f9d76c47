use crate::digest::{genesis_hash, Digest};
use crate::drift::DriftEvent;
use crate::error::DriftError;
use crate::fingerprint::Fingerprint;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// One pipeline observation, recorded whether or not it drifted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservationRecord {
    pub screen_id: Option<String>,
    pub score: f64,
    pub fingerprint: Fingerprint,
    pub source: String,
    pub captured_at: i64,
}

/// What a chain entry carries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LogPayload {
    Drift(DriftEvent),
    Observation(ObservationRecord),
}

/// One immutable chain entry. Exactly these four fields go to disk; the
/// schema is the compatibility surface for external auditors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub entry_hash: Digest,
    pub previous_hash: Digest,
    pub payload: LogPayload,
    pub timestamp: i64,
}

/// `SHA-256(previous_hash ‖ canonical_json(payload) ‖ timestamp)`, with
/// the timestamp as fixed-width big-endian bytes.
pub fn entry_hash(previous: &Digest, payload_bytes: &[u8], timestamp: i64) -> Digest {
    let mut input = Vec::with_capacity(32 + payload_bytes.len() + 8);
    input.extend_from_slice(previous.as_bytes());
    input.extend_from_slice(payload_bytes);
    input.extend_from_slice(&timestamp.to_be_bytes());
    Digest::sha256(&input)
}

/// Storage backend for chain entries, keyed by sequential index.
///
/// `persist` must be durable before returning: the log advances its
/// chain state only after a successful persist, so a failed append
/// leaves the chain exactly as it was.
pub trait EntryStore {
    fn persist(&mut self, index: u64, entry: &LogEntry) -> Result<(), DriftError>;
    fn load(&self, index: u64) -> Result<Option<LogEntry>, DriftError>;
    /// Drops a trailing record that failed to decode on open. Only ever
    /// called for the final index during recovery.
    fn discard(&mut self, index: u64) -> Result<(), DriftError>;
}

/// Volatile backend for tests and benches.
#[derive(Debug, Default)]
pub struct MemStore {
    entries: Vec<Vec<u8>>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl EntryStore for MemStore {
    fn persist(&mut self, index: u64, entry: &LogEntry) -> Result<(), DriftError> {
        let bytes = serde_json::to_vec(entry)?;
        if index as usize != self.entries.len() {
            return Err(DriftError::AppendFailed(format!(
                "non-sequential index {index}"
            )));
        }
        self.entries.push(bytes);
        Ok(())
    }

    fn load(&self, index: u64) -> Result<Option<LogEntry>, DriftError> {
        match self.entries.get(index as usize) {
            Some(bytes) => Ok(Some(serde_json::from_slice(bytes)?)),
            None => Ok(None),
        }
    }

    fn discard(&mut self, index: u64) -> Result<(), DriftError> {
        if index as usize == self.entries.len().saturating_sub(1) {
            self.entries.pop();
        }
        Ok(())
    }
}

/// Durable backend over sled, keyed by big-endian u64 so iteration order
/// matches append order. Every persist flushes before returning.
pub struct SledStore {
    db: sled::Db,
}

impl SledStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, DriftError> {
        let db = sled::open(path)?;
        Ok(Self { db })
    }
}

impl EntryStore for SledStore {
    fn persist(&mut self, index: u64, entry: &LogEntry) -> Result<(), DriftError> {
        let bytes = serde_json::to_vec(entry)?;
        self.db.insert(index.to_be_bytes(), bytes)?;
        self.db.flush()?;
        Ok(())
    }

    fn load(&self, index: u64) -> Result<Option<LogEntry>, DriftError> {
        match self.db.get(index.to_be_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn discard(&mut self, index: u64) -> Result<(), DriftError> {
        self.db.remove(index.to_be_bytes())?;
        self.db.flush()?;
        Ok(())
    }
}

/// Append-only hash-chained log. The single owner of chain state: no
/// other code touches chain bytes.
///
/// Appends are strictly serialized (each entry hash depends on the prior
/// tip); callers share the log behind a mutex. Reads of already-persisted
/// entries need no coordination, since entries never change once written.
pub struct ImmutableLog<S: EntryStore> {
    store: S,
    tip: Digest,
    length: u64,
}

impl<S: EntryStore> ImmutableLog<S> {
    /// Opens a log over a backend, replaying existing entries to recover
    /// the tip. A final record that fails to decode is treated as a
    /// torn write from a crashed append and discarded as never-appended.
    pub fn open(mut store: S) -> Result<Self, DriftError> {
        let mut tip = genesis_hash();
        let mut length: u64 = 0;
        loop {
            match store.load(length) {
                Ok(Some(entry)) => {
                    tip = entry.entry_hash;
                    length += 1;
                }
                Ok(None) => break,
                Err(decode_error) => {
                    // Only a truncated *final* record is recoverable.
                    match store.load(length + 1)? {
                        None => {
                            store.discard(length)?;
                            break;
                        }
                        Some(_) => return Err(decode_error),
                    }
                }
            }
        }
        Ok(Self { store, tip, length })
    }

    pub fn tip(&self) -> Digest {
        self.tip
    }

    pub fn len(&self) -> u64 {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Appends a payload, returning the committed entry. Fully commits
    /// (entry durable, state advanced) or fails atomically with chain
    /// state untouched. Never retried implicitly.
    pub fn append(&mut self, payload: LogPayload) -> Result<LogEntry, DriftError> {
        let payload_bytes = serde_json::to_vec(&payload)?;
        let timestamp = chrono::Utc::now().timestamp();
        let hash = entry_hash(&self.tip, &payload_bytes, timestamp);
        let entry = LogEntry {
            entry_hash: hash,
            previous_hash: self.tip,
            payload,
            timestamp,
        };

        self.store
            .persist(self.length, &entry)
            .map_err(|e| DriftError::AppendFailed(e.to_string()))?;

        self.tip = hash;
        self.length += 1;
        Ok(entry)
    }

    pub fn get(&self, index: u64) -> Result<Option<LogEntry>, DriftError> {
        self.store.load(index)
    }

    /// Reads entries `[start, end)`, clamped to the chain length.
    pub fn read(&self, start: u64, end: u64) -> Result<Vec<LogEntry>, DriftError> {
        let end = end.min(self.length);
        let mut entries = Vec::new();
        for index in start..end {
            match self.store.load(index)? {
                Some(entry) => entries.push(entry),
                None => break,
            }
        }
        Ok(entries)
    }

    /// Full-chain audit from genesis. Read-only.
    pub fn verify(&self) -> Result<(), DriftError> {
        let entries = self.read(0, self.length)?;
        verify_entries(&entries).map_err(|index| DriftError::ChainIntegrity { index })
    }
}

/// Walks entries in order, recomputing each hash from its own payload,
/// timestamp and declared `previous_hash`, and checking both against the
/// stored hash and the prior entry's actual hash. Returns the index of
/// the first mismatch. Tampering anywhere invalidates the chain from
/// that index forward by construction.
pub fn verify_entries(entries: &[LogEntry]) -> Result<(), u64> {
    let mut previous = genesis_hash();
    for (index, entry) in entries.iter().enumerate() {
        let index = index as u64;
        if entry.previous_hash != previous {
            return Err(index);
        }
        let payload_bytes = serde_json::to_vec(&entry.payload).map_err(|_| index)?;
        let expected = entry_hash(&entry.previous_hash, &payload_bytes, entry.timestamp);
        if expected != entry.entry_hash {
            return Err(index);
        }
        previous = entry.entry_hash;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drift::{DriftKind, Severity};
    use serde_json::json;
    use std::collections::BTreeMap;

    fn event(tag: &str) -> LogPayload {
        let mut evidence = BTreeMap::new();
        evidence.insert("tag".to_string(), json!(tag));
        LogPayload::Drift(DriftEvent::at(
            DriftKind::Layout,
            Severity::Info,
            evidence,
            1_700_000_000,
        ))
    }

    #[test]
    fn genesis_previous_hash_is_hash_of_empty_string() {
        let mut log = ImmutableLog::open(MemStore::new()).unwrap();
        let entry = log.append(event("first")).unwrap();
        assert_eq!(entry.previous_hash, genesis_hash());
        assert_eq!(
            entry.previous_hash.to_hex(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn chain_links_and_verifies() {
        let mut log = ImmutableLog::open(MemStore::new()).unwrap();
        let first = log.append(event("a")).unwrap();
        let second = log.append(event("b")).unwrap();
        assert_eq!(second.previous_hash, first.entry_hash);
        assert_eq!(log.len(), 2);
        assert_eq!(log.tip(), second.entry_hash);
        log.verify().unwrap();
    }

    #[test]
    fn tampering_is_detected_at_the_right_index() {
        let mut log = ImmutableLog::open(MemStore::new()).unwrap();
        for tag in ["a", "b", "c", "d"] {
            log.append(event(tag)).unwrap();
        }
        let mut entries = log.read(0, 4).unwrap();

        // Mutate entry 2's payload.
        if let LogPayload::Drift(ref mut e) = entries[2].payload {
            e.evidence.insert("tag".to_string(), json!("forged"));
        }

        assert_eq!(verify_entries(&entries), Err(2));
        // The untampered prefix still verifies in isolation.
        assert_eq!(verify_entries(&entries[..2]), Ok(()));
    }

    #[test]
    fn relinking_a_tampered_entry_breaks_the_successor() {
        let mut log = ImmutableLog::open(MemStore::new()).unwrap();
        for tag in ["a", "b", "c"] {
            log.append(event(tag)).unwrap();
        }
        let mut entries = log.read(0, 3).unwrap();

        // Recompute entry 1's hash over forged content; entry 2 still
        // points at the old hash, so the break surfaces there.
        if let LogPayload::Drift(ref mut e) = entries[1].payload {
            e.evidence.insert("tag".to_string(), json!("forged"));
        }
        let payload_bytes = serde_json::to_vec(&entries[1].payload).unwrap();
        entries[1].entry_hash = entry_hash(
            &entries[1].previous_hash,
            &payload_bytes,
            entries[1].timestamp,
        );

        assert_eq!(verify_entries(&entries), Err(2));
    }

    #[test]
    fn sled_backend_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let tip;
        {
            let store = SledStore::open(dir.path().join("chain")).unwrap();
            let mut log = ImmutableLog::open(store).unwrap();
            log.append(event("a")).unwrap();
            log.append(event("b")).unwrap();
            tip = log.tip();
        }
        let store = SledStore::open(dir.path().join("chain")).unwrap();
        let log = ImmutableLog::open(store).unwrap();
        assert_eq!(log.len(), 2);
        assert_eq!(log.tip(), tip);
        log.verify().unwrap();
    }

    #[test]
    fn torn_final_record_is_discarded_on_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chain");
        {
            let store = SledStore::open(&path).unwrap();
            let mut log = ImmutableLog::open(store).unwrap();
            log.append(event("a")).unwrap();
        }
        {
            // Simulate a crash mid-append: garbage trailing record.
            let db = sled::open(&path).unwrap();
            db.insert(1u64.to_be_bytes(), &b"{\"entry_hash\": \"trunc"[..])
                .unwrap();
            db.flush().unwrap();
        }
        let store = SledStore::open(&path).unwrap();
        let mut log = ImmutableLog::open(store).unwrap();
        assert_eq!(log.len(), 1);
        log.verify().unwrap();
        // And the log keeps accepting appends afterwards.
        log.append(event("b")).unwrap();
        log.verify().unwrap();
    }

    #[test]
    fn read_is_clamped() {
        let mut log = ImmutableLog::open(MemStore::new()).unwrap();
        log.append(event("a")).unwrap();
        let entries = log.read(0, 100).unwrap();
        assert_eq!(entries.len(), 1);
        assert!(log.read(5, 100).unwrap().is_empty());
    }
}
