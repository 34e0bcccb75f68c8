use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::message::{RasterBlob, RoomId, SnapshotRecord};

/// Byte budget modeled after browser local-storage quotas.
const DEFAULT_QUOTA_BYTES: usize = 5 * 1024 * 1024;

/// Keeping every whiteboard forever would grow without bound; older saves in
/// a room are evicted past this count.
const MAX_RECORDS_PER_ROOM: usize = 32;

#[derive(Debug, PartialEq)]
pub enum StoreError {
    /// The local keyed storage is full. The store is left as it was.
    QuotaExceeded,
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::QuotaExceeded => write!(f, "snapshot storage quota exceeded"),
        }
    }
}

impl std::error::Error for StoreError {}

/// Named drawing snapshots, keyed by `{room}/{timestamp}`. Saves are mirrored
/// to room peers by broadcasting the blob itself; colliding keys resolve
/// last-writer-wins.
pub struct SnapshotStore {
    records: BTreeMap<String, SnapshotRecord>,
    used_bytes: usize,
    quota_bytes: usize,
    last_timestamp_ms: u64,
}

impl SnapshotStore {
    pub fn new() -> Self {
        Self::with_quota(DEFAULT_QUOTA_BYTES)
    }

    pub fn with_quota(quota_bytes: usize) -> Self {
        Self {
            records: BTreeMap::new(),
            used_bytes: 0,
            quota_bytes,
            last_timestamp_ms: 0,
        }
    }

    /// Stores `blob` under a fresh key in `room`'s namespace and returns the
    /// key. Fails without touching the store when the quota would be
    /// exceeded.
    pub fn save(&mut self, room: &RoomId, blob: RasterBlob) -> Result<String, StoreError> {
        if self.used_bytes + blob.len() > self.quota_bytes {
            return Err(StoreError::QuotaExceeded);
        }
        let timestamp_ms = self.next_timestamp_ms();
        let key = make_key(room, timestamp_ms);
        self.insert(room, key.clone(), blob, timestamp_ms);
        Ok(key)
    }

    /// Keys and timestamps in `room`'s namespace, oldest first. Membership
    /// is the record's own room tag, not the key prefix: room names may
    /// themselves contain the key separator.
    pub fn list(&self, room: &RoomId) -> Vec<(String, u64)> {
        self.records
            .values()
            .filter(|record| record.room == *room)
            .map(|record| (record.key.clone(), record.timestamp_ms))
            .collect()
    }

    /// `None` for unknown keys; loading a missing snapshot is a no-op.
    pub fn load(&self, key: &str) -> Option<&RasterBlob> {
        self.records.get(key).map(|record| &record.blob)
    }

    pub fn delete(&mut self, key: &str) -> bool {
        match self.records.remove(key) {
            Some(record) => {
                self.used_bytes -= record.blob.len();
                true
            }
            None => false,
        }
    }

    /// Mirrors a peer's save. Replication is best effort: a full store logs
    /// and drops the record instead of failing the session.
    pub fn apply_remote_saved(&mut self, room: &RoomId, key: String, blob: RasterBlob) {
        if self.used_bytes + blob.len() > self.quota_bytes {
            log::warn!("dropping replicated snapshot {}: quota exceeded", key);
            return;
        }
        let timestamp_ms = parse_timestamp(&key).unwrap_or_else(|| self.next_timestamp_ms());
        self.insert(room, key, blob, timestamp_ms);
    }

    pub fn apply_remote_deleted(&mut self, key: &str) {
        self.delete(key);
    }

    fn insert(&mut self, room: &RoomId, key: String, blob: RasterBlob, timestamp_ms: u64) {
        self.used_bytes += blob.len();
        if let Some(previous) = self.records.insert(
            key.clone(),
            SnapshotRecord {
                key,
                room: room.clone(),
                blob,
                timestamp_ms,
            },
        ) {
            self.used_bytes -= previous.blob.len();
        }
        self.evict(room);
    }

    fn evict(&mut self, room: &RoomId) {
        while self.list(room).len() > MAX_RECORDS_PER_ROOM {
            // Keys sort by timestamp within a room, so the first one is the
            // oldest.
            let oldest = self
                .list(room)
                .first()
                .map(|(key, _)| key.clone())
                .expect("non-empty by loop condition");
            log::debug!("evicting oldest snapshot {}", oldest);
            self.delete(&oldest);
        }
    }

    fn next_timestamp_ms(&mut self) -> u64 {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        // Two saves inside one millisecond must not collide.
        self.last_timestamp_ms = now.max(self.last_timestamp_ms + 1);
        self.last_timestamp_ms
    }
}

impl Default for SnapshotStore {
    fn default() -> Self {
        Self::new()
    }
}

fn make_key(room: &RoomId, timestamp_ms: u64) -> String {
    // Zero padding keeps lexicographic order equal to chronological order.
    format!("{}/{:013}", room, timestamp_ms)
}

fn parse_timestamp(key: &str) -> Option<u64> {
    key.rsplit('/').next()?.parse().ok()
}
