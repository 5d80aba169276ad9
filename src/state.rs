//! Capture session state
//!
//! Session-scoped state owned by the engine: the handshake dedup set, the
//! BSSID to SSID index used to annotate logs, and the artifact counters
//! shared with status readers.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime};

use crate::mac::MacAddress;

/// (AP, STA) pair identifying one handshake exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DedupKey {
    pub ap: MacAddress,
    pub sta: MacAddress,
}

impl DedupKey {
    pub fn new(ap: MacAddress, sta: MacAddress) -> Self {
        Self { ap, sta }
    }
}

impl fmt::Display for DedupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} <-> {}", self.ap, self.sta)
    }
}

/// Pairs whose handshake has already been persisted this session.
/// Never written to storage, so a restart starts from an empty set.
#[derive(Debug, Default)]
pub struct DedupStore {
    seen: HashSet<DedupKey>,
}

impl DedupStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, key: &DedupKey) -> bool {
        self.seen.contains(key)
    }

    /// Record a pair. Returns `false` if it was already present.
    pub fn insert(&mut self, key: DedupKey) -> bool {
        self.seen.insert(key)
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    pub fn clear(&mut self) {
        self.seen.clear();
    }
}

/// Last SSID observed for each BSSID; latest write wins
#[derive(Debug, Default, Clone)]
pub struct SsidIndex {
    names: HashMap<MacAddress, String>,
}

impl SsidIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `ssid` for `bssid`. Returns `true` when the stored name changed.
    pub fn update(&mut self, bssid: MacAddress, ssid: &str) -> bool {
        match self.names.get(&bssid) {
            Some(existing) if existing == ssid => false,
            _ => {
                self.names.insert(bssid, ssid.to_string());
                true
            }
        }
    }

    pub fn get(&self, bssid: &MacAddress) -> Option<&str> {
        self.names.get(bssid).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Monotonic artifact counters. Written by the engine, read from any thread.
#[derive(Debug)]
pub struct CaptureCounters {
    handshakes: AtomicU64,
    pmkids: AtomicU64,
    frames: AtomicU64,
    bytes: AtomicU64,
    duplicates: AtomicU64,
    storage_errors: AtomicU64,
    rotations: AtomicU64,
    start_time: SystemTime,
}

impl Default for CaptureCounters {
    fn default() -> Self {
        Self {
            handshakes: AtomicU64::new(0),
            pmkids: AtomicU64::new(0),
            frames: AtomicU64::new(0),
            bytes: AtomicU64::new(0),
            duplicates: AtomicU64::new(0),
            storage_errors: AtomicU64::new(0),
            rotations: AtomicU64::new(0),
            start_time: SystemTime::now(),
        }
    }
}

impl CaptureCounters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a frame handed to the dispatcher
    pub fn record_frame(&self, bytes: usize) {
        self.frames.fetch_add(1, Ordering::Relaxed);
        self.bytes.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    /// Record a persisted handshake
    pub fn record_handshake(&self) {
        self.handshakes.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a persisted PMKID
    pub fn record_pmkid(&self) {
        self.pmkids.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a handshake dropped by the dedup store
    pub fn record_duplicate(&self) {
        self.duplicates.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a dropped artifact or failed capture write
    pub fn record_storage_error(&self) {
        self.storage_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rotation(&self) {
        self.rotations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn handshakes(&self) -> u64 {
        self.handshakes.load(Ordering::Relaxed)
    }

    pub fn pmkids(&self) -> u64 {
        self.pmkids.load(Ordering::Relaxed)
    }

    pub fn frames(&self) -> u64 {
        self.frames.load(Ordering::Relaxed)
    }

    /// Get uptime duration
    pub fn uptime(&self) -> Duration {
        SystemTime::now()
            .duration_since(self.start_time)
            .unwrap_or_default()
    }

    /// Point-in-time copy of every counter
    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            handshakes: self.handshakes(),
            pmkids: self.pmkids(),
            frames: self.frames(),
            bytes: self.bytes.load(Ordering::Relaxed),
            duplicates: self.duplicates.load(Ordering::Relaxed),
            storage_errors: self.storage_errors.load(Ordering::Relaxed),
            rotations: self.rotations.load(Ordering::Relaxed),
            uptime: self.uptime(),
        }
    }
}

/// Plain copy of the counters for display or serialization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CounterSnapshot {
    /// Handshakes persisted
    pub handshakes: u64,
    /// PMKIDs persisted
    pub pmkids: u64,
    /// Frames dispatched
    pub frames: u64,
    /// Bytes dispatched
    pub bytes: u64,
    /// Handshakes suppressed as duplicates
    pub duplicates: u64,
    /// Records dropped on storage failure
    pub storage_errors: u64,
    /// Capture file rotations, including the first one
    pub rotations: u64,
    pub uptime: Duration,
}
