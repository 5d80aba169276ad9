//! Artifact persistence
//!
//! `Storage` is the boundary to the file store; paths handed to it are
//! relative to the output root (`handshakes/`, `pmkid/`, `logs/`).
//! `ArtifactStore` turns parsed handshakes and PMKIDs into artifact files
//! and JSONL log lines.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

use crate::handshake::Handshake;
use crate::mac::MacAddress;
use crate::pmkid::Pmkid;
use crate::state::SsidIndex;
use crate::{CaptureError, Result, HIDDEN_SSID};

pub const HANDSHAKE_DIR: &str = "handshakes";
pub const PMKID_DIR: &str = "pmkid";
pub const LOG_DIR: &str = "logs";
pub const HANDSHAKE_LOG: &str = "logs/handshakes.jsonl";
pub const PMKID_LOG: &str = "logs/pmkid.jsonl";

/// Hierarchical file store the engine writes into
pub trait Storage: Send + Sync {
    /// Create or truncate `path` and write `contents` to it
    fn create(&self, path: &Path, contents: &[u8]) -> Result<()>;

    /// Append `contents` to `path`, creating it if needed
    fn append(&self, path: &Path, contents: &[u8]) -> Result<()>;

    fn exists(&self, path: &Path) -> bool;

    /// Create or truncate `path` and keep it open for sequential writes
    fn open_stream(&self, path: &Path) -> Result<Box<dyn Write + Send>>;

    /// Location of `path` as shown to users
    fn resolve(&self, path: &Path) -> PathBuf {
        path.to_path_buf()
    }
}

/// `Storage` backed by a directory on the local filesystem
#[derive(Debug, Clone)]
pub struct FsStorage {
    root: PathBuf,
}

impl FsStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the output root and its artifact directories
    pub fn prepare(&self) -> Result<()> {
        for dir in [HANDSHAKE_DIR, PMKID_DIR, LOG_DIR] {
            let path = self.root.join(dir);
            fs::create_dir_all(&path).map_err(|source| CaptureError::Storage { path, source })?;
        }
        debug!("Prepared output directories under {}", self.root.display());
        Ok(())
    }

    fn storage_error(&self, path: &Path) -> impl FnOnce(io::Error) -> CaptureError {
        let path = self.root.join(path);
        move |source| CaptureError::Storage { path, source }
    }
}

impl Storage for FsStorage {
    fn create(&self, path: &Path, contents: &[u8]) -> Result<()> {
        fs::write(self.root.join(path), contents).map_err(self.storage_error(path))
    }

    fn append(&self, path: &Path, contents: &[u8]) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.root.join(path))
            .map_err(self.storage_error(path))?;
        file.write_all(contents).map_err(self.storage_error(path))
    }

    fn exists(&self, path: &Path) -> bool {
        self.root.join(path).exists()
    }

    fn open_stream(&self, path: &Path) -> Result<Box<dyn Write + Send>> {
        let file = File::create(self.root.join(path)).map_err(self.storage_error(path))?;
        Ok(Box::new(BufWriter::new(file)))
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        self.root.join(path)
    }
}

/// In-memory `Storage`. Clones share the same files.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    files: Arc<Mutex<HashMap<PathBuf, Vec<u8>>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of a file's contents
    pub fn read(&self, path: impl AsRef<Path>) -> Option<Vec<u8>> {
        self.files.lock().ok()?.get(path.as_ref()).cloned()
    }

    /// Every stored path, sorted
    pub fn paths(&self) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = match self.files.lock() {
            Ok(files) => files.keys().cloned().collect(),
            Err(_) => Vec::new(),
        };
        paths.sort();
        paths
    }

    /// Stored paths under `dir`
    pub fn list(&self, dir: impl AsRef<Path>) -> Vec<PathBuf> {
        self.paths()
            .into_iter()
            .filter(|p| p.starts_with(dir.as_ref()))
            .collect()
    }

    fn with_files<T>(&self, f: impl FnOnce(&mut HashMap<PathBuf, Vec<u8>>) -> T) -> Result<T> {
        let mut files = self
            .files
            .lock()
            .map_err(|_| CaptureError::Config("memory storage lock poisoned".to_string()))?;
        Ok(f(&mut files))
    }
}

impl Storage for MemoryStorage {
    fn create(&self, path: &Path, contents: &[u8]) -> Result<()> {
        self.with_files(|files| {
            files.insert(path.to_path_buf(), contents.to_vec());
        })
    }

    fn append(&self, path: &Path, contents: &[u8]) -> Result<()> {
        self.with_files(|files| {
            files
                .entry(path.to_path_buf())
                .or_default()
                .extend_from_slice(contents);
        })
    }

    fn exists(&self, path: &Path) -> bool {
        self.with_files(|files| files.contains_key(path)).unwrap_or(false)
    }

    fn open_stream(&self, path: &Path) -> Result<Box<dyn Write + Send>> {
        self.create(path, &[])?;
        Ok(Box::new(MemoryStream {
            storage: self.clone(),
            path: path.to_path_buf(),
        }))
    }
}

struct MemoryStream {
    storage: MemoryStorage,
    path: PathBuf,
}

impl Write for MemoryStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.storage
            .append(&self.path, buf)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// One line of `logs/handshakes.jsonl`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandshakeLogEntry {
    #[serde(rename = "type")]
    pub kind: String,
    pub ap: String,
    pub sta: String,
    /// Empty when the network has not been seen yet
    pub ssid: String,
    pub file: String,
    pub keyver: u8,
    /// Message number, 0 when unclassified
    pub msg: u8,
    pub channel: u8,
    /// Milliseconds
    pub timestamp: u64,
}

/// One line of `logs/pmkid.jsonl`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PmkidLogEntry {
    #[serde(rename = "type")]
    pub kind: String,
    pub ap: String,
    pub sta: String,
    pub ssid: String,
    pub file: String,
    pub channel: u8,
    /// Milliseconds
    pub timestamp: u64,
}

/// Writes handshake and PMKID artifacts plus their log lines
pub struct ArtifactStore {
    storage: Arc<dyn Storage>,
    ssids: SsidIndex,
}

impl ArtifactStore {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self {
            storage,
            ssids: SsidIndex::new(),
        }
    }

    pub fn ssids(&self) -> &SsidIndex {
        &self.ssids
    }

    /// Remember the name a BSSID advertises. Hidden names never replace a
    /// known one.
    pub fn observe_ssid(&mut self, bssid: MacAddress, ssid: &str) {
        if ssid.is_empty() || ssid == HIDDEN_SSID {
            return;
        }
        if self.ssids.update(bssid, ssid) {
            debug!("SSID for {}: {}", bssid, ssid);
        }
    }

    /// Path of the binary artifact for a handshake
    pub fn handshake_path(handshake: &Handshake) -> PathBuf {
        Path::new(HANDSHAKE_DIR).join(format!(
            "hs_{}_{}_{}.bin",
            handshake.ap.to_compact(),
            handshake.sta.to_compact(),
            handshake.timestamp.as_millis()
        ))
    }

    /// Path of the hash file for a PMKID
    pub fn pmkid_path(pmkid: &Pmkid) -> PathBuf {
        Path::new(PMKID_DIR).join(format!(
            "{}_{}_{}.16800",
            pmkid.pmkid_hex(),
            pmkid.ap.to_compact(),
            pmkid.sta.to_compact()
        ))
    }

    /// Write the MIC-zeroed EAPOL bytes and append a log line. The
    /// artifact counts as saved once its file exists.
    pub fn save_handshake(&mut self, handshake: &Handshake) -> Result<PathBuf> {
        let path = Self::handshake_path(handshake);
        self.storage.create(&path, &handshake.eapol)?;

        let file = self.storage.resolve(&path);
        let entry = HandshakeLogEntry {
            kind: "handshake".to_string(),
            ap: handshake.ap.to_compact(),
            sta: handshake.sta.to_compact(),
            ssid: self.ssids.get(&handshake.ap).unwrap_or_default().to_string(),
            file: file.display().to_string(),
            keyver: handshake.key_version,
            msg: handshake.message.number(),
            channel: handshake.channel,
            timestamp: handshake.timestamp.as_millis() as u64,
        };
        self.append_log(Path::new(HANDSHAKE_LOG), &entry);

        info!(
            "Handshake {} saved: AP={} STA={} ch={} -> {}",
            handshake.message,
            handshake.ap,
            handshake.sta,
            handshake.channel,
            file.display()
        );
        Ok(file)
    }

    /// Write the hash line and append a log line
    pub fn save_pmkid(&mut self, pmkid: &Pmkid) -> Result<PathBuf> {
        let path = Self::pmkid_path(pmkid);
        let line = format!("{}\n", pmkid.hash_line());
        self.storage.create(&path, line.as_bytes())?;

        self.observe_ssid(pmkid.ap, &pmkid.ssid);

        let file = self.storage.resolve(&path);
        let entry = PmkidLogEntry {
            kind: "pmkid".to_string(),
            ap: pmkid.ap.to_compact(),
            sta: pmkid.sta.to_compact(),
            ssid: pmkid.ssid.clone(),
            file: file.display().to_string(),
            channel: pmkid.channel,
            timestamp: pmkid.timestamp.as_millis() as u64,
        };
        self.append_log(Path::new(PMKID_LOG), &entry);

        info!(
            "PMKID saved: AP={} SSID={} ch={} -> {}",
            pmkid.ap,
            pmkid.ssid,
            pmkid.channel,
            file.display()
        );
        Ok(file)
    }

    fn append_log<T: Serialize>(&self, path: &Path, entry: &T) {
        let result = serde_json::to_vec(entry)
            .map_err(CaptureError::from)
            .and_then(|mut line| {
                line.push(b'\n');
                self.storage.append(path, &line)
            });
        if let Err(e) = result {
            warn!("Failed to append {}: {}", path.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handshake::HandshakeMessage;
    use crate::BROADCAST_MAC;
    use std::time::Duration;

    const AP: MacAddress = MacAddress([0x00, 0x11, 0x22, 0x33, 0x44, 0x55]);
    const STA: MacAddress = MacAddress([0x66, 0x77, 0x88, 0x99, 0xaa, 0xbb]);

    fn handshake() -> Handshake {
        Handshake {
            ap: AP,
            sta: STA,
            anonce: [0x11; 32],
            snonce: [0u8; 32],
            mic: [0u8; 16],
            eapol: vec![0x02, 0x03, 0x00, 0x5f],
            key_version: 2,
            message: HandshakeMessage::Message1,
            replay_counter: 1,
            channel: 6,
            timestamp: Duration::from_millis(1_700_000_000_123),
        }
    }

    fn pmkid() -> Pmkid {
        Pmkid {
            pmkid: [0xab; 16],
            ap: AP,
            sta: BROADCAST_MAC,
            ssid: "TEST".to_string(),
            essid: b"TEST".to_vec(),
            channel: 11,
            timestamp: Duration::from_millis(42),
        }
    }

    #[test]
    fn test_artifact_paths() {
        assert_eq!(
            ArtifactStore::handshake_path(&handshake()),
            PathBuf::from("handshakes/hs_001122334455_66778899AABB_1700000000123.bin")
        );
        assert_eq!(
            ArtifactStore::pmkid_path(&pmkid()),
            PathBuf::from("pmkid/abababababababababababababababab_001122334455_FFFFFFFFFFFF.16800")
        );
    }

    #[test]
    fn test_save_handshake_writes_artifact_and_log() {
        let storage = MemoryStorage::new();
        let mut store = ArtifactStore::new(Arc::new(storage.clone()));

        store.save_handshake(&handshake()).unwrap();

        let path = ArtifactStore::handshake_path(&handshake());
        assert_eq!(storage.read(&path).unwrap(), vec![0x02, 0x03, 0x00, 0x5f]);

        let log = storage.read(HANDSHAKE_LOG).unwrap();
        let entry: HandshakeLogEntry = serde_json::from_slice(log.strip_suffix(b"\n").unwrap()).unwrap();
        assert_eq!(entry.kind, "handshake");
        assert_eq!(entry.ap, "001122334455");
        assert_eq!(entry.sta, "66778899AABB");
        assert_eq!(entry.ssid, "");
        assert_eq!(entry.msg, 1);
        assert_eq!(entry.keyver, 2);
        assert_eq!(entry.channel, 6);
    }

    #[test]
    fn test_handshake_log_enriched_after_pmkid() {
        let storage = MemoryStorage::new();
        let mut store = ArtifactStore::new(Arc::new(storage.clone()));

        store.save_pmkid(&pmkid()).unwrap();
        store.save_handshake(&handshake()).unwrap();

        let log = String::from_utf8(storage.read(HANDSHAKE_LOG).unwrap()).unwrap();
        let entry: HandshakeLogEntry = serde_json::from_str(log.trim_end()).unwrap();
        assert_eq!(entry.ssid, "TEST");
    }

    #[test]
    fn test_save_pmkid_hash_file() {
        let storage = MemoryStorage::new();
        let mut store = ArtifactStore::new(Arc::new(storage.clone()));

        store.save_pmkid(&pmkid()).unwrap();
        store.save_pmkid(&pmkid()).unwrap();

        let hash = storage.read(ArtifactStore::pmkid_path(&pmkid())).unwrap();
        assert_eq!(
            String::from_utf8(hash).unwrap(),
            "WPA*01*abababababababababababababababab*001122334455*ffffffffffff*54455354\n"
        );

        // re-advertisements are logged every time
        let log = String::from_utf8(storage.read(PMKID_LOG).unwrap()).unwrap();
        assert_eq!(log.lines().count(), 2);
        let entry: PmkidLogEntry = serde_json::from_str(log.lines().next().unwrap()).unwrap();
        assert_eq!(entry.kind, "pmkid");
        assert_eq!(entry.sta, "FFFFFFFFFFFF");
        assert_eq!(entry.ssid, "TEST");
    }

    /// Accepts artifacts but rejects every log append
    struct NoLogStorage(MemoryStorage);

    impl Storage for NoLogStorage {
        fn create(&self, path: &Path, contents: &[u8]) -> Result<()> {
            self.0.create(path, contents)
        }

        fn append(&self, path: &Path, _contents: &[u8]) -> Result<()> {
            Err(CaptureError::Storage {
                path: path.to_path_buf(),
                source: io::Error::new(io::ErrorKind::PermissionDenied, "logs"),
            })
        }

        fn exists(&self, path: &Path) -> bool {
            self.0.exists(path)
        }

        fn open_stream(&self, path: &Path) -> Result<Box<dyn Write + Send>> {
            self.0.open_stream(path)
        }
    }

    #[test]
    fn test_log_failure_keeps_saved_artifacts() {
        let storage = MemoryStorage::new();
        let mut store = ArtifactStore::new(Arc::new(NoLogStorage(storage.clone())));

        let file = store.save_handshake(&handshake()).unwrap();
        assert_eq!(file, ArtifactStore::handshake_path(&handshake()));
        assert!(storage.read(&file).is_some());

        let file = store.save_pmkid(&pmkid()).unwrap();
        assert!(storage.read(&file).is_some());
        assert_eq!(store.ssids().get(&AP), Some("TEST"));
        assert!(storage.read(HANDSHAKE_LOG).is_none());
    }

    #[test]
    fn test_hidden_ssid_does_not_replace_known_name() {
        let mut store = ArtifactStore::new(Arc::new(MemoryStorage::new()));
        store.observe_ssid(AP, "home");
        store.observe_ssid(AP, HIDDEN_SSID);
        store.observe_ssid(AP, "");
        assert_eq!(store.ssids().get(&AP), Some("home"));
    }

    #[test]
    fn test_fs_storage_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FsStorage::new(dir.path());
        storage.prepare().unwrap();

        assert!(dir.path().join("handshakes").is_dir());
        assert!(dir.path().join("pmkid").is_dir());
        assert!(dir.path().join("logs").is_dir());

        let log = Path::new(HANDSHAKE_LOG);
        assert!(!storage.exists(log));
        storage.append(log, b"one\n").unwrap();
        storage.append(log, b"two\n").unwrap();
        assert_eq!(fs::read(dir.path().join(log)).unwrap(), b"one\ntwo\n");

        let mut stream = storage.open_stream(Path::new("handshakes/a.pcap")).unwrap();
        stream.write_all(b"abc").unwrap();
        stream.flush().unwrap();
        assert_eq!(fs::read(dir.path().join("handshakes/a.pcap")).unwrap(), b"abc");
        assert_eq!(storage.resolve(log), dir.path().join(log));
    }

    #[test]
    fn test_fs_storage_missing_directory_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FsStorage::new(dir.path().join("absent"));

        let err = storage
            .create(Path::new("pmkid/x.16800"), b"line\n")
            .unwrap_err();
        match err {
            CaptureError::Storage { path, .. } => assert!(path.ends_with("pmkid/x.16800")),
            other => panic!("unexpected error: {other}"),
        }
    }
}
