//! Per-frame dispatcher
//!
//! `CaptureEngine` is the single entry point for received frames. Each frame
//! is appended to the capture stream, then checked for an EAPOL-Key payload
//! or a PMKID-bearing RSN element. Failures on one frame are logged and
//! never stop processing of the next one.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, trace, warn};

use crate::capture::CaptureSession;
use crate::config::{CaptureConfig, StorageConfig};
use crate::eapol;
use crate::handshake::{Handshake, HandshakeMessage};
use crate::ieee80211::{classify, FrameHeader, FrameType};
use crate::mac::MacAddress;
use crate::pmkid::{Pmkid, TaggedParams};
use crate::state::{CaptureCounters, DedupKey, DedupStore, SsidIndex};
use crate::store::{ArtifactStore, Storage};
use crate::{CaptureError, Result};

/// A received frame, borrowed for the duration of one dispatch
#[derive(Debug, Clone, Copy)]
pub struct RawFrame<'a> {
    pub data: &'a [u8],
    pub channel: u8,
    /// Arrival time since the Unix epoch
    pub timestamp: Duration,
}

impl<'a> RawFrame<'a> {
    pub fn new(data: &'a [u8], channel: u8, timestamp: Duration) -> Self {
        Self {
            data,
            channel,
            timestamp,
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Receiver of raw frames, implemented by the engine and invoked by the
/// radio layer once per frame
pub trait FrameSink {
    fn on_frame(&mut self, data: &[u8], channel: u8);
}

/// Notifications for status displays
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureEvent {
    HandshakeCaptured {
        ap: MacAddress,
        sta: MacAddress,
        message: HandshakeMessage,
    },
    PmkidCaptured {
        ap: MacAddress,
        ssid: String,
    },
    CaptureRotated {
        path: PathBuf,
    },
}

/// Observer of capture events. Called synchronously from the dispatcher.
pub trait CaptureListener: Send + Sync {
    fn on_event(&self, event: &CaptureEvent);

    /// Get listener name
    fn name(&self) -> &str;
}

/// What the dispatcher did with a frame beyond recording it
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameResult {
    /// Too short or malformed to classify
    NotApplicable,
    /// Valid frame carrying nothing of interest
    Ignored,
    /// Handshake message persisted
    Handshake {
        message: HandshakeMessage,
        path: PathBuf,
    },
    /// Handshake for a pair that was already saved
    Duplicate(DedupKey),
    /// PMKID persisted
    Pmkid { path: PathBuf },
    /// Artifact parsed but could not be stored
    Dropped,
}

/// Result of one dispatch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchOutcome {
    /// Frame appended to the capture stream
    pub recorded: bool,
    /// The append started a new capture file
    pub rotated: bool,
    pub result: FrameResult,
}

/// The capture and extraction engine
pub struct CaptureEngine {
    config: StorageConfig,
    capture: CaptureSession,
    store: ArtifactStore,
    dedup: DedupStore,
    counters: Arc<CaptureCounters>,
    listeners: Vec<Arc<dyn CaptureListener>>,
}

impl std::fmt::Debug for CaptureEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureEngine")
            .field("config", &self.config)
            .field("capture", &self.capture.current_path())
            .field("dedup", &self.dedup.len())
            .field("counters", &self.counters)
            .field("listeners", &format!("[{} listeners]", self.listeners.len()))
            .finish()
    }
}

impl CaptureEngine {
    /// Create an engine writing into `storage` and open the first capture
    /// file. A failure to open it is logged; frames are still parsed.
    pub fn new<S: Storage + 'static>(config: &CaptureConfig, storage: S) -> Self {
        let storage: Arc<dyn Storage> = Arc::new(storage);
        let counters = Arc::new(CaptureCounters::new());
        let mut capture = CaptureSession::new(Arc::clone(&storage), config.storage.max_capture_size);

        match capture.rotate() {
            Ok(_) => counters.record_rotation(),
            Err(e) => warn!("Failed to open capture file: {}", e),
        }

        Self {
            config: config.storage.clone(),
            capture,
            store: ArtifactStore::new(storage),
            dedup: DedupStore::new(),
            counters,
            listeners: Vec::new(),
        }
    }

    /// Shared handle to the artifact counters
    pub fn counters(&self) -> Arc<CaptureCounters> {
        Arc::clone(&self.counters)
    }

    pub fn dedup(&self) -> &DedupStore {
        &self.dedup
    }

    pub fn ssids(&self) -> &SsidIndex {
        self.store.ssids()
    }

    pub fn add_listener(&mut self, listener: Arc<dyn CaptureListener>) {
        self.listeners.push(listener);
    }

    pub fn remove_listener(&mut self, name: &str) {
        self.listeners.retain(|l| l.name() != name);
    }

    /// Path of the capture file presently being written
    pub fn current_capture_path(&self) -> Option<PathBuf> {
        self.capture.current_path()
    }

    /// Start a new capture file now
    pub fn rotate(&mut self) -> Result<PathBuf> {
        self.capture.rotate()?;
        self.counters.record_rotation();
        let path = self.capture.current_path().ok_or(CaptureError::NoCaptureFile)?;
        self.notify(&CaptureEvent::CaptureRotated { path: path.clone() });
        Ok(path)
    }

    /// Flush buffered capture data to storage
    pub fn flush(&mut self) -> Result<()> {
        self.capture.flush()
    }

    /// Process one frame
    pub fn dispatch(&mut self, frame: RawFrame<'_>) -> DispatchOutcome {
        self.counters.record_frame(frame.len());
        let (recorded, rotated) = self.record(&frame);

        let result = match classify(frame.data) {
            None => {
                trace!("Unclassifiable frame of {} bytes", frame.len());
                FrameResult::NotApplicable
            }
            Some(header) => match header.frame_type() {
                FrameType::Data => self.handle_data(&frame, &header),
                FrameType::Management => self.handle_management(&frame, &header),
                _ => FrameResult::Ignored,
            },
        };

        DispatchOutcome {
            recorded,
            rotated,
            result,
        }
    }

    fn record(&mut self, frame: &RawFrame<'_>) -> (bool, bool) {
        match self.capture.append(frame.data, frame.timestamp) {
            Ok(false) => (true, false),
            Ok(true) => {
                self.counters.record_rotation();
                if let Some(path) = self.capture.current_path() {
                    self.notify(&CaptureEvent::CaptureRotated { path });
                }
                (true, true)
            }
            Err(CaptureError::NoCaptureFile) => {
                trace!("No capture file open, frame not recorded");
                (false, false)
            }
            Err(e) => {
                self.counters.record_storage_error();
                warn!("Capture write failed: {}", e);
                (false, false)
            }
        }
    }

    fn handle_data(&mut self, frame: &RawFrame<'_>, header: &FrameHeader) -> FrameResult {
        let Some(location) = eapol::locate(frame.data, header) else {
            return FrameResult::Ignored;
        };
        let Some(handshake) = Handshake::from_frame(
            frame.data,
            header,
            &location,
            self.config.max_eapol_len,
            frame.channel,
            frame.timestamp,
        ) else {
            debug!("EAPOL frame without a usable EAPOL-Key body");
            return FrameResult::Ignored;
        };

        let key = handshake.dedup_key();
        if self.dedup.contains(&key) {
            self.counters.record_duplicate();
            debug!("Handshake for {} already saved, skipping", key);
            return FrameResult::Duplicate(key);
        }

        match self.store.save_handshake(&handshake) {
            Ok(path) => {
                self.dedup.insert(key);
                self.counters.record_handshake();
                self.notify(&CaptureEvent::HandshakeCaptured {
                    ap: handshake.ap,
                    sta: handshake.sta,
                    message: handshake.message,
                });
                FrameResult::Handshake {
                    message: handshake.message,
                    path,
                }
            }
            Err(e) => {
                self.counters.record_storage_error();
                warn!("Dropping handshake for {}: {}", key, e);
                FrameResult::Dropped
            }
        }
    }

    fn handle_management(&mut self, frame: &RawFrame<'_>, header: &FrameHeader) -> FrameResult {
        if !(header.control.is_beacon() || header.control.is_probe_response()) {
            return FrameResult::Ignored;
        }

        if let (Some(bssid), Some(ssid)) = (
            header.addr3,
            TaggedParams::scan(header.body(frame.data)).ssid_string(),
        ) {
            self.store.observe_ssid(bssid, &ssid);
        }

        let Some(pmkid) = Pmkid::from_frame(frame.data, header, frame.channel, frame.timestamp)
        else {
            return FrameResult::Ignored;
        };

        match self.store.save_pmkid(&pmkid) {
            Ok(path) => {
                self.counters.record_pmkid();
                self.notify(&CaptureEvent::PmkidCaptured {
                    ap: pmkid.ap,
                    ssid: pmkid.ssid.clone(),
                });
                FrameResult::Pmkid { path }
            }
            Err(e) => {
                self.counters.record_storage_error();
                warn!("Dropping PMKID for {}: {}", pmkid.ap, e);
                FrameResult::Dropped
            }
        }
    }

    fn notify(&self, event: &CaptureEvent) {
        for listener in &self.listeners {
            listener.on_event(event);
        }
    }
}

impl FrameSink for CaptureEngine {
    fn on_frame(&mut self, data: &[u8], channel: u8) {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        self.dispatch(RawFrame::new(data, channel, timestamp));
    }
}
