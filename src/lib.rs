//! # wavecap
//!
//! Frame capture and credential-extraction engine for a monitor-mode
//! wireless sensor. Every received 802.11 frame is recorded to a rotating
//! pcap stream; EAPOL-Key frames of the WPA/WPA2 4-way handshake and
//! PMKIDs advertised in beacon/probe-response RSN elements are extracted
//! and persisted in formats offline recovery tools consume.
//!
//! ## Architecture
//!
//! - `ieee80211`: frame classification and header addressing
//! - `eapol`: LLC/SNAP + EAPOL payload location inside data frames
//! - `handshake`: EAPOL-Key parsing and 4-way message classification
//! - `pmkid`: information element walking and RSN/PMKID extraction
//! - `state`: per-session dedup store, SSID index and counters
//! - `capture`: rotating pcap stream
//! - `store`: storage collaborator and artifact persistence
//! - `engine`: the per-frame dispatcher
//! - `replay`: driving frame sources through the engine
//! - `config`: configuration loading and validation

pub mod capture;
pub mod config;
pub mod eapol;
pub mod engine;
pub mod handshake;
pub mod ieee80211;
pub mod mac;
pub mod pmkid;
pub mod replay;
pub mod state;
pub mod store;

pub use crate::{
    capture::CaptureSession,
    config::{CaptureConfig, ConfigManager},
    engine::{
        CaptureEngine, CaptureEvent, CaptureListener, DispatchOutcome, FrameResult, FrameSink,
        RawFrame,
    },
    handshake::{Handshake, HandshakeMessage, KeyInfo},
    ieee80211::{FrameHeader, FrameType},
    mac::MacAddress,
    pmkid::Pmkid,
    replay::{replay_source, ReplaySummary},
    state::{CaptureCounters, CounterSnapshot, DedupKey, DedupStore, SsidIndex},
    store::{ArtifactStore, FsStorage, MemoryStorage, Storage},
};

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("Storage error on {path}: {source}")]
    Storage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("No capture file open")]
    NoCaptureFile,

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Radio error: {0}")]
    Radio(#[from] wavecap_radio::RadioError),
}

pub type Result<T> = std::result::Result<T, CaptureError>;

/// Capture files are rotated once they grow past this size
pub const MAX_CAPTURE_FILE_SIZE: u64 = 150 * 1024 * 1024;

/// Longest EAPOL body kept in a handshake artifact
pub const MAX_EAPOL_LEN: usize = 256;

/// Placeholder STA address for artifacts without a station
pub const BROADCAST_MAC: MacAddress = MacAddress([0xff; 6]);

/// SSID recorded for networks that hide their name
pub const HIDDEN_SSID: &str = "<hidden>";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constants() {
        assert_eq!(MAX_CAPTURE_FILE_SIZE, 157_286_400);
        assert_eq!(MAX_EAPOL_LEN, 256);
        assert!(BROADCAST_MAC.is_broadcast());
    }

    #[test]
    fn test_storage_error_display() {
        let err = CaptureError::Storage {
            path: PathBuf::from("logs/pmkid.jsonl"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        assert!(err.to_string().contains("logs/pmkid.jsonl"));
    }
}
