//! WPA/WPA2 4-way handshake extraction
//!
//! Parses EAPOL-Key frames, classifies them as one of the four handshake
//! messages and builds the `Handshake` artifact that gets persisted. Each
//! qualifying frame becomes its own artifact; messages of one exchange are
//! not correlated here.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::eapol::EapolLocation;
use crate::ieee80211::FrameHeader;
use crate::mac::MacAddress;
use crate::state::DedupKey;

/// EAPOL header: version, packet type, body length
pub const EAPOL_HEADER_LEN: usize = 4;
/// EAPOL packet type of EAPOL-Key frames
pub const EAPOL_TYPE_KEY: u8 = 3;
/// Fixed part of an EAPOL-Key body, up to and including key data length
pub const EAPOL_KEY_BODY_MIN_LEN: usize = 95;
/// Smallest EAPOL frame that can hold an EAPOL-Key body
pub const EAPOL_KEY_MIN_LEN: usize = EAPOL_HEADER_LEN + EAPOL_KEY_BODY_MIN_LEN;

/// Offsets inside the EAPOL-Key body
mod offset {
    pub const DESCRIPTOR_TYPE: usize = 0;
    pub const KEY_INFO: usize = 1;
    pub const KEY_LENGTH: usize = 3;
    pub const REPLAY_COUNTER: usize = 5;
    pub const NONCE: usize = 13;
    pub const MIC: usize = 77;
    pub const KEY_DATA_LENGTH: usize = 93;
}

pub const NONCE_LEN: usize = 32;
pub const MIC_LEN: usize = 16;

/// Offset of the MIC counted from the start of the EAPOL frame
pub const EAPOL_MIC_OFFSET: usize = EAPOL_HEADER_LEN + offset::MIC;

/// Key information field of an EAPOL-Key frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyInfo(pub u16);

impl KeyInfo {
    pub const INSTALL: u16 = 0x0040;
    pub const ACK: u16 = 0x0080;
    pub const MIC: u16 = 0x0100;
    pub const SECURE: u16 = 0x0200;
    pub const REQUEST: u16 = 0x0800;

    /// Key descriptor version (1 = HMAC-MD5/RC4, 2 = HMAC-SHA1/AES, 3 = AES-CMAC)
    pub fn descriptor_version(&self) -> u8 {
        (self.0 & 0x0007) as u8
    }

    pub fn install(&self) -> bool {
        self.0 & Self::INSTALL != 0
    }

    pub fn ack(&self) -> bool {
        self.0 & Self::ACK != 0
    }

    pub fn mic(&self) -> bool {
        self.0 & Self::MIC != 0
    }

    pub fn secure(&self) -> bool {
        self.0 & Self::SECURE != 0
    }

    pub fn request(&self) -> bool {
        self.0 & Self::REQUEST != 0
    }

    /// Which handshake message these control bits describe
    pub fn message(&self) -> HandshakeMessage {
        match (self.mic(), self.ack(), self.install(), self.secure()) {
            (false, true, false, false) => HandshakeMessage::Message1,
            (true, false, false, false) if !self.request() => HandshakeMessage::Message2,
            (true, true, true, true) => HandshakeMessage::Message3,
            (true, false, false, true) => HandshakeMessage::Message4,
            _ => HandshakeMessage::Unclassified,
        }
    }
}

/// Position of an EAPOL-Key frame within the 4-way handshake
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HandshakeMessage {
    Unclassified,
    Message1,
    Message2,
    Message3,
    Message4,
}

impl HandshakeMessage {
    /// Message number, 0 for unclassified frames
    pub fn number(&self) -> u8 {
        match self {
            Self::Unclassified => 0,
            Self::Message1 => 1,
            Self::Message2 => 2,
            Self::Message3 => 3,
            Self::Message4 => 4,
        }
    }

    pub fn is_classified(&self) -> bool {
        !matches!(self, Self::Unclassified)
    }
}

impl fmt::Display for HandshakeMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unclassified => write!(f, "unclassified"),
            other => write!(f, "M{}", other.number()),
        }
    }
}

/// Fields of a validated EAPOL-Key frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EapolKey {
    pub version: u8,
    pub descriptor_type: u8,
    pub key_info: KeyInfo,
    pub key_length: u16,
    pub replay_counter: u64,
    pub nonce: [u8; NONCE_LEN],
    pub mic: [u8; MIC_LEN],
    pub key_data_length: u16,
    /// EAPOL header plus declared body, bounded by the captured bytes
    pub frame_len: usize,
}

impl EapolKey {
    /// Validate and decode an EAPOL payload. `None` for anything that is
    /// not a complete EAPOL-Key frame.
    pub fn parse(eapol: &[u8]) -> Option<Self> {
        if eapol.len() < EAPOL_KEY_MIN_LEN {
            return None;
        }

        let version = eapol[0];
        if eapol[1] != EAPOL_TYPE_KEY {
            return None;
        }

        let declared = u16::from_be_bytes([eapol[2], eapol[3]]) as usize;
        let body_len = declared.min(eapol.len() - EAPOL_HEADER_LEN);
        if body_len < EAPOL_KEY_BODY_MIN_LEN {
            return None;
        }

        let key = &eapol[EAPOL_HEADER_LEN..EAPOL_HEADER_LEN + body_len];
        let be16 = |at: usize| u16::from_be_bytes([key[at], key[at + 1]]);

        let mut replay = [0u8; 8];
        replay.copy_from_slice(&key[offset::REPLAY_COUNTER..offset::REPLAY_COUNTER + 8]);
        let mut nonce = [0u8; NONCE_LEN];
        nonce.copy_from_slice(&key[offset::NONCE..offset::NONCE + NONCE_LEN]);
        let mut mic = [0u8; MIC_LEN];
        mic.copy_from_slice(&key[offset::MIC..offset::MIC + MIC_LEN]);

        Some(Self {
            version,
            descriptor_type: key[offset::DESCRIPTOR_TYPE],
            key_info: KeyInfo(be16(offset::KEY_INFO)),
            key_length: be16(offset::KEY_LENGTH),
            replay_counter: u64::from_be_bytes(replay),
            nonce,
            mic,
            key_data_length: be16(offset::KEY_DATA_LENGTH),
            frame_len: EAPOL_HEADER_LEN + body_len,
        })
    }

    pub fn message(&self) -> HandshakeMessage {
        self.key_info.message()
    }
}

/// Work out which side of a data frame is the AP.
///
/// Returns `(ap, sta)`. Whichever of address 1 / address 2 matches the
/// BSSID is the AP; if neither does, the BSSID itself is used.
pub fn resolve_roles(header: &FrameHeader) -> Option<(MacAddress, MacAddress)> {
    let bssid = header.bssid()?;
    let addr1 = header.addr1;
    let addr2 = header.addr2?;

    if addr1 == bssid {
        Some((addr1, addr2))
    } else if addr2 == bssid {
        Some((addr2, addr1))
    } else {
        Some((bssid, addr2))
    }
}

/// One captured EAPOL-Key frame, ready for persistence
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handshake {
    pub ap: MacAddress,
    pub sta: MacAddress,
    /// Set when the frame was sent by the AP
    pub anonce: [u8; NONCE_LEN],
    /// Set when the frame was sent by the station
    pub snonce: [u8; NONCE_LEN],
    pub mic: [u8; MIC_LEN],
    /// Raw EAPOL frame with the MIC field zeroed
    pub eapol: Vec<u8>,
    pub key_version: u8,
    pub message: HandshakeMessage,
    pub replay_counter: u64,
    pub channel: u8,
    pub timestamp: Duration,
}

impl Handshake {
    /// Build a handshake record from a data frame whose EAPOL payload has
    /// already been located. At most `max_eapol` bytes of EAPOL are kept.
    pub fn from_frame(
        frame: &[u8],
        header: &FrameHeader,
        location: &EapolLocation,
        max_eapol: usize,
        channel: u8,
        timestamp: Duration,
    ) -> Option<Self> {
        let eapol = location.slice(frame)?;
        let key = EapolKey::parse(eapol)?;
        let (ap, sta) = resolve_roles(header)?;

        let mut anonce = [0u8; NONCE_LEN];
        let mut snonce = [0u8; NONCE_LEN];
        if header.addr2 == Some(ap) {
            anonce = key.nonce;
        } else {
            snonce = key.nonce;
        }

        let keep = key.frame_len.min(max_eapol);
        let mut raw = eapol[..keep].to_vec();
        zero_mic(&mut raw);

        Some(Self {
            ap,
            sta,
            anonce,
            snonce,
            mic: key.mic,
            eapol: raw,
            key_version: key.key_info.descriptor_version(),
            message: key.message(),
            replay_counter: key.replay_counter,
            channel,
            timestamp,
        })
    }

    pub fn dedup_key(&self) -> DedupKey {
        DedupKey::new(self.ap, self.sta)
    }
}

/// Clear the MIC field of a raw EAPOL-Key frame, if the buffer holds it
pub fn zero_mic(eapol: &mut [u8]) {
    if let Some(mic) = eapol.get_mut(EAPOL_MIC_OFFSET..EAPOL_MIC_OFFSET + MIC_LEN) {
        mic.fill(0);
    }
}
