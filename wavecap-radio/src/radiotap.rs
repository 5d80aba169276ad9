//! Radiotap header parsing
//!
//! Monitor-mode interfaces and most recorded captures prepend a radiotap
//! header to every 802.11 frame. Only the fields the capture engine cares
//! about are decoded (timestamp, flags, rate, channel, signal, noise and
//! antenna); everything after the antenna field is skipped using the
//! header length.

use bytes::Buf;
use serde::{Deserialize, Serialize};

use crate::{RadioError, Result};

/// Radiotap present flags
pub mod present_flags {
    pub const TSFT: u32 = 1 << 0;
    pub const FLAGS: u32 = 1 << 1;
    pub const RATE: u32 = 1 << 2;
    pub const CHANNEL: u32 = 1 << 3;
    pub const FHSS: u32 = 1 << 4;
    pub const DBM_ANTSIGNAL: u32 = 1 << 5;
    pub const DBM_ANTNOISE: u32 = 1 << 6;
    pub const LOCK_QUALITY: u32 = 1 << 7;
    pub const TX_ATTENUATION: u32 = 1 << 8;
    pub const DB_TX_ATTENUATION: u32 = 1 << 9;
    pub const DBM_TX_POWER: u32 = 1 << 10;
    pub const ANTENNA: u32 = 1 << 11;
    pub const EXT: u32 = 1 << 31;
}

/// Bits of the radiotap flags field
pub mod frame_flags {
    /// Frame includes the 4-byte FCS at its end
    pub const FCS_AT_END: u8 = 0x10;
    /// Frame failed the FCS check
    pub const BAD_FCS: u8 = 0x40;
}

/// Alignment and size of each standard field, indexed by present bit,
/// up to and including the antenna field.
const FIELD_LAYOUT: [(usize, usize); 12] = [
    (8, 8), // TSFT
    (1, 1), // flags
    (1, 1), // rate
    (2, 4), // channel
    (1, 2), // FHSS
    (1, 1), // dBm antenna signal
    (1, 1), // dBm antenna noise
    (2, 2), // lock quality
    (2, 2), // TX attenuation
    (2, 2), // dB TX attenuation
    (1, 1), // dBm TX power
    (1, 1), // antenna
];

/// Decoded radiotap header
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RadiotapHeader {
    pub version: u8,
    /// Total header length, i.e. offset of the 802.11 frame
    pub length: u16,
    /// First present word
    pub present: u32,
    pub tsft: Option<u64>,
    pub flags: Option<u8>,
    pub rate: Option<u8>,
    pub channel_frequency: Option<u16>,
    pub channel_flags: Option<u16>,
    pub antenna_signal: Option<i8>,
    pub antenna_noise: Option<i8>,
    pub antenna: Option<u8>,
}

impl RadiotapHeader {
    /// Parse a radiotap header from the start of `data`.
    ///
    /// Returns the header; the 802.11 frame starts at `header.length`.
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < 8 {
            return Err(RadioError::Radiotap {
                message: "Radiotap header too short".to_string(),
            });
        }

        let mut buf = data;
        let version = buf.get_u8();
        let _pad = buf.get_u8();
        let length = buf.get_u16_le();
        let present = buf.get_u32_le();

        if version != 0 {
            return Err(RadioError::Radiotap {
                message: format!("Unsupported radiotap version {}", version),
            });
        }
        if (length as usize) < 8 || data.len() < length as usize {
            return Err(RadioError::Radiotap {
                message: "Incomplete radiotap header".to_string(),
            });
        }

        // Fields are bounded by the declared header length, not the frame.
        let header = &data[..length as usize];
        let mut buf = &header[8..];

        // Skip any chained present words; their fields follow ours.
        let mut word = present;
        while word & present_flags::EXT != 0 {
            if buf.remaining() < 4 {
                return Err(RadioError::Radiotap {
                    message: "Truncated present word chain".to_string(),
                });
            }
            word = buf.get_u32_le();
        }

        let mut parsed = Self {
            version,
            length,
            present,
            ..Default::default()
        };

        for (bit, &(align, size)) in FIELD_LAYOUT.iter().enumerate() {
            if present & (1 << bit) == 0 {
                continue;
            }

            let consumed = header.len() - buf.remaining();
            let padding = (align - consumed % align) % align;
            if buf.remaining() < padding + size {
                return Err(RadioError::Radiotap {
                    message: format!("Missing radiotap field for present bit {}", bit),
                });
            }
            buf.advance(padding);

            match 1u32 << bit {
                present_flags::TSFT => parsed.tsft = Some(buf.get_u64_le()),
                present_flags::FLAGS => parsed.flags = Some(buf.get_u8()),
                present_flags::RATE => parsed.rate = Some(buf.get_u8()),
                present_flags::CHANNEL => {
                    parsed.channel_frequency = Some(buf.get_u16_le());
                    parsed.channel_flags = Some(buf.get_u16_le());
                }
                present_flags::DBM_ANTSIGNAL => parsed.antenna_signal = Some(buf.get_i8()),
                present_flags::DBM_ANTNOISE => parsed.antenna_noise = Some(buf.get_i8()),
                present_flags::ANTENNA => parsed.antenna = Some(buf.get_u8()),
                _ => buf.advance(size),
            }
        }

        Ok(parsed)
    }

    /// Whether the frame carries a trailing FCS
    pub fn has_fcs(&self) -> bool {
        self.flags
            .map_or(false, |f| f & frame_flags::FCS_AT_END != 0)
    }

    /// Whether the receiver flagged the FCS as bad
    pub fn bad_fcs(&self) -> bool {
        self.flags.map_or(false, |f| f & frame_flags::BAD_FCS != 0)
    }

    /// Channel number derived from the channel frequency field
    pub fn channel(&self) -> Option<u8> {
        self.channel_frequency.and_then(frequency_to_channel)
    }
}

/// Map a centre frequency in MHz to its 802.11 channel number.
pub fn frequency_to_channel(freq: u16) -> Option<u8> {
    match freq {
        2484 => Some(14),
        2412..=2472 => Some(((freq - 2407) / 5) as u8),
        5150..=5895 => Some(((freq - 5000) / 5) as u8),
        5955..=7115 => Some(((freq - 5950) / 5) as u8),
        _ => None,
    }
}
