//! IEEE 802.11 frame classification
//!
//! Decodes the frame control field and the address block of a raw frame
//! and works out where the frame body starts. Nothing here allocates or
//! copies frame data; a `FrameHeader` only records offsets and addresses.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::mac::MacAddress;

/// Length of a 3-address management/data header
pub const BASE_HEADER_LEN: usize = 24;
/// Extra address present when both DS bits are set
pub const ADDR4_LEN: usize = 6;
/// QoS control field of QoS data subtypes
pub const QOS_CONTROL_LEN: usize = 2;
/// HT control field, present on QoS frames with the order bit set
pub const HT_CONTROL_LEN: usize = 4;

/// Management subtypes the engine looks at
pub mod subtype {
    pub const PROBE_RESPONSE: u8 = 5;
    pub const BEACON: u8 = 8;
    /// Bit distinguishing QoS data subtypes
    pub const QOS_DATA_BIT: u8 = 0x08;
}

/// Frame control flag bits (second byte)
pub mod flags {
    pub const TO_DS: u8 = 0x01;
    pub const FROM_DS: u8 = 0x02;
    pub const PROTECTED: u8 = 0x40;
    pub const ORDER: u8 = 0x80;
}

/// IEEE 802.11 frame types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FrameType {
    /// Management frames (beacon, probe, auth, etc.)
    Management = 0,
    /// Control frames (RTS, CTS, ACK, etc.)
    Control = 1,
    /// Data frames
    Data = 2,
    /// Extension frames
    Extension = 3,
}

impl From<u8> for FrameType {
    fn from(value: u8) -> Self {
        match value & 0x3 {
            0 => Self::Management,
            1 => Self::Control,
            2 => Self::Data,
            _ => Self::Extension,
        }
    }
}

/// Decoded frame control field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameControl {
    pub protocol_version: u8,
    pub frame_type: FrameType,
    pub subtype: u8,
    pub flags: u8,
}

impl FrameControl {
    /// Decode the first two bytes of a frame
    pub fn parse(data: &[u8]) -> Option<Self> {
        let (&fc, &flags) = (data.first()?, data.get(1)?);
        Some(Self {
            protocol_version: fc & 0x3,
            frame_type: FrameType::from((fc >> 2) & 0x3),
            subtype: (fc >> 4) & 0xF,
            flags,
        })
    }

    pub fn to_ds(&self) -> bool {
        self.flags & flags::TO_DS != 0
    }

    pub fn from_ds(&self) -> bool {
        self.flags & flags::FROM_DS != 0
    }

    pub fn protected(&self) -> bool {
        self.flags & flags::PROTECTED != 0
    }

    pub fn is_qos_data(&self) -> bool {
        self.frame_type == FrameType::Data && self.subtype & subtype::QOS_DATA_BIT != 0
    }

    pub fn is_beacon(&self) -> bool {
        self.frame_type == FrameType::Management && self.subtype == subtype::BEACON
    }

    pub fn is_probe_response(&self) -> bool {
        self.frame_type == FrameType::Management && self.subtype == subtype::PROBE_RESPONSE
    }

    /// Header length implied by type, subtype and flags
    pub fn header_len(&self) -> usize {
        match self.frame_type {
            FrameType::Control => match self.subtype {
                // CTS and ACK carry the receiver address only
                12 | 13 => 10,
                _ => 16,
            },
            FrameType::Management => BASE_HEADER_LEN,
            FrameType::Data => {
                let mut len = BASE_HEADER_LEN;
                if self.to_ds() && self.from_ds() {
                    len += ADDR4_LEN;
                }
                if self.is_qos_data() {
                    len += QOS_CONTROL_LEN;
                    if self.flags & flags::ORDER != 0 {
                        len += HT_CONTROL_LEN;
                    }
                }
                len
            }
            FrameType::Extension => BASE_HEADER_LEN,
        }
    }
}

/// Classified frame: type information, addresses and body offset
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameHeader {
    pub control: FrameControl,
    /// Offset of the frame body
    pub header_len: usize,
    pub addr1: MacAddress,
    pub addr2: Option<MacAddress>,
    pub addr3: Option<MacAddress>,
    pub addr4: Option<MacAddress>,
}

impl FrameHeader {
    pub fn frame_type(&self) -> FrameType {
        self.control.frame_type
    }

    pub fn subtype(&self) -> u8 {
        self.control.subtype
    }

    /// Slice of `data` after the MAC header
    pub fn body<'a>(&self, data: &'a [u8]) -> &'a [u8] {
        data.get(self.header_len..).unwrap_or(&[])
    }

    /// BSSID according to the DS bits. With both bits set the frame is
    /// WDS traffic and address 1 is used by convention.
    pub fn bssid(&self) -> Option<MacAddress> {
        match (self.control.to_ds(), self.control.from_ds()) {
            (false, false) => self.addr3,
            (false, true) => self.addr2,
            (true, false) | (true, true) => Some(self.addr1),
        }
    }
}

impl fmt::Display for FrameHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "802.11 {:?} frame (subtype={}), header={}, a1={}, a2={}",
            self.control.frame_type,
            self.control.subtype,
            self.header_len,
            self.addr1,
            self.addr2.map_or_else(|| "-".to_string(), |a| a.to_string()),
        )
    }
}

/// Classify a raw frame. Returns `None` when the frame is shorter than the
/// header its own flags call for, or uses an unknown protocol version.
pub fn classify(data: &[u8]) -> Option<FrameHeader> {
    let control = FrameControl::parse(data)?;
    if control.protocol_version != 0 || control.frame_type == FrameType::Extension {
        return None;
    }

    let header_len = control.header_len();
    if data.len() < header_len {
        return None;
    }

    let addr1 = MacAddress::from_slice(data, 4)?;
    let addr2 = if header_len >= 16 {
        MacAddress::from_slice(data, 10)
    } else {
        None
    };
    let (addr3, addr4) = match control.frame_type {
        FrameType::Management | FrameType::Data => {
            let addr4 = if control.frame_type == FrameType::Data
                && control.to_ds()
                && control.from_ds()
            {
                MacAddress::from_slice(data, 24)
            } else {
                None
            };
            (MacAddress::from_slice(data, 16), addr4)
        }
        _ => (None, None),
    };

    Some(FrameHeader {
        control,
        header_len,
        addr1,
        addr2,
        addr3,
        addr4,
    })
}
