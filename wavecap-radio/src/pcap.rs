//! Classic pcap reader
//!
//! Replays a recorded capture as a `FrameSource`. Both byte orders and
//! both timestamp resolutions are accepted. Raw 802.11 (link type 105) is
//! delivered as-is; radiotap captures (link type 127) have the radiotap
//! header stripped and the channel taken from its frequency field.

use async_trait::async_trait;
use bytes::{Buf, Bytes};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

use crate::radiotap::RadiotapHeader;
use crate::source::{CapturedFrame, FrameSource, SourceStatistics};
use crate::{RadioError, Result, MAX_FRAME_SIZE};

const MAGIC_MICROS: u32 = 0xA1B2_C3D4;
const MAGIC_NANOS: u32 = 0xA1B2_3C4D;
const GLOBAL_HEADER_LEN: usize = 24;
const RECORD_HEADER_LEN: usize = 16;
const FCS_LEN: usize = 4;

/// Link types understood by the reader
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkType {
    /// LINKTYPE_IEEE802_11
    Ieee80211 = 105,
    /// LINKTYPE_IEEE802_11_RADIOTAP
    Radiotap = 127,
}

impl TryFrom<u32> for LinkType {
    type Error = RadioError;

    fn try_from(value: u32) -> Result<Self> {
        match value {
            105 => Ok(Self::Ieee80211),
            127 => Ok(Self::Radiotap),
            linktype => Err(RadioError::UnsupportedLinkType { linktype }),
        }
    }
}

/// Frame source backed by a pcap file loaded into memory
#[derive(Debug)]
pub struct PcapFileSource {
    path: PathBuf,
    data: Bytes,
    position: usize,
    little_endian: bool,
    nanosecond: bool,
    linktype: LinkType,
    default_channel: u8,
    stats: SourceStatistics,
}

impl PcapFileSource {
    /// Open and validate a capture file
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let data = tokio::fs::read(&path).await?;
        Self::from_bytes(path, Bytes::from(data))
    }

    /// Build a source from capture bytes already in memory
    pub fn from_bytes(path: PathBuf, data: Bytes) -> Result<Self> {
        if data.len() < GLOBAL_HEADER_LEN {
            return Err(RadioError::CaptureFile {
                message: "File too short for pcap header".to_string(),
            });
        }

        let mut header = &data[..GLOBAL_HEADER_LEN];
        let magic_le = header.get_u32_le();
        let (little_endian, nanosecond) = match magic_le {
            MAGIC_MICROS => (true, false),
            MAGIC_NANOS => (true, true),
            m if m.swap_bytes() == MAGIC_MICROS => (false, false),
            m if m.swap_bytes() == MAGIC_NANOS => (false, true),
            m => {
                return Err(RadioError::CaptureFile {
                    message: format!("Unknown pcap magic {:#010x}", m),
                })
            }
        };

        // version (4), thiszone (4), sigfigs (4), snaplen (4)
        header.advance(16);
        let network = if little_endian {
            header.get_u32_le()
        } else {
            header.get_u32()
        };
        let linktype = LinkType::try_from(network)?;

        debug!(
            "Opened {} ({:?}, {} endian)",
            path.display(),
            linktype,
            if little_endian { "little" } else { "big" }
        );

        Ok(Self {
            path,
            data,
            position: GLOBAL_HEADER_LEN,
            little_endian,
            nanosecond,
            linktype,
            default_channel: 0,
            stats: SourceStatistics::default(),
        })
    }

    /// Channel reported for frames whose capture carries no channel info
    pub fn with_default_channel(mut self, channel: u8) -> Self {
        self.default_channel = channel;
        self
    }

    pub fn linktype(&self) -> LinkType {
        self.linktype
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_u32(&self, buf: &mut &[u8]) -> u32 {
        if self.little_endian {
            buf.get_u32_le()
        } else {
            buf.get_u32()
        }
    }

    /// Decode the next record. `Ok(None)` at end of file, `Err` for a
    /// record that cannot be turned into a frame but can be skipped.
    fn next_record(&mut self) -> Option<Result<CapturedFrame>> {
        let remaining = self.data.len().saturating_sub(self.position);
        if remaining == 0 {
            return None;
        }
        if remaining < RECORD_HEADER_LEN {
            warn!("{}: truncated record header at end of file", self.path.display());
            self.position = self.data.len();
            return None;
        }

        let mut header = &self.data[self.position..self.position + RECORD_HEADER_LEN];
        let ts_sec = self.read_u32(&mut header);
        let ts_frac = self.read_u32(&mut header);
        let incl_len = self.read_u32(&mut header) as usize;
        let _orig_len = self.read_u32(&mut header);

        let start = self.position + RECORD_HEADER_LEN;
        if self.data.len() - start < incl_len {
            warn!("{}: truncated record body at end of file", self.path.display());
            self.position = self.data.len();
            return None;
        }
        self.position = start + incl_len;

        let timestamp = if self.nanosecond {
            Duration::new(ts_sec as u64, ts_frac.min(999_999_999))
        } else {
            Duration::new(ts_sec as u64, ts_frac.min(999_999) * 1_000)
        };

        let record = self.data.slice(start..start + incl_len);
        Some(self.decode(record, timestamp))
    }

    fn decode(&self, record: Bytes, timestamp: Duration) -> Result<CapturedFrame> {
        match self.linktype {
            LinkType::Ieee80211 => CapturedFrame::new(record, self.default_channel, timestamp),
            LinkType::Radiotap => {
                let radiotap = RadiotapHeader::parse(&record)?;
                let mut end = record.len();
                if radiotap.has_fcs() {
                    end = end.saturating_sub(FCS_LEN);
                }
                let start = (radiotap.length as usize).min(end);
                let channel = radiotap.channel().unwrap_or(self.default_channel);

                Ok(CapturedFrame::new(record.slice(start..end), channel, timestamp)?
                    .with_signal(radiotap.antenna_signal))
            }
        }
    }
}

#[async_trait]
impl FrameSource for PcapFileSource {
    fn describe(&self) -> String {
        format!("pcap file {} ({:?})", self.path.display(), self.linktype)
    }

    async fn next_frame(&mut self) -> Result<Option<CapturedFrame>> {
        while let Some(record) = self.next_record() {
            match record {
                Ok(frame) => {
                    self.stats.record_delivered(frame.data.len());
                    return Ok(Some(frame));
                }
                Err(e) => {
                    debug!("{}: skipping record: {}", self.path.display(), e);
                    self.stats.record_skipped();
                }
            }
        }
        Ok(None)
    }

    fn statistics(&self) -> SourceStatistics {
        self.stats.clone()
    }
}

/// Build the bytes of a pcap file (little-endian, microseconds). Handy for
/// tests and tools that need to synthesise captures.
pub fn build_capture(linktype: LinkType, records: &[(Duration, &[u8])]) -> Vec<u8> {
    let mut out = Vec::with_capacity(GLOBAL_HEADER_LEN);
    out.extend_from_slice(&MAGIC_MICROS.to_le_bytes());
    out.extend_from_slice(&2u16.to_le_bytes());
    out.extend_from_slice(&4u16.to_le_bytes());
    out.extend_from_slice(&[0u8; 8]);
    out.extend_from_slice(&(MAX_FRAME_SIZE as u32).to_le_bytes());
    out.extend_from_slice(&(linktype as u32).to_le_bytes());

    for (timestamp, data) in records {
        out.extend_from_slice(&(timestamp.as_secs() as u32).to_le_bytes());
        out.extend_from_slice(&timestamp.subsec_micros().to_le_bytes());
        out.extend_from_slice(&(data.len() as u32).to_le_bytes());
        out.extend_from_slice(&(data.len() as u32).to_le_bytes());
        out.extend_from_slice(data);
    }
    out
}
