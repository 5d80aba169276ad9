//! PMKID extraction from Beacon and Probe Response frames
//!
//! Walks the information element list of the frame body, picks up the SSID
//! and the RSN element, and reads the PMKID list at the tail of the RSN
//! element.

use bytes::Buf;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::ieee80211::FrameHeader;
use crate::mac::MacAddress;
use crate::{BROADCAST_MAC, HIDDEN_SSID};

/// Timestamp, beacon interval and capability info before the IE list
pub const FIXED_PARAMS_LEN: usize = 12;

pub const IE_SSID: u8 = 0;
pub const IE_RSN: u8 = 48;

pub const MAX_SSID_LEN: usize = 32;
/// Shortest RSN element the parser accepts
pub const RSN_MIN_LEN: usize = 20;
pub const PMKID_LEN: usize = 16;

/// One (id, length, value) information element
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InformationElement<'a> {
    pub id: u8,
    pub data: &'a [u8],
}

/// Iterator over a tagged parameter list. Stops at the first element whose
/// declared length runs past the end of the buffer.
#[derive(Debug, Clone)]
pub struct IeIter<'a> {
    data: &'a [u8],
}

impl<'a> IeIter<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data }
    }
}

impl<'a> Iterator for IeIter<'a> {
    type Item = InformationElement<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let (&id, &len) = (self.data.first()?, self.data.get(1)?);
        let end = 2 + len as usize;
        let Some(value) = self.data.get(2..end) else {
            self.data = &[];
            return None;
        };
        self.data = &self.data[end..];
        Some(InformationElement { id, data: value })
    }
}

/// Decoded RSN element
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RsnElement {
    pub version: u16,
    pub group_cipher: [u8; 4],
    pub pairwise_ciphers: Vec<[u8; 4]>,
    pub akm_suites: Vec<[u8; 4]>,
    pub capabilities: u16,
    /// Every PMKID the element advertises, in order
    pub pmkids: Vec<[u8; PMKID_LEN]>,
}

impl RsnElement {
    /// Decode an RSN element body. Returns `None` when the element is
    /// shorter than the minimum structure or a suite list is truncated.
    pub fn parse(data: &[u8]) -> Option<Self> {
        if data.len() < RSN_MIN_LEN {
            return None;
        }

        let mut buf = data;
        let version = buf.get_u16_le();
        let group_cipher = read_suite(&mut buf)?;

        let pairwise_ciphers = read_suite_list(&mut buf)?;
        let akm_suites = read_suite_list(&mut buf)?;

        if buf.remaining() < 2 {
            return None;
        }
        let capabilities = buf.get_u16_le();

        let mut pmkids = Vec::new();
        if buf.remaining() >= 2 {
            let count = buf.get_u16_le();
            for _ in 0..count {
                if buf.remaining() < PMKID_LEN {
                    break;
                }
                let mut pmkid = [0u8; PMKID_LEN];
                buf.copy_to_slice(&mut pmkid);
                pmkids.push(pmkid);
            }
        }

        Some(Self {
            version,
            group_cipher,
            pairwise_ciphers,
            akm_suites,
            capabilities,
            pmkids,
        })
    }

    pub fn first_pmkid(&self) -> Option<[u8; PMKID_LEN]> {
        self.pmkids.first().copied()
    }
}

fn read_suite(buf: &mut &[u8]) -> Option<[u8; 4]> {
    if buf.remaining() < 4 {
        return None;
    }
    let mut suite = [0u8; 4];
    buf.copy_to_slice(&mut suite);
    Some(suite)
}

fn read_suite_list(buf: &mut &[u8]) -> Option<Vec<[u8; 4]>> {
    if buf.remaining() < 2 {
        return None;
    }
    let count = buf.get_u16_le() as usize;
    if buf.remaining() < count.checked_mul(4)? {
        return None;
    }
    (0..count).map(|_| read_suite(&mut *buf)).collect()
}

/// SSID and RSN element found in a management frame body
#[derive(Debug, Clone, Default)]
pub struct TaggedParams<'a> {
    pub ssid: Option<&'a [u8]>,
    pub rsn: Option<&'a [u8]>,
}

impl<'a> TaggedParams<'a> {
    /// Collect the elements of interest. The first occurrence of each wins.
    pub fn scan(body: &'a [u8]) -> Self {
        let mut params = Self::default();
        let Some(ies) = body.get(FIXED_PARAMS_LEN..) else {
            return params;
        };

        for ie in IeIter::new(ies) {
            match ie.id {
                IE_SSID if params.ssid.is_none() => {
                    params.ssid = Some(&ie.data[..ie.data.len().min(MAX_SSID_LEN)]);
                }
                IE_RSN if params.rsn.is_none() => params.rsn = Some(ie.data),
                _ => {}
            }
        }
        params
    }

    /// Raw SSID bytes. Empty or all-NUL SSIDs count as hidden.
    pub fn ssid_bytes(&self) -> Option<&'a [u8]> {
        self.ssid.filter(|raw| !raw.iter().all(|b| *b == 0))
    }

    /// SSID as text, for logs and the SSID index
    pub fn ssid_string(&self) -> Option<String> {
        self.ssid_bytes()
            .map(|raw| String::from_utf8_lossy(raw).into_owned())
    }
}

/// A PMKID advertised by an access point
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pmkid {
    pub pmkid: [u8; PMKID_LEN],
    pub ap: MacAddress,
    pub sta: MacAddress,
    pub ssid: String,
    /// SSID exactly as advertised
    pub essid: Vec<u8>,
    pub channel: u8,
    pub timestamp: Duration,
}

impl Pmkid {
    /// Extract a PMKID from a Beacon or Probe Response.
    pub fn from_frame(
        frame: &[u8],
        header: &FrameHeader,
        channel: u8,
        timestamp: Duration,
    ) -> Option<Self> {
        if !(header.control.is_beacon() || header.control.is_probe_response()) {
            return None;
        }

        let params = TaggedParams::scan(header.body(frame));
        let rsn = RsnElement::parse(params.rsn?)?;
        let pmkid = rsn.first_pmkid()?;
        let essid = params.ssid_bytes().unwrap_or(HIDDEN_SSID.as_bytes());

        Some(Self {
            pmkid,
            ap: header.addr3?,
            sta: BROADCAST_MAC,
            ssid: String::from_utf8_lossy(essid).into_owned(),
            essid: essid.to_vec(),
            channel,
            timestamp,
        })
    }

    pub fn pmkid_hex(&self) -> String {
        hex::encode(self.pmkid)
    }

    /// hashcat line: `WPA*01*pmkid*ap*sta*essid`
    pub fn hash_line(&self) -> String {
        format!(
            "WPA*01*{}*{}*{}*{}",
            self.pmkid_hex(),
            self.ap.to_hex(),
            self.sta.to_hex(),
            hex::encode(&self.essid)
        )
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::ieee80211::classify;

    pub const BSSID: MacAddress = MacAddress([0x00, 0x11, 0x22, 0x33, 0x44, 0x55]);
    pub const PMKID: [u8; 16] = [
        0x5e, 0x1c, 0x9a, 0x00, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88, 0x99, 0xaa, 0xbb,
        0xcc,
    ];

    /// RSN element body: CCMP group/pairwise, PSK AKM, `pmkids` appended
    pub fn rsn_body(pmkids: &[[u8; 16]]) -> Vec<u8> {
        let mut rsn = vec![0x01, 0x00];
        rsn.extend_from_slice(&[0x00, 0x0f, 0xac, 0x04]);
        rsn.extend_from_slice(&[0x01, 0x00, 0x00, 0x0f, 0xac, 0x04]);
        rsn.extend_from_slice(&[0x01, 0x00, 0x00, 0x0f, 0xac, 0x02]);
        rsn.extend_from_slice(&[0x00, 0x00]);
        rsn.extend_from_slice(&(pmkids.len() as u16).to_le_bytes());
        for pmkid in pmkids {
            rsn.extend_from_slice(pmkid);
        }
        rsn
    }

    /// Beacon from `bssid` carrying the given SSID and RSN body
    pub fn beacon(bssid: MacAddress, ssid: &[u8], rsn: Option<&[u8]>) -> Vec<u8> {
        let mut frame = vec![0x80, 0x00, 0x00, 0x00];
        frame.extend_from_slice(&[0xff; 6]);
        frame.extend_from_slice(&bssid.0);
        frame.extend_from_slice(&bssid.0);
        frame.extend_from_slice(&[0x00, 0x00]);
        frame.extend_from_slice(&[0u8; 8]); // timestamp
        frame.extend_from_slice(&[0x64, 0x00]); // interval
        frame.extend_from_slice(&[0x11, 0x04]); // capabilities
        frame.push(IE_SSID);
        frame.push(ssid.len() as u8);
        frame.extend_from_slice(ssid);
        frame.extend_from_slice(&[0x01, 0x02, 0x82, 0x84]); // supported rates
        if let Some(rsn) = rsn {
            frame.push(IE_RSN);
            frame.push(rsn.len() as u8);
            frame.extend_from_slice(rsn);
        }
        frame
    }

    fn extract(frame: &[u8]) -> Option<Pmkid> {
        let header = classify(frame)?;
        Pmkid::from_frame(frame, &header, 11, Duration::from_secs(5))
    }

    #[test]
    fn test_extract_from_beacon() {
        let frame = beacon(BSSID, b"TEST", Some(&rsn_body(&[PMKID])));
        let pmkid = extract(&frame).unwrap();

        assert_eq!(pmkid.pmkid, PMKID);
        assert_eq!(pmkid.ssid, "TEST");
        assert_eq!(pmkid.ap, BSSID);
        assert_eq!(pmkid.sta, BROADCAST_MAC);
        assert_eq!(pmkid.channel, 11);
    }

    #[test]
    fn test_hash_line() {
        let frame = beacon(BSSID, b"TEST", Some(&rsn_body(&[PMKID])));
        let pmkid = extract(&frame).unwrap();
        assert_eq!(
            pmkid.hash_line(),
            "WPA*01*5e1c9a00112233445566778899aabbcc*001122334455*ffffffffffff*54455354"
        );
    }

    #[test]
    fn test_hash_line_keeps_raw_ssid_bytes() {
        let frame = beacon(BSSID, &[0x63, 0x61, 0x66, 0xe9], Some(&rsn_body(&[PMKID])));
        let pmkid = extract(&frame).unwrap();

        assert_eq!(pmkid.essid, vec![0x63, 0x61, 0x66, 0xe9]);
        assert_eq!(pmkid.ssid, "caf\u{fffd}");
        assert!(pmkid.hash_line().ends_with("*ffffffffffff*636166e9"));
    }

    #[test]
    fn test_probe_response_accepted() {
        let mut frame = beacon(BSSID, b"net", Some(&rsn_body(&[PMKID])));
        frame[0] = 0x50;
        assert!(extract(&frame).is_some());

        // probe request is not a source of PMKIDs
        frame[0] = 0x40;
        assert!(extract(&frame).is_none());
    }

    #[test]
    fn test_hidden_ssid() {
        let frame = beacon(BSSID, &[0, 0, 0], Some(&rsn_body(&[PMKID])));
        let pmkid = extract(&frame).unwrap();
        assert_eq!(pmkid.ssid, HIDDEN_SSID);
        assert!(pmkid.hash_line().ends_with(&hex::encode(HIDDEN_SSID)));

        let frame = beacon(BSSID, b"", Some(&rsn_body(&[PMKID])));
        assert_eq!(extract(&frame).unwrap().ssid, HIDDEN_SSID);
    }

    #[test]
    fn test_no_rsn_or_no_pmkid() {
        assert!(extract(&beacon(BSSID, b"open", None)).is_none());
        assert!(extract(&beacon(BSSID, b"psk", Some(&rsn_body(&[])))).is_none());
    }

    #[test]
    fn test_rsn_too_short() {
        let rsn = rsn_body(&[]);
        assert!(RsnElement::parse(&rsn[..RSN_MIN_LEN - 1]).is_none());
        assert!(RsnElement::parse(&rsn).is_some());
    }

    #[test]
    fn test_rsn_truncated_pmkid() {
        let mut rsn = rsn_body(&[PMKID]);
        rsn.truncate(rsn.len() - 1);
        let parsed = RsnElement::parse(&rsn).unwrap();
        assert!(parsed.pmkids.is_empty());
    }

    #[test]
    fn test_rsn_oversized_suite_count() {
        let mut rsn = rsn_body(&[PMKID]);
        rsn[6] = 0xff;
        rsn[7] = 0xff;
        assert!(RsnElement::parse(&rsn).is_none());
    }

    #[test]
    fn test_rsn_keeps_every_pmkid() {
        let second = [0x42u8; 16];
        let parsed = RsnElement::parse(&rsn_body(&[PMKID, second])).unwrap();
        assert_eq!(parsed.pmkids, vec![PMKID, second]);
        assert_eq!(parsed.first_pmkid(), Some(PMKID));
        assert_eq!(parsed.akm_suites, vec![[0x00, 0x0f, 0xac, 0x02]]);
    }

    #[test]
    fn test_ie_walk_stops_on_overrun() {
        let ies = [0x00, 0x04, b'T', b'E', b'S', b'T', 0x30, 0x40, 0x01];
        let collected: Vec<_> = IeIter::new(&ies).collect();
        assert_eq!(collected.len(), 1);
        assert_eq!(collected[0].data, b"TEST");
    }

    #[test]
    fn test_ssid_capped() {
        let long = [b'A'; 40];
        let mut body = vec![0u8; FIXED_PARAMS_LEN];
        body.push(IE_SSID);
        body.push(long.len() as u8);
        body.extend_from_slice(&long);
        let params = TaggedParams::scan(&body);
        assert_eq!(params.ssid.unwrap().len(), MAX_SSID_LEN);
    }

    #[test]
    fn test_truncated_beacon_every_length() {
        let frame = beacon(BSSID, b"TEST", Some(&rsn_body(&[PMKID])));
        for len in 0..frame.len() {
            // never panics, and the PMKID only appears once the frame is whole
            assert!(extract(&frame[..len]).is_none());
        }
    }
}
