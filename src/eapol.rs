//! EAPOL payload location
//!
//! EAPOL travels inside 802.11 data frames behind an LLC/SNAP header
//! carrying Ethertype 0x888E. This module only finds the payload; the
//! handshake module interprets it.

use std::ops::Range;

use crate::ieee80211::{FrameHeader, FrameType};

/// LLC/SNAP header: DSAP/SSAP 0xAA, control 0x03, OUI 00:00:00
pub const LLC_SNAP_PREFIX: [u8; 6] = [0xAA, 0xAA, 0x03, 0x00, 0x00, 0x00];

/// Ethertype of 802.1X / EAPOL
pub const EAPOL_ETHERTYPE: u16 = 0x888E;

/// LLC/SNAP header length including the Ethertype
pub const LLC_SNAP_LEN: usize = 8;

/// Offset and length of an EAPOL payload inside a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EapolLocation {
    pub offset: usize,
    pub len: usize,
}

impl EapolLocation {
    pub fn range(&self) -> Range<usize> {
        self.offset..self.offset + self.len
    }

    /// The payload bytes within `frame`
    pub fn slice<'a>(&self, frame: &'a [u8]) -> Option<&'a [u8]> {
        frame.get(self.range())
    }
}

/// Locate the EAPOL payload of a classified frame.
///
/// Only unprotected data frames are considered; anything else, or a body
/// that is too short or carries a different LLC/SNAP header, yields `None`.
pub fn locate(frame: &[u8], header: &FrameHeader) -> Option<EapolLocation> {
    if header.frame_type() != FrameType::Data || header.control.protected() {
        return None;
    }

    let body = frame.get(header.header_len..)?;
    let llc = body.get(..LLC_SNAP_LEN)?;
    if llc[..6] != LLC_SNAP_PREFIX {
        return None;
    }
    if u16::from_be_bytes([llc[6], llc[7]]) != EAPOL_ETHERTYPE {
        return None;
    }

    let offset = header.header_len + LLC_SNAP_LEN;
    let len = frame.len().checked_sub(offset)?;
    if len == 0 {
        return None;
    }

    Some(EapolLocation { offset, len })
}

/// Whether `frame` carries EAPOL at all
pub fn is_eapol(frame: &[u8], header: &FrameHeader) -> bool {
    locate(frame, header).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ieee80211::classify;

    fn data_frame(fc: u8, llc: &[u8], payload: &[u8]) -> Vec<u8> {
        let mut frame = vec![0u8; 24];
        frame[0] = fc;
        frame[1] = 0x02;
        if fc & 0x80 != 0 {
            frame.extend_from_slice(&[0x00, 0x00]);
        }
        frame.extend_from_slice(llc);
        frame.extend_from_slice(payload);
        frame
    }

    const EAPOL_LLC: [u8; 8] = [0xAA, 0xAA, 0x03, 0x00, 0x00, 0x00, 0x88, 0x8E];

    #[test]
    fn test_locate_in_qos_frame() {
        let frame = data_frame(0x88, &EAPOL_LLC, &[0x02, 0x03, 0x00, 0x5f]);
        let header = classify(&frame).unwrap();
        let location = locate(&frame, &header).unwrap();

        assert_eq!(location.offset, 34);
        assert_eq!(location.len, 4);
        assert_eq!(location.slice(&frame).unwrap(), &[0x02, 0x03, 0x00, 0x5f]);
    }

    #[test]
    fn test_other_ethertype_rejected() {
        let ipv4 = [0xAA, 0xAA, 0x03, 0x00, 0x00, 0x00, 0x08, 0x00];
        let frame = data_frame(0x08, &ipv4, &[0x45; 20]);
        let header = classify(&frame).unwrap();
        assert!(!is_eapol(&frame, &header));
    }

    #[test]
    fn test_bad_llc_rejected() {
        let bad = [0xAB, 0xAA, 0x03, 0x00, 0x00, 0x00, 0x88, 0x8E];
        let frame = data_frame(0x08, &bad, &[0x01; 8]);
        let header = classify(&frame).unwrap();
        assert!(locate(&frame, &header).is_none());
    }

    #[test]
    fn test_truncated_body() {
        let frame = data_frame(0x08, &EAPOL_LLC[..5], &[]);
        let header = classify(&frame).unwrap();
        assert!(locate(&frame, &header).is_none());

        // LLC/SNAP present but nothing after it
        let frame = data_frame(0x08, &EAPOL_LLC, &[]);
        let header = classify(&frame).unwrap();
        assert!(locate(&frame, &header).is_none());
    }

    #[test]
    fn test_management_frame_short_circuits() {
        let mut frame = data_frame(0x08, &EAPOL_LLC, &[0x02, 0x03]);
        frame[0] = 0x80;
        let header = classify(&frame).unwrap();
        assert!(locate(&frame, &header).is_none());
    }

    #[test]
    fn test_protected_frame_skipped() {
        let mut frame = data_frame(0x08, &EAPOL_LLC, &[0x02, 0x03]);
        frame[1] |= 0x40;
        let header = classify(&frame).unwrap();
        assert!(locate(&frame, &header).is_none());
    }
}
