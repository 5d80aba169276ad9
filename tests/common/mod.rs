//! Frame builders shared by the integration tests

#![allow(dead_code)]

use wavecap::MacAddress;

pub const AP: MacAddress = MacAddress([0x00, 0x11, 0x22, 0x33, 0x44, 0x55]);
pub const STA: MacAddress = MacAddress([0x66, 0x77, 0x88, 0x99, 0xaa, 0xbb]);
pub const STA2: MacAddress = MacAddress([0x66, 0x77, 0x88, 0x99, 0xaa, 0xcc]);
pub const AP2: MacAddress = MacAddress([0x02, 0x11, 0x22, 0x33, 0x44, 0x66]);

pub const PMKID: [u8; 16] = [
    0x10, 0x32, 0x54, 0x76, 0x98, 0xba, 0xdc, 0xfe, 0x01, 0x23, 0x45, 0x67, 0x89, 0xab, 0xcd, 0xef,
];

pub const KEY_INFO_M1: u16 = 0x008a;
pub const KEY_INFO_M2: u16 = 0x010a;
pub const KEY_INFO_M3: u16 = 0x13ca;
pub const KEY_INFO_M4: u16 = 0x030a;

/// Offset of the MIC inside the EAPOL frame
pub const MIC_OFFSET: usize = 81;

/// EAPOL-Key frame (version 2) with a filled nonce and MIC
pub fn eapol_key(key_info: u16, nonce: u8, mic: u8) -> Vec<u8> {
    let mut body = vec![0u8; 95];
    body[0] = 2;
    body[1..3].copy_from_slice(&key_info.to_be_bytes());
    body[3..5].copy_from_slice(&16u16.to_be_bytes());
    body[12] = 1;
    body[13..45].fill(nonce);
    body[77..93].fill(mic);

    let mut eapol = vec![0x02, 0x03];
    eapol.extend_from_slice(&(body.len() as u16).to_be_bytes());
    eapol.extend_from_slice(&body);
    eapol
}

/// 3-address QoS data frame carrying `payload` behind an EAPOL LLC/SNAP header
pub fn qos_eapol(ap: MacAddress, sta: MacAddress, from_ap: bool, payload: &[u8]) -> Vec<u8> {
    let (flags, a1, a2) = if from_ap {
        (0x02, sta, ap)
    } else {
        (0x01, ap, sta)
    };
    let mut frame = vec![0x88, flags, 0x3a, 0x01];
    frame.extend_from_slice(&a1.0);
    frame.extend_from_slice(&a2.0);
    frame.extend_from_slice(&ap.0);
    frame.extend_from_slice(&[0x10, 0x00, 0x07, 0x00]);
    frame.extend_from_slice(&[0xaa, 0xaa, 0x03, 0x00, 0x00, 0x00, 0x88, 0x8e]);
    frame.extend_from_slice(payload);
    frame
}

/// 4-address (WDS) QoS data frame from `sta` to `ap` carrying EAPOL
pub fn wds_eapol(ap: MacAddress, sta: MacAddress, payload: &[u8]) -> Vec<u8> {
    let mut frame = vec![0x88, 0x03, 0x3a, 0x01];
    frame.extend_from_slice(&ap.0);
    frame.extend_from_slice(&sta.0);
    frame.extend_from_slice(&ap.0);
    frame.extend_from_slice(&[0x20, 0x00]);
    frame.extend_from_slice(&sta.0);
    frame.extend_from_slice(&[0x07, 0x00]);
    frame.extend_from_slice(&[0xaa, 0xaa, 0x03, 0x00, 0x00, 0x00, 0x88, 0x8e]);
    frame.extend_from_slice(payload);
    frame
}

/// Data frame with neither DS bit set whose receiver is not the BSSID
pub fn adhoc_eapol(bssid: MacAddress, receiver: MacAddress, sta: MacAddress, payload: &[u8]) -> Vec<u8> {
    let mut frame = vec![0x08, 0x00, 0x3a, 0x01];
    frame.extend_from_slice(&receiver.0);
    frame.extend_from_slice(&sta.0);
    frame.extend_from_slice(&bssid.0);
    frame.extend_from_slice(&[0x30, 0x00]);
    frame.extend_from_slice(&[0xaa, 0xaa, 0x03, 0x00, 0x00, 0x00, 0x88, 0x8e]);
    frame.extend_from_slice(payload);
    frame
}

/// Plain data frame with an IPv4 payload
pub fn plain_data(ap: MacAddress, sta: MacAddress, seq: u8) -> Vec<u8> {
    let mut frame = vec![0x08, 0x01, 0x00, 0x00];
    frame.extend_from_slice(&ap.0);
    frame.extend_from_slice(&sta.0);
    frame.extend_from_slice(&ap.0);
    frame.extend_from_slice(&[seq << 4, 0x00]);
    frame.extend_from_slice(&[0xaa, 0xaa, 0x03, 0x00, 0x00, 0x00, 0x08, 0x00]);
    frame.extend_from_slice(&[0x45; 40]);
    frame
}

/// Beacon with an SSID element and an RSN element advertising `pmkids`
pub fn beacon(bssid: MacAddress, ssid: &[u8], pmkids: &[[u8; 16]]) -> Vec<u8> {
    let mut frame = vec![0x80, 0x00, 0x00, 0x00];
    frame.extend_from_slice(&[0xff; 6]);
    frame.extend_from_slice(&bssid.0);
    frame.extend_from_slice(&bssid.0);
    frame.extend_from_slice(&[0x00, 0x00]);
    frame.extend_from_slice(&[0u8; 8]);
    frame.extend_from_slice(&[0x64, 0x00, 0x31, 0x04]);

    frame.push(0);
    frame.push(ssid.len() as u8);
    frame.extend_from_slice(ssid);

    let mut rsn = vec![0x01, 0x00, 0x00, 0x0f, 0xac, 0x04];
    rsn.extend_from_slice(&[0x01, 0x00, 0x00, 0x0f, 0xac, 0x04]);
    rsn.extend_from_slice(&[0x01, 0x00, 0x00, 0x0f, 0xac, 0x02]);
    rsn.extend_from_slice(&[0x00, 0x00]);
    rsn.extend_from_slice(&(pmkids.len() as u16).to_le_bytes());
    for pmkid in pmkids {
        rsn.extend_from_slice(pmkid);
    }
    frame.push(48);
    frame.push(rsn.len() as u8);
    frame.extend_from_slice(&rsn);
    frame
}

/// Split a pcap file into (captured length, payload) records
pub fn pcap_records(data: &[u8]) -> Vec<Vec<u8>> {
    let mut records = Vec::new();
    let mut offset = 24;
    while offset + 16 <= data.len() {
        let len = u32::from_le_bytes([
            data[offset + 8],
            data[offset + 9],
            data[offset + 10],
            data[offset + 11],
        ]) as usize;
        records.push(data[offset + 16..offset + 16 + len].to_vec());
        offset += 16 + len;
    }
    records
}
