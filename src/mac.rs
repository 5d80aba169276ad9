//! MAC address type

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::CaptureError;

/// 48-bit IEEE MAC address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct MacAddress(pub [u8; 6]);

impl MacAddress {
    /// Read an address from `data` at `offset`, if it fits
    pub fn from_slice(data: &[u8], offset: usize) -> Option<Self> {
        let bytes = data.get(offset..offset.checked_add(6)?)?;
        let mut addr = [0u8; 6];
        addr.copy_from_slice(bytes);
        Some(Self(addr))
    }

    pub fn as_bytes(&self) -> &[u8; 6] {
        &self.0
    }

    pub fn is_broadcast(&self) -> bool {
        self.0 == [0xff; 6]
    }

    /// Upper-case hex without separators, as used in file names and logs
    pub fn to_compact(&self) -> String {
        hex::encode_upper(self.0)
    }

    /// Lower-case hex without separators, as used in hash lines
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let a = &self.0;
        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            a[0], a[1], a[2], a[3], a[4], a[5]
        )
    }
}

impl FromStr for MacAddress {
    type Err = CaptureError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits: String = s.chars().filter(|c| *c != ':' && *c != '-').collect();
        let bytes = hex::decode(&digits)
            .map_err(|e| CaptureError::Config(format!("Invalid MAC address '{}': {}", s, e)))?;
        let addr: [u8; 6] = bytes
            .try_into()
            .map_err(|_| CaptureError::Config(format!("Invalid MAC address length '{}'", s)))?;
        Ok(Self(addr))
    }
}

impl From<[u8; 6]> for MacAddress {
    fn from(addr: [u8; 6]) -> Self {
        Self(addr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_slice_bounds() {
        let data = [1, 2, 3, 4, 5, 6, 7];
        assert_eq!(MacAddress::from_slice(&data, 1), Some(MacAddress([2, 3, 4, 5, 6, 7])));
        assert_eq!(MacAddress::from_slice(&data, 2), None);
        assert_eq!(MacAddress::from_slice(&data, usize::MAX), None);
    }

    #[test]
    fn test_formatting() {
        let mac = MacAddress([0xaa, 0xbb, 0xcc, 0x01, 0x02, 0x03]);
        assert_eq!(mac.to_string(), "AA:BB:CC:01:02:03");
        assert_eq!(mac.to_compact(), "AABBCC010203");
        assert_eq!(mac.to_hex(), "aabbcc010203");
    }

    #[test]
    fn test_parse() {
        let mac: MacAddress = "aa:bb:cc:dd:ee:ff".parse().unwrap();
        assert_eq!(mac, MacAddress([0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff]));
        assert!("aa:bb:cc".parse::<MacAddress>().is_err());
        assert!("zz:bb:cc:dd:ee:ff".parse::<MacAddress>().is_err());
    }
}
