//! MAC address type with safe parsing, formatting and EUI-64 expansion.

use crate::ParseError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv6Addr;
use std::str::FromStr;

/// Prefix length of the IPv6 link-local network (`fe80::/64`).
pub const LINK_LOCAL_PREFIX_LEN: u8 = 64;

/// Universal/local bit of the first octet, inverted by modified EUI-64.
const UL_BIT: u8 = 0x02;

/// A 48-bit Ethernet MAC address.
///
/// # Examples
///
/// ```
/// use sonic_types::MacAddress;
///
/// let mac: MacAddress = "fa:16:3e:00:00:01".parse().unwrap();
/// assert_eq!(mac.to_string(), "fa:16:3e:00:00:01");
/// assert_eq!(mac.to_link_local().to_string(), "fe80::f816:3eff:fe00:1");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MacAddress([u8; 6]);

impl MacAddress {
    /// Creates a new MAC address from raw bytes.
    pub const fn new(bytes: [u8; 6]) -> Self {
        MacAddress(bytes)
    }

    /// Returns the raw bytes of the MAC address.
    pub const fn as_bytes(&self) -> &[u8; 6] {
        &self.0
    }

    /// Returns the first octet.
    pub const fn first_octet(&self) -> u8 {
        self.0[0]
    }

    /// Returns a copy with the first octet replaced.
    pub const fn with_first_octet(&self, octet: u8) -> Self {
        let mut bytes = self.0;
        bytes[0] = octet;
        MacAddress(bytes)
    }

    /// Modified EUI-64 interface identifier (RFC 4291 appendix A).
    ///
    /// `ff:fe` is inserted between the OUI and the NIC-specific half and
    /// the universal/local bit is inverted.
    pub const fn eui64_interface_id(&self) -> [u8; 8] {
        [
            self.0[0] ^ UL_BIT,
            self.0[1],
            self.0[2],
            0xff,
            0xfe,
            self.0[3],
            self.0[4],
            self.0[5],
        ]
    }

    /// Returns the `fe80::/64` address formed from the EUI-64 identifier.
    pub fn to_link_local(&self) -> Ipv6Addr {
        let id = self.eui64_interface_id();
        let mut octets = [0u8; 16];
        octets[0] = 0xfe;
        octets[1] = 0x80;
        octets[8..].copy_from_slice(&id);
        Ipv6Addr::from(octets)
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            self.0[0], self.0[1], self.0[2], self.0[3], self.0[4], self.0[5]
        )
    }
}

impl FromStr for MacAddress {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ParseError::InvalidMacAddress(s.to_string());

        let separator = if s.contains(':') { ':' } else { '-' };
        let mut bytes = [0u8; 6];
        let mut count = 0;

        for part in s.split(separator) {
            if count == bytes.len() || part.is_empty() || part.len() > 2 {
                return Err(invalid());
            }
            bytes[count] = u8::from_str_radix(part, 16).map_err(|_| invalid())?;
            count += 1;
        }

        if count != bytes.len() {
            return Err(invalid());
        }

        Ok(MacAddress(bytes))
    }
}

impl TryFrom<String> for MacAddress {
    type Error = ParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<MacAddress> for String {
    fn from(mac: MacAddress) -> String {
        mac.to_string()
    }
}

impl From<[u8; 6]> for MacAddress {
    fn from(bytes: [u8; 6]) -> Self {
        MacAddress(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_colon_format() {
        let mac: MacAddress = "fa:16:3e:12:34:56".parse().unwrap();
        assert_eq!(mac.as_bytes(), &[0xfa, 0x16, 0x3e, 0x12, 0x34, 0x56]);
    }

    #[test]
    fn test_parse_hyphen_format() {
        let mac: MacAddress = "FA-16-3E-12-34-56".parse().unwrap();
        assert_eq!(mac.to_string(), "fa:16:3e:12:34:56");
    }

    #[test]
    fn test_invalid_format() {
        assert!("invalid".parse::<MacAddress>().is_err());
        assert!("00:11:22:33:44".parse::<MacAddress>().is_err());
        assert!("00:11:22:33:44:55:66".parse::<MacAddress>().is_err());
        assert!("gg:11:22:33:44:55".parse::<MacAddress>().is_err());
        assert!("000:11:22:33:44:55".parse::<MacAddress>().is_err());
        assert!("00::22:33:44:55".parse::<MacAddress>().is_err());
        assert!("".parse::<MacAddress>().is_err());
    }

    #[test]
    fn test_eui64_interface_id() {
        let mac: MacAddress = "00:11:22:33:44:55".parse().unwrap();
        assert_eq!(
            mac.eui64_interface_id(),
            [0x02, 0x11, 0x22, 0xff, 0xfe, 0x33, 0x44, 0x55]
        );
    }

    #[test]
    fn test_to_link_local() {
        let mac: MacAddress = "00:11:22:33:44:55".parse().unwrap();
        let lla = mac.to_link_local();
        assert_eq!(lla.to_string(), "fe80::211:22ff:fe33:4455");
        assert_eq!(lla.segments()[0], 0xfe80);
    }

    #[test]
    fn test_local_bit_inverted() {
        let local: MacAddress = "02:00:00:00:00:01".parse().unwrap();
        assert_eq!(local.eui64_interface_id()[0], 0x00);
        let universal: MacAddress = "00:00:00:00:00:01".parse().unwrap();
        assert_eq!(universal.eui64_interface_id()[0], 0x02);
    }

    #[test]
    fn test_with_first_octet() {
        let mac: MacAddress = "fa:16:3e:12:34:56".parse().unwrap();
        let nudged = mac.with_first_octet(0xf9);
        assert_eq!(nudged.first_octet(), 0xf9);
        assert_eq!(&nudged.as_bytes()[1..], &mac.as_bytes()[1..]);
    }

    #[test]
    fn test_serde_string_form() {
        let mac: MacAddress = "fa:16:3e:12:34:56".parse().unwrap();
        let s: String = mac.into();
        assert_eq!(MacAddress::try_from(s).unwrap(), mac);
    }
}
