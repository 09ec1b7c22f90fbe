//! Link-local address derivation for PD client binding.

use std::net::Ipv6Addr;

use sonic_cfgmgr_common::{CfgMgrError, CfgMgrResult};
use sonic_types::MacAddress;

/// First octets above this value are decremented instead of incremented.
const FIRST_OCTET_THRESHOLD: u8 = 0x80;

/// Derives the PD bind address for `mac`.
///
/// The first octet is nudged by one so the address never collides with the
/// interface's own EUI-64 link-local address, then the modified EUI-64
/// identifier is placed under `fe80::/64`.
pub fn lla_for_mac(mac: MacAddress) -> Ipv6Addr {
    let first = mac.first_octet();
    let shifted = if first > FIRST_OCTET_THRESHOLD {
        first - 1
    } else {
        first + 1
    };
    mac.with_first_octet(shifted).to_link_local()
}

/// Parses `mac` and derives its PD bind address.
pub fn derive_lla(mac: &str) -> CfgMgrResult<Ipv6Addr> {
    let mac: MacAddress = mac
        .parse()
        .map_err(|e| CfgMgrError::invalid_address(mac, format!("{}", e)))?;
    Ok(lla_for_mac(mac))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_derive_lla_increments_low_octet() {
        let lla = derive_lla("00:11:22:33:44:55").unwrap();
        assert_eq!(lla, "fe80::311:22ff:fe33:4455".parse::<Ipv6Addr>().unwrap());
    }

    #[test]
    fn test_derive_lla_decrements_high_octet() {
        let lla = derive_lla("fa:16:3e:12:34:56").unwrap();
        assert_eq!(lla, "fe80::fb16:3eff:fe12:3456".parse::<Ipv6Addr>().unwrap());
    }

    #[test]
    fn test_derive_lla_threshold_increments() {
        // 0x80 is not above the threshold
        let lla = derive_lla("80:00:00:00:00:01").unwrap();
        assert_eq!(lla, "fe80::8300:ff:fe00:1".parse::<Ipv6Addr>().unwrap());
    }

    #[test]
    fn test_derive_lla_deterministic() {
        let a = derive_lla("fa:16:3e:aa:bb:cc").unwrap();
        let b = derive_lla("FA-16-3E-AA-BB-CC").unwrap();
        assert_eq!(a, b);
        assert_eq!(a, derive_lla("fa:16:3e:aa:bb:cc").unwrap());
    }

    #[test]
    fn test_derive_lla_invalid() {
        let err = derive_lla("not-a-mac").unwrap_err();
        assert!(matches!(err, CfgMgrError::InvalidAddress { .. }));
        assert!(derive_lla("00:11:22:33:44").is_err());
    }
}
