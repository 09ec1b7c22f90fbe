//! Common SONiC types for network control-plane daemons.
//!
//! - [`MacAddress`]: 48-bit Ethernet MAC addresses, including the modified
//!   EUI-64 interface identifier used for IPv6 link-local addressing.

mod mac;

pub use mac::{MacAddress, LINK_LOCAL_PREFIX_LEN};

/// Common error type for parsing failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("invalid MAC address format: {0}")]
    InvalidMacAddress(String),
}
