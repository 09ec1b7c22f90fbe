//! Requestor identifiers naming one PD client instance.

use std::fmt;
use std::str::FromStr;

use sonic_cfgmgr_common::{CfgMgrError, CfgMgrResult};

/// Separator between the identifier parts.
const SEPARATOR: char = ':';

/// Stable key for one (router, subnet, internal interface) delegation.
///
/// Rendered as `router:subnet:ifname`, which doubles as the name of the
/// client's working directory, so no part may contain the separator or a
/// path separator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestorId {
    router_id: String,
    subnet_id: String,
    ri_ifname: String,
}

impl RequestorId {
    pub fn new(
        router_id: impl Into<String>,
        subnet_id: impl Into<String>,
        ri_ifname: impl Into<String>,
    ) -> CfgMgrResult<Self> {
        let id = Self {
            router_id: router_id.into(),
            subnet_id: subnet_id.into(),
            ri_ifname: ri_ifname.into(),
        };
        for part in [&id.router_id, &id.subnet_id, &id.ri_ifname] {
            if !is_valid_part(part) {
                return Err(CfgMgrError::invalid_requestor(id.to_string()));
            }
        }
        Ok(id)
    }

    /// Splits `value` back into its three parts.
    pub fn parse(value: &str) -> CfgMgrResult<Self> {
        let parts: Vec<&str> = value.split(SEPARATOR).collect();
        match parts.as_slice() {
            [router, subnet, ifname] => Self::new(*router, *subnet, *ifname),
            _ => Err(CfgMgrError::invalid_requestor(value)),
        }
    }

    pub fn router_id(&self) -> &str {
        &self.router_id
    }

    pub fn subnet_id(&self) -> &str {
        &self.subnet_id
    }

    pub fn ri_ifname(&self) -> &str {
        &self.ri_ifname
    }
}

fn is_valid_part(part: &str) -> bool {
    !part.is_empty()
        && part != "."
        && part != ".."
        && !part.contains(SEPARATOR)
        && !part.contains('/')
        && !part.contains('\0')
}

impl fmt::Display for RequestorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{sep}{}{sep}{}",
            self.router_id,
            self.subnet_id,
            self.ri_ifname,
            sep = SEPARATOR
        )
    }
}

impl FromStr for RequestorId {
    type Err = CfgMgrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_and_parse() {
        let id = RequestorId::new("r1", "s1", "qr-1").unwrap();
        assert_eq!(id.to_string(), "r1:s1:qr-1");

        let parsed: RequestorId = "r1:s1:qr-1".parse().unwrap();
        assert_eq!(parsed, id);
        assert_eq!(parsed.router_id(), "r1");
        assert_eq!(parsed.subnet_id(), "s1");
        assert_eq!(parsed.ri_ifname(), "qr-1");
    }

    #[test]
    fn test_uuid_parts() {
        let id = RequestorId::new(
            "5a7f1c2e-0d7b-4d7e-9a55-9b1f3c1f4a01",
            "c1d2e3f4-1111-2222-3333-444455556666",
            "qr-5a7f1c2e-0d",
        )
        .unwrap();
        assert_eq!(RequestorId::parse(&id.to_string()).unwrap(), id);
    }

    #[test]
    fn test_parse_wrong_part_count() {
        assert!(RequestorId::parse("r1:s1").is_err());
        assert!(RequestorId::parse("r1:s1:qr-1:extra").is_err());
        assert!(RequestorId::parse("").is_err());
    }

    #[test]
    fn test_rejects_unsafe_parts() {
        assert!(RequestorId::new("r1", "", "qr-1").is_err());
        assert!(RequestorId::new("r1", "s1", "qr/1").is_err());
        assert!(RequestorId::new("..", "s1", "qr-1").is_err());
        assert!(RequestorId::new("r:1", "s1", "qr-1").is_err());
        assert!(matches!(
            RequestorId::parse("r1::qr-1"),
            Err(CfgMgrError::InvalidRequestor { .. })
        ));
    }
}
