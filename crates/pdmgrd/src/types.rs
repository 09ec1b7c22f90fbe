//! Type definitions for pdmgrd

use std::collections::{BTreeMap, HashMap};
use std::net::Ipv6Addr;

use serde::Serialize;
use sonic_types::{MacAddress, LINK_LOCAL_PREFIX_LEN};

use crate::lla;
use crate::requestor::RequestorId;

/// Prefix reported for a subnet that has no delegated prefix.
pub const UNASSIGNED_PREFIX: &str = "::/64";

/// Service name under which PD clients are supervised.
pub const PD_SERVICE_NAME: &str = "dibbler";

/// Subnet id -> prefix, as pushed upstream in one batched notification.
pub type PrefixUpdate = BTreeMap<String, String>;

/// Progress of the link-local address bound for one delegation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LlaBinding {
    /// No address requested on the gateway interface.
    #[default]
    Unbound,
    /// Address added, duplicate-address detection still running.
    Binding,
    /// Address observed non-tentative.
    Confirmed,
}

/// Externally visible state of a delegation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DelegationState {
    Unbound,
    Binding,
    BoundWaitingClient,
    ClientRunning,
}

/// PD state for one (router, subnet) pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delegation {
    /// Last known delegated prefix, or [`UNASSIGNED_PREFIX`].
    pub prefix: String,
    /// Last prefix communicated to (or by) the rest of the system.
    pub old_prefix: Option<String>,
    /// Identifies the PD client instance for this pair.
    pub requestor: RequestorId,
    /// Entry was reconstructed from disk and not yet reconciled.
    pub syncing: bool,
    /// The PD client process has been started.
    pub client_started: bool,
    /// Progress of the bound link-local address.
    pub lla: LlaBinding,
    mac: Option<MacAddress>,
    bound_lla: Option<Ipv6Addr>,
}

impl Delegation {
    /// Create a delegation for a freshly enabled subnet.
    pub fn new(requestor: RequestorId) -> Self {
        Self {
            prefix: UNASSIGNED_PREFIX.to_string(),
            old_prefix: Some(UNASSIGNED_PREFIX.to_string()),
            requestor,
            syncing: false,
            client_started: false,
            lla: LlaBinding::Unbound,
            mac: None,
            bound_lla: None,
        }
    }

    /// Create a delegation recovered from a previous run's working area.
    pub fn recovered(requestor: RequestorId, prefix: String, client_started: bool) -> Self {
        Self {
            prefix,
            old_prefix: None,
            requestor,
            syncing: true,
            client_started,
            lla: LlaBinding::Unbound,
            mac: None,
            bound_lla: None,
        }
    }

    /// Internal router interface name for this subnet.
    pub fn ri_ifname(&self) -> &str {
        self.requestor.ri_ifname()
    }

    /// MAC address the link-local address is derived from.
    pub fn mac(&self) -> Option<MacAddress> {
        self.mac
    }

    /// Record the MAC and re-derive the bound link-local address from it.
    pub fn set_mac(&mut self, mac: MacAddress) {
        self.mac = Some(mac);
        self.derive_bound_lla(mac);
    }

    /// Re-derive the bound link-local address from `mac` without
    /// recording it as the delegation's MAC.
    pub fn derive_bound_lla(&mut self, mac: MacAddress) {
        self.bound_lla = Some(lla::lla_for_mac(mac));
    }

    /// Link-local address the PD client binds to.
    pub fn bound_lla(&self) -> Option<Ipv6Addr> {
        self.bound_lla
    }

    /// Bound link-local address in `/64` CIDR form.
    pub fn bound_lla_with_mask(&self) -> Option<String> {
        self.bound_lla
            .map(|addr| format!("{}/{}", addr, LINK_LOCAL_PREFIX_LEN))
    }

    pub fn state(&self) -> DelegationState {
        if self.client_started {
            return DelegationState::ClientRunning;
        }
        match self.lla {
            LlaBinding::Unbound => DelegationState::Unbound,
            LlaBinding::Binding => DelegationState::Binding,
            LlaBinding::Confirmed => DelegationState::BoundWaitingClient,
        }
    }
}

/// Gateway attachment of a router, cloned out so delegations can be
/// mutated while it is in use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouterLink {
    pub gw_interface: String,
    pub namespace: Option<String>,
}

impl RouterLink {
    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }
}

/// One managed virtual router.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Router {
    /// External interface, once a gateway is attached.
    pub gw_interface: Option<String>,
    /// Network namespace of the router's interfaces.
    pub namespace: Option<String>,
    /// Subnet id -> delegation.
    pub subnets: HashMap<String, Delegation>,
}

impl Router {
    /// Create a router living in `namespace`.
    pub fn new(namespace: Option<String>) -> Self {
        Self {
            gw_interface: None,
            namespace,
            subnets: HashMap::new(),
        }
    }

    /// Returns the gateway attachment, if any.
    pub fn link(&self) -> Option<RouterLink> {
        self.gw_interface.as_ref().map(|gw| RouterLink {
            gw_interface: gw.clone(),
            namespace: self.namespace.clone(),
        })
    }
}

/// One entry of an interface's IPv6 address list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ipv6AddressEntry {
    /// Address in CIDR form, e.g. `fe80::1/64`.
    pub cidr: String,
    /// Flags reported alongside the address (`scope`, `link`, `tentative`...).
    pub flags: Vec<String>,
}

impl Ipv6AddressEntry {
    pub fn new(cidr: impl Into<String>, flags: &[&str]) -> Self {
        Self {
            cidr: cidr.into(),
            flags: flags.iter().map(|f| f.to_string()).collect(),
        }
    }

    /// Duplicate-address detection has not completed for this address.
    pub fn is_tentative(&self) -> bool {
        self.flags.iter().any(|f| f == "tentative")
    }
}
