//! IPv6 address management on router interfaces.

use async_trait::async_trait;
use sonic_cfgmgr_common::shell::{self, shellquote, IP_CMD};
use sonic_cfgmgr_common::{CfgMgrError, CfgMgrResult};
use tracing::{debug, instrument};

use crate::types::Ipv6AddressEntry;

/// Adds, removes and lists IPv6 addresses on an interface inside a
/// network namespace.
#[async_trait]
pub trait InterfaceDriver: Send + Sync {
    async fn add_v6_address(
        &self,
        interface: &str,
        cidr: &str,
        namespace: Option<&str>,
    ) -> CfgMgrResult<()>;

    async fn delete_v6_address(
        &self,
        interface: &str,
        cidr: &str,
        namespace: Option<&str>,
    ) -> CfgMgrResult<()>;

    /// Link-scope IPv6 addresses of `interface`.
    ///
    /// Fails with [`CfgMgrError::InterfaceNotFound`] if the interface is gone.
    async fn list_v6_addresses(
        &self,
        interface: &str,
        namespace: Option<&str>,
    ) -> CfgMgrResult<Vec<Ipv6AddressEntry>>;
}

/// [`InterfaceDriver`] backed by iproute2.
#[derive(Debug, Clone, Default)]
pub struct IpCommandDriver;

impl IpCommandDriver {
    pub fn new() -> Self {
        Self
    }
}

fn addr_cmd(action: &str, interface: &str, cidr: &str) -> String {
    format!(
        "{} -6 addr {} {} dev {}",
        IP_CMD,
        action,
        shellquote(cidr),
        shellquote(interface)
    )
}

/// Maps a failed `ip` invocation onto the not-found variants where the
/// output says so.
fn classify_failure(err: CfgMgrError, interface: &str, cidr: Option<&str>) -> CfgMgrError {
    let CfgMgrError::ShellCommandFailed { ref output, .. } = err else {
        return err;
    };
    if output.contains("Cannot find device") || output.contains("does not exist") {
        return CfgMgrError::interface_not_found(interface);
    }
    if let Some(cidr) = cidr {
        if output.contains("Cannot assign requested address") {
            return CfgMgrError::address_not_found(interface, cidr);
        }
    }
    err
}

#[async_trait]
impl InterfaceDriver for IpCommandDriver {
    #[instrument(skip(self))]
    async fn add_v6_address(
        &self,
        interface: &str,
        cidr: &str,
        namespace: Option<&str>,
    ) -> CfgMgrResult<()> {
        let cmd = addr_cmd("add", interface, cidr);
        match shell::exec_in_netns_or_throw(namespace, &cmd).await {
            Ok(_) => Ok(()),
            Err(CfgMgrError::ShellCommandFailed { ref output, .. })
                if output.contains("File exists") =>
            {
                debug!(interface, cidr, "Address already present");
                Ok(())
            }
            Err(e) => Err(classify_failure(e, interface, Some(cidr))),
        }
    }

    #[instrument(skip(self))]
    async fn delete_v6_address(
        &self,
        interface: &str,
        cidr: &str,
        namespace: Option<&str>,
    ) -> CfgMgrResult<()> {
        let cmd = addr_cmd("del", interface, cidr);
        shell::exec_in_netns_or_throw(namespace, &cmd)
            .await
            .map(|_| ())
            .map_err(|e| classify_failure(e, interface, Some(cidr)))
    }

    async fn list_v6_addresses(
        &self,
        interface: &str,
        namespace: Option<&str>,
    ) -> CfgMgrResult<Vec<Ipv6AddressEntry>> {
        let cmd = format!(
            "{} -o -6 addr show dev {} scope link",
            IP_CMD,
            shellquote(interface)
        );
        let output = shell::exec_in_netns_or_throw(namespace, &cmd)
            .await
            .map_err(|e| classify_failure(e, interface, None))?;
        Ok(parse_addr_show(&output))
    }
}

/// Parses `ip -o -6 addr show` output.
///
/// ```text
/// 2: qg-1    inet6 fe80::f816:3eff:fe00:1/64 scope link tentative \       valid_lft forever preferred_lft forever
/// ```
pub fn parse_addr_show(output: &str) -> Vec<Ipv6AddressEntry> {
    output
        .lines()
        .filter_map(|line| {
            let mut tokens = line.split_whitespace().skip_while(|t| *t != "inet6");
            tokens.next()?;
            let cidr = tokens.next()?.to_string();
            let flags = tokens
                .take_while(|t| *t != "\\" && *t != "valid_lft")
                .map(str::to_string)
                .collect();
            Some(Ipv6AddressEntry { cidr, flags })
        })
        .collect()
}
