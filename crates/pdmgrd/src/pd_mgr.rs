//! PD Manager - per-router, per-subnet prefix delegation lifecycle
//!
//! All state lives behind one async mutex held for the whole of every
//! operation, so lifecycle calls and `run_pd_client` ticks never interleave.
//! Probers run outside the lock and only wake the driver loop.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;

use sonic_cfgmgr_common::{CfgMgrError, CfgMgrResult};
use sonic_types::MacAddress;
use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument, warn};

use crate::dibbler::PdClient;
use crate::interface::InterfaceDriver;
use crate::notifier::PrefixNotifier;
use crate::prober::{is_lla_active, PdWaker, ProberConfig, ProberHandle, ProberSet};
use crate::recovery::load_sync_data;
use crate::requestor::RequestorId;
use crate::types::*;

#[derive(Debug, Default)]
struct PdState {
    routers: HashMap<String, Router>,
    probers: ProberSet,
}

/// Keeps the first error of a best-effort sweep.
fn keep_first(slot: &mut Option<CfgMgrError>, result: CfgMgrResult<()>) {
    if let Err(e) = result {
        warn!(error = %e, "PD operation failed");
        slot.get_or_insert(e);
    }
}

fn into_result(slot: Option<CfgMgrError>) -> CfgMgrResult<()> {
    slot.map_or(Ok(()), Err)
}

/// Prefix delegation coordinator.
pub struct PdMgr {
    state: Mutex<PdState>,
    driver: Arc<dyn InterfaceDriver>,
    client: Arc<dyn PdClient>,
    notifier: Arc<dyn PrefixNotifier>,
    waker: PdWaker,
    prober_config: ProberConfig,
}

impl PdMgr {
    /// Creates the coordinator, seeding it with the delegations found in
    /// the PD client's working area.
    pub fn new(
        driver: Arc<dyn InterfaceDriver>,
        client: Arc<dyn PdClient>,
        notifier: Arc<dyn PrefixNotifier>,
        waker: PdWaker,
        prober_config: ProberConfig,
    ) -> Self {
        let mut routers: HashMap<String, Router> = HashMap::new();
        for entry in load_sync_data(client.as_ref()) {
            let router = routers
                .entry(entry.requestor.router_id().to_string())
                .or_default();
            router.subnets.insert(
                entry.requestor.subnet_id().to_string(),
                Delegation::recovered(entry.requestor, entry.prefix, entry.client_started),
            );
        }

        info!(
            routers = routers.len(),
            delegations = routers.values().map(|r| r.subnets.len()).sum::<usize>(),
            "PdMgr initialized"
        );

        Self {
            state: Mutex::new(PdState {
                routers,
                probers: ProberSet::new(),
            }),
            driver,
            client,
            notifier,
            waker,
            prober_config,
        }
    }

    /// Creates the router entry, or refreshes its namespace after a restart.
    #[instrument(skip(self))]
    pub async fn add_router(&self, router_id: &str, namespace: Option<String>) {
        let mut state = self.state.lock().await;
        match state.routers.get_mut(router_id) {
            Some(router) => {
                debug!("Router already known, updating namespace");
                router.namespace = namespace;
            }
            None => {
                state
                    .routers
                    .insert(router_id.to_string(), Router::new(namespace));
                info!("Added router");
            }
        }
    }

    /// Tears down every delegation of the router and forgets it.
    ///
    /// The router is removed even if part of the teardown fails.
    #[instrument(skip(self))]
    pub async fn remove_router(&self, router_id: &str) -> CfgMgrResult<()> {
        let mut state = self.state.lock().await;
        let PdState { routers, probers } = &mut *state;
        let Some(mut router) = routers.remove(router_id) else {
            debug!("Unknown router");
            return Ok(());
        };
        probers.cancel_router(router_id);

        let link = router.link();
        let result = self.teardown(router_id, &mut router, link.as_ref()).await;
        info!("Removed router");
        result
    }

    /// Attaches the gateway interface and brings every subnet into the
    /// live flow, reconciling delegations recovered from disk.
    #[instrument(skip(self))]
    pub async fn add_gateway(&self, router_id: &str, gw_ifname: &str) -> CfgMgrResult<()> {
        let mut state = self.state.lock().await;
        let PdState { routers, probers } = &mut *state;
        let Some(router) = routers.get_mut(router_id) else {
            debug!("Unknown router");
            return Ok(());
        };

        router.gw_interface = Some(gw_ifname.to_string());
        let link = RouterLink {
            gw_interface: gw_ifname.to_string(),
            namespace: router.namespace.clone(),
        };

        let mut update = PrefixUpdate::new();
        let mut first_err = None;
        for (subnet_id, pdo) in router.subnets.iter_mut() {
            if pdo.syncing {
                pdo.syncing = false;
                if pdo.client_started {
                    if pdo.old_prefix.as_deref() != Some(pdo.prefix.as_str()) {
                        update.insert(subnet_id.clone(), pdo.prefix.clone());
                    }
                    continue;
                }
                keep_first(&mut first_err, self.unbind_lla(Some(&link), pdo).await);
            }
            let bound = self
                .bind_lla(probers, router_id, subnet_id, &link, pdo)
                .await;
            keep_first(&mut first_err, bound);
        }

        info!(subnets = router.subnets.len(), "Gateway attached");
        keep_first(&mut first_err, self.notify(update).await);
        into_result(first_err)
    }

    /// Detaches the gateway interface, stopping every client of the router.
    /// Delegations are kept and resume when a gateway is attached again.
    #[instrument(skip(self))]
    pub async fn remove_gateway(&self, router_id: &str) -> CfgMgrResult<()> {
        let mut state = self.state.lock().await;
        let PdState { routers, probers } = &mut *state;
        let Some(router) = routers.get_mut(router_id) else {
            debug!("Unknown router");
            return Ok(());
        };
        probers.cancel_router(router_id);

        let link = router.link();
        router.gw_interface = None;
        let result = self.teardown(router_id, router, link.as_ref()).await;
        info!("Gateway detached");
        result
    }

    /// Creates (or refreshes) the delegation for an internal subnet and binds
    /// its link-local address when the router has a gateway.
    ///
    /// A delegation recovered from disk only takes the MAC and the current
    /// prefix; binding waits for the gateway to be attached.
    #[instrument(skip(self))]
    pub async fn enable_subnet(
        &self,
        router_id: &str,
        subnet_id: &str,
        prefix: &str,
        ri_ifname: &str,
        mac: &str,
    ) -> CfgMgrResult<()> {
        let mac: MacAddress = mac
            .parse()
            .map_err(|e| CfgMgrError::invalid_address(mac, format!("{}", e)))?;

        let mut state = self.state.lock().await;
        let PdState { routers, probers } = &mut *state;
        let Some(router) = routers.get_mut(router_id) else {
            debug!("Unknown router");
            return Ok(());
        };
        let link = router.link();

        let pdo = match router.subnets.entry(subnet_id.to_string()) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                let requestor = RequestorId::new(router_id, subnet_id, ri_ifname)?;
                info!("Enabling PD for subnet");
                entry.insert(Delegation::new(requestor))
            }
        };

        if pdo.syncing {
            if pdo.ri_ifname() != ri_ifname {
                pdo.derive_bound_lla(mac);
                error!(
                    recorded = pdo.ri_ifname(),
                    "Router interface out of sync with recovered delegation, not enabling PD"
                );
                return Ok(());
            }
            pdo.set_mac(mac);
            pdo.old_prefix = Some(prefix.to_string());
            debug!("Recovered delegation refreshed");
            return Ok(());
        }

        if pdo.mac().is_some_and(|old| old != mac) {
            probers.cancel(router_id, subnet_id);
            self.unbind_lla(link.as_ref(), pdo).await?;
        }
        pdo.set_mac(mac);

        match link {
            Some(link) => {
                self.bind_lla(probers, router_id, subnet_id, &link, pdo)
                    .await
            }
            None => Ok(()),
        }
    }

    /// Unbinds the address, stops the client and forgets the delegation,
    /// reporting the subnet's prefix as unassigned.
    ///
    /// The delegation is kept if the teardown fails so the call can be
    /// retried.
    #[instrument(skip(self))]
    pub async fn disable_subnet(&self, router_id: &str, subnet_id: &str) -> CfgMgrResult<()> {
        let mut state = self.state.lock().await;
        let PdState { routers, probers } = &mut *state;
        let Some(router) = routers.get_mut(router_id) else {
            debug!("Unknown router");
            return Ok(());
        };
        let link = router.link();
        let namespace = router.namespace.clone();
        let Some(pdo) = router.subnets.get_mut(subnet_id) else {
            debug!("Subnet has no delegation");
            return Ok(());
        };

        probers.cancel(router_id, subnet_id);
        self.delete_pd(link.as_ref(), namespace.as_deref(), pdo)
            .await?;
        router.subnets.remove(subnet_id);
        info!("Disabled PD for subnet");

        let mut update = PrefixUpdate::new();
        update.insert(subnet_id.to_string(), UNASSIGNED_PREFIX.to_string());
        self.notify(update).await
    }

    /// Records `prefix` as the last communicated prefix of the subnet.
    ///
    /// Returns the previously recorded prefix when it differs from `prefix`.
    #[instrument(skip(self))]
    pub async fn update_subnet(
        &self,
        router_id: &str,
        subnet_id: &str,
        prefix: &str,
    ) -> Option<String> {
        let mut state = self.state.lock().await;
        let pdo = state
            .routers
            .get_mut(router_id)?
            .subnets
            .get_mut(subnet_id)?;

        if pdo.old_prefix.as_deref() == Some(prefix) {
            return None;
        }
        debug!(old = ?pdo.old_prefix, "Subnet prefix changed");
        pdo.old_prefix.replace(prefix.to_string())
    }

    /// Disables the delegation bound to internal interface `ifname`, if any.
    #[instrument(skip(self))]
    pub async fn remove_stale_router_interface(
        &self,
        router_id: &str,
        ifname: &str,
    ) -> CfgMgrResult<()> {
        let mut state = self.state.lock().await;
        let PdState { routers, probers } = &mut *state;
        let Some(router) = routers.get_mut(router_id) else {
            return Ok(());
        };
        let link = router.link();
        let namespace = router.namespace.clone();
        let Some((subnet_id, pdo)) = router
            .subnets
            .iter_mut()
            .find(|(_, pdo)| pdo.ri_ifname() == ifname)
        else {
            debug!("No delegation on interface");
            return Ok(());
        };
        let subnet_id = subnet_id.clone();

        probers.cancel(router_id, &subnet_id);
        self.delete_pd(link.as_ref(), namespace.as_deref(), pdo)
            .await?;
        router.subnets.remove(&subnet_id);
        info!(subnet_id = %subnet_id, "Removed stale router interface");
        Ok(())
    }

    /// Tears down the router's delegations if it has no gateway.
    #[instrument(skip(self))]
    pub async fn sync_router(&self, router_id: &str) -> CfgMgrResult<()> {
        let mut state = self.state.lock().await;
        let PdState { routers, probers } = &mut *state;
        let Some(router) = routers.get_mut(router_id) else {
            return Ok(());
        };
        if router.gw_interface.is_some() {
            return Ok(());
        }
        probers.cancel_router(router_id);
        self.teardown(router_id, router, None).await
    }

    /// Advances every delegation of every router with a gateway: polls the
    /// prefixes of running clients and starts clients whose address has
    /// become usable. Changed prefixes go out in one notification.
    ///
    /// Failures are logged, the sweep continues, and the first error is
    /// returned.
    pub async fn run_pd_client(&self) -> CfgMgrResult<()> {
        debug!("Starting run_pd_client");
        let mut state = self.state.lock().await;
        let PdState { routers, probers } = &mut *state;
        probers.reap_finished();

        let mut update = PrefixUpdate::new();
        let mut first_err = None;
        for (router_id, router) in routers.iter_mut() {
            let Some(link) = router.link() else {
                continue;
            };

            // Queried at most once per router per tick
            let mut llas: Option<Vec<Ipv6AddressEntry>> = None;
            let mut listing_failed = false;
            for (subnet_id, pdo) in router.subnets.iter_mut() {
                if pdo.client_started {
                    let prefix = self.client.get_prefix(&pdo.requestor);
                    if prefix != pdo.prefix {
                        info!(router_id = %router_id, subnet_id = %subnet_id, prefix = %prefix, "Learned new prefix");
                        pdo.prefix = prefix.clone();
                        update.insert(subnet_id.clone(), prefix);
                    }
                    continue;
                }

                let (Some(lla), Some(lla_with_mask)) = (pdo.bound_lla(), pdo.bound_lla_with_mask())
                else {
                    continue;
                };

                if listing_failed {
                    continue;
                }
                if llas.is_none() {
                    match self
                        .driver
                        .list_v6_addresses(&link.gw_interface, link.namespace())
                        .await
                    {
                        Ok(entries) => llas = Some(entries),
                        Err(e) => {
                            if e.is_not_found() {
                                debug!(router_id = %router_id, error = %e, "Gateway interface gone");
                            } else {
                                keep_first(&mut first_err, Err(e));
                            }
                            listing_failed = true;
                            continue;
                        }
                    }
                }
                let Some(entries) = llas.as_deref() else {
                    continue;
                };
                if !is_lla_active(&lla_with_mask, entries) {
                    continue;
                }

                pdo.lla = LlaBinding::Confirmed;
                let started = self
                    .client
                    .start(&pdo.requestor, link.namespace(), &link.gw_interface, lla)
                    .await;
                match started {
                    Ok(()) => {
                        pdo.client_started = true;
                        probers.cancel(router_id, subnet_id);
                        info!(requestor = %pdo.requestor, "PD client started");
                    }
                    Err(e) => keep_first(&mut first_err, Err(e)),
                }
            }
        }

        keep_first(&mut first_err, self.notify(update).await);
        into_result(first_err)
    }

    /// Requests an immediate `run_pd_client` from the driver loop.
    pub fn on_restart_signal(&self) {
        debug!("Restart signal received");
        self.waker.wake();
    }

    /// Returns a copy of the delegation for (router, subnet).
    pub async fn delegation(&self, router_id: &str, subnet_id: &str) -> Option<Delegation> {
        let state = self.state.lock().await;
        state.routers.get(router_id)?.subnets.get(subnet_id).cloned()
    }

    pub async fn delegation_state(
        &self,
        router_id: &str,
        subnet_id: &str,
    ) -> Option<DelegationState> {
        self.delegation(router_id, subnet_id)
            .await
            .map(|pdo| pdo.state())
    }

    /// Known router ids, sorted.
    pub async fn router_ids(&self) -> Vec<String> {
        let state = self.state.lock().await;
        let mut ids: Vec<String> = state.routers.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub async fn gateway_interface(&self, router_id: &str) -> Option<String> {
        let state = self.state.lock().await;
        state.routers.get(router_id)?.gw_interface.clone()
    }

    pub async fn namespace(&self, router_id: &str) -> Option<String> {
        let state = self.state.lock().await;
        state.routers.get(router_id)?.namespace.clone()
    }

    /// Subnet ids with a delegation under `router_id`, sorted.
    pub async fn subnet_ids(&self, router_id: &str) -> Vec<String> {
        let state = self.state.lock().await;
        let mut ids: Vec<String> = state
            .routers
            .get(router_id)
            .map(|router| router.subnets.keys().cloned().collect())
            .unwrap_or_default();
        ids.sort();
        ids
    }

    /// Number of probers still running.
    pub async fn pending_probers(&self) -> usize {
        let mut state = self.state.lock().await;
        state.probers.reap_finished();
        state.probers.len()
    }

    /// Adds the delegation's address to the gateway and starts a prober.
    async fn bind_lla(
        &self,
        probers: &mut ProberSet,
        router_id: &str,
        subnet_id: &str,
        link: &RouterLink,
        pdo: &mut Delegation,
    ) -> CfgMgrResult<()> {
        let Some(lla_with_mask) = pdo.bound_lla_with_mask() else {
            return Ok(());
        };
        self.driver
            .add_v6_address(&link.gw_interface, &lla_with_mask, link.namespace())
            .await?;
        if pdo.lla != LlaBinding::Confirmed {
            pdo.lla = LlaBinding::Binding;
        }
        debug!(lla = %lla_with_mask, interface = %link.gw_interface, "Bound LLA");

        let handle = ProberHandle::spawn(
            self.driver.clone(),
            self.waker.clone(),
            self.prober_config,
            link.gw_interface.clone(),
            link.namespace.clone(),
            lla_with_mask,
        );
        probers.insert(router_id, subnet_id, handle);
        Ok(())
    }

    /// Removes the delegation's address from the gateway, ignoring an
    /// address or interface that is already gone.
    async fn unbind_lla(&self, link: Option<&RouterLink>, pdo: &mut Delegation) -> CfgMgrResult<()> {
        pdo.lla = LlaBinding::Unbound;
        let (Some(link), Some(lla_with_mask)) = (link, pdo.bound_lla_with_mask()) else {
            return Ok(());
        };
        match self
            .driver
            .delete_v6_address(&link.gw_interface, &lla_with_mask, link.namespace())
            .await
        {
            Ok(()) => Ok(()),
            Err(e) if e.is_not_found() => {
                debug!(lla = %lla_with_mask, error = %e, "LLA already gone");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Unbinds the address and stops the client of one delegation.
    async fn delete_pd(
        &self,
        link: Option<&RouterLink>,
        namespace: Option<&str>,
        pdo: &mut Delegation,
    ) -> CfgMgrResult<()> {
        let mut first_err = None;
        keep_first(&mut first_err, self.unbind_lla(link, pdo).await);
        if pdo.client_started {
            let stopped = self.client.stop(&pdo.requestor, namespace).await;
            if stopped.is_ok() {
                pdo.client_started = false;
            }
            keep_first(&mut first_err, stopped);
        }
        into_result(first_err)
    }

    /// Unbinds every address of the router and stops its clients, reporting
    /// the stopped subnets as unassigned.
    async fn teardown(
        &self,
        router_id: &str,
        router: &mut Router,
        link: Option<&RouterLink>,
    ) -> CfgMgrResult<()> {
        let namespace = router.namespace.clone();
        let mut update = PrefixUpdate::new();
        let mut first_err = None;

        for (subnet_id, pdo) in router.subnets.iter_mut() {
            keep_first(&mut first_err, self.unbind_lla(link, pdo).await);
            if !pdo.client_started {
                continue;
            }
            match self.client.stop(&pdo.requestor, namespace.as_deref()).await {
                Ok(()) => {
                    pdo.client_started = false;
                    pdo.prefix = UNASSIGNED_PREFIX.to_string();
                    update.insert(subnet_id.clone(), UNASSIGNED_PREFIX.to_string());
                }
                Err(e) => keep_first(&mut first_err, Err(e)),
            }
        }

        debug!(router_id, stopped = update.len(), "Router PD torn down");
        keep_first(&mut first_err, self.notify(update).await);
        into_result(first_err)
    }

    async fn notify(&self, update: PrefixUpdate) -> CfgMgrResult<()> {
        if update.is_empty() {
            return Ok(());
        }
        debug!(?update, "Update server with prefixes");
        self.notifier.send_prefix_update(update).await
    }
}
