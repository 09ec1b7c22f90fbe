//! Shared fakes for pdmgrd integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use sonic_cfgmgr_common::{CfgMgrError, CfgMgrResult};
use sonic_pdmgrd::{
    is_pid_alive, pid_from_file, DibblerClient, DibblerSettings, InterfaceDriver,
    Ipv6AddressEntry, PdMgr, PdWaker, PrefixNotifier, PrefixUpdate, ProberConfig, ProcessSpec,
    ProcessSupervisor, RequestorId,
};
use tempfile::TempDir;

pub const NS: &str = "qrouter-r1";
pub const GW: &str = "qg-1";
pub const MAC1: &str = "fa:16:3e:12:34:56";
pub const MAC2: &str = "fa:16:3e:ab:cd:ef";
pub const LLA1: &str = "fe80::fb16:3eff:fe12:3456/64";

/// In-memory interface table. New addresses start tentative while
/// `dad_pending` is set.
#[derive(Default)]
pub struct FakeDriver {
    interfaces: Mutex<HashMap<String, Vec<Ipv6AddressEntry>>>,
    dad_pending: Mutex<bool>,
    calls: Mutex<Vec<String>>,
}

impl FakeDriver {
    pub fn with_interfaces(names: &[&str]) -> Self {
        let driver = Self::default();
        for name in names {
            driver
                .interfaces
                .lock()
                .insert(name.to_string(), Vec::new());
        }
        driver
    }

    pub fn set_dad_pending(&self, pending: bool) {
        *self.dad_pending.lock() = pending;
    }

    /// Completes DAD for every address.
    pub fn confirm_all(&self) {
        for entries in self.interfaces.lock().values_mut() {
            for entry in entries.iter_mut() {
                entry.flags.retain(|f| f != "tentative");
            }
        }
    }

    pub fn remove_interface(&self, name: &str) {
        self.interfaces.lock().remove(name);
    }

    pub fn addresses(&self, interface: &str) -> Vec<String> {
        self.interfaces
            .lock()
            .get(interface)
            .map(|entries| entries.iter().map(|e| e.cidr.clone()).collect())
            .unwrap_or_default()
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn count_calls(&self, prefix: &str) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }
}

#[async_trait]
impl InterfaceDriver for FakeDriver {
    async fn add_v6_address(
        &self,
        interface: &str,
        cidr: &str,
        namespace: Option<&str>,
    ) -> CfgMgrResult<()> {
        self.calls
            .lock()
            .push(format!("add {} {} {:?}", interface, cidr, namespace));
        let tentative = *self.dad_pending.lock();
        let mut interfaces = self.interfaces.lock();
        let entries = interfaces
            .get_mut(interface)
            .ok_or_else(|| CfgMgrError::interface_not_found(interface))?;
        if !entries.iter().any(|e| e.cidr == cidr) {
            let flags: &[&str] = if tentative {
                &["scope", "link", "tentative"]
            } else {
                &["scope", "link"]
            };
            entries.push(Ipv6AddressEntry::new(cidr, flags));
        }
        Ok(())
    }

    async fn delete_v6_address(
        &self,
        interface: &str,
        cidr: &str,
        namespace: Option<&str>,
    ) -> CfgMgrResult<()> {
        self.calls
            .lock()
            .push(format!("del {} {} {:?}", interface, cidr, namespace));
        let mut interfaces = self.interfaces.lock();
        let entries = interfaces
            .get_mut(interface)
            .ok_or_else(|| CfgMgrError::interface_not_found(interface))?;
        let before = entries.len();
        entries.retain(|e| e.cidr != cidr);
        if entries.len() == before {
            return Err(CfgMgrError::address_not_found(interface, cidr));
        }
        Ok(())
    }

    async fn list_v6_addresses(
        &self,
        interface: &str,
        namespace: Option<&str>,
    ) -> CfgMgrResult<Vec<Ipv6AddressEntry>> {
        self.calls
            .lock()
            .push(format!("list {} {:?}", interface, namespace));
        self.interfaces
            .lock()
            .get(interface)
            .cloned()
            .ok_or_else(|| CfgMgrError::interface_not_found(interface))
    }
}

/// Supervisor that "starts" a process by recording the test's own pid.
#[derive(Default)]
pub struct FakeSupervisor {
    calls: Mutex<Vec<String>>,
    fail_enable: Mutex<bool>,
}

impl FakeSupervisor {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn count_calls(&self, prefix: &str) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }

    pub fn set_fail_enable(&self, fail: bool) {
        *self.fail_enable.lock() = fail;
    }
}

#[async_trait]
impl ProcessSupervisor for FakeSupervisor {
    async fn enable(&self, spec: &ProcessSpec) -> CfgMgrResult<()> {
        self.calls.lock().push(format!("enable {}", spec.uuid));
        if *self.fail_enable.lock() {
            return Err(CfgMgrError::process(&spec.service, &spec.uuid, "spawn failed"));
        }
        fs::write(&spec.pid_file, std::process::id().to_string())
            .map_err(|e| CfgMgrError::file(&spec.pid_file, e))
    }

    async fn disable(&self, spec: &ProcessSpec) -> CfgMgrResult<()> {
        self.calls.lock().push(format!("disable {}", spec.uuid));
        let _ = fs::remove_file(&spec.pid_file);
        Ok(())
    }

    fn is_active(&self, pid_file: &Path) -> bool {
        pid_from_file(pid_file).is_some_and(is_pid_alive)
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    updates: Mutex<Vec<PrefixUpdate>>,
}

impl RecordingNotifier {
    pub fn updates(&self) -> Vec<PrefixUpdate> {
        self.updates.lock().clone()
    }
}

#[async_trait]
impl PrefixNotifier for RecordingNotifier {
    async fn send_prefix_update(&self, update: PrefixUpdate) -> CfgMgrResult<()> {
        self.updates.lock().push(update);
        Ok(())
    }
}

pub fn update(pairs: &[(&str, &str)]) -> PrefixUpdate {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

pub fn fast_prober() -> ProberConfig {
    ProberConfig {
        interval: Duration::from_millis(10),
        max_attempts: 5,
    }
}

/// A coordinator wired to fakes over a temporary working area.
pub struct Harness {
    pub area: TempDir,
    pub driver: Arc<FakeDriver>,
    pub supervisor: Arc<FakeSupervisor>,
    pub client: Arc<DibblerClient>,
    pub notifier: Arc<RecordingNotifier>,
    pub waker: PdWaker,
    pub mgr: Arc<PdMgr>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_area(TempDir::new().unwrap())
    }

    /// Builds the coordinator over an existing working area, as after a
    /// restart.
    pub fn with_area(area: TempDir) -> Self {
        let driver = Arc::new(FakeDriver::with_interfaces(&[GW]));
        let supervisor = Arc::new(FakeSupervisor::default());
        let settings = DibblerSettings {
            pd_confs: area.path().to_path_buf(),
            vrpen: "8888".to_string(),
            client_binary: "dibbler-client".to_string(),
            notify_binary: "pd-notify".to_string(),
            service_name: "dibbler".to_string(),
            agent_pid: std::process::id(),
        };
        let client = Arc::new(DibblerClient::new(settings, supervisor.clone()));
        let notifier = Arc::new(RecordingNotifier::default());
        let waker = PdWaker::new();
        let mgr = Arc::new(PdMgr::new(
            driver.clone(),
            client.clone(),
            notifier.clone(),
            waker.clone(),
            fast_prober(),
        ));
        Self {
            area,
            driver,
            supervisor,
            client,
            notifier,
            waker,
            mgr,
        }
    }

    pub fn requestor(&self, router_id: &str, subnet_id: &str, ri_ifname: &str) -> RequestorId {
        RequestorId::new(router_id, subnet_id, ri_ifname).unwrap()
    }

    pub fn working_dir(&self, router_id: &str, subnet_id: &str, ri_ifname: &str) -> PathBuf {
        self.client
            .working_dir(&self.requestor(router_id, subnet_id, ri_ifname))
    }

    /// Router `r1` with gateway `qg-1` and an enabled subnet `s1` on `qr-1`.
    pub async fn with_subnet(&self) {
        self.mgr.add_router("r1", Some(NS.to_string())).await;
        self.mgr.add_gateway("r1", GW).await.unwrap();
        self.mgr
            .enable_subnet("r1", "s1", "::/64", "qr-1", MAC1)
            .await
            .unwrap();
    }
}

/// Leaves a working directory behind as a previous run would have.
pub fn seed_requestor(area: &Path, requestor: &str, prefix: Option<&str>, running: bool) {
    let dir = area.join(requestor);
    fs::create_dir_all(&dir).unwrap();
    if let Some(prefix) = prefix {
        fs::write(dir.join("prefix"), prefix).unwrap();
    }
    if running {
        fs::write(dir.join("client.pid"), std::process::id().to_string()).unwrap();
    }
}
