//! Address readiness prober.
//!
//! After a link-local address is added to a gateway interface the kernel
//! keeps it tentative until duplicate-address detection completes. A prober
//! polls the interface until the address is usable, then wakes the driver
//! loop so `run_pd_client` can start the PD client. Probers never touch
//! coordinator state.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::interface::InterfaceDriver;
use crate::types::Ipv6AddressEntry;

/// Single-slot wake-up for the driver loop. Wake-ups that arrive while
/// one is already pending coalesce into a single extra tick.
#[derive(Debug, Clone, Default)]
pub struct PdWaker(Arc<Notify>);

impl PdWaker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn wake(&self) {
        self.0.notify_one();
    }

    /// Completes once a wake-up is pending, consuming it.
    pub async fn woken(&self) {
        self.0.notified().await;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProberConfig {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl Default for ProberConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(2),
            max_attempts: 20,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// The address is present and no longer tentative.
    Ready,
    /// Listing addresses failed, usually because the interface is gone.
    InterfaceGone,
    Cancelled,
    /// Still tentative (or absent) after every attempt.
    Exhausted,
}

/// True if `lla_with_mask` is listed and not tentative.
pub fn is_lla_active(lla_with_mask: &str, entries: &[Ipv6AddressEntry]) -> bool {
    entries
        .iter()
        .find(|entry| entry.cidr == lla_with_mask)
        .is_some_and(|entry| !entry.is_tentative())
}

/// Polls `gw_ifname` until `lla_with_mask` is usable.
pub async fn probe_lla(
    driver: &dyn InterfaceDriver,
    gw_ifname: &str,
    namespace: Option<&str>,
    lla_with_mask: &str,
    config: ProberConfig,
    token: &CancellationToken,
) -> ProbeOutcome {
    for attempt in 1..=config.max_attempts {
        let listed = tokio::select! {
            biased;
            _ = token.cancelled() => return ProbeOutcome::Cancelled,
            listed = driver.list_v6_addresses(gw_ifname, namespace) => listed,
        };
        match listed {
            Ok(entries) if is_lla_active(lla_with_mask, &entries) => {
                debug!(lla = lla_with_mask, attempt, "LLA is active now");
                return ProbeOutcome::Ready;
            }
            Ok(_) => {}
            Err(e) => {
                debug!(interface = gw_ifname, error = %e, "Stopped probing LLA");
                return ProbeOutcome::InterfaceGone;
            }
        }

        if attempt < config.max_attempts {
            tokio::select! {
                biased;
                _ = token.cancelled() => return ProbeOutcome::Cancelled,
                _ = tokio::time::sleep(config.interval) => {}
            }
        }
    }

    warn!(
        interface = gw_ifname,
        lla = lla_with_mask,
        attempts = config.max_attempts,
        "LLA still not active, giving up; check for a duplicate address on the external network"
    );
    ProbeOutcome::Exhausted
}

/// A running prober. Dropping the handle cancels the task.
#[derive(Debug)]
pub struct ProberHandle {
    token: CancellationToken,
    task: JoinHandle<ProbeOutcome>,
}

impl ProberHandle {
    /// Spawns a prober that wakes `waker` once the address is usable.
    pub fn spawn(
        driver: Arc<dyn InterfaceDriver>,
        waker: PdWaker,
        config: ProberConfig,
        gw_ifname: String,
        namespace: Option<String>,
        lla_with_mask: String,
    ) -> Self {
        let token = CancellationToken::new();
        let child = token.clone();
        let task = tokio::spawn(async move {
            let outcome = probe_lla(
                driver.as_ref(),
                &gw_ifname,
                namespace.as_deref(),
                &lla_with_mask,
                config,
                &child,
            )
            .await;
            if outcome == ProbeOutcome::Ready {
                waker.wake();
            }
            outcome
        });
        Self { token, task }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Waits for the prober to finish.
    pub async fn join(mut self) -> Option<ProbeOutcome> {
        (&mut self.task).await.ok()
    }
}

impl Drop for ProberHandle {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

/// Outstanding probers keyed by (router id, subnet id).
#[derive(Debug, Default)]
pub struct ProberSet {
    probers: HashMap<(String, String), ProberHandle>,
}

impl ProberSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tracks `handle`, cancelling any prober already running for the pair.
    pub fn insert(&mut self, router_id: &str, subnet_id: &str, handle: ProberHandle) {
        self.probers
            .insert((router_id.to_string(), subnet_id.to_string()), handle);
    }

    pub fn cancel(&mut self, router_id: &str, subnet_id: &str) {
        self.probers
            .remove(&(router_id.to_string(), subnet_id.to_string()));
    }

    pub fn cancel_router(&mut self, router_id: &str) {
        self.probers.retain(|(router, _), _| router != router_id);
    }

    /// Forgets probers whose task has completed.
    pub fn reap_finished(&mut self) {
        self.probers.retain(|_, handle| !handle.is_finished());
    }

    pub fn len(&self) -> usize {
        self.probers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.probers.is_empty()
    }

    pub fn contains(&self, router_id: &str, subnet_id: &str) -> bool {
        self.probers
            .contains_key(&(router_id.to_string(), subnet_id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use sonic_cfgmgr_common::{CfgMgrError, CfgMgrResult};

    const LLA: &str = "fe80::fb16:3eff:fe12:3456/64";

    /// Reports the address tentative for the first `tentative_polls` polls.
    struct DadDriver {
        tentative_polls: u32,
        polls: Mutex<u32>,
        gone: bool,
    }

    impl DadDriver {
        fn new(tentative_polls: u32) -> Self {
            Self {
                tentative_polls,
                polls: Mutex::new(0),
                gone: false,
            }
        }

        fn polls(&self) -> u32 {
            *self.polls.lock()
        }
    }

    #[async_trait]
    impl InterfaceDriver for DadDriver {
        async fn add_v6_address(&self, _: &str, _: &str, _: Option<&str>) -> CfgMgrResult<()> {
            Ok(())
        }

        async fn delete_v6_address(&self, _: &str, _: &str, _: Option<&str>) -> CfgMgrResult<()> {
            Ok(())
        }

        async fn list_v6_addresses(
            &self,
            interface: &str,
            _: Option<&str>,
        ) -> CfgMgrResult<Vec<Ipv6AddressEntry>> {
            if self.gone {
                return Err(CfgMgrError::interface_not_found(interface));
            }
            let mut polls = self.polls.lock();
            *polls += 1;
            let flags: &[&str] = if *polls <= self.tentative_polls {
                &["scope", "link", "tentative"]
            } else {
                &["scope", "link"]
            };
            Ok(vec![Ipv6AddressEntry::new(LLA, flags)])
        }
    }

    fn fast() -> ProberConfig {
        ProberConfig {
            interval: Duration::from_millis(10),
            max_attempts: 5,
        }
    }

    #[test]
    fn test_is_lla_active() {
        let entries = vec![
            Ipv6AddressEntry::new("fe80::1/64", &["scope", "link"]),
            Ipv6AddressEntry::new(LLA, &["scope", "link", "tentative"]),
        ];
        assert!(is_lla_active("fe80::1/64", &entries));
        assert!(!is_lla_active(LLA, &entries));
        assert!(!is_lla_active("fe80::2/64", &entries));
        assert!(!is_lla_active(LLA, &[]));
    }

    #[tokio::test]
    async fn test_probe_ready_after_dad() {
        let driver = DadDriver::new(2);
        let token = CancellationToken::new();
        let outcome = probe_lla(&driver, "qg-1", None, LLA, fast(), &token).await;
        assert_eq!(outcome, ProbeOutcome::Ready);
        assert_eq!(driver.polls(), 3);
    }

    #[tokio::test]
    async fn test_probe_exhausted() {
        let driver = DadDriver::new(u32::MAX);
        let token = CancellationToken::new();
        let outcome = probe_lla(&driver, "qg-1", None, LLA, fast(), &token).await;
        assert_eq!(outcome, ProbeOutcome::Exhausted);
        assert_eq!(driver.polls(), 5);
    }

    #[tokio::test]
    async fn test_probe_interface_gone() {
        let mut driver = DadDriver::new(0);
        driver.gone = true;
        let token = CancellationToken::new();
        let outcome = probe_lla(&driver, "qg-1", None, LLA, fast(), &token).await;
        assert_eq!(outcome, ProbeOutcome::InterfaceGone);
    }

    #[tokio::test]
    async fn test_probe_cancelled() {
        let driver = DadDriver::new(u32::MAX);
        let token = CancellationToken::new();
        token.cancel();
        let outcome = probe_lla(&driver, "qg-1", None, LLA, fast(), &token).await;
        assert_eq!(outcome, ProbeOutcome::Cancelled);
    }

    #[tokio::test]
    async fn test_spawned_prober_wakes() {
        let waker = PdWaker::new();
        let handle = ProberHandle::spawn(
            Arc::new(DadDriver::new(1)),
            waker.clone(),
            fast(),
            "qg-1".to_string(),
            None,
            LLA.to_string(),
        );
        assert_eq!(handle.join().await, Some(ProbeOutcome::Ready));
        tokio::time::timeout(Duration::from_secs(1), waker.woken())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_waker_coalesces() {
        let waker = PdWaker::new();
        waker.wake();
        waker.wake();
        waker.woken().await;
        let second = tokio::time::timeout(Duration::from_millis(20), waker.woken()).await;
        assert!(second.is_err());
    }

    #[tokio::test]
    async fn test_prober_set_cancel() {
        let driver: Arc<dyn InterfaceDriver> = Arc::new(DadDriver::new(u32::MAX));
        let slow = ProberConfig {
            interval: Duration::from_secs(60),
            max_attempts: 20,
        };
        let spawn = || {
            ProberHandle::spawn(
                driver.clone(),
                PdWaker::new(),
                slow,
                "qg-1".to_string(),
                None,
                LLA.to_string(),
            )
        };

        let mut set = ProberSet::new();
        set.insert("r1", "s1", spawn());
        set.insert("r1", "s2", spawn());
        set.insert("r2", "s3", spawn());
        set.insert("r1", "s1", spawn());
        assert_eq!(set.len(), 3);

        set.cancel("r1", "s2");
        assert!(!set.contains("r1", "s2"));

        set.cancel_router("r1");
        assert_eq!(set.len(), 1);
        assert!(set.contains("r2", "s3"));
    }

    #[tokio::test]
    async fn test_cancelled_handle() {
        let handle = ProberHandle::spawn(
            Arc::new(DadDriver::new(u32::MAX)),
            PdWaker::new(),
            ProberConfig {
                interval: Duration::from_secs(60),
                max_attempts: 20,
            },
            "qg-1".to_string(),
            None,
            LLA.to_string(),
        );
        handle.cancel();
        assert_eq!(handle.join().await, Some(ProbeOutcome::Cancelled));
    }

    #[tokio::test]
    async fn test_reap_finished() {
        let mut set = ProberSet::new();
        let handle = ProberHandle::spawn(
            Arc::new(DadDriver::new(0)),
            PdWaker::new(),
            fast(),
            "qg-1".to_string(),
            None,
            LLA.to_string(),
        );
        set.insert("r1", "s1", handle);
        tokio::time::sleep(Duration::from_millis(50)).await;
        set.reap_finished();
        assert!(set.is_empty());
    }
}
