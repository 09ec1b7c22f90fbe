//! Supervision of external PD client processes.
//!
//! A process is identified by a uuid and tracked through its pidfile.
//! [`ExternalProcessManager`] starts and stops processes with their own
//! commands, keeps a registry of enabled processes, and respawns the ones
//! found dead by [`run_process_monitor`].

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use parking_lot::Mutex;
use sonic_cfgmgr_common::files::read_value;
use sonic_cfgmgr_common::shell::{self, join_quoted};
use sonic_cfgmgr_common::{CfgMgrError, CfgMgrResult};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Everything needed to start, stop and check one supervised process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessSpec {
    pub uuid: String,
    pub service: String,
    pub namespace: Option<String>,
    pub pid_file: PathBuf,
    /// Launch command, run inside `namespace`.
    pub start_cmd: Vec<String>,
    /// Stop command; without one the process is sent SIGTERM.
    pub stop_cmd: Option<Vec<String>>,
}

/// Process supervision service.
#[async_trait]
pub trait ProcessSupervisor: Send + Sync {
    /// Starts the process unless its pidfile already names a live one.
    async fn enable(&self, spec: &ProcessSpec) -> CfgMgrResult<()>;

    /// Forgets the process and stops it if its pidfile names a live one.
    async fn disable(&self, spec: &ProcessSpec) -> CfgMgrResult<()>;

    fn is_active(&self, pid_file: &Path) -> bool;
}

/// Reads the pid recorded in `pid_file`.
pub fn pid_from_file(pid_file: &Path) -> Option<i32> {
    read_value(pid_file).ok().flatten()?.parse().ok()
}

pub fn is_pid_alive(pid: i32) -> bool {
    pid > 0 && Path::new("/proc").join(pid.to_string()).exists()
}

#[derive(Debug, Default)]
pub struct ExternalProcessManager {
    registry: Mutex<HashMap<String, ProcessSpec>>,
}

impl ExternalProcessManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Uuids of the currently registered processes.
    pub fn registered(&self) -> Vec<String> {
        let mut uuids: Vec<String> = self.registry.lock().keys().cloned().collect();
        uuids.sort();
        uuids
    }

    async fn run(spec: &ProcessSpec, argv: &[String]) -> CfgMgrResult<()> {
        let cmd = join_quoted(argv);
        let result = shell::exec_in_netns(spec.namespace.as_deref(), &cmd).await?;
        if result.success() {
            Ok(())
        } else {
            Err(CfgMgrError::process(
                &spec.service,
                &spec.uuid,
                format!(
                    "'{}' exited with {}: {}",
                    cmd,
                    result.exit_code,
                    result.combined_output()
                ),
            ))
        }
    }

    /// Restarts every registered process whose pidfile no longer names a
    /// live process. Returns the number of processes restarted.
    pub async fn respawn_dead(&self) -> usize {
        let dead: Vec<ProcessSpec> = self
            .registry
            .lock()
            .values()
            .filter(|spec| !self.is_active(&spec.pid_file))
            .cloned()
            .collect();

        let mut respawned = 0;
        for spec in dead {
            warn!(service = %spec.service, uuid = %spec.uuid, "Process is dead, respawning");
            match Self::run(&spec, &spec.start_cmd).await {
                Ok(()) => respawned += 1,
                Err(e) => warn!(uuid = %spec.uuid, error = %e, "Respawn failed"),
            }
        }
        respawned
    }
}

#[async_trait]
impl ProcessSupervisor for ExternalProcessManager {
    #[instrument(skip(self, spec), fields(service = %spec.service, uuid = %spec.uuid))]
    async fn enable(&self, spec: &ProcessSpec) -> CfgMgrResult<()> {
        if self.is_active(&spec.pid_file) {
            debug!("Process already running");
        } else {
            Self::run(spec, &spec.start_cmd).await?;
            info!("Process started");
        }
        self.registry.lock().insert(spec.uuid.clone(), spec.clone());
        Ok(())
    }

    #[instrument(skip(self, spec), fields(service = %spec.service, uuid = %spec.uuid))]
    async fn disable(&self, spec: &ProcessSpec) -> CfgMgrResult<()> {
        self.registry.lock().remove(&spec.uuid);

        let pid = match pid_from_file(&spec.pid_file) {
            Some(pid) if is_pid_alive(pid) => pid,
            Some(pid) => {
                debug!(pid, "Process is stale, nothing to stop");
                return Ok(());
            }
            None => {
                debug!("No process started");
                return Ok(());
            }
        };

        match &spec.stop_cmd {
            Some(stop_cmd) => Self::run(spec, stop_cmd).await?,
            None => signal::kill(Pid::from_raw(pid), Signal::SIGTERM).map_err(|e| {
                CfgMgrError::process(&spec.service, &spec.uuid, format!("kill {}: {}", pid, e))
            })?,
        }
        info!(pid, "Process stopped");
        Ok(())
    }

    fn is_active(&self, pid_file: &Path) -> bool {
        pid_from_file(pid_file).is_some_and(is_pid_alive)
    }
}

/// Periodically respawns dead supervised processes until `shutdown` fires.
pub async fn run_process_monitor(
    manager: Arc<ExternalProcessManager>,
    interval: Duration,
    shutdown: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // The first tick completes immediately
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {
                let respawned = manager.respawn_dead().await;
                if respawned > 0 {
                    info!(respawned, "Process monitor respawned processes");
                }
            }
        }
    }
    debug!("Process monitor stopped");
}
