//! Dibbler-backed PD client adapter.
//!
//! Each requestor gets a working directory `<pd_confs>/<requestor>` holding
//! the generated `client.conf`, the `notify.sh` hook the client runs on lease
//! events, the learned `prefix` and the client's `client.pid`.

use std::fs;
use std::io;
use std::net::Ipv6Addr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use sonic_cfgmgr_common::files::{read_value, replace_file, DEFAULT_FILE_MODE};
use sonic_cfgmgr_common::{CfgMgrError, CfgMgrResult};
use tracing::{debug, instrument, warn};

use crate::config::PdConfig;
use crate::process::{ProcessSpec, ProcessSupervisor};
use crate::requestor::RequestorId;
use crate::types::UNASSIGNED_PREFIX;

const CLIENT_CONF: &str = "client.conf";
const NOTIFY_SCRIPT: &str = "notify.sh";
const PREFIX_FILE: &str = "prefix";
const PID_FILE: &str = "client.pid";

/// The hook must be executable by the client.
const NOTIFY_SCRIPT_MODE: u32 = 0o744;

/// Boundary to the external PD client.
#[async_trait]
pub trait PdClient: Send + Sync {
    /// True if the client for `id` is alive.
    fn is_running(&self, id: &RequestorId) -> bool;

    /// Generates the client's artifacts and launches it bound to `lla` on
    /// `gw_ifname`. Does nothing if the client is already running.
    async fn start(
        &self,
        id: &RequestorId,
        namespace: Option<&str>,
        gw_ifname: &str,
        lla: Ipv6Addr,
    ) -> CfgMgrResult<()>;

    /// Stops the client and removes its working directory.
    async fn stop(&self, id: &RequestorId, namespace: Option<&str>) -> CfgMgrResult<()>;

    /// Last learned prefix, or [`UNASSIGNED_PREFIX`].
    fn get_prefix(&self, id: &RequestorId) -> String;

    /// Raw working-directory names under the working area, sorted.
    fn list_known_requestors(&self) -> Vec<String>;
}

#[derive(Debug, Clone)]
pub struct DibblerSettings {
    pub pd_confs: PathBuf,
    pub vrpen: String,
    pub client_binary: String,
    pub notify_binary: String,
    pub service_name: String,
    /// Pid the notifier script signals.
    pub agent_pid: u32,
}

impl DibblerSettings {
    pub fn from_config(config: &PdConfig, agent_pid: u32) -> Self {
        Self {
            pd_confs: config.pd_confs.clone(),
            vrpen: config.vrpen.clone(),
            client_binary: config.client_binary.clone(),
            notify_binary: config.notify_binary.clone(),
            service_name: config.service_name.clone(),
            agent_pid,
        }
    }
}

/// Renders the dibbler-client configuration.
pub fn render_client_conf(
    vrpen: &str,
    subnet_id: &str,
    working_dir: &Path,
    gw_ifname: &str,
    lla: Ipv6Addr,
) -> String {
    let va_id: String = subnet_id.chars().filter(|c| *c != '-').collect();
    format!(
        r#"
# Config for dibbler-client.

# Use enterprise number based duid
duid-type duid-en {vrpen} 0x{va_id}

# 8 (Debug) is most verbose. 7 (Info) is usually the best option
log-level 8

# No automatic downlink address assignment
downlink-prefix-ifaces "none"

# Use script to notify pdmgrd of assigned prefix
script "{dir}/{script}"

# Ask for prefix over the external gateway interface
iface "{gw_ifname}" {{
# Bind to generated LLA
bind-to-address {lla}
# ask for address
    pd 1
}}
"#,
        dir = working_dir.display(),
        script = NOTIFY_SCRIPT,
    )
}

/// Renders the lease-event hook. The first line must be the shebang.
pub fn render_notify_script(notify_binary: &str, prefix_path: &Path, agent_pid: u32) -> String {
    format!(
        "#!/bin/bash\n\n{} $1 {} {}\n",
        notify_binary,
        prefix_path.display(),
        agent_pid
    )
}

pub struct DibblerClient {
    settings: DibblerSettings,
    supervisor: Arc<dyn ProcessSupervisor>,
}

impl DibblerClient {
    pub fn new(settings: DibblerSettings, supervisor: Arc<dyn ProcessSupervisor>) -> Self {
        Self {
            settings,
            supervisor,
        }
    }

    pub fn working_dir(&self, id: &RequestorId) -> PathBuf {
        self.settings.pd_confs.join(id.to_string())
    }

    pub fn prefix_path(&self, id: &RequestorId) -> PathBuf {
        self.working_dir(id).join(PREFIX_FILE)
    }

    pub fn pid_path(&self, id: &RequestorId) -> PathBuf {
        self.working_dir(id).join(PID_FILE)
    }

    fn client_cmd(&self, action: &str, dir: &Path) -> Vec<String> {
        vec![
            self.settings.client_binary.clone(),
            action.to_string(),
            "-w".to_string(),
            dir.display().to_string(),
        ]
    }

    fn process_spec(&self, id: &RequestorId, namespace: Option<&str>) -> ProcessSpec {
        let dir = self.working_dir(id);
        ProcessSpec {
            uuid: id.to_string(),
            service: self.settings.service_name.clone(),
            namespace: namespace.map(str::to_string),
            pid_file: self.pid_path(id),
            start_cmd: self.client_cmd("start", &dir),
            stop_cmd: Some(self.client_cmd("stop", &dir)),
        }
    }

    fn write_artifacts(&self, id: &RequestorId, gw_ifname: &str, lla: Ipv6Addr) -> CfgMgrResult<()> {
        let dir = self.working_dir(id);
        fs::create_dir_all(&dir).map_err(|e| CfgMgrError::file(&dir, e))?;

        let script = render_notify_script(
            &self.settings.notify_binary,
            &self.prefix_path(id),
            self.settings.agent_pid,
        );
        replace_file(&dir.join(NOTIFY_SCRIPT), &script, NOTIFY_SCRIPT_MODE)?;

        let conf = render_client_conf(&self.settings.vrpen, id.subnet_id(), &dir, gw_ifname, lla);
        replace_file(&dir.join(CLIENT_CONF), &conf, DEFAULT_FILE_MODE)
    }
}

#[async_trait]
impl PdClient for DibblerClient {
    fn is_running(&self, id: &RequestorId) -> bool {
        self.supervisor.is_active(&self.pid_path(id))
    }

    #[instrument(skip(self), fields(requestor = %id))]
    async fn start(
        &self,
        id: &RequestorId,
        namespace: Option<&str>,
        gw_ifname: &str,
        lla: Ipv6Addr,
    ) -> CfgMgrResult<()> {
        if self.is_running(id) {
            debug!("dibbler client already running");
            return Ok(());
        }
        self.write_artifacts(id, gw_ifname, lla)?;
        self.supervisor.enable(&self.process_spec(id, namespace)).await?;
        debug!("dibbler client enabled");
        Ok(())
    }

    #[instrument(skip(self), fields(requestor = %id))]
    async fn stop(&self, id: &RequestorId, namespace: Option<&str>) -> CfgMgrResult<()> {
        let result = self.supervisor.disable(&self.process_spec(id, namespace)).await;
        if let Err(e) = &result {
            warn!(error = %e, "Failed to stop dibbler client");
        }

        let dir = self.working_dir(id);
        match fs::remove_dir_all(&dir) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!(dir = %dir.display(), error = %e, "Failed to remove working area"),
        }
        debug!("dibbler client disabled");
        result
    }

    fn get_prefix(&self, id: &RequestorId) -> String {
        match read_value(&self.prefix_path(id)) {
            Ok(Some(prefix)) => prefix,
            Ok(None) => UNASSIGNED_PREFIX.to_string(),
            Err(e) => {
                warn!(requestor = %id, error = %e, "Failed to read prefix file");
                UNASSIGNED_PREFIX.to_string()
            }
        }
    }

    fn list_known_requestors(&self) -> Vec<String> {
        let entries = match fs::read_dir(&self.settings.pd_confs) {
            Ok(entries) => entries,
            Err(e) => {
                debug!(error = %e, "PD working area not readable");
                return Vec::new();
            }
        };
        let mut names: Vec<String> = entries
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().map(|t| t.is_dir()).unwrap_or(false))
            .filter_map(|entry| entry.file_name().into_string().ok())
            .collect();
        names.sort();
        names
    }
}
