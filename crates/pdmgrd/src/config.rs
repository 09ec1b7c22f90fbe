//! Configuration file support for pdmgrd
//!
//! Loads and validates pdmgrd configuration from TOML files.
//! Default location: /etc/neutron/pdmgrd.toml

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sonic_cfgmgr_common::{CfgMgrError, CfgMgrResult};

use crate::prober::ProberConfig;

/// Default configuration file location.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/neutron/pdmgrd.toml";

/// PD client settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PdConfig {
    /// Root of the per-requestor working directories
    #[serde(default = "default_pd_confs")]
    pub pd_confs: PathBuf,

    /// Vendor enterprise number used for the client DUID
    #[serde(default = "default_vrpen")]
    pub vrpen: String,

    /// PD client executable
    #[serde(default = "default_client_binary")]
    pub client_binary: String,

    /// Lease-event hook called from the generated notifier script
    #[serde(default = "default_notify_binary")]
    pub notify_binary: String,

    /// Service name used for process supervision
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

/// Periodic driver settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriverConfig {
    /// Seconds between two `run_pd_client` ticks
    #[serde(default = "default_run_interval")]
    pub run_interval_secs: u64,
}

/// Address readiness prober settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProberSettings {
    /// Milliseconds between address list queries
    #[serde(default = "default_probe_interval")]
    pub interval_ms: u64,

    /// Queries before the prober gives up
    #[serde(default = "default_probe_attempts")]
    pub max_attempts: u32,
}

/// Respawn monitor settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessMonitorConfig {
    #[serde(default = "default_monitor_enabled")]
    pub enabled: bool,

    /// Seconds between liveness sweeps
    #[serde(default = "default_monitor_interval")]
    pub check_interval_secs: u64,
}

/// Complete pdmgrd configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PdmgrdConfig {
    #[serde(default)]
    pub pd: PdConfig,

    #[serde(default)]
    pub driver: DriverConfig,

    #[serde(default)]
    pub prober: ProberSettings,

    #[serde(default)]
    pub process_monitor: ProcessMonitorConfig,
}

fn default_pd_confs() -> PathBuf {
    PathBuf::from("/var/lib/neutron/pd")
}

fn default_vrpen() -> String {
    "8888".to_string()
}

fn default_client_binary() -> String {
    "dibbler-client".to_string()
}

fn default_notify_binary() -> String {
    "pd-notify".to_string()
}

fn default_service_name() -> String {
    crate::types::PD_SERVICE_NAME.to_string()
}

fn default_run_interval() -> u64 {
    10
}

fn default_probe_interval() -> u64 {
    2000
}

fn default_probe_attempts() -> u32 {
    20
}

fn default_monitor_enabled() -> bool {
    true
}

fn default_monitor_interval() -> u64 {
    60
}

impl Default for PdConfig {
    fn default() -> Self {
        Self {
            pd_confs: default_pd_confs(),
            vrpen: default_vrpen(),
            client_binary: default_client_binary(),
            notify_binary: default_notify_binary(),
            service_name: default_service_name(),
        }
    }
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            run_interval_secs: default_run_interval(),
        }
    }
}

impl Default for ProberSettings {
    fn default() -> Self {
        Self {
            interval_ms: default_probe_interval(),
            max_attempts: default_probe_attempts(),
        }
    }
}

impl Default for ProcessMonitorConfig {
    fn default() -> Self {
        Self {
            enabled: default_monitor_enabled(),
            check_interval_secs: default_monitor_interval(),
        }
    }
}

impl PdmgrdConfig {
    /// Load configuration from file, falling back to defaults if file not found
    pub fn load_or_default(path: impl AsRef<Path>) -> CfgMgrResult<Self> {
        let path = path.as_ref();

        match fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).map_err(|e| {
                CfgMgrError::invalid_config(
                    path.display().to_string(),
                    format!("failed to parse: {}", e),
                )
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %path.display(), "Config file not found, using defaults");
                Ok(Self::default())
            }
            Err(e) => Err(CfgMgrError::file(path, e)),
        }
    }

    pub fn run_interval(&self) -> Duration {
        Duration::from_secs(self.driver.run_interval_secs)
    }

    pub fn monitor_interval(&self) -> Duration {
        Duration::from_secs(self.process_monitor.check_interval_secs)
    }

    pub fn prober_config(&self) -> ProberConfig {
        ProberConfig {
            interval: Duration::from_millis(self.prober.interval_ms),
            max_attempts: self.prober.max_attempts,
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> CfgMgrResult<()> {
        if self.pd.pd_confs.as_os_str().is_empty() {
            return Err(CfgMgrError::invalid_config("pd.pd_confs", "must not be empty"));
        }

        if self.pd.vrpen.is_empty() || !self.pd.vrpen.chars().all(|c| c.is_ascii_digit()) {
            return Err(CfgMgrError::invalid_config(
                "pd.vrpen",
                "must be a decimal enterprise number",
            ));
        }

        if self.pd.client_binary.is_empty() {
            return Err(CfgMgrError::invalid_config("pd.client_binary", "must not be empty"));
        }

        if self.pd.notify_binary.is_empty() {
            return Err(CfgMgrError::invalid_config("pd.notify_binary", "must not be empty"));
        }

        if self.driver.run_interval_secs == 0 {
            return Err(CfgMgrError::invalid_config(
                "driver.run_interval_secs",
                "must be > 0",
            ));
        }

        if self.prober.interval_ms == 0 {
            return Err(CfgMgrError::invalid_config("prober.interval_ms", "must be > 0"));
        }

        if self.prober.max_attempts == 0 {
            return Err(CfgMgrError::invalid_config("prober.max_attempts", "must be > 0"));
        }

        if self.process_monitor.enabled && self.process_monitor.check_interval_secs == 0 {
            return Err(CfgMgrError::invalid_config(
                "process_monitor.check_interval_secs",
                "must be > 0 when the monitor is enabled",
            ));
        }

        Ok(())
    }
}
