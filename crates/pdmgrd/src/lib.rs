//! IPv6 prefix delegation manager for SONiC
//!
//! Coordinates DHCPv6 prefix delegation for virtual routers: binds a
//! link-local address on each router's gateway interface, waits for
//! duplicate-address detection to finish, runs one dibbler client per
//! (router, subnet) and reports the prefixes those clients learn.
//!
//! State survives a daemon restart through the per-client working
//! directories under `pd_confs`, which are scanned on startup.

pub mod config;
mod dibbler;
mod driver;
mod events;
mod interface;
mod lease;
mod lla;
mod notifier;
mod pd_mgr;
mod process;
mod prober;
mod recovery;
mod requestor;
mod types;

pub use config::PdmgrdConfig;
pub use dibbler::{
    render_client_conf, render_notify_script, DibblerClient, DibblerSettings, PdClient,
};
pub use driver::PdDriver;
pub use events::{dispatch, parse_line, run_event_feed, RouterEvent};
pub use interface::{parse_addr_show, InterfaceDriver, IpCommandDriver};
pub use lease::{apply_lease_event, LeaseOperation};
pub use lla::{derive_lla, lla_for_mac};
pub use notifier::{ChannelNotifier, PrefixNotifier};
pub use pd_mgr::PdMgr;
pub use process::{
    is_pid_alive, pid_from_file, run_process_monitor, ExternalProcessManager, ProcessSpec,
    ProcessSupervisor,
};
pub use prober::{
    is_lla_active, probe_lla, PdWaker, ProbeOutcome, ProberConfig, ProberHandle, ProberSet,
};
pub use recovery::{load_sync_data, SyncEntry};
pub use requestor::RequestorId;
pub use types::*;
