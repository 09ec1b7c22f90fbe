//! pd-notify - lease-event hook for the dibbler client
//!
//! Invoked from the generated `notify.sh` as
//! `pd-notify <operation> <prefix_file> <agent_pid>` with the delegated
//! network in `PREFIX1`. Records the prefix and wakes pdmgrd with SIGHUP.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use sonic_pdmgrd::{apply_lease_event, LeaseOperation};
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "pd-notify", version, about = "Record a PD lease event and notify pdmgrd")]
struct Args {
    /// Lease operation reported by the client (add, update, delete)
    operation: String,

    /// File holding the learned prefix
    prefix_file: PathBuf,

    /// Pid of the pdmgrd process to signal
    agent_pid: i32,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let op = LeaseOperation::from(args.operation.as_str());
    let prefix = std::env::var("PREFIX1").ok();

    let mut status = ExitCode::SUCCESS;
    match apply_lease_event(&op, &args.prefix_file, prefix.as_deref()) {
        Ok(true) => info!(operation = %op, file = %args.prefix_file.display(), "Prefix recorded"),
        Ok(false) => info!(operation = %op, "Lease event ignored"),
        Err(e) => {
            error!(operation = %op, error = %e, "Failed to record prefix");
            status = ExitCode::FAILURE;
        }
    }

    // pdmgrd re-reads every prefix file on wake-up, so signal regardless
    if let Err(e) = kill(Pid::from_raw(args.agent_pid), Signal::SIGHUP) {
        error!(pid = args.agent_pid, error = %e, "Failed to signal pdmgrd");
        status = ExitCode::FAILURE;
    }
    status
}
