//! Restart recovery from the PD working area.

use tracing::{debug, warn};

use crate::dibbler::PdClient;
use crate::requestor::RequestorId;

/// A delegation left behind by a previous run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncEntry {
    pub requestor: RequestorId,
    pub prefix: String,
    pub client_started: bool,
}

/// Scans the working area for requestors from a previous run.
///
/// Directory names that do not split into three parts are skipped.
pub fn load_sync_data(client: &dyn PdClient) -> Vec<SyncEntry> {
    client
        .list_known_requestors()
        .into_iter()
        .filter_map(|name| match RequestorId::parse(&name) {
            Ok(requestor) => {
                let entry = SyncEntry {
                    client_started: client.is_running(&requestor),
                    prefix: client.get_prefix(&requestor),
                    requestor,
                };
                debug!(requestor = %entry.requestor, prefix = %entry.prefix, "Recovered delegation");
                Some(entry)
            }
            Err(e) => {
                warn!(entry = %name, error = %e, "Skipping unrecognised PD working directory");
                None
            }
        })
        .collect()
}
