//! Lease events reported by the PD client through its notifier script.

use std::fmt;
use std::path::Path;

use sonic_cfgmgr_common::files::{replace_file, DEFAULT_FILE_MODE};
use sonic_cfgmgr_common::{CfgMgrError, CfgMgrResult};

use crate::types::UNASSIGNED_PREFIX;

/// Length of the delegated prefixes the client requests.
const DELEGATED_PREFIX_LEN: u8 = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LeaseOperation {
    Add,
    Update,
    Delete,
    /// Anything else the client reports (`expire`, ...); leaves the
    /// prefix file untouched.
    Other(String),
}

impl From<&str> for LeaseOperation {
    fn from(op: &str) -> Self {
        match op {
            "add" => Self::Add,
            "update" => Self::Update,
            "delete" => Self::Delete,
            other => Self::Other(other.to_string()),
        }
    }
}

impl fmt::Display for LeaseOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Add => f.write_str("add"),
            Self::Update => f.write_str("update"),
            Self::Delete => f.write_str("delete"),
            Self::Other(op) => f.write_str(op),
        }
    }
}

/// Records the outcome of a lease event in `prefix_file`.
///
/// `prefix` is the bare delegated network (the client's `PREFIX1`).
/// Returns whether the file was rewritten.
pub fn apply_lease_event(
    op: &LeaseOperation,
    prefix_file: &Path,
    prefix: Option<&str>,
) -> CfgMgrResult<bool> {
    let content = match op {
        LeaseOperation::Add | LeaseOperation::Update => {
            let prefix = prefix
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .ok_or_else(|| CfgMgrError::invalid_address("", format!("{} without PREFIX1", op)))?;
            format!("{}/{}", prefix, DELEGATED_PREFIX_LEN)
        }
        LeaseOperation::Delete => UNASSIGNED_PREFIX.to_string(),
        LeaseOperation::Other(_) => return Ok(false),
    };
    replace_file(prefix_file, &content, DEFAULT_FILE_MODE)?;
    Ok(true)
}
