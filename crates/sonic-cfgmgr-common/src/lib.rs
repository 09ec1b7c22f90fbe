//! Common infrastructure for SONiC configuration manager daemons.
//!
//! - [`shell`]: Safe shell command execution with proper quoting, including
//!   execution inside a network namespace
//! - [`files`]: Atomic file replacement and small state-file reads
//! - [`error`]: Error types for cfgmgr operations
//!
//! # Example
//!
//! ```ignore
//! use sonic_cfgmgr_common::{
//!     shell::{self, IP_CMD, shellquote},
//!     error::CfgMgrResult,
//! };
//!
//! async fn flush_v6(ns: Option<&str>, alias: &str) -> CfgMgrResult<()> {
//!     let cmd = format!("{} -6 addr flush dev {}", IP_CMD, shellquote(alias));
//!     shell::exec_in_netns_or_throw(ns, &cmd).await?;
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod files;
pub mod shell;

pub use error::{CfgMgrError, CfgMgrResult};
