//! Error types for cfgmgr operations.
//!
//! All errors implement `std::error::Error` via `thiserror`.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for cfgmgr operations.
pub type CfgMgrResult<T> = Result<T, CfgMgrError>;

/// Errors that can occur during cfgmgr operations.
#[derive(Debug, Error)]
pub enum CfgMgrError {
    /// Failed to execute a shell command (spawn error).
    #[error("Failed to execute shell command '{command}': {source}")]
    ShellExec {
        /// The command that failed to execute.
        command: String,
        /// The underlying IO error.
        #[source]
        source: io::Error,
    },

    /// Shell command returned non-zero exit code.
    #[error("Shell command failed: '{command}' (exit code {exit_code}): {output}")]
    ShellCommandFailed {
        /// The command that failed.
        command: String,
        /// The exit code.
        exit_code: i32,
        /// Combined stdout/stderr output.
        output: String,
    },

    /// Interface does not exist (or vanished) in the target namespace.
    #[error("Interface '{interface}' not found")]
    InterfaceNotFound {
        /// The interface name.
        interface: String,
    },

    /// Address is not configured on the interface.
    #[error("Address {address} not found on interface '{interface}'")]
    AddressNotFound {
        /// The interface name.
        interface: String,
        /// The address in CIDR form.
        address: String,
    },

    /// Malformed address input (MAC, IPv6 or CIDR).
    #[error("Invalid address '{value}': {reason}")]
    InvalidAddress {
        /// The offending input.
        value: String,
        /// Why it was rejected.
        reason: String,
    },

    /// Identifier that cannot be split back into its components.
    #[error("Invalid requestor identifier '{value}'")]
    InvalidRequestor {
        /// The offending identifier.
        value: String,
    },

    /// Process supervision failed to start or stop a managed process.
    #[error("Process supervision failed for {service} '{uuid}': {message}")]
    ProcessSupervision {
        /// Service name (e.g., "dibbler").
        service: String,
        /// Supervised instance identifier.
        uuid: String,
        /// Error message.
        message: String,
    },

    /// Upstream notification could not be delivered.
    #[error("Notifier failed: {message}")]
    Notifier {
        /// Error message.
        message: String,
    },

    /// Configuration validation error.
    #[error("Invalid configuration for {field}: {message}")]
    InvalidConfig {
        /// The field that failed validation.
        field: String,
        /// Error message.
        message: String,
    },

    /// File operation failed.
    #[error("File operation on {} failed: {source}", path.display())]
    File {
        /// The file or directory involved.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: io::Error,
    },

    /// Internal error (unexpected state).
    #[error("Internal error: {message}")]
    Internal {
        /// Error message.
        message: String,
    },
}

impl CfgMgrError {
    /// Creates an interface not found error.
    pub fn interface_not_found(interface: impl Into<String>) -> Self {
        Self::InterfaceNotFound {
            interface: interface.into(),
        }
    }

    /// Creates an address not found error.
    pub fn address_not_found(interface: impl Into<String>, address: impl Into<String>) -> Self {
        Self::AddressNotFound {
            interface: interface.into(),
            address: address.into(),
        }
    }

    /// Creates an invalid address error.
    pub fn invalid_address(value: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidAddress {
            value: value.into(),
            reason: reason.into(),
        }
    }

    /// Creates an invalid requestor identifier error.
    pub fn invalid_requestor(value: impl Into<String>) -> Self {
        Self::InvalidRequestor {
            value: value.into(),
        }
    }

    /// Creates a process supervision error.
    pub fn process(
        service: impl Into<String>,
        uuid: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::ProcessSupervision {
            service: service.into(),
            uuid: uuid.into(),
            message: message.into(),
        }
    }

    /// Creates a notifier error.
    pub fn notifier(message: impl Into<String>) -> Self {
        Self::Notifier {
            message: message.into(),
        }
    }

    /// Creates an invalid configuration error.
    pub fn invalid_config(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Creates a file error.
    pub fn file(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::File {
            path: path.into(),
            source,
        }
    }

    /// Creates an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns true if the target interface or address no longer exists.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            CfgMgrError::InterfaceNotFound { .. } | CfgMgrError::AddressNotFound { .. }
        )
    }

    /// Returns true if this error indicates a transient condition
    /// that may succeed on retry.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CfgMgrError::InterfaceNotFound { .. }
                | CfgMgrError::ShellCommandFailed { .. }
                | CfgMgrError::ProcessSupervision { .. }
        )
    }
}
