//! Error types for tonebus.
//!
//! Errors are split into two categories:
//! - **Policy errors** ([`PolicyError`]): rejected engine operations (bad
//!   names, missing current scenario), surfaced synchronously to the caller
//! - **Link errors** ([`LinkError`]): backend connectivity and protocol
//!   failures; the link retries or drops the command and keeps running

/// Errors returned by scenario-engine and dispatch operations.
///
/// These map to the daemon's "return `false`, log a warning" contract: no
/// engine operation is fatal, callers decide how to surface the failure.
#[derive(Debug, thiserror::Error)]
pub enum PolicyError {
    /// The named scenario does not exist in the target module.
    #[error("unknown scenario: {name}")]
    UnknownScenario {
        /// Name that failed to resolve.
        name: String,
    },

    /// The named scenario module was never registered.
    #[error("unknown scenario module: {name}")]
    UnknownModule {
        /// Module name that failed to resolve.
        name: String,
    },

    /// The operation needs a current module/scenario but none is set.
    #[error("no current {what} for operation '{operation}'")]
    NoCurrent {
        /// What was missing: "module" or "scenario".
        what: &'static str,
        /// The operation that was rejected.
        operation: &'static str,
    },

    /// A hardwired scenario cannot be disabled.
    #[error("scenario '{name}' is hardwired and cannot be disabled")]
    Hardwired {
        /// Name of the hardwired scenario.
        name: String,
    },

    /// A scenario with this name is already registered in the module.
    #[error("duplicate scenario: {name}")]
    DuplicateScenario {
        /// The duplicated name.
        name: String,
    },

    /// A parameter was out of its valid domain.
    #[error("invalid parameter: {reason}")]
    InvalidParameter {
        /// What was wrong with it.
        reason: String,
    },

    /// Programming the backend mixer failed.
    #[error("mixer: {0}")]
    Mixer(#[from] LinkError),
}

/// Errors on the backend mixer link.
///
/// Link errors never crash the daemon. Connection errors are retried with
/// bounded backoff; protocol errors drop the offending record or command
/// and continue.
#[derive(Debug, Clone, thiserror::Error)]
pub enum LinkError {
    /// The backend is not reachable right now.
    ///
    /// Programming commands issued while disconnected are dropped; the
    /// reconnect timer keeps running.
    #[error("backend not connected")]
    NotConnected,

    /// The connection dropped mid-operation.
    #[error("connection lost: {reason}")]
    ConnectionLost {
        /// What tore the connection down.
        reason: String,
    },

    /// An inbound record could not be decoded, or an outbound record could
    /// not be sent whole.
    #[error("protocol error: {reason}")]
    Protocol {
        /// Description of the framing/decoding failure.
        reason: String,
    },

    /// The active backend does not implement this operation.
    #[error("operation '{operation}' unsupported by {backend} backend")]
    Unsupported {
        /// The rejected operation.
        operation: &'static str,
        /// Name of the active backend.
        backend: &'static str,
    },

    /// A correlated command got no reply before its deadline.
    #[error("reply timeout for msg id {msg_id}")]
    ReplyTimeout {
        /// The outstanding message id.
        msg_id: u8,
    },

    /// The backend answered a correlated command with a failure status.
    #[error("backend rejected command (status {status})")]
    Rejected {
        /// Raw status byte from the reply record.
        status: u8,
    },

    /// The native audio connection failed an operation.
    #[error("native audio: {reason}")]
    Native {
        /// Description of the failure.
        reason: String,
    },
}

impl LinkError {
    /// Creates a protocol error with the given reason.
    pub fn protocol(reason: impl Into<String>) -> Self {
        Self::Protocol {
            reason: reason.into(),
        }
    }

    /// Creates a connection-lost error with the given reason.
    pub fn connection_lost(reason: impl Into<String>) -> Self {
        Self::ConnectionLost {
            reason: reason.into(),
        }
    }

    /// Creates a native-audio error with the given reason.
    pub fn native(reason: impl Into<String>) -> Self {
        Self::Native {
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_error_display() {
        let err = PolicyError::UnknownScenario {
            name: "media_headset".to_string(),
        };
        assert_eq!(err.to_string(), "unknown scenario: media_headset");
    }

    #[test]
    fn test_no_current_display() {
        let err = PolicyError::NoCurrent {
            what: "module",
            operation: "set_scenario_volume",
        };
        assert!(err.to_string().contains("no current module"));
    }

    #[test]
    fn test_link_error_protocol() {
        let err = LinkError::protocol("short send: 3 of 8 bytes");
        assert_eq!(err.to_string(), "protocol error: short send: 3 of 8 bytes");
    }

    #[test]
    fn test_link_error_unsupported() {
        let err = LinkError::Unsupported {
            operation: "program_balance",
            backend: "umi",
        };
        assert!(err.to_string().contains("program_balance"));
        assert!(err.to_string().contains("umi"));
    }

    #[test]
    fn test_policy_error_from_link_error() {
        let err: PolicyError = LinkError::NotConnected.into();
        assert!(matches!(err, PolicyError::Mixer(LinkError::NotConnected)));
    }
}
