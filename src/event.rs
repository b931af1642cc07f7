//! Runtime events for monitoring link health.
//!
//! Events are non-fatal notifications about backend-link behavior. The
//! daemon continues running after events are emitted - they're for
//! logging/metrics, not error handling.

use std::sync::Arc;

/// Runtime events emitted by the mixer link.
///
/// These are informational events, not errors. Use an [`EventCallback`] to
/// log them or update metrics.
#[derive(Debug, Clone)]
pub enum MixerEvent {
    /// The control connection to the backend is up.
    ///
    /// Emitted after endpoint accounting has been drained to zero from any
    /// previous session, so listeners see a clean slate.
    Connected,

    /// The control connection dropped.
    ///
    /// The reconnect timer is running; commands issued meanwhile are
    /// dropped.
    Disconnected {
        /// What tore the connection down.
        reason: String,
    },

    /// A reconnect attempt is scheduled.
    Reconnecting {
        /// Attempt number since the last successful connection.
        attempt: u32,
        /// Delay before the attempt.
        delay_ms: u64,
    },

    /// An outbound command was dropped without being sent.
    ///
    /// Happens on partial sends and while disconnected. There is no retry
    /// or buffering; the command is simply gone.
    CommandDropped {
        /// Why the command was dropped.
        reason: String,
    },

    /// An inbound record could not be decoded and was skipped.
    MalformedRecord {
        /// Description of the decoding failure.
        reason: String,
    },

    /// A correlated command never got its reply.
    ReplyTimeout {
        /// Message id of the expired entry.
        msg_id: u8,
    },
}

/// Callback type for receiving runtime events.
pub type EventCallback = Arc<dyn Fn(MixerEvent) + Send + Sync>;

/// Creates an [`EventCallback`] from a closure.
///
/// # Example
///
/// ```
/// use tonebus::{event_callback, MixerEvent};
///
/// let callback = event_callback(|event| {
///     println!("link event: {:?}", event);
/// });
/// ```
pub fn event_callback<F>(f: F) -> EventCallback
where
    F: Fn(MixerEvent) + Send + Sync + 'static,
{
    Arc::new(f)
}
