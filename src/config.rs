//! Configuration types for the policy core.

use std::path::PathBuf;
use std::time::Duration;

/// Configuration for the backend mixer link.
///
/// Use [`LinkConfig::default()`] for sensible defaults, or customize as
/// needed.
///
/// # Example
///
/// ```
/// use tonebus::LinkConfig;
/// use std::time::Duration;
///
/// let config = LinkConfig {
///     reply_deadline: Duration::from_secs(2),
///     ..Default::default()
/// };
/// ```
#[derive(Debug, Clone)]
pub struct LinkConfig {
    /// Path of the backend's control socket.
    ///
    /// Default: `/tmp/mixer-control`
    pub socket_path: PathBuf,

    /// First reconnect delay after a connection failure.
    ///
    /// Doubles on every failed attempt up to [`reconnect_max`], and resets
    /// back to this value once a connection succeeds.
    /// Default: 50ms
    ///
    /// [`reconnect_max`]: LinkConfig::reconnect_max
    pub reconnect_initial: Duration,

    /// Upper bound on the reconnect delay.
    ///
    /// Default: 5s
    pub reconnect_max: Duration,

    /// How long a correlated command may wait for its reply.
    ///
    /// Entries past the deadline are failed with
    /// [`LinkError::ReplyTimeout`](crate::LinkError::ReplyTimeout).
    /// Default: 5s
    pub reply_deadline: Duration,

    /// How often the pending-reply table is swept for expired entries.
    ///
    /// Default: 1s
    pub sweep_interval: Duration,

    /// Upper bound on waiting for a sample preload to complete.
    ///
    /// Default: 5s
    pub preload_timeout: Duration,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            socket_path: PathBuf::from("/tmp/mixer-control"),
            reconnect_initial: Duration::from_millis(50),
            reconnect_max: Duration::from_millis(5000),
            reply_deadline: Duration::from_secs(5),
            sweep_interval: Duration::from_secs(1),
            preload_timeout: Duration::from_secs(5),
        }
    }
}

/// Configuration for DTMF tone synthesis.
#[derive(Debug, Clone)]
pub struct ToneConfig {
    /// Sample rate of synthesized tones in Hz.
    ///
    /// Default: 44100
    pub sample_rate: u32,

    /// Length of the linear fade-in and fade-out, in samples.
    ///
    /// Applied at stream start and again before completion or after a stop
    /// request, to avoid clicks. Default: 441 (10ms at 44.1kHz)
    pub fade_samples: u32,
}

impl Default for ToneConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44_100,
            fade_samples: 441,
        }
    }
}

/// Configuration for the scenario engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Where volume preferences are persisted, or `None` for in-memory only.
    ///
    /// Default: `None`
    pub store_path: Option<PathBuf>,

    /// Delay between a volume change and its persisted write.
    ///
    /// Rapid volume changes (a held volume key) coalesce into one write.
    /// Default: 10s
    pub store_debounce: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            store_path: None,
            store_debounce: Duration::from_secs(10),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_link_config_defaults() {
        let config = LinkConfig::default();
        assert_eq!(config.reconnect_initial, Duration::from_millis(50));
        assert_eq!(config.reconnect_max, Duration::from_millis(5000));
        assert_eq!(config.reply_deadline, Duration::from_secs(5));
        assert_eq!(config.preload_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_tone_config_defaults() {
        let config = ToneConfig::default();
        assert_eq!(config.sample_rate, 44_100);
        assert_eq!(config.fade_samples, 441);
    }

    #[test]
    fn test_engine_config_defaults() {
        let config = EngineConfig::default();
        assert!(config.store_path.is_none());
        assert_eq!(config.store_debounce, Duration::from_secs(10));
    }
}
