//! Backend mixer link: wire protocol, reply correlation, endpoint
//! accounting, socket client and the native audio connection.

mod accounting;
mod client;
mod native;
mod pending;
pub mod wire;

pub use accounting::EndpointAccounting;
pub use client::{LinkStats, MixerLink, Transport};
pub use native::{
    NativeAudio, NativeBackend, PcmProvider, PlaybackControl, PlaybackId, PlaybackStatus,
    SampleFormat, SampleSpec,
};

use crate::endpoint::{Endpoint, PhysicalDest, VirtualSink, VirtualSource};
use crate::error::LinkError;

/// Which backend process the link is speaking to.
///
/// Backends differ in what they can program; operations outside the active
/// backend's capability set fail with [`LinkError::Unsupported`] instead of
/// silently doing nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackendKind {
    /// The full-featured desktop-class mixer backend.
    #[default]
    Pulse,
    /// The reduced embedded mixer backend.
    Umi,
}

/// Operations a backend may or may not support.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    /// Post-processing effect toggles.
    Effects,
    /// Per-sink latency hints.
    Latency,
    /// Stereo balance.
    Balance,
    /// Whole-backend suspend.
    Suspend,
    /// Runtime sample-rate switching.
    UpdateRate,
}

impl BackendKind {
    /// Short name for logs and error messages.
    pub fn name(self) -> &'static str {
        match self {
            Self::Pulse => "pulse",
            Self::Umi => "umi",
        }
    }

    /// Whether this backend implements `capability`.
    pub fn supports(self, capability: Capability) -> bool {
        match self {
            Self::Pulse => true,
            Self::Umi => matches!(capability, Capability::Suspend | Capability::UpdateRate),
        }
    }
}

/// The programming surface the scenario engine drives.
///
/// [`MixerLink`] is the production implementation; tests substitute
/// recording fakes.
pub trait Mixer: Send + Sync {
    /// Programs a sink's software volume.
    ///
    /// When the sink has no active streams the change is applied
    /// immediately, never ramped, regardless of `ramp`.
    fn program_volume(&self, sink: VirtualSink, volume: u8, ramp: bool) -> Result<(), LinkError>;

    /// Programs a source's capture gain.
    fn program_mic_gain(&self, source: VirtualSource, gain: u8) -> Result<(), LinkError>;

    /// Mutes or unmutes an endpoint.
    fn program_mute(&self, endpoint: Endpoint, mute: bool) -> Result<(), LinkError>;

    /// Points an endpoint at a physical destination.
    fn program_destination(&self, endpoint: Endpoint, destination: PhysicalDest)
        -> Result<(), LinkError>;

    /// Mutes every endpoint. Used at the head of a routing change.
    fn mute_all(&self) -> Result<(), LinkError>;
}
