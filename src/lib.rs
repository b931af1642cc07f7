//! # tonebus
//!
//! Audio policy core for an embedded device: scenario arbitration, a
//! binary-protocol link to the backend mixer, and DTMF tone synthesis.
//!
//! `tonebus` decides which logical audio module owns the mixer at any
//! moment and programs volume/routing accordingly, keeps that
//! programming alive across backend restarts, and streams synthesized
//! tones through the native audio connection.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use tonebus::{PolicyContext, BackendKind, Priority, Scenario, ScenarioModule, Volume};
//!
//! let mut ctx = PolicyContext::builder()
//!     .backend(BackendKind::Pulse)
//!     .on_event(tonebus::event_callback(|e| tracing::warn!(?e, "mixer event")))
//!     .build(native_backend);
//!
//! let mut media = ScenarioModule::new("media");
//! media.add_scenario(Scenario::new("default", Priority::new(10), Volume::new("media", 70)))?;
//! ctx.engine_mut().register_module(media)?;
//! ctx.engine_mut().enable_scenario("media", "default")?;
//! ctx.engine_mut().make_current("media")?;
//! ```
//!
//! ## Architecture
//!
//! Everything control-plane runs on one cooperative tokio task set: the
//! socket client, reply correlation, endpoint accounting, scenario
//! arbitration and callback dispatch. Audio sample delivery crosses to a
//! dedicated blocking backend thread over lock-free ring buffers, with
//! one feeder thread per streamed playback.

#![warn(missing_docs)]
// Sample synthesis and the wire codec need intentional numeric casts
#![allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_possible_wrap,
    clippy::cast_lossless
)]
// unwrap/expect allowed in tests only
#![allow(clippy::unwrap_used)]
#![allow(clippy::missing_panics_doc, clippy::missing_errors_doc)]

mod config;
mod context;
mod dispatch;
mod endpoint;
mod error;
mod event;
pub mod link;
mod scenario;
pub mod tone;
mod volume;

pub use config::{EngineConfig, LinkConfig, ToneConfig};
pub use context::{PolicyContext, PolicyContextBuilder};
pub use dispatch::{CallbackDispatch, ModuleRef, PolicyModule};
pub use endpoint::{
    Endpoint, EndpointSpec, PhysicalDest, SinkEvent, VirtualSink, VirtualSource,
};
pub use error::{LinkError, PolicyError};
pub use event::{event_callback, EventCallback, MixerEvent};
pub use link::{BackendKind, Capability, LinkStats, Mixer, MixerLink, NativeAudio, NativeBackend};
pub use scenario::{
    ModuleHooks, Priority, RingerMode, RouteEntry, Scenario, ScenarioEngine, ScenarioModule,
};
pub use tone::{DtmfSymbol, ToneStatus, ToneStream, ToneSynthesizer};
pub use volume::{Volume, VolumeStore};
