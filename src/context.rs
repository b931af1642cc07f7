//! Process-wide wiring.
//!
//! `PolicyContext` replaces what used to be a handful of singletons: it
//! owns the callback dispatcher, the mixer link, the native audio
//! connection, the tone synthesizer and the scenario engine, built once
//! at startup and torn down with an explicit [`shutdown`].
//!
//! [`shutdown`]: PolicyContext::shutdown

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::info;

use crate::config::{EngineConfig, LinkConfig, ToneConfig};
use crate::dispatch::CallbackDispatch;
use crate::endpoint::VirtualSink;
use crate::error::LinkError;
use crate::event::EventCallback;
use crate::link::{BackendKind, MixerLink, NativeAudio, NativeBackend, SampleSpec};
use crate::scenario::ScenarioEngine;
use crate::tone::ToneSynthesizer;

/// Builder for [`PolicyContext`].
#[derive(Default)]
pub struct PolicyContextBuilder {
    backend: BackendKind,
    link: LinkConfig,
    tone: ToneConfig,
    engine: EngineConfig,
    on_event: Option<EventCallback>,
}

impl PolicyContextBuilder {
    /// Starts a builder with default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Which mixer backend the link speaks to.
    pub fn backend(mut self, backend: BackendKind) -> Self {
        self.backend = backend;
        self
    }

    /// Overrides the link configuration.
    pub fn link_config(mut self, config: LinkConfig) -> Self {
        self.link = config;
        self
    }

    /// Overrides the tone-synthesis configuration.
    pub fn tone_config(mut self, config: ToneConfig) -> Self {
        self.tone = config;
        self
    }

    /// Overrides the scenario-engine configuration.
    pub fn engine_config(mut self, config: EngineConfig) -> Self {
        self.engine = config;
        self
    }

    /// Receives link lifecycle events (connects, drops, dropped commands).
    pub fn on_event(mut self, callback: EventCallback) -> Self {
        self.on_event = Some(callback);
        self
    }

    /// Wires everything up and starts the link and audio threads.
    pub fn build(self, native: Arc<dyn NativeBackend>) -> PolicyContext {
        let dispatch = Arc::new(CallbackDispatch::new());
        let (link, link_task) = MixerLink::spawn(
            self.link.clone(),
            self.backend,
            dispatch.clone(),
            self.on_event.clone(),
        );
        let audio = Arc::new(NativeAudio::start(native, dispatch.clone(), &self.link));
        let synth = ToneSynthesizer::new(audio.clone(), self.tone);
        let engine = ScenarioEngine::new(Arc::new(link.clone()), &self.engine);
        info!(backend = self.backend.name(), "policy context started");
        PolicyContext {
            dispatch,
            link,
            link_task,
            audio,
            synth,
            engine,
        }
    }
}

/// The assembled daemon core.
pub struct PolicyContext {
    dispatch: Arc<CallbackDispatch>,
    link: MixerLink,
    link_task: JoinHandle<()>,
    audio: Arc<NativeAudio>,
    synth: ToneSynthesizer,
    engine: ScenarioEngine,
}

impl PolicyContext {
    /// Starts building a context.
    pub fn builder() -> PolicyContextBuilder {
        PolicyContextBuilder::new()
    }

    /// Callback registration surface for policy modules.
    pub fn dispatch(&self) -> &Arc<CallbackDispatch> {
        &self.dispatch
    }

    /// The backend mixer link.
    pub fn mixer(&self) -> &MixerLink {
        &self.link
    }

    /// The native audio connection.
    pub fn audio(&self) -> &Arc<NativeAudio> {
        &self.audio
    }

    /// DTMF playback.
    pub fn tones(&self) -> &ToneSynthesizer {
        &self.synth
    }

    /// The scenario engine.
    pub fn engine(&self) -> &ScenarioEngine {
        &self.engine
    }

    /// Mutable access to the scenario engine for registration and
    /// arbitration calls.
    pub fn engine_mut(&mut self) -> &mut ScenarioEngine {
        &mut self.engine
    }

    /// Preloads a named system sound, deduplicated by name.
    pub async fn preload_system_sound(
        &self,
        name: &str,
        spec: SampleSpec,
        path: &str,
    ) -> Result<(), LinkError> {
        self.audio.preload(name, spec, path).await
    }

    /// One-shot playback of a preloaded system sound.
    pub async fn play_system_sound(
        &self,
        name: &str,
        sink: VirtualSink,
    ) -> Result<(), LinkError> {
        self.audio.play_sample(name, sink).await
    }

    /// Stops tones, flushes pending volume writes, and tears down the
    /// link and audio threads.
    pub async fn shutdown(self) {
        self.synth.stop_dtmf();
        self.engine.flush();
        self.link.shutdown();
        let _ = self.link_task.await;
        self.audio.shutdown();
        info!("policy context stopped");
    }
}
