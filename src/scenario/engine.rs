//! The process-wide scenario engine.
//!
//! Exactly one [`ScenarioModule`] is "current" at any moment; the engine
//! enforces that invariant and programs the backend whenever it changes.
//! The programming order on a switch is deliberate: mute everything, move
//! routes, program volumes, then unmute. Re-routing live streams without
//! the surrounding mutes produces audible pops.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::config::EngineConfig;
use crate::endpoint::{Endpoint, VirtualSink, VirtualSource};
use crate::error::PolicyError;
use crate::link::Mixer;
use crate::scenario::module::ScenarioModule;
use crate::scenario::scenario::{RingerMode, Scenario};
use crate::volume::VolumeStore;

/// Lifecycle notifications a policy module can hook into.
///
/// All methods default to no-ops so modules implement only what they need.
pub trait ModuleHooks: Send + Sync {
    /// The module is about to become current.
    fn on_activating(&self) {}

    /// Another module took over.
    fn on_deactivated(&self) {}

    /// The module's effective state (current scenario or volume) changed.
    fn on_changed(&self) {}
}

/// Owns all scenario modules and the single current one.
pub struct ScenarioEngine {
    mixer: Arc<dyn Mixer>,
    store: VolumeStore,
    modules: Vec<ScenarioModule>,
    hooks: Vec<Option<Arc<dyn ModuleHooks>>>,
    current: Option<usize>,
    ringer: RingerMode,
    sink_muted: [bool; VirtualSink::COUNT],
    source_muted: [bool; VirtualSource::COUNT],
}

impl ScenarioEngine {
    /// Creates an engine programming through `mixer`.
    pub fn new(mixer: Arc<dyn Mixer>, config: &EngineConfig) -> Self {
        Self {
            mixer,
            store: VolumeStore::open(config.store_path.clone(), config.store_debounce),
            modules: Vec::new(),
            hooks: Vec::new(),
            current: None,
            ringer: RingerMode::On,
            sink_muted: [false; VirtualSink::COUNT],
            source_muted: [false; VirtualSource::COUNT],
        }
    }

    /// Registers a module. Module names must be unique.
    pub fn register_module(&mut self, module: ScenarioModule) -> Result<(), PolicyError> {
        if self.module_index(module.name()).is_some() {
            return Err(PolicyError::InvalidParameter {
                reason: format!("module '{}' already registered", module.name()),
            });
        }
        debug!(module = %module.name(), "scenario module registered");
        self.modules.push(module);
        self.hooks.push(None);
        Ok(())
    }

    /// Attaches lifecycle hooks to a registered module.
    pub fn set_module_hooks(
        &mut self,
        module: &str,
        hooks: Arc<dyn ModuleHooks>,
    ) -> Result<(), PolicyError> {
        let idx = self.module_or_warn(module, "set_module_hooks")?;
        self.hooks[idx] = Some(hooks);
        Ok(())
    }

    /// Adds a scenario to a module, restoring its persisted volume first.
    pub fn add_scenario(&mut self, module: &str, scenario: Scenario) -> Result<(), PolicyError> {
        let idx = self.module_or_warn(module, "add_scenario")?;
        if let Some(level) = self.store.restore(scenario.volume().name()) {
            scenario.volume().set_level(level);
        }
        if let Some(gain) = scenario.mic_gain() {
            if let Some(level) = self.store.restore(gain.name()) {
                gain.set_level(level);
            }
        }
        self.modules[idx].add_scenario(scenario)
    }

    /// Name of the current module, if any.
    pub fn current_module(&self) -> Option<&str> {
        self.current.map(|i| self.modules[i].name())
    }

    /// The current module's current scenario, if any.
    pub fn current_scenario(&self) -> Option<&Scenario> {
        self.current.and_then(|i| self.modules[i].current_scenario())
    }

    /// Read access to a registered module.
    pub fn module(&self, name: &str) -> Option<&ScenarioModule> {
        self.module_index(name).map(|i| &self.modules[i])
    }

    /// Makes `module` the process-wide current module.
    ///
    /// No-op when it already is. Otherwise runs the full switch sequence:
    /// notify old module, mute all endpoints, program the new scenario's
    /// routes and volumes, re-apply mute state, then emit changed-updates
    /// to both modules.
    ///
    /// # Errors
    ///
    /// Rejected without state change if the module is unknown or ends up
    /// with no current scenario to program.
    pub fn make_current(&mut self, module: &str) -> Result<(), PolicyError> {
        let idx = self.module_or_warn(module, "make_current")?;
        if self.current == Some(idx) {
            return Ok(());
        }

        if self.modules[idx].current_scenario().is_none() {
            self.modules[idx].set_current_by_priority();
            if self.modules[idx].current_scenario().is_none() {
                warn!(module, "make_current: module has no enabled scenario");
                return Err(PolicyError::NoCurrent {
                    what: "scenario",
                    operation: "make_current",
                });
            }
        }

        let prev = self.current;
        if let Some(p) = prev {
            if let Some(h) = &self.hooks[p] {
                h.on_deactivated();
            }
        }

        self.current = Some(idx);
        if let Some(h) = &self.hooks[idx] {
            h.on_activating();
        }

        self.program_current(idx)?;

        if let Some(p) = prev {
            if let Some(h) = &self.hooks[p] {
                h.on_changed();
            }
        }
        if let Some(h) = &self.hooks[idx] {
            h.on_changed();
        }
        debug!(module, "module made current");
        Ok(())
    }

    /// Enables a scenario; reprograms if that moved the current module's
    /// current scenario.
    pub fn enable_scenario(&mut self, module: &str, name: &str) -> Result<(), PolicyError> {
        let idx = self.module_or_warn(module, "enable_scenario")?;
        let changed = self.modules[idx].enable_scenario(name)?;
        self.reprogram_if_current(idx, changed)
    }

    /// Disables a scenario; reprograms if that moved the current module's
    /// current scenario.
    pub fn disable_scenario(&mut self, module: &str, name: &str) -> Result<(), PolicyError> {
        let idx = self.module_or_warn(module, "disable_scenario")?;
        let changed = self.modules[idx].disable_scenario(name)?;
        self.reprogram_if_current(idx, changed)
    }

    /// Explicitly selects a scenario within a module, bypassing priority.
    pub fn set_current_scenario(&mut self, module: &str, name: &str) -> Result<(), PolicyError> {
        let idx = self.module_or_warn(module, "set_current_scenario")?;
        let changed = self.modules[idx].set_current_scenario(name)?;
        self.reprogram_if_current(idx, changed)
    }

    /// Re-runs priority arbitration within a module.
    pub fn set_current_by_priority(&mut self, module: &str) -> Result<(), PolicyError> {
        let idx = self.module_or_warn(module, "set_current_by_priority")?;
        let changed = self.modules[idx].set_current_by_priority();
        self.reprogram_if_current(idx, changed)
    }

    /// Switches the ringer mode and reprograms the current scenario's
    /// routing, since the two modes carry independent route tables.
    pub fn set_ringer_mode(&mut self, mode: RingerMode) -> Result<(), PolicyError> {
        if self.ringer == mode {
            return Ok(());
        }
        self.ringer = mode;
        if let Some(idx) = self.current {
            self.program_current(idx)?;
        }
        Ok(())
    }

    /// Sets a scenario's volume within the current module.
    ///
    /// `scenario: None` targets the current scenario. Returns `false` when
    /// the value was already in effect: no hardware call, no changed-update.
    pub fn set_scenario_volume(
        &mut self,
        scenario: Option<&str>,
        level: u8,
    ) -> Result<bool, PolicyError> {
        let idx = self.current_or_warn("set_scenario_volume")?;
        let (volume, is_current) = {
            let module = &self.modules[idx];
            let target = self.resolve_scenario(module, scenario, "set_scenario_volume")?;
            let is_current = module
                .current_scenario()
                .is_some_and(|c| c.name() == target.name());
            (target.volume().clone(), is_current)
        };

        if !volume.set_level(level) {
            return Ok(false);
        }
        self.store.schedule_store(volume.name(), volume.level());

        if is_current {
            self.program_volumes(idx)?;
            if let Some(h) = &self.hooks[idx] {
                h.on_changed();
            }
        }
        Ok(true)
    }

    /// Sets a scenario's mic gain within the current module.
    ///
    /// Same semantics as [`set_scenario_volume`](Self::set_scenario_volume).
    pub fn set_scenario_mic_gain(
        &mut self,
        scenario: Option<&str>,
        gain: u8,
    ) -> Result<bool, PolicyError> {
        let idx = self.current_or_warn("set_scenario_mic_gain")?;
        let (mic_gain, is_current) = {
            let module = &self.modules[idx];
            let target = self.resolve_scenario(module, scenario, "set_scenario_mic_gain")?;
            let mic_gain = target.mic_gain().cloned().ok_or_else(|| {
                warn!(scenario = target.name(), "scenario has no mic gain");
                PolicyError::InvalidParameter {
                    reason: format!("scenario '{}' has no mic gain", target.name()),
                }
            })?;
            let is_current = module
                .current_scenario()
                .is_some_and(|c| c.name() == target.name());
            (mic_gain, is_current)
        };

        if !mic_gain.set_level(gain) {
            return Ok(false);
        }
        self.store.schedule_store(mic_gain.name(), mic_gain.level());

        if is_current {
            self.program_mic_gains(idx)?;
            if let Some(h) = &self.hooks[idx] {
                h.on_changed();
            }
        }
        Ok(true)
    }

    /// Records and programs a sink's mute flag.
    pub fn set_sink_muted(&mut self, sink: VirtualSink, muted: bool) -> Result<(), PolicyError> {
        self.sink_muted[sink.index()] = muted;
        self.mixer.program_mute(Endpoint::Sink(sink), muted)?;
        Ok(())
    }

    /// Records and programs a source's mute flag.
    pub fn set_source_muted(
        &mut self,
        source: VirtualSource,
        muted: bool,
    ) -> Result<(), PolicyError> {
        self.source_muted[source.index()] = muted;
        self.mixer.program_mute(Endpoint::Source(source), muted)?;
        Ok(())
    }

    /// Flushes pending volume-store writes. Call on shutdown.
    pub fn flush(&self) {
        self.store.flush();
    }

    /// Full programming sequence for the module's current scenario:
    /// mute all, routes, volumes, then restore per-endpoint mute state.
    fn program_current(&self, idx: usize) -> Result<(), PolicyError> {
        let Some(scenario) = self.modules[idx].current_scenario() else {
            warn!(module = self.modules[idx].name(), "no current scenario to program");
            return Err(PolicyError::NoCurrent {
                what: "scenario",
                operation: "program_current",
            });
        };

        self.mixer.mute_all()?;

        for sink in VirtualSink::ALL {
            if let Some(route) = scenario.sink_route(self.ringer, sink) {
                if route.routed {
                    self.mixer
                        .program_destination(Endpoint::Sink(sink), route.destination)?;
                }
            }
        }
        for source in VirtualSource::ALL {
            if let Some(route) = scenario.source_route(source) {
                if route.routed {
                    self.mixer
                        .program_destination(Endpoint::Source(source), route.destination)?;
                }
            }
        }

        self.program_volumes(idx)?;
        self.program_mic_gains(idx)?;

        // Unmute last, and only what was not explicitly muted.
        for sink in VirtualSink::ALL {
            if !self.sink_muted[sink.index()] {
                self.mixer.program_mute(Endpoint::Sink(sink), false)?;
            }
        }
        for source in VirtualSource::ALL {
            if !self.source_muted[source.index()] {
                self.mixer.program_mute(Endpoint::Source(source), false)?;
            }
        }
        Ok(())
    }

    /// Programs the scenario volume onto every routed sink.
    fn program_volumes(&self, idx: usize) -> Result<(), PolicyError> {
        let Some(scenario) = self.modules[idx].current_scenario() else {
            return Ok(());
        };
        let level = scenario.volume().level();
        for sink in VirtualSink::ALL {
            if let Some(route) = scenario.sink_route(self.ringer, sink) {
                if route.routed {
                    self.mixer.program_volume(sink, level, false)?;
                }
            }
        }
        Ok(())
    }

    /// Programs the scenario mic gain onto every routed source.
    fn program_mic_gains(&self, idx: usize) -> Result<(), PolicyError> {
        let Some(scenario) = self.modules[idx].current_scenario() else {
            return Ok(());
        };
        let Some(gain) = scenario.mic_gain() else {
            return Ok(());
        };
        let level = gain.level();
        for source in VirtualSource::ALL {
            if let Some(route) = scenario.source_route(source) {
                if route.routed {
                    self.mixer.program_mic_gain(source, level)?;
                }
            }
        }
        Ok(())
    }

    fn reprogram_if_current(&mut self, idx: usize, changed: bool) -> Result<(), PolicyError> {
        if changed && self.current == Some(idx) {
            self.program_current(idx)?;
            if let Some(h) = &self.hooks[idx] {
                h.on_changed();
            }
        }
        Ok(())
    }

    fn resolve_scenario<'a>(
        &self,
        module: &'a ScenarioModule,
        name: Option<&str>,
        operation: &'static str,
    ) -> Result<&'a Scenario, PolicyError> {
        match name {
            Some(n) => module.scenario(n).ok_or_else(|| {
                warn!(module = module.name(), scenario = n, operation, "unknown scenario");
                PolicyError::UnknownScenario {
                    name: n.to_string(),
                }
            }),
            None => module.current_scenario().ok_or_else(|| {
                warn!(module = module.name(), operation, "no current scenario");
                PolicyError::NoCurrent {
                    what: "scenario",
                    operation,
                }
            }),
        }
    }

    fn module_index(&self, name: &str) -> Option<usize> {
        self.modules.iter().position(|m| m.name() == name)
    }

    fn module_or_warn(&self, name: &str, operation: &str) -> Result<usize, PolicyError> {
        self.module_index(name).ok_or_else(|| {
            warn!(module = name, operation, "unknown module");
            PolicyError::UnknownModule {
                name: name.to_string(),
            }
        })
    }

    fn current_or_warn(&self, operation: &'static str) -> Result<usize, PolicyError> {
        self.current.ok_or_else(|| {
            warn!(operation, "no current module");
            PolicyError::NoCurrent {
                what: "module",
                operation,
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::PhysicalDest;
    use crate::scenario::scenario::Priority;
    use crate::volume::Volume;
    use parking_lot::Mutex;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Call {
        Volume(VirtualSink, u8, bool),
        MicGain(VirtualSource, u8),
        Mute(Endpoint, bool),
        Destination(Endpoint, PhysicalDest),
        MuteAll,
    }

    #[derive(Default)]
    struct RecordingMixer {
        calls: Mutex<Vec<Call>>,
    }

    impl RecordingMixer {
        fn calls(&self) -> Vec<Call> {
            self.calls.lock().clone()
        }

        fn clear(&self) {
            self.calls.lock().clear();
        }
    }

    impl Mixer for RecordingMixer {
        fn program_volume(
            &self,
            sink: VirtualSink,
            volume: u8,
            ramp: bool,
        ) -> Result<(), crate::LinkError> {
            self.calls.lock().push(Call::Volume(sink, volume, ramp));
            Ok(())
        }

        fn program_mic_gain(
            &self,
            source: VirtualSource,
            gain: u8,
        ) -> Result<(), crate::LinkError> {
            self.calls.lock().push(Call::MicGain(source, gain));
            Ok(())
        }

        fn program_mute(&self, endpoint: Endpoint, mute: bool) -> Result<(), crate::LinkError> {
            self.calls.lock().push(Call::Mute(endpoint, mute));
            Ok(())
        }

        fn program_destination(
            &self,
            endpoint: Endpoint,
            destination: PhysicalDest,
        ) -> Result<(), crate::LinkError> {
            self.calls.lock().push(Call::Destination(endpoint, destination));
            Ok(())
        }

        fn mute_all(&self) -> Result<(), crate::LinkError> {
            self.calls.lock().push(Call::MuteAll);
            Ok(())
        }
    }

    fn media_scenario(name: &str, priority: i32, volume: Volume, dest: PhysicalDest) -> Scenario {
        Scenario::new(name, Priority::new(priority), volume).route_sink_both(
            VirtualSink::Media,
            dest,
            true,
        )
    }

    fn engine_with_media() -> (Arc<RecordingMixer>, ScenarioEngine) {
        let mixer = Arc::new(RecordingMixer::default());
        let mut engine = ScenarioEngine::new(mixer.clone(), &EngineConfig::default());
        engine.register_module(ScenarioModule::new("media")).unwrap();
        let volume = Volume::new("media", 60);
        engine
            .add_scenario(
                "media",
                media_scenario("media_speaker", 10, volume, PhysicalDest::MainSpeaker),
            )
            .unwrap();
        engine.enable_scenario("media", "media_speaker").unwrap();
        (mixer, engine)
    }

    #[test]
    fn test_make_current_sequence_mute_route_volume_unmute() {
        let (mixer, mut engine) = engine_with_media();
        mixer.clear();

        engine.make_current("media").unwrap();
        let calls = mixer.calls();

        let mute_all = calls.iter().position(|c| *c == Call::MuteAll).unwrap();
        let dest = calls
            .iter()
            .position(|c| matches!(c, Call::Destination(..)))
            .unwrap();
        let volume = calls
            .iter()
            .position(|c| matches!(c, Call::Volume(..)))
            .unwrap();
        let unmute = calls
            .iter()
            .position(|c| matches!(c, Call::Mute(_, false)))
            .unwrap();

        assert!(mute_all < dest, "mute must precede routing");
        assert!(dest < volume, "routing must precede volume");
        assert!(volume < unmute, "unmute must come last");
        assert!(calls.contains(&Call::Volume(VirtualSink::Media, 60, false)));
    }

    #[test]
    fn test_make_current_noop_when_already_current() {
        let (mixer, mut engine) = engine_with_media();
        engine.make_current("media").unwrap();
        mixer.clear();

        engine.make_current("media").unwrap();
        assert!(mixer.calls().is_empty());
    }

    #[test]
    fn test_make_current_unknown_module() {
        let (_, mut engine) = engine_with_media();
        let err = engine.make_current("phone").unwrap_err();
        assert!(matches!(err, PolicyError::UnknownModule { .. }));
        assert_eq!(engine.current_module(), None);
    }

    #[test]
    fn test_module_switch_notifies_hooks_in_order() {
        use std::sync::atomic::{AtomicU32, Ordering};

        #[derive(Default)]
        struct OrderedHooks {
            counter: Arc<AtomicU32>,
            activating: AtomicU32,
            deactivated: AtomicU32,
            changed: AtomicU32,
        }

        impl ModuleHooks for OrderedHooks {
            fn on_activating(&self) {
                self.activating
                    .store(self.counter.fetch_add(1, Ordering::SeqCst) + 1, Ordering::SeqCst);
            }
            fn on_deactivated(&self) {
                self.deactivated
                    .store(self.counter.fetch_add(1, Ordering::SeqCst) + 1, Ordering::SeqCst);
            }
            fn on_changed(&self) {
                self.changed
                    .store(self.counter.fetch_add(1, Ordering::SeqCst) + 1, Ordering::SeqCst);
            }
        }

        let (_, mut engine) = engine_with_media();
        engine.register_module(ScenarioModule::new("phone")).unwrap();
        engine
            .add_scenario(
                "phone",
                media_scenario("phone_earpiece", 70, Volume::new("phone", 80), PhysicalDest::Earpiece),
            )
            .unwrap();
        engine.enable_scenario("phone", "phone_earpiece").unwrap();

        let counter = Arc::new(AtomicU32::new(0));
        let media_hooks = Arc::new(OrderedHooks {
            counter: counter.clone(),
            ..Default::default()
        });
        let phone_hooks = Arc::new(OrderedHooks {
            counter,
            ..Default::default()
        });
        engine.set_module_hooks("media", media_hooks.clone()).unwrap();
        engine.set_module_hooks("phone", phone_hooks.clone()).unwrap();

        engine.make_current("media").unwrap();
        engine.make_current("phone").unwrap();

        let deactivated = media_hooks.deactivated.load(Ordering::SeqCst);
        let activating = phone_hooks.activating.load(Ordering::SeqCst);
        let changed = phone_hooks.changed.load(Ordering::SeqCst);
        assert!(deactivated > 0 && activating > 0 && changed > 0);
        assert!(deactivated < activating, "old module notified before new activates");
        assert!(activating < changed, "changed-update comes after activation");
    }

    #[test]
    fn test_unchanged_volume_set_programs_nothing() {
        let (mixer, mut engine) = engine_with_media();
        engine.make_current("media").unwrap();

        assert!(engine.set_scenario_volume(None, 45).unwrap());
        mixer.clear();

        // Same value again: no hardware call, no changed-update.
        assert!(!engine.set_scenario_volume(None, 45).unwrap());
        assert!(mixer.calls().is_empty());
    }

    #[test]
    fn test_volume_set_on_current_reprograms_immediately() {
        let (mixer, mut engine) = engine_with_media();
        engine.make_current("media").unwrap();
        mixer.clear();

        assert!(engine.set_scenario_volume(None, 80).unwrap());
        assert_eq!(
            mixer.calls(),
            vec![Call::Volume(VirtualSink::Media, 80, false)]
        );
    }

    #[test]
    fn test_volume_set_without_current_module_fails() {
        let (_, mut engine) = engine_with_media();
        let err = engine.set_scenario_volume(None, 50).unwrap_err();
        assert!(matches!(
            err,
            PolicyError::NoCurrent {
                what: "module",
                ..
            }
        ));
    }

    #[test]
    fn test_ringer_mode_switch_reroutes() {
        let mixer = Arc::new(RecordingMixer::default());
        let mut engine = ScenarioEngine::new(mixer.clone(), &EngineConfig::default());
        engine.register_module(ScenarioModule::new("ringtone")).unwrap();
        engine
            .add_scenario(
                "ringtone",
                Scenario::new("ring_default", Priority::new(20), Volume::new("ringtone", 70))
                    .route_sink(RingerMode::On, VirtualSink::Ringtone, PhysicalDest::MainSpeaker, true)
                    .route_sink(RingerMode::Off, VirtualSink::Ringtone, PhysicalDest::MainSpeaker, false),
            )
            .unwrap();
        engine.enable_scenario("ringtone", "ring_default").unwrap();
        engine.make_current("ringtone").unwrap();
        mixer.clear();

        engine.set_ringer_mode(RingerMode::Off).unwrap();
        let calls = mixer.calls();
        // Ringer-off table has the ringtone sink unrouted: no destination
        // programming for it, and no volume either.
        assert!(!calls
            .iter()
            .any(|c| matches!(c, Call::Destination(Endpoint::Sink(VirtualSink::Ringtone), _))));
        assert!(!calls.iter().any(|c| matches!(c, Call::Volume(..))));
        assert!(calls.contains(&Call::MuteAll));
    }

    #[test]
    fn test_mic_gain_requires_mic_volume() {
        let (_, mut engine) = engine_with_media();
        engine.make_current("media").unwrap();

        let err = engine.set_scenario_mic_gain(None, 30).unwrap_err();
        assert!(matches!(err, PolicyError::InvalidParameter { .. }));
    }

    #[test]
    fn test_explicit_mute_survives_reprogram() {
        let (mixer, mut engine) = engine_with_media();
        engine.make_current("media").unwrap();
        engine.set_sink_muted(VirtualSink::Media, true).unwrap();
        mixer.clear();

        // Force a reprogram via ringer switch; media stays muted.
        engine.set_ringer_mode(RingerMode::Off).unwrap();
        let calls = mixer.calls();
        assert!(!calls
            .iter()
            .any(|c| *c == Call::Mute(Endpoint::Sink(VirtualSink::Media), false)));
        assert!(calls
            .iter()
            .any(|c| *c == Call::Mute(Endpoint::Sink(VirtualSink::Alarm), false)));
    }
}
