//! Fan-out of backend-originated events to registered policy modules.
//!
//! Policy modules (alarm, phone, media, ...) live outside this crate; they
//! register here for the endpoints they care about and get called back
//! synchronously, in registration order, on the event-loop context.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::trace;

use crate::endpoint::{EndpointSpec, PhysicalDest, SinkEvent, VirtualSink, VirtualSource};
use crate::link::{BackendKind, PlaybackId, PlaybackStatus};

/// Callbacks the core exposes to policy modules.
///
/// All methods default to no-ops; modules implement what they need.
pub trait PolicyModule: Send + Sync {
    /// Module name, for logs.
    fn name(&self) -> &str;

    /// The control connection to the backend came up (or back up).
    fn on_mixer_connected(&self) {}

    /// A sink's active-stream count crossed an edge.
    fn on_sink_changed(&self, sink: VirtualSink, event: SinkEvent, backend: BackendKind) {
        let _ = (sink, event, backend);
    }

    /// A source's active-stream count crossed an edge.
    fn on_source_changed(&self, source: VirtualSource, event: SinkEvent, backend: BackendKind) {
        let _ = (source, event, backend);
    }

    /// Any input source went active or idle.
    fn on_input_stream_active_changed(&self, active: bool) {
        let _ = active;
    }

    /// A physical device appeared or went away.
    fn on_device_connection_changed(&self, device: PhysicalDest, connected: bool) {
        let _ = (device, connected);
    }

    /// A streamed playback changed state.
    fn on_playback_status(&self, id: PlaybackId, status: PlaybackStatus) {
        let _ = (id, status);
    }
}

/// Shared handle to a registered policy module.
pub type ModuleRef = Arc<dyn PolicyModule>;

#[derive(Default)]
struct Listeners {
    per_sink: Vec<Vec<ModuleRef>>,
    per_source: Vec<Vec<ModuleRef>>,
    /// Every registered module, registration order; used for
    /// connection-level fan-outs.
    all: Vec<ModuleRef>,
}

/// Registry and synchronous fan-out of policy-module callbacks.
pub struct CallbackDispatch {
    listeners: Mutex<Listeners>,
}

impl Default for CallbackDispatch {
    fn default() -> Self {
        Self::new()
    }
}

impl CallbackDispatch {
    /// Creates an empty dispatch table.
    pub fn new() -> Self {
        Self {
            listeners: Mutex::new(Listeners {
                per_sink: vec![Vec::new(); VirtualSink::COUNT],
                per_source: vec![Vec::new(); VirtualSource::COUNT],
                all: Vec::new(),
            }),
        }
    }

    /// Registers `module` for the endpoints matched by `spec`.
    ///
    /// `notify_first` inserts the module at the front of each matched
    /// endpoint's list so it is called before earlier registrants.
    /// Registering the same module for more endpoints is additive; each
    /// endpoint's list holds it at most once.
    pub fn register(&self, module: ModuleRef, spec: EndpointSpec, notify_first: bool) {
        let mut listeners = self.listeners.lock();

        for sink in spec.sinks() {
            insert(&mut listeners.per_sink[sink.index()], &module, notify_first);
        }
        for source in spec.sources() {
            insert(&mut listeners.per_source[source.index()], &module, notify_first);
        }
        if !listeners.all.iter().any(|m| Arc::ptr_eq(m, &module)) {
            listeners.all.push(module);
        }
    }

    /// Removes `module` from every list. Idempotent.
    pub fn unregister(&self, module: &ModuleRef) {
        let mut guard = self.listeners.lock();
        let listeners = &mut *guard;
        for list in listeners
            .per_sink
            .iter_mut()
            .chain(listeners.per_source.iter_mut())
        {
            list.retain(|m| !Arc::ptr_eq(m, module));
        }
        listeners.all.retain(|m| !Arc::ptr_eq(m, module));
    }

    /// Fans a sink edge event out to that sink's listeners, in list order.
    pub fn on_sink_changed(&self, sink: VirtualSink, event: SinkEvent, backend: BackendKind) {
        trace!(%sink, ?event, "sink changed");
        for module in self.snapshot_sink(sink) {
            module.on_sink_changed(sink, event, backend);
        }
    }

    /// Fans a source edge event out to that source's listeners.
    pub fn on_source_changed(&self, source: VirtualSource, event: SinkEvent, backend: BackendKind) {
        trace!(%source, ?event, "source changed");
        for module in self.snapshot_source(source) {
            module.on_source_changed(source, event, backend);
        }
    }

    /// Tells every registered module the backend connection is up.
    pub fn on_mixer_connected(&self) {
        for module in self.snapshot_all() {
            module.on_mixer_connected();
        }
    }

    /// Tells every registered module whether any input stream is active.
    pub fn on_input_stream_active_changed(&self, active: bool) {
        for module in self.snapshot_all() {
            module.on_input_stream_active_changed(active);
        }
    }

    /// Tells every registered module about a device connection change.
    pub fn on_device_connection_changed(&self, device: PhysicalDest, connected: bool) {
        for module in self.snapshot_all() {
            module.on_device_connection_changed(device, connected);
        }
    }

    /// Tells every registered module about a playback status change.
    pub fn on_playback_status(&self, id: PlaybackId, status: PlaybackStatus) {
        for module in self.snapshot_all() {
            module.on_playback_status(id, status);
        }
    }

    fn snapshot_sink(&self, sink: VirtualSink) -> Vec<ModuleRef> {
        self.listeners.lock().per_sink[sink.index()].clone()
    }

    fn snapshot_source(&self, source: VirtualSource) -> Vec<ModuleRef> {
        self.listeners.lock().per_source[source.index()].clone()
    }

    fn snapshot_all(&self) -> Vec<ModuleRef> {
        self.listeners.lock().all.clone()
    }
}

fn insert(list: &mut Vec<ModuleRef>, module: &ModuleRef, notify_first: bool) {
    if list.iter().any(|m| Arc::ptr_eq(m, module)) {
        return;
    }
    if notify_first {
        list.insert(0, module.clone());
    } else {
        list.push(module.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex as PlMutex;

    /// Records the order its callbacks fire in, against a shared log.
    struct LoggingModule {
        name: String,
        log: Arc<PlMutex<Vec<String>>>,
    }

    impl LoggingModule {
        fn new(name: &str, log: Arc<PlMutex<Vec<String>>>) -> Arc<Self> {
            Arc::new(Self {
                name: name.to_string(),
                log,
            })
        }
    }

    impl PolicyModule for LoggingModule {
        fn name(&self) -> &str {
            &self.name
        }

        fn on_sink_changed(&self, sink: VirtualSink, event: SinkEvent, _backend: BackendKind) {
            self.log.lock().push(format!("{}:{sink}:{event:?}", self.name));
        }

        fn on_mixer_connected(&self) {
            self.log.lock().push(format!("{}:connected", self.name));
        }
    }

    fn setup() -> (Arc<PlMutex<Vec<String>>>, CallbackDispatch) {
        (Arc::new(PlMutex::new(Vec::new())), CallbackDispatch::new())
    }

    #[test]
    fn test_fan_out_in_registration_order() {
        let (log, dispatch) = setup();
        let a = LoggingModule::new("a", log.clone());
        let b = LoggingModule::new("b", log.clone());
        dispatch.register(a, EndpointSpec::Sink(VirtualSink::Media), false);
        dispatch.register(b, EndpointSpec::Sink(VirtualSink::Media), false);

        dispatch.on_sink_changed(VirtualSink::Media, SinkEvent::FirstOpened, BackendKind::Pulse);

        let entries = log.lock().clone();
        assert_eq!(entries.len(), 2);
        assert!(entries[0].starts_with("a:"));
        assert!(entries[1].starts_with("b:"));
    }

    #[test]
    fn test_notify_first_preempts() {
        let (log, dispatch) = setup();
        let a = LoggingModule::new("a", log.clone());
        let b = LoggingModule::new("b", log.clone());
        dispatch.register(a, EndpointSpec::Sink(VirtualSink::Media), false);
        dispatch.register(b, EndpointSpec::Sink(VirtualSink::Media), true);

        dispatch.on_sink_changed(VirtualSink::Media, SinkEvent::LastClosed, BackendKind::Pulse);

        let entries = log.lock().clone();
        assert!(entries[0].starts_with("b:"));
        assert!(entries[1].starts_with("a:"));
    }

    #[test]
    fn test_group_registration_covers_all_sinks() {
        let (log, dispatch) = setup();
        let a = LoggingModule::new("a", log.clone());
        dispatch.register(a, EndpointSpec::AllSinks, false);

        dispatch.on_sink_changed(VirtualSink::Alarm, SinkEvent::FirstOpened, BackendKind::Pulse);
        dispatch.on_sink_changed(VirtualSink::Dtmf, SinkEvent::FirstOpened, BackendKind::Pulse);

        assert_eq!(log.lock().len(), 2);
    }

    #[test]
    fn test_unregister_is_idempotent_and_total() {
        let (log, dispatch) = setup();
        let a = LoggingModule::new("a", log.clone());
        let b = LoggingModule::new("b", log.clone());
        let a_ref: ModuleRef = a;
        dispatch.register(a_ref.clone(), EndpointSpec::All, false);
        dispatch.register(b, EndpointSpec::All, false);

        dispatch.unregister(&a_ref);
        dispatch.unregister(&a_ref);

        dispatch.on_sink_changed(VirtualSink::Media, SinkEvent::FirstOpened, BackendKind::Pulse);
        dispatch.on_mixer_connected();

        // "a" is gone from the sink, source and all lists; "b" still fires.
        let entries = log.lock().clone();
        assert_eq!(entries, vec!["b:media:FirstOpened", "b:connected"]);
    }

    #[test]
    fn test_double_register_holds_one_entry() {
        let (log, dispatch) = setup();
        let a = LoggingModule::new("a", log.clone());
        let a_ref: ModuleRef = a;
        dispatch.register(a_ref.clone(), EndpointSpec::Sink(VirtualSink::Media), false);
        dispatch.register(a_ref, EndpointSpec::Sink(VirtualSink::Media), false);

        dispatch.on_sink_changed(VirtualSink::Media, SinkEvent::FirstOpened, BackendKind::Pulse);
        assert_eq!(log.lock().len(), 1);
    }

    #[test]
    fn test_connected_fans_to_all_modules() {
        let (log, dispatch) = setup();
        let a = LoggingModule::new("a", log.clone());
        let b = LoggingModule::new("b", log.clone());
        dispatch.register(a, EndpointSpec::Sink(VirtualSink::Media), false);
        dispatch.register(b, EndpointSpec::Source(VirtualSource::Record), false);

        dispatch.on_mixer_connected();
        assert_eq!(log.lock().len(), 2);
    }
}
