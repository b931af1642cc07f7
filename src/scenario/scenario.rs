//! Scenario definitions: priority, routing tables, volume bindings.

use std::fmt;

use crate::endpoint::{PhysicalDest, VirtualSink, VirtualSource};
use crate::volume::Volume;

/// Arbitration priority of a scenario.
///
/// Higher wins. [`Priority::LOWEST`] is a sentinel below every real
/// priority, assigned only transiently while re-arbitrating away from a
/// scenario that is being disabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Priority(i32);

impl Priority {
    /// Sentinel below all real priorities.
    pub const LOWEST: Priority = Priority(i32::MIN);

    /// Creates a priority from a raw level.
    pub const fn new(level: i32) -> Self {
        Self(level)
    }

    /// Raw level.
    pub const fn level(self) -> i32 {
        self.0
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Whether the device ringer switch is on.
///
/// Routing-capable scenarios carry one sink route table per ringer mode:
/// with the ringer off, alert-class sinks typically route nowhere audible.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RingerMode {
    /// Ringer switch on: alerts are audible.
    On,
    /// Ringer switch off: alerts are suppressed or rerouted.
    Off,
}

/// One routing-table entry: where an endpoint goes and whether it is
/// routed at all in this scenario.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteEntry {
    /// Physical destination for the endpoint.
    pub destination: PhysicalDest,
    /// `false` leaves the endpoint unrouted (silent) in this scenario.
    pub routed: bool,
}

/// A named routing + volume configuration bound to a device context,
/// e.g. "media over headset".
#[derive(Debug, Clone)]
pub struct Scenario {
    name: String,
    priority: Priority,
    enabled: bool,
    hardwired: bool,
    volume: Volume,
    mic_gain: Option<Volume>,
    ring_routes: [Option<RouteEntry>; VirtualSink::COUNT],
    no_ring_routes: [Option<RouteEntry>; VirtualSink::COUNT],
    source_routes: [Option<RouteEntry>; VirtualSource::COUNT],
}

impl Scenario {
    /// Creates a scenario with no routes.
    ///
    /// Routes are added with [`route_sink`](Self::route_sink) /
    /// [`route_source`](Self::route_source); a scenario without routes is
    /// volume-only.
    pub fn new(name: impl Into<String>, priority: Priority, volume: Volume) -> Self {
        Self {
            name: name.into(),
            priority,
            enabled: false,
            hardwired: false,
            volume,
            mic_gain: None,
            ring_routes: [None; VirtualSink::COUNT],
            no_ring_routes: [None; VirtualSink::COUNT],
            source_routes: [None; VirtualSource::COUNT],
        }
    }

    /// Marks the scenario hardwired: it can never be disabled.
    #[must_use]
    pub fn hardwired(mut self) -> Self {
        self.hardwired = true;
        self.enabled = true;
        self
    }

    /// Attaches a mic-gain volume.
    #[must_use]
    pub fn with_mic_gain(mut self, mic_gain: Volume) -> Self {
        self.mic_gain = Some(mic_gain);
        self
    }

    /// Sets the route for `sink` in the given ringer mode.
    #[must_use]
    pub fn route_sink(
        mut self,
        mode: RingerMode,
        sink: VirtualSink,
        destination: PhysicalDest,
        routed: bool,
    ) -> Self {
        let entry = Some(RouteEntry {
            destination,
            routed,
        });
        match mode {
            RingerMode::On => self.ring_routes[sink.index()] = entry,
            RingerMode::Off => self.no_ring_routes[sink.index()] = entry,
        }
        self
    }

    /// Sets the route for `sink` identically in both ringer modes.
    #[must_use]
    pub fn route_sink_both(
        self,
        sink: VirtualSink,
        destination: PhysicalDest,
        routed: bool,
    ) -> Self {
        self.route_sink(RingerMode::On, sink, destination, routed)
            .route_sink(RingerMode::Off, sink, destination, routed)
    }

    /// Sets the route for `source`.
    #[must_use]
    pub fn route_source(
        mut self,
        source: VirtualSource,
        destination: PhysicalDest,
        routed: bool,
    ) -> Self {
        self.source_routes[source.index()] = Some(RouteEntry {
            destination,
            routed,
        });
        self
    }

    /// Scenario name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current priority.
    pub fn priority(&self) -> Priority {
        self.priority
    }

    pub(crate) fn set_priority(&mut self, priority: Priority) {
        self.priority = priority;
    }

    /// Whether the scenario participates in arbitration.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub(crate) fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Whether the scenario is hardwired (cannot be disabled).
    pub fn is_hardwired(&self) -> bool {
        self.hardwired
    }

    /// The scenario's shared volume.
    pub fn volume(&self) -> &Volume {
        &self.volume
    }

    /// The scenario's mic-gain volume, if it has one.
    pub fn mic_gain(&self) -> Option<&Volume> {
        self.mic_gain.as_ref()
    }

    /// Route for `sink` under the given ringer mode, if one is configured.
    pub fn sink_route(&self, mode: RingerMode, sink: VirtualSink) -> Option<RouteEntry> {
        match mode {
            RingerMode::On => self.ring_routes[sink.index()],
            RingerMode::Off => self.no_ring_routes[sink.index()],
        }
    }

    /// Route for `source`, if one is configured.
    pub fn source_route(&self, source: VirtualSource) -> Option<RouteEntry> {
        self.source_routes[source.index()]
    }

    /// Whether the scenario carries any routing tables at all.
    pub fn is_routing_capable(&self) -> bool {
        self.ring_routes.iter().any(Option::is_some)
            || self.no_ring_routes.iter().any(Option::is_some)
            || self.source_routes.iter().any(Option::is_some)
    }
}
