//! Socket client for the backend mixer's control protocol.
//!
//! The link runs as one background task that owns the socket. Policy code
//! talks to it through a cloneable [`MixerLink`] handle: programming
//! commands are enqueued fire-and-forget, module/device loads are
//! correlated calls awaited through the pending-reply table.
//!
//! On hang-up or a fatal send/recv error the connection is torn down and
//! rebuilt with bounded exponential backoff. A successful reconnect first
//! drains endpoint accounting to zero, replaying synthetic closed events,
//! so no listener retains a stale "open" belief from the previous session.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::UnixStream;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::LinkConfig;
use crate::dispatch::CallbackDispatch;
use crate::endpoint::{Endpoint, PhysicalDest, SinkEvent, VirtualSink, VirtualSource};
use crate::error::LinkError;
use crate::event::{EventCallback, MixerEvent};
use crate::link::accounting::EndpointAccounting;
use crate::link::pending::PendingReplies;
use crate::link::wire::{self, Command, DeviceOp, Effect, Header, Inbound, ModuleOp, ParamKey};
use crate::link::{BackendKind, Capability, Mixer};

/// How the link reaches the backend's control socket.
///
/// The production transport dials a Unix socket; tests substitute their
/// own listener.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// One connection attempt.
    async fn connect(&self) -> std::io::Result<UnixStream>;

    /// Where this transport points, for logs.
    fn describe(&self) -> String;
}

struct UnixTransport {
    path: PathBuf,
}

#[async_trait]
impl Transport for UnixTransport {
    async fn connect(&self) -> std::io::Result<UnixStream> {
        UnixStream::connect(&self.path).await
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// Counters surfaced for monitoring, in the style of session stats.
#[derive(Debug, Clone, Default)]
pub struct LinkStats {
    /// Connection attempts since startup.
    pub connect_attempts: u64,
    /// Commands dropped without being sent.
    pub commands_dropped: u64,
    /// Correlated commands that timed out.
    pub replies_timed_out: u64,
    /// Inbound records skipped as malformed.
    pub records_malformed: u64,
}

#[derive(Default)]
struct StatCells {
    connect_attempts: AtomicU64,
    commands_dropped: AtomicU64,
    replies_timed_out: AtomicU64,
    records_malformed: AtomicU64,
}

/// State shared between the handle and the link task.
struct LinkShared {
    backend: BackendKind,
    connected: AtomicBool,
    accounting: Mutex<EndpointAccounting>,
    devices: Mutex<HashSet<PhysicalDest>>,
    stats: StatCells,
    on_event: Option<EventCallback>,
}

impl LinkShared {
    fn emit(&self, event: MixerEvent) {
        if let Some(cb) = &self.on_event {
            cb(event);
        }
    }
}

enum LinkRequest {
    Send(Command),
    Call(Command, oneshot::Sender<Result<u8, LinkError>>),
    Shutdown,
}

/// Handle to the backend mixer link.
///
/// Cheap to clone; all clones drive the same connection.
#[derive(Clone)]
pub struct MixerLink {
    tx: mpsc::UnboundedSender<LinkRequest>,
    shared: Arc<LinkShared>,
}

impl MixerLink {
    /// Spawns the link task and returns the handle plus its join handle.
    ///
    /// The task connects (and reconnects) to `config.socket_path` until
    /// [`shutdown`](Self::shutdown) is called.
    pub fn spawn(
        config: LinkConfig,
        backend: BackendKind,
        dispatch: Arc<CallbackDispatch>,
        on_event: Option<EventCallback>,
    ) -> (Self, JoinHandle<()>) {
        let transport = Arc::new(UnixTransport {
            path: config.socket_path.clone(),
        });
        Self::spawn_with_transport(config, backend, dispatch, on_event, transport)
    }

    /// [`spawn`](Self::spawn) with an explicit transport.
    pub fn spawn_with_transport(
        config: LinkConfig,
        backend: BackendKind,
        dispatch: Arc<CallbackDispatch>,
        on_event: Option<EventCallback>,
        transport: Arc<dyn Transport>,
    ) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let shared = Arc::new(LinkShared {
            backend,
            connected: AtomicBool::new(false),
            accounting: Mutex::new(EndpointAccounting::new()),
            devices: Mutex::new(HashSet::new()),
            stats: StatCells::default(),
            on_event,
        });

        let task = LinkTask {
            config,
            transport,
            dispatch,
            shared: shared.clone(),
            rx,
            pending: None,
        };
        let handle = tokio::spawn(task.run());
        (Self { tx, shared }, handle)
    }

    /// Which backend this link speaks to.
    pub fn backend(&self) -> BackendKind {
        self.shared.backend
    }

    /// Whether the control connection is currently up.
    pub fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::SeqCst)
    }

    /// Current monitoring counters.
    pub fn stats(&self) -> LinkStats {
        let s = &self.shared.stats;
        LinkStats {
            connect_attempts: s.connect_attempts.load(Ordering::SeqCst),
            commands_dropped: s.commands_dropped.load(Ordering::SeqCst),
            replies_timed_out: s.replies_timed_out.load(Ordering::SeqCst),
            records_malformed: s.records_malformed.load(Ordering::SeqCst),
        }
    }

    /// Open-stream count on a sink, as reported by the backend.
    pub fn stream_count(&self, sink: VirtualSink) -> u32 {
        self.shared.accounting.lock().sink_count(sink)
    }

    /// Sinks with at least one open stream.
    pub fn active_streams(&self) -> Vec<VirtualSink> {
        self.shared.accounting.lock().active_sinks()
    }

    /// Whether a sink currently has open streams.
    pub fn is_sink_audible(&self, sink: VirtualSink) -> bool {
        self.shared.accounting.lock().is_sink_audible(sink)
    }

    /// Toggles a post-processing effect. Correlated.
    pub async fn program_filter(&self, effect: Effect, enabled: bool) -> Result<(), LinkError> {
        self.require(Capability::Effects, "program_filter")?;
        self.call(Command::SetEffect { effect, enabled }).await
    }

    /// Sets a sink latency hint in milliseconds.
    pub fn program_latency(&self, latency_ms: i32) -> Result<(), LinkError> {
        self.require(Capability::Latency, "program_latency")?;
        self.send(Command::SetParam {
            key: ParamKey::Latency,
            value: latency_ms,
        })
    }

    /// Sets stereo balance, -100..=100.
    pub fn program_balance(&self, balance: i32) -> Result<(), LinkError> {
        self.require(Capability::Balance, "program_balance")?;
        if !(-100..=100).contains(&balance) {
            return Err(LinkError::protocol(format!("balance {balance} out of range")));
        }
        self.send(Command::SetParam {
            key: ParamKey::Balance,
            value: balance,
        })
    }

    /// Suspends the whole backend.
    pub fn suspend_all(&self) -> Result<(), LinkError> {
        self.require(Capability::Suspend, "suspend_all")?;
        self.send(Command::Suspend)
    }

    /// Switches the backend sample rate. Correlated.
    pub async fn update_rate(&self, rate: u32) -> Result<(), LinkError> {
        self.require(Capability::UpdateRate, "update_rate")?;
        self.call(Command::UpdateRate { rate }).await
    }

    /// Loads or unloads a backend module (Bluetooth profiles). Correlated.
    pub async fn set_module(
        &self,
        op: ModuleOp,
        load: bool,
        arg: impl Into<String>,
    ) -> Result<(), LinkError> {
        self.call(Command::SetModule {
            op,
            load,
            arg: arg.into(),
        })
        .await
    }

    /// Loads or unloads a sound card. Correlated.
    pub async fn set_device(
        &self,
        op: DeviceOp,
        load: bool,
        card: impl Into<String>,
    ) -> Result<(), LinkError> {
        self.call(Command::SetDevice {
            op,
            load,
            card: card.into(),
        })
        .await
    }

    /// Stops the link task. Further commands fail with `NotConnected`.
    pub fn shutdown(&self) {
        let _ = self.tx.send(LinkRequest::Shutdown);
    }

    fn require(&self, capability: Capability, operation: &'static str) -> Result<(), LinkError> {
        if self.shared.backend.supports(capability) {
            Ok(())
        } else {
            Err(LinkError::Unsupported {
                operation,
                backend: self.shared.backend.name(),
            })
        }
    }

    /// Enqueues a fire-and-forget command.
    fn send(&self, command: Command) -> Result<(), LinkError> {
        if !self.is_connected() {
            self.drop_command("not connected");
            return Err(LinkError::NotConnected);
        }
        self.tx.send(LinkRequest::Send(command)).map_err(|_| {
            self.drop_command("link task gone");
            LinkError::NotConnected
        })
    }

    /// Sends a correlated command and awaits its reply.
    async fn call(&self, command: Command) -> Result<(), LinkError> {
        debug_assert!(wire::expects_reply(&command));
        if !self.is_connected() {
            self.drop_command("not connected");
            return Err(LinkError::NotConnected);
        }
        let (tx, rx) = oneshot::channel();
        self.tx
            .send(LinkRequest::Call(command, tx))
            .map_err(|_| LinkError::NotConnected)?;
        match rx.await {
            Ok(Ok(0)) => Ok(()),
            Ok(Ok(status)) => Err(LinkError::Rejected { status }),
            Ok(Err(e)) => {
                if matches!(e, LinkError::ReplyTimeout { .. }) {
                    self.shared
                        .stats
                        .replies_timed_out
                        .fetch_add(1, Ordering::SeqCst);
                }
                Err(e)
            }
            Err(_) => Err(LinkError::connection_lost("link task dropped reply")),
        }
    }

    fn drop_command(&self, reason: &str) {
        self.shared.stats.commands_dropped.fetch_add(1, Ordering::SeqCst);
        warn!(reason, "command dropped");
        self.shared.emit(MixerEvent::CommandDropped {
            reason: reason.to_string(),
        });
    }
}

/// With no active streams a volume change always steps immediately; a
/// ramp on a silent sink would just delay the new level.
fn effective_ramp(active_streams: u32, ramp: bool) -> bool {
    ramp && active_streams > 0
}

impl Mixer for MixerLink {
    fn program_volume(&self, sink: VirtualSink, volume: u8, ramp: bool) -> Result<(), LinkError> {
        let active = self.shared.accounting.lock().sink_count(sink);
        self.send(Command::SetVolume {
            sink,
            level: volume.min(crate::volume::MAX_LEVEL),
            ramp: effective_ramp(active, ramp),
        })
    }

    fn program_mic_gain(&self, source: VirtualSource, gain: u8) -> Result<(), LinkError> {
        self.send(Command::SetMicGain {
            source,
            gain: gain.min(crate::volume::MAX_LEVEL),
        })
    }

    fn program_mute(&self, endpoint: Endpoint, mute: bool) -> Result<(), LinkError> {
        let (id, is_source) = endpoint_wire(endpoint);
        self.send(Command::SetMute {
            endpoint: id,
            is_source,
            mute,
        })
    }

    fn program_destination(
        &self,
        endpoint: Endpoint,
        destination: PhysicalDest,
    ) -> Result<(), LinkError> {
        let (id, is_source) = endpoint_wire(endpoint);
        self.send(Command::SetRouting {
            endpoint: id,
            is_source,
            destination,
            routed: true,
        })
    }

    fn mute_all(&self) -> Result<(), LinkError> {
        for sink in VirtualSink::ALL {
            self.program_mute(Endpoint::Sink(sink), true)?;
        }
        for source in VirtualSource::ALL {
            self.program_mute(Endpoint::Source(source), true)?;
        }
        Ok(())
    }
}

fn endpoint_wire(endpoint: Endpoint) -> (u8, bool) {
    match endpoint {
        Endpoint::Sink(s) => (s.index() as u8, false),
        Endpoint::Source(s) => (s.index() as u8, true),
    }
}

enum SessionEnd {
    Shutdown,
    Lost(LinkError),
}

enum ReaderEvent {
    Record(Inbound),
    Closed(LinkError),
}

struct LinkTask {
    config: LinkConfig,
    transport: Arc<dyn Transport>,
    dispatch: Arc<CallbackDispatch>,
    shared: Arc<LinkShared>,
    rx: mpsc::UnboundedReceiver<LinkRequest>,
    pending: Option<PendingReplies>,
}

impl LinkTask {
    async fn run(mut self) {
        let mut delay = self.config.reconnect_initial;
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            self.shared
                .stats
                .connect_attempts
                .fetch_add(1, Ordering::SeqCst);

            match self.transport.connect().await {
                Ok(stream) => {
                    info!(peer = %self.transport.describe(), "mixer backend connected");
                    delay = self.config.reconnect_initial;
                    attempt = 0;
                    self.on_connected();

                    match self.session(stream).await {
                        SessionEnd::Shutdown => {
                            self.teardown(&LinkError::connection_lost("shutdown"));
                            return;
                        }
                        SessionEnd::Lost(reason) => {
                            warn!(%reason, "mixer backend connection lost");
                            self.teardown(&reason);
                            self.shared.emit(MixerEvent::Disconnected {
                                reason: reason.to_string(),
                            });
                        }
                    }
                }
                Err(e) => {
                    debug!(error = %e, attempt, "mixer backend connect failed");
                }
            }

            self.shared.emit(MixerEvent::Reconnecting {
                attempt,
                delay_ms: delay.as_millis() as u64,
            });
            if self.wait_backoff(delay).await {
                return;
            }
            delay = (delay * 2).min(self.config.reconnect_max);
        }
    }

    /// New session: force all stale open counts to zero and tell listeners
    /// before any record from the fresh connection is processed.
    fn on_connected(&mut self) {
        self.pending = Some(PendingReplies::new(self.config.reply_deadline));

        let (sinks, sources) = self.shared.accounting.lock().drain();
        for sink in sinks {
            self.dispatch
                .on_sink_changed(sink, SinkEvent::LastClosed, self.shared.backend);
        }
        for source in sources {
            self.dispatch
                .on_source_changed(source, SinkEvent::LastClosed, self.shared.backend);
        }

        self.shared.connected.store(true, Ordering::SeqCst);
        self.dispatch.on_mixer_connected();
        self.shared.emit(MixerEvent::Connected);
    }

    fn teardown(&mut self, reason: &LinkError) {
        self.shared.connected.store(false, Ordering::SeqCst);
        if let Some(pending) = &mut self.pending {
            pending.fail_all(reason);
        }
        self.pending = None;
    }

    async fn session(&mut self, stream: UnixStream) -> SessionEnd {
        let (rd, mut wr) = stream.into_split();
        let (inbound_tx, mut inbound_rx) = mpsc::unbounded_channel();
        let reader = tokio::spawn(read_records(rd, inbound_tx, self.shared.clone()));

        let mut sweep = tokio::time::interval(self.config.sweep_interval);
        sweep.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        let end = loop {
            tokio::select! {
                req = self.rx.recv() => match req {
                    None | Some(LinkRequest::Shutdown) => break SessionEnd::Shutdown,
                    Some(LinkRequest::Send(cmd)) => {
                        if let Err(e) = write_record(&mut wr, &cmd, 0).await {
                            break SessionEnd::Lost(e);
                        }
                    }
                    Some(LinkRequest::Call(cmd, tx)) => match self.pending.as_mut() {
                        Some(pending) => match pending.insert(tx) {
                            Ok(id) => {
                                if let Err(e) = write_record(&mut wr, &cmd, id).await {
                                    break SessionEnd::Lost(e);
                                }
                            }
                            Err(tx) => {
                                let _ = tx.send(Err(LinkError::protocol("correlation table full")));
                            }
                        },
                        None => {
                            let _ = tx.send(Err(LinkError::NotConnected));
                        }
                    },
                },
                event = inbound_rx.recv() => match event {
                    Some(ReaderEvent::Record(inbound)) => {
                        if let Err(e) = self.handle_inbound(inbound, &mut wr).await {
                            break SessionEnd::Lost(e);
                        }
                    }
                    Some(ReaderEvent::Closed(reason)) => break SessionEnd::Lost(reason),
                    None => break SessionEnd::Lost(LinkError::connection_lost("reader gone")),
                },
                _ = sweep.tick() => {
                    if let Some(pending) = self.pending.as_mut() {
                        for msg_id in pending.sweep(Instant::now()) {
                            self.shared.emit(MixerEvent::ReplyTimeout { msg_id });
                        }
                    }
                }
            }
        };

        reader.abort();
        end
    }

    async fn handle_inbound(
        &mut self,
        inbound: Inbound,
        wr: &mut OwnedWriteHalf,
    ) -> Result<(), LinkError> {
        match inbound {
            Inbound::SinkOpened(sink) => {
                let event = self.shared.accounting.lock().sink_opened(sink);
                if let Some(event) = event {
                    self.dispatch.on_sink_changed(sink, event, self.shared.backend);
                }
            }
            Inbound::SinkClosed(sink) => {
                let event = self.shared.accounting.lock().sink_closed(sink);
                if let Some(event) = event {
                    self.dispatch.on_sink_changed(sink, event, self.shared.backend);
                }
            }
            Inbound::SourceOpened(source) => {
                let event = self.shared.accounting.lock().source_opened(source);
                if let Some(event) = event {
                    // First open: pick the capture path with the source
                    // muted, then unmute into the chosen route.
                    let path = self.input_path();
                    self.program_source(wr, source, true).await?;
                    self.route_source(wr, source, path).await?;
                    self.program_source(wr, source, false).await?;
                    self.dispatch.on_source_changed(source, event, self.shared.backend);
                }
            }
            Inbound::SourceClosed(source) => {
                let event = self.shared.accounting.lock().source_closed(source);
                if let Some(event) = event {
                    // Last close: mute first, then park the route back on
                    // the default path.
                    self.program_source(wr, source, true).await?;
                    self.route_source(wr, source, PhysicalDest::MainSpeaker).await?;
                    self.dispatch.on_source_changed(source, event, self.shared.backend);
                }
            }
            Inbound::DeviceConnected { device, card } => {
                debug!(?device, card, "device connected");
                self.shared.devices.lock().insert(device);
                self.dispatch.on_device_connection_changed(device, true);
            }
            Inbound::DeviceRemoved { device, card } => {
                debug!(?device, card, "device removed");
                self.shared.devices.lock().remove(&device);
                self.dispatch.on_device_connection_changed(device, false);
            }
            Inbound::Reply { msg_id, status } => {
                if let Some(pending) = self.pending.as_mut() {
                    pending.complete(msg_id, status);
                }
            }
            Inbound::InputStreamActive(active) => {
                self.dispatch.on_input_stream_active_changed(active);
            }
        }
        Ok(())
    }

    /// Capture-path decision: prefer SCO, then USB, else the default path.
    fn input_path(&self) -> PhysicalDest {
        let devices = self.shared.devices.lock();
        if devices.contains(&PhysicalDest::Sco) {
            PhysicalDest::Sco
        } else if devices.contains(&PhysicalDest::Usb) {
            PhysicalDest::Usb
        } else {
            PhysicalDest::MainSpeaker
        }
    }

    async fn program_source(
        &self,
        wr: &mut OwnedWriteHalf,
        source: VirtualSource,
        mute: bool,
    ) -> Result<(), LinkError> {
        write_record(
            wr,
            &Command::SetMute {
                endpoint: source.index() as u8,
                is_source: true,
                mute,
            },
            0,
        )
        .await
    }

    async fn route_source(
        &self,
        wr: &mut OwnedWriteHalf,
        source: VirtualSource,
        destination: PhysicalDest,
    ) -> Result<(), LinkError> {
        write_record(
            wr,
            &Command::SetRouting {
                endpoint: source.index() as u8,
                is_source: true,
                destination,
                routed: true,
            },
            0,
        )
        .await
    }

    /// Sleeps out the backoff delay while still answering shutdown and
    /// rejecting commands that race the disconnect.
    ///
    /// Returns `true` on shutdown.
    async fn wait_backoff(&mut self, delay: Duration) -> bool {
        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);
        loop {
            tokio::select! {
                _ = &mut sleep => return false,
                req = self.rx.recv() => match req {
                    None | Some(LinkRequest::Shutdown) => return true,
                    Some(LinkRequest::Send(_)) => {
                        self.shared.stats.commands_dropped.fetch_add(1, Ordering::SeqCst);
                    }
                    Some(LinkRequest::Call(_, tx)) => {
                        let _ = tx.send(Err(LinkError::NotConnected));
                    }
                },
            }
        }
    }
}

/// Writes one record, treating a short write as fatal.
///
/// A half-written record would desynchronize the fixed framing, so the
/// command is dropped and the connection torn down rather than retried.
async fn write_record(
    wr: &mut OwnedWriteHalf,
    command: &Command,
    msg_id: u8,
) -> Result<(), LinkError> {
    let record = command.encode(msg_id);
    match wr.write(&record).await {
        Ok(n) if n == record.len() => Ok(()),
        Ok(n) => {
            warn!(sent = n, expected = record.len(), "short send, dropping command");
            Err(LinkError::protocol(format!(
                "short send: {n} of {} bytes",
                record.len()
            )))
        }
        Err(e) => Err(LinkError::connection_lost(e.to_string())),
    }
}

/// Reader half: parses records and forwards them to the session loop.
///
/// Malformed payloads are logged and skipped; a broken header or I/O error
/// ends the session (framing can no longer be trusted).
async fn read_records(
    mut rd: OwnedReadHalf,
    tx: mpsc::UnboundedSender<ReaderEvent>,
    shared: Arc<LinkShared>,
) {
    let mut header_buf = [0u8; wire::HEADER_LEN];
    loop {
        if let Err(e) = rd.read_exact(&mut header_buf).await {
            let _ = tx.send(ReaderEvent::Closed(LinkError::connection_lost(e.to_string())));
            return;
        }
        let header = match Header::decode(&header_buf) {
            Ok(h) => h,
            Err(e) => {
                let _ = tx.send(ReaderEvent::Closed(e));
                return;
            }
        };
        let mut payload = vec![0u8; header.length as usize];
        if let Err(e) = rd.read_exact(&mut payload).await {
            let _ = tx.send(ReaderEvent::Closed(LinkError::connection_lost(e.to_string())));
            return;
        }
        match wire::decode_record(&header, &payload) {
            Ok(inbound) => {
                if tx.send(ReaderEvent::Record(inbound)).is_err() {
                    return;
                }
            }
            Err(e) => {
                warn!(error = %e, msg_type = header.msg_type, "malformed record skipped");
                shared.stats.records_malformed.fetch_add(1, Ordering::SeqCst);
                shared.emit(MixerEvent::MalformedRecord {
                    reason: e.to_string(),
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_streams_forces_immediate_volume() {
        // The ramp argument is overridden whenever nothing is playing.
        assert!(!effective_ramp(0, true));
        assert!(!effective_ramp(0, false));
        assert!(effective_ramp(1, true));
        assert!(!effective_ramp(3, false));
    }

    #[test]
    fn test_endpoint_wire_ids() {
        assert_eq!(endpoint_wire(Endpoint::Sink(VirtualSink::Media)), (0, false));
        assert_eq!(
            endpoint_wire(Endpoint::Source(VirtualSource::VoiceCall)),
            (2, true)
        );
    }

    #[tokio::test]
    async fn test_disconnected_commands_fail_and_count() {
        let dispatch = Arc::new(CallbackDispatch::new());
        let config = LinkConfig {
            socket_path: std::path::PathBuf::from("/nonexistent/tonebus-test"),
            ..Default::default()
        };
        let (link, task) = MixerLink::spawn(config, BackendKind::Pulse, dispatch, None);

        assert!(!link.is_connected());
        let err = link
            .program_volume(VirtualSink::Media, 50, false)
            .unwrap_err();
        assert!(matches!(err, LinkError::NotConnected));
        assert_eq!(link.stats().commands_dropped, 1);

        link.shutdown();
        let _ = task.await;
    }

    #[tokio::test]
    async fn test_umi_backend_rejects_balance() {
        let dispatch = Arc::new(CallbackDispatch::new());
        let (link, task) = MixerLink::spawn(
            LinkConfig::default(),
            BackendKind::Umi,
            dispatch,
            None,
        );

        let err = link.program_balance(10).unwrap_err();
        assert!(matches!(err, LinkError::Unsupported { .. }));

        link.shutdown();
        let _ = task.await;
    }

    #[tokio::test]
    async fn test_balance_range_check() {
        let dispatch = Arc::new(CallbackDispatch::new());
        let (link, task) = MixerLink::spawn(
            LinkConfig::default(),
            BackendKind::Pulse,
            dispatch,
            None,
        );

        let err = link.program_balance(250).unwrap_err();
        assert!(matches!(err, LinkError::Protocol { .. }));

        link.shutdown();
        let _ = task.await;
    }
}
