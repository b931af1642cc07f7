//! Native audio-library connection: sample preload, one-shot playback,
//! and push-streaming of arbitrary PCM providers.
//!
//! The backend library only exposes a blocking API, so one dedicated
//! thread runs its loop and every streamed playback gets a feeder thread
//! that pulls samples from its [`PcmProvider`]. PCM travels between the
//! two over a lock-free ring buffer; the threads otherwise share only a
//! few atomics per stream.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use ringbuf::traits::{Consumer, Producer, Split};
use ringbuf::{HeapCons, HeapRb};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::config::LinkConfig;
use crate::dispatch::CallbackDispatch;
use crate::endpoint::VirtualSink;
use crate::error::LinkError;

/// Samples pulled from a provider per feeder iteration.
const FEED_CHUNK: usize = 1024;
/// Per-stream ring capacity in samples.
const RING_CAPACITY: usize = 8192;
/// Sleep used by both threads when a ring is full/empty.
const PUMP_INTERVAL: Duration = Duration::from_millis(2);

/// PCM sample encoding for preloaded files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleFormat {
    /// Signed 16-bit little-endian.
    S16Le,
    /// Unsigned 8-bit.
    U8,
}

/// Format tag for preloaded samples and streamed PCM.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleSpec {
    /// Sample encoding.
    pub format: SampleFormat,
    /// Frames per second.
    pub rate: u32,
    /// Interleaved channel count.
    pub channels: u16,
}

impl SampleSpec {
    /// Mono signed 16-bit at the given rate, the shape tone synthesis uses.
    pub fn mono_s16(rate: u32) -> Self {
        Self {
            format: SampleFormat::S16Le,
            rate,
            channels: 1,
        }
    }
}

/// Identifies one streamed playback session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PlaybackId(u64);

impl std::fmt::Display for PlaybackId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "playback-{}", self.0)
    }
}

/// Lifecycle of a streamed playback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackStatus {
    /// Samples are flowing.
    Playing,
    /// Held by a pause request.
    Paused,
    /// Ended by an explicit stop.
    Stopped,
    /// Provider ran out of samples and the ring drained.
    Finished,
    /// The backend rejected a write.
    Failed,
}

impl PlaybackStatus {
    /// Whether the playback can still make progress.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Stopped | Self::Finished | Self::Failed)
    }
}

/// Control verbs for [`NativeAudio::control_playback`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackControl {
    /// Hold the stream without tearing it down.
    Pause,
    /// Resume a paused stream.
    Resume,
    /// End the stream.
    Stop,
}

/// Source of interleaved 16-bit PCM for a streamed playback.
///
/// `fill` is called from the feeder thread, so implementations guard
/// their own state.
pub trait PcmProvider: Send + Sync + 'static {
    /// Format of the samples `fill` produces.
    fn spec(&self) -> SampleSpec;

    /// Copies up to `out.len()` samples into `out` and returns how many
    /// were written. Zero means the stream has ended.
    fn fill(&self, out: &mut [i16]) -> usize;
}

/// Blocking seam over the platform audio library.
///
/// Every method is called from the dedicated backend thread, never from
/// the event loop.
pub trait NativeBackend: Send + Sync + 'static {
    /// Loads a named sample into the backend's cache.
    fn preload(&self, name: &str, spec: SampleSpec, path: &Path) -> Result<(), LinkError>;

    /// Plays a previously preloaded sample on a sink.
    fn play_sample(&self, name: &str, sink: VirtualSink) -> Result<(), LinkError>;

    /// Pushes a block of PCM for a streamed playback, blocking until the
    /// backend has accepted it.
    fn write_stream(
        &self,
        id: PlaybackId,
        spec: SampleSpec,
        sink: VirtualSink,
        samples: &[i16],
    ) -> Result<(), LinkError>;

    /// Releases backend-side state for a finished playback.
    fn close_stream(&self, id: PlaybackId);
}

// Control/status words; u8 so both threads can share them as atomics.
const CTRL_RUN: u8 = 0;
const CTRL_PAUSE: u8 = 1;
const CTRL_STOP: u8 = 2;

struct StreamShared {
    control: AtomicU8,
    status: AtomicU8,
    producer_done: AtomicBool,
}

impl StreamShared {
    fn new() -> Self {
        Self {
            control: AtomicU8::new(CTRL_RUN),
            status: AtomicU8::new(Self::encode(PlaybackStatus::Playing)),
            producer_done: AtomicBool::new(false),
        }
    }

    fn encode(status: PlaybackStatus) -> u8 {
        match status {
            PlaybackStatus::Playing => 0,
            PlaybackStatus::Paused => 1,
            PlaybackStatus::Stopped => 2,
            PlaybackStatus::Finished => 3,
            PlaybackStatus::Failed => 4,
        }
    }

    fn status(&self) -> PlaybackStatus {
        match self.status.load(Ordering::SeqCst) {
            0 => PlaybackStatus::Playing,
            1 => PlaybackStatus::Paused,
            2 => PlaybackStatus::Stopped,
            3 => PlaybackStatus::Finished,
            _ => PlaybackStatus::Failed,
        }
    }

    fn set_status(&self, status: PlaybackStatus) {
        self.status.store(Self::encode(status), Ordering::SeqCst);
    }

    fn control(&self) -> u8 {
        self.control.load(Ordering::SeqCst)
    }
}

enum Job {
    Preload {
        name: String,
        spec: SampleSpec,
        path: PathBuf,
        done: oneshot::Sender<Result<(), LinkError>>,
    },
    Play {
        name: String,
        sink: VirtualSink,
        done: oneshot::Sender<Result<(), LinkError>>,
    },
    StartStream {
        id: PlaybackId,
        spec: SampleSpec,
        sink: VirtualSink,
        ring: HeapCons<i16>,
        shared: Arc<StreamShared>,
    },
    Shutdown,
}

/// Handle to the native audio connection.
pub struct NativeAudio {
    backend: Arc<dyn NativeBackend>,
    jobs: mpsc::UnboundedSender<Job>,
    preloaded: Mutex<HashSet<String>>,
    streams: Mutex<HashMap<PlaybackId, Arc<StreamShared>>>,
    next_id: AtomicU64,
    preload_timeout: Duration,
    thread: Mutex<Option<std::thread::JoinHandle<()>>>,
}

impl NativeAudio {
    /// Starts the backend thread and returns the handle.
    pub fn start(
        backend: Arc<dyn NativeBackend>,
        dispatch: Arc<CallbackDispatch>,
        config: &LinkConfig,
    ) -> Self {
        let (jobs, rx) = mpsc::unbounded_channel();
        let thread_backend = backend.clone();
        let thread = std::thread::Builder::new()
            .name("native-audio".into())
            .spawn(move || backend_loop(thread_backend, dispatch, rx))
            .ok();
        if thread.is_none() {
            warn!("failed to spawn native audio thread");
        }
        Self {
            backend,
            jobs,
            preloaded: Mutex::new(HashSet::new()),
            streams: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            preload_timeout: config.preload_timeout,
            thread: Mutex::new(thread),
        }
    }

    /// Loads a sample file into the backend cache, deduplicated by name.
    ///
    /// A name that was already loaded completes immediately. The load
    /// itself runs on the backend thread; this only awaits its
    /// completion, bounded by the configured preload timeout.
    pub async fn preload(
        &self,
        name: &str,
        spec: SampleSpec,
        path: impl Into<PathBuf>,
    ) -> Result<(), LinkError> {
        if self.preloaded.lock().contains(name) {
            debug!(name, "sample already preloaded");
            return Ok(());
        }
        let (done, rx) = oneshot::channel();
        self.jobs
            .send(Job::Preload {
                name: name.to_string(),
                spec,
                path: path.into(),
                done,
            })
            .map_err(|_| LinkError::native("audio thread gone"))?;

        match tokio::time::timeout(self.preload_timeout, rx).await {
            Ok(Ok(Ok(()))) => {
                self.preloaded.lock().insert(name.to_string());
                Ok(())
            }
            Ok(Ok(Err(e))) => Err(e),
            Ok(Err(_)) => Err(LinkError::native("audio thread gone")),
            Err(_) => Err(LinkError::native(format!(
                "preload of '{name}' timed out after {:?}",
                self.preload_timeout
            ))),
        }
    }

    /// Whether a sample name has completed preload.
    pub fn is_preloaded(&self, name: &str) -> bool {
        self.preloaded.lock().contains(name)
    }

    /// One-shot playback of a preloaded sample on a sink.
    pub async fn play_sample(&self, name: &str, sink: VirtualSink) -> Result<(), LinkError> {
        if !self.is_preloaded(name) {
            return Err(LinkError::native(format!("sample '{name}' not preloaded")));
        }
        let (done, rx) = oneshot::channel();
        self.jobs
            .send(Job::Play {
                name: name.to_string(),
                sink,
                done,
            })
            .map_err(|_| LinkError::native("audio thread gone"))?;
        match tokio::time::timeout(self.preload_timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(LinkError::native("audio thread gone")),
            Err(_) => Err(LinkError::native(format!("playback of '{name}' timed out"))),
        }
    }

    /// Starts streaming a PCM provider to a sink.
    ///
    /// Spawns the feeder thread and returns the new playback's id; status
    /// transitions are reported through the callback dispatcher.
    pub fn start_stream(
        &self,
        provider: Arc<dyn PcmProvider>,
        sink: VirtualSink,
    ) -> Result<PlaybackId, LinkError> {
        let id = PlaybackId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let spec = provider.spec();
        let shared = Arc::new(StreamShared::new());

        let (mut prod, ring) = HeapRb::<i16>::new(RING_CAPACITY).split();
        let feeder_shared = shared.clone();
        std::thread::Builder::new()
            .name(format!("pcm-feed-{}", id.0))
            .spawn(move || {
                let mut chunk = vec![0i16; FEED_CHUNK];
                'feed: loop {
                    match feeder_shared.control() {
                        CTRL_STOP => break 'feed,
                        CTRL_PAUSE => {
                            std::thread::sleep(PUMP_INTERVAL);
                            continue;
                        }
                        _ => {}
                    }
                    let n = provider.fill(&mut chunk);
                    if n == 0 {
                        break 'feed;
                    }
                    let mut off = 0;
                    while off < n {
                        if feeder_shared.control() == CTRL_STOP {
                            break 'feed;
                        }
                        off += prod.push_slice(&chunk[off..n]);
                        if off < n {
                            std::thread::sleep(PUMP_INTERVAL);
                        }
                    }
                }
                feeder_shared.producer_done.store(true, Ordering::SeqCst);
            })
            .map_err(|e| LinkError::native(format!("failed to spawn feeder: {e}")))?;

        self.jobs
            .send(Job::StartStream {
                id,
                spec,
                sink,
                ring,
                shared: shared.clone(),
            })
            .map_err(|_| LinkError::native("audio thread gone"))?;

        let mut streams = self.streams.lock();
        streams.retain(|_, s| !s.status().is_terminal());
        streams.insert(id, shared);
        debug!(%id, ?sink, "stream started");
        Ok(id)
    }

    /// Pauses, resumes, or stops a streamed playback.
    pub fn control_playback(
        &self,
        id: PlaybackId,
        control: PlaybackControl,
    ) -> Result<(), LinkError> {
        let streams = self.streams.lock();
        let shared = streams
            .get(&id)
            .ok_or_else(|| LinkError::native(format!("unknown {id}")))?;
        match control {
            PlaybackControl::Pause => {
                shared.control.store(CTRL_PAUSE, Ordering::SeqCst);
                if shared.status() == PlaybackStatus::Playing {
                    shared.set_status(PlaybackStatus::Paused);
                }
            }
            PlaybackControl::Resume => {
                shared.control.store(CTRL_RUN, Ordering::SeqCst);
                if shared.status() == PlaybackStatus::Paused {
                    shared.set_status(PlaybackStatus::Playing);
                }
            }
            PlaybackControl::Stop => {
                shared.control.store(CTRL_STOP, Ordering::SeqCst);
            }
        }
        Ok(())
    }

    /// Last observed status of a playback, if it is still tracked.
    pub fn playback_status(&self, id: PlaybackId) -> Option<PlaybackStatus> {
        self.streams.lock().get(&id).map(|s| s.status())
    }

    /// Direct access to the backend seam.
    pub fn backend(&self) -> &Arc<dyn NativeBackend> {
        &self.backend
    }

    /// Stops the backend thread. Streams in flight are ended.
    pub fn shutdown(&self) {
        for shared in self.streams.lock().values() {
            shared.control.store(CTRL_STOP, Ordering::SeqCst);
        }
        let _ = self.jobs.send(Job::Shutdown);
        if let Some(handle) = self.thread.lock().take() {
            let _ = handle.join();
        }
    }
}

struct ActiveStream {
    id: PlaybackId,
    spec: SampleSpec,
    sink: VirtualSink,
    ring: HeapCons<i16>,
    shared: Arc<StreamShared>,
    buf: Vec<i16>,
}

/// Dedicated thread: runs backend jobs and pumps active stream rings.
fn backend_loop(
    backend: Arc<dyn NativeBackend>,
    dispatch: Arc<CallbackDispatch>,
    mut jobs: mpsc::UnboundedReceiver<Job>,
) {
    let mut streams: Vec<ActiveStream> = Vec::new();
    loop {
        if streams.is_empty() {
            match jobs.blocking_recv() {
                None | Some(Job::Shutdown) => break,
                Some(job) => handle_job(&backend, &mut streams, job),
            }
        } else {
            loop {
                match jobs.try_recv() {
                    Ok(Job::Shutdown) => return,
                    Ok(job) => handle_job(&backend, &mut streams, job),
                    Err(mpsc::error::TryRecvError::Empty) => break,
                    Err(mpsc::error::TryRecvError::Disconnected) => return,
                }
            }
        }

        streams.retain_mut(|stream| pump_stream(&backend, &dispatch, stream));
        if !streams.is_empty() {
            std::thread::sleep(PUMP_INTERVAL);
        }
    }
}

fn handle_job(backend: &Arc<dyn NativeBackend>, streams: &mut Vec<ActiveStream>, job: Job) {
    match job {
        Job::Preload {
            name,
            spec,
            path,
            done,
        } => {
            let result = backend.preload(&name, spec, &path);
            if let Err(e) = &result {
                warn!(name, error = %e, "sample preload failed");
            }
            let _ = done.send(result);
        }
        Job::Play { name, sink, done } => {
            let _ = done.send(backend.play_sample(&name, sink));
        }
        Job::StartStream {
            id,
            spec,
            sink,
            ring,
            shared,
        } => streams.push(ActiveStream {
            id,
            spec,
            sink,
            ring,
            shared,
            buf: vec![0i16; FEED_CHUNK],
        }),
        Job::Shutdown => {}
    }
}

/// One pump iteration for a stream; `false` removes it from the set.
fn pump_stream(
    backend: &Arc<dyn NativeBackend>,
    dispatch: &Arc<CallbackDispatch>,
    stream: &mut ActiveStream,
) -> bool {
    match stream.shared.control() {
        CTRL_STOP => {
            backend.close_stream(stream.id);
            stream.shared.set_status(PlaybackStatus::Stopped);
            dispatch.on_playback_status(stream.id, PlaybackStatus::Stopped);
            return false;
        }
        CTRL_PAUSE => return true,
        _ => {}
    }

    let n = stream.ring.pop_slice(&mut stream.buf);
    if n > 0 {
        if let Err(e) = backend.write_stream(stream.id, stream.spec, stream.sink, &stream.buf[..n])
        {
            warn!(id = %stream.id, error = %e, "stream write failed");
            backend.close_stream(stream.id);
            stream.shared.set_status(PlaybackStatus::Failed);
            dispatch.on_playback_status(stream.id, PlaybackStatus::Failed);
            return false;
        }
        return true;
    }

    if stream.shared.producer_done.load(Ordering::SeqCst) {
        backend.close_stream(stream.id);
        stream.shared.set_status(PlaybackStatus::Finished);
        dispatch.on_playback_status(stream.id, PlaybackStatus::Finished);
        return false;
    }
    true
}
