//! DTMF playback control.
//!
//! Policy modules ask for a symbol; the synthesizer owns the one tone
//! that may be playing at a time and feeds it through the native audio
//! connection's streaming path on the DTMF sink.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::debug;

use crate::config::ToneConfig;
use crate::endpoint::VirtualSink;
use crate::error::LinkError;
use crate::link::{NativeAudio, PlaybackId};
use crate::tone::stream::ToneStream;
use crate::tone::tables::DtmfSymbol;

struct CurrentTone {
    stream: Arc<ToneStream>,
    id: PlaybackId,
}

/// Single-voice DTMF synthesizer.
pub struct ToneSynthesizer {
    audio: Arc<NativeAudio>,
    config: ToneConfig,
    current: Mutex<Option<CurrentTone>>,
}

impl ToneSynthesizer {
    /// Creates a synthesizer playing through `audio`.
    pub fn new(audio: Arc<NativeAudio>, config: ToneConfig) -> Self {
        Self {
            audio,
            config,
            current: Mutex::new(None),
        }
    }

    /// Starts a continuous tone for `symbol`.
    ///
    /// Requesting the symbol that is already playing is a no-op; a
    /// different symbol stops the running tone (cooperatively, it fades
    /// out) and starts the new one.
    pub fn play_dtmf(&self, symbol: DtmfSymbol) -> Result<(), LinkError> {
        let mut current = self.current.lock();
        if let Some(tone) = current.as_ref() {
            if tone.stream.symbol() == symbol && !tone.stream.is_finished() {
                debug!(%symbol, "tone already playing");
                return Ok(());
            }
        }
        self.start_locked(&mut current, symbol, 0)
    }

    /// Plays `symbol` for a fixed duration, then lets it fade out on its
    /// own. Interrupts any running tone.
    pub fn play_oneshot_dtmf(
        &self,
        symbol: DtmfSymbol,
        duration: Duration,
    ) -> Result<(), LinkError> {
        let budget = u64::from(self.config.sample_rate) / 1000 * duration.as_millis() as u64;
        let mut current = self.current.lock();
        self.start_locked(&mut current, symbol, budget)
    }

    /// Stops the running tone, if any. The fade-out plays to completion
    /// before the stream ends; silence is not immediate.
    pub fn stop_dtmf(&self) {
        if let Some(tone) = self.current.lock().take() {
            debug!(symbol = %tone.stream.symbol(), id = %tone.id, "tone stopped");
            tone.stream.request_stop();
        }
    }

    /// Symbol of the tone currently playing.
    pub fn current_symbol(&self) -> Option<DtmfSymbol> {
        self.current
            .lock()
            .as_ref()
            .filter(|t| !t.stream.is_finished())
            .map(|t| t.stream.symbol())
    }

    fn start_locked(
        &self,
        current: &mut Option<CurrentTone>,
        symbol: DtmfSymbol,
        budget: u64,
    ) -> Result<(), LinkError> {
        if let Some(tone) = current.take() {
            tone.stream.request_stop();
        }
        let stream = Arc::new(ToneStream::new(
            symbol,
            self.config.sample_rate,
            self.config.fade_samples,
            budget,
        ));
        let id = self
            .audio
            .start_stream(stream.clone(), VirtualSink::Dtmf)?;
        debug!(%symbol, %id, budget, "tone started");
        *current = Some(CurrentTone { stream, id });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LinkConfig;
    use crate::dispatch::CallbackDispatch;
    use crate::link::{NativeBackend, PlaybackStatus, SampleSpec};
    use crate::tone::stream::ToneStatus;
    use std::collections::HashSet;
    use std::path::Path;

    #[derive(Default)]
    struct SinkRecorder {
        ids: Mutex<HashSet<PlaybackId>>,
        samples: Mutex<Vec<i16>>,
    }

    impl NativeBackend for SinkRecorder {
        fn preload(&self, _: &str, _: SampleSpec, _: &Path) -> Result<(), LinkError> {
            Ok(())
        }
        fn play_sample(&self, _: &str, _: VirtualSink) -> Result<(), LinkError> {
            Ok(())
        }
        fn write_stream(
            &self,
            id: PlaybackId,
            _: SampleSpec,
            _: VirtualSink,
            samples: &[i16],
        ) -> Result<(), LinkError> {
            self.ids.lock().insert(id);
            self.samples.lock().extend_from_slice(samples);
            Ok(())
        }
        fn close_stream(&self, _: PlaybackId) {}
    }

    fn synth_with_backend() -> (ToneSynthesizer, Arc<SinkRecorder>, Arc<NativeAudio>) {
        let backend = Arc::new(SinkRecorder::default());
        let audio = Arc::new(NativeAudio::start(
            backend.clone(),
            Arc::new(CallbackDispatch::new()),
            &LinkConfig::default(),
        ));
        let synth = ToneSynthesizer::new(audio.clone(), ToneConfig::default());
        (synth, backend, audio)
    }

    fn wait_for(mut check: impl FnMut() -> bool) -> bool {
        for _ in 0..500 {
            if check() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        false
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_same_symbol_is_noop() {
        let (synth, _backend, audio) = synth_with_backend();

        synth.play_dtmf(DtmfSymbol::D5).unwrap();
        let first = synth.current_symbol();
        synth.play_dtmf(DtmfSymbol::D5).unwrap();
        assert_eq!(synth.current_symbol(), first);
        assert_eq!(first, Some(DtmfSymbol::D5));

        synth.stop_dtmf();
        audio.shutdown();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_different_symbol_interrupts() {
        let (synth, backend, audio) = synth_with_backend();

        synth.play_dtmf(DtmfSymbol::D1).unwrap();
        synth.play_dtmf(DtmfSymbol::D2).unwrap();
        assert_eq!(synth.current_symbol(), Some(DtmfSymbol::D2));

        // Both streams produced audio; the first faded out after the switch.
        assert!(wait_for(|| backend.ids.lock().len() == 2));

        synth.stop_dtmf();
        audio.shutdown();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_stop_clears_current_and_fades() {
        let (synth, _backend, audio) = synth_with_backend();

        synth.play_dtmf(DtmfSymbol::D9).unwrap();
        let stream = {
            let guard = synth.current.lock();
            guard.as_ref().map(|t| t.stream.clone()).unwrap()
        };
        synth.stop_dtmf();
        assert_eq!(synth.current_symbol(), None);
        assert!(wait_for(|| stream.status() == ToneStatus::Stopped));

        audio.shutdown();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_oneshot_plays_budget_and_finishes() {
        let (synth, backend, audio) = synth_with_backend();

        let duration = Duration::from_millis(200);
        synth.play_oneshot_dtmf(DtmfSymbol::D5, duration).unwrap();
        let id = synth.current.lock().as_ref().map(|t| t.id).unwrap();

        assert!(wait_for(|| {
            audio.playback_status(id) == Some(PlaybackStatus::Finished)
        }));
        let expected = 44_100u64 / 1000 * 200;
        assert_eq!(backend.samples.lock().len() as u64, expected);

        audio.shutdown();
    }
}
