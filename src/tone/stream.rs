//! Streaming sample provider for a single DTMF tone.

use parking_lot::Mutex;

use crate::link::{PcmProvider, SampleSpec};
use crate::tone::tables::{symbol_table, DtmfSymbol};

/// Lifecycle of a tone stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToneStatus {
    /// Producing samples.
    Normal,
    /// Stop requested; fading out.
    Stopping,
    /// No more samples will be produced.
    Stopped,
    /// Abandoned without playing out (backend went away).
    Disconnected,
}

struct StreamState {
    position: usize,
    produced: u64,
    /// Sample count at which the stream ends. Fixed up front for budgeted
    /// tones, set on a stop request for unbounded ones.
    end: Option<u64>,
    status: ToneStatus,
}

/// One playing tone, read by the audio feeder and controlled by the
/// event loop. Both sides go through the state mutex.
pub struct ToneStream {
    symbol: DtmfSymbol,
    table: &'static [i16],
    rate: u32,
    fade: u32,
    state: Mutex<StreamState>,
}

impl ToneStream {
    /// Creates a stream for `symbol`.
    ///
    /// `budget` is the total number of samples to produce; 0 means
    /// unbounded, playing until [`request_stop`](Self::request_stop).
    pub fn new(symbol: DtmfSymbol, rate: u32, fade: u32, budget: u64) -> Self {
        Self {
            symbol,
            table: symbol_table(symbol, rate),
            rate,
            fade,
            state: Mutex::new(StreamState {
                position: 0,
                produced: 0,
                end: (budget > 0).then_some(budget),
                status: ToneStatus::Normal,
            }),
        }
    }

    /// The symbol this stream plays.
    pub fn symbol(&self) -> DtmfSymbol {
        self.symbol
    }

    /// Current lifecycle status.
    pub fn status(&self) -> ToneStatus {
        self.state.lock().status
    }

    /// Asks the stream to end. Cooperative: the fade-out spans the next
    /// `fade` samples pulled by the feeder, so silence is not immediate.
    pub fn request_stop(&self) {
        let mut state = self.state.lock();
        if state.status != ToneStatus::Normal {
            return;
        }
        let fade_end = state.produced + u64::from(self.fade);
        state.end = Some(match state.end {
            Some(budget) => budget.min(fade_end),
            None => fade_end,
        });
        state.status = ToneStatus::Stopping;
    }

    /// Marks the stream dead without a fade-out.
    pub fn mark_disconnected(&self) {
        let mut state = self.state.lock();
        state.status = ToneStatus::Disconnected;
    }

    /// Whether the stream will produce no further samples.
    pub fn is_finished(&self) -> bool {
        matches!(
            self.status(),
            ToneStatus::Stopped | ToneStatus::Disconnected
        )
    }

    fn gain(&self, produced: u64, end: Option<u64>) -> f32 {
        let fade = u64::from(self.fade);
        let mut gain = 1.0f32;
        if fade > 0 && produced < fade {
            gain *= produced as f32 / fade as f32;
        }
        if let Some(end) = end {
            if fade > 0 && produced >= end.saturating_sub(fade) {
                gain *= (end - produced) as f32 / fade as f32;
            }
        }
        gain
    }
}

impl PcmProvider for ToneStream {
    fn spec(&self) -> SampleSpec {
        SampleSpec::mono_s16(self.rate)
    }

    fn fill(&self, out: &mut [i16]) -> usize {
        let mut state = self.state.lock();
        if matches!(state.status, ToneStatus::Stopped | ToneStatus::Disconnected) {
            return 0;
        }

        let mut written = 0;
        while written < out.len() {
            if let Some(end) = state.end {
                if state.produced >= end {
                    state.status = ToneStatus::Stopped;
                    break;
                }
            }
            let sample = self.table[state.position];
            let gain = self.gain(state.produced, state.end);
            out[written] = (f32::from(sample) * gain) as i16;

            state.position = (state.position + 1) % self.table.len();
            state.produced += 1;
            written += 1;
        }
        written
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RATE: u32 = 44_100;
    const FADE: u32 = 441;

    fn drain(stream: &ToneStream, chunk: usize) -> Vec<i16> {
        let mut all = Vec::new();
        let mut buf = vec![0i16; chunk];
        loop {
            let n = stream.fill(&mut buf);
            if n == 0 {
                break;
            }
            all.extend_from_slice(&buf[..n]);
        }
        all
    }

    #[test]
    fn test_budgeted_tone_produces_exact_sample_count() {
        // 200 ms of '5' at 44.1 kHz is exactly rate/1000 * 200 samples.
        let budget = u64::from(RATE) / 1000 * 200;
        let stream = ToneStream::new(DtmfSymbol::D5, RATE, FADE, budget);

        let samples = drain(&stream, 1_000);
        assert_eq!(samples.len() as u64, budget);
        assert_eq!(stream.status(), ToneStatus::Stopped);

        // Final fade window ramps toward zero.
        let tail = &samples[samples.len() - 8..];
        assert!(tail.iter().all(|&s| s.unsigned_abs() < 2_000));
        assert!(samples[samples.len() - 1].unsigned_abs() < 100);
    }

    #[test]
    fn test_fade_in_starts_silent() {
        let stream = ToneStream::new(DtmfSymbol::D1, RATE, FADE, 0);
        let mut buf = vec![0i16; 4];
        assert_eq!(stream.fill(&mut buf), 4);
        assert_eq!(buf[0], 0);
        assert!(buf.iter().all(|&s| s.unsigned_abs() < 1_000));
    }

    #[test]
    fn test_unbounded_tone_wraps_table() {
        let stream = ToneStream::new(DtmfSymbol::D8, RATE, FADE, 0);
        // Pull more than one table length; the stream must keep going.
        let mut buf = vec![0i16; RATE as usize + 500];
        assert_eq!(stream.fill(&mut buf), buf.len());
        assert_eq!(stream.status(), ToneStatus::Normal);
    }

    #[test]
    fn test_stop_fades_out_then_ends() {
        let stream = ToneStream::new(DtmfSymbol::D3, RATE, FADE, 0);
        let mut buf = vec![0i16; 2_000];
        assert_eq!(stream.fill(&mut buf), 2_000);

        stream.request_stop();
        assert_eq!(stream.status(), ToneStatus::Stopping);

        let rest = drain(&stream, 100);
        assert_eq!(rest.len() as u32, FADE);
        assert!(rest.last().unwrap().unsigned_abs() < 100);
        assert_eq!(stream.status(), ToneStatus::Stopped);
        assert!(stream.is_finished());
    }

    #[test]
    fn test_stop_is_idempotent() {
        let stream = ToneStream::new(DtmfSymbol::D7, RATE, FADE, 0);
        let mut buf = vec![0i16; 100];
        stream.fill(&mut buf);
        stream.request_stop();
        assert_eq!(drain(&stream, 64).len() as u32, FADE);
        stream.request_stop();
        assert_eq!(drain(&stream, 64).len(), 0);
    }

    #[test]
    fn test_disconnected_produces_nothing() {
        let stream = ToneStream::new(DtmfSymbol::Star, RATE, FADE, 0);
        stream.mark_disconnected();
        let mut buf = vec![0i16; 64];
        assert_eq!(stream.fill(&mut buf), 0);
        assert_eq!(stream.status(), ToneStatus::Disconnected);
    }
}
