//! Per-endpoint active-stream accounting.
//!
//! Tracks how many backend streams are open on each virtual sink/source
//! and turns raw open/close records into edge events:
//!
//! ```text
//! Closed(count=0) --open-->  Open    emits FirstOpened
//! Open            --open-->  Open    count++, no event
//! Open            --close--> Open    count--, no event (count still > 0)
//! Open            --close--> Closed  emits LastClosed
//! ```
//!
//! Counts never go negative: a close at zero is clamped and logged.

use tracing::warn;

use crate::endpoint::{SinkEvent, VirtualSink, VirtualSource};

/// Open-stream counters for every endpoint of one backend connection.
#[derive(Debug, Default)]
pub struct EndpointAccounting {
    sink_counts: [u32; VirtualSink::COUNT],
    source_counts: [u32; VirtualSource::COUNT],
}

impl EndpointAccounting {
    /// Creates zeroed accounting.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a stream open on `sink`.
    pub fn sink_opened(&mut self, sink: VirtualSink) -> Option<SinkEvent> {
        let count = &mut self.sink_counts[sink.index()];
        *count += 1;
        (*count == 1).then_some(SinkEvent::FirstOpened)
    }

    /// Records a stream close on `sink`.
    pub fn sink_closed(&mut self, sink: VirtualSink) -> Option<SinkEvent> {
        let count = &mut self.sink_counts[sink.index()];
        match *count {
            0 => {
                warn!(%sink, "close on sink with zero open streams");
                None
            }
            1 => {
                *count = 0;
                Some(SinkEvent::LastClosed)
            }
            _ => {
                *count -= 1;
                None
            }
        }
    }

    /// Records a stream open on `source`.
    pub fn source_opened(&mut self, source: VirtualSource) -> Option<SinkEvent> {
        let count = &mut self.source_counts[source.index()];
        *count += 1;
        (*count == 1).then_some(SinkEvent::FirstOpened)
    }

    /// Records a stream close on `source`.
    pub fn source_closed(&mut self, source: VirtualSource) -> Option<SinkEvent> {
        let count = &mut self.source_counts[source.index()];
        match *count {
            0 => {
                warn!(%source, "close on source with zero open streams");
                None
            }
            1 => {
                *count = 0;
                Some(SinkEvent::LastClosed)
            }
            _ => {
                *count -= 1;
                None
            }
        }
    }

    /// Open-stream count on `sink`.
    pub fn sink_count(&self, sink: VirtualSink) -> u32 {
        self.sink_counts[sink.index()]
    }

    /// Open-stream count on `source`.
    pub fn source_count(&self, source: VirtualSource) -> u32 {
        self.source_counts[source.index()]
    }

    /// Whether `sink` has any open stream.
    pub fn is_sink_audible(&self, sink: VirtualSink) -> bool {
        self.sink_count(sink) > 0
    }

    /// Sinks with at least one open stream.
    pub fn active_sinks(&self) -> Vec<VirtualSink> {
        VirtualSink::ALL
            .into_iter()
            .filter(|s| self.sink_count(*s) > 0)
            .collect()
    }

    /// Whether any source has an open stream.
    pub fn any_source_active(&self) -> bool {
        self.source_counts.iter().any(|&c| c > 0)
    }

    /// Total open streams across all sinks.
    pub fn total_streams(&self) -> u32 {
        self.sink_counts.iter().sum()
    }

    /// Zeroes every counter, returning the endpoints that were open.
    ///
    /// Used on reconnect: the new session starts with no knowledge of the
    /// old one, so every previously-open endpoint must be reported closed
    /// before any fresh events are accepted.
    pub fn drain(&mut self) -> (Vec<VirtualSink>, Vec<VirtualSource>) {
        let sinks = self.active_sinks();
        let sources: Vec<VirtualSource> = VirtualSource::ALL
            .into_iter()
            .filter(|s| self.source_count(*s) > 0)
            .collect();
        self.sink_counts = [0; VirtualSink::COUNT];
        self.source_counts = [0; VirtualSource::COUNT];
        (sinks, sources)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_open_and_last_close_emit_edges() {
        let mut acc = EndpointAccounting::new();
        assert_eq!(acc.sink_opened(VirtualSink::Media), Some(SinkEvent::FirstOpened));
        assert_eq!(acc.sink_opened(VirtualSink::Media), None);
        assert_eq!(acc.sink_count(VirtualSink::Media), 2);

        assert_eq!(acc.sink_closed(VirtualSink::Media), None);
        assert_eq!(acc.sink_closed(VirtualSink::Media), Some(SinkEvent::LastClosed));
        assert_eq!(acc.sink_count(VirtualSink::Media), 0);
    }

    #[test]
    fn test_count_never_negative() {
        let mut acc = EndpointAccounting::new();
        assert_eq!(acc.sink_closed(VirtualSink::Alarm), None);
        assert_eq!(acc.sink_count(VirtualSink::Alarm), 0);

        assert_eq!(acc.source_closed(VirtualSource::Record), None);
        assert_eq!(acc.source_count(VirtualSource::Record), 0);
    }

    #[test]
    fn test_paired_open_close_round_trip() {
        let mut acc = EndpointAccounting::new();
        let before = acc.active_sinks();

        acc.sink_opened(VirtualSink::Notification);
        acc.sink_closed(VirtualSink::Notification);

        assert_eq!(acc.active_sinks(), before);
    }

    #[test]
    fn test_drain_reports_open_endpoints_and_zeroes() {
        let mut acc = EndpointAccounting::new();
        acc.sink_opened(VirtualSink::Media);
        acc.sink_opened(VirtualSink::Media);
        acc.sink_opened(VirtualSink::Phone);
        acc.source_opened(VirtualSource::VoiceCall);

        let (sinks, sources) = acc.drain();
        assert_eq!(sinks, vec![VirtualSink::Media, VirtualSink::Phone]);
        assert_eq!(sources, vec![VirtualSource::VoiceCall]);
        assert_eq!(acc.total_streams(), 0);
        assert!(!acc.any_source_active());

        // Second drain has nothing left to report.
        let (sinks, sources) = acc.drain();
        assert!(sinks.is_empty() && sources.is_empty());
    }

    #[test]
    fn test_audibility_tracks_count() {
        let mut acc = EndpointAccounting::new();
        assert!(!acc.is_sink_audible(VirtualSink::Dtmf));
        acc.sink_opened(VirtualSink::Dtmf);
        assert!(acc.is_sink_audible(VirtualSink::Dtmf));
    }

    #[test]
    fn test_source_activity() {
        let mut acc = EndpointAccounting::new();
        assert!(!acc.any_source_active());
        acc.source_opened(VirtualSource::Assistant);
        assert!(acc.any_source_active());
        acc.source_closed(VirtualSource::Assistant);
        assert!(!acc.any_source_active());
    }
}
