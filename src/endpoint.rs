//! Logical audio endpoints.
//!
//! A virtual sink or source is a logical endpoint independent of physical
//! hardware: media, alarm, DTMF, voice-call and friends. The backend
//! reports stream open/close per endpoint; policy decides where each one
//! is physically routed.

use std::fmt;

/// Logical playback endpoints, in wire order.
///
/// The discriminant doubles as the wire id, so the order here is ABI with
/// the backend and must not be rearranged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum VirtualSink {
    /// Music and video playback.
    Media = 0,
    /// Incoming-call ringtone.
    Ringtone = 1,
    /// Alarm clock.
    Alarm = 2,
    /// Countdown timer expiry.
    Timer = 3,
    /// Asynchronous notifications.
    Notification = 4,
    /// UI feedback blips (keypad, touch).
    Feedback = 5,
    /// Text-to-speech output.
    Tts = 6,
    /// Voice-command prompt/response audio.
    VoiceRecognition = 7,
    /// In-call voice downlink.
    Phone = 8,
    /// Keypad DTMF tones.
    Dtmf = 9,
    /// Post-processing effects chain.
    Effects = 10,
}

impl VirtualSink {
    /// All sinks, in wire order.
    pub const ALL: [VirtualSink; 11] = [
        VirtualSink::Media,
        VirtualSink::Ringtone,
        VirtualSink::Alarm,
        VirtualSink::Timer,
        VirtualSink::Notification,
        VirtualSink::Feedback,
        VirtualSink::Tts,
        VirtualSink::VoiceRecognition,
        VirtualSink::Phone,
        VirtualSink::Dtmf,
        VirtualSink::Effects,
    ];

    /// Number of sinks.
    pub const COUNT: usize = Self::ALL.len();

    /// Stable index of this sink (also its wire id).
    pub fn index(self) -> usize {
        self as usize
    }

    /// Looks a sink up by wire id.
    pub fn from_wire(id: u8) -> Option<Self> {
        Self::ALL.get(id as usize).copied()
    }
}

impl fmt::Display for VirtualSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Media => "media",
            Self::Ringtone => "ringtone",
            Self::Alarm => "alarm",
            Self::Timer => "timer",
            Self::Notification => "notification",
            Self::Feedback => "feedback",
            Self::Tts => "tts",
            Self::VoiceRecognition => "voice-recognition",
            Self::Phone => "phone",
            Self::Dtmf => "dtmf",
            Self::Effects => "effects",
        };
        write!(f, "{name}")
    }
}

/// Logical capture endpoints, in wire order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum VirtualSource {
    /// Plain recording (camcorder, memos).
    Record = 0,
    /// Wake-word / quick-voice capture.
    QuickVoice = 1,
    /// In-call voice uplink.
    VoiceCall = 2,
    /// Far-field assistant capture.
    Assistant = 3,
}

impl VirtualSource {
    /// All sources, in wire order.
    pub const ALL: [VirtualSource; 4] = [
        VirtualSource::Record,
        VirtualSource::QuickVoice,
        VirtualSource::VoiceCall,
        VirtualSource::Assistant,
    ];

    /// Number of sources.
    pub const COUNT: usize = Self::ALL.len();

    /// Stable index of this source (also its wire id).
    pub fn index(self) -> usize {
        self as usize
    }

    /// Looks a source up by wire id.
    pub fn from_wire(id: u8) -> Option<Self> {
        Self::ALL.get(id as usize).copied()
    }
}

impl fmt::Display for VirtualSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Record => "record",
            Self::QuickVoice => "quick-voice",
            Self::VoiceCall => "voice-call",
            Self::Assistant => "assistant",
        };
        write!(f, "{name}")
    }
}

/// Either kind of logical endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    /// A playback endpoint.
    Sink(VirtualSink),
    /// A capture endpoint.
    Source(VirtualSource),
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sink(s) => write!(f, "sink/{s}"),
            Self::Source(s) => write!(f, "source/{s}"),
        }
    }
}

/// Edge events on an endpoint's active-stream count.
///
/// Only the edges are events: intermediate increments and decrements while
/// the count stays above zero are silent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkEvent {
    /// The count went 0 → 1.
    FirstOpened,
    /// The count went 1 → 0.
    LastClosed,
}

/// Physical routing destinations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum PhysicalDest {
    /// Built-in speaker / default PCM path.
    #[default]
    MainSpeaker = 0,
    /// Wired headset.
    Headset = 1,
    /// Bluetooth A2DP device.
    A2dp = 2,
    /// Bluetooth SCO (HFP) device.
    Sco = 3,
    /// USB audio card.
    Usb = 4,
    /// In-call earpiece path.
    Earpiece = 5,
}

impl PhysicalDest {
    /// Looks a destination up by wire id.
    pub fn from_wire(id: u8) -> Option<Self> {
        match id {
            0 => Some(Self::MainSpeaker),
            1 => Some(Self::Headset),
            2 => Some(Self::A2dp),
            3 => Some(Self::Sco),
            4 => Some(Self::Usb),
            5 => Some(Self::Earpiece),
            _ => None,
        }
    }
}

/// What a dispatch registration listens to: one endpoint or a named group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointSpec {
    /// A single sink.
    Sink(VirtualSink),
    /// A single source.
    Source(VirtualSource),
    /// Every sink.
    AllSinks,
    /// Every source.
    AllSources,
    /// Every sink and every source.
    All,
}

impl EndpointSpec {
    /// Expands this spec into concrete sinks.
    pub fn sinks(self) -> Vec<VirtualSink> {
        match self {
            Self::Sink(s) => vec![s],
            Self::Source(_) => Vec::new(),
            Self::AllSinks | Self::All => VirtualSink::ALL.to_vec(),
            Self::AllSources => Vec::new(),
        }
    }

    /// Expands this spec into concrete sources.
    pub fn sources(self) -> Vec<VirtualSource> {
        match self {
            Self::Source(s) => vec![s],
            Self::Sink(_) => Vec::new(),
            Self::AllSources | Self::All => VirtualSource::ALL.to_vec(),
            Self::AllSinks => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sink_wire_round_trip() {
        for sink in VirtualSink::ALL {
            assert_eq!(VirtualSink::from_wire(sink.index() as u8), Some(sink));
        }
        assert_eq!(VirtualSink::from_wire(200), None);
    }

    #[test]
    fn test_source_wire_round_trip() {
        for source in VirtualSource::ALL {
            assert_eq!(VirtualSource::from_wire(source.index() as u8), Some(source));
        }
        assert_eq!(VirtualSource::from_wire(99), None);
    }

    #[test]
    fn test_spec_group_expansion() {
        assert_eq!(EndpointSpec::AllSinks.sinks().len(), VirtualSink::COUNT);
        assert!(EndpointSpec::AllSinks.sources().is_empty());
        assert_eq!(EndpointSpec::All.sources().len(), VirtualSource::COUNT);
        assert_eq!(
            EndpointSpec::Sink(VirtualSink::Dtmf).sinks(),
            vec![VirtualSink::Dtmf]
        );
    }

    #[test]
    fn test_display_names() {
        assert_eq!(VirtualSink::VoiceRecognition.to_string(), "voice-recognition");
        assert_eq!(Endpoint::Source(VirtualSource::VoiceCall).to_string(), "source/voice-call");
    }
}
