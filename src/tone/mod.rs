//! DTMF tone synthesis: precomputed dual-tone tables, streaming tone
//! provider with fade envelopes, and the single-voice synthesizer.

mod stream;
mod synth;
pub mod tables;

pub use stream::{ToneStatus, ToneStream};
pub use synth::ToneSynthesizer;
pub use tables::DtmfSymbol;
