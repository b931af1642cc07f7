//! Control-protocol records.
//!
//! Every record is a 5-byte header followed by a fixed-length payload whose
//! shape is determined by the message type. Encoding and decoding are
//! explicit field-by-field functions over [`bytes`] buffers - raw bytes are
//! never reinterpreted as structs - and inbound dispatch is an exhaustive
//! match on the message type.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::endpoint::{PhysicalDest, VirtualSink, VirtualSource};
use crate::error::LinkError;

/// Header length on the wire.
pub const HEADER_LEN: usize = 5;
/// Protocol version carried in every header.
pub const WIRE_VERSION: u8 = 1;
/// Fixed reserved byte.
pub const WIRE_RESERVED: u8 = 1;
/// Fixed width of the module argument field (Bluetooth address + profile).
pub const MODULE_ARG_LEN: usize = 24;
/// Fixed width of card-name fields.
pub const CARD_NAME_LEN: usize = 32;
/// Sanity bound on payload length; nothing we speak is larger.
pub const MAX_PAYLOAD: usize = 64;

// Outbound message types.
const MSG_SET_VOLUME: u8 = 0x01;
const MSG_SET_ROUTING: u8 = 0x02;
const MSG_SET_MUTE: u8 = 0x03;
const MSG_SET_MIC_GAIN: u8 = 0x04;
const MSG_SET_MODULE: u8 = 0x05;
const MSG_SET_DEVICE: u8 = 0x06;
const MSG_SET_EFFECT: u8 = 0x07;
const MSG_SET_PARAM: u8 = 0x08;
const MSG_SUSPEND: u8 = 0x09;
const MSG_UPDATE_RATE: u8 = 0x0a;

// Inbound message types.
const MSG_SINK_OPENED: u8 = 0x40;
const MSG_SINK_CLOSED: u8 = 0x41;
const MSG_SOURCE_OPENED: u8 = 0x42;
const MSG_SOURCE_CLOSED: u8 = 0x43;
const MSG_DEVICE_CONNECTED: u8 = 0x44;
const MSG_DEVICE_REMOVED: u8 = 0x45;
const MSG_REPLY: u8 = 0x46;
const MSG_INPUT_ACTIVE: u8 = 0x47;

/// Record header: {msg_type, reserved=1, version=1, length, msg_id}.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Message type, selects the payload shape.
    pub msg_type: u8,
    /// Payload length in bytes.
    pub length: u8,
    /// Correlation id; meaningful on correlated commands and replies.
    pub msg_id: u8,
}

impl Header {
    /// Appends this header to `buf`.
    pub fn encode(&self, buf: &mut BytesMut) {
        buf.put_u8(self.msg_type);
        buf.put_u8(WIRE_RESERVED);
        buf.put_u8(WIRE_VERSION);
        buf.put_u8(self.length);
        buf.put_u8(self.msg_id);
    }

    /// Decodes a header from exactly [`HEADER_LEN`] bytes.
    ///
    /// # Errors
    ///
    /// Rejects version mismatches and oversized payload lengths.
    pub fn decode(raw: &[u8; HEADER_LEN]) -> Result<Self, LinkError> {
        let version = raw[2];
        if version != WIRE_VERSION {
            return Err(LinkError::protocol(format!(
                "unsupported wire version {version}"
            )));
        }
        let length = raw[3];
        if length as usize > MAX_PAYLOAD {
            return Err(LinkError::protocol(format!(
                "payload length {length} exceeds {MAX_PAYLOAD}"
            )));
        }
        Ok(Self {
            msg_type: raw[0],
            length,
            msg_id: raw[4],
        })
    }
}

/// Backend module loads/unloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ModuleOp {
    /// Bluetooth A2DP output module.
    BluetoothA2dp = 0,
    /// Bluetooth SCO (HFP) module.
    BluetoothSco = 1,
    /// A2DP source (device acts as speaker for a phone).
    A2dpSource = 2,
}

impl ModuleOp {
    /// Looks a module op up by wire id.
    pub fn from_wire(id: u8) -> Option<Self> {
        match id {
            0 => Some(Self::BluetoothA2dp),
            1 => Some(Self::BluetoothSco),
            2 => Some(Self::A2dpSource),
            _ => None,
        }
    }
}

/// Backend device (card) loads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DeviceOp {
    /// Built-in sound card.
    Internal = 0,
    /// Hot-plugged USB card.
    UsbCard = 1,
}

/// Post-processing effects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Effect {
    /// Loudness normalization.
    NormalizeVolume = 0,
    /// Acoustic echo cancellation.
    EchoCancel = 1,
    /// Capture noise suppression.
    NoiseSuppress = 2,
}

/// Generic numeric parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ParamKey {
    /// Per-sink latency hint, in ms.
    Latency = 0,
    /// Stereo balance, -100..=100.
    Balance = 1,
}

/// Outbound control commands, one variant per payload shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Program a sink's software volume.
    SetVolume {
        /// Target sink.
        sink: VirtualSink,
        /// Level 0-100.
        level: u8,
        /// Ramp to the level instead of stepping.
        ramp: bool,
    },
    /// Point an endpoint at a physical destination.
    SetRouting {
        /// Endpoint wire id.
        endpoint: u8,
        /// Sink (false) or source (true).
        is_source: bool,
        /// Destination.
        destination: PhysicalDest,
        /// Whether the endpoint is routed at all.
        routed: bool,
    },
    /// Mute or unmute an endpoint.
    SetMute {
        /// Endpoint wire id.
        endpoint: u8,
        /// Sink (false) or source (true).
        is_source: bool,
        /// Mute flag.
        mute: bool,
    },
    /// Program a source's capture gain.
    SetMicGain {
        /// Target source.
        source: VirtualSource,
        /// Gain 0-100.
        gain: u8,
    },
    /// Load or unload a backend module.
    SetModule {
        /// Which module.
        op: ModuleOp,
        /// Load (true) or unload.
        load: bool,
        /// Module argument (Bluetooth address/profile), NUL-padded on the
        /// wire to [`MODULE_ARG_LEN`].
        arg: String,
    },
    /// Load or unload a sound card.
    SetDevice {
        /// Which kind of card.
        op: DeviceOp,
        /// Load (true) or unload.
        load: bool,
        /// Card name, NUL-padded on the wire to [`CARD_NAME_LEN`].
        card: String,
    },
    /// Toggle a post-processing effect.
    SetEffect {
        /// Which effect.
        effect: Effect,
        /// On/off.
        enabled: bool,
    },
    /// Set a generic numeric parameter.
    SetParam {
        /// Which parameter.
        key: ParamKey,
        /// Signed value.
        value: i32,
    },
    /// Suspend the whole backend.
    Suspend,
    /// Switch the backend sample rate.
    UpdateRate {
        /// New rate in Hz.
        rate: u32,
    },
}

impl Command {
    /// Wire message type of this command.
    pub fn msg_type(&self) -> u8 {
        match self {
            Self::SetVolume { .. } => MSG_SET_VOLUME,
            Self::SetRouting { .. } => MSG_SET_ROUTING,
            Self::SetMute { .. } => MSG_SET_MUTE,
            Self::SetMicGain { .. } => MSG_SET_MIC_GAIN,
            Self::SetModule { .. } => MSG_SET_MODULE,
            Self::SetDevice { .. } => MSG_SET_DEVICE,
            Self::SetEffect { .. } => MSG_SET_EFFECT,
            Self::SetParam { .. } => MSG_SET_PARAM,
            Self::Suspend => MSG_SUSPEND,
            Self::UpdateRate { .. } => MSG_UPDATE_RATE,
        }
    }

    /// Encodes the full record (header + payload) with `msg_id`.
    pub fn encode(&self, msg_id: u8) -> Bytes {
        let mut payload = BytesMut::with_capacity(MAX_PAYLOAD);
        match self {
            Self::SetVolume { sink, level, ramp } => {
                payload.put_u8(sink.index() as u8);
                payload.put_u8(*level);
                payload.put_u8(u8::from(*ramp));
            }
            Self::SetRouting {
                endpoint,
                is_source,
                destination,
                routed,
            } => {
                payload.put_u8(*endpoint);
                payload.put_u8(u8::from(*is_source));
                payload.put_u8(*destination as u8);
                payload.put_u8(u8::from(*routed));
            }
            Self::SetMute {
                endpoint,
                is_source,
                mute,
            } => {
                payload.put_u8(*endpoint);
                payload.put_u8(u8::from(*is_source));
                payload.put_u8(u8::from(*mute));
            }
            Self::SetMicGain { source, gain } => {
                payload.put_u8(source.index() as u8);
                payload.put_u8(*gain);
            }
            Self::SetModule { op, load, arg } => {
                payload.put_u8(*op as u8);
                payload.put_u8(u8::from(*load));
                put_fixed_str(&mut payload, arg, MODULE_ARG_LEN);
            }
            Self::SetDevice { op, load, card } => {
                payload.put_u8(*op as u8);
                payload.put_u8(u8::from(*load));
                put_fixed_str(&mut payload, card, CARD_NAME_LEN);
            }
            Self::SetEffect { effect, enabled } => {
                payload.put_u8(*effect as u8);
                payload.put_u8(u8::from(*enabled));
            }
            Self::SetParam { key, value } => {
                payload.put_u8(*key as u8);
                payload.put_i32_le(*value);
            }
            Self::Suspend => {}
            Self::UpdateRate { rate } => {
                payload.put_u32_le(*rate);
            }
        }

        let header = Header {
            msg_type: self.msg_type(),
            length: payload.len() as u8,
            msg_id,
        };
        let mut record = BytesMut::with_capacity(HEADER_LEN + payload.len());
        header.encode(&mut record);
        record.extend_from_slice(&payload);
        record.freeze()
    }
}

/// Inbound records from the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// A stream opened on a sink.
    SinkOpened(VirtualSink),
    /// A stream closed on a sink.
    SinkClosed(VirtualSink),
    /// A stream opened on a source.
    SourceOpened(VirtualSource),
    /// A stream closed on a source.
    SourceClosed(VirtualSource),
    /// A physical device appeared.
    DeviceConnected {
        /// Which device.
        device: PhysicalDest,
        /// Backend's card name for it.
        card: String,
    },
    /// A physical device went away.
    DeviceRemoved {
        /// Which device.
        device: PhysicalDest,
        /// Backend's card name for it.
        card: String,
    },
    /// Reply to a correlated command; `msg_id` comes from the header.
    Reply {
        /// Correlation id of the command being answered.
        msg_id: u8,
        /// 0 = ok, anything else is a backend failure code.
        status: u8,
    },
    /// Input-stream activity changed.
    InputStreamActive(bool),
}

/// Decodes the payload for an already-validated header.
///
/// # Errors
///
/// Unknown message types, short payloads, and out-of-range ids all fail
/// with [`LinkError::Protocol`]; the caller logs and skips the record.
pub fn decode_record(header: &Header, payload: &[u8]) -> Result<Inbound, LinkError> {
    if payload.len() != header.length as usize {
        return Err(LinkError::protocol(format!(
            "payload length mismatch: header says {}, got {}",
            header.length,
            payload.len()
        )));
    }
    let mut buf = payload;

    match header.msg_type {
        MSG_SINK_OPENED => Ok(Inbound::SinkOpened(take_sink(&mut buf)?)),
        MSG_SINK_CLOSED => Ok(Inbound::SinkClosed(take_sink(&mut buf)?)),
        MSG_SOURCE_OPENED => Ok(Inbound::SourceOpened(take_source(&mut buf)?)),
        MSG_SOURCE_CLOSED => Ok(Inbound::SourceClosed(take_source(&mut buf)?)),
        MSG_DEVICE_CONNECTED => {
            let device = take_dest(&mut buf)?;
            let card = take_fixed_str(&mut buf, CARD_NAME_LEN)?;
            Ok(Inbound::DeviceConnected { device, card })
        }
        MSG_DEVICE_REMOVED => {
            let device = take_dest(&mut buf)?;
            let card = take_fixed_str(&mut buf, CARD_NAME_LEN)?;
            Ok(Inbound::DeviceRemoved { device, card })
        }
        MSG_REPLY => {
            let status = take_u8(&mut buf)?;
            Ok(Inbound::Reply {
                msg_id: header.msg_id,
                status,
            })
        }
        MSG_INPUT_ACTIVE => Ok(Inbound::InputStreamActive(take_u8(&mut buf)? != 0)),
        other => Err(LinkError::protocol(format!(
            "unknown inbound message type 0x{other:02x}"
        ))),
    }
}

/// Encodes an inbound record. Test/mock-backend helper.
pub fn encode_inbound(inbound: &Inbound) -> Bytes {
    let mut payload = BytesMut::new();
    let (msg_type, msg_id) = match inbound {
        Inbound::SinkOpened(sink) => {
            payload.put_u8(sink.index() as u8);
            (MSG_SINK_OPENED, 0)
        }
        Inbound::SinkClosed(sink) => {
            payload.put_u8(sink.index() as u8);
            (MSG_SINK_CLOSED, 0)
        }
        Inbound::SourceOpened(source) => {
            payload.put_u8(source.index() as u8);
            (MSG_SOURCE_OPENED, 0)
        }
        Inbound::SourceClosed(source) => {
            payload.put_u8(source.index() as u8);
            (MSG_SOURCE_CLOSED, 0)
        }
        Inbound::DeviceConnected { device, card } => {
            payload.put_u8(*device as u8);
            put_fixed_str(&mut payload, card, CARD_NAME_LEN);
            (MSG_DEVICE_CONNECTED, 0)
        }
        Inbound::DeviceRemoved { device, card } => {
            payload.put_u8(*device as u8);
            put_fixed_str(&mut payload, card, CARD_NAME_LEN);
            (MSG_DEVICE_REMOVED, 0)
        }
        Inbound::Reply { msg_id, status } => {
            payload.put_u8(*status);
            (MSG_REPLY, *msg_id)
        }
        Inbound::InputStreamActive(active) => {
            payload.put_u8(u8::from(*active));
            (MSG_INPUT_ACTIVE, 0)
        }
    };

    let header = Header {
        msg_type,
        length: payload.len() as u8,
        msg_id,
    };
    let mut record = BytesMut::with_capacity(HEADER_LEN + payload.len());
    header.encode(&mut record);
    record.extend_from_slice(&payload);
    record.freeze()
}

/// Whether this command type expects a correlated reply.
///
/// Module/device/effect commands are acknowledged; routine volume and
/// routing programming is fire-and-forget.
pub fn expects_reply(command: &Command) -> bool {
    matches!(
        command,
        Command::SetModule { .. }
            | Command::SetDevice { .. }
            | Command::SetEffect { .. }
            | Command::UpdateRate { .. }
    )
}

fn put_fixed_str(buf: &mut BytesMut, value: &str, width: usize) {
    let raw = value.as_bytes();
    let take = raw.len().min(width);
    buf.put_slice(&raw[..take]);
    buf.put_bytes(0, width - take);
}

fn take_fixed_str(buf: &mut &[u8], width: usize) -> Result<String, LinkError> {
    if buf.remaining() < width {
        return Err(LinkError::protocol("short string field"));
    }
    let raw = &buf[..width];
    let end = raw.iter().position(|&b| b == 0).unwrap_or(width);
    let value = String::from_utf8_lossy(&raw[..end]).into_owned();
    buf.advance(width);
    Ok(value)
}

fn take_u8(buf: &mut &[u8]) -> Result<u8, LinkError> {
    if !buf.has_remaining() {
        return Err(LinkError::protocol("truncated payload"));
    }
    Ok(buf.get_u8())
}

fn take_sink(buf: &mut &[u8]) -> Result<VirtualSink, LinkError> {
    let id = take_u8(buf)?;
    VirtualSink::from_wire(id).ok_or_else(|| LinkError::protocol(format!("bad sink id {id}")))
}

fn take_source(buf: &mut &[u8]) -> Result<VirtualSource, LinkError> {
    let id = take_u8(buf)?;
    VirtualSource::from_wire(id).ok_or_else(|| LinkError::protocol(format!("bad source id {id}")))
}

fn take_dest(buf: &mut &[u8]) -> Result<PhysicalDest, LinkError> {
    let id = take_u8(buf)?;
    PhysicalDest::from_wire(id).ok_or_else(|| LinkError::protocol(format!("bad device id {id}")))
}
