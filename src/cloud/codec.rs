//! Binary command codec for the cloud raw-data channel.
//!
//! Frames are length-prefixed only implicitly: one discriminator byte, a
//! big-endian 32-bit request id, then a discriminator-specific payload. The
//! codec is pure and stateless; callers log and drop decode failures.

use std::collections::BTreeMap;

use thiserror::Error;

/// Discriminator byte of a property-set frame.
const KIND_PROPERTY_SET: u8 = 0x01;
/// Shortest valid frame: discriminator + request id + one int16 payload.
const MIN_FRAME_LEN: usize = 7;

pub const PROPERTY_SET_METHOD: &str = "thing.service.property.set";
pub const PROTOCOL_VERSION: &str = "1.0";
pub const PROP_INT16_KEY: &str = "prop_int16";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("unknown or truncated frame (kind: {kind:?}, len: {len})")]
    UnknownOrTruncated { kind: Option<u8>, len: usize },
    #[error("parameter '{name}' value {value} does not fit the wire format")]
    ValueOutOfRange { name: &'static str, value: i64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    PropertySet,
}

/// A decoded cloud command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub kind: CommandKind,
    pub method: String,
    pub version: String,
    pub request_id: u32,
    pub params: BTreeMap<String, i64>,
}

impl Command {
    /// Build a property-set command carrying a single int16 parameter.
    pub fn property_set(request_id: u32, prop_int16: u16) -> Self {
        let mut params = BTreeMap::new();
        params.insert(PROP_INT16_KEY.to_string(), i64::from(prop_int16));
        Self {
            kind: CommandKind::PropertySet,
            method: PROPERTY_SET_METHOD.to_string(),
            version: PROTOCOL_VERSION.to_string(),
            request_id,
            params,
        }
    }
}

/// Decode one frame. Anything that is not a complete frame with a known
/// discriminator is an error for the caller to log and discard.
pub fn decode(bytes: &[u8]) -> Result<Command, DecodeError> {
    let kind = bytes.first().copied();
    if bytes.len() < MIN_FRAME_LEN || kind != Some(KIND_PROPERTY_SET) {
        return Err(DecodeError::UnknownOrTruncated {
            kind,
            len: bytes.len(),
        });
    }
    let request_id = u32::from_be_bytes([bytes[1], bytes[2], bytes[3], bytes[4]]);
    let value = u16::from_be_bytes([bytes[5], bytes[6]]);
    Ok(Command::property_set(request_id, value))
}

/// Mirror of [`decode`]; round-trips any command `decode` can produce.
pub fn encode(command: &Command) -> Result<Vec<u8>, DecodeError> {
    match command.kind {
        CommandKind::PropertySet => {
            let raw = command.params.get(PROP_INT16_KEY).copied().unwrap_or(0);
            let value = u16::try_from(raw).map_err(|_| DecodeError::ValueOutOfRange {
                name: PROP_INT16_KEY,
                value: raw,
            })?;
            let mut out = Vec::with_capacity(MIN_FRAME_LEN);
            out.push(KIND_PROPERTY_SET);
            out.extend_from_slice(&command.request_id.to_be_bytes());
            out.extend_from_slice(&value.to_be_bytes());
            Ok(out)
        }
    }
}
