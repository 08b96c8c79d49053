//! Minimal OSC 1.0 codec.
//!
//! Only the argument types the avatar protocol uses are supported: `T`/`F`
//! booleans, `i` int32, `f` float32 and `s` strings. Every field is big-endian
//! and padded to a four byte boundary.
//!
//! ```text
//! [address\0 pad][,tags\0 pad][arg0][arg1]...
//! #bundle\0 [timetag: 8 bytes] ([size: i32][element])*
//! ```

use super::{ParamValue, TransportError};

const BUNDLE_TAG: &[u8] = b"#bundle\0";
const TIMETAG_LEN: usize = 8;

#[derive(Debug, Clone, PartialEq)]
pub enum OscArg {
    Bool(bool),
    Int(i32),
    Float(f32),
    String(String),
}

impl From<ParamValue> for OscArg {
    fn from(value: ParamValue) -> Self {
        match value {
            ParamValue::Bool(v) => OscArg::Bool(v),
            ParamValue::Int(v) => OscArg::Int(v),
            ParamValue::Float(v) => OscArg::Float(v),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OscMessage {
    pub address: String,
    pub args: Vec<OscArg>,
}

impl OscMessage {
    pub fn new(address: impl Into<String>, args: Vec<OscArg>) -> Self {
        Self {
            address: address.into(),
            args,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.address.len() + 16);
        write_padded_str(&mut buf, &self.address);

        let mut tags = String::with_capacity(self.args.len() + 1);
        tags.push(',');
        for arg in &self.args {
            tags.push(match arg {
                OscArg::Bool(true) => 'T',
                OscArg::Bool(false) => 'F',
                OscArg::Int(_) => 'i',
                OscArg::Float(_) => 'f',
                OscArg::String(_) => 's',
            });
        }
        write_padded_str(&mut buf, &tags);

        for arg in &self.args {
            match arg {
                OscArg::Bool(_) => {}
                OscArg::Int(v) => buf.extend_from_slice(&v.to_be_bytes()),
                OscArg::Float(v) => buf.extend_from_slice(&v.to_be_bytes()),
                OscArg::String(s) => write_padded_str(&mut buf, s),
            }
        }
        buf
    }
}

/// Decodes a datagram into the messages it carries, flattening bundles.
pub fn decode_packet(packet: &[u8]) -> Result<Vec<OscMessage>, TransportError> {
    let mut messages = Vec::new();
    decode_into(packet, &mut messages)?;
    Ok(messages)
}

fn decode_into(packet: &[u8], out: &mut Vec<OscMessage>) -> Result<(), TransportError> {
    if packet.starts_with(BUNDLE_TAG) {
        let mut cursor = BUNDLE_TAG.len() + TIMETAG_LEN;
        if packet.len() < cursor {
            return Err(TransportError::Decode("truncated bundle header".to_string()));
        }
        while cursor < packet.len() {
            let size = read_i32(packet, &mut cursor)?;
            let size = usize::try_from(size)
                .map_err(|_| TransportError::Decode(format!("negative element size {}", size)))?;
            let end = cursor
                .checked_add(size)
                .filter(|end| *end <= packet.len())
                .ok_or_else(|| TransportError::Decode("bundle element overruns packet".to_string()))?;
            decode_into(&packet[cursor..end], out)?;
            cursor = end;
        }
        return Ok(());
    }

    out.push(decode_message(packet)?);
    Ok(())
}

pub fn decode_message(packet: &[u8]) -> Result<OscMessage, TransportError> {
    let mut cursor = 0;
    let address = read_padded_str(packet, &mut cursor)?;
    if !address.starts_with('/') {
        return Err(TransportError::Decode(format!("invalid address '{}'", address)));
    }

    // A message without a type tag string carries no arguments.
    if cursor >= packet.len() {
        return Ok(OscMessage::new(address, Vec::new()));
    }

    let tags = read_padded_str(packet, &mut cursor)?;
    let Some(tags) = tags.strip_prefix(',') else {
        return Err(TransportError::Decode(format!("invalid type tags '{}'", tags)));
    };

    let mut args = Vec::with_capacity(tags.len());
    for tag in tags.chars() {
        let arg = match tag {
            'T' => OscArg::Bool(true),
            'F' => OscArg::Bool(false),
            'i' => OscArg::Int(read_i32(packet, &mut cursor)?),
            'f' => OscArg::Float(f32::from_bits(read_i32(packet, &mut cursor)? as u32)),
            's' => OscArg::String(read_padded_str(packet, &mut cursor)?),
            other => {
                return Err(TransportError::Decode(format!(
                    "unsupported type tag '{}'",
                    other
                )))
            }
        };
        args.push(arg);
    }

    Ok(OscMessage::new(address, args))
}

fn write_padded_str(buf: &mut Vec<u8>, s: &str) {
    buf.extend_from_slice(s.as_bytes());
    buf.push(0);
    while buf.len() % 4 != 0 {
        buf.push(0);
    }
}

fn read_padded_str(packet: &[u8], cursor: &mut usize) -> Result<String, TransportError> {
    let rest = packet
        .get(*cursor..)
        .ok_or_else(|| TransportError::Decode("cursor past end of packet".to_string()))?;
    let len = rest
        .iter()
        .position(|b| *b == 0)
        .ok_or_else(|| TransportError::Decode("unterminated string".to_string()))?;
    let s = std::str::from_utf8(&rest[..len])
        .map_err(|e| TransportError::Decode(format!("string is not utf-8: {}", e)))?
        .to_string();
    // string bytes plus at least one terminator, rounded up to 4
    *cursor += (len + 4) & !3;
    Ok(s)
}

fn read_i32(packet: &[u8], cursor: &mut usize) -> Result<i32, TransportError> {
    let bytes: [u8; 4] = packet
        .get(*cursor..*cursor + 4)
        .and_then(|b| b.try_into().ok())
        .ok_or_else(|| TransportError::Decode("truncated 32-bit argument".to_string()))?;
    *cursor += 4;
    Ok(i32::from_be_bytes(bytes))
}
