//! Conflict marker ("vector clock") codec.
//!
//! Notes carry a small binary property list holding a one-entry dictionary
//! `device id -> edit counter`. The layout here was rebuilt from observed
//! markers, not from a format description, so decoding is best effort: any
//! marker outside the observed shape is treated as absent and a fresh one is
//! minted with counter 1.
//!
//! Observed layout (`bplist00`, three objects, one-byte offsets and refs):
//!
//! ```text
//! "bplist00" | D1 01 02 | 5n <ascii key> | 1x <big-endian counter>
//!            | offset table | 32-byte trailer
//! ```

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

const MAGIC: &[u8] = b"bplist00";
const TRAILER_LEN: usize = 32;
const OBJECT_COUNT: u64 = 3;

const MARKER_DICT: u8 = 0xD0;
const MARKER_INT: u8 = 0x10;
const MARKER_ASCII: u8 = 0x50;
const MARKER_UTF16: u8 = 0x60;
const LENGTH_FOLLOWS: u8 = 0x0F;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictMarker {
    pub device_id: String,
    pub counter: u64,
}

/// Encode a one-entry `device_id -> counter` marker.
pub fn mint(device_id: &str, counter: u64) -> Vec<u8> {
    let mut out = MAGIC.to_vec();
    let mut offsets = Vec::with_capacity(3);

    offsets.push(out.len());
    out.extend_from_slice(&[MARKER_DICT | 1, 1, 2]);

    offsets.push(out.len());
    write_string(&mut out, device_id);

    offsets.push(out.len());
    write_int(&mut out, counter);

    let table_offset = out.len();
    let offset_size = byte_width(table_offset as u64);
    for offset in &offsets {
        write_sized(&mut out, *offset as u64, offset_size);
    }

    out.extend_from_slice(&[0; 6]);
    out.push(offset_size);
    out.push(1);
    out.extend_from_slice(&OBJECT_COUNT.to_be_bytes());
    out.extend_from_slice(&0u64.to_be_bytes());
    out.extend_from_slice(&(table_offset as u64).to_be_bytes());
    out
}

/// Decode a marker in the observed layout; anything else yields `None`.
pub fn decode(bytes: &[u8]) -> Option<ConflictMarker> {
    if bytes.len() < MAGIC.len() + TRAILER_LEN || !bytes.starts_with(MAGIC) {
        return None;
    }

    let trailer = &bytes[bytes.len() - TRAILER_LEN..];
    let offset_size = usize::from(trailer[6]);
    let ref_size = usize::from(trailer[7]);
    let object_count = read_sized(&trailer[8..16])?;
    let top_object = read_sized(&trailer[16..24])?;
    let table_offset = usize::try_from(read_sized(&trailer[24..32])?).ok()?;

    if object_count != OBJECT_COUNT || top_object != 0 || ref_size != 1 {
        return None;
    }
    if !(1..=8).contains(&offset_size) {
        return None;
    }

    let object_offset = |index: usize| -> Option<usize> {
        let start = table_offset.checked_add(index * offset_size)?;
        let raw = bytes.get(start..start.checked_add(offset_size)?)?;
        usize::try_from(read_sized(raw)?).ok()
    };

    let dict = bytes.get(object_offset(0)?..)?;
    if dict.len() < 3 || dict[0] != (MARKER_DICT | 1) {
        return None;
    }
    let key_offset = object_offset(usize::from(dict[1]))?;
    let value_offset = object_offset(usize::from(dict[2]))?;

    let device_id = read_string(bytes.get(key_offset..)?)?;
    let counter = read_int(bytes.get(value_offset..)?)?;
    Some(ConflictMarker { device_id, counter })
}

/// Mints and bumps markers on behalf of one device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkerCodec {
    device_id: String,
}

impl MarkerCodec {
    pub fn new(device_id: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
        }
    }

    /// First marker for a record this device creates.
    pub fn fresh(&self) -> Vec<u8> {
        mint(&self.device_id, 1)
    }

    /// Next marker after `existing`: same device, counter plus one.
    /// Unreadable input starts over at 1 under this codec's device id.
    pub fn increment(&self, existing: &[u8]) -> Vec<u8> {
        match decode(existing) {
            Some(marker) => mint(&marker.device_id, marker.counter.saturating_add(1)),
            None => {
                tracing::debug!("Unrecognized conflict marker; minting a fresh one");
                self.fresh()
            }
        }
    }

    /// [`Self::increment`] over the base64 wire form. A missing or
    /// undecodable value mints a fresh marker.
    pub fn increment_base64(&self, existing: Option<&str>) -> String {
        let bytes = existing
            .and_then(|value| STANDARD.decode(value.trim()).ok())
            .unwrap_or_default();
        STANDARD.encode(self.increment(&bytes))
    }
}

fn write_string(out: &mut Vec<u8>, value: &str) {
    if value.is_ascii() {
        write_header(out, MARKER_ASCII, value.len());
        out.extend_from_slice(value.as_bytes());
    } else {
        let units = value.encode_utf16().collect::<Vec<_>>();
        write_header(out, MARKER_UTF16, units.len());
        for unit in units {
            out.extend_from_slice(&unit.to_be_bytes());
        }
    }
}

fn write_header(out: &mut Vec<u8>, marker: u8, len: usize) {
    if len < usize::from(LENGTH_FOLLOWS) {
        #[allow(clippy::cast_possible_truncation)]
        out.push(marker | len as u8);
    } else {
        out.push(marker | LENGTH_FOLLOWS);
        write_int(out, len as u64);
    }
}

#[allow(clippy::cast_possible_truncation)]
fn write_int(out: &mut Vec<u8>, value: u64) {
    let width = byte_width(value);
    out.push(MARKER_INT | width.trailing_zeros() as u8);
    write_sized(out, value, width);
}

/// Smallest of 1, 2, 4 or 8 bytes that holds `value`.
const fn byte_width(value: u64) -> u8 {
    if value <= 0xFF {
        1
    } else if value <= 0xFFFF {
        2
    } else if value <= 0xFFFF_FFFF {
        4
    } else {
        8
    }
}

fn write_sized(out: &mut Vec<u8>, value: u64, width: u8) {
    let bytes = value.to_be_bytes();
    out.extend_from_slice(&bytes[bytes.len() - usize::from(width)..]);
}

fn read_sized(bytes: &[u8]) -> Option<u64> {
    if bytes.is_empty() || bytes.len() > 8 {
        return None;
    }
    Some(
        bytes
            .iter()
            .fold(0u64, |acc, byte| (acc << 8) | u64::from(*byte)),
    )
}

/// Read an integer object, returning the value and the bytes it used.
fn read_int_object(bytes: &[u8]) -> Option<(u64, usize)> {
    let marker = *bytes.first()?;
    if marker & 0xF0 != MARKER_INT {
        return None;
    }
    let width = 1usize << (marker & 0x0F);
    if width > 8 {
        return None;
    }
    let value = read_sized(bytes.get(1..=width)?)?;
    Some((value, 1 + width))
}

fn read_int(bytes: &[u8]) -> Option<u64> {
    read_int_object(bytes).map(|(value, _)| value)
}

fn read_string(bytes: &[u8]) -> Option<String> {
    let marker = *bytes.first()?;
    let kind = marker & 0xF0;
    if kind != MARKER_ASCII && kind != MARKER_UTF16 {
        return None;
    }

    let (len, body_start) = if marker & 0x0F == LENGTH_FOLLOWS {
        let (len, used) = read_int_object(&bytes[1..])?;
        (usize::try_from(len).ok()?, 1 + used)
    } else {
        (usize::from(marker & 0x0F), 1)
    };

    if kind == MARKER_ASCII {
        let body = bytes.get(body_start..body_start.checked_add(len)?)?;
        body.is_ascii()
            .then(|| String::from_utf8_lossy(body).into_owned())
    } else {
        let body = bytes.get(body_start..body_start.checked_add(len.checked_mul(2)?)?)?;
        let units = body
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect::<Vec<_>>();
        String::from_utf16(&units).ok()
    }
}
