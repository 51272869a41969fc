//! Versioned binary map of typed key/value pairs.
//!
//! Wire format (all integers little-endian):
//! ```text
//! [2 bytes: version][entries...][1 byte: terminator tag 0x00]
//! entry = [1 byte: type tag][4 bytes: key length][key UTF-8]
//!         [4 bytes: value length][value bytes]
//! ```
//!
//! The high byte of the version is the critical mask: a reader rejects any
//! document whose critical bits exceed what it understands. Low-byte
//! (informational) differences are accepted. Unknown type tags are a fatal
//! format error; there is no forward-compatible skip.

use kpv_core::{KpvError, KpvResult};

/// Current wire version. High byte 0x01 is the critical part.
pub const KPMAP_VERSION: u16 = 0x0100;

const CRITICAL_MASK: u16 = 0xFF00;

const TAG_NONE: u8 = 0x00;
const TAG_U32: u8 = 0x04;
const TAG_U64: u8 = 0x05;
const TAG_BOOL: u8 = 0x08;
const TAG_I32: u8 = 0x0C;
const TAG_I64: u8 = 0x0D;
const TAG_STR: u8 = 0x18;
const TAG_BYTES: u8 = 0x42;

/// A typed map value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KpValue {
    Bool(bool),
    U32(u32),
    U64(u64),
    I32(i32),
    I64(i64),
    Str(String),
    Bytes(Vec<u8>),
}

impl KpValue {
    fn tag(&self) -> u8 {
        match self {
            KpValue::Bool(_) => TAG_BOOL,
            KpValue::U32(_) => TAG_U32,
            KpValue::U64(_) => TAG_U64,
            KpValue::I32(_) => TAG_I32,
            KpValue::I64(_) => TAG_I64,
            KpValue::Str(_) => TAG_STR,
            KpValue::Bytes(_) => TAG_BYTES,
        }
    }
}

/// An insertion-ordered map of typed key/value pairs with unique keys.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KpMap {
    entries: Vec<(String, KpValue)>,
}

impl KpMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Insert or overwrite. An existing key keeps its position in the
    /// serialization order.
    pub fn set(&mut self, key: impl Into<String>, value: KpValue) {
        let key = key.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, v)) => *v = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&KpValue> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    pub fn remove(&mut self, key: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(k, _)| k != key);
        self.entries.len() != before
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        match self.get(key)? {
            KpValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn get_u32(&self, key: &str) -> Option<u32> {
        match self.get(key)? {
            KpValue::U32(v) => Some(*v),
            _ => None,
        }
    }

    pub fn get_u64(&self, key: &str) -> Option<u64> {
        match self.get(key)? {
            KpValue::U64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn get_i32(&self, key: &str) -> Option<i32> {
        match self.get(key)? {
            KpValue::I32(v) => Some(*v),
            _ => None,
        }
    }

    pub fn get_i64(&self, key: &str) -> Option<i64> {
        match self.get(key)? {
            KpValue::I64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        match self.get(key)? {
            KpValue::Str(v) => Some(v.as_str()),
            _ => None,
        }
    }

    pub fn get_bytes(&self, key: &str) -> Option<&[u8]> {
        match self.get(key)? {
            KpValue::Bytes(v) => Some(v.as_slice()),
            _ => None,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &KpValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Serialize to the versioned wire format, entries in insertion order.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&KPMAP_VERSION.to_le_bytes());

        for (key, value) in &self.entries {
            out.push(value.tag());
            write_lengthed(&mut out, key.as_bytes());
            match value {
                KpValue::Bool(v) => write_lengthed(&mut out, &[u8::from(*v)]),
                KpValue::U32(v) => write_lengthed(&mut out, &v.to_le_bytes()),
                KpValue::U64(v) => write_lengthed(&mut out, &v.to_le_bytes()),
                KpValue::I32(v) => write_lengthed(&mut out, &v.to_le_bytes()),
                KpValue::I64(v) => write_lengthed(&mut out, &v.to_le_bytes()),
                KpValue::Str(v) => write_lengthed(&mut out, v.as_bytes()),
                KpValue::Bytes(v) => write_lengthed(&mut out, v),
            }
        }

        out.push(TAG_NONE);
        out
    }

    /// Parse the versioned wire format. Reading stops at the terminator.
    pub fn from_bytes(data: &[u8]) -> KpvResult<Self> {
        let mut input = data;

        let version = u16::from_le_bytes(take_arr::<2>(&mut input)?);
        if version & CRITICAL_MASK > KPMAP_VERSION & CRITICAL_MASK {
            return Err(KpvError::Format(format!(
                "unsupported critical version 0x{version:04X} (supported 0x{KPMAP_VERSION:04X})"
            )));
        }

        let mut map = Self::new();
        loop {
            let tag = take(&mut input, 1)?[0];
            if tag == TAG_NONE {
                break;
            }

            let key_bytes = take_lengthed(&mut input)?;
            let key = std::str::from_utf8(key_bytes)
                .map_err(|_| KpvError::Format("entry key is not valid UTF-8".into()))?
                .to_string();
            let payload = take_lengthed(&mut input)?;

            let value = match tag {
                TAG_BOOL => KpValue::Bool(fixed::<1>(tag, payload)?[0] != 0),
                TAG_U32 => KpValue::U32(u32::from_le_bytes(fixed::<4>(tag, payload)?)),
                TAG_U64 => KpValue::U64(u64::from_le_bytes(fixed::<8>(tag, payload)?)),
                TAG_I32 => KpValue::I32(i32::from_le_bytes(fixed::<4>(tag, payload)?)),
                TAG_I64 => KpValue::I64(i64::from_le_bytes(fixed::<8>(tag, payload)?)),
                TAG_STR => KpValue::Str(
                    std::str::from_utf8(payload)
                        .map_err(|_| KpvError::Format("string value is not valid UTF-8".into()))?
                        .to_string(),
                ),
                TAG_BYTES => KpValue::Bytes(payload.to_vec()),
                unknown => {
                    return Err(KpvError::Format(format!("unknown type tag 0x{unknown:02X}")))
                }
            };
            map.set(key, value);
        }

        Ok(map)
    }
}

fn write_lengthed(out: &mut Vec<u8>, bytes: &[u8]) {
    out.extend_from_slice(&(bytes.len() as i32).to_le_bytes());
    out.extend_from_slice(bytes);
}

fn take<'a>(input: &mut &'a [u8], n: usize) -> KpvResult<&'a [u8]> {
    if input.len() < n {
        return Err(KpvError::Format("unexpected end of input".into()));
    }
    let (head, tail) = input.split_at(n);
    *input = tail;
    Ok(head)
}

fn take_arr<const N: usize>(input: &mut &[u8]) -> KpvResult<[u8; N]> {
    let mut out = [0u8; N];
    out.copy_from_slice(take(input, N)?);
    Ok(out)
}

fn take_lengthed<'a>(input: &mut &'a [u8]) -> KpvResult<&'a [u8]> {
    let len = i32::from_le_bytes(take_arr::<4>(input)?);
    if len < 0 {
        return Err(KpvError::Format(format!("negative length field {len}")));
    }
    take(input, len as usize)
}

fn fixed<const N: usize>(tag: u8, payload: &[u8]) -> KpvResult<[u8; N]> {
    payload.try_into().map_err(|_| {
        KpvError::Format(format!(
            "tag 0x{tag:02X} expects {N}-byte payload, got {}",
            payload.len()
        ))
    })
}
