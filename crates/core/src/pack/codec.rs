//! Binary packing for challenge files.
//!
//! Content is written as MessagePack. With string bundling enabled, strings
//! that repeat within one document are stored once in a table and referenced
//! by index:
//!
//! * a bundled document is an ext value of type [`BUNDLE_EXT`] whose data is
//!   the MessagePack array `[table, body]`;
//! * inside `body`, a bundled string (map key or value) is an ext value of
//!   type [`STRING_REF_EXT`] holding its table index as a big-endian integer
//!   of 1, 2 or 4 bytes, whichever is shortest.
//!
//! Documents without repeated strings are plain MessagePack. Bundled
//! documents use this crate's own ext types and are not readable by
//! MessagePack libraries that implement a different string-bundling scheme.

use std::collections::HashMap;

use rmpv::Value as Packed;
use serde_json::{Map, Number, Value};
use thiserror::Error;

/// Ext type wrapping a document that carries a string table.
pub const BUNDLE_EXT: i8 = 0x10;
/// Ext type referencing an entry of the string table.
pub const STRING_REF_EXT: i8 = 0x11;
/// Shortest string worth moving into the table.
pub const MIN_BUNDLED_LEN: usize = 6;

/// Errors raised while packing or unpacking challenge payloads.
#[derive(Debug, Error)]
pub enum CodecError {
    /// Writing MessagePack failed.
    #[error("failed to encode packed value: {0}")]
    Encode(String),
    /// Reading MessagePack failed.
    #[error("failed to decode packed value: {0}")]
    Decode(String),
    /// Input continued past the end of the packed value.
    #[error("{0} trailing bytes after packed value")]
    TrailingBytes(usize),
    /// The bundle header did not hold a `[table, body]` pair.
    #[error("malformed string bundle: {0}")]
    MalformedBundle(String),
    /// A string reference pointed outside the table.
    #[error("string reference {index} outside table of {len} entries")]
    DanglingReference {
        /// Referenced index.
        index: u32,
        /// Table size.
        len: usize,
    },
    /// A number had no MessagePack or JSON representation.
    #[error("number {0} cannot be represented")]
    UnrepresentableNumber(String),
    /// A packed value has no JSON counterpart.
    #[error("packed value has no JSON form: {0}")]
    NotJson(String),
}

/// Stateless challenge packer.
///
/// Construct once and share by reference; packing never mutates it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ItemPacker {
    bundle_strings: bool,
}

impl Default for ItemPacker {
    fn default() -> Self {
        Self::new(true)
    }
}

impl ItemPacker {
    /// Create a packer, optionally deduplicating repeated strings.
    pub const fn new(bundle_strings: bool) -> Self {
        Self { bundle_strings }
    }

    /// Encode `content`. Identical content always yields identical bytes.
    pub fn pack(&self, content: &Value) -> Result<Vec<u8>, CodecError> {
        let table = if self.bundle_strings {
            string_table(content)
        } else {
            Vec::new()
        };
        let mut refs = HashMap::with_capacity(table.len());
        for (index, text) in table.iter().enumerate() {
            let index = u32::try_from(index)
                .map_err(|_| CodecError::Encode("string table exceeds u32 range".to_string()))?;
            refs.insert(*text, index);
        }

        let body = to_packed(content, &refs)?;
        if table.is_empty() {
            return write(&body);
        }

        let table = Packed::Array(table.into_iter().map(Packed::from).collect());
        let inner = write(&Packed::Array(vec![table, body]))?;
        write(&Packed::Ext(BUNDLE_EXT, inner))
    }

    /// Decode a payload produced by [`ItemPacker::pack`], with or without a
    /// string table.
    pub fn unpack(&self, bytes: &[u8]) -> Result<Value, CodecError> {
        match read(bytes)? {
            Packed::Ext(BUNDLE_EXT, data) => {
                let (table, body) = split_bundle(read(&data)?)?;
                from_packed(body, &table)
            }
            other => from_packed(other, &[]),
        }
    }
}

/// Strings occurring at least twice, in first-occurrence order.
fn string_table(content: &Value) -> Vec<&str> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    let mut order = Vec::new();
    collect_strings(content, &mut counts, &mut order);
    order
        .into_iter()
        .filter(|text| counts.get(text).copied().unwrap_or(0) > 1)
        .collect()
}

fn collect_strings<'a>(
    value: &'a Value,
    counts: &mut HashMap<&'a str, usize>,
    order: &mut Vec<&'a str>,
) {
    match value {
        Value::String(text) => note(text, counts, order),
        Value::Array(items) => {
            for item in items {
                collect_strings(item, counts, order);
            }
        }
        Value::Object(map) => {
            for (key, item) in map {
                note(key, counts, order);
                collect_strings(item, counts, order);
            }
        }
        _ => {}
    }
}

fn note<'a>(text: &'a str, counts: &mut HashMap<&'a str, usize>, order: &mut Vec<&'a str>) {
    if text.len() < MIN_BUNDLED_LEN {
        return;
    }
    let count = counts.entry(text).or_insert(0);
    if *count == 0 {
        order.push(text);
    }
    *count += 1;
}

fn to_packed(value: &Value, refs: &HashMap<&str, u32>) -> Result<Packed, CodecError> {
    Ok(match value {
        Value::Null => Packed::Nil,
        Value::Bool(flag) => Packed::Boolean(*flag),
        Value::Number(number) => packed_number(number)?,
        Value::String(text) => packed_string(text, refs),
        Value::Array(items) => Packed::Array(
            items
                .iter()
                .map(|item| to_packed(item, refs))
                .collect::<Result<_, _>>()?,
        ),
        Value::Object(map) => Packed::Map(
            map.iter()
                .map(|(key, item)| Ok((packed_string(key, refs), to_packed(item, refs)?)))
                .collect::<Result<_, CodecError>>()?,
        ),
    })
}

fn packed_number(number: &Number) -> Result<Packed, CodecError> {
    if let Some(value) = number.as_u64() {
        Ok(Packed::from(value))
    } else if let Some(value) = number.as_i64() {
        Ok(Packed::from(value))
    } else if let Some(value) = number.as_f64() {
        Ok(Packed::F64(value))
    } else {
        Err(CodecError::UnrepresentableNumber(number.to_string()))
    }
}

fn packed_string(text: &str, refs: &HashMap<&str, u32>) -> Packed {
    match refs.get(text) {
        Some(&index) => Packed::Ext(STRING_REF_EXT, encode_index(index)),
        None => Packed::from(text),
    }
}

fn split_bundle(value: Packed) -> Result<(Vec<String>, Packed), CodecError> {
    let Packed::Array(mut parts) = value else {
        return Err(CodecError::MalformedBundle("expected an array".to_string()));
    };
    if parts.len() != 2 {
        return Err(CodecError::MalformedBundle(format!(
            "expected 2 elements, found {}",
            parts.len()
        )));
    }
    let body = parts.pop().unwrap_or(Packed::Nil);
    let Some(Packed::Array(entries)) = parts.pop() else {
        return Err(CodecError::MalformedBundle(
            "string table is not an array".to_string(),
        ));
    };

    let table = entries
        .into_iter()
        .map(|entry| match entry {
            Packed::String(text) => text
                .into_str()
                .ok_or_else(|| CodecError::MalformedBundle("invalid utf-8 in table".to_string())),
            other => Err(CodecError::MalformedBundle(format!(
                "table entry {other:?} is not a string"
            ))),
        })
        .collect::<Result<_, _>>()?;
    Ok((table, body))
}

fn from_packed(value: Packed, table: &[String]) -> Result<Value, CodecError> {
    Ok(match value {
        Packed::Nil => Value::Null,
        Packed::Boolean(flag) => Value::Bool(flag),
        Packed::Integer(integer) => {
            if let Some(value) = integer.as_u64() {
                Value::from(value)
            } else if let Some(value) = integer.as_i64() {
                Value::from(value)
            } else {
                return Err(CodecError::UnrepresentableNumber(format!("{integer:?}")));
            }
        }
        Packed::F32(value) => float(f64::from(value))?,
        Packed::F64(value) => float(value)?,
        Packed::String(text) => Value::String(
            text.into_str()
                .ok_or_else(|| CodecError::NotJson("invalid utf-8 string".to_string()))?,
        ),
        Packed::Array(items) => Value::Array(
            items
                .into_iter()
                .map(|item| from_packed(item, table))
                .collect::<Result<_, _>>()?,
        ),
        Packed::Map(entries) => {
            let mut map = Map::with_capacity(entries.len());
            for (key, item) in entries {
                let key = match from_packed(key, table)? {
                    Value::String(key) => key,
                    other => return Err(CodecError::NotJson(format!("map key {other}"))),
                };
                map.insert(key, from_packed(item, table)?);
            }
            Value::Object(map)
        }
        Packed::Ext(STRING_REF_EXT, data) => Value::String(resolve(&data, table)?),
        Packed::Binary(_) => return Err(CodecError::NotJson("binary data".to_string())),
        Packed::Ext(kind, _) => return Err(CodecError::NotJson(format!("ext type {kind}"))),
    })
}

fn encode_index(index: u32) -> Vec<u8> {
    match index {
        0..=0xff => vec![index as u8],
        0x100..=0xffff => (index as u16).to_be_bytes().to_vec(),
        _ => index.to_be_bytes().to_vec(),
    }
}

fn decode_index(data: &[u8]) -> Option<u32> {
    match *data {
        [a] => Some(u32::from(a)),
        [a, b] => Some(u32::from(u16::from_be_bytes([a, b]))),
        [a, b, c, d] => Some(u32::from_be_bytes([a, b, c, d])),
        _ => None,
    }
}

fn resolve(data: &[u8], table: &[String]) -> Result<String, CodecError> {
    let index = decode_index(data).ok_or_else(|| {
        CodecError::MalformedBundle(format!("string reference of {} bytes", data.len()))
    })?;
    table
        .get(index as usize)
        .cloned()
        .ok_or(CodecError::DanglingReference {
            index,
            len: table.len(),
        })
}

fn float(value: f64) -> Result<Value, CodecError> {
    Number::from_f64(value)
        .map(Value::Number)
        .ok_or_else(|| CodecError::UnrepresentableNumber(value.to_string()))
}

fn write(value: &Packed) -> Result<Vec<u8>, CodecError> {
    let mut buffer = Vec::new();
    rmpv::encode::write_value(&mut buffer, value)
        .map_err(|err| CodecError::Encode(err.to_string()))?;
    Ok(buffer)
}

fn read(mut bytes: &[u8]) -> Result<Packed, CodecError> {
    let value = rmpv::decode::read_value(&mut bytes)
        .map_err(|err| CodecError::Decode(err.to_string()))?;
    if !bytes.is_empty() {
        return Err(CodecError::TrailingBytes(bytes.len()));
    }
    Ok(value)
}
