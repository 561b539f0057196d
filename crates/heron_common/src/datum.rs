//! Scalar values and the byte codec for keys and row payloads.
//!
//! Keys use an order-preserving encoding (type tag + big-endian with sign
//! flip for integers) so that byte-wise comparison matches value order.
//! Row payloads reuse the same per-datum encoding, concatenated in column
//! order, which keeps the codec self-describing on decode.

use std::cmp::Ordering;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::StorageError;
use crate::schema::TableDef;
use crate::types::RowKey;

/// A single scalar value. Text values must not contain interior NUL bytes;
/// the key encoding uses NUL as the string terminator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Datum {
    Null,
    Boolean(bool),
    Int64(i64),
    Text(String),
    Bytes(Vec<u8>),
}

impl Datum {
    pub fn is_null(&self) -> bool {
        matches!(self, Datum::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Datum::Int64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Datum::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Compare two datums of the same variant. Null and cross-type
    /// comparisons are undefined and return `None`.
    pub fn compare(&self, other: &Datum) -> Option<Ordering> {
        match (self, other) {
            (Datum::Boolean(a), Datum::Boolean(b)) => Some(a.cmp(b)),
            (Datum::Int64(a), Datum::Int64(b)) => Some(a.cmp(b)),
            (Datum::Text(a), Datum::Text(b)) => Some(a.cmp(b)),
            (Datum::Bytes(a), Datum::Bytes(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }
}

const TAG_NULL: u8 = 0x00;
const TAG_BOOLEAN: u8 = 0x01;
const TAG_INT64: u8 = 0x02;
const TAG_TEXT: u8 = 0x03;
const TAG_BYTES: u8 = 0x04;

fn encode_datum_to_bytes(datum: &Datum, buf: &mut Vec<u8>) {
    match datum {
        Datum::Null => {
            buf.push(TAG_NULL);
        }
        Datum::Boolean(b) => {
            buf.push(TAG_BOOLEAN);
            buf.push(u8::from(*b));
        }
        Datum::Int64(v) => {
            buf.push(TAG_INT64);
            // Big-endian with sign flip so byte order matches numeric order.
            let encoded = (*v as u64) ^ (1u64 << 63);
            buf.extend_from_slice(&encoded.to_be_bytes());
        }
        Datum::Text(s) => {
            buf.push(TAG_TEXT);
            buf.extend_from_slice(s.as_bytes());
            buf.push(0x00); // terminator for ordering
        }
        Datum::Bytes(bytes) => {
            buf.push(TAG_BYTES);
            buf.extend_from_slice(&(bytes.len() as u32).to_be_bytes());
            buf.extend_from_slice(bytes);
        }
    }
}

fn decode_datum(buf: &[u8], pos: &mut usize) -> Result<Datum, StorageError> {
    let tag = *buf
        .get(*pos)
        .ok_or_else(|| StorageError::Codec("truncated datum: missing tag".into()))?;
    *pos += 1;
    match tag {
        TAG_NULL => Ok(Datum::Null),
        TAG_BOOLEAN => {
            let b = *buf
                .get(*pos)
                .ok_or_else(|| StorageError::Codec("truncated boolean".into()))?;
            *pos += 1;
            Ok(Datum::Boolean(b != 0))
        }
        TAG_INT64 => {
            let end = *pos + 8;
            let bytes = buf
                .get(*pos..end)
                .ok_or_else(|| StorageError::Codec("truncated int64".into()))?;
            *pos = end;
            let mut raw = [0u8; 8];
            raw.copy_from_slice(bytes);
            let v = (u64::from_be_bytes(raw) ^ (1u64 << 63)) as i64;
            Ok(Datum::Int64(v))
        }
        TAG_TEXT => {
            let rest = &buf[*pos..];
            let nul = rest
                .iter()
                .position(|&b| b == 0x00)
                .ok_or_else(|| StorageError::Codec("unterminated text".into()))?;
            let s = std::str::from_utf8(&rest[..nul])
                .map_err(|e| StorageError::Codec(format!("invalid utf-8 in text: {e}")))?
                .to_string();
            *pos += nul + 1;
            Ok(Datum::Text(s))
        }
        TAG_BYTES => {
            let end = *pos + 4;
            let len_bytes = buf
                .get(*pos..end)
                .ok_or_else(|| StorageError::Codec("truncated bytes length".into()))?;
            let mut raw = [0u8; 4];
            raw.copy_from_slice(len_bytes);
            let len = u32::from_be_bytes(raw) as usize;
            *pos = end;
            let data_end = *pos + len;
            let data = buf
                .get(*pos..data_end)
                .ok_or_else(|| StorageError::Codec("truncated bytes payload".into()))?;
            *pos = data_end;
            Ok(Datum::Bytes(data.to_vec()))
        }
        other => Err(StorageError::Codec(format!("unknown datum tag {other:#04x}"))),
    }
}

/// Encode key-column datums into an order-preserving byte key.
pub fn encode_key(datums: &[Datum]) -> RowKey {
    let mut buf = Vec::with_capacity(16);
    for datum in datums {
        encode_datum_to_bytes(datum, &mut buf);
    }
    buf
}

/// Encode a full row payload (all columns, in schema order).
pub fn encode_row(values: &[Datum]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(32);
    for datum in values {
        encode_datum_to_bytes(datum, &mut buf);
    }
    buf
}

/// Decode a row payload back into column values.
pub fn decode_row(bytes: &[u8]) -> Result<Vec<Datum>, StorageError> {
    let mut values = Vec::new();
    let mut pos = 0usize;
    while pos < bytes.len() {
        values.push(decode_datum(bytes, &mut pos)?);
    }
    Ok(values)
}

/// A materialized row handed out by scans: encoded key plus shared payload.
#[derive(Debug, Clone)]
pub struct Record {
    pub key: RowKey,
    pub value: Arc<Vec<u8>>,
}

impl Record {
    pub fn new(key: RowKey, value: Arc<Vec<u8>>) -> Self {
        Self { key, value }
    }

    /// Decode the payload into column values.
    pub fn decode_values(&self) -> Result<Vec<Datum>, StorageError> {
        decode_row(&self.value)
    }

    /// Decode and project a single column by name.
    pub fn column(&self, table: &TableDef, name: &str) -> Result<Datum, StorageError> {
        let idx = table
            .find_column(name)
            .ok_or_else(|| StorageError::Codec(format!("no column {name} in {}", table.name)))?;
        let values = self.decode_values()?;
        values
            .get(idx)
            .cloned()
            .ok_or_else(|| StorageError::Codec(format!("row too short for column {name}")))
    }
}
