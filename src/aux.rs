//! Typed auxiliary tag fields, shared by the binary and text encodings.
//!
//! A binary auxiliary region is a run of tagged fields: two name bytes,
//! one type byte and a value whose size depends on the type (fixed-width
//! primitives, NUL-terminated for `Z`/`H`, length-prefixed for `B`).
//! A text auxiliary field is `XX:T:VALUE`. Both decode into the same
//! owned [AuxValue](enum.AuxValue.html).

use byteorder::{ByteOrder, LittleEndian};

use crate::error::{Error, Result};

/// Alias for a two-character tag name.
pub type TagName = [u8; 2];

/// Enum that represents tag type for the cases when a tag contains an
/// integer.
///
/// Possible values are `I8` (`c`), `U8` (`C`), `I16` (`s`), `U16` (`S`),
/// `I32` (`i`) and `U32` (`I`).
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum IntegerType {
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
}

impl IntegerType {
    /// Returns a letter that represents the integer type. For example,
    /// `i8` corresponds to `c`.
    pub fn letter(self) -> u8 {
        use IntegerType::*;
        match self {
            I8 => b'c',
            U8 => b'C',
            I16 => b's',
            U16 => b'S',
            I32 => b'i',
            U32 => b'I',
        }
    }

    /// Returns IntegerType from a letter, such as `c`.
    pub fn from_letter(ty: u8) -> Option<Self> {
        use IntegerType::*;
        match ty {
            b'c' => Some(I8),
            b'C' => Some(U8),
            b's' => Some(I16),
            b'S' => Some(U16),
            b'i' => Some(I32),
            b'I' => Some(U32),
            _ => None,
        }
    }

    pub fn size_of(self) -> usize {
        use IntegerType::*;
        match self {
            I8 | U8 => 1,
            I16 | U16 => 2,
            I32 | U32 => 4,
        }
    }

    /// Reads one little-endian value, widened to `i64`.
    fn parse_raw(self, raw: &[u8]) -> i64 {
        use IntegerType::*;
        match self {
            I8 => raw[0] as i8 as i64,
            U8 => raw[0] as i64,
            I16 => LittleEndian::read_i16(raw) as i64,
            U16 => LittleEndian::read_u16(raw) as i64,
            I32 => LittleEndian::read_i32(raw) as i64,
            U32 => LittleEndian::read_u32(raw) as i64,
        }
    }
}

/// A decoded auxiliary value. Integer values are widened to `i64` on the
/// way out, so that both `i32` and `u32` sources fit; the element type of
/// an integer array is kept alongside the widened values.
#[derive(Debug, Clone, PartialEq)]
pub enum AuxValue {
    Char(u8),
    Int(i64),
    Float(f32),
    String(String),
    Hex(Vec<u8>),
    IntArray(Vec<i64>, IntegerType),
    FloatArray(Vec<f32>),
}

/// Size of a fixed-width value from its type letter (`c` -> 1, `i` -> 4).
fn fixed_size(ty: u8) -> Result<usize> {
    match ty {
        b'c' | b'C' | b'A' => Ok(1),
        b's' | b'S' => Ok(2),
        b'i' | b'I' | b'f' => Ok(4),
        _ => Err(Error::UnknownAuxType(ty)),
    }
}

/// Returns the length of the first tagged field (including the name bytes)
/// in a raw tag blob.
///
/// For example, the function returns 7 for the raw representation of
/// `AA:i:10`.
pub(crate) fn field_len(raw: &[u8]) -> Result<usize> {
    if raw.len() < 4 {
        return Err(Error::Corrupted("Truncated tags".to_string()));
    }
    let ty = raw[2];
    match ty {
        b'Z' | b'H' => {
            for i in 3..raw.len() {
                if raw[i] == 0 {
                    if ty == b'H' && (i - 3) % 2 != 0 {
                        return Err(Error::Corrupted(
                            "Hex tag has an odd number of characters".to_string(),
                        ));
                    }
                    return Ok(i + 1);
                }
            }
            Err(Error::Corrupted("Truncated tags".to_string()))
        }
        b'B' => {
            if raw.len() < 8 {
                return Err(Error::Corrupted("Truncated tags".to_string()));
            }
            let arr_len = LittleEndian::read_i32(&raw[4..8]);
            if arr_len < 0 {
                return Err(Error::Corrupted("Negative tag array length".to_string()));
            }
            Ok(8 + fixed_size(raw[3])? * arr_len as usize)
        }
        _ => Ok(3 + fixed_size(ty)?),
    }
}

/// Returns the byte offset of the field with `name` inside a raw tag blob,
/// scanning fields in physical order.
pub(crate) fn find(raw: &[u8], name: &TagName) -> Result<Option<usize>> {
    let mut start = 0;
    while start < raw.len() {
        let len = field_len(&raw[start..])?;
        if start + len > raw.len() {
            return Err(Error::Corrupted("Truncated tags".to_string()));
        }
        if &raw[start..start + 2] == name {
            return Ok(Some(start));
        }
        start += len;
    }
    Ok(None)
}

/// Decodes a binary value given its type byte and value bytes (the bytes
/// after the type byte, up to the field end).
pub(crate) fn decode_bin(ty: u8, raw: &[u8]) -> Result<AuxValue> {
    if let Some(int_type) = IntegerType::from_letter(ty) {
        return Ok(AuxValue::Int(int_type.parse_raw(raw)));
    }
    match ty {
        b'A' => Ok(AuxValue::Char(raw[0])),
        b'f' => Ok(AuxValue::Float(LittleEndian::read_f32(raw))),
        b'Z' => {
            let text = &raw[..raw.len() - 1];
            String::from_utf8(text.to_vec())
                .map(AuxValue::String)
                .map_err(|_| Error::Corrupted("String tag is not UTF-8".to_string()))
        }
        b'H' => decode_hex(&raw[..raw.len() - 1]).map(AuxValue::Hex),
        b'B' => {
            let arr_ty = raw[0];
            let data = &raw[5..];
            if arr_ty == b'f' {
                let values = data.chunks(4).map(LittleEndian::read_f32).collect();
                return Ok(AuxValue::FloatArray(values));
            }
            match IntegerType::from_letter(arr_ty) {
                Some(int_type) => {
                    let values = data
                        .chunks(int_type.size_of())
                        .map(|chunk| int_type.parse_raw(chunk))
                        .collect();
                    Ok(AuxValue::IntArray(values, int_type))
                }
                None => Err(Error::UnknownAuxType(arr_ty)),
            }
        }
        _ => Err(Error::UnknownAuxType(ty)),
    }
}

/// Parses a text-encoded value given its one-letter type code.
pub(crate) fn decode_text(ty: u8, value: &str) -> Result<AuxValue> {
    match ty {
        b'A' => {
            if value.len() != 1 {
                return Err(Error::Corrupted(format!(
                    "Char tag value '{}' is not a single character",
                    value
                )));
            }
            Ok(AuxValue::Char(value.as_bytes()[0]))
        }
        b'i' => value
            .parse()
            .map(AuxValue::Int)
            .map_err(|_| Error::Corrupted(format!("Cannot convert tag value '{}' to int", value))),
        b'f' => value
            .parse()
            .map(AuxValue::Float)
            .map_err(|_| Error::Corrupted(format!("Cannot convert tag value '{}' to float", value))),
        b'Z' => Ok(AuxValue::String(value.to_string())),
        b'H' => decode_hex(value.as_bytes()).map(AuxValue::Hex),
        b'B' => decode_text_array(value),
        _ => Err(Error::UnknownAuxType(ty)),
    }
}

/// Parses a comma-separated array value, such as `i,1,2,3`.
fn decode_text_array(value: &str) -> Result<AuxValue> {
    let mut split = value.split(',');
    let arr_ty = match split.next() {
        Some(ty) if ty.len() == 1 => ty.as_bytes()[0],
        _ => return Err(Error::Corrupted(format!("Cannot parse tag array '{}'", value))),
    };
    if arr_ty == b'f' {
        let values = split
            .map(|s| s.parse::<f32>())
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|_| Error::Corrupted(format!("Cannot parse tag array '{}'", value)))?;
        return Ok(AuxValue::FloatArray(values));
    }
    let int_type = IntegerType::from_letter(arr_ty).ok_or(Error::UnknownAuxType(arr_ty))?;
    let values = split
        .map(|s| parse_text_int(s, int_type))
        .collect::<Result<Vec<_>>>()?;
    Ok(AuxValue::IntArray(values, int_type))
}

/// Parses one array element within the range of its declared type,
/// widening to `i64`.
fn parse_text_int(s: &str, int_type: IntegerType) -> Result<i64> {
    use IntegerType::*;
    let parsed = match int_type {
        I8 => s.parse::<i8>().map(i64::from),
        U8 => s.parse::<u8>().map(i64::from),
        I16 => s.parse::<i16>().map(i64::from),
        U16 => s.parse::<u16>().map(i64::from),
        I32 => s.parse::<i32>().map(i64::from),
        U32 => s.parse::<u32>().map(i64::from),
    };
    parsed.map_err(|_| Error::Corrupted(format!("Cannot convert tag value '{}' to int", s)))
}

fn hex_nibble(symbol: u8) -> Result<u8> {
    match symbol {
        b'0'..=b'9' => Ok(symbol - b'0'),
        b'a'..=b'f' => Ok(symbol - b'a' + 10),
        b'A'..=b'F' => Ok(symbol - b'A' + 10),
        _ => Err(Error::Corrupted(format!(
            "Unexpected hex character: {}",
            symbol as char
        ))),
    }
}

/// Decodes pairs of hex characters into bytes.
fn decode_hex(chars: &[u8]) -> Result<Vec<u8>> {
    if chars.len() % 2 != 0 {
        return Err(Error::Corrupted(
            "Hex tag has an odd number of characters".to_string(),
        ));
    }
    chars
        .chunks(2)
        .map(|pair| Ok(hex_nibble(pair[0])? << 4 | hex_nibble(pair[1])?))
        .collect()
}
