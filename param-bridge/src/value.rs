//! Host-native representation of parameter values and the conversions to
//! and from raw record storage.

use serde::{Deserialize, Serialize};

use crate::error::{ParamError, Result};
use crate::record::ParamType;

/// A decoded parameter value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Unsigned(u64),
    Signed(i64),
    /// Covers both float and double records.
    Float(f64),
    Str(String),
    Data(Vec<u8>),
    Array(Vec<Value>),
}

impl Value {
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Self::Unsigned(v) => Some(*v),
            Self::Signed(v) => Some(*v as u64),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Signed(v) => Some(*v),
            Self::Unsigned(v) => Some(*v as i64),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v),
            Self::Signed(v) => Some(*v as f64),
            Self::Unsigned(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Self::Array(v) => Some(v),
            _ => None,
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unsigned(v) => write!(f, "{v}"),
            Self::Signed(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Str(v) => write!(f, "{v}"),
            Self::Data(v) => {
                for b in v {
                    write!(f, "{b:02x}")?;
                }
                Ok(())
            }
            Self::Array(vs) => {
                write!(f, "(")?;
                for (i, v) in vs.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{v}")?;
                }
                write!(f, ")")
            }
        }
    }
}

macro_rules! impl_value_from {
    ($($ty:ty => $variant:ident as $cast:ty),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Value::$variant(v as $cast)
                }
            }
        )*
    };
}

impl_value_from! {
    u8 => Unsigned as u64,
    u16 => Unsigned as u64,
    u32 => Unsigned as u64,
    u64 => Unsigned as u64,
    i8 => Signed as i64,
    i16 => Signed as i64,
    i32 => Signed as i64,
    i64 => Signed as i64,
    f32 => Float as f64,
    f64 => Float as f64,
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Data(v)
    }
}

/// Input to a write: one scalar, or a sequence zipped against indexes.
#[derive(Debug, Clone)]
pub enum WriteValue {
    Single(Value),
    Many(Vec<Value>),
}

impl From<Value> for WriteValue {
    fn from(v: Value) -> Self {
        Self::Single(v)
    }
}

impl From<Vec<Value>> for WriteValue {
    fn from(vs: Vec<Value>) -> Self {
        Self::Many(vs)
    }
}

macro_rules! impl_write_value_from {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for WriteValue {
                fn from(v: $ty) -> Self {
                    Self::Single(v.into())
                }
            }
            impl From<Vec<$ty>> for WriteValue {
                fn from(vs: Vec<$ty>) -> Self {
                    Self::Many(vs.into_iter().map(Value::from).collect())
                }
            }
        )*
    };
}

impl_write_value_from!(u8, u16, u32, u64, i8, i16, i32, i64, f32, f64, String);

impl From<&str> for WriteValue {
    fn from(v: &str) -> Self {
        Self::Single(v.into())
    }
}

/// Decode one element of raw storage into its host representation.
pub fn decode_elem(param_type: ParamType, bytes: &[u8]) -> Value {
    debug_assert_eq!(bytes.len(), param_type.elem_size());
    match param_type {
        ParamType::Uint8 | ParamType::Xint8 => Value::Unsigned(bytes[0] as u64),
        ParamType::Uint16 | ParamType::Xint16 => {
            Value::Unsigned(u16::from_le_bytes([bytes[0], bytes[1]]) as u64)
        }
        ParamType::Uint32 | ParamType::Xint32 => {
            Value::Unsigned(u32::from_le_bytes(bytes.try_into().unwrap()) as u64)
        }
        ParamType::Uint64 | ParamType::Xint64 => {
            Value::Unsigned(u64::from_le_bytes(bytes.try_into().unwrap()))
        }
        ParamType::Int8 => Value::Signed(bytes[0] as i8 as i64),
        ParamType::Int16 => Value::Signed(i16::from_le_bytes([bytes[0], bytes[1]]) as i64),
        ParamType::Int32 => Value::Signed(i32::from_le_bytes(bytes.try_into().unwrap()) as i64),
        ParamType::Int64 => Value::Signed(i64::from_le_bytes(bytes.try_into().unwrap())),
        ParamType::Float => Value::Float(f32::from_le_bytes(bytes.try_into().unwrap()) as f64),
        ParamType::Double => Value::Float(f64::from_le_bytes(bytes.try_into().unwrap())),
        // Whole-buffer types; a single element is one raw byte.
        ParamType::String | ParamType::Data => Value::Unsigned(bytes[0] as u64),
    }
}

/// Encode a host value into one element's storage bytes.
///
/// Hexadecimal-flavored integers go through a text round-trip: the value is
/// rendered as hexadecimal digits and re-parsed, matching how the native
/// side decodes them. Hex records also accept string input (`"0x1A"` or
/// bare digits).
pub fn encode_elem(param_type: ParamType, value: &Value, param: &str) -> Result<Vec<u8>> {
    if param_type.is_hex() {
        let raw = match value {
            Value::Str(s) => parse_hex_text(s, param)?,
            other => {
                let v = other.as_u64().ok_or_else(|| {
                    ParamError::type_mismatch("hex parameters take integers or hex strings", param)
                })?;
                parse_hex_text(&format!("{v:#X}"), param)?
            }
        };
        return Ok(unsigned_to_le(raw, param_type.elem_size()));
    }

    match param_type {
        ParamType::Uint8 | ParamType::Uint16 | ParamType::Uint32 | ParamType::Uint64 => {
            let v = value.as_u64().ok_or_else(|| {
                ParamError::type_mismatch("expected an unsigned integer", param)
            })?;
            Ok(unsigned_to_le(v, param_type.elem_size()))
        }
        ParamType::Int8 | ParamType::Int16 | ParamType::Int32 | ParamType::Int64 => {
            let v = value
                .as_i64()
                .ok_or_else(|| ParamError::type_mismatch("expected an integer", param))?;
            Ok(unsigned_to_le(v as u64, param_type.elem_size()))
        }
        ParamType::Float => {
            let v = value
                .as_f64()
                .ok_or_else(|| ParamError::type_mismatch("expected a number", param))?;
            Ok((v as f32).to_le_bytes().to_vec())
        }
        ParamType::Double => {
            let v = value
                .as_f64()
                .ok_or_else(|| ParamError::type_mismatch("expected a number", param))?;
            Ok(v.to_le_bytes().to_vec())
        }
        ParamType::String | ParamType::Data => Err(ParamError::type_mismatch(
            "string/data parameters take whole-value writes",
            param,
        )),
        _ => unreachable!("hex variants handled above"),
    }
}

fn unsigned_to_le(v: u64, width: usize) -> Vec<u8> {
    v.to_le_bytes()[..width].to_vec()
}

fn parse_hex_text(text: &str, param: &str) -> Result<u64> {
    let digits = text
        .strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
        .unwrap_or(text);
    u64::from_str_radix(digits, 16)
        .map_err(|_| ParamError::type_mismatch(format!("'{text}' is not hexadecimal"), param))
}
