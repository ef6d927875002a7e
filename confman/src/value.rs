//! Typed values stored in dictionary sections.
//!
//! A dictionary entry is written as
//! `<add key="k" value="text" type="System.Int32" />`. The type tag keeps the
//! full primitive kind so a value reads back exactly as it was stored. A
//! missing or blank tag means [`ValueKind::String`].

use std::{fmt, str::FromStr};

use rust_decimal::Decimal;

use crate::error::{Error, Result};

/// Primitive kinds a [`TypedValue`] can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Bool,
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    I64,
    U64,
    F32,
    F64,
    Decimal,
    Char,
    String,
    Bytes,
}

const KIND_TAGS: [(ValueKind, &str); 15] = [
    (ValueKind::Bool, "System.Boolean"),
    (ValueKind::I8, "System.SByte"),
    (ValueKind::U8, "System.Byte"),
    (ValueKind::I16, "System.Int16"),
    (ValueKind::U16, "System.UInt16"),
    (ValueKind::I32, "System.Int32"),
    (ValueKind::U32, "System.UInt32"),
    (ValueKind::I64, "System.Int64"),
    (ValueKind::U64, "System.UInt64"),
    (ValueKind::F32, "System.Single"),
    (ValueKind::F64, "System.Double"),
    (ValueKind::Decimal, "System.Decimal"),
    (ValueKind::Char, "System.Char"),
    (ValueKind::String, "System.String"),
    (ValueKind::Bytes, "System.Byte[]"),
];

impl ValueKind {
    /// Type tag persisted next to the value.
    pub fn tag(self) -> &'static str {
        KIND_TAGS
            .iter()
            .find(|(kind, _)| *kind == self)
            .map(|(_, tag)| *tag)
            .unwrap_or("System.String")
    }

    /// Resolves a persisted type tag.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTypeKind`] for an unrecognized tag.
    pub fn from_tag(tag: &str) -> Result<Self> {
        KIND_TAGS
            .iter()
            .find(|(_, t)| *t == tag)
            .map(|(kind, _)| *kind)
            .ok_or_else(|| Error::InvalidTypeKind(tag.to_string()))
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// A dictionary value together with its primitive kind.
#[derive(Debug, Clone, PartialEq)]
pub enum TypedValue {
    Bool(bool),
    I8(i8),
    U8(u8),
    I16(i16),
    U16(u16),
    I32(i32),
    U32(u32),
    I64(i64),
    U64(u64),
    F32(f32),
    F64(f64),
    Decimal(Decimal),
    Char(char),
    String(String),
    Bytes(Vec<u8>),
}

impl TypedValue {
    pub fn kind(&self) -> ValueKind {
        match self {
            TypedValue::Bool(_) => ValueKind::Bool,
            TypedValue::I8(_) => ValueKind::I8,
            TypedValue::U8(_) => ValueKind::U8,
            TypedValue::I16(_) => ValueKind::I16,
            TypedValue::U16(_) => ValueKind::U16,
            TypedValue::I32(_) => ValueKind::I32,
            TypedValue::U32(_) => ValueKind::U32,
            TypedValue::I64(_) => ValueKind::I64,
            TypedValue::U64(_) => ValueKind::U64,
            TypedValue::F32(_) => ValueKind::F32,
            TypedValue::F64(_) => ValueKind::F64,
            TypedValue::Decimal(_) => ValueKind::Decimal,
            TypedValue::Char(_) => ValueKind::Char,
            TypedValue::String(_) => ValueKind::String,
            TypedValue::Bytes(_) => ValueKind::Bytes,
        }
    }

    /// Encodes the value into its attribute text and type tag.
    ///
    /// Numbers use the locale-independent Rust formatting, booleans are
    /// written `True`/`False`, byte sequences as uppercase hex without
    /// separators.
    pub fn encode(&self) -> (String, &'static str) {
        let text = match self {
            TypedValue::Bool(true) => "True".to_string(),
            TypedValue::Bool(false) => "False".to_string(),
            TypedValue::I8(v) => v.to_string(),
            TypedValue::U8(v) => v.to_string(),
            TypedValue::I16(v) => v.to_string(),
            TypedValue::U16(v) => v.to_string(),
            TypedValue::I32(v) => v.to_string(),
            TypedValue::U32(v) => v.to_string(),
            TypedValue::I64(v) => v.to_string(),
            TypedValue::U64(v) => v.to_string(),
            TypedValue::F32(v) => v.to_string(),
            TypedValue::F64(v) => v.to_string(),
            TypedValue::Decimal(v) => v.to_string(),
            TypedValue::Char(v) => v.to_string(),
            TypedValue::String(v) => v.clone(),
            TypedValue::Bytes(v) => hex::encode_upper(v),
        };
        (text, self.kind().tag())
    }

    /// Decodes attribute text using an optional type tag.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidTypeKind`] when the tag is not recognized.
    /// - [`Error::MalformedInput`] when the text does not parse as the kind.
    pub fn decode(text: &str, tag: Option<&str>) -> Result<Self> {
        let kind = match tag.map(str::trim) {
            None | Some("") => ValueKind::String,
            Some(tag) => ValueKind::from_tag(tag)?,
        };
        Self::decode_kind(text, kind)
    }

    /// Decodes attribute text as a known kind.
    pub fn decode_kind(text: &str, kind: ValueKind) -> Result<Self> {
        let value = match kind {
            ValueKind::Bool => TypedValue::Bool(parse_bool(text)?),
            ValueKind::I8 => TypedValue::I8(parse_number(text, kind)?),
            ValueKind::U8 => TypedValue::U8(parse_number(text, kind)?),
            ValueKind::I16 => TypedValue::I16(parse_number(text, kind)?),
            ValueKind::U16 => TypedValue::U16(parse_number(text, kind)?),
            ValueKind::I32 => TypedValue::I32(parse_number(text, kind)?),
            ValueKind::U32 => TypedValue::U32(parse_number(text, kind)?),
            ValueKind::I64 => TypedValue::I64(parse_number(text, kind)?),
            ValueKind::U64 => TypedValue::U64(parse_number(text, kind)?),
            ValueKind::F32 => TypedValue::F32(parse_number(text, kind)?),
            ValueKind::F64 => TypedValue::F64(parse_number(text, kind)?),
            ValueKind::Decimal => TypedValue::Decimal(parse_number(text, kind)?),
            ValueKind::Char => {
                let mut chars = text.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => TypedValue::Char(c),
                    _ => {
                        return Err(Error::malformed(format!(
                            "{text:?} is not a single character"
                        )));
                    }
                }
            }
            ValueKind::String => TypedValue::String(text.to_string()),
            ValueKind::Bytes => TypedValue::Bytes(
                hex::decode(text)
                    .map_err(|e| Error::malformed(format!("invalid hex {text:?}: {e}")))?,
            ),
        };
        Ok(value)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            TypedValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            TypedValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Widens any integer kind that fits into `i64`.
    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            TypedValue::I8(v) => Some(v.into()),
            TypedValue::U8(v) => Some(v.into()),
            TypedValue::I16(v) => Some(v.into()),
            TypedValue::U16(v) => Some(v.into()),
            TypedValue::I32(v) => Some(v.into()),
            TypedValue::U32(v) => Some(v.into()),
            TypedValue::I64(v) => Some(v),
            TypedValue::U64(v) => i64::try_from(v).ok(),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            TypedValue::Bytes(b) => Some(b),
            _ => None,
        }
    }

    /// Converts to a JSON value, byte sequences as hex strings.
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value;
        match self {
            TypedValue::Bool(b) => Value::Bool(*b),
            TypedValue::F32(v) => serde_json::Number::from_f64((*v).into())
                .map(Value::Number)
                .unwrap_or(Value::Null),
            TypedValue::F64(v) => serde_json::Number::from_f64(*v)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            TypedValue::U64(v) => Value::from(*v),
            other => match other.as_i64() {
                Some(i) => Value::from(i),
                None => Value::String(other.encode().0),
            },
        }
    }
}

fn parse_bool(text: &str) -> Result<bool> {
    let text = text.trim();
    if text.eq_ignore_ascii_case("true") {
        Ok(true)
    } else if text.eq_ignore_ascii_case("false") {
        Ok(false)
    } else {
        Err(Error::malformed(format!("{text:?} is not a boolean")))
    }
}

fn parse_number<T>(text: &str, kind: ValueKind) -> Result<T>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    text.trim()
        .parse()
        .map_err(|e| Error::malformed(format!("{text:?} is not a valid {kind}: {e}")))
}

impl fmt::Display for TypedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode().0)
    }
}

macro_rules! impl_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for TypedValue {
                fn from(value: $ty) -> Self {
                    TypedValue::$variant(value)
                }
            }
        )*
    };
}

impl_from! {
    bool => Bool,
    i8 => I8,
    u8 => U8,
    i16 => I16,
    u16 => U16,
    i32 => I32,
    u32 => U32,
    i64 => I64,
    u64 => U64,
    f32 => F32,
    f64 => F64,
    Decimal => Decimal,
    char => Char,
    String => String,
    Vec<u8> => Bytes,
}

impl From<&str> for TypedValue {
    fn from(value: &str) -> Self {
        TypedValue::String(value.to_string())
    }
}

impl From<&[u8]> for TypedValue {
    fn from(value: &[u8]) -> Self {
        TypedValue::Bytes(value.to_vec())
    }
}

/// JSON scalars map onto the closest kind: booleans, `i64`/`u64`/`f64`
/// numbers and strings.
impl TryFrom<&serde_json::Value> for TypedValue {
    type Error = Error;

    fn try_from(value: &serde_json::Value) -> Result<Self> {
        use serde_json::Value;
        match value {
            Value::Bool(b) => Ok(TypedValue::Bool(*b)),
            Value::Number(n) => n
                .as_i64()
                .map(TypedValue::I64)
                .or_else(|| n.as_u64().map(TypedValue::U64))
                .or_else(|| n.as_f64().map(TypedValue::F64))
                .ok_or_else(|| Error::UnsupportedType(format!("number {n}"))),
            Value::String(s) => Ok(TypedValue::String(s.clone())),
            Value::Null => Err(Error::UnsupportedType("null".into())),
            Value::Array(_) => Err(Error::UnsupportedType("array".into())),
            Value::Object(_) => Err(Error::UnsupportedType("object".into())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn round_trip(value: TypedValue) {
        let (text, tag) = value.encode();
        let decoded = TypedValue::decode(&text, Some(tag)).unwrap();
        assert_eq!(decoded, value, "text {text:?} tag {tag}");
    }

    #[test]
    fn test_every_kind_round_trips() {
        round_trip(true.into());
        round_trip(i8::MAX.into());
        round_trip(u8::MAX.into());
        round_trip(i16::MIN.into());
        round_trip(u16::MAX.into());
        round_trip(i32::MAX.into());
        round_trip(u32::MAX.into());
        round_trip(i64::MIN.into());
        round_trip(u64::MAX.into());
        round_trip((f32::MAX / 2.0).into());
        round_trip((f64::MAX / 2.0).into());
        round_trip(Decimal::MAX.into());
        round_trip('Z'.into());
        round_trip("支持 15 种单值类型".into());
        round_trip(vec![0x01u8, 0x01, 0x0A, 0x0B, 0x0C].into());
    }

    #[test]
    fn test_bytes_hex() {
        let value = TypedValue::Bytes(vec![0x01, 0x0A, 0xFF]);
        assert_eq!(value.encode(), ("010AFF".to_string(), "System.Byte[]"));
        assert_eq!(TypedValue::decode("010AFF", Some("System.Byte[]")).unwrap(), value);
        assert!(matches!(
            TypedValue::decode("0A1", Some("System.Byte[]")),
            Err(Error::MalformedInput(_))
        ));
        assert!(matches!(
            TypedValue::decode("ZZ", Some("System.Byte[]")),
            Err(Error::MalformedInput(_))
        ));
    }

    #[test]
    fn test_missing_tag_is_string() {
        assert_eq!(
            TypedValue::decode("42", None).unwrap(),
            TypedValue::String("42".into())
        );
        assert_eq!(
            TypedValue::decode("42", Some("  ")).unwrap(),
            TypedValue::String("42".into())
        );
    }

    #[test]
    fn test_unknown_tag() {
        assert!(matches!(
            TypedValue::decode("1", Some("System.Guid")),
            Err(Error::InvalidTypeKind(tag)) if tag == "System.Guid"
        ));
    }

    #[test]
    fn test_foreign_formats() {
        assert_eq!(
            TypedValue::decode("TRUE", Some("System.Boolean")).unwrap(),
            TypedValue::Bool(true)
        );
        assert_eq!(
            TypedValue::decode("1.7014117E+38", Some("System.Single")).unwrap(),
            TypedValue::F32(1.7014117e38)
        );
        assert!(TypedValue::decode("256", Some("System.Byte")).is_err());
        assert!(TypedValue::decode("ab", Some("System.Char")).is_err());
    }

    #[test]
    fn test_json_conversion() {
        let v: serde_json::Value = serde_json::from_str("[1]").unwrap();
        assert!(matches!(TypedValue::try_from(&v), Err(Error::UnsupportedType(_))));
        let v = serde_json::Value::from(7);
        assert_eq!(TypedValue::try_from(&v).unwrap(), TypedValue::I64(7));
        assert_eq!(TypedValue::U8(7).to_json(), serde_json::Value::from(7));
    }

    proptest! {
        #[test]
        fn prop_integers_and_text_round_trip(i in any::<i64>(), u in any::<u32>(), s in ".*", b in proptest::collection::vec(any::<u8>(), 0..32)) {
            round_trip(i.into());
            round_trip(u.into());
            round_trip(s.into());
            round_trip(b.into());
        }

        #[test]
        fn prop_floats_round_trip(f in proptest::num::f64::NORMAL, g in proptest::num::f32::NORMAL) {
            round_trip(f.into());
            round_trip(g.into());
        }
    }
}
