//! # Rule Model
//!
//! A [`FieldDefaults`] is the tagged-union default attached to one field.
//! Schema documents spell it as a single-key map naming the kind:
//!
//! ```json
//! { "int64": 42 }
//! { "timestamp": "now" }
//! { "message": { "initialize": true, "defaults": false } }
//! ```
//!
//! Unknown kinds are kept as [`FieldDefaults::Unsupported`] so that a newer
//! schema still loads and the engines can report the exact tag they refused.

use serde::de::{self, Deserializer, IgnoredAny, MapAccess, Visitor};
use serde::Deserialize;
use std::fmt;

/// Default rule for a single field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldDefaults {
    Float(f32),
    Double(f64),
    Int32(i32),
    Int64(i64),
    Uint32(u32),
    Uint64(u64),
    Sint32(i32),
    Sint64(i64),
    Fixed32(u32),
    Fixed64(u64),
    Sfixed32(i32),
    Sfixed64(i64),
    Bool(bool),
    String(String),
    Bytes(Vec<u8>),
    /// Enum value number.
    Enum(i32),
    /// Duration literal, see [`crate::temporal::parse_duration`].
    Duration(String),
    /// Timestamp literal or `now`, see [`crate::temporal::TimestampLiteral`].
    Timestamp(String),
    Message(MessageDefaults),
    /// A kind this engine version does not know.
    Unsupported(String),
}

impl FieldDefaults {
    /// The kind tag as spelled in schema documents.
    pub fn tag(&self) -> &str {
        match self {
            Self::Float(_) => "float",
            Self::Double(_) => "double",
            Self::Int32(_) => "int32",
            Self::Int64(_) => "int64",
            Self::Uint32(_) => "uint32",
            Self::Uint64(_) => "uint64",
            Self::Sint32(_) => "sint32",
            Self::Sint64(_) => "sint64",
            Self::Fixed32(_) => "fixed32",
            Self::Fixed64(_) => "fixed64",
            Self::Sfixed32(_) => "sfixed32",
            Self::Sfixed64(_) => "sfixed64",
            Self::Bool(_) => "bool",
            Self::String(_) => "string",
            Self::Bytes(_) => "bytes",
            Self::Enum(_) => "enum",
            Self::Duration(_) => "duration",
            Self::Timestamp(_) => "timestamp",
            Self::Message(_) => "message",
            Self::Unsupported(tag) => tag,
        }
    }
}

/// Nested-message policy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MessageDefaults {
    /// Construct the nested message when it is absent.
    #[serde(default)]
    pub initialize: bool,
    /// Recurse into the nested message. Absent means `true`.
    #[serde(default)]
    pub defaults: Option<bool>,
}

impl MessageDefaults {
    pub fn recurse(&self) -> bool {
        self.defaults.unwrap_or(true)
    }
}

/// Bytes literals are written either as text or as an array of octets.
#[derive(Deserialize)]
#[serde(untagged)]
enum BytesLiteral {
    Text(String),
    Octets(Vec<u8>),
}

impl BytesLiteral {
    fn into_bytes(self) -> Vec<u8> {
        match self {
            Self::Text(s) => s.into_bytes(),
            Self::Octets(b) => b,
        }
    }
}

impl<'de> Deserialize<'de> for FieldDefaults {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(FieldDefaultsVisitor)
    }
}

struct FieldDefaultsVisitor;

impl<'de> Visitor<'de> for FieldDefaultsVisitor {
    type Value = FieldDefaults;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a single-key map naming the default kind")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<FieldDefaults, A::Error> {
        let tag: String = map
            .next_key()?
            .ok_or_else(|| de::Error::invalid_length(0, &self))?;

        let rule = match tag.as_str() {
            "float" => FieldDefaults::Float(map.next_value()?),
            "double" => FieldDefaults::Double(map.next_value()?),
            "int32" => FieldDefaults::Int32(map.next_value()?),
            "int64" => FieldDefaults::Int64(map.next_value()?),
            "uint32" => FieldDefaults::Uint32(map.next_value()?),
            "uint64" => FieldDefaults::Uint64(map.next_value()?),
            "sint32" => FieldDefaults::Sint32(map.next_value()?),
            "sint64" => FieldDefaults::Sint64(map.next_value()?),
            "fixed32" => FieldDefaults::Fixed32(map.next_value()?),
            "fixed64" => FieldDefaults::Fixed64(map.next_value()?),
            "sfixed32" => FieldDefaults::Sfixed32(map.next_value()?),
            "sfixed64" => FieldDefaults::Sfixed64(map.next_value()?),
            "bool" => FieldDefaults::Bool(map.next_value()?),
            "string" => FieldDefaults::String(map.next_value()?),
            "bytes" => FieldDefaults::Bytes(map.next_value::<BytesLiteral>()?.into_bytes()),
            "enum" => FieldDefaults::Enum(map.next_value()?),
            "duration" => FieldDefaults::Duration(map.next_value()?),
            "timestamp" => FieldDefaults::Timestamp(map.next_value()?),
            "message" => FieldDefaults::Message(map.next_value()?),
            _ => {
                map.next_value::<IgnoredAny>()?;
                FieldDefaults::Unsupported(tag)
            }
        };

        if map.next_key::<IgnoredAny>()?.is_some() {
            return Err(de::Error::custom("a field default names exactly one kind"));
        }
        Ok(rule)
    }
}
