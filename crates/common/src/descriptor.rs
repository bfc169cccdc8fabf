//! # Schema Descriptors
//!
//! Read-only description of message types, fields, oneofs and enums, plus the
//! well-known protobuf types the defaulting rules treat specially.
//!
//! Descriptors are deserialized from schema documents and then completed
//! (full names, packages) by [`crate::registry::SchemaRegistry`].

use crate::rule::FieldDefaults;
use serde::Deserialize;
use std::fmt;

/// Declared kind of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Kind {
    Double,
    Float,
    Int64,
    Uint64,
    Int32,
    Fixed64,
    Fixed32,
    Bool,
    String,
    Bytes,
    Uint32,
    Sfixed32,
    Sfixed64,
    Sint32,
    Sint64,
    Enum,
    Message,
}

impl Kind {
    /// The `.proto` spelling of the kind.
    pub fn proto_name(self) -> &'static str {
        match self {
            Kind::Double => "double",
            Kind::Float => "float",
            Kind::Int64 => "int64",
            Kind::Uint64 => "uint64",
            Kind::Int32 => "int32",
            Kind::Fixed64 => "fixed64",
            Kind::Fixed32 => "fixed32",
            Kind::Bool => "bool",
            Kind::String => "string",
            Kind::Bytes => "bytes",
            Kind::Uint32 => "uint32",
            Kind::Sfixed32 => "sfixed32",
            Kind::Sfixed64 => "sfixed64",
            Kind::Sint32 => "sint32",
            Kind::Sint64 => "sint64",
            Kind::Enum => "enum",
            Kind::Message => "message",
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.proto_name())
    }
}

/// Well-known types with dedicated default handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WellKnownType {
    Any,
    Duration,
    Timestamp,
    DoubleValue,
    FloatValue,
    Int64Value,
    UInt64Value,
    Int32Value,
    UInt32Value,
    BoolValue,
    StringValue,
    BytesValue,
}

impl WellKnownType {
    pub const ALL: [WellKnownType; 12] = [
        WellKnownType::Any,
        WellKnownType::Duration,
        WellKnownType::Timestamp,
        WellKnownType::DoubleValue,
        WellKnownType::FloatValue,
        WellKnownType::Int64Value,
        WellKnownType::UInt64Value,
        WellKnownType::Int32Value,
        WellKnownType::UInt32Value,
        WellKnownType::BoolValue,
        WellKnownType::StringValue,
        WellKnownType::BytesValue,
    ];

    pub fn full_name(self) -> &'static str {
        match self {
            WellKnownType::Any => "google.protobuf.Any",
            WellKnownType::Duration => "google.protobuf.Duration",
            WellKnownType::Timestamp => "google.protobuf.Timestamp",
            WellKnownType::DoubleValue => "google.protobuf.DoubleValue",
            WellKnownType::FloatValue => "google.protobuf.FloatValue",
            WellKnownType::Int64Value => "google.protobuf.Int64Value",
            WellKnownType::UInt64Value => "google.protobuf.UInt64Value",
            WellKnownType::Int32Value => "google.protobuf.Int32Value",
            WellKnownType::UInt32Value => "google.protobuf.UInt32Value",
            WellKnownType::BoolValue => "google.protobuf.BoolValue",
            WellKnownType::StringValue => "google.protobuf.StringValue",
            WellKnownType::BytesValue => "google.protobuf.BytesValue",
        }
    }

    /// Accepts names with or without the leading `.` protoc emits.
    pub fn from_full_name(name: &str) -> Option<Self> {
        let name = name.strip_prefix('.').unwrap_or(name);
        Self::ALL.into_iter().find(|wkt| wkt.full_name() == name)
    }

    /// Scalar kind boxed by a nullable wrapper, `None` for non-wrappers.
    pub fn wrapped_kind(self) -> Option<Kind> {
        match self {
            WellKnownType::DoubleValue => Some(Kind::Double),
            WellKnownType::FloatValue => Some(Kind::Float),
            WellKnownType::Int64Value => Some(Kind::Int64),
            WellKnownType::UInt64Value => Some(Kind::Uint64),
            WellKnownType::Int32Value => Some(Kind::Int32),
            WellKnownType::UInt32Value => Some(Kind::Uint32),
            WellKnownType::BoolValue => Some(Kind::Bool),
            WellKnownType::StringValue => Some(Kind::String),
            WellKnownType::BytesValue => Some(Kind::Bytes),
            WellKnownType::Any | WellKnownType::Duration | WellKnownType::Timestamp => None,
        }
    }

    pub fn is_wrapper(self) -> bool {
        self.wrapped_kind().is_some()
    }
}

/// A single field of a message type.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FieldDescriptor {
    pub name: String,
    pub number: u32,
    pub kind: Kind,
    #[serde(default)]
    pub repeated: bool,
    #[serde(default)]
    pub map: bool,
    /// `optional` in proto3, expressed through a synthetic oneof.
    #[serde(default)]
    pub proto3_optional: bool,
    /// Name of the containing real (non-synthetic) oneof.
    #[serde(default)]
    pub oneof: Option<String>,
    /// Fully-qualified enum or message type name.
    #[serde(default, rename = "type")]
    pub type_name: Option<String>,
    #[serde(default, rename = "default")]
    pub rule: Option<FieldDefaults>,
}

impl FieldDescriptor {
    pub fn is_list(&self) -> bool {
        self.repeated && !self.map
    }

    pub fn is_map(&self) -> bool {
        self.map
    }

    pub fn is_collection(&self) -> bool {
        self.repeated || self.map
    }

    pub fn real_oneof(&self) -> Option<&str> {
        self.oneof.as_deref()
    }

    /// Referenced type name without the leading `.`.
    pub fn type_name(&self) -> Option<&str> {
        self.type_name
            .as_deref()
            .map(|name| name.strip_prefix('.').unwrap_or(name))
    }

    pub fn well_known(&self) -> Option<WellKnownType> {
        if self.kind != Kind::Message {
            return None;
        }
        self.type_name().and_then(WellKnownType::from_full_name)
    }

    /// Whether "set" is tracked independently of the value.
    ///
    /// Plain proto3 scalars have no presence: they count as set when non-zero.
    pub fn has_presence(&self) -> bool {
        !self.is_collection()
            && (self.kind == Kind::Message || self.proto3_optional || self.oneof.is_some())
    }

    pub fn rule(&self) -> Option<&FieldDefaults> {
        self.rule.as_ref()
    }
}

/// A real oneof group and its default member.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OneofDescriptor {
    pub name: String,
    /// Member instantiated as its zero value when the group is unset.
    #[serde(default, rename = "default")]
    pub default_member: Option<String>,
}

/// A message type.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MessageDescriptor {
    pub name: String,
    /// Filled in by the registry: `package.Outer.Name`.
    #[serde(skip)]
    pub full_name: String,
    /// Filled in by the registry.
    #[serde(skip)]
    pub package: String,
    #[serde(default)]
    pub fields: Vec<FieldDescriptor>,
    #[serde(default)]
    pub oneofs: Vec<OneofDescriptor>,
    /// Skip the whole message, including recursion from parents.
    #[serde(default)]
    pub disabled: bool,
    /// Skip the message at this level; no procedure is generated for it.
    #[serde(default)]
    pub ignored: bool,
    /// Nested message types, flattened by the registry.
    #[serde(default)]
    pub messages: Vec<MessageDescriptor>,
    /// Nested enum types, flattened by the registry.
    #[serde(default)]
    pub enums: Vec<EnumDescriptor>,
}

impl MessageDescriptor {
    pub fn is_disabled(&self) -> bool {
        self.disabled
    }

    pub fn is_ignored(&self) -> bool {
        self.ignored
    }

    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn field_by_number(&self, number: u32) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.number == number)
    }

    pub fn oneof(&self, name: &str) -> Option<&OneofDescriptor> {
        self.oneofs.iter().find(|o| o.name == name)
    }

    /// Members of a real oneof in declaration order.
    pub fn oneof_members<'a>(
        &'a self,
        oneof: &'a str,
    ) -> impl Iterator<Item = &'a FieldDescriptor> + 'a {
        self.fields
            .iter()
            .filter(move |f| f.real_oneof() == Some(oneof))
    }

    /// The member a oneof instantiates when unset, if declared and resolvable.
    pub fn oneof_default(&self, oneof: &str) -> Option<&FieldDescriptor> {
        let name = self.oneof(oneof)?.default_member.as_deref()?;
        self.fields
            .iter()
            .find(|f| f.name == name && f.real_oneof() == Some(oneof))
    }

    /// Segments after the package: `["Outer", "Inner"]` for `pkg.Outer.Inner`.
    pub fn path_segments(&self) -> Vec<&str> {
        let local = if self.package.is_empty() {
            self.full_name.as_str()
        } else {
            self.full_name
                .strip_prefix(self.package.as_str())
                .and_then(|rest| rest.strip_prefix('.'))
                .unwrap_or(&self.full_name)
        };
        local.split('.').collect()
    }
}

/// One legal enum value.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EnumValue {
    pub name: String,
    pub number: i32,
}

/// An enum type.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EnumDescriptor {
    pub name: String,
    #[serde(skip)]
    pub full_name: String,
    pub values: Vec<EnumValue>,
}

impl EnumDescriptor {
    pub fn contains(&self, number: i32) -> bool {
        self.values.iter().any(|v| v.number == number)
    }

    pub fn value_by_name(&self, name: &str) -> Option<&EnumValue> {
        self.values.iter().find(|v| v.name == name)
    }
}
