//! # Reflection Contract
//!
//! [`ReflectMessage`] is the accessor surface the interpreter drives:
//! `has` / `get` / `set` / `init` / `message_mut`, all keyed by
//! [`FieldDescriptor`]. [`DynamicMessage`] is the schema-driven
//! implementation used by the CLI and the tests.
//!
//! Storage follows the prost layout: wrapper types hold their inner scalar,
//! `Duration` and `Timestamp` hold normalized values, and plain proto3 scalars
//! are absent when zero.

use crate::descriptor::{FieldDescriptor, Kind, MessageDescriptor, WellKnownType};
use crate::plan::FieldShape;
use crate::registry::SchemaRegistry;
use crate::temporal::{self, Duration, Timestamp};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Errors from record access and JSON conversion.
#[derive(Debug, thiserror::Error)]
pub enum ReflectError {
    #[error("message {message} has no field {field}")]
    UnknownField { message: String, field: String },
    #[error("message {message}, field {field}: expected {expected}")]
    TypeMismatch {
        message: String,
        field: String,
        expected: String,
    },
    #[error("type {0} is not registered")]
    UnknownType(String),
    #[error("message {message}, field {field}: {source}")]
    Temporal {
        message: String,
        field: String,
        #[source]
        source: temporal::TemporalError,
    },
}

/// A single field value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    I32(i32),
    I64(i64),
    U32(u32),
    U64(u64),
    F32(f32),
    F64(f64),
    String(String),
    Bytes(Vec<u8>),
    EnumNumber(i32),
    Duration(Duration),
    Timestamp(Timestamp),
    Message(DynamicMessage),
    List(Vec<Value>),
}

impl Value {
    /// Zero value of a scalar kind, `None` for messages.
    pub fn zero_scalar(kind: Kind) -> Option<Value> {
        Some(match kind {
            Kind::Double => Value::F64(0.0),
            Kind::Float => Value::F32(0.0),
            Kind::Int64 | Kind::Sint64 | Kind::Sfixed64 => Value::I64(0),
            Kind::Uint64 | Kind::Fixed64 => Value::U64(0),
            Kind::Int32 | Kind::Sint32 | Kind::Sfixed32 => Value::I32(0),
            Kind::Uint32 | Kind::Fixed32 => Value::U32(0),
            Kind::Bool => Value::Bool(false),
            Kind::String => Value::String(String::new()),
            Kind::Bytes => Value::Bytes(Vec::new()),
            Kind::Enum => Value::EnumNumber(0),
            Kind::Message => return None,
        })
    }

    /// Proto3 zero test. Messages are never zero; NaN is not zero.
    pub fn is_zero(&self) -> bool {
        match self {
            Value::Bool(v) => !v,
            Value::I32(v) | Value::EnumNumber(v) => *v == 0,
            Value::I64(v) => *v == 0,
            Value::U32(v) => *v == 0,
            Value::U64(v) => *v == 0,
            Value::F32(v) => *v == 0.0,
            Value::F64(v) => *v == 0.0,
            Value::String(v) => v.is_empty(),
            Value::Bytes(v) => v.is_empty(),
            Value::Duration(v) => v.is_zero(),
            Value::Timestamp(v) => v.is_zero(),
            Value::Message(_) => false,
            Value::List(v) => v.is_empty(),
        }
    }

    pub fn as_message(&self) -> Option<&DynamicMessage> {
        match self {
            Value::Message(m) => Some(m),
            _ => None,
        }
    }
}

/// Accessor contract over a schema-described record.
pub trait ReflectMessage {
    fn descriptor(&self) -> Arc<MessageDescriptor>;

    /// Explicitly set for fields with presence, non-zero for plain scalars,
    /// non-empty for collections.
    fn has(&self, field: &FieldDescriptor) -> bool;

    fn get(&self, field: &FieldDescriptor) -> Option<&Value>;

    /// Stores `value`, clearing any other member of the same real oneof.
    fn set(&mut self, field: &FieldDescriptor, value: Value) -> Result<(), ReflectError>;

    /// Stores the zero value of the field (an empty instance for messages).
    fn init(&mut self, field: &FieldDescriptor) -> Result<(), ReflectError>;

    /// The nested record behind a message-typed field, if present.
    fn message_mut(&mut self, field: &FieldDescriptor) -> Option<&mut dyn ReflectMessage>;

    /// Number of the member currently set in a real oneof.
    fn which_oneof(&self, oneof: &str) -> Option<u32> {
        let descriptor = self.descriptor();
        let current = descriptor
            .oneof_members(oneof)
            .find(|member| self.has(member))
            .map(|member| member.number);
        current
    }
}

/// Schema-driven record keyed by field number.
#[derive(Clone)]
pub struct DynamicMessage {
    registry: Arc<SchemaRegistry>,
    descriptor: Arc<MessageDescriptor>,
    fields: BTreeMap<u32, Value>,
}

impl DynamicMessage {
    /// Empty record of the named type.
    pub fn new(registry: Arc<SchemaRegistry>, full_name: &str) -> Result<Self, ReflectError> {
        let descriptor = registry
            .message(full_name)
            .cloned()
            .ok_or_else(|| ReflectError::UnknownType(full_name.to_string()))?;
        Ok(Self::with_descriptor(registry, descriptor))
    }

    pub fn with_descriptor(
        registry: Arc<SchemaRegistry>,
        descriptor: Arc<MessageDescriptor>,
    ) -> Self {
        Self {
            registry,
            descriptor,
            fields: BTreeMap::new(),
        }
    }

    pub fn registry(&self) -> &Arc<SchemaRegistry> {
        &self.registry
    }

    /// Number of populated fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    fn lookup(&self, name: &str) -> Result<FieldDescriptor, ReflectError> {
        self.descriptor
            .field(name)
            .cloned()
            .ok_or_else(|| ReflectError::UnknownField {
                message: self.descriptor.full_name.clone(),
                field: name.to_string(),
            })
    }

    pub fn get_by_name(&self, name: &str) -> Option<&Value> {
        let field = self.descriptor.field(name)?;
        self.fields.get(&field.number)
    }

    pub fn set_by_name(&mut self, name: &str, value: Value) -> Result<(), ReflectError> {
        let field = self.lookup(name)?;
        self.set(&field, value)
    }

    pub fn message_by_name(&self, name: &str) -> Option<&DynamicMessage> {
        self.get_by_name(name).and_then(Value::as_message)
    }

    /// Zero value for a field, resolving nested message types.
    pub fn zero_value(&self, field: &FieldDescriptor) -> Result<Value, ReflectError> {
        if field.is_collection() {
            return Ok(Value::List(Vec::new()));
        }
        if let Some(value) = Value::zero_scalar(field.kind) {
            return Ok(value);
        }
        match field.well_known() {
            Some(WellKnownType::Duration) => return Ok(Value::Duration(Duration::default())),
            Some(WellKnownType::Timestamp) => return Ok(Value::Timestamp(Timestamp::default())),
            Some(wkt) => {
                if let Some(value) = wkt.wrapped_kind().and_then(Value::zero_scalar) {
                    return Ok(value);
                }
            }
            None => {}
        }
        let descriptor = self
            .registry
            .field_message(field)
            .cloned()
            .ok_or_else(|| {
                ReflectError::UnknownType(field.type_name().unwrap_or_default().to_string())
            })?;
        Ok(Value::Message(DynamicMessage::with_descriptor(
            Arc::clone(&self.registry),
            descriptor,
        )))
    }

    fn accepts(&self, field: &FieldDescriptor, value: &Value) -> Result<(), ReflectError> {
        let zero = self.zero_value(field)?;
        let same = match (&zero, value) {
            (Value::Message(expected), Value::Message(actual)) => {
                expected.descriptor.full_name == actual.descriptor.full_name
            }
            _ => std::mem::discriminant(&zero) == std::mem::discriminant(value),
        };
        if same {
            Ok(())
        } else {
            Err(ReflectError::TypeMismatch {
                message: self.descriptor.full_name.clone(),
                field: field.name.clone(),
                expected: FieldShape::of(field).to_string(),
            })
        }
    }

    // -----------------------------------------------------------------------
    // JSON
    // -----------------------------------------------------------------------

    /// Builds a record from a JSON object keyed by field name.
    ///
    /// Durations accept a literal (`"1h30m"`) or `{seconds, nanos}`; timestamps
    /// accept any supported timestamp literal; enums accept a number or a
    /// value name; bytes accept text or an array of octets.
    pub fn from_json(
        registry: Arc<SchemaRegistry>,
        full_name: &str,
        json: &serde_json::Value,
    ) -> Result<Self, ReflectError> {
        let mut message = Self::new(registry, full_name)?;
        message.merge_json(json)?;
        Ok(message)
    }

    fn merge_json(&mut self, json: &serde_json::Value) -> Result<(), ReflectError> {
        let object = json.as_object().ok_or_else(|| ReflectError::TypeMismatch {
            message: self.descriptor.full_name.clone(),
            field: String::new(),
            expected: "a JSON object".to_string(),
        })?;
        for (name, raw) in object {
            let field = self.lookup(name)?;
            if raw.is_null() {
                continue;
            }
            let value = if field.is_collection() {
                let items = raw.as_array().ok_or_else(|| self.mismatch(&field))?;
                let items = items
                    .iter()
                    .map(|item| self.json_singular(&field, item))
                    .collect::<Result<Vec<_>, _>>()?;
                Value::List(items)
            } else {
                self.json_singular(&field, raw)?
            };
            self.set(&field, value)?;
        }
        Ok(())
    }

    fn mismatch(&self, field: &FieldDescriptor) -> ReflectError {
        ReflectError::TypeMismatch {
            message: self.descriptor.full_name.clone(),
            field: field.name.clone(),
            expected: FieldShape::of(field).to_string(),
        }
    }

    fn json_singular(
        &self,
        field: &FieldDescriptor,
        raw: &serde_json::Value,
    ) -> Result<Value, ReflectError> {
        let kind = match field.well_known() {
            Some(WellKnownType::Duration) => return self.json_duration(field, raw),
            Some(WellKnownType::Timestamp) => {
                let literal = raw.as_str().ok_or_else(|| self.mismatch(field))?;
                return temporal::parse_timestamp(literal)
                    .map(Value::Timestamp)
                    .map_err(|source| self.temporal_error(field, source));
            }
            Some(wkt) => wkt.wrapped_kind(),
            None => Some(field.kind),
        };
        let value = match kind {
            Some(Kind::Message) | None => {
                let Value::Message(mut nested) = self.zero_value(&FieldDescriptor {
                    repeated: false,
                    map: false,
                    ..field.clone()
                })?
                else {
                    return Err(self.mismatch(field));
                };
                nested.merge_json(raw)?;
                Some(Value::Message(nested))
            }
            Some(Kind::Bool) => raw.as_bool().map(Value::Bool),
            Some(Kind::Int32 | Kind::Sint32 | Kind::Sfixed32) => raw
                .as_i64()
                .and_then(|v| i32::try_from(v).ok())
                .map(Value::I32),
            Some(Kind::Int64 | Kind::Sint64 | Kind::Sfixed64) => raw.as_i64().map(Value::I64),
            Some(Kind::Uint32 | Kind::Fixed32) => raw
                .as_u64()
                .and_then(|v| u32::try_from(v).ok())
                .map(Value::U32),
            Some(Kind::Uint64 | Kind::Fixed64) => raw.as_u64().map(Value::U64),
            Some(Kind::Float) => raw.as_f64().map(|v| Value::F32(v as f32)),
            Some(Kind::Double) => raw.as_f64().map(Value::F64),
            Some(Kind::String) => raw.as_str().map(|s| Value::String(s.to_string())),
            Some(Kind::Bytes) => json_bytes(raw).map(Value::Bytes),
            Some(Kind::Enum) => self.json_enum(field, raw),
        };
        value.ok_or_else(|| self.mismatch(field))
    }

    fn json_duration(
        &self,
        field: &FieldDescriptor,
        raw: &serde_json::Value,
    ) -> Result<Value, ReflectError> {
        if let Some(literal) = raw.as_str() {
            return temporal::parse_duration(literal)
                .map(Value::Duration)
                .map_err(|source| self.temporal_error(field, source));
        }
        if !raw.is_object() {
            return Err(self.mismatch(field));
        }
        let seconds = raw.get("seconds").and_then(serde_json::Value::as_i64).unwrap_or(0);
        let nanos = raw
            .get("nanos")
            .and_then(serde_json::Value::as_i64)
            .and_then(|n| i32::try_from(n).ok())
            .unwrap_or(0);
        Ok(Value::Duration(Duration { seconds, nanos }))
    }

    fn json_enum(&self, field: &FieldDescriptor, raw: &serde_json::Value) -> Option<Value> {
        if let Some(number) = raw.as_i64() {
            return i32::try_from(number).ok().map(Value::EnumNumber);
        }
        let name = raw.as_str()?;
        let enumeration = self.registry.field_enum(field)?;
        enumeration
            .value_by_name(name)
            .map(|v| Value::EnumNumber(v.number))
    }

    fn temporal_error(
        &self,
        field: &FieldDescriptor,
        source: temporal::TemporalError,
    ) -> ReflectError {
        ReflectError::Temporal {
            message: self.descriptor.full_name.clone(),
            field: field.name.clone(),
            source,
        }
    }

    /// JSON object of the populated fields, keyed by field name.
    pub fn to_json(&self) -> serde_json::Value {
        let mut object = serde_json::Map::new();
        for field in &self.descriptor.fields {
            if let Some(value) = self.fields.get(&field.number) {
                object.insert(field.name.clone(), value_to_json(value));
            }
        }
        serde_json::Value::Object(object)
    }
}

fn json_bytes(raw: &serde_json::Value) -> Option<Vec<u8>> {
    if let Some(text) = raw.as_str() {
        return Some(text.as_bytes().to_vec());
    }
    raw.as_array()?
        .iter()
        .map(|b| b.as_u64().and_then(|b| u8::try_from(b).ok()))
        .collect()
}

fn value_to_json(value: &Value) -> serde_json::Value {
    use serde_json::Value as Json;
    match value {
        Value::Bool(v) => Json::Bool(*v),
        Value::I32(v) | Value::EnumNumber(v) => Json::from(*v),
        Value::I64(v) => Json::from(*v),
        Value::U32(v) => Json::from(*v),
        Value::U64(v) => Json::from(*v),
        Value::F32(v) => Json::from(f64::from(*v)),
        Value::F64(v) => Json::from(*v),
        Value::String(v) => Json::String(v.clone()),
        Value::Bytes(v) => Json::from(v.clone()),
        Value::Duration(d) => serde_json::json!({ "seconds": d.seconds, "nanos": d.nanos }),
        Value::Timestamp(t) => match t.to_rfc3339() {
            Some(text) => Json::String(text),
            None => serde_json::json!({ "seconds": t.seconds, "nanos": t.nanos }),
        },
        Value::Message(m) => m.to_json(),
        Value::List(items) => Json::Array(items.iter().map(value_to_json).collect()),
    }
}

impl ReflectMessage for DynamicMessage {
    fn descriptor(&self) -> Arc<MessageDescriptor> {
        Arc::clone(&self.descriptor)
    }

    fn has(&self, field: &FieldDescriptor) -> bool {
        match self.fields.get(&field.number) {
            None => false,
            Some(Value::List(items)) => !items.is_empty(),
            Some(value) => field.has_presence() || !value.is_zero(),
        }
    }

    fn get(&self, field: &FieldDescriptor) -> Option<&Value> {
        self.fields.get(&field.number)
    }

    fn set(&mut self, field: &FieldDescriptor, value: Value) -> Result<(), ReflectError> {
        if self.descriptor.field_by_number(field.number).is_none() {
            return Err(ReflectError::UnknownField {
                message: self.descriptor.full_name.clone(),
                field: field.name.clone(),
            });
        }
        self.accepts(field, &value)?;

        if let Some(oneof) = field.real_oneof() {
            let siblings: Vec<u32> = self
                .descriptor
                .oneof_members(oneof)
                .map(|member| member.number)
                .filter(|number| *number != field.number)
                .collect();
            for number in siblings {
                self.fields.remove(&number);
            }
        }

        if !field.has_presence() && value.is_zero() {
            self.fields.remove(&field.number);
        } else {
            self.fields.insert(field.number, value);
        }
        Ok(())
    }

    fn init(&mut self, field: &FieldDescriptor) -> Result<(), ReflectError> {
        let zero = self.zero_value(field)?;
        self.set(field, zero)
    }

    fn message_mut(&mut self, field: &FieldDescriptor) -> Option<&mut dyn ReflectMessage> {
        match self.fields.get_mut(&field.number) {
            Some(Value::Message(nested)) => Some(nested),
            _ => None,
        }
    }
}

impl PartialEq for DynamicMessage {
    fn eq(&self, other: &Self) -> bool {
        self.descriptor.full_name == other.descriptor.full_name && self.fields == other.fields
    }
}

impl fmt::Debug for DynamicMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for field in &self.descriptor.fields {
            if let Some(value) = self.fields.get(&field.number) {
                map.entry(&field.name, value);
            }
        }
        map.finish()
    }
}
