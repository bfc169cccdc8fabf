//! # Schema Registry
//!
//! Owns every message and enum descriptor loaded from schema documents,
//! indexed by fully-qualified name. The well-known protobuf types are always
//! registered so that field type references to them resolve.

use crate::descriptor::{EnumDescriptor, FieldDescriptor, Kind, MessageDescriptor, WellKnownType};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

/// Errors from schema loading.
#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Deserialization error: {0}")]
    DeserializeError(#[from] serde_json::Error),
    #[error("type {0} is declared more than once")]
    DuplicateType(String),
    #[error("message {message}, field {field}: oneof {oneof} is not declared")]
    UnknownOneof {
        message: String,
        field: String,
        oneof: String,
    },
}

/// One schema document: `{ "package": ..., "messages": [...], "enums": [...] }`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SchemaFile {
    #[serde(default)]
    pub package: String,
    #[serde(default)]
    pub messages: Vec<MessageDescriptor>,
    #[serde(default)]
    pub enums: Vec<EnumDescriptor>,
}

/// Fully-qualified type index. Names are stored without a leading `.`.
#[derive(Debug, Clone)]
pub struct SchemaRegistry {
    messages: BTreeMap<String, Arc<MessageDescriptor>>,
    enums: BTreeMap<String, Arc<EnumDescriptor>>,
}

impl SchemaRegistry {
    /// Creates a registry holding only the well-known types.
    pub fn new() -> Self {
        let mut registry = Self {
            messages: BTreeMap::new(),
            enums: BTreeMap::new(),
        };
        for wkt in WellKnownType::ALL {
            let descriptor = well_known_descriptor(wkt);
            registry
                .messages
                .insert(descriptor.full_name.clone(), Arc::new(descriptor));
        }
        registry
    }

    /// Parses a JSON schema document into a fresh registry.
    pub fn from_json_str(json: &str) -> Result<Self, SchemaError> {
        let mut registry = Self::new();
        registry.add_json_str(json)?;
        Ok(registry)
    }

    pub fn add_json_str(&mut self, json: &str) -> Result<(), SchemaError> {
        let file: SchemaFile = serde_json::from_str(json)?;
        self.add_file(file)
    }

    /// Reads one schema document from disk.
    pub fn load(&mut self, path: &Path) -> Result<(), SchemaError> {
        let json = std::fs::read_to_string(path)?;
        self.add_json_str(&json)?;
        tracing::debug!(path = %path.display(), "loaded schema document");
        Ok(())
    }

    /// Builds a registry from several schema documents.
    pub fn load_all<P: AsRef<Path>>(paths: &[P]) -> Result<Self, SchemaError> {
        let mut registry = Self::new();
        for path in paths {
            registry.load(path.as_ref())?;
        }
        Ok(registry)
    }

    /// Registers a document, flattening nested messages and enums.
    pub fn add_file(&mut self, file: SchemaFile) -> Result<(), SchemaError> {
        let package = file.package;
        let scope = package.clone();
        for message in file.messages {
            self.add_message(&package, &scope, message)?;
        }
        for enumeration in file.enums {
            self.add_enum(&scope, enumeration)?;
        }
        Ok(())
    }

    fn add_message(
        &mut self,
        package: &str,
        scope: &str,
        mut message: MessageDescriptor,
    ) -> Result<(), SchemaError> {
        message.full_name = qualify(scope, &message.name);
        message.package = package.to_string();

        for field in &message.fields {
            if let Some(oneof) = field.real_oneof() {
                if message.oneof(oneof).is_none() {
                    return Err(SchemaError::UnknownOneof {
                        message: message.full_name.clone(),
                        field: field.name.clone(),
                        oneof: oneof.to_string(),
                    });
                }
            }
        }

        let nested = std::mem::take(&mut message.messages);
        let nested_enums = std::mem::take(&mut message.enums);
        let full_name = message.full_name.clone();

        if self.messages.contains_key(&full_name) || self.enums.contains_key(&full_name) {
            return Err(SchemaError::DuplicateType(full_name));
        }
        self.messages.insert(full_name.clone(), Arc::new(message));

        for child in nested {
            self.add_message(package, &full_name, child)?;
        }
        for child in nested_enums {
            self.add_enum(&full_name, child)?;
        }
        Ok(())
    }

    fn add_enum(
        &mut self,
        scope: &str,
        mut enumeration: EnumDescriptor,
    ) -> Result<(), SchemaError> {
        enumeration.full_name = qualify(scope, &enumeration.name);
        let full_name = enumeration.full_name.clone();
        if self.messages.contains_key(&full_name) || self.enums.contains_key(&full_name) {
            return Err(SchemaError::DuplicateType(full_name));
        }
        self.enums.insert(full_name, Arc::new(enumeration));
        Ok(())
    }

    /// Looks up a message by full name, with or without the leading `.`.
    pub fn message(&self, name: &str) -> Option<&Arc<MessageDescriptor>> {
        self.messages.get(name.strip_prefix('.').unwrap_or(name))
    }

    pub fn enumeration(&self, name: &str) -> Option<&Arc<EnumDescriptor>> {
        self.enums.get(name.strip_prefix('.').unwrap_or(name))
    }

    /// Message type referenced by a message-kind field.
    pub fn field_message(&self, field: &FieldDescriptor) -> Option<&Arc<MessageDescriptor>> {
        if field.kind != Kind::Message {
            return None;
        }
        field.type_name().and_then(|name| self.message(name))
    }

    /// Enum type referenced by an enum-kind field.
    pub fn field_enum(&self, field: &FieldDescriptor) -> Option<&Arc<EnumDescriptor>> {
        if field.kind != Kind::Enum {
            return None;
        }
        field.type_name().and_then(|name| self.enumeration(name))
    }

    /// Messages loaded from documents, in full-name order. Well-known types excluded.
    pub fn user_messages(&self) -> impl Iterator<Item = &Arc<MessageDescriptor>> {
        self.messages
            .values()
            .filter(|m| WellKnownType::from_full_name(&m.full_name).is_none())
    }

    /// Distinct packages of the loaded messages, sorted.
    pub fn packages(&self) -> Vec<&str> {
        let mut packages: Vec<&str> = self.user_messages().map(|m| m.package.as_str()).collect();
        packages.sort_unstable();
        packages.dedup();
        packages
    }
}

impl Default for SchemaRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn qualify(scope: &str, name: &str) -> String {
    if scope.is_empty() {
        name.to_string()
    } else {
        format!("{scope}.{name}")
    }
}

fn scalar_field(name: &str, number: u32, kind: Kind) -> FieldDescriptor {
    FieldDescriptor {
        name: name.to_string(),
        number,
        kind,
        repeated: false,
        map: false,
        proto3_optional: false,
        oneof: None,
        type_name: None,
        rule: None,
    }
}

fn well_known_descriptor(wkt: WellKnownType) -> MessageDescriptor {
    let full_name = wkt.full_name().to_string();
    let name = full_name.rsplit('.').next().unwrap_or_default().to_string();
    let fields = match wkt {
        WellKnownType::Any => vec![
            scalar_field("type_url", 1, Kind::String),
            scalar_field("value", 2, Kind::Bytes),
        ],
        WellKnownType::Duration | WellKnownType::Timestamp => vec![
            scalar_field("seconds", 1, Kind::Int64),
            scalar_field("nanos", 2, Kind::Int32),
        ],
        wrapper => wrapper
            .wrapped_kind()
            .map(|kind| vec![scalar_field("value", 1, kind)])
            .unwrap_or_default(),
    };
    MessageDescriptor {
        name,
        full_name,
        package: "google.protobuf".to_string(),
        fields,
        oneofs: Vec::new(),
        disabled: false,
        ignored: false,
        messages: Vec::new(),
        enums: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SCHEMA: &str = r#"{
        "package": "tests",
        "messages": [
            {
                "name": "Outer",
                "fields": [
                    {"name": "inner", "number": 1, "kind": "message", "type": ".tests.Outer.Inner"},
                    {"name": "color", "number": 2, "kind": "enum", "type": "tests.Color"}
                ],
                "messages": [
                    {"name": "Inner", "fields": [{"name": "n", "number": 1, "kind": "int32"}]}
                ]
            }
        ],
        "enums": [
            {"name": "Color", "values": [{"name": "RED", "number": 0}, {"name": "BLUE", "number": 1}]}
        ]
    }"#;

    #[test]
    fn test_well_known_types_always_present() {
        let registry = SchemaRegistry::new();
        assert!(registry.message(".google.protobuf.Timestamp").is_some());
        assert!(registry.message("google.protobuf.BytesValue").is_some());
        assert_eq!(registry.user_messages().count(), 0);
    }

    #[test]
    fn test_nested_types_flattened() {
        let registry = SchemaRegistry::from_json_str(SCHEMA).unwrap();
        let inner = registry.message("tests.Outer.Inner").unwrap();
        assert_eq!(inner.package, "tests");
        assert_eq!(inner.path_segments(), ["Outer", "Inner"]);

        let outer = registry.message(".tests.Outer").unwrap();
        assert!(outer.messages.is_empty());
        let field = outer.field("inner").unwrap();
        assert_eq!(registry.field_message(field).unwrap().full_name, "tests.Outer.Inner");

        let color = registry.field_enum(outer.field("color").unwrap()).unwrap();
        assert!(color.contains(1));
        assert!(!color.contains(2));
        assert_eq!(registry.packages(), ["tests"]);
    }

    #[test]
    fn test_duplicate_type_rejected() {
        let mut registry = SchemaRegistry::from_json_str(SCHEMA).unwrap();
        let err = registry.add_json_str(SCHEMA).unwrap_err();
        assert!(matches!(err, SchemaError::DuplicateType(name) if name == "tests.Outer"));
    }

    #[test]
    fn test_undeclared_oneof_rejected() {
        let err = SchemaRegistry::from_json_str(
            r#"{"package": "p", "messages": [
                {"name": "M", "fields": [{"name": "a", "number": 1, "kind": "int32", "oneof": "o"}]}
            ]}"#,
        )
        .unwrap_err();
        assert!(matches!(err, SchemaError::UnknownOneof { .. }));
    }

    #[test]
    fn test_load_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tests.json");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(SCHEMA.as_bytes()).unwrap();

        let registry = SchemaRegistry::load_all(&[&path]).unwrap();
        assert!(registry.message("tests.Outer").is_some());

        let missing = SchemaRegistry::load_all(&[dir.path().join("missing.json")]);
        assert!(matches!(missing, Err(SchemaError::IoError(_))));
    }
}
