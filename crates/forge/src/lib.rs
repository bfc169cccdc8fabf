//! # The Forge: Defaults Code Generator
//!
//! Emits, per message type, an `apply_defaults(&mut self)` method over the
//! prost-generated struct that performs exactly the mutations the runtime
//! interpreter performs on the same record. The generated code needs no
//! schema at run time.
//!
//! ## Pipeline
//! 1. **Check**: the registry must pass [`checker::check_registry`]; any
//!    violation aborts generation.
//! 2. **Plan**: each message is planned with [`common::plan::plan_message`],
//!    the same table the interpreter executes.
//! 3. **Emit**: every plan step goes through its [`emit`] function.
//! 4. **Render**: procedures are grouped per package into one file, with a
//!    BLAKE3 digest of the content.
//!
//! ## Suppression
//! - `disabled` messages get an empty method, so callers may still recurse.
//! - `ignored` messages get no method; callers emit a comment instead.

pub mod config;
pub mod emit;
pub mod naming;

pub use config::GeneratorConfig;

use checker::CheckErrors;
use common::plan::{plan_message, FieldAction, RuleError, Step};
use common::{MessageDescriptor, SchemaRegistry};
use emit::CodeWriter;

/// Errors from code generation.
#[derive(Debug, thiserror::Error)]
pub enum ForgeError {
    #[error("schema rejected: {0}")]
    Check(#[from] CheckErrors),
    #[error("unknown message {0}")]
    UnknownMessage(String),
    #[error("message {message}, field {field}: {source}")]
    Rule {
        message: String,
        field: String,
        source: RuleError,
    },
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("invalid generator config: {0}")]
    Config(#[from] toml::de::Error),
}

/// The generated method for one message type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Procedure {
    /// Fully-qualified schema name.
    pub message: String,
    /// Struct path relative to the package module.
    pub type_path: String,
    pub method: String,
    /// Body statements, indented relative to the method body.
    pub body: Vec<String>,
}

impl Procedure {
    pub fn render(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("impl {} {{\n", self.type_path));
        out.push_str(&format!(
            "    /// Fills unset fields from the `{}` defaults rules.\n",
            self.message
        ));
        out.push_str(
            "    #[allow(clippy::float_cmp, clippy::single_match, clippy::collapsible_match)]\n",
        );
        if self.body.is_empty() {
            out.push_str(&format!("    pub fn {}(&mut self) {{}}\n", self.method));
        } else {
            out.push_str(&format!("    pub fn {}(&mut self) {{\n", self.method));
            for line in &self.body {
                out.push_str("        ");
                out.push_str(line);
                out.push('\n');
            }
            out.push_str("    }\n");
        }
        out.push_str("}\n");
        out
    }
}

/// Builds the procedure for `message`.
///
/// Returns `Ok(None)` for `ignored` messages. Does not run the checker; use
/// [`generate_files`] for checked output.
pub fn generate_procedure(
    registry: &SchemaRegistry,
    message: &MessageDescriptor,
    config: &GeneratorConfig,
) -> Result<Option<Procedure>, ForgeError> {
    if message.is_ignored() {
        return Ok(None);
    }

    let mut w = CodeWriter::new();
    if !message.is_disabled() {
        let plan = plan_message(message);
        for step in &plan.steps {
            match step {
                Step::Field { field, action } => {
                    let action = action
                        .as_ref()
                        .map_err(|err| rule_error(message, &field.name, err))?;
                    match action {
                        FieldAction::Assign(literal) => {
                            emit::emit_assign(&mut w, field, literal, config)
                        }
                        FieldAction::AssignNow => emit::emit_assign_now(&mut w, field, config),
                        FieldAction::Message { initialize, recurse } => {
                            let target = registry.field_message(field).map(|m| &**m);
                            emit::emit_message(
                                &mut w,
                                field,
                                target,
                                *initialize,
                                *recurse,
                                config,
                            );
                        }
                    }
                }
                Step::Oneof(oneof) => {
                    let actions = oneof
                        .members
                        .iter()
                        .map(|member| {
                            member
                                .action
                                .as_ref()
                                .map(|action| (member.field, action))
                                .map_err(|err| rule_error(message, &member.field.name, err))
                        })
                        .collect::<Result<Vec<_>, _>>()?;
                    emit::emit_oneof(&mut w, registry, message, oneof, &actions, config);
                }
            }
        }
    }

    Ok(Some(Procedure {
        message: message.full_name.clone(),
        type_path: naming::message_path(message),
        method: config.method_name.clone(),
        body: w.into_lines(),
    }))
}

fn rule_error(message: &MessageDescriptor, field: &str, err: &RuleError) -> ForgeError {
    ForgeError::Rule {
        message: message.full_name.clone(),
        field: field.to_string(),
        source: err.clone(),
    }
}

/// Procedure for a message looked up by full name.
pub fn generate_procedure_for(
    registry: &SchemaRegistry,
    full_name: &str,
    config: &GeneratorConfig,
) -> Result<Option<Procedure>, ForgeError> {
    let message = registry
        .message(full_name)
        .ok_or_else(|| ForgeError::UnknownMessage(full_name.to_string()))?;
    generate_procedure(registry, message, config)
}

/// One rendered output file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedFile {
    pub package: String,
    /// `{package}.defaults.rs`, `_.defaults.rs` for the empty package.
    pub name: String,
    pub content: String,
    /// Hex BLAKE3 digest of `content`.
    pub digest: String,
}

impl GeneratedFile {
    /// Whether `existing` already holds exactly this content.
    pub fn matches(&self, existing: &[u8]) -> bool {
        blake3::hash(existing).to_hex().as_str() == self.digest
    }
}

/// Renders the procedures of every message in `package`.
///
/// Runs the checker on the whole registry first.
pub fn generate_file(
    registry: &SchemaRegistry,
    package: &str,
    config: &GeneratorConfig,
) -> Result<GeneratedFile, ForgeError> {
    checker::check_registry(registry)?;
    render_package(registry, package, config)
}

/// Renders one file per package, checker first.
pub fn generate_files(
    registry: &SchemaRegistry,
    config: &GeneratorConfig,
) -> Result<Vec<GeneratedFile>, ForgeError> {
    checker::check_registry(registry)?;
    let files = registry
        .packages()
        .into_iter()
        .map(|package| render_package(registry, package, config))
        .collect::<Result<Vec<_>, _>>()?;
    tracing::info!(files = files.len(), "generated defaults");
    Ok(files)
}

fn render_package(
    registry: &SchemaRegistry,
    package: &str,
    config: &GeneratorConfig,
) -> Result<GeneratedFile, ForgeError> {
    let mut content = String::new();
    if !config.header.is_empty() {
        content.push_str(&config.header);
        content.push('\n');
    }

    let mut count = 0usize;
    for message in registry.user_messages().filter(|m| m.package == package) {
        match generate_procedure(registry, message, config)? {
            Some(procedure) => {
                content.push('\n');
                content.push_str(&procedure.render());
                count += 1;
            }
            None => {
                content.push_str(&format!("\n// {} ignores defaults\n", message.full_name));
            }
        }
    }
    tracing::debug!(package, procedures = count, "rendered package");

    let name = if package.is_empty() {
        "_.defaults.rs".to_string()
    } else {
        format!("{package}.defaults.rs")
    };
    let digest = blake3::hash(content.as_bytes()).to_hex().to_string();
    Ok(GeneratedFile {
        package: package.to_string(),
        name,
        content,
        digest,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCHEMA: &str = r#"{
        "package": "tests",
        "messages": [
            {
                "name": "Test",
                "fields": [
                    {"name": "string_field", "number": 1, "kind": "string", "default": {"string": "string_field"}},
                    {"name": "duration_field", "number": 2, "kind": "message", "type": "google.protobuf.Duration", "default": {"duration": "1h"}},
                    {"name": "nested", "number": 3, "kind": "message", "type": "tests.Test.Nested", "default": {"message": {"initialize": true}}},
                    {"name": "quiet", "number": 4, "kind": "message", "type": "tests.Quiet", "default": {"message": {"initialize": true}}},
                    {"name": "one", "number": 5, "kind": "string", "oneof": "choice"},
                    {"name": "two", "number": 6, "kind": "uint32", "oneof": "choice", "default": {"uint32": 5}}
                ],
                "oneofs": [{"name": "choice", "default": "two"}],
                "messages": [
                    {"name": "Nested", "fields": [{"name": "flag", "number": 1, "kind": "bool", "default": {"bool": true}}]}
                ]
            },
            {"name": "Quiet", "ignored": true},
            {"name": "Off", "disabled": true, "fields": [{"name": "n", "number": 1, "kind": "int32", "default": {"int32": 1}}]}
        ]
    }"#;

    fn registry() -> SchemaRegistry {
        SchemaRegistry::from_json_str(SCHEMA).unwrap()
    }

    #[test]
    fn test_procedure_statements_in_field_order() {
        let registry = registry();
        let procedure = generate_procedure_for(&registry, "tests.Test", &GeneratorConfig::default())
            .unwrap()
            .unwrap();
        assert_eq!(procedure.type_path, "Test");
        assert_eq!(
            procedure.body,
            [
                "if self.string_field.is_empty() {",
                "    self.string_field = ::std::string::String::from(\"string_field\");",
                "}",
                "if self.duration_field.is_none() {",
                "    self.duration_field = ::core::option::Option::Some(::prost_types::Duration { seconds: 3600i64, nanos: 0i32 });",
                "}",
                "if self.nested.is_none() {",
                "    self.nested = ::core::option::Option::Some(::core::default::Default::default());",
                "}",
                "if let ::core::option::Option::Some(v) = self.nested.as_mut() {",
                "    v.apply_defaults();",
                "}",
                "if self.quiet.is_none() {",
                "    self.quiet = ::core::option::Option::Some(::core::default::Default::default());",
                "}",
                "// tests.Quiet ignores defaults",
                "if self.choice.is_none() {",
                "    self.choice = ::core::option::Option::Some(test::Choice::Two(::core::default::Default::default()));",
                "}",
                "match &mut self.choice {",
                "    ::core::option::Option::Some(test::Choice::Two(v)) => {",
                "        if *v == 0 {",
                "            *v = 5u32;",
                "        }",
                "    }",
                "    _ => {}",
                "}",
            ]
        );
    }

    #[test]
    fn test_suppressed_messages() {
        let registry = registry();
        let config = GeneratorConfig::default();
        assert_eq!(generate_procedure_for(&registry, "tests.Quiet", &config).unwrap(), None);

        let off = generate_procedure_for(&registry, "tests.Off", &config).unwrap().unwrap();
        assert!(off.body.is_empty());
        assert!(off.render().contains("pub fn apply_defaults(&mut self) {}"));
    }

    #[test]
    fn test_unknown_message() {
        let err = generate_procedure_for(&registry(), "tests.Missing", &GeneratorConfig::default())
            .unwrap_err();
        assert!(matches!(err, ForgeError::UnknownMessage(_)));
    }

    #[test]
    fn test_nested_type_path_and_method_name() {
        let registry = registry();
        let config = GeneratorConfig {
            method_name: "fill".to_string(),
            ..GeneratorConfig::default()
        };
        let procedure = generate_procedure_for(&registry, "tests.Test.Nested", &config)
            .unwrap()
            .unwrap();
        let text = procedure.render();
        assert!(text.starts_with("impl test::Nested {\n"));
        assert!(text.contains("pub fn fill(&mut self) {\n"));
        assert!(text.contains("        if !self.flag {\n"));
    }

    #[test]
    fn test_files_are_deterministic_with_digest() {
        let registry = registry();
        let config = GeneratorConfig::default();
        let first = generate_files(&registry, &config).unwrap();
        let second = generate_files(&registry, &config).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.len(), 1);

        let file = &first[0];
        assert_eq!(file.name, "tests.defaults.rs");
        assert!(file.content.starts_with("// @generated"));
        assert!(file.content.contains("// tests.Quiet ignores defaults"));
        assert!(file.matches(file.content.as_bytes()));
        assert!(!file.matches(b"stale"));
    }

    #[test]
    fn test_checker_runs_first() {
        let registry = SchemaRegistry::from_json_str(
            r#"{"package": "p", "messages": [
                {"name": "M", "fields": [{"name": "n", "number": 1, "kind": "int32", "default": {"string": "x"}}]}
            ]}"#,
        )
        .unwrap();
        let err = generate_file(&registry, "p", &GeneratorConfig::default()).unwrap_err();
        assert!(matches!(err, ForgeError::Check(_)));

        let err =
            generate_procedure_for(&registry, "p.M", &GeneratorConfig::default()).unwrap_err();
        assert!(matches!(err, ForgeError::Rule { .. }));
    }
}
