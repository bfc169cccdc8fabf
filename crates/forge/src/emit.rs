//! # Emission Table
//!
//! One function per rule variant, each writing the statements for a single
//! field or oneof group into a [`CodeWriter`]. The statements mirror the
//! interpreter step for step:
//!
//! | shape                        | unset test            | store                 |
//! |------------------------------|-----------------------|-----------------------|
//! | plain scalar / enum          | zero value            | literal               |
//! | `optional`, wrapper, temporal| `is_none()`           | `Some(literal)`       |
//! | message                      | `is_none()`           | `Some(Default)` + call|
//! | current oneof member         | zero value            | literal / call        |

use crate::config::GeneratorConfig;
use crate::naming;
use common::plan::{FieldAction, Literal, OneofStep};
use common::{FieldDescriptor, MessageDescriptor, SchemaRegistry};
use std::fmt::Write;

// ---------------------------------------------------------------------------
// Writer
// ---------------------------------------------------------------------------

/// Indentation-aware line buffer.
#[derive(Debug, Default)]
pub struct CodeWriter {
    lines: Vec<String>,
    depth: usize,
}

impl CodeWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn line(&mut self, text: &str) {
        self.lines.push(format!("{}{}", "    ".repeat(self.depth), text));
    }

    /// Writes `head {` and indents.
    pub fn open(&mut self, head: &str) {
        self.line(&format!("{head} {{"));
        self.depth += 1;
    }

    /// Dedents and writes `}`.
    pub fn close(&mut self) {
        self.depth = self.depth.saturating_sub(1);
        self.line("}");
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn into_lines(self) -> Vec<String> {
        self.lines
    }
}

// ---------------------------------------------------------------------------
// Literals
// ---------------------------------------------------------------------------

/// Rust expression for a resolved literal.
pub fn literal_expr(literal: &Literal, config: &GeneratorConfig) -> String {
    let wkt = &config.well_known_path;
    match literal {
        Literal::Bool(v) => v.to_string(),
        Literal::I32(v) | Literal::Enum(v) => format!("{v}i32"),
        Literal::I64(v) => format!("{v}i64"),
        Literal::U32(v) => format!("{v}u32"),
        Literal::U64(v) => format!("{v}u64"),
        Literal::F32(v) => float_expr(f64::from(*v), v.is_nan(), "f32", format!("{v:?}")),
        Literal::F64(v) => float_expr(*v, v.is_nan(), "f64", format!("{v:?}")),
        Literal::String(v) => format!("::std::string::String::from({v:?})"),
        Literal::Bytes(v) => format!("b\"{}\".to_vec()", escape_bytes(v)),
        Literal::Duration(d) => format!(
            "{wkt}::Duration {{ seconds: {}i64, nanos: {}i32 }}",
            d.seconds, d.nanos
        ),
        Literal::Timestamp(t) => format!(
            "{wkt}::Timestamp {{ seconds: {}i64, nanos: {}i32 }}",
            t.seconds, t.nanos
        ),
    }
}

fn float_expr(value: f64, nan: bool, ty: &str, debug: String) -> String {
    if nan {
        format!("{ty}::NAN")
    } else if value == f64::INFINITY {
        format!("{ty}::INFINITY")
    } else if value == f64::NEG_INFINITY {
        format!("{ty}::NEG_INFINITY")
    } else {
        format!("{debug}{ty}")
    }
}

fn escape_bytes(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len());
    for &b in bytes {
        match b {
            b'"' => out.push_str("\\\""),
            b'\\' => out.push_str("\\\\"),
            0x20..=0x7e => out.push(char::from(b)),
            _ => {
                let _ = write!(out, "\\x{b:02x}");
            }
        }
    }
    out
}

/// Expression that is true when `place` holds the zero value of the literal's type.
fn zero_test(literal: &Literal, value: &str, recv: &str) -> String {
    match literal {
        Literal::Bool(_) => format!("!{value}"),
        Literal::I32(_)
        | Literal::I64(_)
        | Literal::U32(_)
        | Literal::U64(_)
        | Literal::Enum(_) => format!("{value} == 0"),
        Literal::F32(_) | Literal::F64(_) => format!("{value} == 0.0"),
        Literal::String(_) | Literal::Bytes(_) => format!("{recv}.is_empty()"),
        Literal::Duration(_) | Literal::Timestamp(_) => {
            format!("{recv}.seconds == 0 && {recv}.nanos == 0")
        }
    }
}

fn now_expr(config: &GeneratorConfig) -> String {
    format!(
        "{}::Timestamp::from(::std::time::SystemTime::now())",
        config.well_known_path
    )
}

// ---------------------------------------------------------------------------
// Per-variant emitters
// ---------------------------------------------------------------------------

/// Plain proto3 scalar or enum: assign when the field holds its zero value.
pub fn emit_scalar(
    w: &mut CodeWriter,
    field: &FieldDescriptor,
    literal: &Literal,
    config: &GeneratorConfig,
) {
    let place = format!("self.{}", naming::field_ident(&field.name));
    w.open(&format!("if {}", zero_test(literal, &place, &place)));
    w.line(&format!("{place} = {};", literal_expr(literal, config)));
    w.close();
}

/// Field with explicit presence: `optional` scalars, wrappers, durations, timestamps.
pub fn emit_optional(w: &mut CodeWriter, field: &FieldDescriptor, value: &str) {
    let place = format!("self.{}", naming::field_ident(&field.name));
    w.open(&format!("if {place}.is_none()"));
    w.line(&format!("{place} = ::core::option::Option::Some({value});"));
    w.close();
}

/// Value rule on a field, dispatched on presence.
pub fn emit_assign(
    w: &mut CodeWriter,
    field: &FieldDescriptor,
    literal: &Literal,
    config: &GeneratorConfig,
) {
    if field.has_presence() {
        emit_optional(w, field, &literal_expr(literal, config));
    } else {
        emit_scalar(w, field, literal, config);
    }
}

/// `timestamp: "now"`.
pub fn emit_assign_now(w: &mut CodeWriter, field: &FieldDescriptor, config: &GeneratorConfig) {
    emit_optional(w, field, &now_expr(config));
}

/// The statement that applies defaults to a nested message, or a comment when
/// the target type has no procedure.
fn recurse_call(
    target: Option<&MessageDescriptor>,
    recv: &str,
    config: &GeneratorConfig,
) -> Result<String, String> {
    match target {
        Some(target) if target.is_ignored() => {
            Err(format!("// {} ignores defaults", target.full_name))
        }
        Some(_) => Ok(format!("{recv}.{}();", config.method_name)),
        None => Err("// unresolved message type".to_string()),
    }
}

/// `message { initialize, defaults }` on a singular message field.
pub fn emit_message(
    w: &mut CodeWriter,
    field: &FieldDescriptor,
    target: Option<&MessageDescriptor>,
    initialize: bool,
    recurse: bool,
    config: &GeneratorConfig,
) {
    let place = format!("self.{}", naming::field_ident(&field.name));
    if initialize {
        w.open(&format!("if {place}.is_none()"));
        w.line(&format!(
            "{place} = ::core::option::Option::Some(::core::default::Default::default());"
        ));
        w.close();
    }
    if !recurse {
        return;
    }
    match recurse_call(target, "v", config) {
        Ok(call) => {
            w.open(&format!("if let ::core::option::Option::Some(v) = {place}.as_mut()"));
            w.line(&call);
            w.close();
        }
        Err(comment) => w.line(&comment),
    }
}

/// A real oneof: instantiate the default member when unset, then fire the
/// rule of the current member.
pub fn emit_oneof(
    w: &mut CodeWriter,
    registry: &SchemaRegistry,
    message: &MessageDescriptor,
    step: &OneofStep<'_>,
    actions: &[(&FieldDescriptor, &FieldAction)],
    config: &GeneratorConfig,
) {
    let place = format!("self.{}", naming::field_ident(step.name));
    let enum_path = naming::oneof_path(message, step.name);

    if let Some(default) = step.default_member {
        w.open(&format!("if {place}.is_none()"));
        w.line(&format!(
            "{place} = ::core::option::Option::Some({enum_path}::{}(::core::default::Default::default()));",
            naming::oneof_variant(&default.name)
        ));
        w.close();
    }

    let mut arms = CodeWriter::new();
    arms.depth = w.depth + 1;
    for (field, action) in actions {
        let pattern = format!(
            "::core::option::Option::Some({enum_path}::{}(v)) =>",
            naming::oneof_variant(&field.name)
        );
        match action {
            FieldAction::Assign(literal) => {
                arms.open(&pattern);
                arms.open(&format!("if {}", zero_test(literal, "*v", "v")));
                arms.line(&format!("*v = {};", literal_expr(literal, config)));
                arms.close();
                arms.close();
            }
            FieldAction::AssignNow => {
                let probe = Literal::Timestamp(Default::default());
                arms.open(&pattern);
                arms.open(&format!("if {}", zero_test(&probe, "*v", "v")));
                arms.line(&format!("*v = {};", now_expr(config)));
                arms.close();
                arms.close();
            }
            FieldAction::Message { recurse: true, .. } => {
                let target = registry.field_message(field).map(|m| &**m);
                match recurse_call(target, "v", config) {
                    Ok(call) => {
                        arms.open(&pattern);
                        arms.line(&call);
                        arms.close();
                    }
                    Err(comment) => arms.line(&comment),
                }
            }
            FieldAction::Message { recurse: false, .. } => {}
        }
    }

    if arms.is_empty() {
        return;
    }
    w.open(&format!("match &mut {place}"));
    w.lines.extend(arms.into_lines());
    w.line("_ => {}");
    w.close();
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::temporal::{Duration, Timestamp};

    fn config() -> GeneratorConfig {
        GeneratorConfig::default()
    }

    fn field(json: &str) -> FieldDescriptor {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_literal_expressions() {
        let c = config();
        assert_eq!(literal_expr(&Literal::I64(-42), &c), "-42i64");
        assert_eq!(literal_expr(&Literal::U32(5), &c), "5u32");
        assert_eq!(literal_expr(&Literal::Enum(2), &c), "2i32");
        assert_eq!(literal_expr(&Literal::F32(1.5), &c), "1.5f32");
        assert_eq!(literal_expr(&Literal::F64(1.0), &c), "1.0f64");
        assert_eq!(literal_expr(&Literal::F32(f32::NAN), &c), "f32::NAN");
        assert_eq!(literal_expr(&Literal::F64(f64::NEG_INFINITY), &c), "f64::NEG_INFINITY");
        assert_eq!(
            literal_expr(&Literal::String("a\"b".into()), &c),
            r#"::std::string::String::from("a\"b")"#
        );
        assert_eq!(
            literal_expr(&Literal::Bytes(vec![b'?', b'"', 0, 0xff]), &c),
            r#"b"?\"\x00\xff".to_vec()"#
        );
        assert_eq!(
            literal_expr(&Literal::Duration(Duration { seconds: 3600, nanos: 0 }), &c),
            "::prost_types::Duration { seconds: 3600i64, nanos: 0i32 }"
        );
        assert_eq!(
            literal_expr(&Literal::Timestamp(Timestamp { seconds: -562032000, nanos: 0 }), &c),
            "::prost_types::Timestamp { seconds: -562032000i64, nanos: 0i32 }"
        );
    }

    #[test]
    fn test_plain_scalar_checks_zero() {
        let mut w = CodeWriter::new();
        let f = field(r#"{"name": "count", "number": 1, "kind": "int64"}"#);
        emit_assign(&mut w, &f, &Literal::I64(42), &config());
        assert_eq!(
            w.into_lines(),
            ["if self.count == 0 {", "    self.count = 42i64;", "}"]
        );

        let mut w = CodeWriter::new();
        let f = field(r#"{"name": "name", "number": 1, "kind": "string"}"#);
        emit_assign(&mut w, &f, &Literal::String("x".into()), &config());
        assert_eq!(w.into_lines()[0], "if self.name.is_empty() {");
    }

    #[test]
    fn test_presence_fields_check_none() {
        let mut w = CodeWriter::new();
        let f = field(r#"{"name": "limit", "number": 1, "kind": "message", "type": "google.protobuf.Int64Value"}"#);
        emit_assign(&mut w, &f, &Literal::I64(43), &config());
        assert_eq!(
            w.into_lines(),
            [
                "if self.limit.is_none() {",
                "    self.limit = ::core::option::Option::Some(43i64);",
                "}"
            ]
        );
    }

    #[test]
    fn test_now_is_evaluated_at_call_time() {
        let mut w = CodeWriter::new();
        let f = field(r#"{"name": "at", "number": 1, "kind": "message", "type": "google.protobuf.Timestamp"}"#);
        emit_assign_now(&mut w, &f, &config());
        assert!(w.into_lines()[1]
            .contains("::prost_types::Timestamp::from(::std::time::SystemTime::now())"));
    }

    #[test]
    fn test_message_gating() {
        let f = field(r#"{"name": "leaf", "number": 1, "kind": "message", "type": "t.Leaf"}"#);
        let leaf: MessageDescriptor = serde_json::from_str(r#"{"name": "Leaf"}"#).unwrap();

        let mut w = CodeWriter::new();
        emit_message(&mut w, &f, Some(&leaf), true, false, &config());
        let lines = w.into_lines();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("if self.leaf.is_none()"));

        let mut w = CodeWriter::new();
        emit_message(&mut w, &f, Some(&leaf), false, true, &config());
        assert_eq!(
            w.into_lines(),
            [
                "if let ::core::option::Option::Some(v) = self.leaf.as_mut() {",
                "    v.apply_defaults();",
                "}"
            ]
        );

        let quiet: MessageDescriptor =
            serde_json::from_str(r#"{"name": "Quiet", "ignored": true}"#).unwrap();
        let mut w = CodeWriter::new();
        emit_message(&mut w, &f, Some(&quiet), false, true, &config());
        assert_eq!(w.into_lines().len(), 1);
    }
}
