//! # Defaulting Plan
//!
//! The per-message action table shared by the interpreter and the generator.
//! Every `(rule, field shape)` pair is resolved here, once, into a
//! [`FieldAction`]; the engines only decide how to carry the action out.
//!
//! A plan lists the steps of one defaulting pass in field declaration order.
//! A real oneof becomes a single [`Step::Oneof`] at the position of its first
//! member, so each group is handled exactly once per pass.

use crate::descriptor::{FieldDescriptor, Kind, MessageDescriptor, WellKnownType};
use crate::reflect::Value;
use crate::rule::FieldDefaults;
use crate::temporal::{self, Duration, TemporalError, Timestamp, TimestampLiteral};
use std::collections::HashSet;
use std::fmt;

/// Why a rule cannot be applied to a field.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RuleError {
    #[error("rule kind {rule} does not match field type {field}")]
    RuleTypeMismatch { rule: String, field: String },
    #[error(transparent)]
    Temporal(#[from] TemporalError),
    #[error("unsupported rule variant {0}")]
    UnsupportedRuleVariant(String),
}

/// A resolved constant.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Bool(bool),
    I32(i32),
    I64(i64),
    U32(u32),
    U64(u64),
    F32(f32),
    F64(f64),
    String(String),
    Bytes(Vec<u8>),
    Enum(i32),
    Duration(Duration),
    Timestamp(Timestamp),
}

impl Literal {
    pub fn to_value(&self) -> Value {
        match self {
            Literal::Bool(v) => Value::Bool(*v),
            Literal::I32(v) => Value::I32(*v),
            Literal::I64(v) => Value::I64(*v),
            Literal::U32(v) => Value::U32(*v),
            Literal::U64(v) => Value::U64(*v),
            Literal::F32(v) => Value::F32(*v),
            Literal::F64(v) => Value::F64(*v),
            Literal::String(v) => Value::String(v.clone()),
            Literal::Bytes(v) => Value::Bytes(v.clone()),
            Literal::Enum(v) => Value::EnumNumber(*v),
            Literal::Duration(v) => Value::Duration(*v),
            Literal::Timestamp(v) => Value::Timestamp(*v),
        }
    }
}

/// What a rule does to its field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldAction {
    /// Store the literal when the field is unset.
    Assign(Literal),
    /// Store the wall-clock time when the field is unset.
    AssignNow,
    /// Construct the nested message when absent (`initialize`), then apply
    /// its defaults when present (`recurse`).
    Message { initialize: bool, recurse: bool },
}

/// How a field is stored, as far as defaulting is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldShape {
    Scalar(Kind),
    Wrapper(WellKnownType),
    Duration,
    Timestamp,
    Any,
    Message,
    Collection,
}

impl FieldShape {
    pub fn of(field: &FieldDescriptor) -> Self {
        if field.is_collection() {
            return FieldShape::Collection;
        }
        if field.kind != Kind::Message {
            return FieldShape::Scalar(field.kind);
        }
        match field.well_known() {
            Some(WellKnownType::Duration) => FieldShape::Duration,
            Some(WellKnownType::Timestamp) => FieldShape::Timestamp,
            Some(WellKnownType::Any) => FieldShape::Any,
            Some(wrapper) => FieldShape::Wrapper(wrapper),
            None => FieldShape::Message,
        }
    }
}

impl fmt::Display for FieldShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldShape::Scalar(kind) => write!(f, "{kind}"),
            FieldShape::Wrapper(wkt) => f.write_str(wkt.full_name()),
            FieldShape::Duration => f.write_str(WellKnownType::Duration.full_name()),
            FieldShape::Timestamp => f.write_str(WellKnownType::Timestamp.full_name()),
            FieldShape::Any => f.write_str(WellKnownType::Any.full_name()),
            FieldShape::Message => f.write_str("message"),
            FieldShape::Collection => f.write_str("repeated or map field"),
        }
    }
}

/// Kind and constant carried by a scalar rule, `None` for the other variants.
pub fn scalar_literal(rule: &FieldDefaults) -> Option<(Kind, Literal)> {
    Some(match rule {
        FieldDefaults::Float(v) => (Kind::Float, Literal::F32(*v)),
        FieldDefaults::Double(v) => (Kind::Double, Literal::F64(*v)),
        FieldDefaults::Int32(v) => (Kind::Int32, Literal::I32(*v)),
        FieldDefaults::Int64(v) => (Kind::Int64, Literal::I64(*v)),
        FieldDefaults::Uint32(v) => (Kind::Uint32, Literal::U32(*v)),
        FieldDefaults::Uint64(v) => (Kind::Uint64, Literal::U64(*v)),
        FieldDefaults::Sint32(v) => (Kind::Sint32, Literal::I32(*v)),
        FieldDefaults::Sint64(v) => (Kind::Sint64, Literal::I64(*v)),
        FieldDefaults::Fixed32(v) => (Kind::Fixed32, Literal::U32(*v)),
        FieldDefaults::Fixed64(v) => (Kind::Fixed64, Literal::U64(*v)),
        FieldDefaults::Sfixed32(v) => (Kind::Sfixed32, Literal::I32(*v)),
        FieldDefaults::Sfixed64(v) => (Kind::Sfixed64, Literal::I64(*v)),
        FieldDefaults::Bool(v) => (Kind::Bool, Literal::Bool(*v)),
        FieldDefaults::String(v) => (Kind::String, Literal::String(v.clone())),
        FieldDefaults::Bytes(v) => (Kind::Bytes, Literal::Bytes(v.clone())),
        FieldDefaults::Enum(v) => (Kind::Enum, Literal::Enum(*v)),
        FieldDefaults::Duration(_)
        | FieldDefaults::Timestamp(_)
        | FieldDefaults::Message(_)
        | FieldDefaults::Unsupported(_) => return None,
    })
}

/// Resolves a rule against the shape of the field it decorates.
///
/// Temporal literals are parsed here; `now` resolves to [`FieldAction::AssignNow`].
pub fn resolve(rule: &FieldDefaults, shape: FieldShape) -> Result<FieldAction, RuleError> {
    let mismatch = || RuleError::RuleTypeMismatch {
        rule: rule.tag().to_string(),
        field: shape.to_string(),
    };

    if let FieldDefaults::Unsupported(tag) = rule {
        return Err(RuleError::UnsupportedRuleVariant(tag.clone()));
    }

    match (shape, rule) {
        (FieldShape::Scalar(kind), _) => match scalar_literal(rule) {
            Some((rule_kind, literal)) if rule_kind == kind => Ok(FieldAction::Assign(literal)),
            _ => Err(mismatch()),
        },
        (FieldShape::Wrapper(wkt), _) => match scalar_literal(rule) {
            Some((rule_kind, literal)) if Some(rule_kind) == wkt.wrapped_kind() => {
                Ok(FieldAction::Assign(literal))
            }
            _ => Err(mismatch()),
        },
        (FieldShape::Duration, FieldDefaults::Duration(literal)) => {
            let duration = temporal::parse_duration(literal)?;
            Ok(FieldAction::Assign(Literal::Duration(duration)))
        }
        (FieldShape::Timestamp, FieldDefaults::Timestamp(literal)) => {
            match TimestampLiteral::parse(literal)? {
                TimestampLiteral::Now => Ok(FieldAction::AssignNow),
                TimestampLiteral::At(ts) => Ok(FieldAction::Assign(Literal::Timestamp(ts))),
            }
        }
        (FieldShape::Message, FieldDefaults::Message(policy)) => Ok(FieldAction::Message {
            initialize: policy.initialize,
            recurse: policy.recurse(),
        }),
        _ => Err(mismatch()),
    }
}

/// Resolves a field's own rule, `None` when it has no rule.
pub fn field_action(field: &FieldDescriptor) -> Option<Result<FieldAction, RuleError>> {
    field
        .rule()
        .map(|rule| resolve(rule, FieldShape::of(field)))
}

/// One oneof member carrying a rule.
#[derive(Debug)]
pub struct OneofMember<'a> {
    pub field: &'a FieldDescriptor,
    pub action: Result<FieldAction, RuleError>,
}

/// A real oneof, handled once per pass.
#[derive(Debug)]
pub struct OneofStep<'a> {
    pub name: &'a str,
    /// Member instantiated when no member is set.
    pub default_member: Option<&'a FieldDescriptor>,
    /// Members with rules, in declaration order.
    pub members: Vec<OneofMember<'a>>,
}

impl<'a> OneofStep<'a> {
    pub fn member(&self, number: u32) -> Option<&OneofMember<'a>> {
        self.members.iter().find(|m| m.field.number == number)
    }
}

#[derive(Debug)]
pub enum Step<'a> {
    Field {
        field: &'a FieldDescriptor,
        action: Result<FieldAction, RuleError>,
    },
    Oneof(OneofStep<'a>),
}

/// Ordered steps of one defaulting pass over a message type.
#[derive(Debug)]
pub struct MessagePlan<'a> {
    pub message: &'a MessageDescriptor,
    pub steps: Vec<Step<'a>>,
}

/// Builds the plan for one message type.
///
/// Collections and fields without rules produce no step. A oneof produces a
/// step when it names a default member or any member carries a rule.
pub fn plan_message(message: &MessageDescriptor) -> MessagePlan<'_> {
    let mut steps = Vec::new();
    let mut emitted: HashSet<&str> = HashSet::new();

    for field in &message.fields {
        if field.is_collection() {
            continue;
        }
        if let Some(oneof) = field.real_oneof() {
            if !emitted.insert(oneof) {
                continue;
            }
            let members: Vec<OneofMember<'_>> = message
                .oneof_members(oneof)
                .filter_map(|member| {
                    field_action(member).map(|action| OneofMember {
                        field: member,
                        action,
                    })
                })
                .collect();
            let default_member = message.oneof_default(oneof);
            if default_member.is_some() || !members.is_empty() {
                steps.push(Step::Oneof(OneofStep {
                    name: oneof,
                    default_member,
                    members,
                }));
            }
            continue;
        }
        if let Some(action) = field_action(field) {
            steps.push(Step::Field { field, action });
        }
    }

    MessagePlan { message, steps }
}
